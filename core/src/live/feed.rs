// Live feeds
//
// A feed binds one page's list to its poll source, its push classification and
// its side effects. The view machinery is generic over it.

use crate::api::EventSource;
use crate::event::{Activity, Anomaly, FrameKind, LiveFrame};
use crate::live::list::Identified;
use crate::live::sink::{AlertSink, Notice};
use crate::Result;
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use std::fmt::Debug;
use std::sync::Arc;

#[async_trait]
pub trait LiveFeed: Send + Sync + 'static {
    type Item: Identified + Debug;

    /// Name used in logs
    fn name(&self) -> &'static str;

    /// Authoritative snapshot for one calendar day
    async fn fetch(&self, date: NaiveDate) -> Result<Vec<Self::Item>>;

    /// Item contributed by a pushed frame, if the frame belongs to this feed.
    /// Errors mean the frame is malformed for this feed.
    fn accept(&self, frame: &LiveFrame, received_at: NaiveDateTime) -> Result<Option<Self::Item>>;

    /// Runs once per event after a push inserted it
    fn on_live_insert(&self, _item: &Self::Item, _sink: &dyn AlertSink) {}
}

/// Caregiver activity journal: manual and predicted activities
#[derive(Clone)]
pub struct ActivityFeed {
    source: Arc<dyn EventSource>,
}

impl ActivityFeed {
    pub fn new(source: Arc<dyn EventSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl LiveFeed for ActivityFeed {
    type Item = Activity;

    fn name(&self) -> &'static str {
        "activities"
    }

    async fn fetch(&self, date: NaiveDate) -> Result<Vec<Activity>> {
        self.source.activities(date).await
    }

    fn accept(&self, frame: &LiveFrame, received_at: NaiveDateTime) -> Result<Option<Activity>> {
        match frame.kind() {
            FrameKind::Activity => frame.to_activity(received_at).map(Some),
            FrameKind::Anomaly => Ok(None),
        }
    }
}

/// Dependent home/timeline: the dependent's own activities
#[derive(Clone)]
pub struct TimelineFeed {
    source: Arc<dyn EventSource>,
}

impl TimelineFeed {
    pub fn new(source: Arc<dyn EventSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl LiveFeed for TimelineFeed {
    type Item = Activity;

    fn name(&self) -> &'static str {
        "timeline"
    }

    async fn fetch(&self, date: NaiveDate) -> Result<Vec<Activity>> {
        self.source.dependent_activities(date).await
    }

    fn accept(&self, frame: &LiveFrame, received_at: NaiveDateTime) -> Result<Option<Activity>> {
        match frame.kind() {
            FrameKind::Activity => frame.to_activity(received_at).map(Some),
            FrameKind::Anomaly => Ok(None),
        }
    }
}

/// Caregiver alert list
#[derive(Clone)]
pub struct AlertFeed {
    source: Arc<dyn EventSource>,
}

impl AlertFeed {
    pub fn new(source: Arc<dyn EventSource>) -> Self {
        Self { source }
    }

    /// Mark an anomaly as seen on the backend
    pub async fn acknowledge(&self, id: &str) -> Result<()> {
        self.source.acknowledge(id).await
    }
}

#[async_trait]
impl LiveFeed for AlertFeed {
    type Item = Anomaly;

    fn name(&self) -> &'static str {
        "alerts"
    }

    async fn fetch(&self, date: NaiveDate) -> Result<Vec<Anomaly>> {
        self.source.anomalies(date).await
    }

    fn accept(&self, frame: &LiveFrame, received_at: NaiveDateTime) -> Result<Option<Anomaly>> {
        match frame.kind() {
            FrameKind::Anomaly => frame.to_anomaly(received_at).map(Some),
            FrameKind::Activity => Ok(None),
        }
    }

    fn on_live_insert(&self, item: &Anomaly, sink: &dyn AlertSink) {
        if item.is_high() {
            sink.alarm(item);
        }
        sink.notify(Notice::error(format!(
            "Abnormal activity detected: {}",
            item.activity_name
        )));
    }
}
