//! Shared fakes for live view tests
//!
//! - `FakeTransport`: in-memory socket the test pushes frames into
//! - `FakeSource`: scripted REST snapshots with failure and hold switches
//! - `RecordingSink`: captures alarms, notices and indicator changes

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch, Notify};
use tokio::time::{sleep, timeout, Duration};
use vigihome_core::api::EventSource;
use vigihome_core::clock::FixedClock;
use vigihome_core::config::ReconnectConfig;
use vigihome_core::event::{AckState, Activity, Anomaly, Origin, Priority};
use vigihome_core::live::{
    AlertSink, LinkState, LiveConnection, LiveContext, LiveMode, LiveTransport, Notice,
    NoticeLevel, ViewState,
};
use vigihome_core::{LiveConfig, Result, VigiError};

// =============================================================================
// Time
// =============================================================================

pub fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, 1).unwrap()
}

pub fn yesterday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 2, 28).unwrap()
}

pub fn at(date: NaiveDate, hms: &str) -> NaiveDateTime {
    date.and_time(NaiveTime::parse_from_str(hms, "%H:%M:%S").unwrap())
}

pub fn clock() -> Arc<FixedClock> {
    Arc::new(FixedClock(at(today(), "12:00:00")))
}

// =============================================================================
// Events and frames
// =============================================================================

pub fn activity(id: Option<&str>, when: NaiveDateTime, category: &str, origin: Origin) -> Activity {
    Activity {
        id: id.map(str::to_string),
        at: when,
        category: category.to_string(),
        origin,
        live: false,
    }
}

pub fn anomaly(id: Option<&str>, when: NaiveDateTime, name: &str, priority: Priority) -> Anomaly {
    Anomaly {
        id: id.map(str::to_string),
        at: when,
        activity_name: name.to_string(),
        priority,
        status: AckState::Active,
        live: false,
    }
}

pub fn activity_frame(activity: &str, when: NaiveDateTime) -> String {
    serde_json::json!({
        "timestamp": when.format("%Y-%m-%d %H:%M:%S").to_string(),
        "activity": activity,
        "category": "normal",
        "priority": "Low",
        "source": "predicted",
    })
    .to_string()
}

pub fn anomaly_frame(id: Option<&str>, activity: &str, priority: &str, when: NaiveDateTime) -> String {
    let mut frame = serde_json::json!({
        "timestamp": when.format("%Y-%m-%d %H:%M:%S").to_string(),
        "activity": activity,
        "category": "anormal",
        "priority": priority,
        "source": "predicted",
    });
    if let Some(id) = id {
        frame["id"] = serde_json::Value::String(id.to_string());
    }
    frame.to_string()
}

// =============================================================================
// Transport
// =============================================================================

#[derive(Default)]
pub struct FakeTransport {
    current: Mutex<Option<mpsc::UnboundedSender<String>>>,
    attempts: AtomicUsize,
    connects: AtomicUsize,
    open: Arc<AtomicUsize>,
    fail: AtomicBool,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, frame: impl Into<String>) {
        if let Some(tx) = self.current.lock().unwrap().as_ref() {
            let _ = tx.send(frame.into());
        }
    }

    /// Server-side close of the current connection
    pub fn drop_connection(&self) {
        self.current.lock().unwrap().take();
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn open_connections(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LiveTransport for FakeTransport {
    async fn connect(&self) -> Result<Box<dyn LiveConnection>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(VigiError::Socket("connection refused".to_string()));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        *self.current.lock().unwrap() = Some(tx);
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.open.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeConnection {
            rx,
            open: Arc::clone(&self.open),
        }))
    }
}

pub struct FakeConnection {
    rx: mpsc::UnboundedReceiver<String>,
    open: Arc<AtomicUsize>,
}

#[async_trait]
impl LiveConnection for FakeConnection {
    async fn next_text(&mut self) -> Option<Result<String>> {
        self.rx.recv().await.map(Ok)
    }

    async fn close(&mut self) {
        self.rx.close();
    }
}

impl Drop for FakeConnection {
    fn drop(&mut self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
    }
}

// =============================================================================
// REST source
// =============================================================================

#[derive(Default)]
pub struct FakeSource {
    activities: Mutex<Vec<Activity>>,
    dependent: Mutex<Vec<Activity>>,
    anomalies: Mutex<Vec<Anomaly>>,
    fetches: AtomicUsize,
    fail: AtomicBool,
    ack_fail: AtomicBool,
    acknowledged: Mutex<Vec<String>>,
    hold: Mutex<Option<NaiveDate>>,
    release: Notify,
}

impl FakeSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_activities(&self, items: Vec<Activity>) {
        *self.activities.lock().unwrap() = items;
    }

    pub fn set_dependent_activities(&self, items: Vec<Activity>) {
        *self.dependent.lock().unwrap() = items;
    }

    pub fn set_anomalies(&self, items: Vec<Anomaly>) {
        *self.anomalies.lock().unwrap() = items;
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn set_ack_failing(&self, fail: bool) {
        self.ack_fail.store(fail, Ordering::SeqCst);
    }

    /// Fetches for `date` block until `release`
    pub fn hold(&self, date: NaiveDate) {
        *self.hold.lock().unwrap() = Some(date);
    }

    pub fn release(&self) {
        self.hold.lock().unwrap().take();
        self.release.notify_waiters();
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn acknowledged(&self) -> Vec<String> {
        self.acknowledged.lock().unwrap().clone()
    }

    async fn gate(&self, date: NaiveDate) -> Result<()> {
        // registered before the check so a concurrent release is not missed
        let released = self.release.notified();
        let held = *self.hold.lock().unwrap() == Some(date);
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if held {
            released.await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(VigiError::Status {
                status: 500,
                context: "fake".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl EventSource for FakeSource {
    async fn activities(&self, date: NaiveDate) -> Result<Vec<Activity>> {
        self.gate(date).await?;
        let items = self.activities.lock().unwrap().clone();
        Ok(items.into_iter().filter(|a| a.at.date() == date).collect())
    }

    async fn dependent_activities(&self, date: NaiveDate) -> Result<Vec<Activity>> {
        self.gate(date).await?;
        let items = self.dependent.lock().unwrap().clone();
        Ok(items.into_iter().filter(|a| a.at.date() == date).collect())
    }

    async fn anomalies(&self, date: NaiveDate) -> Result<Vec<Anomaly>> {
        self.gate(date).await?;
        let items = self.anomalies.lock().unwrap().clone();
        Ok(items.into_iter().filter(|a| a.at.date() == date).collect())
    }

    async fn acknowledge(&self, id: &str) -> Result<()> {
        if self.ack_fail.load(Ordering::SeqCst) {
            return Err(VigiError::Transport("offline".to_string()));
        }
        self.acknowledged.lock().unwrap().push(id.to_string());
        Ok(())
    }
}

// =============================================================================
// Sink
// =============================================================================

#[derive(Default)]
pub struct RecordingSink {
    alarms: Mutex<Vec<Anomaly>>,
    notices: Mutex<Vec<Notice>>,
    links: Mutex<Vec<(LinkState, LiveMode)>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn alarms(&self) -> Vec<Anomaly> {
        self.alarms.lock().unwrap().clone()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().unwrap().clone()
    }

    pub fn has_notice(&self, level: NoticeLevel, message: &str) -> bool {
        self.notices()
            .iter()
            .any(|n| n.level == level && n.message.contains(message))
    }

    pub fn links(&self) -> Vec<(LinkState, LiveMode)> {
        self.links.lock().unwrap().clone()
    }
}

impl AlertSink for RecordingSink {
    fn alarm(&self, anomaly: &Anomaly) {
        self.alarms.lock().unwrap().push(anomaly.clone());
    }

    fn notify(&self, notice: Notice) {
        self.notices.lock().unwrap().push(notice);
    }

    fn link_changed(&self, link: LinkState, mode: LiveMode) {
        self.links.lock().unwrap().push((link, mode));
    }
}

// =============================================================================
// Wiring
// =============================================================================

/// Long poll interval so only explicit refreshes fetch; fast reconnects
pub fn test_config() -> LiveConfig {
    LiveConfig {
        poll_interval_secs: 3600,
        reconnect: ReconnectConfig {
            base_ms: 10,
            max_ms: 40,
            max_attempts: Some(3),
        },
        ..LiveConfig::default()
    }
}

pub fn context(
    transport: Arc<FakeTransport>,
    sink: Arc<dyn AlertSink>,
    config: LiveConfig,
) -> LiveContext {
    LiveContext {
        transport,
        sink,
        clock: clock(),
        config,
    }
}

/// Wait until the published state satisfies `pred`
pub async fn wait_state<T: Clone>(
    rx: &mut watch::Receiver<ViewState<T>>,
    pred: impl FnMut(&ViewState<T>) -> bool,
) -> ViewState<T> {
    timeout(Duration::from_secs(2), rx.wait_for(pred))
        .await
        .expect("timed out waiting for view state")
        .expect("view closed")
        .clone()
}

/// Poll a condition that is not published through the view state
pub async fn eventually(mut cond: impl FnMut() -> bool) {
    for _ in 0..400 {
        if cond() {
            return;
        }
        sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}
