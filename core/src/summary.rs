// Summary watchers
//
// Polled values that are not lists: the realtime monitoring summary (15 s) and the
// latest mood/health status of the caregiver's dependent (5 min).

use crate::api::ApiClient;
use crate::clock::Clock;
use crate::config::LiveConfig;
use crate::event::{Origin, Priority};
use crate::live::{spawn_poller, PollSink, PollerHandle};
use crate::session::Session;
use crate::Result;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalActivity {
    pub timestamp: String,
    pub activity: String,
    #[serde(default)]
    pub source: Option<Origin>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbnormalActivity {
    pub timestamp: String,
    pub activity: String,
    pub priority: Priority,
    #[serde(default)]
    pub source: Option<Origin>,
}

/// Response of `/monitoring/realtime`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RealtimeMonitoring {
    #[serde(default)]
    pub normal_activities: Vec<NormalActivity>,
    #[serde(default)]
    pub abnormal_activities: Vec<AbnormalActivity>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Mood {
    Well,
    Tired,
    Sick,
    Pain,
    AtHome,
}

/// One row of `/health/history`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatusEntry {
    pub full_name: String,
    pub age: i32,
    pub status: String,
    /// "dd/mm/YYYY"
    pub log_date: String,
    /// "HH:MM"
    pub log_time: String,
}

impl HealthStatusEntry {
    /// None for statuses this client does not know
    pub fn mood(&self) -> Option<Mood> {
        serde_json::from_value(serde_json::Value::String(self.status.clone())).ok()
    }
}

#[derive(Debug, Clone)]
pub struct SummaryState<T> {
    pub value: Option<T>,
    pub loading: bool,
    pub last_updated: Option<NaiveDateTime>,
    pub error: Option<String>,
}

impl<T> Default for SummaryState<T> {
    fn default() -> Self {
        Self {
            value: None,
            loading: true,
            last_updated: None,
            error: None,
        }
    }
}

/// Periodically refreshed value; dropping the watcher stops the poller
pub struct SummaryWatcher<T> {
    state: watch::Receiver<SummaryState<T>>,
    poller: PollerHandle,
}

impl<T: Clone + Send + Sync + 'static> SummaryWatcher<T> {
    pub fn spawn<F, Fut>(
        name: &'static str,
        interval: Duration,
        clock: Arc<dyn Clock>,
        fetch: F,
    ) -> Self
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let (tx, state) = watch::channel(SummaryState::default());
        let poller = spawn_poller(name, interval, fetch, WatchSink { name, tx, clock });
        Self { state, poller }
    }

    pub fn state(&self) -> SummaryState<T> {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SummaryState<T>> {
        self.state.clone()
    }

    pub fn refresh(&self) {
        self.poller.refresh();
    }
}

struct WatchSink<T> {
    name: &'static str,
    tx: watch::Sender<SummaryState<T>>,
    clock: Arc<dyn Clock>,
}

#[async_trait]
impl<T: Send + Sync + 'static> PollSink<T> for WatchSink<T> {
    async fn deliver(&mut self, result: Result<T>) -> bool {
        let now = self.clock.now();
        let name = self.name;
        self.tx.send_modify(|state| {
            state.loading = false;
            match result {
                Ok(value) => {
                    state.value = Some(value);
                    state.last_updated = Some(now);
                    state.error = None;
                }
                Err(e) => {
                    warn!(target: "poller", summary = name, error = %e, "Summary refresh failed");
                    state.error = Some(e.user_message().to_string());
                }
            }
        });
        !self.tx.is_closed()
    }
}

/// Realtime monitoring summary, every `summary_interval`
pub fn monitoring_watcher(
    api: ApiClient,
    session: Option<Session>,
    config: &LiveConfig,
    clock: Arc<dyn Clock>,
) -> SummaryWatcher<RealtimeMonitoring> {
    SummaryWatcher::spawn("monitoring", config.summary_interval(), clock, move || {
        let api = api.clone();
        let session = session.clone();
        async move { api.realtime_monitoring(session.as_ref()).await }
    })
}

/// Most recent health status of today, every `status_interval`
pub fn health_status_watcher(
    api: ApiClient,
    session: Session,
    config: &LiveConfig,
    clock: Arc<dyn Clock>,
) -> SummaryWatcher<Option<HealthStatusEntry>> {
    let today_clock = Arc::clone(&clock);
    SummaryWatcher::spawn("health_status", config.status_interval(), clock, move || {
        let api = api.clone();
        let session = session.clone();
        let today = today_clock.today();
        async move {
            let history = api.health_history(&session, today).await?;
            Ok(history.into_iter().next())
        }
    })
}
