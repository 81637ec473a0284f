// Interval poller
//
// Fetches on start, on every tick and on demand. A failed fetch is delivered like a
// successful one; the next tick is the retry.

use crate::Result;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

/// Receiver of poll results. Returning false stops the poller.
#[async_trait]
pub trait PollSink<T>: Send + 'static {
    async fn deliver(&mut self, result: Result<T>) -> bool;
}

pub struct PollerHandle {
    refresh: Arc<Notify>,
    task: JoinHandle<()>,
}

impl PollerHandle {
    /// Fetch now; the interval restarts from this fetch
    pub fn refresh(&self) {
        self.refresh.notify_one();
    }

    /// Cancel the timer and any in-flight fetch
    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub fn spawn_poller<T, F, Fut, S>(
    name: &'static str,
    interval: Duration,
    fetch: F,
    mut sink: S,
) -> PollerHandle
where
    T: Send + 'static,
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
    S: PollSink<T>,
{
    let refresh = Arc::new(Notify::new());
    let trigger = Arc::clone(&refresh);

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let manual = tokio::select! {
                _ = ticker.tick() => false,
                _ = trigger.notified() => true,
            };
            if manual {
                ticker.reset();
            }

            debug!(target: "poller", feed = name, "Polling");
            let result = fetch().await;
            if !sink.deliver(result).await {
                debug!(target: "poller", feed = name, "Poll sink closed; stopping");
                break;
            }
        }
    });

    PollerHandle { refresh, task }
}
