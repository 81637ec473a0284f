// Live subscriber
//
// Owns one socket for one day. Reconnects with bounded backoff, asks for a
// reconciliation poll after every reconnect, and stops for good once the day is
// no longer today.

use crate::clock::Clock;
use crate::config::ReconnectConfig;
use crate::live::backoff::ReconnectBackoff;
use crate::live::transport::{LiveConnection, LiveTransport};
use crate::live::view::LinkState;
use crate::VigiError;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriberEvent {
    Link(LinkState),
    Frame(String),
    /// Socket is open after a drop or failed attempt; missed events need a poll
    Reconnected,
}

/// Receiver of subscriber events. Returning false stops the subscriber.
#[async_trait]
pub trait SubscriberSink: Send + 'static {
    async fn emit(&mut self, event: SubscriberEvent) -> bool;
}

pub struct SubscriberHandle {
    stop: Arc<Notify>,
    task: JoinHandle<()>,
}

impl SubscriberHandle {
    /// Close the socket and end the task
    pub fn stop(&self) {
        self.stop.notify_one();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for SubscriberHandle {
    fn drop(&mut self) {
        self.stop.notify_one();
    }
}

enum PumpEnd {
    Stopped,
    SinkClosed,
    PeerClosed,
    Failed(VigiError),
}

pub fn spawn_subscriber<S: SubscriberSink>(
    transport: Arc<dyn LiveTransport>,
    clock: Arc<dyn Clock>,
    date: NaiveDate,
    reconnect: ReconnectConfig,
    sink: S,
) -> SubscriberHandle {
    let stop = Arc::new(Notify::new());
    let task = tokio::spawn(run(transport, clock, date, reconnect, Arc::clone(&stop), sink));
    SubscriberHandle { stop, task }
}

async fn run<S: SubscriberSink>(
    transport: Arc<dyn LiveTransport>,
    clock: Arc<dyn Clock>,
    date: NaiveDate,
    reconnect: ReconnectConfig,
    stop: Arc<Notify>,
    mut sink: S,
) {
    let mut backoff = ReconnectBackoff::new(&reconnect);
    // set by any failed attempt or drop; the next open must reconcile
    let mut missed = false;

    if !sink.emit(SubscriberEvent::Link(LinkState::Connecting)).await {
        return;
    }

    loop {
        // Eligibility is checked at every connection attempt
        if clock.today() != date {
            info!(target: "subscriber", date = %date, "Day is over; live updates stop");
            sink.emit(SubscriberEvent::Link(LinkState::Idle)).await;
            return;
        }

        let connected = tokio::select! {
            _ = stop.notified() => return,
            result = transport.connect() => result,
        };

        match connected {
            Ok(mut conn) => {
                backoff.reset();
                if !sink.emit(SubscriberEvent::Link(LinkState::Open)).await {
                    conn.close().await;
                    return;
                }
                if missed && !sink.emit(SubscriberEvent::Reconnected).await {
                    conn.close().await;
                    return;
                }
                missed = false;

                match pump(conn.as_mut(), &stop, &mut sink).await {
                    PumpEnd::Stopped | PumpEnd::SinkClosed => {
                        debug!(target: "subscriber", "Closing live socket");
                        conn.close().await;
                        return;
                    }
                    PumpEnd::PeerClosed => {
                        info!(target: "subscriber", "Live socket closed by server");
                    }
                    PumpEnd::Failed(e) => {
                        warn!(target: "subscriber", error = %e, "Live socket failed");
                    }
                }
            }
            Err(e) => {
                debug!(target: "subscriber", error = %e, "Live socket unavailable");
            }
        }

        missed = true;
        if !sink.emit(SubscriberEvent::Link(LinkState::Closed)).await {
            return;
        }

        let delay = match backoff.next_delay() {
            Some(delay) => delay,
            None => {
                warn!(
                    target: "subscriber",
                    attempts = backoff.attempt(),
                    "Giving up on live socket; polling only"
                );
                sink.emit(SubscriberEvent::Link(LinkState::GaveUp)).await;
                return;
            }
        };

        let attempt = backoff.attempt();
        info!(
            target: "subscriber",
            attempt,
            delay_ms = delay.as_millis() as u64,
            "Reconnecting live socket"
        );
        if !sink
            .emit(SubscriberEvent::Link(LinkState::Reconnecting { attempt }))
            .await
        {
            return;
        }

        tokio::select! {
            _ = stop.notified() => return,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

async fn pump<S: SubscriberSink>(
    conn: &mut dyn LiveConnection,
    stop: &Notify,
    sink: &mut S,
) -> PumpEnd {
    loop {
        let next = tokio::select! {
            _ = stop.notified() => return PumpEnd::Stopped,
            next = conn.next_text() => next,
        };

        match next {
            Some(Ok(text)) => {
                if !sink.emit(SubscriberEvent::Frame(text)).await {
                    return PumpEnd::SinkClosed;
                }
            }
            Some(Err(e)) => return PumpEnd::Failed(e),
            None => return PumpEnd::PeerClosed,
        }
    }
}
