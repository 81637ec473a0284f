// Live view actor
//
// One task owns the list for a page. Poll results, socket frames, link changes and
// user actions all arrive on one command queue, so they apply one at a time.
// Messages from a poller or subscriber of an earlier date scope carry an old
// generation and are dropped.

use crate::clock::Clock;
use crate::config::LiveConfig;
use crate::event::{AckState, Activity, Anomaly, LiveFrame, Origin};
use crate::live::feed::{AlertFeed, LiveFeed};
use crate::live::list::{Identified, KeyIndex, LiveList};
use crate::live::poller::{spawn_poller, PollSink, PollerHandle};
use crate::live::sink::{AlertSink, Notice};
use crate::live::subscriber::{spawn_subscriber, SubscriberEvent, SubscriberHandle, SubscriberSink};
use crate::live::transport::LiveTransport;
use crate::{Result, VigiError};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Socket state as seen by the page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    /// No socket for this date
    Idle,
    Connecting,
    Open,
    Reconnecting { attempt: u32 },
    Closed,
    /// Reconnect budget spent; the page runs on polling only
    GaveUp,
}

/// What the live/archive indicator shows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiveMode {
    Live,
    Archive,
    /// Today, but no open socket
    Degraded,
}

/// Snapshot published to observers after every change
#[derive(Debug, Clone)]
pub struct ViewState<T> {
    pub date: NaiveDate,
    pub items: Vec<T>,
    pub link: LinkState,
    pub mode: LiveMode,
    /// A fetch for this date is pending and no snapshot has landed yet
    pub loading: bool,
    /// Last successful poll
    pub last_updated: Option<NaiveDateTime>,
    /// Last insert from the socket
    pub last_live_update: Option<NaiveDateTime>,
    /// Generic message of the last failed poll, cleared on success
    pub error: Option<String>,
}

impl<T> ViewState<T> {
    fn new(date: NaiveDate) -> Self {
        Self {
            date,
            items: Vec::new(),
            link: LinkState::Idle,
            mode: LiveMode::Archive,
            loading: true,
            last_updated: None,
            last_live_update: None,
            error: None,
        }
    }

    pub fn is_live(&self) -> bool {
        self.mode == LiveMode::Live
    }
}

/// Counts by origin for activity pages
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OriginCounts {
    pub predicted: usize,
    pub manual: usize,
}

impl ViewState<Activity> {
    pub fn origin_counts(&self) -> OriginCounts {
        self.items
            .iter()
            .fold(OriginCounts::default(), |mut acc, a| {
                match a.origin {
                    Origin::Predicted => acc.predicted += 1,
                    Origin::Manual => acc.manual += 1,
                }
                acc
            })
    }
}

/// Counts by acknowledgement state for alert pages
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AckCounts {
    pub active: usize,
    pub seen: usize,
}

impl ViewState<Anomaly> {
    pub fn ack_counts(&self) -> AckCounts {
        self.items.iter().fold(AckCounts::default(), |mut acc, a| {
            match a.status {
                AckState::Active => acc.active += 1,
                AckState::Seen => acc.seen += 1,
            }
            acc
        })
    }
}

/// Collaborators shared by every live view
#[derive(Clone)]
pub struct LiveContext {
    pub transport: Arc<dyn LiveTransport>,
    pub sink: Arc<dyn AlertSink>,
    pub clock: Arc<dyn Clock>,
    pub config: LiveConfig,
}

enum Command<T> {
    Snapshot { generation: u64, result: Result<Vec<T>> },
    Subscriber { generation: u64, event: SubscriberEvent },
    SetDate(NaiveDate),
    Refresh,
    Modify { id: String, apply: fn(&mut T) },
    Shutdown,
}

/// Handle to a running live view. Dropping it tears the view down.
pub struct LiveView<F: LiveFeed> {
    feed: Arc<F>,
    sink: Arc<dyn AlertSink>,
    tx: mpsc::Sender<Command<F::Item>>,
    state: watch::Receiver<ViewState<F::Item>>,
    task: Option<JoinHandle<()>>,
}

impl<F: LiveFeed> LiveView<F> {
    /// Mount a view on `date`: first poll now, socket too if `date` is today
    pub fn spawn(feed: F, ctx: LiveContext, date: NaiveDate) -> Self {
        let feed = Arc::new(feed);
        let (tx, rx) = mpsc::channel(ctx.config.command_capacity.max(1));
        let (state_tx, state) = watch::channel(ViewState::new(date));
        let sink = Arc::clone(&ctx.sink);

        let actor = ViewActor {
            feed: Arc::clone(&feed),
            ctx,
            tx: tx.downgrade(),
            state_tx,
            list: LiveList::new(),
            announced: KeyIndex::default(),
            date,
            generation: 0,
            link: LinkState::Idle,
            loading: true,
            last_updated: None,
            last_live_update: None,
            error: None,
            poller: None,
            subscriber: None,
            reconcile_on_open: false,
        };
        let task = tokio::spawn(actor.run(rx));

        Self {
            feed,
            sink,
            tx,
            state,
            task: Some(task),
        }
    }

    /// Latest published state
    pub fn state(&self) -> ViewState<F::Item> {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ViewState<F::Item>> {
        self.state.clone()
    }

    /// Re-scope the view to another day
    pub async fn set_date(&self, date: NaiveDate) -> Result<()> {
        self.send(Command::SetDate(date)).await
    }

    /// Manual refresh; also restarts a socket that gave up
    pub async fn refresh(&self) -> Result<()> {
        self.send(Command::Refresh).await
    }

    /// Unmount: stop the timer, close the socket and wait for the actor to exit
    pub async fn shutdown(mut self) -> Result<()> {
        let _ = self.tx.send(Command::Shutdown).await;
        if let Some(task) = self.task.take() {
            task.await
                .map_err(|e| VigiError::Transport(format!("Live view task failed: {}", e)))?;
        }
        Ok(())
    }

    async fn send(&self, cmd: Command<F::Item>) -> Result<()> {
        self.tx.send(cmd).await.map_err(|_| VigiError::ViewClosed)
    }
}

impl LiveView<AlertFeed> {
    /// Mark an alert as seen on the backend, then in the list
    pub async fn acknowledge(&self, id: &str) -> Result<()> {
        match self.feed.acknowledge(id).await {
            Ok(()) => {
                self.send(Command::Modify {
                    id: id.to_string(),
                    apply: |a: &mut Anomaly| a.status = AckState::Seen,
                })
                .await?;
                self.sink.notify(Notice::success("Alert updated"));
                Ok(())
            }
            Err(e) => {
                warn!(target: "live_view", anomaly_id = %id, error = %e, "Acknowledge failed");
                self.sink.notify(Notice::error("Update failed"));
                Err(e)
            }
        }
    }
}

impl<F: LiveFeed> Drop for LiveView<F> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            if self.tx.try_send(Command::Shutdown).is_err() {
                task.abort();
            }
        }
    }
}

// ==============================================================================
// Actor
// ==============================================================================

struct ViewActor<F: LiveFeed> {
    feed: Arc<F>,
    ctx: LiveContext,
    // Weak so that the queue closes once every handle is gone
    tx: mpsc::WeakSender<Command<F::Item>>,
    state_tx: watch::Sender<ViewState<F::Item>>,
    list: LiveList<F::Item>,
    // events whose side effect already ran for this date
    announced: KeyIndex,
    date: NaiveDate,
    generation: u64,
    link: LinkState,
    loading: bool,
    last_updated: Option<NaiveDateTime>,
    last_live_update: Option<NaiveDateTime>,
    error: Option<String>,
    poller: Option<PollerHandle>,
    subscriber: Option<SubscriberHandle>,
    // a restarted socket starts fresh; its first open still needs a poll
    reconcile_on_open: bool,
}

impl<F: LiveFeed> ViewActor<F> {
    async fn run(mut self, mut rx: mpsc::Receiver<Command<F::Item>>) {
        info!(target: "live_view", feed = self.feed.name(), date = %self.date, "Live view mounted");
        self.enter_date(self.date);

        while let Some(cmd) = rx.recv().await {
            match cmd {
                Command::Snapshot { generation, result } => {
                    if self.is_current(generation) {
                        self.apply_snapshot(result);
                    }
                }
                Command::Subscriber { generation, event } => {
                    if self.is_current(generation) {
                        self.apply_subscriber_event(event);
                    }
                }
                Command::SetDate(date) => self.change_date(date),
                Command::Refresh => self.refresh(),
                Command::Modify { id, apply } => {
                    if self.list.modify(&id, apply) {
                        self.publish();
                    } else {
                        debug!(target: "live_view", id = %id, "No entry to update");
                    }
                }
                Command::Shutdown => break,
            }
        }

        self.teardown();
        info!(target: "live_view", feed = self.feed.name(), "Live view unmounted");
    }

    fn is_current(&self, generation: u64) -> bool {
        if generation != self.generation {
            debug!(
                target: "live_view",
                feed = self.feed.name(),
                stale = generation,
                current = self.generation,
                "Dropping message from previous date scope"
            );
            return false;
        }
        true
    }

    fn is_today(&self) -> bool {
        self.ctx.clock.today() == self.date
    }

    fn mode(&self) -> LiveMode {
        if !self.is_today() {
            LiveMode::Archive
        } else if self.link == LinkState::Open {
            LiveMode::Live
        } else {
            LiveMode::Degraded
        }
    }

    /// Start a fresh scope: empty list, new poller, socket only for today
    fn enter_date(&mut self, date: NaiveDate) {
        self.teardown();
        self.generation += 1;
        self.date = date;
        self.list.clear();
        self.announced.clear();
        self.loading = true;
        self.last_updated = None;
        self.last_live_update = None;
        self.error = None;
        self.link = LinkState::Idle;
        self.reconcile_on_open = false;

        self.spawn_poller();
        if self.is_today() {
            self.spawn_subscriber();
        }
        info!(
            target: "live_view",
            feed = self.feed.name(),
            date = %date,
            live = self.subscriber.is_some(),
            "Date scope started"
        );
        self.publish();
    }

    fn change_date(&mut self, date: NaiveDate) {
        if date == self.date {
            self.refresh();
        } else {
            self.enter_date(date);
        }
    }

    fn refresh(&mut self) {
        if let Some(poller) = &self.poller {
            poller.refresh();
        }
        // A socket that gave up or ended gets another chance on manual refresh
        let socket_done = self.link == LinkState::GaveUp
            || self
                .subscriber
                .as_ref()
                .map(|s| s.is_finished())
                .unwrap_or(true);
        if socket_done && self.is_today() {
            self.reconcile_on_open = true;
            self.spawn_subscriber();
            self.publish();
        }
    }

    fn spawn_poller(&mut self) {
        let feed = Arc::clone(&self.feed);
        let date = self.date;
        let sink = ViewChannel {
            tx: self.tx.clone(),
            generation: self.generation,
        };
        self.poller = Some(spawn_poller(
            self.feed.name(),
            self.ctx.config.poll_interval(),
            move || {
                let feed = Arc::clone(&feed);
                async move { feed.fetch(date).await }
            },
            sink,
        ));
    }

    fn spawn_subscriber(&mut self) {
        let sink = ViewChannel {
            tx: self.tx.clone(),
            generation: self.generation,
        };
        self.subscriber = Some(spawn_subscriber(
            Arc::clone(&self.ctx.transport),
            Arc::clone(&self.ctx.clock),
            self.date,
            self.ctx.config.reconnect.clone(),
            sink,
        ));
    }

    fn apply_snapshot(&mut self, result: Result<Vec<F::Item>>) {
        self.loading = false;
        match result {
            Ok(items) => {
                let outcome = self.list.replace(items);
                self.last_updated = Some(self.ctx.clock.now());
                self.error = None;
                debug!(
                    target: "live_view",
                    feed = self.feed.name(),
                    kept = outcome.kept,
                    collapsed = outcome.collapsed,
                    "Snapshot applied"
                );
            }
            Err(e) => {
                warn!(target: "live_view", feed = self.feed.name(), error = %e, "Poll failed");
                let message = e.user_message();
                self.error = Some(message.to_string());
                self.ctx.sink.notify(Notice::error(message));
            }
        }
        self.publish();
    }

    fn apply_subscriber_event(&mut self, event: SubscriberEvent) {
        match event {
            SubscriberEvent::Frame(text) => self.apply_frame(&text),
            SubscriberEvent::Reconnected => {
                info!(target: "live_view", feed = self.feed.name(), "Socket back; reconciling");
                if let Some(poller) = &self.poller {
                    poller.refresh();
                }
            }
            SubscriberEvent::Link(link) => {
                if link == self.link {
                    return;
                }
                let previous = std::mem::replace(&mut self.link, link);
                let mode = self.mode();
                self.ctx.sink.link_changed(link, mode);
                if previous == LinkState::Open && link == LinkState::Closed {
                    self.ctx
                        .sink
                        .notify(Notice::info("Live connection lost; reconnecting"));
                }
                if link == LinkState::Open && self.reconcile_on_open {
                    self.reconcile_on_open = false;
                    if let Some(poller) = &self.poller {
                        poller.refresh();
                    }
                }
                if link == LinkState::GaveUp {
                    self.ctx
                        .sink
                        .notify(Notice::error("Live updates unavailable; refreshing periodically"));
                }
                self.publish();
            }
        }
    }

    fn apply_frame(&mut self, text: &str) {
        let frame = match LiveFrame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(target: "live_view", feed = self.feed.name(), error = %e, "Discarding malformed frame");
                return;
            }
        };

        let now = self.ctx.clock.now();
        let item = match self.feed.accept(&frame, now) {
            Ok(Some(item)) => item,
            Ok(None) => return,
            Err(e) => {
                warn!(target: "live_view", feed = self.feed.name(), error = %e, "Discarding malformed frame");
                return;
            }
        };

        if item.occurred_at().date() != self.date {
            debug!(target: "live_view", feed = self.feed.name(), "Frame outside the view date");
            return;
        }

        let key = item.key();
        if !self.list.insert(item.clone()) {
            debug!(target: "live_view", feed = self.feed.name(), key = ?key, "Already listed");
            return;
        }
        self.last_live_update = Some(now);

        if !self.announced.contains(&key) {
            self.announced.insert(key);
            self.feed.on_live_insert(&item, self.ctx.sink.as_ref());
        }
        self.publish();
    }

    fn publish(&self) {
        let state = ViewState {
            date: self.date,
            items: self.list.items().to_vec(),
            link: self.link,
            mode: self.mode(),
            loading: self.loading,
            last_updated: self.last_updated,
            last_live_update: self.last_live_update,
            error: self.error.clone(),
        };
        self.state_tx.send_replace(state);
    }

    /// Cancel the timer and close the socket of the current scope
    fn teardown(&mut self) {
        if let Some(poller) = self.poller.take() {
            poller.stop();
        }
        if let Some(subscriber) = self.subscriber.take() {
            subscriber.stop();
        }
    }
}

/// Queue endpoint handed to a poller or subscriber of one scope
struct ViewChannel<T> {
    tx: mpsc::WeakSender<Command<T>>,
    generation: u64,
}

impl<T: Send + 'static> ViewChannel<T> {
    async fn send(&self, cmd: Command<T>) -> bool {
        match self.tx.upgrade() {
            Some(tx) => tx.send(cmd).await.is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl<T: Send + 'static> PollSink<Vec<T>> for ViewChannel<T> {
    async fn deliver(&mut self, result: Result<Vec<T>>) -> bool {
        let generation = self.generation;
        self.send(Command::Snapshot { generation, result }).await
    }
}

#[async_trait]
impl<T: Send + 'static> SubscriberSink for ViewChannel<T> {
    async fn emit(&mut self, event: SubscriberEvent) -> bool {
        let generation = self.generation;
        self.send(Command::Subscriber { generation, event }).await
    }
}
