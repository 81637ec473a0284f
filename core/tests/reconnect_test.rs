// Live socket lifecycle tests
// Reconnect with backoff, reconciliation after reconnect, degraded mode.

mod common;

use async_trait::async_trait;
use common::*;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};
use vigihome_core::clock::FixedClock;
use vigihome_core::config::ReconnectConfig;
use vigihome_core::event::Origin;
use vigihome_core::live::{
    spawn_subscriber, ActivityFeed, LinkState, LiveMode, LiveView, NoticeLevel, SubscriberEvent,
    SubscriberSink,
};

struct ChannelSink(mpsc::UnboundedSender<SubscriberEvent>);

#[async_trait]
impl SubscriberSink for ChannelSink {
    async fn emit(&mut self, event: SubscriberEvent) -> bool {
        self.0.send(event).is_ok()
    }
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<SubscriberEvent>) -> SubscriberEvent {
    timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for subscriber event")
        .expect("subscriber ended")
}

#[tokio::test]
async fn test_reconnect_triggers_reconciliation_poll() {
    let transport = FakeTransport::new();
    let source = FakeSource::new();
    let sink = RecordingSink::new();
    let ctx = context(transport.clone(), sink.clone(), test_config());

    let view = LiveView::spawn(ActivityFeed::new(source.clone()), ctx, today());
    let mut rx = view.subscribe();
    wait_state(&mut rx, |s| s.link == LinkState::Open && !s.loading).await;
    let fetches = source.fetches();

    // Persisted while the socket is down; never pushed
    source.set_activities(vec![activity(
        Some("m1"),
        at(today(), "10:20:00"),
        "Repas",
        Origin::Manual,
    )]);
    transport.drop_connection();

    let state = wait_state(&mut rx, |s| {
        s.link == LinkState::Open && s.items.iter().any(|a| a.id.as_deref() == Some("m1"))
    })
    .await;
    assert_eq!(state.mode, LiveMode::Live);
    assert_eq!(transport.connects(), 2);
    assert!(source.fetches() > fetches);
    assert!(sink
        .links()
        .iter()
        .any(|(link, mode)| matches!(link, LinkState::Reconnecting { .. }) && *mode == LiveMode::Degraded));
    assert!(sink.has_notice(NoticeLevel::Info, "Live connection lost"));

    view.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_gives_up_and_degrades_to_polling() {
    let transport = FakeTransport::new();
    transport.set_failing(true);
    let source = FakeSource::new();
    let sink = RecordingSink::new();
    let mut config = test_config();
    config.reconnect.max_attempts = Some(2);
    let ctx = context(transport.clone(), sink.clone(), config);

    let view = LiveView::spawn(ActivityFeed::new(source.clone()), ctx, today());
    let mut rx = view.subscribe();
    let state = wait_state(&mut rx, |s| s.link == LinkState::GaveUp).await;

    assert_eq!(state.mode, LiveMode::Degraded);
    assert!(!state.is_live());
    // First attempt plus two retries
    assert_eq!(transport.attempts(), 3);
    assert!(sink.has_notice(NoticeLevel::Error, "Live updates unavailable"));

    // Manual refresh gives the socket another chance
    transport.set_failing(false);
    view.refresh().await.unwrap();
    let state = wait_state(&mut rx, |s| s.link == LinkState::Open).await;
    assert_eq!(state.mode, LiveMode::Live);

    view.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_subscriber_reports_lifecycle() {
    let transport = FakeTransport::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = spawn_subscriber(
        transport.clone(),
        clock(),
        today(),
        ReconnectConfig {
            base_ms: 5,
            max_ms: 5,
            max_attempts: None,
        },
        ChannelSink(tx),
    );

    assert_eq!(next_event(&mut rx).await, SubscriberEvent::Link(LinkState::Connecting));
    assert_eq!(next_event(&mut rx).await, SubscriberEvent::Link(LinkState::Open));

    transport.push("hello");
    assert_eq!(next_event(&mut rx).await, SubscriberEvent::Frame("hello".to_string()));

    transport.drop_connection();
    assert_eq!(next_event(&mut rx).await, SubscriberEvent::Link(LinkState::Closed));
    assert_eq!(
        next_event(&mut rx).await,
        SubscriberEvent::Link(LinkState::Reconnecting { attempt: 1 })
    );
    assert_eq!(next_event(&mut rx).await, SubscriberEvent::Link(LinkState::Open));
    assert_eq!(next_event(&mut rx).await, SubscriberEvent::Reconnected);

    handle.stop();
    eventually(|| handle.is_finished()).await;
    assert_eq!(transport.open_connections(), 0);
}

#[tokio::test]
async fn test_subscriber_stays_idle_once_the_day_is_over() {
    let transport = FakeTransport::new();
    // Clock already on the next day
    let clock = Arc::new(FixedClock(at(today().succ_opt().unwrap(), "00:01:00")));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = spawn_subscriber(
        transport.clone(),
        clock,
        today(),
        ReconnectConfig::default(),
        ChannelSink(tx),
    );

    assert_eq!(next_event(&mut rx).await, SubscriberEvent::Link(LinkState::Connecting));
    assert_eq!(next_event(&mut rx).await, SubscriberEvent::Link(LinkState::Idle));
    eventually(|| handle.is_finished()).await;
    assert_eq!(transport.attempts(), 0);
}

#[tokio::test]
async fn test_first_open_after_failed_attempts_reconciles() {
    let transport = FakeTransport::new();
    transport.set_failing(true);
    let source = FakeSource::new();
    let sink = RecordingSink::new();
    let mut config = test_config();
    config.reconnect.max_attempts = None;
    let ctx = context(transport.clone(), sink.clone(), config);

    let view = LiveView::spawn(ActivityFeed::new(source.clone()), ctx, today());
    let mut rx = view.subscribe();
    wait_state(&mut rx, |s| !s.loading).await;
    eventually(|| transport.attempts() >= 2).await;

    // Persisted during the backoff window; never pushed
    source.set_activities(vec![activity(
        Some("m1"),
        at(today(), "10:20:00"),
        "Repas",
        Origin::Manual,
    )]);
    transport.set_failing(false);

    let state = wait_state(&mut rx, |s| {
        s.link == LinkState::Open && s.items.iter().any(|a| a.id.as_deref() == Some("m1"))
    })
    .await;
    assert_eq!(state.mode, LiveMode::Live);
    assert_eq!(transport.connects(), 1);

    view.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_restart_after_giving_up_reconciles_on_open() {
    let transport = FakeTransport::new();
    transport.set_failing(true);
    let source = FakeSource::new();
    let sink = RecordingSink::new();
    let mut config = test_config();
    config.reconnect.max_attempts = Some(1);
    let ctx = context(transport.clone(), sink.clone(), config);

    let view = LiveView::spawn(ActivityFeed::new(source.clone()), ctx, today());
    let mut rx = view.subscribe();
    wait_state(&mut rx, |s| s.link == LinkState::GaveUp && !s.loading).await;
    let fetches = source.fetches();

    transport.set_failing(false);
    view.refresh().await.unwrap();
    wait_state(&mut rx, |s| s.link == LinkState::Open).await;

    // One poll for the refresh itself, one once the socket is back
    eventually(|| source.fetches() >= fetches + 2).await;

    view.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_open_after_failed_attempt_reports_reconnected() {
    let transport = FakeTransport::new();
    transport.set_failing(true);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = spawn_subscriber(
        transport.clone(),
        clock(),
        today(),
        ReconnectConfig {
            base_ms: 5,
            max_ms: 5,
            max_attempts: None,
        },
        ChannelSink(tx),
    );

    assert_eq!(next_event(&mut rx).await, SubscriberEvent::Link(LinkState::Connecting));
    assert_eq!(next_event(&mut rx).await, SubscriberEvent::Link(LinkState::Closed));
    assert_eq!(
        next_event(&mut rx).await,
        SubscriberEvent::Link(LinkState::Reconnecting { attempt: 1 })
    );

    transport.set_failing(false);
    loop {
        match next_event(&mut rx).await {
            SubscriberEvent::Link(LinkState::Open) => break,
            SubscriberEvent::Link(_) => continue,
            other => panic!("unexpected event {:?}", other),
        }
    }
    assert_eq!(next_event(&mut rx).await, SubscriberEvent::Reconnected);

    handle.stop();
    eventually(|| handle.is_finished()).await;
}
