// Live feeds - polled snapshots reconciled with pushed socket events
//
// Every live page (caregiver activities, caregiver alerts, dependent timeline) is a
// `LiveView` over a `LiveFeed`.

mod backoff;
mod feed;
mod list;
mod poller;
mod sink;
mod subscriber;
mod transport;
mod view;

pub use backoff::ReconnectBackoff;
pub use feed::{ActivityFeed, AlertFeed, LiveFeed, TimelineFeed};
pub use list::{Identified, KeyIndex, LiveList, ReplaceOutcome};
pub use poller::{spawn_poller, PollSink, PollerHandle};
pub use sink::{AlertSink, Notice, NoticeLevel};
pub use subscriber::{spawn_subscriber, SubscriberEvent, SubscriberHandle, SubscriberSink};
pub use transport::{LiveConnection, LiveTransport, WsTransport};
pub use view::{
    AckCounts, LinkState, LiveContext, LiveMode, LiveView, OriginCounts, ViewState,
};
