// VigiHome Core Library
// Live activity/alert feeds for the home-monitoring front-end

pub mod api;
pub mod clock;
pub mod config;
pub mod event;
pub mod live;
pub mod session;
pub mod summary;
pub mod telemetry;

// Export core types
pub use api::{ApiClient, BackendSource, EventSource};
pub use clock::{Clock, SystemClock};
pub use config::LiveConfig;
pub use event::{AckState, Activity, Anomaly, EventKey, LiveFrame, Origin, Priority};
pub use live::{
    ActivityFeed, AlertFeed, AlertSink, LinkState, LiveFeed, LiveList, LiveMode, LiveView,
    Notice, TimelineFeed, ViewState,
};
pub use session::{Role, Session};
pub use summary::{HealthStatusEntry, Mood, RealtimeMonitoring, SummaryState, SummaryWatcher};
pub use telemetry::init_tracing;

// Error types
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VigiError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("HTTP status {status}: {context}")]
    Status { status: u16, context: String },

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Socket error: {0}")]
    Socket(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("View closed")]
    ViewClosed,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl VigiError {
    /// Text shown in notifications. Kinds are not distinguished at the UI layer.
    pub fn user_message(&self) -> &'static str {
        match self {
            VigiError::Session(_) => "Session expired",
            _ => "Loading error",
        }
    }
}

pub type Result<T> = std::result::Result<T, VigiError>;
