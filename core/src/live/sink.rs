// Side-effect hooks for live views
//
// Sound, toasts and the live/archive indicator live behind one trait so the
// ingestion core stays headless.

use crate::event::Anomaly;
use crate::live::view::{LinkState, LiveMode};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Success,
    Error,
}

/// Transient, non-blocking notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

pub trait AlertSink: Send + Sync {
    /// Audible/visual alarm for a high-priority anomaly; fired once per event
    fn alarm(&self, anomaly: &Anomaly);

    fn notify(&self, notice: Notice);

    fn link_changed(&self, _link: LinkState, _mode: LiveMode) {}
}
