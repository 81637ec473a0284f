// Activity and anomaly events
//
// REST records and pushed socket frames are both normalized into `Activity` / `Anomaly`.
// Every event carries an `EventKey` used for dedup across the two sources.

use crate::{Result, VigiError};
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

/// Category value the prediction engine reserves for ordinary activities
pub const NORMAL_CATEGORY: &str = "normal";

/// Whether an event was system-inferred or user-entered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Origin {
    #[serde(rename = "predicted", alias = "PREDICTED", alias = "Predicted")]
    Predicted,
    #[serde(rename = "manual", alias = "MANUAL", alias = "Manual")]
    Manual,
}

impl Origin {
    fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "predicted" => Some(Origin::Predicted),
            "manual" => Some(Origin::Manual),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Priority {
    #[serde(rename = "high", alias = "High", alias = "HIGH")]
    High,
    #[serde(rename = "medium", alias = "Medium", alias = "MEDIUM")]
    Medium,
    #[serde(rename = "low", alias = "Low", alias = "LOW")]
    Low,
}

impl Priority {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "high" => Some(Priority::High),
            "medium" => Some(Priority::Medium),
            "low" => Some(Priority::Low),
            _ => None,
        }
    }
}

/// Acknowledgement state of an anomaly
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AckState {
    Active,
    Seen,
}

/// `(timestamp, label)` identity, truncated to the minute.
///
/// REST records only carry `HH:mm`, pushed frames carry seconds; truncating both
/// sides lets the two representations of one event meet. The cost: two distinct
/// id-less events with the same label in the same minute collapse into one entry
/// until a poll brings them back under their server ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NaturalKey {
    pub at: NaiveDateTime,
    pub label: String,
}

impl NaturalKey {
    pub fn new(at: NaiveDateTime, label: &str) -> Self {
        Self {
            at: truncate_to_minute(at),
            label: label.to_string(),
        }
    }
}

/// Identity of an event across poll and push sources
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventKey {
    /// Server-issued id, when the source provides one
    pub id: Option<String>,
    pub natural: NaturalKey,
}

impl EventKey {
    /// Two keys name the same event when their server ids match, or, if either
    /// side lacks an id, when their natural keys match.
    pub fn same_event(&self, other: &EventKey) -> bool {
        match (&self.id, &other.id) {
            (Some(a), Some(b)) => a == b,
            _ => self.natural == other.natural,
        }
    }
}

/// A normal activity (sleep, meal, shower...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub id: Option<String>,
    pub at: NaiveDateTime,
    pub category: String,
    pub origin: Origin,
    /// Inserted by the live subscriber rather than a poll
    #[serde(default)]
    pub live: bool,
}

impl Activity {
    pub fn key(&self) -> EventKey {
        EventKey {
            id: self.id.clone(),
            natural: NaturalKey::new(self.at, &self.category),
        }
    }
}

/// An abnormal activity raised by the prediction engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub id: Option<String>,
    pub at: NaiveDateTime,
    pub activity_name: String,
    pub priority: Priority,
    pub status: AckState,
    #[serde(default)]
    pub live: bool,
}

impl Anomaly {
    pub fn key(&self) -> EventKey {
        EventKey {
            id: self.id.clone(),
            natural: NaturalKey::new(self.at, &self.activity_name),
        }
    }

    pub fn is_high(&self) -> bool {
        self.priority == Priority::High
    }
}

// ==============================================================================
// REST records
// ==============================================================================

/// Activity row as returned by `/activities/manual`, `/activities/predicted`
/// and `/activities/by-date`
#[derive(Debug, Clone, Deserialize)]
pub struct ActivityRecord {
    pub id: String,
    /// "HH:mm"
    pub time: String,
    /// Datetime of the activity day; only the date part is meaningful
    pub date: String,
    pub category: String,
    #[serde(default)]
    pub source: Option<String>,
}

impl ActivityRecord {
    /// `fallback` applies when the record has no source column
    pub fn into_activity(self, fallback: Origin) -> Result<Activity> {
        let at = combine(&self.date, &self.time)?;
        let origin = self
            .source
            .as_deref()
            .and_then(Origin::parse)
            .unwrap_or(fallback);
        Ok(Activity {
            id: Some(self.id),
            at,
            category: self.category,
            origin,
            live: false,
        })
    }
}

/// Row of the `anomalies` table as returned by `/anomalies/today`
#[derive(Debug, Clone, Deserialize)]
pub struct AnomalyRecord {
    pub id: String,
    pub activity_name: String,
    pub time: String,
    pub date: String,
    pub priority: String,
    pub status: AckState,
}

impl AnomalyRecord {
    pub fn into_anomaly(self) -> Result<Anomaly> {
        let at = combine(&self.date, &self.time)?;
        let priority = Priority::parse(&self.priority).ok_or_else(|| {
            VigiError::Decode(format!("Unknown anomaly priority: {}", self.priority))
        })?;
        Ok(Anomaly {
            id: Some(self.id),
            at,
            activity_name: self.activity_name,
            priority,
            status: self.status,
            live: false,
        })
    }
}

// ==============================================================================
// Socket frames
// ==============================================================================

/// Kind of a pushed frame after classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Activity,
    Anomaly,
}

/// JSON frame pushed on `/monitoring/ws`
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LiveFrame {
    pub category: String,
    pub activity: String,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    /// Explicit anomaly marker; overrides the category convention
    #[serde(default)]
    pub anomaly: Option<bool>,
}

impl LiveFrame {
    pub fn parse(text: &str) -> Result<Self> {
        let frame: LiveFrame = serde_json::from_str(text)?;
        if frame.activity.trim().is_empty() {
            return Err(VigiError::Decode("Frame without activity".to_string()));
        }
        Ok(frame)
    }

    pub fn kind(&self) -> FrameKind {
        if self.anomaly == Some(true) || self.category != NORMAL_CATEGORY {
            FrameKind::Anomaly
        } else {
            FrameKind::Activity
        }
    }

    /// Server timestamp of the frame, or `received_at` when the frame has none
    pub fn occurred_at(&self, received_at: NaiveDateTime) -> Result<NaiveDateTime> {
        match self.timestamp.as_deref() {
            Some(raw) => parse_timestamp(raw),
            None => Ok(received_at),
        }
    }

    pub fn origin(&self) -> Origin {
        self.source
            .as_deref()
            .and_then(Origin::parse)
            .unwrap_or(Origin::Predicted)
    }

    pub fn to_activity(&self, received_at: NaiveDateTime) -> Result<Activity> {
        Ok(Activity {
            id: self.id.clone(),
            at: self.occurred_at(received_at)?,
            category: self.activity.clone(),
            origin: self.origin(),
            live: true,
        })
    }

    /// Missing or unknown priority maps to medium
    pub fn to_anomaly(&self, received_at: NaiveDateTime) -> Result<Anomaly> {
        Ok(Anomaly {
            id: self.id.clone(),
            at: self.occurred_at(received_at)?,
            activity_name: self.activity.clone(),
            priority: self
                .priority
                .as_deref()
                .and_then(Priority::parse)
                .unwrap_or(Priority::Medium),
            status: AckState::Active,
            live: true,
        })
    }
}

// ==============================================================================
// Time helpers
// ==============================================================================

pub fn truncate_to_minute(at: NaiveDateTime) -> NaiveDateTime {
    at.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(at)
}

/// Parse a `YYYY-MM-DD` date, or the date part of a longer datetime string
pub fn parse_day(raw: &str) -> Result<NaiveDate> {
    let head = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(head, "%Y-%m-%d")
        .map_err(|e| VigiError::Decode(format!("Invalid date '{}': {}", raw, e)))
}

fn parse_clock(raw: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .map_err(|e| VigiError::Decode(format!("Invalid time '{}': {}", raw, e)))
}

fn combine(date: &str, time: &str) -> Result<NaiveDateTime> {
    Ok(parse_day(date)?.and_time(parse_clock(time)?))
}

/// Accepts `YYYY-MM-DD HH:MM:SS`, ISO 8601 without offset, and RFC 3339
/// (converted to local time).
pub fn parse_timestamp(raw: &str) -> Result<NaiveDateTime> {
    if let Ok(ts) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Ok(ts);
    }
    if let Ok(ts) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(ts);
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Local).naive_local())
        .map_err(|e| VigiError::Decode(format!("Invalid timestamp '{}': {}", raw, e)))
}
