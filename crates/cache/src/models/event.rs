//! Cached calendar event model

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a calendar event
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub String);

impl EventId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EventId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Event status as reported by the remote calendar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Confirmed,
    Tentative,
    Cancelled,
}

/// A cached calendar event, scoped to (calendar id, id)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedEvent {
    pub id: EventId,
    /// Owning calendar
    pub calendar_id: String,
    pub title: String,
    pub description: String,
    pub location: String,
    /// Start instant; for all-day events this is midnight of the start date
    pub start: DateTime<Utc>,
    /// End instant; for all-day events only meaningful when an explicit end
    /// date was given
    pub end: DateTime<Utc>,
    pub is_all_day: bool,
    pub status: EventStatus,
    /// Whether the event blocks time on its owner's schedule
    pub is_busy: bool,
    /// Participant addresses
    pub participants: Vec<String>,
    /// When this record was last written into the cache
    pub cached_at: DateTime<Utc>,
}

impl CachedEvent {
    /// Effective busy interval as a half-open [start, end) pair.
    ///
    /// Timed events use their instants as given. All-day events span 24 hours
    /// from the start date's midnight, unless an explicit later end was
    /// given, in which case the end date's midnight closes the interval.
    pub fn effective_interval(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        if !self.is_all_day {
            return (self.start, self.end);
        }

        let start = midnight_of(self.start);
        let end_midnight = midnight_of(self.end);
        let end = if end_midnight > start {
            end_midnight
        } else {
            start + Duration::hours(24)
        };
        (start, end)
    }
}

fn midnight_of(instant: DateTime<Utc>) -> DateTime<Utc> {
    instant
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .expect("midnight is always a valid time")
        .and_utc()
}
