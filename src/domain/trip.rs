//! Completed-trip records kept in navigation history

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Generate a new UUIDv7 (time-sortable)
pub fn new_uuid_v7() -> String {
    Uuid::now_v7().to_string()
}

/// Get current epoch milliseconds
#[inline]
pub fn epoch_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// How a trip ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripStatus {
    Completed,
}

impl TripStatus {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            TripStatus::Completed => "completed",
        }
    }
}

/// One line of navigation history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// UUIDv7 entry ID
    pub id: String,
    pub start_label: String,
    pub end_label: String,
    pub route_name: String,
    pub status: TripStatus,
    pub recorded_at: DateTime<Utc>,
}

impl HistoryEntry {
    /// Create a history entry stamped with the current time.
    ///
    /// # Example
    ///
    /// ```
    /// use campus_wayfinder::domain::trip::{HistoryEntry, TripStatus};
    ///
    /// let entry = HistoryEntry::new("Current position", "Library", "Main to Library", TripStatus::Completed);
    /// assert_eq!(entry.end_label, "Library");
    /// assert_eq!(entry.status.as_str(), "completed");
    /// ```
    pub fn new(start_label: &str, end_label: &str, route_name: &str, status: TripStatus) -> Self {
        Self {
            id: new_uuid_v7(),
            start_label: start_label.to_string(),
            end_label: end_label.to_string(),
            route_name: route_name.to_string(),
            status,
            recorded_at: Utc::now(),
        }
    }

    /// Serialize to a single JSON line
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}
