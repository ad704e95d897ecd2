//! Core types for offense-watch
//!
//! `Offense` mirrors the subset of the QRadar offense JSON the monitor cares
//! about. Field names follow the QRadar API (snake_case) so records decode
//! straight from the wire.

use serde::{Deserialize, Serialize};

/// Lifecycle status of an offense in the event source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OffenseStatus {
    Open,
    Hidden,
    Closed,
    /// Any status this crate does not know about
    #[serde(other)]
    Other,
}

impl OffenseStatus {
    pub fn is_open(&self) -> bool {
        matches!(self, OffenseStatus::Open)
    }
}

impl std::fmt::Display for OffenseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OffenseStatus::Open => write!(f, "OPEN"),
            OffenseStatus::Hidden => write!(f, "HIDDEN"),
            OffenseStatus::Closed => write!(f, "CLOSED"),
            OffenseStatus::Other => write!(f, "OTHER"),
        }
    }
}

/// Immutable snapshot of one offense as returned by the event source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offense {
    /// Offense identifier; assigned in strictly increasing creation order
    pub id: u64,

    /// Offense description, matched against the watch-list
    #[serde(default)]
    pub description: String,

    pub status: OffenseStatus,

    /// Creation time in Unix milliseconds
    #[serde(default)]
    pub start_time: i64,

    #[serde(default)]
    pub magnitude: i64,

    #[serde(default)]
    pub relevance: i64,

    #[serde(default)]
    pub severity: i64,

    #[serde(default)]
    pub credibility: i64,

    #[serde(default)]
    pub source_network: String,
}

impl Offense {
    /// Create an open offense with empty informational fields
    pub fn new(id: u64, description: impl Into<String>, start_time: i64) -> Self {
        Self {
            id,
            description: description.into(),
            status: OffenseStatus::Open,
            start_time,
            magnitude: 0,
            relevance: 0,
            severity: 0,
            credibility: 0,
            source_network: String::new(),
        }
    }

    /// Set the status
    pub fn with_status(mut self, status: OffenseStatus) -> Self {
        self.status = status;
        self
    }
}

/// Which flow produced a notification attempt
///
/// Selects the log target so forward and retry activity can be routed to
/// separate sinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// First notification, from the forward scanner
    Forward,
    /// Re-notification of a failure-queue entry
    Retry,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Forward => "forward",
            Channel::Retry => "retry",
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one forward-scanner cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Records returned by the source
    pub fetched: usize,
    /// Records left after watch-list filtering
    pub matched: usize,
    /// Ids notified successfully, in notification order
    pub notified: Vec<u64>,
    /// Ids pushed onto the failure queue
    pub enqueued: Vec<u64>,
    /// Ids at or below the cursor that were skipped
    pub skipped: Vec<u64>,
    /// Cursor value after the cycle, if one was loaded
    pub cursor: Option<u64>,
}

/// Outcome of one retry-drainer cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Ids loaded from the failure queue
    pub loaded: usize,
    /// Ids re-notified and removed
    pub notified: Vec<u64>,
    /// Ids removed because the offense is gone or no longer open
    pub pruned: Vec<u64>,
    /// Ids dropped after exhausting the configured attempt cap
    pub abandoned: Vec<u64>,
    /// Ids left in the queue for the next cycle
    pub retained: Vec<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offense_decodes_from_qradar_json() {
        let json = serde_json::json!({
            "id": 4711,
            "description": "Malware Detected\n",
            "status": "OPEN",
            "start_time": 1_700_000_000_000_i64,
            "magnitude": 6,
            "relevance": 5,
            "severity": 8,
            "credibility": 3,
            "source_network": "DMZ",
            "offense_type": 0,
            "assigned_to": null
        });
        let offense: Offense = serde_json::from_value(json).unwrap();
        assert_eq!(offense.id, 4711);
        assert_eq!(offense.status, OffenseStatus::Open);
        assert_eq!(offense.severity, 8);
        assert_eq!(offense.source_network, "DMZ");
        assert_eq!(offense.description, "Malware Detected\n");
    }

    #[test]
    fn test_offense_missing_informational_fields_default() {
        let json = serde_json::json!({ "id": 1, "status": "CLOSED" });
        let offense: Offense = serde_json::from_value(json).unwrap();
        assert_eq!(offense.status, OffenseStatus::Closed);
        assert_eq!(offense.magnitude, 0);
        assert!(offense.description.is_empty());
    }

    #[test]
    fn test_unknown_status_maps_to_other() {
        let json = serde_json::json!({ "id": 1, "status": "ARCHIVED" });
        let offense: Offense = serde_json::from_value(json).unwrap();
        assert_eq!(offense.status, OffenseStatus::Other);
        assert!(!offense.status.is_open());
    }

    #[test]
    fn test_channel_display() {
        assert_eq!(Channel::Forward.to_string(), "forward");
        assert_eq!(Channel::Retry.to_string(), "retry");
    }
}
