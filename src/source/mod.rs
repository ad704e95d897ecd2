//! Offense source trait: the event-source query seam
//!
//! The scanner and drainer only see `OffenseSource`; the QRadar REST client
//! and the in-memory source used by tests both implement it. Sources never
//! retry internally: a failed call surfaces as `WatchError::Fetch` and the
//! calling loop decides what happens next.

use crate::error::Result;
use crate::types::Offense;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub mod memory;
pub mod qradar;

/// Query interface over the monitored event source
#[async_trait]
pub trait OffenseSource: Send + Sync {
    /// Open offenses with `id > cursor` created at or before `cutoff`,
    /// ascending by start time, at most one page.
    async fn fetch_since(&self, cursor: u64, cutoff: DateTime<Utc>) -> Result<Vec<Offense>>;

    /// Current state of one offense, `None` if it no longer exists
    async fn fetch_by_id(&self, id: u64) -> Result<Option<Offense>>;

    /// Source name for logs (e.g. "qradar", "memory")
    fn name(&self) -> &str;
}
