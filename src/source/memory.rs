//! In-memory offense source for tests and dry runs
//!
//! Applies the same filter the QRadar query does, and can be scripted to fail
//! or to return a fixed page (to simulate stale or out-of-order data).

use super::OffenseSource;
use crate::error::{Result, WatchError};
use crate::types::Offense;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;

pub struct MemorySource {
    offenses: RwLock<BTreeMap<u64, Offense>>,
    scripted_pages: RwLock<VecDeque<Vec<Offense>>>,
    page_size: usize,
    failing: AtomicBool,
    since_calls: AtomicUsize,
    by_id_calls: AtomicUsize,
}

impl Default for MemorySource {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_PAGE_SIZE)
    }
}

impl MemorySource {
    pub fn new(page_size: usize) -> Self {
        Self {
            offenses: RwLock::new(BTreeMap::new()),
            scripted_pages: RwLock::new(VecDeque::new()),
            page_size,
            failing: AtomicBool::new(false),
            since_calls: AtomicUsize::new(0),
            by_id_calls: AtomicUsize::new(0),
        }
    }

    /// Insert or replace an offense
    pub async fn upsert(&self, offense: Offense) {
        self.offenses.write().await.insert(offense.id, offense);
    }

    /// Delete an offense so lookups return not-found
    pub async fn delete(&self, id: u64) {
        self.offenses.write().await.remove(&id);
    }

    /// Return `page` verbatim from the next `fetch_since`, bypassing filters
    pub async fn script_page(&self, page: Vec<Offense>) {
        self.scripted_pages.write().await.push_back(page);
    }

    /// Make every call fail with a fetch error
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn fetch_since_calls(&self) -> usize {
        self.since_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_by_id_calls(&self) -> usize {
        self.by_id_calls.load(Ordering::SeqCst)
    }

    fn check_failing(&self, operation: &str) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(WatchError::fetch(operation, "memory source set to fail"));
        }
        Ok(())
    }
}

#[async_trait]
impl OffenseSource for MemorySource {
    async fn fetch_since(&self, cursor: u64, cutoff: DateTime<Utc>) -> Result<Vec<Offense>> {
        self.since_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failing("fetch_since")?;

        if let Some(page) = self.scripted_pages.write().await.pop_front() {
            return Ok(page);
        }

        let cutoff_millis = cutoff.timestamp_millis();
        let offenses = self.offenses.read().await;
        let mut page: Vec<Offense> = offenses
            .values()
            .filter(|o| o.status.is_open() && o.id > cursor && o.start_time <= cutoff_millis)
            .cloned()
            .collect();
        page.sort_by_key(|o| o.start_time);
        page.truncate(self.page_size);
        Ok(page)
    }

    async fn fetch_by_id(&self, id: u64) -> Result<Option<Offense>> {
        self.by_id_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failing("fetch_by_id")?;
        Ok(self.offenses.read().await.get(&id).cloned())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
