//! Bounded history of recipients already processed, keyed by destination.
use crate::error::LedgerError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Upper bound on persisted entries, across all destinations together.
pub const LEDGER_CAPACITY: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub recipient_id: i64,
    pub destination: String,
    pub display_name: Option<String>,
    pub invited_at: DateTime<Utc>,
}

/// In-memory view of one destination's ledger.
///
/// Holds at most [`LEDGER_CAPACITY`] entries and at most one entry per
/// recipient. When full, the entry with the oldest `invited_at` is evicted
/// (earliest inserted wins ties). The bound across destinations is applied
/// by the [`LedgerStore`] on `save`.
#[derive(Debug, Clone)]
pub struct InvitedLedger {
    destination: String,
    capacity: usize,
    entries: Vec<LedgerEntry>,
    ids: HashSet<i64>,
}

impl InvitedLedger {
    pub fn new(destination: impl Into<String>) -> Self {
        Self::with_capacity(destination, LEDGER_CAPACITY)
    }

    pub fn with_capacity(destination: impl Into<String>, capacity: usize) -> Self {
        Self {
            destination: destination.into(),
            capacity: capacity.max(1),
            entries: Vec::new(),
            ids: HashSet::new(),
        }
    }

    /// Rebuild from persisted rows. Rows for other destinations and duplicates
    /// are dropped; the bound is re-applied.
    pub fn from_entries(destination: impl Into<String>, rows: Vec<LedgerEntry>) -> Self {
        let mut ledger = Self::new(destination);
        for row in rows {
            if row.destination == ledger.destination {
                ledger.insert(row);
            }
        }
        ledger
    }

    pub fn contains(&self, recipient_id: i64) -> bool {
        self.ids.contains(&recipient_id)
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn recipient_ids(&self) -> &HashSet<i64> {
        &self.ids
    }

    /// Record a recipient now. Returns false if it was already present.
    pub fn record(&mut self, recipient_id: i64, display_name: Option<&str>) -> bool {
        self.record_at(recipient_id, display_name, Utc::now())
    }

    pub fn record_at(
        &mut self,
        recipient_id: i64,
        display_name: Option<&str>,
        invited_at: DateTime<Utc>,
    ) -> bool {
        let entry = LedgerEntry {
            recipient_id,
            destination: self.destination.clone(),
            display_name: display_name.map(str::to_owned),
            invited_at,
        };
        self.insert(entry)
    }

    fn insert(&mut self, entry: LedgerEntry) -> bool {
        if !self.ids.insert(entry.recipient_id) {
            return false;
        }
        self.entries.push(entry);
        while self.entries.len() > self.capacity {
            self.evict_oldest();
        }
        true
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .entries
            .iter()
            .enumerate()
            .min_by_key(|(idx, e)| (e.invited_at, *idx))
            .map(|(idx, _)| idx);
        if let Some(idx) = oldest {
            let gone = self.entries.remove(idx);
            self.ids.remove(&gone.recipient_id);
        }
    }
}

/// Persistence contract for ledgers.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn load(&self, destination: &str) -> Result<Vec<LedgerEntry>, LedgerError>;

    /// Atomically replace the destination's rows, then evict the oldest rows
    /// of the whole store until at most [`LEDGER_CAPACITY`] remain.
    async fn save(&self, destination: &str, entries: &[LedgerEntry]) -> Result<(), LedgerError>;

    /// Clear one destination, or every destination when `None`.
    async fn clear(&self, destination: Option<&str>) -> Result<(), LedgerError>;
}

#[derive(Debug, Clone)]
pub struct MemoryLedgerStore {
    rows: Arc<Mutex<Vec<LedgerEntry>>>,
    capacity: usize,
}

impl Default for MemoryLedgerStore {
    fn default() -> Self {
        Self::with_capacity(LEDGER_CAPACITY)
    }
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            rows: Arc::default(),
            capacity: capacity.max(1),
        }
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn load(&self, destination: &str) -> Result<Vec<LedgerEntry>, LedgerError> {
        Ok(self
            .rows
            .lock()
            .await
            .iter()
            .filter(|e| e.destination == destination)
            .cloned()
            .collect())
    }

    async fn save(&self, destination: &str, entries: &[LedgerEntry]) -> Result<(), LedgerError> {
        let mut rows = self.rows.lock().await;
        rows.retain(|e| e.destination != destination);
        rows.extend(entries.iter().map(|e| LedgerEntry {
            destination: destination.to_string(),
            ..e.clone()
        }));
        while rows.len() > self.capacity {
            let oldest = rows
                .iter()
                .enumerate()
                .min_by_key(|(idx, e)| (e.invited_at, *idx))
                .map(|(idx, _)| idx);
            if let Some(idx) = oldest {
                rows.remove(idx);
            }
        }
        Ok(())
    }

    async fn clear(&self, destination: Option<&str>) -> Result<(), LedgerError> {
        let mut rows = self.rows.lock().await;
        match destination {
            Some(d) => rows.retain(|e| e.destination != d),
            None => rows.clear(),
        }
        Ok(())
    }
}

type LockMap = Arc<std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>>;

fn lock_map(map: &LockMap) -> std::sync::MutexGuard<'_, HashMap<String, Arc<Mutex<()>>>> {
    map.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Drop the destination's lock once nobody holds or waits on it.
fn prune(map: &mut HashMap<String, Arc<Mutex<()>>>, destination: &str) {
    if map
        .get(destination)
        .is_some_and(|lock| Arc::strong_count(lock) == 1)
    {
        map.remove(destination);
    }
}

/// One async lock per destination so that two runs against the same
/// destination never interleave their ledger reads and writes.
#[derive(Debug, Default, Clone)]
pub struct DestinationLocks {
    inner: LockMap,
}

/// Held for the duration of a run; releases the destination on drop.
#[derive(Debug)]
pub struct DestinationGuard {
    destination: String,
    locks: LockMap,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for DestinationGuard {
    fn drop(&mut self) {
        let mut map = lock_map(&self.locks);
        drop(self.guard.take());
        prune(&mut map, &self.destination);
    }
}

impl DestinationLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive use of `destination`. Returns `None` if `cancel`
    /// fires first.
    pub async fn acquire(
        &self,
        destination: &str,
        cancel: &CancellationToken,
    ) -> Option<DestinationGuard> {
        let lock = lock_map(&self.inner)
            .entry(destination.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let acquired = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            guard = lock.lock_owned() => Some(guard),
        };
        match acquired {
            Some(guard) => Some(DestinationGuard {
                destination: destination.to_string(),
                locks: self.inner.clone(),
                guard: Some(guard),
            }),
            None => {
                debug!(destination, "gave up waiting for destination lock");
                prune(&mut lock_map(&self.inner), destination);
                None
            }
        }
    }
}
