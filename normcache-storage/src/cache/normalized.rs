//! The normalized record store.
//!
//! Records live in one flat map keyed by [`CacheKey`]. Writes are
//! serialized behind a single writer lock and applied as one transaction:
//! the merged records are computed against the current snapshot, swapped in
//! under a brief exclusive lock, and the set of changed keys is published
//! while the writer lock is still held. Publication order therefore matches
//! commit order, and a reader never observes half of a transaction.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, RwLock, RwLockReadGuard};

use normcache_core::{
    CacheError, CacheKey, ChangedKeySet, Record, RecordBatch, StoreConfig, StoreError, Watermark,
};
use tokio::sync::broadcast;
use tracing::{debug, trace};

use super::stats::{CacheStats, StatsCounters};

/// Flat key to record map, the shape every read runs against.
pub type RecordMap = HashMap<CacheKey, Record>;

#[derive(Debug, Default)]
struct StoreState {
    records: RecordMap,
    watermark: Watermark,
}

/// Thread-safe normalized record store with change publication.
#[derive(Debug)]
pub struct NormalizedStore {
    state: RwLock<StoreState>,
    /// Serializes write transactions, including their publication.
    writer: Mutex<()>,
    changes: broadcast::Sender<ChangedKeySet>,
    stats: StatsCounters,
}

impl NormalizedStore {
    /// Create an empty store whose change channel buffers
    /// `config.change_channel_capacity` publications per subscriber.
    pub fn new(config: &StoreConfig) -> Self {
        let (changes, _) = broadcast::channel(config.change_channel_capacity.max(1));
        Self {
            state: RwLock::new(StoreState::default()),
            writer: Mutex::new(()),
            changes,
            stats: StatsCounters::default(),
        }
    }

    fn read_state(&self) -> Result<RwLockReadGuard<'_, StoreState>, CacheError> {
        self.state.read().map_err(|_| CacheError::LockPoisoned)
    }

    /// Merge a batch of records into the store as one transaction.
    ///
    /// Fields present in an incoming record overwrite the stored ones, new
    /// fields are added and fields the batch does not mention are retained.
    /// A transaction that changes nothing keeps the current watermark and
    /// publishes nothing. With `publish` false the change set is computed
    /// and returned but not broadcast.
    pub fn merge_write(&self, batch: RecordBatch, publish: bool) -> Result<ChangedKeySet, StoreError> {
        let _writer = self.writer.lock().map_err(|_| StoreError::LockPoisoned)?;

        let (staged, watermark) = {
            let state = self.state.read().map_err(|_| StoreError::LockPoisoned)?;
            let staged: Vec<Record> = batch
                .into_iter()
                .filter_map(|incoming| match state.records.get(incoming.key()) {
                    Some(existing) => {
                        let mut merged = existing.clone();
                        if merged.merge(incoming).is_empty() {
                            None
                        } else {
                            Some(merged)
                        }
                    }
                    None => Some(incoming),
                })
                .collect();
            (staged, state.watermark)
        };

        if staged.is_empty() {
            trace!(watermark = watermark.sequence, "Write changed nothing");
            return Ok(ChangedKeySet::unchanged(watermark));
        }

        let changed = {
            let mut state = self.state.write().map_err(|_| StoreError::LockPoisoned)?;
            let watermark = state.watermark.next();
            let keys: HashSet<CacheKey> = staged.iter().map(|r| r.key().clone()).collect();
            for record in staged {
                state.records.insert(record.key().clone(), record);
            }
            state.watermark = watermark;
            ChangedKeySet::new(watermark, keys)
        };
        self.stats.record_write();

        debug!(
            watermark = changed.watermark().sequence,
            changed = changed.len(),
            publish,
            "Committed write transaction"
        );

        if publish {
            self.broadcast(changed.clone());
        }
        Ok(changed)
    }

    /// Publish `keys` as changed without modifying any record.
    ///
    /// Advances the watermark so that watchers whose baseline predates this
    /// call re-evaluate.
    pub fn publish(&self, keys: HashSet<CacheKey>) -> Result<ChangedKeySet, StoreError> {
        let _writer = self.writer.lock().map_err(|_| StoreError::LockPoisoned)?;
        if keys.is_empty() {
            return Ok(ChangedKeySet::unchanged(self.current_watermark()?));
        }

        let changed = {
            let mut state = self.state.write().map_err(|_| StoreError::LockPoisoned)?;
            state.watermark = state.watermark.next();
            ChangedKeySet::new(state.watermark, keys)
        };
        self.broadcast(changed.clone());
        Ok(changed)
    }

    /// Remove a record, and with `cascade` every record reachable from it.
    ///
    /// Removed keys are published as changed. Removing an absent key is a
    /// no-op.
    pub fn remove(&self, key: &CacheKey, cascade: bool) -> Result<ChangedKeySet, StoreError> {
        let _writer = self.writer.lock().map_err(|_| StoreError::LockPoisoned)?;

        let changed = {
            let mut state = self.state.write().map_err(|_| StoreError::LockPoisoned)?;
            let mut removed = HashSet::new();
            let mut pending = vec![key.clone()];

            while let Some(next) = pending.pop() {
                if removed.contains(&next) {
                    continue;
                }
                let Some(record) = state.records.remove(&next) else {
                    continue;
                };
                if cascade {
                    pending.extend(record.references());
                }
                removed.insert(next);
            }

            if removed.is_empty() {
                return Ok(ChangedKeySet::unchanged(state.watermark));
            }
            state.watermark = state.watermark.next();
            ChangedKeySet::new(state.watermark, removed)
        };

        debug!(key = %key, cascade, removed = changed.len(), "Removed records");
        self.broadcast(changed.clone());
        Ok(changed)
    }

    /// Remove every record and publish all of their keys.
    pub fn clear(&self) -> Result<ChangedKeySet, StoreError> {
        let _writer = self.writer.lock().map_err(|_| StoreError::LockPoisoned)?;

        let changed = {
            let mut state = self.state.write().map_err(|_| StoreError::LockPoisoned)?;
            if state.records.is_empty() {
                return Ok(ChangedKeySet::unchanged(state.watermark));
            }
            let keys: HashSet<CacheKey> = state.records.drain().map(|(key, _)| key).collect();
            state.watermark = state.watermark.next();
            ChangedKeySet::new(state.watermark, keys)
        };

        debug!(removed = changed.len(), "Cleared store");
        self.broadcast(changed.clone());
        Ok(changed)
    }

    /// Run `read` against a consistent snapshot of the records together with
    /// the watermark that snapshot reflects.
    pub fn read_snapshot<R>(&self, read: impl FnOnce(&RecordMap, Watermark) -> R) -> Result<R, CacheError> {
        let state = self.read_state()?;
        Ok(read(&state.records, state.watermark))
    }

    pub fn read(&self, key: &CacheKey) -> Result<Option<Record>, CacheError> {
        Ok(self.read_state()?.records.get(key).cloned())
    }

    /// Copy of every record, for debugging.
    pub fn dump(&self) -> Result<RecordMap, CacheError> {
        Ok(self.read_state()?.records.clone())
    }

    pub fn len(&self) -> usize {
        self.read_state().map(|s| s.records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn current_watermark(&self) -> Result<Watermark, StoreError> {
        self.state
            .read()
            .map(|s| s.watermark)
            .map_err(|_| StoreError::LockPoisoned)
    }

    /// Subscribe to change publications from this point on.
    pub fn subscribe(&self) -> broadcast::Receiver<ChangedKeySet> {
        self.changes.subscribe()
    }

    pub(crate) fn stats(&self) -> &StatsCounters {
        &self.stats
    }

    pub fn stats_snapshot(&self) -> CacheStats {
        self.stats.snapshot(self.len())
    }

    fn broadcast(&self, changed: ChangedKeySet) {
        let watermark = changed.watermark().sequence;
        match self.changes.send(changed) {
            Ok(receivers) => trace!(watermark, receivers, "Published change set"),
            Err(_) => trace!(watermark, "No subscribers for change set"),
        }
    }
}

impl Default for NormalizedStore {
    fn default() -> Self {
        Self::new(&StoreConfig::default())
    }
}
