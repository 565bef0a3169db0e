//! Operation-level facade over the normalized store.

use std::collections::HashSet;
use std::sync::Arc;

use normcache_core::{
    CacheError, CacheKey, CacheKeyGenerator, ChangedKeySet, ConfigError, DependencySet, Operation,
    OperationResult, Record, StoreConfig, StoreError, Watermark,
};
use tokio::sync::broadcast;
use tracing::{debug, trace};

use crate::cache::{denormalize, normalize, CacheStats, NormalizedStore, RecordMap};

/// A typed cache read together with what it observed.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheRead<D> {
    pub data: Result<D, CacheError>,
    /// Keys visited, partial when the read missed.
    pub dependencies: DependencySet,
    /// Watermark of the snapshot the read ran against.
    pub watermark: Watermark,
}

impl<D> CacheRead<D> {
    pub fn is_hit(&self) -> bool {
        self.data.is_ok()
    }
}

/// Result of writing an operation's data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOutcome {
    /// Keys the transaction actually changed, with its watermark.
    pub changed: ChangedKeySet,
    /// Every key the written data normalized into.
    pub dependencies: DependencySet,
}

struct StoreInner {
    cache: NormalizedStore,
    key_generator: Arc<dyn CacheKeyGenerator>,
    config: StoreConfig,
}

/// Shared handle to a normalized cache.
///
/// Cloning is cheap; all clones see the same records and the same change
/// publications.
#[derive(Clone)]
pub struct ApolloStore {
    inner: Arc<StoreInner>,
}

impl ApolloStore {
    /// Create a store with the default configuration.
    pub fn new(key_generator: impl CacheKeyGenerator + 'static) -> Self {
        Self::build(Arc::new(key_generator), StoreConfig::default())
    }

    /// Create a store with an explicit configuration.
    pub fn with_config(
        key_generator: impl CacheKeyGenerator + 'static,
        config: StoreConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::build(Arc::new(key_generator), config))
    }

    fn build(key_generator: Arc<dyn CacheKeyGenerator>, config: StoreConfig) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                cache: NormalizedStore::new(&config),
                key_generator,
                config,
            }),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// Normalize `data` for `operation` and merge it in one transaction.
    ///
    /// With `publish` false the write is committed but watchers are not
    /// told about it until the keys are published explicitly.
    pub fn write_operation<O: Operation>(
        &self,
        operation: &O,
        data: &O::Data,
        publish: bool,
    ) -> Result<ChangedKeySet, StoreError> {
        self.write_tracked(operation, data, publish).map(|outcome| outcome.changed)
    }

    pub(crate) fn write_tracked<O: Operation>(
        &self,
        operation: &O,
        data: &O::Data,
        publish: bool,
    ) -> Result<WriteOutcome, StoreError> {
        let encoded = operation.encode_data(data).map_err(|e| StoreError::Encode {
            operation: operation.name().to_string(),
            reason: e.to_string(),
        })?;

        let batch = normalize(
            operation.root_key(),
            operation.selections(),
            &encoded,
            self.inner.key_generator.as_ref(),
        )
        .map_err(|e| StoreError::Normalization {
            operation: operation.name().to_string(),
            reason: e.to_string(),
        })?;

        let dependencies: DependencySet = batch.keys().cloned().collect();
        let changed = self.inner.cache.merge_write(batch, publish)?;

        debug!(
            operation = operation.name(),
            records = dependencies.len(),
            changed = changed.len(),
            watermark = changed.watermark().sequence,
            "Wrote operation data"
        );

        Ok(WriteOutcome { changed, dependencies })
    }

    /// Read `operation` from the cache.
    pub fn read_operation<O: Operation>(&self, operation: &O) -> Result<OperationResult<O::Data>, CacheError> {
        self.read_tracked(operation)?.data.map(OperationResult::from_cache)
    }

    /// Read `operation` and report the dependencies and watermark observed.
    ///
    /// The outer error means no snapshot could be taken at all; a miss is
    /// reported in [`CacheRead::data`] together with the partial
    /// dependencies.
    pub fn read_tracked<O: Operation>(&self, operation: &O) -> Result<CacheRead<O::Data>, CacheError> {
        let root = operation.root_key();
        let (denormalized, watermark) = self.inner.cache.read_snapshot(|records, watermark| {
            (denormalize(&root, operation.selections(), records), watermark)
        })?;

        let data = denormalized.data.and_then(|value| {
            operation.decode_data(value).map_err(|e| CacheError::Decode {
                operation: operation.name().to_string(),
                reason: e.to_string(),
            })
        });

        let stats = self.inner.cache.stats();
        match &data {
            Ok(_) => stats.record_hit(),
            Err(e) => {
                stats.record_miss();
                trace!(operation = operation.name(), error = %e, "Cache miss");
            }
        }

        Ok(CacheRead {
            data,
            dependencies: denormalized.dependencies,
            watermark,
        })
    }

    /// Keys a read of `operation` would visit right now, partial when the
    /// data is incomplete. Not counted in [`stats`](Self::stats).
    pub(crate) fn dependencies_of<O: Operation>(&self, operation: &O) -> Result<DependencySet, CacheError> {
        let root = operation.root_key();
        self.inner
            .cache
            .read_snapshot(|records, _| denormalize(&root, operation.selections(), records).dependencies)
    }

    /// Tell watchers that `keys` changed without writing anything.
    pub fn publish(&self, keys: HashSet<CacheKey>) -> Result<ChangedKeySet, StoreError> {
        self.inner.cache.publish(keys)
    }

    /// Receive every change set published from now on.
    pub fn subscribe_changes(&self) -> broadcast::Receiver<ChangedKeySet> {
        self.inner.cache.subscribe()
    }

    pub fn read_record(&self, key: &CacheKey) -> Result<Option<Record>, CacheError> {
        self.inner.cache.read(key)
    }

    /// Remove a record, and with `cascade` every record it transitively
    /// references.
    pub fn remove(&self, key: &CacheKey, cascade: bool) -> Result<ChangedKeySet, StoreError> {
        self.inner.cache.remove(key, cascade)
    }

    pub fn clear_all(&self) -> Result<ChangedKeySet, StoreError> {
        self.inner.cache.clear()
    }

    pub fn dump(&self) -> Result<RecordMap, CacheError> {
        self.inner.cache.dump()
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.cache.stats_snapshot()
    }

    pub fn watermark(&self) -> Result<Watermark, StoreError> {
        self.inner.cache.current_watermark()
    }
}

impl std::fmt::Debug for ApolloStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApolloStore")
            .field("config", &self.inner.config)
            .field("records", &self.inner.cache.len())
            .finish()
    }
}
