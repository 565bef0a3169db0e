//! Normalized cache layer.
//!
//! Operation data is flattened into a map of [`Record`](normcache_core::Record)s
//! keyed by [`CacheKey`](normcache_core::CacheKey) and reassembled on read.
//!
//! # Design Philosophy
//!
//! Records never own each other; they refer to one another by key. An
//! update to a shared object is therefore one field-level merge that every
//! result reading that object observes, and cycles in the object graph are
//! harmless. Reads report exactly which keys they visited (their
//! [`DependencySet`](normcache_core::DependencySet)) and which watermark
//! their snapshot reflects, which is all a watcher needs to decide whether
//! a published change concerns it.
//!
//! # Example
//!
//! ```ignore
//! let batch = normalize(op.root_key(), op.selections(), &data, &IdCacheKeyGenerator::new())?;
//! let changed = store.merge_write(batch, true)?;
//!
//! let read = store.read_snapshot(|records, watermark| {
//!     (denormalize(&op.root_key(), op.selections(), records), watermark)
//! })?;
//! ```

pub mod denormalizer;
pub mod normalized;
pub mod normalizer;
pub mod stats;

pub use denormalizer::{denormalize, Denormalized};
pub use normalized::{NormalizedStore, RecordMap};
pub use normalizer::{normalize, NormalizeError};
pub use stats::CacheStats;
