//! normcache Storage - Normalized Cache, Fetch Policies and Watchers
//!
//! Behavior on top of the data types in `normcache-core`:
//!
//! - [`cache`]: the normalized record store, normalization and reads
//! - [`ApolloStore`]: operation-level writes, reads and change publication
//! - [`FetchPolicyExecutor`]: cache and network ordering per [`FetchPolicy`](normcache_core::FetchPolicy)
//! - [`WatchRegistry`]: reactive watchers that re-evaluate on relevant changes
//! - [`ApolloClient`]: the entry point tying them together

pub mod cache;
pub mod client;
pub mod fetch;
pub mod store;
pub mod watch;

pub use cache::{CacheStats, NormalizeError, NormalizedStore, RecordMap};
pub use client::{ApolloClient, QueryCall};
pub use fetch::{FetchPolicyExecutor, Fetched};
pub use store::{ApolloStore, CacheRead, WriteOutcome};
pub use watch::{Watch, WatchItem, WatchRegistry, WatcherId, WatcherInfo};
