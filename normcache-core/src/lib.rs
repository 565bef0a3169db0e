//! normcache Core - Data Types and Capabilities
//!
//! Pure data structures and the capability traits the cache consumes from
//! the outside world (operations, transports, key generators). All other
//! crates depend on this. Behavior lives in `normcache-storage`.

pub mod changes;
pub mod config;
pub mod error;
pub mod key;
pub mod operation;
pub mod policy;
pub mod record;
pub mod selection;
pub mod transport;

pub use changes::{ChangedKeySet, DependencySet, Watermark};
pub use config::StoreConfig;
pub use error::{
    CacheError, ConfigError, FetchError, NetworkError, NormCacheError, NormCacheResult,
    StoreError,
};
pub use key::{CacheKey, CacheKeyGenerator, FnCacheKeyGenerator, IdCacheKeyGenerator, ObjectContext};
pub use operation::{
    DataOrigin, GraphQlError, Operation, OperationRequest, OperationResult, OperationType,
};
pub use policy::{ErrorClass, FetchPolicy, WatchErrorHandling, WatchOptions};
pub use record::{FieldValue, Record, RecordBatch};
pub use selection::{Field, SelectionSet};
pub use transport::NetworkTransport;

/// Timestamp type using UTC timezone.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
