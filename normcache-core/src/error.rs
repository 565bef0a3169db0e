//! Error types for normcache operations

use crate::key::CacheKey;
use thiserror::Error;

/// A cache read could not produce the requested data.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache miss: record '{key}' not found")]
    MissingRecord { key: CacheKey },

    #[error("Cache miss: record '{key}' has no field '{field}'")]
    MissingField { key: CacheKey, field: String },

    #[error("Failed to decode cached data for {operation}: {reason}")]
    Decode { operation: String, reason: String },

    #[error("Cache lock poisoned")]
    LockPoisoned,
}

/// The transport failed or returned something unusable.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NetworkError {
    #[error("Transport failure: {reason}")]
    Transport { reason: String },

    #[error("HTTP request failed with status {status}: {body}")]
    Http { status: u16, body: String },

    #[error("No response available for {operation}")]
    NoResponse { operation: String },

    #[error("Invalid response for {operation}: {reason}")]
    InvalidResponse { operation: String, reason: String },

    #[error("Network request cancelled")]
    Cancelled,
}

/// Outcome of a failed fetch, classified for watch error handling.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    /// Both avenues of a combined policy were exhausted.
    #[error("Cache and network both failed: cache: {cache}; network: {network}")]
    Composite {
        cache: CacheError,
        network: NetworkError,
    },
}

impl FetchError {
    pub fn is_cache_error(&self) -> bool {
        matches!(self, Self::Cache(_))
    }

    pub fn is_network_error(&self) -> bool {
        matches!(self, Self::Network(_))
    }

    pub fn is_composite(&self) -> bool {
        matches!(self, Self::Composite { .. })
    }

    /// The cache part of this error, if any.
    pub fn cache_error(&self) -> Option<&CacheError> {
        match self {
            Self::Cache(e) | Self::Composite { cache: e, .. } => Some(e),
            Self::Network(_) => None,
        }
    }

    /// The network part of this error, if any.
    pub fn network_error(&self) -> Option<&NetworkError> {
        match self {
            Self::Network(e) | Self::Composite { network: e, .. } => Some(e),
            Self::Cache(_) => None,
        }
    }
}

/// Direct store writes.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Normalization failed for {operation}: {reason}")]
    Normalization { operation: String, reason: String },

    #[error("Failed to encode data for {operation}: {reason}")]
    Encode { operation: String, reason: String },

    #[error("Store lock poisoned")]
    LockPoisoned,
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all normcache errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NormCacheError {
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl From<CacheError> for NormCacheError {
    fn from(e: CacheError) -> Self {
        Self::Fetch(FetchError::Cache(e))
    }
}

impl From<NetworkError> for NormCacheError {
    fn from(e: NetworkError) -> Self {
        Self::Fetch(FetchError::Network(e))
    }
}

/// Result type alias for normcache operations.
pub type NormCacheResult<T> = Result<T, NormCacheError>;

// =============================================================================
// TESTS
// =============================================================================
