//! Fetch policies and watch error handling.
//!
//! Both are closed sets dispatched through explicit match tables, so every
//! combination is visible (and tested) in one place.

use crate::error::FetchError;
use serde::{Deserialize, Serialize};

/// Ordering of cache and network for a fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FetchPolicy {
    /// Read the cache; never touch the network.
    CacheOnly,
    /// Call the network; write the result through to the cache.
    NetworkOnly,
    /// Read the cache, fall back to the network on a miss.
    #[default]
    CacheFirst,
    /// Call the network, fall back to the cache on failure.
    NetworkFirst,
}

impl FetchPolicy {
    pub fn may_use_network(&self) -> bool {
        !matches!(self, Self::CacheOnly)
    }

    pub fn may_use_cache(&self) -> bool {
        !matches!(self, Self::NetworkOnly)
    }
}

/// Error classes a watcher distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    Cache,
    Network,
    Composite,
}

impl ErrorClass {
    pub fn of(error: &FetchError) -> Self {
        match error {
            FetchError::Cache(_) => Self::Cache,
            FetchError::Network(_) => Self::Network,
            FetchError::Composite { .. } => Self::Composite,
        }
    }
}

/// Which errors terminate a watch instead of being swallowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum WatchErrorHandling {
    /// Swallow everything; keep the last good baseline.
    #[default]
    Ignore,
    /// Surface cache misses only.
    ThrowCacheErrors,
    /// Surface network failures, including the network half of a composite.
    ThrowNetworkErrors,
    /// Surface every error as-is.
    ThrowAll,
}

impl WatchErrorHandling {
    /// Decide what, if anything, a watcher delivers for `error`.
    ///
    /// `None` means the error is suppressed and the watcher keeps running.
    pub fn surface(&self, error: FetchError) -> Option<FetchError> {
        match (self, error) {
            (Self::Ignore, _) => None,

            (Self::ThrowCacheErrors, e @ FetchError::Cache(_)) => Some(e),
            (Self::ThrowCacheErrors, FetchError::Network(_) | FetchError::Composite { .. }) => None,

            (Self::ThrowNetworkErrors, e @ FetchError::Network(_)) => Some(e),
            (Self::ThrowNetworkErrors, FetchError::Composite { network, .. }) => {
                Some(FetchError::Network(network))
            }
            (Self::ThrowNetworkErrors, FetchError::Cache(_)) => None,

            (Self::ThrowAll, e) => Some(e),
        }
    }
}

/// Per-watch settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchOptions {
    pub fetch_policy: FetchPolicy,
    pub refetch_policy: FetchPolicy,
    pub fetch_error_handling: WatchErrorHandling,
    pub refetch_error_handling: WatchErrorHandling,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            fetch_policy: FetchPolicy::CacheFirst,
            refetch_policy: FetchPolicy::CacheOnly,
            fetch_error_handling: WatchErrorHandling::Ignore,
            refetch_error_handling: WatchErrorHandling::Ignore,
        }
    }
}

impl WatchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fetch_policy(mut self, policy: FetchPolicy) -> Self {
        self.fetch_policy = policy;
        self
    }

    pub fn with_refetch_policy(mut self, policy: FetchPolicy) -> Self {
        self.refetch_policy = policy;
        self
    }

    pub fn with_fetch_error_handling(mut self, handling: WatchErrorHandling) -> Self {
        self.fetch_error_handling = handling;
        self
    }

    pub fn with_refetch_error_handling(mut self, handling: WatchErrorHandling) -> Self {
        self.refetch_error_handling = handling;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CacheError, NetworkError};
    use crate::key::CacheKey;

    fn cache() -> FetchError {
        FetchError::Cache(CacheError::MissingRecord {
            key: CacheKey::query_root(),
        })
    }

    fn network() -> FetchError {
        FetchError::Network(NetworkError::Http {
            status: 500,
            body: String::new(),
        })
    }

    fn composite() -> FetchError {
        FetchError::Composite {
            cache: CacheError::MissingRecord {
                key: CacheKey::query_root(),
            },
            network: NetworkError::Http {
                status: 500,
                body: String::new(),
            },
        }
    }

    fn surfaced(handling: WatchErrorHandling, error: FetchError) -> Option<ErrorClass> {
        handling.surface(error).as_ref().map(ErrorClass::of)
    }

    #[test]
    fn test_ignore_swallows_everything() {
        use WatchErrorHandling::Ignore;
        assert_eq!(surfaced(Ignore, cache()), None);
        assert_eq!(surfaced(Ignore, network()), None);
        assert_eq!(surfaced(Ignore, composite()), None);
    }

    #[test]
    fn test_throw_cache_errors() {
        use WatchErrorHandling::ThrowCacheErrors;
        assert_eq!(surfaced(ThrowCacheErrors, cache()), Some(ErrorClass::Cache));
        assert_eq!(surfaced(ThrowCacheErrors, network()), None);
        assert_eq!(surfaced(ThrowCacheErrors, composite()), None);
    }

    #[test]
    fn test_throw_network_errors() {
        use WatchErrorHandling::ThrowNetworkErrors;
        assert_eq!(surfaced(ThrowNetworkErrors, cache()), None);
        assert_eq!(surfaced(ThrowNetworkErrors, network()), Some(ErrorClass::Network));
        assert_eq!(surfaced(ThrowNetworkErrors, composite()), Some(ErrorClass::Network));
    }

    #[test]
    fn test_throw_all_raises_composite_undecomposed() {
        use WatchErrorHandling::ThrowAll;
        assert_eq!(surfaced(ThrowAll, cache()), Some(ErrorClass::Cache));
        assert_eq!(surfaced(ThrowAll, network()), Some(ErrorClass::Network));
        assert_eq!(surfaced(ThrowAll, composite()), Some(ErrorClass::Composite));
    }

    #[test]
    fn test_watch_option_defaults() {
        let options = WatchOptions::default();
        assert_eq!(options.fetch_policy, FetchPolicy::CacheFirst);
        assert_eq!(options.refetch_policy, FetchPolicy::CacheOnly);
        assert_eq!(options.fetch_error_handling, WatchErrorHandling::Ignore);
        assert_eq!(options.refetch_error_handling, WatchErrorHandling::Ignore);
    }

    #[test]
    fn test_policy_avenues() {
        assert!(!FetchPolicy::CacheOnly.may_use_network());
        assert!(!FetchPolicy::NetworkOnly.may_use_cache());
        assert!(FetchPolicy::CacheFirst.may_use_network() && FetchPolicy::CacheFirst.may_use_cache());
        assert!(FetchPolicy::NetworkFirst.may_use_network() && FetchPolicy::NetworkFirst.may_use_cache());
    }
}
