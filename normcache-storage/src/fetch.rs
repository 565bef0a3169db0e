//! Fetch policy execution.
//!
//! A fetch produces either a result together with the dependency set and
//! watermark it was observed at, or a classified [`FetchError`]. Network
//! results are written through to the store before they are returned.

use std::sync::Arc;

use normcache_core::{
    CacheError, DependencySet, FetchError, FetchPolicy, NetworkError, NetworkTransport, Operation,
    OperationResult, Watermark,
};
use tracing::{debug, warn};

use crate::store::ApolloStore;

/// A successful fetch and what it observed.
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched<D> {
    pub result: OperationResult<D>,
    /// Keys the result was read from, or the keys a network result wrote.
    pub dependencies: DependencySet,
    /// The store state this result reflects.
    pub watermark: Watermark,
}

/// Runs operations against the cache and the network according to a
/// [`FetchPolicy`].
#[derive(Clone)]
pub struct FetchPolicyExecutor {
    store: ApolloStore,
    transport: Arc<dyn NetworkTransport>,
}

impl FetchPolicyExecutor {
    pub fn new(store: ApolloStore, transport: Arc<dyn NetworkTransport>) -> Self {
        Self { store, transport }
    }

    pub fn store(&self) -> &ApolloStore {
        &self.store
    }

    /// Fetch `operation`, discarding the dependency information.
    pub async fn execute<O: Operation>(
        &self,
        operation: &O,
        policy: FetchPolicy,
    ) -> Result<OperationResult<O::Data>, FetchError> {
        self.fetch(operation, policy).await.map(|fetched| fetched.result)
    }

    /// Fetch `operation` under `policy`.
    ///
    /// Combined policies that exhaust both avenues fail with
    /// [`FetchError::Composite`] carrying both causes.
    pub async fn fetch<O: Operation>(
        &self,
        operation: &O,
        policy: FetchPolicy,
    ) -> Result<Fetched<O::Data>, FetchError> {
        debug!(operation = operation.name(), ?policy, "Fetching");

        match policy {
            FetchPolicy::CacheOnly => Ok(self.from_cache(operation)?),
            FetchPolicy::NetworkOnly => Ok(self.from_network(operation).await?),
            FetchPolicy::CacheFirst => match self.from_cache(operation) {
                Ok(fetched) => Ok(fetched),
                Err(cache) => self
                    .from_network(operation)
                    .await
                    .map_err(|network| FetchError::Composite { cache, network }),
            },
            FetchPolicy::NetworkFirst => match self.from_network(operation).await {
                Ok(fetched) => Ok(fetched),
                Err(network) => {
                    warn!(
                        operation = operation.name(),
                        error = %network,
                        "Network failed, falling back to cache"
                    );
                    self.from_cache(operation)
                        .map_err(|cache| FetchError::Composite { cache, network })
                }
            },
        }
    }

    fn from_cache<O: Operation>(&self, operation: &O) -> Result<Fetched<O::Data>, CacheError> {
        let read = self.store.read_tracked(operation)?;
        let data = read.data?;
        Ok(Fetched {
            result: OperationResult::from_cache(data),
            dependencies: read.dependencies,
            watermark: read.watermark,
        })
    }

    async fn from_network<O: Operation>(&self, operation: &O) -> Result<Fetched<O::Data>, NetworkError> {
        let started_at = self
            .store
            .watermark()
            .map_err(|e| store_failure(operation, e))?;
        let request = operation.request();
        let body = self.transport.execute(&request).await?;
        let result = OperationResult::from_response_body(operation, body)?;

        if result.has_errors() {
            debug!(
                operation = operation.name(),
                errors = result.errors.len(),
                "Response carried GraphQL errors"
            );
        }

        let written = match &result.data {
            Some(data) => Some(
                self.store
                    .write_tracked(operation, data, true)
                    .map_err(|e| store_failure(operation, e))?,
            ),
            None => None,
        };

        match written {
            Some(outcome) => Ok(Fetched {
                dependencies: outcome.dependencies,
                watermark: outcome.changed.watermark(),
                result,
            }),
            // Nothing was written. Depend on whatever a cache read would
            // visit, as of before the request, so that data arriving later
            // still wakes a watcher holding this result.
            None => Ok(Fetched {
                dependencies: self
                    .store
                    .dependencies_of(operation)
                    .map_err(|e| store_failure(operation, e))?,
                watermark: started_at,
                result,
            }),
        }
    }
}

/// A response that cannot be stored is reported as an unusable response.
fn store_failure<O: Operation>(operation: &O, error: impl std::fmt::Display) -> NetworkError {
    NetworkError::InvalidResponse {
        operation: operation.name().to_string(),
        reason: error.to_string(),
    }
}

impl std::fmt::Debug for FetchPolicyExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchPolicyExecutor")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}
