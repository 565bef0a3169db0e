//! Client entry point.

use std::sync::Arc;

use normcache_core::{
    FetchError, FetchPolicy, NetworkTransport, Operation, OperationResult, WatchErrorHandling,
    WatchOptions,
};

use crate::fetch::FetchPolicyExecutor;
use crate::store::ApolloStore;
use crate::watch::{Watch, WatchRegistry};

/// Executes and watches operations against one store and one transport.
#[derive(Clone, Debug)]
pub struct ApolloClient {
    executor: FetchPolicyExecutor,
    watchers: WatchRegistry,
}

impl ApolloClient {
    pub fn new(store: ApolloStore, transport: Arc<dyn NetworkTransport>) -> Self {
        let executor = FetchPolicyExecutor::new(store, transport);
        Self {
            watchers: WatchRegistry::new(executor.clone()),
            executor,
        }
    }

    pub fn store(&self) -> &ApolloStore {
        self.executor.store()
    }

    pub fn executor(&self) -> &FetchPolicyExecutor {
        &self.executor
    }

    pub fn watchers(&self) -> &WatchRegistry {
        &self.watchers
    }

    /// Start building a call for `operation`.
    pub fn query<O: Operation>(&self, operation: O) -> QueryCall<'_, O> {
        QueryCall {
            client: self,
            operation,
            options: WatchOptions::default(),
        }
    }
}

/// A configured call, run once with [`execute`](Self::execute) or kept
/// live with [`watch`](Self::watch).
///
/// `fetch_policy` applies to `execute` and to a watch's initial fetch; the
/// remaining settings only matter to watches.
#[derive(Debug)]
#[must_use = "a query call does nothing until executed or watched"]
pub struct QueryCall<'a, O> {
    client: &'a ApolloClient,
    operation: O,
    options: WatchOptions,
}

impl<O: Operation> QueryCall<'_, O> {
    pub fn fetch_policy(mut self, policy: FetchPolicy) -> Self {
        self.options.fetch_policy = policy;
        self
    }

    pub fn refetch_policy(mut self, policy: FetchPolicy) -> Self {
        self.options.refetch_policy = policy;
        self
    }

    pub fn fetch_error_handling(mut self, handling: WatchErrorHandling) -> Self {
        self.options.fetch_error_handling = handling;
        self
    }

    pub fn refetch_error_handling(mut self, handling: WatchErrorHandling) -> Self {
        self.options.refetch_error_handling = handling;
        self
    }

    pub fn options(mut self, options: WatchOptions) -> Self {
        self.options = options;
        self
    }

    pub async fn execute(self) -> Result<OperationResult<O::Data>, FetchError> {
        self.client
            .executor
            .execute(&self.operation, self.options.fetch_policy)
            .await
    }

    pub fn watch(self) -> Watch<O::Data> {
        self.client.watchers.subscribe(self.operation, self.options)
    }
}
