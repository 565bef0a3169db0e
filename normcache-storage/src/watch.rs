//! Reactive query watchers.
//!
//! A watcher is a spawned task that owns one operation. It performs the
//! initial fetch, remembers the dependency set and watermark of the result
//! it delivered (its baseline), and then re-evaluates the operation whenever
//! a published change set touches one of those keys.
//!
//! # Ordering
//!
//! The task subscribes to change publications before its initial fetch, so
//! no write can slip between the fetch and the subscription. Publications
//! at or below the baseline watermark are already reflected in the baseline
//! and are skipped, which also keeps a watcher from re-triggering on its
//! own network write-through.
//!
//! # Cancellation
//!
//! Dropping or cancelling a [`Watch`] stops the task at its next await
//! point. Once cancelled, nothing further is yielded, even if a result was
//! already queued.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use normcache_core::{
    ChangedKeySet, DependencySet, FetchError, FetchPolicy, Operation, OperationResult, StoreConfig, WatchOptions,
    Watermark,
};
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::{broadcast, mpsc};
use tokio_stream::Stream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::fetch::{FetchPolicyExecutor, Fetched};

/// Identifies one active watcher.
pub type WatcherId = Uuid;

/// What a watch yields: a result, or the error that terminated it.
pub type WatchItem<D> = Result<OperationResult<D>, FetchError>;

/// Introspection snapshot of an active watcher.
#[derive(Debug, Clone, PartialEq)]
pub struct WatcherInfo {
    pub operation: String,
    pub options: WatchOptions,
    /// Keys whose change triggers a re-evaluation.
    pub dependencies: DependencySet,
    /// Watermark of the current baseline.
    pub watermark: Watermark,
    /// Whether any result has been delivered yet.
    pub has_baseline: bool,
    /// Initial fetch plus every re-evaluation.
    pub evaluations: u64,
    /// Results delivered to the consumer.
    pub emissions: u64,
}

type WatcherTable = Arc<Mutex<HashMap<WatcherId, WatcherInfo>>>;

/// Tracks active watchers and spawns their tasks.
#[derive(Clone)]
pub struct WatchRegistry {
    executor: FetchPolicyExecutor,
    watchers: WatcherTable,
}

impl WatchRegistry {
    pub fn new(executor: FetchPolicyExecutor) -> Self {
        Self {
            executor,
            watchers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Start watching `operation`.
    ///
    /// Must be called from within a tokio runtime; the watcher runs as a
    /// spawned task until the returned [`Watch`] is cancelled or dropped,
    /// or until it surfaces an error.
    pub fn subscribe<O: Operation>(&self, operation: O, options: WatchOptions) -> Watch<O::Data> {
        let id = Uuid::now_v7();
        let config: &StoreConfig = self.executor.store().config();
        let (sink, results) = mpsc::channel(config.watch_buffer.max(1));
        let cancel = CancellationToken::new();

        // Subscribe before the initial fetch so no publication is missed.
        let changes = self.executor.store().subscribe_changes();
        let started_at = self.executor.store().watermark().unwrap_or_default();

        let info = WatcherInfo {
            operation: operation.name().to_string(),
            options,
            dependencies: DependencySet::new(),
            watermark: started_at,
            has_baseline: false,
            evaluations: 0,
            emissions: 0,
        };
        if let Ok(mut watchers) = self.watchers.lock() {
            watchers.insert(id, info);
        }
        debug!(watcher = %id, operation = operation.name(), ?options, "Watcher registered");

        let task = WatchTask {
            id,
            operation,
            options,
            coalesce: config.coalesce_bursts,
            executor: self.executor.clone(),
            watchers: Arc::clone(&self.watchers),
            changes,
            sink,
            cancel: cancel.clone(),
            dependencies: DependencySet::new(),
            watermark: started_at,
            delivered: None,
        };
        tokio::spawn(task.run());

        Watch {
            id,
            results,
            cancel,
            watchers: Arc::clone(&self.watchers),
        }
    }

    pub fn active_watchers(&self) -> usize {
        self.watchers.lock().map(|w| w.len()).unwrap_or(0)
    }

    pub fn watcher_ids(&self) -> Vec<WatcherId> {
        self.watchers
            .lock()
            .map(|w| w.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn watcher_info(&self, id: &WatcherId) -> Option<WatcherInfo> {
        self.watchers.lock().ok()?.get(id).cloned()
    }
}

impl std::fmt::Debug for WatchRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchRegistry")
            .field("active_watchers", &self.active_watchers())
            .finish()
    }
}

fn unregister(watchers: &WatcherTable, id: &WatcherId) {
    if let Ok(mut watchers) = watchers.lock() {
        if watchers.remove(id).is_some() {
            debug!(watcher = %id, "Watcher unregistered");
        }
    }
}

// ============================================================================
// CONSUMER HANDLE
// ============================================================================

/// Stream of results for one watched operation.
///
/// Yields the initial result, then one result per observable change. A
/// surfaced error is yielded last and ends the stream.
#[derive(Debug)]
pub struct Watch<D> {
    id: WatcherId,
    results: mpsc::Receiver<WatchItem<D>>,
    cancel: CancellationToken,
    watchers: WatcherTable,
}

impl<D> Watch<D> {
    pub fn id(&self) -> WatcherId {
        self.id
    }

    /// Receive the next item, or `None` once the watch has ended.
    pub async fn recv(&mut self) -> Option<WatchItem<D>> {
        if self.cancel.is_cancelled() {
            return None;
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            item = self.results.recv() => item,
        }
    }

    /// Stop the watcher. Nothing is yielded afterwards.
    pub fn cancel(&mut self) {
        self.cancel.cancel();
        self.results.close();
        unregister(&self.watchers, &self.id);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl<D> Stream for Watch<D> {
    type Item = WatchItem<D>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.cancel.is_cancelled() {
            return Poll::Ready(None);
        }
        self.results.poll_recv(cx)
    }
}

impl<D> Drop for Watch<D> {
    fn drop(&mut self) {
        self.cancel.cancel();
        unregister(&self.watchers, &self.id);
    }
}

// ============================================================================
// WATCHER TASK
// ============================================================================

struct WatchTask<O: Operation> {
    id: WatcherId,
    operation: O,
    options: WatchOptions,
    coalesce: bool,
    executor: FetchPolicyExecutor,
    watchers: WatcherTable,
    changes: broadcast::Receiver<ChangedKeySet>,
    sink: mpsc::Sender<WatchItem<O::Data>>,
    cancel: CancellationToken,
    dependencies: DependencySet,
    /// Publications at or below this are already reflected.
    watermark: Watermark,
    /// Last delivered data; `None` until the first delivery.
    delivered: Option<Option<O::Data>>,
}

enum Step<D> {
    Fetched(Result<Fetched<D>, FetchError>),
    Cancelled,
}

impl<O: Operation> WatchTask<O> {
    async fn run(mut self) {
        if self.initial().await {
            self.watch_changes().await;
        }
        unregister(&self.watchers, &self.id);
        trace!(watcher = %self.id, "Watcher task finished");
    }

    /// Returns false when the watcher is done.
    async fn initial(&mut self) -> bool {
        let started_at = self.watermark;
        let policy = self.options.fetch_policy;
        match self.fetch(policy).await {
            Step::Cancelled => false,
            Step::Fetched(Ok(fetched)) => self.deliver(fetched).await,
            Step::Fetched(Err(error)) => {
                let handling = self.options.fetch_error_handling;
                self.on_error(handling.surface(error.clone()), error, started_at)
                    .await
            }
        }
    }

    async fn watch_changes(&mut self) {
        let cancel = self.cancel.clone();
        loop {
            let trigger = tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                trigger = self.next_trigger() => trigger,
            };
            let Some(trigger) = trigger else {
                debug!(watcher = %self.id, "Change channel closed");
                return;
            };
            match trigger {
                Trigger::Changed(published) => {
                    trace!(watcher = %self.id, published = published.sequence, "Re-evaluating")
                }
                Trigger::Lagged => debug!(watcher = %self.id, "Re-evaluating after lag"),
            }
            if !self.refetch().await {
                return;
            }
        }
    }

    /// Wait for a publication that concerns this watcher.
    ///
    /// Returns `None` when the store is gone.
    async fn next_trigger(&mut self) -> Option<Trigger> {
        loop {
            let changed = match self.changes.recv().await {
                Ok(changed) => changed,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(watcher = %self.id, skipped, "Watcher lagged behind change publications");
                    return Some(Trigger::Lagged);
                }
                Err(RecvError::Closed) => return None,
            };

            if !self.is_relevant(&changed) {
                continue;
            }
            if !self.coalesce {
                return Some(Trigger::Changed(changed.watermark()));
            }

            // Whatever queued up behind this publication is covered by the
            // re-evaluation against the latest state.
            let mut latest = changed;
            loop {
                match self.changes.try_recv() {
                    Ok(more) => latest.absorb(more),
                    Err(TryRecvError::Lagged(_)) => return Some(Trigger::Lagged),
                    Err(_) => break,
                }
            }
            return Some(Trigger::Changed(latest.watermark()));
        }
    }

    fn is_relevant(&self, changed: &ChangedKeySet) -> bool {
        if !changed.watermark().is_newer_than(&self.watermark) {
            trace!(
                watcher = %self.id,
                published = changed.watermark().sequence,
                baseline = self.watermark.sequence,
                "Skipping publication already reflected"
            );
            return false;
        }
        self.dependencies.intersects(changed)
    }

    /// Returns false when the watcher is done.
    async fn refetch(&mut self) -> bool {
        let started_at = self.executor.store().watermark().unwrap_or(self.watermark);
        let policy = self.options.refetch_policy;
        match self.fetch(policy).await {
            Step::Cancelled => false,
            Step::Fetched(Ok(fetched)) => {
                let unchanged = self.delivered.as_ref() == Some(&fetched.result.data);
                if unchanged {
                    trace!(watcher = %self.id, "Result unchanged, not delivering");
                    self.dependencies = fetched.dependencies;
                    self.watermark = fetched.watermark;
                    self.publish_info(false);
                    true
                } else {
                    self.deliver(fetched).await
                }
            }
            Step::Fetched(Err(error)) => {
                let handling = self.options.refetch_error_handling;
                self.on_error(handling.surface(error.clone()), error, started_at)
                    .await
            }
        }
    }

    async fn fetch(&self, policy: FetchPolicy) -> Step<O::Data> {
        if self.cancel.is_cancelled() {
            return Step::Cancelled;
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Step::Cancelled,
            result = self.executor.fetch(&self.operation, policy) => Step::Fetched(result),
        }
    }

    async fn deliver(&mut self, fetched: Fetched<O::Data>) -> bool {
        self.dependencies = fetched.dependencies;
        self.watermark = fetched.watermark;
        self.delivered = Some(fetched.result.data.clone());
        self.publish_info(true);
        self.emit(Ok(fetched.result)).await
    }

    /// Handle a failed fetch. `surfaced` is what the error handling lets
    /// through; `started_at` is the watermark before the fetch began.
    async fn on_error(&mut self, surfaced: Option<FetchError>, error: FetchError, started_at: Watermark) -> bool {
        if let Some(surfaced) = surfaced {
            debug!(watcher = %self.id, error = %surfaced, "Surfacing error and terminating");
            self.emit(Err(surfaced)).await;
            return false;
        }

        debug!(watcher = %self.id, error = %error, "Suppressed fetch error");
        if self.delivered.is_none() {
            // No baseline: depend on whatever the cache read can see so
            // that a write completing the data wakes this watcher.
            match self.executor.store().dependencies_of(&self.operation) {
                Ok(dependencies) => {
                    self.dependencies = dependencies;
                    self.watermark = started_at;
                }
                Err(e) => warn!(watcher = %self.id, error = %e, "Could not read dependencies"),
            }
        }
        self.publish_info(false);
        true
    }

    async fn emit(&self, item: WatchItem<O::Data>) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            sent = self.sink.send(item) => sent.is_ok(),
        }
    }

    fn publish_info(&self, emitted: bool) {
        let Ok(mut watchers) = self.watchers.lock() else {
            return;
        };
        if let Some(info) = watchers.get_mut(&self.id) {
            info.dependencies = self.dependencies.clone();
            info.watermark = self.watermark;
            info.has_baseline = self.delivered.is_some();
            info.evaluations += 1;
            if emitted {
                info.emissions += 1;
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Trigger {
    /// A publication above the baseline touched a dependency.
    Changed(Watermark),
    /// Publications were dropped; the dependency check cannot be trusted.
    Lagged,
}
