//! Integration Tests for Watcher Error Handling
//!
//! **Property: Surfaced errors terminate**
//!
//! An error the watcher's handling lets through is delivered as the last item
//! of the stream and the watcher leaves the registry. Suppressed errors keep
//! the watcher alive.
//!
//! Every scenario runs against an empty store and an empty response queue, so
//! the cache always misses and the network always fails.

use normcache_core::{ErrorClass, FetchError, FetchPolicy, WatchErrorHandling};
use normcache_storage::{ApolloClient, Watch};
use normcache_test_utils::assertions::{
    assert_cache_error, assert_composite_error, assert_ended, assert_network_error,
    assert_no_emission, receive_or_timeout,
};
use normcache_test_utils::fixtures::*;
use normcache_test_utils::{init_tracing, QueueTestNetworkTransport};

const ALL_POLICIES: [FetchPolicy; 4] = [
    FetchPolicy::CacheFirst,
    FetchPolicy::NetworkFirst,
    FetchPolicy::NetworkOnly,
    FetchPolicy::CacheOnly,
];

const ALL_HANDLING: [WatchErrorHandling; 4] = [
    WatchErrorHandling::Ignore,
    WatchErrorHandling::ThrowCacheErrors,
    WatchErrorHandling::ThrowNetworkErrors,
    WatchErrorHandling::ThrowAll,
];

/// What a fetch under `policy` fails with when neither avenue has data.
fn exhausted_class(policy: FetchPolicy) -> ErrorClass {
    match policy {
        FetchPolicy::CacheOnly => ErrorClass::Cache,
        FetchPolicy::NetworkOnly => ErrorClass::Network,
        FetchPolicy::CacheFirst | FetchPolicy::NetworkFirst => ErrorClass::Composite,
    }
}

/// Class a watcher delivers for an error of `class`, or `None` if suppressed.
fn surfaced_class(handling: WatchErrorHandling, class: ErrorClass) -> Option<ErrorClass> {
    match (handling, class) {
        (WatchErrorHandling::Ignore, _) => None,
        (WatchErrorHandling::ThrowCacheErrors, ErrorClass::Cache) => Some(ErrorClass::Cache),
        (WatchErrorHandling::ThrowCacheErrors, _) => None,
        (WatchErrorHandling::ThrowNetworkErrors, ErrorClass::Cache) => None,
        (WatchErrorHandling::ThrowNetworkErrors, _) => Some(ErrorClass::Network),
        (WatchErrorHandling::ThrowAll, class) => Some(class),
    }
}

fn watch_initial(
    client: &ApolloClient,
    policy: FetchPolicy,
    handling: WatchErrorHandling,
) -> Watch<EpisodeHeroNameData> {
    client
        .query(EpisodeHeroNameQuery::new(Episode::Empire))
        .fetch_policy(policy)
        .fetch_error_handling(handling)
        .watch()
}

/// A network-only watcher with a delivered baseline whose next refetch will
/// find the response queue empty.
async fn watch_with_baseline(
    client: &ApolloClient,
    transport: &QueueTestNetworkTransport,
    handling: WatchErrorHandling,
) -> Watch<EpisodeHeroNameData> {
    let query = EpisodeHeroNameQuery::new(Episode::Empire);
    transport.enqueue_response(&query, &EpisodeHeroNameData::named("R2-D2"));
    let mut watch = client
        .query(query)
        .fetch_policy(FetchPolicy::NetworkOnly)
        .refetch_policy(FetchPolicy::NetworkOnly)
        .refetch_error_handling(handling)
        .watch();
    let first = receive_or_timeout(&mut watch).await.unwrap();
    assert_eq!(first.data.unwrap().hero_name(), Some("R2-D2"));
    watch
}

/// Trigger a refetch by writing a different hero name to the store.
fn trigger_refetch(client: &ApolloClient) {
    client
        .store()
        .write_operation(
            &EpisodeHeroNameQuery::new(Episode::Empire),
            &EpisodeHeroNameData::named("Artoo"),
            true,
        )
        .unwrap();
}

// ============================================================================
// INITIAL FETCH
// ============================================================================

#[tokio::test]
async fn test_fetch_ignore_all_errors() {
    init_tracing();
    for policy in ALL_POLICIES {
        let (client, _transport) = new_client();
        let mut watch = watch_initial(&client, policy, WatchErrorHandling::Ignore);

        assert_no_emission(&mut watch).await;
        assert!(!watch.is_cancelled(), "{policy:?}");
        assert_eq!(client.watchers().active_watchers(), 1, "{policy:?}");
    }
}

#[tokio::test]
async fn test_fetch_throw_cache_errors() {
    init_tracing();
    let (client, _transport) = new_client();
    let mut watch = watch_initial(&client, FetchPolicy::CacheOnly, WatchErrorHandling::ThrowCacheErrors);
    assert_cache_error(&receive_or_timeout(&mut watch).await);
    assert_ended(&mut watch).await;

    // A network failure alone is not a cache error.
    let (client, _transport) = new_client();
    let mut watch = watch_initial(&client, FetchPolicy::NetworkOnly, WatchErrorHandling::ThrowCacheErrors);
    assert_no_emission(&mut watch).await;
    assert_eq!(client.watchers().active_watchers(), 1);
}

/// Combined policies fail with a composite error, which cache-error handling
/// does not surface.
#[tokio::test]
async fn test_fetch_throw_cache_errors_ignores_composite() {
    init_tracing();
    for policy in [FetchPolicy::CacheFirst, FetchPolicy::NetworkFirst] {
        let (client, _transport) = new_client();
        let mut watch = watch_initial(&client, policy, WatchErrorHandling::ThrowCacheErrors);
        assert_no_emission(&mut watch).await;
        assert_eq!(client.watchers().active_watchers(), 1, "{policy:?}");
    }
}

#[tokio::test]
async fn test_fetch_throw_network_errors() {
    init_tracing();
    for policy in [FetchPolicy::NetworkOnly, FetchPolicy::NetworkFirst, FetchPolicy::CacheFirst] {
        let (client, _transport) = new_client();
        let mut watch = watch_initial(&client, policy, WatchErrorHandling::ThrowNetworkErrors);
        assert_network_error(&receive_or_timeout(&mut watch).await);
        assert_ended(&mut watch).await;
        assert_eq!(client.watchers().active_watchers(), 0, "{policy:?}");
    }

    let (client, _transport) = new_client();
    let mut watch = watch_initial(&client, FetchPolicy::CacheOnly, WatchErrorHandling::ThrowNetworkErrors);
    assert_no_emission(&mut watch).await;
}

#[tokio::test]
async fn test_fetch_throw_all() {
    init_tracing();
    let (client, _transport) = new_client();
    let mut watch = watch_initial(&client, FetchPolicy::CacheOnly, WatchErrorHandling::ThrowAll);
    assert_cache_error(&receive_or_timeout(&mut watch).await);
    assert_ended(&mut watch).await;

    let (client, _transport) = new_client();
    let mut watch = watch_initial(&client, FetchPolicy::NetworkOnly, WatchErrorHandling::ThrowAll);
    assert_network_error(&receive_or_timeout(&mut watch).await);
    assert_ended(&mut watch).await;

    for policy in [FetchPolicy::CacheFirst, FetchPolicy::NetworkFirst] {
        let (client, _transport) = new_client();
        let mut watch = watch_initial(&client, policy, WatchErrorHandling::ThrowAll);
        let item = receive_or_timeout(&mut watch).await;
        assert_composite_error(&item);
        let error = item.unwrap_err();
        assert!(error.cache_error().is_some());
        assert!(error.network_error().is_some());
        assert_ended(&mut watch).await;
    }
}

/// Every policy and handling combination delivers exactly the class the
/// handling table says, and ends the stream if and only if it delivers.
#[tokio::test]
async fn test_fetch_error_handling_matrix() {
    init_tracing();
    for policy in ALL_POLICIES {
        for handling in ALL_HANDLING {
            let (client, _transport) = new_client();
            let mut watch = watch_initial(&client, policy, handling);
            let expected = surfaced_class(handling, exhausted_class(policy));

            match expected {
                Some(class) => {
                    let item = receive_or_timeout(&mut watch).await;
                    let error = item.expect_err("expected an error");
                    assert_eq!(ErrorClass::of(&error), class, "{policy:?} / {handling:?}");
                    assert_ended(&mut watch).await;
                }
                None => {
                    assert_no_emission(&mut watch).await;
                    assert_eq!(
                        client.watchers().active_watchers(),
                        1,
                        "{policy:?} / {handling:?}"
                    );
                }
            }
        }
    }
}

// ============================================================================
// REFETCH
// ============================================================================

#[tokio::test]
async fn test_refetch_ignore_all_errors() {
    init_tracing();
    let (client, transport) = new_client();
    let mut watch = watch_with_baseline(&client, &transport, WatchErrorHandling::Ignore).await;

    trigger_refetch(&client);
    assert_no_emission(&mut watch).await;
    assert_eq!(transport.call_count(), 2);

    let info = client.watchers().watcher_info(&watch.id()).unwrap();
    assert!(info.has_baseline);
    assert_eq!(info.emissions, 1);
}

#[tokio::test]
async fn test_refetch_throw_cache_errors_ignores_network_failure() {
    init_tracing();
    let (client, transport) = new_client();
    let mut watch =
        watch_with_baseline(&client, &transport, WatchErrorHandling::ThrowCacheErrors).await;

    trigger_refetch(&client);
    assert_no_emission(&mut watch).await;
    assert_eq!(client.watchers().active_watchers(), 1);
}

#[tokio::test]
async fn test_refetch_throw_cache_errors() {
    init_tracing();
    let (client, _transport) = new_client();
    let query = EpisodeHeroNameWithIdQuery::new(Episode::Empire);
    client
        .store()
        .write_operation(&query, &EpisodeHeroNameWithIdData::new("2001", "R2-D2"), true)
        .unwrap();

    let mut watch = client
        .query(query)
        .refetch_error_handling(WatchErrorHandling::ThrowCacheErrors)
        .watch();
    receive_or_timeout(&mut watch).await.unwrap();

    client
        .store()
        .remove(&normcache_core::CacheKey::new("2001"), false)
        .unwrap();
    assert_cache_error(&receive_or_timeout(&mut watch).await);
    assert_ended(&mut watch).await;
}

#[tokio::test]
async fn test_refetch_throw_network_errors() {
    init_tracing();
    let (client, transport) = new_client();
    let mut watch =
        watch_with_baseline(&client, &transport, WatchErrorHandling::ThrowNetworkErrors).await;

    trigger_refetch(&client);
    let item = receive_or_timeout(&mut watch).await;
    assert_network_error(&item);
    assert!(matches!(
        item,
        Err(FetchError::Network(normcache_core::NetworkError::NoResponse { .. }))
    ));
    assert_ended(&mut watch).await;
    assert_eq!(client.watchers().active_watchers(), 0);
}

#[tokio::test]
async fn test_refetch_throw_all() {
    init_tracing();
    let (client, transport) = new_client();
    let mut watch = watch_with_baseline(&client, &transport, WatchErrorHandling::ThrowAll).await;

    trigger_refetch(&client);
    assert_network_error(&receive_or_timeout(&mut watch).await);
    assert_ended(&mut watch).await;
}

/// Fetch handling and refetch handling are independent.
#[tokio::test]
async fn test_fetch_handling_does_not_apply_to_refetch() {
    init_tracing();
    let (client, transport) = new_client();
    let query = EpisodeHeroNameQuery::new(Episode::Empire);
    transport.enqueue_response(&query, &EpisodeHeroNameData::named("R2-D2"));

    let mut watch = client
        .query(query)
        .fetch_policy(FetchPolicy::NetworkOnly)
        .refetch_policy(FetchPolicy::NetworkOnly)
        .fetch_error_handling(WatchErrorHandling::ThrowAll)
        .refetch_error_handling(WatchErrorHandling::Ignore)
        .watch();
    receive_or_timeout(&mut watch).await.unwrap();

    trigger_refetch(&client);
    assert_no_emission(&mut watch).await;
    assert_eq!(client.watchers().active_watchers(), 1);
}
