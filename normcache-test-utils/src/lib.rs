//! normcache Test Utilities
//!
//! Centralized test infrastructure for the normcache workspace:
//! - A queue-backed mock network transport
//! - Star Wars operations and data fixtures
//! - Proptest generators for records and policies
//! - Stream assertions for watchers

// Re-export core types for convenience
pub use normcache_core::{
    CacheError, CacheKey, ChangedKeySet, DependencySet, FetchError, FetchPolicy, FieldValue,
    IdCacheKeyGenerator, NetworkError, NetworkTransport, Operation, OperationRequest,
    OperationResult, Record, RecordBatch, SelectionSet, StoreConfig, WatchErrorHandling,
    WatchOptions,
};
pub use normcache_storage::{ApolloClient, ApolloStore, Watch};

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

// ============================================================================
// MOCK TRANSPORT
// ============================================================================

/// Network transport that answers from a FIFO queue of canned responses.
///
/// Each call takes the next queued entry regardless of which operation is
/// executed. An empty queue answers with [`NetworkError::NoResponse`].
#[derive(Debug, Default)]
pub struct QueueTestNetworkTransport {
    queue: Mutex<VecDeque<Result<Value, NetworkError>>>,
    requests: Mutex<Vec<OperationRequest>>,
    calls: AtomicUsize,
}

impl QueueTestNetworkTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn queue(&self) -> MutexGuard<'_, VecDeque<Result<Value, NetworkError>>> {
        self.queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue a successful response carrying `data` for `operation`.
    pub fn enqueue_response<O: Operation>(&self, operation: &O, data: &O::Data) {
        let entry = operation
            .encode_data(data)
            .map(|data| json!({ "data": data }))
            .map_err(|e| NetworkError::InvalidResponse {
                operation: operation.name().to_string(),
                reason: e.to_string(),
            });
        self.queue().push_back(entry);
    }

    /// Queue a raw response body.
    pub fn enqueue_body(&self, body: Value) {
        self.queue().push_back(Ok(body));
    }

    /// Queue a response with null data and one GraphQL error.
    pub fn enqueue_graphql_error(&self, message: &str) {
        self.enqueue_body(json!({ "data": null, "errors": [{ "message": message }] }));
    }

    /// Queue a transport failure.
    pub fn enqueue_error(&self, error: NetworkError) {
        self.queue().push_back(Err(error));
    }

    /// Number of `execute` calls so far, answered or not.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Responses still waiting in the queue.
    pub fn pending(&self) -> usize {
        self.queue().len()
    }

    /// Every request seen, in call order.
    pub fn requests(&self) -> Vec<OperationRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl NetworkTransport for QueueTestNetworkTransport {
    async fn execute(&self, request: &OperationRequest) -> Result<Value, NetworkError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(request.clone());

        match self.queue().pop_front() {
            Some(entry) => entry,
            None => Err(NetworkError::NoResponse {
                operation: request.name.clone(),
            }),
        }
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Star Wars operations and canned data for common testing scenarios.

    use super::*;
    use normcache_core::Field;
    use serde::{Deserialize, Serialize};
    use std::sync::Arc;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(rename_all = "UPPERCASE")]
    pub enum Episode {
        NewHope,
        Empire,
        Jedi,
    }

    impl Episode {
        pub fn as_str(&self) -> &'static str {
            match self {
                Self::NewHope => "NEWHOPE",
                Self::Empire => "EMPIRE",
                Self::Jedi => "JEDI",
            }
        }
    }

    fn hero_field(episode: Episode, selections: Vec<Field>) -> Field {
        Field::object("hero", "Character", SelectionSet::new(selections))
            .with_argument("episode", episode.as_str())
    }

    fn id_and_name() -> Vec<Field> {
        vec![Field::scalar("id"), Field::scalar("name")]
    }

    // ------------------------------------------------------------------------
    // EpisodeHeroName: hero { name }, no identity, stored inline
    // ------------------------------------------------------------------------

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct HeroName {
        pub name: String,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct EpisodeHeroNameData {
        pub hero: Option<HeroName>,
    }

    impl EpisodeHeroNameData {
        pub fn named(name: &str) -> Self {
            Self {
                hero: Some(HeroName {
                    name: name.to_string(),
                }),
            }
        }

        pub fn hero_name(&self) -> Option<&str> {
            self.hero.as_ref().map(|h| h.name.as_str())
        }
    }

    #[derive(Debug, Clone)]
    pub struct EpisodeHeroNameQuery {
        pub episode: Episode,
        selections: SelectionSet,
    }

    impl EpisodeHeroNameQuery {
        pub fn new(episode: Episode) -> Self {
            Self {
                episode,
                selections: SelectionSet::new(vec![hero_field(episode, vec![Field::scalar("name")])]),
            }
        }
    }

    impl Operation for EpisodeHeroNameQuery {
        type Data = EpisodeHeroNameData;

        fn name(&self) -> &str {
            "EpisodeHeroName"
        }

        fn selections(&self) -> &SelectionSet {
            &self.selections
        }

        fn variables(&self) -> Value {
            json!({ "episode": self.episode })
        }

        fn document(&self) -> &str {
            "query EpisodeHeroName($episode: Episode) { hero(episode: $episode) { name } }"
        }
    }

    // ------------------------------------------------------------------------
    // EpisodeHeroNameWithId: hero { id name }
    // ------------------------------------------------------------------------

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct CharacterWithId {
        pub id: String,
        pub name: String,
    }

    impl CharacterWithId {
        pub fn new(id: &str, name: &str) -> Self {
            Self {
                id: id.to_string(),
                name: name.to_string(),
            }
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct EpisodeHeroNameWithIdData {
        pub hero: Option<CharacterWithId>,
    }

    impl EpisodeHeroNameWithIdData {
        pub fn new(id: &str, name: &str) -> Self {
            Self {
                hero: Some(CharacterWithId::new(id, name)),
            }
        }

        pub fn hero_name(&self) -> Option<&str> {
            self.hero.as_ref().map(|h| h.name.as_str())
        }
    }

    #[derive(Debug, Clone)]
    pub struct EpisodeHeroNameWithIdQuery {
        pub episode: Episode,
        selections: SelectionSet,
    }

    impl EpisodeHeroNameWithIdQuery {
        pub fn new(episode: Episode) -> Self {
            Self {
                episode,
                selections: SelectionSet::new(vec![hero_field(episode, id_and_name())]),
            }
        }
    }

    impl Operation for EpisodeHeroNameWithIdQuery {
        type Data = EpisodeHeroNameWithIdData;

        fn name(&self) -> &str {
            "EpisodeHeroNameWithId"
        }

        fn selections(&self) -> &SelectionSet {
            &self.selections
        }

        fn variables(&self) -> Value {
            json!({ "episode": self.episode })
        }

        fn document(&self) -> &str {
            "query EpisodeHeroNameWithId($episode: Episode) { hero(episode: $episode) { id name } }"
        }
    }

    // ------------------------------------------------------------------------
    // HeroAndFriendsNamesWithIDs: hero { id name friends { id name } }
    // ------------------------------------------------------------------------

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct HeroWithFriends {
        pub id: String,
        pub name: String,
        pub friends: Option<Vec<Option<CharacterWithId>>>,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct HeroAndFriendsNamesWithIdsData {
        pub hero: Option<HeroWithFriends>,
    }

    impl HeroAndFriendsNamesWithIdsData {
        pub fn new(id: &str, name: &str, friends: &[(&str, &str)]) -> Self {
            Self {
                hero: Some(HeroWithFriends {
                    id: id.to_string(),
                    name: name.to_string(),
                    friends: Some(
                        friends
                            .iter()
                            .map(|(id, name)| Some(CharacterWithId::new(id, name)))
                            .collect(),
                    ),
                }),
            }
        }
    }

    #[derive(Debug, Clone)]
    pub struct HeroAndFriendsNamesWithIdsQuery {
        pub episode: Episode,
        selections: SelectionSet,
    }

    impl HeroAndFriendsNamesWithIdsQuery {
        pub fn new(episode: Episode) -> Self {
            let mut fields = id_and_name();
            fields.push(Field::object(
                "friends",
                "Character",
                SelectionSet::new(id_and_name()),
            ));
            Self {
                episode,
                selections: SelectionSet::new(vec![hero_field(episode, fields)]),
            }
        }
    }

    impl Operation for HeroAndFriendsNamesWithIdsQuery {
        type Data = HeroAndFriendsNamesWithIdsData;

        fn name(&self) -> &str {
            "HeroAndFriendsNamesWithIDs"
        }

        fn selections(&self) -> &SelectionSet {
            &self.selections
        }

        fn variables(&self) -> Value {
            json!({ "episode": self.episode })
        }

        fn document(&self) -> &str {
            "query HeroAndFriendsNamesWithIDs($episode: Episode) { hero(episode: $episode) { id name friends { id name } } }"
        }
    }

    // ------------------------------------------------------------------------
    // StarshipById: starship(id:) { id name }
    // ------------------------------------------------------------------------

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct StarshipByIdData {
        pub starship: Option<CharacterWithId>,
    }

    impl StarshipByIdData {
        pub fn new(id: &str, name: &str) -> Self {
            Self {
                starship: Some(CharacterWithId::new(id, name)),
            }
        }
    }

    #[derive(Debug, Clone)]
    pub struct StarshipByIdQuery {
        pub id: String,
        selections: SelectionSet,
    }

    impl StarshipByIdQuery {
        pub fn new(id: &str) -> Self {
            Self {
                id: id.to_string(),
                selections: SelectionSet::new(vec![Field::object(
                    "starship",
                    "Starship",
                    SelectionSet::new(id_and_name()),
                )
                .with_argument("id", id)]),
            }
        }
    }

    impl Operation for StarshipByIdQuery {
        type Data = StarshipByIdData;

        fn name(&self) -> &str {
            "StarshipById"
        }

        fn selections(&self) -> &SelectionSet {
            &self.selections
        }

        fn variables(&self) -> Value {
            json!({ "id": self.id })
        }

        fn document(&self) -> &str {
            "query StarshipById($id: ID!) { starship(id: $id) { id name } }"
        }
    }

    // ------------------------------------------------------------------------
    // Canned data
    // ------------------------------------------------------------------------

    /// R2-D2 as hero, with Luke, Han and Leia as friends.
    pub fn hero_and_friends_data() -> HeroAndFriendsNamesWithIdsData {
        HeroAndFriendsNamesWithIdsData::new(
            "2001",
            "R2-D2",
            &[("1000", "Luke Skywalker"), ("1002", "Han Solo"), ("1003", "Leia Organa")],
        )
    }

    /// Luke as hero, with record 2001 renamed to Artoo among the friends.
    pub fn hero_and_friends_name_changed_data() -> HeroAndFriendsNamesWithIdsData {
        HeroAndFriendsNamesWithIdsData::new(
            "1000",
            "Luke Skywalker",
            &[("2001", "Artoo"), ("1002", "Han Solo"), ("1003", "Leia Organa")],
        )
    }

    /// A store keyed by `id` fields.
    pub fn new_store() -> ApolloStore {
        ApolloStore::new(IdCacheKeyGenerator::new())
    }

    /// A client over a fresh store and an empty response queue.
    pub fn new_client() -> (ApolloClient, Arc<QueueTestNetworkTransport>) {
        let transport = Arc::new(QueueTestNetworkTransport::new());
        let client = ApolloClient::new(new_store(), transport.clone());
        (client, transport)
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest generators for records and policies.

    use super::*;
    use proptest::prelude::*;

    pub fn arb_cache_key() -> impl Strategy<Value = CacheKey> {
        "[0-9]{1,3}".prop_map(CacheKey::new)
    }

    pub fn arb_field_name() -> impl Strategy<Value = String> {
        "[a-f]".prop_map(String::from)
    }

    pub fn arb_scalar() -> impl Strategy<Value = Value> {
        prop_oneof![
            any::<bool>().prop_map(Value::from),
            any::<i64>().prop_map(Value::from),
            "[a-zA-Z0-9 ]{0,12}".prop_map(Value::from),
        ]
    }

    pub fn arb_field_value() -> impl Strategy<Value = FieldValue> {
        let leaf = prop_oneof![
            Just(FieldValue::Null),
            arb_scalar().prop_map(FieldValue::Scalar),
            arb_cache_key().prop_map(FieldValue::Reference),
        ];
        leaf.prop_recursive(2, 12, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(FieldValue::List),
                prop::collection::vec((arb_field_name(), inner), 0..3)
                    .prop_map(|fields| FieldValue::Object(fields.into_iter().collect())),
            ]
        })
    }

    pub fn arb_record() -> impl Strategy<Value = Record> {
        (
            arb_cache_key(),
            prop::collection::vec((arb_field_name(), arb_field_value()), 0..6),
        )
            .prop_map(|(key, fields)| {
                fields
                    .into_iter()
                    .fold(Record::new(key), |record, (name, value)| record.with_field(name, value))
            })
    }

    pub fn arb_record_batch() -> impl Strategy<Value = RecordBatch> {
        prop::collection::vec(arb_record(), 0..8).prop_map(|records| records.into_iter().collect())
    }

    pub fn arb_fetch_policy() -> impl Strategy<Value = FetchPolicy> {
        prop_oneof![
            Just(FetchPolicy::CacheOnly),
            Just(FetchPolicy::NetworkOnly),
            Just(FetchPolicy::CacheFirst),
            Just(FetchPolicy::NetworkFirst),
        ]
    }

    pub fn arb_watch_error_handling() -> impl Strategy<Value = WatchErrorHandling> {
        prop_oneof![
            Just(WatchErrorHandling::Ignore),
            Just(WatchErrorHandling::ThrowCacheErrors),
            Just(WatchErrorHandling::ThrowNetworkErrors),
            Just(WatchErrorHandling::ThrowAll),
        ]
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Stream and error assertions for watcher tests.

    use super::*;
    use std::fmt::Debug;
    use std::time::Duration;
    use tokio_stream::{Stream, StreamExt};

    /// How long to wait for an expected emission.
    pub const RECEIVE_TIMEOUT: Duration = Duration::from_secs(2);

    /// How long a stream must stay quiet to count as emitting nothing.
    pub const QUIET_PERIOD: Duration = Duration::from_millis(200);

    /// Wait for the next item, panicking on timeout or end of stream.
    pub async fn receive_or_timeout<S>(stream: &mut S) -> S::Item
    where
        S: Stream + Unpin,
    {
        match tokio::time::timeout(RECEIVE_TIMEOUT, stream.next()).await {
            Ok(Some(item)) => item,
            Ok(None) => panic!("Stream ended before an item was received"),
            Err(_) => panic!("Timed out after {:?} waiting for an item", RECEIVE_TIMEOUT),
        }
    }

    /// Assert that no item arrives within [`QUIET_PERIOD`]. A stream that
    /// has ended emits nothing and passes.
    pub async fn assert_no_emission<S>(stream: &mut S)
    where
        S: Stream + Unpin,
        S::Item: Debug,
    {
        if let Ok(Some(item)) = tokio::time::timeout(QUIET_PERIOD, stream.next()).await {
            panic!("Expected no emission, got {:?}", item);
        }
    }

    /// Assert that the stream has ended.
    pub async fn assert_ended<S>(stream: &mut S)
    where
        S: Stream + Unpin,
        S::Item: Debug,
    {
        match tokio::time::timeout(RECEIVE_TIMEOUT, stream.next()).await {
            Ok(None) => {}
            Ok(Some(item)) => panic!("Expected end of stream, got {:?}", item),
            Err(_) => panic!("Stream still open after {:?}", RECEIVE_TIMEOUT),
        }
    }

    pub fn assert_cache_error<T: Debug>(result: &Result<T, FetchError>) {
        assert!(
            matches!(result, Err(FetchError::Cache(_))),
            "Expected cache error, got {:?}",
            result
        );
    }

    pub fn assert_network_error<T: Debug>(result: &Result<T, FetchError>) {
        assert!(
            matches!(result, Err(FetchError::Network(_))),
            "Expected network error, got {:?}",
            result
        );
    }

    pub fn assert_composite_error<T: Debug>(result: &Result<T, FetchError>) {
        assert!(
            matches!(result, Err(FetchError::Composite { .. })),
            "Expected composite error, got {:?}",
            result
        );
    }
}

// ============================================================================
// TRACING
// ============================================================================

/// Install a test-friendly tracing subscriber, filtered by `RUST_LOG`.
///
/// Safe to call from every test; only the first call installs anything.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

// ============================================================================
// TESTS
// ============================================================================
