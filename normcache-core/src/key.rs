//! Cache keys and the pluggable key generation capability.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::borrow::Borrow;
use std::fmt;

/// Canonical identity of a normalized record.
///
/// Keys are immutable once created. Two records with equal keys are the
/// same record, whichever operation wrote them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    pub const QUERY_ROOT: &'static str = "QUERY_ROOT";
    pub const MUTATION_ROOT: &'static str = "MUTATION_ROOT";
    pub const SUBSCRIPTION_ROOT: &'static str = "SUBSCRIPTION_ROOT";

    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Root record for query operations.
    pub fn query_root() -> Self {
        Self::new(Self::QUERY_ROOT)
    }

    /// Root record for mutation operations.
    pub fn mutation_root() -> Self {
        Self::new(Self::MUTATION_ROOT)
    }

    /// Root record for subscription operations.
    pub fn subscription_root() -> Self {
        Self::new(Self::SUBSCRIPTION_ROOT)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true for one of the three operation root keys.
    pub fn is_root(&self) -> bool {
        matches!(
            self.0.as_str(),
            Self::QUERY_ROOT | Self::MUTATION_ROOT | Self::SUBSCRIPTION_ROOT
        )
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CacheKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for CacheKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl Borrow<str> for CacheKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Everything a key generator may look at when deciding an object's key.
#[derive(Debug, Clone, Copy)]
pub struct ObjectContext<'a> {
    /// `__typename` from the data, or the declared type of the field.
    pub typename: Option<&'a str>,
    /// The object's fields as they appear in the response.
    pub fields: &'a Map<String, Value>,
    /// Key of the record holding the field this object was found under.
    pub parent_key: &'a CacheKey,
    /// Storage key (name plus arguments) of that field.
    pub field_key: &'a str,
}

impl<'a> ObjectContext<'a> {
    pub fn field(&self, name: &str) -> Option<&'a Value> {
        self.fields.get(name)
    }
}

/// Maps a resolved object to the key of the record it normalizes into.
///
/// Returning `None` means the object has no identity of its own and is
/// embedded inline in its parent record.
pub trait CacheKeyGenerator: Send + Sync {
    fn key_for(&self, context: &ObjectContext<'_>) -> Option<CacheKey>;
}

/// Uses the object's `id` field (or another configured field) as its key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdCacheKeyGenerator {
    id_field: String,
    prefix_typename: bool,
}

impl Default for IdCacheKeyGenerator {
    fn default() -> Self {
        Self {
            id_field: "id".to_string(),
            prefix_typename: false,
        }
    }
}

impl IdCacheKeyGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the identity from a field other than `id`.
    pub fn with_id_field(mut self, field: impl Into<String>) -> Self {
        self.id_field = field.into();
        self
    }

    /// Produce `Typename:id` keys instead of bare ids.
    pub fn with_typename_prefix(mut self, enabled: bool) -> Self {
        self.prefix_typename = enabled;
        self
    }
}

impl CacheKeyGenerator for IdCacheKeyGenerator {
    fn key_for(&self, context: &ObjectContext<'_>) -> Option<CacheKey> {
        let id = match context.field(&self.id_field)? {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };

        match (self.prefix_typename, context.typename) {
            (true, Some(typename)) => Some(CacheKey::new(format!("{typename}:{id}"))),
            _ => Some(CacheKey::new(id)),
        }
    }
}

/// Adapts a closure into a [`CacheKeyGenerator`].
pub struct FnCacheKeyGenerator<F>(F);

impl<F> FnCacheKeyGenerator<F>
where
    F: Fn(&ObjectContext<'_>) -> Option<CacheKey> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> CacheKeyGenerator for FnCacheKeyGenerator<F>
where
    F: Fn(&ObjectContext<'_>) -> Option<CacheKey> + Send + Sync,
{
    fn key_for(&self, context: &ObjectContext<'_>) -> Option<CacheKey> {
        (self.0)(context)
    }
}

impl<F> fmt::Debug for FnCacheKeyGenerator<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnCacheKeyGenerator").finish_non_exhaustive()
    }
}
