//! Watermarks, change sets and dependency sets.
//!
//! Every committed write transaction advances the store watermark and is
//! published once as a [`ChangedKeySet`]. Reads report the watermark of the
//! snapshot they observed together with the [`DependencySet`] of keys they
//! visited, which is what watchers compare publications against.

use crate::key::CacheKey;
use crate::Timestamp;
use chrono::Utc;
use std::collections::HashSet;

/// A point in the store's write history.
///
/// Watermarks are monotonically increasing. A read at watermark `w`
/// reflects every transaction that committed at or below `w`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Watermark {
    /// Monotonically increasing sequence number.
    /// Each committing transaction increments this value.
    pub sequence: u64,
    /// When this watermark was observed.
    pub observed_at: Timestamp,
}

impl Watermark {
    /// Create a new watermark with the given sequence number.
    pub fn new(sequence: u64) -> Self {
        Self {
            sequence,
            observed_at: Utc::now(),
        }
    }

    /// Create a zero watermark (empty store, nothing committed).
    pub fn zero() -> Self {
        Self {
            sequence: 0,
            observed_at: Timestamp::UNIX_EPOCH,
        }
    }

    /// The watermark the next committing transaction will carry.
    pub fn next(&self) -> Self {
        Self::new(self.sequence + 1)
    }

    /// Check if this watermark is newer than another.
    pub fn is_newer_than(&self, other: &Watermark) -> bool {
        self.sequence > other.sequence
    }
}

impl Default for Watermark {
    fn default() -> Self {
        Self::zero()
    }
}

/// Keys touched (created or field-modified) by one write transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangedKeySet {
    watermark: Watermark,
    keys: HashSet<CacheKey>,
}

impl ChangedKeySet {
    pub fn new(watermark: Watermark, keys: HashSet<CacheKey>) -> Self {
        Self { watermark, keys }
    }

    /// A transaction that changed nothing; it does not advance the watermark.
    pub fn unchanged(watermark: Watermark) -> Self {
        Self::new(watermark, HashSet::new())
    }

    pub fn watermark(&self) -> Watermark {
        self.watermark
    }

    pub fn keys(&self) -> &HashSet<CacheKey> {
        &self.keys
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.keys.contains(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Fold a later publication into this one, keeping the later watermark.
    pub fn absorb(&mut self, later: ChangedKeySet) {
        self.watermark = self.watermark.max(later.watermark);
        self.keys.extend(later.keys);
    }
}

/// Keys read while reconstructing one result, following references.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencySet {
    keys: HashSet<CacheKey>,
}

impl DependencySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: CacheKey) -> bool {
        self.keys.insert(key)
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.keys.contains(key)
    }

    pub fn keys(&self) -> &HashSet<CacheKey> {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Returns true when a publication touched at least one of these keys.
    pub fn intersects(&self, changed: &ChangedKeySet) -> bool {
        let (small, large) = if self.keys.len() <= changed.keys.len() {
            (&self.keys, &changed.keys)
        } else {
            (&changed.keys, &self.keys)
        };
        small.iter().any(|key| large.contains(key))
    }
}

impl FromIterator<CacheKey> for DependencySet {
    fn from_iter<I: IntoIterator<Item = CacheKey>>(iter: I) -> Self {
        Self {
            keys: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(names: &[&str]) -> HashSet<CacheKey> {
        names.iter().map(|n| CacheKey::new(*n)).collect()
    }

    #[test]
    fn test_watermark_ordering() {
        let zero = Watermark::zero();
        let one = zero.next();
        assert!(one.is_newer_than(&zero));
        assert!(!zero.is_newer_than(&one));
        assert_eq!(one.sequence, 1);
    }

    #[test]
    fn test_dependency_intersection() {
        let deps: DependencySet = keys(&["QUERY_ROOT", "2001"]).into_iter().collect();
        let touching = ChangedKeySet::new(Watermark::new(3), keys(&["2001", "1000"]));
        let disjoint = ChangedKeySet::new(Watermark::new(4), keys(&["Starship1"]));

        assert!(deps.intersects(&touching));
        assert!(!deps.intersects(&disjoint));
        assert!(!DependencySet::new().intersects(&touching));
    }

    #[test]
    fn test_absorb_keeps_latest_watermark() {
        let mut first = ChangedKeySet::new(Watermark::new(2), keys(&["a"]));
        first.absorb(ChangedKeySet::new(Watermark::new(5), keys(&["b"])));
        assert_eq!(first.watermark().sequence, 5);
        assert_eq!(first.len(), 2);
    }
}
