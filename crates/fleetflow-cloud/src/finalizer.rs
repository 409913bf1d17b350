//! Finalizer bookkeeping for cluster records
//!
//! A finalizer is a persisted marker meaning "this provider still owns a
//! remote resource that must be deleted before the cluster goes away".
//! Providers enumerate their finalizers as a small `FinalizerKind` enum;
//! tokens written by other controllers are carried through untouched.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeSet, HashSet};
use std::hash::Hash;

/// An enumerated finalizer owned by a provider
pub trait FinalizerKind: Copy + Eq + Hash + Ord + Send + Sync + 'static {
    /// Serialized token, e.g. `fleetflow.dev/cleanup-azure-vnet`
    fn token(&self) -> &'static str;

    /// Parse a serialized token, `None` if it belongs to someone else
    fn from_token(token: &str) -> Option<Self>;
}

/// Set of finalizers on a cluster record
///
/// `insert` and `remove` are idempotent and report whether the set changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizerSet<K: FinalizerKind> {
    owned: HashSet<K>,
    foreign: BTreeSet<String>,
}

impl<K: FinalizerKind> Default for FinalizerSet<K> {
    fn default() -> Self {
        Self {
            owned: HashSet::new(),
            foreign: BTreeSet::new(),
        }
    }
}

impl<K: FinalizerKind> FinalizerSet<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, kind: K) -> bool {
        self.owned.contains(&kind)
    }

    pub fn insert(&mut self, kind: K) -> bool {
        self.owned.insert(kind)
    }

    pub fn remove(&mut self, kind: K) -> bool {
        self.owned.remove(&kind)
    }

    /// Number of provider-owned finalizers
    pub fn len(&self) -> usize {
        self.owned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owned.is_empty()
    }

    /// Provider-owned finalizers in `K`'s declared order
    pub fn kinds(&self) -> Vec<K> {
        let mut kinds: Vec<K> = self.owned.iter().copied().collect();
        kinds.sort();
        kinds
    }

    /// Tokens owned by other controllers
    pub fn foreign(&self) -> impl Iterator<Item = &str> {
        self.foreign.iter().map(String::as_str)
    }

    /// All tokens in their serialized order
    pub fn tokens(&self) -> Vec<String> {
        self.kinds()
            .into_iter()
            .map(|k| k.token().to_string())
            .chain(self.foreign.iter().cloned())
            .collect()
    }

    fn insert_token(&mut self, token: String) {
        match K::from_token(&token) {
            Some(kind) => {
                self.owned.insert(kind);
            }
            None => {
                self.foreign.insert(token);
            }
        }
    }
}

impl<K: FinalizerKind> FromIterator<String> for FinalizerSet<K> {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        let mut set = Self::new();
        for token in iter {
            set.insert_token(token);
        }
        set
    }
}

impl<K: FinalizerKind> Serialize for FinalizerSet<K> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_seq(self.tokens())
    }
}

impl<'de, K: FinalizerKind> Deserialize<'de> for FinalizerSet<K> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let tokens = Vec::<String>::deserialize(deserializer)?;
        Ok(tokens.into_iter().collect())
    }
}
