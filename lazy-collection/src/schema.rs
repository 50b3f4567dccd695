use alloc::collections::BTreeMap;
use alloc::string::String;

use crate::AttributeKey;

/// Default name of the synthetic pending-marker attribute.
pub const DEFAULT_PENDING_MARKER_NAME: &str = "waitingForValue";

/// Mapping from attribute key to attribute name.
///
/// Keys are kept ordered so the highest key (and therefore the pending-marker key) is cheap to
/// find.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AttributeSchema {
    entries: BTreeMap<AttributeKey, String>,
}

impl AttributeSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces an entry, returning the previous name.
    pub fn insert(&mut self, key: AttributeKey, name: impl Into<String>) -> Option<String> {
        self.entries.insert(key, name.into())
    }

    pub fn with(mut self, key: AttributeKey, name: impl Into<String>) -> Self {
        self.insert(key, name);
        self
    }

    pub fn get(&self, key: AttributeKey) -> Option<&str> {
        self.entries.get(&key).map(String::as_str)
    }

    pub fn contains_key(&self, key: AttributeKey) -> bool {
        self.entries.contains_key(&key)
    }

    /// Finds the key registered under `name`.
    pub fn key_of(&self, name: &str) -> Option<AttributeKey> {
        self.entries
            .iter()
            .find(|(_, n)| n.as_str() == name)
            .map(|(k, _)| *k)
    }

    pub fn max_key(&self) -> Option<AttributeKey> {
        self.entries.keys().next_back().copied()
    }

    /// The key a synthetic attribute appended to this schema would receive.
    ///
    /// `None` if the schema is empty or already holds `u32::MAX`.
    pub fn next_free_key(&self) -> Option<AttributeKey> {
        self.max_key()?.checked_next()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (AttributeKey, &str)> + '_ {
        self.entries.iter().map(|(k, n)| (*k, n.as_str()))
    }

    /// Returns a copy of this schema with the pending marker merged in.
    ///
    /// Existing entries are never altered; if `key` is already taken the schema is returned
    /// unchanged.
    pub fn with_pending_marker(&self, key: AttributeKey, name: &str) -> Self {
        let mut merged = self.clone();
        debug_assert!(
            !merged.contains_key(key),
            "pending marker key collides with a source key (key={key})"
        );
        merged.entries.entry(key).or_insert_with(|| String::from(name));
        merged
    }
}

impl<N: Into<String>> FromIterator<(AttributeKey, N)> for AttributeSchema {
    fn from_iter<T: IntoIterator<Item = (AttributeKey, N)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().map(|(k, n)| (k, n.into())).collect(),
        }
    }
}
