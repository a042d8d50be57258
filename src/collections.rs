//! Named collections attached to a transaction.
//!
//! A [`Collection`] is an ordered sequence of key/value entries; multiple
//! entries may share a key. Rules address entries through a [`KeySelector`]
//! (whole collection, exact key, or regex over keys) minus a per-variable
//! exception list.

use regex::Regex;

/// One satisfied operator match: which collection entry matched, and the
/// (transformed) value the operator saw.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct MatchData {
    /// Collection the value came from.
    pub collection: String,
    /// Key of the matching entry ("" for single-valued collections).
    pub key: String,
    /// The value presented to the operator.
    pub value: String,
}

impl MatchData {
    /// Match data with all fields empty, denoting a match on absence.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Whether this records a match on absence.
    pub fn is_empty(&self) -> bool {
        self.collection.is_empty() && self.key.is_empty() && self.value.is_empty()
    }
}

/// How a rule variable selects keys within a collection.
#[derive(Debug, Clone)]
pub enum KeySelector {
    /// The entire collection.
    Entire,
    /// A single key. May contain `%{...}` macros, expanded per transaction.
    Exact(String),
    /// All keys matching a regex.
    Pattern(Regex),
}

impl KeySelector {
    /// The exact key name, if this selector names one.
    pub fn exact(&self) -> Option<&str> {
        match self {
            KeySelector::Exact(k) => Some(k),
            _ => None,
        }
    }
}

/// A named, ordered multimap of string entries. Key comparisons are ASCII
/// case-insensitive, matching header-name semantics.
#[derive(Debug, Clone, Default)]
pub struct Collection {
    name: String,
    entries: Vec<(String, String)>,
}

impl Collection {
    /// Create an empty collection with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Vec::new(),
        }
    }

    /// Collection name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Append an entry, keeping any existing entries for the same key.
    pub fn add(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.push((key.into(), value.into()));
    }

    /// Replace every entry for `key` with a single entry.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        self.entries.retain(|(k, _)| !k.eq_ignore_ascii_case(&key));
        self.entries.push((key, value.into()));
    }

    /// Remove every entry for `key`.
    pub fn remove(&mut self, key: &str) {
        self.entries.retain(|(k, _)| !k.eq_ignore_ascii_case(key));
    }

    /// Remove every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// All values stored under `key`, in insertion order.
    pub fn get(&self, key: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// First value stored under `key`; an empty key returns the first entry
    /// of the collection regardless of its key.
    pub fn get_first(&self, key: &str) -> Option<&str> {
        if key.is_empty() {
            self.entries.first().map(|(_, v)| v.as_str())
        } else {
            self.entries
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(key))
                .map(|(_, v)| v.as_str())
        }
    }

    /// First value under `key`, or "" when absent.
    pub fn first_string(&self, key: &str) -> &str {
        self.get_first(key).unwrap_or("")
    }

    /// First value under `key` parsed as an integer, or 0.
    pub fn first_int(&self, key: &str) -> i64 {
        self.first_string(key).parse().unwrap_or(0)
    }

    /// Add `amount` to the integer stored under `key` (missing counts as 0).
    pub fn increment(&mut self, key: &str, amount: i64) {
        let current = self.first_int(key);
        self.set(key.to_string(), (current + amount).to_string());
    }

    /// Total entry count.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the collection has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries in insertion order.
    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    /// Resolve a selector against this collection, subtracting `exceptions`.
    ///
    /// Exceptions only ever remove keys; an exact selector naming an excepted
    /// key resolves to nothing.
    pub fn find(&self, selector: &KeySelector, exceptions: &[String]) -> Vec<MatchData> {
        let excluded = |key: &str| exceptions.iter().any(|e| e.eq_ignore_ascii_case(key));
        match selector {
            KeySelector::Entire => self
                .entries
                .iter()
                .filter(|(k, _)| !excluded(k))
                .map(|(k, v)| self.match_data(k, v))
                .collect(),
            KeySelector::Exact(key) => {
                if excluded(key) {
                    return Vec::new();
                }
                self.entries
                    .iter()
                    .filter(|(k, _)| k.eq_ignore_ascii_case(key))
                    .map(|(k, v)| self.match_data(k, v))
                    .collect()
            }
            KeySelector::Pattern(re) => self
                .entries
                .iter()
                .filter(|(k, _)| re.is_match(k) && !excluded(k))
                .map(|(k, v)| self.match_data(k, v))
                .collect(),
        }
    }

    fn match_data(&self, key: &str, value: &str) -> MatchData {
        MatchData {
            collection: self.name.clone(),
            key: key.to_string(),
            value: value.to_string(),
        }
    }
}
