//! Failure-tolerant fragment id lookup.
//!
//! Candidate ids coming back from the vector store do not always match the
//! ids the index was built with verbatim (whitespace, prefixes, renumbered
//! exports). [`IdResolver`] tries a fixed list of strategies in order and
//! stops at the first hit.

use std::collections::{HashMap, HashSet};

/// Prefixes removed by [`MatchStrategy::PrefixStripped`].
const STRIPPED_PREFIXES: &[&str] = &["doc_", "chunk_"];

/// Which strategy resolved an id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStrategy {
    /// Verbatim key.
    Exact,
    /// Remapping table filled at build time.
    Alias,
    /// Key equals the trimmed id.
    Trimmed,
    /// One of key and id contains the other.
    Substring,
    /// Keys agree after removing a known prefix.
    PrefixStripped,
    /// Keys share their last run of digits.
    NumericSuffix,
}

/// Maps loosely-formed ids onto index keys.
#[derive(Debug, Clone, Default)]
pub struct IdResolver {
    keys: Vec<String>,
    known: HashSet<String>,
    aliases: HashMap<String, String>,
    stripped: HashMap<String, String>,
    suffixes: HashMap<String, String>,
}

impl IdResolver {
    /// Create an empty resolver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an index key. Earlier keys win every ambiguous match.
    pub fn insert(&mut self, key: &str) {
        if key.is_empty() || !self.known.insert(key.to_string()) {
            return;
        }
        self.keys.push(key.to_string());

        self.stripped
            .entry(strip_prefix(key).to_string())
            .or_insert_with(|| key.to_string());
        if let Some(digits) = last_digit_run(key) {
            self.suffixes
                .entry(digits.to_string())
                .or_insert_with(|| key.to_string());
        }

        let lowered = key.to_lowercase();
        if lowered != key {
            self.alias(&lowered, key);
        }
    }

    /// Map `from` onto the registered key `to`. Ignored when `to` is unknown
    /// or `from` already resolves.
    pub fn alias(&mut self, from: &str, to: &str) {
        if from.is_empty() || !self.known.contains(to) || self.known.contains(from) {
            return;
        }
        self.aliases
            .entry(from.to_string())
            .or_insert_with(|| to.to_string());
    }

    /// Number of registered keys.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether no key is registered.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Resolve an id to a registered key.
    pub fn resolve(&self, id: &str) -> Option<(&str, MatchStrategy)> {
        if let Some(key) = self.known.get(id) {
            return Some((key.as_str(), MatchStrategy::Exact));
        }

        let trimmed = id.trim();
        if trimmed.is_empty() {
            return None;
        }

        if let Some(key) = self
            .aliases
            .get(trimmed)
            .or_else(|| self.aliases.get(&trimmed.to_lowercase()))
        {
            return Some((key.as_str(), MatchStrategy::Alias));
        }

        if let Some(key) = self.known.get(trimmed) {
            return Some((key.as_str(), MatchStrategy::Trimmed));
        }

        if let Some(key) = self
            .keys
            .iter()
            .find(|key| key.contains(trimmed) || trimmed.contains(key.as_str()))
        {
            return Some((key.as_str(), MatchStrategy::Substring));
        }

        if let Some(key) = self.stripped.get(strip_prefix(trimmed)) {
            return Some((key.as_str(), MatchStrategy::PrefixStripped));
        }

        last_digit_run(trimmed)
            .and_then(|digits| self.suffixes.get(digits))
            .map(|key| (key.as_str(), MatchStrategy::NumericSuffix))
    }
}

fn strip_prefix(id: &str) -> &str {
    STRIPPED_PREFIXES
        .iter()
        .find_map(|prefix| id.strip_prefix(prefix))
        .unwrap_or(id)
}

/// The last maximal run of ASCII digits in `id`.
fn last_digit_run(id: &str) -> Option<&str> {
    let end = id.rfind(|c: char| c.is_ascii_digit())? + 1;
    let start = id[..end]
        .char_indices()
        .rev()
        .find(|(_, c)| !c.is_ascii_digit())
        .map_or(0, |(i, c)| i + c.len_utf8());
    Some(&id[start..end])
}
