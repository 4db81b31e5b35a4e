//! Word segmentation and keyword extraction.

use std::collections::{HashMap, HashSet};

use jieba_rs::{Jieba, KeywordExtract, TfIdf};
use tracing::debug;

use qa_core::TextConfig;

/// Weight per occurrence for keywords only the frequency pass found.
const FREQUENCY_WEIGHT: f32 = 0.5;

/// A query keyword and its weight.
#[derive(Debug, Clone, PartialEq)]
pub struct Keyword {
    pub term: String,
    pub weight: f32,
}

/// Segments text into filtered terms.
///
/// Segmentation uses the jieba dictionary with HMM for unknown words, so
/// Chinese text splits into words rather than characters or whitespace
/// runs. Filtering drops stopwords and single characters, except digits,
/// ASCII letters and the configured allowlist.
pub struct Tokenizer {
    jieba: Jieba,
    tfidf: TfIdf,
    stopwords: HashSet<String>,
    keep_single: HashSet<String>,
    allowed_pos: Vec<String>,
}

impl Tokenizer {
    /// Create a tokenizer with the default word lists.
    pub fn new() -> Self {
        Self::with_config(&TextConfig::default())
    }

    /// Create a tokenizer with configured word lists.
    pub fn with_config(config: &TextConfig) -> Self {
        Self {
            jieba: Jieba::new(),
            tfidf: TfIdf::default(),
            stopwords: config.stopwords.iter().map(|w| w.to_lowercase()).collect(),
            keep_single: config.keep_single_chars.iter().cloned().collect(),
            allowed_pos: config.allowed_pos.clone(),
        }
    }

    /// Split text into lowercase terms, in order of appearance.
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        let cleaned = clean(text);
        self.jieba
            .cut(&cleaned, true)
            .into_iter()
            .map(str::trim)
            .filter(|w| !w.is_empty())
            .map(str::to_lowercase)
            .filter(|w| self.keep(w))
            .collect()
    }

    /// BM25 query terms: the top-`k` keyword terms, each once.
    pub fn query_terms(&self, query: &str, k: usize) -> Vec<String> {
        self.extract_keywords(query, k)
            .into_iter()
            .map(|keyword| keyword.term)
            .collect()
    }

    /// Top-`k` query keywords by weight, descending.
    ///
    /// A TF-IDF pass over content words comes first; terms it missed are
    /// added with a frequency-based weight. Ties keep first-seen order.
    pub fn extract_keywords(&self, query: &str, k: usize) -> Vec<Keyword> {
        if k == 0 {
            return Vec::new();
        }

        let mut keywords: Vec<Keyword> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        let tagged = self
            .tfidf
            .extract_keywords(&self.jieba, query, k, self.allowed_pos.clone());
        for hit in tagged {
            let term = hit.keyword.trim().to_lowercase();
            if term.is_empty() || self.stopwords.contains(&term) {
                continue;
            }
            if seen.insert(term.clone()) {
                keywords.push(Keyword {
                    term,
                    weight: hit.weight as f32,
                });
            }
        }

        let mut order: Vec<String> = Vec::new();
        let mut counts: HashMap<String, usize> = HashMap::new();
        for term in self.tokenize(query) {
            let count = counts.entry(term.clone()).or_insert(0);
            if *count == 0 {
                order.push(term);
            }
            *count += 1;
        }

        for term in order {
            if term.chars().count() > 1 && !seen.contains(&term) {
                let freq = counts.get(&term).copied().unwrap_or(1);
                seen.insert(term.clone());
                keywords.push(Keyword {
                    term,
                    weight: freq as f32 * FREQUENCY_WEIGHT,
                });
            }
        }

        // Stable sort keeps first-seen order among equal weights
        keywords.sort_by(|a, b| {
            b.weight
                .partial_cmp(&a.weight)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        keywords.truncate(k);

        debug!(
            "Extracted keywords for {:?}: {:?}",
            query,
            keywords.iter().map(|k| k.term.as_str()).collect::<Vec<_>>()
        );

        keywords
    }

    /// Whether a segmented term survives filtering.
    fn keep(&self, term: &str) -> bool {
        if self.stopwords.contains(term) {
            return false;
        }

        let mut chars = term.chars();
        match (chars.next(), chars.next()) {
            (None, _) => false,
            (Some(c), None) => {
                c.is_ascii_digit() || c.is_ascii_alphabetic() || self.keep_single.contains(term)
            }
            (Some(_), Some(_)) => true,
        }
    }
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::new()
    }
}

fn is_han(c: char) -> bool {
    ('\u{4e00}'..='\u{9fa5}').contains(&c)
}

/// Replace everything but Han characters, ASCII alphanumerics and
/// whitespace with spaces, then collapse whitespace runs.
fn clean(text: &str) -> String {
    let replaced: String = text
        .chars()
        .map(|c| {
            if is_han(c) || c.is_ascii_alphanumeric() || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();
    replaced.split_whitespace().collect::<Vec<_>>().join(" ")
}
