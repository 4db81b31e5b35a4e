//! BM25 lexical index over the fragment corpus.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use qa_core::{Bm25Config, Fragment, TimeRange};
use qa_text::Tokenizer;

use crate::resolve::{IdResolver, MatchStrategy};

/// Term frequencies and length of one indexed fragment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexEntry {
    /// Occurrences per term.
    pub term_freqs: HashMap<String, u32>,

    /// Number of terms.
    pub length: u32,
}

/// Corpus-wide aggregates derived from every [`IndexEntry`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GlobalStats {
    /// Number of indexed fragments.
    pub document_count: usize,

    /// Mean fragment length in terms.
    pub average_length: f32,

    /// Number of fragments containing each term.
    pub document_frequency: HashMap<String, u32>,
}

/// Diagnostic summary of a published index.
#[derive(Debug, Clone, Serialize)]
pub struct IndexSummary {
    pub generation: u64,
    pub fingerprint: String,
    pub documents: usize,
    pub vocabulary: usize,
    pub average_length: f32,
    pub dialogue_fragments: usize,
}

/// An immutable BM25 index.
///
/// Built in bulk from the whole corpus and never mutated afterwards; a
/// corpus change produces a new index that replaces this one.
#[derive(Debug, Clone)]
pub struct LexicalIndex {
    fragments: Vec<Arc<Fragment>>,
    entries: Vec<IndexEntry>,
    positions: HashMap<String, usize>,
    resolver: IdResolver,
    stats: GlobalStats,
    params: Bm25Config,
    generation: u64,
    fingerprint: String,
}

impl LexicalIndex {
    /// An index with no fragments.
    pub fn empty(params: &Bm25Config) -> Self {
        Self {
            fragments: Vec::new(),
            entries: Vec::new(),
            positions: HashMap::new(),
            resolver: IdResolver::new(),
            stats: GlobalStats::default(),
            params: params.clone(),
            generation: 0,
            fingerprint: fingerprint(&[]),
        }
    }

    /// Index the given fragments, in corpus order.
    ///
    /// Fragments repeating an earlier id are skipped.
    pub fn build(fragments: Vec<Arc<Fragment>>, tokenizer: &Tokenizer, params: &Bm25Config) -> Self {
        let fingerprint = fingerprint(&fragments);

        let mut kept = Vec::with_capacity(fragments.len());
        let mut entries = Vec::with_capacity(fragments.len());
        let mut positions = HashMap::with_capacity(fragments.len());
        let mut resolver = IdResolver::new();
        let mut document_frequency: HashMap<String, u32> = HashMap::new();
        let mut total_length: u64 = 0;

        for fragment in fragments {
            if positions.contains_key(&fragment.id) {
                warn!("Duplicate fragment id {:?}, keeping the first", fragment.id);
                continue;
            }

            let terms = tokenizer.tokenize(&fragment.content);
            let mut term_freqs: HashMap<String, u32> = HashMap::new();
            for term in &terms {
                *term_freqs.entry(term.clone()).or_insert(0) += 1;
            }
            for term in term_freqs.keys() {
                *document_frequency.entry(term.clone()).or_insert(0) += 1;
            }

            let length = terms.len() as u32;
            total_length += u64::from(length);

            positions.insert(fragment.id.clone(), kept.len());
            resolver.insert(&fragment.id);
            entries.push(IndexEntry { term_freqs, length });
            kept.push(fragment);
        }

        // Remap "<source>-<chunk>" style ids onto fragments with explicit chunk numbers
        for fragment in &kept {
            if let Some(chunk) = fragment.chunk_id {
                let alias = format!("{}-{}", fragment.display_source(), chunk);
                resolver.alias(&alias, &fragment.id);
            }
        }

        let document_count = kept.len();
        let average_length = if document_count > 0 {
            total_length as f32 / document_count as f32
        } else {
            0.0
        };

        debug!(
            "Built lexical index: {} fragments, {} terms, avg length {:.1}",
            document_count,
            document_frequency.len(),
            average_length
        );

        Self {
            fragments: kept,
            entries,
            positions,
            resolver,
            stats: GlobalStats {
                document_count,
                average_length,
                document_frequency,
            },
            params: params.clone(),
            generation: 0,
            fingerprint,
        }
    }

    pub(crate) fn with_generation(mut self, generation: u64) -> Self {
        self.generation = generation;
        self
    }

    /// Inverse document frequency, floored at `idf_floor`. Unknown terms are 0.
    pub fn idf(&self, term: &str) -> f32 {
        let df = match self.stats.document_frequency.get(term) {
            Some(&df) if df > 0 => df as f32,
            _ => return 0.0,
        };
        let n = self.stats.document_count as f32;
        let raw = ((n - df + 0.5) / (df + 0.5)).ln();
        raw.max(self.params.idf_floor)
    }

    /// BM25 score of a fragment for the given query terms.
    ///
    /// Unresolvable ids and zero-length fragments score 0.
    pub fn score(&self, terms: &[String], id: &str) -> f32 {
        if terms.is_empty() {
            return 0.0;
        }
        match self.position(id) {
            Some(pos) => self.score_entry(terms, &self.entries[pos]),
            None => {
                debug!("Fragment {:?} not in lexical index, scoring 0", id);
                0.0
            }
        }
    }

    fn score_entry(&self, terms: &[String], entry: &IndexEntry) -> f32 {
        if entry.length == 0 {
            return 0.0;
        }

        let k1 = self.params.k1;
        let b = self.params.b;
        let avg = if self.stats.average_length > 0.0 {
            self.stats.average_length
        } else {
            1.0
        };
        let norm = k1 * (1.0 - b + b * (entry.length as f32 / avg));

        terms
            .iter()
            .filter_map(|term| {
                let tf = *entry.term_freqs.get(term)? as f32;
                Some(self.idf(term) * tf * (k1 + 1.0) / (tf + norm))
            })
            .sum()
    }

    /// Top-`k` fragments with a positive score, best first. Ties keep corpus
    /// order.
    pub fn search(&self, terms: &[String], k: usize) -> Vec<(Arc<Fragment>, f32)> {
        if terms.is_empty() || k == 0 {
            return Vec::new();
        }

        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(pos, entry)| (pos, self.score_entry(terms, entry)))
            .filter(|(_, score)| *score > 0.0)
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        scored
            .into_iter()
            .map(|(pos, score)| (Arc::clone(&self.fragments[pos]), score))
            .collect()
    }

    /// Dialogue fragments lying inside `range`, earliest first.
    pub fn in_time_range(&self, range: TimeRange, k: usize) -> Vec<Arc<Fragment>> {
        let mut hits: Vec<(u32, &Arc<Fragment>)> = self
            .fragments
            .iter()
            .filter_map(|f| {
                let (start, end) = f.kind.time_bounds()?;
                range.contains(start, end).then_some((start, f))
            })
            .collect();

        hits.sort_by_key(|(start, _)| *start);
        hits.into_iter().take(k).map(|(_, f)| Arc::clone(f)).collect()
    }

    /// Look up a fragment, resolving loosely-formed ids.
    pub fn get(&self, id: &str) -> Option<&Arc<Fragment>> {
        self.position(id).map(|pos| &self.fragments[pos])
    }

    /// Index entry for a fragment id.
    pub fn entry(&self, id: &str) -> Option<&IndexEntry> {
        self.position(id).map(|pos| &self.entries[pos])
    }

    /// Which strategy resolves `id`, if any.
    pub fn resolve(&self, id: &str) -> Option<MatchStrategy> {
        self.resolver.resolve(id).map(|(_, strategy)| strategy)
    }

    fn position(&self, id: &str) -> Option<usize> {
        let (key, strategy) = self.resolver.resolve(id)?;
        if strategy != MatchStrategy::Exact {
            debug!("Resolved fragment id {:?} to {:?} via {:?}", id, key, strategy);
        }
        self.positions.get(key).copied()
    }

    /// Indexed fragments in corpus order.
    pub fn fragments(&self) -> &[Arc<Fragment>] {
        &self.fragments
    }

    /// Corpus-wide statistics.
    pub fn stats(&self) -> &GlobalStats {
        &self.stats
    }

    /// Sum of document frequencies over the vocabulary.
    pub fn total_document_frequency(&self) -> u64 {
        self.stats
            .document_frequency
            .values()
            .map(|&df| u64::from(df))
            .sum()
    }

    /// Number of indexed fragments.
    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    /// Whether the index holds no fragments.
    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Publication counter; 0 for an index never published.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// BLAKE3 digest of the corpus this index was built from.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Diagnostic summary.
    pub fn summary(&self) -> IndexSummary {
        IndexSummary {
            generation: self.generation,
            fingerprint: self.fingerprint.clone(),
            documents: self.stats.document_count,
            vocabulary: self.stats.document_frequency.len(),
            average_length: self.stats.average_length,
            dialogue_fragments: self
                .fragments
                .iter()
                .filter(|f| f.kind.time_bounds().is_some())
                .count(),
        }
    }
}

/// Digest of fragment ids and contents, in order.
pub fn fingerprint(fragments: &[Arc<Fragment>]) -> String {
    let mut hasher = blake3::Hasher::new();
    for fragment in fragments {
        hasher.update(fragment.id.as_bytes());
        hasher.update(&[0]);
        hasher.update(fragment.content.as_bytes());
        hasher.update(&[0]);
    }
    hex::encode(hasher.finalize().as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use qa_core::FragmentKind;
    use std::sync::OnceLock;

    fn tokenizer() -> &'static Tokenizer {
        static TOKENIZER: OnceLock<Tokenizer> = OnceLock::new();
        TOKENIZER.get_or_init(Tokenizer::new)
    }

    fn frag(id: &str, content: &str) -> Arc<Fragment> {
        Arc::new(Fragment::text(id, content, "notes.txt"))
    }

    fn terms(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    fn corpus() -> Vec<Arc<Fragment>> {
        vec![
            frag("a-0", "creativity matters"),
            frag("a-1", "creativity needs patience practice feedback iteration courage"),
            frag("a-2", "ownership borrowing lifetimes"),
        ]
    }

    fn index(fragments: Vec<Arc<Fragment>>) -> LexicalIndex {
        LexicalIndex::build(fragments, tokenizer(), &Bm25Config::default())
    }

    #[test]
    fn test_build_stats() {
        let index = index(corpus());
        let stats = index.stats();

        assert_eq!(stats.document_count, 3);
        assert_eq!(stats.document_frequency.get("creativity"), Some(&2));
        assert_eq!(stats.document_frequency.get("ownership"), Some(&1));
        assert_eq!(index.entry("a-0").map(|e| e.length), Some(2));
        assert!((stats.average_length - (2.0 + 7.0 + 3.0) / 3.0).abs() < 1e-5);
    }

    #[test]
    fn test_shorter_fragment_ranks_higher() {
        let index = index(corpus());
        let query = terms(&["creativity"]);

        let short = index.score(&query, "a-0");
        let long = index.score(&query, "a-1");
        assert!(short > 0.0);
        assert!(short > long);

        let hits = index.search(&query, 10);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0.id, "a-0");
        assert_eq!(hits[1].0.id, "a-1");
    }

    #[test]
    fn test_rare_term_outscores_common_term() {
        let index = index(corpus());
        assert!(index.idf("ownership") > index.idf("creativity"));
        assert_eq!(index.idf("creativity"), Bm25Config::default().idf_floor);
        assert_eq!(index.idf("unseen"), 0.0);
    }

    #[test]
    fn test_zero_scores() {
        let mut fragments = corpus();
        fragments.push(frag("a-3", "的 了 在"));
        let index = index(fragments);

        assert_eq!(index.score(&[], "a-0"), 0.0);
        assert_eq!(index.score(&terms(&["creativity"]), "nowhere"), 0.0);
        assert_eq!(index.entry("a-3").map(|e| e.length), Some(0));
        assert_eq!(index.score(&terms(&["creativity"]), "a-3"), 0.0);
        assert!(index.search(&[], 5).is_empty());
    }

    #[test]
    fn test_total_document_frequency_grows_with_corpus() {
        let full = corpus();
        let mut previous = 0;
        for n in 0..=full.len() {
            let total = index(full[..n].to_vec()).total_document_frequency();
            assert!(total >= previous);
            previous = total;
        }
        assert!(previous > 0);
    }

    #[test]
    fn test_duplicate_ids_keep_first() {
        let index = index(vec![frag("x-1", "alpha beta"), frag("x-1", "gamma")]);
        assert_eq!(index.len(), 1);
        assert_eq!(index.get("x-1").map(|f| f.content.as_str()), Some("alpha beta"));
    }

    #[test]
    fn test_score_resolves_loose_ids() {
        let index = index(corpus());
        let query = terms(&["creativity"]);
        assert_eq!(index.score(&query, " a-0 "), index.score(&query, "a-0"));
        assert_eq!(index.resolve(" a-0 "), Some(MatchStrategy::Trimmed));
    }

    #[test]
    fn test_multibyte_ids() {
        let index = index(vec![frag("第3节", "creativity matters"), frag("a-1", "ownership")]);
        let query = terms(&["creativity"]);

        assert_eq!(index.len(), 2);
        assert!(index.score(&query, "第3节") > 0.0);
        assert_eq!(index.score(&query, "讲座5"), 0.0);
        assert_eq!(index.resolve("讲座3"), Some(MatchStrategy::NumericSuffix));
    }

    #[test]
    fn test_chunk_alias() {
        let fragment = Fragment::text("f9a1c", "ownership rules", "/data/lecture3_processed.json")
            .with_chunk_id(4);
        let index = index(vec![Arc::new(fragment)]);
        assert_eq!(index.resolve("lecture3-4"), Some(MatchStrategy::Alias));
        assert_eq!(index.get("lecture3-4").map(|f| f.id.as_str()), Some("f9a1c"));
    }

    #[test]
    fn test_in_time_range() {
        let dialogue = |id: &str, start: u32, end: u32| {
            Arc::new(Fragment::text(id, "speech", "talk.txt").with_kind(FragmentKind::Dialogue {
                speakers: vec!["host".to_string()],
                start_time: String::new(),
                end_time: String::new(),
                start_seconds: start,
                end_seconds: end,
            }))
        };
        let index = index(vec![
            dialogue("t-2", 700, 760),
            dialogue("t-1", 600, 650),
            dialogue("t-3", 900, 1000),
            frag("t-4", "no clock"),
        ]);

        let hits = index.in_time_range(TimeRange::new(600, 800), 10);
        let ids: Vec<&str> = hits.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["t-1", "t-2"]);

        assert_eq!(index.in_time_range(TimeRange::full(), 2).len(), 2);
    }

    #[test]
    fn test_fingerprint() {
        let a = fingerprint(&corpus());
        assert_eq!(a, fingerprint(&corpus()));
        assert_eq!(a.len(), 64);

        let mut changed = corpus();
        changed[2] = frag("a-2", "ownership borrowing");
        assert_ne!(a, fingerprint(&changed));
    }

    #[test]
    fn test_empty_index() {
        let index = LexicalIndex::empty(&Bm25Config::default());
        assert!(index.is_empty());
        assert_eq!(index.summary().documents, 0);
        assert!(index.search(&terms(&["anything"]), 3).is_empty());
    }
}
