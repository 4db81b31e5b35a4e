//! Weighted score fusion of semantic, BM25 and exact-match signals.

use std::sync::Arc;

use tracing::{debug, warn};

use qa_core::{Candidate, FusionConfig, SearchConfig};
use qa_index::LexicalIndex;
use qa_text::{exact_match_score, Tokenizer};

/// Tolerance when checking that fusion weights sum to 1.
const WEIGHT_TOLERANCE: f32 = 0.01;

/// Reranks candidates by a weighted sum of their signals.
///
/// `final = w_semantic * semantic + w_lexical * lexical / max_lexical + w_exact * exact`
///
/// The semantic score comes from the vector-store rank and is never
/// recomputed. BM25 is recomputed when missing or zero, from the query's
/// top keywords rather than its raw tokens, so repeating a word does not
/// inflate the score. Exact match is recomputed when missing.
pub struct Reranker {
    tokenizer: Arc<Tokenizer>,
    config: FusionConfig,
    max_keywords: usize,
}

impl Reranker {
    /// Create a reranker. Weights not summing to 1 are accepted with a warning.
    pub fn new(tokenizer: Arc<Tokenizer>, config: FusionConfig) -> Self {
        let sum = config.weight_sum();
        if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
            warn!("Fusion weights sum to {:.3}, expected 1.0", sum);
        }
        Self {
            tokenizer,
            config,
            max_keywords: SearchConfig::default().max_keywords,
        }
    }

    /// Number of query keywords used as BM25 terms.
    pub fn with_max_keywords(mut self, max_keywords: usize) -> Self {
        self.max_keywords = max_keywords;
        self
    }

    /// Fusion configuration.
    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    /// Score, sort, filter and truncate candidates.
    ///
    /// Candidates not scoring above `min_score` are dropped unless fewer than
    /// `max(1, top_k / 2)` would survive, in which case the unfiltered
    /// ordering is returned instead (when `min_results_fallback` is set).
    pub fn rerank(
        &self,
        query: &str,
        candidates: Vec<Candidate>,
        index: &LexicalIndex,
        top_k: usize,
    ) -> Vec<Candidate> {
        if candidates.is_empty() || top_k == 0 {
            return Vec::new();
        }

        let terms = self.tokenizer.query_terms(query, self.max_keywords);

        let mut scored: Vec<Candidate> = candidates
            .into_iter()
            .map(|mut candidate| {
                let lexical = match candidate.scores.lexical {
                    Some(score) if score != 0.0 => score,
                    _ => index.score(&terms, candidate.id()),
                };
                candidate.scores.lexical = Some(lexical);

                if candidate.scores.exact.is_none() {
                    let exact =
                        exact_match_score(&self.tokenizer, query, &candidate.fragment.content);
                    candidate.scores.exact = Some(exact);
                }
                candidate
            })
            .collect();

        let max_lexical = scored
            .iter()
            .filter_map(|c| c.scores.lexical)
            .fold(0.0_f32, f32::max);
        let denominator = if max_lexical > 0.0 { max_lexical } else { 1.0 };

        for candidate in &mut scored {
            let scores = &mut candidate.scores;
            scores.lexical_normalized =
                (scores.lexical.unwrap_or(0.0) / denominator).clamp(0.0, 1.0);
            scores.final_score = self.config.semantic_weight * scores.semantic
                + self.config.lexical_weight * scores.lexical_normalized
                + self.config.exact_weight * scores.exact.unwrap_or(0.0);
        }

        // Stable: equal scores keep candidate order
        scored.sort_by(|a, b| {
            b.final_score()
                .partial_cmp(&a.final_score())
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let min_results = (top_k / 2).max(1);
        let passing = scored
            .iter()
            .filter(|c| c.final_score() > self.config.min_score)
            .count();

        let mut ranked = if passing < min_results && self.config.min_results_fallback {
            debug!(
                "Only {} candidates pass min_score {}, keeping unfiltered ordering",
                passing, self.config.min_score
            );
            scored
        } else {
            scored
                .into_iter()
                .filter(|c| c.final_score() > self.config.min_score)
                .collect()
        };

        ranked.truncate(top_k);

        debug!(
            "Reranked to {} candidates (max BM25 {:.3})",
            ranked.len(),
            max_lexical
        );

        ranked
    }
}
