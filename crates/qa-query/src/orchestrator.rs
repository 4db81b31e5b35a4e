//! Multi-stage retrieval across planned dimensions.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tracing::{debug, info, warn};

use qa_core::{
    Candidate, Dimension, DimensionFailure, DimensionPlan, Fragment, QaError, Result,
    SearchConfig, TimeRange, VectorStore,
};
use qa_index::LexicalIndex;
use qa_text::Tokenizer;

/// Message returned when the plan needs no retrieval.
pub const CONTEXT_SUFFICIENT: &str = "existing context is sufficient, no search needed";

/// Candidates gathered by the planned dimensions.
#[derive(Debug, Clone, Default)]
pub struct StageOutcome {
    /// Concatenated candidates in dimension priority order.
    pub candidates: Vec<Candidate>,

    /// Dimensions that ran, in priority order.
    pub searched: Vec<Dimension>,

    /// Dimensions that failed.
    pub failures: Vec<DimensionFailure>,

    /// Whether the default semantic search replaced the planned ones.
    pub fallback: bool,

    /// Explanation when retrieval was skipped.
    pub message: Option<String>,
}

/// Runs the dimensions of a plan and merges their candidates.
pub struct MultiStageSearch<S: ?Sized> {
    store: Arc<S>,
    tokenizer: Arc<Tokenizer>,
    dimension_timeout: Duration,
    max_keywords: usize,
}

impl<S> MultiStageSearch<S>
where
    S: VectorStore + ?Sized,
{
    /// Create an orchestrator.
    pub fn new(store: Arc<S>, tokenizer: Arc<Tokenizer>, dimension_timeout: Duration) -> Self {
        Self {
            store,
            tokenizer,
            dimension_timeout,
            max_keywords: SearchConfig::default().max_keywords,
        }
    }

    /// Number of query keywords used as BM25 terms.
    pub fn with_max_keywords(mut self, max_keywords: usize) -> Self {
        self.max_keywords = max_keywords;
        self
    }

    /// Run every dimension of `plan` concurrently, `per_dimension_k` hits each.
    ///
    /// A plan without dimensions skips retrieval. Failed dimensions are
    /// recorded and skipped; when all of them fail a single default semantic
    /// search runs, and only its failure is an error.
    pub async fn search(
        &self,
        query: &str,
        plan: &DimensionPlan,
        per_dimension_k: usize,
        index: &LexicalIndex,
    ) -> Result<StageOutcome> {
        let dimensions = plan.dimensions_by_priority();
        if dimensions.is_empty() {
            info!("Plan has no missing dimensions, skipping retrieval");
            return Ok(StageOutcome {
                message: Some(CONTEXT_SUFFICIENT.to_string()),
                ..StageOutcome::default()
            });
        }

        let start = Instant::now();
        let runs = dimensions.iter().map(|&dimension| async move {
            let result = self
                .run_with_timeout(dimension, query, per_dimension_k, index)
                .await;
            (dimension, result)
        });
        let results = join_all(runs).await;

        let mut outcome = StageOutcome::default();
        for (dimension, result) in results {
            match result {
                Ok(candidates) => {
                    debug!("{} search returned {} candidates", dimension, candidates.len());
                    outcome.searched.push(dimension);
                    outcome.candidates.extend(candidates);
                }
                Err(e) => {
                    warn!("{} search failed: {}", dimension, e);
                    outcome.failures.push(DimensionFailure {
                        dimension,
                        code: e.error_code().to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }

        if outcome.searched.is_empty() {
            warn!("Every planned dimension failed, running default semantic search");
            let candidates = self
                .run_with_timeout(Dimension::Semantic, query, per_dimension_k, index)
                .await
                .map_err(|e| {
                    QaError::retrieval_failed(format!(
                        "all dimensions failed and default semantic search failed: {}",
                        e
                    ))
                })?;
            outcome.searched.push(Dimension::Semantic);
            outcome.candidates = candidates;
            outcome.fallback = true;
        }

        info!(
            "Multi-stage search over {:?} gathered {} candidates in {}ms",
            outcome.searched,
            outcome.candidates.len(),
            start.elapsed().as_millis()
        );

        Ok(outcome)
    }

    async fn run_with_timeout(
        &self,
        dimension: Dimension,
        query: &str,
        k: usize,
        index: &LexicalIndex,
    ) -> Result<Vec<Candidate>> {
        let millis = self.dimension_timeout.as_millis() as u64;
        tokio::time::timeout(self.dimension_timeout, self.run(dimension, query, k, index))
            .await
            .map_err(|_| QaError::timeout(format!("{} search", dimension), millis))?
    }

    /// Run one retrieval path.
    pub async fn run(
        &self,
        dimension: Dimension,
        query: &str,
        k: usize,
        index: &LexicalIndex,
    ) -> Result<Vec<Candidate>> {
        match dimension {
            Dimension::Semantic => self.semantic(query, k).await,
            Dimension::Lexical => Ok(self.lexical(query, k, index)),
            Dimension::Temporal => Ok(temporal(query, k, index)),
        }
    }

    /// Vector-store nearest neighbours.
    pub async fn semantic(&self, query: &str, k: usize) -> Result<Vec<Candidate>> {
        let hits = self.store.query(query, k).await?;
        Ok(hits
            .into_iter()
            .filter_map(|hit| match Fragment::from_record(&hit.record) {
                Ok(fragment) => Some(Candidate::semantic(Arc::new(fragment), hit.rank)),
                Err(e) => {
                    debug!("Dropping vector hit: {}", e);
                    None
                }
            })
            .collect())
    }

    /// BM25 search over the whole corpus, scored on the query's top keywords.
    pub fn lexical(&self, query: &str, k: usize, index: &LexicalIndex) -> Vec<Candidate> {
        let terms = self.tokenizer.query_terms(query, self.max_keywords);
        index
            .search(&terms, k)
            .into_iter()
            .enumerate()
            .map(|(rank, (fragment, score))| Candidate::lexical(fragment, rank, score))
            .collect()
    }
}

/// Dialogue fragments inside the time range named by the query.
pub fn temporal(query: &str, k: usize, index: &LexicalIndex) -> Vec<Candidate> {
    let range = TimeRange::from_query(query);
    debug!("Temporal range {}..{}", range.start, range.end);
    index
        .in_time_range(range, k)
        .into_iter()
        .enumerate()
        .map(|(rank, fragment)| Candidate::temporal(fragment, rank))
        .collect()
}
