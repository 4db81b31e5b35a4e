//! Retrieval engine facade.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use qa_core::{
    Candidate, ContextBlock, Dimension, DimensionFailure, DimensionPlan, LanguageModel,
    PlannedSearchResponse, QaConfig, QaError, Result, SearchResponse, VectorStore,
};
use qa_index::{IndexHandle, IndexSummary, LexicalIndex, RebuildReport};
use qa_plan::DimensionPlanner;
use qa_text::{Keyword, Tokenizer};

use crate::context::assemble;
use crate::dedup::dedupe;
use crate::fusion::Reranker;
use crate::orchestrator::{MultiStageSearch, CONTEXT_SUFFICIENT};

/// Message attached to responses with no ranked fragments.
pub const NO_RESULTS: &str = "no relevant content found";

/// Floor for the per-dimension result count of a planned search.
const MIN_PER_DIMENSION: usize = 10;

/// Extra hits fetched per dimension beyond its share of `max_results`.
const PER_DIMENSION_SLACK: usize = 5;

/// Hybrid retrieval engine.
///
/// Combines semantic search from the vector store with BM25 and exact-match
/// scoring, deduplicates, reranks and renders a context block. The lexical
/// index is shared read-mostly state, published atomically by
/// [`RetrievalEngine::rebuild_index`].
pub struct RetrievalEngine<S, M> {
    /// Vector store.
    store: Arc<S>,

    /// Shared tokenizer.
    tokenizer: Arc<Tokenizer>,

    /// Current lexical index.
    index: IndexHandle,

    /// Score fusion.
    reranker: Reranker,

    /// Dimension planner.
    planner: DimensionPlanner<M>,

    /// Multi-stage retrieval.
    orchestrator: MultiStageSearch<S>,

    config: QaConfig,
}

impl<S, M> RetrievalEngine<S, M>
where
    S: VectorStore,
    M: LanguageModel,
{
    /// Create an engine. Without a model, planning uses the rule-based path.
    pub fn new(store: Arc<S>, model: Option<Arc<M>>, config: QaConfig) -> Self {
        let tokenizer = Arc::new(Tokenizer::with_config(&config.text));
        Self::with_tokenizer(store, model, config, tokenizer)
    }

    /// Create an engine sharing an existing tokenizer.
    pub fn with_tokenizer(
        store: Arc<S>,
        model: Option<Arc<M>>,
        config: QaConfig,
        tokenizer: Arc<Tokenizer>,
    ) -> Self {
        let planner = match model {
            Some(model) => DimensionPlanner::new(model, config.planner.clone()),
            None => DimensionPlanner::rules_only(config.planner.clone()),
        };

        Self {
            index: IndexHandle::new(Arc::clone(&tokenizer), config.bm25.clone()),
            reranker: Reranker::new(Arc::clone(&tokenizer), config.fusion.clone())
                .with_max_keywords(config.search.max_keywords),
            orchestrator: MultiStageSearch::new(
                Arc::clone(&store),
                Arc::clone(&tokenizer),
                Duration::from_millis(config.search.dimension_timeout_ms),
            )
            .with_max_keywords(config.search.max_keywords),
            planner,
            store,
            tokenizer,
            config,
        }
    }

    /// Engine configuration.
    pub fn config(&self) -> &QaConfig {
        &self.config
    }

    /// Rebuild the lexical index from the store's corpus.
    pub async fn rebuild_index(&self) -> Result<RebuildReport> {
        self.index.rebuild(self.store.as_ref()).await
    }

    /// Summary of the published lexical index.
    pub fn index_stats(&self) -> IndexSummary {
        self.index.snapshot().summary()
    }

    /// Top query keywords.
    pub fn keywords(&self, query: &str) -> Vec<Keyword> {
        self.tokenizer
            .extract_keywords(query, self.config.search.max_keywords)
    }

    /// Plan a query without searching.
    pub async fn plan(&self, query: &str, context: Option<&str>) -> DimensionPlan {
        self.planner.plan(query, context).await
    }

    /// Single-pass hybrid search.
    ///
    /// Semantic candidates come from the vector store; when the store fails
    /// or returns nothing, the lexical path supplies candidates instead.
    /// `top_k` and `max_context_length` default to the configured values.
    pub async fn search(
        &self,
        query: &str,
        top_k: Option<usize>,
        max_context_length: Option<usize>,
    ) -> Result<SearchResponse> {
        let start = Instant::now();
        let query = validate_query(query)?;
        let top_k = top_k.unwrap_or(self.config.search.default_top_k);
        let max_context_length =
            max_context_length.unwrap_or(self.config.search.max_context_length);
        if top_k == 0 {
            return Err(QaError::invalid_argument("top_k must be positive"));
        }

        info!("Searching for: {:?}", query);

        let keywords: Vec<String> = self.keywords(query).into_iter().map(|k| k.term).collect();
        let index = self.index.snapshot();
        let fetch_k = self.config.search.max_candidates.max(top_k);

        let semantic = tokio::time::timeout(
            Duration::from_millis(self.config.search.dimension_timeout_ms),
            self.orchestrator.semantic(query, fetch_k),
        )
        .await
        .unwrap_or_else(|_| {
            Err(QaError::timeout(
                "semantic search",
                self.config.search.dimension_timeout_ms,
            ))
        });

        let candidates = match semantic {
            Ok(candidates) if !candidates.is_empty() => candidates,
            Ok(_) => {
                debug!("No semantic candidates, using lexical path");
                self.orchestrator.lexical(query, fetch_k, &index)
            }
            Err(e) => {
                warn!("Semantic search failed ({}), using lexical path", e);
                self.orchestrator.lexical(query, fetch_k, &index)
            }
        };

        let (ranked, context, candidate_count) =
            self.finish(query, candidates, &index, top_k, max_context_length);

        let search_time_secs = start.elapsed().as_secs_f64();
        info!(
            "Search completed in {:.3}s, returned {} results",
            search_time_secs,
            ranked.len()
        );

        Ok(SearchResponse {
            query: query.to_string(),
            message: ranked.is_empty().then(|| NO_RESULTS.to_string()),
            ranked,
            context,
            search_time_secs,
            candidate_count,
            keywords,
        })
    }

    /// Planned multi-stage search.
    ///
    /// The planner decides whether the conversation context already answers
    /// the query; low-confidence plans search anyway. Each planned dimension
    /// fetches `max(max_results / dimensions + 5, 10)` hits.
    pub async fn plan_and_search(
        &self,
        query: &str,
        context: Option<&str>,
        max_results: usize,
    ) -> Result<PlannedSearchResponse> {
        let start = Instant::now();
        let query = validate_query(query)?;
        if max_results == 0 {
            return Err(QaError::invalid_argument("max_results must be positive"));
        }

        let mut plan = self.planner.plan(query, context).await;
        let needs_search = self.planner.should_search(&plan);

        if !needs_search {
            info!("Context judged sufficient for {:?}", query);
            return Ok(PlannedSearchResponse {
                query: query.to_string(),
                needs_search: false,
                plan,
                dimensions_searched: Vec::new(),
                ranked: Vec::new(),
                context: ContextBlock::default(),
                search_time_secs: start.elapsed().as_secs_f64(),
                fallback: false,
                failures: Vec::new(),
                message: Some(CONTEXT_SUFFICIENT.to_string()),
            });
        }

        if plan.missing_dimensions.is_empty() {
            debug!("Search required but no dimensions planned, defaulting to semantic");
            plan.missing_dimensions.push(Dimension::Semantic);
        }

        let dimensions = plan.dimensions_by_priority().len();
        let per_dimension_k = (max_results / dimensions + PER_DIMENSION_SLACK).max(MIN_PER_DIMENSION);
        let index = self.index.snapshot();

        let outcome = match self
            .orchestrator
            .search(query, &plan, per_dimension_k, &index)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Planned search failed: {}", e);
                return Ok(PlannedSearchResponse {
                    query: query.to_string(),
                    needs_search: true,
                    plan,
                    dimensions_searched: Vec::new(),
                    ranked: Vec::new(),
                    context: assemble(&[], self.config.search.max_context_length),
                    search_time_secs: start.elapsed().as_secs_f64(),
                    fallback: true,
                    failures: vec![DimensionFailure {
                        dimension: Dimension::Semantic,
                        code: e.error_code().to_string(),
                        message: e.to_string(),
                    }],
                    message: Some(NO_RESULTS.to_string()),
                });
            }
        };

        let (ranked, context, _) = self.finish(
            query,
            outcome.candidates,
            &index,
            max_results,
            self.config.search.max_context_length,
        );

        let search_time_secs = start.elapsed().as_secs_f64();
        info!(
            "Planned search over {:?} completed in {:.3}s, returned {} results",
            outcome.searched,
            search_time_secs,
            ranked.len()
        );

        Ok(PlannedSearchResponse {
            query: query.to_string(),
            needs_search: true,
            plan,
            dimensions_searched: outcome.searched,
            message: ranked.is_empty().then(|| NO_RESULTS.to_string()),
            ranked,
            context,
            search_time_secs,
            fallback: outcome.fallback,
            failures: outcome.failures,
        })
    }

    /// Deduplicate, rerank and render.
    fn finish(
        &self,
        query: &str,
        candidates: Vec<Candidate>,
        index: &LexicalIndex,
        top_k: usize,
        max_context_length: usize,
    ) -> (Vec<Candidate>, ContextBlock, usize) {
        let original = candidates.len();
        let deduped = dedupe(candidates);
        let deduplicated = deduped.len();
        let ranked = self.reranker.rerank(query, deduped, index, top_k);

        debug!(
            "Pipeline counts: {} candidates, {} after dedupe, {} ranked",
            original,
            deduplicated,
            ranked.len()
        );

        let context = assemble(&ranked, max_context_length).with_pipeline_counts(original, deduplicated);
        (ranked, context, original)
    }
}

fn validate_query(query: &str) -> Result<&str> {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        return Err(QaError::invalid_argument("query must not be empty"));
    }
    Ok(trimmed)
}
