//! Query dimension planning.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use qa_core::time::contains_clock_expression;
use qa_core::{
    Dimension, DimensionPlan, LanguageModel, PlanOrigin, PlannerConfig, QaError, Result,
    FALLBACK_REASONING,
};

use crate::decode::decode_plan;

/// Placeholder used when the caller supplies no conversation context.
const NO_CONTEXT: &str = "No context is available yet.";

/// Decides which retrieval dimensions a query needs.
///
/// The language model judges whether the conversation context already
/// answers the query. Any model failure (error, timeout, unusable reply)
/// falls back to [`rule_based_plan`].
pub struct DimensionPlanner<M> {
    model: Option<Arc<M>>,
    config: PlannerConfig,
}

impl<M> DimensionPlanner<M>
where
    M: LanguageModel + Send + Sync,
{
    /// Create a planner backed by a language model.
    pub fn new(model: Arc<M>, config: PlannerConfig) -> Self {
        Self {
            model: Some(model),
            config,
        }
    }

    /// Create a planner that only uses the rule-based path.
    pub fn rules_only(config: PlannerConfig) -> Self {
        Self {
            model: None,
            config,
        }
    }

    /// Planner configuration.
    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Plan a query. Never fails.
    pub async fn plan(&self, query: &str, context: Option<&str>) -> DimensionPlan {
        if self.model.is_none() {
            debug!("No language model configured, planning by rules");
            return rule_based_plan(query, &self.config);
        }

        match self.plan_with_model(query, context).await {
            Ok(plan) => {
                info!(
                    "Model plan: needs_search={}, dimensions={:?}, confidence={:.2}",
                    plan.needs_additional_search, plan.missing_dimensions, plan.confidence
                );
                plan
            }
            Err(e) => {
                warn!("Dimension planning failed ({}), using rule-based plan", e);
                rule_based_plan(query, &self.config)
            }
        }
    }

    /// Ask the model for a plan, without fallback.
    pub async fn plan_with_model(&self, query: &str, context: Option<&str>) -> Result<DimensionPlan> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| QaError::language_model("no language model configured"))?;

        let prompt = build_prompt(query, context);
        let start = Instant::now();
        let timeout_ms = self.config.timeout_ms;

        let reply = tokio::time::timeout(Duration::from_millis(timeout_ms), model.complete(&prompt))
            .await
            .map_err(|_| QaError::timeout("dimension planning", timeout_ms))??;

        debug!(
            "Model replied in {}ms ({} chars)",
            start.elapsed().as_millis(),
            reply.len()
        );

        decode_plan(&reply)
            .map_err(|e| QaError::language_model(format!("unusable plan reply: {}", e)))
    }

    /// Whether a plan calls for retrieval under the configured threshold.
    pub fn should_search(&self, plan: &DimensionPlan) -> bool {
        plan.should_search(self.config.confidence_threshold)
    }
}

/// Deterministic plan used when the model is unavailable.
///
/// Semantic is always included, temporal when the query mentions time,
/// and lexical for any query longer than two characters.
pub fn rule_based_plan(query: &str, config: &PlannerConfig) -> DimensionPlan {
    let mut dimensions = vec![Dimension::Semantic];

    if mentions_time(query, &config.temporal_keywords) {
        dimensions.push(Dimension::Temporal);
    }
    if query.trim().chars().count() > 2 {
        dimensions.push(Dimension::Lexical);
    }

    dimensions.sort();
    dimensions.dedup();

    DimensionPlan {
        needs_additional_search: true,
        missing_dimensions: dimensions,
        confidence: config.fallback_confidence,
        reasoning: FALLBACK_REASONING.to_string(),
        origin: PlanOrigin::RuleFallback,
    }
}

/// Whether the query uses temporal vocabulary or a clock expression.
///
/// ASCII keywords must match whole words; other keywords match anywhere.
pub fn mentions_time(query: &str, keywords: &[String]) -> bool {
    if contains_clock_expression(query) {
        return true;
    }

    let lowered = query.to_lowercase();
    let words: Vec<&str> = lowered
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();

    keywords.iter().any(|keyword| {
        let keyword = keyword.to_lowercase();
        if keyword.is_ascii() {
            // Allow simple plurals such as "minutes"
            words
                .iter()
                .any(|w| *w == keyword || w.strip_suffix('s') == Some(keyword.as_str()))
        } else {
            lowered.contains(&keyword)
        }
    })
}

/// Prompt asking the model to judge context sufficiency.
pub fn build_prompt(query: &str, context: Option<&str>) -> String {
    let context = context
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or(NO_CONTEXT);

    format!(
        r#"You are a query analysis assistant. Decide whether the user's query needs additional search to be answered completely.

User query: {query}

Context currently available:
{context}

Decide:
1. Is the current context sufficient to answer the query?
2. If not, which additional search dimensions are needed?

Available search dimensions:
- semantic: embedding similarity search (conceptual or topical questions)
- lexical: keyword search (exact terms, names, identifiers)
- temporal: time range search (content from a specific time span)

Reply with JSON only, in this format:
{{
    "needs_additional_search": true or false,
    "missing_dimensions": ["dimension1", "dimension2"],
    "confidence": number between 0.0 and 1.0,
    "reasoning": "short justification"
}}

Notes:
- If the context already answers the query, set needs_additional_search to false
- missing_dimensions may only contain the three dimensions above
- confidence is how sure you are of this judgment
"#
    )
}
