//! Core domain types for the retrieval engine.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::error::{QaError, Result};
use crate::time::parse_clock;

/// Retrieval score given to every temporal-path hit.
pub const TEMPORAL_SCORE: f32 = 0.5;

/// Reasoning recorded on plans produced by the rule-based fallback.
pub const FALLBACK_REASONING: &str = "fallback rule-based analysis";

/// Metadata map as exposed by the vector store.
pub type Metadata = Map<String, Value>;

/// A raw record as exposed by the vector store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusRecord {
    /// Fragment id.
    pub id: String,

    /// Fragment text.
    #[serde(alias = "content")]
    pub document: String,

    /// Store metadata (`source_file`, `chunk_type`, type-specific keys).
    #[serde(default)]
    pub metadata: Metadata,
}

/// One hit from a vector-store nearest-neighbour query.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    /// The matched record.
    pub record: CorpusRecord,

    /// Similarity rank (0-based, best first).
    pub rank: usize,
}

/// Type-specific payload of a fragment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "fragment_type", rename_all = "snake_case")]
pub enum FragmentKind {
    /// A question/answer pair.
    QaPair { question: String, answer: String },

    /// A timed transcript segment.
    Dialogue {
        speakers: Vec<String>,
        start_time: String,
        end_time: String,
        start_seconds: u32,
        end_seconds: u32,
    },

    /// Plain prose.
    GenericText,
}

impl FragmentKind {
    /// Short type name.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::QaPair { .. } => "qa_pair",
            Self::Dialogue { .. } => "dialogue",
            Self::GenericText => "generic_text",
        }
    }

    /// Time bounds in seconds, for dialogue fragments.
    pub fn time_bounds(&self) -> Option<(u32, u32)> {
        match self {
            Self::Dialogue {
                start_seconds,
                end_seconds,
                ..
            } => Some((*start_seconds, *end_seconds)),
            _ => None,
        }
    }
}

/// An immutable unit of retrievable text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fragment {
    /// Corpus-unique id.
    pub id: String,

    /// Fragment text.
    pub content: String,

    /// Originating document name.
    pub source_label: String,

    /// Explicit chunk number, when the store recorded one.
    pub chunk_id: Option<i64>,

    /// Word count recorded at ingestion.
    pub word_count: u32,

    /// Type-specific fields.
    #[serde(flatten)]
    pub kind: FragmentKind,
}

impl Fragment {
    /// Create a generic text fragment.
    pub fn text(id: &str, content: &str, source_label: &str) -> Self {
        Self {
            id: id.to_string(),
            content: content.to_string(),
            source_label: source_label.to_string(),
            chunk_id: None,
            word_count: content.split_whitespace().count() as u32,
            kind: FragmentKind::GenericText,
        }
    }

    /// Set the explicit chunk number.
    pub fn with_chunk_id(mut self, chunk_id: i64) -> Self {
        self.chunk_id = Some(chunk_id);
        self
    }

    /// Replace the type-specific payload.
    pub fn with_kind(mut self, kind: FragmentKind) -> Self {
        self.kind = kind;
        self
    }

    /// Convert a store record into a typed fragment.
    ///
    /// `chunk_type` selects the variant (`qa_pair`, `traditional`,
    /// `general_text`); a missing type is read as a dialogue segment unless
    /// the record carries a question and an answer.
    pub fn from_record(record: &CorpusRecord) -> Result<Self> {
        let meta = &record.metadata;
        let id = record.id.trim();
        if id.is_empty() {
            return Err(QaError::invalid_fragment(&record.id, "empty id"));
        }

        let source_label = meta_str(meta, "source_file")
            .filter(|s| !s.is_empty())
            .or_else(|| meta_str(meta, "source"))
            .unwrap_or_default();

        let has_qa = meta.contains_key("question") && meta.contains_key("answer");
        let kind = match meta_str(meta, "chunk_type").as_deref() {
            Some("qa_pair") => qa_kind(id, meta)?,
            Some("general_text") | Some("generic_text") => FragmentKind::GenericText,
            Some("traditional") | Some("dialogue") => dialogue_kind(meta),
            None if has_qa => qa_kind(id, meta)?,
            None => dialogue_kind(meta),
            Some(other) => {
                return Err(QaError::invalid_fragment(
                    id,
                    format!("unknown chunk_type '{}'", other),
                ))
            }
        };

        let word_count = meta_u32(meta, "word_count")
            .or_else(|| meta_u32(meta, "total_words"))
            .unwrap_or_else(|| record.document.split_whitespace().count() as u32);

        Ok(Self {
            id: id.to_string(),
            content: record.document.clone(),
            source_label,
            chunk_id: meta_i64(meta, "chunk_id"),
            word_count,
            kind,
        })
    }

    /// Human-readable source name: the file stem of the source label.
    pub fn display_source(&self) -> String {
        let base = self
            .source_label
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or_default();
        let name = base.replace("_processed.json", "").replace(".txt", "");
        if name.trim().is_empty() {
            "unknown source".to_string()
        } else {
            name
        }
    }
}

fn qa_kind(id: &str, meta: &Metadata) -> Result<FragmentKind> {
    let question = meta_str(meta, "question")
        .ok_or_else(|| QaError::invalid_fragment(id, "qa_pair without question"))?;
    let answer = meta_str(meta, "answer")
        .ok_or_else(|| QaError::invalid_fragment(id, "qa_pair without answer"))?;
    Ok(FragmentKind::QaPair { question, answer })
}

fn dialogue_kind(meta: &Metadata) -> FragmentKind {
    let start_time = meta_str(meta, "start_time").unwrap_or_default();
    let end_time = meta_str(meta, "end_time").unwrap_or_default();

    let start_seconds = meta_u32(meta, "start_timestamp")
        .or_else(|| meta_u32(meta, "start_seconds"))
        .unwrap_or_else(|| parse_clock(&start_time));
    let end_seconds = meta_u32(meta, "end_timestamp")
        .or_else(|| meta_u32(meta, "end_seconds"))
        .unwrap_or_else(|| parse_clock(&end_time));

    let speakers = match meta.get("speakers") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str())
            .map(str::to_string)
            .collect(),
        Some(Value::String(s)) => s
            .split([',', '，'])
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    };

    FragmentKind::Dialogue {
        speakers,
        start_time,
        end_time,
        start_seconds,
        end_seconds,
    }
}

fn meta_str(meta: &Metadata, key: &str) -> Option<String> {
    match meta.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn meta_i64(meta: &Metadata, key: &str) -> Option<i64> {
    match meta.get(key)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn meta_u32(meta: &Metadata, key: &str) -> Option<u32> {
    meta_i64(meta, key).and_then(|n| u32::try_from(n).ok())
}

/// A retrieval strategy. Declaration order is execution priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    #[serde(alias = "vector_search", alias = "vector")]
    Semantic,
    #[serde(alias = "keyword_search", alias = "keyword")]
    Lexical,
    #[serde(alias = "time_search", alias = "time")]
    Temporal,
}

impl Dimension {
    /// All dimensions in priority order.
    pub const ALL: [Dimension; 3] = [Self::Semantic, Self::Lexical, Self::Temporal];

    /// Numeric priority; lower runs first and wins deduplication.
    pub fn priority(&self) -> u8 {
        match self {
            Self::Semantic => 1,
            Self::Lexical => 2,
            Self::Temporal => 3,
        }
    }

    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Semantic => "semantic",
            Self::Lexical => "lexical",
            Self::Temporal => "temporal",
        }
    }
}

impl std::fmt::Display for Dimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-signal scores attached to a candidate.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    /// Rank-derived semantic score, `1 / (rank + 1)` for semantic hits.
    pub semantic: f32,

    /// Raw BM25 score, if already computed.
    pub lexical: Option<f32>,

    /// BM25 score divided by the batch maximum.
    pub lexical_normalized: f32,

    /// Exact-match score, if already computed.
    pub exact: Option<f32>,

    /// Fused score.
    pub final_score: f32,
}

/// Diagnostics attached to a candidate that absorbed duplicates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateSummary {
    /// Retrieval scores summed across every duplicate.
    pub total_score: f32,

    /// Source of each duplicate, survivor included.
    pub sources: Vec<Dimension>,
}

/// A per-query candidate: a fragment, where it came from, and its scores.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    /// The fragment.
    pub fragment: Arc<Fragment>,

    /// Retrieval path that produced it.
    pub source: Dimension,

    /// Position within that path's results (0-based).
    pub rank: usize,

    /// Retrieval-path score, used to break deduplication ties.
    pub score: f32,

    /// Fusion signals.
    pub scores: ScoreBreakdown,

    /// Present when deduplication merged several hits into this one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duplicates: Option<DuplicateSummary>,
}

impl Candidate {
    /// A semantic hit at the given similarity rank.
    pub fn semantic(fragment: Arc<Fragment>, rank: usize) -> Self {
        let score = 1.0 / (rank as f32 + 1.0);
        Self {
            fragment,
            source: Dimension::Semantic,
            rank,
            score,
            scores: ScoreBreakdown {
                semantic: score,
                ..Default::default()
            },
            duplicates: None,
        }
    }

    /// A lexical hit carrying its BM25 score.
    pub fn lexical(fragment: Arc<Fragment>, rank: usize, bm25: f32) -> Self {
        Self {
            fragment,
            source: Dimension::Lexical,
            rank,
            score: bm25,
            scores: ScoreBreakdown {
                lexical: Some(bm25),
                ..Default::default()
            },
            duplicates: None,
        }
    }

    /// A temporal hit.
    pub fn temporal(fragment: Arc<Fragment>, rank: usize) -> Self {
        Self {
            fragment,
            source: Dimension::Temporal,
            rank,
            score: TEMPORAL_SCORE,
            scores: ScoreBreakdown::default(),
            duplicates: None,
        }
    }

    /// Attach a precomputed BM25 score.
    pub fn with_lexical(mut self, score: f32) -> Self {
        self.scores.lexical = Some(score);
        self
    }

    /// Attach a precomputed exact-match score.
    pub fn with_exact(mut self, score: f32) -> Self {
        self.scores.exact = Some(score);
        self
    }

    /// Override the retrieval-path score.
    pub fn with_score(mut self, score: f32) -> Self {
        self.score = score;
        self
    }

    /// Fragment id.
    pub fn id(&self) -> &str {
        &self.fragment.id
    }

    /// Fused score.
    pub fn final_score(&self) -> f32 {
        self.scores.final_score
    }

    /// Number of retrieval hits this candidate stands for.
    pub fn source_count(&self) -> usize {
        self.duplicates.as_ref().map_or(1, |d| d.sources.len())
    }
}

/// How a dimension plan was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanOrigin {
    /// Decoded from the language model's judgment.
    Model,
    /// Deterministic rules after a model failure.
    RuleFallback,
}

/// Per-query decision about which retrieval strategies to run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DimensionPlan {
    /// Whether the current context is insufficient.
    pub needs_additional_search: bool,

    /// Dimensions to search, as an ordered set.
    pub missing_dimensions: Vec<Dimension>,

    /// Judgment confidence in `[0, 1]`.
    pub confidence: f32,

    /// Free-text justification.
    pub reasoning: String,

    /// Where the plan came from.
    pub origin: PlanOrigin,
}

impl DimensionPlan {
    /// Whether to search, treating low-confidence plans as "search".
    pub fn should_search(&self, confidence_threshold: f32) -> bool {
        self.confidence < confidence_threshold || self.needs_additional_search
    }

    /// Missing dimensions deduplicated and sorted by priority.
    pub fn dimensions_by_priority(&self) -> Vec<Dimension> {
        let mut dims = self.missing_dimensions.clone();
        dims.sort();
        dims.dedup();
        dims
    }
}

/// Counts describing how a context block was assembled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContextStats {
    pub original_count: usize,
    pub deduplicated_count: usize,
    pub final_count: usize,
    pub context_length: usize,
}

/// Rendered context plus statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ContextBlock {
    /// Context text with source attribution.
    pub text: String,

    /// Assembly statistics.
    pub stats: ContextStats,
}

impl ContextBlock {
    /// Record the candidate counts seen before deduplication and reranking.
    pub fn with_pipeline_counts(mut self, original: usize, deduplicated: usize) -> Self {
        self.stats.original_count = original;
        self.stats.deduplicated_count = deduplicated;
        self
    }
}

/// Result of a single-pass hybrid search.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    /// The original query.
    pub query: String,

    /// Reranked fragments, best first.
    pub ranked: Vec<Candidate>,

    /// Rendered context.
    pub context: ContextBlock,

    /// Wall time in seconds.
    pub search_time_secs: f64,

    /// Candidates considered before reranking.
    pub candidate_count: usize,

    /// Keywords extracted from the query.
    pub keywords: Vec<String>,

    /// Explanation when the result is empty or degraded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// A retrieval dimension that failed during a planned search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DimensionFailure {
    pub dimension: Dimension,
    pub code: String,
    pub message: String,
}

/// Result of a planned, multi-stage search.
#[derive(Debug, Clone, Serialize)]
pub struct PlannedSearchResponse {
    /// The original query.
    pub query: String,

    /// Whether retrieval ran.
    pub needs_search: bool,

    /// The plan that drove retrieval.
    pub plan: DimensionPlan,

    /// Dimensions actually searched, in execution order.
    pub dimensions_searched: Vec<Dimension>,

    /// Reranked fragments, best first.
    pub ranked: Vec<Candidate>,

    /// Rendered context.
    pub context: ContextBlock,

    /// Wall time in seconds.
    pub search_time_secs: f64,

    /// Whether the default semantic search replaced the planned ones.
    pub fallback: bool,

    /// Dimensions that failed and why.
    pub failures: Vec<DimensionFailure>,

    /// Explanation when retrieval was skipped or degraded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
