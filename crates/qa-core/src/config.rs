//! Configuration types for the retrieval engine.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::warn;

use crate::error::{QaError, Result};

/// Default stopwords removed during tokenization.
pub const DEFAULT_STOPWORDS: &[&str] = &[
    "的", "了", "在", "是", "我", "有", "和", "就", "不", "人", "都", "一", "一个", "上", "也",
    "很", "到", "说", "要", "去", "你", "会", "着", "没有", "看", "好", "自己", "这", "那", "里",
    "还", "把", "被", "从", "跟", "对", "为", "以", "所", "可以", "能够", "应该", "需要", "可能",
    "或者", "但是", "然后", "因为", "所以", "如果", "虽然", "虽说", "尽管", "无论", "不管",
    "除了", "除非", "只要", "只有", "不仅", "而且", "并且", "以及", "同时", "the", "a", "an",
    "of", "and", "or", "to", "in", "is", "are", "was", "what", "which", "how",
];

/// Single-character terms kept despite their length (family names).
pub const DEFAULT_KEEP_SINGLE: &[&str] = &[
    "乔", "梁", "李", "王", "张", "刘", "陈", "杨", "黄", "赵", "周", "吴", "徐", "孙", "马",
    "朱", "胡", "郭", "何", "高",
];

/// Part-of-speech tags considered by the TF-IDF keyword pass.
pub const DEFAULT_ALLOWED_POS: &[&str] = &[
    "n", "nr", "ns", "nt", "nz", "v", "vd", "vn", "a", "ad", "an", "i", "l", "j",
];

/// Vocabulary that marks a query as time-oriented.
pub const DEFAULT_TEMPORAL_KEYWORDS: &[&str] = &[
    "时间", "分钟", "秒", "小时", "开始", "结束", "期间", "之间", "time", "minute", "second",
    "hour", "start", "end", "during", "between",
];

/// Main configuration for the retrieval engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QaConfig {
    /// BM25 parameters.
    #[serde(default)]
    pub bm25: Bm25Config,

    /// Score fusion parameters.
    #[serde(default)]
    pub fusion: FusionConfig,

    /// Search sizing.
    #[serde(default)]
    pub search: SearchConfig,

    /// Dimension planner parameters.
    #[serde(default)]
    pub planner: PlannerConfig,

    /// Tokenizer word lists.
    #[serde(default)]
    pub text: TextConfig,
}

/// BM25 parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bm25Config {
    /// Term-frequency saturation.
    #[serde(default = "default_k1")]
    pub k1: f32,

    /// Length normalization strength (0..=1).
    #[serde(default = "default_b")]
    pub b: f32,

    /// Lower bound for idf; keeps terms present in most fragments positive.
    #[serde(default = "default_idf_floor")]
    pub idf_floor: f32,
}

impl Default for Bm25Config {
    fn default() -> Self {
        Self {
            k1: 1.5,
            b: 0.75,
            idf_floor: 0.01,
        }
    }
}

/// Score fusion parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusionConfig {
    /// Weight of the rank-derived semantic score.
    #[serde(default = "default_semantic_weight")]
    pub semantic_weight: f32,

    /// Weight of the normalized BM25 score.
    #[serde(default = "default_lexical_weight")]
    pub lexical_weight: f32,

    /// Weight of the exact-match score.
    #[serde(default = "default_exact_weight")]
    pub exact_weight: f32,

    /// Candidates below this fused score are filtered out.
    #[serde(default = "default_min_score")]
    pub min_score: f32,

    /// Return unfiltered results when filtering leaves fewer than `top_k / 2`.
    #[serde(default = "default_true")]
    pub min_results_fallback: bool,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            semantic_weight: 0.6,
            lexical_weight: 0.25,
            exact_weight: 0.15,
            min_score: 0.001,
            min_results_fallback: true,
        }
    }
}

impl FusionConfig {
    /// Sum of the three weights.
    pub fn weight_sum(&self) -> f32 {
        self.semantic_weight + self.lexical_weight + self.exact_weight
    }
}

/// Search sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Default number of results.
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,

    /// Candidates requested from the vector store.
    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,

    /// Context budget in characters.
    #[serde(default = "default_max_context_length")]
    pub max_context_length: usize,

    /// Keywords extracted per query.
    #[serde(default = "default_max_keywords")]
    pub max_keywords: usize,

    /// Per-dimension retrieval timeout in milliseconds.
    #[serde(default = "default_dimension_timeout")]
    pub dimension_timeout_ms: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_top_k: 10,
            max_candidates: 50,
            max_context_length: 2000,
            max_keywords: 10,
            dimension_timeout_ms: 10_000,
        }
    }
}

/// Dimension planner parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Language model timeout in milliseconds.
    #[serde(default = "default_planner_timeout")]
    pub timeout_ms: u64,

    /// Plans below this confidence always search.
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,

    /// Confidence stamped on rule-based plans.
    #[serde(default = "default_fallback_confidence")]
    pub fallback_confidence: f32,

    /// Words that make the rule-based planner add the temporal dimension.
    #[serde(default = "default_temporal_keywords")]
    pub temporal_keywords: Vec<String>,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 15_000,
            confidence_threshold: 0.7,
            fallback_confidence: 0.8,
            temporal_keywords: default_temporal_keywords(),
        }
    }
}

/// Tokenizer word lists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextConfig {
    /// Terms always discarded.
    #[serde(default = "default_stopwords")]
    pub stopwords: Vec<String>,

    /// Single-character terms that survive filtering.
    #[serde(default = "default_keep_single")]
    pub keep_single_chars: Vec<String>,

    /// Part-of-speech tags for TF-IDF keyword extraction.
    #[serde(default = "default_allowed_pos")]
    pub allowed_pos: Vec<String>,
}

impl Default for TextConfig {
    fn default() -> Self {
        Self {
            stopwords: default_stopwords(),
            keep_single_chars: default_keep_single(),
            allowed_pos: default_allowed_pos(),
        }
    }
}

// Default value functions

fn default_true() -> bool {
    true
}

fn default_k1() -> f32 {
    1.5
}

fn default_b() -> f32 {
    0.75
}

fn default_idf_floor() -> f32 {
    0.01
}

fn default_semantic_weight() -> f32 {
    0.6
}

fn default_lexical_weight() -> f32 {
    0.25
}

fn default_exact_weight() -> f32 {
    0.15
}

fn default_min_score() -> f32 {
    0.001
}

fn default_top_k() -> usize {
    10
}

fn default_max_candidates() -> usize {
    50
}

fn default_max_context_length() -> usize {
    2000
}

fn default_max_keywords() -> usize {
    10
}

fn default_dimension_timeout() -> u64 {
    10_000
}

fn default_planner_timeout() -> u64 {
    15_000
}

fn default_confidence_threshold() -> f32 {
    0.7
}

fn default_fallback_confidence() -> f32 {
    0.8
}

fn to_strings(words: &[&str]) -> Vec<String> {
    words.iter().map(|w| w.to_string()).collect()
}

fn default_temporal_keywords() -> Vec<String> {
    to_strings(DEFAULT_TEMPORAL_KEYWORDS)
}

fn default_stopwords() -> Vec<String> {
    to_strings(DEFAULT_STOPWORDS)
}

fn default_keep_single() -> Vec<String> {
    to_strings(DEFAULT_KEEP_SINGLE)
}

fn default_allowed_pos() -> Vec<String> {
    to_strings(DEFAULT_ALLOWED_POS)
}

impl QaConfig {
    /// Load configuration from file.
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| QaError::config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from default paths.
    pub fn load_default() -> Result<Self> {
        // Try user config first
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("qa-retrieval").join("config.toml");
            if user_config.exists() {
                return Self::load(&user_config);
            }
        }

        // Try local config
        let local_config = PathBuf::from("qa-retrieval.toml");
        if local_config.exists() {
            return Self::load(&local_config);
        }

        Ok(Self::default())
    }

    /// Named preset. Unknown names fall back to the defaults.
    ///
    /// `balanced`, `vector`, `keyword`, `exact`, `fast`, `comprehensive`.
    pub fn preset(name: &str) -> Self {
        let mut config = Self::default();
        let fusion = &mut config.fusion;
        match name {
            "balanced" => {
                (fusion.semantic_weight, fusion.lexical_weight, fusion.exact_weight) =
                    (0.33, 0.33, 0.34);
            }
            "vector" => {
                (fusion.semantic_weight, fusion.lexical_weight, fusion.exact_weight) =
                    (0.6, 0.2, 0.2);
                config.bm25.k1 = 1.2;
            }
            "keyword" => {
                (fusion.semantic_weight, fusion.lexical_weight, fusion.exact_weight) =
                    (0.2, 0.6, 0.2);
                config.bm25.k1 = 2.0;
                config.bm25.b = 0.5;
            }
            "exact" => {
                (fusion.semantic_weight, fusion.lexical_weight, fusion.exact_weight) =
                    (0.2, 0.2, 0.6);
            }
            "fast" => {
                (fusion.semantic_weight, fusion.lexical_weight, fusion.exact_weight) =
                    (0.5, 0.3, 0.2);
                config.search.max_candidates = 20;
                config.search.default_top_k = 3;
                config.search.max_context_length = 1000;
                config.search.max_keywords = 5;
            }
            "comprehensive" => {
                (fusion.semantic_weight, fusion.lexical_weight, fusion.exact_weight) =
                    (0.4, 0.3, 0.3);
                config.search.max_candidates = 100;
                config.search.max_context_length = 3000;
                config.search.max_keywords = 15;
            }
            "default" => {}
            other => warn!("Unknown preset '{}', using defaults", other),
        }
        config
    }

    /// Check parameter ranges.
    ///
    /// Fusion weights that do not sum to 1.0 only produce a warning.
    pub fn validate(&self) -> Result<()> {
        let total = self.fusion.weight_sum();
        if (total - 1.0).abs() > 0.01 {
            warn!("Fusion weights sum to {:.3}; 1.0 is recommended", total);
        }

        if self.bm25.k1 <= 0.0 {
            return Err(QaError::config("bm25.k1 must be greater than 0"));
        }
        if !(0.0..=1.0).contains(&self.bm25.b) {
            return Err(QaError::config("bm25.b must be within [0, 1]"));
        }
        if self.search.max_candidates == 0 {
            return Err(QaError::config("search.max_candidates must be greater than 0"));
        }
        if self.search.default_top_k == 0 {
            return Err(QaError::config("search.default_top_k must be greater than 0"));
        }
        if self.search.max_context_length == 0 {
            return Err(QaError::config(
                "search.max_context_length must be greater than 0",
            ));
        }
        if !(0.0..=1.0).contains(&self.planner.confidence_threshold) {
            return Err(QaError::config(
                "planner.confidence_threshold must be within [0, 1]",
            ));
        }

        Ok(())
    }
}
