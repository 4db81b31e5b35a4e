//! qa-text - Text analysis for retrieval
//!
//! This crate turns raw text into the terms the lexical index and the
//! exact-match scorer work with.
//!
//! # Components
//!
//! - [`Tokenizer`]: Chinese-aware word segmentation with stopword and
//!   single-character filtering, plus query keyword extraction.
//!
//! - [`exact_match_score`]: literal, token-overlap and phrase-overlap
//!   similarity between a query and a fragment.
//!
//! # Example
//!
//! ```rust,ignore
//! use qa_text::{exact_match_score, Tokenizer};
//!
//! let tokenizer = Tokenizer::new();
//! let keywords = tokenizer.extract_keywords("自然语言处理的应用有哪些？", 5);
//! let score = exact_match_score(&tokenizer, "自然语言处理", "自然语言处理是人工智能的分支");
//! ```

mod exact;
mod tokenizer;

pub use exact::{exact_match_score, phrase_overlap, token_overlap, PHRASE_WINDOW};
pub use tokenizer::{Keyword, Tokenizer};

// Re-export for convenience
pub use qa_core::TextConfig;
