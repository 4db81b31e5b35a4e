//! qa-index - BM25 lexical index
//!
//! This crate provides the lexical ranking signal: a classic BM25 index
//! built in bulk from the corpus, a failure-tolerant id resolver, and a
//! handle that publishes rebuilt indexes atomically.
//!
//! # Example
//!
//! ```rust,ignore
//! use qa_index::IndexHandle;
//! use std::sync::Arc;
//!
//! let handle = IndexHandle::new(Arc::new(tokenizer), config.bm25.clone());
//! handle.rebuild(&store).await?;
//!
//! let index = handle.snapshot();
//! let score = index.score(&terms, "lecture3-12");
//! ```

mod bm25;
mod handle;
mod resolve;

pub use bm25::{fingerprint, GlobalStats, IndexEntry, IndexSummary, LexicalIndex};
pub use handle::{IndexHandle, RebuildReport};
pub use resolve::{IdResolver, MatchStrategy};
