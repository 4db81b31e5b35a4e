//! qa-query - Hybrid retrieval and reranking
//!
//! This crate turns a query into a ranked, deduplicated, length-bounded set
//! of fragments plus a rendered context block.
//!
//! # Pipeline
//!
//! query → dimension plan → multi-stage retrieval (semantic, lexical,
//! temporal) → deduplication → weighted fusion of semantic rank, BM25 and
//! exact match → context assembly
//!
//! # Example
//!
//! ```rust,ignore
//! use qa_query::RetrievalEngine;
//! use std::sync::Arc;
//!
//! let engine = RetrievalEngine::new(Arc::new(store), Some(Arc::new(model)), config);
//! engine.rebuild_index().await?;
//!
//! let response = engine.search("什么是自然语言处理", Some(5), None).await?;
//! println!("{}", response.context.text);
//!
//! let planned = engine.plan_and_search("那10:00之后呢", Some(&history), 10).await?;
//! ```

mod context;
mod dedup;
mod engine;
mod fusion;
mod orchestrator;

pub use context::{assemble, render, BUDGET_TOO_SMALL, NO_CONTENT};
pub use dedup::{chunk_key, dedupe, ChunkKey};
pub use engine::{RetrievalEngine, NO_RESULTS};
pub use fusion::Reranker;
pub use orchestrator::{temporal, MultiStageSearch, StageOutcome, CONTEXT_SUFFICIENT};

// Re-export for convenience
pub use qa_core::{PlannedSearchResponse, SearchResponse};
