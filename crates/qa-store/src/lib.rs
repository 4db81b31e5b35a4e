//! qa-store - Vector store implementations
//!
//! Provides [`MemoryStore`], an in-process [`qa_core::VectorStore`] over a
//! JSON corpus export. It ranks by character-bigram cosine similarity and
//! serves the CLI and tests when no embedding service is available.

mod memory;

pub use memory::MemoryStore;
