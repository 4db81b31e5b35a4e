//! Interfaces to the external collaborators.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{CorpusRecord, VectorHit};

/// Vector store holding the embedded corpus.
///
/// Embeddings live entirely on the store's side; the engine only asks for
/// ranked neighbours and, at index-build time, for the whole corpus.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Top-`k` nearest fragments for the query text, best first.
    async fn query(&self, text: &str, k: usize) -> Result<Vec<VectorHit>>;

    /// Every record in the corpus.
    async fn get_all(&self) -> Result<Vec<CorpusRecord>>;
}

/// Language model used for dimension planning.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Complete a prompt with free-form text.
    async fn complete(&self, prompt: &str) -> Result<String>;
}
