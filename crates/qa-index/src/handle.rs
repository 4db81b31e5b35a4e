//! Atomic publication of rebuilt indexes.

use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use qa_core::{Bm25Config, CorpusRecord, Fragment, QaError, Result, VectorStore};
use qa_text::Tokenizer;

use crate::bm25::{fingerprint, LexicalIndex};

/// Outcome of a rebuild.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebuildReport {
    /// Generation visible to readers after the rebuild.
    pub generation: u64,

    /// Fragments in the published index.
    pub indexed: usize,

    /// Records rejected during conversion.
    pub skipped: usize,

    /// False when the corpus was unchanged and nothing was swapped.
    pub published: bool,
}

/// Shared owner of the current [`LexicalIndex`].
///
/// Readers take a snapshot (`Arc`) and keep using it for the whole query,
/// so a concurrent rebuild never exposes a half-built index. Rebuilds are
/// serialized; the swap itself holds the write lock only for the pointer
/// exchange.
pub struct IndexHandle {
    current: RwLock<Arc<LexicalIndex>>,
    rebuild_lock: Mutex<()>,
    tokenizer: Arc<Tokenizer>,
    params: Bm25Config,
}

impl IndexHandle {
    /// Create a handle holding an empty index.
    pub fn new(tokenizer: Arc<Tokenizer>, params: Bm25Config) -> Self {
        Self {
            current: RwLock::new(Arc::new(LexicalIndex::empty(&params))),
            rebuild_lock: Mutex::new(()),
            tokenizer,
            params,
        }
    }

    /// The currently published index.
    pub fn snapshot(&self) -> Arc<LexicalIndex> {
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    /// The tokenizer used for indexing.
    pub fn tokenizer(&self) -> &Arc<Tokenizer> {
        &self.tokenizer
    }

    /// Replace the published index, returning its new generation.
    pub fn publish(&self, index: LexicalIndex) -> u64 {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let generation = guard.generation() + 1;
        *guard = Arc::new(index.with_generation(generation));
        generation
    }

    /// Rebuild from the store's full corpus.
    pub async fn rebuild<S>(&self, store: &S) -> Result<RebuildReport>
    where
        S: VectorStore + ?Sized,
    {
        let records = store.get_all().await?;
        self.rebuild_from_records(records).await
    }

    /// Rebuild from corpus records.
    ///
    /// Records that do not convert into fragments are skipped and counted.
    /// When the corpus fingerprint matches the published index the swap is
    /// skipped.
    pub async fn rebuild_from_records(&self, records: Vec<CorpusRecord>) -> Result<RebuildReport> {
        let _rebuilding = self.rebuild_lock.lock().await;

        let mut fragments = Vec::with_capacity(records.len());
        let mut skipped = 0;
        for record in &records {
            match Fragment::from_record(record) {
                Ok(fragment) => fragments.push(Arc::new(fragment)),
                Err(e) => {
                    warn!("Skipping corpus record: {}", e);
                    skipped += 1;
                }
            }
        }

        let current = self.snapshot();
        if current.generation() > 0 && current.fingerprint() == fingerprint(&fragments) {
            debug!(
                "Corpus unchanged, keeping index generation {}",
                current.generation()
            );
            return Ok(RebuildReport {
                generation: current.generation(),
                indexed: current.len(),
                skipped,
                published: false,
            });
        }

        let tokenizer = Arc::clone(&self.tokenizer);
        let params = self.params.clone();
        let index = tokio::task::spawn_blocking(move || {
            LexicalIndex::build(fragments, &tokenizer, &params)
        })
        .await
        .map_err(|e| QaError::internal(format!("Index build task failed: {}", e)))?;

        let indexed = index.len();
        let generation = self.publish(index);

        info!(
            "Published lexical index generation {} ({} fragments, {} skipped)",
            generation, indexed, skipped
        );

        Ok(RebuildReport {
            generation,
            indexed,
            skipped,
            published: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(id: &str, text: &str) -> CorpusRecord {
        serde_json::from_value(json!({
            "id": id,
            "document": text,
            "metadata": {"source_file": "notes.txt", "chunk_type": "general_text"}
        }))
        .unwrap()
    }

    fn handle() -> IndexHandle {
        IndexHandle::new(Arc::new(Tokenizer::new()), Bm25Config::default())
    }

    #[tokio::test]
    async fn test_rebuild_publishes_new_generation() {
        let handle = handle();
        assert_eq!(handle.snapshot().generation(), 0);

        let report = handle
            .rebuild_from_records(vec![record("n-1", "ownership"), record("n-2", "borrowing")])
            .await
            .unwrap();

        assert!(report.published);
        assert_eq!(report.generation, 1);
        assert_eq!(report.indexed, 2);
        assert_eq!(handle.snapshot().len(), 2);
    }

    #[tokio::test]
    async fn test_unchanged_corpus_is_not_republished() {
        let handle = handle();
        let records = vec![record("n-1", "ownership")];

        handle.rebuild_from_records(records.clone()).await.unwrap();
        let report = handle.rebuild_from_records(records).await.unwrap();

        assert!(!report.published);
        assert_eq!(report.generation, 1);
    }

    #[tokio::test]
    async fn test_invalid_records_are_skipped() {
        let handle = handle();
        let bad: CorpusRecord = serde_json::from_value(json!({
            "id": "q-1",
            "document": "text",
            "metadata": {"chunk_type": "qa_pair"}
        }))
        .unwrap();

        let report = handle
            .rebuild_from_records(vec![bad, record("n-1", "ownership")])
            .await
            .unwrap();

        assert_eq!(report.skipped, 1);
        assert_eq!(report.indexed, 1);
    }

    #[tokio::test]
    async fn test_snapshot_survives_swap() {
        let handle = handle();
        handle
            .rebuild_from_records(vec![record("n-1", "ownership")])
            .await
            .unwrap();

        let before = handle.snapshot();
        handle
            .rebuild_from_records(vec![record("n-1", "ownership"), record("n-2", "lifetimes")])
            .await
            .unwrap();

        assert_eq!(before.len(), 1);
        assert_eq!(handle.snapshot().len(), 2);
        assert_eq!(handle.snapshot().generation(), 2);
    }
}
