//! In-process vector store over a JSON corpus export.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use qa_core::{CorpusRecord, Metadata, QaError, Result, VectorHit, VectorStore};

/// Corpus export layouts accepted by [`MemoryStore::load_json`].
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CorpusFile {
    /// `[{"id", "document", "metadata"}, ...]`
    Records(Vec<CorpusRecord>),

    /// Column-oriented export: parallel `ids`, `documents`, `metadatas`.
    Columns {
        ids: Vec<String>,
        documents: Vec<String>,
        #[serde(default)]
        metadatas: Vec<Option<Metadata>>,
    },
}

/// Character-bigram profile of a text.
#[derive(Debug, Clone, Default)]
struct Profile {
    counts: HashMap<(char, char), f32>,
    norm: f32,
}

impl Profile {
    fn new(text: &str) -> Self {
        let chars: Vec<char> = text
            .chars()
            .filter(|c| !c.is_whitespace())
            .flat_map(char::to_lowercase)
            .collect();

        let mut counts: HashMap<(char, char), f32> = HashMap::new();
        if chars.len() == 1 {
            counts.insert((chars[0], '\0'), 1.0);
        }
        for pair in chars.windows(2) {
            *counts.entry((pair[0], pair[1])).or_insert(0.0) += 1.0;
        }

        let norm = counts.values().map(|v| v * v).sum::<f32>().sqrt();
        Self { counts, norm }
    }

    fn cosine(&self, other: &Profile) -> f32 {
        if self.norm == 0.0 || other.norm == 0.0 {
            return 0.0;
        }
        let (small, large) = if self.counts.len() <= other.counts.len() {
            (self, other)
        } else {
            (other, self)
        };
        let dot: f32 = small
            .counts
            .iter()
            .filter_map(|(gram, v)| large.counts.get(gram).map(|w| v * w))
            .sum();
        dot / (self.norm * other.norm)
    }
}

/// A [`VectorStore`] holding the whole corpus in memory.
///
/// Similarity is the cosine of character-bigram counts, standing in for
/// embedding similarity when no embedding service is available.
pub struct MemoryStore {
    records: Vec<CorpusRecord>,
    profiles: Vec<Profile>,
}

impl MemoryStore {
    /// Create a store from records.
    pub fn from_records(records: Vec<CorpusRecord>) -> Self {
        let profiles = records.iter().map(|r| Profile::new(&r.document)).collect();
        Self { records, profiles }
    }

    /// Load a JSON corpus export (record list or column layout).
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let file: CorpusFile = serde_json::from_str(&text)?;

        let records = match file {
            CorpusFile::Records(records) => records,
            CorpusFile::Columns {
                ids,
                documents,
                metadatas,
            } => {
                if ids.len() != documents.len()
                    || (!metadatas.is_empty() && metadatas.len() != ids.len())
                {
                    return Err(QaError::invalid_argument(format!(
                        "corpus columns differ in length: {} ids, {} documents, {} metadatas",
                        ids.len(),
                        documents.len(),
                        metadatas.len()
                    )));
                }
                let mut metadatas = metadatas.into_iter();
                ids.into_iter()
                    .zip(documents)
                    .map(|(id, document)| CorpusRecord {
                        id,
                        document,
                        metadata: metadatas.next().flatten().unwrap_or_default(),
                    })
                    .collect()
            }
        };

        info!("Loaded {} corpus records from {:?}", records.len(), path);
        Ok(Self::from_records(records))
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn query(&self, text: &str, k: usize) -> Result<Vec<VectorHit>> {
        let query = Profile::new(text);

        let mut scored: Vec<(usize, f32)> = self
            .profiles
            .iter()
            .enumerate()
            .map(|(i, profile)| (i, query.cosine(profile)))
            .filter(|(_, similarity)| *similarity > 0.0)
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        debug!("Memory store matched {} records for {:?}", scored.len(), text);

        Ok(scored
            .into_iter()
            .enumerate()
            .map(|(rank, (i, _))| VectorHit {
                record: self.records[i].clone(),
                rank,
            })
            .collect())
    }

    async fn get_all(&self) -> Result<Vec<CorpusRecord>> {
        Ok(self.records.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn record(id: &str, document: &str) -> CorpusRecord {
        CorpusRecord {
            id: id.to_string(),
            document: document.to_string(),
            metadata: Metadata::new(),
        }
    }

    #[test]
    fn test_profile_cosine() {
        let a = Profile::new("ownership rules");
        assert!((a.cosine(&Profile::new("Ownership Rules")) - 1.0).abs() < 1e-5);
        assert_eq!(a.cosine(&Profile::new("")), 0.0);
        assert_eq!(a.cosine(&Profile::new("xyz")), 0.0);
        assert!(Profile::new("王").cosine(&Profile::new("王")) > 0.99);
    }

    #[tokio::test]
    async fn test_query_ranks_by_similarity() {
        let store = MemoryStore::from_records(vec![
            record("a", "closures capture their environment"),
            record("b", "ownership and borrowing rules"),
            record("c", "ownership"),
        ]);

        let hits = store.query("ownership", 10).await.unwrap();
        assert_eq!(hits[0].record.id, "c");
        assert_eq!(hits[0].rank, 0);
        assert_eq!(hits[1].record.id, "b");
        assert!(hits.iter().all(|h| h.record.id != "a" || h.rank > 1));

        assert_eq!(store.query("ownership", 1).await.unwrap().len(), 1);
        assert!(store.query("", 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_load_record_list() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"id": "x-1", "document": "alpha", "metadata": {{"source_file": "a.txt"}}}},
               {{"id": "x-2", "content": "beta"}}]"#
        )
        .unwrap();

        let store = MemoryStore::load_json(file.path()).unwrap();
        assert_eq!(store.len(), 2);
        let all = store.get_all().await.unwrap();
        assert_eq!(all[1].document, "beta");
        assert!(all[1].metadata.is_empty());
    }

    #[test]
    fn test_load_columns() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"ids": ["x-1", "x-2"], "documents": ["alpha", "beta"], "metadatas": [{{"chunk_type": "general_text"}}, null]}}"#
        )
        .unwrap();

        let store = MemoryStore::load_json(file.path()).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.records[0].metadata["chunk_type"], "general_text");
        assert!(store.records[1].metadata.is_empty());
    }

    #[test]
    fn test_load_rejects_mismatched_columns() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"ids": ["x-1"], "documents": []}}"#).unwrap();
        let err = MemoryStore::load_json(file.path()).err().unwrap();
        assert_eq!(err.error_code(), "INVALID_ARGUMENT");
    }

    #[test]
    fn test_load_missing_file() {
        let err = MemoryStore::load_json("/nonexistent/corpus.json").err().unwrap();
        assert_eq!(err.error_code(), "IO_ERROR");
    }
}
