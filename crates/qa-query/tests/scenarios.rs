//! End-to-end behaviour of the retrieval engine.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use serde_json::{json, Value};

use qa_core::{
    Bm25Config, Candidate, CorpusRecord, Dimension, FusionConfig, LanguageModel, PlanOrigin,
    QaConfig, QaError, Result, VectorHit, VectorStore,
};
use qa_index::LexicalIndex;
use qa_query::{dedupe, Reranker, RetrievalEngine, CONTEXT_SUFFICIENT, NO_CONTENT, NO_RESULTS};
use qa_store::MemoryStore;
use qa_text::Tokenizer;

fn tokenizer() -> Arc<Tokenizer> {
    static TOKENIZER: OnceLock<Arc<Tokenizer>> = OnceLock::new();
    Arc::clone(TOKENIZER.get_or_init(|| Arc::new(Tokenizer::new())))
}

fn record(id: &str, document: &str, metadata: Value) -> CorpusRecord {
    CorpusRecord {
        id: id.to_string(),
        document: document.to_string(),
        metadata: metadata.as_object().cloned().unwrap_or_default(),
    }
}

fn text_record(id: &str, document: &str) -> CorpusRecord {
    record(
        id,
        document,
        json!({"source_file": "lectures/chap01_processed.json", "chunk_type": "general_text"}),
    )
}

/// Serves the corpus for indexing but fails every similarity query.
struct FailingStore {
    records: Vec<CorpusRecord>,
}

#[async_trait]
impl VectorStore for FailingStore {
    async fn query(&self, _text: &str, _k: usize) -> Result<Vec<VectorHit>> {
        Err(QaError::vector_store("connection refused"))
    }

    async fn get_all(&self) -> Result<Vec<CorpusRecord>> {
        Ok(self.records.clone())
    }
}

/// Always replies with the same text.
struct ScriptedModel(String);

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, _prompt: &str) -> Result<String> {
        Ok(self.0.clone())
    }
}

async fn engine_over<S: VectorStore>(
    store: S,
    model: Option<ScriptedModel>,
) -> RetrievalEngine<S, ScriptedModel> {
    let engine = RetrievalEngine::with_tokenizer(
        Arc::new(store),
        model.map(Arc::new),
        QaConfig::default(),
        tokenizer(),
    );
    engine.rebuild_index().await.unwrap();
    engine
}

fn creativity_corpus() -> Vec<CorpusRecord> {
    vec![
        text_record("chap01-0", "creativity matters"),
        text_record(
            "chap01-1",
            "creativity requires patience practice feedback courage over many years",
        ),
        text_record("chap01-2", "ownership borrowing lifetimes"),
    ]
}

#[tokio::test]
async fn shorter_fragment_ranks_first_for_equal_term_frequency() {
    let engine = engine_over(
        FailingStore {
            records: creativity_corpus(),
        },
        None,
    )
    .await;

    let response = engine.search("creativity", Some(5), None).await.unwrap();

    let ids: Vec<&str> = response.ranked.iter().map(|c| c.id()).collect();
    assert_eq!(ids, vec!["chap01-0", "chap01-1"]);
    assert!(response.ranked[0].final_score() > response.ranked[1].final_score());
    assert_eq!(response.candidate_count, 2);
    assert!(response.message.is_none());
}

#[test]
fn duplicate_chunk_keeps_semantic_hit_and_counts_sources() {
    let fragment = Arc::new(qa_core::Fragment::text("doc5-3", "text", "doc5.txt"));
    let candidates = vec![
        Candidate::semantic(fragment.clone(), 0).with_score(0.9),
        Candidate::lexical(fragment, 0, 0.95),
    ];

    let deduped = dedupe(candidates);

    assert_eq!(deduped.len(), 1);
    assert_eq!(deduped[0].source, Dimension::Semantic);
    assert_eq!(deduped[0].score, 0.9);
    assert_eq!(deduped[0].source_count(), 2);
}

#[tokio::test]
async fn low_confidence_plan_searches_anyway() {
    let model = ScriptedModel(
        r#"{"needs_additional_search": false, "missing_dimensions": [], "confidence": 0.4, "reasoning": "probably fine"}"#
            .to_string(),
    );
    let engine = engine_over(MemoryStore::from_records(creativity_corpus()), Some(model)).await;

    let response = engine
        .plan_and_search("creativity", Some("we talked about art"), 5)
        .await
        .unwrap();

    assert_eq!(response.plan.origin, PlanOrigin::Model);
    assert!(!response.plan.needs_additional_search);
    assert!(response.needs_search);
    assert_eq!(response.dimensions_searched, vec![Dimension::Semantic]);
    assert!(!response.ranked.is_empty());
}

#[test]
fn min_score_filter_is_bypassed_when_too_few_survive() {
    let fragments: Vec<_> = (0..10)
        .map(|i| {
            Arc::new(qa_core::Fragment::text(
                &format!("d-{}", i),
                "unrelated words",
                "d.txt",
            ))
        })
        .collect();
    let index = LexicalIndex::build(fragments.clone(), &tokenizer(), &Bm25Config::default());

    let mut candidates = vec![Candidate::semantic(fragments[9].clone(), 0)];
    candidates.extend(
        fragments[..9]
            .iter()
            .enumerate()
            .map(|(rank, f)| Candidate::lexical(f.clone(), rank, 0.0)),
    );

    let reranker = Reranker::new(tokenizer(), FusionConfig::default());
    let ranked = reranker.rerank("zebra", candidates, &index, 10);

    assert_eq!(ranked.len(), 10);
    let passing = ranked.iter().filter(|c| c.final_score() > 0.001).count();
    assert_eq!(passing, 1);
    assert_eq!(ranked[0].id(), "d-9");
    for pair in ranked.windows(2) {
        assert!(pair[0].final_score() >= pair[1].final_score());
    }
}

#[tokio::test]
async fn no_matches_is_an_explained_empty_result() {
    let engine = engine_over(MemoryStore::from_records(creativity_corpus()), None).await;

    let response = engine.search("zzqx", None, None).await.unwrap();

    assert_eq!(response.candidate_count, 0);
    assert!(response.ranked.is_empty());
    assert_eq!(response.message.as_deref(), Some(NO_RESULTS));
    assert_eq!(response.context.text, NO_CONTENT);
}

#[tokio::test]
async fn empty_corpus_is_not_an_error() {
    let engine = engine_over(MemoryStore::from_records(Vec::new()), None).await;

    let response = engine.search("anything at all", None, None).await.unwrap();
    assert_eq!(response.candidate_count, 0);
    assert_eq!(response.message.as_deref(), Some(NO_RESULTS));

    let planned = engine.plan_and_search("anything at all", None, 5).await.unwrap();
    assert!(planned.needs_search);
    assert!(planned.ranked.is_empty());
}

#[tokio::test]
async fn sufficient_context_skips_retrieval() {
    let model = ScriptedModel(
        "Looks answered.\n```json\n{'needs_additional_search': False, 'missing_dimensions': [], 'confidence': 0.95, 'reasoning': 'answered',}\n```"
            .to_string(),
    );
    let engine = engine_over(MemoryStore::from_records(creativity_corpus()), Some(model)).await;

    let response = engine
        .plan_and_search("creativity", Some("creativity matters"), 5)
        .await
        .unwrap();

    assert!(!response.needs_search);
    assert!(response.dimensions_searched.is_empty());
    assert!(response.ranked.is_empty());
    assert_eq!(response.message.as_deref(), Some(CONTEXT_SUFFICIENT));
}

#[tokio::test]
async fn unusable_model_reply_uses_rule_based_plan() {
    let dialogue = record(
        "talk-4",
        "老师讲解了自然语言处理的定义",
        json!({
            "source_file": "talk.txt",
            "chunk_type": "traditional",
            "speakers": "李老师",
            "start_time": "10:05",
            "end_time": "10:40"
        }),
    );
    let mut corpus = creativity_corpus();
    corpus.push(dialogue);

    let engine = engine_over(
        MemoryStore::from_records(corpus),
        Some(ScriptedModel("I am not sure what you mean.".to_string())),
    )
    .await;

    let response = engine
        .plan_and_search("老师在10:00到11:00之间讲了什么", None, 5)
        .await
        .unwrap();

    assert_eq!(response.plan.origin, PlanOrigin::RuleFallback);
    assert_eq!(
        response.dimensions_searched,
        vec![Dimension::Semantic, Dimension::Lexical, Dimension::Temporal]
    );
    assert!(response.ranked.iter().any(|c| c.id() == "talk-4"));
    assert!(response.context.text.contains("Source: talk"));
}

#[tokio::test]
async fn failed_store_is_reported_per_dimension() {
    let engine = engine_over(
        FailingStore {
            records: creativity_corpus(),
        },
        None,
    )
    .await;

    let response = engine.plan_and_search("creativity", None, 5).await.unwrap();

    assert_eq!(response.dimensions_searched, vec![Dimension::Lexical]);
    assert_eq!(response.failures.len(), 1);
    assert_eq!(response.failures[0].dimension, Dimension::Semantic);
    assert!(!response.fallback);
    assert!(!response.ranked.is_empty());
}

#[tokio::test]
async fn every_dimension_failing_is_reported_not_raised() {
    let model = ScriptedModel(
        r#"{"needs_additional_search": true, "missing_dimensions": ["semantic"], "confidence": 0.9, "reasoning": "need more"}"#
            .to_string(),
    );
    let engine = engine_over(
        FailingStore {
            records: creativity_corpus(),
        },
        Some(model),
    )
    .await;

    let response = engine.plan_and_search("creativity", None, 5).await.unwrap();

    assert!(response.ranked.is_empty());
    assert_eq!(response.failures[0].code, "RETRIEVAL_FAILED");
    assert_eq!(response.message.as_deref(), Some(NO_RESULTS));
}

#[tokio::test]
async fn results_respect_top_k_and_context_budget() {
    let corpus: Vec<CorpusRecord> = (0..20)
        .map(|i| {
            text_record(
                &format!("chap01-{}", i),
                &format!("ownership rule number {} explains moves and borrows", i),
            )
        })
        .collect();
    let engine = engine_over(MemoryStore::from_records(corpus), None).await;

    for (top_k, budget) in [(1, 50), (3, 300), (7, 100_000)] {
        let response = engine
            .search("ownership moves", Some(top_k), Some(budget))
            .await
            .unwrap();
        assert!(response.ranked.len() <= top_k);
        assert!(response.context.text.chars().count() <= budget);
        for candidate in &response.ranked {
            assert!((0.0..=1.0).contains(&candidate.scores.lexical_normalized));
        }
    }
}

#[tokio::test]
async fn keywords_and_index_stats() {
    let engine = engine_over(MemoryStore::from_records(creativity_corpus()), None).await;

    let stats = engine.index_stats();
    assert_eq!(stats.documents, 3);
    assert_eq!(stats.generation, 1);

    let keywords = engine.keywords("creativity creativity courage");
    assert_eq!(keywords[0].term, "creativity");

    let response = engine.search("creativity", None, None).await.unwrap();
    assert!(response.keywords.contains(&"creativity".to_string()));
}

#[tokio::test]
async fn empty_query_is_rejected() {
    let engine = engine_over(MemoryStore::from_records(creativity_corpus()), None).await;
    let err = engine.search("   ", None, None).await.unwrap_err();
    assert_eq!(err.error_code(), "INVALID_ARGUMENT");
}
