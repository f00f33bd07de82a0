//! End-to-end pipeline tests against a real SQLite database, with
//! deterministic fakes standing in for the embedding and LLM providers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tempfile::TempDir;

use bugrag::answer::{answer, EMPTY_OUTPUT_FALLBACK};
use bugrag::db;
use bugrag::embedding::{Embedder, Metric};
use bugrag::error::Result;
use bugrag::ingest::run_ingest;
use bugrag::llm::LanguageModel;
use bugrag::models::BugRecord;
use bugrag::retrieval::retrieve_top_k;
use bugrag::store;

const DIMS: usize = 4;
const MAX_TOKENS: usize = 8000;

/// Embedder that returns a mapped vector for known texts and a distinct
/// vector per call otherwise, so repeated embeds of the same text are
/// distinguishable (first-write-wins checks rely on this).
struct FakeEmbedder {
    map: HashMap<String, Vec<f32>>,
    calls: AtomicUsize,
}

impl FakeEmbedder {
    fn new() -> Self {
        Self {
            map: HashMap::new(),
            calls: AtomicUsize::new(0),
        }
    }

    fn with_mapping(pairs: &[(&str, Vec<f32>)]) -> Self {
        let mut embedder = Self::new();
        for (text, vec) in pairs {
            embedder.map.insert(text.to_string(), vec.clone());
        }
        embedder
    }
}

#[async_trait]
impl Embedder for FakeEmbedder {
    fn model_name(&self) -> &str {
        "fake-model"
    }

    fn dims(&self) -> usize {
        DIMS
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(vec) = self.map.get(text) {
            return Ok(vec.clone());
        }
        let mut vec = vec![0.0; DIMS];
        vec[0] = (call + 1) as f32;
        Ok(vec)
    }
}

/// LLM fake that records every prompt and replies with a fixed string.
struct FakeLlm {
    reply: String,
    prompts: Mutex<Vec<String>>,
}

impl FakeLlm {
    fn replying(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn last_prompt(&self) -> String {
        self.prompts.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl LanguageModel for FakeLlm {
    fn model_name(&self) -> &str {
        "fake-llm"
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(self.reply.clone())
    }
}

async fn test_pool() -> (TempDir, SqlitePool) {
    let dir = TempDir::new().unwrap();
    let pool = db::connect(&dir.path().join("bugrag.sqlite")).await.unwrap();
    store::ensure_schema(&pool).await.unwrap();
    (dir, pool)
}

fn make_row(instance_id: &str) -> Value {
    json!({
        "instance_id": instance_id,
        "repo": "octo/widgets",
        "base_commit": "abc123",
        "version": "1.2",
        "environment_setup_commit": "def456",
        "problem_statement": format!("{} crashes on empty input", instance_id),
        "hints_text": "check the parser",
        "patch": "diff --git a/widgets.py b/widgets.py",
        "test_patch": "diff --git a/test_widgets.py b/test_widgets.py",
        "created_at": "2021-06-01T12:00:00Z",
        "FAIL_TO_PASS": "[\"test_empty_input\"]",
        "PASS_TO_PASS": "[]",
    })
}

fn make_record(instance_id: &str, embedding: Option<Vec<f32>>) -> BugRecord {
    BugRecord {
        instance_id: instance_id.to_string(),
        repo: "octo/widgets".to_string(),
        base_commit: "abc123".to_string(),
        version: "1.2".to_string(),
        environment_setup_commit: "def456".to_string(),
        problem_statement: format!("{} crashes on empty input", instance_id),
        hint: String::new(),
        patch: "diff --git a/widgets.py b/widgets.py".to_string(),
        test_patch: "diff --git a/test_widgets.py b/test_widgets.py".to_string(),
        created_at: None,
        fail_to_pass: vec!["test_empty_input".to_string()],
        pass_to_pass: Vec::new(),
        embedding,
    }
}

#[tokio::test]
async fn ensure_schema_is_idempotent() {
    let (_dir, pool) = test_pool().await;
    store::ensure_schema(&pool).await.unwrap();
    store::ensure_schema(&pool).await.unwrap();
    assert_eq!(store::count_all(&pool).await.unwrap(), 0);
}

#[tokio::test]
async fn ingest_persists_full_record() {
    let (_dir, pool) = test_pool().await;
    let embedder = FakeEmbedder::new();

    let report = run_ingest(&pool, &embedder, &[make_row("bug-1")], MAX_TOKENS, None)
        .await
        .unwrap();
    assert_eq!(report.seen, 1);
    assert_eq!(report.inserted, 1);
    assert!(report.failed.is_empty());

    let record = store::fetch_record(&pool, "bug-1").await.unwrap().unwrap();
    assert_eq!(record.repo, "octo/widgets");
    assert_eq!(record.hint, "check the parser");
    assert_eq!(record.fail_to_pass, vec!["test_empty_input"]);
    assert!(record.created_at.is_some());
    assert_eq!(record.embedding.unwrap().len(), DIMS);
}

#[tokio::test]
async fn reingestion_keeps_first_embedding() {
    let (_dir, pool) = test_pool().await;
    let embedder = FakeEmbedder::new();
    let rows = [make_row("bug-1")];

    run_ingest(&pool, &embedder, &rows, MAX_TOKENS, None).await.unwrap();
    let first = store::fetch_record(&pool, "bug-1").await.unwrap().unwrap();

    // The fake returns a different vector on every call, so a refreshed
    // embedding would be visible.
    let report = run_ingest(&pool, &embedder, &rows, MAX_TOKENS, None).await.unwrap();
    assert_eq!(report.inserted, 0);
    assert_eq!(report.skipped, 1);

    let second = store::fetch_record(&pool, "bug-1").await.unwrap().unwrap();
    assert_eq!(store::count_all(&pool).await.unwrap(), 1);
    assert_eq!(first.embedding, second.embedding);
}

#[tokio::test]
async fn non_json_test_field_kept_as_singleton() {
    let (_dir, pool) = test_pool().await;
    let embedder = FakeEmbedder::new();

    let mut row = make_row("bug-flaky");
    row["FAIL_TO_PASS"] = json!("flaky_test");

    run_ingest(&pool, &embedder, &[row], MAX_TOKENS, None).await.unwrap();

    let record = store::fetch_record(&pool, "bug-flaky").await.unwrap().unwrap();
    assert_eq!(record.fail_to_pass, vec!["flaky_test"]);
}

#[tokio::test]
async fn failed_row_does_not_abort_the_run() {
    let (_dir, pool) = test_pool().await;
    let embedder = FakeEmbedder::new();

    let mut broken = make_row("bug-broken");
    broken.as_object_mut().unwrap().remove("patch");
    let rows = [make_row("bug-ok"), broken, make_row("bug-also-ok")];

    let report = run_ingest(&pool, &embedder, &rows, MAX_TOKENS, None).await.unwrap();
    assert_eq!(report.inserted, 2);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].instance_id, "bug-broken");
    assert!(report.failed[0].error.contains("patch"));

    assert!(store::exists(&pool, "bug-ok").await.unwrap());
    assert!(store::exists(&pool, "bug-also-ok").await.unwrap());
    assert!(!store::exists(&pool, "bug-broken").await.unwrap());
}

#[tokio::test]
async fn ingest_honors_limit() {
    let (_dir, pool) = test_pool().await;
    let embedder = FakeEmbedder::new();

    let rows: Vec<Value> = (0..5).map(|i| make_row(&format!("bug-{}", i))).collect();
    let report = run_ingest(&pool, &embedder, &rows, MAX_TOKENS, Some(2)).await.unwrap();

    assert_eq!(report.seen, 2);
    assert_eq!(report.inserted, 2);
    assert_eq!(store::count_all(&pool).await.unwrap(), 2);
}

#[tokio::test]
async fn retrieval_orders_by_ascending_distance() {
    let (_dir, pool) = test_pool().await;

    // Distances to the probe under the Euclidean metric: A 0.3, B 0.1, C 0.2.
    for (id, x) in [("bug-a", 0.3f32), ("bug-b", 0.1), ("bug-c", 0.2)] {
        let record = make_record(id, Some(vec![x, 0.0, 0.0, 0.0]));
        store::upsert(&pool, &record, "fake-model").await.unwrap();
    }

    let embedder = FakeEmbedder::with_mapping(&[("probe", vec![0.0; DIMS])]);
    let hits = retrieve_top_k(&pool, &embedder, Metric::Euclidean, "probe", MAX_TOKENS, 2)
        .await
        .unwrap();

    let ids: Vec<&str> = hits.iter().map(|h| h.instance_id.as_str()).collect();
    assert_eq!(ids, vec!["bug-b", "bug-c"]);
    assert!(hits[0].distance <= hits[1].distance);
}

#[tokio::test]
async fn retrieval_returns_at_most_k_nondecreasing() {
    let (_dir, pool) = test_pool().await;

    for i in 0..6 {
        let record = make_record(
            &format!("bug-{}", i),
            Some(vec![i as f32 * 0.1, 0.5, 0.0, 0.0]),
        );
        store::upsert(&pool, &record, "fake-model").await.unwrap();
    }

    let embedder = FakeEmbedder::with_mapping(&[("probe", vec![0.0, 0.5, 0.0, 0.0])]);
    let hits = retrieve_top_k(&pool, &embedder, Metric::Cosine, "probe", MAX_TOKENS, 4)
        .await
        .unwrap();

    assert_eq!(hits.len(), 4);
    for pair in hits.windows(2) {
        assert!(pair[0].distance <= pair[1].distance);
    }
}

#[tokio::test]
async fn empty_corpus_yields_no_hits() {
    let (_dir, pool) = test_pool().await;
    let embedder = FakeEmbedder::new();

    let hits = retrieve_top_k(&pool, &embedder, Metric::Cosine, "anything", MAX_TOKENS, 5)
        .await
        .unwrap();
    assert!(hits.is_empty());
}

#[tokio::test]
async fn unembedded_rows_are_invisible_to_retrieval() {
    let (_dir, pool) = test_pool().await;

    store::upsert(&pool, &make_record("bug-null", None), "fake-model")
        .await
        .unwrap();

    let embedder = FakeEmbedder::new();
    let hits = retrieve_top_k(&pool, &embedder, Metric::Cosine, "anything", MAX_TOKENS, 5)
        .await
        .unwrap();
    assert!(hits.is_empty());
}

#[tokio::test]
async fn vectors_from_another_model_are_segregated() {
    let (_dir, pool) = test_pool().await;

    let record = make_record("bug-old", Some(vec![0.1, 0.2, 0.3, 0.4]));
    store::upsert(&pool, &record, "old-model").await.unwrap();

    // Queries run under "fake-model"; the old-model vector must not rank.
    let embedder = FakeEmbedder::new();
    let hits = retrieve_top_k(&pool, &embedder, Metric::Cosine, "anything", MAX_TOKENS, 5)
        .await
        .unwrap();
    assert!(hits.is_empty());
    assert_eq!(store::count_embedded(&pool, "old-model").await.unwrap(), 1);
    assert_eq!(store::count_embedded(&pool, "fake-model").await.unwrap(), 0);
}

#[tokio::test]
async fn answer_grounds_in_retrieved_examples() {
    let (_dir, pool) = test_pool().await;

    let record = make_record("bug-ctx", Some(vec![0.0, 1.0, 0.0, 0.0]));
    store::upsert(&pool, &record, "fake-model").await.unwrap();

    let embedder = FakeEmbedder::with_mapping(&[("how do I fix this?", vec![0.0, 1.0, 0.0, 0.0])]);
    let llm = FakeLlm::replying("Grounded answer.");

    let text = answer(
        &pool,
        &embedder,
        &llm,
        Metric::Cosine,
        "how do I fix this?",
        MAX_TOKENS,
        3,
    )
    .await
    .unwrap();

    assert_eq!(text, "Grounded answer.");
    let prompt = llm.last_prompt();
    assert!(prompt.contains("INSTANCE_ID: bug-ctx"));
    assert!(prompt.contains("how do I fix this?"));
}

#[tokio::test]
async fn answer_degrades_without_context() {
    let (_dir, pool) = test_pool().await;
    let embedder = FakeEmbedder::new();
    let llm = FakeLlm::replying("General advice.");

    let text = answer(
        &pool,
        &embedder,
        &llm,
        Metric::Cosine,
        "anything",
        MAX_TOKENS,
        3,
    )
    .await
    .unwrap();

    assert_eq!(text, "General advice.");
    assert!(llm.last_prompt().contains("No retrieved examples were found"));
}

#[tokio::test]
async fn answer_is_never_empty() {
    let (_dir, pool) = test_pool().await;
    let embedder = FakeEmbedder::new();

    for reply in ["", "   \n\t  "] {
        let llm = FakeLlm::replying(reply);
        let text = answer(
            &pool,
            &embedder,
            &llm,
            Metric::Cosine,
            "anything",
            MAX_TOKENS,
            3,
        )
        .await
        .unwrap();
        assert_eq!(text, EMPTY_OUTPUT_FALLBACK);
    }
}

#[tokio::test]
async fn answer_trims_model_output() {
    let (_dir, pool) = test_pool().await;
    let embedder = FakeEmbedder::new();
    let llm = FakeLlm::replying("  padded answer  \n");

    let text = answer(
        &pool,
        &embedder,
        &llm,
        Metric::Cosine,
        "anything",
        MAX_TOKENS,
        3,
    )
    .await
    .unwrap();
    assert_eq!(text, "padded answer");
}
