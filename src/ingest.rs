//! Ingestion pipeline orchestration.
//!
//! Converts a stream of raw rows into persisted, vectorized records:
//! build → truncate → embed → upsert, per row, in source order. Commits are
//! per-row — a failure on row N is recorded in the report and the run keeps
//! going, so a transient provider error late in a large batch does not throw
//! away everything before it.

use serde_json::Value;
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::embedding::Embedder;
use crate::error::Result;
use crate::record;
use crate::store;
use crate::truncate::truncate;

/// One row the pipeline could not ingest, with enough context to diagnose.
#[derive(Debug)]
pub struct RowFailure {
    /// Row identifier, or `"?"` when the row had none.
    pub instance_id: String,
    pub error: String,
}

/// Outcome of one ingestion run.
#[derive(Debug, Default)]
pub struct IngestReport {
    /// Rows taken from the source (after the limit).
    pub seen: usize,
    /// Rows newly persisted with an embedding.
    pub inserted: usize,
    /// Rows whose `instance_id` already existed; the store kept the first
    /// write and this run's embedding was discarded.
    pub skipped: usize,
    pub failed: Vec<RowFailure>,
}

/// Ingest `rows` into the store through `embedder`.
///
/// `max_tokens` is the embedding input budget; `limit` optionally bounds the
/// number of rows processed. Idempotent: re-running over the same rows
/// inserts nothing new and refreshes no embeddings.
pub async fn run_ingest(
    pool: &SqlitePool,
    embedder: &dyn Embedder,
    rows: &[Value],
    max_tokens: usize,
    limit: Option<usize>,
) -> Result<IngestReport> {
    store::ensure_schema(pool).await?;

    let rows = match limit {
        Some(lim) => &rows[..rows.len().min(lim)],
        None => rows,
    };

    let mut report = IngestReport {
        seen: rows.len(),
        ..Default::default()
    };

    for row in rows {
        match ingest_row(pool, embedder, row, max_tokens).await {
            Ok(true) => report.inserted += 1,
            Ok(false) => report.skipped += 1,
            Err(e) => {
                let instance_id = row
                    .get("instance_id")
                    .and_then(Value::as_str)
                    .unwrap_or("?")
                    .to_string();
                warn!(instance_id = %instance_id, error = %e, "row ingestion failed");
                report.failed.push(RowFailure {
                    instance_id,
                    error: e.to_string(),
                });
            }
        }
    }

    info!(
        seen = report.seen,
        inserted = report.inserted,
        skipped = report.skipped,
        failed = report.failed.len(),
        model = embedder.model_name(),
        "ingestion run complete"
    );

    Ok(report)
}

/// Ingest a single row. Returns whether a new record was inserted.
async fn ingest_row(
    pool: &SqlitePool,
    embedder: &dyn Embedder,
    row: &Value,
    max_tokens: usize,
) -> Result<bool> {
    let mut record = record::build_record(row)?;

    let text = truncate(&record::embedding_text(&record), max_tokens);
    record.embedding = Some(embedder.embed(&text).await?);

    store::upsert(pool, &record, embedder.model_name()).await
}
