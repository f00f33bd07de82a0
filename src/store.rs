//! Vector store over SQLite.
//!
//! One table, `bug_records`, keyed by `instance_id`. Embeddings are stored
//! as little-endian f32 BLOBs tagged with the model that produced them;
//! nearest-neighbor queries decode the blobs and rank in Rust.
//!
//! Conflict policy is insert-or-ignore: records are immutable, so a second
//! insert for the same `instance_id` is a no-op and the first write's
//! embedding stays. The model tag keeps vectors from different embedding
//! models out of each other's rankings.

use sqlx::{Row, SqlitePool};

use crate::embedding::{blob_to_vec, vec_to_blob, Metric};
use crate::error::Result;
use crate::models::{BugRecord, RetrievalHit};
use crate::record::parse_json_list;

/// Create the corpus table if absent. Idempotent and safe to call
/// concurrently (plain `CREATE TABLE IF NOT EXISTS`).
pub async fn ensure_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS bug_records (
            instance_id TEXT PRIMARY KEY,
            repo TEXT NOT NULL,
            base_commit TEXT NOT NULL,
            version TEXT NOT NULL,
            environment_setup_commit TEXT NOT NULL,
            problem_statement TEXT NOT NULL,
            hint TEXT NOT NULL DEFAULT '',
            patch TEXT NOT NULL,
            test_patch TEXT NOT NULL,
            created_at INTEGER,
            fail_to_pass TEXT NOT NULL DEFAULT '[]',
            pass_to_pass TEXT NOT NULL DEFAULT '[]',
            embedding BLOB,
            embedding_model TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_bug_records_repo ON bug_records(repo)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_bug_records_model ON bug_records(embedding_model)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Insert a record, ignoring the insert if `instance_id` already exists.
/// First write wins; nothing is updated on conflict, including the
/// embedding. Returns whether a row was actually inserted.
pub async fn upsert(pool: &SqlitePool, record: &BugRecord, model: &str) -> Result<bool> {
    let embedding_blob = record.embedding.as_ref().map(|v| vec_to_blob(v));
    let embedding_model = record.embedding.as_ref().map(|_| model);

    let result = sqlx::query(
        r#"
        INSERT OR IGNORE INTO bug_records (
            instance_id, repo, base_commit, version, environment_setup_commit,
            problem_statement, hint, patch, test_patch, created_at,
            fail_to_pass, pass_to_pass, embedding, embedding_model
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&record.instance_id)
    .bind(&record.repo)
    .bind(&record.base_commit)
    .bind(&record.version)
    .bind(&record.environment_setup_commit)
    .bind(&record.problem_statement)
    .bind(&record.hint)
    .bind(&record.patch)
    .bind(&record.test_patch)
    .bind(record.created_at.map(|dt| dt.timestamp()))
    .bind(serde_json::to_string(&record.fail_to_pass)?)
    .bind(serde_json::to_string(&record.pass_to_pass)?)
    .bind(embedding_blob)
    .bind(embedding_model)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Nearest-neighbor query: the `k` embedded records closest to `query_vec`
/// under `metric`, ascending by distance. Only rows with a non-null
/// embedding produced by `model` participate; an empty corpus yields an
/// empty vec.
pub async fn query_nearest(
    pool: &SqlitePool,
    query_vec: &[f32],
    model: &str,
    metric: Metric,
    k: usize,
) -> Result<Vec<RetrievalHit>> {
    let rows = sqlx::query(
        r#"
        SELECT instance_id, repo, problem_statement, patch, embedding
        FROM bug_records
        WHERE embedding IS NOT NULL AND embedding_model = ?
        "#,
    )
    .bind(model)
    .fetch_all(pool)
    .await?;

    let mut hits: Vec<RetrievalHit> = rows
        .iter()
        .map(|row| {
            let blob: Vec<u8> = row.get("embedding");
            let vec = blob_to_vec(&blob);
            RetrievalHit {
                instance_id: row.get("instance_id"),
                repo: row.get("repo"),
                problem_statement: row.get("problem_statement"),
                patch: row.get("patch"),
                distance: metric.distance(query_vec, &vec),
            }
        })
        .collect();

    hits.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    hits.truncate(k);

    Ok(hits)
}

/// Whether a record with this `instance_id` exists.
pub async fn exists(pool: &SqlitePool, instance_id: &str) -> Result<bool> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM bug_records WHERE instance_id = ?")
            .bind(instance_id)
            .fetch_one(pool)
            .await?;
    Ok(count > 0)
}

/// Number of records embedded under `model`.
pub async fn count_embedded(pool: &SqlitePool, model: &str) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM bug_records WHERE embedding IS NOT NULL AND embedding_model = ?",
    )
    .bind(model)
    .fetch_one(pool)
    .await?;
    Ok(count)
}

/// Total number of records in the corpus.
pub async fn count_all(pool: &SqlitePool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM bug_records")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Fetch one full record by `instance_id`.
pub async fn fetch_record(pool: &SqlitePool, instance_id: &str) -> Result<Option<BugRecord>> {
    let row = sqlx::query("SELECT * FROM bug_records WHERE instance_id = ?")
        .bind(instance_id)
        .fetch_optional(pool)
        .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let created_at: Option<i64> = row.get("created_at");
    let embedding: Option<Vec<u8>> = row.get("embedding");
    let fail_to_pass: String = row.get("fail_to_pass");
    let pass_to_pass: String = row.get("pass_to_pass");

    Ok(Some(BugRecord {
        instance_id: row.get("instance_id"),
        repo: row.get("repo"),
        base_commit: row.get("base_commit"),
        version: row.get("version"),
        environment_setup_commit: row.get("environment_setup_commit"),
        problem_statement: row.get("problem_statement"),
        hint: row.get("hint"),
        patch: row.get("patch"),
        test_patch: row.get("test_patch"),
        created_at: created_at.and_then(|ts| chrono::DateTime::from_timestamp(ts, 0)),
        fail_to_pass: parse_json_list(&fail_to_pass).into_vec(),
        pass_to_pass: parse_json_list(&pass_to_pass).into_vec(),
        embedding: embedding.map(|blob| blob_to_vec(&blob)),
    }))
}
