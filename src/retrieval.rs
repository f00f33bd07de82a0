//! Nearest-neighbor retrieval.
//!
//! The query text goes through the same normalization and truncation as
//! ingestion did, and is embedded under the same model identity as the
//! corpus — embedding a query with a different model would make every
//! distance meaningless. The store enforces the same rule by filtering on
//! the model tag.

use sqlx::SqlitePool;
use tracing::debug;

use crate::embedding::{Embedder, Metric};
use crate::error::Result;
use crate::models::RetrievalHit;
use crate::store;
use crate::truncate::truncate;

/// Return the `k` records nearest to `query`, ascending by distance.
/// An empty (or unembedded) corpus yields an empty vec, not an error.
pub async fn retrieve_top_k(
    pool: &SqlitePool,
    embedder: &dyn Embedder,
    metric: Metric,
    query: &str,
    max_tokens: usize,
    k: usize,
) -> Result<Vec<RetrievalHit>> {
    let normalized = truncate(query, max_tokens);
    let query_vec = embedder.embed(&normalized).await?;

    let hits = store::query_nearest(pool, &query_vec, embedder.model_name(), metric, k).await?;
    debug!(k, hits = hits.len(), metric = %metric, "retrieval complete");
    Ok(hits)
}
