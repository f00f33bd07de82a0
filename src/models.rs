//! Core data models for the ingestion and retrieval pipeline.

use chrono::{DateTime, Utc};

/// One ingested bug-fix record: a problem description paired with the patch
/// that eventually fixed it, plus provenance metadata.
///
/// Records are assembled once by the record builder, vectorized once by the
/// ingestion pipeline, and never mutated or deleted afterwards.
#[derive(Debug, Clone)]
pub struct BugRecord {
    /// Globally unique identifier, primary key.
    pub instance_id: String,
    pub repo: String,
    pub base_commit: String,
    pub version: String,
    pub environment_setup_commit: String,
    pub problem_statement: String,
    /// Free-text hints; may be empty.
    pub hint: String,
    /// Fix diff, stored verbatim. Never embedded.
    pub patch: String,
    /// Test diff, stored verbatim.
    pub test_patch: String,
    pub created_at: Option<DateTime<Utc>>,
    /// Tests that fail before the patch and pass after.
    pub fail_to_pass: Vec<String>,
    /// Tests that pass both before and after the patch.
    pub pass_to_pass: Vec<String>,
    /// Fixed-dimension vector, `None` until the pipeline computes it.
    pub embedding: Option<Vec<f32>>,
}

/// Outcome of parsing a textual test-identifier field.
///
/// Non-JSON text is preserved as a singleton rather than dropped or raised;
/// callers that care can tell the two apart, callers that don't use
/// [`TestList::into_vec`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestList {
    /// The field was a valid JSON string array (possibly empty).
    Parsed(Vec<String>),
    /// The field was non-empty non-JSON text, kept verbatim as one entry.
    Fallback(Vec<String>),
}

impl TestList {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            TestList::Parsed(v) | TestList::Fallback(v) => v,
        }
    }
}

/// A nearest-neighbor query result. Ephemeral, constructed per query.
#[derive(Debug, Clone)]
pub struct RetrievalHit {
    pub instance_id: String,
    pub repo: String,
    pub problem_statement: String,
    pub patch: String,
    /// Distance from the query vector under the configured metric;
    /// smaller is more similar.
    pub distance: f64,
}
