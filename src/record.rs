//! Record builder: raw dataset rows into typed [`BugRecord`]s.
//!
//! Validation happens here, at the boundary — required fields raise a typed
//! error immediately instead of letting arbitrary map access leak through
//! the pipeline. The builder never computes embeddings; it produces a record
//! shell with `embedding = None`.

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::warn;

use crate::error::{Error, Result};
use crate::models::{BugRecord, TestList};

/// Build a [`BugRecord`] shell from one raw dataset row.
///
/// Required string fields fail fast with [`Error::MissingField`]; `hints_text`,
/// `created_at`, `FAIL_TO_PASS` and `PASS_TO_PASS` are optional and recover
/// locally (see [`parse_created_at`] and [`parse_json_list`]).
pub fn build_record(row: &Value) -> Result<BugRecord> {
    // Pull the identifier first so later errors can name the row.
    let instance_id = required_str(row, "instance_id", "?")?;

    Ok(BugRecord {
        repo: required_str(row, "repo", &instance_id)?,
        base_commit: required_str(row, "base_commit", &instance_id)?,
        version: required_str(row, "version", &instance_id)?,
        environment_setup_commit: required_str(row, "environment_setup_commit", &instance_id)?,
        problem_statement: required_str(row, "problem_statement", &instance_id)?,
        hint: optional_str(row, "hints_text"),
        patch: required_str(row, "patch", &instance_id)?,
        test_patch: required_str(row, "test_patch", &instance_id)?,
        created_at: parse_created_at(&optional_str(row, "created_at")),
        fail_to_pass: parse_json_list(&optional_str(row, "FAIL_TO_PASS")).into_vec(),
        pass_to_pass: parse_json_list(&optional_str(row, "PASS_TO_PASS")).into_vec(),
        embedding: None,
        instance_id,
    })
}

/// Canonical text the record is embedded under: the problem statement plus a
/// labeled hints section. The section is present even when the hint is empty
/// so the layout is deterministic. The patch is never part of this text.
pub fn embedding_text(record: &BugRecord) -> String {
    format!(
        "{}\n\nHints:\n{}",
        record.problem_statement, record.hint
    )
}

/// Parse an ISO-8601 timestamp, normalizing a trailing `Z` to an explicit
/// `+00:00` offset. Empty input is `None`; malformed input is `None` with a
/// warning rather than a failed row.
pub fn parse_created_at(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let normalized = match raw.strip_suffix('Z') {
        Some(prefix) => format!("{}+00:00", prefix),
        None => raw.to_string(),
    };

    match DateTime::parse_from_rfc3339(&normalized) {
        Ok(dt) => Some(dt.with_timezone(&Utc)),
        Err(e) => {
            warn!(raw, error = %e, "unparseable created_at, storing null");
            None
        }
    }
}

/// Parse a textual test-identifier field.
///
/// Valid JSON string array decodes to [`TestList::Parsed`]; non-empty
/// non-JSON text becomes a [`TestList::Fallback`] singleton (never dropped);
/// empty input is an empty `Parsed` list.
pub fn parse_json_list(raw: &str) -> TestList {
    let raw = raw.trim();
    if raw.is_empty() {
        return TestList::Parsed(Vec::new());
    }

    match serde_json::from_str::<Vec<String>>(raw) {
        Ok(list) => TestList::Parsed(list),
        Err(_) => {
            warn!(raw, "non-JSON test list, keeping raw text as one entry");
            TestList::Fallback(vec![raw.to_string()])
        }
    }
}

fn required_str(row: &Value, field: &'static str, row_id: &str) -> Result<String> {
    match row.get(field).and_then(Value::as_str) {
        Some(s) => Ok(s.to_string()),
        None => Err(Error::MissingField {
            field,
            row: row_id.to_string(),
        }),
    }
}

fn optional_str(row: &Value, field: &str) -> String {
    row.get(field)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}
