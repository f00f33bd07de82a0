//! Raw dataset sources.
//!
//! Rows reach the pipeline as untyped JSON objects; the record builder does
//! all validation. Two sources, dispatched by `dataset.source`:
//!
//! - `jsonl`: one JSON object per line from a local export
//! - `huggingface`: the datasets-server rows API, paginated

use serde_json::Value;
use std::io::BufRead;
use std::path::Path;
use tracing::debug;

use crate::config::DatasetConfig;
use crate::error::{Error, Result};

const HF_ROWS_URL: &str = "https://datasets-server.huggingface.co/rows";
const HF_PAGE_SIZE: usize = 100;

/// Load raw rows from the configured source, in source order, bounded by
/// `limit` when set.
pub async fn load_rows(config: &DatasetConfig) -> Result<Vec<Value>> {
    match config.source.as_str() {
        "jsonl" => {
            let path = config.path.as_ref().ok_or_else(|| {
                Error::Config("dataset.path is required for the jsonl source".into())
            })?;
            read_jsonl(path, config.limit)
        }
        "huggingface" => fetch_huggingface(config).await,
        other => Err(Error::Config(format!(
            "unknown dataset source '{}'",
            other
        ))),
    }
}

/// Read rows from a local JSONL file. Blank lines are skipped; a malformed
/// line fails the run with its line number.
pub fn read_jsonl(path: &Path, limit: Option<usize>) -> Result<Vec<Value>> {
    let file = std::fs::File::open(path)
        .map_err(|e| Error::Dataset(format!("failed to open {}: {}", path.display(), e)))?;
    let reader = std::io::BufReader::new(file);

    let mut rows = Vec::new();
    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let row: Value = serde_json::from_str(&line).map_err(|e| {
            Error::Dataset(format!(
                "{}:{}: invalid JSON row: {}",
                path.display(),
                lineno + 1,
                e
            ))
        })?;
        rows.push(row);

        if let Some(lim) = limit {
            if rows.len() >= lim {
                break;
            }
        }
    }

    debug!(count = rows.len(), path = %path.display(), "loaded JSONL rows");
    Ok(rows)
}

/// Fetch rows from the Hugging Face datasets-server, page by page, until
/// the split is exhausted or `limit` is reached.
async fn fetch_huggingface(config: &DatasetConfig) -> Result<Vec<Value>> {
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(60))
        .build()
        .map_err(|e| Error::Dataset(format!("failed to build HTTP client: {}", e)))?;

    let mut rows = Vec::new();
    let mut offset = 0usize;

    loop {
        let page_len = match config.limit {
            Some(lim) => HF_PAGE_SIZE.min(lim - rows.len()),
            None => HF_PAGE_SIZE,
        };
        if page_len == 0 {
            break;
        }

        let resp = client
            .get(HF_ROWS_URL)
            .query(&[
                ("dataset", config.name.as_str()),
                ("config", config.config.as_str()),
                ("split", config.split.as_str()),
                ("offset", &offset.to_string()),
                ("length", &page_len.to_string()),
            ])
            .send()
            .await
            .map_err(|e| Error::Dataset(format!("datasets-server request failed: {}", e)))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Dataset(format!(
                "datasets-server HTTP {}: {}",
                status, body
            )));
        }

        let json: Value = resp
            .json()
            .await
            .map_err(|e| Error::Dataset(format!("invalid datasets-server response: {}", e)))?;

        // Rows arrive wrapped: { "rows": [ { "row_idx": n, "row": {...} } ] }
        let page: Vec<Value> = json
            .get("rows")
            .and_then(|r| r.as_array())
            .ok_or_else(|| Error::Dataset("datasets-server response missing rows".into()))?
            .iter()
            .filter_map(|entry| entry.get("row").cloned())
            .collect();

        let fetched = page.len();
        debug!(offset, fetched, split = %config.split, "fetched dataset page");
        rows.extend(page);
        offset += fetched;

        if fetched < page_len {
            break;
        }
    }

    Ok(rows)
}
