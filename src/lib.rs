//! # bugrag
//!
//! Retrieval-augmented question answering over software bug-fix records.
//!
//! bugrag ingests SWE-bench-style rows (a problem description paired with
//! the patch that fixed it) into a vectorized SQLite corpus, then answers
//! questions by retrieving the nearest historical examples and grounding an
//! LLM response in them.
//!
//! ## Architecture
//!
//! ```text
//! write path:
//!   raw row ──▶ record builder ──▶ truncate ──▶ embed ──▶ store (upsert)
//!
//! read path:
//!   question ──▶ truncate ──▶ embed ──▶ nearest-neighbor ──▶ prompt ──▶ LLM
//! ```
//!
//! The embedding provider, LLM provider, dataset source, and SQLite store
//! are external collaborators behind seams ([`embedding::Embedder`],
//! [`llm::LanguageModel`], the `dataset` module, and a `SqlitePool`);
//! everything else is the pipeline this crate owns.
//!
//! ## Invariants
//!
//! - Embedding input is never empty: whitespace-only text collapses to a
//!   single space and anything over the token budget loses its tail.
//! - Ingestion is idempotent: duplicate `instance_id`s are no-ops and the
//!   first write's embedding is never refreshed.
//! - Query and corpus share one embedding-model identity; records are
//!   tagged with the model that embedded them and queries filter on it.
//! - The answer path always returns a non-empty string: no hits degrade to
//!   a context-free prompt, empty model output to a fixed fallback.

pub mod answer;
pub mod config;
pub mod dataset;
pub mod db;
pub mod embedding;
pub mod error;
pub mod ingest;
pub mod llm;
pub mod models;
pub mod record;
pub mod retrieval;
pub mod store;
pub mod truncate;

pub use error::{Error, Result};
