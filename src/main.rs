//! bugrag CLI.
//!
//! Thin plumbing over the library: load config, connect, dispatch.
//!
//! | Command | Description |
//! |---------|-------------|
//! | `bugrag init` | Create the SQLite database and corpus schema |
//! | `bugrag ingest` | Load the configured dataset, embed, and persist |
//! | `bugrag search "<query>"` | Print the nearest records with distances |
//! | `bugrag ask "<question>"` | Full retrieval-augmented answer |
//! | `bugrag show <id>` | Print one stored record |

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use bugrag::config::{load_config, Config};
use bugrag::embedding::OpenAiEmbedder;
use bugrag::llm::OpenAiChat;
use bugrag::{answer, dataset, db, ingest, retrieval, store};

/// Retrieval-augmented question answering over software bug-fix records.
#[derive(Parser)]
#[command(
    name = "bugrag",
    about = "Retrieval-augmented question answering over software bug-fix records",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/bugrag.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Idempotent.
    Init,

    /// Ingest the configured dataset: build records, embed, persist.
    ///
    /// Re-running is safe — existing records are skipped and their
    /// embeddings are never refreshed.
    Ingest,

    /// Retrieve the nearest records for a query and print them.
    Search {
        query: String,
        /// Number of results (defaults to retrieval.top_k).
        #[arg(long)]
        k: Option<usize>,
    },

    /// Answer a question grounded in retrieved bug-fix examples.
    Ask {
        question: String,
        /// Number of examples to ground on (defaults to retrieval.top_k).
        #[arg(long)]
        k: Option<usize>,
    },

    /// Print one stored record by instance id.
    Show { instance_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Init => run_init(&config).await,
        Commands::Ingest => run_ingest(&config).await,
        Commands::Search { query, k } => run_search(&config, &query, k).await,
        Commands::Ask { question, k } => run_ask(&config, &question, k).await,
        Commands::Show { instance_id } => run_show(&config, &instance_id).await,
    }
}

async fn run_init(config: &Config) -> Result<()> {
    let pool = db::connect(&config.db.path).await?;
    store::ensure_schema(&pool).await?;
    println!("init {}", config.db.path.display());
    println!("ok");
    pool.close().await;
    Ok(())
}

async fn run_ingest(config: &Config) -> Result<()> {
    let embedder = OpenAiEmbedder::new(&config.embedding)?;
    let pool = db::connect(&config.db.path).await?;

    let rows = dataset::load_rows(&config.dataset).await?;
    let report = ingest::run_ingest(
        &pool,
        &embedder,
        &rows,
        config.embedding.max_tokens,
        config.dataset.limit,
    )
    .await?;

    println!("ingest {} ({})", config.dataset.name, config.dataset.split);
    println!("  rows seen: {}", report.seen);
    println!("  inserted: {}", report.inserted);
    println!("  skipped (already present): {}", report.skipped);
    println!("  failed: {}", report.failed.len());
    for failure in &report.failed {
        println!("    {}: {}", failure.instance_id, failure.error);
    }
    println!(
        "  embedded records ({}): {}",
        config.embedding.model,
        store::count_embedded(&pool, &config.embedding.model).await?
    );
    println!("ok");

    pool.close().await;
    Ok(())
}

async fn run_search(config: &Config, query: &str, k: Option<usize>) -> Result<()> {
    let embedder = OpenAiEmbedder::new(&config.embedding)?;
    let pool = db::connect(&config.db.path).await?;
    let k = k.unwrap_or(config.retrieval.top_k);

    let hits = retrieval::retrieve_top_k(
        &pool,
        &embedder,
        config.retrieval.metric,
        query,
        config.embedding.max_tokens,
        k,
    )
    .await?;

    if hits.is_empty() {
        println!("No results.");
        pool.close().await;
        return Ok(());
    }

    for (i, hit) in hits.iter().enumerate() {
        let excerpt: String = hit.problem_statement.chars().take(160).collect();
        println!("{}. [{:.4}] {} / {}", i + 1, hit.distance, hit.repo, hit.instance_id);
        println!("    {}", excerpt.replace('\n', " "));
        println!();
    }

    pool.close().await;
    Ok(())
}

async fn run_ask(config: &Config, question: &str, k: Option<usize>) -> Result<()> {
    let embedder = OpenAiEmbedder::new(&config.embedding)?;
    let llm = OpenAiChat::new(&config.llm)?;
    let pool = db::connect(&config.db.path).await?;
    let k = k.unwrap_or(config.retrieval.top_k);

    let text = answer::answer(
        &pool,
        &embedder,
        &llm,
        config.retrieval.metric,
        question,
        config.embedding.max_tokens,
        k,
    )
    .await?;

    println!("{}", text);
    pool.close().await;
    Ok(())
}

async fn run_show(config: &Config, instance_id: &str) -> Result<()> {
    let pool = db::connect(&config.db.path).await?;

    match store::fetch_record(&pool, instance_id).await? {
        Some(record) => {
            println!("instance_id: {}", record.instance_id);
            println!("repo: {}", record.repo);
            println!("base_commit: {}", record.base_commit);
            println!("version: {}", record.version);
            if let Some(created) = record.created_at {
                println!("created_at: {}", created.to_rfc3339());
            }
            println!("fail_to_pass: {:?}", record.fail_to_pass);
            println!("pass_to_pass: {:?}", record.pass_to_pass);
            println!(
                "embedding: {}",
                match &record.embedding {
                    Some(v) => format!("{} dims", v.len()),
                    None => "none".to_string(),
                }
            );
            println!("\nproblem_statement:\n{}", record.problem_statement);
            println!("\npatch:\n{}", record.patch);
        }
        None => println!("Not found: {}", instance_id),
    }

    pool.close().await;
    Ok(())
}
