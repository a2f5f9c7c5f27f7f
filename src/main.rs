use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tabular_insight::error::LlmError;
use tabular_insight::execution_loop::{QueryDraft, RepairContext, RetryLoop};
use tabular_insight::ingestion::{IngestOutcome, IngestionOrchestrator};
use tabular_insight::llm::{LlmClient, Narrator, QueryPlanner, QueryRepairer};
use tabular_insight::query::QueryEngine;
use tabular_insight::EngineConfig;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tabular-insight")]
#[command(about = "Ingest tabular uploads and answer questions about them")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest a file and print its telemetry as JSON
    Ingest {
        /// File to ingest (CSV, TSV, XLSX, JSON, TXT, ...)
        file: PathBuf,
    },
    /// Run one query against an ingested file
    Query {
        file: PathBuf,

        /// Query text, e.g. "SELECT uf, SUM(valor) FROM data GROUP BY uf"
        query: String,
    },
    /// Plan, run and repair queries for a natural-language question
    Ask {
        file: PathBuf,

        /// The question in natural language
        question: String,

        /// JSON file with [{"purpose": ..., "query_text": ...}] drafts (skips planning)
        #[arg(long)]
        drafts: Option<PathBuf>,

        /// Ask the LLM for a plain-language answer after running the drafts
        #[arg(long)]
        narrate: bool,

        /// Never call the LLM for repairs; failed drafts go straight to the fallbacks
        #[arg(long)]
        offline: bool,
    },
}

/// Repairer used with `--offline`.
struct OfflineRepairer;

#[async_trait]
impl QueryRepairer for OfflineRepairer {
    async fn repair(&self, _context: &RepairContext) -> std::result::Result<String, LlmError> {
        Err(LlmError::NotConfigured("offline mode".to_string()))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let args = Args::parse();
    let config = EngineConfig::from_env().context("invalid TABULAR_* configuration")?;

    match args.command {
        Commands::Ingest { file } => {
            let outcome = ingest_file(&config, &file)?;
            println!("{}", serde_json::to_string_pretty(&outcome.telemetry)?);
        }
        Commands::Query { file, query } => {
            let outcome = ingest_file(&config, &file)?;
            let result = QueryEngine::new().execute(&outcome.dataset.rows, &outcome.column_types, &query);
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Ask {
            file,
            question,
            drafts,
            narrate,
            offline,
        } => run_ask(&config, &file, &question, drafts, narrate, offline).await?,
    }

    Ok(())
}

fn ingest_file(config: &EngineConfig, file: &Path) -> Result<IngestOutcome> {
    let bytes = std::fs::read(file).with_context(|| format!("failed to read {}", file.display()))?;
    let filename = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let orchestrator = IngestionOrchestrator::new(config.clone());
    let outcome = orchestrator
        .ingest(&bytes, &filename)
        .with_context(|| format!("failed to ingest {}", file.display()))?;
    Ok(outcome)
}

async fn run_ask(
    config: &EngineConfig,
    file: &Path,
    question: &str,
    drafts_file: Option<PathBuf>,
    narrate: bool,
    offline: bool,
) -> Result<()> {
    let outcome = ingest_file(config, file)?;
    let llm = LlmClient::from_env();

    let drafts: Vec<QueryDraft> = match drafts_file {
        Some(path) => {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read drafts from {}", path.display()))?;
            serde_json::from_str(&text).with_context(|| format!("invalid drafts in {}", path.display()))?
        }
        None => {
            let sample: Vec<_> = outcome
                .dataset
                .rows
                .iter()
                .take(config.retry.sample_rows)
                .cloned()
                .collect();
            llm.plan(question, &outcome.profiles, &sample)
                .await
                .context("query planning failed")?
        }
    };
    info!("Running {} drafts for: {}", drafts.len(), question);

    let retry_loop = RetryLoop::new(config.retry.clone());
    let repairer: &dyn QueryRepairer = if offline { &OfflineRepairer } else { &llm };
    let report = retry_loop
        .run(&outcome.dataset, &outcome.column_types, &drafts, repairer)
        .await?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    if narrate {
        let answer = llm
            .narrate(question, &report.outcomes)
            .await
            .context("narration failed")?;
        println!("\n{}", answer);
    }

    Ok(())
}
