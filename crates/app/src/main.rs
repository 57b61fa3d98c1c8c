use anyhow::Context;
use clap::{Parser, Subcommand};
use inflow::{ErrorResponse, ImportWorkflow, WorkflowError};
use inflow_core::{ImportId, InflowConfig};
use inflow_storage::{FsPreviewStore, SqliteLedger};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "inflow", about = "Import bank and wallet exports as categorized transactions.")]
struct Cli {
    /// Path to a TOML config file (default: platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse and categorize a CSV/PDF/XLSX export and stage it for review.
    Import {
        file: PathBuf,
        /// TOML file of [[rules]] applied before the built-in categories
        #[arg(long)]
        rules: Option<PathBuf>,
    },
    /// Show the staged preview of an import.
    Preview { id: ImportId },
    /// Persist a staged import.
    Confirm {
        id: ImportId,
        /// Override a row's category, e.g. `--set 3=groceries`
        #[arg(long = "set", value_parser = parse_override)]
        overrides: Vec<(usize, String)>,
    },
    /// Discard a staged import.
    Cancel { id: ImportId },
    /// List import attempts, newest first.
    List,
    /// Remove staged data older than the retention window.
    Sweep,
}

fn parse_override(s: &str) -> Result<(usize, String), String> {
    let (index, category) = s
        .split_once('=')
        .ok_or_else(|| format!("expected INDEX=CATEGORY, got '{s}'"))?;
    let index = index
        .trim()
        .parse()
        .map_err(|e| format!("invalid row index '{index}': {e}"))?;
    let category = category.trim();
    if category.is_empty() {
        return Err("category must not be empty".to_string());
    }
    Ok((index, category.to_string()))
}

fn load_config(explicit: Option<&Path>) -> anyhow::Result<InflowConfig> {
    if let Some(path) = explicit {
        return InflowConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()));
    }
    let Some(dirs) = directories::ProjectDirs::from("com", "inflow", "Inflow") else {
        tracing::warn!("No platform data directory; using defaults");
        return Ok(InflowConfig::default());
    };
    let config_file = dirs.config_dir().join("config.toml");
    if config_file.exists() {
        return InflowConfig::from_file(&config_file)
            .with_context(|| format!("Failed to load config from {}", config_file.display()));
    }
    Ok(InflowConfig::default().with_data_dir(dirs.data_dir()))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    if let Some(parent) = config.database_path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let pool = inflow_storage::create_db(&config.database_path)
        .await
        .context("Failed to open database")?;
    let store = Arc::new(
        FsPreviewStore::open(&config.staging_dir)
            .await
            .context("Failed to open staging directory")?,
    );

    // ── Retention sweep ───────────────────────────────────────────────────────
    let sweeper = inflow_storage::spawn_retention_sweep(
        store.clone(),
        config.sweep_interval(),
        config.retention(),
    );

    let workflow = ImportWorkflow::new(store, SqliteLedger::new(pool), config.max_upload_bytes);
    let result = run(&workflow, cli.command, &config).await;
    sweeper.abort();

    match result {
        Ok(()) => Ok(()),
        Err(e) => match e.downcast_ref::<WorkflowError>() {
            Some(workflow_error) => {
                eprintln!("{}", serde_json::to_string(&ErrorResponse::from(workflow_error))?);
                std::process::exit(1);
            }
            None => Err(e),
        },
    }
}

async fn run(
    workflow: &ImportWorkflow<FsPreviewStore, SqliteLedger>,
    command: Commands,
    config: &InflowConfig,
) -> anyhow::Result<()> {
    match command {
        Commands::Import { file, rules } => {
            let rules = match rules {
                Some(path) => {
                    let text = tokio::fs::read_to_string(&path)
                        .await
                        .with_context(|| format!("Failed to read {}", path.display()))?;
                    inflow_import::load_rules(&text).map_err(anyhow::Error::msg)?
                }
                None => Vec::new(),
            };
            let content = tokio::fs::read(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let filename = file
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default()
                .to_string();
            let record = workflow.upload(&filename, &content, &rules).await?;
            print_json(&workflow.get_preview(record.id).await?)
        }
        Commands::Preview { id } => print_json(&workflow.get_preview(id).await?),
        Commands::Confirm { id, overrides } => {
            let overrides: BTreeMap<usize, String> = overrides.into_iter().collect();
            print_json(&workflow.confirm(id, &overrides).await?)
        }
        Commands::Cancel { id } => print_json(&workflow.cancel(id).await?),
        Commands::List => print_json(&workflow.list().await?),
        Commands::Sweep => {
            let report = inflow_storage::sweep_once(workflow.store().as_ref(), config.retention()).await;
            println!("removed {} staged entries ({} failed)", report.removed, report.failed);
            Ok(())
        }
    }
}
