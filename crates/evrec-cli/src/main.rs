use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use evrec_ingest::ZipCsvProvider;
use evrec_pipeline::{run_once, ReconcileConfig};
use evrec_storage::{ensure_schema, PgTableSink};
use sqlx::PgPool;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "evrec")]
#[command(about = "Event reconciliation pipeline")]
struct Cli {
    /// Optional YAML config file; environment variables apply otherwise.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Reconcile both record sets from the archive into the database.
    Run {
        /// Zip archive of event CSV files; overrides the configured path.
        #[arg(long)]
        archive: Option<PathBuf>,
    },
    /// Create the destination schema if it does not exist.
    Provision,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => ReconcileConfig::from_yaml_file(path)?,
        None => ReconcileConfig::from_env(),
    };

    match cli.command.unwrap_or(Commands::Run { archive: None }) {
        Commands::Run { archive } => {
            let archive = archive.unwrap_or_else(|| config.archive_path.clone());
            let pool = connect(&config).await?;
            ensure_schema(&pool, &config.db_schema)
                .await
                .with_context(|| format!("provisioning schema {}", config.db_schema))?;

            let mut provider = ZipCsvProvider::open(&archive)
                .with_context(|| format!("opening archive {}", archive.display()))?;
            let sink = PgTableSink::new(pool, config.db_schema.clone());

            let summary = run_once(&mut provider, &sink).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::Provision => {
            let pool = connect(&config).await?;
            ensure_schema(&pool, &config.db_schema)
                .await
                .with_context(|| format!("provisioning schema {}", config.db_schema))?;
            info!(schema = %config.db_schema, "schema ready");
        }
    }

    Ok(())
}

async fn connect(config: &ReconcileConfig) -> Result<PgPool> {
    PgPool::connect(&config.database_url)
        .await
        .context("connecting to database")
}
