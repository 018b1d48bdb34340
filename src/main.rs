//! Command-line interface for analytics-sync
//!
//! # Usage Examples
//!
//! ```bash
//! # Create the checkpoint rows of every configured source
//! analytics-sync --config analytics-sync.toml seed-checkpoints
//!
//! # Hash-diff sync of the users collection
//! analytics-sync mongodb --mongo-uri mongodb://localhost:27017 --mongo-db nomba_users
//!
//! # Watermark sync of selected tables
//! analytics-sync postgresql --table savings_plan --table savingstransaction
//!
//! # Both pipelines, then show progress
//! analytics-sync all
//! analytics-sync checkpoints
//! ```
//!
//! Connection options also come from the environment: `MONGO_URI`,
//! `MONGO_DB`, `MONGO_COLLECTION`, `PG_HOST`, `PG_PORT`, `PG_DB`, `PG_USER`,
//! `PG_PASSWORD`, `PG_SSLMODE`, `PG_SSLROOTCERT` and `PG_CONNECTION_STRING`.

use analytics_sync::checkpoint::{format_checkpoints, list_checkpoints, seed_checkpoints};
use analytics_sync::mongodb::run_mongodb;
use analytics_sync::postgresql::run_postgresql;
use analytics_sync::{AppConfig, MongoOpts, PostgresOpts};
use analytics_sync_postgresql::{new_shared_client, PostgresTarget};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "analytics-sync")]
#[command(about = "Incremental replication of MongoDB and PostgreSQL data into the analytics schema")]
#[command(long_about = None)]
struct Cli {
    /// TOML configuration file (built-in defaults when omitted)
    #[arg(long, global = true, env = "ANALYTICS_SYNC_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Classify and write inside the transaction, then roll it back
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the MongoDB hash-diff pipeline once
    Mongodb {
        #[command(flatten)]
        mongo: MongoOpts,

        #[command(flatten)]
        pg: PostgresOpts,
    },

    /// Run the PostgreSQL watermark pipeline once
    Postgresql {
        /// Configured table to sync; repeat for several (default: all)
        #[arg(long = "table", value_name = "NAME")]
        tables: Vec<String>,

        #[command(flatten)]
        pg: PostgresOpts,
    },

    /// Run both pipelines
    All {
        #[command(flatten)]
        mongo: MongoOpts,

        #[command(flatten)]
        pg: PostgresOpts,
    },

    /// Print the checkpoint table
    Checkpoints {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        pg: PostgresOpts,
    },

    /// Insert missing checkpoint rows for every configured source
    SeedCheckpoints {
        #[command(flatten)]
        pg: PostgresOpts,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Mongodb { mongo, pg } => {
            let report = run_mongodb(&mongo, &pg, &config, cli.dry_run).await?;
            println!("{report}");
        }
        Commands::Postgresql { tables, pg } => {
            run_tables(&pg, &config, &tables, cli.dry_run).await?;
        }
        Commands::All { mongo, pg } => {
            let mongo_result = run_mongodb(&mongo, &pg, &config, cli.dry_run).await;
            match &mongo_result {
                Ok(report) => println!("{report}"),
                Err(e) => tracing::warn!("MongoDB sync failed: {e:#}"),
            }
            let tables_result = run_tables(&pg, &config, &[], cli.dry_run).await;
            mongo_result?;
            tables_result?;
        }
        Commands::Checkpoints { json, pg } => {
            let target = connect_target(&pg, &config).await?;
            let rows = list_checkpoints(&target).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                println!("{}", format_checkpoints(&rows));
            }
        }
        Commands::SeedCheckpoints { pg } => {
            let target = connect_target(&pg, &config).await?;
            let seeded = seed_checkpoints(&target, &config.checkpoint_names()).await?;
            println!("Seeded {} checkpoint rows", seeded.len());
        }
    }

    Ok(())
}

async fn run_tables(
    pg: &PostgresOpts,
    config: &AppConfig,
    tables: &[String],
    dry_run: bool,
) -> anyhow::Result<()> {
    let outcomes = run_postgresql(pg, config, tables, dry_run).await?;
    let mut failed = Vec::new();
    for outcome in &outcomes {
        match &outcome.result {
            Ok(report) => println!("{report}"),
            Err(_) => failed.push(outcome.table.as_str()),
        }
    }
    if !failed.is_empty() {
        anyhow::bail!(
            "{} of {} tables failed: {}",
            failed.len(),
            outcomes.len(),
            failed.join(", ")
        );
    }
    Ok(())
}

async fn connect_target(pg: &PostgresOpts, config: &AppConfig) -> anyhow::Result<PostgresTarget> {
    let client = new_shared_client(&pg.to_config()?).await?;
    Ok(PostgresTarget::with_checkpoint_table(
        client,
        &config.checkpoint_table,
    ))
}
