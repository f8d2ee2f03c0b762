//! mtalog-ingest - MTA log ingestion tool

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mtalog_common::logging::{init_logging, LogConfig, LogLevel};
use mtalog_ingest::config::IngestConfig;
use mtalog_ingest::scheduler::{Scheduler, SystemClock};
use mtalog_ingest::storage::{MemoryRecordStore, MySqlRecordStore, RecordStore};
use mtalog_ingest::IngestTrigger;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "mtalog-ingest")]
#[command(author, version, about = "Consolidate MTA logs into delivery records")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one ingestion now
    RunOnce {
        /// Use an in-memory store; nothing is written to the database
        #[arg(long)]
        dry_run: bool,
    },

    /// Parse and consolidate, then report counts without inserting
    Analyze {
        /// Skip the database existence check
        #[arg(long)]
        offline: bool,
    },

    /// Run ingestion on the configured schedule until Ctrl-C
    Schedule,

    /// Apply database migrations
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut log_config = LogConfig::from_env().context("Invalid logging configuration")?;
    if cli.verbose {
        log_config.level = LogLevel::Debug;
    }
    let _log_guard = init_logging(&log_config).context("Failed to initialise logging")?;

    let config = IngestConfig::from_env().context("Invalid ingestion configuration")?;

    match cli.command {
        Command::RunOnce { dry_run } => {
            let store: Arc<dyn RecordStore> = if dry_run {
                info!("Dry run: records go to an in-memory store");
                Arc::new(MemoryRecordStore::new())
            } else {
                Arc::new(connect(&config).await?)
            };

            let outcome = IngestTrigger::from_config(&config, store)
                .run_once()
                .await
                .context("Ingestion run failed")?;
            info!(outcome = %outcome, dry_run, "Run finished");
        },
        Command::Analyze { offline } => {
            let store: Arc<dyn RecordStore> = if offline {
                Arc::new(MemoryRecordStore::new())
            } else {
                Arc::new(connect(&config).await?)
            };

            let outcome = IngestTrigger::from_config(&config, store)
                .analyze()
                .await
                .context("Analysis failed")?;
            let summary = outcome.summary();
            info!(
                records = summary.records,
                imported = summary.imported,
                pending = summary.pending,
                "Analysis finished"
            );
            for message_id in &outcome.pending {
                info!(message_id = %message_id, "Pending");
            }
        },
        Command::Schedule => {
            let store = MySqlRecordStore::connect_lazy(&config.database)
                .context("Invalid database settings")?;
            let trigger = IngestTrigger::from_config(&config, Arc::new(store));

            let scheduler = Scheduler::new(
                Arc::new(trigger),
                config.schedule.cadence(),
                config.timezone,
                SystemClock,
            )
            .with_poll_interval(config.poll_interval());

            scheduler.run(shutdown_signal()).await;
        },
        Command::Migrate => {
            connect(&config).await?.migrate().await.context("Migration failed")?;
        },
    }

    Ok(())
}

async fn connect(config: &IngestConfig) -> Result<MySqlRecordStore> {
    MySqlRecordStore::connect(&config.database)
        .await
        .context("Failed to connect to database")
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl-C"),
        Err(e) => {
            error!(error = %e, "Cannot listen for Ctrl-C, running until killed");
            std::future::pending::<()>().await;
        },
    }
}
