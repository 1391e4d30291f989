//! PUDL ETL - build EIA and EPA CEMS data packages

use anyhow::{Context, Result};
use clap::Parser;
use pudl_common::logging::{init_logging, LogConfig, LogLevel};
use pudl_datapkg::{ForeignKeyGraph, SchemaCatalog};
use pudl_etl::config::{EtlConfig, EtlSettings};
use pudl_etl::datastore::LocalDatastore;
use pudl_etl::etl::{self, Etl};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "pudl-etl")]
#[command(author, version, about = "Public Utility Data Liberation ETL")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Parser, Debug)]
enum Command {
    /// Run the ETL and publish a bundle of data packages
    Run {
        /// ETL settings file
        settings: PathBuf,
    },

    /// Rebuild package descriptors for resources already on disk
    Datapkg {
        /// ETL settings file
        settings: PathBuf,
    },

    /// Print every table reachable through foreign keys
    Closure {
        /// Seed tables
        #[arg(required = true)]
        tables: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("pudl-etl")
        .build();

    // Environment variables take precedence
    let log_config = log_config.with_env_overrides()?;

    let _guard = init_logging(&log_config)?;

    let catalog = SchemaCatalog::embedded().context("Failed to load the schema catalog")?;
    let fk_graph = ForeignKeyGraph::from_catalog(&catalog);

    match cli.command {
        Command::Run { settings } => {
            let config = EtlConfig::load()?;
            let settings = EtlSettings::load(&settings)
                .with_context(|| format!("Invalid settings file {}", settings.display()))?;
            let datastore = Arc::new(LocalDatastore::new(&config.pudl_in));

            let outcomes = Etl::new(&config, &catalog, &fk_graph, datastore).run(&settings).await?;
            for outcome in &outcomes {
                println!(
                    "{}\t{} resources\t{}",
                    outcome.name,
                    outcome.descriptor.resources.len(),
                    outcome.dir.display()
                );
            }
        },
        Command::Datapkg { settings } => {
            let config = EtlConfig::load()?;
            let settings = EtlSettings::load(&settings)
                .with_context(|| format!("Invalid settings file {}", settings.display()))?;

            let descriptors = etl::assemble_bundle(&config, &settings, &catalog, &fk_graph)?;
            for descriptor in &descriptors {
                println!("{}\t{} resources", descriptor.name, descriptor.resources.len());
            }
        },
        Command::Closure { tables } => {
            let closure = fk_graph.closure(&tables)?;
            info!(seeds = tables.len(), tables = closure.len(), "Resolved foreign key closure");
            for table in closure {
                println!("{}", table);
            }
        },
    }

    Ok(())
}
