//! shopsync CLI - queue, run and inspect catalog sync jobs
//!
//! Also the place to load catalog data and manage identity mappings.

mod cli;
mod commands;
mod error;
#[cfg(test)]
mod tests;

use clap::Parser;
use shopsync_core::db::JobFilter;
use shopsync_core::Worker;

use crate::cli::{Cli, Commands, ImportCommands, OverrideCommands};
use crate::commands::common::{build_orchestrator, open_service, resolve_config};
use crate::commands::completions::run_completions;
use crate::commands::import::{run_import_products, run_import_shops};
use crate::commands::inspect::{run_findings, run_override_status};
use crate::commands::jobs::{
    run_cancel, run_job, run_jobs, run_override_edit, run_request, run_retry,
};
use crate::commands::map::run_map;
use crate::commands::work::{run_sweep, run_work};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("shopsync=info".parse().unwrap()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Commands::Completions { shell, output } = &cli.command {
        return run_completions(*shell, output.as_deref());
    }

    let config = resolve_config(cli.config.as_deref(), cli.db_path)?;
    let db = open_service(&config).await?;
    let json = cli.json;

    match cli.command {
        Commands::Map { command } => run_map(&db, command, json).await?,
        Commands::Import { command } => match command {
            ImportCommands::Products { file } => {
                run_import_products(&db, &file).await?;
            }
            ImportCommands::Shops { file } => {
                run_import_shops(&db, &file).await?;
            }
        },
        Commands::Work { once } => {
            let worker = Worker::new(build_orchestrator(db, &config)?, config.worker_config());
            run_work(&worker, once, json).await?;
        }
        command => {
            let orchestrator = build_orchestrator(db, &config)?;
            match command {
                Commands::Request {
                    product,
                    shop,
                    direction,
                } => {
                    run_request(&orchestrator, product, shop, direction, json).await?;
                }
                Commands::Job { id } => run_job(&orchestrator, &id, json).await?,
                Commands::Jobs {
                    status,
                    product,
                    shop,
                    limit,
                } => {
                    let filter = JobFilter {
                        status,
                        product_id: product,
                        shop_id: shop,
                        limit,
                    };
                    run_jobs(&orchestrator, &filter, json).await?;
                }
                Commands::Cancel { id } => run_cancel(&orchestrator, &id, json).await?,
                Commands::Retry { id } => {
                    run_retry(&orchestrator, &id, json).await?;
                }
                Commands::Sweep => {
                    run_sweep(&orchestrator, json).await?;
                }
                Commands::OverrideStatus { product, shop } => {
                    run_override_status(&orchestrator, product, shop, json).await?;
                }
                Commands::Override { command } => match command {
                    OverrideCommands::Set {
                        product,
                        shop,
                        items,
                        primary,
                    } => {
                        run_override_edit(&orchestrator, product, shop, items, primary, json)
                            .await?;
                    }
                },
                Commands::Findings { product, shop } => {
                    run_findings(&orchestrator, product, shop, json).await?;
                }
                Commands::Map { .. }
                | Commands::Import { .. }
                | Commands::Work { .. }
                | Commands::Completions { .. } => {}
            }
        }
    }

    Ok(())
}
