use chrono::Utc;
use shopsync_core::models::SyncJob;
use shopsync_core::shop::ShopTransport;
use shopsync_core::{SyncOrchestrator, Worker};

use crate::commands::common::{format_job_lines, print_json};
use crate::error::CliError;

/// Drain the queue once, or poll until Ctrl-C.
pub async fn run_work<T: ShopTransport + 'static>(
    worker: &Worker<T>,
    once: bool,
    as_json: bool,
) -> Result<(), CliError> {
    if once {
        let executed = worker.run_once().await?;
        return print_jobs(&executed, as_json, "No pending jobs");
    }

    worker
        .run_until(async {
            if let Err(error) = tokio::signal::ctrl_c().await {
                tracing::error!(%error, "Failed to listen for Ctrl-C");
            }
        })
        .await?;
    Ok(())
}

pub async fn run_sweep<T: ShopTransport>(
    orchestrator: &SyncOrchestrator<T>,
    as_json: bool,
) -> Result<Vec<SyncJob>, CliError> {
    let queued = orchestrator.sweep(Utc::now()).await?;
    print_jobs(&queued, as_json, "No shop is due for a sweep")?;
    Ok(queued)
}

fn print_jobs(jobs: &[SyncJob], as_json: bool, empty: &str) -> Result<(), CliError> {
    if as_json {
        return print_json(jobs);
    }
    if jobs.is_empty() {
        println!("{empty}");
    }
    for line in format_job_lines(jobs, Utc::now().timestamp_millis()) {
        println!("{line}");
    }
    Ok(())
}
