use chrono::Utc;
use shopsync_core::db::JobFilter;
use shopsync_core::models::{Direction, InternalId, SyncJob, TriggerKind};
use shopsync_core::shop::ShopTransport;
use shopsync_core::{JobId, ProductId, ShopId, SyncOrchestrator};

use crate::commands::common::{format_job_detail, format_job_lines, print_json};
use crate::error::CliError;

pub async fn run_request<T: ShopTransport>(
    orchestrator: &SyncOrchestrator<T>,
    product: ProductId,
    shop: ShopId,
    direction: Direction,
    as_json: bool,
) -> Result<SyncJob, CliError> {
    let job = orchestrator
        .request_sync(product, shop, direction, TriggerKind::Manual)
        .await?;
    print_job(&job, as_json)?;
    Ok(job)
}

pub async fn run_override_edit<T: ShopTransport>(
    orchestrator: &SyncOrchestrator<T>,
    product: ProductId,
    shop: ShopId,
    items: Vec<InternalId>,
    primary: Option<InternalId>,
    as_json: bool,
) -> Result<SyncJob, CliError> {
    let job = orchestrator
        .request_override_edit(product, shop, items, primary)
        .await?;
    print_job(&job, as_json)?;
    Ok(job)
}

pub async fn run_job<T: ShopTransport>(
    orchestrator: &SyncOrchestrator<T>,
    id: &JobId,
    as_json: bool,
) -> Result<(), CliError> {
    let job = orchestrator.get_job_status(id).await?;
    print_job(&job, as_json)
}

pub async fn run_jobs<T: ShopTransport>(
    orchestrator: &SyncOrchestrator<T>,
    filter: &JobFilter,
    as_json: bool,
) -> Result<Vec<SyncJob>, CliError> {
    let jobs = orchestrator.list_jobs(filter).await?;
    if as_json {
        print_json(&jobs)?;
    } else if jobs.is_empty() {
        println!("No sync jobs");
    } else {
        for line in format_job_lines(&jobs, Utc::now().timestamp_millis()) {
            println!("{line}");
        }
    }
    Ok(jobs)
}

pub async fn run_cancel<T: ShopTransport>(
    orchestrator: &SyncOrchestrator<T>,
    id: &JobId,
    as_json: bool,
) -> Result<(), CliError> {
    let job = orchestrator.cancel(id).await?;
    print_job(&job, as_json)
}

pub async fn run_retry<T: ShopTransport>(
    orchestrator: &SyncOrchestrator<T>,
    id: &JobId,
    as_json: bool,
) -> Result<SyncJob, CliError> {
    let job = orchestrator.retry_failed(id).await?;
    print_job(&job, as_json)?;
    Ok(job)
}

fn print_job(job: &SyncJob, as_json: bool) -> Result<(), CliError> {
    if as_json {
        return print_json(job);
    }
    for line in format_job_detail(job) {
        println!("{line}");
    }
    Ok(())
}
