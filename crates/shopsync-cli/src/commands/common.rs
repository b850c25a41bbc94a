use std::path::{Path, PathBuf};

use chrono::{TimeZone, Utc};
use serde::Serialize;
use shopsync_core::models::SyncJob;
use shopsync_core::shop::HttpShopTransport;
use shopsync_core::{DatabaseService, EngineConfig, SyncOrchestrator};

use crate::error::CliError;

/// Engine config from `--config`, else the per-user config file when it
/// exists, with `--db-path` taking precedence over both.
pub fn resolve_config(
    config_path: Option<&Path>,
    cli_db_path: Option<PathBuf>,
) -> Result<EngineConfig, CliError> {
    let file = config_path
        .map(Path::to_path_buf)
        .or_else(|| default_config_path().filter(|path| path.is_file()));
    let mut config = EngineConfig::load(file.as_deref())?;
    if let Some(db_path) = cli_db_path {
        config.db_path = db_path;
    }
    Ok(config)
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("shopsync").join("config.json"))
}

pub async fn open_service(config: &EngineConfig) -> Result<DatabaseService, CliError> {
    Ok(DatabaseService::open_path(&config.db_path).await?)
}

pub fn build_orchestrator(
    db: DatabaseService,
    config: &EngineConfig,
) -> Result<SyncOrchestrator<HttpShopTransport>, CliError> {
    Ok(SyncOrchestrator::new(db, HttpShopTransport::new()?)
        .with_retry_policy(config.retry_policy())
        .with_job_timeout(config.job_timeout()))
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn format_job_lines(jobs: &[SyncJob], now_ms: i64) -> Vec<String> {
    jobs.iter()
        .map(|job| {
            let id = job.id.to_string();
            let short_id = id.chars().take(13).collect::<String>();
            let relative_time = format_relative_time(job.created_at, now_ms);
            format!(
                "{short_id:<13}  product {:<8} shop {:<4} {:<4}  {:<9}  x{}  {relative_time}",
                job.product_id.to_string(),
                job.shop_id.to_string(),
                job.direction.as_str(),
                job.status.as_str(),
                job.attempts,
            )
        })
        .collect()
}

pub fn format_job_detail(job: &SyncJob) -> Vec<String> {
    let mut lines = vec![
        format!("id:        {}", job.id),
        format!("product:   {}", job.product_id),
        format!("shop:      {}", job.shop_id),
        format!("direction: {}", job.direction.as_str()),
        format!("trigger:   {}", job.trigger.as_str()),
        format!("status:    {}", job.status.as_str()),
        format!("attempts:  {}", job.attempts),
        format!("created:   {}", format_timestamp(job.created_at)),
    ];
    if let Some(started_at) = job.started_at {
        lines.push(format!("started:   {}", format_timestamp(started_at)));
    }
    if let Some(completed_at) = job.completed_at {
        lines.push(format!("finished:  {}", format_timestamp(completed_at)));
    }
    if let Some(retry_of) = job.retry_of {
        lines.push(format!("retry of:  {retry_of}"));
    }
    if let Some(error) = &job.error {
        lines.push(format!("error:     {error}"));
    }
    if let Some(summary) = &job.result_summary {
        if let Some(outcome) = summary.outcome {
            lines.push(format!("outcome:   {outcome:?}"));
        }
        match &summary.changed_fields {
            Some(fields) if fields.is_empty() => lines.push("changed:   (nothing)".to_string()),
            Some(fields) => lines.push(format!("changed:   {}", fields.join(", "))),
            None => {}
        }
        for warning in &summary.warnings {
            lines.push(format!("warning:   {warning}"));
        }
    }
    lines
}

pub fn format_timestamp(timestamp_ms: i64) -> String {
    Utc.timestamp_millis_opt(timestamp_ms)
        .single()
        .map_or_else(|| timestamp_ms.to_string(), |time| time.to_rfc3339())
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else {
        format!("{}w ago", diff / week)
    }
}
