use shopsync_core::diff::OverrideStatus;
use shopsync_core::models::{InternalId, ValidationFinding};
use shopsync_core::shop::ShopTransport;
use shopsync_core::{ProductId, ShopId, SyncOrchestrator};

use crate::commands::common::print_json;
use crate::error::CliError;

pub async fn run_override_status<T: ShopTransport>(
    orchestrator: &SyncOrchestrator<T>,
    product: ProductId,
    shop: ShopId,
    as_json: bool,
) -> Result<OverrideStatus, CliError> {
    let status = orchestrator.get_override_status(product, shop).await?;
    if as_json {
        print_json(&status)?;
    } else {
        for line in format_override_status(&status) {
            println!("{line}");
        }
    }
    Ok(status)
}

pub async fn run_findings<T: ShopTransport>(
    orchestrator: &SyncOrchestrator<T>,
    product: ProductId,
    shop: ShopId,
    as_json: bool,
) -> Result<Vec<ValidationFinding>, CliError> {
    let findings = orchestrator.get_validation_findings(product, shop).await?;
    if as_json {
        print_json(&findings)?;
    } else if findings.is_empty() {
        println!("No findings");
    } else {
        for line in format_findings(&findings) {
            println!("{line}");
        }
    }
    Ok(findings)
}

pub fn format_override_status(status: &OverrideStatus) -> Vec<String> {
    let mut lines = vec![format!("status: {}", status.status.as_str())];
    if !status.diff.added.is_empty() {
        lines.push(format!("added: {}", join_ids(&status.diff.added)));
    }
    if !status.diff.removed.is_empty() {
        lines.push(format!("removed: {}", join_ids(&status.diff.removed)));
    }
    if status.diff.primary_changed {
        lines.push("primary changed".to_string());
    }
    lines
}

pub fn format_findings(findings: &[ValidationFinding]) -> Vec<String> {
    findings
        .iter()
        .map(|finding| {
            format!(
                "{:<7}  {:<10}  {}",
                finding.severity.to_string(),
                finding.field,
                finding.message
            )
        })
        .collect()
}

fn join_ids(ids: &[InternalId]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
