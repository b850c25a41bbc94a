//! Validation finding model

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ProductId, ShopId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        })
    }
}

/// Drift between catalog truth and what a shop holds. Never blocks a sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationFinding {
    pub field: String,
    pub severity: Severity,
    pub message: String,
    pub internal_value: Value,
    pub external_value: Value,
}

/// Findings of the latest validation run for one product in one shop.
///
/// Replaced wholesale by the next run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FindingSnapshot {
    pub product_id: ProductId,
    pub shop_id: ShopId,
    /// Validation timestamp (Unix ms)
    pub validated_at: i64,
    pub findings: Vec<ValidationFinding>,
}

impl FindingSnapshot {
    pub fn highest_severity(&self) -> Option<Severity> {
        self.findings.iter().map(|finding| finding.severity).max()
    }
}
