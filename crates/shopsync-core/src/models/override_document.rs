//! Canonical per-product-per-shop override document

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ExternalId, InternalId};
use crate::error::{Error, Result};

/// Who produced the current document contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrideSource {
    /// User edit in the catalog
    Manual,
    /// Reconciled from a shop pull
    #[serde(alias = "pull")]
    Pulled,
    /// Regenerated by the engine
    System,
}

impl OverrideSource {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Pulled => "pulled",
            Self::System => "system",
        }
    }

    /// User-originated edits win over reconciled state.
    pub const fn takes_precedence_over(self, other: Self) -> bool {
        matches!(
            (self, other),
            (Self::Manual, Self::Pulled | Self::System)
        )
    }
}

impl fmt::Display for OverrideSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Selection {
    #[serde(default)]
    pub items: Vec<InternalId>,
    #[serde(default)]
    pub primary: Option<InternalId>,
}

/// A user's category selection waiting for the next push of its tuple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingEdit {
    pub selection: Selection,
    /// Unix millis; a newer edit replaces an older one.
    pub requested_at: i64,
}

/// Recorded when the designated primary could not be kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimaryFallback {
    /// Primary that was asked for, if there was one
    pub requested: Option<InternalId>,
    /// Primary actually used
    pub used: InternalId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub last_updated: DateTime<Utc>,
    pub source: OverrideSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_fallback: Option<PrimaryFallback>,
}

/// Shop-specific selection with its resolved external ids.
///
/// Always replaced wholesale; never merged field by field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideDocument {
    pub selection: Selection,
    pub mappings: BTreeMap<InternalId, ExternalId>,
    pub metadata: DocumentMetadata,
}

impl OverrideDocument {
    /// An empty document (no shop-specific selection).
    pub fn empty(source: OverrideSource) -> Self {
        Self {
            selection: Selection::default(),
            mappings: BTreeMap::new(),
            metadata: DocumentMetadata {
                last_updated: Utc::now(),
                source,
                primary_fallback: None,
            },
        }
    }

    pub fn is_empty(&self) -> bool {
        self.selection.items.is_empty()
    }

    /// Check structural invariants: no duplicate items, every item mapped,
    /// no mapping without an item, and primary is one of the items.
    pub fn validate(&self) -> Result<()> {
        let mut seen = BTreeSet::new();
        for item in &self.selection.items {
            if !seen.insert(*item) {
                return Err(Error::InvalidInput(format!(
                    "override document lists {item} twice"
                )));
            }
            if !self.mappings.contains_key(item) {
                return Err(Error::InvalidInput(format!(
                    "override document item {item} has no external mapping"
                )));
            }
        }

        if let Some(extra) = self.mappings.keys().find(|key| !seen.contains(key)) {
            return Err(Error::InvalidInput(format!(
                "override document maps {extra} which is not selected"
            )));
        }

        match self.selection.primary {
            Some(primary) if !seen.contains(&primary) => Err(Error::InvalidInput(format!(
                "override document primary {primary} is not selected"
            ))),
            None if !self.selection.items.is_empty() => Err(Error::InvalidInput(
                "override document has items but no primary".to_string(),
            )),
            _ => Ok(()),
        }
    }

    /// External ids for the selected items, in selection order.
    pub fn external_ids(&self) -> Vec<ExternalId> {
        self.selection
            .items
            .iter()
            .filter_map(|item| self.mappings.get(item).copied())
            .collect()
    }

    pub fn primary_external(&self) -> Option<ExternalId> {
        self.selection
            .primary
            .and_then(|primary| self.mappings.get(&primary).copied())
    }
}
