//! Readers for override documents stored in older shapes.

use std::collections::BTreeMap;

use serde::Deserialize;

use super::{dangling_mappings, from_pivot_selection, refresh, ConversionReport};
use crate::error::{Error, Result};
use crate::identity::IdentityIndex;
use crate::models::{ExternalId, InternalId, OverrideDocument, OverrideSource};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UiSelection {
    pub selected: Vec<InternalId>,
    #[serde(default)]
    pub primary: Option<InternalId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UiEnvelope {
    pub ui: UiSelection,
}

/// Every shape an override has been persisted in.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum StoredOverride {
    Canonical(OverrideDocument),
    /// `{ "ui": { "selected": [...], "primary": n }, ... }`
    Enveloped(UiEnvelope),
    /// `{ "selected": [...], "primary": n }`
    Ui(UiSelection),
    /// `{ "internal": external, ... }`
    FlatMappings(BTreeMap<InternalId, ExternalId>),
    /// `[internal, ...]`
    IdList(Vec<InternalId>),
}

impl StoredOverride {
    pub fn from_json(raw: &serde_json::Value) -> Result<Self> {
        Self::deserialize(raw).map_err(|error| {
            Error::InvalidInput(format!("unrecognized override document shape: {error}"))
        })
    }

    pub const fn shape(&self) -> &'static str {
        match self {
            Self::Canonical(_) => "canonical",
            Self::Enveloped(_) => "ui_envelope",
            Self::Ui(_) => "ui",
            Self::FlatMappings(_) => "flat_mappings",
            Self::IdList(_) => "id_list",
        }
    }
}

/// Read a stored override in any known shape into a canonical document.
///
/// Only a valid canonical document whose mappings all match active rows is
/// kept as-is. Everything else is rebuilt from its selection.
pub fn parse_stored_override(
    raw: &serde_json::Value,
    index: &IdentityIndex,
) -> Result<ConversionReport> {
    let stored = StoredOverride::from_json(raw)?;
    if !matches!(stored, StoredOverride::Canonical(_)) {
        tracing::info!(shape = stored.shape(), "Upgrading legacy override document");
    }

    let report = match stored {
        StoredOverride::Canonical(document) => {
            if document.validate().is_ok() && dangling_mappings(&document, index).is_empty() {
                ConversionReport {
                    document,
                    unresolved_internal: Vec::new(),
                    unresolved_external: Vec::new(),
                    skipped_roots: Vec::new(),
                }
            } else {
                tracing::warn!("Stored override document is stale, re-resolving");
                refresh(&document, index)
            }
        }
        StoredOverride::Enveloped(UiEnvelope { ui }) | StoredOverride::Ui(ui) => {
            from_pivot_selection(&ui.selected, ui.primary, index, OverrideSource::Manual)
        }
        StoredOverride::FlatMappings(mappings) => {
            let items: Vec<InternalId> = mappings.keys().copied().collect();
            from_pivot_selection(&items, None, index, OverrideSource::Manual)
        }
        StoredOverride::IdList(items) => {
            from_pivot_selection(&items, None, index, OverrideSource::Manual)
        }
    };

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EntityType, ShopId};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn index() -> IdentityIndex {
        IdentityIndex::from_active_pairs(
            EntityType::Category,
            ShopId::new(1),
            [
                (InternalId::new(100), ExternalId::new(9)),
                (InternalId::new(103), ExternalId::new(15)),
            ],
        )
    }

    fn items(report: &ConversionReport) -> Vec<i64> {
        report
            .document
            .selection
            .items
            .iter()
            .map(|id| id.get())
            .collect()
    }

    #[test]
    fn test_shapes_are_detected() {
        let cases = [
            (json!({"ui": {"selected": [100], "primary": 100}}), "ui_envelope"),
            (json!({"selected": ["100", 103], "primary": "103"}), "ui"),
            (json!({"100": 9, "103": "15"}), "flat_mappings"),
            (json!([100, "103"]), "id_list"),
        ];
        for (raw, shape) in cases {
            assert_eq!(StoredOverride::from_json(&raw).unwrap().shape(), shape);
        }
    }

    #[test]
    fn test_ui_shape_keeps_primary() {
        let report =
            parse_stored_override(&json!({"selected": ["100", 103], "primary": "103"}), &index())
                .unwrap();
        assert_eq!(items(&report), vec![100, 103]);
        assert_eq!(report.document.selection.primary, Some(InternalId::new(103)));
        assert!(report.document.validate().is_ok());
    }

    #[test]
    fn test_flat_mappings_are_re_resolved() {
        let report = parse_stored_override(&json!({"100": 77, "555": 1}), &index()).unwrap();
        assert_eq!(items(&report), vec![100]);
        assert_eq!(
            report.document.mappings.get(&InternalId::new(100)),
            Some(&ExternalId::new(9))
        );
        assert_eq!(report.unresolved_internal.len(), 1);
    }

    #[test]
    fn test_valid_canonical_document_is_kept() {
        let raw = json!({
            "selection": {"items": [100], "primary": 100},
            "mappings": {"100": 9},
            "metadata": {"last_updated": "2024-05-01T10:00:00Z", "source": "pull"}
        });
        let report = parse_stored_override(&raw, &index()).unwrap();
        assert_eq!(report.document.metadata.source, OverrideSource::Pulled);
        assert_eq!(
            report.document.metadata.last_updated.to_rfc3339(),
            "2024-05-01T10:00:00+00:00"
        );
    }

    #[test]
    fn test_canonical_with_dangling_mapping_is_rebuilt() {
        let raw = json!({
            "selection": {"items": [100], "primary": 100},
            "mappings": {"100": 0},
            "metadata": {"last_updated": "2024-05-01T10:00:00Z", "source": "manual"}
        });
        let report = parse_stored_override(&raw, &index()).unwrap();
        assert_eq!(
            report.document.mappings.get(&InternalId::new(100)),
            Some(&ExternalId::new(9))
        );
    }

    #[test]
    fn test_unknown_shape_is_rejected() {
        let error = parse_stored_override(&json!("categories"), &index()).unwrap_err();
        assert!(matches!(error, Error::InvalidInput(_)));
    }
}
