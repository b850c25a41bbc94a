//! Classify a shop-specific selection against the catalog default.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::InternalId;

/// How a shop's selection relates to the catalog default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrideState {
    /// No shop-specific selection; the default applies
    Inherited,
    /// Shop selection equals the default
    Identical,
    /// Shop selection diverges from the default
    Custom,
}

impl OverrideState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Inherited => "inherited",
            Self::Identical => "identical",
            Self::Custom => "custom",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SelectionDiff {
    /// In the shop selection but not the default
    pub added: Vec<InternalId>,
    /// In the default but not the shop selection
    pub removed: Vec<InternalId>,
    pub primary_changed: bool,
}

impl SelectionDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && !self.primary_changed
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideStatus {
    pub status: OverrideState,
    pub diff: SelectionDiff,
}

impl OverrideStatus {
    const fn without_diff(status: OverrideState) -> Self {
        Self {
            status,
            diff: SelectionDiff {
                added: Vec::new(),
                removed: Vec::new(),
                primary_changed: false,
            },
        }
    }
}

/// Compare a shop selection with the default. First match wins: an empty
/// shop selection is inherited, equal sets with equal primaries are
/// identical, anything else is custom.
pub fn compare(
    shop_items: &[InternalId],
    default_items: &[InternalId],
    shop_primary: Option<InternalId>,
    default_primary: Option<InternalId>,
) -> OverrideStatus {
    if shop_items.is_empty() {
        return OverrideStatus::without_diff(OverrideState::Inherited);
    }

    let shop: BTreeSet<InternalId> = shop_items.iter().copied().collect();
    let default: BTreeSet<InternalId> = default_items.iter().copied().collect();
    let primary_changed = shop_primary != default_primary;

    if shop == default && !primary_changed {
        return OverrideStatus::without_diff(OverrideState::Identical);
    }

    OverrideStatus {
        status: OverrideState::Custom,
        diff: SelectionDiff {
            added: shop.difference(&default).copied().collect(),
            removed: default.difference(&shop).copied().collect(),
            primary_changed,
        },
    }
}

/// Parse an id list from loosely typed JSON (numbers or numeric strings).
pub fn parse_id_list(raw: &serde_json::Value) -> Result<Vec<InternalId>> {
    Vec::<InternalId>::deserialize(raw)
        .map_err(|error| Error::InvalidInput(format!("invalid id list: {error}")))
}
