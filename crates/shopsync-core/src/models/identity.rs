//! Identity mapping model

use serde::{Deserialize, Serialize};

use super::{EntityType, ExternalId, InternalId, ShopId};

/// One association between a catalog id and a shop id.
///
/// Rows are never deleted; an external entity that disappears only flips
/// `active` so history stays referenceable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityMapping {
    pub entity_type: EntityType,
    pub shop_id: ShopId,
    pub internal_id: InternalId,
    pub external_id: ExternalId,
    pub active: bool,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last activation/deactivation timestamp (Unix ms)
    pub updated_at: i64,
}

/// Outcome of a lookup through the identity map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "id", rename_all = "snake_case")]
pub enum Resolution<T> {
    /// An active mapping exists
    Mapped(T),
    /// Mappings existed but all were deactivated; carries the last known id
    Inactive(T),
    /// Never configured
    Unmapped,
}

impl<T: Copy> Resolution<T> {
    /// The active id, if any.
    pub const fn active(&self) -> Option<T> {
        match self {
            Self::Mapped(id) => Some(*id),
            Self::Inactive(_) | Self::Unmapped => None,
        }
    }

    pub const fn is_mapped(&self) -> bool {
        matches!(self, Self::Mapped(_))
    }
}
