//! Bidirectional identity mapping between catalog ids and shop ids.
//!
//! Lookups go through [`IdentityMap`], which is backed by persistence. Bulk
//! conversions load an [`IdentityIndex`] snapshot once per (entity type, shop)
//! so the converter itself stays pure.

use std::collections::HashMap;

use crate::error::Result;
use crate::models::{EntityType, ExternalId, IdentityMapping, InternalId, Resolution, ShopId};

/// Contract of the identity mapping layer.
///
/// `associate` never overwrites: if either side is already actively bound to
/// something else it fails with a conflict and the caller must `deactivate`
/// first.
#[allow(async_fn_in_trait)]
pub trait IdentityMap {
    async fn resolve_external(
        &self,
        entity_type: EntityType,
        shop_id: ShopId,
        internal_id: InternalId,
    ) -> Result<Resolution<ExternalId>>;

    async fn resolve_internal(
        &self,
        entity_type: EntityType,
        shop_id: ShopId,
        external_id: ExternalId,
    ) -> Result<Resolution<InternalId>>;

    async fn associate(
        &self,
        entity_type: EntityType,
        shop_id: ShopId,
        internal_id: InternalId,
        external_id: ExternalId,
    ) -> Result<IdentityMapping>;

    /// Returns `false` when there was no active mapping to deactivate.
    async fn deactivate(
        &self,
        entity_type: EntityType,
        shop_id: ShopId,
        internal_id: InternalId,
    ) -> Result<bool>;

    /// Every row (active and inactive) for one entity type in one shop.
    async fn list(&self, entity_type: EntityType, shop_id: ShopId)
        -> Result<Vec<IdentityMapping>>;

    async fn load_index(&self, entity_type: EntityType, shop_id: ShopId) -> Result<IdentityIndex> {
        let rows = self.list(entity_type, shop_id).await?;
        Ok(IdentityIndex::from_rows(entity_type, shop_id, &rows))
    }
}

/// In-memory snapshot of the mappings for one entity type in one shop.
#[derive(Debug, Clone, Default)]
pub struct IdentityIndex {
    entity_type: Option<EntityType>,
    shop_id: Option<ShopId>,
    forward: HashMap<InternalId, ExternalId>,
    reverse: HashMap<ExternalId, InternalId>,
    retired_forward: HashMap<InternalId, ExternalId>,
    retired_reverse: HashMap<ExternalId, InternalId>,
}

impl IdentityIndex {
    /// Build from stored rows. Rows are expected oldest first so the last
    /// inactive row wins as the "last known" id.
    pub fn from_rows(entity_type: EntityType, shop_id: ShopId, rows: &[IdentityMapping]) -> Self {
        let mut index = Self {
            entity_type: Some(entity_type),
            shop_id: Some(shop_id),
            ..Self::default()
        };

        for row in rows
            .iter()
            .filter(|row| row.entity_type == entity_type && row.shop_id == shop_id)
        {
            if row.active {
                index.forward.insert(row.internal_id, row.external_id);
                index.reverse.insert(row.external_id, row.internal_id);
            } else {
                index.retired_forward.insert(row.internal_id, row.external_id);
                index.retired_reverse.insert(row.external_id, row.internal_id);
            }
        }

        index
    }

    /// Build from active pairs only (tests and ad hoc conversions).
    pub fn from_active_pairs(
        entity_type: EntityType,
        shop_id: ShopId,
        pairs: impl IntoIterator<Item = (InternalId, ExternalId)>,
    ) -> Self {
        let mut index = Self {
            entity_type: Some(entity_type),
            shop_id: Some(shop_id),
            ..Self::default()
        };
        for (internal, external) in pairs {
            index.forward.insert(internal, external);
            index.reverse.insert(external, internal);
        }
        index
    }

    pub const fn entity_type(&self) -> Option<EntityType> {
        self.entity_type
    }

    pub const fn shop_id(&self) -> Option<ShopId> {
        self.shop_id
    }

    pub fn resolve_external(&self, internal_id: InternalId) -> Resolution<ExternalId> {
        if let Some(external) = self.forward.get(&internal_id) {
            Resolution::Mapped(*external)
        } else if let Some(external) = self.retired_forward.get(&internal_id) {
            Resolution::Inactive(*external)
        } else {
            Resolution::Unmapped
        }
    }

    pub fn resolve_internal(&self, external_id: ExternalId) -> Resolution<InternalId> {
        if let Some(internal) = self.reverse.get(&external_id) {
            Resolution::Mapped(*internal)
        } else if let Some(internal) = self.retired_reverse.get(&external_id) {
            Resolution::Inactive(*internal)
        } else {
            Resolution::Unmapped
        }
    }

    /// True when `external_id` is actively mapped to exactly `internal_id`.
    pub fn is_active_pair(&self, internal_id: InternalId, external_id: ExternalId) -> bool {
        self.forward.get(&internal_id) == Some(&external_id)
    }

    pub fn active_len(&self) -> usize {
        self.forward.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(internal: i64, external: i64, active: bool) -> IdentityMapping {
        IdentityMapping {
            entity_type: EntityType::Category,
            shop_id: ShopId::new(1),
            internal_id: InternalId::new(internal),
            external_id: ExternalId::new(external),
            active,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn test_index_distinguishes_unmapped_from_inactive() {
        let index = IdentityIndex::from_rows(
            EntityType::Category,
            ShopId::new(1),
            &[row(100, 9, true), row(101, 10, false)],
        );

        assert_eq!(
            index.resolve_external(InternalId::new(100)),
            Resolution::Mapped(ExternalId::new(9))
        );
        assert_eq!(
            index.resolve_external(InternalId::new(101)),
            Resolution::Inactive(ExternalId::new(10))
        );
        assert_eq!(
            index.resolve_external(InternalId::new(102)),
            Resolution::Unmapped
        );
        assert_eq!(
            index.resolve_internal(ExternalId::new(9)),
            Resolution::Mapped(InternalId::new(100))
        );
        assert_eq!(
            index.resolve_internal(ExternalId::new(10)),
            Resolution::Inactive(InternalId::new(101))
        );
    }

    #[test]
    fn test_index_ignores_other_shops() {
        let mut other = row(100, 9, true);
        other.shop_id = ShopId::new(2);
        let index = IdentityIndex::from_rows(EntityType::Category, ShopId::new(1), &[other]);
        assert_eq!(index.active_len(), 0);
    }

    #[test]
    fn test_reactivated_mapping_wins_over_retired_row() {
        let index = IdentityIndex::from_rows(
            EntityType::Category,
            ShopId::new(1),
            &[row(100, 9, false), row(100, 12, true)],
        );
        assert_eq!(
            index.resolve_external(InternalId::new(100)),
            Resolution::Mapped(ExternalId::new(12))
        );
    }
}
