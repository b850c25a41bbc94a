//! libSQL-backed identity map

use libsql::Connection;

use crate::error::{ConflictError, Error, Result};
use crate::identity::IdentityMap;
use crate::models::{EntityType, ExternalId, IdentityMapping, InternalId, Resolution, ShopId};
use crate::util::unix_millis_now;

const MAPPING_COLUMNS: &str =
    "entity_type, shop_id, internal_id, external_id, active, created_at, updated_at";

/// libSQL implementation of [`IdentityMap`]
pub struct LibSqlIdentityMap<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlIdentityMap<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_mapping(row: &libsql::Row) -> Result<IdentityMapping> {
        let entity_type: String = row.get(0)?;
        Ok(IdentityMapping {
            entity_type: entity_type.parse().map_err(Error::Database)?,
            shop_id: ShopId::new(row.get(1)?),
            internal_id: InternalId::new(row.get(2)?),
            external_id: ExternalId::new(row.get(3)?),
            active: row.get::<i64>(4)? != 0,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }

    async fn active_by_internal(
        &self,
        entity_type: EntityType,
        shop_id: ShopId,
        internal_id: InternalId,
    ) -> Result<Option<IdentityMapping>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {MAPPING_COLUMNS} FROM identity_mappings
                     WHERE entity_type = ? AND shop_id = ? AND internal_id = ? AND active = 1"
                ),
                libsql::params![entity_type.as_str(), shop_id.get(), internal_id.get()],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_mapping(&row)?)),
            None => Ok(None),
        }
    }

    async fn active_by_external(
        &self,
        entity_type: EntityType,
        shop_id: ShopId,
        external_id: ExternalId,
    ) -> Result<Option<IdentityMapping>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {MAPPING_COLUMNS} FROM identity_mappings
                     WHERE entity_type = ? AND shop_id = ? AND external_id = ? AND active = 1"
                ),
                libsql::params![entity_type.as_str(), shop_id.get(), external_id.get()],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_mapping(&row)?)),
            None => Ok(None),
        }
    }
}

impl IdentityMap for LibSqlIdentityMap<'_> {
    async fn resolve_external(
        &self,
        entity_type: EntityType,
        shop_id: ShopId,
        internal_id: InternalId,
    ) -> Result<Resolution<ExternalId>> {
        let mut rows = self
            .conn
            .query(
                "SELECT external_id, active FROM identity_mappings
                 WHERE entity_type = ? AND shop_id = ? AND internal_id = ?
                 ORDER BY active DESC, id DESC
                 LIMIT 1",
                libsql::params![entity_type.as_str(), shop_id.get(), internal_id.get()],
            )
            .await?;

        let Some(row) = rows.next().await? else {
            return Ok(Resolution::Unmapped);
        };
        let external_id = ExternalId::new(row.get(0)?);
        if row.get::<i64>(1)? != 0 {
            Ok(Resolution::Mapped(external_id))
        } else {
            Ok(Resolution::Inactive(external_id))
        }
    }

    async fn resolve_internal(
        &self,
        entity_type: EntityType,
        shop_id: ShopId,
        external_id: ExternalId,
    ) -> Result<Resolution<InternalId>> {
        let mut rows = self
            .conn
            .query(
                "SELECT internal_id, active FROM identity_mappings
                 WHERE entity_type = ? AND shop_id = ? AND external_id = ?
                 ORDER BY active DESC, id DESC
                 LIMIT 1",
                libsql::params![entity_type.as_str(), shop_id.get(), external_id.get()],
            )
            .await?;

        let Some(row) = rows.next().await? else {
            return Ok(Resolution::Unmapped);
        };
        let internal_id = InternalId::new(row.get(0)?);
        if row.get::<i64>(1)? != 0 {
            Ok(Resolution::Mapped(internal_id))
        } else {
            Ok(Resolution::Inactive(internal_id))
        }
    }

    async fn associate(
        &self,
        entity_type: EntityType,
        shop_id: ShopId,
        internal_id: InternalId,
        external_id: ExternalId,
    ) -> Result<IdentityMapping> {
        let conflict = |existing: &IdentityMapping| {
            Error::Conflict(ConflictError {
                entity_type,
                shop_id,
                requested_internal_id: internal_id,
                requested_external_id: external_id,
                existing_internal_id: existing.internal_id,
                existing_external_id: existing.external_id,
            })
        };

        if let Some(existing) = self
            .active_by_internal(entity_type, shop_id, internal_id)
            .await?
        {
            if existing.external_id == external_id {
                return Ok(existing);
            }
            return Err(conflict(&existing));
        }
        if let Some(existing) = self
            .active_by_external(entity_type, shop_id, external_id)
            .await?
        {
            return Err(conflict(&existing));
        }

        let now = unix_millis_now();
        self.conn
            .execute(
                "INSERT INTO identity_mappings
                    (entity_type, shop_id, internal_id, external_id, active, created_at, updated_at)
                 VALUES (?, ?, ?, ?, 1, ?, ?)",
                libsql::params![
                    entity_type.as_str(),
                    shop_id.get(),
                    internal_id.get(),
                    external_id.get(),
                    now,
                    now
                ],
            )
            .await?;

        tracing::info!(
            entity_type = entity_type.as_str(),
            %shop_id,
            %internal_id,
            %external_id,
            "Associated identity mapping"
        );

        Ok(IdentityMapping {
            entity_type,
            shop_id,
            internal_id,
            external_id,
            active: true,
            created_at: now,
            updated_at: now,
        })
    }

    async fn deactivate(
        &self,
        entity_type: EntityType,
        shop_id: ShopId,
        internal_id: InternalId,
    ) -> Result<bool> {
        let changed = self
            .conn
            .execute(
                "UPDATE identity_mappings SET active = 0, updated_at = ?
                 WHERE entity_type = ? AND shop_id = ? AND internal_id = ? AND active = 1",
                libsql::params![
                    unix_millis_now(),
                    entity_type.as_str(),
                    shop_id.get(),
                    internal_id.get()
                ],
            )
            .await?;

        if changed > 0 {
            tracing::warn!(
                entity_type = entity_type.as_str(),
                %shop_id,
                %internal_id,
                "Deactivated identity mapping"
            );
        }
        Ok(changed > 0)
    }

    async fn list(&self, entity_type: EntityType, shop_id: ShopId) -> Result<Vec<IdentityMapping>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {MAPPING_COLUMNS} FROM identity_mappings
                     WHERE entity_type = ? AND shop_id = ?
                     ORDER BY id ASC"
                ),
                libsql::params![entity_type.as_str(), shop_id.get()],
            )
            .await?;

        let mut mappings = Vec::new();
        while let Some(row) = rows.next().await? {
            mappings.push(Self::parse_mapping(&row)?);
        }
        Ok(mappings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use pretty_assertions::assert_eq;

    const SHOP: ShopId = ShopId::new(1);

    async fn setup() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_associate_and_resolve_both_ways() {
        let db = setup().await;
        let map = LibSqlIdentityMap::new(db.connection());

        map.associate(EntityType::Category, SHOP, InternalId::new(100), ExternalId::new(9))
            .await
            .unwrap();

        assert_eq!(
            map.resolve_external(EntityType::Category, SHOP, InternalId::new(100))
                .await
                .unwrap(),
            Resolution::Mapped(ExternalId::new(9))
        );
        assert_eq!(
            map.resolve_internal(EntityType::Category, SHOP, ExternalId::new(9))
                .await
                .unwrap(),
            Resolution::Mapped(InternalId::new(100))
        );
        assert_eq!(
            map.resolve_external(EntityType::Category, ShopId::new(2), InternalId::new(100))
                .await
                .unwrap(),
            Resolution::Unmapped
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_associate_same_pair_is_idempotent() {
        let db = setup().await;
        let map = LibSqlIdentityMap::new(db.connection());

        map.associate(EntityType::Category, SHOP, InternalId::new(100), ExternalId::new(9))
            .await
            .unwrap();
        map.associate(EntityType::Category, SHOP, InternalId::new(100), ExternalId::new(9))
            .await
            .unwrap();

        assert_eq!(map.list(EntityType::Category, SHOP).await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_external_already_bound_is_conflict() {
        let db = setup().await;
        let map = LibSqlIdentityMap::new(db.connection());

        map.associate(EntityType::Category, SHOP, InternalId::new(100), ExternalId::new(9))
            .await
            .unwrap();
        let error = map
            .associate(EntityType::Category, SHOP, InternalId::new(101), ExternalId::new(9))
            .await
            .unwrap_err();

        let Error::Conflict(conflict) = error else {
            panic!("expected conflict, got {error:?}");
        };
        assert_eq!(conflict.existing_internal_id, InternalId::new(100));
        assert_eq!(conflict.requested_internal_id, InternalId::new(101));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_internal_already_bound_is_conflict() {
        let db = setup().await;
        let map = LibSqlIdentityMap::new(db.connection());

        map.associate(EntityType::Category, SHOP, InternalId::new(100), ExternalId::new(9))
            .await
            .unwrap();
        let error = map
            .associate(EntityType::Category, SHOP, InternalId::new(100), ExternalId::new(10))
            .await
            .unwrap_err();
        assert!(matches!(error, Error::Conflict(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_deactivate_then_reassociate() {
        let db = setup().await;
        let map = LibSqlIdentityMap::new(db.connection());

        map.associate(EntityType::Category, SHOP, InternalId::new(100), ExternalId::new(9))
            .await
            .unwrap();
        assert!(map
            .deactivate(EntityType::Category, SHOP, InternalId::new(100))
            .await
            .unwrap());
        assert!(!map
            .deactivate(EntityType::Category, SHOP, InternalId::new(100))
            .await
            .unwrap());

        assert_eq!(
            map.resolve_external(EntityType::Category, SHOP, InternalId::new(100))
                .await
                .unwrap(),
            Resolution::Inactive(ExternalId::new(9))
        );

        map.associate(EntityType::Category, SHOP, InternalId::new(101), ExternalId::new(9))
            .await
            .unwrap();
        assert_eq!(
            map.resolve_internal(EntityType::Category, SHOP, ExternalId::new(9))
                .await
                .unwrap(),
            Resolution::Mapped(InternalId::new(101))
        );

        let index = map.load_index(EntityType::Category, SHOP).await.unwrap();
        assert_eq!(index.active_len(), 1);
        assert_eq!(
            index.resolve_external(InternalId::new(100)),
            Resolution::Inactive(ExternalId::new(9))
        );
    }
}
