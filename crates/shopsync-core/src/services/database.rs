//! Shared database service wrapper used by the orchestrator, CLI and API.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::db::{
    CatalogRepository, Database, JobFilter, JobRepository, LibSqlCatalogRepository,
    LibSqlIdentityMap, LibSqlJobRepository, LibSqlOverrideRepository, OverrideRepository,
};
use crate::identity::{IdentityIndex, IdentityMap};
use crate::models::{
    CatalogProduct, Direction, EntityType, ExternalId, FindingSnapshot, IdentityMapping,
    InternalId, JobId, OverrideDocument, PendingEdit, ProductId, Resolution, ResultSummary,
    ShopConfig, ShopId, SyncJob,
};
use crate::Result;

/// Thread-safe service for DB and repository operations.
#[derive(Clone)]
pub struct DatabaseService {
    db: Arc<Mutex<Database>>,
}

impl DatabaseService {
    /// Open a database service at the given filesystem path.
    ///
    /// A file that is not a database is moved aside and a fresh one created.
    pub async fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let db = match Database::open(&db_path).await {
            Ok(db) => db,
            Err(error) if Self::is_corrupted_db_error(&error) => {
                tracing::warn!(
                    "Database at {} is unreadable: {}. Moving it aside.",
                    db_path.display(),
                    error
                );
                Self::quarantine_corrupted_db_file(&db_path)?;
                Database::open(&db_path).await?
            }
            Err(error) => return Err(error),
        };

        Ok(Self {
            db: Arc::new(Mutex::new(db)),
        })
    }

    /// Open an in-memory database service (primarily for tests).
    pub async fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory().await?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
        })
    }

    fn is_corrupted_db_error(error: &crate::Error) -> bool {
        error
            .to_string()
            .to_ascii_lowercase()
            .contains("file is not a database")
    }

    fn quarantine_corrupted_db_file(db_path: &Path) -> Result<()> {
        if !db_path.exists() {
            return Ok(());
        }
        let file_name = db_path
            .file_name()
            .map_or_else(|| "shopsync.db".into(), |name| name.to_string_lossy());
        let timestamp = chrono::Utc::now().timestamp_millis();
        let backup_path = db_path.with_file_name(format!("{file_name}.corrupt-{timestamp}"));

        std::fs::rename(db_path, &backup_path)?;
        tracing::warn!(
            "Moved corrupted DB file from {} to {}",
            db_path.display(),
            backup_path.display()
        );
        Ok(())
    }

    // Catalog

    pub async fn upsert_product(&self, product: &CatalogProduct) -> Result<()> {
        let db = self.db.lock().await;
        LibSqlCatalogRepository::new(db.connection())
            .upsert_product(product)
            .await
    }

    pub async fn get_product(&self, id: ProductId) -> Result<Option<CatalogProduct>> {
        let db = self.db.lock().await;
        LibSqlCatalogRepository::new(db.connection())
            .get_product(id)
            .await
    }

    /// Active products published to a shop.
    pub async fn list_products_for_shop(&self, shop_id: ShopId) -> Result<Vec<CatalogProduct>> {
        let db = self.db.lock().await;
        LibSqlCatalogRepository::new(db.connection())
            .list_products_for_shop(shop_id)
            .await
    }

    pub async fn upsert_shop(&self, shop: &ShopConfig) -> Result<()> {
        let db = self.db.lock().await;
        LibSqlCatalogRepository::new(db.connection())
            .upsert_shop(shop)
            .await
    }

    pub async fn get_shop(&self, id: ShopId) -> Result<Option<ShopConfig>> {
        let db = self.db.lock().await;
        LibSqlCatalogRepository::new(db.connection())
            .get_shop(id)
            .await
    }

    pub async fn list_shops(&self) -> Result<Vec<ShopConfig>> {
        let db = self.db.lock().await;
        LibSqlCatalogRepository::new(db.connection())
            .list_shops()
            .await
    }

    pub async fn last_sweep_at(&self, shop_id: ShopId) -> Result<Option<i64>> {
        let db = self.db.lock().await;
        LibSqlCatalogRepository::new(db.connection())
            .last_sweep_at(shop_id)
            .await
    }

    pub async fn mark_swept(&self, shop_id: ShopId, at: i64) -> Result<()> {
        let db = self.db.lock().await;
        LibSqlCatalogRepository::new(db.connection())
            .mark_swept(shop_id, at)
            .await
    }

    // Override documents and findings

    pub async fn load_override_raw(
        &self,
        product_id: ProductId,
        shop_id: ShopId,
    ) -> Result<Option<serde_json::Value>> {
        let db = self.db.lock().await;
        LibSqlOverrideRepository::new(db.connection())
            .load_raw(product_id, shop_id)
            .await
    }

    pub async fn save_override(
        &self,
        product_id: ProductId,
        shop_id: ShopId,
        document: &OverrideDocument,
    ) -> Result<()> {
        let db = self.db.lock().await;
        LibSqlOverrideRepository::new(db.connection())
            .save(product_id, shop_id, document)
            .await
    }

    pub async fn clear_override(&self, product_id: ProductId, shop_id: ShopId) -> Result<bool> {
        let db = self.db.lock().await;
        LibSqlOverrideRepository::new(db.connection())
            .clear(product_id, shop_id)
            .await
    }

    pub async fn save_findings(&self, snapshot: &FindingSnapshot) -> Result<()> {
        let db = self.db.lock().await;
        LibSqlOverrideRepository::new(db.connection())
            .save_findings(snapshot)
            .await
    }

    pub async fn load_findings(
        &self,
        product_id: ProductId,
        shop_id: ShopId,
    ) -> Result<Option<FindingSnapshot>> {
        let db = self.db.lock().await;
        LibSqlOverrideRepository::new(db.connection())
            .load_findings(product_id, shop_id)
            .await
    }

    pub async fn stage_edit(
        &self,
        product_id: ProductId,
        shop_id: ShopId,
        edit: &PendingEdit,
    ) -> Result<()> {
        let db = self.db.lock().await;
        LibSqlOverrideRepository::new(db.connection())
            .stage_edit(product_id, shop_id, edit)
            .await
    }

    pub async fn pending_edit(
        &self,
        product_id: ProductId,
        shop_id: ShopId,
    ) -> Result<Option<PendingEdit>> {
        let db = self.db.lock().await;
        LibSqlOverrideRepository::new(db.connection())
            .pending_edit(product_id, shop_id)
            .await
    }

    pub async fn discard_edit(
        &self,
        product_id: ProductId,
        shop_id: ShopId,
        edit: &PendingEdit,
    ) -> Result<bool> {
        let db = self.db.lock().await;
        LibSqlOverrideRepository::new(db.connection())
            .discard_edit(product_id, shop_id, edit)
            .await
    }

    // Jobs

    /// Store a new pending job, or return the open job already holding the
    /// tuple. The flag is `true` when `job` was stored.
    pub async fn insert_job_or_existing(&self, job: &SyncJob) -> Result<(SyncJob, bool)> {
        let db = self.db.lock().await;
        LibSqlJobRepository::new(db.connection())
            .insert_or_existing(job)
            .await
    }

    pub async fn get_job(&self, id: &JobId) -> Result<Option<SyncJob>> {
        let db = self.db.lock().await;
        LibSqlJobRepository::new(db.connection()).get(id).await
    }

    pub async fn open_job_for(
        &self,
        product_id: ProductId,
        shop_id: ShopId,
        direction: Direction,
    ) -> Result<Option<SyncJob>> {
        let db = self.db.lock().await;
        LibSqlJobRepository::new(db.connection())
            .open_for(product_id, shop_id, direction)
            .await
    }

    pub async fn next_pending_job(&self) -> Result<Option<SyncJob>> {
        let db = self.db.lock().await;
        LibSqlJobRepository::new(db.connection())
            .next_pending()
            .await
    }

    pub async fn claim_job(&self, id: &JobId, now: i64) -> Result<bool> {
        let db = self.db.lock().await;
        LibSqlJobRepository::new(db.connection())
            .claim(id, now)
            .await
    }

    pub async fn record_attempt(&self, id: &JobId, error: &str) -> Result<bool> {
        let db = self.db.lock().await;
        LibSqlJobRepository::new(db.connection())
            .record_attempt(id, error)
            .await
    }

    pub async fn complete_job(
        &self,
        id: &JobId,
        summary: &ResultSummary,
        now: i64,
    ) -> Result<bool> {
        let db = self.db.lock().await;
        LibSqlJobRepository::new(db.connection())
            .complete(id, summary, now)
            .await
    }

    pub async fn fail_job(&self, id: &JobId, error: &str, now: i64) -> Result<bool> {
        let db = self.db.lock().await;
        LibSqlJobRepository::new(db.connection())
            .fail(id, error, now)
            .await
    }

    pub async fn cancel_job(&self, id: &JobId, now: i64) -> Result<bool> {
        let db = self.db.lock().await;
        LibSqlJobRepository::new(db.connection())
            .cancel(id, now)
            .await
    }

    pub async fn last_synced_summary(
        &self,
        product_id: ProductId,
        shop_id: ShopId,
        direction: Direction,
        excluding: &JobId,
    ) -> Result<Option<ResultSummary>> {
        let db = self.db.lock().await;
        LibSqlJobRepository::new(db.connection())
            .last_synced_summary(product_id, shop_id, direction, excluding)
            .await
    }

    pub async fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<SyncJob>> {
        let db = self.db.lock().await;
        LibSqlJobRepository::new(db.connection()).list(filter).await
    }

    pub async fn running_jobs_since(&self, started_before: i64) -> Result<Vec<SyncJob>> {
        let db = self.db.lock().await;
        LibSqlJobRepository::new(db.connection())
            .running_since(started_before)
            .await
    }
}

impl IdentityMap for DatabaseService {
    async fn resolve_external(
        &self,
        entity_type: EntityType,
        shop_id: ShopId,
        internal_id: InternalId,
    ) -> Result<Resolution<ExternalId>> {
        let db = self.db.lock().await;
        LibSqlIdentityMap::new(db.connection())
            .resolve_external(entity_type, shop_id, internal_id)
            .await
    }

    async fn resolve_internal(
        &self,
        entity_type: EntityType,
        shop_id: ShopId,
        external_id: ExternalId,
    ) -> Result<Resolution<InternalId>> {
        let db = self.db.lock().await;
        LibSqlIdentityMap::new(db.connection())
            .resolve_internal(entity_type, shop_id, external_id)
            .await
    }

    async fn associate(
        &self,
        entity_type: EntityType,
        shop_id: ShopId,
        internal_id: InternalId,
        external_id: ExternalId,
    ) -> Result<IdentityMapping> {
        let db = self.db.lock().await;
        LibSqlIdentityMap::new(db.connection())
            .associate(entity_type, shop_id, internal_id, external_id)
            .await
    }

    async fn deactivate(
        &self,
        entity_type: EntityType,
        shop_id: ShopId,
        internal_id: InternalId,
    ) -> Result<bool> {
        let db = self.db.lock().await;
        LibSqlIdentityMap::new(db.connection())
            .deactivate(entity_type, shop_id, internal_id)
            .await
    }

    async fn list(&self, entity_type: EntityType, shop_id: ShopId) -> Result<Vec<IdentityMapping>> {
        let db = self.db.lock().await;
        LibSqlIdentityMap::new(db.connection())
            .list(entity_type, shop_id)
            .await
    }

    async fn load_index(&self, entity_type: EntityType, shop_id: ShopId) -> Result<IdentityIndex> {
        let rows = self.list(entity_type, shop_id).await?;
        Ok(IdentityIndex::from_rows(entity_type, shop_id, &rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TriggerKind;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[tokio::test(flavor = "multi_thread")]
    async fn in_memory_job_roundtrip() {
        let service = DatabaseService::open_in_memory().await.unwrap();
        let job = SyncJob::new(
            ProductId::new(5),
            ShopId::new(1),
            Direction::Push,
            TriggerKind::Manual,
        );

        let (stored, created) = service.insert_job_or_existing(&job).await.unwrap();
        assert!(created);
        assert_eq!(service.get_job(&stored.id).await.unwrap(), Some(job));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn identity_map_through_service() {
        let service = DatabaseService::open_in_memory().await.unwrap();
        service
            .associate(
                EntityType::Category,
                ShopId::new(1),
                InternalId::new(100),
                ExternalId::new(9),
            )
            .await
            .unwrap();

        let index = service
            .load_index(EntityType::Category, ShopId::new(1))
            .await
            .unwrap();
        assert_eq!(
            index.resolve_external(InternalId::new(100)),
            Resolution::Mapped(ExternalId::new(9))
        );
    }

    #[test]
    fn detects_corrupted_db_errors() {
        assert!(DatabaseService::is_corrupted_db_error(&crate::Error::Database(
            "SQLite failure: file is not a database".to_string()
        )));
        assert!(!DatabaseService::is_corrupted_db_error(
            &crate::Error::InvalidInput("bad id".to_string())
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn open_path_creates_parent_directories() {
        let tmp = tempdir().unwrap();
        let db_path = tmp.path().join("nested").join("shopsync.db");

        let service = DatabaseService::open_path(&db_path).await.unwrap();
        assert!(service.list_shops().await.unwrap().is_empty());
        assert!(db_path.exists());
    }
}
