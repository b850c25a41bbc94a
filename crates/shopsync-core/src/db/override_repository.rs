//! Override document and validation finding storage

use libsql::Connection;

use crate::error::Result;
use crate::models::{
    FindingSnapshot, OverrideDocument, PendingEdit, ProductId, ShopId, ValidationFinding,
};
use crate::util::unix_millis_now;

/// Storage for the per product × shop documents
#[allow(async_fn_in_trait)]
pub trait OverrideRepository {
    /// Stored document as raw JSON; it may be in an older shape.
    async fn load_raw(
        &self,
        product_id: ProductId,
        shop_id: ShopId,
    ) -> Result<Option<serde_json::Value>>;

    /// Replace the stored document wholesale.
    async fn save(
        &self,
        product_id: ProductId,
        shop_id: ShopId,
        document: &OverrideDocument,
    ) -> Result<()>;

    /// Remove the shop-specific document so the catalog default applies.
    async fn clear(&self, product_id: ProductId, shop_id: ShopId) -> Result<bool>;

    /// Replace the finding snapshot for a product in a shop.
    async fn save_findings(&self, snapshot: &FindingSnapshot) -> Result<()>;

    async fn load_findings(
        &self,
        product_id: ProductId,
        shop_id: ShopId,
    ) -> Result<Option<FindingSnapshot>>;

    /// Record a user edit for the next push; replaces any earlier one.
    async fn stage_edit(
        &self,
        product_id: ProductId,
        shop_id: ShopId,
        edit: &PendingEdit,
    ) -> Result<()>;

    async fn pending_edit(
        &self,
        product_id: ProductId,
        shop_id: ShopId,
    ) -> Result<Option<PendingEdit>>;

    /// Drop the edit once applied. A newer edit staged in the meantime is
    /// kept. Returns `true` if a row was removed.
    async fn discard_edit(
        &self,
        product_id: ProductId,
        shop_id: ShopId,
        edit: &PendingEdit,
    ) -> Result<bool>;
}

/// libSQL implementation of `OverrideRepository`
pub struct LibSqlOverrideRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlOverrideRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl OverrideRepository for LibSqlOverrideRepository<'_> {
    async fn load_raw(
        &self,
        product_id: ProductId,
        shop_id: ShopId,
    ) -> Result<Option<serde_json::Value>> {
        let mut rows = self
            .conn
            .query(
                "SELECT document FROM override_documents WHERE product_id = ? AND shop_id = ?",
                libsql::params![product_id.get(), shop_id.get()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => {
                let raw: String = row.get(0)?;
                Ok(Some(serde_json::from_str(&raw)?))
            }
            None => Ok(None),
        }
    }

    async fn save(
        &self,
        product_id: ProductId,
        shop_id: ShopId,
        document: &OverrideDocument,
    ) -> Result<()> {
        document.validate()?;
        let raw = serde_json::to_string(document)?;
        self.conn
            .execute(
                "INSERT OR REPLACE INTO override_documents
                    (product_id, shop_id, document, source, updated_at)
                 VALUES (?, ?, ?, ?, ?)",
                libsql::params![
                    product_id.get(),
                    shop_id.get(),
                    raw,
                    document.metadata.source.as_str(),
                    unix_millis_now()
                ],
            )
            .await?;
        Ok(())
    }

    async fn clear(&self, product_id: ProductId, shop_id: ShopId) -> Result<bool> {
        let removed = self
            .conn
            .execute(
                "DELETE FROM override_documents WHERE product_id = ? AND shop_id = ?",
                libsql::params![product_id.get(), shop_id.get()],
            )
            .await?;
        Ok(removed > 0)
    }

    async fn save_findings(&self, snapshot: &FindingSnapshot) -> Result<()> {
        let raw = serde_json::to_string(&snapshot.findings)?;
        self.conn
            .execute(
                "INSERT OR REPLACE INTO validation_findings
                    (product_id, shop_id, validated_at, findings)
                 VALUES (?, ?, ?, ?)",
                libsql::params![
                    snapshot.product_id.get(),
                    snapshot.shop_id.get(),
                    snapshot.validated_at,
                    raw
                ],
            )
            .await?;
        Ok(())
    }

    async fn load_findings(
        &self,
        product_id: ProductId,
        shop_id: ShopId,
    ) -> Result<Option<FindingSnapshot>> {
        let mut rows = self
            .conn
            .query(
                "SELECT validated_at, findings FROM validation_findings
                 WHERE product_id = ? AND shop_id = ?",
                libsql::params![product_id.get(), shop_id.get()],
            )
            .await?;

        let Some(row) = rows.next().await? else {
            return Ok(None);
        };
        let raw: String = row.get(1)?;
        let findings: Vec<ValidationFinding> = serde_json::from_str(&raw)?;
        Ok(Some(FindingSnapshot {
            product_id,
            shop_id,
            validated_at: row.get(0)?,
            findings,
        }))
    }

    async fn stage_edit(
        &self,
        product_id: ProductId,
        shop_id: ShopId,
        edit: &PendingEdit,
    ) -> Result<()> {
        let raw = serde_json::to_string(&edit.selection)?;
        self.conn
            .execute(
                "INSERT OR REPLACE INTO pending_override_edits
                    (product_id, shop_id, selection, requested_at)
                 VALUES (?, ?, ?, ?)",
                libsql::params![product_id.get(), shop_id.get(), raw, edit.requested_at],
            )
            .await?;
        Ok(())
    }

    async fn pending_edit(
        &self,
        product_id: ProductId,
        shop_id: ShopId,
    ) -> Result<Option<PendingEdit>> {
        let mut rows = self
            .conn
            .query(
                "SELECT selection, requested_at FROM pending_override_edits
                 WHERE product_id = ? AND shop_id = ?",
                libsql::params![product_id.get(), shop_id.get()],
            )
            .await?;

        let Some(row) = rows.next().await? else {
            return Ok(None);
        };
        let raw: String = row.get(0)?;
        Ok(Some(PendingEdit {
            selection: serde_json::from_str(&raw)?,
            requested_at: row.get(1)?,
        }))
    }

    async fn discard_edit(
        &self,
        product_id: ProductId,
        shop_id: ShopId,
        edit: &PendingEdit,
    ) -> Result<bool> {
        let raw = serde_json::to_string(&edit.selection)?;
        let removed = self
            .conn
            .execute(
                "DELETE FROM pending_override_edits
                 WHERE product_id = ? AND shop_id = ? AND requested_at = ? AND selection = ?",
                libsql::params![product_id.get(), shop_id.get(), edit.requested_at, raw],
            )
            .await?;
        Ok(removed > 0)
    }
}
