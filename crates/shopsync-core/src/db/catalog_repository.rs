//! Catalog products and shop configuration storage

use libsql::Connection;

use crate::error::Result;
use crate::models::{CatalogProduct, ProductId, ShopConfig, ShopId};
use crate::util::unix_millis_now;

#[allow(async_fn_in_trait)]
pub trait CatalogRepository {
    async fn upsert_product(&self, product: &CatalogProduct) -> Result<()>;

    async fn get_product(&self, id: ProductId) -> Result<Option<CatalogProduct>>;

    /// Active products published to `shop_id`, ordered by id.
    async fn list_products_for_shop(&self, shop_id: ShopId) -> Result<Vec<CatalogProduct>>;

    async fn upsert_shop(&self, shop: &ShopConfig) -> Result<()>;

    async fn get_shop(&self, id: ShopId) -> Result<Option<ShopConfig>>;

    async fn list_shops(&self) -> Result<Vec<ShopConfig>>;

    /// When the scheduled sweep last ran for a shop (Unix ms).
    async fn last_sweep_at(&self, id: ShopId) -> Result<Option<i64>>;

    async fn mark_swept(&self, id: ShopId, at: i64) -> Result<()>;
}

/// libSQL implementation of `CatalogRepository`
pub struct LibSqlCatalogRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlCatalogRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl CatalogRepository for LibSqlCatalogRepository<'_> {
    async fn upsert_product(&self, product: &CatalogProduct) -> Result<()> {
        let data = serde_json::to_string(product)?;
        self.conn
            .execute(
                "INSERT INTO catalog_products (id, data, updated_at) VALUES (?, ?, ?)
                 ON CONFLICT(id) DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at",
                libsql::params![product.id.get(), data, unix_millis_now()],
            )
            .await?;
        Ok(())
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<CatalogProduct>> {
        let mut rows = self
            .conn
            .query(
                "SELECT data FROM catalog_products WHERE id = ?",
                libsql::params![id.get()],
            )
            .await?;
        match rows.next().await? {
            Some(row) => {
                let data: String = row.get(0)?;
                Ok(Some(serde_json::from_str(&data)?))
            }
            None => Ok(None),
        }
    }

    async fn list_products_for_shop(&self, shop_id: ShopId) -> Result<Vec<CatalogProduct>> {
        let mut rows = self
            .conn
            .query("SELECT data FROM catalog_products ORDER BY id ASC", ())
            .await?;

        let mut products = Vec::new();
        while let Some(row) = rows.next().await? {
            let data: String = row.get(0)?;
            let product: CatalogProduct = serde_json::from_str(&data)?;
            if product.active && product.is_published_to(shop_id) {
                products.push(product);
            }
        }
        Ok(products)
    }

    async fn upsert_shop(&self, shop: &ShopConfig) -> Result<()> {
        let data = serde_json::to_string(shop)?;
        self.conn
            .execute(
                "INSERT INTO shops (id, data, updated_at) VALUES (?, ?, ?)
                 ON CONFLICT(id) DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at",
                libsql::params![shop.id.get(), data, unix_millis_now()],
            )
            .await?;
        Ok(())
    }

    async fn get_shop(&self, id: ShopId) -> Result<Option<ShopConfig>> {
        let mut rows = self
            .conn
            .query("SELECT data FROM shops WHERE id = ?", libsql::params![id.get()])
            .await?;
        match rows.next().await? {
            Some(row) => {
                let data: String = row.get(0)?;
                Ok(Some(serde_json::from_str(&data)?))
            }
            None => Ok(None),
        }
    }

    async fn list_shops(&self) -> Result<Vec<ShopConfig>> {
        let mut rows = self
            .conn
            .query("SELECT data FROM shops ORDER BY id ASC", ())
            .await?;

        let mut shops = Vec::new();
        while let Some(row) = rows.next().await? {
            let data: String = row.get(0)?;
            shops.push(serde_json::from_str(&data)?);
        }
        Ok(shops)
    }

    async fn last_sweep_at(&self, id: ShopId) -> Result<Option<i64>> {
        let mut rows = self
            .conn
            .query(
                "SELECT last_sweep_at FROM shops WHERE id = ?",
                libsql::params![id.get()],
            )
            .await?;
        match rows.next().await? {
            Some(row) => super::optional_i64(&row, 0),
            None => Ok(None),
        }
    }

    async fn mark_swept(&self, id: ShopId, at: i64) -> Result<()> {
        self.conn
            .execute(
                "UPDATE shops SET last_sweep_at = ? WHERE id = ?",
                libsql::params![at, id.get()],
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::InternalId;
    use pretty_assertions::assert_eq;
    use rust_decimal::Decimal;
    use std::collections::BTreeMap;

    fn product(id: i64, shops: &[i64], active: bool) -> CatalogProduct {
        CatalogProduct {
            id: ProductId::new(id),
            sku: format!("SKU-{id}"),
            name: format!("Product {id}"),
            prices: BTreeMap::from([(InternalId::new(1), Decimal::new(1999, 2))]),
            tax_rate: Decimal::from(23),
            tax_rate_overrides: BTreeMap::new(),
            categories: vec![InternalId::new(100)],
            primary_category: Some(InternalId::new(100)),
            stock: Vec::new(),
            active,
            shops: shops.iter().copied().map(ShopId::new).collect(),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_product_upsert_and_shop_listing() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = LibSqlCatalogRepository::new(db.connection());

        repo.upsert_product(&product(5, &[1], true)).await.unwrap();
        repo.upsert_product(&product(6, &[1, 2], true)).await.unwrap();
        repo.upsert_product(&product(7, &[1], false)).await.unwrap();
        repo.upsert_product(&product(5, &[2], true)).await.unwrap();

        let ids: Vec<i64> = repo
            .list_products_for_shop(ShopId::new(1))
            .await
            .unwrap()
            .iter()
            .map(|product| product.id.get())
            .collect();
        assert_eq!(ids, vec![6]);

        let stored = repo.get_product(ProductId::new(5)).await.unwrap().unwrap();
        assert_eq!(stored.shops, vec![ShopId::new(2)]);
        assert_eq!(stored.prices[&InternalId::new(1)], Decimal::new(1999, 2));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_shop_sweep_bookkeeping() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = LibSqlCatalogRepository::new(db.connection());
        let shop = crate::shop::testing::shop(ShopId::new(3));

        repo.upsert_shop(&shop).await.unwrap();
        assert_eq!(repo.last_sweep_at(shop.id).await.unwrap(), None);

        repo.mark_swept(shop.id, 1_700_000_000_000).await.unwrap();
        assert_eq!(
            repo.last_sweep_at(shop.id).await.unwrap(),
            Some(1_700_000_000_000)
        );

        let stored = repo.get_shop(shop.id).await.unwrap().unwrap();
        assert_eq!(stored.api_key, "test-key");
        assert_eq!(repo.list_shops().await.unwrap().len(), 1);
    }
}
