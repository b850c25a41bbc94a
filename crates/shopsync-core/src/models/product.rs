//! Catalog product model

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{InternalId, ProductId, ShopId};

/// Quantity held by one warehouse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarehouseStock {
    pub warehouse_id: InternalId,
    /// May be negative when reservations outrun physical stock
    pub available_quantity: i64,
}

/// A product as the catalog knows it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogProduct {
    pub id: ProductId,
    pub sku: String,
    pub name: String,
    /// Net price per catalog price group
    #[serde(default)]
    pub prices: BTreeMap<InternalId, Decimal>,
    /// Default tax rate in percent
    pub tax_rate: Decimal,
    /// Shop-specific tax rate in percent
    #[serde(default)]
    pub tax_rate_overrides: BTreeMap<ShopId, Decimal>,
    /// Catalog default category selection
    #[serde(default)]
    pub categories: Vec<InternalId>,
    #[serde(default)]
    pub primary_category: Option<InternalId>,
    #[serde(default)]
    pub stock: Vec<WarehouseStock>,
    #[serde(default = "default_active")]
    pub active: bool,
    /// Shops this product is published to
    #[serde(default)]
    pub shops: Vec<ShopId>,
}

const fn default_active() -> bool {
    true
}

impl CatalogProduct {
    /// Primary category of the catalog default, falling back to the first one.
    pub fn default_primary(&self) -> Option<InternalId> {
        self.primary_category
            .filter(|primary| self.categories.contains(primary))
            .or_else(|| self.categories.first().copied())
    }

    /// Shop override first, then the product default.
    pub fn effective_tax_rate(&self, shop_id: ShopId) -> Decimal {
        self.tax_rate_overrides
            .get(&shop_id)
            .copied()
            .unwrap_or(self.tax_rate)
    }

    pub fn is_published_to(&self, shop_id: ShopId) -> bool {
        self.shops.contains(&shop_id)
    }
}
