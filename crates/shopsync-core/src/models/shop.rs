//! Shop configuration model

use std::fmt;

use serde::{Deserialize, Serialize};

use super::{ExternalId, InternalId, ShopId};
use crate::jobs::SyncSchedule;

/// External API generation a shop speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiVersion {
    #[default]
    V8,
    V9,
}

impl ApiVersion {
    /// Derive the API generation from a reported platform version string.
    ///
    /// `1.7.x`, `1.8.x` and `8.x` speak the v8 webservice; `9.x` the v9 API.
    /// Anything unrecognized falls back to v8.
    pub fn from_platform_version(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.starts_with('9') {
            Self::V9
        } else {
            Self::V8
        }
    }
}

/// External tax rules group for each standard tax bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TaxRulesGroups {
    #[serde(default)]
    pub rate_23: Option<ExternalId>,
    #[serde(default)]
    pub rate_8: Option<ExternalId>,
    #[serde(default)]
    pub rate_5: Option<ExternalId>,
    #[serde(default)]
    pub rate_0: Option<ExternalId>,
}

/// Which warehouses feed the quantity a shop sees.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum WarehouseSelection {
    /// Sum across every warehouse
    #[default]
    All,
    /// Sum across the listed warehouses only
    Subset { warehouses: Vec<InternalId> },
    /// First listed warehouse with stock wins
    Priority { warehouses: Vec<InternalId> },
}

/// One external storefront instance
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShopConfig {
    pub id: ShopId,
    pub name: String,
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_version: ApiVersion,
    #[serde(default)]
    pub tax_rules_groups: TaxRulesGroups,
    /// Catalog price group whose net price the shop receives
    pub default_price_group: InternalId,
    #[serde(default)]
    pub warehouses: WarehouseSelection,
    /// Shop-side root categories, never mapped into the catalog
    #[serde(default = "default_root_categories")]
    pub root_categories: Vec<ExternalId>,
    #[serde(default)]
    pub schedule: Option<SyncSchedule>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_root_categories() -> Vec<ExternalId> {
    vec![ExternalId::new(1), ExternalId::new(2)]
}

const fn default_active() -> bool {
    true
}

impl ShopConfig {
    pub fn is_root_category(&self, id: ExternalId) -> bool {
        self.root_categories.contains(&id)
    }
}

impl fmt::Debug for ShopConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ShopConfig")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .field("api_version", &self.api_version)
            .field("tax_rules_groups", &self.tax_rules_groups)
            .field("default_price_group", &self.default_price_group)
            .field("warehouses", &self.warehouses)
            .field("root_categories", &self.root_categories)
            .field("schedule", &self.schedule)
            .field("active", &self.active)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_version_from_platform_version() {
        assert_eq!(ApiVersion::from_platform_version("1.7.8.11"), ApiVersion::V8);
        assert_eq!(ApiVersion::from_platform_version("8.1.2"), ApiVersion::V8);
        assert_eq!(ApiVersion::from_platform_version("9.0.0"), ApiVersion::V9);
        assert_eq!(ApiVersion::from_platform_version(""), ApiVersion::V8);
    }

    #[test]
    fn test_shop_config_defaults() {
        let shop: ShopConfig = serde_json::from_str(
            r#"{"id": 1, "name": "B2C", "base_url": "https://shop.example.com", "default_price_group": 1}"#,
        )
        .unwrap();
        assert_eq!(shop.api_version, ApiVersion::V8);
        assert_eq!(shop.warehouses, WarehouseSelection::All);
        assert!(shop.is_root_category(ExternalId::new(2)));
        assert!(shop.active);
    }

    #[test]
    fn test_shop_config_debug_redacts_api_key() {
        let shop = ShopConfig {
            id: ShopId::new(1),
            name: "B2C".to_string(),
            base_url: "https://shop.example.com".to_string(),
            api_key: "secret-ws-key".to_string(),
            api_version: ApiVersion::V8,
            tax_rules_groups: TaxRulesGroups::default(),
            default_price_group: InternalId::new(1),
            warehouses: WarehouseSelection::All,
            root_categories: default_root_categories(),
            schedule: None,
            active: true,
        };
        let debug = format!("{shop:?}");
        assert!(!debug.contains("secret-ws-key"));
        assert!(debug.contains("[REDACTED]"));
    }
}
