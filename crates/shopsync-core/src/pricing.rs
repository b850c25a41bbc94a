//! Tax bucketing and shop-facing price resolution

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::{CatalogProduct, ExternalId, ShopConfig};

/// Standard tax rates a shop configures a rules group for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxBucket {
    Rate23,
    Rate8,
    Rate5,
    Rate0,
}

impl TaxBucket {
    /// Bucket a rate in percent. Rates between standard values round down to
    /// the nearest standard rate.
    pub fn for_rate(rate: Decimal) -> Self {
        if rate >= Decimal::from(23) {
            Self::Rate23
        } else if rate >= Decimal::from(8) {
            Self::Rate8
        } else if rate >= Decimal::from(5) {
            Self::Rate5
        } else {
            Self::Rate0
        }
    }

    pub fn rate(self) -> Decimal {
        match self {
            Self::Rate23 => Decimal::from(23),
            Self::Rate8 => Decimal::from(8),
            Self::Rate5 => Decimal::from(5),
            Self::Rate0 => Decimal::ZERO,
        }
    }

    pub const fn group_in(self, shop: &ShopConfig) -> Option<ExternalId> {
        let groups = &shop.tax_rules_groups;
        match self {
            Self::Rate23 => groups.rate_23,
            Self::Rate8 => groups.rate_8,
            Self::Rate5 => groups.rate_5,
            Self::Rate0 => groups.rate_0,
        }
    }
}

/// Shop tax rules group for a rate.
pub fn tax_rules_group(shop: &ShopConfig, rate: Decimal) -> Result<ExternalId> {
    let bucket = TaxBucket::for_rate(rate);
    bucket.group_in(shop).ok_or_else(|| {
        Error::Payload(format!(
            "shop {} has no tax rules group configured for {}%",
            shop.id,
            bucket.rate()
        ))
    })
}

/// Reverse of [`tax_rules_group`], used when reading shop state.
pub fn rate_for_group(shop: &ShopConfig, group: ExternalId) -> Option<Decimal> {
    [
        TaxBucket::Rate23,
        TaxBucket::Rate8,
        TaxBucket::Rate5,
        TaxBucket::Rate0,
    ]
    .into_iter()
    .find(|bucket| bucket.group_in(shop) == Some(group))
    .map(TaxBucket::rate)
}

pub fn gross_from_net(net: Decimal, rate: Decimal) -> Decimal {
    let gross = net * (Decimal::ONE + rate / Decimal::ONE_HUNDRED);
    gross.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Price figures a shop receives for one product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedPrice {
    pub net: Decimal,
    pub gross: Decimal,
    pub tax_rate: Decimal,
    pub tax_rules_group: ExternalId,
}

/// Net price from the shop's default price group; tax from the shop
/// override, falling back to the product default.
pub fn resolve_price(product: &CatalogProduct, shop: &ShopConfig) -> Result<ResolvedPrice> {
    let net = *product.prices.get(&shop.default_price_group).ok_or_else(|| {
        Error::Payload(format!(
            "product {} has no price in group {} used by shop {}",
            product.id, shop.default_price_group, shop.id
        ))
    })?;
    let tax_rate = product.effective_tax_rate(shop.id);
    let tax_rules_group = tax_rules_group(shop, tax_rate)?;

    Ok(ResolvedPrice {
        net: net.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero),
        gross: gross_from_net(net, tax_rate),
        tax_rate,
        tax_rules_group,
    })
}
