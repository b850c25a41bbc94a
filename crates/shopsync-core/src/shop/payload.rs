//! Product payloads per shop API version.
//!
//! Every shop response goes through [`ExternalProduct`] into the typed
//! [`ShopProductState`]; every outgoing body is rendered from the typed
//! [`ProductPayload`].

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Map, Value};

use crate::convert::to_external_ids;
use crate::error::{Error, Result};
use crate::models::{ApiVersion, CatalogProduct, ExternalId, OverrideDocument, ShopConfig};
use crate::pricing::resolve_price;
use crate::stock::resolve_quantity;
use crate::validate::ProductFields;

/// Language the catalog writes names in.
const DEFAULT_LANGUAGE: i64 = 1;

/// What a push sends to a shop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductPayload {
    pub sku: String,
    pub name: String,
    pub price_net: Decimal,
    pub tax_rules_group: ExternalId,
    pub active: bool,
    pub quantity: i64,
    /// Root categories first, then the selection with the primary leading
    pub category_ids: Vec<ExternalId>,
    pub default_category: ExternalId,
}

impl ProductPayload {
    /// Assemble the payload for `product` in `shop` from its resolved
    /// category document.
    pub fn build(
        product: &CatalogProduct,
        shop: &ShopConfig,
        categories: &OverrideDocument,
    ) -> Result<Self> {
        let price = resolve_price(product, shop)?;

        let default_category = categories
            .primary_external()
            .or_else(|| shop.root_categories.last().copied())
            .ok_or_else(|| {
                Error::Payload(format!(
                    "product {} has no default category in shop {}",
                    product.id, shop.id
                ))
            })?;

        let mut category_ids = shop.root_categories.clone();
        for id in to_external_ids(categories, true) {
            if !category_ids.contains(&id) {
                category_ids.push(id);
            }
        }

        Ok(Self {
            sku: product.sku.clone(),
            name: product.name.trim().to_string(),
            price_net: price.net,
            tax_rules_group: price.tax_rules_group,
            active: product.active,
            quantity: resolve_quantity(product, shop),
            category_ids,
            default_category,
        })
    }

    /// Fields actually sent, as recorded on the job.
    pub fn synced_data(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn fields(&self, roots: &[ExternalId]) -> ProductFields {
        ProductFields {
            name: self.name.clone(),
            price: Some(self.price_net),
            quantity: self.quantity,
            category_count: count_non_root(&self.category_ids, roots),
            active: self.active,
        }
    }

    #[cfg(test)]
    pub(crate) fn sample() -> Self {
        Self {
            sku: "SKU-5".to_string(),
            name: "Brake pad".to_string(),
            price_net: Decimal::new(10000, 2),
            tax_rules_group: ExternalId::new(1),
            active: true,
            quantity: 12,
            category_ids: vec![ExternalId::new(1), ExternalId::new(2), ExternalId::new(15)],
            default_category: ExternalId::new(15),
        }
    }
}

/// Product state as reported by a shop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShopProductState {
    pub external_id: Option<ExternalId>,
    pub sku: Option<String>,
    pub name: String,
    pub price_net: Option<Decimal>,
    pub quantity: i64,
    pub active: bool,
    pub category_ids: Vec<ExternalId>,
    pub default_category: Option<ExternalId>,
    pub tax_rules_group: Option<ExternalId>,
}

impl ShopProductState {
    pub fn fields(&self, roots: &[ExternalId]) -> ProductFields {
        ProductFields {
            name: self.name.clone(),
            price: self.price_net,
            quantity: self.quantity,
            category_count: count_non_root(&self.category_ids, roots),
            active: self.active,
        }
    }
}

fn count_non_root(ids: &[ExternalId], roots: &[ExternalId]) -> usize {
    ids.iter().filter(|id| !roots.contains(id)).count()
}

/// A product body in the shape one API version uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExternalProduct {
    /// Webservice shape: numbers and flags as strings, multilingual names
    V8(V8Product),
    /// JSON API shape: native numbers and booleans
    V9(V9Product),
}

impl ExternalProduct {
    /// Parse a response body. Accepts the `{"product": {...}}` envelope or a
    /// bare product object.
    pub fn parse(version: ApiVersion, body: &Value) -> Result<Self> {
        let product = body.get("product").unwrap_or(body);
        if !product.is_object() {
            return Err(Error::Payload(format!(
                "shop returned a {version:?} product body that is not an object"
            )));
        }

        let parsed = match version {
            ApiVersion::V8 => V8Product::deserialize(product).map(Self::V8),
            ApiVersion::V9 => V9Product::deserialize(product).map(Self::V9),
        };
        parsed.map_err(|error| Error::Payload(format!("unreadable {version:?} product: {error}")))
    }

    pub fn into_state(self) -> ShopProductState {
        match self {
            Self::V8(product) => ShopProductState {
                external_id: product.id,
                sku: product.reference,
                name: product.name.map(MultilangText::into_default).unwrap_or_default(),
                price_net: product.price,
                quantity: product.quantity,
                active: product.active,
                category_ids: product.associations.ids(),
                default_category: product.id_category_default,
                tax_rules_group: product.id_tax_rules_group,
            },
            Self::V9(product) => ShopProductState {
                external_id: product.id,
                sku: product.reference,
                name: product.name.map(MultilangText::into_default).unwrap_or_default(),
                price_net: product.price,
                quantity: product.quantity,
                active: product.active,
                category_ids: product.associations.ids(),
                default_category: product.id_category_default,
                tax_rules_group: product.id_tax_rules_group,
            },
        }
    }

    /// Render a request body for `version`.
    pub fn render(version: ApiVersion, id: Option<ExternalId>, payload: &ProductPayload) -> Value {
        let mut product = match version {
            ApiVersion::V8 => render_v8(payload),
            ApiVersion::V9 => render_v9(payload),
        };
        if let Some(id) = id {
            let id = match version {
                ApiVersion::V8 => json!(id.to_string()),
                ApiVersion::V9 => json!(id.get()),
            };
            product.insert("id".to_string(), id);
        }
        json!({ "product": Value::Object(product) })
    }
}

fn render_v8(payload: &ProductPayload) -> Map<String, Value> {
    let categories: Vec<Value> = payload
        .category_ids
        .iter()
        .map(|id| json!({ "id": id.to_string() }))
        .collect();

    let body = json!({
        "reference": payload.sku,
        "name": [{ "id": DEFAULT_LANGUAGE.to_string(), "value": payload.name }],
        "price": payload.price_net.to_string(),
        "active": if payload.active { "1" } else { "0" },
        "quantity": payload.quantity.to_string(),
        "id_category_default": payload.default_category.to_string(),
        "id_tax_rules_group": payload.tax_rules_group.to_string(),
        "state": "1",
        "minimal_quantity": "1",
        "associations": { "categories": categories },
    });
    into_map(body)
}

fn render_v9(payload: &ProductPayload) -> Map<String, Value> {
    let categories: Vec<Value> = payload
        .category_ids
        .iter()
        .map(|id| json!({ "id": id.get() }))
        .collect();
    let price = serde_json::Number::from_str(&payload.price_net.to_string())
        .map_or(Value::Null, Value::Number);

    let body = json!({
        "reference": payload.sku,
        "name": payload.name,
        "price": price,
        "active": payload.active,
        "quantity": payload.quantity,
        "id_category_default": payload.default_category.get(),
        "id_tax_rules_group": payload.tax_rules_group.get(),
        "state": 1,
        "minimal_quantity": 1,
        "associations": { "categories": categories },
    });
    into_map(body)
}

fn into_map(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct V8Product {
    #[serde(default)]
    id: Option<ExternalId>,
    #[serde(default)]
    reference: Option<String>,
    #[serde(default)]
    name: Option<MultilangText>,
    #[serde(default, deserialize_with = "loose_decimal")]
    price: Option<Decimal>,
    #[serde(default, deserialize_with = "loose_flag")]
    active: bool,
    #[serde(default, deserialize_with = "loose_count")]
    quantity: i64,
    #[serde(default)]
    id_category_default: Option<ExternalId>,
    #[serde(default)]
    id_tax_rules_group: Option<ExternalId>,
    #[serde(default)]
    associations: Associations,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct V9Product {
    #[serde(default)]
    id: Option<ExternalId>,
    #[serde(default)]
    reference: Option<String>,
    #[serde(default)]
    name: Option<MultilangText>,
    #[serde(default)]
    price: Option<Decimal>,
    #[serde(default)]
    active: bool,
    #[serde(default)]
    quantity: i64,
    #[serde(default)]
    id_category_default: Option<ExternalId>,
    #[serde(default)]
    id_tax_rules_group: Option<ExternalId>,
    #[serde(default)]
    associations: Associations,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
struct Associations {
    #[serde(default)]
    categories: Vec<IdRef>,
}

impl Associations {
    fn ids(&self) -> Vec<ExternalId> {
        self.categories.iter().map(|category| category.id).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
struct IdRef {
    id: ExternalId,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
enum MultilangText {
    Plain(String),
    Languages(Vec<LanguageValue>),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
struct LanguageValue {
    id: ExternalId,
    #[serde(default)]
    value: String,
}

impl MultilangText {
    fn into_default(self) -> String {
        match self {
            Self::Plain(text) => text,
            Self::Languages(values) => {
                let position = values
                    .iter()
                    .position(|value| value.id.get() == DEFAULT_LANGUAGE)
                    .unwrap_or(0);
                values
                    .into_iter()
                    .nth(position)
                    .map(|value| value.value)
                    .unwrap_or_default()
            }
        }
    }
}

fn loose_decimal<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Option<Decimal>, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::String(text) if text.trim().is_empty() => Ok(None),
        Value::String(text) => Decimal::from_str(text.trim())
            .map(Some)
            .map_err(serde::de::Error::custom),
        Value::Number(number) => Decimal::from_str(&number.to_string())
            .map(Some)
            .map_err(serde::de::Error::custom),
        other => Err(serde::de::Error::custom(format!("expected a price, got {other}"))),
    }
}

fn loose_flag<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<bool, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Bool(flag) => Ok(flag),
        Value::Number(number) => Ok(number.as_i64().is_some_and(|value| value != 0)),
        Value::String(text) => Ok(matches!(text.trim(), "1" | "true")),
        Value::Null => Ok(false),
        other => Err(serde::de::Error::custom(format!("expected a flag, got {other}"))),
    }
}

fn loose_count<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<i64, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Number(number) => number
            .as_i64()
            .ok_or_else(|| serde::de::Error::custom(format!("expected an integer, got {number}"))),
        Value::String(text) if text.trim().is_empty() => Ok(0),
        Value::String(text) => text.trim().parse().map_err(serde::de::Error::custom),
        Value::Null => Ok(0),
        other => Err(serde::de::Error::custom(format!("expected a quantity, got {other}"))),
    }
}
