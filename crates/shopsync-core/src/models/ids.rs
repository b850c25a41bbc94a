//! Identifier types
//!
//! Catalog, shop and external ids are all integers on the wire, but payloads
//! coming from shops and from older override documents carry them as strings
//! just as often. Every numeric id therefore deserializes from either form and
//! always serializes as a number.

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(i64);

        impl $name {
            #[must_use]
            pub const fn new(value: i64) -> Self {
                Self(value)
            }

            #[must_use]
            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                parse_loose_i64(s)
                    .map(Self)
                    .ok_or_else(|| format!("invalid {}: {s:?}", $label))
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_i64(self.0)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                deserializer
                    .deserialize_any(LooseIdVisitor { label: $label })
                    .map(Self)
            }
        }
    };
}

numeric_id!(
    /// Identifier in the catalog's own ID space (category, price group, warehouse, ...)
    InternalId,
    "internal id"
);
numeric_id!(
    /// Identifier in one shop's own ID space
    ExternalId,
    "external id"
);
numeric_id!(
    /// Catalog product identifier
    ProductId,
    "product id"
);
numeric_id!(
    /// Configured shop identifier
    ShopId,
    "shop id"
);

impl From<ProductId> for InternalId {
    fn from(value: ProductId) -> Self {
        Self(value.get())
    }
}

fn parse_loose_i64(raw: &str) -> Option<i64> {
    let trimmed = raw.trim();
    if let Ok(value) = trimmed.parse::<i64>() {
        return Some(value);
    }
    // "9.0" shows up in payloads that went through a float column
    let value = trimmed.parse::<f64>().ok()?;
    float_to_id(value)
}

#[allow(clippy::cast_possible_truncation)]
fn float_to_id(value: f64) -> Option<i64> {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 9.0e15 {
        Some(value as i64)
    } else {
        None
    }
}

struct LooseIdVisitor {
    label: &'static str,
}

impl Visitor<'_> for LooseIdVisitor {
    type Value = i64;

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "an integer {} or a numeric string", self.label)
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<i64, E> {
        Ok(value)
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<i64, E> {
        i64::try_from(value).map_err(|_| E::custom(format!("{} out of range", self.label)))
    }

    fn visit_f64<E: de::Error>(self, value: f64) -> Result<i64, E> {
        float_to_id(value).ok_or_else(|| E::custom(format!("{} must be integral", self.label)))
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<i64, E> {
        parse_loose_i64(value).ok_or_else(|| E::invalid_value(de::Unexpected::Str(value), &self))
    }
}

/// A unique identifier for a sync job, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(Uuid);

impl JobId {
    /// Create a new unique job ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Kind of entity an identity mapping translates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Category,
    Product,
    PriceGroup,
    Warehouse,
    TaxRuleGroup,
}

impl EntityType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Category => "category",
            Self::Product => "product",
            Self::PriceGroup => "price_group",
            Self::Warehouse => "warehouse",
            Self::TaxRuleGroup => "tax_rule_group",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "category" => Ok(Self::Category),
            "product" => Ok(Self::Product),
            "price_group" => Ok(Self::PriceGroup),
            "warehouse" => Ok(Self::Warehouse),
            "tax_rule_group" => Ok(Self::TaxRuleGroup),
            other => Err(format!("unknown entity type: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_job_id_parse() {
        let id = JobId::new();
        let parsed: JobId = id.as_str().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_numeric_id_accepts_strings_and_numbers() {
        let ids: Vec<InternalId> = serde_json::from_str(r#"[1, "2", " 3 ", 4.0]"#).unwrap();
        assert_eq!(
            ids,
            vec![
                InternalId::new(1),
                InternalId::new(2),
                InternalId::new(3),
                InternalId::new(4)
            ]
        );
    }

    #[test]
    fn test_numeric_id_rejects_garbage() {
        assert!(serde_json::from_str::<ExternalId>(r#""abc""#).is_err());
        assert!(serde_json::from_str::<ExternalId>("1.5").is_err());
        assert!("x".parse::<ShopId>().is_err());
    }

    #[test]
    fn test_numeric_id_map_keys_round_trip_as_strings() {
        let mut map = BTreeMap::new();
        map.insert(InternalId::new(100), ExternalId::new(9));
        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"{"100":9}"#);

        let back: BTreeMap<InternalId, ExternalId> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, map);
    }

    #[test]
    fn test_entity_type_parse() {
        assert_eq!("Category".parse::<EntityType>(), Ok(EntityType::Category));
        assert_eq!(
            "tax_rule_group".parse::<EntityType>(),
            Ok(EntityType::TaxRuleGroup)
        );
        assert!("shop".parse::<EntityType>().is_err());
    }
}
