//! Cross-check what the catalog holds against what a shop holds.
//!
//! Findings are advisory. Nothing here fails a sync.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::models::{Severity, ValidationFinding};

/// The fields compared between catalog and shop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductFields {
    pub name: String,
    /// Net price; `None` when it could not be determined
    pub price: Option<Decimal>,
    pub quantity: i64,
    pub category_count: usize,
    pub active: bool,
}

/// Relative price deviation above which a finding becomes an error.
const PRICE_ERROR_RATIO: Decimal = Decimal::from_parts(10, 0, 0, false, 2);
/// Relative price deviation from which a warning is raised.
const PRICE_WARNING_RATIO: Decimal = Decimal::from_parts(5, 0, 0, false, 2);

pub fn validate(internal: &ProductFields, external: &ProductFields) -> Vec<ValidationFinding> {
    let mut findings = Vec::new();

    if internal.name.trim() != external.name.trim() {
        findings.push(finding(
            "name",
            Severity::Warning,
            "Name differs between catalog and shop".to_string(),
            json!(internal.name),
            json!(external.name),
        ));
    }

    if let (Some(internal_price), Some(external_price)) = (internal.price, external.price) {
        if let Some(finding) = price_finding(internal_price, external_price) {
            findings.push(finding);
        }
    }

    if internal.quantity != external.quantity {
        findings.push(finding(
            "quantity",
            Severity::Info,
            format!(
                "Stock differs by {}",
                external.quantity.saturating_sub(internal.quantity)
            ),
            json!(internal.quantity),
            json!(external.quantity),
        ));
    }

    if internal.category_count > 0 && external.category_count == 0 {
        findings.push(finding(
            "categories",
            Severity::Warning,
            "Shop has no categories assigned".to_string(),
            json!(internal.category_count),
            json!(external.category_count),
        ));
    }

    if internal.active && !external.active {
        findings.push(finding(
            "active",
            Severity::Info,
            "Product is inactive in the shop".to_string(),
            json!(internal.active),
            json!(external.active),
        ));
    }

    findings
}

fn price_finding(internal: Decimal, external: Decimal) -> Option<ValidationFinding> {
    if internal == external {
        return None;
    }

    let severity = if internal.is_zero() {
        Severity::Error
    } else {
        let ratio = ((external - internal) / internal).abs();
        if ratio > PRICE_ERROR_RATIO {
            Severity::Error
        } else if ratio >= PRICE_WARNING_RATIO {
            Severity::Warning
        } else {
            return None;
        }
    };

    let message = if internal.is_zero() {
        "Shop price set while catalog price is zero".to_string()
    } else {
        let percent = ((external - internal) / internal * Decimal::ONE_HUNDRED).round_dp(1);
        format!("Shop price deviates by {percent}%")
    };

    Some(finding(
        "price",
        severity,
        message,
        json!(internal.to_string()),
        json!(external.to_string()),
    ))
}

fn finding(
    field: &str,
    severity: Severity,
    message: String,
    internal_value: Value,
    external_value: Value,
) -> ValidationFinding {
    ValidationFinding {
        field: field.to_string(),
        severity,
        message,
        internal_value,
        external_value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn fields(price: Decimal) -> ProductFields {
        ProductFields {
            name: "Brake pad".to_string(),
            price: Some(price),
            quantity: 10,
            category_count: 2,
            active: true,
        }
    }

    fn price_findings(internal: i64, external: i64) -> Vec<ValidationFinding> {
        validate(
            &fields(Decimal::new(internal * 100, 2)),
            &fields(Decimal::new(external * 100, 2)),
        )
        .into_iter()
        .filter(|finding| finding.field == "price")
        .collect()
    }

    #[test]
    fn test_price_thresholds() {
        let large = price_findings(100, 125);
        assert_eq!(large.len(), 1);
        assert_eq!(large[0].severity, Severity::Error);

        let medium = price_findings(100, 107);
        assert_eq!(medium.len(), 1);
        assert_eq!(medium[0].severity, Severity::Warning);

        assert!(price_findings(100, 103).is_empty());
    }

    #[test]
    fn test_price_threshold_boundaries() {
        assert_eq!(price_findings(100, 110)[0].severity, Severity::Warning);
        assert_eq!(price_findings(100, 105)[0].severity, Severity::Warning);
        assert_eq!(price_findings(100, 89)[0].severity, Severity::Error);
        assert_eq!(price_findings(0, 5)[0].severity, Severity::Error);
    }

    #[test]
    fn test_identical_records_have_no_findings() {
        let record = fields(Decimal::new(10000, 2));
        assert!(validate(&record, &record).is_empty());
    }

    #[test]
    fn test_name_compares_trimmed_and_case_sensitive() {
        let internal = fields(Decimal::ONE);
        let mut external = fields(Decimal::ONE);
        external.name = "  Brake pad ".to_string();
        assert!(validate(&internal, &external).is_empty());

        external.name = "brake pad".to_string();
        let findings = validate(&internal, &external);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].field, "name");
        assert_eq!(findings[0].severity, Severity::Warning);
    }

    #[test]
    fn test_stock_categories_and_active() {
        let internal = fields(Decimal::ONE);
        let external = ProductFields {
            quantity: 7,
            category_count: 0,
            active: false,
            ..fields(Decimal::ONE)
        };
        let findings = validate(&internal, &external);
        let summary: Vec<(&str, Severity)> = findings
            .iter()
            .map(|finding| (finding.field.as_str(), finding.severity))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("quantity", Severity::Info),
                ("categories", Severity::Warning),
                ("active", Severity::Info),
            ]
        );
    }

    #[test]
    fn test_unknown_price_is_not_compared() {
        let internal = ProductFields {
            price: None,
            ..fields(Decimal::ONE)
        };
        assert!(validate(&internal, &fields(Decimal::from(500))).is_empty());
    }
}
