//! Shop-facing stock quantity from per-warehouse figures

use std::collections::BTreeMap;

use crate::models::{CatalogProduct, InternalId, ShopConfig, WarehouseSelection, WarehouseStock};

/// Quantity the shop should show for `product`.
pub fn resolve_quantity(product: &CatalogProduct, shop: &ShopConfig) -> i64 {
    quantity_for(&product.stock, &shop.warehouses)
}

/// Negative warehouse figures count as zero before anything is summed.
pub fn quantity_for(stock: &[WarehouseStock], selection: &WarehouseSelection) -> i64 {
    let per_warehouse = clamped_totals(stock);

    match selection {
        WarehouseSelection::All => saturating_total(per_warehouse.values()),
        WarehouseSelection::Subset { warehouses } => {
            let mut listed = warehouses.clone();
            listed.sort_unstable();
            listed.dedup();
            saturating_total(
                listed
                    .iter()
                    .filter_map(|warehouse| per_warehouse.get(warehouse)),
            )
        }
        WarehouseSelection::Priority { warehouses } => warehouses
            .iter()
            .filter_map(|warehouse| per_warehouse.get(warehouse).copied())
            .find(|quantity| *quantity > 0)
            .unwrap_or(0),
    }
}

fn saturating_total<'a>(quantities: impl Iterator<Item = &'a i64>) -> i64 {
    quantities.fold(0_i64, |total, quantity| total.saturating_add(*quantity))
}

fn clamped_totals(stock: &[WarehouseStock]) -> BTreeMap<InternalId, i64> {
    let mut totals = BTreeMap::new();
    for row in stock {
        let entry = totals.entry(row.warehouse_id).or_insert(0_i64);
        *entry = entry.saturating_add(row.available_quantity.max(0));
    }
    totals
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stock(rows: &[(i64, i64)]) -> Vec<WarehouseStock> {
        rows.iter()
            .map(|(warehouse, quantity)| WarehouseStock {
                warehouse_id: InternalId::new(*warehouse),
                available_quantity: *quantity,
            })
            .collect()
    }

    fn ids(raw: &[i64]) -> Vec<InternalId> {
        raw.iter().copied().map(InternalId::new).collect()
    }

    #[test]
    fn test_all_warehouses_clamp_negatives() {
        let rows = stock(&[(1, 10), (2, -4), (3, 5)]);
        assert_eq!(quantity_for(&rows, &WarehouseSelection::All), 15);
    }

    #[test]
    fn test_totals_across_warehouses_saturate() {
        let rows = stock(&[(1, i64::MAX), (2, 5)]);
        assert_eq!(quantity_for(&rows, &WarehouseSelection::All), i64::MAX);

        let selection = WarehouseSelection::Subset {
            warehouses: ids(&[1, 2]),
        };
        assert_eq!(quantity_for(&rows, &selection), i64::MAX);
    }

    #[test]
    fn test_empty_stock_is_zero() {
        assert_eq!(quantity_for(&[], &WarehouseSelection::All), 0);
    }

    #[test]
    fn test_subset_only_counts_listed_warehouses() {
        let rows = stock(&[(1, 10), (2, 7), (3, 5)]);
        let selection = WarehouseSelection::Subset {
            warehouses: ids(&[1, 3, 3, 99]),
        };
        assert_eq!(quantity_for(&rows, &selection), 15);
    }

    #[test]
    fn test_priority_takes_first_warehouse_with_stock() {
        let rows = stock(&[(1, -2), (2, 0), (3, 8), (4, 20)]);
        let selection = WarehouseSelection::Priority {
            warehouses: ids(&[1, 2, 3, 4]),
        };
        assert_eq!(quantity_for(&rows, &selection), 8);

        let empty = WarehouseSelection::Priority {
            warehouses: ids(&[1, 2]),
        };
        assert_eq!(quantity_for(&rows, &empty), 0);
    }

    #[test]
    fn test_duplicate_rows_for_one_warehouse_are_summed() {
        let rows = stock(&[(1, 4), (1, -10), (1, 3)]);
        assert_eq!(quantity_for(&rows, &WarehouseSelection::All), 7);
    }
}
