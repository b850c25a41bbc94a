use std::path::Path;

use serde::de::DeserializeOwned;
use shopsync_core::models::{CatalogProduct, ShopConfig};
use shopsync_core::DatabaseService;

use crate::error::CliError;

pub async fn run_import_products(db: &DatabaseService, path: &Path) -> Result<usize, CliError> {
    let products: Vec<CatalogProduct> = read_records(path)?;
    for product in &products {
        db.upsert_product(product).await?;
    }
    tracing::info!(count = products.len(), "Imported catalog products");
    println!("Imported {} products", products.len());
    Ok(products.len())
}

pub async fn run_import_shops(db: &DatabaseService, path: &Path) -> Result<usize, CliError> {
    let shops: Vec<ShopConfig> = read_records(path)?;
    for shop in &shops {
        db.upsert_shop(shop).await?;
    }
    tracing::info!(count = shops.len(), "Imported shops");
    println!("Imported {} shops", shops.len());
    Ok(shops.len())
}

fn read_records<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, CliError> {
    let raw = std::fs::read_to_string(path)?;
    let records: Vec<T> = serde_json::from_str(&raw).map_err(|error| CliError::Import {
        path: path.to_path_buf(),
        message: error.to_string(),
    })?;
    if records.is_empty() {
        return Err(CliError::EmptyImport(path.to_path_buf()));
    }
    Ok(records)
}
