use serde_json::json;
use shopsync_core::identity::IdentityMap;
use shopsync_core::models::{IdentityMapping, Resolution};
use shopsync_core::DatabaseService;

use crate::cli::MapCommands;
use crate::commands::common::print_json;
use crate::error::CliError;

pub async fn run_map(
    db: &DatabaseService,
    command: MapCommands,
    as_json: bool,
) -> Result<(), CliError> {
    // Operator edits write mappings directly; jobs load the index when they run
    match command {
        MapCommands::Associate {
            entity,
            shop,
            internal,
            external,
        } => {
            let mapping = db.associate(entity, shop, internal, external).await?;
            if as_json {
                print_json(&mapping)?;
            } else {
                println!("{}", format_mapping(&mapping));
            }
        }
        MapCommands::Deactivate {
            entity,
            shop,
            internal,
        } => {
            let deactivated = db.deactivate(entity, shop, internal).await?;
            if as_json {
                print_json(&json!({ "deactivated": deactivated }))?;
            } else if deactivated {
                println!("Deactivated {} {internal} in shop {shop}", entity.as_str());
            } else {
                println!("No active {} mapping for {internal} in shop {shop}", entity.as_str());
            }
        }
        MapCommands::Resolve {
            entity,
            shop,
            internal,
            external,
        } => {
            let line = match (internal, external) {
                (Some(internal), _) => {
                    let resolution = db.resolve_external(entity, shop, internal).await?;
                    if as_json {
                        return print_json(&resolution);
                    }
                    describe_resolution(&internal.to_string(), resolution)
                }
                (None, Some(external)) => {
                    let resolution = db.resolve_internal(entity, shop, external).await?;
                    if as_json {
                        return print_json(&resolution);
                    }
                    describe_resolution(&external.to_string(), resolution)
                }
                (None, None) => "Pass --internal or --external".to_string(),
            };
            println!("{line}");
        }
        MapCommands::List { entity, shop } => {
            let mappings = db.list(entity, shop).await?;
            if as_json {
                print_json(&mappings)?;
            } else if mappings.is_empty() {
                println!("No {} mappings in shop {shop}", entity.as_str());
            } else {
                for mapping in &mappings {
                    println!("{}", format_mapping(mapping));
                }
            }
        }
    }
    Ok(())
}

pub fn format_mapping(mapping: &IdentityMapping) -> String {
    let state = if mapping.active { "active" } else { "inactive" };
    format!(
        "{} {} -> {} (shop {}, {state})",
        mapping.entity_type.as_str(),
        mapping.internal_id,
        mapping.external_id,
        mapping.shop_id
    )
}

fn describe_resolution<T: std::fmt::Display>(from: &str, resolution: Resolution<T>) -> String {
    match resolution {
        Resolution::Mapped(id) => format!("{from} -> {id}"),
        Resolution::Inactive(id) => format!("{from} -> {id} (inactive)"),
        Resolution::Unmapped => format!("{from} is unmapped"),
    }
}
