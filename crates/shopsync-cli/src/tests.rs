use std::io::Write;
use std::path::{Path, PathBuf};

use clap::{CommandFactory, Parser};
use pretty_assertions::assert_eq;
use shopsync_core::db::JobFilter;
use shopsync_core::diff::{OverrideState, OverrideStatus, SelectionDiff};
use shopsync_core::identity::IdentityMap;
use shopsync_core::models::{
    Direction, EntityType, ExternalId, InternalId, JobStatus, Resolution, SyncJob, TriggerKind,
};
use shopsync_core::{DatabaseService, EngineConfig, Error, ProductId, ShopId};
use tempfile::TempDir;

use crate::cli::{Cli, Commands, CompletionShell, MapCommands, OverrideCommands};
use crate::commands::common::{
    build_orchestrator, format_job_lines, format_relative_time, open_service, resolve_config,
};
use crate::commands::completions::render_completions;
use crate::commands::import::{run_import_products, run_import_shops};
use crate::commands::inspect::{format_override_status, run_override_status};
use crate::commands::jobs::{run_cancel, run_jobs, run_override_edit, run_request, run_retry};
use crate::commands::map::run_map;
use crate::error::CliError;

const PRODUCTS: &str = r#"[
  {
    "id": 5,
    "sku": "SKU-5",
    "name": "Brake pad",
    "prices": {"1": "100.00"},
    "tax_rate": "23",
    "categories": [100, 103],
    "primary_category": 103,
    "stock": [{"warehouse_id": 1, "available_quantity": 12}],
    "shops": [1]
  }
]"#;

const SHOPS: &str = r#"[
  {
    "id": 1,
    "name": "B2C",
    "base_url": "https://shop.invalid",
    "api_key": "key",
    "tax_rules_groups": {"rate_23": 1, "rate_8": 2, "rate_5": 3, "rate_0": 4},
    "default_price_group": 1
  }
]"#;

fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    path
}

fn test_config(dir: &TempDir) -> EngineConfig {
    EngineConfig {
        db_path: dir.path().join("data").join("shopsync.db"),
        ..EngineConfig::default()
    }
}

async fn seeded(dir: &TempDir) -> (EngineConfig, DatabaseService) {
    let config = test_config(dir);
    let db = open_service(&config).await.unwrap();
    let products = write_file(dir.path(), "products.json", PRODUCTS);
    let shops = write_file(dir.path(), "shops.json", SHOPS);
    assert_eq!(run_import_shops(&db, &shops).await.unwrap(), 1);
    assert_eq!(run_import_products(&db, &products).await.unwrap(), 1);
    (config, db)
}

#[test]
fn cli_definition_is_consistent() {
    Cli::command().debug_assert();
}

#[test]
fn override_set_parses_comma_separated_items() {
    let cli = Cli::try_parse_from([
        "shopsync", "override", "set", "5", "1", "--items", "100,103", "--primary", "103",
    ])
    .unwrap();
    let Commands::Override {
        command:
            OverrideCommands::Set {
                product,
                shop,
                items,
                primary,
            },
    } = cli.command
    else {
        panic!("expected override set");
    };
    assert_eq!(product, ProductId::new(5));
    assert_eq!(shop, ShopId::new(1));
    assert_eq!(items, vec![InternalId::new(100), InternalId::new(103)]);
    assert_eq!(primary, Some(InternalId::new(103)));

    assert!(Cli::try_parse_from(["shopsync", "override", "set", "5", "1"]).is_err());
}

#[test]
fn format_relative_time_units() {
    let now = 10_000_000_000;
    assert_eq!(format_relative_time(now - 30_000, now), "just now");
    assert_eq!(format_relative_time(now - 120_000, now), "2m ago");
    assert_eq!(format_relative_time(now - 2 * 60 * 60_000, now), "2h ago");
    assert_eq!(format_relative_time(now - 3 * 24 * 60 * 60_000, now), "3d ago");
}

#[test]
fn format_job_lines_show_tuple_and_status() {
    let job = SyncJob::new(
        ProductId::new(5),
        ShopId::new(1),
        Direction::Pull,
        TriggerKind::Manual,
    );
    let lines = format_job_lines(std::slice::from_ref(&job), job.created_at);
    assert_eq!(lines.len(), 1);
    assert!(lines[0].contains("product 5"));
    assert!(lines[0].contains("pull"));
    assert!(lines[0].contains("pending"));
    assert!(lines[0].ends_with("just now"));
}

#[test]
fn format_override_status_lists_diff() {
    let status = OverrideStatus {
        status: OverrideState::Custom,
        diff: SelectionDiff {
            added: vec![InternalId::new(7)],
            removed: vec![InternalId::new(100), InternalId::new(103)],
            primary_changed: true,
        },
    };
    assert_eq!(
        format_override_status(&status),
        vec![
            "status: custom".to_string(),
            "added: 7".to_string(),
            "removed: 100, 103".to_string(),
            "primary changed".to_string(),
        ]
    );
}

#[test]
fn completions_render_for_every_shell() {
    for shell in [CompletionShell::Bash, CompletionShell::Zsh, CompletionShell::Fish] {
        let script = String::from_utf8(render_completions(shell)).unwrap();
        assert!(script.contains("shopsync"));
    }
}

#[test]
fn resolve_config_prefers_cli_db_path() {
    let dir = TempDir::new().unwrap();
    let config_file = write_file(
        dir.path(),
        "config.json",
        r#"{"db_path": "/from/file.db", "workers": 3}"#,
    );

    let config = resolve_config(Some(&config_file), Some(PathBuf::from("/from/cli.db"))).unwrap();
    assert_eq!(config.db_path, PathBuf::from("/from/cli.db"));
    assert_eq!(config.workers, 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn import_rejects_empty_and_malformed_files() {
    let dir = TempDir::new().unwrap();
    let db = open_service(&test_config(&dir)).await.unwrap();

    let empty = write_file(dir.path(), "empty.json", "[]");
    assert!(matches!(
        run_import_products(&db, &empty).await,
        Err(CliError::EmptyImport(_))
    ));

    let malformed = write_file(dir.path(), "bad.json", r#"[{"id": 1}]"#);
    assert!(matches!(
        run_import_shops(&db, &malformed).await,
        Err(CliError::Import { .. })
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn request_coalesces_and_cancel_frees_the_tuple() {
    let dir = TempDir::new().unwrap();
    let (config, db) = seeded(&dir).await;
    let orchestrator = build_orchestrator(db, &config).unwrap();

    let first = run_request(&orchestrator, ProductId::new(5), ShopId::new(1), Direction::Push, true)
        .await
        .unwrap();
    let second = run_request(&orchestrator, ProductId::new(5), ShopId::new(1), Direction::Push, false)
        .await
        .unwrap();
    assert_eq!(first.id, second.id);

    run_cancel(&orchestrator, &first.id, false).await.unwrap();
    let jobs = run_jobs(
        &orchestrator,
        &JobFilter {
            status: Some(JobStatus::Canceled),
            ..JobFilter::default()
        },
        true,
    )
    .await
    .unwrap();
    assert_eq!(jobs.len(), 1);

    let error = run_retry(&orchestrator, &first.id, false).await.unwrap_err();
    assert!(matches!(
        error,
        CliError::Core(Error::InvalidTransition { .. })
    ));

    let third = run_request(&orchestrator, ProductId::new(5), ShopId::new(1), Direction::Push, false)
        .await
        .unwrap();
    assert_ne!(third.id, first.id);
}

#[tokio::test(flavor = "multi_thread")]
async fn request_for_unknown_product_fails() {
    let dir = TempDir::new().unwrap();
    let (config, db) = seeded(&dir).await;
    let orchestrator = build_orchestrator(db, &config).unwrap();

    let error = run_request(&orchestrator, ProductId::new(6), ShopId::new(1), Direction::Push, false)
        .await
        .unwrap_err();
    assert!(matches!(error, CliError::Core(Error::NotFound(_))));
}

#[tokio::test(flavor = "multi_thread")]
async fn map_commands_manage_mappings() {
    let dir = TempDir::new().unwrap();
    let (config, db) = seeded(&dir).await;

    for (internal, external) in [(100, 9), (103, 15)] {
        run_map(
            &db,
            MapCommands::Associate {
                entity: EntityType::Category,
                shop: ShopId::new(1),
                internal: InternalId::new(internal),
                external: ExternalId::new(external),
            },
            false,
        )
        .await
        .unwrap();
    }

    let conflict = run_map(
        &db,
        MapCommands::Associate {
            entity: EntityType::Category,
            shop: ShopId::new(1),
            internal: InternalId::new(104),
            external: ExternalId::new(9),
        },
        false,
    )
    .await
    .unwrap_err();
    assert!(matches!(conflict, CliError::Core(Error::Conflict(_))));

    run_map(
        &db,
        MapCommands::Deactivate {
            entity: EntityType::Category,
            shop: ShopId::new(1),
            internal: InternalId::new(103),
        },
        true,
    )
    .await
    .unwrap();
    assert_eq!(
        db.resolve_external(EntityType::Category, ShopId::new(1), InternalId::new(103))
            .await
            .unwrap(),
        Resolution::Inactive(ExternalId::new(15))
    );

    let orchestrator = build_orchestrator(db, &config).unwrap();
    let status = run_override_status(&orchestrator, ProductId::new(5), ShopId::new(1), false)
        .await
        .unwrap();
    assert_eq!(status.status, OverrideState::Inherited);
}

#[tokio::test(flavor = "multi_thread")]
async fn override_set_stages_edit_on_the_open_push() {
    let dir = TempDir::new().unwrap();
    let (config, db) = seeded(&dir).await;
    db.associate(
        EntityType::Category,
        ShopId::new(1),
        InternalId::new(100),
        ExternalId::new(9),
    )
    .await
    .unwrap();
    let orchestrator = build_orchestrator(db.clone(), &config).unwrap();

    let open = run_request(&orchestrator, ProductId::new(5), ShopId::new(1), Direction::Push, false)
        .await
        .unwrap();
    let job = run_override_edit(
        &orchestrator,
        ProductId::new(5),
        ShopId::new(1),
        vec![InternalId::new(100)],
        Some(InternalId::new(100)),
        true,
    )
    .await
    .unwrap();
    assert_eq!(job.id, open.id);

    let edit = db
        .pending_edit(ProductId::new(5), ShopId::new(1))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(edit.selection.items, vec![InternalId::new(100)]);
    assert_eq!(edit.selection.primary, Some(InternalId::new(100)));

    let error = run_override_edit(
        &orchestrator,
        ProductId::new(5),
        ShopId::new(1),
        vec![InternalId::new(100)],
        Some(InternalId::new(103)),
        false,
    )
    .await
    .unwrap_err();
    assert!(matches!(error, CliError::Core(Error::InvalidInput(_))));
}
