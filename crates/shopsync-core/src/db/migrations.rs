//! Database migrations

use crate::error::Result;
use libsql::Connection;

/// Current schema version
const CURRENT_VERSION: i32 = 4;

/// Run all pending migrations
pub async fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn).await?;

    if version < 1 {
        migrate_v1(conn).await?;
    }
    if version < 2 {
        migrate_v2(conn).await?;
    }
    if version < 3 {
        migrate_v3(conn).await?;
    }
    if version < 4 {
        migrate_v4(conn).await?;
    }

    Ok(())
}

/// Get the current schema version
async fn get_version(conn: &Connection) -> Result<i32> {
    let mut rows = conn
        .query(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
            (),
        )
        .await?;

    let exists: bool = if let Some(row) = rows.next().await? {
        row.get::<i32>(0)? != 0
    } else {
        false
    };

    if !exists {
        return Ok(0);
    }

    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM schema_version", ())
        .await?;

    let version: i32 = if let Some(row) = rows.next().await? {
        row.get(0)?
    } else {
        0
    };

    Ok(version)
}

async fn apply(conn: &Connection, version: i32, statements: &[&str]) -> Result<()> {
    conn.execute("BEGIN TRANSACTION", ()).await?;

    for stmt in statements {
        if let Err(e) = conn.execute(stmt, ()).await {
            conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }
    }

    if let Err(e) = conn.execute("COMMIT", ()).await {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(e.into());
    }

    tracing::info!("Migrated database to version {version}");
    Ok(())
}

/// Migration to version 1: identity mappings and override documents
async fn migrate_v1(conn: &Connection) -> Result<()> {
    apply(
        conn,
        1,
        &[
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY
            )",
            // Rows are never deleted; deactivation keeps history
            "CREATE TABLE IF NOT EXISTS identity_mappings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                entity_type TEXT NOT NULL,
                shop_id INTEGER NOT NULL,
                internal_id INTEGER NOT NULL,
                external_id INTEGER NOT NULL,
                active INTEGER NOT NULL DEFAULT 1,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )",
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_identity_active_forward
                ON identity_mappings(entity_type, shop_id, internal_id) WHERE active = 1",
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_identity_active_reverse
                ON identity_mappings(entity_type, shop_id, external_id) WHERE active = 1",
            "CREATE INDEX IF NOT EXISTS idx_identity_scope
                ON identity_mappings(entity_type, shop_id)",
            "CREATE TABLE IF NOT EXISTS override_documents (
                product_id INTEGER NOT NULL,
                shop_id INTEGER NOT NULL,
                document TEXT NOT NULL,
                source TEXT NOT NULL,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (product_id, shop_id)
            )",
            "INSERT INTO schema_version (version) VALUES (1)",
        ],
    )
    .await
}

/// Migration to version 2: sync jobs and validation findings
async fn migrate_v2(conn: &Connection) -> Result<()> {
    apply(
        conn,
        2,
        &[
            "CREATE TABLE IF NOT EXISTS sync_jobs (
                id TEXT PRIMARY KEY,
                product_id INTEGER NOT NULL,
                shop_id INTEGER NOT NULL,
                direction TEXT NOT NULL,
                status TEXT NOT NULL,
                attempts INTEGER NOT NULL DEFAULT 0,
                trigger_kind TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                started_at INTEGER,
                completed_at INTEGER,
                result_summary TEXT,
                error TEXT,
                retry_of TEXT
            )",
            // At most one pending/running job per tuple
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_sync_jobs_open_tuple
                ON sync_jobs(product_id, shop_id, direction)
                WHERE status IN ('pending', 'running')",
            "CREATE INDEX IF NOT EXISTS idx_sync_jobs_status ON sync_jobs(status, created_at)",
            "CREATE INDEX IF NOT EXISTS idx_sync_jobs_tuple
                ON sync_jobs(product_id, shop_id, direction, completed_at DESC)",
            "CREATE TABLE IF NOT EXISTS validation_findings (
                product_id INTEGER NOT NULL,
                shop_id INTEGER NOT NULL,
                validated_at INTEGER NOT NULL,
                findings TEXT NOT NULL,
                PRIMARY KEY (product_id, shop_id)
            )",
            "INSERT INTO schema_version (version) VALUES (2)",
        ],
    )
    .await
}

/// Migration to version 3: catalog products, shops and sweep bookkeeping
async fn migrate_v3(conn: &Connection) -> Result<()> {
    apply(
        conn,
        3,
        &[
            "CREATE TABLE IF NOT EXISTS catalog_products (
                id INTEGER PRIMARY KEY,
                data TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS shops (
                id INTEGER PRIMARY KEY,
                data TEXT NOT NULL,
                last_sweep_at INTEGER,
                updated_at INTEGER NOT NULL
            )",
            "INSERT INTO schema_version (version) VALUES (3)",
        ],
    )
    .await
}

/// Migration to version 4: user category edits awaiting a push
async fn migrate_v4(conn: &Connection) -> Result<()> {
    apply(
        conn,
        4,
        &[
            "CREATE TABLE IF NOT EXISTS pending_override_edits (
                product_id INTEGER NOT NULL,
                shop_id INTEGER NOT NULL,
                selection TEXT NOT NULL,
                requested_at INTEGER NOT NULL,
                PRIMARY KEY (product_id, shop_id)
            )",
            "INSERT INTO schema_version (version) VALUES (4)",
        ],
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use libsql::Builder;

    async fn setup() -> Connection {
        let db = Builder::new_local(":memory:").build().await.unwrap();
        db.connect().unwrap()
    }

    async fn table_exists(conn: &Connection, name: &str) -> bool {
        let mut rows = conn
            .query(
                "SELECT EXISTS(
                    SELECT 1 FROM sqlite_master
                    WHERE type = 'table' AND name = ?
                )",
                [name],
            )
            .await
            .unwrap();

        rows.next()
            .await
            .unwrap()
            .is_some_and(|row| row.get::<i32>(0).unwrap() != 0)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_migrations() {
        let conn = setup().await;
        run(&conn).await.unwrap();

        let version = get_version(&conn).await.unwrap();
        assert_eq!(version, CURRENT_VERSION);
        for table in [
            "identity_mappings",
            "override_documents",
            "sync_jobs",
            "validation_findings",
            "catalog_products",
            "shops",
            "pending_override_edits",
        ] {
            assert!(table_exists(&conn, table).await, "missing table {table}");
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_migrations_idempotent() {
        let conn = setup().await;
        run(&conn).await.unwrap();
        run(&conn).await.unwrap();

        let version = get_version(&conn).await.unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_open_job_index_rejects_second_pending_job() {
        let conn = setup().await;
        run(&conn).await.unwrap();

        let insert = "INSERT INTO sync_jobs (id, product_id, shop_id, direction, status, trigger_kind, created_at)
                      VALUES (?, 5, 1, 'push', 'pending', 'manual', 0)";
        conn.execute(insert, ["a"]).await.unwrap();
        assert!(conn.execute(insert, ["b"]).await.is_err());

        conn.execute("UPDATE sync_jobs SET status = 'completed' WHERE id = 'a'", ())
            .await
            .unwrap();
        conn.execute(insert, ["c"]).await.unwrap();
    }
}
