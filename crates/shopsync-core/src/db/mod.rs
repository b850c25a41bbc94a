//! Database layer for shopsync

mod catalog_repository;
mod connection;
mod identity_repository;
mod job_repository;
mod migrations;
mod override_repository;

pub use catalog_repository::{CatalogRepository, LibSqlCatalogRepository};
pub use connection::Database;
pub use identity_repository::LibSqlIdentityMap;
pub use job_repository::{JobFilter, JobRepository, LibSqlJobRepository};
pub use override_repository::{LibSqlOverrideRepository, OverrideRepository};

use libsql::{Row, Value};

use crate::error::{Error, Result};

/// Read a nullable integer column.
pub(crate) fn optional_i64(row: &Row, idx: i32) -> Result<Option<i64>> {
    match row.get_value(idx)? {
        Value::Null => Ok(None),
        Value::Integer(value) => Ok(Some(value)),
        other => Err(Error::Database(format!(
            "expected integer in column {idx}, got {other:?}"
        ))),
    }
}

/// Read a nullable text column.
pub(crate) fn optional_text(row: &Row, idx: i32) -> Result<Option<String>> {
    match row.get_value(idx)? {
        Value::Null => Ok(None),
        Value::Text(value) => Ok(Some(value)),
        other => Err(Error::Database(format!(
            "expected text in column {idx}, got {other:?}"
        ))),
    }
}
