//! Error types for shopsync-core

use thiserror::Error;

use crate::models::{EntityType, ExternalId, InternalId, JobStatus, ShopId};

/// Result type alias using shopsync-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in shopsync-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Identity mapping collision
    #[error(transparent)]
    Conflict(#[from] ConflictError),

    /// External shop API failure
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// External payload could not be built; blocks the sync
    #[error("Payload construction failed: {0}")]
    Payload(String),

    /// Job state machine rejected the transition
    #[error("Invalid job transition from {from} to {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A worker lane stopped unexpectedly
    #[error("Worker error: {0}")]
    Worker(String),
}

/// Either side of a requested association is already actively bound elsewhere.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error(
    "cannot map {entity_type} {requested_internal_id} -> {requested_external_id} in shop {shop_id}: active mapping {existing_internal_id} -> {existing_external_id} exists; deactivate it first"
)]
pub struct ConflictError {
    pub entity_type: EntityType,
    pub shop_id: ShopId,
    pub requested_internal_id: InternalId,
    pub requested_external_id: ExternalId,
    pub existing_internal_id: InternalId,
    pub existing_external_id: ExternalId,
}

/// Failures talking to the external shop API.
///
/// A 404 is not represented here; callers inspect the response status instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Shop API returned HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("Shop API network error: {0}")]
    Network(String),
    #[error("Shop API rejected credentials: {0}")]
    Auth(String),
    #[error("Shop API request timed out")]
    Timeout,
}

impl From<reqwest::Error> for TransportError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else {
            Self::Network(error.to_string())
        }
    }
}
