//! shopsync-core - Core library for shopsync
//!
//! Keeps catalog products consistent with any number of independently
//! configured shops: identity mapping between ID spaces, per-shop category
//! overrides, drift detection, and the job engine that pushes and pulls
//! products. Shared by the CLI and the HTTP API.

pub mod config;
pub mod convert;
pub mod db;
pub mod diff;
pub mod error;
pub mod identity;
pub mod jobs;
pub mod models;
pub mod pricing;
pub mod services;
pub mod shop;
pub mod stock;
pub mod util;
pub mod validate;

pub use config::EngineConfig;
pub use error::{Error, Result};
pub use jobs::{RetryPolicy, SyncOrchestrator, SyncSchedule, Worker, WorkerConfig};
pub use models::{JobId, ProductId, ShopId, SyncJob};
pub use services::DatabaseService;
