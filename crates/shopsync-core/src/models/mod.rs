//! Data models for shopsync

mod finding;
mod identity;
mod ids;
mod override_document;
mod product;
mod shop;
mod sync_job;

pub use finding::{FindingSnapshot, Severity, ValidationFinding};
pub use identity::{IdentityMapping, Resolution};
pub use ids::{EntityType, ExternalId, InternalId, JobId, ProductId, ShopId};
pub use override_document::{
    DocumentMetadata, OverrideDocument, OverrideSource, PendingEdit, PrimaryFallback, Selection,
};
pub use product::{CatalogProduct, WarehouseStock};
pub use shop::{ApiVersion, ShopConfig, TaxRulesGroups, WarehouseSelection};
pub use sync_job::{Direction, JobOutcome, JobStatus, ResultSummary, SyncJob, TriggerKind};
