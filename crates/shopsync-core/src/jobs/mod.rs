//! Sync jobs: orchestration, retries, worker lanes and scheduled sweeps

mod orchestrator;
mod retry;
mod schedule;
mod worker;

pub use orchestrator::SyncOrchestrator;
pub use retry::RetryPolicy;
pub use schedule::SyncSchedule;
pub use worker::{Worker, WorkerConfig};
