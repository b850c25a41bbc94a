//! Worker lanes that drain the job queue.
//!
//! Lanes run as local tasks on one thread and share the orchestrator. The
//! claim in the store decides which lane executes a job, so lanes never
//! coordinate among themselves.

use std::future::Future;
use std::rc::Rc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::{JoinHandle, LocalSet};

use super::SyncOrchestrator;
use crate::error::{Error, Result};
use crate::models::SyncJob;
use crate::shop::ShopTransport;
use crate::util::unix_millis_now;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Number of concurrent lanes
    pub workers: usize,
    /// Wall-clock budget of one job, retries included
    pub job_timeout: Duration,
    /// Idle wait between queue polls
    pub poll_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            job_timeout: Duration::from_secs(300),
            poll_interval: Duration::from_secs(1),
        }
    }
}

pub struct Worker<T> {
    orchestrator: Rc<SyncOrchestrator<T>>,
    config: WorkerConfig,
}

impl<T: ShopTransport + 'static> Worker<T> {
    pub fn new(orchestrator: SyncOrchestrator<T>, config: WorkerConfig) -> Self {
        Self {
            orchestrator: Rc::new(orchestrator.with_job_timeout(config.job_timeout)),
            config,
        }
    }

    pub fn orchestrator(&self) -> &SyncOrchestrator<T> {
        &self.orchestrator
    }

    /// Recover stale jobs, then run every pending job until the queue is
    /// empty. Returns the jobs that were executed.
    pub async fn run_once(&self) -> Result<Vec<SyncJob>> {
        let recovered = self
            .orchestrator
            .recover_timed_out(unix_millis_now())
            .await?;
        if !recovered.is_empty() {
            tracing::warn!(count = recovered.len(), "Recovered timed out jobs");
        }

        let local = LocalSet::new();
        local
            .run_until(async {
                let lanes: Vec<JoinHandle<Result<Vec<SyncJob>>>> = (0..self.lanes())
                    .map(|lane| {
                        let orchestrator = Rc::clone(&self.orchestrator);
                        tokio::task::spawn_local(async move {
                            let mut executed = Vec::new();
                            while let Some(job) = orchestrator.run_next().await? {
                                tracing::debug!(lane, job_id = %job.id, status = job.status.as_str(), "Lane finished job");
                                executed.push(job);
                            }
                            Ok(executed)
                        })
                    })
                    .collect();

                let mut executed = Vec::new();
                for lane in lanes {
                    executed.extend(join_lane(lane).await??);
                }
                Ok(executed)
            })
            .await
    }

    /// Poll the queue until `shutdown` resolves. Lane 0 also recovers
    /// timed out jobs and runs scheduled sweeps.
    pub async fn run_until(&self, shutdown: impl Future<Output = ()>) -> Result<()> {
        let (stop_tx, stop_rx) = watch::channel(false);
        let local = LocalSet::new();

        local
            .run_until(async move {
                let lanes: Vec<JoinHandle<()>> = (0..self.lanes())
                    .map(|lane| {
                        let orchestrator = Rc::clone(&self.orchestrator);
                        let poll_interval = self.config.poll_interval;
                        let stop = stop_rx.clone();
                        tokio::task::spawn_local(run_lane(orchestrator, lane, poll_interval, stop))
                    })
                    .collect();
                tracing::info!(lanes = lanes.len(), "Sync worker started");

                shutdown.await;
                tracing::info!("Sync worker shutting down");
                // Receivers live in the lanes; a send error means all lanes exited
                let _ = stop_tx.send(true);

                for lane in lanes {
                    join_lane(lane).await?;
                }
                Ok(())
            })
            .await
    }

    fn lanes(&self) -> usize {
        self.config.workers.max(1)
    }
}

async fn run_lane<T: ShopTransport>(
    orchestrator: Rc<SyncOrchestrator<T>>,
    lane: usize,
    poll_interval: Duration,
    mut stop: watch::Receiver<bool>,
) {
    loop {
        if *stop.borrow() {
            break;
        }

        if lane == 0 {
            if let Err(error) = maintenance(&orchestrator).await {
                tracing::error!(lane, %error, "Queue maintenance failed");
            }
        }

        match orchestrator.run_next().await {
            Ok(Some(_)) => continue,
            Ok(None) => {}
            Err(error) => tracing::error!(lane, %error, "Lane failed to run job"),
        }

        tokio::select! {
            _ = stop.changed() => break,
            () = tokio::time::sleep(poll_interval) => {}
        }
    }
    tracing::debug!(lane, "Lane stopped");
}

async fn maintenance<T: ShopTransport>(orchestrator: &SyncOrchestrator<T>) -> Result<()> {
    let recovered = orchestrator.recover_timed_out(unix_millis_now()).await?;
    if !recovered.is_empty() {
        tracing::warn!(count = recovered.len(), "Recovered timed out jobs");
    }
    let queued = orchestrator.sweep(Utc::now()).await?;
    if !queued.is_empty() {
        tracing::info!(count = queued.len(), "Scheduled sweep queued jobs");
    }
    Ok(())
}

async fn join_lane<R>(lane: JoinHandle<R>) -> Result<R> {
    lane.await
        .map_err(|error| Error::Worker(format!("lane stopped unexpectedly: {error}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        CatalogProduct, Direction, EntityType, ExternalId, InternalId, JobStatus, ProductId,
        ShopId, TriggerKind,
    };
    use crate::identity::IdentityMap;
    use crate::services::DatabaseService;
    use crate::shop::testing::{shop, ScriptedTransport};
    use pretty_assertions::assert_eq;
    use rust_decimal::Decimal;
    use std::collections::BTreeMap;

    const SHOP: ShopId = ShopId::new(1);

    async fn worker_with_products(count: i64, workers: usize) -> Worker<ScriptedTransport> {
        let db = DatabaseService::open_in_memory().await.unwrap();
        db.upsert_shop(&shop(SHOP)).await.unwrap();
        db.associate(
            EntityType::Category,
            SHOP,
            InternalId::new(100),
            ExternalId::new(9),
        )
        .await
        .unwrap();

        for id in 1..=count {
            let product = CatalogProduct {
                id: ProductId::new(id),
                sku: format!("SKU-{id}"),
                name: format!("Product {id}"),
                prices: BTreeMap::from([(InternalId::new(1), Decimal::new(1999, 2))]),
                tax_rate: Decimal::from(8),
                tax_rate_overrides: BTreeMap::new(),
                categories: vec![InternalId::new(100)],
                primary_category: None,
                stock: Vec::new(),
                active: true,
                shops: vec![SHOP],
            };
            db.upsert_product(&product).await.unwrap();
            db.associate(
                EntityType::Product,
                SHOP,
                InternalId::new(id),
                ExternalId::new(1000 + id),
            )
            .await
            .unwrap();
        }

        let orchestrator = SyncOrchestrator::new(db, ScriptedTransport::new());
        Worker::new(
            orchestrator,
            WorkerConfig {
                workers,
                job_timeout: Duration::from_secs(5),
                poll_interval: Duration::from_millis(10),
            },
        )
    }

    async fn queue_all(worker: &Worker<ScriptedTransport>, count: i64) {
        for id in 1..=count {
            worker
                .orchestrator()
                .request_sync(ProductId::new(id), SHOP, Direction::Push, TriggerKind::Auto)
                .await
                .unwrap();
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_run_once_drains_queue_across_lanes() {
        let worker = worker_with_products(5, 3).await;
        queue_all(&worker, 5).await;

        let executed = worker.run_once().await.unwrap();
        assert_eq!(executed.len(), 5);
        assert!(executed
            .iter()
            .all(|job| job.status == JobStatus::Completed && job.attempts == 1));

        assert!(worker.run_once().await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_run_until_processes_then_stops() {
        let worker = worker_with_products(2, 2).await;
        queue_all(&worker, 2).await;

        worker
            .run_until(tokio::time::sleep(Duration::from_millis(300)))
            .await
            .unwrap();

        let jobs = worker
            .orchestrator()
            .list_jobs(&crate::db::JobFilter::default())
            .await
            .unwrap();
        assert_eq!(jobs.len(), 2);
        assert!(jobs.iter().all(|job| job.status == JobStatus::Completed));
    }
}
