//! Sync job storage
//!
//! Every status change is a conditional `UPDATE` on the expected current
//! status, so two workers can never both move the same job.

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT

use libsql::{Connection, Value};

use crate::error::{Error, Result};
use crate::models::{
    Direction, JobId, JobStatus, ProductId, ResultSummary, ShopId, SyncJob,
};

const JOB_COLUMNS: &str = "id, product_id, shop_id, direction, status, attempts, trigger_kind, \
    created_at, started_at, completed_at, result_summary, error, retry_of";

/// Filter for listing jobs; unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub product_id: Option<ProductId>,
    pub shop_id: Option<ShopId>,
    pub limit: usize,
}

#[allow(async_fn_in_trait)]
pub trait JobRepository {
    /// Insert `job` unless a pending/running job exists for its tuple.
    ///
    /// Returns the stored job and whether it was newly created.
    async fn insert_or_existing(&self, job: &SyncJob) -> Result<(SyncJob, bool)>;

    async fn get(&self, id: &JobId) -> Result<Option<SyncJob>>;

    /// The pending/running job for a tuple, if any.
    async fn open_for(
        &self,
        product_id: ProductId,
        shop_id: ShopId,
        direction: Direction,
    ) -> Result<Option<SyncJob>>;

    /// Oldest pending job.
    async fn next_pending(&self) -> Result<Option<SyncJob>>;

    /// pending → running. Returns `false` if someone else got there first.
    async fn claim(&self, id: &JobId, now: i64) -> Result<bool>;

    /// Count one more attempt on a running job.
    async fn record_attempt(&self, id: &JobId, error: &str) -> Result<bool>;

    /// running → completed
    async fn complete(&self, id: &JobId, summary: &ResultSummary, now: i64) -> Result<bool>;

    /// running → failed
    async fn fail(&self, id: &JobId, error: &str, now: i64) -> Result<bool>;

    /// pending → canceled
    async fn cancel(&self, id: &JobId, now: i64) -> Result<bool>;

    /// Summary of the most recent completed job for the tuple that carried
    /// synced data, ignoring `excluding`.
    async fn last_synced_summary(
        &self,
        product_id: ProductId,
        shop_id: ShopId,
        direction: Direction,
        excluding: &JobId,
    ) -> Result<Option<ResultSummary>>;

    async fn list(&self, filter: &JobFilter) -> Result<Vec<SyncJob>>;

    /// Running jobs started before `started_before` (Unix ms).
    async fn running_since(&self, started_before: i64) -> Result<Vec<SyncJob>>;
}

/// libSQL implementation of `JobRepository`
pub struct LibSqlJobRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlJobRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_job(row: &libsql::Row) -> Result<SyncJob> {
        let id: String = row.get(0)?;
        let direction: String = row.get(3)?;
        let status: String = row.get(4)?;
        let trigger: String = row.get(6)?;
        let summary = super::optional_text(row, 10)?
            .map(|raw| serde_json::from_str::<ResultSummary>(&raw))
            .transpose()?;
        let retry_of = super::optional_text(row, 12)?
            .map(|raw| raw.parse::<JobId>())
            .transpose()
            .map_err(|error| Error::Database(format!("invalid retry_of id: {error}")))?;

        Ok(SyncJob {
            id: id
                .parse()
                .map_err(|error| Error::Database(format!("invalid job id {id}: {error}")))?,
            product_id: ProductId::new(row.get(1)?),
            shop_id: ShopId::new(row.get(2)?),
            direction: direction.parse().map_err(Error::Database)?,
            status: status.parse().map_err(Error::Database)?,
            attempts: u32::try_from(row.get::<i64>(5)?).unwrap_or(u32::MAX),
            trigger: trigger.parse().map_err(Error::Database)?,
            created_at: row.get(7)?,
            started_at: super::optional_i64(row, 8)?,
            completed_at: super::optional_i64(row, 9)?,
            result_summary: summary,
            error: super::optional_text(row, 11)?,
            retry_of,
        })
    }

    async fn query_jobs(&self, sql: &str, params: Vec<Value>) -> Result<Vec<SyncJob>> {
        let mut rows = self.conn.query(sql, params).await?;
        let mut jobs = Vec::new();
        while let Some(row) = rows.next().await? {
            jobs.push(Self::parse_job(&row)?);
        }
        Ok(jobs)
    }

    async fn transition(&self, sql: &str, params: Vec<Value>) -> Result<bool> {
        let changed = self.conn.execute(sql, params).await?;
        Ok(changed > 0)
    }
}

fn text(value: &str) -> Value {
    Value::Text(value.to_string())
}

fn optional_id(value: Option<i64>) -> Value {
    value.map_or(Value::Null, Value::Integer)
}

impl JobRepository for LibSqlJobRepository<'_> {
    async fn insert_or_existing(&self, job: &SyncJob) -> Result<(SyncJob, bool)> {
        let summary = job
            .result_summary
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let inserted = self
            .conn
            .execute(
                &format!(
                    "INSERT OR IGNORE INTO sync_jobs ({JOB_COLUMNS})
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
                ),
                vec![
                    text(&job.id.as_str()),
                    Value::Integer(job.product_id.get()),
                    Value::Integer(job.shop_id.get()),
                    text(job.direction.as_str()),
                    text(job.status.as_str()),
                    Value::Integer(i64::from(job.attempts)),
                    text(job.trigger.as_str()),
                    Value::Integer(job.created_at),
                    optional_id(job.started_at),
                    optional_id(job.completed_at),
                    summary.map_or(Value::Null, Value::Text),
                    job.error.as_deref().map_or(Value::Null, text),
                    job.retry_of
                        .map_or(Value::Null, |retry_of| text(&retry_of.as_str())),
                ],
            )
            .await?;

        if inserted > 0 {
            return Ok((job.clone(), true));
        }

        self.open_for(job.product_id, job.shop_id, job.direction)
            .await?
            .map(|existing| (existing, false))
            .ok_or_else(|| Error::Database(format!("job {} could not be stored", job.id)))
    }

    async fn get(&self, id: &JobId) -> Result<Option<SyncJob>> {
        let jobs = self
            .query_jobs(
                &format!("SELECT {JOB_COLUMNS} FROM sync_jobs WHERE id = ?"),
                vec![text(&id.as_str())],
            )
            .await?;
        Ok(jobs.into_iter().next())
    }

    async fn open_for(
        &self,
        product_id: ProductId,
        shop_id: ShopId,
        direction: Direction,
    ) -> Result<Option<SyncJob>> {
        let jobs = self
            .query_jobs(
                &format!(
                    "SELECT {JOB_COLUMNS} FROM sync_jobs
                     WHERE product_id = ? AND shop_id = ? AND direction = ?
                       AND status IN ('pending', 'running')
                     LIMIT 1"
                ),
                vec![
                    Value::Integer(product_id.get()),
                    Value::Integer(shop_id.get()),
                    text(direction.as_str()),
                ],
            )
            .await?;
        Ok(jobs.into_iter().next())
    }

    async fn next_pending(&self) -> Result<Option<SyncJob>> {
        let jobs = self
            .query_jobs(
                &format!(
                    "SELECT {JOB_COLUMNS} FROM sync_jobs
                     WHERE status = 'pending'
                     ORDER BY created_at ASC, id ASC
                     LIMIT 1"
                ),
                Vec::new(),
            )
            .await?;
        Ok(jobs.into_iter().next())
    }

    async fn claim(&self, id: &JobId, now: i64) -> Result<bool> {
        self.transition(
            "UPDATE sync_jobs SET status = 'running', started_at = ?, attempts = attempts + 1
             WHERE id = ? AND status = 'pending'",
            vec![Value::Integer(now), text(&id.as_str())],
        )
        .await
    }

    async fn record_attempt(&self, id: &JobId, error: &str) -> Result<bool> {
        self.transition(
            "UPDATE sync_jobs SET attempts = attempts + 1, error = ?
             WHERE id = ? AND status = 'running'",
            vec![text(error), text(&id.as_str())],
        )
        .await
    }

    async fn complete(&self, id: &JobId, summary: &ResultSummary, now: i64) -> Result<bool> {
        let summary = serde_json::to_string(summary)?;
        self.transition(
            "UPDATE sync_jobs SET status = 'completed', completed_at = ?, result_summary = ?, error = NULL
             WHERE id = ? AND status = 'running'",
            vec![Value::Integer(now), Value::Text(summary), text(&id.as_str())],
        )
        .await
    }

    async fn fail(&self, id: &JobId, error: &str, now: i64) -> Result<bool> {
        self.transition(
            "UPDATE sync_jobs SET status = 'failed', completed_at = ?, error = ?
             WHERE id = ? AND status = 'running'",
            vec![Value::Integer(now), text(error), text(&id.as_str())],
        )
        .await
    }

    async fn cancel(&self, id: &JobId, now: i64) -> Result<bool> {
        self.transition(
            "UPDATE sync_jobs SET status = 'canceled', completed_at = ?
             WHERE id = ? AND status = 'pending'",
            vec![Value::Integer(now), text(&id.as_str())],
        )
        .await
    }

    async fn last_synced_summary(
        &self,
        product_id: ProductId,
        shop_id: ShopId,
        direction: Direction,
        excluding: &JobId,
    ) -> Result<Option<ResultSummary>> {
        let mut rows = self
            .conn
            .query(
                "SELECT result_summary FROM sync_jobs
                 WHERE product_id = ? AND shop_id = ? AND direction = ?
                   AND status = 'completed' AND id != ? AND result_summary IS NOT NULL
                 ORDER BY completed_at DESC, id DESC",
                vec![
                    Value::Integer(product_id.get()),
                    Value::Integer(shop_id.get()),
                    text(direction.as_str()),
                    text(&excluding.as_str()),
                ],
            )
            .await?;

        while let Some(row) = rows.next().await? {
            let raw: String = row.get(0)?;
            let summary: ResultSummary = serde_json::from_str(&raw)?;
            if summary.synced_data.is_some() {
                return Ok(Some(summary));
            }
        }
        Ok(None)
    }

    async fn list(&self, filter: &JobFilter) -> Result<Vec<SyncJob>> {
        let limit = if filter.limit == 0 { 50 } else { filter.limit };
        self.query_jobs(
            &format!(
                "SELECT {JOB_COLUMNS} FROM sync_jobs
                 WHERE (?1 IS NULL OR status = ?1)
                   AND (?2 IS NULL OR product_id = ?2)
                   AND (?3 IS NULL OR shop_id = ?3)
                 ORDER BY created_at DESC, id DESC
                 LIMIT ?4"
            ),
            vec![
                filter
                    .status
                    .map_or(Value::Null, |status| text(status.as_str())),
                optional_id(filter.product_id.map(ProductId::get)),
                optional_id(filter.shop_id.map(ShopId::get)),
                Value::Integer(limit as i64),
            ],
        )
        .await
    }

    async fn running_since(&self, started_before: i64) -> Result<Vec<SyncJob>> {
        self.query_jobs(
            &format!(
                "SELECT {JOB_COLUMNS} FROM sync_jobs
                 WHERE status = 'running' AND started_at < ?
                 ORDER BY started_at ASC"
            ),
            vec![Value::Integer(started_before)],
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::{JobOutcome, TriggerKind};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn push_job() -> SyncJob {
        SyncJob::new(
            ProductId::new(5),
            ShopId::new(1),
            Direction::Push,
            TriggerKind::Manual,
        )
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_second_open_job_for_tuple_is_coalesced() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = LibSqlJobRepository::new(db.connection());

        let first = push_job();
        let (stored, created) = repo.insert_or_existing(&first).await.unwrap();
        assert!(created);
        assert_eq!(stored.id, first.id);

        let (existing, created) = repo.insert_or_existing(&push_job()).await.unwrap();
        assert!(!created);
        assert_eq!(existing.id, first.id);

        let pull = SyncJob::new(
            ProductId::new(5),
            ShopId::new(1),
            Direction::Pull,
            TriggerKind::Manual,
        );
        assert!(repo.insert_or_existing(&pull).await.unwrap().1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_claim_is_compare_and_swap() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = LibSqlJobRepository::new(db.connection());
        let job = push_job();
        repo.insert_or_existing(&job).await.unwrap();

        assert!(repo.claim(&job.id, 10).await.unwrap());
        assert!(!repo.claim(&job.id, 11).await.unwrap());

        let running = repo.get(&job.id).await.unwrap().unwrap();
        assert_eq!(running.status, JobStatus::Running);
        assert_eq!(running.attempts, 1);
        assert_eq!(running.started_at, Some(10));
        assert!(!repo.cancel(&job.id, 12).await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_terminal_jobs_are_immutable() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = LibSqlJobRepository::new(db.connection());
        let job = push_job();
        repo.insert_or_existing(&job).await.unwrap();
        repo.claim(&job.id, 10).await.unwrap();
        assert!(repo.fail(&job.id, "boom", 20).await.unwrap());

        assert!(!repo.complete(&job.id, &ResultSummary::default(), 30).await.unwrap());
        assert!(!repo.claim(&job.id, 30).await.unwrap());
        assert!(!repo.record_attempt(&job.id, "again").await.unwrap());

        let failed = repo.get(&job.id).await.unwrap().unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("boom"));
        assert_eq!(failed.completed_at, Some(20));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_last_synced_summary_skips_jobs_without_data() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = LibSqlJobRepository::new(db.connection());

        let first = push_job();
        repo.insert_or_existing(&first).await.unwrap();
        repo.claim(&first.id, 1).await.unwrap();
        let summary = ResultSummary {
            synced_data: Some(json!({"name": "Pad"})),
            outcome: Some(JobOutcome::Synced),
            ..ResultSummary::default()
        };
        repo.complete(&first.id, &summary, 2).await.unwrap();

        let second = push_job();
        repo.insert_or_existing(&second).await.unwrap();
        repo.claim(&second.id, 3).await.unwrap();
        let missing = ResultSummary {
            outcome: Some(JobOutcome::ExternalMissing),
            ..ResultSummary::default()
        };
        repo.complete(&second.id, &missing, 4).await.unwrap();

        let third = push_job();
        let found = repo
            .last_synced_summary(ProductId::new(5), ShopId::new(1), Direction::Push, &third.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.synced_data, Some(json!({"name": "Pad"})));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_list_filters_and_running_since() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = LibSqlJobRepository::new(db.connection());

        let job = push_job();
        repo.insert_or_existing(&job).await.unwrap();
        let other = SyncJob::new(
            ProductId::new(6),
            ShopId::new(2),
            Direction::Push,
            TriggerKind::Scheduled,
        );
        repo.insert_or_existing(&other).await.unwrap();
        repo.claim(&other.id, 100).await.unwrap();

        let pending = repo
            .list(&JobFilter {
                status: Some(JobStatus::Pending),
                ..JobFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, job.id);

        let for_shop = repo
            .list(&JobFilter {
                shop_id: Some(ShopId::new(2)),
                limit: 10,
                ..JobFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(for_shop[0].trigger, TriggerKind::Scheduled);

        assert_eq!(repo.running_since(101).await.unwrap().len(), 1);
        assert!(repo.running_since(100).await.unwrap().is_empty());
        assert_eq!(repo.next_pending().await.unwrap().unwrap().id, job.id);
    }
}
