//! Drives one push or pull of a product to or from a shop.
//!
//! Jobs move `pending → running → completed | failed`, or
//! `pending → canceled`. Every transition is a conditional update in the
//! store, so a job is executed by exactly one worker and terminal jobs are
//! never touched again. Identity mappings and override documents are only
//! written from inside a claimed job.

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::RetryPolicy;
use crate::convert::{
    from_external_selection, from_pivot_selection, parse_stored_override, ConversionReport,
    StoredOverride,
};
use crate::db::JobFilter;
use crate::diff::{compare, OverrideState, OverrideStatus};
use crate::error::{Error, Result};
use crate::identity::{IdentityIndex, IdentityMap};
use crate::models::{
    CatalogProduct, Direction, EntityType, ExternalId, FindingSnapshot, InternalId, JobId,
    JobOutcome, JobStatus, OverrideSource, PendingEdit, ProductId, Resolution, ResultSummary,
    Selection, Severity, ShopConfig, ShopId, SyncJob, TriggerKind, ValidationFinding,
};
use crate::pricing::rate_for_group;
use crate::services::DatabaseService;
use crate::shop::{ProductPayload, ShopClient, ShopTransport};
use crate::util::unix_millis_now;
use crate::validate::{validate, ProductFields};

const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(300);
const DEFAULT_RECOVERY_GRACE: Duration = Duration::from_secs(30);

pub struct SyncOrchestrator<T> {
    db: DatabaseService,
    transport: T,
    retry: RetryPolicy,
    job_timeout: Duration,
    recovery_grace: Duration,
}

impl<T: ShopTransport> SyncOrchestrator<T> {
    pub fn new(db: DatabaseService, transport: T) -> Self {
        Self {
            db,
            transport,
            retry: RetryPolicy::default(),
            job_timeout: DEFAULT_JOB_TIMEOUT,
            recovery_grace: DEFAULT_RECOVERY_GRACE,
        }
    }

    #[must_use]
    pub const fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub const fn with_job_timeout(mut self, job_timeout: Duration) -> Self {
        self.job_timeout = job_timeout;
        self
    }

    /// Extra time past the job timeout before a running job counts as
    /// abandoned. The executing lane's own timer starts after the claim, so
    /// recovery must not fire on the same deadline.
    #[must_use]
    pub const fn with_recovery_grace(mut self, recovery_grace: Duration) -> Self {
        self.recovery_grace = recovery_grace;
        self
    }

    pub const fn database(&self) -> &DatabaseService {
        &self.db
    }

    /// Queue a sync for a product in a shop.
    ///
    /// While a pending or running job exists for the same tuple, that job is
    /// returned instead of a new one.
    pub async fn request_sync(
        &self,
        product_id: ProductId,
        shop_id: ShopId,
        direction: Direction,
        trigger: TriggerKind,
    ) -> Result<SyncJob> {
        self.ensure_syncable(product_id, shop_id).await?;

        let candidate = SyncJob::new(product_id, shop_id, direction, trigger);
        let (job, created) = self.db.insert_job_or_existing(&candidate).await?;
        if created {
            tracing::info!(
                job_id = %job.id,
                %product_id,
                %shop_id,
                direction = direction.as_str(),
                trigger = trigger.as_str(),
                "Queued sync job"
            );
        } else {
            tracing::debug!(
                job_id = %job.id,
                %product_id,
                %shop_id,
                status = job.status.as_str(),
                "Coalesced sync request into open job"
            );
        }
        Ok(job)
    }

    /// Record a user's category selection for a product in a shop and queue
    /// the push that applies it.
    ///
    /// The selection is staged, not written: the push job turns it into a
    /// manual override under its claim. A later edit replaces an earlier one
    /// that has not been applied yet, and the request coalesces like
    /// `request_sync`.
    pub async fn request_override_edit(
        &self,
        product_id: ProductId,
        shop_id: ShopId,
        items: Vec<InternalId>,
        primary: Option<InternalId>,
    ) -> Result<SyncJob> {
        if items.is_empty() {
            return Err(Error::InvalidInput(
                "a category override needs at least one category".to_string(),
            ));
        }
        if let Some(primary) = primary.filter(|primary| !items.contains(primary)) {
            return Err(Error::InvalidInput(format!(
                "primary category {primary} is not part of the selection"
            )));
        }
        self.ensure_syncable(product_id, shop_id).await?;

        let edit = PendingEdit {
            selection: Selection { items, primary },
            requested_at: unix_millis_now(),
        };
        self.db.stage_edit(product_id, shop_id, &edit).await?;
        tracing::info!(
            %product_id,
            %shop_id,
            categories = edit.selection.items.len(),
            "Staged category override edit"
        );

        self.request_sync(product_id, shop_id, Direction::Push, TriggerKind::Manual)
            .await
    }

    pub async fn get_job_status(&self, id: &JobId) -> Result<SyncJob> {
        self.db
            .get_job(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("sync job {id}")))
    }

    /// How the shop's category selection relates to the catalog default.
    pub async fn get_override_status(
        &self,
        product_id: ProductId,
        shop_id: ShopId,
    ) -> Result<OverrideStatus> {
        let product = self.require_product(product_id).await?;
        self.require_shop(shop_id).await?;

        let document = match self.db.load_override_raw(product_id, shop_id).await? {
            Some(raw) => {
                let index = self.db.load_index(EntityType::Category, shop_id).await?;
                parse_stored_override(&raw, &index)?.document
            }
            None => return Ok(compare(&[], &product.categories, None, None)),
        };

        Ok(compare(
            &document.selection.items,
            &product.categories,
            document.selection.primary,
            product.default_primary(),
        ))
    }

    /// Findings of the latest validation run; empty if none ran yet.
    pub async fn get_validation_findings(
        &self,
        product_id: ProductId,
        shop_id: ShopId,
    ) -> Result<Vec<ValidationFinding>> {
        Ok(self
            .db
            .load_findings(product_id, shop_id)
            .await?
            .map(|snapshot| snapshot.findings)
            .unwrap_or_default())
    }

    pub async fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<SyncJob>> {
        self.db.list_jobs(filter).await
    }

    /// Cancel a job that has not started yet.
    pub async fn cancel(&self, id: &JobId) -> Result<SyncJob> {
        self.get_job_status(id).await?;
        if !self.db.cancel_job(id, unix_millis_now()).await? {
            let current = self.get_job_status(id).await?;
            return Err(Error::InvalidTransition {
                from: current.status,
                to: JobStatus::Canceled,
            });
        }
        tracing::info!(job_id = %id, "Canceled sync job");
        self.get_job_status(id).await
    }

    /// Queue a fresh job for a failed one. The failed job is left as is.
    pub async fn retry_failed(&self, id: &JobId) -> Result<SyncJob> {
        let failed = self.get_job_status(id).await?;
        if failed.status != JobStatus::Failed {
            return Err(Error::InvalidTransition {
                from: failed.status,
                to: JobStatus::Pending,
            });
        }

        let mut retry = SyncJob::new(
            failed.product_id,
            failed.shop_id,
            failed.direction,
            failed.trigger,
        );
        retry.retry_of = Some(failed.id);
        let (job, created) = self.db.insert_job_or_existing(&retry).await?;
        if created {
            tracing::info!(job_id = %job.id, retry_of = %failed.id, "Queued retry of failed job");
        }
        Ok(job)
    }

    /// Fail running jobs that exceeded the job timeout plus the recovery
    /// grace, freeing their tuple.
    pub async fn recover_timed_out(&self, now_ms: i64) -> Result<Vec<JobId>> {
        let abandon_after = self.job_timeout.saturating_add(self.recovery_grace);
        let abandon_ms = i64::try_from(abandon_after.as_millis()).unwrap_or(i64::MAX);
        let cutoff = now_ms.saturating_sub(abandon_ms);

        let mut recovered = Vec::new();
        for job in self.db.running_jobs_since(cutoff).await? {
            let message = format!(
                "timed out after {}s without finishing",
                self.job_timeout.as_secs()
            );
            if self.db.fail_job(&job.id, &message, now_ms).await? {
                tracing::warn!(
                    job_id = %job.id,
                    product_id = %job.product_id,
                    shop_id = %job.shop_id,
                    "Recovered timed out job"
                );
                recovered.push(job.id);
            }
        }
        Ok(recovered)
    }

    /// Queue a scheduled push for every product of every shop whose
    /// schedule is due at `now`.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<Vec<SyncJob>> {
        let now_ms = now.timestamp_millis();
        let mut queued = Vec::new();

        for shop in self.db.list_shops().await? {
            let Some(schedule) = shop.schedule.as_ref().filter(|_| shop.active) else {
                continue;
            };
            let last = self.db.last_sweep_at(shop.id).await?;
            if !schedule.is_due(now, last) {
                continue;
            }

            let products = self.db.list_products_for_shop(shop.id).await?;
            for product in &products {
                let job = self
                    .request_sync(product.id, shop.id, Direction::Push, TriggerKind::Scheduled)
                    .await?;
                queued.push(job);
            }
            self.db.mark_swept(shop.id, now_ms).await?;
            tracing::info!(shop_id = %shop.id, products = products.len(), "Scheduled sweep ran");
        }
        Ok(queued)
    }

    /// Claim and execute the oldest pending job. `None` when the queue is
    /// empty.
    pub async fn run_next(&self) -> Result<Option<SyncJob>> {
        loop {
            let Some(job) = self.db.next_pending_job().await? else {
                return Ok(None);
            };
            if self.db.claim_job(&job.id, unix_millis_now()).await? {
                return self.execute(&job.id).await.map(Some);
            }
            tracing::debug!(job_id = %job.id, "Job claimed by another worker");
        }
    }

    /// Execute a claimed job to a terminal state within the job timeout.
    async fn execute(&self, id: &JobId) -> Result<SyncJob> {
        let job = self.get_job_status(id).await?;
        tracing::info!(
            job_id = %job.id,
            product_id = %job.product_id,
            shop_id = %job.shop_id,
            direction = job.direction.as_str(),
            "Running sync job"
        );

        let outcome = tokio::time::timeout(self.job_timeout, self.run_attempts(&job)).await;
        let now = unix_millis_now();
        let stored = match outcome {
            Ok(Ok(summary)) => {
                tracing::info!(job_id = %job.id, outcome = ?summary.outcome, "Sync job completed");
                self.db.complete_job(&job.id, &summary, now).await?
            }
            Ok(Err(error)) => {
                tracing::error!(job_id = %job.id, %error, "Sync job failed");
                self.db.fail_job(&job.id, &error.to_string(), now).await?
            }
            Err(_) => {
                let message = format!("timed out after {}s", self.job_timeout.as_secs());
                tracing::warn!(job_id = %job.id, "Sync job timed out");
                self.db.fail_job(&job.id, &message, now).await?
            }
        };
        if !stored {
            tracing::warn!(job_id = %job.id, "Job was finished elsewhere; result discarded");
        }

        let finished = self.get_job_status(id).await?;
        if finished.direction == Direction::Push && finished.status == JobStatus::Completed {
            self.queue_staged_edit(&finished).await?;
        }
        Ok(finished)
    }

    /// An edit staged while this push was already past reading it is
    /// picked up by a follow-up push.
    async fn queue_staged_edit(&self, job: &SyncJob) -> Result<()> {
        if self
            .db
            .pending_edit(job.product_id, job.shop_id)
            .await?
            .is_none()
        {
            return Ok(());
        }
        match self
            .request_sync(job.product_id, job.shop_id, Direction::Push, TriggerKind::Manual)
            .await
        {
            Ok(follow_up) => {
                tracing::info!(
                    job_id = %job.id,
                    follow_up = %follow_up.id,
                    "Queued push for staged edit"
                );
            }
            Err(error) => {
                tracing::warn!(job_id = %job.id, %error, "Staged edit left for a later push");
            }
        }
        Ok(())
    }

    async fn run_attempts(&self, job: &SyncJob) -> Result<ResultSummary> {
        let mut attempt = job.attempts.max(1);
        loop {
            match self.perform(job).await {
                Ok(summary) => return Ok(summary),
                Err(error)
                    if RetryPolicy::is_retryable(&error)
                        && self.retry.has_attempts_left(attempt) =>
                {
                    attempt += 1;
                    let delay = self.retry.delay_for(attempt);
                    tracing::warn!(
                        job_id = %job.id,
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        %error,
                        "Transient shop failure, retrying"
                    );
                    self.db.record_attempt(&job.id, &error.to_string()).await?;
                    tokio::time::sleep(delay).await;
                }
                Err(error) => return Err(error),
            }
        }
    }

    async fn perform(&self, job: &SyncJob) -> Result<ResultSummary> {
        let product = self.require_product(job.product_id).await?;
        let shop = self.require_shop(job.shop_id).await?;
        match job.direction {
            Direction::Push => self.push(job, &product, &shop).await,
            Direction::Pull => self.pull(job, &product, &shop).await,
        }
    }

    async fn push(
        &self,
        job: &SyncJob,
        product: &CatalogProduct,
        shop: &ShopConfig,
    ) -> Result<ResultSummary> {
        let index = self.db.load_index(EntityType::Category, shop.id).await?;
        let edit = self.db.pending_edit(product.id, shop.id).await?;
        let (categories, shop_specific) = match &edit {
            Some(edit) => {
                tracing::info!(
                    job_id = %job.id,
                    product_id = %product.id,
                    shop_id = %shop.id,
                    "Applying staged category override edit"
                );
                let report = from_pivot_selection(
                    &edit.selection.items,
                    edit.selection.primary,
                    &index,
                    OverrideSource::Manual,
                );
                (report, true)
            }
            None => self.category_document(product, shop, &index).await?,
        };
        if categories.document.is_empty() && !categories.unresolved_internal.is_empty() {
            if let Some(edit) = &edit {
                // Would fail every later push of the tuple too
                self.db.discard_edit(product.id, shop.id, edit).await?;
            }
            return Err(Error::Payload(format!(
                "none of the {} categories of product {} resolve in shop {}",
                categories.unresolved_internal.len(),
                product.id,
                shop.id
            )));
        }

        let payload = ProductPayload::build(product, shop, &categories.document)?;
        let mut warnings = categories.warnings();
        let client = ShopClient::new(&self.transport, shop);
        let product_key = InternalId::from(product.id);

        let findings = match self
            .db
            .resolve_external(EntityType::Product, shop.id, product_key)
            .await?
        {
            Resolution::Mapped(external_id) => {
                let Some(current) = client.fetch_product(external_id).await? else {
                    return self.external_missing(job, external_id, warnings).await;
                };
                let findings = validate(
                    &payload.fields(&shop.root_categories),
                    &current.fields(&shop.root_categories),
                );
                if !client.update_product(external_id, &payload).await? {
                    return self.external_missing(job, external_id, warnings).await;
                }
                findings
            }
            Resolution::Inactive(_) | Resolution::Unmapped => {
                let external_id = client.create_product(&payload).await?;
                self.db
                    .associate(EntityType::Product, shop.id, product_key, external_id)
                    .await?;
                tracing::info!(
                    job_id = %job.id,
                    product_id = %product.id,
                    shop_id = %shop.id,
                    %external_id,
                    "Created product in shop"
                );
                warnings.push(format!("created product in shop {} as {external_id}", shop.id));
                Vec::new()
            }
        };

        if shop_specific {
            self.db
                .save_override(product.id, shop.id, &categories.document)
                .await?;
        }
        if let Some(edit) = &edit {
            self.db.discard_edit(product.id, shop.id, edit).await?;
        }
        self.save_findings(product.id, shop.id, findings).await?;

        let synced_data = payload.synced_data()?;
        let changed_fields = self.changed_fields(job, &synced_data).await?;
        Ok(ResultSummary {
            synced_data: Some(synced_data),
            changed_fields,
            outcome: Some(JobOutcome::Synced),
            warnings,
        })
    }

    async fn pull(
        &self,
        job: &SyncJob,
        product: &CatalogProduct,
        shop: &ShopConfig,
    ) -> Result<ResultSummary> {
        let product_key = InternalId::from(product.id);
        let external_id = self
            .db
            .resolve_external(EntityType::Product, shop.id, product_key)
            .await?
            .active()
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "product {} is not linked to shop {}",
                    product.id, shop.id
                ))
            })?;

        let client = ShopClient::new(&self.transport, shop);
        let Some(state) = client.fetch_product(external_id).await? else {
            return self.external_missing(job, external_id, Vec::new()).await;
        };

        let index = self.db.load_index(EntityType::Category, shop.id).await?;
        let mut warnings = Vec::new();

        // Validate against catalog truth before the pulled selection lands
        let findings = match self.internal_fields(product, shop, &index).await {
            Ok(fields) => validate(&fields, &state.fields(&shop.root_categories)),
            Err(error) => {
                warnings.push(format!("validation skipped: {error}"));
                Vec::new()
            }
        };

        let pulled = from_external_selection(
            &state.category_ids,
            state.default_category,
            &shop.root_categories,
            &index,
        );
        warnings.extend(pulled.warnings());
        let status = compare(
            &pulled.document.selection.items,
            &product.categories,
            pulled.document.selection.primary,
            product.default_primary(),
        );
        tracing::info!(
            job_id = %job.id,
            status = status.status.as_str(),
            added = status.diff.added.len(),
            removed = status.diff.removed.len(),
            "Classified pulled category selection"
        );

        let kept = self
            .reconcile_pulled(product, shop.id, &pulled, &status, &index, &mut warnings)
            .await?;
        self.save_findings(product.id, shop.id, findings).await?;

        let mut synced_data = serde_json::to_value(&state)?;
        if let Value::Object(fields) = &mut synced_data {
            let rate = state
                .tax_rules_group
                .and_then(|group| rate_for_group(shop, group));
            fields.insert(
                "tax_rate".to_string(),
                rate.map_or(Value::Null, |rate| Value::String(rate.to_string())),
            );
            fields.insert(
                "override_status".to_string(),
                Value::String(kept.as_str().to_string()),
            );
        }
        let changed_fields = self.changed_fields(job, &synced_data).await?;

        Ok(ResultSummary {
            synced_data: Some(synced_data),
            changed_fields,
            outcome: Some(JobOutcome::Synced),
            warnings,
        })
    }

    /// Store the pulled selection unless a manual override outranks it.
    /// A selection matching the catalog default is discarded.
    ///
    /// Returns the classification of whatever selection the shop now has on
    /// record, which is the manual override when that one was kept.
    async fn reconcile_pulled(
        &self,
        product: &CatalogProduct,
        shop_id: ShopId,
        pulled: &ConversionReport,
        status: &OverrideStatus,
        index: &IdentityIndex,
        warnings: &mut Vec<String>,
    ) -> Result<OverrideState> {
        let product_id = product.id;
        if let Some(raw) = self.db.load_override_raw(product_id, shop_id).await? {
            let source = match StoredOverride::from_json(&raw)? {
                StoredOverride::Canonical(document) => document.metadata.source,
                _ => OverrideSource::Manual,
            };
            if source.takes_precedence_over(OverrideSource::Pulled) {
                let stored = parse_stored_override(&raw, index)?.document;
                let drift = compare(
                    &pulled.document.selection.items,
                    &stored.selection.items,
                    pulled.document.selection.primary,
                    stored.selection.primary,
                );
                if drift.status != OverrideState::Identical {
                    warnings.push(format!(
                        "shop {shop_id} categories differ from the manual override; manual override kept"
                    ));
                }
                let kept = compare(
                    &stored.selection.items,
                    &product.categories,
                    stored.selection.primary,
                    product.default_primary(),
                );
                return Ok(kept.status);
            }
        }

        match status.status {
            OverrideState::Custom => {
                self.db
                    .save_override(product_id, shop_id, &pulled.document)
                    .await?;
            }
            OverrideState::Inherited | OverrideState::Identical => {
                if self.db.clear_override(product_id, shop_id).await? {
                    tracing::info!(%product_id, %shop_id, "Shop matches catalog default; override discarded");
                }
            }
        }
        Ok(status.status)
    }

    /// The category document to push: the shop override if one is stored,
    /// otherwise the catalog default. The flag is `true` for an override.
    async fn category_document(
        &self,
        product: &CatalogProduct,
        shop: &ShopConfig,
        index: &IdentityIndex,
    ) -> Result<(ConversionReport, bool)> {
        match self.db.load_override_raw(product.id, shop.id).await? {
            Some(raw) => Ok((parse_stored_override(&raw, index)?, true)),
            None => Ok((
                from_pivot_selection(
                    &product.categories,
                    product.default_primary(),
                    index,
                    OverrideSource::System,
                ),
                false,
            )),
        }
    }

    async fn internal_fields(
        &self,
        product: &CatalogProduct,
        shop: &ShopConfig,
        index: &IdentityIndex,
    ) -> Result<ProductFields> {
        let (categories, _) = self.category_document(product, shop, index).await?;
        let payload = ProductPayload::build(product, shop, &categories.document)?;
        Ok(payload.fields(&shop.root_categories))
    }

    /// The shop answered 404: deactivate the product linkage and finish.
    async fn external_missing(
        &self,
        job: &SyncJob,
        external_id: ExternalId,
        mut warnings: Vec<String>,
    ) -> Result<ResultSummary> {
        self.db
            .deactivate(EntityType::Product, job.shop_id, InternalId::from(job.product_id))
            .await?;
        tracing::warn!(
            job_id = %job.id,
            product_id = %job.product_id,
            shop_id = %job.shop_id,
            %external_id,
            "Shop no longer has the product; linkage deactivated"
        );
        warnings.push(format!(
            "shop {} has no product {external_id}; mapping deactivated",
            job.shop_id
        ));
        Ok(ResultSummary {
            synced_data: None,
            changed_fields: None,
            outcome: Some(JobOutcome::ExternalMissing),
            warnings,
        })
    }

    async fn save_findings(
        &self,
        product_id: ProductId,
        shop_id: ShopId,
        findings: Vec<ValidationFinding>,
    ) -> Result<()> {
        let snapshot = FindingSnapshot {
            product_id,
            shop_id,
            validated_at: unix_millis_now(),
            findings,
        };
        if snapshot.highest_severity() == Some(Severity::Error) {
            tracing::warn!(%product_id, %shop_id, "Shop data drifted beyond tolerance");
        }
        self.db.save_findings(&snapshot).await
    }

    /// `None` for the first job that synced data on this tuple.
    async fn changed_fields(&self, job: &SyncJob, current: &Value) -> Result<Option<Vec<String>>> {
        let previous = self
            .db
            .last_synced_summary(job.product_id, job.shop_id, job.direction, &job.id)
            .await?;
        Ok(previous
            .and_then(|summary| summary.synced_data)
            .map(|previous| changed_keys(&previous, current)))
    }

    async fn ensure_syncable(&self, product_id: ProductId, shop_id: ShopId) -> Result<()> {
        let product = self.require_product(product_id).await?;
        let shop = self.require_shop(shop_id).await?;
        if !shop.active {
            return Err(Error::InvalidInput(format!("shop {shop_id} is inactive")));
        }
        if !product.is_published_to(shop_id) {
            return Err(Error::InvalidInput(format!(
                "product {product_id} is not published to shop {shop_id}"
            )));
        }
        Ok(())
    }

    async fn require_product(&self, id: ProductId) -> Result<CatalogProduct> {
        self.db
            .get_product(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("product {id}")))
    }

    async fn require_shop(&self, id: ShopId) -> Result<ShopConfig> {
        self.db
            .get_shop(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("shop {id}")))
    }
}

/// Top-level keys whose values differ, sorted.
fn changed_keys(previous: &Value, current: &Value) -> Vec<String> {
    match (previous, current) {
        (Value::Object(before), Value::Object(after)) => {
            let keys: BTreeSet<&String> = before.keys().chain(after.keys()).collect();
            keys.into_iter()
                .filter(|key| before.get(*key) != after.get(*key))
                .cloned()
                .collect()
        }
        _ if previous == current => Vec::new(),
        _ => vec!["synced_data".to_string()],
    }
}
