//! Reconciliation loop
//!
//! A time-boxed pass that drains pending processing log rows under a
//! cluster-wide lock: re-validates each intent against the live entity,
//! dispatches to the partner client, and records the outcome. Runs as a
//! recurring background job (see `umbono-infra::scheduling`), one instance
//! cluster-wide at a time.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{error, info, instrument, warn};
use umbono_domain::{
    EntityType, Opportunity, OpportunityStatus, OpportunityUpsert, ProcessingAction,
    ProcessingLog, ProcessingStatus, Result, SharingJobConfig, UmbonoError,
};

use super::alignment::{align_for_dispatch, validate_intent, IntentCheck};
use super::ports::{
    DistributedLockService, OpportunityReader, OrganizationReader, SharingClientFactory,
};
use super::service::SharingService;

/// Lock identifier shared by every process instance in the cluster.
const LOCK_IDENTIFIER: &str = "partner_sharing_process";

/// Stored error reasons are trimmed to this length.
const MAX_ERROR_REASON_LEN: usize = 2000;

/// Counters for one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessSummary {
    pub processed: usize,
    pub aborted: usize,
    pub failed: usize,
    /// True when another instance held the lock and this invocation did
    /// nothing.
    pub lock_skipped: bool,
}

enum RowOutcome {
    Processed,
    Aborted,
}

/// Background worker that drains pending sharing intents.
pub struct SharingBackgroundService {
    sharing: Arc<SharingService>,
    opportunities: Arc<dyn OpportunityReader>,
    organizations: Arc<dyn OrganizationReader>,
    clients: Arc<dyn SharingClientFactory>,
    lock: Arc<dyn DistributedLockService>,
    config: SharingJobConfig,
}

impl SharingBackgroundService {
    pub fn new(
        sharing: Arc<SharingService>,
        opportunities: Arc<dyn OpportunityReader>,
        organizations: Arc<dyn OrganizationReader>,
        clients: Arc<dyn SharingClientFactory>,
        lock: Arc<dyn DistributedLockService>,
        config: SharingJobConfig,
    ) -> Self {
        Self { sharing, opportunities, organizations, clients, lock, config }
    }

    /// Run one reconciliation pass.
    ///
    /// Acquires the cluster-wide lock for the pass window plus a safety
    /// buffer (so a crashed holder's lease expires rather than deadlocking
    /// the job), drains batches until no pending rows remain or the window
    /// elapses, and always releases the lock on the way out.
    #[instrument(skip(self))]
    pub async fn process_sharing(&self) -> Result<ProcessSummary> {
        let started = Utc::now();
        let execute_until =
            started + chrono::Duration::hours(i64::from(self.config.max_interval_hours));
        let lock_duration = Duration::from_secs(
            u64::from(self.config.max_interval_hours) * 3600
                + u64::from(self.config.lock_buffer_minutes) * 60,
        );

        if !self.lock.try_acquire(LOCK_IDENTIFIER, lock_duration).await? {
            info!(lock = LOCK_IDENTIFIER, "sharing pass already running elsewhere, skipped");
            return Ok(ProcessSummary { lock_skipped: true, ..ProcessSummary::default() });
        }

        info!(
            lock = LOCK_IDENTIFIER,
            lock_duration_secs = lock_duration.as_secs(),
            execute_until = %execute_until,
            "processing partner sharing"
        );

        let result = self.drain_pending(execute_until).await;

        // Release even when the pass failed; never mask the pass result.
        if let Err(release_err) = self.lock.release(LOCK_IDENTIFIER).await {
            warn!(lock = LOCK_IDENTIFIER, error = %release_err, "failed to release sharing lock");
        }

        if let Ok(summary) = &result {
            info!(
                processed = summary.processed,
                aborted = summary.aborted,
                failed = summary.failed,
                duration_secs = (Utc::now() - started).num_seconds(),
                "processed partner sharing"
            );
        }

        result
    }

    async fn drain_pending(&self, execute_until: DateTime<Utc>) -> Result<ProcessSummary> {
        let mut summary = ProcessSummary::default();
        let mut ids_to_skip: Vec<String> = Vec::new();

        'pass: while Utc::now() < execute_until {
            let items = self
                .sharing
                .list_pending_schedule(self.config.batch_size, &ids_to_skip)
                .await?;
            if items.is_empty() {
                break;
            }

            for mut item in items {
                match self.process_item(&mut item).await {
                    Ok(RowOutcome::Processed) => summary.processed += 1,
                    Ok(RowOutcome::Aborted) => summary.aborted += 1,
                    Err(err) => {
                        error!(
                            row_id = %item.id,
                            entity_type = %item.entity_type,
                            entity_id = %item.opportunity_id,
                            error = %err,
                            "failed to process sharing row"
                        );

                        item.status = ProcessingStatus::Error;
                        item.error_reason = Some(trim_reason(&err.to_string()));
                        if let Err(update_err) = self.sharing.update_schedule(&mut item).await {
                            error!(row_id = %item.id, error = %update_err, "failed to record row failure");
                        }

                        // Keep a persistently failing row from starving the
                        // rest of this pass; it becomes selectable again on
                        // the next invocation.
                        ids_to_skip.push(item.id.clone());
                        summary.failed += 1;
                    }
                }

                if Utc::now() >= execute_until {
                    warn!("sharing pass window elapsed mid-batch, resuming on next run");
                    break 'pass;
                }
            }
        }

        Ok(summary)
    }

    async fn process_item(&self, item: &mut ProcessingLog) -> Result<RowOutcome> {
        info!(
            row_id = %item.id,
            entity_type = %item.entity_type,
            entity_id = %item.opportunity_id,
            partner = %item.partner,
            action = %item.action,
            "processing sharing row"
        );

        match item.entity_type {
            EntityType::Opportunity => self.process_opportunity(item).await,
        }
    }

    async fn process_opportunity(&self, item: &mut ProcessingLog) -> Result<RowOutcome> {
        let opportunity = self.opportunities.opportunity_by_id(&item.opportunity_id).await?;

        // Business rules may have invalidated the intent since scheduling.
        if let IntentCheck::Stale(reason) = validate_intent(item.action, &opportunity) {
            info!(row_id = %item.id, reason, "scheduled intent no longer valid, aborting");
            item.status = ProcessingStatus::Aborted;
            item.error_reason = Some(reason);
            self.sharing.update_schedule(item).await?;
            return Ok(RowOutcome::Aborted);
        }

        let effective_status =
            align_for_dispatch(item.action, &opportunity, Utc::now().timestamp())?;
        let client = self.clients.client_for(item.partner)?;

        match item.action {
            ProcessingAction::Create => {
                let request = self.build_upsert(&opportunity, effective_status, None).await?;
                let external_id = client.create_opportunity(&request).await?;
                item.entity_external_id = Some(external_id);
            }
            ProcessingAction::Update => {
                let external_id = require_external_id(item)?;
                let request =
                    self.build_upsert(&opportunity, effective_status, Some(external_id)).await?;
                client.update_opportunity(&request).await?;
            }
            ProcessingAction::Delete => {
                let external_id = require_external_id(item)?;
                client.delete_opportunity(&external_id).await?;
            }
        }

        item.status = ProcessingStatus::Processed;
        self.sharing.update_schedule(item).await?;
        Ok(RowOutcome::Processed)
    }

    async fn build_upsert(
        &self,
        opportunity: &Opportunity,
        effective_status: OpportunityStatus,
        external_id: Option<String>,
    ) -> Result<OpportunityUpsert> {
        let organization =
            self.organizations.organization_by_id(&opportunity.organization_id).await?;
        Ok(OpportunityUpsert {
            opportunity: opportunity.clone(),
            organization,
            effective_status,
            external_id,
        })
    }
}

/// A missing external id on an update/delete row indicates a row created out
/// of order, a defect elsewhere.
fn require_external_id(item: &ProcessingLog) -> Result<String> {
    item.entity_external_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            UmbonoError::DataInconsistency(format!(
                "external id missing for {} row '{}'",
                item.action, item.id
            ))
        })
}

fn trim_reason(reason: &str) -> String {
    let trimmed = reason.trim();
    if trimmed.len() <= MAX_ERROR_REASON_LEN {
        return trimmed.to_string();
    }
    trimmed.chars().take(MAX_ERROR_REASON_LEN).collect()
}
