//! Schedule API and processing log transitions
//!
//! [`SharingService`] is the write-side entry point invoked synchronously
//! by entity-mutation code paths. Scheduling collapses redundant intents
//! instead of queueing duplicates, so a burst of edits never floods the
//! partner API with transient intermediate states, and per-partner ordering
//! (create before update before delete) is preserved by construction.

use std::sync::Arc;

use tracing::{info, instrument, warn};
use umbono_domain::{
    EntityType, Partner, ProcessingAction, ProcessingLog, ProcessingStatus, Result, UmbonoError,
};

use super::partners::PartnerDirectory;
use super::ports::ProcessingLogStore;

/// Per-partner scheduling decisions for one schedule call.
///
/// Scheduling never fails the triggering business operation; conflicts are
/// counted here and logged instead of raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleOutcome {
    /// Action the caller asked for (the effective action may differ, e.g.
    /// an update of a never-shared entity schedules a create).
    pub action: ProcessingAction,
    /// New pending rows written.
    pub scheduled: usize,
    /// Calls that were no-ops (intent already covered by an existing row).
    pub skipped: usize,
    /// Existing unexecuted rows cancelled out by this call.
    pub collapsed: usize,
    /// Logical invocation errors (e.g. create after delete); logged, never
    /// surfaced to the caller.
    pub rejected: usize,
}

impl ScheduleOutcome {
    fn new(action: ProcessingAction) -> Self {
        Self { action, scheduled: 0, skipped: 0, collapsed: 0, rejected: 0 }
    }
}

/// Write-side service owning all processing log transitions.
pub struct SharingService {
    store: Arc<dyn ProcessingLogStore>,
    partners: Arc<PartnerDirectory>,
    /// Retry budget for failed rows; 0 retries forever.
    max_retry_attempts: u32,
}

impl SharingService {
    pub fn new(
        store: Arc<dyn ProcessingLogStore>,
        partners: Arc<PartnerDirectory>,
        max_retry_attempts: u32,
    ) -> Self {
        Self { store, partners, max_retry_attempts }
    }

    /// Schedule the creation of a partner sharing entity.
    ///
    /// An entity is only ever scheduled for creation once per partner; a
    /// repeat call is skipped regardless of the existing row's status. A
    /// create requested for an entity already in a subsequent state
    /// (update/delete row exists) is a logical invocation error and is
    /// rejected.
    #[instrument(skip(self))]
    pub async fn schedule_create(
        &self,
        entity_type: EntityType,
        entity_id: &str,
    ) -> Result<ScheduleOutcome> {
        let mut outcome = ScheduleOutcome::new(ProcessingAction::Create);

        for partner in self
            .partners
            .list_for_scheduling(ProcessingAction::Create, entity_type, entity_id)
            .await?
        {
            match self.store.latest_for_partner(entity_type, entity_id, partner).await? {
                None => {
                    self.schedule(ProcessingAction::Create, entity_type, entity_id, partner, None)
                        .await?;
                    outcome.scheduled += 1;
                }
                Some(existing) => match existing.action {
                    ProcessingAction::Create => {
                        info!(
                            %entity_type, entity_id, %partner, status = %existing.status,
                            "creation already scheduled, skipped"
                        );
                        outcome.skipped += 1;
                    }
                    ProcessingAction::Update | ProcessingAction::Delete => {
                        warn!(
                            %entity_type, entity_id, %partner,
                            action = %existing.action, status = %existing.status,
                            "creation requested for entity already in a subsequent state, rejected"
                        );
                        outcome.rejected += 1;
                    }
                },
            }
        }

        Ok(outcome)
    }

    /// Schedule an update for a partner sharing entity.
    ///
    /// While a create or update is still unexecuted the call is a no-op:
    /// execution re-reads the entity, so the pending row already carries the
    /// latest data. A never-shared entity is scheduled for creation instead
    /// when `can_create` (the caller knows whether the entity is currently
    /// publishable). An update after deletion is rejected: once deleted, an
    /// entity cannot be reinstated.
    #[instrument(skip(self))]
    pub async fn schedule_update(
        &self,
        entity_type: EntityType,
        entity_id: &str,
        can_create: bool,
    ) -> Result<ScheduleOutcome> {
        let mut outcome = ScheduleOutcome::new(ProcessingAction::Update);

        for partner in self
            .partners
            .list_for_scheduling(ProcessingAction::Update, entity_type, entity_id)
            .await?
        {
            match self.store.latest_for_partner(entity_type, entity_id, partner).await? {
                None => {
                    if can_create
                        && self.partners.action_enabled(partner, ProcessingAction::Create)
                    {
                        self.schedule(
                            ProcessingAction::Create,
                            entity_type,
                            entity_id,
                            partner,
                            None,
                        )
                        .await?;
                        outcome.scheduled += 1;
                    } else {
                        info!(%entity_type, entity_id, %partner, "entity never shared and not creatable, skipped");
                        outcome.skipped += 1;
                    }
                }
                Some(existing) => match existing.action {
                    ProcessingAction::Create | ProcessingAction::Update
                        if existing.status != ProcessingStatus::Processed =>
                    {
                        // The unexecuted row will pick up the latest data.
                        info!(
                            %entity_type, entity_id, %partner,
                            action = %existing.action, status = %existing.status,
                            "unexecuted intent already covers this update, skipped"
                        );
                        outcome.skipped += 1;
                    }
                    ProcessingAction::Create | ProcessingAction::Update => {
                        self.schedule(
                            ProcessingAction::Update,
                            entity_type,
                            entity_id,
                            partner,
                            existing.entity_external_id.clone(),
                        )
                        .await?;
                        outcome.scheduled += 1;
                    }
                    ProcessingAction::Delete => {
                        warn!(
                            %entity_type, entity_id, %partner, status = %existing.status,
                            "update requested for entity already deleted, rejected"
                        );
                        outcome.rejected += 1;
                    }
                },
            }
        }

        Ok(outcome)
    }

    /// Schedule the deletion of a partner sharing entity.
    ///
    /// An unexecuted create cancels out (aborted, nothing sent); an
    /// unexecuted update is aborted and superseded by the delete. A
    /// never-shared entity or one already scheduled for deletion is skipped.
    #[instrument(skip(self))]
    pub async fn schedule_delete(
        &self,
        entity_type: EntityType,
        entity_id: &str,
    ) -> Result<ScheduleOutcome> {
        let mut outcome = ScheduleOutcome::new(ProcessingAction::Delete);

        for partner in self
            .partners
            .list_for_scheduling(ProcessingAction::Delete, entity_type, entity_id)
            .await?
        {
            match self.store.latest_for_partner(entity_type, entity_id, partner).await? {
                None => {
                    info!(%entity_type, entity_id, %partner, "entity not shared, deletion skipped");
                    outcome.skipped += 1;
                }
                Some(existing) => match existing.action {
                    ProcessingAction::Create
                        if existing.status != ProcessingStatus::Processed =>
                    {
                        self.abort_row(existing, "superseded by deletion before execution")
                            .await?;
                        outcome.collapsed += 1;
                    }
                    ProcessingAction::Update
                        if existing.status != ProcessingStatus::Processed =>
                    {
                        let external_id = existing.entity_external_id.clone();
                        self.abort_row(existing, "superseded by deletion before execution")
                            .await?;
                        outcome.collapsed += 1;

                        self.schedule(
                            ProcessingAction::Delete,
                            entity_type,
                            entity_id,
                            partner,
                            external_id,
                        )
                        .await?;
                        outcome.scheduled += 1;
                    }
                    ProcessingAction::Create | ProcessingAction::Update => {
                        self.schedule(
                            ProcessingAction::Delete,
                            entity_type,
                            entity_id,
                            partner,
                            existing.entity_external_id.clone(),
                        )
                        .await?;
                        outcome.scheduled += 1;
                    }
                    ProcessingAction::Delete => {
                        info!(
                            %entity_type, entity_id, %partner, status = %existing.status,
                            "deletion already scheduled, skipped"
                        );
                        outcome.skipped += 1;
                    }
                },
            }
        }

        Ok(outcome)
    }

    /// Next batch of actionable rows, oldest first, excluding known-bad ids.
    pub async fn list_pending_schedule(
        &self,
        batch_size: usize,
        ids_to_skip: &[String],
    ) -> Result<Vec<ProcessingLog>> {
        if batch_size == 0 {
            return Err(UmbonoError::InvalidInput("batch size must be greater than zero".into()));
        }
        self.store.list_pending(batch_size, ids_to_skip).await
    }

    /// Terminal error rows requiring operator intervention.
    pub async fn list_needs_attention(&self) -> Result<Vec<ProcessingLog>> {
        self.store.list_needs_attention().await
    }

    /// Record the outcome of one reconciliation attempt.
    ///
    /// Validates the transition, normalises the row's bookkeeping fields and
    /// persists it:
    /// - `Processed` requires the external id and clears the retry metadata.
    /// - `Error` requires a reason; the first failure initialises the retry
    ///   count to 0 (not counted as a retry). While the retry budget is not
    ///   exhausted the row is re-armed to `Pending` so the *next* invocation
    ///   picks it up again; once exhausted it stays `Error`.
    /// - `Aborted` records a cancelled intent.
    pub async fn update_schedule(&self, row: &mut ProcessingLog) -> Result<()> {
        row.entity_external_id =
            row.entity_external_id.take().map(|id| id.trim().to_string()).filter(|id| !id.is_empty());

        match row.status {
            ProcessingStatus::Processed => {
                if row.entity_external_id.is_none() {
                    return Err(UmbonoError::InvalidInput(format!(
                        "external id required to mark row '{}' as processed",
                        row.id
                    )));
                }
                row.error_reason = None;
                row.retry_count = None;
            }

            ProcessingStatus::Error => {
                let reason = row
                    .error_reason
                    .take()
                    .map(|r| r.trim().to_string())
                    .filter(|r| !r.is_empty())
                    .ok_or_else(|| {
                        UmbonoError::InvalidInput(format!(
                            "error reason required to mark row '{}' as failed",
                            row.id
                        ))
                    })?;
                row.error_reason = Some(reason);

                let retries = row.retry_count.map_or(0, |count| count + 1);
                row.retry_count = Some(retries);

                // Re-arm unless the retry budget is exhausted; a terminal
                // error row stays out of selection and surfaces through the
                // needs-attention query.
                let exhausted = self.max_retry_attempts > 0 && retries > self.max_retry_attempts;
                if exhausted {
                    warn!(
                        row_id = %row.id, retries,
                        "retry budget exhausted, row needs operator attention"
                    );
                } else {
                    row.status = ProcessingStatus::Pending;
                }
            }

            ProcessingStatus::Aborted => {}

            ProcessingStatus::Pending => {
                return Err(UmbonoError::InvalidInput(format!(
                    "status '{}' is not a valid reconciliation outcome",
                    row.status
                )));
            }
        }

        self.store.update(row).await
    }

    /// Whether the entity has been (or is about to be) sent to a partner.
    ///
    /// With `abort_if_possible`, an unexecuted creation is cancelled and the
    /// entity reported as not shared; callers use this to guarantee an
    /// entity under deletion will never reach the partner. Without it, a
    /// still-pending create must be assumed shared, since it might execute
    /// at any moment.
    #[instrument(skip(self))]
    pub async fn is_shared(
        &self,
        entity_type: EntityType,
        entity_id: &str,
        abort_if_possible: bool,
    ) -> Result<bool> {
        let Some(latest) = self.store.latest_for_entity(entity_type, entity_id).await? else {
            return Ok(false);
        };

        match latest.action {
            // An update/delete row implies a prior successful create.
            ProcessingAction::Update | ProcessingAction::Delete => Ok(true),
            ProcessingAction::Create if latest.status == ProcessingStatus::Processed => Ok(true),
            ProcessingAction::Create => {
                if abort_if_possible {
                    self.abort_row(latest, "unexecuted creation cancelled by caller").await?;
                    Ok(false)
                } else {
                    Ok(true)
                }
            }
        }
    }

    async fn schedule(
        &self,
        action: ProcessingAction,
        entity_type: EntityType,
        entity_id: &str,
        partner: Partner,
        entity_external_id: Option<String>,
    ) -> Result<()> {
        let row =
            ProcessingLog::new(entity_type, entity_id, partner, action, entity_external_id);
        self.store.insert(&row).await?;
        info!(%entity_type, entity_id, %partner, %action, row_id = %row.id, "sharing scheduled");
        Ok(())
    }

    async fn abort_row(&self, mut row: ProcessingLog, reason: &str) -> Result<()> {
        info!(row_id = %row.id, action = %row.action, reason, "sharing intent aborted");
        row.status = ProcessingStatus::Aborted;
        row.error_reason = Some(reason.to_string());
        self.store.update(&row).await
    }
}
