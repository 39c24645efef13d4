//! Partner sharing model types
//!
//! A [`ProcessingLog`] row is the unit of work of the sharing engine: one
//! scheduled lifecycle action for one entity/partner pair. Rows are never
//! physically deleted; aborted rows remain as an audit trail.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::impl_status_conversions;
use crate::types::entity::{Opportunity, OpportunityStatus, Organization};

/// Kind of internal entity being synchronized. Designed as an open set;
/// opportunities are the only kind currently shared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Opportunity,
}

impl_status_conversions!(EntityType {
    Opportunity => "opportunity",
});

/// Lifecycle operation that was pending at schedule time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingAction {
    Create,
    Update,
    Delete,
}

impl_status_conversions!(ProcessingAction {
    Create => "create",
    Update => "update",
    Delete => "delete",
});

/// Processing log row status.
///
/// `Pending` rows are selectable by the reconciliation loop; `Error` is
/// terminal only once the retry budget is exhausted; `Aborted` rows are
/// cancelled intents and ignored by all scheduling logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Pending,
    Processed,
    Error,
    Aborted,
}

impl_status_conversions!(ProcessingStatus {
    Pending => "pending",
    Processed => "processed",
    Error => "error",
    Aborted => "aborted",
});

/// External partner integration targeted by a processing log row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Partner {
    SaYouth,
}

impl_status_conversions!(Partner {
    SaYouth => "sayouth",
});

/// Durable record of one sync intent for one entity/partner pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessingLog {
    pub id: String,
    pub entity_type: EntityType,
    pub opportunity_id: String,
    pub partner: Partner,
    pub action: ProcessingAction,
    pub status: ProcessingStatus,
    /// Partner-assigned identifier, populated once a `Create` has been
    /// processed. Required for any `Update`/`Delete` row.
    pub entity_external_id: Option<String>,
    /// Last failure (or abort) reason; cleared on success.
    pub error_reason: Option<String>,
    /// Number of prior failed attempts. `None` before the first failure;
    /// the first failure initialises it to 0 (not counted as a retry).
    pub retry_count: Option<u32>,
    pub date_created: i64,
    pub date_modified: i64,
}

impl ProcessingLog {
    /// Create a new pending row for the given entity/partner/action.
    pub fn new(
        entity_type: EntityType,
        opportunity_id: impl Into<String>,
        partner: Partner,
        action: ProcessingAction,
        entity_external_id: Option<String>,
    ) -> Self {
        let now = Utc::now().timestamp();

        Self {
            id: Uuid::new_v4().to_string(),
            entity_type,
            opportunity_id: opportunity_id.into(),
            partner,
            action,
            status: ProcessingStatus::Pending,
            entity_external_id,
            error_reason: None,
            retry_count: None,
            date_created: now,
            date_modified: now,
        }
    }
}

/// Outbound partner payload: the aligned entity snapshot plus its owning
/// organization. `external_id` is set for update/delete dispatches.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OpportunityUpsert {
    pub opportunity: Opportunity,
    pub organization: Organization,
    /// Status to present to the partner; may differ from the stored status
    /// after implicit alignment (e.g. owning organization deactivated).
    pub effective_status: OpportunityStatus,
    pub external_id: Option<String>,
}
