//! Port interfaces for the sharing engine

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use umbono_domain::{
    EntityType, Opportunity, OpportunityUpsert, Organization, Partner, ProcessingLog, Result,
};

/// Durable store of processing log rows.
///
/// Rows are written by the schedule API (inserts, collapses) and the
/// reconciliation loop (status transitions) and never physically deleted.
#[async_trait]
pub trait ProcessingLogStore: Send + Sync {
    /// Persist a new row.
    async fn insert(&self, row: &ProcessingLog) -> Result<()>;

    /// Persist changed fields of an existing row and bump its audit stamp.
    async fn update(&self, row: &ProcessingLog) -> Result<()>;

    /// Latest non-aborted row for the entity, regardless of partner.
    async fn latest_for_entity(
        &self,
        entity_type: EntityType,
        entity_id: &str,
    ) -> Result<Option<ProcessingLog>>;

    /// Latest non-aborted row for the entity/partner pair.
    async fn latest_for_partner(
        &self,
        entity_type: EntityType,
        entity_id: &str,
        partner: Partner,
    ) -> Result<Option<ProcessingLog>>;

    /// Up to `batch_size` pending rows, oldest `date_modified` first,
    /// excluding the given ids. Pure read.
    async fn list_pending(
        &self,
        batch_size: usize,
        ids_to_skip: &[String],
    ) -> Result<Vec<ProcessingLog>>;

    /// Terminal error rows (retry budget exhausted) for operator tooling.
    async fn list_needs_attention(&self) -> Result<Vec<ProcessingLog>>;
}

/// Read accessor for opportunities, owned by the entity services.
#[async_trait]
pub trait OpportunityReader: Send + Sync {
    async fn opportunity_by_id(&self, id: &str) -> Result<Opportunity>;
}

/// Read accessor for organizations, owned by the entity services.
#[async_trait]
pub trait OrganizationReader: Send + Sync {
    async fn organization_by_id(&self, id: &str) -> Result<Organization>;
}

/// Outbound client for one partner integration.
///
/// Implementations surface partner API failures as errors distinguishable
/// from success; the reconciliation loop records them on the row and
/// retries on a later pass.
#[async_trait]
pub trait SharingProviderClient: Send + Sync {
    /// Create the opportunity on the partner system, returning the
    /// partner-assigned external id.
    async fn create_opportunity(&self, request: &OpportunityUpsert) -> Result<String>;

    /// Update a previously created opportunity; `request.external_id` must
    /// be set.
    async fn update_opportunity(&self, request: &OpportunityUpsert) -> Result<()>;

    /// Remove a previously created opportunity. Permanent; the external
    /// resource cannot be reinstated.
    async fn delete_opportunity(&self, external_id: &str) -> Result<()>;
}

/// Resolves the client for a given partner.
pub trait SharingClientFactory: Send + Sync {
    fn client_for(&self, partner: Partner) -> Result<Arc<dyn SharingProviderClient>>;
}

/// Cluster-wide mutual exclusion keyed by a fixed identifier.
///
/// `duration` is a lease: if the holder crashes without releasing, the lock
/// expires and another instance can take over.
#[async_trait]
pub trait DistributedLockService: Send + Sync {
    /// Attempt to acquire the lock. `false` means another instance holds it;
    /// that is not an error, the caller simply skips this invocation.
    async fn try_acquire(&self, key: &str, duration: Duration) -> Result<bool>;

    /// Release a lock held by this invocation. Best effort; implementations
    /// must not let a release failure mask an upstream error.
    async fn release(&self, key: &str) -> Result<()>;
}
