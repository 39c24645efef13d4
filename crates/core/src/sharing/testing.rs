//! In-memory port implementations shared by the sharing engine tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use umbono_domain::{
    EntityType, Opportunity, OpportunityKind, OpportunityStatus, OpportunityUpsert, Organization,
    OrganizationStatus, Partner, PartnerSettings, ProcessingLog, ProcessingStatus, Result,
    UmbonoError,
};

use super::ports::{
    DistributedLockService, OpportunityReader, OrganizationReader, ProcessingLogStore,
    SharingClientFactory, SharingProviderClient,
};

pub fn sample_opportunity(id: &str) -> Opportunity {
    Opportunity {
        id: id.to_string(),
        organization_id: "org-1".into(),
        organization_name: "Acme Skills".into(),
        title: "Intro to Rust".into(),
        summary: Some("A short learning opportunity".into()),
        kind: OpportunityKind::Learning,
        status: OpportunityStatus::Active,
        organization_status: OrganizationStatus::Active,
        share_with_partners: true,
        hidden: false,
        verification_enabled: true,
        date_start: 1_700_000_000,
        date_end: Some(4_000_000_000),
        country_codes: vec!["ZA".into()],
        url: format!("https://example.org/opportunities/{id}"),
    }
}

pub fn sample_organization(id: &str) -> Organization {
    Organization {
        id: id.to_string(),
        name: "Acme Skills".into(),
        status: OrganizationStatus::Active,
        street_address: Some("1 Main Road".into()),
        city: Some("Cape Town".into()),
        province: Some("Western Cape".into()),
        postal_code: Some("8001".into()),
        primary_contact_name: Some("Thandi M".into()),
        primary_contact_email: Some("thandi@example.org".into()),
    }
}

pub fn sayouth_settings() -> PartnerSettings {
    PartnerSettings {
        partner: Partner::SaYouth,
        active: true,
        create_enabled: true,
        update_enabled: true,
        delete_enabled: true,
    }
}

/// Vec-backed processing log store; insertion order breaks `date_modified`
/// ties so FIFO assertions stay deterministic inside one test second.
#[derive(Default)]
pub struct InMemoryLogStore {
    rows: Mutex<Vec<ProcessingLog>>,
}

impl InMemoryLogStore {
    pub fn all(&self) -> Vec<ProcessingLog> {
        self.rows.lock().unwrap().clone()
    }

    pub fn get(&self, id: &str) -> Option<ProcessingLog> {
        self.rows.lock().unwrap().iter().find(|r| r.id == id).cloned()
    }

    pub fn with_status(&self, status: ProcessingStatus) -> Vec<ProcessingLog> {
        self.rows.lock().unwrap().iter().filter(|r| r.status == status).cloned().collect()
    }
}

#[async_trait]
impl ProcessingLogStore for InMemoryLogStore {
    async fn insert(&self, row: &ProcessingLog) -> Result<()> {
        self.rows.lock().unwrap().push(row.clone());
        Ok(())
    }

    async fn update(&self, row: &ProcessingLog) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        let existing = rows
            .iter_mut()
            .find(|r| r.id == row.id)
            .ok_or_else(|| UmbonoError::NotFound(format!("processing log '{}'", row.id)))?;
        *existing = row.clone();
        existing.date_modified = Utc::now().timestamp();
        Ok(())
    }

    async fn latest_for_entity(
        &self,
        entity_type: EntityType,
        entity_id: &str,
    ) -> Result<Option<ProcessingLog>> {
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .iter()
            .enumerate()
            .filter(|(_, r)| {
                r.entity_type == entity_type
                    && r.opportunity_id == entity_id
                    && r.status != ProcessingStatus::Aborted
            })
            .max_by_key(|(idx, r)| (r.date_modified, *idx))
            .map(|(_, r)| r.clone()))
    }

    async fn latest_for_partner(
        &self,
        entity_type: EntityType,
        entity_id: &str,
        partner: Partner,
    ) -> Result<Option<ProcessingLog>> {
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .iter()
            .enumerate()
            .filter(|(_, r)| {
                r.entity_type == entity_type
                    && r.opportunity_id == entity_id
                    && r.partner == partner
                    && r.status != ProcessingStatus::Aborted
            })
            .max_by_key(|(idx, r)| (r.date_modified, *idx))
            .map(|(_, r)| r.clone()))
    }

    async fn list_pending(
        &self,
        batch_size: usize,
        ids_to_skip: &[String],
    ) -> Result<Vec<ProcessingLog>> {
        let rows = self.rows.lock().unwrap();
        let mut pending: Vec<(usize, &ProcessingLog)> = rows
            .iter()
            .enumerate()
            .filter(|(_, r)| {
                r.status == ProcessingStatus::Pending && !ids_to_skip.contains(&r.id)
            })
            .collect();
        pending.sort_by_key(|(idx, r)| (r.date_modified, *idx));
        Ok(pending.into_iter().take(batch_size).map(|(_, r)| r.clone()).collect())
    }

    async fn list_needs_attention(&self) -> Result<Vec<ProcessingLog>> {
        Ok(self.with_status(ProcessingStatus::Error))
    }
}

#[derive(Default)]
pub struct StubOpportunityReader {
    items: Mutex<HashMap<String, Opportunity>>,
}

impl StubOpportunityReader {
    pub fn put(&self, opportunity: Opportunity) {
        self.items.lock().unwrap().insert(opportunity.id.clone(), opportunity);
    }
}

#[async_trait]
impl OpportunityReader for StubOpportunityReader {
    async fn opportunity_by_id(&self, id: &str) -> Result<Opportunity> {
        self.items
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| UmbonoError::NotFound(format!("opportunity '{id}'")))
    }
}

#[derive(Default)]
pub struct StubOrganizationReader {
    items: Mutex<HashMap<String, Organization>>,
}

impl StubOrganizationReader {
    pub fn put(&self, organization: Organization) {
        self.items.lock().unwrap().insert(organization.id.clone(), organization);
    }
}

#[async_trait]
impl OrganizationReader for StubOrganizationReader {
    async fn organization_by_id(&self, id: &str) -> Result<Organization> {
        self.items
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| UmbonoError::NotFound(format!("organization '{id}'")))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCall {
    Create { opportunity_id: String },
    Update { external_id: String, effective_status: OpportunityStatus },
    Delete { external_id: String },
}

/// Partner client double that records calls and can simulate outages for
/// specific opportunity/external ids.
#[derive(Default)]
pub struct RecordingClient {
    calls: Mutex<Vec<ClientCall>>,
    fail_for: Mutex<Vec<String>>,
    next_external_id: AtomicU64,
}

impl RecordingClient {
    pub fn fail_for(&self, id: &str) {
        self.fail_for.lock().unwrap().push(id.to_string());
    }

    pub fn calls(&self) -> Vec<ClientCall> {
        self.calls.lock().unwrap().clone()
    }

    fn check_outage(&self, id: &str) -> Result<()> {
        if self.fail_for.lock().unwrap().iter().any(|f| f == id) {
            return Err(UmbonoError::Provider("simulated partner outage".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl SharingProviderClient for RecordingClient {
    async fn create_opportunity(&self, request: &OpportunityUpsert) -> Result<String> {
        self.check_outage(&request.opportunity.id)?;
        self.calls
            .lock()
            .unwrap()
            .push(ClientCall::Create { opportunity_id: request.opportunity.id.clone() });
        let n = self.next_external_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("ext-{n}"))
    }

    async fn update_opportunity(&self, request: &OpportunityUpsert) -> Result<()> {
        self.check_outage(&request.opportunity.id)?;
        let external_id = request
            .external_id
            .clone()
            .ok_or_else(|| UmbonoError::InvalidInput("external id required".into()))?;
        self.calls.lock().unwrap().push(ClientCall::Update {
            external_id,
            effective_status: request.effective_status,
        });
        Ok(())
    }

    async fn delete_opportunity(&self, external_id: &str) -> Result<()> {
        self.check_outage(external_id)?;
        self.calls
            .lock()
            .unwrap()
            .push(ClientCall::Delete { external_id: external_id.to_string() });
        Ok(())
    }
}

pub struct SingleClientFactory {
    client: Arc<RecordingClient>,
}

impl SingleClientFactory {
    pub fn new(client: Arc<RecordingClient>) -> Self {
        Self { client }
    }
}

impl SharingClientFactory for SingleClientFactory {
    fn client_for(&self, _partner: Partner) -> Result<Arc<dyn SharingProviderClient>> {
        Ok(self.client.clone())
    }
}

/// Lock double: counts acquisitions/releases, optionally denies acquisition.
#[derive(Default)]
pub struct FakeLock {
    pub deny: AtomicBool,
    pub acquired: AtomicUsize,
    pub released: AtomicUsize,
}

#[async_trait]
impl DistributedLockService for FakeLock {
    async fn try_acquire(&self, _key: &str, _duration: Duration) -> Result<bool> {
        if self.deny.load(Ordering::SeqCst) {
            return Ok(false);
        }
        self.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }

    async fn release(&self, _key: &str) -> Result<()> {
        self.released.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
