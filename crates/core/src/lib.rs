//! # Umbono Core
//!
//! Pure business logic layer - no infrastructure dependencies.
//!
//! This crate contains:
//! - Port/adapter interfaces (traits) for storage, entity accessors,
//!   partner clients and the distributed lock
//! - The schedule API and reconciliation worker of the sharing engine
//!
//! ## Architecture Principles
//! - Only depends on `umbono-domain`
//! - No database, HTTP, or platform code
//! - All external dependencies via traits
//! - Pure, testable business logic

pub mod sharing;

pub use sharing::alignment::{align_for_dispatch, validate_intent, IntentCheck};
pub use sharing::partners::PartnerDirectory;
pub use sharing::ports::{
    DistributedLockService, OpportunityReader, OrganizationReader, ProcessingLogStore,
    SharingClientFactory, SharingProviderClient,
};
pub use sharing::service::{ScheduleOutcome, SharingService};
pub use sharing::worker::{ProcessSummary, SharingBackgroundService};
