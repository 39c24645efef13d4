//! # Umbono Domain
//!
//! Pure domain types for the partner sharing engine.
//!
//! This crate contains:
//! - The processing log model and its status/action enums
//! - Read-model snapshots of the entities being shared
//! - Configuration types
//! - The shared error enum
//!
//! No I/O, no async, no infrastructure dependencies.

pub mod errors;
pub mod macros;
pub mod types;

pub use errors::{Result, UmbonoError};
pub use types::config::{Config, DatabaseConfig, PartnerSettings, SharingJobConfig};
pub use types::entity::{
    Opportunity, OpportunityKind, OpportunityStatus, Organization, OrganizationStatus,
};
pub use types::sharing::{
    EntityType, OpportunityUpsert, Partner, ProcessingAction, ProcessingLog, ProcessingStatus,
};
