//! Read-model snapshots of the entities owned by the platform services
//!
//! The sharing engine never mutates these; it re-reads them at execution
//! time through the entity accessor ports, so a snapshot always reflects
//! the live state of the platform, not the state at schedule time.

use serde::{Deserialize, Serialize};

use crate::impl_status_conversions;

/// Opportunity lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpportunityStatus {
    Active,
    Inactive,
    Expired,
    Deleted,
}

impl_status_conversions!(OpportunityStatus {
    Active => "active",
    Inactive => "inactive",
    Expired => "expired",
    Deleted => "deleted",
});

/// Opportunity kind; partners may restrict which kinds they accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpportunityKind {
    Learning,
    Task,
    Event,
    Other,
}

impl_status_conversions!(OpportunityKind {
    Learning => "learning",
    Task => "task",
    Event => "event",
    Other => "other",
});

/// Organization lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrganizationStatus {
    Active,
    Inactive,
    Declined,
    Deleted,
}

impl_status_conversions!(OrganizationStatus {
    Active => "active",
    Inactive => "inactive",
    Declined => "declined",
    Deleted => "deleted",
});

/// Opportunity snapshot as read from the entity service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Opportunity {
    pub id: String,
    pub organization_id: String,
    pub organization_name: String,
    pub title: String,
    pub summary: Option<String>,
    pub kind: OpportunityKind,
    pub status: OpportunityStatus,
    /// Status of the owning organization, denormalised onto the snapshot so
    /// implicit alignment does not need a second read.
    pub organization_status: OrganizationStatus,
    /// Once shared, this flag cannot be un-set by the platform UI; a cleared
    /// flag therefore means "never shared, skip".
    pub share_with_partners: bool,
    pub hidden: bool,
    pub verification_enabled: bool,
    pub date_start: i64,
    pub date_end: Option<i64>,
    /// ISO 3166-1 alpha-2 codes, plus `WW` for worldwide.
    pub country_codes: Vec<String>,
    pub url: String,
}

/// Organization snapshot as read from the entity service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Organization {
    pub id: String,
    pub name: String,
    pub status: OrganizationStatus,
    pub street_address: Option<String>,
    pub city: Option<String>,
    pub province: Option<String>,
    pub postal_code: Option<String>,
    pub primary_contact_name: Option<String>,
    pub primary_contact_email: Option<String>,
}
