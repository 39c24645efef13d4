//! Partner resolution for scheduling
//!
//! Decides which partner integrations a given entity change applies to:
//! partner-level settings (active, per-action toggles) combined with
//! entity- and partner-specific eligibility rules.

use std::sync::Arc;

use tracing::info;
use umbono_domain::{
    EntityType, Opportunity, OpportunityKind, Partner, PartnerSettings, ProcessingAction, Result,
    UmbonoError,
};

use super::ports::OpportunityReader;

/// Countries accepted by SA Youth; at least one must be attached to the
/// opportunity. `WW` marks a worldwide opportunity.
const REQUIRED_COUNTRIES_ANY_OF_SAYOUTH: [&str; 2] = ["ZA", "WW"];

/// Resolves the partners applicable to an entity change.
pub struct PartnerDirectory {
    settings: Vec<PartnerSettings>,
    opportunities: Arc<dyn OpportunityReader>,
}

impl PartnerDirectory {
    pub fn new(settings: Vec<PartnerSettings>, opportunities: Arc<dyn OpportunityReader>) -> Self {
        Self { settings, opportunities }
    }

    /// Whether the partner is active and has the given action enabled.
    pub fn action_enabled(&self, partner: Partner, action: ProcessingAction) -> bool {
        self.settings
            .iter()
            .any(|s| s.partner == partner && s.active && s.action_enabled(action))
    }

    /// Partners the given entity change should be scheduled for.
    ///
    /// Returns an empty list when the entity is not eligible for sharing;
    /// a hidden entity flagged for sharing is a data-consistency fault.
    pub async fn list_for_scheduling(
        &self,
        action: ProcessingAction,
        entity_type: EntityType,
        entity_id: &str,
    ) -> Result<Vec<Partner>> {
        let candidates: Vec<&PartnerSettings> = self
            .settings
            .iter()
            .filter(|s| s.active && s.action_enabled(action))
            .collect();

        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        match entity_type {
            EntityType::Opportunity => {
                let opportunity = self.opportunities.opportunity_by_id(entity_id).await?;

                // Once shared, the flag cannot be disabled; unset means never shared.
                if !opportunity.share_with_partners {
                    info!(
                        entity_type = %entity_type,
                        entity_id,
                        "opportunity not flagged for sharing, skipped"
                    );
                    return Ok(Vec::new());
                }

                if opportunity.hidden {
                    return Err(UmbonoError::DataInconsistency(format!(
                        "opportunity '{entity_id}' is hidden but has sharing enabled"
                    )));
                }

                let mut results = Vec::new();
                for settings in candidates {
                    if Self::eligible_for_partner(settings.partner, entity_id, &opportunity) {
                        results.push(settings.partner);
                    }
                }
                Ok(results)
            }
        }
    }

    fn eligible_for_partner(
        partner: Partner,
        entity_id: &str,
        opportunity: &Opportunity,
    ) -> bool {
        match partner {
            Partner::SaYouth => {
                // Once shared, the kind can not be changed.
                if opportunity.kind != OpportunityKind::Learning {
                    info!(entity_id, %partner, "not a learning opportunity, skipped");
                    return false;
                }

                // Once shared, the end date can be changed but not removed.
                if opportunity.date_end.is_none() {
                    info!(entity_id, %partner, "no end date, skipped");
                    return false;
                }

                let has_required_country = opportunity.country_codes.iter().any(|code| {
                    REQUIRED_COUNTRIES_ANY_OF_SAYOUTH
                        .iter()
                        .any(|required| required.eq_ignore_ascii_case(code))
                });
                if !has_required_country {
                    info!(entity_id, %partner, "not associated with a required country, skipped");
                    return false;
                }

                true
            }
        }
    }
}
