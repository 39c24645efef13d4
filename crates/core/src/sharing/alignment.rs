//! Intent re-validation and implicit state alignment
//!
//! Pure functions, deliberately free of ports and I/O: the reconciliation
//! loop calls them with the *live* entity snapshot just before dispatch,
//! because the world may have changed between schedule and execution.

use umbono_domain::{
    Opportunity, OpportunityStatus, OrganizationStatus, ProcessingAction, Result, UmbonoError,
};

/// Only active opportunities are creatable on a partner system.
pub const STATUSES_CREATABLE: [OpportunityStatus; 1] = [OpportunityStatus::Active];

/// Expired is updatable: the end date might have been moved into the past.
pub const STATUSES_UPDATABLE: [OpportunityStatus; 3] =
    [OpportunityStatus::Active, OpportunityStatus::Inactive, OpportunityStatus::Expired];

/// Deleted is deletable: implicit deletion due to organization deletion.
pub const STATUSES_DELETABLE: [OpportunityStatus; 4] = [
    OpportunityStatus::Active,
    OpportunityStatus::Inactive,
    OpportunityStatus::Expired,
    OpportunityStatus::Deleted,
];

/// Result of re-validating a scheduled intent against the live entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntentCheck {
    Valid,
    /// The intent is no longer valid; the row should be aborted with this
    /// reason and no partner call made. Expected under eventual consistency,
    /// not a bug.
    Stale(String),
}

/// Re-validate a scheduled action against the current entity state.
pub fn validate_intent(action: ProcessingAction, opportunity: &Opportunity) -> IntentCheck {
    if !opportunity.share_with_partners {
        return IntentCheck::Stale("opportunity no longer flagged for partner sharing".into());
    }

    match action {
        ProcessingAction::Create => {
            if !STATUSES_CREATABLE.contains(&opportunity.status) {
                return IntentCheck::Stale(format!(
                    "opportunity status '{}' is not creatable",
                    opportunity.status
                ));
            }
            if opportunity.organization_status != OrganizationStatus::Active {
                return IntentCheck::Stale(format!(
                    "owning organization is '{}'",
                    opportunity.organization_status
                ));
            }
        }

        ProcessingAction::Update => {
            if !STATUSES_UPDATABLE.contains(&opportunity.status) {
                return IntentCheck::Stale(format!(
                    "opportunity status '{}' is not updatable",
                    opportunity.status
                ));
            }
        }

        ProcessingAction::Delete => {
            if !STATUSES_DELETABLE.contains(&opportunity.status) {
                return IntentCheck::Stale(format!(
                    "opportunity status '{}' is not deletable",
                    opportunity.status
                ));
            }
            // Outbound deletes are suspended while the organization is merely
            // deactivated or declined; implicit deletion due to organization
            // deletion must still go through.
            if !matches!(
                opportunity.organization_status,
                OrganizationStatus::Active | OrganizationStatus::Deleted
            ) {
                return IntentCheck::Stale(format!(
                    "owning organization is '{}'",
                    opportunity.organization_status
                ));
            }
        }
    }

    IntentCheck::Valid
}

/// Derive the effective status to present to the partner.
///
/// An `Update` first coerces the status to inactive when the owning
/// organization is no longer active, or the end date is in the past, so the
/// partner never receives a stale "active" record. If the result falls
/// outside the action's allowed set this is a data-consistency fault (a row
/// created out of order), not a silent abort.
pub fn align_for_dispatch(
    action: ProcessingAction,
    opportunity: &Opportunity,
    now: i64,
) -> Result<OpportunityStatus> {
    let mut effective = opportunity.status;

    if action == ProcessingAction::Update {
        let organization_inactive =
            opportunity.organization_status != OrganizationStatus::Active;
        let end_date_in_past = opportunity.date_end.is_some_and(|end| end <= now);

        if effective == OpportunityStatus::Active && (organization_inactive || end_date_in_past) {
            effective = OpportunityStatus::Inactive;
        }

        if !STATUSES_UPDATABLE.contains(&effective) {
            return Err(UmbonoError::DataInconsistency(format!(
                "aligned status '{}' is not supported for update of opportunity '{}'",
                effective, opportunity.id
            )));
        }
    }

    Ok(effective)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sharing::testing::sample_opportunity;

    const NOW: i64 = 1_750_000_000;

    #[test]
    fn create_valid_for_active_opportunity_and_organization() {
        let opportunity = sample_opportunity("opp-1");
        assert_eq!(validate_intent(ProcessingAction::Create, &opportunity), IntentCheck::Valid);
    }

    #[test]
    fn create_stale_when_opportunity_inactive() {
        let mut opportunity = sample_opportunity("opp-1");
        opportunity.status = OpportunityStatus::Inactive;

        let check = validate_intent(ProcessingAction::Create, &opportunity);
        assert!(matches!(check, IntentCheck::Stale(reason) if reason.contains("not creatable")));
    }

    #[test]
    fn create_stale_when_organization_deactivated() {
        let mut opportunity = sample_opportunity("opp-1");
        opportunity.organization_status = OrganizationStatus::Inactive;

        let check = validate_intent(ProcessingAction::Create, &opportunity);
        assert!(matches!(check, IntentCheck::Stale(reason) if reason.contains("organization")));
    }

    #[test]
    fn any_action_stale_when_share_flag_cleared() {
        let mut opportunity = sample_opportunity("opp-1");
        opportunity.share_with_partners = false;

        for action in
            [ProcessingAction::Create, ProcessingAction::Update, ProcessingAction::Delete]
        {
            assert!(matches!(validate_intent(action, &opportunity), IntentCheck::Stale(_)));
        }
    }

    #[test]
    fn update_valid_for_expired_opportunity() {
        let mut opportunity = sample_opportunity("opp-1");
        opportunity.status = OpportunityStatus::Expired;

        assert_eq!(validate_intent(ProcessingAction::Update, &opportunity), IntentCheck::Valid);
    }

    #[test]
    fn update_stale_for_deleted_opportunity() {
        let mut opportunity = sample_opportunity("opp-1");
        opportunity.status = OpportunityStatus::Deleted;

        assert!(matches!(
            validate_intent(ProcessingAction::Update, &opportunity),
            IntentCheck::Stale(_)
        ));
    }

    #[test]
    fn delete_stale_when_organization_deactivated() {
        let mut opportunity = sample_opportunity("opp-1");
        opportunity.organization_status = OrganizationStatus::Inactive;

        assert!(matches!(
            validate_intent(ProcessingAction::Delete, &opportunity),
            IntentCheck::Stale(_)
        ));
    }

    #[test]
    fn delete_valid_when_organization_deleted() {
        let mut opportunity = sample_opportunity("opp-1");
        opportunity.status = OpportunityStatus::Deleted;
        opportunity.organization_status = OrganizationStatus::Deleted;

        assert_eq!(validate_intent(ProcessingAction::Delete, &opportunity), IntentCheck::Valid);
    }

    #[test]
    fn align_keeps_active_status_for_create() {
        let opportunity = sample_opportunity("opp-1");

        let effective = align_for_dispatch(ProcessingAction::Create, &opportunity, NOW).unwrap();
        assert_eq!(effective, OpportunityStatus::Active);
    }

    #[test]
    fn align_coerces_update_to_inactive_for_inactive_organization() {
        let mut opportunity = sample_opportunity("opp-1");
        opportunity.organization_status = OrganizationStatus::Inactive;

        let effective = align_for_dispatch(ProcessingAction::Update, &opportunity, NOW).unwrap();
        assert_eq!(effective, OpportunityStatus::Inactive);
    }

    #[test]
    fn align_coerces_update_to_inactive_for_past_end_date() {
        let mut opportunity = sample_opportunity("opp-1");
        opportunity.date_end = Some(NOW - 60);

        let effective = align_for_dispatch(ProcessingAction::Update, &opportunity, NOW).unwrap();
        assert_eq!(effective, OpportunityStatus::Inactive);
    }

    #[test]
    fn align_leaves_future_end_date_untouched() {
        let mut opportunity = sample_opportunity("opp-1");
        opportunity.date_end = Some(NOW + 3600);

        let effective = align_for_dispatch(ProcessingAction::Update, &opportunity, NOW).unwrap();
        assert_eq!(effective, OpportunityStatus::Active);
    }

    #[test]
    fn align_rejects_update_of_deleted_opportunity() {
        let mut opportunity = sample_opportunity("opp-1");
        opportunity.status = OpportunityStatus::Deleted;

        let err = align_for_dispatch(ProcessingAction::Update, &opportunity, NOW).unwrap_err();
        assert!(matches!(err, UmbonoError::DataInconsistency(_)));
    }
}
