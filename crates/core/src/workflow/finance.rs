//! Payment stage: payable claims are paid, or parked on hold and released.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::approval::ApprovalAction;
use crate::domain::claim::{Claim, ClaimStatus, ClaimType};
use crate::domain::role::PortalRole;
use crate::workflow::engine::{optional_remarks, ClaimTransition, PaymentStamp, WorkflowError};
use crate::workflow::registry;

pub const PAYMENT_STAGE: &str = "Finance Payment";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum FinanceDecision {
    MarkPaid { payment_date: NaiveDate, reference: String },
    PutOnHold { remarks: Option<String> },
    ReleaseHold,
}

/// Status a held claim returns to. Derived from the claim type rather than
/// stored, which is exact because only payable claims can be put on hold.
pub fn restored_status_after_hold(claim_type: ClaimType) -> ClaimStatus {
    registry::payable_status(claim_type)
}

pub fn decide_finance(
    claim: &Claim,
    acting_role: PortalRole,
    decision: &FinanceDecision,
) -> Result<ClaimTransition, WorkflowError> {
    if !acting_role.is_finance_desk() {
        return Err(WorkflowError::NotEligible {
            role: acting_role,
            claim_type: claim.claim_type.as_str(),
            status: claim.status,
        });
    }

    let transition = match decision {
        FinanceDecision::MarkPaid { payment_date, reference } => {
            require_payable(claim, "paid")?;
            let reference = reference.trim();
            if reference.is_empty() {
                return Err(WorkflowError::PaymentReferenceRequired);
            }
            ClaimTransition {
                claim_id: claim.id.clone(),
                from: claim.status,
                to: ClaimStatus::Paid,
                next_approver_role: None,
                action: ApprovalAction::Paid,
                stage: PAYMENT_STAGE.to_string(),
                remarks: None,
                payment: Some(PaymentStamp {
                    payment_date: *payment_date,
                    reference: reference.to_string(),
                }),
            }
        }
        FinanceDecision::PutOnHold { remarks } => {
            require_payable(claim, "put on hold")?;
            ClaimTransition {
                claim_id: claim.id.clone(),
                from: claim.status,
                to: ClaimStatus::OnHold,
                next_approver_role: Some(PortalRole::Finance),
                action: ApprovalAction::OnHold,
                stage: PAYMENT_STAGE.to_string(),
                remarks: optional_remarks(remarks.as_deref()),
                payment: None,
            }
        }
        FinanceDecision::ReleaseHold => {
            if claim.status != ClaimStatus::OnHold {
                return Err(WorkflowError::InvalidClaimStatus {
                    status: claim.status,
                    operation: "released from hold",
                });
            }
            ClaimTransition {
                claim_id: claim.id.clone(),
                from: claim.status,
                to: restored_status_after_hold(claim.claim_type),
                next_approver_role: Some(PortalRole::Finance),
                action: ApprovalAction::Released,
                stage: PAYMENT_STAGE.to_string(),
                remarks: None,
                payment: None,
            }
        }
    };

    Ok(transition)
}

pub fn decide_finance_with_audit<S>(
    claim: &Claim,
    acting_role: PortalRole,
    decision: &FinanceDecision,
    sink: &S,
    audit: &AuditContext,
) -> Result<ClaimTransition, WorkflowError>
where
    S: AuditSink,
{
    let result = decide_finance(claim, acting_role, decision);
    let event = match &result {
        Ok(transition) => AuditEvent::new(
            Some(claim.id.0.clone()),
            audit.correlation_id.clone(),
            "claim.finance_decided",
            AuditCategory::Finance,
            audit.actor.clone(),
            AuditOutcome::Success,
        )
        .with_metadata("from", transition.from.as_str())
        .with_metadata("to", transition.to.as_str())
        .with_metadata("action", transition.action.as_str()),
        Err(error) => AuditEvent::new(
            Some(claim.id.0.clone()),
            audit.correlation_id.clone(),
            "claim.finance_rejected",
            AuditCategory::Finance,
            audit.actor.clone(),
            AuditOutcome::Rejected,
        )
        .with_metadata("error", error.to_string()),
    };
    sink.emit(event.with_metadata("role", acting_role.as_str()));
    result
}

/// Claims waiting on the finance desk, held ones included.
pub fn payment_queue(claims: &[Claim]) -> Vec<&Claim> {
    claims
        .iter()
        .filter(|claim| registry::is_payable(claim.status) || claim.status == ClaimStatus::OnHold)
        .collect()
}

fn require_payable(claim: &Claim, operation: &'static str) -> Result<(), WorkflowError> {
    if registry::is_payable(claim.status) {
        Ok(())
    } else {
        Err(WorkflowError::InvalidClaimStatus { status: claim.status, operation })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};

    use super::{decide_finance, decide_finance_with_audit, payment_queue, FinanceDecision};
    use crate::audit::{AuditCategory, AuditContext, AuditOutcome, InMemoryAuditSink};
    use crate::domain::approval::ApprovalAction;
    use crate::domain::claim::{ClaimStatus, ClaimType};
    use crate::domain::role::PortalRole;
    use crate::workflow::engine::tests::claim_fixture;
    use crate::workflow::engine::WorkflowError;

    fn pay(reference: &str) -> FinanceDecision {
        FinanceDecision::MarkPaid {
            payment_date: NaiveDate::from_ymd_opt(2026, 3, 20).expect("date"),
            reference: reference.to_string(),
        }
    }

    #[test]
    fn finance_marks_payable_claim_paid_with_reference() {
        let mut claim = claim_fixture(ClaimType::Normal, ClaimStatus::AdminApproved);

        let transition =
            decide_finance(&claim, PortalRole::Finance, &pay(" TXN123 ")).expect("pay");
        transition.apply_to(&mut claim, Utc::now());

        assert_eq!(claim.status, ClaimStatus::Paid);
        assert_eq!(claim.payment_reference.as_deref(), Some("TXN123"));
        assert_eq!(claim.payment_date, NaiveDate::from_ymd_opt(2026, 3, 20));
        assert_eq!(transition.action, ApprovalAction::Paid);
    }

    #[test]
    fn payment_requires_reference_and_payable_status() {
        let claim = claim_fixture(ClaimType::SalesPromotion, ClaimStatus::CfoApproved);
        assert_eq!(
            decide_finance(&claim, PortalRole::Finance, &pay("  ")),
            Err(WorkflowError::PaymentReferenceRequired)
        );

        let not_ready = claim_fixture(ClaimType::SalesPromotion, ClaimStatus::CroApproved);
        assert!(matches!(
            decide_finance(&not_ready, PortalRole::Finance, &pay("TXN1")),
            Err(WorkflowError::InvalidClaimStatus { status: ClaimStatus::CroApproved, .. })
        ));
    }

    #[test]
    fn only_finance_desk_may_act() {
        let claim = claim_fixture(ClaimType::Normal, ClaimStatus::AdminApproved);
        assert!(matches!(
            decide_finance(&claim, PortalRole::AdminHead, &pay("TXN1")),
            Err(WorkflowError::NotEligible { .. })
        ));
        assert!(decide_finance(&claim, PortalRole::Admin, &pay("TXN1")).is_ok());
    }

    #[test]
    fn release_restores_status_from_claim_type() {
        for (claim_type, expected) in [
            (ClaimType::Normal, ClaimStatus::AdminApproved),
            (ClaimType::SalesPromotion, ClaimStatus::CfoApproved),
        ] {
            let mut claim = claim_fixture(claim_type, ClaimStatus::OnHold);
            let transition = decide_finance(&claim, PortalRole::Finance, &FinanceDecision::ReleaseHold)
                .expect("release");
            transition.apply_to(&mut claim, Utc::now());
            assert_eq!(claim.status, expected);
        }
    }

    #[test]
    fn hold_round_trip_returns_to_pre_hold_status() {
        let mut claim = claim_fixture(ClaimType::SalesPromotion, ClaimStatus::CfoApproved);
        decide_finance(
            &claim,
            PortalRole::Finance,
            &FinanceDecision::PutOnHold { remarks: Some("awaiting GST invoice".to_string()) },
        )
        .expect("hold")
        .apply_to(&mut claim, Utc::now());
        assert_eq!(claim.status, ClaimStatus::OnHold);

        decide_finance(&claim, PortalRole::Finance, &FinanceDecision::ReleaseHold)
            .expect("release")
            .apply_to(&mut claim, Utc::now());
        assert_eq!(claim.status, ClaimStatus::CfoApproved);
        assert_eq!(claim.version, 3);
    }

    #[test]
    fn held_claims_cannot_be_paid_or_held_again() {
        let claim = claim_fixture(ClaimType::Normal, ClaimStatus::OnHold);
        assert!(decide_finance(&claim, PortalRole::Finance, &pay("TXN9")).is_err());
        assert!(decide_finance(
            &claim,
            PortalRole::Finance,
            &FinanceDecision::PutOnHold { remarks: None }
        )
        .is_err());
    }

    #[test]
    fn payment_queue_lists_payable_and_held_claims() {
        let claims = vec![
            claim_fixture(ClaimType::Normal, ClaimStatus::AdminApproved),
            claim_fixture(ClaimType::Normal, ClaimStatus::OnHold),
            claim_fixture(ClaimType::Normal, ClaimStatus::ManagerApproved),
            claim_fixture(ClaimType::Normal, ClaimStatus::Paid),
        ];
        assert_eq!(payment_queue(&claims).len(), 2);
    }

    #[test]
    fn finance_decisions_are_audited_under_the_finance_category() {
        let sink = InMemoryAuditSink::default();
        let claim = claim_fixture(ClaimType::Normal, ClaimStatus::AdminApproved);
        let audit = AuditContext::new(Some(claim.id.0.clone()), "req-fin", "farah@example.com");

        let hold = FinanceDecision::PutOnHold { remarks: None };
        decide_finance_with_audit(&claim, PortalRole::Finance, &hold, &sink, &audit).expect("hold");
        let refused = decide_finance_with_audit(&claim, PortalRole::Manager, &hold, &sink, &audit);
        assert!(refused.is_err());

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|event| event.category == AuditCategory::Finance));
        assert_eq!(events[0].event_type, "claim.finance_decided");
        assert_eq!(events[0].metadata.get("to").map(String::as_str), Some("on_hold"));
        assert_eq!(events[1].outcome, AuditOutcome::Rejected);
        assert_eq!(events[1].metadata.get("role").map(String::as_str), Some("manager"));
    }
}
