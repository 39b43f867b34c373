use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::approval::ApprovalAction;
use crate::domain::booking::BookingStatus;
use crate::domain::claim::{Claim, ClaimId, ClaimStatus};
use crate::domain::role::PortalRole;
use crate::workflow::resolver::WorkflowTable;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum ClaimDecision {
    Approve { remarks: Option<String> },
    Reject { remarks: String },
    SendBack { remarks: String },
}

impl ClaimDecision {
    fn verb(&self) -> &'static str {
        match self {
            Self::Approve { .. } => "approve",
            Self::Reject { .. } => "reject",
            Self::SendBack { .. } => "send back",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentStamp {
    pub payment_date: NaiveDate,
    pub reference: String,
}

/// A decided, not yet persisted, claim status change.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimTransition {
    pub claim_id: ClaimId,
    pub from: ClaimStatus,
    pub to: ClaimStatus,
    pub next_approver_role: Option<PortalRole>,
    pub action: ApprovalAction,
    pub stage: String,
    pub remarks: Option<String>,
    pub payment: Option<PaymentStamp>,
}

impl ClaimTransition {
    /// Applies the change and bumps the claim's version stamp.
    pub fn apply_to(&self, claim: &mut Claim, now: DateTime<Utc>) {
        claim.status = self.to;
        claim.current_approver_role = self.next_approver_role;
        match self.action {
            ApprovalAction::Rejected => claim.rejection_reason = self.remarks.clone(),
            ApprovalAction::SendBack => claim.send_back_reason = self.remarks.clone(),
            ApprovalAction::Resubmitted => claim.send_back_reason = None,
            ApprovalAction::Paid => {
                if let Some(payment) = &self.payment {
                    claim.payment_date = Some(payment.payment_date);
                    claim.payment_reference = Some(payment.reference.clone());
                }
            }
            ApprovalAction::Submitted
            | ApprovalAction::Approved
            | ApprovalAction::OnHold
            | ApprovalAction::Released => {}
        }
        claim.version += 1;
        claim.updated_at = now;
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("role `{role}` cannot act on {claim_type} claim in status `{status}`")]
    NotEligible { role: PortalRole, claim_type: &'static str, status: ClaimStatus },
    #[error("remarks are required to {action}")]
    RemarksRequired { action: &'static str },
    #[error("claims can only be sent back at the verification stage")]
    SendBackNotAllowed,
    #[error("claim in status `{status}` cannot be {operation}")]
    InvalidClaimStatus { status: ClaimStatus, operation: &'static str },
    #[error("a payment reference is required to mark a claim paid")]
    PaymentReferenceRequired,
    #[error("only the owner may {operation}")]
    NotOwner { operation: &'static str },
    #[error("role `{role}` cannot decide room bookings")]
    BookingNotEligible { role: PortalRole },
    #[error("booking in status `{status}` cannot be {operation}")]
    InvalidBookingStatus { status: BookingStatus, operation: &'static str },
    #[error("room is already booked for an overlapping slot: {}", .conflicting.join(", "))]
    BookingConflict { conflicting: Vec<String> },
    #[error("{attendees} attendees exceed room capacity of {capacity}")]
    CapacityExceeded { attendees: u32, capacity: u32 },
    #[error("validation failed: {}", .problems.join("; "))]
    Validation { problems: Vec<String> },
}

pub(crate) fn required_remarks(
    remarks: &str,
    action: &'static str,
) -> Result<String, WorkflowError> {
    let trimmed = remarks.trim();
    if trimmed.is_empty() {
        return Err(WorkflowError::RemarksRequired { action });
    }
    Ok(trimmed.to_string())
}

pub(crate) fn optional_remarks(remarks: Option<&str>) -> Option<String> {
    remarks.map(str::trim).filter(|value| !value.is_empty()).map(str::to_string)
}

#[derive(Clone, Debug, Default)]
pub struct WorkflowEngine {
    table: WorkflowTable,
}

impl WorkflowEngine {
    pub fn new(table: WorkflowTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &WorkflowTable {
        &self.table
    }

    /// Role that must act first once a claim of this kind is submitted.
    pub fn first_approver(&self, claim: &Claim) -> Option<PortalRole> {
        self.table.first_approver(claim.claim_type, claim.is_torch_bearer)
    }

    pub fn decide(
        &self,
        claim: &Claim,
        acting_role: PortalRole,
        decision: &ClaimDecision,
    ) -> Result<ClaimTransition, WorkflowError> {
        let resolved = self.table.resolve_action(claim, acting_role);
        let (true, Some(to_status), Some(stage)) =
            (resolved.can_act, resolved.next_status_on_approve, resolved.stage)
        else {
            return Err(not_eligible(claim, acting_role));
        };

        let transition = match decision {
            ClaimDecision::Approve { remarks } => ClaimTransition {
                claim_id: claim.id.clone(),
                from: claim.status,
                to: to_status,
                next_approver_role: resolved.next_approver_role,
                action: ApprovalAction::Approved,
                stage,
                remarks: optional_remarks(remarks.as_deref()),
                payment: None,
            },
            ClaimDecision::Reject { remarks } => ClaimTransition {
                claim_id: claim.id.clone(),
                from: claim.status,
                to: ClaimStatus::Rejected,
                next_approver_role: None,
                action: ApprovalAction::Rejected,
                stage,
                remarks: Some(required_remarks(remarks, decision.verb())?),
                payment: None,
            },
            ClaimDecision::SendBack { remarks } => {
                let remarks = required_remarks(remarks, decision.verb())?;
                if !resolved.can_send_back {
                    return Err(WorkflowError::SendBackNotAllowed);
                }
                ClaimTransition {
                    claim_id: claim.id.clone(),
                    from: claim.status,
                    to: ClaimStatus::SentBack,
                    next_approver_role: None,
                    action: ApprovalAction::SendBack,
                    stage,
                    remarks: Some(remarks),
                    payment: None,
                }
            }
        };

        Ok(transition)
    }

    pub fn decide_with_audit<S>(
        &self,
        claim: &Claim,
        acting_role: PortalRole,
        decision: &ClaimDecision,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<ClaimTransition, WorkflowError>
    where
        S: AuditSink,
    {
        let result = self.decide(claim, acting_role, decision);
        match &result {
            Ok(transition) => sink.emit(
                AuditEvent::new(
                    Some(claim.id.0.clone()),
                    audit.correlation_id.clone(),
                    "claim.transition_decided",
                    AuditCategory::Workflow,
                    audit.actor.clone(),
                    AuditOutcome::Success,
                )
                .with_metadata("from", transition.from.as_str())
                .with_metadata("to", transition.to.as_str())
                .with_metadata("action", transition.action.as_str())
                .with_metadata("role", acting_role.as_str()),
            ),
            Err(error) => sink.emit(
                AuditEvent::new(
                    Some(claim.id.0.clone()),
                    audit.correlation_id.clone(),
                    "claim.transition_rejected",
                    AuditCategory::Workflow,
                    audit.actor.clone(),
                    AuditOutcome::Rejected,
                )
                .with_metadata("error", error.to_string()),
            ),
        }
        result
    }

    /// Draft -> submitted by the owner.
    pub fn submit_draft(
        &self,
        claim: &Claim,
        actor_email: &str,
    ) -> Result<ClaimTransition, WorkflowError> {
        if !claim.is_owned_by(actor_email) {
            return Err(WorkflowError::NotOwner { operation: "submit this claim" });
        }
        if claim.status != ClaimStatus::Draft {
            return Err(WorkflowError::InvalidClaimStatus {
                status: claim.status,
                operation: "submitted",
            });
        }
        Ok(self.entry_transition(claim, ApprovalAction::Submitted, "Submission"))
    }

    /// Sent back -> submitted by the owner; `send_back_reason` is cleared and
    /// the original SLA date is kept.
    pub fn resubmit(
        &self,
        claim: &Claim,
        actor_email: &str,
    ) -> Result<ClaimTransition, WorkflowError> {
        if !claim.is_owned_by(actor_email) {
            return Err(WorkflowError::NotOwner { operation: "resubmit this claim" });
        }
        if claim.status != ClaimStatus::SentBack {
            return Err(WorkflowError::InvalidClaimStatus {
                status: claim.status,
                operation: "resubmitted",
            });
        }
        Ok(self.entry_transition(claim, ApprovalAction::Resubmitted, "Resubmission"))
    }

    fn entry_transition(
        &self,
        claim: &Claim,
        action: ApprovalAction,
        stage: &str,
    ) -> ClaimTransition {
        ClaimTransition {
            claim_id: claim.id.clone(),
            from: claim.status,
            to: ClaimStatus::Submitted,
            next_approver_role: self.first_approver(claim),
            action,
            stage: stage.to_string(),
            remarks: None,
            payment: None,
        }
    }
}

fn not_eligible(claim: &Claim, role: PortalRole) -> WorkflowError {
    WorkflowError::NotEligible {
        role,
        claim_type: claim.claim_type.as_str(),
        status: claim.status,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};
    use rust_decimal::Decimal;

    use super::{ClaimDecision, WorkflowEngine, WorkflowError};
    use crate::audit::{AuditContext, InMemoryAuditSink};
    use crate::domain::approval::ApprovalAction;
    use crate::domain::category::CategoryId;
    use crate::domain::claim::{Claim, ClaimId, ClaimStatus, ClaimType};
    use crate::domain::role::PortalRole;

    pub(crate) fn claim_fixture(claim_type: ClaimType, status: ClaimStatus) -> Claim {
        let created_at = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).single().expect("timestamp");
        Claim {
            id: ClaimId("claim-0001".to_string()),
            claim_number: "CLM-M7Q2K1".to_string(),
            claim_type,
            status,
            current_approver_role: None,
            employee_name: "Asha Rao".to_string(),
            employee_email: "asha@example.com".to_string(),
            department: "Sales".to_string(),
            designation: "Executive".to_string(),
            category_id: CategoryId("cat-travel".to_string()),
            category_name: "Travel - Local Conveyance".to_string(),
            is_torch_bearer: false,
            expense_date: NaiveDate::from_ymd_opt(2026, 3, 1).expect("date"),
            purpose: "Client visit".to_string(),
            bill_number: Some("B-77".to_string()),
            bill_date: NaiveDate::from_ymd_opt(2026, 3, 1),
            amount: Decimal::new(5_000, 0),
            payment_mode: "upi".to_string(),
            description: None,
            document_urls: vec!["https://files.example.com/bill-77.pdf".to_string()],
            rejection_reason: None,
            send_back_reason: None,
            payment_date: None,
            payment_reference: None,
            sla_date: NaiveDate::from_ymd_opt(2026, 4, 16).expect("date"),
            version: 1,
            created_at,
            updated_at: created_at,
        }
    }

    fn approve() -> ClaimDecision {
        ClaimDecision::Approve { remarks: None }
    }

    fn walk(claim_type: ClaimType, roles: &[PortalRole]) -> Vec<ClaimStatus> {
        let engine = WorkflowEngine::default();
        let mut claim = claim_fixture(claim_type, ClaimStatus::Submitted);
        let mut seen = vec![claim.status];
        for role in roles {
            let transition = engine.decide(&claim, *role, &approve()).expect("stage approval");
            transition.apply_to(&mut claim, Utc::now());
            seen.push(claim.status);
        }
        seen
    }

    #[test]
    fn normal_claim_is_approved_by_junior_admin_manager_admin_head() {
        let seen = walk(
            ClaimType::Normal,
            &[PortalRole::JuniorAdmin, PortalRole::Manager, PortalRole::AdminHead],
        );
        assert_eq!(
            seen,
            vec![
                ClaimStatus::Submitted,
                ClaimStatus::Verified,
                ClaimStatus::ManagerApproved,
                ClaimStatus::AdminApproved
            ]
        );
    }

    #[test]
    fn sales_promotion_claim_is_approved_by_manager_cro_cfo() {
        let seen = walk(
            ClaimType::SalesPromotion,
            &[PortalRole::Manager, PortalRole::Cro, PortalRole::Cfo],
        );
        assert_eq!(
            seen,
            vec![
                ClaimStatus::Submitted,
                ClaimStatus::ManagerApproved,
                ClaimStatus::CroApproved,
                ClaimStatus::CfoApproved
            ]
        );
    }

    #[test]
    fn approval_routes_to_next_approver_and_bumps_version() {
        let engine = WorkflowEngine::default();
        let mut claim = claim_fixture(ClaimType::Normal, ClaimStatus::Submitted);

        let transition =
            engine.decide(&claim, PortalRole::JuniorAdmin, &approve()).expect("verify");
        transition.apply_to(&mut claim, Utc::now());

        assert_eq!(claim.current_approver_role, Some(PortalRole::Manager));
        assert_eq!(claim.version, 2);
        assert_eq!(transition.stage, "Verification");
    }

    #[test]
    fn reject_and_send_back_require_non_blank_remarks() {
        let engine = WorkflowEngine::default();
        let claim = claim_fixture(ClaimType::Normal, ClaimStatus::Submitted);

        for decision in [
            ClaimDecision::Reject { remarks: "   ".to_string() },
            ClaimDecision::SendBack { remarks: String::new() },
        ] {
            let error = engine
                .decide(&claim, PortalRole::JuniorAdmin, &decision)
                .expect_err("blank remarks must fail");
            assert!(matches!(error, WorkflowError::RemarksRequired { .. }));
        }
    }

    #[test]
    fn reject_records_trimmed_reason_and_clears_approver() {
        let engine = WorkflowEngine::default();
        let mut claim = claim_fixture(ClaimType::Normal, ClaimStatus::Verified);
        claim.current_approver_role = Some(PortalRole::Manager);

        let transition = engine
            .decide(
                &claim,
                PortalRole::Manager,
                &ClaimDecision::Reject { remarks: "  duplicate bill ".to_string() },
            )
            .expect("reject");
        transition.apply_to(&mut claim, Utc::now());

        assert_eq!(claim.status, ClaimStatus::Rejected);
        assert_eq!(claim.rejection_reason.as_deref(), Some("duplicate bill"));
        assert_eq!(claim.current_approver_role, None);
        assert_eq!(transition.action, ApprovalAction::Rejected);
    }

    #[test]
    fn send_back_is_refused_after_verification() {
        let engine = WorkflowEngine::default();
        let claim = claim_fixture(ClaimType::Normal, ClaimStatus::Verified);

        let error = engine
            .decide(
                &claim,
                PortalRole::Manager,
                &ClaimDecision::SendBack { remarks: "missing bill".to_string() },
            )
            .expect_err("manager cannot send back");
        assert_eq!(error, WorkflowError::SendBackNotAllowed);
    }

    #[test]
    fn ineligible_role_is_rejected() {
        let engine = WorkflowEngine::default();
        let claim = claim_fixture(ClaimType::SalesPromotion, ClaimStatus::Submitted);

        let error =
            engine.decide(&claim, PortalRole::JuniorAdmin, &approve()).expect_err("not eligible");
        assert!(matches!(error, WorkflowError::NotEligible { role: PortalRole::JuniorAdmin, .. }));
    }

    #[test]
    fn resubmission_clears_send_back_reason_and_keeps_sla_date() {
        let engine = WorkflowEngine::default();
        let mut claim = claim_fixture(ClaimType::Normal, ClaimStatus::SentBack);
        claim.send_back_reason = Some("attach bill".to_string());
        let sla_date = claim.sla_date;

        let transition = engine.resubmit(&claim, "ASHA@example.com").expect("owner resubmits");
        transition.apply_to(&mut claim, Utc::now());

        assert_eq!(claim.status, ClaimStatus::Submitted);
        assert_eq!(claim.send_back_reason, None);
        assert_eq!(claim.sla_date, sla_date);
        assert_eq!(claim.current_approver_role, Some(PortalRole::JuniorAdmin));
        assert_eq!(transition.action, ApprovalAction::Resubmitted);
    }

    #[test]
    fn only_owner_may_resubmit_and_only_from_sent_back() {
        let engine = WorkflowEngine::default();
        let sent_back = claim_fixture(ClaimType::Normal, ClaimStatus::SentBack);
        assert!(matches!(
            engine.resubmit(&sent_back, "other@example.com"),
            Err(WorkflowError::NotOwner { .. })
        ));

        let rejected = claim_fixture(ClaimType::Normal, ClaimStatus::Rejected);
        assert!(matches!(
            engine.resubmit(&rejected, "asha@example.com"),
            Err(WorkflowError::InvalidClaimStatus { status: ClaimStatus::Rejected, .. })
        ));
    }

    #[test]
    fn draft_submission_routes_sales_promotion_to_manager() {
        let engine = WorkflowEngine::default();
        let draft = claim_fixture(ClaimType::SalesPromotion, ClaimStatus::Draft);

        let transition = engine.submit_draft(&draft, "asha@example.com").expect("submit");
        assert_eq!(transition.to, ClaimStatus::Submitted);
        assert_eq!(transition.next_approver_role, Some(PortalRole::Manager));
    }

    #[test]
    fn decisions_emit_audit_events() {
        let engine = WorkflowEngine::default();
        let sink = InMemoryAuditSink::default();
        let claim = claim_fixture(ClaimType::Normal, ClaimStatus::Submitted);
        let audit = AuditContext::new(Some(claim.id.0.clone()), "req-7", "ravi@example.com");

        let _ = engine.decide_with_audit(&claim, PortalRole::JuniorAdmin, &approve(), &sink, &audit);
        let _ = engine.decide_with_audit(&claim, PortalRole::Cfo, &approve(), &sink, &audit);

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, "claim.transition_decided");
        assert_eq!(events[0].metadata.get("to").map(String::as_str), Some("verified"));
        assert_eq!(events[1].event_type, "claim.transition_rejected");
        assert_eq!(events[1].correlation_id, "req-7");
    }
}
