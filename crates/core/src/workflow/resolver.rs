use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::claim::{Claim, ClaimStatus, ClaimType};
use crate::domain::role::PortalRole;
use crate::domain::workflow_config::WorkflowStageConfig;
use crate::workflow::registry;

/// One row of the claim approval table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRule {
    pub claim_type: ClaimType,
    pub from_status: ClaimStatus,
    pub role: PortalRole,
    pub to_status: ClaimStatus,
    pub next_role: PortalRole,
    pub stage: String,
}

impl TransitionRule {
    fn new(
        claim_type: ClaimType,
        from_status: ClaimStatus,
        role: PortalRole,
        to_status: ClaimStatus,
        next_role: PortalRole,
        stage: &str,
    ) -> Self {
        Self { claim_type, from_status, role, to_status, next_role, stage: stage.to_string() }
    }

    pub fn admits(&self, role: PortalRole) -> bool {
        self.role == role || role == PortalRole::Admin
    }
}

/// Ordered rules for one claim type. Torch-bearer claims may follow a shorter
/// chain when configured stages are skippable.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
struct StageChain {
    claim_type: ClaimType,
    torch_bearer: bool,
    rules: Vec<TransitionRule>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedAction {
    pub can_act: bool,
    pub next_status_on_approve: Option<ClaimStatus>,
    pub next_approver_role: Option<PortalRole>,
    pub stage: Option<String>,
    pub can_send_back: bool,
}

impl ResolvedAction {
    fn denied() -> Self {
        Self {
            can_act: false,
            next_status_on_approve: None,
            next_approver_role: None,
            stage: None,
            can_send_back: false,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WorkflowConfigError {
    #[error("workflow `{workflow_type}` has two active stages with order {stage_order}")]
    DuplicateStageOrder { workflow_type: &'static str, stage_order: u32 },
    #[error("workflow `{workflow_type}` stage `{stage_name}` cannot be approved by `{role}`")]
    InvalidApprover { workflow_type: &'static str, stage_name: String, role: &'static str },
    #[error("workflow `{workflow_type}` stage `{stage_name}` approves into `{status}`, which is not on its path")]
    UnreachableStatus { workflow_type: &'static str, stage_name: String, status: &'static str },
    #[error("workflow `{workflow_type}` must end in `{expected}` so finance can pay it, found `{found}`")]
    MustEndPayable { workflow_type: &'static str, expected: &'static str, found: &'static str },
    #[error("workflow `{workflow_type}` stage `{stage_name}` approves into `{status}`, which does not come after `{previous}`")]
    StatusNotAdvancing {
        workflow_type: &'static str,
        stage_name: String,
        status: &'static str,
        previous: &'static str,
    },
    #[error("workflow `{workflow_type}` has no stage left for torch-bearer claims")]
    EmptyTorchBearerChain { workflow_type: &'static str },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowTable {
    chains: Vec<StageChain>,
}

impl Default for WorkflowTable {
    fn default() -> Self {
        Self::built_in()
    }
}

impl WorkflowTable {
    pub fn built_in() -> Self {
        let chains = [ClaimType::Normal, ClaimType::SalesPromotion]
            .into_iter()
            .flat_map(|claim_type| {
                let rules = built_in_rules(claim_type);
                [false, true].into_iter().map(move |torch_bearer| StageChain {
                    claim_type,
                    torch_bearer,
                    rules: rules.clone(),
                })
            })
            .collect();
        Self { chains }
    }

    /// Builds the table from stored stage configuration. A workflow type with
    /// no active stages keeps the built-in chain.
    pub fn from_stages(stages: &[WorkflowStageConfig]) -> Result<Self, WorkflowConfigError> {
        let mut chains = Vec::new();

        for claim_type in [ClaimType::Normal, ClaimType::SalesPromotion] {
            let mut active: Vec<&WorkflowStageConfig> = stages
                .iter()
                .filter(|stage| stage.workflow_type == claim_type && stage.is_active)
                .collect();

            if active.is_empty() {
                let rules = built_in_rules(claim_type);
                chains.push(StageChain { claim_type, torch_bearer: false, rules: rules.clone() });
                chains.push(StageChain { claim_type, torch_bearer: true, rules });
                continue;
            }

            active.sort_by_key(|stage| stage.stage_order);
            validate_stages(claim_type, &active)?;

            chains.push(StageChain {
                claim_type,
                torch_bearer: false,
                rules: chain_rules(claim_type, &active),
            });

            let torch: Vec<&WorkflowStageConfig> =
                active.iter().copied().filter(|stage| !stage.can_skip_for_torch_bearer).collect();
            ensure_advancing(claim_type, &torch)?;
            let Some(last) = torch.last() else {
                return Err(WorkflowConfigError::EmptyTorchBearerChain {
                    workflow_type: claim_type.as_str(),
                });
            };
            if last.status_on_approve != registry::payable_status(claim_type) {
                return Err(WorkflowConfigError::MustEndPayable {
                    workflow_type: claim_type.as_str(),
                    expected: registry::payable_status(claim_type).as_str(),
                    found: last.status_on_approve.as_str(),
                });
            }
            chains.push(StageChain {
                claim_type,
                torch_bearer: true,
                rules: chain_rules(claim_type, &torch),
            });
        }

        Ok(Self { chains })
    }

    pub fn rules(&self, claim_type: ClaimType, torch_bearer: bool) -> &[TransitionRule] {
        self.chains
            .iter()
            .find(|chain| chain.claim_type == claim_type && chain.torch_bearer == torch_bearer)
            .map(|chain| chain.rules.as_slice())
            .unwrap_or(&[])
    }

    /// The rule governing a claim in its current status, if any stage may act on it.
    pub fn rule_for(&self, claim: &Claim) -> Option<&TransitionRule> {
        self.rules(claim.claim_type, claim.is_torch_bearer)
            .iter()
            .find(|rule| rule.from_status == claim.status)
    }

    pub fn first_approver(&self, claim_type: ClaimType, torch_bearer: bool) -> Option<PortalRole> {
        self.rules(claim_type, torch_bearer).first().map(|rule| rule.role)
    }

    pub fn resolve_action(&self, claim: &Claim, acting_role: PortalRole) -> ResolvedAction {
        match self.rule_for(claim) {
            Some(rule) if rule.admits(acting_role) => ResolvedAction {
                can_act: true,
                next_status_on_approve: Some(rule.to_status),
                next_approver_role: Some(rule.next_role),
                stage: Some(rule.stage.clone()),
                can_send_back: rule.role == PortalRole::JuniorAdmin,
            },
            _ => ResolvedAction::denied(),
        }
    }

    /// Claims the role may act on; anything else is silently left out.
    pub fn pending_queue<'a>(&self, claims: &'a [Claim], acting_role: PortalRole) -> Vec<&'a Claim> {
        claims.iter().filter(|claim| self.resolve_action(claim, acting_role).can_act).collect()
    }
}

fn built_in_rules(claim_type: ClaimType) -> Vec<TransitionRule> {
    use ClaimStatus::{
        AdminApproved, CfoApproved, CroApproved, ManagerApproved, Submitted, Verified,
    };
    use PortalRole::{AdminHead, Cfo, Cro, Finance, JuniorAdmin, Manager};

    match claim_type {
        ClaimType::Normal => vec![
            TransitionRule::new(claim_type, Submitted, JuniorAdmin, Verified, Manager, "Verification"),
            TransitionRule::new(
                claim_type,
                Verified,
                Manager,
                ManagerApproved,
                AdminHead,
                "Manager Approval",
            ),
            TransitionRule::new(
                claim_type,
                ManagerApproved,
                AdminHead,
                AdminApproved,
                Finance,
                "Admin Head Approval",
            ),
        ],
        ClaimType::SalesPromotion => vec![
            TransitionRule::new(
                claim_type,
                Submitted,
                Manager,
                ManagerApproved,
                Cro,
                "Manager Approval",
            ),
            TransitionRule::new(
                claim_type,
                ManagerApproved,
                Cro,
                CroApproved,
                Cfo,
                "CRO Approval",
            ),
            TransitionRule::new(
                claim_type,
                CroApproved,
                Cfo,
                CfoApproved,
                Finance,
                "CFO Approval",
            ),
        ],
    }
}

fn validate_stages(
    claim_type: ClaimType,
    stages: &[&WorkflowStageConfig],
) -> Result<(), WorkflowConfigError> {
    let workflow_type = claim_type.as_str();

    for pair in stages.windows(2) {
        if pair[0].stage_order == pair[1].stage_order {
            return Err(WorkflowConfigError::DuplicateStageOrder {
                workflow_type,
                stage_order: pair[0].stage_order,
            });
        }
    }

    for stage in stages {
        if matches!(stage.approver_role, PortalRole::Employee | PortalRole::Finance) {
            return Err(WorkflowConfigError::InvalidApprover {
                workflow_type,
                stage_name: stage.stage_name.clone(),
                role: stage.approver_role.as_str(),
            });
        }
        let on_path = registry::is_reachable(claim_type, stage.status_on_approve)
            && !matches!(
                stage.status_on_approve,
                ClaimStatus::Draft
                    | ClaimStatus::Submitted
                    | ClaimStatus::Paid
                    | ClaimStatus::Rejected
                    | ClaimStatus::SentBack
                    | ClaimStatus::OnHold
            );
        if !on_path {
            return Err(WorkflowConfigError::UnreachableStatus {
                workflow_type,
                stage_name: stage.stage_name.clone(),
                status: stage.status_on_approve.as_str(),
            });
        }
    }

    ensure_advancing(claim_type, stages)?;

    if let Some(last) = stages.last() {
        let expected = registry::payable_status(claim_type);
        if last.status_on_approve != expected {
            return Err(WorkflowConfigError::MustEndPayable {
                workflow_type,
                expected: expected.as_str(),
                found: last.status_on_approve.as_str(),
            });
        }
    }

    Ok(())
}

/// Each stage must approve into a status strictly later on the happy path than
/// the stage before it, otherwise a rule would loop on its own status.
fn ensure_advancing(
    claim_type: ClaimType,
    stages: &[&WorkflowStageConfig],
) -> Result<(), WorkflowConfigError> {
    let path = registry::happy_path(claim_type);
    let position = |status: ClaimStatus| path.iter().position(|step| *step == status);

    let mut previous = ClaimStatus::Submitted;
    for stage in stages {
        let advances = match (position(previous), position(stage.status_on_approve)) {
            (Some(before), Some(after)) => after > before,
            _ => false,
        };
        if !advances {
            return Err(WorkflowConfigError::StatusNotAdvancing {
                workflow_type: claim_type.as_str(),
                stage_name: stage.stage_name.clone(),
                status: stage.status_on_approve.as_str(),
                previous: previous.as_str(),
            });
        }
        previous = stage.status_on_approve;
    }
    Ok(())
}

fn chain_rules(claim_type: ClaimType, stages: &[&WorkflowStageConfig]) -> Vec<TransitionRule> {
    stages
        .iter()
        .enumerate()
        .map(|(index, stage)| {
            let from_status =
                if index == 0 { ClaimStatus::Submitted } else { stages[index - 1].status_on_approve };
            let next_role =
                stages.get(index + 1).map(|next| next.approver_role).unwrap_or(PortalRole::Finance);
            TransitionRule {
                claim_type,
                from_status,
                role: stage.approver_role,
                to_status: stage.status_on_approve,
                next_role,
                stage: stage.stage_name.clone(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};
    use rust_decimal::Decimal;

    use super::{WorkflowConfigError, WorkflowTable};
    use crate::domain::category::CategoryId;
    use crate::domain::claim::{Claim, ClaimId, ClaimStatus, ClaimType};
    use crate::domain::role::PortalRole;
    use crate::domain::workflow_config::{WorkflowStageConfig, WorkflowStageId};

    fn claim(claim_type: ClaimType, status: ClaimStatus) -> Claim {
        let created_at = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).single().expect("timestamp");
        Claim {
            id: ClaimId(format!("claim-{}", status.as_str())),
            claim_number: "CLM-TEST".to_string(),
            claim_type,
            status,
            current_approver_role: None,
            employee_name: "Asha Rao".to_string(),
            employee_email: "asha@example.com".to_string(),
            department: "Sales".to_string(),
            designation: "Executive".to_string(),
            category_id: CategoryId("cat-travel".to_string()),
            category_name: "Travel".to_string(),
            is_torch_bearer: false,
            expense_date: NaiveDate::from_ymd_opt(2026, 3, 1).expect("date"),
            purpose: "Client visit".to_string(),
            bill_number: None,
            bill_date: None,
            amount: Decimal::new(5_000, 0),
            payment_mode: "cash".to_string(),
            description: None,
            document_urls: Vec::new(),
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

    fn stage(
        workflow_type: ClaimType,
        stage_order: u32,
        approver_role: PortalRole,
        status_on_approve: ClaimStatus,
        can_skip_for_torch_bearer: bool,
    ) -> WorkflowStageConfig {
        WorkflowStageConfig {
            id: WorkflowStageId(format!("{}-{stage_order}", workflow_type.as_str())),
            workflow_type,
            stage_order,
            stage_name: format!("Stage {stage_order}"),
            approver_role,
            status_on_approve,
            is_active: true,
            can_skip_for_torch_bearer,
        }
    }

    #[test]
    fn built_in_table_matches_decision_table() {
        let table = WorkflowTable::built_in();
        let cases = [
            (ClaimType::Normal, ClaimStatus::Submitted, PortalRole::JuniorAdmin, ClaimStatus::Verified, PortalRole::Manager),
            (ClaimType::Normal, ClaimStatus::Verified, PortalRole::Manager, ClaimStatus::ManagerApproved, PortalRole::AdminHead),
            (ClaimType::Normal, ClaimStatus::ManagerApproved, PortalRole::AdminHead, ClaimStatus::AdminApproved, PortalRole::Finance),
            (ClaimType::SalesPromotion, ClaimStatus::Submitted, PortalRole::Manager, ClaimStatus::ManagerApproved, PortalRole::Cro),
            (ClaimType::SalesPromotion, ClaimStatus::ManagerApproved, PortalRole::Cro, ClaimStatus::CroApproved, PortalRole::Cfo),
            (ClaimType::SalesPromotion, ClaimStatus::CroApproved, PortalRole::Cfo, ClaimStatus::CfoApproved, PortalRole::Finance),
        ];

        for (claim_type, status, role, to_status, next_role) in cases {
            let resolved = table.resolve_action(&claim(claim_type, status), role);
            assert!(resolved.can_act, "{role} should act on {claim_type:?}/{status}");
            assert_eq!(resolved.next_status_on_approve, Some(to_status));
            assert_eq!(resolved.next_approver_role, Some(next_role));
        }
    }

    #[test]
    fn other_roles_cannot_act() {
        let table = WorkflowTable::built_in();
        let submitted = claim(ClaimType::Normal, ClaimStatus::Submitted);

        for role in [PortalRole::Employee, PortalRole::Manager, PortalRole::Cfo, PortalRole::Finance] {
            assert!(!table.resolve_action(&submitted, role).can_act);
        }
        assert!(!table.resolve_action(&claim(ClaimType::Normal, ClaimStatus::Paid), PortalRole::Admin).can_act);
    }

    #[test]
    fn admin_may_act_at_any_approval_stage() {
        let table = WorkflowTable::built_in();
        let resolved =
            table.resolve_action(&claim(ClaimType::SalesPromotion, ClaimStatus::CroApproved), PortalRole::Admin);
        assert!(resolved.can_act);
        assert_eq!(resolved.next_status_on_approve, Some(ClaimStatus::CfoApproved));
    }

    #[test]
    fn send_back_is_only_offered_at_the_junior_admin_stage() {
        let table = WorkflowTable::built_in();
        assert!(
            table
                .resolve_action(&claim(ClaimType::Normal, ClaimStatus::Submitted), PortalRole::JuniorAdmin)
                .can_send_back
        );
        assert!(
            !table
                .resolve_action(&claim(ClaimType::Normal, ClaimStatus::Verified), PortalRole::Manager)
                .can_send_back
        );
    }

    #[test]
    fn pending_queue_filters_silently_by_role() {
        let table = WorkflowTable::built_in();
        let claims = vec![
            claim(ClaimType::Normal, ClaimStatus::Submitted),
            claim(ClaimType::SalesPromotion, ClaimStatus::Submitted),
            claim(ClaimType::Normal, ClaimStatus::Verified),
            claim(ClaimType::Normal, ClaimStatus::Draft),
        ];

        let manager_queue = table.pending_queue(&claims, PortalRole::Manager);
        assert_eq!(manager_queue.len(), 2);
        assert!(manager_queue.iter().all(|claim| claim.status != ClaimStatus::Draft));

        assert!(table.pending_queue(&claims, PortalRole::Employee).is_empty());
    }

    #[test]
    fn configured_stages_drive_the_table() {
        let stages = vec![
            stage(ClaimType::Normal, 2, PortalRole::AdminHead, ClaimStatus::AdminApproved, false),
            stage(ClaimType::Normal, 1, PortalRole::Manager, ClaimStatus::ManagerApproved, false),
        ];
        let table = WorkflowTable::from_stages(&stages).expect("valid configuration");

        assert_eq!(table.first_approver(ClaimType::Normal, false), Some(PortalRole::Manager));
        let resolved = table.resolve_action(&claim(ClaimType::Normal, ClaimStatus::Submitted), PortalRole::Manager);
        assert_eq!(resolved.next_status_on_approve, Some(ClaimStatus::ManagerApproved));
        assert_eq!(resolved.next_approver_role, Some(PortalRole::AdminHead));

        assert_eq!(table.first_approver(ClaimType::SalesPromotion, false), Some(PortalRole::Manager));
        assert_eq!(table.rules(ClaimType::SalesPromotion, false).len(), 3);
    }

    #[test]
    fn torch_bearer_claims_skip_flagged_stages() {
        let stages = vec![
            stage(ClaimType::Normal, 1, PortalRole::JuniorAdmin, ClaimStatus::Verified, true),
            stage(ClaimType::Normal, 2, PortalRole::Manager, ClaimStatus::ManagerApproved, false),
            stage(ClaimType::Normal, 3, PortalRole::AdminHead, ClaimStatus::AdminApproved, false),
        ];
        let table = WorkflowTable::from_stages(&stages).expect("valid configuration");

        let mut torch = claim(ClaimType::Normal, ClaimStatus::Submitted);
        torch.is_torch_bearer = true;
        assert!(!table.resolve_action(&torch, PortalRole::JuniorAdmin).can_act);
        let resolved = table.resolve_action(&torch, PortalRole::Manager);
        assert!(resolved.can_act);
        assert_eq!(resolved.next_status_on_approve, Some(ClaimStatus::ManagerApproved));
    }

    #[test]
    fn configuration_must_end_in_payable_status() {
        let stages =
            vec![stage(ClaimType::SalesPromotion, 1, PortalRole::Manager, ClaimStatus::ManagerApproved, false)];
        let error = WorkflowTable::from_stages(&stages).expect_err("must end in cfo_approved");
        assert!(matches!(error, WorkflowConfigError::MustEndPayable { expected: "cfo_approved", .. }));
    }

    #[test]
    fn configuration_rejects_finance_as_stage_approver_and_duplicate_orders() {
        let finance =
            vec![stage(ClaimType::Normal, 1, PortalRole::Finance, ClaimStatus::AdminApproved, false)];
        assert!(matches!(
            WorkflowTable::from_stages(&finance),
            Err(WorkflowConfigError::InvalidApprover { .. })
        ));

        let duplicate = vec![
            stage(ClaimType::Normal, 1, PortalRole::Manager, ClaimStatus::ManagerApproved, false),
            stage(ClaimType::Normal, 1, PortalRole::AdminHead, ClaimStatus::AdminApproved, false),
        ];
        assert!(matches!(
            WorkflowTable::from_stages(&duplicate),
            Err(WorkflowConfigError::DuplicateStageOrder { stage_order: 1, .. })
        ));
    }

    #[test]
    fn configuration_rejects_stages_that_do_not_move_the_claim_forward() {
        let repeated = vec![
            stage(ClaimType::Normal, 1, PortalRole::Manager, ClaimStatus::ManagerApproved, false),
            stage(ClaimType::Normal, 2, PortalRole::AdminHead, ClaimStatus::ManagerApproved, false),
            stage(ClaimType::Normal, 3, PortalRole::Cfo, ClaimStatus::AdminApproved, false),
        ];
        match WorkflowTable::from_stages(&repeated) {
            Err(WorkflowConfigError::StatusNotAdvancing { stage_name, status, previous, .. }) => {
                assert_eq!(stage_name, "Stage 2");
                assert_eq!(status, "manager_approved");
                assert_eq!(previous, "manager_approved");
            }
            other => panic!("expected StatusNotAdvancing, got {other:?}"),
        }

        let backwards = vec![
            stage(ClaimType::Normal, 1, PortalRole::Manager, ClaimStatus::ManagerApproved, false),
            stage(ClaimType::Normal, 2, PortalRole::JuniorAdmin, ClaimStatus::Verified, false),
            stage(ClaimType::Normal, 3, PortalRole::AdminHead, ClaimStatus::AdminApproved, false),
        ];
        assert!(matches!(
            WorkflowTable::from_stages(&backwards),
            Err(WorkflowConfigError::StatusNotAdvancing { status: "verified", .. })
        ));
    }
}
