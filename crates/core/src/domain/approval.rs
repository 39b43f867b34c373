use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::claim::{ClaimId, ClaimStatus};
use crate::domain::role::PortalRole;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApprovalLogId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalAction {
    Submitted,
    Approved,
    Rejected,
    SendBack,
    Paid,
    OnHold,
    Released,
    Resubmitted,
}

impl ApprovalAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::SendBack => "send_back",
            Self::Paid => "paid",
            Self::OnHold => "on_hold",
            Self::Released => "released",
            Self::Resubmitted => "resubmitted",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "submitted" => Some(Self::Submitted),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "send_back" => Some(Self::SendBack),
            "paid" => Some(Self::Paid),
            "on_hold" => Some(Self::OnHold),
            "released" => Some(Self::Released),
            "resubmitted" => Some(Self::Resubmitted),
            _ => None,
        }
    }
}

/// Append-only audit row written once per claim transition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalLogEntry {
    pub id: ApprovalLogId,
    pub claim_id: ClaimId,
    pub claim_number: String,
    pub approver_email: String,
    pub approver_name: String,
    pub approver_role: PortalRole,
    pub stage: String,
    pub action: ApprovalAction,
    pub remarks: Option<String>,
    pub previous_status: ClaimStatus,
    pub new_status: ClaimStatus,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::ApprovalAction;

    #[test]
    fn approval_action_round_trips_from_storage_encoding() {
        let cases = [
            ApprovalAction::Submitted,
            ApprovalAction::Approved,
            ApprovalAction::Rejected,
            ApprovalAction::SendBack,
            ApprovalAction::Paid,
            ApprovalAction::OnHold,
            ApprovalAction::Released,
            ApprovalAction::Resubmitted,
        ];

        for action in cases {
            assert_eq!(ApprovalAction::parse(action.as_str()), Some(action));
        }
    }
}
