//! Canonical claim status paths and the side states shared by both claim types.

use crate::domain::claim::{ClaimStatus, ClaimType};

pub const NORMAL_PATH: &[ClaimStatus] = &[
    ClaimStatus::Draft,
    ClaimStatus::Submitted,
    ClaimStatus::Verified,
    ClaimStatus::ManagerApproved,
    ClaimStatus::AdminApproved,
    ClaimStatus::Paid,
];

pub const SALES_PROMOTION_PATH: &[ClaimStatus] = &[
    ClaimStatus::Draft,
    ClaimStatus::Submitted,
    ClaimStatus::ManagerApproved,
    ClaimStatus::CroApproved,
    ClaimStatus::CfoApproved,
    ClaimStatus::Paid,
];

pub const SIDE_STATES: &[ClaimStatus] =
    &[ClaimStatus::SentBack, ClaimStatus::Rejected, ClaimStatus::OnHold];

pub fn happy_path(claim_type: ClaimType) -> &'static [ClaimStatus] {
    match claim_type {
        ClaimType::Normal => NORMAL_PATH,
        ClaimType::SalesPromotion => SALES_PROMOTION_PATH,
    }
}

/// Status a claim of this type reaches when its last approval stage signs off.
pub fn payable_status(claim_type: ClaimType) -> ClaimStatus {
    match claim_type {
        ClaimType::Normal => ClaimStatus::AdminApproved,
        ClaimType::SalesPromotion => ClaimStatus::CfoApproved,
    }
}

pub fn is_payable(status: ClaimStatus) -> bool {
    matches!(status, ClaimStatus::AdminApproved | ClaimStatus::CfoApproved)
}

pub fn is_reachable(claim_type: ClaimType, status: ClaimStatus) -> bool {
    happy_path(claim_type).contains(&status) || SIDE_STATES.contains(&status)
}

/// Statuses in which some approval stage still has to act.
pub fn is_awaiting_approval(status: ClaimStatus) -> bool {
    matches!(
        status,
        ClaimStatus::Submitted
            | ClaimStatus::Verified
            | ClaimStatus::ManagerApproved
            | ClaimStatus::CroApproved
    )
}

/// Statuses that can sit in somebody's work queue: an approval stage or the
/// finance desk still owes the claim an action.
pub fn queue_statuses() -> Vec<ClaimStatus> {
    ClaimStatus::ALL
        .into_iter()
        .filter(|status| {
            is_awaiting_approval(*status) || is_payable(*status) || *status == ClaimStatus::OnHold
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{happy_path, is_reachable, payable_status, queue_statuses};
    use crate::domain::claim::{ClaimStatus, ClaimType};

    #[test]
    fn sales_promotion_path_skips_verification() {
        assert!(happy_path(ClaimType::Normal).contains(&ClaimStatus::Verified));
        assert!(!happy_path(ClaimType::SalesPromotion).contains(&ClaimStatus::Verified));
        assert!(!is_reachable(ClaimType::SalesPromotion, ClaimStatus::Verified));
        assert!(!is_reachable(ClaimType::Normal, ClaimStatus::CroApproved));
    }

    #[test]
    fn both_paths_end_in_paid_after_their_payable_status() {
        for claim_type in [ClaimType::Normal, ClaimType::SalesPromotion] {
            let path = happy_path(claim_type);
            assert_eq!(path.last(), Some(&ClaimStatus::Paid));
            assert_eq!(path[path.len() - 2], payable_status(claim_type));
        }
    }

    #[test]
    fn side_states_are_reachable_for_both_types() {
        for claim_type in [ClaimType::Normal, ClaimType::SalesPromotion] {
            assert!(is_reachable(claim_type, ClaimStatus::SentBack));
            assert!(is_reachable(claim_type, ClaimStatus::OnHold));
            assert!(is_reachable(claim_type, ClaimStatus::Rejected));
        }
    }

    #[test]
    fn queue_statuses_leave_out_drafts_and_closed_claims() {
        let statuses = queue_statuses();
        assert_eq!(statuses.len(), 7);
        for closed in [ClaimStatus::Draft, ClaimStatus::SentBack, ClaimStatus::Rejected, ClaimStatus::Paid] {
            assert!(!statuses.contains(&closed));
        }
        assert!(statuses.contains(&ClaimStatus::CroApproved));
        assert!(statuses.contains(&ClaimStatus::OnHold));
    }
}
