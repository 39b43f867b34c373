use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::claim::{Claim, ClaimStatus};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusTotals {
    pub count: u64,
    pub amount: Decimal,
}

/// Dashboard figures over a set of claims, keyed by status storage name.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimSummary {
    pub total_claims: u64,
    pub total_amount: Decimal,
    pub by_status: BTreeMap<String, StatusTotals>,
    pub overdue: u64,
}

impl ClaimSummary {
    pub fn from_claims(claims: &[Claim], today: NaiveDate) -> Self {
        let mut summary = Self::default();
        for claim in claims {
            summary.total_claims += 1;
            summary.total_amount += claim.amount;
            let totals = summary.by_status.entry(claim.status.as_str().to_string()).or_default();
            totals.count += 1;
            totals.amount += claim.amount;
            if claim.is_overdue(today) {
                summary.overdue += 1;
            }
        }
        summary
    }

    pub fn count(&self, status: ClaimStatus) -> u64 {
        self.by_status.get(status.as_str()).map(|totals| totals.count).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    use super::ClaimSummary;
    use crate::domain::claim::{ClaimStatus, ClaimType};
    use crate::workflow::engine::tests::claim_fixture;

    #[test]
    fn summary_counts_amounts_and_overdue_claims() {
        let mut paid = claim_fixture(ClaimType::Normal, ClaimStatus::Paid);
        paid.amount = Decimal::new(1_250, 0);
        let pending = claim_fixture(ClaimType::Normal, ClaimStatus::Verified);
        let also_pending = claim_fixture(ClaimType::SalesPromotion, ClaimStatus::Submitted);
        let today = NaiveDate::from_ymd_opt(2026, 5, 1).expect("date");

        let summary = ClaimSummary::from_claims(&[paid, pending, also_pending], today);

        assert_eq!(summary.total_claims, 3);
        assert_eq!(summary.total_amount, Decimal::new(11_250, 0));
        assert_eq!(summary.count(ClaimStatus::Verified), 1);
        assert_eq!(summary.count(ClaimStatus::OnHold), 0);
        assert_eq!(summary.overdue, 2);
    }
}
