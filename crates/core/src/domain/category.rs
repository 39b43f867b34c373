use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::claim::ClaimType;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CategoryId(pub String);

/// Expense category offered on the claim form.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub category_name: String,
    pub title: String,
    pub bill_required: bool,
    pub policy_limit: Option<Decimal>,
    pub is_sales_promotion: bool,
    pub is_torch_bearer: bool,
    pub is_active: bool,
}

impl Category {
    pub fn claim_type(&self) -> ClaimType {
        if self.is_sales_promotion {
            ClaimType::SalesPromotion
        } else {
            ClaimType::Normal
        }
    }

    pub fn display_name(&self) -> String {
        if self.category_name.trim().is_empty() {
            self.title.clone()
        } else {
            format!("{} - {}", self.category_name, self.title)
        }
    }
}
