use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::category::CategoryId;
use crate::domain::role::PortalRole;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClaimId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimType {
    Normal,
    SalesPromotion,
}

impl ClaimType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::SalesPromotion => "sales_promotion",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "normal" => Some(Self::Normal),
            "sales_promotion" => Some(Self::SalesPromotion),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStatus {
    Draft,
    Submitted,
    Verified,
    ManagerApproved,
    AdminApproved,
    CroApproved,
    CfoApproved,
    Paid,
    Rejected,
    SentBack,
    OnHold,
}

impl ClaimStatus {
    pub const ALL: [ClaimStatus; 11] = [
        Self::Draft,
        Self::Submitted,
        Self::Verified,
        Self::ManagerApproved,
        Self::AdminApproved,
        Self::CroApproved,
        Self::CfoApproved,
        Self::Paid,
        Self::Rejected,
        Self::SentBack,
        Self::OnHold,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Submitted => "submitted",
            Self::Verified => "verified",
            Self::ManagerApproved => "manager_approved",
            Self::AdminApproved => "admin_approved",
            Self::CroApproved => "cro_approved",
            Self::CfoApproved => "cfo_approved",
            Self::Paid => "paid",
            Self::Rejected => "rejected",
            Self::SentBack => "sent_back",
            Self::OnHold => "on_hold",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|status| status.as_str() == normalized)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Draft => "Draft",
            Self::Submitted => "Submitted",
            Self::Verified => "Verified",
            Self::ManagerApproved => "Manager Approved",
            Self::AdminApproved => "Admin Approved",
            Self::CroApproved => "CRO Approved",
            Self::CfoApproved => "CFO Approved",
            Self::Paid => "Paid",
            Self::Rejected => "Rejected",
            Self::SentBack => "Sent Back",
            Self::OnHold => "On Hold",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Paid | Self::Rejected)
    }
}

impl std::fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    pub id: ClaimId,
    pub claim_number: String,
    pub claim_type: ClaimType,
    pub status: ClaimStatus,
    pub current_approver_role: Option<PortalRole>,
    pub employee_name: String,
    pub employee_email: String,
    pub department: String,
    pub designation: String,
    pub category_id: CategoryId,
    pub category_name: String,
    pub is_torch_bearer: bool,
    pub expense_date: NaiveDate,
    pub purpose: String,
    pub bill_number: Option<String>,
    pub bill_date: Option<NaiveDate>,
    pub amount: Decimal,
    pub payment_mode: String,
    pub description: Option<String>,
    pub document_urls: Vec<String>,
    pub rejection_reason: Option<String>,
    pub send_back_reason: Option<String>,
    pub payment_date: Option<NaiveDate>,
    pub payment_reference: Option<String>,
    pub sla_date: NaiveDate,
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Claim {
    pub fn is_owned_by(&self, email: &str) -> bool {
        self.employee_email.eq_ignore_ascii_case(email.trim())
    }

    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        !self.status.is_terminal() && self.status != ClaimStatus::Draft && self.sla_date < today
    }
}
