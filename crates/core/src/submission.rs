//! Validation and construction of new claims and room bookings.

use chrono::{DateTime, Days, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::booking::{
    clock_time, Attendee, BookingId, BookingStatus, ConferenceRoom, RoomBooking, RoomId,
};
use crate::domain::category::{Category, CategoryId};
use crate::domain::claim::{Claim, ClaimId, ClaimStatus};
use crate::domain::user::User;
use crate::workflow::booking::{ensure_slot_free, BookingSlot};
use crate::workflow::engine::WorkflowError;
use crate::workflow::resolver::WorkflowTable;

pub const CLAIM_NUMBER_PREFIX: &str = "CLM";
pub const BOOKING_NUMBER_PREFIX: &str = "BKG";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClaimInput {
    pub category_id: CategoryId,
    pub expense_date: Option<NaiveDate>,
    pub purpose: String,
    #[serde(default)]
    pub bill_number: Option<String>,
    #[serde(default)]
    pub bill_date: Option<NaiveDate>,
    pub amount: Decimal,
    pub payment_mode: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub document_urls: Vec<String>,
    /// `false` keeps the claim as a draft.
    #[serde(default = "default_submit")]
    pub submit: bool,
}

fn default_submit() -> bool {
    true
}

/// Fields an employee may change on a draft or sent-back claim.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ClaimEdits {
    pub expense_date: Option<NaiveDate>,
    pub purpose: Option<String>,
    pub bill_number: Option<String>,
    pub bill_date: Option<NaiveDate>,
    pub amount: Option<Decimal>,
    pub payment_mode: Option<String>,
    pub description: Option<String>,
    pub document_urls: Option<Vec<String>>,
}

impl ClaimEdits {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClaimDraft {
    pub claim: Claim,
    pub exceeds_policy_limit: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingInput {
    pub room_id: RoomId,
    pub booking_date: NaiveDate,
    pub start_time: String,
    pub end_time: String,
    pub purpose: String,
    pub attendees_count: u32,
    #[serde(default)]
    pub attendees_list: Vec<Attendee>,
    #[serde(default)]
    pub pre_setup_required: bool,
    #[serde(default)]
    pub pre_setup_minutes: u32,
    #[serde(default)]
    pub post_cleanup_required: bool,
    #[serde(default)]
    pub post_cleanup_minutes: u32,
    #[serde(default)]
    pub document_urls: Vec<String>,
}

/// `<PREFIX>-<epoch millis in upper-case base36>-<first six hex digits of the record id>`.
/// The id suffix keeps two records created in the same millisecond apart.
pub fn reference_number(prefix: &str, now: DateTime<Utc>, record_id: &Uuid) -> String {
    let suffix: String = format!("{:X}", record_id.simple()).chars().take(6).collect();
    format!("{prefix}-{}-{suffix}", base36(now.timestamp_millis().max(0) as u64))
}

fn base36(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while value > 0 {
        let digit = (value % 36) as u32;
        digits.push(char::from_digit(digit, 36).unwrap_or('0').to_ascii_uppercase());
        value /= 36;
    }
    digits.into_iter().rev().collect()
}

pub fn sla_date(now: DateTime<Utc>, sla_days: u32) -> NaiveDate {
    let today = now.date_naive();
    today.checked_add_days(Days::new(u64::from(sla_days))).unwrap_or(today)
}

/// Builds a new claim for `employee`. Submitted claims are routed to the first
/// approver of their workflow; drafts have no approver yet.
pub fn draft_claim(
    input: &ClaimInput,
    category: &Category,
    employee: &User,
    table: &WorkflowTable,
    sla_days: u32,
    now: DateTime<Utc>,
) -> Result<ClaimDraft, WorkflowError> {
    let mut problems = Vec::new();
    if !category.is_active {
        problems.push(format!("category `{}` is not active", category.display_name()));
    }
    let purpose = input.purpose.trim();
    if purpose.is_empty() {
        problems.push("purpose is required".to_string());
    }
    if input.expense_date.is_none() {
        problems.push("expense date is required".to_string());
    }
    check_claim_content(
        category,
        input.amount,
        &input.payment_mode,
        input.bill_number.as_deref(),
        &input.document_urls,
        &mut problems,
    );
    let Some(expense_date) = input.expense_date.filter(|_| problems.is_empty()) else {
        return Err(WorkflowError::Validation { problems });
    };

    let claim_type = category.claim_type();
    let (status, current_approver_role) = if input.submit {
        (ClaimStatus::Submitted, table.first_approver(claim_type, category.is_torch_bearer))
    } else {
        (ClaimStatus::Draft, None)
    };

    let claim_uuid = Uuid::new_v4();
    let claim = Claim {
        id: ClaimId(claim_uuid.to_string()),
        claim_number: reference_number(CLAIM_NUMBER_PREFIX, now, &claim_uuid),
        claim_type,
        status,
        current_approver_role,
        employee_name: employee.full_name.clone(),
        employee_email: employee.email.clone(),
        department: employee.department.clone(),
        designation: employee.designation.clone(),
        category_id: category.id.clone(),
        category_name: category.display_name(),
        is_torch_bearer: category.is_torch_bearer,
        expense_date,
        purpose: purpose.to_string(),
        bill_number: non_blank(input.bill_number.as_deref()),
        bill_date: input.bill_date,
        amount: input.amount,
        payment_mode: input.payment_mode.trim().to_string(),
        description: non_blank(input.description.as_deref()),
        document_urls: clean_urls(&input.document_urls),
        rejection_reason: None,
        send_back_reason: None,
        payment_date: None,
        payment_reference: None,
        sla_date: sla_date(now, sla_days),
        version: 1,
        created_at: now,
        updated_at: now,
    };
    let exceeds_policy_limit = exceeds_policy_limit(category, claim.amount);

    Ok(ClaimDraft { claim, exceeds_policy_limit })
}

/// Applies owner edits to a draft or sent-back claim. Workflow fields and the
/// SLA date are never touched.
pub fn apply_claim_edits(
    claim: &mut Claim,
    edits: &ClaimEdits,
    category: &Category,
    actor_email: &str,
    now: DateTime<Utc>,
) -> Result<bool, WorkflowError> {
    if !claim.is_owned_by(actor_email) {
        return Err(WorkflowError::NotOwner { operation: "edit this claim" });
    }
    if !matches!(claim.status, ClaimStatus::Draft | ClaimStatus::SentBack) {
        return Err(WorkflowError::InvalidClaimStatus { status: claim.status, operation: "edited" });
    }
    if edits.is_empty() {
        return Ok(exceeds_policy_limit(category, claim.amount));
    }

    let mut edited = claim.clone();
    if let Some(expense_date) = edits.expense_date {
        edited.expense_date = expense_date;
    }
    if let Some(purpose) = &edits.purpose {
        edited.purpose = purpose.trim().to_string();
    }
    if edits.bill_number.is_some() {
        edited.bill_number = non_blank(edits.bill_number.as_deref());
    }
    if edits.bill_date.is_some() {
        edited.bill_date = edits.bill_date;
    }
    if let Some(amount) = edits.amount {
        edited.amount = amount;
    }
    if let Some(payment_mode) = &edits.payment_mode {
        edited.payment_mode = payment_mode.trim().to_string();
    }
    if edits.description.is_some() {
        edited.description = non_blank(edits.description.as_deref());
    }
    if let Some(urls) = &edits.document_urls {
        edited.document_urls = clean_urls(urls);
    }

    let mut problems = Vec::new();
    if edited.purpose.is_empty() {
        problems.push("purpose is required".to_string());
    }
    check_claim_content(
        category,
        edited.amount,
        &edited.payment_mode,
        edited.bill_number.as_deref(),
        &edited.document_urls,
        &mut problems,
    );
    if !problems.is_empty() {
        return Err(WorkflowError::Validation { problems });
    }

    edited.updated_at = now;
    *claim = edited;
    Ok(exceeds_policy_limit(category, claim.amount))
}

/// Builds a pending booking after checking the room, time range, headcount
/// and the overlap rule against `existing`.
pub fn draft_booking(
    input: &BookingInput,
    room: &ConferenceRoom,
    employee: &User,
    existing: &[RoomBooking],
    now: DateTime<Utc>,
) -> Result<RoomBooking, WorkflowError> {
    let mut problems = Vec::new();
    if !room.is_active {
        problems.push(format!("room `{}` is not available for booking", room.name));
    }
    if input.purpose.trim().is_empty() {
        problems.push("purpose is required".to_string());
    }
    if input.booking_date < now.date_naive() {
        problems.push("booking date is in the past".to_string());
    }
    if input.attendees_count == 0 {
        problems.push("at least one attendee is required".to_string());
    }
    let start_time = clock_time::parse(&input.start_time);
    let end_time = clock_time::parse(&input.end_time);
    if start_time.is_none() {
        problems.push(format!("start time `{}` is not HH:MM", input.start_time));
    }
    if end_time.is_none() {
        problems.push(format!("end time `{}` is not HH:MM", input.end_time));
    }
    let (Some(start_time), Some(end_time)) = (start_time, end_time) else {
        return Err(WorkflowError::Validation { problems });
    };
    if start_time >= end_time {
        problems.push("start time must be before end time".to_string());
    }
    if !problems.is_empty() {
        return Err(WorkflowError::Validation { problems });
    }
    if input.attendees_count > room.capacity {
        return Err(WorkflowError::CapacityExceeded {
            attendees: input.attendees_count,
            capacity: room.capacity,
        });
    }

    ensure_slot_free(
        &BookingSlot {
            room_id: &room.id,
            booking_date: input.booking_date,
            start_time,
            end_time,
            exclude: None,
        },
        existing,
    )?;

    let booking_uuid = Uuid::new_v4();
    Ok(RoomBooking {
        id: BookingId(booking_uuid.to_string()),
        booking_number: reference_number(BOOKING_NUMBER_PREFIX, now, &booking_uuid),
        room_id: room.id.clone(),
        room_name: room.name.clone(),
        employee_name: employee.full_name.clone(),
        employee_email: employee.email.clone(),
        purpose: input.purpose.trim().to_string(),
        booking_date: input.booking_date,
        start_time,
        end_time,
        status: BookingStatus::Pending,
        attendees_count: input.attendees_count,
        attendees_list: input.attendees_list.clone(),
        pre_setup_required: input.pre_setup_required,
        pre_setup_minutes: if input.pre_setup_required { input.pre_setup_minutes } else { 0 },
        post_cleanup_required: input.post_cleanup_required,
        post_cleanup_minutes: if input.post_cleanup_required {
            input.post_cleanup_minutes
        } else {
            0
        },
        document_urls: clean_urls(&input.document_urls),
        rejection_reason: None,
        send_back_reason: None,
        version: 1,
        created_at: now,
        updated_at: now,
    })
}

fn check_claim_content(
    category: &Category,
    amount: Decimal,
    payment_mode: &str,
    bill_number: Option<&str>,
    document_urls: &[String],
    problems: &mut Vec<String>,
) {
    if amount <= Decimal::ZERO {
        problems.push("amount must be greater than zero".to_string());
    }
    if payment_mode.trim().is_empty() {
        problems.push("payment mode is required".to_string());
    }
    if category.bill_required {
        if non_blank(bill_number).is_none() {
            problems.push("bill number is required for this category".to_string());
        }
        if clean_urls(document_urls).is_empty() {
            problems.push("a supporting document is required for this category".to_string());
        }
    }
}

fn exceeds_policy_limit(category: &Category, amount: Decimal) -> bool {
    category.policy_limit.is_some_and(|limit| amount > limit)
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|value| !value.is_empty()).map(str::to_string)
}

fn clean_urls(urls: &[String]) -> Vec<String> {
    urls.iter().map(|url| url.trim()).filter(|url| !url.is_empty()).map(str::to_string).collect()
}
