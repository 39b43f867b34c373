//! CSV exports of claims and room bookings.

use serde::Serialize;
use thiserror::Error;

use crate::domain::booking::{clock_time, RoomBooking};
use crate::domain::claim::Claim;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("csv encoding failed: {0}")]
    Csv(#[from] csv::Error),
    #[error("csv buffer could not be flushed: {0}")]
    Flush(String),
    #[error("csv output is not valid utf-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

#[derive(Serialize)]
struct ClaimRow<'a> {
    claim_number: &'a str,
    claim_type: &'static str,
    status: &'static str,
    employee_name: &'a str,
    employee_email: &'a str,
    department: &'a str,
    category: &'a str,
    expense_date: String,
    amount: String,
    payment_mode: &'a str,
    current_approver: &'static str,
    sla_date: String,
    payment_date: String,
    payment_reference: &'a str,
    rejection_reason: &'a str,
    created_at: String,
}

impl<'a> From<&'a Claim> for ClaimRow<'a> {
    fn from(claim: &'a Claim) -> Self {
        Self {
            claim_number: &claim.claim_number,
            claim_type: claim.claim_type.as_str(),
            status: claim.status.as_str(),
            employee_name: &claim.employee_name,
            employee_email: &claim.employee_email,
            department: &claim.department,
            category: &claim.category_name,
            expense_date: claim.expense_date.to_string(),
            amount: claim.amount.round_dp(2).to_string(),
            payment_mode: &claim.payment_mode,
            current_approver: claim.current_approver_role.map(|role| role.as_str()).unwrap_or(""),
            sla_date: claim.sla_date.to_string(),
            payment_date: claim.payment_date.map(|date| date.to_string()).unwrap_or_default(),
            payment_reference: claim.payment_reference.as_deref().unwrap_or(""),
            rejection_reason: claim.rejection_reason.as_deref().unwrap_or(""),
            created_at: claim.created_at.to_rfc3339(),
        }
    }
}

#[derive(Serialize)]
struct BookingRow<'a> {
    booking_number: &'a str,
    room: &'a str,
    booking_date: String,
    start_time: String,
    end_time: String,
    status: &'static str,
    employee_name: &'a str,
    employee_email: &'a str,
    purpose: &'a str,
    attendees_count: u32,
    pre_setup_minutes: u32,
    post_cleanup_minutes: u32,
    rejection_reason: &'a str,
    created_at: String,
}

impl<'a> From<&'a RoomBooking> for BookingRow<'a> {
    fn from(booking: &'a RoomBooking) -> Self {
        Self {
            booking_number: &booking.booking_number,
            room: &booking.room_name,
            booking_date: booking.booking_date.to_string(),
            start_time: clock_time::format(&booking.start_time),
            end_time: clock_time::format(&booking.end_time),
            status: booking.status.as_str(),
            employee_name: &booking.employee_name,
            employee_email: &booking.employee_email,
            purpose: &booking.purpose,
            attendees_count: booking.attendees_count,
            pre_setup_minutes: booking.pre_setup_minutes,
            post_cleanup_minutes: booking.post_cleanup_minutes,
            rejection_reason: booking.rejection_reason.as_deref().unwrap_or(""),
            created_at: booking.created_at.to_rfc3339(),
        }
    }
}

pub fn claims_csv(claims: &[Claim]) -> Result<String, ExportError> {
    write_rows(claims.iter().map(ClaimRow::from))
}

pub fn bookings_csv(bookings: &[RoomBooking]) -> Result<String, ExportError> {
    write_rows(bookings.iter().map(BookingRow::from))
}

fn write_rows<R, I>(rows: I) -> Result<String, ExportError>
where
    R: Serialize,
    I: IntoIterator<Item = R>,
{
    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in rows {
        writer.serialize(row)?;
    }
    let bytes = writer.into_inner().map_err(|error| ExportError::Flush(error.to_string()))?;
    Ok(String::from_utf8(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::{bookings_csv, claims_csv};
    use crate::domain::booking::BookingStatus;
    use crate::domain::claim::{ClaimStatus, ClaimType};
    use crate::workflow::booking::tests::booking_fixture;
    use crate::workflow::engine::tests::claim_fixture;

    #[test]
    fn claims_export_has_header_and_quoted_fields() {
        let mut claim = claim_fixture(ClaimType::Normal, ClaimStatus::Rejected);
        claim.rejection_reason = Some("duplicate, see CLM-1".to_string());

        let csv = claims_csv(&[claim]).expect("export");
        let lines: Vec<_> = csv.lines().collect();

        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("claim_number,claim_type,status,"));
        assert!(lines[1].contains("\"duplicate, see CLM-1\""));
        assert!(lines[1].contains(",5000,"));
    }

    #[test]
    fn empty_export_is_empty() {
        assert_eq!(claims_csv(&[]).expect("export"), "");
    }

    #[test]
    fn bookings_export_formats_times() {
        let booking = booking_fixture("b1", (9, 30), (10, 45), BookingStatus::Approved);
        let csv = bookings_csv(&[booking]).expect("export");
        assert!(csv.lines().nth(1).expect("row").contains(",09:30,10:45,approved,"));
    }
}
