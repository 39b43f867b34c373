use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::booking::{BookingId, BookingStatus, RoomBooking, RoomId};
use crate::domain::user::User;
use crate::workflow::engine::{required_remarks, WorkflowError};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum BookingDecision {
    Approve,
    Reject { remarks: String },
    SendBack { remarks: String },
    Cancel,
}

/// A room slot on one date, optionally ignoring the booking being re-checked.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BookingSlot<'a> {
    pub room_id: &'a RoomId,
    pub booking_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub exclude: Option<&'a BookingId>,
}

impl<'a> BookingSlot<'a> {
    pub fn of(booking: &'a RoomBooking) -> Self {
        Self {
            room_id: &booking.room_id,
            booking_date: booking.booking_date,
            start_time: booking.start_time,
            end_time: booking.end_time,
            exclude: Some(&booking.id),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingTransition {
    pub booking_id: BookingId,
    pub from: BookingStatus,
    pub to: BookingStatus,
    pub remarks: Option<String>,
    pub housekeeping_fanout: bool,
}

impl BookingTransition {
    pub fn apply_to(&self, booking: &mut RoomBooking, now: DateTime<Utc>) {
        booking.status = self.to;
        match self.to {
            BookingStatus::Rejected => booking.rejection_reason = self.remarks.clone(),
            BookingStatus::SentBack => booking.send_back_reason = self.remarks.clone(),
            _ => {}
        }
        booking.version += 1;
        booking.updated_at = now;
    }
}

/// Half-open `[start, end)` intervals overlap.
pub fn overlaps(a_start: NaiveTime, a_end: NaiveTime, b_start: NaiveTime, b_end: NaiveTime) -> bool {
    a_start < b_end && b_start < a_end
}

pub fn find_conflicts<'b>(slot: &BookingSlot<'_>, existing: &'b [RoomBooking]) -> Vec<&'b RoomBooking> {
    existing
        .iter()
        .filter(|other| Some(&other.id) != slot.exclude)
        .filter(|other| &other.room_id == slot.room_id && other.booking_date == slot.booking_date)
        .filter(|other| other.status.occupies_slot())
        .filter(|other| overlaps(slot.start_time, slot.end_time, other.start_time, other.end_time))
        .collect()
}

pub fn ensure_slot_free(slot: &BookingSlot<'_>, existing: &[RoomBooking]) -> Result<(), WorkflowError> {
    let conflicts = find_conflicts(slot, existing);
    if conflicts.is_empty() {
        return Ok(());
    }
    Err(WorkflowError::BookingConflict {
        conflicting: conflicts
            .iter()
            .map(|booking| {
                format!(
                    "{} ({}-{})",
                    booking.booking_number,
                    booking.start_time.format("%H:%M"),
                    booking.end_time.format("%H:%M")
                )
            })
            .collect(),
    })
}

/// Decides an approver action or an owner cancellation on a room booking.
/// `existing` is the current set of bookings used for the overlap check on approve.
pub fn decide_booking(
    booking: &RoomBooking,
    actor: &User,
    decision: &BookingDecision,
    existing: &[RoomBooking],
) -> Result<BookingTransition, WorkflowError> {
    match decision {
        BookingDecision::Cancel => {
            if !booking.is_owned_by(&actor.email) {
                return Err(WorkflowError::NotOwner { operation: "cancel this booking" });
            }
            require_pending(booking, "cancelled")?;
            Ok(transition(booking, BookingStatus::Cancelled, None, false))
        }
        BookingDecision::Approve => {
            require_admin_desk(actor)?;
            require_pending(booking, "approved")?;
            ensure_slot_free(&BookingSlot::of(booking), existing)?;
            Ok(transition(booking, BookingStatus::Approved, None, booking.needs_housekeeping()))
        }
        BookingDecision::Reject { remarks } => {
            require_admin_desk(actor)?;
            let remarks = required_remarks(remarks, "reject")?;
            require_pending(booking, "rejected")?;
            Ok(transition(booking, BookingStatus::Rejected, Some(remarks), false))
        }
        BookingDecision::SendBack { remarks } => {
            require_admin_desk(actor)?;
            let remarks = required_remarks(remarks, "send back")?;
            require_pending(booking, "sent back")?;
            Ok(transition(booking, BookingStatus::SentBack, Some(remarks), false))
        }
    }
}

pub fn decide_booking_with_audit<S>(
    booking: &RoomBooking,
    actor: &User,
    decision: &BookingDecision,
    existing: &[RoomBooking],
    sink: &S,
    audit: &AuditContext,
) -> Result<BookingTransition, WorkflowError>
where
    S: AuditSink,
{
    let result = decide_booking(booking, actor, decision, existing);
    let event = match &result {
        Ok(transition) => AuditEvent::new(
            Some(booking.id.0.clone()),
            audit.correlation_id.clone(),
            "booking.transition_decided",
            AuditCategory::Booking,
            audit.actor.clone(),
            AuditOutcome::Success,
        )
        .with_metadata("from", transition.from.as_str())
        .with_metadata("to", transition.to.as_str())
        .with_metadata("room", booking.room_id.0.clone()),
        Err(error) => AuditEvent::new(
            Some(booking.id.0.clone()),
            audit.correlation_id.clone(),
            "booking.transition_rejected",
            AuditCategory::Booking,
            audit.actor.clone(),
            AuditOutcome::Rejected,
        )
        .with_metadata("error", error.to_string()),
    };
    sink.emit(event);
    result
}

fn require_admin_desk(actor: &User) -> Result<(), WorkflowError> {
    if actor.portal_role.is_admin_desk() {
        Ok(())
    } else {
        Err(WorkflowError::BookingNotEligible { role: actor.portal_role })
    }
}

/// Approved bookings whose end time has passed, moved to `completed`.
pub fn elapsed_bookings(bookings: &[RoomBooking], now: NaiveDateTime) -> Vec<BookingTransition> {
    bookings
        .iter()
        .filter(|booking| booking.status == BookingStatus::Approved && booking.ends_at() <= now)
        .map(|booking| transition(booking, BookingStatus::Completed, None, false))
        .collect()
}

pub fn approval_queue(bookings: &[RoomBooking]) -> Vec<&RoomBooking> {
    bookings.iter().filter(|booking| booking.status == BookingStatus::Pending).collect()
}

fn require_pending(booking: &RoomBooking, operation: &'static str) -> Result<(), WorkflowError> {
    if booking.status == BookingStatus::Pending {
        Ok(())
    } else {
        Err(WorkflowError::InvalidBookingStatus { status: booking.status, operation })
    }
}

fn transition(
    booking: &RoomBooking,
    to: BookingStatus,
    remarks: Option<String>,
    housekeeping_fanout: bool,
) -> BookingTransition {
    BookingTransition {
        booking_id: booking.id.clone(),
        from: booking.status,
        to,
        remarks,
        housekeeping_fanout,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};

    use super::{
        decide_booking, decide_booking_with_audit, elapsed_bookings, find_conflicts, overlaps,
        BookingDecision, BookingSlot,
    };
    use crate::audit::{AuditCategory, AuditContext, AuditOutcome, InMemoryAuditSink};
    use crate::domain::booking::{BookingId, BookingStatus, RoomBooking, RoomId};
    use crate::domain::role::PortalRole;
    use crate::domain::user::User;
    use crate::workflow::engine::WorkflowError;

    fn at(hour: u32, minute: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, minute, 0).expect("time")
    }

    pub(crate) fn booking_fixture(id: &str, start: (u32, u32), end: (u32, u32), status: BookingStatus) -> RoomBooking {
        let created_at = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).single().expect("timestamp");
        RoomBooking {
            id: BookingId(id.to_string()),
            booking_number: format!("BKG-{id}"),
            room_id: RoomId("room-boardroom".to_string()),
            room_name: "Boardroom".to_string(),
            employee_name: "Asha Rao".to_string(),
            employee_email: "asha@example.com".to_string(),
            purpose: "Quarterly review".to_string(),
            booking_date: NaiveDate::from_ymd_opt(2026, 3, 10).expect("date"),
            start_time: at(start.0, start.1),
            end_time: at(end.0, end.1),
            status,
            attendees_count: 6,
            attendees_list: Vec::new(),
            pre_setup_required: false,
            pre_setup_minutes: 0,
            post_cleanup_required: false,
            post_cleanup_minutes: 0,
            document_urls: Vec::new(),
            rejection_reason: None,
            send_back_reason: None,
            version: 1,
            created_at,
            updated_at: created_at,
        }
    }

    fn user(email: &str, portal_role: PortalRole) -> User {
        User {
            email: email.to_string(),
            full_name: email.to_string(),
            department: "Admin".to_string(),
            designation: "Staff".to_string(),
            portal_role,
            is_active: true,
        }
    }

    #[test]
    fn half_open_intervals_touching_at_boundary_do_not_overlap() {
        assert!(!overlaps(at(9, 0), at(10, 0), at(10, 0), at(11, 0)));
        assert!(overlaps(at(9, 0), at(10, 30), at(10, 0), at(11, 0)));
        assert!(overlaps(at(9, 0), at(12, 0), at(10, 0), at(11, 0)));
    }

    #[test]
    fn conflicts_ignore_other_rooms_dates_and_closed_bookings() {
        let candidate = booking_fixture("b1", (10, 0), (11, 0), BookingStatus::Pending);
        let mut other_room = booking_fixture("b2", (10, 0), (11, 0), BookingStatus::Approved);
        other_room.room_id = RoomId("room-huddle".to_string());
        let mut other_date = booking_fixture("b3", (10, 0), (11, 0), BookingStatus::Approved);
        other_date.booking_date = NaiveDate::from_ymd_opt(2026, 3, 11).expect("date");
        let cancelled = booking_fixture("b4", (10, 0), (11, 0), BookingStatus::Cancelled);
        let clash = booking_fixture("b5", (10, 30), (11, 30), BookingStatus::Pending);

        let existing = vec![candidate.clone(), other_room, other_date, cancelled, clash];
        let conflicts = find_conflicts(&BookingSlot::of(&candidate), &existing);

        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].id.0, "b5");
    }

    #[test]
    fn approval_is_blocked_by_overlapping_booking() {
        let candidate = booking_fixture("b1", (10, 0), (11, 0), BookingStatus::Pending);
        let approved = booking_fixture("b2", (9, 30), (10, 15), BookingStatus::Approved);
        let approver = user("ravi@example.com", PortalRole::JuniorAdmin);

        let error = decide_booking(&candidate, &approver, &BookingDecision::Approve, &[approved])
            .expect_err("conflict");
        assert!(matches!(error, WorkflowError::BookingConflict { ref conflicting } if conflicting.len() == 1));
    }

    #[test]
    fn approval_flags_housekeeping_fanout() {
        let mut candidate = booking_fixture("b1", (10, 0), (11, 0), BookingStatus::Pending);
        candidate.post_cleanup_required = true;
        let approver = user("meera@example.com", PortalRole::AdminHead);

        let transition =
            decide_booking(&candidate, &approver, &BookingDecision::Approve, &[]).expect("approve");
        assert_eq!(transition.to, BookingStatus::Approved);
        assert!(transition.housekeeping_fanout);
    }

    #[test]
    fn only_admin_desk_decides_bookings() {
        let candidate = booking_fixture("b1", (10, 0), (11, 0), BookingStatus::Pending);
        for role in [PortalRole::Employee, PortalRole::Manager, PortalRole::Finance] {
            let actor = user("someone@example.com", role);
            assert!(matches!(
                decide_booking(&candidate, &actor, &BookingDecision::Approve, &[]),
                Err(WorkflowError::BookingNotEligible { .. })
            ));
        }
    }

    #[test]
    fn reject_requires_remarks() {
        let candidate = booking_fixture("b1", (10, 0), (11, 0), BookingStatus::Pending);
        let approver = user("ravi@example.com", PortalRole::Admin);
        assert!(matches!(
            decide_booking(&candidate, &approver, &BookingDecision::Reject { remarks: " ".to_string() }, &[]),
            Err(WorkflowError::RemarksRequired { .. })
        ));
    }

    #[test]
    fn owner_cancels_only_while_pending() {
        let owner = user("asha@example.com", PortalRole::Employee);
        let pending = booking_fixture("b1", (10, 0), (11, 0), BookingStatus::Pending);
        let cancelled =
            decide_booking(&pending, &owner, &BookingDecision::Cancel, &[]).expect("cancel");
        assert_eq!(cancelled.to, BookingStatus::Cancelled);

        let approved = booking_fixture("b2", (10, 0), (11, 0), BookingStatus::Approved);
        assert!(matches!(
            decide_booking(&approved, &owner, &BookingDecision::Cancel, &[]),
            Err(WorkflowError::InvalidBookingStatus { status: BookingStatus::Approved, .. })
        ));

        let stranger = user("other@example.com", PortalRole::Admin);
        assert!(matches!(
            decide_booking(&pending, &stranger, &BookingDecision::Cancel, &[]),
            Err(WorkflowError::NotOwner { .. })
        ));
    }

    #[test]
    fn elapsed_approved_bookings_complete() {
        let approved = booking_fixture("b1", (10, 0), (11, 0), BookingStatus::Approved);
        let pending = booking_fixture("b2", (12, 0), (13, 0), BookingStatus::Pending);
        let now = NaiveDate::from_ymd_opt(2026, 3, 10).expect("date").and_time(at(11, 0));

        let completed = elapsed_bookings(&[approved, pending], now);
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].to, BookingStatus::Completed);
    }

    #[test]
    fn booking_decisions_are_audited_with_the_room() {
        let sink = InMemoryAuditSink::default();
        let booking = booking_fixture("b1", (10, 0), (11, 0), BookingStatus::Pending);
        let audit = AuditContext::new(Some(booking.id.0.clone()), "req-bkg", "ravi@example.com");
        let ravi = user("ravi@example.com", PortalRole::JuniorAdmin);
        let asha = user("asha@example.com", PortalRole::Employee);

        decide_booking_with_audit(&booking, &ravi, &BookingDecision::Approve, &[], &sink, &audit)
            .expect("approve");
        let refused =
            decide_booking_with_audit(&booking, &asha, &BookingDecision::Approve, &[], &sink, &audit);
        assert!(matches!(refused, Err(WorkflowError::BookingNotEligible { .. })));

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|event| event.category == AuditCategory::Booking));
        assert_eq!(events[0].event_type, "booking.transition_decided");
        assert_eq!(events[0].metadata.get("room").map(String::as_str), Some("room-boardroom"));
        assert_eq!(events[1].outcome, AuditOutcome::Rejected);
    }
}
