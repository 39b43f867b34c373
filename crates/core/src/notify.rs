//! Notification and email composition for workflow events.
//!
//! Composition is pure; the caller persists the drafts together with the
//! transition that produced them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::approval::ApprovalAction;
use crate::domain::booking::{clock_time, BookingId, BookingStatus, RoomBooking};
use crate::domain::claim::{Claim, ClaimId};
use crate::domain::notification::{Notification, NotificationId, NotificationType};
use crate::domain::outbox::{OutboxEmail, OutboxEmailId, OutboxStatus};
use crate::domain::user::User;
use crate::workflow::booking::BookingTransition;
use crate::workflow::engine::ClaimTransition;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationDraft {
    pub recipient_email: String,
    pub claim_id: Option<ClaimId>,
    pub booking_id: Option<BookingId>,
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
}

/// A notification plus the email queued for it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    pub notification: Notification,
    pub email: OutboxEmail,
}

impl NotificationDraft {
    pub fn into_delivery(self, now: DateTime<Utc>) -> Delivery {
        let notification = Notification {
            id: NotificationId(Uuid::new_v4().to_string()),
            recipient_email: self.recipient_email,
            claim_id: self.claim_id,
            booking_id: self.booking_id,
            notification_type: self.notification_type,
            title: self.title,
            message: self.message,
            is_read: false,
            email_sent: false,
            created_at: now,
        };
        let email = compose_email(&notification, now);
        Delivery { notification, email }
    }
}

pub fn compose_email(notification: &Notification, now: DateTime<Utc>) -> OutboxEmail {
    OutboxEmail {
        id: OutboxEmailId(Uuid::new_v4().to_string()),
        notification_id: Some(notification.id.clone()),
        recipient: notification.recipient_email.clone(),
        subject: format!("[Claimdesk] {}", notification.title),
        body: format!(
            "{}\n\nThis is an automated message from the Claimdesk portal.",
            notification.message
        ),
        status: OutboxStatus::Pending,
        attempts: 0,
        last_error: None,
        created_at: now,
        sent_at: None,
    }
}

fn claim_draft(
    claim: &Claim,
    recipient: &str,
    notification_type: NotificationType,
    title: String,
    message: String,
) -> NotificationDraft {
    NotificationDraft {
        recipient_email: recipient.to_string(),
        claim_id: Some(claim.id.clone()),
        booking_id: None,
        notification_type,
        title,
        message,
    }
}

/// Notice to the claim owner about a committed transition. Submissions only
/// notify approvers, so they yield `None` here.
pub fn claim_owner_notice(claim: &Claim, transition: &ClaimTransition) -> Option<NotificationDraft> {
    let number = &claim.claim_number;
    let reason = transition.remarks.as_deref().unwrap_or("no reason given");
    let (kind, title, message) = match transition.action {
        ApprovalAction::Submitted | ApprovalAction::Resubmitted => return None,
        ApprovalAction::Approved => (
            NotificationType::ClaimApproved,
            format!("Claim {number} approved"),
            format!(
                "Your claim {number} for INR {} was approved at {} and is now {}.",
                claim.amount.round_dp(2),
                transition.stage,
                transition.to.label()
            ),
        ),
        ApprovalAction::Rejected => (
            NotificationType::ClaimRejected,
            format!("Claim {number} rejected"),
            format!("Your claim {number} was rejected at {}. Reason: {reason}", transition.stage),
        ),
        ApprovalAction::SendBack => (
            NotificationType::ClaimSentBack,
            format!("Claim {number} sent back"),
            format!(
                "Your claim {number} was sent back for correction. Reason: {reason}. \
                 Update it and resubmit."
            ),
        ),
        ApprovalAction::Paid => {
            let reference =
                transition.payment.as_ref().map(|payment| payment.reference.as_str()).unwrap_or("-");
            (
                NotificationType::ClaimPaid,
                format!("Claim {number} paid"),
                format!(
                    "Your claim {number} for INR {} has been paid. Payment reference: {reference}.",
                    claim.amount.round_dp(2)
                ),
            )
        }
        ApprovalAction::OnHold => (
            NotificationType::ClaimOnHold,
            format!("Claim {number} on hold"),
            match transition.remarks.as_deref() {
                Some(remarks) => format!("Payment of claim {number} is on hold: {remarks}"),
                None => format!("Payment of claim {number} is on hold."),
            },
        ),
        ApprovalAction::Released => (
            NotificationType::ClaimReleased,
            format!("Claim {number} released"),
            format!("Claim {number} was released from hold and is queued for payment again."),
        ),
    };
    Some(claim_draft(claim, &claim.employee_email, kind, title, message))
}

/// Notices for every active user holding the claim's next approver role.
pub fn pending_approval_notices(claim: &Claim, directory: &[User]) -> Vec<NotificationDraft> {
    let Some(role) = claim.current_approver_role else {
        return Vec::new();
    };
    directory
        .iter()
        .filter(|user| user.is_active && user.portal_role == role)
        .map(|user| {
            claim_draft(
                claim,
                &user.email,
                NotificationType::PendingApproval,
                format!("Claim {} awaiting your approval", claim.claim_number),
                format!(
                    "{} submitted claim {} ({}) for INR {}. It is waiting for {} action.",
                    claim.employee_name,
                    claim.claim_number,
                    claim.category_name,
                    claim.amount.round_dp(2),
                    role.label()
                ),
            )
        })
        .collect()
}

/// Owner notice plus approver fan-out for a committed claim transition.
/// `claim` is the claim after the transition was applied.
pub fn claim_notifications(
    claim: &Claim,
    transition: &ClaimTransition,
    directory: &[User],
) -> Vec<NotificationDraft> {
    let mut drafts: Vec<_> = claim_owner_notice(claim, transition).into_iter().collect();
    if matches!(
        transition.action,
        ApprovalAction::Submitted | ApprovalAction::Resubmitted | ApprovalAction::Approved
    ) {
        drafts.extend(pending_approval_notices(claim, directory));
    }
    drafts
}

fn booking_draft(
    booking: &RoomBooking,
    recipient: &str,
    notification_type: NotificationType,
    title: String,
    message: String,
) -> NotificationDraft {
    NotificationDraft {
        recipient_email: recipient.to_string(),
        claim_id: None,
        booking_id: Some(booking.id.clone()),
        notification_type,
        title,
        message,
    }
}

fn slot_text(booking: &RoomBooking) -> String {
    format!(
        "{} on {} from {} to {}",
        booking.room_name,
        booking.booking_date.format("%d %b %Y"),
        clock_time::format(&booking.start_time),
        clock_time::format(&booking.end_time)
    )
}

/// New booking requests go to the admin desk.
pub fn booking_submitted_notices(booking: &RoomBooking, directory: &[User]) -> Vec<NotificationDraft> {
    directory
        .iter()
        .filter(|user| user.is_active && user.portal_role.is_admin_desk())
        .map(|user| {
            booking_draft(
                booking,
                &user.email,
                NotificationType::BookingSubmitted,
                format!("Booking {} awaiting approval", booking.booking_number),
                format!(
                    "{} requested {} for {} attendees: {}",
                    booking.employee_name,
                    slot_text(booking),
                    booking.attendees_count,
                    booking.purpose
                ),
            )
        })
        .collect()
}

pub fn booking_notifications(
    booking: &RoomBooking,
    transition: &BookingTransition,
    directory: &[User],
) -> Vec<NotificationDraft> {
    let number = &booking.booking_number;
    let reason = transition.remarks.as_deref().unwrap_or("no reason given");
    let owner = match transition.to {
        BookingStatus::Approved => Some((
            NotificationType::BookingApproved,
            format!("Booking {number} approved"),
            format!("Your booking of {} is confirmed.", slot_text(booking)),
        )),
        BookingStatus::Rejected => Some((
            NotificationType::BookingRejected,
            format!("Booking {number} rejected"),
            format!("Your booking of {} was rejected. Reason: {reason}", slot_text(booking)),
        )),
        BookingStatus::SentBack => Some((
            NotificationType::BookingSentBack,
            format!("Booking {number} sent back"),
            format!("Your booking of {} needs changes. Reason: {reason}", slot_text(booking)),
        )),
        BookingStatus::Cancelled => Some((
            NotificationType::BookingCancelled,
            format!("Booking {number} cancelled"),
            format!("Your booking of {} was cancelled.", slot_text(booking)),
        )),
        BookingStatus::Pending | BookingStatus::Completed => None,
    };

    let mut drafts: Vec<_> = owner
        .map(|(kind, title, message)| {
            booking_draft(booking, &booking.employee_email, kind, title, message)
        })
        .into_iter()
        .collect();

    if transition.housekeeping_fanout {
        drafts.extend(housekeeping_notices(booking, directory));
    }
    drafts
}

fn housekeeping_notices(booking: &RoomBooking, directory: &[User]) -> Vec<NotificationDraft> {
    let mut tasks = Vec::new();
    if booking.pre_setup_required {
        tasks.push(format!("pre-setup ({} min before)", booking.pre_setup_minutes));
    }
    if booking.post_cleanup_required {
        tasks.push(format!("post-cleanup ({} min after)", booking.post_cleanup_minutes));
    }
    directory
        .iter()
        .filter(|user| user.is_active && user.portal_role.is_admin_desk())
        .map(|user| {
            booking_draft(
                booking,
                &user.email,
                NotificationType::HousekeepingRequired,
                format!("Housekeeping for booking {}", booking.booking_number),
                format!("{} requires {}.", slot_text(booking), tasks.join(" and ")),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{booking_notifications, claim_notifications, claim_owner_notice, NotificationDraft};
    use crate::domain::approval::ApprovalAction;
    use crate::domain::booking::BookingStatus;
    use crate::domain::claim::{ClaimStatus, ClaimType};
    use crate::domain::notification::NotificationType;
    use crate::domain::outbox::OutboxStatus;
    use crate::domain::role::PortalRole;
    use crate::domain::user::User;
    use crate::workflow::booking::tests::booking_fixture;
    use crate::workflow::booking::{decide_booking, BookingDecision};
    use crate::workflow::engine::tests::claim_fixture;
    use crate::workflow::engine::{ClaimDecision, WorkflowEngine};

    fn user(email: &str, portal_role: PortalRole, is_active: bool) -> User {
        User {
            email: email.to_string(),
            full_name: email.to_string(),
            department: "Ops".to_string(),
            designation: "Staff".to_string(),
            portal_role,
            is_active,
        }
    }

    fn directory() -> Vec<User> {
        vec![
            user("mohan@example.com", PortalRole::Manager, true),
            user("old-manager@example.com", PortalRole::Manager, false),
            user("ravi@example.com", PortalRole::JuniorAdmin, true),
            user("meera@example.com", PortalRole::AdminHead, true),
            user("root@example.com", PortalRole::Admin, true),
        ]
    }

    #[test]
    fn approval_notifies_owner_and_next_stage_approvers() {
        let engine = WorkflowEngine::default();
        let mut claim = claim_fixture(ClaimType::Normal, ClaimStatus::Submitted);
        let transition = engine
            .decide(&claim, PortalRole::JuniorAdmin, &ClaimDecision::Approve { remarks: None })
            .expect("verify");
        transition.apply_to(&mut claim, Utc::now());

        let drafts = claim_notifications(&claim, &transition, &directory());
        let recipients: Vec<_> = drafts.iter().map(|d| d.recipient_email.as_str()).collect();

        assert_eq!(recipients, vec!["asha@example.com", "mohan@example.com"]);
        assert_eq!(drafts[0].notification_type, NotificationType::ClaimApproved);
        assert!(drafts[0].message.contains("Verified"));
        assert_eq!(drafts[1].notification_type, NotificationType::PendingApproval);
    }

    #[test]
    fn submission_notifies_approvers_only() {
        let engine = WorkflowEngine::default();
        let mut claim = claim_fixture(ClaimType::Normal, ClaimStatus::Draft);
        let transition = engine.submit_draft(&claim, "asha@example.com").expect("submit");
        transition.apply_to(&mut claim, Utc::now());

        assert_eq!(transition.action, ApprovalAction::Submitted);
        assert!(claim_owner_notice(&claim, &transition).is_none());
        let drafts = claim_notifications(&claim, &transition, &directory());
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].recipient_email, "ravi@example.com");
        assert_eq!(drafts[0].notification_type, NotificationType::PendingApproval);
        assert!(drafts.iter().all(|draft| draft.recipient_email != claim.employee_email));
    }

    #[test]
    fn rejection_message_carries_reason() {
        let engine = WorkflowEngine::default();
        let mut claim = claim_fixture(ClaimType::Normal, ClaimStatus::Verified);
        let transition = engine
            .decide(&claim, PortalRole::Manager, &ClaimDecision::Reject { remarks: "duplicate bill".to_string() })
            .expect("reject");
        transition.apply_to(&mut claim, Utc::now());

        let drafts = claim_notifications(&claim, &transition, &directory());
        assert_eq!(drafts.len(), 1);
        assert!(drafts[0].message.contains("duplicate bill"));
    }

    #[test]
    fn housekeeping_fans_out_to_active_admin_desk() {
        let mut booking = booking_fixture("b1", (10, 0), (11, 0), BookingStatus::Pending);
        booking.pre_setup_required = true;
        booking.pre_setup_minutes = 15;
        let approver = user("ravi@example.com", PortalRole::JuniorAdmin, true);
        let transition =
            decide_booking(&booking, &approver, &BookingDecision::Approve, &[]).expect("approve");
        transition.apply_to(&mut booking, Utc::now());

        let drafts = booking_notifications(&booking, &transition, &directory());
        let housekeeping: Vec<_> = drafts
            .iter()
            .filter(|d| d.notification_type == NotificationType::HousekeepingRequired)
            .collect();

        assert_eq!(drafts[0].notification_type, NotificationType::BookingApproved);
        assert_eq!(housekeeping.len(), 3);
        assert!(housekeeping[0].message.contains("pre-setup (15 min before)"));
    }

    #[test]
    fn delivery_queues_pending_email_for_notification() {
        let draft = NotificationDraft {
            recipient_email: "asha@example.com".to_string(),
            claim_id: None,
            booking_id: None,
            notification_type: NotificationType::ClaimPaid,
            title: "Claim CLM-1 paid".to_string(),
            message: "Paid.".to_string(),
        };
        let delivery = draft.into_delivery(Utc::now());

        assert_eq!(delivery.email.notification_id, Some(delivery.notification.id.clone()));
        assert_eq!(delivery.email.status, OutboxStatus::Pending);
        assert_eq!(delivery.email.subject, "[Claimdesk] Claim CLM-1 paid");
        assert!(!delivery.notification.is_read);
    }
}
