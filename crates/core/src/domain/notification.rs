use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::booking::BookingId;
use crate::domain::claim::ClaimId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NotificationId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    ClaimApproved,
    ClaimRejected,
    ClaimSentBack,
    ClaimPaid,
    ClaimOnHold,
    ClaimReleased,
    PendingApproval,
    BookingSubmitted,
    BookingApproved,
    BookingRejected,
    BookingSentBack,
    BookingCancelled,
    HousekeepingRequired,
}

impl NotificationType {
    pub const ALL: [NotificationType; 13] = [
        Self::ClaimApproved,
        Self::ClaimRejected,
        Self::ClaimSentBack,
        Self::ClaimPaid,
        Self::ClaimOnHold,
        Self::ClaimReleased,
        Self::PendingApproval,
        Self::BookingSubmitted,
        Self::BookingApproved,
        Self::BookingRejected,
        Self::BookingSentBack,
        Self::BookingCancelled,
        Self::HousekeepingRequired,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClaimApproved => "claim_approved",
            Self::ClaimRejected => "claim_rejected",
            Self::ClaimSentBack => "claim_sent_back",
            Self::ClaimPaid => "claim_paid",
            Self::ClaimOnHold => "claim_on_hold",
            Self::ClaimReleased => "claim_released",
            Self::PendingApproval => "pending_approval",
            Self::BookingSubmitted => "booking_submitted",
            Self::BookingApproved => "booking_approved",
            Self::BookingRejected => "booking_rejected",
            Self::BookingSentBack => "booking_sent_back",
            Self::BookingCancelled => "booking_cancelled",
            Self::HousekeepingRequired => "housekeeping_required",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|kind| kind.as_str() == normalized)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub recipient_email: String,
    pub claim_id: Option<ClaimId>,
    pub booking_id: Option<BookingId>,
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    pub is_read: bool,
    pub email_sent: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::NotificationType;

    #[test]
    fn notification_type_round_trips_from_storage_encoding() {
        for kind in NotificationType::ALL {
            assert_eq!(NotificationType::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(NotificationType::parse("claim_submitted"), None);
    }
}
