use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BookingId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoomId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Approved,
    Rejected,
    SentBack,
    Cancelled,
    Completed,
}

impl BookingStatus {
    pub const ALL: [BookingStatus; 6] = [
        Self::Pending,
        Self::Approved,
        Self::Rejected,
        Self::SentBack,
        Self::Cancelled,
        Self::Completed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::SentBack => "sent_back",
            Self::Cancelled => "cancelled",
            Self::Completed => "completed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|status| status.as_str() == normalized)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Approved => "Approved",
            Self::Rejected => "Rejected",
            Self::SentBack => "Sent Back",
            Self::Cancelled => "Cancelled",
            Self::Completed => "Completed",
        }
    }

    /// Statuses that hold a room slot.
    pub fn occupies_slot(&self) -> bool {
        matches!(self, Self::Pending | Self::Approved)
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attendee {
    pub name: String,
    pub email: Option<String>,
    pub contact: Option<String>,
    pub company_name: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConferenceRoom {
    pub id: RoomId,
    pub name: String,
    pub location: String,
    pub capacity: u32,
    pub is_active: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomBooking {
    pub id: BookingId,
    pub booking_number: String,
    pub room_id: RoomId,
    pub room_name: String,
    pub employee_name: String,
    pub employee_email: String,
    pub purpose: String,
    pub booking_date: NaiveDate,
    #[serde(with = "clock_time")]
    pub start_time: NaiveTime,
    #[serde(with = "clock_time")]
    pub end_time: NaiveTime,
    pub status: BookingStatus,
    pub attendees_count: u32,
    pub attendees_list: Vec<Attendee>,
    pub pre_setup_required: bool,
    pub pre_setup_minutes: u32,
    pub post_cleanup_required: bool,
    pub post_cleanup_minutes: u32,
    pub document_urls: Vec<String>,
    pub rejection_reason: Option<String>,
    pub send_back_reason: Option<String>,
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RoomBooking {
    pub fn needs_housekeeping(&self) -> bool {
        self.pre_setup_required || self.post_cleanup_required
    }

    pub fn ends_at(&self) -> NaiveDateTime {
        self.booking_date.and_time(self.end_time)
    }

    pub fn is_owned_by(&self, email: &str) -> bool {
        self.employee_email.eq_ignore_ascii_case(email.trim())
    }
}

/// `HH:MM` wall-clock encoding used on the wire and in storage.
pub mod clock_time {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%H:%M";

    pub fn parse(value: &str) -> Option<NaiveTime> {
        let trimmed = value.trim();
        NaiveTime::parse_from_str(trimmed, FORMAT)
            .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M:%S"))
            .ok()
    }

    pub fn format(value: &NaiveTime) -> String {
        value.format(FORMAT).to_string()
    }

    pub fn serialize<S>(value: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format(value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid HH:MM time `{raw}`")))
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveTime;

    use super::{clock_time, BookingStatus};

    #[test]
    fn booking_status_round_trips_from_storage_encoding() {
        for status in BookingStatus::ALL {
            assert_eq!(BookingStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn only_pending_and_approved_occupy_a_slot() {
        let occupying: Vec<_> =
            BookingStatus::ALL.into_iter().filter(BookingStatus::occupies_slot).collect();
        assert_eq!(occupying, vec![BookingStatus::Pending, BookingStatus::Approved]);
    }

    #[test]
    fn clock_time_accepts_minutes_and_seconds_forms() {
        let expected = NaiveTime::from_hms_opt(9, 30, 0);
        assert_eq!(clock_time::parse("09:30"), expected);
        assert_eq!(clock_time::parse("09:30:00"), expected);
        assert_eq!(clock_time::parse("9.30"), None);
        assert_eq!(clock_time::format(&NaiveTime::from_hms_opt(14, 5, 0).expect("time")), "14:05");
    }
}
