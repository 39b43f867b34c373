use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::notification::NotificationId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutboxEmailId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboxStatus {
    Pending,
    Sent,
    Failed,
}

impl OutboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "sent" => Some(Self::Sent),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Email queued in the same transaction as the workflow change that caused it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxEmail {
    pub id: OutboxEmailId,
    pub notification_id: Option<NotificationId>,
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub status: OutboxStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
}

impl OutboxEmail {
    pub fn record_success(&mut self, now: DateTime<Utc>) {
        self.attempts += 1;
        self.status = OutboxStatus::Sent;
        self.last_error = None;
        self.sent_at = Some(now);
    }

    /// Stays pending until `max_attempts` deliveries have failed.
    pub fn record_failure(&mut self, error: impl Into<String>, max_attempts: u32) {
        self.attempts += 1;
        self.last_error = Some(error.into());
        self.status =
            if self.attempts >= max_attempts { OutboxStatus::Failed } else { OutboxStatus::Pending };
    }
}
