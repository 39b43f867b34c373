use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::SqliteConnection;

use claimdesk_core::domain::booking::BookingId;
use claimdesk_core::domain::claim::ClaimId;
use claimdesk_core::domain::notification::{Notification, NotificationId, NotificationType};
use claimdesk_core::domain::outbox::{OutboxEmail, OutboxEmailId, OutboxStatus};
use claimdesk_core::notify::Delivery;

use super::codec::{
    bool_column, enum_column, get, optional_timestamp_column, timestamp_column, u32_column,
};
use super::{NotificationRepository, OutboxRepository, RepositoryError};
use crate::DbPool;

const NOTIFICATION_COLUMNS: &str = "id, recipient_email, claim_id, booking_id, notification_type,
     title, message, is_read, email_sent, created_at";

const OUTBOX_COLUMNS: &str = "id, notification_id, recipient, subject, body, status, attempts,
     last_error, created_at, sent_at";

pub struct SqlNotificationRepository {
    pool: DbPool,
}

impl SqlNotificationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

pub struct SqlOutboxRepository {
    pool: DbPool,
}

impl SqlOutboxRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_notification(row: &SqliteRow) -> Result<Notification, RepositoryError> {
    let claim_id: Option<String> = get(row, "claim_id")?;
    let booking_id: Option<String> = get(row, "booking_id")?;
    Ok(Notification {
        id: NotificationId(get(row, "id")?),
        recipient_email: get(row, "recipient_email")?,
        claim_id: claim_id.map(ClaimId),
        booking_id: booking_id.map(BookingId),
        notification_type: enum_column(row, "notification_type", NotificationType::parse)?,
        title: get(row, "title")?,
        message: get(row, "message")?,
        is_read: bool_column(row, "is_read")?,
        email_sent: bool_column(row, "email_sent")?,
        created_at: timestamp_column(row, "created_at")?,
    })
}

fn row_to_outbox(row: &SqliteRow) -> Result<OutboxEmail, RepositoryError> {
    let notification_id: Option<String> = get(row, "notification_id")?;
    Ok(OutboxEmail {
        id: OutboxEmailId(get(row, "id")?),
        notification_id: notification_id.map(NotificationId),
        recipient: get(row, "recipient")?,
        subject: get(row, "subject")?,
        body: get(row, "body")?,
        status: enum_column(row, "status", OutboxStatus::parse)?,
        attempts: u32_column(row, "attempts")?,
        last_error: get(row, "last_error")?,
        created_at: timestamp_column(row, "created_at")?,
        sent_at: optional_timestamp_column(row, "sent_at")?,
    })
}

/// Writes notifications and their queued emails on an open transaction.
pub(crate) async fn insert_deliveries(
    conn: &mut SqliteConnection,
    deliveries: &[Delivery],
) -> Result<(), RepositoryError> {
    for Delivery { notification, email } in deliveries {
        sqlx::query(
            "INSERT INTO notification (id, recipient_email, claim_id, booking_id,
                                       notification_type, title, message, is_read,
                                       email_sent, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&notification.id.0)
        .bind(&notification.recipient_email)
        .bind(notification.claim_id.as_ref().map(|id| id.0.as_str()))
        .bind(notification.booking_id.as_ref().map(|id| id.0.as_str()))
        .bind(notification.notification_type.as_str())
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(notification.is_read)
        .bind(notification.email_sent)
        .bind(notification.created_at.to_rfc3339())
        .execute(&mut *conn)
        .await?;

        sqlx::query(
            "INSERT INTO email_outbox (id, notification_id, recipient, subject, body, status,
                                       attempts, last_error, created_at, sent_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&email.id.0)
        .bind(email.notification_id.as_ref().map(|id| id.0.as_str()))
        .bind(&email.recipient)
        .bind(&email.subject)
        .bind(&email.body)
        .bind(email.status.as_str())
        .bind(i64::from(email.attempts))
        .bind(&email.last_error)
        .bind(email.created_at.to_rfc3339())
        .bind(email.sent_at.map(|value| value.to_rfc3339()))
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

#[async_trait::async_trait]
impl NotificationRepository for SqlNotificationRepository {
    async fn list_for_recipient(&self, email: &str) -> Result<Vec<Notification>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notification
             WHERE recipient_email = ? ORDER BY created_at DESC, id"
        ))
        .bind(email.trim())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_notification).collect()
    }

    async fn unread_count(&self, email: &str) -> Result<u64, RepositoryError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notification WHERE recipient_email = ? AND is_read = 0",
        )
        .bind(email.trim())
        .fetch_one(&self.pool)
        .await?;
        Ok(count.max(0) as u64)
    }

    async fn mark_read(&self, id: &NotificationId, email: &str) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE notification SET is_read = 1 WHERE id = ? AND recipient_email = ?",
        )
        .bind(&id.0)
        .bind(email.trim())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_all_read(&self, email: &str) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            "UPDATE notification SET is_read = 1 WHERE recipient_email = ? AND is_read = 0",
        )
        .bind(email.trim())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait::async_trait]
impl OutboxRepository for SqlOutboxRepository {
    async fn list_pending(&self, limit: u32) -> Result<Vec<OutboxEmail>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {OUTBOX_COLUMNS} FROM email_outbox
             WHERE status = 'pending' ORDER BY created_at ASC, id LIMIT ?"
        ))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_outbox).collect()
    }

    async fn record_attempt(&self, email: &OutboxEmail) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "UPDATE email_outbox
             SET status = ?, attempts = ?, last_error = ?, sent_at = ?
             WHERE id = ?",
        )
        .bind(email.status.as_str())
        .bind(i64::from(email.attempts))
        .bind(&email.last_error)
        .bind(email.sent_at.map(|value| value.to_rfc3339()))
        .bind(&email.id.0)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound { entity: "email", id: email.id.0.clone() });
        }

        if email.status == OutboxStatus::Sent {
            if let Some(notification_id) = &email.notification_id {
                sqlx::query("UPDATE notification SET email_sent = 1 WHERE id = ?")
                    .bind(&notification_id.0)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await?;
        tracing::debug!(
            event_name = "outbox.attempt_recorded",
            email_id = %email.id.0,
            status = email.status.as_str(),
            attempts = email.attempts,
            recorded_at = %Utc::now().to_rfc3339(),
            "outbox attempt recorded"
        );
        Ok(())
    }
}
