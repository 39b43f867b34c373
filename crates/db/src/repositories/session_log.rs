use sqlx::sqlite::SqliteRow;

use claimdesk_core::domain::session::{SessionActivity, SessionId, SessionLogEntry};
use claimdesk_core::session::{SessionSink, SessionSinkError};

use super::codec::{enum_column, get, timestamp_column};
use super::{RepositoryError, SessionLogRepository};
use crate::DbPool;

pub struct SqlSessionLogRepository {
    pool: DbPool,
}

impl SqlSessionLogRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_entry(row: &SqliteRow) -> Result<SessionLogEntry, RepositoryError> {
    Ok(SessionLogEntry {
        id: get(row, "id")?,
        session_id: SessionId(get(row, "session_id")?),
        user_email: get(row, "user_email")?,
        activity: enum_column(row, "activity", SessionActivity::parse)?,
        detail: get(row, "detail")?,
        occurred_at: timestamp_column(row, "occurred_at")?,
    })
}

#[async_trait::async_trait]
impl SessionLogRepository for SqlSessionLogRepository {
    async fn append(&self, entries: &[SessionLogEntry]) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        for entry in entries {
            sqlx::query(
                "INSERT INTO session_log (id, session_id, user_email, activity, detail, occurred_at)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&entry.id)
            .bind(&entry.session_id.0)
            .bind(&entry.user_email)
            .bind(entry.activity.as_str())
            .bind(&entry.detail)
            .bind(entry.occurred_at.to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn list_for_user(&self, email: &str) -> Result<Vec<SessionLogEntry>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, session_id, user_email, activity, detail, occurred_at
             FROM session_log WHERE user_email = ? ORDER BY occurred_at ASC, rowid ASC",
        )
        .bind(email.trim())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_entry).collect()
    }
}

#[async_trait::async_trait]
impl SessionSink for SqlSessionLogRepository {
    async fn record(&self, entries: &[SessionLogEntry]) -> Result<(), SessionSinkError> {
        self.append(entries).await.map_err(|error| SessionSinkError(error.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use claimdesk_core::domain::session::SessionActivity;
    use claimdesk_core::session::SessionLogger;

    use super::SqlSessionLogRepository;
    use crate::repositories::SessionLogRepository;
    use crate::{connect_with_settings, migrations};

    #[tokio::test]
    async fn flushed_activity_is_persisted_in_order() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let repo = SqlSessionLogRepository::new(pool);

        let mut logger = SessionLogger::ephemeral("asha@example.com");
        logger.log(SessionActivity::Login, "signed in", chrono::Utc::now());
        logger.action("submitted claim CLM-1");
        assert_eq!(logger.flush(&repo).await, 2);
        assert!(logger.pending().is_empty());

        let stored = repo.list_for_user("asha@example.com").await.expect("list");
        let activities: Vec<_> = stored.iter().map(|entry| entry.activity).collect();
        assert_eq!(activities, vec![SessionActivity::Login, SessionActivity::Action]);
        assert_eq!(stored[1].detail, "submitted claim CLM-1");
    }
}
