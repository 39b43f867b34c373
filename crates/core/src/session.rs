use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::session::{SessionActivity, SessionId, SessionLogEntry};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("session log sink failed: {0}")]
pub struct SessionSinkError(pub String);

#[async_trait]
pub trait SessionSink: Send + Sync {
    async fn record(&self, entries: &[SessionLogEntry]) -> Result<(), SessionSinkError>;
}

/// Activity buffer owned by one session or request.
///
/// Entries are flushed best-effort: a failing sink is reported with
/// `tracing::warn!` and the buffered entries are dropped, so logging never
/// blocks the action being logged.
#[derive(Clone, Debug)]
pub struct SessionLogger {
    session_id: SessionId,
    user_email: String,
    pending: Vec<SessionLogEntry>,
}

impl SessionLogger {
    pub fn new(session_id: SessionId, user_email: impl Into<String>) -> Self {
        Self { session_id, user_email: user_email.into(), pending: Vec::new() }
    }

    /// Logger for a request that did not carry a session id.
    pub fn ephemeral(user_email: impl Into<String>) -> Self {
        Self::new(SessionId(Uuid::new_v4().to_string()), user_email)
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn pending(&self) -> &[SessionLogEntry] {
        &self.pending
    }

    pub fn log(&mut self, activity: SessionActivity, detail: impl Into<String>, now: DateTime<Utc>) {
        self.pending.push(SessionLogEntry {
            id: Uuid::new_v4().to_string(),
            session_id: self.session_id.clone(),
            user_email: self.user_email.clone(),
            activity,
            detail: detail.into(),
            occurred_at: now,
        });
    }

    pub fn action(&mut self, detail: impl Into<String>) {
        self.log(SessionActivity::Action, detail, Utc::now());
    }

    /// Returns how many entries the sink accepted.
    pub async fn flush<S>(&mut self, sink: &S) -> usize
    where
        S: SessionSink + ?Sized,
    {
        if self.pending.is_empty() {
            return 0;
        }
        let entries = std::mem::take(&mut self.pending);
        match sink.record(&entries).await {
            Ok(()) => entries.len(),
            Err(error) => {
                tracing::warn!(
                    event_name = "session.flush_failed",
                    session_id = %self.session_id.0,
                    user_email = %self.user_email,
                    dropped = entries.len(),
                    error = %error,
                    "session activity could not be recorded"
                );
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::Utc;

    use super::{SessionLogger, SessionSink, SessionSinkError};
    use crate::domain::session::{SessionActivity, SessionId, SessionLogEntry};

    #[derive(Default)]
    struct RecordingSink {
        entries: Mutex<Vec<SessionLogEntry>>,
    }

    #[async_trait]
    impl SessionSink for RecordingSink {
        async fn record(&self, entries: &[SessionLogEntry]) -> Result<(), SessionSinkError> {
            self.entries.lock().expect("lock").extend_from_slice(entries);
            Ok(())
        }
    }

    struct FailingSink;

    #[async_trait]
    impl SessionSink for FailingSink {
        async fn record(&self, _entries: &[SessionLogEntry]) -> Result<(), SessionSinkError> {
            Err(SessionSinkError("disk full".to_string()))
        }
    }

    #[tokio::test]
    async fn flush_writes_buffered_entries_once() {
        let sink = RecordingSink::default();
        let mut logger = SessionLogger::new(SessionId("sess-1".to_string()), "asha@example.com");
        logger.log(SessionActivity::Login, "signed in", Utc::now());
        logger.action("approved CLM-1");

        assert_eq!(logger.flush(&sink).await, 2);
        assert_eq!(logger.flush(&sink).await, 0);

        let entries = sink.entries.lock().expect("lock");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].activity, SessionActivity::Action);
        assert_eq!(entries[1].session_id.0, "sess-1");
    }

    #[tokio::test]
    async fn failing_sink_is_swallowed() {
        let mut logger = SessionLogger::ephemeral("asha@example.com");
        logger.action("viewed dashboard");

        assert_eq!(logger.flush(&FailingSink).await, 0);
        assert!(logger.pending().is_empty());
    }
}
