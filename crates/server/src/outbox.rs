//! Email delivery for queued outbox rows, plus the periodic background passes.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinHandle;

use claimdesk_core::config::EmailConfig;
use claimdesk_core::domain::outbox::{OutboxEmail, OutboxStatus};
use claimdesk_db::repositories::{OutboxRepository, RepositoryError};

use crate::executor::ActionExecutor;

const DISPATCH_BATCH: u32 = 50;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("email endpoint is not configured")]
    MissingEndpoint,
    #[error("email transport failed: {0}")]
    Transport(#[from] reqwest::Error),
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &OutboxEmail) -> Result<(), MailError>;
}

/// Logs instead of sending; used when email is disabled.
pub struct NoopMailer;

#[async_trait]
impl Mailer for NoopMailer {
    async fn send(&self, email: &OutboxEmail) -> Result<(), MailError> {
        tracing::info!(
            event_name = "email.skipped",
            email_id = %email.id.0,
            recipient = %email.recipient,
            subject = %email.subject,
            "email delivery disabled; marking as sent"
        );
        Ok(())
    }
}

#[derive(Serialize)]
struct MailPayload<'a> {
    to: &'a str,
    subject: &'a str,
    body: &'a str,
}

pub struct HttpMailer {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<SecretString>,
}

impl HttpMailer {
    pub fn new(config: &EmailConfig) -> Result<Self, MailError> {
        let endpoint = config.endpoint.clone().ok_or(MailError::MissingEndpoint)?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()?;
        Ok(Self { client, endpoint, api_key: config.api_key.clone() })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, email: &OutboxEmail) -> Result<(), MailError> {
        let mut request = self.client.post(&self.endpoint).json(&MailPayload {
            to: &email.recipient,
            subject: &email.subject,
            body: &email.body,
        });
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key.expose_secret());
        }
        request.send().await?.error_for_status()?;
        Ok(())
    }
}

pub fn mailer_from_config(config: &EmailConfig) -> Result<Arc<dyn Mailer>, MailError> {
    if config.enabled {
        Ok(Arc::new(HttpMailer::new(config)?))
    } else {
        Ok(Arc::new(NoopMailer))
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub sent: usize,
    pub retrying: usize,
    pub failed: usize,
}

/// Drains pending outbox rows. A failed send is recorded on its row and
/// retried on a later pass until `max_attempts` is reached.
pub struct OutboxDispatcher {
    outbox: Arc<dyn OutboxRepository>,
    mailer: Arc<dyn Mailer>,
    max_attempts: u32,
}

impl OutboxDispatcher {
    pub fn new(outbox: Arc<dyn OutboxRepository>, mailer: Arc<dyn Mailer>, max_attempts: u32) -> Self {
        Self { outbox, mailer, max_attempts: max_attempts.max(1) }
    }

    pub async fn dispatch_once(&self) -> Result<DispatchReport, RepositoryError> {
        let mut report = DispatchReport::default();
        for mut email in self.outbox.list_pending(DISPATCH_BATCH).await? {
            match self.mailer.send(&email).await {
                Ok(()) => email.record_success(Utc::now()),
                Err(error) => {
                    tracing::warn!(
                        event_name = "email.send_failed",
                        email_id = %email.id.0,
                        recipient = %email.recipient,
                        attempt = email.attempts + 1,
                        error = %error,
                        "email delivery failed"
                    );
                    email.record_failure(error.to_string(), self.max_attempts);
                }
            }
            match email.status {
                OutboxStatus::Sent => report.sent += 1,
                OutboxStatus::Pending => report.retrying += 1,
                OutboxStatus::Failed => report.failed += 1,
            }
            self.outbox.record_attempt(&email).await?;
        }
        Ok(report)
    }

    pub fn spawn(self, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                match self.dispatch_once().await {
                    Ok(report) if report != DispatchReport::default() => tracing::info!(
                        event_name = "email.dispatched",
                        correlation_id = "outbox",
                        sent = report.sent,
                        retrying = report.retrying,
                        failed = report.failed,
                        "outbox pass finished"
                    ),
                    Ok(_) => {}
                    Err(error) => tracing::error!(
                        event_name = "email.dispatch_error",
                        correlation_id = "outbox",
                        error = %error,
                        "outbox pass aborted"
                    ),
                }
            }
        })
    }
}

/// Periodically completes approved bookings whose slot has ended.
pub fn spawn_booking_completion(executor: ActionExecutor, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match executor.complete_elapsed_bookings(Utc::now()).await {
                Ok(0) => {}
                Ok(completed) => tracing::info!(
                    event_name = "booking.completed",
                    correlation_id = "scheduler",
                    completed,
                    "elapsed bookings completed"
                ),
                Err(error) => tracing::error!(
                    event_name = "booking.completion_error",
                    correlation_id = "scheduler",
                    error = %error,
                    "booking completion pass failed"
                ),
            }
        }
    })
}
