use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

use claimdesk_core::domain::approval::ApprovalLogEntry;
use claimdesk_core::domain::booking::{BookingId, BookingStatus, ConferenceRoom, RoomBooking, RoomId};
use claimdesk_core::domain::category::{Category, CategoryId};
use claimdesk_core::domain::claim::{Claim, ClaimId, ClaimStatus};
use claimdesk_core::domain::notification::{Notification, NotificationId};
use claimdesk_core::domain::outbox::OutboxEmail;
use claimdesk_core::domain::session::SessionLogEntry;
use claimdesk_core::domain::user::User;
use claimdesk_core::domain::workflow_config::WorkflowStageConfig;
use claimdesk_core::notify::Delivery;

pub mod booking;
pub mod claim;
mod codec;
pub mod directory;
pub mod memory;
pub mod notification;
pub mod session_log;
pub mod workflow_config;

pub use booking::SqlBookingRepository;
pub use claim::SqlClaimRepository;
pub use directory::SqlDirectoryRepository;
pub use memory::InMemoryStore;
pub use notification::{SqlNotificationRepository, SqlOutboxRepository};
pub use session_log::SqlSessionLogRepository;
pub use workflow_config::SqlWorkflowConfigRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("{entity} `{id}` already exists")]
    Duplicate { entity: &'static str, id: String },
    #[error("{entity} `{id}` was not found")]
    NotFound { entity: &'static str, id: String },
    #[error("{entity} `{id}` was modified concurrently (expected version {expected})")]
    VersionConflict { entity: &'static str, id: String, expected: u32 },
    #[error("room `{room_id}` is already held by {conflicting} for an overlapping slot")]
    SlotTaken { room_id: String, conflicting: String },
}

/// A claim write: the new claim state plus everything recorded with it.
/// `expected_version` is the version the caller read; the write is refused if
/// the stored version moved on.
#[derive(Clone, Debug, PartialEq)]
pub struct ClaimCommit {
    pub claim: Claim,
    pub expected_version: u32,
    pub log: Option<ApprovalLogEntry>,
    pub deliveries: Vec<Delivery>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BookingCommit {
    pub booking: RoomBooking,
    pub expected_version: u32,
    pub deliveries: Vec<Delivery>,
}

/// Users, expense categories and conference rooms.
#[async_trait]
pub trait DirectoryRepository: Send + Sync {
    async fn find_user(&self, email: &str) -> Result<Option<User>, RepositoryError>;
    async fn list_users(&self) -> Result<Vec<User>, RepositoryError>;
    async fn save_user(&self, user: User) -> Result<(), RepositoryError>;

    async fn find_category(&self, id: &CategoryId) -> Result<Option<Category>, RepositoryError>;
    async fn list_categories(&self) -> Result<Vec<Category>, RepositoryError>;
    async fn save_category(&self, category: Category) -> Result<(), RepositoryError>;

    async fn find_room(&self, id: &RoomId) -> Result<Option<ConferenceRoom>, RepositoryError>;
    async fn list_rooms(&self) -> Result<Vec<ConferenceRoom>, RepositoryError>;
    async fn save_room(&self, room: ConferenceRoom) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait WorkflowConfigRepository: Send + Sync {
    async fn list_stages(&self) -> Result<Vec<WorkflowStageConfig>, RepositoryError>;
    async fn save_stage(&self, stage: WorkflowStageConfig) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait ClaimRepository: Send + Sync {
    async fn find_by_id(&self, id: &ClaimId) -> Result<Option<Claim>, RepositoryError>;
    async fn list_all(&self) -> Result<Vec<Claim>, RepositoryError>;
    async fn list_by_employee(&self, email: &str) -> Result<Vec<Claim>, RepositoryError>;
    async fn list_by_statuses(&self, statuses: &[ClaimStatus])
        -> Result<Vec<Claim>, RepositoryError>;
    async fn logs_for_claim(&self, id: &ClaimId) -> Result<Vec<ApprovalLogEntry>, RepositoryError>;

    /// Inserts a new claim with its log entry and deliveries.
    async fn create(&self, commit: ClaimCommit) -> Result<(), RepositoryError>;

    /// Version-guarded update, log append and delivery queueing in one transaction.
    async fn commit(&self, commit: ClaimCommit) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait BookingRepository: Send + Sync {
    async fn find_by_id(&self, id: &BookingId) -> Result<Option<RoomBooking>, RepositoryError>;
    async fn list_all(&self) -> Result<Vec<RoomBooking>, RepositoryError>;
    async fn list_by_status(&self, status: BookingStatus)
        -> Result<Vec<RoomBooking>, RepositoryError>;
    async fn list_for_room_date(
        &self,
        room_id: &RoomId,
        date: NaiveDate,
    ) -> Result<Vec<RoomBooking>, RepositoryError>;

    /// Inserts a new booking unless a pending or approved booking for the same
    /// room and date overlaps it, in which case `SlotTaken` is returned.
    async fn create(&self, commit: BookingCommit) -> Result<(), RepositoryError>;
    async fn commit(&self, commit: BookingCommit) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait NotificationRepository: Send + Sync {
    async fn list_for_recipient(&self, email: &str) -> Result<Vec<Notification>, RepositoryError>;
    async fn unread_count(&self, email: &str) -> Result<u64, RepositoryError>;
    /// Marks one of the recipient's notifications read; `false` if none matched.
    async fn mark_read(&self, id: &NotificationId, email: &str) -> Result<bool, RepositoryError>;
    async fn mark_all_read(&self, email: &str) -> Result<u64, RepositoryError>;
}

#[async_trait]
pub trait OutboxRepository: Send + Sync {
    async fn list_pending(&self, limit: u32) -> Result<Vec<OutboxEmail>, RepositoryError>;
    /// Persists a delivery attempt; a sent email also flags its notification.
    async fn record_attempt(&self, email: &OutboxEmail) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait SessionLogRepository: Send + Sync {
    async fn append(&self, entries: &[SessionLogEntry]) -> Result<(), RepositoryError>;
    async fn list_for_user(&self, email: &str) -> Result<Vec<SessionLogEntry>, RepositoryError>;
}
