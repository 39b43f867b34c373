use std::collections::HashMap;

use chrono::NaiveDate;
use tokio::sync::RwLock;

use claimdesk_core::domain::approval::ApprovalLogEntry;
use claimdesk_core::domain::booking::{BookingId, BookingStatus, ConferenceRoom, RoomBooking, RoomId};
use claimdesk_core::domain::category::{Category, CategoryId};
use claimdesk_core::domain::claim::{Claim, ClaimId, ClaimStatus};
use claimdesk_core::domain::notification::{Notification, NotificationId};
use claimdesk_core::domain::outbox::{OutboxEmail, OutboxStatus};
use claimdesk_core::domain::session::SessionLogEntry;
use claimdesk_core::domain::user::User;
use claimdesk_core::domain::workflow_config::WorkflowStageConfig;
use claimdesk_core::notify::Delivery;
use claimdesk_core::session::{SessionSink, SessionSinkError};
use claimdesk_core::workflow::overlaps;

use super::{
    BookingCommit, BookingRepository, ClaimCommit, ClaimRepository, DirectoryRepository,
    NotificationRepository, OutboxRepository, RepositoryError, SessionLogRepository,
    WorkflowConfigRepository,
};

#[derive(Default)]
struct State {
    users: HashMap<String, User>,
    categories: HashMap<String, Category>,
    rooms: HashMap<String, ConferenceRoom>,
    stages: HashMap<String, WorkflowStageConfig>,
    claims: HashMap<String, Claim>,
    logs: Vec<ApprovalLogEntry>,
    bookings: HashMap<String, RoomBooking>,
    notifications: Vec<Notification>,
    outbox: Vec<OutboxEmail>,
    sessions: Vec<SessionLogEntry>,
}

impl State {
    fn push_deliveries(&mut self, deliveries: &[Delivery]) {
        for delivery in deliveries {
            self.notifications.push(delivery.notification.clone());
            self.outbox.push(delivery.email.clone());
        }
    }
}

/// Every repository behind one lock, so a commit is as atomic as the SQL one.
#[derive(Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn email_key(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

fn newest_first<T>(items: &mut [T], key: impl Fn(&T) -> chrono::DateTime<chrono::Utc>) {
    items.sort_by_key(|item| std::cmp::Reverse(key(item)));
}

#[async_trait::async_trait]
impl DirectoryRepository for InMemoryStore {
    async fn find_user(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.users.get(&email_key(email)).cloned())
    }

    async fn list_users(&self) -> Result<Vec<User>, RepositoryError> {
        let state = self.state.read().await;
        let mut users: Vec<User> = state.users.values().cloned().collect();
        users.sort_by(|a, b| a.email.cmp(&b.email));
        Ok(users)
    }

    async fn save_user(&self, user: User) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        state.users.insert(email_key(&user.email), user);
        Ok(())
    }

    async fn find_category(&self, id: &CategoryId) -> Result<Option<Category>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.categories.get(&id.0).cloned())
    }

    async fn list_categories(&self) -> Result<Vec<Category>, RepositoryError> {
        let state = self.state.read().await;
        let mut categories: Vec<Category> = state.categories.values().cloned().collect();
        categories.sort_by(|a, b| {
            (a.category_name.as_str(), a.title.as_str())
                .cmp(&(b.category_name.as_str(), b.title.as_str()))
        });
        Ok(categories)
    }

    async fn save_category(&self, category: Category) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        state.categories.insert(category.id.0.clone(), category);
        Ok(())
    }

    async fn find_room(&self, id: &RoomId) -> Result<Option<ConferenceRoom>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.rooms.get(&id.0).cloned())
    }

    async fn list_rooms(&self) -> Result<Vec<ConferenceRoom>, RepositoryError> {
        let state = self.state.read().await;
        let mut rooms: Vec<ConferenceRoom> = state.rooms.values().cloned().collect();
        rooms.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rooms)
    }

    async fn save_room(&self, room: ConferenceRoom) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        state.rooms.insert(room.id.0.clone(), room);
        Ok(())
    }
}

#[async_trait::async_trait]
impl WorkflowConfigRepository for InMemoryStore {
    async fn list_stages(&self) -> Result<Vec<WorkflowStageConfig>, RepositoryError> {
        let state = self.state.read().await;
        let mut stages: Vec<WorkflowStageConfig> = state.stages.values().cloned().collect();
        stages.sort_by_key(|stage| (stage.workflow_type.as_str(), stage.stage_order));
        Ok(stages)
    }

    async fn save_stage(&self, stage: WorkflowStageConfig) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        state.stages.insert(stage.id.0.clone(), stage);
        Ok(())
    }
}

#[async_trait::async_trait]
impl ClaimRepository for InMemoryStore {
    async fn find_by_id(&self, id: &ClaimId) -> Result<Option<Claim>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.claims.get(&id.0).cloned())
    }

    async fn list_all(&self) -> Result<Vec<Claim>, RepositoryError> {
        let state = self.state.read().await;
        let mut claims: Vec<Claim> = state.claims.values().cloned().collect();
        newest_first(&mut claims, |claim| claim.created_at);
        Ok(claims)
    }

    async fn list_by_employee(&self, email: &str) -> Result<Vec<Claim>, RepositoryError> {
        let state = self.state.read().await;
        let mut claims: Vec<Claim> =
            state.claims.values().filter(|claim| claim.is_owned_by(email)).cloned().collect();
        newest_first(&mut claims, |claim| claim.created_at);
        Ok(claims)
    }

    async fn list_by_statuses(
        &self,
        statuses: &[ClaimStatus],
    ) -> Result<Vec<Claim>, RepositoryError> {
        let state = self.state.read().await;
        let mut claims: Vec<Claim> = state
            .claims
            .values()
            .filter(|claim| statuses.contains(&claim.status))
            .cloned()
            .collect();
        claims.sort_by_key(|claim| (claim.sla_date, claim.created_at));
        Ok(claims)
    }

    async fn logs_for_claim(&self, id: &ClaimId) -> Result<Vec<ApprovalLogEntry>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.logs.iter().filter(|entry| entry.claim_id == *id).cloned().collect())
    }

    async fn create(&self, commit: ClaimCommit) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        let id = commit.claim.id.0.clone();
        if state.claims.contains_key(&id)
            || state.claims.values().any(|claim| claim.claim_number == commit.claim.claim_number)
        {
            return Err(RepositoryError::Duplicate { entity: "claim", id });
        }
        state.claims.insert(id, commit.claim);
        state.logs.extend(commit.log);
        state.push_deliveries(&commit.deliveries);
        Ok(())
    }

    async fn commit(&self, commit: ClaimCommit) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        let id = commit.claim.id.0.clone();
        let stored_version = match state.claims.get(&id) {
            Some(stored) => stored.version,
            None => return Err(RepositoryError::NotFound { entity: "claim", id }),
        };
        if stored_version != commit.expected_version {
            return Err(RepositoryError::VersionConflict {
                entity: "claim",
                id,
                expected: commit.expected_version,
            });
        }
        state.claims.insert(id, commit.claim);
        state.logs.extend(commit.log);
        state.push_deliveries(&commit.deliveries);
        Ok(())
    }
}

#[async_trait::async_trait]
impl BookingRepository for InMemoryStore {
    async fn find_by_id(&self, id: &BookingId) -> Result<Option<RoomBooking>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.bookings.get(&id.0).cloned())
    }

    async fn list_all(&self) -> Result<Vec<RoomBooking>, RepositoryError> {
        let state = self.state.read().await;
        let mut bookings: Vec<RoomBooking> = state.bookings.values().cloned().collect();
        bookings.sort_by(|a, b| {
            b.booking_date.cmp(&a.booking_date).then(a.start_time.cmp(&b.start_time))
        });
        Ok(bookings)
    }

    async fn list_by_status(
        &self,
        status: BookingStatus,
    ) -> Result<Vec<RoomBooking>, RepositoryError> {
        let state = self.state.read().await;
        let mut bookings: Vec<RoomBooking> =
            state.bookings.values().filter(|booking| booking.status == status).cloned().collect();
        bookings.sort_by_key(|booking| (booking.booking_date, booking.start_time));
        Ok(bookings)
    }

    async fn list_for_room_date(
        &self,
        room_id: &RoomId,
        date: NaiveDate,
    ) -> Result<Vec<RoomBooking>, RepositoryError> {
        let state = self.state.read().await;
        let mut bookings: Vec<RoomBooking> = state
            .bookings
            .values()
            .filter(|booking| booking.room_id == *room_id && booking.booking_date == date)
            .cloned()
            .collect();
        bookings.sort_by_key(|booking| booking.start_time);
        Ok(bookings)
    }

    async fn create(&self, commit: BookingCommit) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        let id = commit.booking.id.0.clone();
        if state.bookings.contains_key(&id)
            || state
                .bookings
                .values()
                .any(|booking| booking.booking_number == commit.booking.booking_number)
        {
            return Err(RepositoryError::Duplicate { entity: "booking", id });
        }
        let booking = &commit.booking;
        let mut holders: Vec<&str> = state
            .bookings
            .values()
            .filter(|other| other.room_id == booking.room_id && other.booking_date == booking.booking_date)
            .filter(|other| other.status.occupies_slot())
            .filter(|other| overlaps(booking.start_time, booking.end_time, other.start_time, other.end_time))
            .map(|other| other.booking_number.as_str())
            .collect();
        if !holders.is_empty() {
            holders.sort_unstable();
            return Err(RepositoryError::SlotTaken {
                room_id: booking.room_id.0.clone(),
                conflicting: holders.join(", "),
            });
        }
        state.bookings.insert(id, commit.booking);
        state.push_deliveries(&commit.deliveries);
        Ok(())
    }

    async fn commit(&self, commit: BookingCommit) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        let id = commit.booking.id.0.clone();
        let stored_version = match state.bookings.get(&id) {
            Some(stored) => stored.version,
            None => return Err(RepositoryError::NotFound { entity: "booking", id }),
        };
        if stored_version != commit.expected_version {
            return Err(RepositoryError::VersionConflict {
                entity: "booking",
                id,
                expected: commit.expected_version,
            });
        }
        state.bookings.insert(id, commit.booking);
        state.push_deliveries(&commit.deliveries);
        Ok(())
    }
}

#[async_trait::async_trait]
impl NotificationRepository for InMemoryStore {
    async fn list_for_recipient(&self, email: &str) -> Result<Vec<Notification>, RepositoryError> {
        let state = self.state.read().await;
        let mut notifications: Vec<Notification> = state
            .notifications
            .iter()
            .filter(|notification| notification.recipient_email.eq_ignore_ascii_case(email.trim()))
            .cloned()
            .collect();
        newest_first(&mut notifications, |notification| notification.created_at);
        Ok(notifications)
    }

    async fn unread_count(&self, email: &str) -> Result<u64, RepositoryError> {
        let state = self.state.read().await;
        let count = state
            .notifications
            .iter()
            .filter(|notification| {
                !notification.is_read && notification.recipient_email.eq_ignore_ascii_case(email.trim())
            })
            .count();
        Ok(count as u64)
    }

    async fn mark_read(&self, id: &NotificationId, email: &str) -> Result<bool, RepositoryError> {
        let mut state = self.state.write().await;
        let found = state.notifications.iter_mut().find(|notification| {
            notification.id == *id && notification.recipient_email.eq_ignore_ascii_case(email.trim())
        });
        Ok(match found {
            Some(notification) => {
                notification.is_read = true;
                true
            }
            None => false,
        })
    }

    async fn mark_all_read(&self, email: &str) -> Result<u64, RepositoryError> {
        let mut state = self.state.write().await;
        let mut marked = 0;
        for notification in state.notifications.iter_mut() {
            if !notification.is_read && notification.recipient_email.eq_ignore_ascii_case(email.trim())
            {
                notification.is_read = true;
                marked += 1;
            }
        }
        Ok(marked)
    }
}

#[async_trait::async_trait]
impl OutboxRepository for InMemoryStore {
    async fn list_pending(&self, limit: u32) -> Result<Vec<OutboxEmail>, RepositoryError> {
        let state = self.state.read().await;
        let mut pending: Vec<OutboxEmail> = state
            .outbox
            .iter()
            .filter(|email| email.status == OutboxStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by_key(|email| email.created_at);
        pending.truncate(limit as usize);
        Ok(pending)
    }

    async fn record_attempt(&self, email: &OutboxEmail) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        let Some(stored) = state.outbox.iter_mut().find(|stored| stored.id == email.id) else {
            return Err(RepositoryError::NotFound { entity: "email", id: email.id.0.clone() });
        };
        *stored = email.clone();

        if email.status == OutboxStatus::Sent {
            if let Some(notification_id) = &email.notification_id {
                if let Some(notification) = state
                    .notifications
                    .iter_mut()
                    .find(|notification| notification.id == *notification_id)
                {
                    notification.email_sent = true;
                }
            }
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl SessionLogRepository for InMemoryStore {
    async fn append(&self, entries: &[SessionLogEntry]) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        state.sessions.extend_from_slice(entries);
        Ok(())
    }

    async fn list_for_user(&self, email: &str) -> Result<Vec<SessionLogEntry>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state
            .sessions
            .iter()
            .filter(|entry| entry.user_email.eq_ignore_ascii_case(email.trim()))
            .cloned()
            .collect())
    }
}

#[async_trait::async_trait]
impl SessionSink for InMemoryStore {
    async fn record(&self, entries: &[SessionLogEntry]) -> Result<(), SessionSinkError> {
        self.append(entries).await.map_err(|error| SessionSinkError(error.to_string()))
    }
}
