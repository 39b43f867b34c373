//! Action Executor: loads a record, asks the pure workflow for a transition and
//! commits the transition with its approval log entry, notifications and
//! queued emails in one version-guarded write.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use claimdesk_core::audit::{AuditContext, TracingAuditSink};
use claimdesk_core::domain::approval::{ApprovalLogEntry, ApprovalLogId};
use claimdesk_core::domain::booking::{BookingId, BookingStatus, RoomBooking};
use claimdesk_core::domain::claim::{Claim, ClaimId};
use claimdesk_core::domain::notification::{Notification, NotificationId};
use claimdesk_core::domain::role::PortalRole;
use claimdesk_core::domain::user::User;
use claimdesk_core::errors::{ApplicationError, DomainError};
use claimdesk_core::export;
use claimdesk_core::notify::{
    booking_notifications, booking_submitted_notices, claim_notifications,
    pending_approval_notices, Delivery, NotificationDraft,
};
use claimdesk_core::session::SessionSink;
use claimdesk_core::submission::{
    apply_claim_edits, draft_booking, draft_claim, BookingInput, ClaimEdits, ClaimInput,
};
use claimdesk_core::summary::ClaimSummary;
use claimdesk_core::workflow::{
    approval_queue, decide_booking_with_audit, decide_finance_with_audit, elapsed_bookings,
    payment_queue, registry,
    BookingDecision, BookingTransition, ClaimDecision, ClaimTransition, FinanceDecision,
    WorkflowEngine, WorkflowError, WorkflowTable,
};
use claimdesk_db::repositories::{
    BookingCommit, BookingRepository, ClaimCommit, ClaimRepository, DirectoryRepository,
    InMemoryStore, NotificationRepository, OutboxRepository, RepositoryError,
    SqlBookingRepository, SqlClaimRepository, SqlDirectoryRepository, SqlNotificationRepository,
    SqlOutboxRepository, SqlSessionLogRepository, SqlWorkflowConfigRepository,
    WorkflowConfigRepository,
};
use claimdesk_db::DbPool;

/// Store handles shared by request handlers and background tasks.
#[derive(Clone)]
pub struct Repositories {
    pub directory: Arc<dyn DirectoryRepository>,
    pub workflow: Arc<dyn WorkflowConfigRepository>,
    pub claims: Arc<dyn ClaimRepository>,
    pub bookings: Arc<dyn BookingRepository>,
    pub notifications: Arc<dyn NotificationRepository>,
    pub outbox: Arc<dyn OutboxRepository>,
    pub sessions: Arc<dyn SessionSink>,
}

impl Repositories {
    pub fn sql(pool: DbPool) -> Self {
        Self {
            directory: Arc::new(SqlDirectoryRepository::new(pool.clone())),
            workflow: Arc::new(SqlWorkflowConfigRepository::new(pool.clone())),
            claims: Arc::new(SqlClaimRepository::new(pool.clone())),
            bookings: Arc::new(SqlBookingRepository::new(pool.clone())),
            notifications: Arc::new(SqlNotificationRepository::new(pool.clone())),
            outbox: Arc::new(SqlOutboxRepository::new(pool.clone())),
            sessions: Arc::new(SqlSessionLogRepository::new(pool)),
        }
    }

    pub fn in_memory(store: Arc<InMemoryStore>) -> Self {
        Self {
            directory: store.clone(),
            workflow: store.clone(),
            claims: store.clone(),
            bookings: store.clone(),
            notifications: store.clone(),
            outbox: store.clone(),
            sessions: store,
        }
    }
}

/// The authenticated caller of one request.
#[derive(Clone, Debug)]
pub struct RequestContext {
    pub actor: User,
    pub correlation_id: String,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct ClaimOutcome {
    pub claim: Claim,
    pub exceeds_policy_limit: bool,
}

pub fn repository_error(error: RepositoryError) -> ApplicationError {
    let message = error.to_string();
    match error {
        RepositoryError::NotFound { entity, id } => ApplicationError::NotFound { entity, id },
        RepositoryError::VersionConflict { .. }
        | RepositoryError::Duplicate { .. }
        | RepositoryError::SlotTaken { .. } => {
            ApplicationError::Conflict(message)
        }
        RepositoryError::Database(_) | RepositoryError::Decode(_) => {
            ApplicationError::Persistence(message)
        }
    }
}

fn audit_context(ctx: &RequestContext, subject_id: &str) -> AuditContext {
    AuditContext::new(Some(subject_id.to_string()), ctx.correlation_id.clone(), ctx.actor.email.clone())
}

#[derive(Clone)]
pub struct ActionExecutor {
    repos: Repositories,
    sla_days: u32,
}

impl ActionExecutor {
    pub fn new(repos: Repositories, sla_days: u32) -> Self {
        Self { repos, sla_days }
    }

    pub fn repositories(&self) -> &Repositories {
        &self.repos
    }

    /// Resolves the caller from the directory; unknown and inactive users are refused.
    pub async fn authenticate(
        &self,
        email: &str,
        correlation_id: impl Into<String>,
    ) -> Result<RequestContext, ApplicationError> {
        let user = self.repos.directory.find_user(email).await.map_err(repository_error)?;
        match user {
            Some(actor) if actor.is_active => {
                Ok(RequestContext { actor, correlation_id: correlation_id.into() })
            }
            Some(_) => Err(ApplicationError::Unauthorized(format!("`{}` is inactive", email.trim()))),
            None => Err(ApplicationError::Unauthorized(format!("`{}` is not a portal user", email.trim()))),
        }
    }

    /// Stored stages override the built-in chains per workflow type.
    pub async fn workflow_table(&self) -> Result<WorkflowTable, ApplicationError> {
        let stages = self.repos.workflow.list_stages().await.map_err(repository_error)?;
        WorkflowTable::from_stages(&stages)
            .map_err(|error| ApplicationError::Domain(DomainError::WorkflowConfig(error)))
    }

    async fn directory(&self) -> Result<Vec<User>, ApplicationError> {
        self.repos.directory.list_users().await.map_err(repository_error)
    }

    async fn load_claim(&self, id: &ClaimId) -> Result<Claim, ApplicationError> {
        self.repos
            .claims
            .find_by_id(id)
            .await
            .map_err(repository_error)?
            .ok_or_else(|| ApplicationError::NotFound { entity: "claim", id: id.0.clone() })
    }

    async fn load_booking(&self, id: &BookingId) -> Result<RoomBooking, ApplicationError> {
        self.repos
            .bookings
            .find_by_id(id)
            .await
            .map_err(repository_error)?
            .ok_or_else(|| ApplicationError::NotFound { entity: "booking", id: id.0.clone() })
    }

    // ---------------------------------------------------------------------
    // Claims
    // ---------------------------------------------------------------------

    pub async fn create_claim(
        &self,
        ctx: &RequestContext,
        input: ClaimInput,
    ) -> Result<ClaimOutcome, ApplicationError> {
        let category = self
            .repos
            .directory
            .find_category(&input.category_id)
            .await
            .map_err(repository_error)?
            .ok_or_else(|| ApplicationError::NotFound {
                entity: "category",
                id: input.category_id.0.clone(),
            })?;
        let table = self.workflow_table().await?;
        let now = Utc::now();
        let draft = draft_claim(&input, &category, &ctx.actor, &table, self.sla_days, now)?;

        let deliveries = into_deliveries(pending_approval_notices(&draft.claim, &self.directory().await?), now);
        self.repos
            .claims
            .create(ClaimCommit {
                claim: draft.claim.clone(),
                expected_version: draft.claim.version,
                log: None,
                deliveries,
            })
            .await
            .map_err(repository_error)?;

        tracing::info!(
            event_name = "claim.created",
            correlation_id = %ctx.correlation_id,
            claim_id = %draft.claim.id.0,
            claim_number = %draft.claim.claim_number,
            status = draft.claim.status.as_str(),
            actor = %ctx.actor.email,
            exceeds_policy_limit = draft.exceeds_policy_limit,
            "claim created"
        );
        Ok(ClaimOutcome { claim: draft.claim, exceeds_policy_limit: draft.exceeds_policy_limit })
    }

    /// Owner edits to a draft or sent-back claim, without a status change.
    pub async fn edit_claim(
        &self,
        ctx: &RequestContext,
        id: &ClaimId,
        edits: ClaimEdits,
    ) -> Result<ClaimOutcome, ApplicationError> {
        let mut claim = self.load_claim(id).await?;
        let category = self.claim_category(&claim).await?;
        let expected_version = claim.version;
        let now = Utc::now();
        let exceeds_policy_limit =
            apply_claim_edits(&mut claim, &edits, &category, &ctx.actor.email, now)?;
        if edits.is_empty() {
            return Ok(ClaimOutcome { claim, exceeds_policy_limit });
        }

        claim.version += 1;
        self.repos
            .claims
            .commit(ClaimCommit {
                claim: claim.clone(),
                expected_version,
                log: None,
                deliveries: Vec::new(),
            })
            .await
            .map_err(repository_error)?;
        Ok(ClaimOutcome { claim, exceeds_policy_limit })
    }

    pub async fn submit_draft(
        &self,
        ctx: &RequestContext,
        id: &ClaimId,
    ) -> Result<Claim, ApplicationError> {
        let claim = self.load_claim(id).await?;
        let engine = WorkflowEngine::new(self.workflow_table().await?);
        let transition = engine.submit_draft(&claim, &ctx.actor.email)?;
        self.commit_claim_transition(ctx, claim, transition).await
    }

    /// Applies optional owner edits and sends the claim back to the first stage.
    /// The SLA date set at creation is kept.
    pub async fn resubmit(
        &self,
        ctx: &RequestContext,
        id: &ClaimId,
        edits: ClaimEdits,
    ) -> Result<Claim, ApplicationError> {
        let mut claim = self.load_claim(id).await?;
        let engine = WorkflowEngine::new(self.workflow_table().await?);
        let transition = engine.resubmit(&claim, &ctx.actor.email)?;
        if !edits.is_empty() {
            let category = self.claim_category(&claim).await?;
            apply_claim_edits(&mut claim, &edits, &category, &ctx.actor.email, Utc::now())?;
        }
        self.commit_claim_transition(ctx, claim, transition).await
    }

    pub async fn decide_claim(
        &self,
        ctx: &RequestContext,
        id: &ClaimId,
        decision: ClaimDecision,
    ) -> Result<Claim, ApplicationError> {
        let claim = self.load_claim(id).await?;
        let engine = WorkflowEngine::new(self.workflow_table().await?);
        let transition = engine.decide_with_audit(
            &claim,
            ctx.actor.portal_role,
            &decision,
            &TracingAuditSink,
            &audit_context(ctx, &claim.id.0),
        )?;
        self.commit_claim_transition(ctx, claim, transition).await
    }

    pub async fn decide_finance(
        &self,
        ctx: &RequestContext,
        id: &ClaimId,
        decision: FinanceDecision,
    ) -> Result<Claim, ApplicationError> {
        let claim = self.load_claim(id).await?;
        let transition = decide_finance_with_audit(
            &claim,
            ctx.actor.portal_role,
            &decision,
            &TracingAuditSink,
            &audit_context(ctx, &claim.id.0),
        )?;
        self.commit_claim_transition(ctx, claim, transition).await
    }

    async fn claim_category(
        &self,
        claim: &Claim,
    ) -> Result<claimdesk_core::domain::category::Category, ApplicationError> {
        self.repos
            .directory
            .find_category(&claim.category_id)
            .await
            .map_err(repository_error)?
            .ok_or_else(|| ApplicationError::NotFound {
                entity: "category",
                id: claim.category_id.0.clone(),
            })
    }

    async fn commit_claim_transition(
        &self,
        ctx: &RequestContext,
        mut claim: Claim,
        transition: ClaimTransition,
    ) -> Result<Claim, ApplicationError> {
        let expected_version = claim.version;
        let now = Utc::now();
        transition.apply_to(&mut claim, now);

        let log = ApprovalLogEntry {
            id: ApprovalLogId(Uuid::new_v4().to_string()),
            claim_id: claim.id.clone(),
            claim_number: claim.claim_number.clone(),
            approver_email: ctx.actor.email.clone(),
            approver_name: ctx.actor.full_name.clone(),
            approver_role: ctx.actor.portal_role,
            stage: transition.stage.clone(),
            action: transition.action,
            remarks: transition.remarks.clone(),
            previous_status: transition.from,
            new_status: transition.to,
            created_at: now,
        };
        let deliveries =
            into_deliveries(claim_notifications(&claim, &transition, &self.directory().await?), now);
        let notified = deliveries.len();

        self.repos
            .claims
            .commit(ClaimCommit { claim: claim.clone(), expected_version, log: Some(log), deliveries })
            .await
            .map_err(|error| {
                tracing::warn!(
                    event_name = "claim.commit_refused",
                    correlation_id = %ctx.correlation_id,
                    claim_id = %claim.id.0,
                    actor = %ctx.actor.email,
                    error = %error,
                    "claim transition was not committed"
                );
                repository_error(error)
            })?;

        tracing::info!(
            event_name = "claim.transition_committed",
            correlation_id = %ctx.correlation_id,
            claim_id = %claim.id.0,
            from = transition.from.as_str(),
            to = transition.to.as_str(),
            action = transition.action.as_str(),
            actor = %ctx.actor.email,
            notified,
            "claim transition committed"
        );
        Ok(claim)
    }

    // ---------------------------------------------------------------------
    // Claim queries
    // ---------------------------------------------------------------------

    /// Owners see their own claims; every other portal role sees all claims.
    pub async fn claim(&self, ctx: &RequestContext, id: &ClaimId) -> Result<Claim, ApplicationError> {
        let claim = self.load_claim(id).await?;
        if !can_view_claim(&ctx.actor, &claim) {
            return Err(WorkflowError::NotOwner { operation: "view this claim" }.into());
        }
        Ok(claim)
    }

    pub async fn claim_logs(
        &self,
        ctx: &RequestContext,
        id: &ClaimId,
    ) -> Result<Vec<ApprovalLogEntry>, ApplicationError> {
        let claim = self.claim(ctx, id).await?;
        self.repos.claims.logs_for_claim(&claim.id).await.map_err(repository_error)
    }

    /// Claims the caller can act on now: approval stages plus, for the finance
    /// desk, payable and held claims.
    pub async fn pending_claims(&self, ctx: &RequestContext) -> Result<Vec<Claim>, ApplicationError> {
        let table = self.workflow_table().await?;
        let claims = self
            .repos
            .claims
            .list_by_statuses(&registry::queue_statuses())
            .await
            .map_err(repository_error)?;
        let role = ctx.actor.portal_role;

        let mut pending: Vec<Claim> = table.pending_queue(&claims, role).into_iter().cloned().collect();
        if role.is_finance_desk() {
            for claim in payment_queue(&claims) {
                if !pending.iter().any(|queued| queued.id == claim.id) {
                    pending.push(claim.clone());
                }
            }
        }
        pending.sort_by(|a, b| a.sla_date.cmp(&b.sla_date).then(a.created_at.cmp(&b.created_at)));
        Ok(pending)
    }

    pub async fn my_claims(&self, ctx: &RequestContext) -> Result<Vec<Claim>, ApplicationError> {
        self.repos.claims.list_by_employee(&ctx.actor.email).await.map_err(repository_error)
    }

    async fn visible_claims(&self, ctx: &RequestContext) -> Result<Vec<Claim>, ApplicationError> {
        if ctx.actor.portal_role == PortalRole::Employee {
            self.my_claims(ctx).await
        } else {
            self.repos.claims.list_all().await.map_err(repository_error)
        }
    }

    pub async fn summary(
        &self,
        ctx: &RequestContext,
        today: chrono::NaiveDate,
    ) -> Result<ClaimSummary, ApplicationError> {
        let claims = self.visible_claims(ctx).await?;
        Ok(ClaimSummary::from_claims(&claims, today))
    }

    pub async fn export_claims(&self, ctx: &RequestContext) -> Result<String, ApplicationError> {
        let claims = self.visible_claims(ctx).await?;
        export::claims_csv(&claims).map_err(|error| ApplicationError::Integration(error.to_string()))
    }

    // ---------------------------------------------------------------------
    // Room bookings
    // ---------------------------------------------------------------------

    pub async fn create_booking(
        &self,
        ctx: &RequestContext,
        input: BookingInput,
    ) -> Result<RoomBooking, ApplicationError> {
        let room = self
            .repos
            .directory
            .find_room(&input.room_id)
            .await
            .map_err(repository_error)?
            .ok_or_else(|| ApplicationError::NotFound { entity: "room", id: input.room_id.0.clone() })?;
        let existing = self
            .repos
            .bookings
            .list_for_room_date(&room.id, input.booking_date)
            .await
            .map_err(repository_error)?;
        let now = Utc::now();
        let booking = draft_booking(&input, &room, &ctx.actor, &existing, now)?;

        let deliveries = into_deliveries(booking_submitted_notices(&booking, &self.directory().await?), now);
        self.repos
            .bookings
            .create(BookingCommit {
                booking: booking.clone(),
                expected_version: booking.version,
                deliveries,
            })
            .await
            .map_err(repository_error)?;

        tracing::info!(
            event_name = "booking.created",
            correlation_id = %ctx.correlation_id,
            booking_id = %booking.id.0,
            booking_number = %booking.booking_number,
            room_id = %booking.room_id.0,
            actor = %ctx.actor.email,
            "room booking requested"
        );
        Ok(booking)
    }

    pub async fn decide_booking(
        &self,
        ctx: &RequestContext,
        id: &BookingId,
        decision: BookingDecision,
    ) -> Result<RoomBooking, ApplicationError> {
        let booking = self.load_booking(id).await?;
        let existing = self
            .repos
            .bookings
            .list_for_room_date(&booking.room_id, booking.booking_date)
            .await
            .map_err(repository_error)?;
        let transition = decide_booking_with_audit(
            &booking,
            &ctx.actor,
            &decision,
            &existing,
            &TracingAuditSink,
            &audit_context(ctx, &booking.id.0),
        )?;
        let directory = self.directory().await?;
        self.commit_booking_transition(&ctx.correlation_id, &ctx.actor.email, booking, transition, &directory)
            .await
    }

    pub async fn pending_bookings(
        &self,
        ctx: &RequestContext,
    ) -> Result<Vec<RoomBooking>, ApplicationError> {
        if !ctx.actor.portal_role.is_admin_desk() {
            return Err(WorkflowError::BookingNotEligible { role: ctx.actor.portal_role }.into());
        }
        let bookings = self.repos.bookings.list_all().await.map_err(repository_error)?;
        Ok(approval_queue(&bookings).into_iter().cloned().collect())
    }

    pub async fn export_bookings(&self, ctx: &RequestContext) -> Result<String, ApplicationError> {
        let mut bookings = self.repos.bookings.list_all().await.map_err(repository_error)?;
        if !ctx.actor.portal_role.is_admin_desk() {
            bookings.retain(|booking| booking.is_owned_by(&ctx.actor.email));
        }
        export::bookings_csv(&bookings).map_err(|error| ApplicationError::Integration(error.to_string()))
    }

    /// Moves approved bookings whose end has passed to `completed`. A booking
    /// that changed underneath is skipped and picked up on the next pass.
    pub async fn complete_elapsed_bookings(&self, now: DateTime<Utc>) -> Result<usize, ApplicationError> {
        let approved = self
            .repos
            .bookings
            .list_by_status(BookingStatus::Approved)
            .await
            .map_err(repository_error)?;
        let mut completed = 0;
        for transition in elapsed_bookings(&approved, now.naive_utc()) {
            let Some(booking) = approved.iter().find(|booking| booking.id == transition.booking_id) else {
                continue;
            };
            match self
                .commit_booking_transition("scheduler", "system", booking.clone(), transition, &[])
                .await
            {
                Ok(_) => completed += 1,
                Err(ApplicationError::Conflict(message)) => {
                    tracing::warn!(
                        event_name = "booking.completion_skipped",
                        correlation_id = "scheduler",
                        booking_id = %booking.id.0,
                        error = %message,
                        "booking changed before it could be completed"
                    );
                }
                Err(error) => return Err(error),
            }
        }
        Ok(completed)
    }

    async fn commit_booking_transition(
        &self,
        correlation_id: &str,
        actor: &str,
        mut booking: RoomBooking,
        transition: BookingTransition,
        directory: &[User],
    ) -> Result<RoomBooking, ApplicationError> {
        let expected_version = booking.version;
        let now = Utc::now();
        transition.apply_to(&mut booking, now);
        let deliveries = into_deliveries(booking_notifications(&booking, &transition, directory), now);

        self.repos
            .bookings
            .commit(BookingCommit { booking: booking.clone(), expected_version, deliveries })
            .await
            .map_err(repository_error)?;

        tracing::info!(
            event_name = "booking.transition_committed",
            correlation_id = %correlation_id,
            booking_id = %booking.id.0,
            from = transition.from.as_str(),
            to = transition.to.as_str(),
            housekeeping = transition.housekeeping_fanout,
            actor = %actor,
            "booking transition committed"
        );
        Ok(booking)
    }

    // ---------------------------------------------------------------------
    // Notifications
    // ---------------------------------------------------------------------

    pub async fn notifications(
        &self,
        ctx: &RequestContext,
    ) -> Result<Vec<Notification>, ApplicationError> {
        self.repos.notifications.list_for_recipient(&ctx.actor.email).await.map_err(repository_error)
    }

    pub async fn unread_count(&self, ctx: &RequestContext) -> Result<u64, ApplicationError> {
        self.repos.notifications.unread_count(&ctx.actor.email).await.map_err(repository_error)
    }

    pub async fn mark_read(
        &self,
        ctx: &RequestContext,
        id: &NotificationId,
    ) -> Result<(), ApplicationError> {
        let marked = self
            .repos
            .notifications
            .mark_read(id, &ctx.actor.email)
            .await
            .map_err(repository_error)?;
        if marked {
            Ok(())
        } else {
            Err(ApplicationError::NotFound { entity: "notification", id: id.0.clone() })
        }
    }

    pub async fn mark_all_read(&self, ctx: &RequestContext) -> Result<u64, ApplicationError> {
        self.repos.notifications.mark_all_read(&ctx.actor.email).await.map_err(repository_error)
    }
}

fn can_view_claim(actor: &User, claim: &Claim) -> bool {
    claim.is_owned_by(&actor.email) || actor.portal_role != PortalRole::Employee
}

fn into_deliveries(drafts: Vec<NotificationDraft>, now: DateTime<Utc>) -> Vec<Delivery> {
    drafts.into_iter().map(|draft| draft.into_delivery(now)).collect()
}
