//! JSON API under `/api/v1`.
//!
//! Claims:
//! - `POST /claims`: create (draft or submitted)
//! - `GET  /claims/pending|mine|summary`: queues and dashboard figures
//! - `GET  /claims/{id}`, `PATCH /claims/{id}`: view, owner edits
//! - `GET  /claims/{id}/logs`: approval history
//! - `POST /claims/{id}/submit|resubmit`: owner submission
//! - `POST /claims/{id}/approve|reject|send-back`: approval stages
//! - `POST /claims/{id}/pay|hold|release`: finance desk
//!
//! Bookings:
//! - `POST /bookings`, `GET /bookings/pending`
//! - `POST /bookings/{id}/approve|reject|send-back|cancel`
//!
//! Sessions:
//! - `POST /session/login`, `POST /session/logout`: record sign-in and sign-out
//!
//! Notifications and exports:
//! - `GET  /notifications`, `GET /notifications/unread-count`
//! - `POST /notifications/{id}/read`, `POST /notifications/read-all`
//! - `GET  /export/claims.csv`, `GET /export/bookings.csv`
//!
//! The caller is identified by the `x-user-email` header set by the upstream
//! authentication proxy.

use axum::{
    body::Bytes,
    extract::{FromRequestParts, Path, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use claimdesk_core::domain::approval::ApprovalLogEntry;
use claimdesk_core::domain::booking::{BookingId, RoomBooking};
use claimdesk_core::domain::claim::{Claim, ClaimId};
use claimdesk_core::domain::notification::{Notification, NotificationId};
use claimdesk_core::domain::session::{SessionActivity, SessionId};
use claimdesk_core::domain::user::User;
use claimdesk_core::errors::{ApplicationError, InterfaceError};
use claimdesk_core::session::SessionLogger;
use claimdesk_core::submission::{BookingInput, ClaimEdits, ClaimInput};
use claimdesk_core::summary::ClaimSummary;
use claimdesk_core::workflow::{BookingDecision, ClaimDecision, FinanceDecision};

use crate::executor::{ActionExecutor, ClaimOutcome, RequestContext};

pub const USER_HEADER: &str = "x-user-email";
pub const CORRELATION_HEADER: &str = "x-correlation-id";
pub const SESSION_HEADER: &str = "x-session-id";

#[derive(Clone)]
pub struct ApiState {
    executor: ActionExecutor,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct ApiError(pub InterfaceError);

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub detail: String,
    pub correlation_id: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorBody {
            error: self.0.user_message().to_string(),
            detail: self.0.message().to_string(),
            correlation_id: self.0.correlation_id().to_string(),
        };
        (status, [(CORRELATION_HEADER, body.correlation_id.clone())], Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

// ---------------------------------------------------------------------------
// Caller
// ---------------------------------------------------------------------------

/// The resolved portal user plus the session activity buffer for this request.
pub struct Caller {
    ctx: RequestContext,
    session: SessionLogger,
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

impl FromRequestParts<ApiState> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &ApiState) -> Result<Self, Self::Rejection> {
        let correlation_id = header_value(&parts.headers, CORRELATION_HEADER)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let Some(email) = header_value(&parts.headers, USER_HEADER) else {
            return Err(ApiError(
                ApplicationError::Unauthorized(format!("missing `{USER_HEADER}` header"))
                    .into_interface(correlation_id),
            ));
        };

        let ctx = state
            .executor
            .authenticate(&email, correlation_id.clone())
            .await
            .map_err(|error| {
                tracing::warn!(
                    event_name = "api.unauthenticated",
                    correlation_id = %correlation_id,
                    user_email = %email,
                    error = %error,
                    "request refused"
                );
                ApiError(error.into_interface(correlation_id.clone()))
            })?;

        let session = match header_value(&parts.headers, SESSION_HEADER) {
            Some(session_id) => SessionLogger::new(SessionId(session_id), ctx.actor.email.clone()),
            None => SessionLogger::ephemeral(ctx.actor.email.clone()),
        };
        Ok(Self { ctx, session })
    }
}

impl Caller {
    fn fail(&self, error: ApplicationError) -> ApiError {
        ApiError(error.into_interface(self.ctx.correlation_id.clone()))
    }

    fn bad_request(&self, message: String) -> ApiError {
        ApiError(InterfaceError::BadRequest {
            message,
            correlation_id: self.ctx.correlation_id.clone(),
        })
    }

    /// Records the activity and flushes it; failures only reach the log.
    async fn record(mut self, state: &ApiState, activity: SessionActivity, detail: String) {
        self.session.log(activity, detail, Utc::now());
        self.session.flush(state.executor.repositories().sessions.as_ref()).await;
    }

    /// An empty body is read as `T::default()`.
    fn optional_body<T>(&self, body: &Bytes) -> ApiResult<T>
    where
        T: DeserializeOwned + Default,
    {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(T::default());
        }
        serde_json::from_slice(body)
            .map_err(|error| self.bad_request(format!("request body is not valid JSON: {error}")))
    }
}

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct RemarksRequest {
    #[serde(default)]
    pub remarks: Option<String>,
}

impl RemarksRequest {
    fn required(self) -> String {
        self.remarks.unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
pub struct PaymentRequest {
    #[serde(default)]
    pub payment_date: Option<NaiveDate>,
    pub reference: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UnreadCount {
    pub unread: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MarkedCount {
    pub marked: u64,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn router(executor: ActionExecutor) -> Router {
    let routes = Router::new()
        .route("/claims", post(create_claim))
        .route("/claims/pending", get(pending_claims))
        .route("/claims/mine", get(my_claims))
        .route("/claims/summary", get(claim_summary))
        .route("/claims/{id}", get(get_claim).patch(edit_claim))
        .route("/claims/{id}/logs", get(claim_logs))
        .route("/claims/{id}/submit", post(submit_claim))
        .route("/claims/{id}/resubmit", post(resubmit_claim))
        .route("/claims/{id}/approve", post(approve_claim))
        .route("/claims/{id}/reject", post(reject_claim))
        .route("/claims/{id}/send-back", post(send_back_claim))
        .route("/claims/{id}/pay", post(pay_claim))
        .route("/claims/{id}/hold", post(hold_claim))
        .route("/claims/{id}/release", post(release_claim))
        .route("/bookings", post(create_booking))
        .route("/bookings/pending", get(pending_bookings))
        .route("/bookings/{id}/approve", post(approve_booking))
        .route("/bookings/{id}/reject", post(reject_booking))
        .route("/bookings/{id}/send-back", post(send_back_booking))
        .route("/bookings/{id}/cancel", post(cancel_booking))
        .route("/session/login", post(sign_in))
        .route("/session/logout", post(sign_out))
        .route("/notifications", get(list_notifications))
        .route("/notifications/unread-count", get(unread_count))
        .route("/notifications/read-all", post(mark_all_read))
        .route("/notifications/{id}/read", post(mark_read))
        .route("/export/claims.csv", get(export_claims))
        .route("/export/bookings.csv", get(export_bookings));

    Router::new().nest("/api/v1", routes).with_state(ApiState { executor })
}

// ---------------------------------------------------------------------------
// Claim handlers
// ---------------------------------------------------------------------------

async fn create_claim(
    State(state): State<ApiState>,
    caller: Caller,
    Json(input): Json<ClaimInput>,
) -> ApiResult<(StatusCode, Json<ClaimOutcome>)> {
    let outcome =
        state.executor.create_claim(&caller.ctx, input).await.map_err(|error| caller.fail(error))?;
    let detail = format!("created claim {} ({})", outcome.claim.claim_number, outcome.claim.status);
    caller.record(&state, SessionActivity::Action, detail).await;
    Ok((StatusCode::CREATED, Json(outcome)))
}

async fn edit_claim(
    State(state): State<ApiState>,
    caller: Caller,
    Path(id): Path<String>,
    Json(edits): Json<ClaimEdits>,
) -> ApiResult<Json<ClaimOutcome>> {
    let outcome = state
        .executor
        .edit_claim(&caller.ctx, &ClaimId(id), edits)
        .await
        .map_err(|error| caller.fail(error))?;
    let detail = format!("edited claim {}", outcome.claim.claim_number);
    caller.record(&state, SessionActivity::Action, detail).await;
    Ok(Json(outcome))
}

async fn get_claim(
    State(state): State<ApiState>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<Json<Claim>> {
    let claim =
        state.executor.claim(&caller.ctx, &ClaimId(id)).await.map_err(|error| caller.fail(error))?;
    Ok(Json(claim))
}

async fn claim_logs(
    State(state): State<ApiState>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<ApprovalLogEntry>>> {
    let logs = state
        .executor
        .claim_logs(&caller.ctx, &ClaimId(id))
        .await
        .map_err(|error| caller.fail(error))?;
    Ok(Json(logs))
}

async fn pending_claims(State(state): State<ApiState>, caller: Caller) -> ApiResult<Json<Vec<Claim>>> {
    let claims = state.executor.pending_claims(&caller.ctx).await.map_err(|error| caller.fail(error))?;
    let detail = format!("viewed {} pending claims", claims.len());
    caller.record(&state, SessionActivity::PageView, detail).await;
    Ok(Json(claims))
}

async fn my_claims(State(state): State<ApiState>, caller: Caller) -> ApiResult<Json<Vec<Claim>>> {
    let claims = state.executor.my_claims(&caller.ctx).await.map_err(|error| caller.fail(error))?;
    Ok(Json(claims))
}

async fn claim_summary(State(state): State<ApiState>, caller: Caller) -> ApiResult<Json<ClaimSummary>> {
    let summary = state
        .executor
        .summary(&caller.ctx, Utc::now().date_naive())
        .await
        .map_err(|error| caller.fail(error))?;
    caller.record(&state, SessionActivity::PageView, "viewed dashboard".to_string()).await;
    Ok(Json(summary))
}

async fn submit_claim(
    State(state): State<ApiState>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<Json<Claim>> {
    let claim = state
        .executor
        .submit_draft(&caller.ctx, &ClaimId(id))
        .await
        .map_err(|error| caller.fail(error))?;
    record_claim_action(state, caller, "submitted", &claim).await
}

async fn resubmit_claim(
    State(state): State<ApiState>,
    caller: Caller,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<Json<Claim>> {
    let edits: ClaimEdits = caller.optional_body(&body)?;
    let claim = state
        .executor
        .resubmit(&caller.ctx, &ClaimId(id), edits)
        .await
        .map_err(|error| caller.fail(error))?;
    record_claim_action(state, caller, "resubmitted", &claim).await
}

async fn approve_claim(
    State(state): State<ApiState>,
    caller: Caller,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<Json<Claim>> {
    let request: RemarksRequest = caller.optional_body(&body)?;
    let decision = ClaimDecision::Approve { remarks: request.remarks };
    decide_claim(state, caller, id, decision, "approved").await
}

async fn reject_claim(
    State(state): State<ApiState>,
    caller: Caller,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<Json<Claim>> {
    let request: RemarksRequest = caller.optional_body(&body)?;
    let decision = ClaimDecision::Reject { remarks: request.required() };
    decide_claim(state, caller, id, decision, "rejected").await
}

async fn send_back_claim(
    State(state): State<ApiState>,
    caller: Caller,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<Json<Claim>> {
    let request: RemarksRequest = caller.optional_body(&body)?;
    let decision = ClaimDecision::SendBack { remarks: request.required() };
    decide_claim(state, caller, id, decision, "sent back").await
}

async fn decide_claim(
    state: ApiState,
    caller: Caller,
    id: String,
    decision: ClaimDecision,
    verb: &str,
) -> ApiResult<Json<Claim>> {
    let claim = state
        .executor
        .decide_claim(&caller.ctx, &ClaimId(id), decision)
        .await
        .map_err(|error| caller.fail(error))?;
    record_claim_action(state, caller, verb, &claim).await
}

async fn pay_claim(
    State(state): State<ApiState>,
    caller: Caller,
    Path(id): Path<String>,
    Json(request): Json<PaymentRequest>,
) -> ApiResult<Json<Claim>> {
    let decision = FinanceDecision::MarkPaid {
        payment_date: request.payment_date.unwrap_or_else(|| Utc::now().date_naive()),
        reference: request.reference,
    };
    finance_claim(state, caller, id, decision, "paid").await
}

async fn hold_claim(
    State(state): State<ApiState>,
    caller: Caller,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<Json<Claim>> {
    let request: RemarksRequest = caller.optional_body(&body)?;
    let decision = FinanceDecision::PutOnHold { remarks: request.remarks };
    finance_claim(state, caller, id, decision, "put on hold").await
}

async fn release_claim(
    State(state): State<ApiState>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<Json<Claim>> {
    finance_claim(state, caller, id, FinanceDecision::ReleaseHold, "released").await
}

async fn finance_claim(
    state: ApiState,
    caller: Caller,
    id: String,
    decision: FinanceDecision,
    verb: &str,
) -> ApiResult<Json<Claim>> {
    let claim = state
        .executor
        .decide_finance(&caller.ctx, &ClaimId(id), decision)
        .await
        .map_err(|error| caller.fail(error))?;
    record_claim_action(state, caller, verb, &claim).await
}

async fn record_claim_action(
    state: ApiState,
    caller: Caller,
    verb: &str,
    claim: &Claim,
) -> ApiResult<Json<Claim>> {
    let detail = format!("{verb} claim {}", claim.claim_number);
    caller.record(&state, SessionActivity::Action, detail).await;
    Ok(Json(claim.clone()))
}

// ---------------------------------------------------------------------------
// Booking handlers
// ---------------------------------------------------------------------------

async fn create_booking(
    State(state): State<ApiState>,
    caller: Caller,
    Json(input): Json<BookingInput>,
) -> ApiResult<(StatusCode, Json<RoomBooking>)> {
    let booking =
        state.executor.create_booking(&caller.ctx, input).await.map_err(|error| caller.fail(error))?;
    let detail = format!("requested booking {}", booking.booking_number);
    caller.record(&state, SessionActivity::Action, detail).await;
    Ok((StatusCode::CREATED, Json(booking)))
}

async fn pending_bookings(
    State(state): State<ApiState>,
    caller: Caller,
) -> ApiResult<Json<Vec<RoomBooking>>> {
    let bookings =
        state.executor.pending_bookings(&caller.ctx).await.map_err(|error| caller.fail(error))?;
    Ok(Json(bookings))
}

async fn approve_booking(
    State(state): State<ApiState>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<Json<RoomBooking>> {
    decide_booking(state, caller, id, BookingDecision::Approve, "approved").await
}

async fn reject_booking(
    State(state): State<ApiState>,
    caller: Caller,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<Json<RoomBooking>> {
    let request: RemarksRequest = caller.optional_body(&body)?;
    let decision = BookingDecision::Reject { remarks: request.required() };
    decide_booking(state, caller, id, decision, "rejected").await
}

async fn send_back_booking(
    State(state): State<ApiState>,
    caller: Caller,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<Json<RoomBooking>> {
    let request: RemarksRequest = caller.optional_body(&body)?;
    let decision = BookingDecision::SendBack { remarks: request.required() };
    decide_booking(state, caller, id, decision, "sent back").await
}

async fn cancel_booking(
    State(state): State<ApiState>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<Json<RoomBooking>> {
    decide_booking(state, caller, id, BookingDecision::Cancel, "cancelled").await
}

async fn decide_booking(
    state: ApiState,
    caller: Caller,
    id: String,
    decision: BookingDecision,
    verb: &str,
) -> ApiResult<Json<RoomBooking>> {
    let booking = state
        .executor
        .decide_booking(&caller.ctx, &BookingId(id), decision)
        .await
        .map_err(|error| caller.fail(error))?;
    let detail = format!("{verb} booking {}", booking.booking_number);
    caller.record(&state, SessionActivity::Action, detail).await;
    Ok(Json(booking))
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

async fn list_notifications(
    State(state): State<ApiState>,
    caller: Caller,
) -> ApiResult<Json<Vec<Notification>>> {
    let notifications =
        state.executor.notifications(&caller.ctx).await.map_err(|error| caller.fail(error))?;
    Ok(Json(notifications))
}

async fn unread_count(State(state): State<ApiState>, caller: Caller) -> ApiResult<Json<UnreadCount>> {
    let unread = state.executor.unread_count(&caller.ctx).await.map_err(|error| caller.fail(error))?;
    Ok(Json(UnreadCount { unread }))
}

async fn mark_read(
    State(state): State<ApiState>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state
        .executor
        .mark_read(&caller.ctx, &NotificationId(id))
        .await
        .map_err(|error| caller.fail(error))?;
    Ok(StatusCode::NO_CONTENT)
}

async fn mark_all_read(State(state): State<ApiState>, caller: Caller) -> ApiResult<Json<MarkedCount>> {
    let marked = state.executor.mark_all_read(&caller.ctx).await.map_err(|error| caller.fail(error))?;
    Ok(Json(MarkedCount { marked }))
}

// ---------------------------------------------------------------------------
// Session handlers
// ---------------------------------------------------------------------------

async fn sign_in(State(state): State<ApiState>, caller: Caller) -> Json<User> {
    let actor = caller.ctx.actor.clone();
    let detail = format!("signed in as {}", actor.portal_role.as_str());
    caller.record(&state, SessionActivity::Login, detail).await;
    Json(actor)
}

async fn sign_out(State(state): State<ApiState>, caller: Caller) -> StatusCode {
    caller.record(&state, SessionActivity::Logout, "signed out".to_string()).await;
    StatusCode::NO_CONTENT
}

// ---------------------------------------------------------------------------
// Exports
// ---------------------------------------------------------------------------

fn csv_response(filename: &str, body: String) -> Response {
    (
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{filename}\"")),
        ],
        body,
    )
        .into_response()
}

async fn export_claims(State(state): State<ApiState>, caller: Caller) -> ApiResult<Response> {
    let csv = state.executor.export_claims(&caller.ctx).await.map_err(|error| caller.fail(error))?;
    caller.record(&state, SessionActivity::Action, "exported claims".to_string()).await;
    Ok(csv_response("claims.csv", csv))
}

async fn export_bookings(State(state): State<ApiState>, caller: Caller) -> ApiResult<Response> {
    let csv = state.executor.export_bookings(&caller.ctx).await.map_err(|error| caller.fail(error))?;
    caller.record(&state, SessionActivity::Action, "exported bookings".to_string()).await;
    Ok(csv_response("bookings.csv", csv))
}
