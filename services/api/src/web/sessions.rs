//! services/api/src/web/sessions.rs
//!
//! REST handlers for the mentoring-session lifecycle, skills and the progress ledger.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use mentorpulse_core::{
    ApprovalInput, BookingRequest, CompletionReport, SessionStatus, SessionType,
};
use serde::Deserialize;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{ApiError, ErrorBody};
use crate::web::dto::{
    parse_date, parse_time, price_to_cents, ApiResponse, ApprovalOutcomeDto, ProgressDto,
    SessionDto, SkillClaimDto, SkillDto,
};
use crate::web::extract::{optional_json, ApiJson};
use crate::web::middleware::CurrentUser;
use crate::web::state::AppState;

//=========================================================================================
// Request Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BookSessionRequest {
    pub mentor_id: Uuid,
    pub topic: String,
    pub description: Option<String>,
    /// `video`, `audio` or `chat`.
    pub session_type: String,
    /// `YYYY-MM-DD`
    pub date: String,
    /// `HH:MM`
    pub start_time: String,
    pub end_time: String,
    #[serde(default)]
    pub price: f64,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompletionRequest {
    pub notes: Option<String>,
    #[serde(default)]
    pub skills: Vec<SkillClaimDto>,
    /// Minutes actually spent in the session.
    pub actual_duration: Option<i32>,
}

impl From<CompletionRequest> for CompletionReport {
    fn from(req: CompletionRequest) -> Self {
        Self {
            notes: req.notes,
            skills: req.skills.into_iter().map(Into::into).collect(),
            actual_duration_minutes: req.actual_duration,
        }
    }
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApproveRequest {
    pub approved: bool,
    pub notes: Option<String>,
    pub actual_duration: Option<i32>,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CancelRequest {
    pub reason: Option<String>,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatusRequest {
    /// `upcoming`, `confirmed` or `missed`.
    pub status: String,
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /api/sessions/book - Book a session with a mentor
#[utoipa::path(
    post,
    path = "/api/sessions/book",
    request_body = BookSessionRequest,
    responses(
        (status = 201, description = "Session booked", body = ApiResponse<SessionDto>),
        (status = 400, description = "Invalid booking", body = ErrorBody),
        (status = 404, description = "Mentor not found", body = ErrorBody),
    ),
    security(("bearer" = []))
)]
pub async fn book_session_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    ApiJson(req): ApiJson<BookSessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let session_type = req
        .session_type
        .parse::<SessionType>()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let request = BookingRequest {
        mentor_id: req.mentor_id,
        mentee_id: user_id,
        topic: req.topic,
        description: req.description,
        session_type,
        date: parse_date("date", &req.date)?,
        start_time: parse_time("startTime", &req.start_time)?,
        end_time: parse_time("endTime", &req.end_time)?,
        price_cents: price_to_cents(req.price)?,
    };

    let session = state.sessions.book_session(request).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_message(
            SessionDto::from(session),
            "Session booked successfully",
        )),
    ))
}

/// GET /api/sessions - Sessions the caller takes part in
#[utoipa::path(
    get,
    path = "/api/sessions",
    responses(
        (status = 200, description = "Sessions as mentor or mentee, by date", body = ApiResponse<Vec<SessionDto>>),
    ),
    security(("bearer" = []))
)]
pub async fn list_sessions_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    let sessions: Vec<SessionDto> = state
        .sessions
        .list_sessions(user_id)
        .await?
        .into_iter()
        .map(Into::into)
        .collect();
    Ok(Json(ApiResponse::ok(sessions)))
}

/// GET /api/sessions/{session_id}
#[utoipa::path(
    get,
    path = "/api/sessions/{session_id}",
    params(("session_id" = Uuid, Path, description = "Session id")),
    responses(
        (status = 200, description = "The session", body = ApiResponse<SessionDto>),
        (status = 403, description = "Not a participant", body = ErrorBody),
        (status = 404, description = "Session not found", body = ErrorBody),
    ),
    security(("bearer" = []))
)]
pub async fn get_session_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Path(session_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state.sessions.get_session(session_id, user_id).await?;
    Ok(Json(ApiResponse::ok(SessionDto::from(session))))
}

/// PATCH /api/sessions/{session_id}/initiate-completion - Mentor asks for sign-off
#[utoipa::path(
    patch,
    path = "/api/sessions/{session_id}/initiate-completion",
    params(("session_id" = Uuid, Path, description = "Session id")),
    request_body = CompletionRequest,
    responses(
        (status = 200, description = "Session is pending verification", body = ApiResponse<SessionDto>),
        (status = 400, description = "Session cannot be completed from its current status", body = ErrorBody),
        (status = 403, description = "Only the mentor may initiate completion", body = ErrorBody),
    ),
    security(("bearer" = []))
)]
pub async fn initiate_completion_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Path(session_id): Path<Uuid>,
    ApiJson(req): ApiJson<CompletionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state
        .sessions
        .initiate_completion(session_id, user_id, req.into())
        .await?;
    Ok(Json(ApiResponse::with_message(
        SessionDto::from(session),
        "Completion initiated. Waiting for both parties to approve.",
    )))
}

/// PATCH /api/sessions/{session_id}/approve - Approve or reject completion
#[utoipa::path(
    patch,
    path = "/api/sessions/{session_id}/approve",
    params(("session_id" = Uuid, Path, description = "Session id")),
    request_body = ApproveRequest,
    responses(
        (status = 200, description = "Approval recorded", body = ApiResponse<ApprovalOutcomeDto>),
        (status = 403, description = "Not a participant", body = ErrorBody),
        (status = 409, description = "Session is not pending verification", body = ErrorBody),
    ),
    security(("bearer" = []))
)]
pub async fn approve_completion_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Path(session_id): Path<Uuid>,
    ApiJson(req): ApiJson<ApproveRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let input = ApprovalInput {
        approved: req.approved,
        notes: req.notes,
        actual_duration_minutes: req.actual_duration,
    };
    let outcome = state
        .sessions
        .approve_completion(session_id, user_id, input)
        .await?;
    let message = if outcome.completed() {
        "Session completed"
    } else if req.approved {
        "Approval recorded. Waiting for the other party."
    } else {
        "Completion rejected"
    };
    Ok(Json(ApiResponse::with_message(
        ApprovalOutcomeDto::from(outcome),
        message,
    )))
}

/// PATCH /api/sessions/{session_id}/complete - Mentor completes without sign-off
#[utoipa::path(
    patch,
    path = "/api/sessions/{session_id}/complete",
    params(("session_id" = Uuid, Path, description = "Session id")),
    request_body = CompletionRequest,
    responses(
        (status = 200, description = "Session completed", body = ApiResponse<SessionDto>),
        (status = 400, description = "Session cannot be completed from its current status", body = ErrorBody),
        (status = 403, description = "Only the mentor may complete a session", body = ErrorBody),
    ),
    security(("bearer" = []))
)]
pub async fn complete_session_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Path(session_id): Path<Uuid>,
    ApiJson(req): ApiJson<CompletionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state
        .sessions
        .complete_directly(session_id, user_id, req.into())
        .await?;
    Ok(Json(ApiResponse::with_message(
        SessionDto::from(session),
        "Session completed",
    )))
}

/// PATCH /api/sessions/{session_id}/cancel
#[utoipa::path(
    patch,
    path = "/api/sessions/{session_id}/cancel",
    params(("session_id" = Uuid, Path, description = "Session id")),
    request_body(content = Option<CancelRequest>, description = "Optional cancellation reason"),
    responses(
        (status = 200, description = "Session cancelled", body = ApiResponse<SessionDto>),
        (status = 400, description = "Already cancelled or completed", body = ErrorBody),
        (status = 403, description = "Not a participant", body = ErrorBody),
    ),
    security(("bearer" = []))
)]
pub async fn cancel_session_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Path(session_id): Path<Uuid>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let reason = optional_json::<CancelRequest>(&body)?.and_then(|req| req.reason);
    let session = state
        .sessions
        .cancel_session(session_id, user_id, reason)
        .await?;
    Ok(Json(ApiResponse::with_message(
        SessionDto::from(session),
        "Session cancelled",
    )))
}

/// PATCH /api/sessions/{session_id}/status - Mentor moves a scheduled session
#[utoipa::path(
    patch,
    path = "/api/sessions/{session_id}/status",
    params(("session_id" = Uuid, Path, description = "Session id")),
    request_body = UpdateStatusRequest,
    responses(
        (status = 200, description = "Status updated", body = ApiResponse<SessionDto>),
        (status = 400, description = "Unknown status or illegal transition", body = ErrorBody),
        (status = 403, description = "Only the mentor may change the status", body = ErrorBody),
    ),
    security(("bearer" = []))
)]
pub async fn update_status_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Path(session_id): Path<Uuid>,
    ApiJson(req): ApiJson<UpdateStatusRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let status = req
        .status
        .parse::<SessionStatus>()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let session = state
        .sessions
        .update_status(session_id, user_id, status)
        .await?;
    Ok(Json(ApiResponse::ok(SessionDto::from(session))))
}

/// GET /api/skills - The caller's skills
#[utoipa::path(
    get,
    path = "/api/skills",
    responses(
        (status = 200, description = "Skills with their progress", body = ApiResponse<Vec<SkillDto>>),
    ),
    security(("bearer" = []))
)]
pub async fn list_skills_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    let skills: Vec<SkillDto> = state
        .sessions
        .list_skills(user_id)
        .await?
        .into_iter()
        .map(Into::into)
        .collect();
    Ok(Json(ApiResponse::ok(skills)))
}

/// GET /api/progress - The caller's progress ledger
#[utoipa::path(
    get,
    path = "/api/progress",
    responses(
        (status = 200, description = "Ledger entries, newest first", body = ApiResponse<Vec<ProgressDto>>),
    ),
    security(("bearer" = []))
)]
pub async fn list_progress_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    let entries: Vec<ProgressDto> = state
        .sessions
        .list_progress(user_id)
        .await?
        .into_iter()
        .map(Into::into)
        .collect();
    Ok(Json(ApiResponse::ok(entries)))
}
