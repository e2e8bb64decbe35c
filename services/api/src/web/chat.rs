//! services/api/src/web/chat.rs
//!
//! The HTTP fallback for chat: everything the WebSocket channel does except
//! typing indicators, plus conversation listing and paged history.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use mentorpulse_core::{chat::DEFAULT_PAGE_SIZE, SeenSelection};
use serde::Deserialize;
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::error::{ApiError, ErrorBody};
use crate::web::dto::{
    parse_client_message_type, ApiResponse, ChatDto, ChatSummaryDto, MessageDto, MessagePageDto,
};
use crate::web::extract::{optional_json, ApiJson};
use crate::web::middleware::CurrentUser;
use crate::web::state::AppState;

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GetOrCreateChatRequest {
    pub participant_id: Uuid,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub content: String,
    /// `text` (default) or `file`.
    pub message_type: Option<String>,
}

/// Omit the body to mark every unread message in the chat.
#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MarkReadRequest {
    pub message_ids: Vec<Uuid>,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PageQuery {
    /// 1-based page number, counted from the newest messages.
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

/// POST /api/chat/get-or-create - The active chat with another user
#[utoipa::path(
    post,
    path = "/api/chat/get-or-create",
    request_body = GetOrCreateChatRequest,
    responses(
        (status = 200, description = "The chat between the two users", body = ApiResponse<ChatDto>),
        (status = 400, description = "Unknown participant, or the caller themselves", body = ErrorBody),
    ),
    security(("bearer" = []))
)]
pub async fn get_or_create_chat_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    ApiJson(req): ApiJson<GetOrCreateChatRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let view = state.chat.get_or_create_chat(user_id, req.participant_id).await?;
    Ok(Json(ApiResponse::ok(ChatDto::from(view))))
}

/// GET /api/chat/user/chats - The caller's conversations
#[utoipa::path(
    get,
    path = "/api/chat/user/chats",
    responses(
        (status = 200, description = "Active chats, most recent first", body = ApiResponse<Vec<ChatSummaryDto>>),
    ),
    security(("bearer" = []))
)]
pub async fn list_chats_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    let chats: Vec<ChatSummaryDto> = state
        .chat
        .list_chats(user_id)
        .await?
        .into_iter()
        .map(Into::into)
        .collect();
    Ok(Json(ApiResponse::ok(chats)))
}

/// GET /api/chat/{chat_id}/messages - A page of history
///
/// Fetching history delivers and marks as seen everything addressed to the caller.
#[utoipa::path(
    get,
    path = "/api/chat/{chat_id}/messages",
    params(("chat_id" = Uuid, Path, description = "Chat id"), PageQuery),
    responses(
        (status = 200, description = "Messages in chronological order", body = ApiResponse<MessagePageDto>),
        (status = 403, description = "Not a participant", body = ErrorBody),
        (status = 404, description = "Chat not found", body = ErrorBody),
    ),
    security(("bearer" = []))
)]
pub async fn list_messages_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Path(chat_id): Path<Uuid>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let page = state
        .chat
        .list_messages(
            chat_id,
            user_id,
            query.page.unwrap_or(1),
            query.limit.unwrap_or(DEFAULT_PAGE_SIZE),
        )
        .await?;
    Ok(Json(ApiResponse::ok(MessagePageDto::from(page))))
}

/// POST /api/chat/{chat_id}/messages - Send a message
#[utoipa::path(
    post,
    path = "/api/chat/{chat_id}/messages",
    params(("chat_id" = Uuid, Path, description = "Chat id")),
    request_body = SendMessageRequest,
    responses(
        (status = 201, description = "Message stored", body = ApiResponse<MessageDto>),
        (status = 400, description = "Empty, oversized or system message", body = ErrorBody),
        (status = 404, description = "Chat not found", body = ErrorBody),
    ),
    security(("bearer" = []))
)]
pub async fn send_message_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Path(chat_id): Path<Uuid>,
    ApiJson(req): ApiJson<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let message_type = parse_client_message_type(req.message_type.as_deref())?;
    let message = state
        .chat
        .send_message(chat_id, user_id, &req.content, message_type)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(MessageDto::from(message))),
    ))
}

/// PATCH /api/chat/{chat_id}/read - Mark messages as seen
#[utoipa::path(
    patch,
    path = "/api/chat/{chat_id}/read",
    params(("chat_id" = Uuid, Path, description = "Chat id")),
    request_body(content = Option<MarkReadRequest>, description = "Specific messages; omit to mark all unread"),
    responses(
        (status = 200, description = "Messages newly marked as seen", body = ApiResponse<Vec<MessageDto>>),
        (status = 403, description = "Not a participant", body = ErrorBody),
    ),
    security(("bearer" = []))
)]
pub async fn mark_read_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Path(chat_id): Path<Uuid>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let selection = match optional_json::<MarkReadRequest>(&body)? {
        Some(req) => SeenSelection::Messages(req.message_ids),
        None => SeenSelection::AllUnread,
    };

    let seen: Vec<MessageDto> = state
        .chat
        .mark_seen(chat_id, user_id, selection)
        .await?
        .into_iter()
        .map(Into::into)
        .collect();
    let count = seen.len();
    Ok(Json(ApiResponse::with_message(
        seen,
        format!("{} message(s) marked as read", count),
    )))
}
