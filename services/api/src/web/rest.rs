//! services/api/src/web/rest.rs
//!
//! Contains the master definition for the OpenAPI specification and the
//! router that wires every handler together.

use crate::{
    error::{ApiError, ErrorBody},
    web::{
        auth::{self, AuthResponse, LoginRequest, RegisterRequest},
        chat::{self, GetOrCreateChatRequest, MarkReadRequest, SendMessageRequest},
        dto::{
            ApprovalDto, ApprovalOutcomeDto, ChatDto, ChatSummaryDto, MessageDto, MessagePageDto,
            ProgressDto, ProgressMetricsDto, ReadReceiptDto, SessionDto, SkillClaimDto, SkillDto,
            UserDto, UserSummaryDto,
        },
        middleware::require_auth,
        sessions::{
            self, ApproveRequest, BookSessionRequest, CancelRequest, CompletionRequest,
            UpdateStatusRequest,
        },
        state::AppState,
        ws_handler::ws_handler,
    },
};
use axum::{
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware as axum_middleware,
    routing::{get, patch, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::register_handler,
        auth::login_handler,
        auth::logout_handler,
        auth::me_handler,
        chat::get_or_create_chat_handler,
        chat::list_chats_handler,
        chat::list_messages_handler,
        chat::send_message_handler,
        chat::mark_read_handler,
        sessions::book_session_handler,
        sessions::list_sessions_handler,
        sessions::get_session_handler,
        sessions::initiate_completion_handler,
        sessions::approve_completion_handler,
        sessions::complete_session_handler,
        sessions::cancel_session_handler,
        sessions::update_status_handler,
        sessions::list_skills_handler,
        sessions::list_progress_handler,
    ),
    components(
        schemas(
            ErrorBody,
            RegisterRequest, LoginRequest, AuthResponse,
            GetOrCreateChatRequest, SendMessageRequest, MarkReadRequest,
            BookSessionRequest, CompletionRequest, ApproveRequest, CancelRequest, UpdateStatusRequest,
            UserDto, UserSummaryDto, ReadReceiptDto, MessageDto, ChatDto, ChatSummaryDto,
            MessagePageDto, SkillClaimDto, ApprovalDto, SessionDto, ApprovalOutcomeDto,
            SkillDto, ProgressMetricsDto, ProgressDto,
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "MentorPulse API", description = "Chat delivery, read receipts and mentoring-session lifecycle.")
    )
)]
pub struct ApiDoc;

/// Registers the `bearer` security scheme referenced by protected paths.
struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
        );
    }
}

//=========================================================================================
// Router
//=========================================================================================

/// Builds the complete application: REST API, WebSocket endpoint and Swagger UI.
pub fn create_router(app_state: Arc<AppState>) -> Result<Router, ApiError> {
    let origin = app_state
        .config
        .cors_origin
        .parse::<HeaderValue>()
        .map_err(|e| ApiError::Internal(format!("Invalid CORS origin: {}", e)))?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    // Public routes (no auth required). The WebSocket authenticates in its first frame.
    let public_routes = Router::new()
        .route("/api/auth/register", post(auth::register_handler))
        .route("/api/auth/login", post(auth::login_handler))
        .route("/ws", get(ws_handler));

    // Protected routes (bearer token required)
    let protected_routes = Router::new()
        .route("/api/auth/logout", post(auth::logout_handler))
        .route("/api/auth/me", get(auth::me_handler))
        .route("/api/chat/get-or-create", post(chat::get_or_create_chat_handler))
        .route("/api/chat/user/chats", get(chat::list_chats_handler))
        .route(
            "/api/chat/{chat_id}/messages",
            get(chat::list_messages_handler).post(chat::send_message_handler),
        )
        .route("/api/chat/{chat_id}/read", patch(chat::mark_read_handler))
        .route("/api/sessions", get(sessions::list_sessions_handler))
        .route("/api/sessions/book", post(sessions::book_session_handler))
        .route("/api/sessions/{session_id}", get(sessions::get_session_handler))
        .route(
            "/api/sessions/{session_id}/initiate-completion",
            patch(sessions::initiate_completion_handler),
        )
        .route(
            "/api/sessions/{session_id}/approve",
            patch(sessions::approve_completion_handler),
        )
        .route(
            "/api/sessions/{session_id}/complete",
            patch(sessions::complete_session_handler),
        )
        .route(
            "/api/sessions/{session_id}/cancel",
            patch(sessions::cancel_session_handler),
        )
        .route(
            "/api/sessions/{session_id}/status",
            patch(sessions::update_status_handler),
        )
        .route("/api/skills", get(sessions::list_skills_handler))
        .route("/api/progress", get(sessions::list_progress_handler))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ));

    let api_router = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(cors)
        .with_state(app_state);

    // Merge the API router with the Swagger UI router for a complete application.
    Ok(Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi())))
}
