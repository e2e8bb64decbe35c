//! services/api/src/web/auth.rs
//!
//! Authentication endpoints for registration, login, and logout.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Extension, Json};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{Duration, Utc};
use mentorpulse_core::{PortError, Role};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{ApiError, ErrorBody};
use crate::web::dto::{ApiResponse, UserDto};
use crate::web::extract::ApiJson;
use crate::web::middleware::{BearerToken, CurrentUser};
use crate::web::state::AppState;

const MIN_PASSWORD_LENGTH: usize = 6;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    /// `mentee` or `mentor`.
    pub role: String,
}

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize, ToSchema)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserDto,
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /api/auth/register - Create a new account and sign it in
#[utoipa::path(
    post,
    path = "/api/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User created successfully", body = ApiResponse<AuthResponse>),
        (status = 400, description = "Invalid request", body = ErrorBody),
        (status = 409, description = "Email already registered", body = ErrorBody),
    )
)]
pub async fn register_handler(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = req.name.trim();
    let email = req.email.trim().to_lowercase();
    if name.is_empty() {
        return Err(ApiError::BadRequest("Name is required".to_string()));
    }
    if !email.contains('@') {
        return Err(ApiError::BadRequest("A valid email is required".to_string()));
    }
    if req.password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(ApiError::BadRequest(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }
    let role = match req.role.parse::<Role>() {
        Ok(Role::Admin) => {
            return Err(ApiError::BadRequest(
                "Admin accounts cannot be self-registered".to_string(),
            ))
        }
        Ok(role) => role,
        Err(e) => return Err(ApiError::BadRequest(e.to_string())),
    };

    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| {
            error!("Failed to hash password: {:?}", e);
            ApiError::Internal("Failed to hash password".to_string())
        })?
        .to_string();

    let user = match state
        .users
        .create_user_with_email(name, &email, &password_hash, role)
        .await
    {
        Ok(user) => user,
        Err(PortError::Conflict(_)) => {
            return Err(ApiError::Port(PortError::Conflict(
                "An account with this email already exists".to_string(),
            )))
        }
        Err(e) => return Err(e.into()),
    };

    let token = issue_token(&state, user.id).await?;
    info!(user_id = %user.id, role = %user.role, "user registered");

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(AuthResponse {
            token,
            user: user.into(),
        })),
    ))
}

/// POST /api/auth/login - Login with an existing account
#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = ApiResponse<AuthResponse>),
        (status = 401, description = "Invalid credentials", body = ErrorBody),
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let invalid = || ApiError::Unauthorized("Invalid email or password".to_string());

    let credentials = match state.users.get_user_by_email(req.email.trim()).await {
        Ok(credentials) => credentials,
        Err(PortError::NotFound(_)) => return Err(invalid()),
        Err(e) => return Err(e.into()),
    };

    let parsed_hash = PasswordHash::new(&credentials.hashed_password).map_err(|e| {
        error!("Failed to parse password hash: {:?}", e);
        ApiError::Internal("Authentication error".to_string())
    })?;
    if Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .is_err()
    {
        return Err(invalid());
    }

    let user = state.users.get_user(credentials.user_id).await?;
    let token = issue_token(&state, user.id).await?;

    Ok(Json(ApiResponse::ok(AuthResponse {
        token,
        user: user.into(),
    })))
}

/// POST /api/auth/logout - Invalidate the bearer token
#[utoipa::path(
    post,
    path = "/api/auth/logout",
    responses(
        (status = 200, description = "Logout successful"),
        (status = 401, description = "No valid token", body = ErrorBody),
    ),
    security(("bearer" = []))
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    Extension(BearerToken(token)): Extension<BearerToken>,
) -> Result<impl IntoResponse, ApiError> {
    state.users.delete_auth_session(&token).await?;
    Ok(Json(ApiResponse::with_message((), "Logged out")))
}

/// GET /api/auth/me - The authenticated user's profile
#[utoipa::path(
    get,
    path = "/api/auth/me",
    responses(
        (status = 200, description = "Current user", body = ApiResponse<UserDto>),
        (status = 401, description = "No valid token", body = ErrorBody),
    ),
    security(("bearer" = []))
)]
pub async fn me_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state.users.get_user(user_id).await?;
    Ok(Json(ApiResponse::ok(UserDto::from(user))))
}

/// Creates an opaque bearer token valid for the configured number of days.
async fn issue_token(state: &AppState, user_id: Uuid) -> Result<String, ApiError> {
    let token = format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple());
    let expires_at = Utc::now() + Duration::days(state.config.auth_token_ttl_days);
    state
        .users
        .create_auth_session(&token, user_id, expires_at)
        .await?;
    Ok(token)
}
