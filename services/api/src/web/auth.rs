//! services/api/src/web/auth.rs
//!
//! Authentication endpoints for user signup, login, and logout.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use study_companion_core::domain::ProfileDetails;
use study_companion_core::ports::PortError;
use tracing::{error, info};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::web::middleware::{session_id_from_headers, SESSION_COOKIE};
use crate::web::state::AppState;

const SESSION_DAYS: i64 = 30;
const MIN_PASSWORD_LEN: usize = 6;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// Signup takes the credentials plus optional profile details.
#[derive(Deserialize, ToSchema)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub mobile_number: Option<String>,
    #[serde(default)]
    pub profile_picture: Option<String>,
}

impl SignupRequest {
    fn details(&self) -> ProfileDetails {
        ProfileDetails {
            first_name: self.first_name.clone().unwrap_or_default(),
            last_name: self.last_name.clone().unwrap_or_default(),
            mobile_number: self.mobile_number.clone().unwrap_or_default(),
            profile_picture: self.profile_picture.clone(),
        }
        .normalized()
    }
}

#[derive(Serialize, ToSchema)]
pub struct AuthResponse {
    pub user_id: Uuid,
    pub email: String,
    /// True until the first login has been reported back to the client.
    pub is_first_run: bool,
}

//=========================================================================================
// Helpers
//=========================================================================================

fn validate_credentials(email: &str, password: &str) -> Result<String, (StatusCode, String)> {
    let email = email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err((StatusCode::BAD_REQUEST, "A valid email is required".to_string()));
    }
    if password.len() < MIN_PASSWORD_LEN {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("Password must be at least {} characters", MIN_PASSWORD_LEN),
        ));
    }
    Ok(email)
}

/// Stores a fresh auth session and returns the `Set-Cookie` value for it.
async fn open_session(state: &AppState, user_id: Uuid) -> Result<String, (StatusCode, String)> {
    let auth_session_id = Uuid::new_v4().to_string();
    let lifetime = Duration::days(SESSION_DAYS);

    state
        .accounts
        .create_auth_session(&auth_session_id, user_id, Utc::now() + lifetime)
        .await
        .map_err(|e| {
            error!("Failed to create auth session: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to create session".to_string())
        })?;

    Ok(format!(
        "{}={}; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age={}",
        SESSION_COOKIE,
        auth_session_id,
        lifetime.num_seconds()
    ))
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /auth/signup - Create a new user account
#[utoipa::path(
    post,
    path = "/auth/signup",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "User created successfully", body = AuthResponse),
        (status = 400, description = "Invalid email or password"),
        (status = 409, description = "Email already registered"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn signup_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SignupRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let email = validate_credentials(&req.email, &req.password)?;

    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| {
            error!("Failed to hash password: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to hash password".to_string())
        })?
        .to_string();

    let user = state
        .accounts
        .create_user_with_email(&email, &password_hash, &req.details())
        .await
        .map_err(|e| match e {
            PortError::Conflict(_) => {
                (StatusCode::CONFLICT, "Email already registered".to_string())
            }
            other => {
                error!("Failed to create user: {:?}", other);
                (StatusCode::INTERNAL_SERVER_ERROR, "Failed to create user".to_string())
            }
        })?;
    info!("Created user {}.", user.user_id);

    let cookie = open_session(&state, user.user_id).await?;
    let response = AuthResponse {
        user_id: user.user_id,
        email: user.email.unwrap_or(email),
        is_first_run: true,
    };
    Ok((StatusCode::CREATED, [(header::SET_COOKIE, cookie)], Json(response)))
}

/// POST /auth/login - Login with existing account
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = Credentials,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<Credentials>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let invalid = || (StatusCode::UNAUTHORIZED, "Invalid email or password".to_string());
    let email = req.email.trim().to_lowercase();

    let user_creds = state
        .accounts
        .get_user_by_email(&email)
        .await
        .map_err(|e| match e {
            PortError::NotFound(_) => invalid(),
            other => {
                error!("Failed to get user: {:?}", other);
                (StatusCode::INTERNAL_SERVER_ERROR, "Authentication error".to_string())
            }
        })?;

    let parsed_hash = PasswordHash::new(&user_creds.hashed_password).map_err(|e| {
        error!("Failed to parse password hash: {:?}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, "Authentication error".to_string())
    })?;
    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| invalid())?;

    let is_first_run = state
        .accounts
        .take_first_run(user_creds.user_id)
        .await
        .map_err(|e| {
            error!("Failed to read first-run flag: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Authentication error".to_string())
        })?;

    let cookie = open_session(&state, user_creds.user_id).await?;
    let response = AuthResponse {
        user_id: user_creds.user_id,
        email: user_creds.email,
        is_first_run,
    };
    Ok((StatusCode::OK, [(header::SET_COOKIE, cookie)], Json(response)))
}

/// POST /auth/logout - Logout and invalidate session
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 200, description = "Logout successful"),
        (status = 401, description = "No active session")
    )
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let auth_session_id = session_id_from_headers(&headers)
        .ok_or((StatusCode::UNAUTHORIZED, "No session found".to_string()))?;

    state
        .accounts
        .delete_auth_session(auth_session_id)
        .await
        .map_err(|e| {
            error!("Failed to delete auth session: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to logout".to_string())
        })?;

    let cookie = format!(
        "{}=; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age=0",
        SESSION_COOKIE
    );
    Ok((StatusCode::OK, [(header::SET_COOKIE, cookie)]))
}
