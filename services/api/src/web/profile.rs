//! services/api/src/web/profile.rs
//!
//! The signed-in user's profile: name, mobile number and picture.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Extension, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use study_companion_core::domain::{ProfileDetails, UserProfile};
use study_companion_core::ports::PortError;
use tracing::{error, info};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::web::state::AppState;

#[derive(Serialize, ToSchema)]
pub struct ProfileView {
    pub user_id: Uuid,
    pub email: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub mobile_number: String,
    pub profile_picture: Option<String>,
    pub is_first_run: bool,
}

impl From<UserProfile> for ProfileView {
    fn from(p: UserProfile) -> Self {
        Self {
            user_id: p.user_id,
            email: p.email,
            first_name: p.details.first_name,
            last_name: p.details.last_name,
            mobile_number: p.details.mobile_number,
            profile_picture: p.details.profile_picture,
            is_first_run: p.is_first_run,
        }
    }
}

/// A full replacement of the editable profile fields.
#[derive(Deserialize, ToSchema)]
pub struct ProfileUpdateRequest {
    pub first_name: String,
    pub last_name: String,
    pub mobile_number: String,
    #[serde(default)]
    pub profile_picture: Option<String>,
}

fn validated_details(req: ProfileUpdateRequest) -> Result<ProfileDetails, (StatusCode, String)> {
    let details = ProfileDetails {
        first_name: req.first_name,
        last_name: req.last_name,
        mobile_number: req.mobile_number,
        profile_picture: req.profile_picture,
    }
    .normalized();
    let missing = details.missing_required();
    if !missing.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("Missing required fields: {}", missing.join(", ")),
        ));
    }
    Ok(details)
}

fn profile_error(e: PortError) -> (StatusCode, String) {
    match e {
        PortError::NotFound(_) => (StatusCode::NOT_FOUND, "User not found".to_string()),
        other => {
            error!("Profile store call failed: {:?}", other);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to access profile".to_string())
        }
    }
}

/// GET /profile - The caller's profile
#[utoipa::path(
    get,
    path = "/profile",
    responses(
        (status = 200, description = "The caller's profile", body = ProfileView),
        (status = 401, description = "Not signed in"),
        (status = 404, description = "User not found")
    )
)]
pub async fn get_profile_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let profile = state.accounts.get_profile(user_id).await.map_err(profile_error)?;
    Ok(Json(ProfileView::from(profile)))
}

/// PUT /profile - Replace the caller's profile details
#[utoipa::path(
    put,
    path = "/profile",
    request_body = ProfileUpdateRequest,
    responses(
        (status = 200, description = "Profile updated", body = ProfileView),
        (status = 400, description = "A required field is blank"),
        (status = 401, description = "Not signed in"),
        (status = 404, description = "User not found")
    )
)]
pub async fn update_profile_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(req): Json<ProfileUpdateRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let details = validated_details(req)?;
    let profile = state
        .accounts
        .update_profile(user_id, &details)
        .await
        .map_err(profile_error)?;
    info!("Updated profile of user {}.", user_id);
    Ok(Json(ProfileView::from(profile)))
}
