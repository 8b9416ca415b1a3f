//! Profile endpoints gated by a bearer access token.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use super::auth::storage::{find_user_by_id, update_profile};
use super::auth::types::{MeResponse, MessageResponse, ProfileRequest, ProfileResponse, UserResponse};
use super::auth::{message_response, require_auth, AuthState};

/// Return the authenticated user's sanitized profile.
#[utoipa::path(
    get,
    path = "/me",
    responses(
        (status = 200, description = "Authenticated user profile", body = MeResponse),
        (status = 401, description = "Missing or invalid access token", body = MessageResponse),
        (status = 404, description = "User no longer exists", body = MessageResponse),
        (status = 500, description = "Persistence failure", body = MessageResponse)
    ),
    tag = "profile"
)]
pub async fn get_me(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    let user_id = match require_auth(&headers, &auth_state) {
        Ok(user_id) => user_id,
        Err(response) => return response,
    };

    match find_user_by_id(&pool, user_id).await {
        Ok(Some(user)) => (
            StatusCode::OK,
            Json(MeResponse {
                user: UserResponse::from(&user),
            }),
        )
            .into_response(),
        Ok(None) => message_response(StatusCode::NOT_FOUND, "User not found"),
        Err(err) => {
            error!("Failed to fetch profile: {err}");
            message_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch profile")
        }
    }
}

/// Create or update the profile. Completing setup marks the user verified.
#[utoipa::path(
    post,
    path = "/profile",
    request_body = ProfileRequest,
    responses(
        (status = 200, description = "Profile saved", body = ProfileResponse),
        (status = 400, description = "fullName and college are required", body = MessageResponse),
        (status = 401, description = "Missing or invalid access token", body = MessageResponse),
        (status = 404, description = "User no longer exists", body = MessageResponse),
        (status = 500, description = "Persistence failure", body = MessageResponse)
    ),
    tag = "profile"
)]
pub async fn save_profile(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<ProfileRequest>>,
) -> impl IntoResponse {
    let user_id = match require_auth(&headers, &auth_state) {
        Ok(user_id) => user_id,
        Err(response) => return response,
    };

    let Some(Json(request)) = payload else {
        return message_response(StatusCode::BAD_REQUEST, "fullName and college are required");
    };

    let full_name = normalize_required(request.full_name);
    let college = normalize_required(request.college);
    let (Some(full_name), Some(college)) = (full_name, college) else {
        return message_response(StatusCode::BAD_REQUEST, "fullName and college are required");
    };

    let branch = normalize_required(request.branch);
    let roll_number = normalize_required(request.roll_number);
    let avatar = normalize_required(request.avatar);

    match update_profile(
        &pool,
        user_id,
        &full_name,
        &college,
        branch.as_deref(),
        request.year,
        roll_number.as_deref(),
        avatar.as_deref(),
    )
    .await
    {
        Ok(Some(user)) => (
            StatusCode::OK,
            Json(ProfileResponse {
                message: "Profile saved".to_string(),
                user: UserResponse::from(&user),
            }),
        )
            .into_response(),
        Ok(None) => message_response(StatusCode::NOT_FOUND, "User not found"),
        Err(err) => {
            error!("Failed to save profile: {err}");
            message_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to save profile")
        }
    }
}

fn normalize_required(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
