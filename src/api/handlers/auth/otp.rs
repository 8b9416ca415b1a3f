//! OTP issuance and verification endpoints.

use axum::{
    extract::Extension,
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use crate::api::email::{otp_mail, MailSender};

use super::session::refresh_cookie;
use super::state::AuthState;
use super::storage::{
    active_challenge, consume_challenge, discard_challenge, find_or_create_user,
    find_user_by_email, record_otp_mismatch, replace_challenge,
};
use super::tokens::issue_refresh_token;
use super::types::{
    MessageResponse, RequestOtpRequest, UserResponse, VerifyOtpRequest, VerifyOtpResponse,
};
use super::utils::{generate_otp_code, normalize_email, valid_email};
use super::message_response;

/// Request a login code for an email address.
///
/// First contact provisions the identity; throttling refuses a resend while
/// the previous challenge is younger than the cooldown. Delivery failure is
/// reported, but the challenge row stays for a later resend.
#[utoipa::path(
    post,
    path = "/send-otp",
    request_body = RequestOtpRequest,
    responses(
        (status = 200, description = "OTP created and dispatched", body = MessageResponse),
        (status = 400, description = "Missing or invalid email", body = MessageResponse),
        (status = 429, description = "Resend requested inside the cooldown window", body = MessageResponse),
        (status = 500, description = "Persistence or delivery failure", body = MessageResponse)
    ),
    tag = "auth"
)]
pub async fn request_otp(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    mailer: Extension<Arc<dyn MailSender>>,
    payload: Option<Json<RequestOtpRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return message_response(StatusCode::BAD_REQUEST, "Email is required");
    };

    let email = normalize_email(&request.email);
    if email.is_empty() {
        return message_response(StatusCode::BAD_REQUEST, "Email is required");
    }
    if !valid_email(&email) {
        return message_response(StatusCode::BAD_REQUEST, "A valid email is required");
    }

    let user = match find_or_create_user(&pool, &email).await {
        Ok(user) => user,
        Err(err) => {
            error!("Failed to find or create user: {err}");
            return message_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to send OTP");
        }
    };

    // Throttle before touching the challenge; a refused resend leaves the
    // existing challenge untouched.
    let cooldown = auth_state.config().resend_cooldown_seconds();
    match active_challenge(&pool, user.id).await {
        Ok(Some(challenge)) => {
            if !challenge.expired && challenge.age_seconds < cooldown {
                let wait = cooldown - challenge.age_seconds;
                return message_response(
                    StatusCode::TOO_MANY_REQUESTS,
                    &format!("Please wait {wait}s before requesting another OTP"),
                );
            }
        }
        Ok(None) => {}
        Err(err) => {
            error!("Failed to check OTP throttle: {err}");
            return message_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to send OTP");
        }
    }

    let code = generate_otp_code();
    let ttl = auth_state.config().otp_ttl_seconds();
    if let Err(err) = replace_challenge(&pool, user.id, &code, ttl).await {
        error!("Failed to store OTP challenge: {err}");
        return message_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to send OTP");
    }

    let mail = otp_mail(&email, &code, ttl / 60);
    if let Err(err) = mailer.send(&mail).await {
        // The challenge stays behind so the user can retry after the cooldown.
        error!("Failed to deliver OTP mail: {err}");
        return message_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to send OTP");
    }

    message_response(StatusCode::OK, "OTP sent successfully")
}

/// Verify a submitted code and sign the token pair.
#[utoipa::path(
    post,
    path = "/verify-otp",
    request_body = VerifyOtpRequest,
    responses(
        (status = 200, description = "OTP verified; access token in body, refresh token in cookie", body = VerifyOtpResponse),
        (status = 400, description = "Missing fields, no active challenge, expired, or wrong code", body = MessageResponse),
        (status = 404, description = "Unknown user", body = MessageResponse),
        (status = 500, description = "Persistence failure", body = MessageResponse)
    ),
    tag = "auth"
)]
pub async fn verify_otp(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<VerifyOtpRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return message_response(StatusCode::BAD_REQUEST, "Email and OTP are required");
    };

    let email = normalize_email(&request.email);
    let submitted = request.otp.trim();
    if email.is_empty() || submitted.is_empty() {
        return message_response(StatusCode::BAD_REQUEST, "Email and OTP are required");
    }

    let user = match find_user_by_email(&pool, &email).await {
        Ok(Some(user)) => user,
        Ok(None) => return message_response(StatusCode::NOT_FOUND, "User not found"),
        Err(err) => {
            error!("Failed to lookup user: {err}");
            return message_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to verify OTP");
        }
    };

    let challenge = match active_challenge(&pool, user.id).await {
        Ok(Some(challenge)) => challenge,
        Ok(None) => {
            return message_response(StatusCode::BAD_REQUEST, "No OTP found; request one first")
        }
        Err(err) => {
            error!("Failed to lookup challenge: {err}");
            return message_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to verify OTP");
        }
    };

    if challenge.expired {
        // Lazy cleanup is the only expiry mechanism; best-effort delete.
        if let Err(err) = discard_challenge(&pool, user.id, challenge.id).await {
            error!("Failed to discard expired challenge: {err}");
        }
        return message_response(
            StatusCode::BAD_REQUEST,
            "OTP expired; please request a new one",
        );
    }

    if challenge.code != submitted {
        let attempts = match record_otp_mismatch(&pool, challenge.id).await {
            Ok(attempts) => attempts,
            Err(err) => {
                error!("Failed to record OTP mismatch: {err}");
                return message_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to verify OTP");
            }
        };
        if attempts >= auth_state.config().max_otp_attempts() {
            if let Err(err) = discard_challenge(&pool, user.id, challenge.id).await {
                error!("Failed to discard challenge after attempt cap: {err}");
            }
            return message_response(
                StatusCode::BAD_REQUEST,
                "Too many incorrect attempts; request a new OTP",
            );
        }
        return message_response(StatusCode::BAD_REQUEST, "Invalid OTP");
    }

    // Single use: the challenge is gone before any token is signed. The
    // returned row carries the verified flag and fresh timestamps.
    let user = match consume_challenge(&pool, user.id, challenge.id).await {
        Ok(user) => user,
        Err(err) => {
            error!("Failed to consume challenge: {err}");
            return message_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to verify OTP");
        }
    };

    let access_token = match auth_state.tokens().issue_access_token(user.id) {
        Ok(token) => token,
        Err(err) => {
            error!("Failed to sign access token: {err}");
            return message_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to verify OTP");
        }
    };

    let refresh_ttl = auth_state.config().refresh_token_ttl_seconds();
    let refresh_secret = match issue_refresh_token(&pool, user.id, refresh_ttl).await {
        Ok(secret) => secret,
        Err(err) => {
            error!("Failed to issue refresh token: {err}");
            return message_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to verify OTP");
        }
    };

    let mut headers = HeaderMap::new();
    match refresh_cookie(auth_state.config(), &refresh_secret) {
        Ok(cookie) => {
            headers.insert(SET_COOKIE, cookie);
        }
        Err(err) => {
            error!("Failed to build refresh cookie: {err}");
            return message_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to verify OTP");
        }
    }

    let response = VerifyOtpResponse {
        message: "OTP verified successfully".to_string(),
        access_token,
        redirect_to_profile_setup: user.is_default_profile(),
        user: UserResponse::from(&user),
    };

    (StatusCode::OK, headers, Json(response)).into_response()
}
