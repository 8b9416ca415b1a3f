//! Refresh and logout endpoints, plus the refresh cookie contract.

use axum::{
    extract::Extension,
    http::{
        header::{InvalidHeaderValue, COOKIE, SET_COOKIE},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::IntoResponse,
    Json,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use super::state::{AuthConfig, AuthState};
use super::tokens::{revoke_refresh_token, rotate_refresh_token, verify_refresh_token};
use super::types::{MessageResponse, RefreshRequest, RefreshResponse};
use super::message_response;

const REFRESH_COOKIE_NAME: &str = "refresh_token";

/// Mint a new access token from a live refresh token.
///
/// The refresh token rotates on every successful call: the presented secret
/// is revoked and a fresh one replaces the cookie.
#[utoipa::path(
    post,
    path = "/refresh-token",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "New access token; rotated refresh cookie", body = RefreshResponse),
        (status = 401, description = "Missing, invalid, revoked, or expired refresh token", body = MessageResponse),
        (status = 500, description = "Persistence failure", body = MessageResponse)
    ),
    tag = "auth"
)]
pub async fn refresh(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<RefreshRequest>>,
) -> impl IntoResponse {
    let body_token = payload.and_then(|Json(request)| request.refresh_token);
    let Some(secret) = extract_refresh_secret(&headers, body_token) else {
        return message_response(StatusCode::UNAUTHORIZED, "No refresh token provided");
    };

    // Invalid, revoked, and expired all collapse to the same answer.
    let record = match verify_refresh_token(&pool, &secret).await {
        Ok(Some(record)) => record,
        Ok(None) => return message_response(StatusCode::UNAUTHORIZED, "Invalid refresh token"),
        Err(err) => {
            error!("Failed to verify refresh token: {err}");
            return message_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to refresh token");
        }
    };

    let ttl = auth_state.config().refresh_token_ttl_seconds();
    let rotated = match rotate_refresh_token(&pool, &secret, record.user_id, ttl).await {
        Ok(secret) => secret,
        Err(err) => {
            error!("Failed to rotate refresh token: {err}");
            return message_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to refresh token");
        }
    };

    let access_token = match auth_state.tokens().issue_access_token(record.user_id) {
        Ok(token) => token,
        Err(err) => {
            error!("Failed to sign access token: {err}");
            return message_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to refresh token");
        }
    };

    let mut response_headers = HeaderMap::new();
    match refresh_cookie(auth_state.config(), &rotated) {
        Ok(cookie) => {
            response_headers.insert(SET_COOKIE, cookie);
        }
        Err(err) => {
            error!("Failed to build refresh cookie: {err}");
            return message_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to refresh token");
        }
    }

    (
        StatusCode::OK,
        response_headers,
        Json(RefreshResponse { access_token }),
    )
        .into_response()
}

/// Revoke the presented refresh token and clear the cookie.
///
/// Idempotent: succeeds whether or not a matching token existed.
#[utoipa::path(
    post,
    path = "/logout",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Token revoked (if present) and cookie cleared", body = MessageResponse),
        (status = 500, description = "Persistence failure", body = MessageResponse)
    ),
    tag = "auth"
)]
pub async fn logout(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<RefreshRequest>>,
) -> impl IntoResponse {
    let body_token = payload.and_then(|Json(request)| request.refresh_token);
    if let Some(secret) = extract_refresh_secret(&headers, body_token) {
        if let Err(err) = revoke_refresh_token(&pool, &secret).await {
            error!("Failed to revoke refresh token: {err}");
        }
    }

    // Always clear the cookie, even if no token matched.
    let mut response_headers = HeaderMap::new();
    if let Ok(cookie) = clear_refresh_cookie(auth_state.config()) {
        response_headers.insert(SET_COOKIE, cookie);
    }
    (
        StatusCode::OK,
        response_headers,
        Json(MessageResponse {
            message: "Logged out successfully".to_string(),
        }),
    )
        .into_response()
}

/// Build the `HttpOnly` refresh cookie with the token lifetime as max-age.
pub(super) fn refresh_cookie(
    config: &AuthConfig,
    secret: &str,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let max_age = config.refresh_token_ttl_seconds();
    let mut cookie = format!(
        "{REFRESH_COOKIE_NAME}={secret}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age}"
    );
    if config.refresh_cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

fn clear_refresh_cookie(config: &AuthConfig) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!("{REFRESH_COOKIE_NAME}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
    if config.refresh_cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

/// Cookie wins over body when both carry a secret.
fn extract_refresh_secret(headers: &HeaderMap, body_token: Option<String>) -> Option<String> {
    if let Some(secret) = cookie_value(headers, REFRESH_COOKIE_NAME) {
        return Some(secret);
    }
    body_token.map(|token| token.trim().to_string()).filter(|token| !token.is_empty())
}

fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let header = headers.get(COOKIE)?;
    let value = header.to_str().ok()?;
    for pair in value.split(';') {
        // Pairs without `=` are skipped, not fatal to the scan.
        let Some((key, val)) = pair.trim().split_once('=') else {
            continue;
        };
        if key.trim() == name {
            let val = val.trim();
            if !val.is_empty() {
                return Some(val.to_string());
            }
        }
    }
    None
}
