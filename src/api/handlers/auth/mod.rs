//! Email OTP auth: challenge issuance/verification, refresh sessions, tokens.

pub mod otp;
pub mod session;
pub mod state;
pub(crate) mod storage;
#[cfg(test)]
mod tests;
pub(crate) mod tokens;
pub mod types;
pub(crate) mod utils;

pub use state::{AuthConfig, AuthState};

use axum::{
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use types::MessageResponse;
use uuid::Uuid;

/// Build a `{message}` JSON response with the given status.
pub(crate) fn message_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(MessageResponse {
            message: message.to_string(),
        }),
    )
        .into_response()
}

/// Resolve the bearer access token to a user id.
///
/// Signature and expiry only; no store lookup. All failures collapse to 401
/// so the boundary never reveals whether a token was missing, malformed,
/// expired, or forged.
pub(crate) fn require_auth(headers: &HeaderMap, auth_state: &AuthState) -> Result<Uuid, Response> {
    utils::extract_bearer_token(headers)
        .and_then(|token| auth_state.tokens().verify_access_token(&token))
        .ok_or_else(|| message_response(StatusCode::UNAUTHORIZED, "Unauthorized"))
}
