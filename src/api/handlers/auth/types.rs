//! Request/response types for auth endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::storage::UserRecord;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RequestOtpRequest {
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct VerifyOtpRequest {
    pub email: String,
    pub otp: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct MessageResponse {
    pub message: String,
}

/// Sanitized user projection. The OTP link field never appears here.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub full_name: String,
    pub college: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roll_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    pub role: String,
    pub is_email_verified: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl From<&UserRecord> for UserResponse {
    fn from(user: &UserRecord) -> Self {
        Self {
            id: user.id.to_string(),
            email: user.email.clone(),
            full_name: user.full_name.clone(),
            college: user.college.clone(),
            branch: user.branch.clone(),
            year: user.year,
            roll_number: user.roll_number.clone(),
            avatar: user.avatar.clone(),
            role: user.role.clone(),
            is_email_verified: user.email_verified,
            created_at: user.created_at.clone(),
            updated_at: user.updated_at.clone(),
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct VerifyOtpResponse {
    pub message: String,
    pub access_token: String,
    pub user: UserResponse,
    pub redirect_to_profile_setup: bool,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub access_token: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ProfileRequest {
    pub full_name: Option<String>,
    pub college: Option<String>,
    pub branch: Option<String>,
    pub year: Option<i32>,
    pub roll_number: Option<String>,
    pub avatar: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ProfileResponse {
    pub message: String,
    pub user: UserResponse,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct MeResponse {
    pub user: UserResponse,
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Context, Result};
    use uuid::Uuid;

    fn sample_user() -> UserRecord {
        UserRecord {
            id: Uuid::nil(),
            email: "a@x.com".to_string(),
            full_name: "Alice".to_string(),
            college: "X".to_string(),
            branch: None,
            year: Some(3),
            roll_number: None,
            avatar: None,
            role: "student".to_string(),
            email_verified: true,
            otp_id: Some(Uuid::new_v4()),
            created_at: "2026-01-01T00:00:00Z".to_string(),
            updated_at: "2026-01-02T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn user_response_uses_camel_case_and_drops_otp_link() -> Result<()> {
        let response = UserResponse::from(&sample_user());
        let value = serde_json::to_value(&response)?;

        assert_eq!(
            value.get("fullName").and_then(serde_json::Value::as_str),
            Some("Alice")
        );
        assert_eq!(
            value
                .get("isEmailVerified")
                .and_then(serde_json::Value::as_bool),
            Some(true)
        );
        assert!(value.get("otpId").is_none());
        assert!(value.get("otp_id").is_none());
        // Unset optionals are omitted entirely.
        assert!(value.get("branch").is_none());
        assert_eq!(value.get("year").and_then(serde_json::Value::as_i64), Some(3));
        Ok(())
    }

    #[test]
    fn refresh_request_accepts_missing_token() -> Result<()> {
        let request: RefreshRequest = serde_json::from_value(serde_json::json!({}))?;
        assert!(request.refresh_token.is_none());

        let request: RefreshRequest =
            serde_json::from_value(serde_json::json!({"refreshToken": "abc"}))?;
        assert_eq!(request.refresh_token.as_deref(), Some("abc"));
        Ok(())
    }

    #[test]
    fn profile_request_rejects_unknown_fields() {
        let result: Result<ProfileRequest, _> =
            serde_json::from_value(serde_json::json!({"fullName": "A", "isAdmin": true}));
        assert!(result.is_err());
    }

    #[test]
    fn verify_otp_response_round_trips() -> Result<()> {
        let response = VerifyOtpResponse {
            message: "OTP verified successfully".to_string(),
            access_token: "jwt".to_string(),
            user: UserResponse::from(&sample_user()),
            redirect_to_profile_setup: false,
        };
        let value = serde_json::to_value(&response)?;
        let token = value
            .get("accessToken")
            .and_then(serde_json::Value::as_str)
            .context("missing accessToken")?;
        assert_eq!(token, "jwt");
        assert_eq!(
            value
                .get("redirectToProfileSetup")
                .and_then(serde_json::Value::as_bool),
            Some(false)
        );
        Ok(())
    }
}
