//! Auth configuration and shared state.

use secrecy::{ExposeSecret, SecretString};

use super::tokens::TokenService;

const DEFAULT_OTP_TTL_SECONDS: i64 = 10 * 60;
const DEFAULT_RESEND_COOLDOWN_SECONDS: i64 = 60;
const DEFAULT_ACCESS_TOKEN_TTL_SECONDS: i64 = 15 * 60;
const DEFAULT_REFRESH_TOKEN_TTL_SECONDS: i64 = 7 * 24 * 60 * 60;
const DEFAULT_MAX_OTP_ATTEMPTS: i32 = 5;

#[derive(Clone, Debug)]
pub struct AuthConfig {
    frontend_base_url: String,
    access_token_secret: SecretString,
    otp_ttl_seconds: i64,
    resend_cooldown_seconds: i64,
    access_token_ttl_seconds: i64,
    refresh_token_ttl_seconds: i64,
    max_otp_attempts: i32,
}

impl AuthConfig {
    #[must_use]
    pub fn new(frontend_base_url: String) -> Self {
        Self {
            frontend_base_url,
            access_token_secret: SecretString::default(),
            otp_ttl_seconds: DEFAULT_OTP_TTL_SECONDS,
            resend_cooldown_seconds: DEFAULT_RESEND_COOLDOWN_SECONDS,
            access_token_ttl_seconds: DEFAULT_ACCESS_TOKEN_TTL_SECONDS,
            refresh_token_ttl_seconds: DEFAULT_REFRESH_TOKEN_TTL_SECONDS,
            max_otp_attempts: DEFAULT_MAX_OTP_ATTEMPTS,
        }
    }

    #[must_use]
    pub fn with_access_token_secret(mut self, secret: SecretString) -> Self {
        self.access_token_secret = secret;
        self
    }

    #[must_use]
    pub fn with_otp_ttl_seconds(mut self, seconds: i64) -> Self {
        self.otp_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_resend_cooldown_seconds(mut self, seconds: i64) -> Self {
        self.resend_cooldown_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_access_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.access_token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_refresh_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.refresh_token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_max_otp_attempts(mut self, attempts: i32) -> Self {
        self.max_otp_attempts = attempts;
        self
    }

    pub(crate) fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    pub(super) fn otp_ttl_seconds(&self) -> i64 {
        self.otp_ttl_seconds
    }

    pub(super) fn resend_cooldown_seconds(&self) -> i64 {
        self.resend_cooldown_seconds
    }

    pub(super) fn access_token_ttl_seconds(&self) -> i64 {
        self.access_token_ttl_seconds
    }

    pub(super) fn refresh_token_ttl_seconds(&self) -> i64 {
        self.refresh_token_ttl_seconds
    }

    pub(super) fn max_otp_attempts(&self) -> i32 {
        self.max_otp_attempts
    }

    /// Only mark cookies secure when the frontend is served over HTTPS.
    pub(super) fn refresh_cookie_secure(&self) -> bool {
        self.frontend_base_url.starts_with("https://")
    }
}

pub struct AuthState {
    config: AuthConfig,
    tokens: TokenService,
}

impl AuthState {
    #[must_use]
    pub fn new(config: AuthConfig) -> Self {
        let tokens = TokenService::new(
            config.access_token_secret.expose_secret(),
            config.access_token_ttl_seconds,
        );
        Self { config, tokens }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub(crate) fn tokens(&self) -> &TokenService {
        &self.tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_config_defaults_and_overrides() {
        let config = AuthConfig::new("https://app.findex.dev".to_string());

        assert_eq!(config.frontend_base_url(), "https://app.findex.dev");
        assert_eq!(config.otp_ttl_seconds(), super::DEFAULT_OTP_TTL_SECONDS);
        assert_eq!(
            config.resend_cooldown_seconds(),
            super::DEFAULT_RESEND_COOLDOWN_SECONDS
        );
        assert_eq!(
            config.access_token_ttl_seconds(),
            super::DEFAULT_ACCESS_TOKEN_TTL_SECONDS
        );
        assert_eq!(
            config.refresh_token_ttl_seconds(),
            super::DEFAULT_REFRESH_TOKEN_TTL_SECONDS
        );
        assert_eq!(config.max_otp_attempts(), super::DEFAULT_MAX_OTP_ATTEMPTS);
        assert!(config.refresh_cookie_secure());

        let config = config
            .with_otp_ttl_seconds(120)
            .with_resend_cooldown_seconds(30)
            .with_access_token_ttl_seconds(60)
            .with_refresh_token_ttl_seconds(3600)
            .with_max_otp_attempts(3);

        assert_eq!(config.otp_ttl_seconds(), 120);
        assert_eq!(config.resend_cooldown_seconds(), 30);
        assert_eq!(config.access_token_ttl_seconds(), 60);
        assert_eq!(config.refresh_token_ttl_seconds(), 3600);
        assert_eq!(config.max_otp_attempts(), 3);
    }

    #[test]
    fn cookie_not_secure_over_http() {
        let config = AuthConfig::new("http://localhost:3000".to_string());
        assert!(!config.refresh_cookie_secure());
    }

    #[test]
    fn auth_state_signs_and_verifies_with_configured_secret() {
        let config = AuthConfig::new("http://localhost:3000".to_string())
            .with_access_token_secret(SecretString::from("test-secret".to_string()));
        let state = AuthState::new(config);
        let user_id = uuid::Uuid::new_v4();
        let token = state.tokens().issue_access_token(user_id).unwrap();
        assert_eq!(state.tokens().verify_access_token(&token), Some(user_id));
    }
}
