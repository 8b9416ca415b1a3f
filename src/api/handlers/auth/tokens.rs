//! Access and refresh token lifecycle.
//!
//! Access tokens are stateless HS256 JWTs; validity is signature + expiry
//! only, never a store lookup. Refresh tokens are opaque random secrets whose
//! SHA-256 hash is persisted with an absolute expiry and a terminal `revoked`
//! flag. Expiry is detected lazily at verification time and persisted as a
//! transition to revoked.

use anyhow::Result;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use super::storage::{
    insert_refresh_token, lookup_refresh_token, revoke_refresh_token_by_hash, RefreshTokenRecord,
};
use super::utils::{generate_refresh_secret, hash_refresh_secret};

/// Claims carried by an access token.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct Claims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

/// Signs and verifies access tokens.
pub(crate) struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_ttl_seconds: i64,
}

impl TokenService {
    pub(crate) fn new(secret: &str, access_ttl_seconds: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            access_ttl_seconds,
        }
    }

    /// Sign a short-lived access token for a user.
    pub(crate) fn issue_access_token(&self, user_id: Uuid) -> Result<String> {
        let now = chrono::Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            iat: now.timestamp(),
            exp: now.timestamp() + self.access_ttl_seconds,
        };
        encode(&Header::default(), &claims, &self.encoding_key).map_err(Into::into)
    }

    /// Verify signature and expiry; any failure collapses to `None` so the
    /// boundary never leaks why a credential was rejected.
    pub(crate) fn verify_access_token(&self, token: &str) -> Option<Uuid> {
        let validation = Validation::default();
        let data = decode::<Claims>(token, &self.decoding_key, &validation).ok()?;
        Uuid::parse_str(&data.claims.sub).ok()
    }
}

/// Issue a refresh token: persist the hash, hand back the raw secret once.
pub(crate) async fn issue_refresh_token(
    pool: &PgPool,
    user_id: Uuid,
    ttl_seconds: i64,
) -> Result<String> {
    let secret = generate_refresh_secret()?;
    let hash = hash_refresh_secret(&secret);
    insert_refresh_token(pool, user_id, &hash, ttl_seconds).await?;
    Ok(secret)
}

/// Resolve a presented secret to a live record.
///
/// Expired records are flipped to revoked (terminal) and treated as absent,
/// so an expired token can never mint an access token and is dead on arrival
/// for any later attempt.
pub(crate) async fn verify_refresh_token(
    pool: &PgPool,
    raw_secret: &str,
) -> Result<Option<RefreshTokenRecord>> {
    let hash = hash_refresh_secret(raw_secret);
    let Some(record) = lookup_refresh_token(pool, &hash).await? else {
        return Ok(None);
    };
    if record.expired {
        revoke_refresh_token_by_hash(pool, &hash).await?;
        return Ok(None);
    }
    Ok(Some(record))
}

/// Revoke the old secret (best-effort; absence is not fatal) and issue a fresh one.
pub(crate) async fn rotate_refresh_token(
    pool: &PgPool,
    old_raw_secret: &str,
    user_id: Uuid,
    ttl_seconds: i64,
) -> Result<String> {
    let old_hash = hash_refresh_secret(old_raw_secret);
    revoke_refresh_token_by_hash(pool, &old_hash).await?;
    issue_refresh_token(pool, user_id, ttl_seconds).await
}

/// Mark the matching record revoked. Idempotent: no matching row is fine.
pub(crate) async fn revoke_refresh_token(pool: &PgPool, raw_secret: &str) -> Result<()> {
    let hash = hash_refresh_secret(raw_secret);
    revoke_refresh_token_by_hash(pool, &hash).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_token_round_trips() {
        let service = TokenService::new("test-secret", 900);
        let user_id = Uuid::new_v4();
        let token = service.issue_access_token(user_id).unwrap();
        assert_eq!(service.verify_access_token(&token), Some(user_id));
    }

    #[test]
    fn access_token_rejects_wrong_secret() {
        let signer = TokenService::new("secret-one", 900);
        let verifier = TokenService::new("secret-two", 900);
        let token = signer.issue_access_token(Uuid::new_v4()).unwrap();
        assert_eq!(verifier.verify_access_token(&token), None);
    }

    #[test]
    fn access_token_rejects_garbage() {
        let service = TokenService::new("test-secret", 900);
        assert_eq!(service.verify_access_token("not-a-jwt"), None);
        assert_eq!(service.verify_access_token(""), None);
    }

    #[test]
    fn expired_access_token_is_rejected() {
        // Negative TTL puts exp in the past; default validation enforces exp.
        let service = TokenService::new("test-secret", -120);
        let token = service.issue_access_token(Uuid::new_v4()).unwrap();
        assert_eq!(service.verify_access_token(&token), None);
    }

    #[test]
    fn claims_serialize_with_expected_fields() {
        let claims = Claims {
            sub: Uuid::nil().to_string(),
            iat: 1,
            exp: 2,
        };
        let value = serde_json::to_value(&claims).unwrap();
        assert_eq!(
            value.get("sub").and_then(serde_json::Value::as_str),
            Some("00000000-0000-0000-0000-000000000000")
        );
        assert_eq!(value.get("exp").and_then(serde_json::Value::as_i64), Some(2));
    }
}
