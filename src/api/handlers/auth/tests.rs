//! Auth module tests.

use super::otp::{request_otp, verify_otp};
use super::storage::{
    active_challenge, consume_challenge, find_or_create_user, find_user_by_email,
    replace_challenge,
};
use super::tokens::{
    issue_refresh_token, revoke_refresh_token, rotate_refresh_token, verify_refresh_token,
};
use super::types::{RequestOtpRequest, VerifyOtpRequest};
use super::{require_auth, AuthConfig, AuthState};
use crate::api::email::{LogMailSender, MailSender};
use anyhow::{Context, Result};
use axum::{
    extract::Extension,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    Json,
};
use secrecy::SecretString;
use sqlx::{postgres::PgPoolOptions, Connection, PgConnection, PgPool, Row};
use std::sync::Arc;
use test_support::{postgres::PostgresContainer, runtime, TestNetwork};
use uuid::Uuid;

const SCHEMA_SQL: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/migrations/0001_init.sql"));

struct TestDb {
    _postgres: PostgresContainer,
    pool: PgPool,
}

impl TestDb {
    async fn new() -> Result<Self> {
        if let Err(err) = runtime::ensure_container_runtime() {
            eprintln!("Skipping integration test: {err}");
            return Err(err);
        }

        let network = TestNetwork::new("findex-auth");
        let postgres = PostgresContainer::start(network.name()).await?;
        postgres.wait_until_ready().await?;
        apply_schema(&postgres).await?;

        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(&postgres.admin_dsn())
            .await
            .context("failed to connect test pool")?;

        Ok(Self {
            _postgres: postgres,
            pool,
        })
    }
}

async fn apply_schema(postgres: &PostgresContainer) -> Result<()> {
    let mut connection = PgConnection::connect(&postgres.admin_dsn())
        .await
        .context("failed to connect for schema setup")?;

    for (index, statement) in split_sql_statements(SCHEMA_SQL).iter().enumerate() {
        sqlx::query(statement)
            .execute(&mut connection)
            .await
            .with_context(|| format!("failed to execute schema statement {}", index + 1))?;
    }

    Ok(())
}

fn split_sql_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();

    for line in sql.lines() {
        current.push_str(line);
        current.push('\n');

        if line.trim().ends_with(';') {
            let statement = current.trim();
            if !statement.is_empty() {
                statements.push(statement.to_string());
            }
            current.clear();
        }
    }

    let leftover = current.trim();
    if !leftover.is_empty() {
        statements.push(leftover.to_string());
    }

    statements
}

fn auth_state() -> Arc<AuthState> {
    let config = AuthConfig::new("http://localhost:3000".to_string())
        .with_access_token_secret(SecretString::from("test-secret".to_string()));
    Arc::new(AuthState::new(config))
}

#[test]
fn require_auth_accepts_valid_bearer() -> Result<()> {
    let state = auth_state();
    let user_id = Uuid::new_v4();
    let token = state.tokens().issue_access_token(user_id)?;

    let mut headers = HeaderMap::new();
    headers.insert(
        "authorization",
        HeaderValue::from_str(&format!("Bearer {token}"))?,
    );

    assert_eq!(require_auth(&headers, &state).ok(), Some(user_id));
    Ok(())
}

#[test]
fn require_auth_rejects_missing_and_garbage_uniformly() {
    let state = auth_state();

    let response = require_auth(&HeaderMap::new(), &state).unwrap_err();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let mut headers = HeaderMap::new();
    headers.insert("authorization", HeaderValue::from_static("Bearer junk"));
    let response = require_auth(&headers, &state).unwrap_err();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

async fn send_otp(db: &TestDb, state: &Arc<AuthState>, email: &str) -> StatusCode {
    let mailer: Arc<dyn MailSender> = Arc::new(LogMailSender);
    request_otp(
        Extension(db.pool.clone()),
        Extension(state.clone()),
        Extension(mailer),
        Some(Json(RequestOtpRequest {
            email: email.to_string(),
        })),
    )
    .await
    .into_response()
    .status()
}

async fn submit_otp(db: &TestDb, state: &Arc<AuthState>, email: &str, otp: &str) -> axum::response::Response {
    verify_otp(
        Extension(db.pool.clone()),
        Extension(state.clone()),
        Some(Json(VerifyOtpRequest {
            email: email.to_string(),
            otp: otp.to_string(),
        })),
    )
    .await
    .into_response()
}

#[tokio::test]
async fn first_request_creates_user_and_throttle_keeps_challenge() -> Result<()> {
    let Ok(db) = TestDb::new().await else {
        return Ok(());
    };
    let state = auth_state();
    let email = "throttle@example.com";

    assert_eq!(send_otp(&db, &state, email).await, StatusCode::OK);

    let user = find_user_by_email(&db.pool, email)
        .await?
        .context("user created on first contact")?;
    let first = active_challenge(&db.pool, user.id)
        .await?
        .context("challenge created on first contact")?;

    // Inside the cooldown the resend is refused and the row is untouched.
    assert_eq!(send_otp(&db, &state, email).await, StatusCode::TOO_MANY_REQUESTS);

    let after = active_challenge(&db.pool, user.id)
        .await?
        .context("challenge survives a throttled resend")?;
    assert_eq!(after.id, first.id);
    assert_eq!(after.code, first.code);
    Ok(())
}

#[tokio::test]
async fn verify_otp_is_single_use() -> Result<()> {
    let Ok(db) = TestDb::new().await else {
        return Ok(());
    };
    let state = auth_state();
    let email = "single@example.com";
    let user = find_or_create_user(&db.pool, email).await?;
    replace_challenge(&db.pool, user.id, "123456", 600).await?;

    let response = submit_otp(&db, &state, email, "123456").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), 64 * 1024).await?;
    let value: serde_json::Value = serde_json::from_slice(&body)?;
    assert_eq!(
        value["user"]["isEmailVerified"],
        serde_json::Value::Bool(true)
    );

    assert!(active_challenge(&db.pool, user.id).await?.is_none());

    // Replaying the consumed code finds no active challenge.
    let response = submit_otp(&db, &state, email, "123456").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn verify_otp_mismatch_keeps_challenge_until_correct() -> Result<()> {
    let Ok(db) = TestDb::new().await else {
        return Ok(());
    };
    let state = auth_state();
    let email = "mismatch@example.com";
    let user = find_or_create_user(&db.pool, email).await?;
    replace_challenge(&db.pool, user.id, "222222", 600).await?;

    let response = submit_otp(&db, &state, email, "111111").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(active_challenge(&db.pool, user.id).await?.is_some());

    let response = submit_otp(&db, &state, email, "222222").await;
    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn attempt_cap_discards_challenge() -> Result<()> {
    let Ok(db) = TestDb::new().await else {
        return Ok(());
    };
    let state = auth_state();
    let email = "capped@example.com";
    let user = find_or_create_user(&db.pool, email).await?;
    replace_challenge(&db.pool, user.id, "333333", 600).await?;

    for _ in 0..state.config().max_otp_attempts() {
        let response = submit_otp(&db, &state, email, "000001").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
    assert!(active_challenge(&db.pool, user.id).await?.is_none());

    // Even the correct code is dead once the cap discarded the challenge.
    let response = submit_otp(&db, &state, email, "333333").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn expired_challenge_never_verifies_and_is_deleted() -> Result<()> {
    let Ok(db) = TestDb::new().await else {
        return Ok(());
    };
    let state = auth_state();
    let email = "expired@example.com";
    let user = find_or_create_user(&db.pool, email).await?;
    replace_challenge(&db.pool, user.id, "444444", -1).await?;

    let response = submit_otp(&db, &state, email, "444444").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(active_challenge(&db.pool, user.id).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn consume_challenge_returns_updated_row() -> Result<()> {
    let Ok(db) = TestDb::new().await else {
        return Ok(());
    };
    let email = "consume@example.com";
    let user = find_or_create_user(&db.pool, email).await?;
    replace_challenge(&db.pool, user.id, "654321", 600).await?;
    let before = find_user_by_email(&db.pool, email)
        .await?
        .context("user present")?;

    tokio::time::sleep(std::time::Duration::from_millis(1100)).await;

    let challenge = active_challenge(&db.pool, user.id)
        .await?
        .context("challenge present")?;
    let updated = consume_challenge(&db.pool, user.id, challenge.id).await?;

    assert!(updated.email_verified);
    assert!(updated.otp_id.is_none());
    // ISO timestamps compare lexicographically.
    assert!(updated.updated_at > before.updated_at);
    Ok(())
}

#[tokio::test]
async fn refresh_token_hash_never_matches_raw_secret() -> Result<()> {
    let Ok(db) = TestDb::new().await else {
        return Ok(());
    };
    let user = find_or_create_user(&db.pool, "hash@example.com").await?;
    let secret = issue_refresh_token(&db.pool, user.id, 600).await?;

    let row = sqlx::query("SELECT token_hash FROM refresh_tokens WHERE user_id = $1")
        .bind(user.id)
        .fetch_one(&db.pool)
        .await?;
    let stored: Vec<u8> = row.get("token_hash");
    assert_ne!(stored, secret.as_bytes().to_vec());

    let record = verify_refresh_token(&db.pool, &secret)
        .await?
        .context("live token verifies")?;
    assert_eq!(record.user_id, user.id);
    Ok(())
}

#[tokio::test]
async fn expired_refresh_token_flips_to_revoked() -> Result<()> {
    let Ok(db) = TestDb::new().await else {
        return Ok(());
    };
    let user = find_or_create_user(&db.pool, "stale@example.com").await?;
    let secret = issue_refresh_token(&db.pool, user.id, -1).await?;

    assert!(verify_refresh_token(&db.pool, &secret).await?.is_none());

    let row = sqlx::query("SELECT revoked FROM refresh_tokens WHERE user_id = $1")
        .bind(user.id)
        .fetch_one(&db.pool)
        .await?;
    assert!(row.get::<bool, _>("revoked"));

    // Dead on arrival for any later attempt.
    assert!(verify_refresh_token(&db.pool, &secret).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn rotation_kills_the_old_secret() -> Result<()> {
    let Ok(db) = TestDb::new().await else {
        return Ok(());
    };
    let user = find_or_create_user(&db.pool, "rotate@example.com").await?;
    let old = issue_refresh_token(&db.pool, user.id, 600).await?;

    let new = rotate_refresh_token(&db.pool, &old, user.id, 600).await?;
    assert_ne!(old, new);

    assert!(verify_refresh_token(&db.pool, &old).await?.is_none());
    let record = verify_refresh_token(&db.pool, &new)
        .await?
        .context("rotated token verifies")?;
    assert_eq!(record.user_id, user.id);
    Ok(())
}

#[tokio::test]
async fn revocation_is_idempotent_and_terminal() -> Result<()> {
    let Ok(db) = TestDb::new().await else {
        return Ok(());
    };
    let user = find_or_create_user(&db.pool, "logout@example.com").await?;
    let secret = issue_refresh_token(&db.pool, user.id, 600).await?;

    revoke_refresh_token(&db.pool, &secret).await?;
    revoke_refresh_token(&db.pool, &secret).await?;

    assert!(verify_refresh_token(&db.pool, &secret).await?.is_none());
    Ok(())
}
