//! Database helpers for users, OTP challenges, and refresh tokens.
//!
//! Expiry is enforced at point of use: queries compare `expires_at` against
//! `NOW()` and callers act on the result. No background sweep exists; a
//! storage-side TTL would only be a cleanup optimization.

use anyhow::{Context, Result};
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

/// Full user row, including the OTP back-reference.
///
/// The OTP link never leaves the service; responses are built from the
/// sanitized projection in `types.rs`.
#[derive(Debug, Clone)]
pub(crate) struct UserRecord {
    pub(crate) id: Uuid,
    pub(crate) email: String,
    pub(crate) full_name: String,
    pub(crate) college: String,
    pub(crate) branch: Option<String>,
    pub(crate) year: Option<i32>,
    pub(crate) roll_number: Option<String>,
    pub(crate) avatar: Option<String>,
    pub(crate) role: String,
    pub(crate) email_verified: bool,
    pub(crate) otp_id: Option<Uuid>,
    pub(crate) created_at: String,
    pub(crate) updated_at: String,
}

impl UserRecord {
    /// Profile still carries the placeholder values set at first contact.
    pub(crate) fn is_default_profile(&self) -> bool {
        self.full_name == "New User" || self.college.is_empty() || self.college == "Unknown"
    }
}

/// The active challenge for a user, with age/expiry resolved by the database
/// so the service never compares wall clocks.
#[derive(Debug)]
pub(crate) struct ChallengeRecord {
    pub(crate) id: Uuid,
    pub(crate) code: String,
    pub(crate) age_seconds: i64,
    pub(crate) expired: bool,
}

/// A non-revoked refresh token row; `expired` is resolved by the database.
#[derive(Debug)]
pub(crate) struct RefreshTokenRecord {
    pub(crate) user_id: Uuid,
    pub(crate) expired: bool,
}

fn user_from_row(row: &sqlx::postgres::PgRow) -> UserRecord {
    UserRecord {
        id: row.get("id"),
        email: row.get("email"),
        full_name: row.get("full_name"),
        college: row.get("college"),
        branch: row.get("branch"),
        year: row.get("year"),
        roll_number: row.get("roll_number"),
        avatar: row.get("avatar"),
        role: row.get("role"),
        email_verified: row.get("email_verified"),
        otp_id: row.get("otp_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

const USER_COLUMNS: &str = r#"
    id, email, full_name, college, branch, year, roll_number, avatar, role,
    email_verified, otp_id,
    to_char(created_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS created_at,
    to_char(updated_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS updated_at
"#;

pub(crate) async fn find_user_by_email(pool: &PgPool, email: &str) -> Result<Option<UserRecord>> {
    let query = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1 LIMIT 1");
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = %query
    );
    let row = sqlx::query(&query)
        .bind(email)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup user by email")?;
    Ok(row.as_ref().map(user_from_row))
}

pub(crate) async fn find_user_by_id(pool: &PgPool, user_id: Uuid) -> Result<Option<UserRecord>> {
    let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1 LIMIT 1");
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = %query
    );
    let row = sqlx::query(&query)
        .bind(user_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup user by id")?;
    Ok(row.as_ref().map(user_from_row))
}

/// First contact by email provisions an identity with placeholder profile
/// fields. Lost races on the unique email index fall back to the winner's row.
pub(crate) async fn find_or_create_user(pool: &PgPool, email: &str) -> Result<UserRecord> {
    if let Some(user) = find_user_by_email(pool, email).await? {
        return Ok(user);
    }

    let query = format!(
        r"
        INSERT INTO users (email, full_name, college)
        VALUES ($1, 'New User', 'Unknown')
        RETURNING {USER_COLUMNS}
    "
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = %query
    );
    let row = sqlx::query(&query)
        .bind(email)
        .fetch_one(pool)
        .instrument(span)
        .await;

    match row {
        Ok(row) => Ok(user_from_row(&row)),
        Err(err) if is_unique_violation(&err) => find_user_by_email(pool, email)
            .await?
            .context("user vanished after unique violation"),
        Err(err) => Err(err).context("failed to create user"),
    }
}

/// Resolve the user's active challenge through the `otp_id` link.
pub(crate) async fn active_challenge(
    pool: &PgPool,
    user_id: Uuid,
) -> Result<Option<ChallengeRecord>> {
    let query = r"
        SELECT otp_challenges.id, otp_challenges.code,
               EXTRACT(EPOCH FROM (NOW() - otp_challenges.created_at))::bigint AS age_seconds,
               (otp_challenges.expires_at <= NOW()) AS expired
        FROM users
        JOIN otp_challenges ON otp_challenges.id = users.otp_id
        WHERE users.id = $1
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(user_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup active challenge")?;

    Ok(row.map(|row| ChallengeRecord {
        id: row.get("id"),
        code: row.get("code"),
        age_seconds: row.get("age_seconds"),
        expired: row.get("expired"),
    }))
}

/// Replace any prior challenge with a fresh one and re-arm verification.
///
/// A new challenge implies re-verification is pending, so the user's
/// verification flag is reset in the same transaction.
pub(crate) async fn replace_challenge(
    pool: &PgPool,
    user_id: Uuid,
    code: &str,
    ttl_seconds: i64,
) -> Result<()> {
    let mut tx = pool.begin().await.context("begin challenge transaction")?;

    let query = "DELETE FROM otp_challenges WHERE user_id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to delete prior challenge")?;

    let query = r"
        INSERT INTO otp_challenges (user_id, code, expires_at)
        VALUES ($1, $2, NOW() + ($3 * INTERVAL '1 second'))
        RETURNING id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(user_id)
        .bind(code)
        .bind(ttl_seconds)
        .fetch_one(&mut *tx)
        .instrument(span)
        .await
        .context("failed to insert challenge")?;
    let challenge_id: Uuid = row.get("id");

    let query = r"
        UPDATE users
        SET otp_id = $2, email_verified = false, updated_at = NOW()
        WHERE id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(challenge_id)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to link challenge to user")?;

    tx.commit().await.context("commit challenge transaction")?;
    Ok(())
}

/// Delete a challenge and clear the user's link, without touching the
/// verification flag. Used for expiry cleanup and the attempt cap.
pub(crate) async fn discard_challenge(
    pool: &PgPool,
    user_id: Uuid,
    challenge_id: Uuid,
) -> Result<()> {
    let mut tx = pool.begin().await.context("begin discard transaction")?;

    let query = "DELETE FROM otp_challenges WHERE id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(challenge_id)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to delete challenge")?;

    let query = "UPDATE users SET otp_id = NULL, updated_at = NOW() WHERE id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to clear challenge link")?;

    tx.commit().await.context("commit discard transaction")?;
    Ok(())
}

/// Consume a successfully verified challenge: delete it, clear the link, and
/// mark the user verified, all in one transaction. Returns the updated user
/// row so responses carry the post-update projection.
pub(crate) async fn consume_challenge(
    pool: &PgPool,
    user_id: Uuid,
    challenge_id: Uuid,
) -> Result<UserRecord> {
    let mut tx = pool.begin().await.context("begin consume transaction")?;

    let query = "DELETE FROM otp_challenges WHERE id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(challenge_id)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to delete challenge")?;

    let query = format!(
        r"
        UPDATE users
        SET otp_id = NULL, email_verified = true, updated_at = NOW()
        WHERE id = $1
        RETURNING {USER_COLUMNS}
    "
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = %query
    );
    let row = sqlx::query(&query)
        .bind(user_id)
        .fetch_one(&mut *tx)
        .instrument(span)
        .await
        .context("failed to mark user verified")?;

    tx.commit().await.context("commit consume transaction")?;
    Ok(user_from_row(&row))
}

/// Count a mismatch against the challenge; returns the updated attempt count.
pub(crate) async fn record_otp_mismatch(pool: &PgPool, challenge_id: Uuid) -> Result<i32> {
    let query = r"
        UPDATE otp_challenges
        SET attempts = attempts + 1
        WHERE id = $1
        RETURNING attempts
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(challenge_id)
        .fetch_one(pool)
        .instrument(span)
        .await
        .context("failed to record OTP mismatch")?;
    Ok(row.get("attempts"))
}

/// Persist only the hash of a refresh secret; the raw value goes back to the
/// caller exactly once.
pub(crate) async fn insert_refresh_token(
    pool: &PgPool,
    user_id: Uuid,
    token_hash: &[u8],
    ttl_seconds: i64,
) -> Result<()> {
    let query = r"
        INSERT INTO refresh_tokens (user_id, token_hash, expires_at)
        VALUES ($1, $2, NOW() + ($3 * INTERVAL '1 second'))
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(token_hash)
        .bind(ttl_seconds)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to insert refresh token")?;
    Ok(())
}

/// Look up a non-revoked refresh token by hash. Expiry is reported, not
/// filtered, so the caller can persist the transition to revoked.
pub(crate) async fn lookup_refresh_token(
    pool: &PgPool,
    token_hash: &[u8],
) -> Result<Option<RefreshTokenRecord>> {
    let query = r"
        SELECT user_id, (expires_at <= NOW()) AS expired
        FROM refresh_tokens
        WHERE token_hash = $1 AND revoked = false
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(token_hash)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup refresh token")?;

    Ok(row.map(|row| RefreshTokenRecord {
        user_id: row.get("user_id"),
        expired: row.get("expired"),
    }))
}

/// Revocation is terminal and idempotent; zero matched rows is not an error.
pub(crate) async fn revoke_refresh_token_by_hash(pool: &PgPool, token_hash: &[u8]) -> Result<()> {
    let query = r"
        UPDATE refresh_tokens
        SET revoked = true
        WHERE token_hash = $1 AND revoked = false
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(token_hash)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to revoke refresh token")?;
    Ok(())
}

/// Apply a profile update. `full_name` and `college` are required by the
/// handler; the optional fields keep their prior value when absent.
/// Completing setup marks the user verified.
pub(crate) async fn update_profile(
    pool: &PgPool,
    user_id: Uuid,
    full_name: &str,
    college: &str,
    branch: Option<&str>,
    year: Option<i32>,
    roll_number: Option<&str>,
    avatar: Option<&str>,
) -> Result<Option<UserRecord>> {
    let query = format!(
        r"
        UPDATE users
        SET full_name = $1,
            college = $2,
            branch = COALESCE($3, branch),
            year = COALESCE($4, year),
            roll_number = COALESCE($5, roll_number),
            avatar = COALESCE($6, avatar),
            email_verified = true,
            updated_at = NOW()
        WHERE id = $7
        RETURNING {USER_COLUMNS}
    "
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = %query
    );
    let row = sqlx::query(&query)
        .bind(full_name)
        .bind(college)
        .bind(branch)
        .bind(year)
        .bind(roll_number)
        .bind(avatar)
        .bind(user_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to update profile")?;
    Ok(row.as_ref().map(user_from_row))
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_profile_detection() {
        let mut user = UserRecord {
            id: Uuid::nil(),
            email: "a@x.com".to_string(),
            full_name: "New User".to_string(),
            college: "Unknown".to_string(),
            branch: None,
            year: None,
            roll_number: None,
            avatar: None,
            role: "student".to_string(),
            email_verified: false,
            otp_id: None,
            created_at: "2026-01-01T00:00:00Z".to_string(),
            updated_at: "2026-01-01T00:00:00Z".to_string(),
        };
        assert!(user.is_default_profile());

        user.full_name = "Alice".to_string();
        assert!(user.is_default_profile());

        user.college = "X".to_string();
        assert!(!user.is_default_profile());

        user.college = String::new();
        assert!(user.is_default_profile());
    }

    #[test]
    fn is_unique_violation_ignores_non_database_errors() {
        assert!(!is_unique_violation(&sqlx::Error::RowNotFound));
    }

    #[test]
    fn user_columns_exclude_nothing_needed_by_projection() {
        for column in [
            "full_name",
            "college",
            "branch",
            "year",
            "roll_number",
            "avatar",
            "role",
            "email_verified",
            "created_at",
            "updated_at",
        ] {
            assert!(USER_COLUMNS.contains(column), "missing {column}");
        }
    }
}
