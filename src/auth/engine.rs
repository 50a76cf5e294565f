//! The authentication engine: credential storage, opaque session tokens and
//! single-use verification/reset tokens, all backed by Postgres. The rest of
//! the application talks to it through [`super::service::AuthService`], which
//! owns the translation into the public error taxonomy.

use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use super::password;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub email_verified: bool,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub image: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(skip_serializing)]
    pub token: String,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    EmailVerification,
    PasswordReset,
}

impl TokenKind {
    fn as_str(self) -> &'static str {
        match self {
            TokenKind::EmailVerification => "email_verification",
            TokenKind::PasswordReset => "password_reset",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("an account with this email already exists")]
    UserExists,
    #[error("invalid or expired token")]
    InvalidToken,
    #[error("password hashing failed: {0}")]
    Hash(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Detect a unique-constraint violation. The SQLSTATE code is the structured
/// signal; the message match is a fallback for drivers that do not report it.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    let Some(db) = err.as_database_error() else {
        return false;
    };
    if db.code().as_deref() == Some("23505") {
        return true;
    }
    let msg = db.message().to_lowercase();
    msg.contains("unique constraint") || msg.contains("duplicate key")
}

fn random_token(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

const USER_COLUMNS: &str =
    "id, name, email, email_verified, password_hash, image, created_at, updated_at";
const SESSION_COLUMNS: &str = "id, user_id, token, expires_at, created_at, updated_at";

#[derive(Clone)]
pub struct AuthEngine {
    db: PgPool,
    session_ttl: Duration,
}

impl AuthEngine {
    pub fn new(db: PgPool, session_ttl_days: i64) -> Self {
        Self {
            db,
            session_ttl: Duration::days(session_ttl_days),
        }
    }

    pub async fn create_user(
        &self,
        email: &str,
        name: &str,
        password: &str,
    ) -> Result<User, EngineError> {
        let hash = password::hash_password(password).map_err(|e| EngineError::Hash(e.to_string()))?;
        sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (name, email, password_hash) VALUES ($1, $2, $3) RETURNING {USER_COLUMNS}"
        ))
        .bind(name)
        .bind(email)
        .bind(&hash)
        .fetch_one(&self.db)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                EngineError::UserExists
            } else {
                EngineError::Database(e)
            }
        })
    }

    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, EngineError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    pub async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, EngineError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    pub async fn create_session(&self, user_id: Uuid) -> Result<Session, EngineError> {
        let token = random_token(40);
        let expires_at = OffsetDateTime::now_utc() + self.session_ttl;
        let session = sqlx::query_as::<_, Session>(&format!(
            "INSERT INTO sessions (user_id, token, expires_at) VALUES ($1, $2, $3) RETURNING {SESSION_COLUMNS}"
        ))
        .bind(user_id)
        .bind(&token)
        .bind(expires_at)
        .fetch_one(&self.db)
        .await?;
        Ok(session)
    }

    /// Look up an unexpired session and its user by the opaque cookie token.
    pub async fn session_by_token(
        &self,
        token: &str,
    ) -> Result<Option<(User, Session)>, EngineError> {
        let session = sqlx::query_as::<_, Session>(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE token = $1 AND expires_at > now()"
        ))
        .bind(token)
        .fetch_optional(&self.db)
        .await?;

        let Some(session) = session else {
            return Ok(None);
        };
        let user = self.find_user_by_id(session.user_id).await?;
        Ok(user.map(|u| (u, session)))
    }

    pub async fn delete_session(&self, token: &str) -> Result<(), EngineError> {
        sqlx::query("DELETE FROM sessions WHERE token = $1")
            .bind(token)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    pub async fn delete_sessions_for_user(&self, user_id: Uuid) -> Result<(), EngineError> {
        sqlx::query("DELETE FROM sessions WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    pub async fn create_token(
        &self,
        identifier: &str,
        kind: TokenKind,
        ttl: Duration,
    ) -> Result<String, EngineError> {
        let value = random_token(48);
        let expires_at = OffsetDateTime::now_utc() + ttl;
        sqlx::query(
            "INSERT INTO verification_tokens (identifier, value, kind, expires_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(identifier)
        .bind(&value)
        .bind(kind.as_str())
        .bind(expires_at)
        .execute(&self.db)
        .await?;
        Ok(value)
    }

    /// Redeem a token: single-use, so the row is deleted on success.
    pub async fn consume_token(&self, value: &str, kind: TokenKind) -> Result<String, EngineError> {
        let row: Option<(String,)> = sqlx::query_as(
            "DELETE FROM verification_tokens WHERE value = $1 AND kind = $2 AND expires_at > now() RETURNING identifier",
        )
        .bind(value)
        .bind(kind.as_str())
        .fetch_optional(&self.db)
        .await?;
        row.map(|(identifier,)| identifier)
            .ok_or(EngineError::InvalidToken)
    }

    pub async fn mark_email_verified(&self, email: &str) -> Result<(), EngineError> {
        sqlx::query("UPDATE users SET email_verified = TRUE, updated_at = now() WHERE email = $1")
            .bind(email)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    pub async fn update_password(&self, user_id: Uuid, password: &str) -> Result<(), EngineError> {
        let hash = password::hash_password(password).map_err(|e| EngineError::Hash(e.to_string()))?;
        sqlx::query("UPDATE users SET password_hash = $2, updated_at = now() WHERE id = $1")
            .bind(user_id)
            .bind(&hash)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    /// Sweep expired sessions and verification tokens. Lookups already
    /// filter on `expires_at`, so this only reclaims space.
    pub async fn purge_expired(&self) -> Result<(u64, u64), EngineError> {
        let sessions = sqlx::query("DELETE FROM sessions WHERE expires_at <= now()")
            .execute(&self.db)
            .await?
            .rows_affected();
        let tokens = sqlx::query("DELETE FROM verification_tokens WHERE expires_at <= now()")
            .execute(&self.db)
            .await?
            .rows_affected();
        Ok((sessions, tokens))
    }

    pub async fn update_user_name(&self, user_id: Uuid, name: &str) -> Result<(), EngineError> {
        sqlx::query("UPDATE users SET name = $2, updated_at = now() WHERE id = $1")
            .bind(user_id)
            .bind(name)
            .execute(&self.db)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_tokens_are_distinct_and_sized() {
        let a = random_token(40);
        let b = random_token(40);
        assert_eq!(a.len(), 40);
        assert_ne!(a, b);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn token_kind_maps_to_column_values() {
        assert_eq!(TokenKind::EmailVerification.as_str(), "email_verification");
        assert_eq!(TokenKind::PasswordReset.as_str(), "password_reset");
    }

    #[test]
    fn non_database_errors_are_not_unique_violations() {
        assert!(!is_unique_violation(&sqlx::Error::RowNotFound));
    }
}
