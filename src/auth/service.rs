use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::email::Mailer;

use super::engine::{is_unique_violation, AuthEngine, EngineError, Session, TokenKind, User};
use super::password;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    email.len() <= 255 && EMAIL_RE.is_match(email)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthErrorCode {
    InvalidCredentials,
    UserExists,
    EmailNotVerified,
    Unknown,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthFailure {
    pub code: AuthErrorCode,
    pub message: String,
}

pub type AuthResult<T> = Result<T, AuthFailure>;

fn failure(code: AuthErrorCode) -> AuthFailure {
    let message = match code {
        AuthErrorCode::InvalidCredentials => "Invalid email or password",
        AuthErrorCode::UserExists => "An account with this email already exists",
        AuthErrorCode::EmailNotVerified => "Please verify your email address before signing in",
        AuthErrorCode::Unknown => "Something went wrong. Please try again.",
    };
    AuthFailure {
        code,
        message: message.to_string(),
    }
}

/// Single point where engine errors are folded into the closed taxonomy.
/// Structured signals win (the engine's own variants, then the SQLSTATE code
/// inside [`is_unique_violation`]); string matching is the last resort there.
fn classify_sign_up_error(err: &EngineError) -> AuthFailure {
    match err {
        EngineError::UserExists => failure(AuthErrorCode::UserExists),
        EngineError::Database(db) if is_unique_violation(db) => failure(AuthErrorCode::UserExists),
        _ => failure(AuthErrorCode::Unknown),
    }
}

const VERIFICATION_TOKEN_TTL: Duration = Duration::hours(24);
const RESET_TOKEN_TTL: Duration = Duration::hours(1);

lazy_static! {
    // Sign-in burns a verification against this hash when the account does
    // not exist, so unknown emails cost the same as wrong passwords and the
    // two cannot be told apart by response time.
    static ref DUMMY_HASH: String =
        password::hash_password("not-a-real-password").unwrap_or_default();
}

#[derive(Clone)]
pub struct AuthService {
    engine: AuthEngine,
    mailer: Arc<dyn Mailer>,
    base_url: String,
}

impl AuthService {
    pub fn new(engine: AuthEngine, mailer: Arc<dyn Mailer>, base_url: String) -> Self {
        Self {
            engine,
            mailer,
            base_url,
        }
    }

    /// Register a new account and send the verification email. No session is
    /// issued until the address is verified.
    pub async fn sign_up(&self, email: &str, password: &str, name: &str) -> AuthResult<User> {
        let user = match self.engine.create_user(email, name, password).await {
            Ok(u) => u,
            Err(e) => {
                warn!(error = %e, "sign-up failed");
                return Err(classify_sign_up_error(&e));
            }
        };

        if let Err(e) = self.send_verification(&user).await {
            // The account exists either way; the user can request a resend.
            error!(error = %e, user_id = %user.id, "failed to send verification email");
        }

        info!(user_id = %user.id, email = %user.email, "user registered");
        Ok(user)
    }

    /// Authenticate with email and password. Unknown accounts and wrong
    /// passwords both collapse into `INVALID_CREDENTIALS` so the endpoint
    /// cannot be used to enumerate accounts.
    pub async fn sign_in(&self, email: &str, password: &str) -> AuthResult<(User, Session)> {
        let user = match self.engine.find_user_by_email(email).await {
            Ok(Some(u)) => u,
            Ok(None) => {
                let _ = password::verify_password(password, &DUMMY_HASH);
                return Err(failure(AuthErrorCode::InvalidCredentials));
            }
            Err(e) => {
                error!(error = %e, "sign-in lookup failed");
                let _ = password::verify_password(password, &DUMMY_HASH);
                return Err(failure(AuthErrorCode::InvalidCredentials));
            }
        };

        let ok = password::verify_password(password, &user.password_hash).unwrap_or(false);
        if !ok {
            warn!(user_id = %user.id, "sign-in with invalid password");
            return Err(failure(AuthErrorCode::InvalidCredentials));
        }

        if !user.email_verified {
            return Err(failure(AuthErrorCode::EmailNotVerified));
        }

        match self.engine.create_session(user.id).await {
            Ok(session) => {
                info!(user_id = %user.id, "user signed in");
                Ok((user, session))
            }
            Err(e) => {
                error!(error = %e, user_id = %user.id, "session creation failed");
                Err(failure(AuthErrorCode::Unknown))
            }
        }
    }

    /// Best-effort: a failed logout never surfaces to the caller.
    pub async fn sign_out(&self, token: &str) {
        if let Err(e) = self.engine.delete_session(token).await {
            warn!(error = %e, "sign-out failed");
        }
    }

    /// Resolve the session behind a cookie token. Lookup errors are treated
    /// as no-session: authorization fails closed.
    pub async fn get_session(&self, token: &str) -> Option<(User, Session)> {
        match self.engine.session_by_token(token).await {
            Ok(found) => found,
            Err(e) => {
                warn!(error = %e, "session lookup failed, treating as unauthenticated");
                None
            }
        }
    }

    /// Always reports success to the caller; only an existing account
    /// triggers an email, so nothing leaks about which emails are registered.
    pub async fn request_password_reset(&self, email: &str) {
        match self.engine.find_user_by_email(email).await {
            Ok(Some(user)) => {
                if let Err(e) = self.send_reset(&user).await {
                    error!(error = %e, user_id = %user.id, "failed to send reset email");
                }
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "password reset lookup failed"),
        }
    }

    pub async fn verify_email(&self, token: &str) -> AuthResult<()> {
        let email = match self
            .engine
            .consume_token(token, TokenKind::EmailVerification)
            .await
        {
            Ok(email) => email,
            Err(EngineError::InvalidToken) => {
                return Err(AuthFailure {
                    code: AuthErrorCode::Unknown,
                    message: "Invalid or expired verification link".into(),
                })
            }
            Err(e) => {
                error!(error = %e, "verification token lookup failed");
                return Err(failure(AuthErrorCode::Unknown));
            }
        };

        if let Err(e) = self.engine.mark_email_verified(&email).await {
            error!(error = %e, email, "failed to mark email verified");
            return Err(failure(AuthErrorCode::Unknown));
        }

        info!(email, "email verified");
        Ok(())
    }

    pub async fn reset_password(&self, token: &str, new_password: &str) -> AuthResult<()> {
        let email = match self
            .engine
            .consume_token(token, TokenKind::PasswordReset)
            .await
        {
            Ok(email) => email,
            Err(EngineError::InvalidToken) => {
                return Err(AuthFailure {
                    code: AuthErrorCode::Unknown,
                    message: "Invalid or expired reset link".into(),
                })
            }
            Err(e) => {
                error!(error = %e, "reset token lookup failed");
                return Err(failure(AuthErrorCode::Unknown));
            }
        };

        let user = match self.engine.find_user_by_email(&email).await {
            Ok(Some(u)) => u,
            _ => return Err(failure(AuthErrorCode::Unknown)),
        };

        if let Err(e) = self.engine.update_password(user.id, new_password).await {
            error!(error = %e, user_id = %user.id, "password update failed");
            return Err(failure(AuthErrorCode::Unknown));
        }

        // A reset revokes every live session for the account.
        if let Err(e) = self.engine.delete_sessions_for_user(user.id).await {
            warn!(error = %e, user_id = %user.id, "failed to revoke sessions after reset");
        }

        info!(user_id = %user.id, "password reset");
        Ok(())
    }

    /// Startup housekeeping: drop expired sessions and tokens so the tables
    /// do not grow without bound. Best-effort.
    pub async fn purge_expired(&self) {
        match self.engine.purge_expired().await {
            Ok((sessions, tokens)) => {
                info!(sessions, tokens, "purged expired sessions and tokens")
            }
            Err(e) => warn!(error = %e, "failed to purge expired sessions and tokens"),
        }
    }

    /// Keep the auth identity's display name in sync after onboarding.
    pub async fn update_user_name(&self, user_id: Uuid, name: &str) {
        if let Err(e) = self.engine.update_user_name(user_id, name).await {
            warn!(error = %e, user_id = %user_id, "failed to update user name");
        }
    }

    async fn send_verification(&self, user: &User) -> anyhow::Result<()> {
        let token = self
            .engine
            .create_token(&user.email, TokenKind::EmailVerification, VERIFICATION_TOKEN_TTL)
            .await?;
        let url = format!("{}/api/auth/verify-email?token={}", self.base_url, token);
        self.mailer
            .send_verification_email(&user.email, &user.name, &url)
            .await
    }

    async fn send_reset(&self, user: &User) -> anyhow::Result<()> {
        let token = self
            .engine
            .create_token(&user.email, TokenKind::PasswordReset, RESET_TOKEN_TTL)
            .await?;
        let url = format!("{}/reset-password?token={}", self.base_url, token);
        self.mailer
            .send_password_reset_email(&user.email, &user.name, &url)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_validation() {
        assert!(is_valid_email("a@x.com"));
        assert!(is_valid_email("first.last+tag@sub.example.org"));
        assert!(!is_valid_email("not-an-email"));
        assert!(!is_valid_email("two@@x.com"));
        assert!(!is_valid_email("spaces in@x.com"));
        let long = format!("{}@x.com", "a".repeat(260));
        assert!(!is_valid_email(&long));
    }

    #[test]
    fn error_codes_serialize_screaming_snake() {
        assert_eq!(
            serde_json::to_string(&AuthErrorCode::InvalidCredentials).unwrap(),
            "\"INVALID_CREDENTIALS\""
        );
        assert_eq!(
            serde_json::to_string(&AuthErrorCode::EmailNotVerified).unwrap(),
            "\"EMAIL_NOT_VERIFIED\""
        );
    }

    #[test]
    fn dummy_hash_is_well_formed_and_matches_nothing() {
        // The unknown-account branch must be able to run a real argon2
        // verification against it.
        assert!(DUMMY_HASH.starts_with("$argon2"));
        assert!(!password::verify_password("anything", &DUMMY_HASH).unwrap());
        assert!(!password::verify_password("", &DUMMY_HASH).unwrap());
    }

    #[test]
    fn sign_up_errors_classify_structurally() {
        let f = classify_sign_up_error(&EngineError::UserExists);
        assert_eq!(f.code, AuthErrorCode::UserExists);

        let f = classify_sign_up_error(&EngineError::Hash("boom".into()));
        assert_eq!(f.code, AuthErrorCode::Unknown);

        let f = classify_sign_up_error(&EngineError::Database(sqlx::Error::RowNotFound));
        assert_eq!(f.code, AuthErrorCode::Unknown);
    }
}
