use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{AppendHeaders, IntoResponse, Redirect},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use time::format_description::well_known::Rfc3339;
use tracing::instrument;

use crate::{cookies, gate::safe_redirect, state::AppState};

use super::{
    dto::{
        ForgotPasswordRequest, PublicUser, ResetPasswordRequest, SignInRequest, SignInResponse,
        SignUpRequest,
    },
    service::{is_valid_email, AuthErrorCode, AuthFailure},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/sign-up/email", post(sign_up))
        .route("/sign-in/email", post(sign_in))
        .route("/sign-out", post(sign_out))
        .route("/verify-email", get(verify_email))
        .route("/forgot-password", post(forgot_password))
        .route("/reset-password", post(reset_password))
        .route("/test", get(session_test))
}

fn session_cookie(state: &AppState) -> cookies::CookieOptions {
    let session = &state.config.session;
    cookies::CookieOptions {
        name: session.cookie_name.clone(),
        secure: session.cookie_secure,
        max_age_secs: session.ttl_days * 24 * 60 * 60,
    }
}

fn map_auth_failure(f: AuthFailure) -> (StatusCode, String) {
    let status = match f.code {
        AuthErrorCode::InvalidCredentials | AuthErrorCode::UserExists => StatusCode::BAD_REQUEST,
        AuthErrorCode::EmailNotVerified => StatusCode::FORBIDDEN,
        AuthErrorCode::Unknown => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, f.message)
}

#[instrument(skip(state, payload))]
async fn sign_up(
    State(state): State<AppState>,
    Json(mut payload): Json<SignUpRequest>,
) -> Result<(StatusCode, Json<PublicUser>), (StatusCode, String)> {
    payload.email = payload.email.trim().to_lowercase();

    if !is_valid_email(&payload.email) {
        return Err((StatusCode::BAD_REQUEST, "Please enter a valid email".into()));
    }
    if payload.password.len() < 8 {
        return Err((
            StatusCode::BAD_REQUEST,
            "Password must be at least 8 characters".into(),
        ));
    }
    if payload.password.len() > 128 {
        return Err((StatusCode::BAD_REQUEST, "Password is too long".into()));
    }

    let name = payload
        .name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| {
            payload
                .email
                .split('@')
                .next()
                .unwrap_or("User")
                .to_string()
        });

    let user = state
        .auth
        .sign_up(&payload.email, &payload.password, &name)
        .await
        .map_err(map_auth_failure)?;

    Ok((StatusCode::CREATED, Json(PublicUser::from(&user))))
}

#[instrument(skip(state, payload))]
async fn sign_in(
    State(state): State<AppState>,
    Json(mut payload): Json<SignInRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    payload.email = payload.email.trim().to_lowercase();

    if !is_valid_email(&payload.email) {
        return Err((StatusCode::BAD_REQUEST, "Please enter a valid email".into()));
    }
    if payload.password.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Password is required".into()));
    }

    let (user, session) = state
        .auth
        .sign_in(&payload.email, &payload.password)
        .await
        .map_err(map_auth_failure)?;

    let redirect = safe_redirect(payload.redirect_to.as_deref(), "/dashboard");
    let cookie = session_cookie(&state).build_set_cookie(&session.token);

    Ok((
        AppendHeaders([(header::SET_COOKIE, cookie)]),
        Json(SignInResponse {
            user: PublicUser::from(&user),
            redirect,
        }),
    ))
}

/// Idempotent: clears the cookie and reports success even when the session
/// was already gone.
#[instrument(skip(state, headers))]
async fn sign_out(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    if let Some(token) = cookies::extract_cookie(&headers, &state.config.session.cookie_name) {
        state.auth.sign_out(&token).await;
    }
    let cookie = session_cookie(&state).build_delete_cookie();
    (
        AppendHeaders([(header::SET_COOKIE, cookie)]),
        Json(json!({ "success": true })),
    )
}

#[derive(Debug, Deserialize)]
struct VerifyEmailQuery {
    token: Option<String>,
}

#[instrument(skip(state, query))]
async fn verify_email(
    State(state): State<AppState>,
    Query(query): Query<VerifyEmailQuery>,
) -> Redirect {
    let Some(token) = query.token else {
        return Redirect::to("/verify-email?error=invalid_token");
    };
    match state.auth.verify_email(&token).await {
        Ok(()) => Redirect::to("/login?verified=true"),
        Err(_) => Redirect::to("/verify-email?error=invalid_token"),
    }
}

/// Always answers success so the endpoint cannot be used to probe for
/// registered addresses.
#[instrument(skip(state, payload))]
async fn forgot_password(
    State(state): State<AppState>,
    Json(payload): Json<ForgotPasswordRequest>,
) -> Json<serde_json::Value> {
    let email = payload.email.trim().to_lowercase();
    if is_valid_email(&email) {
        state.auth.request_password_reset(&email).await;
    }
    Json(json!({ "success": true }))
}

#[instrument(skip(state, payload))]
async fn reset_password(
    State(state): State<AppState>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    if payload.password.len() < 8 {
        return Err((
            StatusCode::BAD_REQUEST,
            "Password must be at least 8 characters".into(),
        ));
    }
    if payload.password.len() > 128 {
        return Err((StatusCode::BAD_REQUEST, "Password is too long".into()));
    }

    state
        .auth
        .reset_password(&payload.token, &payload.password)
        .await
        .map_err(|f| (StatusCode::BAD_REQUEST, f.message))?;

    Ok(Json(json!({ "success": true })))
}

/// Reports whether the request carries a live session. Auth-API routes are
/// public, so the session is resolved here rather than by the gate.
#[instrument(skip(state, headers))]
async fn session_test(State(state): State<AppState>, headers: HeaderMap) -> Json<serde_json::Value> {
    let token = cookies::extract_cookie(&headers, &state.config.session.cookie_name);
    let resolved = match token {
        Some(t) => state.auth.get_session(&t).await,
        None => None,
    };

    match resolved {
        None => Json(json!({
            "authenticated": false,
            "message": "No active session",
        })),
        Some((user, session)) => Json(json!({
            "authenticated": true,
            "user": {
                "id": user.id,
                "email": user.email,
                "emailVerified": user.email_verified,
            },
            "session": {
                "id": session.id,
                "expiresAt": session.expires_at.format(&Rfc3339).unwrap_or_default(),
            },
        })),
    }
}
