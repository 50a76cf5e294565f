//! Per-request authorization gate. Classifies the path, resolves the session
//! from the cookie, and either lets the request through (attaching the user
//! to request extensions) or answers with a redirect.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};

use crate::{
    auth::engine::{Session, User},
    cookies,
    state::AppState,
};

/// The gate-resolved user, stored in request extensions for handlers.
#[derive(Clone)]
pub struct CurrentUser {
    pub user: User,
    pub session: Session,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    /// No session lookup at all.
    Public,
    /// Login and register forms: signed-in visitors are bounced away.
    AuthPage,
    /// Protected JSON surface: session is resolved and attached, but the
    /// handler answers 401 itself instead of a redirect.
    Api,
    Protected,
}

const PUBLIC_PREFIXES: [&str; 5] = [
    "/verify-email",
    "/forgot-password",
    "/reset-password",
    "/api/auth",
    "/api/health",
];

fn has_prefix(path: &str, prefix: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

pub fn classify_path(path: &str) -> RouteClass {
    if has_prefix(path, "/login") || has_prefix(path, "/register") {
        return RouteClass::AuthPage;
    }
    if PUBLIC_PREFIXES.iter().any(|p| has_prefix(path, p)) {
        return RouteClass::Public;
    }
    if path.starts_with("/api/") {
        return RouteClass::Api;
    }
    RouteClass::Protected
}

/// What the gate knows about the resolved session when deciding.
#[derive(Debug, Clone, Copy)]
pub struct SessionInfo {
    pub email_verified: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Allow,
    ToLogin { return_to: Option<String> },
    ToVerifyEmail,
    ToDashboard,
}

/// The ordered decision table over (route class, path, session state).
pub fn decide(
    class: RouteClass,
    path: &str,
    query: Option<&str>,
    session: Option<SessionInfo>,
) -> GateDecision {
    match class {
        RouteClass::Public | RouteClass::Api => GateDecision::Allow,
        RouteClass::AuthPage => match session {
            None => GateDecision::Allow,
            Some(info) if !info.email_verified => GateDecision::ToVerifyEmail,
            Some(_) => GateDecision::ToDashboard,
        },
        RouteClass::Protected => match session {
            None => {
                if path == "/" {
                    GateDecision::ToLogin { return_to: None }
                } else {
                    let mut target = path.to_string();
                    if let Some(q) = query {
                        target.push('?');
                        target.push_str(q);
                    }
                    GateDecision::ToLogin {
                        return_to: Some(percent_encode(&target)),
                    }
                }
            }
            Some(info) if !info.email_verified && path != "/verify-email" => {
                GateDecision::ToVerifyEmail
            }
            Some(_) if path == "/" => GateDecision::ToDashboard,
            Some(_) => GateDecision::Allow,
        },
    }
}

pub async fn gate(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let path = req.uri().path().to_string();
    let query = req.uri().query().map(str::to_string);
    let class = classify_path(&path);

    // Public routes pass through without touching the database.
    let resolved = match class {
        RouteClass::Public => None,
        _ => {
            let token = cookies::extract_cookie(req.headers(), &state.config.session.cookie_name);
            match token {
                Some(t) => state.auth.get_session(&t).await,
                None => None,
            }
        }
    };

    let info = resolved.as_ref().map(|(user, _)| SessionInfo {
        email_verified: user.email_verified,
    });

    if let Some((user, session)) = resolved {
        req.extensions_mut().insert(CurrentUser { user, session });
    }

    match decide(class, &path, query.as_deref(), info) {
        GateDecision::Allow => next.run(req).await,
        GateDecision::ToLogin { return_to } => {
            let target = match return_to {
                Some(r) => format!("/login?redirectTo={}", r),
                None => "/login".to_string(),
            };
            Redirect::to(&target).into_response()
        }
        GateDecision::ToVerifyEmail => Redirect::to("/verify-email").into_response(),
        GateDecision::ToDashboard => Redirect::to("/dashboard").into_response(),
    }
}

/// Percent-encode everything outside the RFC 3986 unreserved set.
pub fn percent_encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for b in input.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}

/// Validate a post-login redirect target to prevent open redirects. Only
/// same-origin relative paths survive; everything else becomes `fallback`.
pub fn safe_redirect(url: Option<&str>, fallback: &str) -> String {
    let Some(url) = url else {
        return fallback.to_string();
    };
    if url.is_empty() || !url.starts_with('/') {
        return fallback.to_string();
    }
    // Protocol-relative URLs (//evil.com) slip past the leading-slash check.
    if url.starts_with("//") {
        return fallback.to_string();
    }
    // Encoded slashes could smuggle the same thing through.
    if url.contains('\\') || url.to_lowercase().contains("%2f%2f") {
        return fallback.to_string();
    }
    url.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const VERIFIED: Option<SessionInfo> = Some(SessionInfo {
        email_verified: true,
    });
    const UNVERIFIED: Option<SessionInfo> = Some(SessionInfo {
        email_verified: false,
    });

    #[test]
    fn classification() {
        assert_eq!(classify_path("/login"), RouteClass::AuthPage);
        assert_eq!(classify_path("/register"), RouteClass::AuthPage);
        assert_eq!(classify_path("/verify-email"), RouteClass::Public);
        assert_eq!(classify_path("/api/auth/sign-in/email"), RouteClass::Public);
        assert_eq!(classify_path("/api/health"), RouteClass::Public);
        assert_eq!(classify_path("/api/v1/profile"), RouteClass::Api);
        assert_eq!(classify_path("/api/v1/profile/avatar"), RouteClass::Api);
        assert_eq!(classify_path("/"), RouteClass::Protected);
        assert_eq!(classify_path("/dashboard"), RouteClass::Protected);
        assert_eq!(classify_path("/onboarding"), RouteClass::Protected);
        // Prefix matching must not swallow lookalike paths.
        assert_eq!(classify_path("/loginish"), RouteClass::Protected);
    }

    #[test]
    fn public_routes_pass_without_session() {
        let d = decide(RouteClass::Public, "/api/health", None, None);
        assert_eq!(d, GateDecision::Allow);
    }

    #[test]
    fn auth_pages_bounce_signed_in_visitors() {
        assert_eq!(
            decide(RouteClass::AuthPage, "/login", None, None),
            GateDecision::Allow
        );
        assert_eq!(
            decide(RouteClass::AuthPage, "/login", None, UNVERIFIED),
            GateDecision::ToVerifyEmail
        );
        assert_eq!(
            decide(RouteClass::AuthPage, "/register", None, VERIFIED),
            GateDecision::ToDashboard
        );
    }

    #[test]
    fn protected_routes_redirect_anonymous_with_return_path() {
        assert_eq!(
            decide(RouteClass::Protected, "/", None, None),
            GateDecision::ToLogin { return_to: None }
        );
        assert_eq!(
            decide(RouteClass::Protected, "/dashboard", None, None),
            GateDecision::ToLogin {
                return_to: Some("%2Fdashboard".to_string())
            }
        );
        assert_eq!(
            decide(RouteClass::Protected, "/dashboard", Some("tab=groups"), None),
            GateDecision::ToLogin {
                return_to: Some("%2Fdashboard%3Ftab%3Dgroups".to_string())
            }
        );
    }

    #[test]
    fn protected_routes_gate_on_verification() {
        assert_eq!(
            decide(RouteClass::Protected, "/dashboard", None, UNVERIFIED),
            GateDecision::ToVerifyEmail
        );
        assert_eq!(
            decide(RouteClass::Protected, "/", None, VERIFIED),
            GateDecision::ToDashboard
        );
        assert_eq!(
            decide(RouteClass::Protected, "/dashboard", None, VERIFIED),
            GateDecision::Allow
        );
    }

    #[test]
    fn api_routes_always_pass_through() {
        // Handlers answer 401 themselves; the gate only attaches the user.
        assert_eq!(
            decide(RouteClass::Api, "/api/v1/profile", None, None),
            GateDecision::Allow
        );
        assert_eq!(
            decide(RouteClass::Api, "/api/v1/profile", None, UNVERIFIED),
            GateDecision::Allow
        );
    }

    #[test]
    fn percent_encoding_paths() {
        assert_eq!(percent_encode("/dashboard"), "%2Fdashboard");
        assert_eq!(percent_encode("/a b"), "%2Fa%20b");
        assert_eq!(percent_encode("abc-_.~"), "abc-_.~");
    }

    #[test]
    fn safe_redirect_rules() {
        assert_eq!(safe_redirect(Some("/dashboard"), "/dashboard"), "/dashboard");
        assert_eq!(safe_redirect(Some("/onboarding"), "/dashboard"), "/onboarding");
        assert_eq!(
            safe_redirect(Some("https://evil.com"), "/dashboard"),
            "/dashboard"
        );
        assert_eq!(safe_redirect(Some("//evil.com"), "/dashboard"), "/dashboard");
        assert_eq!(safe_redirect(None, "/dashboard"), "/dashboard");
        assert_eq!(safe_redirect(None, "/home"), "/home");
        assert_eq!(safe_redirect(Some(""), "/dashboard"), "/dashboard");
        assert_eq!(
            safe_redirect(Some("/%2F%2Fevil.com"), "/dashboard"),
            "/dashboard"
        );
        assert_eq!(
            safe_redirect(Some("/\\evil.com"), "/dashboard"),
            "/dashboard"
        );
    }
}
