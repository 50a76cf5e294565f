//! Server-rendered pages. These are deliberately small: each page is a form
//! or a notice plus a short script that talks to the JSON API.

use axum::{
    extract::{Query, State},
    response::{Html, Redirect},
    routing::get,
    Router,
};
use serde::Deserialize;

use crate::{auth::AuthUser, gate::safe_redirect, state::AppState};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/login", get(login_page))
        .route("/register", get(register_page))
        .route("/verify-email", get(verify_email_page))
        .route("/forgot-password", get(forgot_password_page))
        .route("/reset-password", get(reset_password_page))
        .route("/dashboard", get(dashboard_page))
        .route("/onboarding", get(onboarding_page))
}

fn html_escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn layout(title: &str, body: &str) -> Html<String> {
    Html(format!(
        "<!doctype html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
         <title>{title} · Flock</title>\n</head>\n<body>\n<main>\n{body}\n</main>\n</body>\n</html>"
    ))
}

#[derive(Debug, Deserialize)]
struct LoginQuery {
    #[serde(rename = "redirectTo")]
    redirect_to: Option<String>,
    verified: Option<String>,
}

async fn login_page(Query(query): Query<LoginQuery>) -> Html<String> {
    // Re-validated server side before it ever reaches the page.
    let redirect = safe_redirect(query.redirect_to.as_deref(), "/dashboard");
    let verified_notice = if query.verified.as_deref() == Some("true") {
        "<p>Email verified. You can sign in now.</p>"
    } else {
        ""
    };
    let body = format!(
        r#"<h1>Sign in</h1>
{verified_notice}
<form id="login-form">
  <input type="hidden" name="redirectTo" value="{redirect}">
  <label>Email <input type="email" name="email" required></label>
  <label>Password <input type="password" name="password" required></label>
  <button type="submit">Sign in</button>
</form>
<p id="error" role="alert"></p>
<p><a href="/register">Create an account</a> · <a href="/forgot-password">Forgot password?</a></p>
<script>
document.getElementById('login-form').addEventListener('submit', async (e) => {{
  e.preventDefault();
  const form = new FormData(e.target);
  const res = await fetch('/api/auth/sign-in/email', {{
    method: 'POST',
    headers: {{ 'Content-Type': 'application/json' }},
    body: JSON.stringify({{
      email: form.get('email'),
      password: form.get('password'),
      redirectTo: form.get('redirectTo'),
    }}),
  }});
  if (res.ok) {{
    const data = await res.json();
    window.location.href = data.redirect || '/dashboard';
  }} else {{
    document.getElementById('error').textContent = await res.text();
  }}
}});
</script>"#,
        redirect = html_escape(&redirect),
    );
    layout("Sign in", &body)
}

async fn register_page() -> Html<String> {
    let body = r#"<h1>Create your account</h1>
<form id="register-form">
  <label>Email <input type="email" name="email" required></label>
  <label>Password <input type="password" name="password" minlength="8" required></label>
  <button type="submit">Sign up</button>
</form>
<p id="error" role="alert"></p>
<p><a href="/login">Already have an account?</a></p>
<script>
document.getElementById('register-form').addEventListener('submit', async (e) => {
  e.preventDefault();
  const form = new FormData(e.target);
  const res = await fetch('/api/auth/sign-up/email', {
    method: 'POST',
    headers: { 'Content-Type': 'application/json' },
    body: JSON.stringify({ email: form.get('email'), password: form.get('password') }),
  });
  if (res.ok) {
    window.location.href = '/verify-email';
  } else {
    document.getElementById('error').textContent = await res.text();
  }
});
</script>"#;
    layout("Register", body)
}

#[derive(Debug, Deserialize)]
struct VerifyEmailQuery {
    error: Option<String>,
}

async fn verify_email_page(Query(query): Query<VerifyEmailQuery>) -> Html<String> {
    let notice = if query.error.is_some() {
        "<p role=\"alert\">That verification link is invalid or has expired. \
         Sign in to request a new one.</p>"
    } else {
        ""
    };
    let body = format!(
        "<h1>Check your email</h1>\n{notice}\n\
         <p>We sent you a verification link. Open it to activate your account.</p>\n\
         <p><a href=\"/login\">Back to sign in</a></p>"
    );
    layout("Verify your email", &body)
}

async fn forgot_password_page() -> Html<String> {
    let body = r#"<h1>Reset your password</h1>
<form id="forgot-form">
  <label>Email <input type="email" name="email" required></label>
  <button type="submit">Send reset link</button>
</form>
<p id="notice"></p>
<script>
document.getElementById('forgot-form').addEventListener('submit', async (e) => {
  e.preventDefault();
  const form = new FormData(e.target);
  await fetch('/api/auth/forgot-password', {
    method: 'POST',
    headers: { 'Content-Type': 'application/json' },
    body: JSON.stringify({ email: form.get('email') }),
  });
  document.getElementById('notice').textContent =
    'If an account exists for that address, a reset link is on its way.';
});
</script>"#;
    layout("Forgot password", body)
}

#[derive(Debug, Deserialize)]
struct ResetPasswordQuery {
    token: Option<String>,
}

async fn reset_password_page(Query(query): Query<ResetPasswordQuery>) -> Html<String> {
    let token = query.token.unwrap_or_default();
    let body = format!(
        r#"<h1>Choose a new password</h1>
<form id="reset-form">
  <input type="hidden" name="token" value="{token}">
  <label>New password <input type="password" name="password" minlength="8" required></label>
  <button type="submit">Reset password</button>
</form>
<p id="error" role="alert"></p>
<script>
document.getElementById('reset-form').addEventListener('submit', async (e) => {{
  e.preventDefault();
  const form = new FormData(e.target);
  const res = await fetch('/api/auth/reset-password', {{
    method: 'POST',
    headers: {{ 'Content-Type': 'application/json' }},
    body: JSON.stringify({{ token: form.get('token'), password: form.get('password') }}),
  }});
  if (res.ok) {{
    window.location.href = '/login';
  }} else {{
    document.getElementById('error').textContent = await res.text();
  }}
}});
</script>"#,
        token = html_escape(&token),
    );
    layout("Reset password", &body)
}

/// The gate guarantees a verified session here; the page itself only decides
/// between the dashboard and the onboarding form.
async fn dashboard_page(
    State(state): State<AppState>,
    AuthUser(current): AuthUser,
) -> Result<Html<String>, Redirect> {
    let profile = state
        .profiles
        .get_by_user_id(current.user.id)
        .await
        .ok()
        .flatten();
    let Some(profile) = profile.filter(|p| p.onboarding_complete) else {
        return Err(Redirect::to("/onboarding"));
    };

    let body = format!(
        r#"<h1>Welcome back, {name}</h1>
<form id="signout-form"><button type="submit">Sign out</button></form>
<script>
document.getElementById('signout-form').addEventListener('submit', async (e) => {{
  e.preventDefault();
  await fetch('/api/auth/sign-out', {{ method: 'POST' }});
  window.location.href = '/login';
}});
</script>"#,
        name = html_escape(&profile.display_name),
    );
    Ok(layout("Dashboard", &body))
}

async fn onboarding_page(
    State(state): State<AppState>,
    AuthUser(current): AuthUser,
) -> Result<Html<String>, Redirect> {
    if state.profiles.is_onboarding_complete(current.user.id).await {
        return Err(Redirect::to("/dashboard"));
    }

    let body = r#"<h1>Tell us about yourself</h1>
<form id="onboarding-form">
  <label>First name <input type="text" name="firstName" required></label>
  <label>Last name <input type="text" name="lastName" required></label>
  <label>Birthday <input type="date" name="birthday" required></label>
  <label>Gender
    <select name="gender" required>
      <option value="male">Male</option>
      <option value="female">Female</option>
      <option value="prefer_not_to_say">Prefer not to say</option>
    </select>
  </label>
  <button type="submit">Finish</button>
</form>
<p id="error" role="alert"></p>
<script>
document.getElementById('onboarding-form').addEventListener('submit', async (e) => {
  e.preventDefault();
  const form = new FormData(e.target);
  const res = await fetch('/api/v1/profile', {
    method: 'POST',
    headers: { 'Content-Type': 'application/json' },
    body: JSON.stringify({
      firstName: form.get('firstName'),
      lastName: form.get('lastName'),
      birthday: form.get('birthday'),
      gender: form.get('gender'),
    }),
  });
  if (res.ok) {
    window.location.href = '/dashboard';
  } else {
    document.getElementById('error').textContent = await res.text();
  }
});
</script>"#;
    Ok(layout("Onboarding", body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escaping_covers_markup_characters() {
        assert_eq!(
            html_escape(r#"<script>"a"&'b'</script>"#),
            "&lt;script&gt;&quot;a&quot;&amp;&#39;b&#39;&lt;/script&gt;"
        );
        assert_eq!(html_escape("plain"), "plain");
    }
}
