use std::sync::Arc;

use axum::async_trait;
use serde_json::json;
use tracing::{error, info, warn};

use crate::config::EmailConfig;

/// Transactional email backend. Two implementations: a console logger for
/// development and an HTTP client for Zepto Mail in production.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_verification_email(
        &self,
        to: &str,
        name: &str,
        verification_url: &str,
    ) -> anyhow::Result<()>;

    async fn send_password_reset_email(
        &self,
        to: &str,
        name: &str,
        reset_url: &str,
    ) -> anyhow::Result<()>;
}

/// Logs emails instead of sending them.
pub struct ConsoleMailer;

#[async_trait]
impl Mailer for ConsoleMailer {
    async fn send_verification_email(
        &self,
        to: &str,
        name: &str,
        verification_url: &str,
    ) -> anyhow::Result<()> {
        info!(to, name, url = verification_url, "verification email");
        Ok(())
    }

    async fn send_password_reset_email(
        &self,
        to: &str,
        name: &str,
        reset_url: &str,
    ) -> anyhow::Result<()> {
        info!(to, name, url = reset_url, "password reset email");
        Ok(())
    }
}

pub struct ZeptoMailer {
    client: reqwest::Client,
    api_url: String,
    token: String,
    from: String,
    from_name: String,
}

impl ZeptoMailer {
    pub fn new(token: String, from: String, from_name: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: "https://api.zeptomail.ca/v1.1/email".into(),
            token,
            from,
            from_name,
        }
    }

    async fn send(&self, to: &str, to_name: &str, subject: &str, html: &str) -> anyhow::Result<()> {
        let body = json!({
            "from": { "address": self.from, "name": self.from_name },
            "to": [{ "email_address": { "address": to, "name": to_name } }],
            "subject": subject,
            "htmlbody": html,
        });

        let response = self
            .client
            .post(&self.api_url)
            .header(reqwest::header::AUTHORIZATION, self.token.as_str())
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            error!(%status, error = %text, "zepto mail send failed");
            anyhow::bail!("failed to send email: {}", status);
        }
        Ok(())
    }
}

#[async_trait]
impl Mailer for ZeptoMailer {
    async fn send_verification_email(
        &self,
        to: &str,
        name: &str,
        verification_url: &str,
    ) -> anyhow::Result<()> {
        let html = verification_html(name, verification_url);
        self.send(to, name, "Verify your Flock account", &html).await
    }

    async fn send_password_reset_email(
        &self,
        to: &str,
        name: &str,
        reset_url: &str,
    ) -> anyhow::Result<()> {
        let html = password_reset_html(name, reset_url);
        self.send(to, name, "Reset your Flock password", &html).await
    }
}

fn verification_html(name: &str, url: &str) -> String {
    format!(
        "<div style=\"font-family: sans-serif; max-width: 600px; margin: 0 auto; padding: 20px;\">\
         <h1>Verify your email</h1>\
         <p>Hi {name},</p>\
         <p>Click the link below to verify your email address:</p>\
         <p><a href=\"{url}\">{url}</a></p>\
         <p>If you didn't create an account, you can safely ignore this email.</p>\
         </div>"
    )
}

fn password_reset_html(name: &str, url: &str) -> String {
    format!(
        "<div style=\"font-family: sans-serif; max-width: 600px; margin: 0 auto; padding: 20px;\">\
         <h1>Reset your password</h1>\
         <p>Hi {name},</p>\
         <p>Click the link below to reset your password:</p>\
         <p><a href=\"{url}\">{url}</a></p>\
         <p>If you didn't request this, you can safely ignore this email.</p>\
         </div>"
    )
}

/// Pick the mailer from configuration. A requested Zepto backend without a
/// token falls back to the console mailer.
pub fn create_mailer(cfg: &EmailConfig) -> Arc<dyn Mailer> {
    if cfg.provider == "zepto" {
        if let Some(token) = cfg.zepto_token.clone().filter(|t| !t.is_empty()) {
            return Arc::new(ZeptoMailer::new(
                token,
                cfg.zepto_from.clone(),
                cfg.zepto_from_name.clone(),
            ));
        }
        warn!("zepto mail not configured, falling back to console mailer");
    }
    Arc::new(ConsoleMailer)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(provider: &str, token: Option<&str>) -> EmailConfig {
        EmailConfig {
            provider: provider.into(),
            zepto_token: token.map(str::to_string),
            zepto_from: "noreply@myflock.app".into(),
            zepto_from_name: "Flock".into(),
        }
    }

    #[test]
    fn zepto_without_token_falls_back_to_console() {
        // Selection itself must not fail, just degrade.
        let _ = create_mailer(&config("zepto", None));
        let _ = create_mailer(&config("zepto", Some("")));
        let _ = create_mailer(&config("zepto", Some("Zoho-enczapikey abc")));
        let _ = create_mailer(&config("console", None));
    }

    #[test]
    fn email_bodies_embed_name_and_url() {
        let html = verification_html("Ada", "https://myflock.app/verify?token=t1");
        assert!(html.contains("Ada"));
        assert!(html.contains("https://myflock.app/verify?token=t1"));

        let html = password_reset_html("Ada", "https://myflock.app/reset?token=t2");
        assert!(html.contains("Reset your password"));
        assert!(html.contains("token=t2"));
    }
}
