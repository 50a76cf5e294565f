use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    pub cookie_name: String,
    pub cookie_secure: bool,
    pub ttl_days: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub public_url_base: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    pub provider: String,
    pub zepto_token: Option<String>,
    pub zepto_from: String,
    pub zepto_from_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    /// Origin used when building verification/reset links in emails.
    pub base_url: String,
    pub session: SessionConfig,
    pub storage: StorageConfig,
    pub email: EmailConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let base_url =
            std::env::var("APP_BASE_URL").unwrap_or_else(|_| "http://localhost:8080".into());

        let session = SessionConfig {
            cookie_name: std::env::var("SESSION_COOKIE_NAME")
                .unwrap_or_else(|_| "flock_session".into()),
            cookie_secure: std::env::var("SESSION_COOKIE_SECURE")
                .map(|v| v != "false")
                .unwrap_or(true),
            ttl_days: std::env::var("SESSION_TTL_DAYS")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(30),
        };

        let storage = StorageConfig {
            endpoint: std::env::var("S3_ENDPOINT")?,
            bucket: std::env::var("S3_BUCKET")?,
            access_key: std::env::var("S3_ACCESS_KEY")?,
            secret_key: std::env::var("S3_SECRET_KEY")?,
            public_url_base: std::env::var("STORAGE_PUBLIC_URL")
                .unwrap_or_else(|_| "https://pub-flock.r2.dev".into()),
        };

        let email = EmailConfig {
            provider: std::env::var("EMAIL_PROVIDER").unwrap_or_else(|_| "console".into()),
            zepto_token: std::env::var("ZEPTO_MAIL_TOKEN").ok(),
            zepto_from: std::env::var("ZEPTO_MAIL_FROM")
                .unwrap_or_else(|_| "noreply@myflock.app".into()),
            zepto_from_name: std::env::var("ZEPTO_MAIL_FROM_NAME")
                .unwrap_or_else(|_| "Flock".into()),
        };

        Ok(Self {
            database_url,
            base_url,
            session,
            storage,
            email,
        })
    }
}
