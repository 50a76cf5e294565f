use anyhow::Context;
use aws_config::{defaults, BehaviorVersion};
use aws_credential_types::Credentials;
use aws_sdk_s3::{
    config::{Builder as S3ConfigBuilder, Region},
    Client,
};
use aws_smithy_types::byte_stream::ByteStream;
use axum::async_trait;
use bytes::Bytes;
use rand::{distributions::Alphanumeric, Rng};
use time::OffsetDateTime;
use uuid::Uuid;

pub const ALLOWED_IMAGE_TYPES: [&str; 3] = ["image/jpeg", "image/png", "image/webp"];
pub const MAX_AVATAR_SIZE: usize = 5 * 1024 * 1024;

#[async_trait]
pub trait StorageClient: Send + Sync {
    async fn put_object(&self, key: &str, body: Bytes, content_type: &str) -> anyhow::Result<()>;
    async fn delete_object(&self, key: &str) -> anyhow::Result<()>;
}

#[derive(Clone)]
pub struct Storage {
    client: Client,
    bucket: String,
}

impl Storage {
    pub async fn new(
        endpoint: &str,
        bucket: &str,
        access_key: &str,
        secret_key: &str,
        region: &str,
    ) -> anyhow::Result<Self> {
        let shared = defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .credentials_provider(Credentials::new(
                access_key, secret_key, None, None, "static",
            ))
            .endpoint_url(endpoint)
            .load()
            .await;

        // Path-style addressing for MinIO/R2-compatible endpoints.
        let conf = S3ConfigBuilder::from(&shared)
            .endpoint_url(endpoint)
            .force_path_style(true)
            .build();

        Ok(Self {
            client: Client::from_conf(conf),
            bucket: bucket.to_string(),
        })
    }
}

#[async_trait]
impl StorageClient for Storage {
    async fn put_object(&self, key: &str, body: Bytes, content_type: &str) -> anyhow::Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .send()
            .await
            .context("s3 put_object")?;
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> anyhow::Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .context("s3 delete_object")?;
        Ok(())
    }
}

/// Derive an object key: `{folder}/{user_id}/{timestamp_millis}-{random8}.{ext}`.
/// Millisecond timestamp plus a random suffix is enough entropy for
/// low-volume per-user uploads.
pub fn generate_key(folder: &str, user_id: Uuid, content_type: &str) -> String {
    let ext = ext_from_mime(content_type).unwrap_or("bin");
    let timestamp = (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64;
    let random: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect();
    format!("{}/{}/{}-{}.{}", folder, user_id, timestamp, random, ext)
}

pub fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        _ => None,
    }
}

/// Map an object key to its public URL.
pub fn public_url(base: &str, key: &str) -> String {
    let key = key.strip_prefix('/').unwrap_or(key);
    format!("{}/{}", base.trim_end_matches('/'), key)
}

/// Inverse of [`public_url`]: recover the key from a URL under `base`.
pub fn extract_key_from_url(url: &str, base: &str) -> Option<String> {
    let base = base.trim_end_matches('/');
    let rest = url.strip_prefix(base)?;
    let key = rest.strip_prefix('/')?;
    if key.is_empty() {
        return None;
    }
    Some(key.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ext_from_mime_known_types() {
        assert_eq!(ext_from_mime("image/jpeg"), Some("jpg"));
        assert_eq!(ext_from_mime("image/jpg"), Some("jpg"));
        assert_eq!(ext_from_mime("image/png"), Some("png"));
        assert_eq!(ext_from_mime("image/webp"), Some("webp"));
        assert_eq!(ext_from_mime("application/octet-stream"), None);
    }

    #[test]
    fn generated_keys_are_namespaced_and_unique() {
        let user_id = Uuid::new_v4();
        let a = generate_key("avatars", user_id, "image/png");
        let b = generate_key("avatars", user_id, "image/png");
        assert!(a.starts_with(&format!("avatars/{}/", user_id)));
        assert!(a.ends_with(".png"));
        assert_ne!(a, b);
    }

    #[test]
    fn public_url_and_extract_key_are_inverse() {
        let base = "https://pub-flock.r2.dev";
        let key = "avatars/abc/123-xyz.jpg";
        let url = public_url(base, key);
        assert_eq!(url, "https://pub-flock.r2.dev/avatars/abc/123-xyz.jpg");
        assert_eq!(extract_key_from_url(&url, base), Some(key.to_string()));
    }

    #[test]
    fn extract_key_rejects_foreign_urls() {
        assert_eq!(
            extract_key_from_url("https://evil.com/avatars/x.jpg", "https://pub-flock.r2.dev"),
            None
        );
        assert_eq!(
            extract_key_from_url("https://pub-flock.r2.dev/", "https://pub-flock.r2.dev"),
            None
        );
    }
}
