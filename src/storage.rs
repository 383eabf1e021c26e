use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use std::fmt;
use tracing::warn;

/// Object storage operations the panel loop depends on.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload the bytes under `bucket/name`, overwriting any previous object.
    async fn upload(&self, bucket: &str, name: &str, bytes: Vec<u8>, content_type: &str)
        -> Result<()>;

    /// Public locator for an object. Pure URL construction, no network call.
    fn public_url(&self, bucket: &str, name: &str) -> String;
}

#[derive(Clone)]
pub struct SupabaseStorage {
    http: Client,
    base_url: Url,
    api_key: String,
}

impl fmt::Debug for SupabaseStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SupabaseStorage")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl SupabaseStorage {
    pub fn new(base_url: Url, api_key: String) -> Self {
        let http = Client::builder()
            .user_agent("vcomics/0.1")
            .no_proxy()
            .build()
            .expect("reqwest client");
        Self {
            http,
            base_url,
            api_key,
        }
    }
}

/// Map a synthesis output format to the upload content type.
pub fn content_type_for(output_format: &str) -> &'static str {
    match output_format {
        "webp" => "image/webp",
        "png" => "image/png",
        "jpeg" => "image/jpeg",
        _ => "application/octet-stream",
    }
}

#[async_trait]
impl ObjectStore for SupabaseStorage {
    async fn upload(
        &self,
        bucket: &str,
        name: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<()> {
        let endpoint = self
            .base_url
            .join(&format!("storage/v1/object/{bucket}/{name}"))
            .context("invalid storage base URL")?;
        let res = self
            .http
            .post(endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", content_type)
            .header("x-upsert", "true")
            .body(bytes)
            .send()
            .await
            .context("failed to reach storage")?;

        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            warn!("Storage API error - Status: {}, Body: {}", status, body);
            return Err(anyhow!("storage error {}: {}", status, body));
        }
        Ok(())
    }

    fn public_url(&self, bucket: &str, name: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            bucket,
            name
        )
    }
}
