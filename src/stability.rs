use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use std::fmt;
use tracing::warn;

const STABILITY_API_BASE: &str = "https://api.stability.ai/";

#[derive(Clone)]
pub struct StabilityClient {
    http: Client,
    base_url: Url,
    api_key: String,
}

impl fmt::Debug for StabilityClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StabilityClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

/// Image synthesis operation the panel loop depends on.
#[async_trait]
pub trait ImageSynthesis: Send + Sync {
    /// Generate one image for the prompt, returning the raw encoded bytes.
    async fn synthesize(&self, prompt: &str, output_format: &str) -> Result<Vec<u8>>;
}

impl StabilityClient {
    pub fn new(api_key: String) -> Self {
        let base_url = Url::parse(STABILITY_API_BASE).expect("valid default Stability URL");
        Self::with_base_url(api_key, base_url)
    }

    pub fn with_base_url(api_key: String, base_url: Url) -> Self {
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

    pub fn build_request(&self, prompt: &str, output_format: &str) -> Result<reqwest::Request> {
        let endpoint = self
            .base_url
            .join("v2beta/stable-image/generate/core")
            .context("invalid Stability base URL")?;
        let form = reqwest::multipart::Form::new()
            .text("prompt", prompt.to_string())
            .text("output_format", output_format.to_string());
        self.http
            .post(endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Accept", "image/*")
            .multipart(form)
            .build()
            .context("failed to build synthesis request")
    }
}

#[async_trait]
impl ImageSynthesis for StabilityClient {
    async fn synthesize(&self, prompt: &str, output_format: &str) -> Result<Vec<u8>> {
        let request = self.build_request(prompt, output_format)?;
        let res = self
            .http
            .execute(request)
            .await
            .context("failed to reach Stability")?;

        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            warn!("Stability API error - Status: {}, Body: {}", status, body);
            return Err(anyhow!("stability error {}: {}", status, body));
        }

        let bytes = res
            .bytes()
            .await
            .context("failed to read synthesis response body")?;
        Ok(bytes.to_vec())
    }
}
