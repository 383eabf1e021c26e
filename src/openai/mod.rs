use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde_json::{json, Value};
use std::fmt;
use tracing::warn;

use crate::openai::model::ChatCompletionResp;

pub mod model;

const OPENAI_API_BASE: &str = "https://api.openai.com/";

/// System prompt for the vision description stage.
const DESCRIBE_SYSTEM_PROMPT: &str = "\
Describe the people and the setting in the image in concrete visual detail: \
appearance, clothing, colors, surroundings. Answer with a single paragraph \
of comma-delimited fragments usable as an image generation prompt.";

#[derive(Clone)]
pub struct OpenAiClient {
    http: Client,
    base_url: Url,
    api_key: String,
    model: String,
}

impl fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

/// Chat-completions operations the pipeline depends on.
#[async_trait]
pub trait ChatService: Send + Sync {
    /// Describe the submitted image. One call per job.
    async fn describe_image(&self, image_data_uri: &str) -> Result<String>;

    /// Run a completion that must return a JSON object.
    async fn complete_structured(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;
}

impl OpenAiClient {
    pub fn new(api_key: String, model: String) -> Self {
        let base_url = Url::parse(OPENAI_API_BASE).expect("valid default OpenAI URL");
        Self::with_base_url(api_key, model, base_url)
    }

    pub fn with_base_url(api_key: String, model: String, base_url: Url) -> Self {
        let http = Client::builder()
            .user_agent("vcomics/0.1")
            .no_proxy()
            .build()
            .expect("reqwest client");
        Self {
            http,
            base_url,
            api_key,
            model,
        }
    }

    pub fn build_request(&self, body: &Value) -> Result<reqwest::Request> {
        let endpoint = self
            .base_url
            .join("v1/chat/completions")
            .context("invalid OpenAI base URL")?;
        self.http
            .post(endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .build()
            .context("failed to build chat completion request")
    }

    async fn execute_chat(&self, body: Value) -> Result<String> {
        let request = self.build_request(&body)?;
        let res = self
            .http
            .execute(request)
            .await
            .context("failed to reach OpenAI")?;

        if res.status() == StatusCode::TOO_MANY_REQUESTS {
            let body = res.text().await.unwrap_or_default();
            warn!("Rate limited by OpenAI: {}", body);
            return Err(anyhow!("received 429 from OpenAI: {}", body));
        }
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            warn!("OpenAI API error - Status: {}, Body: {}", status, body);
            return Err(anyhow!("openai error {}: {}", status, body));
        }

        let payload: ChatCompletionResp = res
            .json()
            .await
            .context("invalid chat completion response JSON")?;
        let content = payload
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        if content.trim().is_empty() {
            return Err(anyhow!("chat completion returned no content"));
        }
        Ok(content)
    }
}

#[async_trait]
impl ChatService for OpenAiClient {
    async fn describe_image(&self, image_data_uri: &str) -> Result<String> {
        let body = build_describe_body(&self.model, image_data_uri);
        self.execute_chat(body).await
    }

    async fn complete_structured(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let body = build_scenario_body(&self.model, system_prompt, user_prompt);
        self.execute_chat(body).await
    }
}

pub fn build_describe_body(model: &str, image_data_uri: &str) -> Value {
    json!({
        "model": model,
        "messages": [
            {
                "role": "system",
                "content": DESCRIBE_SYSTEM_PROMPT,
            },
            {
                "role": "user",
                "content": [
                    {
                        "type": "image_url",
                        "image_url": { "url": image_data_uri },
                    }
                ],
            }
        ],
    })
}

pub fn build_scenario_body(model: &str, system_prompt: &str, user_prompt: &str) -> Value {
    json!({
        "model": model,
        "response_format": { "type": "json_object" },
        "messages": [
            { "role": "system", "content": system_prompt },
            { "role": "user", "content": user_prompt },
        ],
    })
}
