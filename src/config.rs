//! Configuration loader and validator for the comic generation worker.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

const VALID_OUTPUT_FORMATS: &[&str] = &["webp", "png", "jpeg"];

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub openai: OpenAi,
    pub stability: Stability,
    pub storage: Storage,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
    pub poll_interval_ms: u64,
    pub stage_timeout_seconds: u64,
    pub abort_on_panel_failure: bool,
}

/// Chat-completions API settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OpenAi {
    pub api_key: String,
    pub model: String,
}

/// Image synthesis API settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Stability {
    pub api_key: String,
    pub output_format: String,
}

/// Object storage settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Storage {
    pub base_url: String,
    pub api_key: String,
    pub bucket: String,
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if cfg.app.poll_interval_ms == 0 {
        return Err(ConfigError::Invalid("app.poll_interval_ms must be > 0"));
    }
    if cfg.app.stage_timeout_seconds == 0 {
        return Err(ConfigError::Invalid("app.stage_timeout_seconds must be > 0"));
    }

    if cfg.openai.api_key.trim().is_empty() {
        return Err(ConfigError::Invalid("openai.api_key must be non-empty"));
    }
    if cfg.openai.model.trim().is_empty() {
        return Err(ConfigError::Invalid("openai.model must be non-empty"));
    }

    if cfg.stability.api_key.trim().is_empty() {
        return Err(ConfigError::Invalid("stability.api_key must be non-empty"));
    }
    if !VALID_OUTPUT_FORMATS.contains(&cfg.stability.output_format.as_str()) {
        return Err(ConfigError::Invalid(
            "stability.output_format must be one of: webp, png, jpeg",
        ));
    }

    if cfg.storage.base_url.trim().is_empty() {
        return Err(ConfigError::Invalid("storage.base_url must be non-empty"));
    }
    if cfg.storage.api_key.trim().is_empty() {
        return Err(ConfigError::Invalid("storage.api_key must be non-empty"));
    }
    if cfg.storage.bucket.trim().is_empty() {
        return Err(ConfigError::Invalid("storage.bucket must be non-empty"));
    }

    Ok(())
}

/// Returns the example YAML content.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"
  poll_interval_ms: 500
  stage_timeout_seconds: 120
  abort_on_panel_failure: false

openai:
  api_key: "YOUR_OPENAI_API_KEY"
  model: "gpt-4o-mini"

stability:
  api_key: "YOUR_STABILITY_API_KEY"
  output_format: "webp"

storage:
  base_url: "https://YOUR_PROJECT.supabase.co"
  api_key: "YOUR_SERVICE_ROLE_KEY"
  bucket: "panels"
"#
}
