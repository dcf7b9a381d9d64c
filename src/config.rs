//! Process-wide service configuration.
//!
//! Loaded once at startup from the environment (after `.env` is applied) and
//! handed to each client and to the pipeline by value or behind an `Arc`.

use anyhow::{Context, Result};
use std::env;
use std::fmt;
use std::path::PathBuf;

const DEFAULT_OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";
const DEFAULT_UPLOAD_DIR: &str = "uploads";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;

/// Settings for the OpenAI-compatible chat endpoint.
#[derive(Clone)]
pub struct ChatConfig {
    pub api_url: String,
    pub api_key: String,
    pub model: String,
}

impl fmt::Debug for ChatConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatConfig")
            .field("api_url", &self.api_url)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .finish()
    }
}

/// How the Vision API calls are authenticated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VisionAuth {
    /// Plain API key, sent as the `key` query parameter.
    ApiKey(String),
    /// Path to a service account JSON key used to mint OAuth2 tokens.
    ServiceAccount(PathBuf),
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub chat: ChatConfig,
    pub vision: VisionAuth,
    /// Scratch directory for uploaded images.
    pub upload_dir: PathBuf,
    pub bind_addr: String,
    pub max_upload_bytes: usize,
}

impl AppConfig {
    /// Read the configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_key = non_empty("OPENAI_API_KEY")
            .context("OPENAI_API_KEY environment variable not set")?;

        let chat = ChatConfig {
            api_url: non_empty("OPENAI_API_URL")
                .unwrap_or_else(|| DEFAULT_OPENAI_API_URL.to_string()),
            api_key,
            model: non_empty("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
        };

        let vision = match non_empty("GOOGLE_VISION_API_KEY") {
            Some(key) => VisionAuth::ApiKey(key),
            None => {
                let path = non_empty("GOOGLE_APPLICATION_CREDENTIALS").context(
                    "GOOGLE_APPLICATION_CREDENTIALS (or GOOGLE_VISION_API_KEY) not set",
                )?;
                VisionAuth::ServiceAccount(PathBuf::from(path))
            }
        };

        let max_upload_bytes = match non_empty("MAX_UPLOAD_BYTES") {
            Some(raw) => raw
                .trim()
                .parse::<usize>()
                .with_context(|| format!("Invalid MAX_UPLOAD_BYTES: {}", raw))?,
            None => DEFAULT_MAX_UPLOAD_BYTES,
        };

        Ok(Self {
            chat,
            vision,
            upload_dir: PathBuf::from(
                non_empty("UPLOAD_DIR").unwrap_or_else(|| DEFAULT_UPLOAD_DIR.to_string()),
            ),
            bind_addr: non_empty("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            max_upload_bytes,
        })
    }
}
