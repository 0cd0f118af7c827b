//! Environment-driven configuration.
//!
//! Values are read through a lookup function so tests can supply a map
//! instead of touching the process environment. `.env` files are loaded by
//! the binaries via `dotenvy` before any of this runs.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_LLM_API_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_STRIPE_API_URL: &str = "https://api.stripe.com";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} not found in environment variables")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    OpenAi,
    Fake,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub provider: ProviderKind,
    pub openai_api_key: Option<String>,
    pub llm_api_url: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            provider: ProviderKind::OpenAi,
            openai_api_key: None,
            llm_api_url: DEFAULT_LLM_API_URL.to_string(),
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let provider = match lookup("LLM_PROVIDER").as_deref() {
            None | Some("openai") => ProviderKind::OpenAi,
            Some("fake") => ProviderKind::Fake,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "LLM_PROVIDER",
                    value: other.to_string(),
                });
            }
        };

        Ok(PipelineConfig {
            provider,
            openai_api_key: lookup("OPENAI_API_KEY").filter(|key| !key.is_empty()),
            llm_api_url: lookup("LLM_API_URL").unwrap_or_else(|| DEFAULT_LLM_API_URL.to_string()),
        })
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub upstream_url: String,
    pub jwt_secret: Option<String>,
    pub stripe_api_key: String,
    pub stripe_webhook_secret: Option<String>,
    pub stripe_api_url: String,
    pub proxy_timeout: Duration,
    pub proxy_ai_timeout: Duration,
    pub sop_catalog_path: Option<PathBuf>,
    pub pipeline: PipelineConfig,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let stripe_api_key = lookup("STRIPE_API_KEY")
            .filter(|key| !key.is_empty())
            .ok_or(ConfigError::Missing("STRIPE_API_KEY"))?;

        Ok(ServerConfig {
            bind_addr: lookup("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8001".to_string()),
            upstream_url: lookup("UPSTREAM_URL")
                .unwrap_or_else(|| "http://localhost:3000".to_string())
                .trim_end_matches('/')
                .to_string(),
            jwt_secret: lookup("JWT_SECRET").filter(|secret| !secret.is_empty()),
            stripe_api_key,
            stripe_webhook_secret: lookup("STRIPE_WEBHOOK_SECRET"),
            stripe_api_url: lookup("STRIPE_API_URL")
                .unwrap_or_else(|| DEFAULT_STRIPE_API_URL.to_string()),
            proxy_timeout: seconds(&lookup, "PROXY_TIMEOUT_SECS", 30)?,
            proxy_ai_timeout: seconds(&lookup, "PROXY_AI_TIMEOUT_SECS", 120)?,
            sop_catalog_path: lookup("SOP_CATALOG_PATH").map(PathBuf::from),
            pipeline: PipelineConfig::from_lookup(&lookup)?,
        })
    }
}

fn seconds<F>(lookup: &F, key: &'static str, default: u64) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(Duration::from_secs(default)),
        Some(value) => value
            .trim()
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|_| ConfigError::Invalid { key, value }),
    }
}
