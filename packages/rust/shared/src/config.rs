//! Application configuration for sitechat.
//!
//! All functional parameters come from environment variables, read once at
//! startup. A `.env` file in the working directory is honored via `dotenvy`.
//! There is no config-file layer and no runtime reload.

use std::path::PathBuf;

use url::Url;

use crate::error::{Result, SitechatError};

/// Default OpenAI-compatible API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";

/// Default embedding model when `EMBEDDING_MODEL` is unset.
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-ada-002";

// ---------------------------------------------------------------------------
// AppConfig
// ---------------------------------------------------------------------------

/// Runtime configuration resolved from the environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// API key for the hosted model provider (`OPENAI_API_KEY`).
    pub api_key: String,
    /// Base URL of the OpenAI-compatible API (`OPENAI_BASE_URL`).
    pub base_url: String,
    /// Sitemap URL to ingest (`SITE_MAP`). Only the ingest binary needs
    /// it; chat sessions run against an existing dataset without one.
    pub sitemap_url: Option<Url>,
    /// Path of the local vector dataset (`DATASET_PATH`).
    pub dataset_path: PathBuf,
    /// Chat model identifier (`LANGUAGE_MODEL`).
    pub chat_model: String,
    /// Embedding model identifier (`EMBEDDING_MODEL`).
    pub embedding_model: String,
    /// URL prefixes a page must match to be ingested (`URLS_FILTER`,
    /// comma-separated). Empty means no filtering.
    pub url_filters: Vec<String>,
}

impl AppConfig {
    /// Load configuration from the process environment.
    ///
    /// A `.env` file is loaded first if present (values already in the
    /// environment win, matching dotenvy semantics).
    pub fn from_env() -> Result<Self> {
        // Missing .env is fine; a malformed one is not silently ignored.
        match dotenvy::dotenv() {
            Ok(path) => tracing::debug!(?path, "loaded .env file"),
            Err(e) if e.not_found() => {}
            Err(e) => {
                return Err(SitechatError::config(format!("failed to read .env: {e}")));
            }
        }

        let api_key = require_var("OPENAI_API_KEY")?;
        let sitemap_url = match optional_var("SITE_MAP") {
            Some(raw) => Some(Url::parse(&raw).map_err(|e| {
                SitechatError::config(format!("SITE_MAP is not a valid URL ({raw}): {e}"))
            })?),
            None => None,
        };

        Ok(Self {
            api_key,
            base_url: optional_var("OPENAI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            sitemap_url,
            dataset_path: PathBuf::from(require_var("DATASET_PATH")?),
            chat_model: require_var("LANGUAGE_MODEL")?,
            embedding_model: optional_var("EMBEDDING_MODEL")
                .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
            url_filters: parse_filters(optional_var("URLS_FILTER").as_deref()),
        })
    }
}

/// Read a required environment variable, erroring when unset or empty.
fn require_var(name: &str) -> Result<String> {
    match std::env::var(name) {
        Ok(val) if !val.trim().is_empty() => Ok(val),
        _ => Err(SitechatError::config(format!(
            "{name} environment variable is not set"
        ))),
    }
}

/// Read an optional environment variable, treating empty as unset.
fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Split a comma-separated prefix list, trimming and dropping empties.
fn parse_filters(raw: Option<&str>) -> Vec<String> {
    raw.map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(String::from)
            .collect()
    })
    .unwrap_or_default()
}
