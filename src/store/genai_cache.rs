//! Remote cached-content API client
//!
//! Thin adapter for the generative-AI cached-content endpoint: submit a
//! block of text with a TTL, get back an opaque handle name and its expiry.
//! Cache creation is best-effort for callers, so errors carry enough detail
//! to log and move on.

use crate::error::{AutopilotError, Result};
use crate::store::{CacheCreator, CreatedCache};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Cached-content API client configuration
#[derive(Debug, Clone)]
pub struct GenaiCacheConfig {
    pub api_key: String,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for GenaiCacheConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            timeout_secs: 30,
        }
    }
}

impl GenaiCacheConfig {
    pub fn from_env() -> Self {
        Self {
            api_key: std::env::var("GENAI_API_KEY").unwrap_or_default(),
            base_url: std::env::var("GENAI_API_URL").unwrap_or_else(|_| {
                "https://generativelanguage.googleapis.com/v1beta".to_string()
            }),
            timeout_secs: 30,
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }
}

#[derive(Debug, Serialize)]
struct CreateCacheRequest<'a> {
    model: &'a str,
    contents: Vec<Content<'a>>,
    ttl: String,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateCacheResponse {
    name: String,
    expire_time: DateTime<Utc>,
}

pub struct GenaiCacheClient {
    config: GenaiCacheConfig,
    client: Client,
}

impl GenaiCacheClient {
    pub fn new(config: GenaiCacheConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl CacheCreator for GenaiCacheClient {
    async fn create_cache(
        &self,
        model: &str,
        contents: &str,
        ttl: Duration,
    ) -> Result<CreatedCache> {
        let url = format!(
            "{}/cachedContents?key={}",
            self.config.base_url, self.config.api_key
        );
        let request = CreateCacheRequest {
            model,
            contents: vec![Content {
                parts: vec![Part { text: contents }],
            }],
            ttl: format!("{}s", ttl.as_secs()),
        };

        let response = self.client.post(&url).json(&request).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AutopilotError::CacheCreation(format!(
                "cache API returned {status}: {body}"
            )));
        }

        let created: CreateCacheResponse = response.json().await?;
        debug!(
            "Created cached content {} (expires {})",
            created.name, created.expire_time
        );

        Ok(CreatedCache {
            name: created.name,
            expire_time: created.expire_time,
        })
    }
}
