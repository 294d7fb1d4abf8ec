//! Machine-to-machine token acquisition and caching.
//!
//! The provider is the only shared mutable resource in the pipeline; it is
//! safe for concurrent use by multiple in-flight message handlers.

use std::time::{Duration, Instant};

use serde::Deserialize;
use serde_json::json;
use tokio::sync::RwLock;
use tracing::debug;

use crate::config::AuthConfig;
use crate::error::ProcessorError;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

struct CachedToken {
    token: String,
    expires_at: Instant,
}

/// Client-credentials token provider with an in-process cache.
pub struct M2mTokenProvider {
    client: reqwest::Client,
    config: AuthConfig,
    cache: RwLock<Option<CachedToken>>,
}

impl M2mTokenProvider {
    pub fn new(config: AuthConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
            cache: RwLock::new(None),
        }
    }

    /// Return a valid access token, fetching a new one when the cached
    /// token is missing or expired.
    pub async fn token(&self) -> Result<String, ProcessorError> {
        if let Some(cached) = self.cache.read().await.as_ref() {
            if cached.expires_at > Instant::now() {
                return Ok(cached.token.clone());
            }
        }

        let mut cache = self.cache.write().await;
        // Another handler may have refreshed while we waited for the lock.
        if let Some(cached) = cache.as_ref() {
            if cached.expires_at > Instant::now() {
                return Ok(cached.token.clone());
            }
        }

        let response = self
            .client
            .post(&self.config.token_url)
            .json(&json!({
                "client_id": self.config.client_id,
                "client_secret": self.config.client_secret,
                "audience": self.config.audience,
                "grant_type": "client_credentials",
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProcessorError::upstream_status(
                "token endpoint",
                status.as_u16(),
                &body,
            ));
        }

        let parsed: TokenResponse = response.json().await.map_err(|err| {
            ProcessorError::Upstream(format!("token endpoint returned a malformed body: {err}"))
        })?;

        let ttl_secs = parsed
            .expires_in
            .map(|secs| secs.min(self.config.token_cache_secs))
            .unwrap_or(self.config.token_cache_secs);
        debug!(ttl_secs, "fetched new m2m token");

        *cache = Some(CachedToken {
            token: parsed.access_token.clone(),
            expires_at: Instant::now() + Duration::from_secs(ttl_secs),
        });

        Ok(parsed.access_token)
    }
}
