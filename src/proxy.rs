//! Relay-proxy version cache
//!
//! Connections routed through the vendor relay must carry a freshly fetched
//! version value as a query parameter. The value is process-wide state with a
//! bounded staleness window and is injected into the transport explicitly.

use std::time::Instant;
use log::warn;
use tokio::sync::RwLock;

use crate::constants::{PROXY_VERSION_FALLBACK, PROXY_VERSION_MAX_AGE};

struct CachedVersion {
    value: u64,
    fetched_at: Instant,
}

/// Fetches and caches the relay version value.
pub struct VersionCache {
    endpoint: String,
    http: reqwest::Client,
    cached: RwLock<Option<CachedVersion>>,
}

impl VersionCache {
    /// `endpoint` must answer GET with a JSON object carrying
    /// `minPublishedTime`.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            http: reqwest::Client::new(),
            cached: RwLock::new(None),
        }
    }

    /// Current version value, re-fetched when the cached one is stale.
    /// Failed fetches log a warning and fall back to a sentinel the relay
    /// accepts as "newest".
    pub async fn get(&self) -> u64 {
        {
            let cached = self.cached.read().await;
            if let Some(entry) = cached.as_ref() {
                if entry.fetched_at.elapsed() < PROXY_VERSION_MAX_AGE {
                    return entry.value;
                }
            }
        }

        match self.fetch().await {
            Some(value) => {
                let mut cached = self.cached.write().await;
                *cached = Some(CachedVersion {
                    value,
                    fetched_at: Instant::now(),
                });
                value
            }
            None => {
                warn!("Failed to fetch relay version from {}", self.endpoint);
                PROXY_VERSION_FALLBACK
            }
        }
    }

    async fn fetch(&self) -> Option<u64> {
        let response = self.http.get(&self.endpoint).send().await.ok()?;
        if !response.status().is_success() {
            return None;
        }
        let body: serde_json::Value = response.json().await.ok()?;
        body.get("minPublishedTime").and_then(|v| v.as_u64())
    }
}
