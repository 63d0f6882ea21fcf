//! Wallet blacklist collaborator.
//!
//! Resolves a BAN address to an alias when the address is on the shared
//! scam list. Lookups are cached so claim bursts do not hammer the
//! upstream list.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::warn;

use crate::cache::BoundedTtlCache;
use crate::error::BridgeError;
use crate::types::canonical_native;

#[async_trait]
pub trait Blacklist: Send + Sync {
    /// `Some(alias)` when the address is blacklisted.
    async fn lookup(&self, native_address: &str) -> Result<Option<String>, BridgeError>;
}

/// Disabled blacklist for deployments without a configured list.
pub struct NoBlacklist;

#[async_trait]
impl Blacklist for NoBlacklist {
    async fn lookup(&self, _native_address: &str) -> Result<Option<String>, BridgeError> {
        Ok(None)
    }
}

#[derive(Deserialize)]
struct BlacklistEntry {
    address: String,
    #[serde(default)]
    alias: String,
}

pub struct HttpBlacklist {
    http: reqwest::Client,
    url: String,
    cache: Mutex<BoundedTtlCache<String, Option<String>>>,
}

impl HttpBlacklist {
    pub fn new(url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: url.to_string(),
            cache: Mutex::new(BoundedTtlCache::new(10_000, Duration::from_secs(3600))),
        }
    }
}

#[async_trait]
impl Blacklist for HttpBlacklist {
    async fn lookup(&self, native_address: &str) -> Result<Option<String>, BridgeError> {
        let native = canonical_native(native_address);
        {
            let cache = self.cache.lock().await;
            if let Some(cached) = cache.get(&native) {
                return Ok(cached.clone());
            }
        }

        let entries: Vec<BlacklistEntry> = self
            .http
            .get(&self.url)
            .send()
            .await
            .map_err(|e| BridgeError::UpstreamChain(format!("blacklist request: {e}")))?
            .json()
            .await
            .map_err(|e| BridgeError::UpstreamChain(format!("blacklist decode: {e}")))?;

        let hit = entries
            .into_iter()
            .find(|entry| canonical_native(&entry.address) == native)
            .map(|entry| entry.alias);
        if let Some(ref alias) = hit {
            warn!(address = %native, alias = %alias, "Blacklisted address lookup hit");
        }

        let mut cache = self.cache.lock().await;
        cache.insert(native, hit.clone());
        Ok(hit)
    }
}
