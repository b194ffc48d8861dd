//! Remote JWKS key source.
//!
//! Lets a resource server in another process verify tokens using only the
//! authorization server's published `/.well-known/jwks.json`:
//! - Connection pooling and fail-fast timeouts via reqwest
//! - Keys cached by `kid` with a TTL
//! - Refetch when a token names an unknown `kid` (key rollover), at most once
//!   per cooldown and coalesced across concurrent requests

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::DecodingKey;
use moka::future::Cache;
use reqwest::Client;
use tokio::sync::Mutex;

use super::{JwkSet, KeySource};
use crate::config::Config;
use crate::error::JwksError;

/// Fetches and caches verification keys from a JWKS URL.
#[derive(Clone)]
pub struct RemoteJwks {
    /// HTTP client.
    client: Client,

    /// Verification keys by `kid`.
    cache: Cache<String, Arc<DecodingKey>>,

    /// JWKS document URL.
    url: String,

    /// When the key set was last loaded. Held across a refetch so concurrent misses wait for it.
    last_refresh: Arc<Mutex<Option<Instant>>>,

    refetch_cooldown: Duration,
}

impl RemoteJwks {
    /// Create a key source for `url` using the timeouts and cache settings in `config`.
    ///
    /// # Errors
    ///
    /// Returns error if HTTP client initialization fails.
    pub fn new(url: impl Into<String>, config: &Config) -> Result<Self, JwksError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()?;

        let cache = Cache::builder()
            .max_capacity(config.jwks_cache_max_size)
            .time_to_live(config.jwks_cache_ttl)
            .build();

        Ok(Self {
            client,
            cache,
            url: url.into(),
            last_refresh: Arc::new(Mutex::new(None)),
            refetch_cooldown: config.jwks_refetch_cooldown,
        })
    }

    /// Download the key set.
    pub async fn fetch(&self) -> Result<JwkSet, JwksError> {
        tracing::debug!(url = %self.url, "Fetching JWKS");

        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            tracing::warn!(url = %self.url, status = status.as_u16(), "JWKS fetch failed");
            return Err(JwksError::Status(status.as_u16()));
        }

        Ok(response.json::<JwkSet>().await?)
    }

    /// Fetch the key set and replace cached keys. Keys that cannot be used are skipped.
    async fn refresh(&self) -> Result<usize, JwksError> {
        let set = self.fetch().await?;
        let mut loaded = 0;

        for jwk in set.keys {
            let Some(kid) = jwk.kid.clone() else {
                tracing::debug!("Skipping JWK without kid");
                continue;
            };
            match jwk.decoding_key() {
                Ok(key) => {
                    self.cache.insert(kid, Arc::new(key)).await;
                    loaded += 1;
                }
                Err(e) => tracing::debug!(kid = %kid, error = %e, "Skipping unusable JWK"),
            }
        }

        tracing::info!(url = %self.url, keys = loaded, "Loaded JWKS");
        Ok(loaded)
    }
}

#[async_trait]
impl KeySource for RemoteJwks {
    async fn verification_key(&self, kid: Option<&str>) -> Result<Arc<DecodingKey>, JwksError> {
        // Remote sets can hold several keys, so the token must say which one.
        let Some(kid) = kid else {
            return Err(JwksError::UnknownKid(None));
        };

        if let Some(key) = self.cache.get(kid).await {
            return Ok(key);
        }

        let mut last_refresh = self.last_refresh.lock().await;

        // Another request may have loaded it while we waited
        if let Some(key) = self.cache.get(kid).await {
            return Ok(key);
        }

        let cooling_down = last_refresh.is_some_and(|at| at.elapsed() < self.refetch_cooldown);
        if cooling_down {
            tracing::debug!(kid = %kid, "Unknown kid within refetch cooldown");
            return Err(JwksError::UnknownKid(Some(kid.to_string())));
        }

        self.refresh().await?;
        *last_refresh = Some(Instant::now());
        drop(last_refresh);

        self.cache.get(kid).await.ok_or_else(|| JwksError::UnknownKid(Some(kid.to_string())))
    }
}

impl std::fmt::Debug for RemoteJwks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteJwks").field("url", &self.url).finish_non_exhaustive()
    }
}
