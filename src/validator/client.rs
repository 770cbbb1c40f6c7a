// src/validator/client.rs

use super::model::{JsonWebKeySet, KeySet};
use crate::config::Config;
use crate::error::RpError;
use async_trait::async_trait;
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

/// Anything that can hand out the provider's signing keys.
#[async_trait]
pub trait KeySource: Send + Sync {
    /// Returns the key set to verify the next token against.
    async fn fetch_keys(&self) -> Result<KeySet, RpError>;
}

/// A client for fetching JSON Web Keys (JWKs) from the provider's `/id/keys` endpoint.
///
/// Every call goes to the network, so a rotated key is visible on the next
/// login. Wrap it in [`CachedKeySource`] to memoize.
#[derive(Clone)]
pub struct JwksClient {
    // The client is internally ref-counted to allow for cheap cloning.
    inner: Arc<Inner>,
}

struct Inner {
    http_client: reqwest::Client,
    jwks_uri: Url,
}

impl JwksClient {
    /// Creates a new `JwksClient` for the configured provider.
    pub fn new(config: &Config) -> Result<Self, RpError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(|e| RpError::InvalidConfiguration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_http_client(http_client, config.keys_endpoint()?))
    }

    /// Creates a `JwksClient` around an existing HTTP client.
    pub fn with_http_client(http_client: reqwest::Client, jwks_uri: Url) -> Self {
        Self {
            inner: Arc::new(Inner { http_client, jwks_uri }),
        }
    }

    /// The endpoint this client fetches from.
    pub fn jwks_uri(&self) -> &Url {
        &self.inner.jwks_uri
    }

    /// Fetches and indexes the provider's current key set.
    #[instrument(skip(self), fields(jwks_uri = %self.inner.jwks_uri), err)]
    pub async fn fetch(&self) -> Result<KeySet, RpError> {
        let response = self
            .inner
            .http_client
            .get(self.inner.jwks_uri.clone())
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(RpError::key_fetch_transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(RpError::KeyFetch(format!("HTTP {}", status.as_u16())));
        }

        let max_age = parse_cache_control(&response);

        let body = response.bytes().await.map_err(RpError::key_fetch_transport)?;
        let jwks: JsonWebKeySet =
            serde_json::from_slice(&body).map_err(|e| RpError::KeyFetch(format!("invalid JWKS: {e}")))?;

        let set = KeySet::from_jwks(jwks)?.with_max_age(max_age);
        debug!("Successfully fetched {} keys (max-age: {:?})", set.len(), max_age);
        Ok(set)
    }
}

#[async_trait]
impl KeySource for JwksClient {
    async fn fetch_keys(&self) -> Result<KeySet, RpError> {
        self.fetch().await
    }
}

/// Parses the `Cache-Control` header to determine the TTL.
fn parse_cache_control(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get(reqwest::header::CACHE_CONTROL)?
        .to_str()
        .ok()?
        .split(',')
        .find_map(|part| {
            part.trim()
                .strip_prefix("max-age=")?
                .parse::<u64>()
                .ok()
                .map(Duration::from_secs)
        })
}

/// Memoizes another [`KeySource`] for a bounded time.
///
/// The TTL is the provider's `max-age` when it sent one, otherwise the
/// fallback given at construction. Call [`CachedKeySource::invalidate`] after
/// a `KeyNotFound` to force the next call to refetch.
#[derive(Clone)]
pub struct CachedKeySource<S> {
    source: S,
    fallback_ttl: Duration,
    cache: Cache<(), Arc<KeySet>>,
}

impl<S: KeySource> CachedKeySource<S> {
    /// Wraps `source`, caching its key set for at most `fallback_ttl` when the
    /// provider gives no `max-age`.
    pub fn new(source: S, fallback_ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(1)
            .expire_after(PerSetExpiry { fallback_ttl })
            .build();
        Self { source, fallback_ttl, cache }
    }

    /// Drops the cached set.
    pub async fn invalidate(&self) {
        self.cache.invalidate(&()).await;
    }

    pub fn fallback_ttl(&self) -> Duration {
        self.fallback_ttl
    }
}

#[async_trait]
impl<S: KeySource> KeySource for CachedKeySource<S> {
    /// Concurrent misses share a single fetch; every waiter gets its result.
    async fn fetch_keys(&self) -> Result<KeySet, RpError> {
        let set = self
            .cache
            .try_get_with((), async {
                debug!("JWKS cache miss. Fetching from provider.");
                self.source.fetch_keys().await.map(Arc::new)
            })
            .await
            .map_err(|e: Arc<RpError>| (*e).clone())?;
        Ok((*set).clone())
    }
}

struct PerSetExpiry {
    fallback_ttl: Duration,
}

impl moka::Expiry<(), Arc<KeySet>> for PerSetExpiry {
    fn expire_after_create(&self, _key: &(), value: &Arc<KeySet>, _created_at: std::time::Instant) -> Option<Duration> {
        Some(value.max_age().unwrap_or(self.fallback_ttl))
    }
}
