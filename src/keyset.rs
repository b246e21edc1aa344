//! JWKS fetching and caching.
//!
//! [`KeySetProvider`] owns the provider's public signing keys: lazily
//! fetched on first use, cached with a TTL, and replaced wholesale on
//! refresh. The swap is a single write of the cached [`Arc`], so concurrent
//! readers either see the old set or the new one, never a half-updated mix.
//!
//! A request carrying an unknown key id triggers at most one re-fetch for
//! that call (key rotation may have published a new key since the last
//! fetch); a still-unknown kid after that is reported as
//! [`VerificationReason::KeyUnavailable`], not retried in a loop. Fetches
//! themselves are rate limited by a minimum refresh interval.

use jsonwebtoken::jwk::{Jwk, JwkSet, KeyAlgorithm};
use jsonwebtoken::{Algorithm, DecodingKey};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::KeySetOptions;
use crate::error::{AuthError, AuthResult, VerificationReason};

/// One public signing key, resolved by key id.
///
/// Immutable once fetched; refreshes replace the whole set rather than
/// mutating keys in place.
#[derive(Clone)]
pub struct SigningKey {
    kid: String,
    algorithm: Algorithm,
    decoding_key: Arc<DecodingKey>,
}

impl SigningKey {
    /// Key id (`kid`) this key is published under.
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Signing algorithm the provider published for this key.
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Decoding key for signature verification.
    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }

    fn from_jwk(jwk: &Jwk) -> Option<Self> {
        let kid = jwk.common.key_id.clone()?;
        let algorithm = match jwk.common.key_algorithm {
            Some(KeyAlgorithm::RS256) | None => Algorithm::RS256,
            Some(KeyAlgorithm::RS384) => Algorithm::RS384,
            Some(KeyAlgorithm::RS512) => Algorithm::RS512,
            Some(other) => {
                warn!(kid = %kid, algorithm = ?other, "skipping key with unsupported algorithm");
                return None;
            }
        };
        match DecodingKey::from_jwk(jwk) {
            Ok(key) => Some(Self {
                kid,
                algorithm,
                decoding_key: Arc::new(key),
            }),
            Err(e) => {
                warn!(kid = %kid, error = %e, "skipping unusable JWK");
                None
            }
        }
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

/// A fetched key set with its fetch time.
struct CachedKeySet {
    keys: HashMap<String, SigningKey>,
    fetched_at: Instant,
}

impl CachedKeySet {
    fn is_fresh(&self, ttl: Duration) -> bool {
        self.fetched_at.elapsed() < ttl
    }
}

/// Fetches and caches the identity provider's public signing keys.
#[derive(Debug)]
pub struct KeySetProvider {
    jwks_uri: String,
    http: reqwest::Client,
    cache_ttl: Duration,
    min_refresh_interval: Duration,
    cache: RwLock<Option<Arc<CachedKeySet>>>,
    last_fetch: RwLock<Option<Instant>>,
}

impl std::fmt::Debug for CachedKeySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedKeySet")
            .field("keys", &self.keys.len())
            .field("fetched_at", &self.fetched_at)
            .finish()
    }
}

impl KeySetProvider {
    /// Create a provider for the given JWKS endpoint.
    ///
    /// The endpoint must be HTTPS; plain HTTP is accepted for localhost
    /// only, so tests can run against a local mock.
    pub fn new(jwks_uri: String, options: KeySetOptions, http_timeout: Duration) -> Self {
        Self {
            jwks_uri,
            http: reqwest::Client::builder()
                .timeout(http_timeout)
                .build()
                .unwrap_or_default(),
            cache_ttl: Duration::from_secs(options.cache_ttl_secs),
            min_refresh_interval: Duration::from_secs(options.min_refresh_interval_secs),
            cache: RwLock::new(None),
            last_fetch: RwLock::new(None),
        }
    }

    /// JWKS endpoint this provider fetches from.
    pub fn jwks_uri(&self) -> &str {
        &self.jwks_uri
    }

    /// Resolve a signing key by key id.
    ///
    /// Serves from the cached set when it is fresh and contains the kid.
    /// Otherwise fetches the full set once and looks the kid up in the
    /// replacement. A kid missing after a successful fetch is
    /// [`VerificationReason::KeyUnavailable`]; a failed fetch is the
    /// retryable [`AuthError::KeyRetrieval`].
    ///
    /// # Errors
    ///
    /// `KeyRetrieval` when the endpoint is unreachable or returns malformed
    /// data; `Verification { KeyUnavailable }` for an unknown kid.
    pub async fn get_key(&self, kid: &str) -> AuthResult<SigningKey> {
        {
            let cache = self.cache.read().await;
            if let Some(set) = cache.as_ref() {
                if set.is_fresh(self.cache_ttl) {
                    if let Some(key) = set.keys.get(kid) {
                        return Ok(key.clone());
                    }
                    debug!(kid = %kid, "kid not in cached key set, forcing one re-fetch");
                }
            }
        }

        // Cache miss, stale set, or unknown kid: one fetch, rate limited.
        let set = self.refresh().await?;
        set.keys.get(kid).cloned().ok_or_else(|| {
            warn!(kid = %kid, jwks_uri = %self.jwks_uri, "kid absent after key set fetch");
            AuthError::verification(VerificationReason::KeyUnavailable)
        })
    }

    /// Fetch the key set, honoring the minimum refresh interval.
    ///
    /// When rate limited and a cached set exists, the cached set is served
    /// even if stale; when nothing is cached yet, the fetch proceeds.
    async fn refresh(&self) -> AuthResult<Arc<CachedKeySet>> {
        let rate_limited = {
            let last = self.last_fetch.read().await;
            last.is_some_and(|at| at.elapsed() < self.min_refresh_interval)
        };
        if rate_limited {
            let cache = self.cache.read().await;
            if let Some(set) = cache.as_ref() {
                debug!(jwks_uri = %self.jwks_uri, "key set refresh rate limited, serving cached set");
                return Ok(Arc::clone(set));
            }
        }
        self.fetch_and_swap().await
    }

    /// Fetch the JWKS and replace the cached set atomically.
    async fn fetch_and_swap(&self) -> AuthResult<Arc<CachedKeySet>> {
        let url = Url::parse(&self.jwks_uri)
            .map_err(|e| AuthError::KeyRetrieval(format!("invalid JWKS endpoint URL: {e}")))?;
        let loopback = matches!(url.host_str(), Some("localhost" | "127.0.0.1" | "[::1]"));
        if url.scheme() != "https" && !(url.scheme() == "http" && loopback) {
            return Err(AuthError::KeyRetrieval(
                "JWKS endpoint must use HTTPS (plain HTTP allowed for loopback only)".into(),
            ));
        }

        info!(jwks_uri = %self.jwks_uri, "fetching key set");
        let response = self
            .http
            .get(&self.jwks_uri)
            .send()
            .await
            .map_err(|e| AuthError::KeyRetrieval(format!("JWKS fetch failed: {e}")))?;

        if !response.status().is_success() {
            return Err(AuthError::KeyRetrieval(format!(
                "JWKS endpoint returned status {}",
                response.status()
            )));
        }

        let jwks: JwkSet = response
            .json()
            .await
            .map_err(|e| AuthError::KeyRetrieval(format!("invalid JWKS payload: {e}")))?;

        let keys: HashMap<String, SigningKey> = jwks
            .keys
            .iter()
            .filter_map(SigningKey::from_jwk)
            .map(|k| (k.kid.clone(), k))
            .collect();

        info!(
            jwks_uri = %self.jwks_uri,
            key_count = keys.len(),
            "key set fetched"
        );

        let set = Arc::new(CachedKeySet {
            keys,
            fetched_at: Instant::now(),
        });

        // Whole-set swap: readers see the old set or this one, nothing in
        // between. The fetch happened outside any lock.
        *self.cache.write().await = Some(Arc::clone(&set));
        *self.last_fetch.write().await = Some(Instant::now());

        Ok(set)
    }

    /// Drop the cached set (tests and manual rotation handling).
    pub async fn clear_cache(&self) {
        *self.cache.write().await = None;
        *self.last_fetch.write().await = None;
        debug!(jwks_uri = %self.jwks_uri, "key set cache cleared");
    }
}
