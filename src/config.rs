//! Configuration for the identity-provider integration.
//!
//! All structs deserialize from application config with serde; every knob
//! has a default so a minimal config is just the issuer URL and client id.
//! The client secret, when present, is wrapped in [`SecretString`] so it
//! never appears in `Debug` output or logs.

use secrecy::SecretString;
use serde::Deserialize;
use std::time::Duration;

/// Path Cognito-style providers publish their key set under.
pub const JWKS_PATH: &str = "/.well-known/jwks.json";

/// Identity provider endpoints and client registration.
#[derive(Debug, Clone, Deserialize)]
pub struct IdentityProviderConfig {
    /// Exact issuer URL tokens must carry in `iss`
    /// (e.g. `https://cognito-idp.us-east-1.amazonaws.com/us-east-1_AbC123`).
    pub issuer_url: String,

    /// Application client id; tokens must list it in `aud`.
    pub client_id: String,

    /// Client secret for confidential token-endpoint calls, if the client
    /// registration has one.
    #[serde(default)]
    pub client_secret: Option<SecretString>,

    /// Explicit JWKS endpoint. Defaults to `<issuer>/.well-known/jwks.json`.
    #[serde(default)]
    pub jwks_uri: Option<String>,

    /// Explicit token endpoint. Defaults to `<issuer>/oauth2/token`.
    #[serde(default)]
    pub token_endpoint: Option<String>,

    /// Explicit revocation endpoint. Defaults to `<issuer>/oauth2/revoke`.
    #[serde(default)]
    pub revocation_endpoint: Option<String>,

    /// Upper bound for any single HTTP call to the provider.
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
}

fn default_http_timeout_secs() -> u64 {
    10
}

impl IdentityProviderConfig {
    /// Minimal config for a public client.
    pub fn new(issuer_url: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            issuer_url: issuer_url.into(),
            client_id: client_id.into(),
            client_secret: None,
            jwks_uri: None,
            token_endpoint: None,
            revocation_endpoint: None,
            http_timeout_secs: default_http_timeout_secs(),
        }
    }

    /// Resolved JWKS endpoint.
    pub fn jwks_uri(&self) -> String {
        self.jwks_uri
            .clone()
            .unwrap_or_else(|| format!("{}{}", self.issuer_url.trim_end_matches('/'), JWKS_PATH))
    }

    /// Resolved token endpoint (sign-in and refresh flows).
    pub fn token_endpoint(&self) -> String {
        self.token_endpoint
            .clone()
            .unwrap_or_else(|| format!("{}/oauth2/token", self.issuer_url.trim_end_matches('/')))
    }

    /// Resolved revocation endpoint.
    pub fn revocation_endpoint(&self) -> String {
        self.revocation_endpoint
            .clone()
            .unwrap_or_else(|| format!("{}/oauth2/revoke", self.issuer_url.trim_end_matches('/')))
    }

    /// HTTP timeout as a [`Duration`].
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

/// Verification-pipeline tuning.
#[derive(Debug, Clone, Deserialize)]
pub struct VerifierOptions {
    /// Clock-skew tolerance applied to `exp`/`nbf`, in seconds.
    ///
    /// Defaults to 0: skew handling is an explicit configuration decision,
    /// not a silent default.
    #[serde(default)]
    pub clock_skew_secs: u64,

    /// Optional memoization of verification results keyed by raw token
    /// string, for identical tokens arriving in a request burst. Clamped to
    /// the clock-skew tolerance; `None` (the default) disables the memo.
    #[serde(default)]
    pub memo_ttl_secs: Option<u64>,
}

impl Default for VerifierOptions {
    fn default() -> Self {
        Self {
            clock_skew_secs: 0,
            memo_ttl_secs: None,
        }
    }
}

impl VerifierOptions {
    /// Clock-skew tolerance as a [`Duration`].
    pub fn clock_skew(&self) -> Duration {
        Duration::from_secs(self.clock_skew_secs)
    }

    /// Effective memo TTL: requested TTL clamped to the skew tolerance.
    /// A zero result disables memoization.
    pub fn memo_ttl(&self) -> Option<Duration> {
        let ttl = self.memo_ttl_secs?.min(self.clock_skew_secs);
        if ttl == 0 {
            None
        } else {
            Some(Duration::from_secs(ttl))
        }
    }
}

/// Key-set cache tuning.
#[derive(Debug, Clone, Deserialize)]
pub struct KeySetOptions {
    /// How long a fetched key set is served without re-fetching.
    #[serde(default = "default_keyset_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Floor between two fetches, so unknown-kid storms cannot hammer the
    /// provider's key endpoint.
    #[serde(default = "default_min_refresh_secs")]
    pub min_refresh_interval_secs: u64,
}

fn default_keyset_ttl_secs() -> u64 {
    600
}

fn default_min_refresh_secs() -> u64 {
    5
}

impl Default for KeySetOptions {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_keyset_ttl_secs(),
            min_refresh_interval_secs: default_min_refresh_secs(),
        }
    }
}

/// Session-store sizing. The per-record `expiry` stays authoritative; these
/// bounds are a memory safety net on top of it.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreOptions {
    /// Maximum number of distinct users held at once.
    #[serde(default = "default_max_users")]
    pub max_users: u64,

    /// Coarse write-expiry applied to a user's whole session map.
    #[serde(default = "default_store_ttl_secs")]
    pub write_ttl_secs: u64,
}

fn default_max_users() -> u64 {
    100_000
}

fn default_store_ttl_secs() -> u64 {
    86_400
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            max_users: default_max_users(),
            write_ttl_secs: default_store_ttl_secs(),
        }
    }
}
