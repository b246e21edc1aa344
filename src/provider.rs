//! Boundary to the external identity provider's token endpoints.
//!
//! The provider mints and revokes credentials; this crate only relays.
//! [`IdentityProvider`] is the seam the coordinator works against, and
//! [`HttpIdentityProvider`] is its production implementation: plain form
//! posts against the issuer's token and revocation endpoints with a bounded
//! timeout on every call.
//!
//! Error classification matters more than transport detail here: a
//! definitive rejection (the provider answered and said no) becomes
//! [`AuthError::ReauthRequired`], while timeouts, connection failures, and
//! server errors become the retryable [`AuthError::ProviderUnavailable`].

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::IdentityProviderConfig;
use crate::error::{AuthError, AuthResult};

/// Token pair minted by the identity provider.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderTokens {
    /// Fresh access token.
    pub access_token: String,
    /// Fresh refresh token. Refresh-flow responses may omit it, in which
    /// case the caller keeps using the previous one.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Relative expiry of the access token, seconds.
    pub expires_in: u64,
}

/// The identity provider's credential flows.
#[async_trait]
pub trait IdentityProvider: Send + Sync + std::fmt::Debug {
    /// Exchange primary credentials for a token pair.
    async fn sign_in(&self, username: &str, password: &str) -> AuthResult<ProviderTokens>;

    /// Exchange a refresh token for a new pair.
    async fn refresh(&self, refresh_token: &str) -> AuthResult<ProviderTokens>;

    /// Revoke an access token. Best-effort on the sign-out path.
    async fn revoke(&self, access_token: &str) -> AuthResult<()>;
}

/// HTTP implementation against OIDC-style token endpoints.
#[derive(Debug)]
pub struct HttpIdentityProvider {
    config: IdentityProviderConfig,
    http: reqwest::Client,
}

impl HttpIdentityProvider {
    /// Build a client for the configured provider. All calls share the
    /// configured timeout.
    pub fn new(config: IdentityProviderConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout())
            .build()
            .unwrap_or_default();
        Self { config, http }
    }

    async fn token_request(&self, form: Vec<(&str, &str)>) -> AuthResult<ProviderTokens> {
        let endpoint = self.config.token_endpoint();
        let mut form = form;
        form.push(("client_id", self.config.client_id.as_str()));
        let secret = self
            .config
            .client_secret
            .as_ref()
            .map(|s| s.expose_secret().clone());
        if let Some(secret) = secret.as_deref() {
            form.push(("client_secret", secret));
        }

        let response = self
            .http
            .post(&endpoint)
            .form(&form)
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        if status.is_client_error() {
            // The provider answered and rejected the grant: revoked or
            // expired refresh token, or bad credentials.
            let body = response.text().await.unwrap_or_default();
            warn!(endpoint = %endpoint, status = %status, body = %body, "token grant rejected");
            return Err(AuthError::ReauthRequired);
        }
        if !status.is_success() {
            return Err(AuthError::ProviderUnavailable(format!(
                "token endpoint returned status {status}"
            )));
        }

        response.json::<ProviderTokens>().await.map_err(|e| {
            AuthError::ProviderUnavailable(format!("malformed token endpoint response: {e}"))
        })
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn sign_in(&self, username: &str, password: &str) -> AuthResult<ProviderTokens> {
        debug!(username = %username, "sign-in grant");
        self.token_request(vec![
            ("grant_type", "password"),
            ("username", username),
            ("password", password),
        ])
        .await
    }

    async fn refresh(&self, refresh_token: &str) -> AuthResult<ProviderTokens> {
        debug!("refresh grant");
        self.token_request(vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ])
        .await
    }

    async fn revoke(&self, access_token: &str) -> AuthResult<()> {
        let endpoint = self.config.revocation_endpoint();
        let response = self
            .http
            .post(&endpoint)
            .form(&[
                ("token", access_token),
                ("client_id", self.config.client_id.as_str()),
            ])
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(AuthError::ProviderUnavailable(format!(
                "revocation endpoint returned status {status}"
            )))
        }
    }
}

/// Transport-level failures are all retryable.
fn classify_transport(e: reqwest::Error) -> AuthError {
    if e.is_timeout() {
        AuthError::ProviderUnavailable("token endpoint call timed out".into())
    } else {
        AuthError::ProviderUnavailable(format!("token endpoint unreachable: {e}"))
    }
}
