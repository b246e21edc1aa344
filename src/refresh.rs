//! Sign-in, refresh, and sign-out coordination over the session store.
//!
//! The coordinator owns the write path into [`SessionTokenStore`]: every
//! provider call happens strictly *before* the store write, so a hung or
//! failed network call never holds a store entry locked and a failed
//! refresh leaves the prior record untouched.
//!
//! Per-session lifecycle: ANONYMOUS → AUTHENTICATED on sign-in, refresh
//! keeps the session AUTHENTICATED under the same session id, sign-out or
//! account-wide revocation is terminal. Getting back requires a fresh
//! sign-in, which mints a new session id.

use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::AuthResult;
use crate::provider::IdentityProvider;
use crate::store::SessionTokenStore;

/// Outcome of a successful sign-in or refresh.
#[derive(Debug, Clone)]
pub struct AuthenticationResult {
    /// The authenticated user.
    pub user_id: String,
    /// Session the tokens belong to. Stable across refreshes.
    pub session_id: String,
    /// Fresh access token.
    pub access_token: String,
    /// Refresh token to present at the next refresh.
    pub refresh_token: String,
    /// Relative access-token expiry, seconds.
    pub expires_in: u64,
}

/// Coordinates provider credential flows with the session store.
#[derive(Debug)]
pub struct TokenRefreshCoordinator {
    provider: Arc<dyn IdentityProvider>,
    store: Arc<SessionTokenStore>,
}

impl TokenRefreshCoordinator {
    /// Wire a coordinator over a provider client and a store.
    pub fn new(provider: Arc<dyn IdentityProvider>, store: Arc<SessionTokenStore>) -> Self {
        Self { provider, store }
    }

    /// The session store this coordinator writes through.
    pub fn store(&self) -> &Arc<SessionTokenStore> {
        &self.store
    }

    /// Exchange credentials for a token pair and open a new session.
    ///
    /// Each sign-in mints a fresh session id, so the same user on two
    /// devices holds two independent records.
    ///
    /// # Errors
    ///
    /// `ReauthRequired` when the provider rejects the credentials;
    /// `ProviderUnavailable` on transport failures (retryable). Nothing is
    /// written to the store on failure.
    pub async fn sign_in(&self, user_id: &str, password: &str) -> AuthResult<AuthenticationResult> {
        let tokens = self.provider.sign_in(user_id, password).await?;
        let refresh_token = tokens.refresh_token.ok_or_else(|| {
            crate::error::AuthError::ProviderUnavailable(
                "sign-in response carried no refresh token".into(),
            )
        })?;

        let session_id = Uuid::new_v4().to_string();
        self.store.put(
            user_id,
            &session_id,
            &tokens.access_token,
            &refresh_token,
            tokens.expires_in,
        );
        info!(user = %user_id, session = %session_id, "session authenticated");

        Ok(AuthenticationResult {
            user_id: user_id.to_string(),
            session_id,
            access_token: tokens.access_token,
            refresh_token,
            expires_in: tokens.expires_in,
        })
    }

    /// Exchange a refresh token for a new pair and replace the session's
    /// record in place, preserving session identity.
    ///
    /// When the provider omits a new refresh token, the supplied one stays
    /// in use.
    ///
    /// # Errors
    ///
    /// `ReauthRequired` when the refresh token is revoked or expired; the
    /// existing record is left as it was, so the caller decides whether to
    /// force sign-out. `ProviderUnavailable` on transport failures
    /// (retryable, record also untouched).
    pub async fn refresh(
        &self,
        user_id: &str,
        session_id: &str,
        refresh_token: &str,
    ) -> AuthResult<AuthenticationResult> {
        // Network first. The store is only touched once the provider has
        // answered with a new pair.
        let tokens = self.provider.refresh(refresh_token).await?;
        let new_refresh = tokens
            .refresh_token
            .unwrap_or_else(|| refresh_token.to_string());

        self.store.put(
            user_id,
            session_id,
            &tokens.access_token,
            &new_refresh,
            tokens.expires_in,
        );
        info!(user = %user_id, session = %session_id, "session refreshed");

        Ok(AuthenticationResult {
            user_id: user_id.to_string(),
            session_id: session_id.to_string(),
            access_token: tokens.access_token,
            refresh_token: new_refresh,
            expires_in: tokens.expires_in,
        })
    }

    /// Close one session: best-effort provider revocation of its access
    /// token, then eviction. The session is gone even when revocation
    /// fails; siblings of the same user are untouched.
    pub async fn sign_out(&self, user_id: &str, session_id: &str) -> AuthResult<()> {
        if let Some(record) = self.store.get(user_id, session_id) {
            if let Err(e) = self.provider.revoke(&record.access_token).await {
                warn!(
                    user = %user_id,
                    session = %session_id,
                    error = %e,
                    "token revocation failed, evicting session anyway"
                );
            }
        }
        self.store.invalidate_session(user_id, session_id);
        info!(user = %user_id, session = %session_id, "session signed out");
        Ok(())
    }

    /// Account-wide revocation: drop every session the user holds.
    pub fn revoke_user(&self, user_id: &str) {
        self.store.invalidate_all_sessions(user_id);
        info!(user = %user_id, "all sessions revoked");
    }
}
