//! Authentication token lifecycle core.
//!
//! Verifies JWT bearer tokens against an identity provider's rotating key
//! set, manages multi-session token pairs per user, and coordinates the
//! sign-in / refresh / sign-out flows against the provider's token
//! endpoints. Designed to sit behind an HTTP boundary owned by the
//! application; this crate never parses request bodies or maps errors to
//! responses itself (though [`AuthError::status_hint`] tells the boundary
//! which status fits).
//!
//! # Architecture
//!
//! - [`KeySetProvider`]: JWKS fetching and whole-set atomic caching, with
//!   a one-shot re-fetch on unknown key ids and rate-limited refreshes.
//! - [`TokenVerifier`]: the verification pipeline (header parse, key
//!   resolution, signature and standard-claim checks, token-purpose
//!   enforcement, claim normalization).
//! - [`SessionTokenStore`]: concurrent user/session/token-pair store
//!   with per-user atomic structural updates.
//! - [`HttpIdentityProvider`] / [`IdentityProvider`]: the seam to the
//!   provider's token and revocation endpoints.
//! - [`TokenRefreshCoordinator`]: sign-in, refresh, and sign-out flows,
//!   always calling the network before touching the store.
//! - [`AuthenticationGate`]: boundary adapter extracting the bearer token
//!   (cookie first, then `Authorization` header) and producing a
//!   [`Principal`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use boxoffice_auth::{
//!     AuthenticationGate, IdentityProviderConfig, KeySetOptions, KeySetProvider,
//!     TokenVerifier, VerifierOptions,
//! };
//!
//! # async fn demo() -> boxoffice_auth::AuthResult<()> {
//! let config = IdentityProviderConfig::new(
//!     "https://cognito-idp.us-east-1.amazonaws.com/us-east-1_AbC123",
//!     "my-client-id",
//! );
//! let keys = Arc::new(KeySetProvider::new(
//!     config.jwks_uri(),
//!     KeySetOptions::default(),
//!     config.http_timeout(),
//! ));
//! let verifier = Arc::new(TokenVerifier::new(
//!     config.issuer_url.clone(),
//!     config.client_id.clone(),
//!     keys,
//!     VerifierOptions::default(),
//! ));
//! let gate = AuthenticationGate::new(verifier);
//!
//! let headers = http::HeaderMap::new();
//! let principal = gate.authenticate(&headers).await?;
//! assert!(principal.is_anonymous());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod claims;
pub mod config;
pub mod error;
pub mod gate;
pub mod keyset;
pub mod principal;
pub mod provider;
pub mod refresh;
pub mod store;
pub mod verifier;

pub use claims::{ClaimNormalizer, ClaimValue, DecodedToken, TokenUse};
pub use config::{
    IdentityProviderConfig, KeySetOptions, StoreOptions, VerifierOptions, JWKS_PATH,
};
pub use error::{AuthError, AuthResult, VerificationReason};
pub use gate::{AuthenticationGate, AUTH_COOKIE_NAME};
pub use keyset::{KeySetProvider, SigningKey};
pub use principal::{AuthenticatedPrincipal, Principal, ROLE_PREFIX};
pub use provider::{HttpIdentityProvider, IdentityProvider, ProviderTokens};
pub use refresh::{AuthenticationResult, TokenRefreshCoordinator};
pub use store::{SessionTokenStore, TokenRecord};
pub use verifier::TokenVerifier;
