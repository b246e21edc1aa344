//! HTTP boundary adapter.
//!
//! The gate's contract is deliberately two methods: pull a bearer token out
//! of a request's headers, and turn a request into a [`Principal`]. The
//! secure HTTP-only cookie is checked before the `Authorization` header;
//! either is sufficient, and the absence of both is the anonymous state,
//! not an error. Routing, middleware wiring, and status mapping live with
//! the HTTP framework, which can use [`AuthError::status_hint`] for the
//! latter.
//!
//! [`AuthError::status_hint`]: crate::error::AuthError::status_hint

use http::header::{AUTHORIZATION, COOKIE};
use http::HeaderMap;
use std::sync::Arc;
use tracing::debug;

use crate::error::AuthResult;
use crate::principal::Principal;
use crate::verifier::TokenVerifier;

/// Cookie the sign-in path stores the access token under (HTTP-only,
/// secure, same-site strict; set by the HTTP layer).
pub const AUTH_COOKIE_NAME: &str = "auth_token";

/// Extracts and verifies bearer credentials at the request boundary.
#[derive(Debug)]
pub struct AuthenticationGate {
    verifier: Arc<TokenVerifier>,
}

impl AuthenticationGate {
    /// Build a gate over a verifier.
    pub fn new(verifier: Arc<TokenVerifier>) -> Self {
        Self { verifier }
    }

    /// Extract a raw bearer token: `auth_token` cookie first, then the
    /// `Authorization: Bearer` header. `None` means anonymous.
    pub fn extract_token(headers: &HeaderMap) -> Option<String> {
        token_from_cookie(headers).or_else(|| token_from_bearer_header(headers))
    }

    /// Resolve a request to its security principal.
    ///
    /// No token yields [`Principal::Anonymous`]; a present token is
    /// verified and any failure propagates for the boundary to map.
    ///
    /// # Errors
    ///
    /// Verification failures and key-retrieval errors from the pipeline.
    pub async fn authenticate(&self, headers: &HeaderMap) -> AuthResult<Principal> {
        match Self::extract_token(headers) {
            None => {
                debug!("no bearer credential presented, anonymous request");
                Ok(Principal::Anonymous)
            }
            Some(raw) => {
                let token = self.verifier.verify(&raw).await?;
                Ok(Principal::from_token(token))
            }
        }
    }
}

fn token_from_cookie(headers: &HeaderMap) -> Option<String> {
    for value in headers.get_all(COOKIE) {
        let Ok(cookies) = value.to_str() else { continue };
        for pair in cookies.split(';') {
            if let Some((name, value)) = pair.trim().split_once('=') {
                if name == AUTH_COOKIE_NAME && !value.is_empty() {
                    return Some(value.to_string());
                }
            }
        }
    }
    None
}

fn token_from_bearer_header(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}
