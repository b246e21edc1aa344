//! The token verification pipeline.
//!
//! [`TokenVerifier::verify`] turns a raw bearer token into a verified
//! [`DecodedToken`]:
//!
//! 1. Parse the header without trusting it (kid + declared algorithm).
//! 2. Resolve the signing key through [`KeySetProvider`].
//! 3. Verify the signature and the standard claims (exact issuer, audience
//!    containing the client id, expiry with configured leeway).
//! 4. Enforce the provider's `token_use` purpose claim: `access` and `id`
//!    only; refresh tokens must never be presented here.
//! 5. Normalize into the canonical claim shape.
//!
//! Every rejection carries a [`VerificationReason`] so the boundary adapter
//! can answer 401 vs 403 vs 5xx without parsing error text. A bad-signature
//! verdict is final: the pipeline never re-fetches keys to retry it.

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, Validation};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::claims::{ClaimNormalizer, DecodedToken, TokenUse};
use crate::config::VerifierOptions;
use crate::error::{AuthError, AuthResult, VerificationReason};
use crate::keyset::KeySetProvider;

/// Registered claims the pipeline validates before normalization.
#[derive(Debug, Deserialize)]
struct RawClaims {
    token_use: Option<String>,
}

/// Upper bound on memoized verification results held at once.
const MEMO_MAX_ENTRIES: u64 = 10_000;

/// Short-TTL memo of verification results, keyed by raw token string.
///
/// The TTL is clamped to the clock-skew tolerance, so a memoized token can
/// never outlive the window in which re-verification could have rejected
/// it. Backed by a size-bounded cache with time-to-live eviction: entries
/// for tokens that never recur are still evicted, so rotating-token
/// traffic cannot grow the memo without bound.
struct VerifyMemo {
    ttl: Duration,
    entries: moka::sync::Cache<String, DecodedToken>,
}

impl VerifyMemo {
    fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: moka::sync::Cache::builder()
                .max_capacity(MEMO_MAX_ENTRIES)
                .time_to_live(ttl)
                .build(),
        }
    }

    fn get(&self, raw: &str) -> Option<DecodedToken> {
        self.entries.get(raw)
    }

    fn insert(&self, raw: &str, token: &DecodedToken) {
        self.entries.insert(raw.to_string(), token.clone());
    }
}

/// Verifies bearer tokens against the provider's rotating key set.
pub struct TokenVerifier {
    issuer: String,
    client_id: String,
    keys: Arc<KeySetProvider>,
    clock_skew: Duration,
    memo: Option<VerifyMemo>,
}

impl std::fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenVerifier")
            .field("issuer", &self.issuer)
            .field("client_id", &self.client_id)
            .field("clock_skew", &self.clock_skew)
            .field("memo", &self.memo.as_ref().map(|m| m.ttl))
            .finish_non_exhaustive()
    }
}

impl TokenVerifier {
    /// Build a verifier for the configured issuer and client id.
    pub fn new(
        issuer: impl Into<String>,
        client_id: impl Into<String>,
        keys: Arc<KeySetProvider>,
        options: VerifierOptions,
    ) -> Self {
        Self {
            issuer: issuer.into(),
            client_id: client_id.into(),
            keys,
            clock_skew: options.clock_skew(),
            memo: options.memo_ttl().map(VerifyMemo::new),
        }
    }

    /// Expected issuer URL.
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Expected audience (the application client id).
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Verify a raw bearer token into a [`DecodedToken`].
    ///
    /// # Errors
    ///
    /// `Verification { reason }` for any per-token rejection (terminal for
    /// that token); `KeyRetrieval` when the key endpoint cannot be reached
    /// (retryable, and must surface as a 5xx, not a 401).
    pub async fn verify(&self, raw_token: &str) -> AuthResult<DecodedToken> {
        if let Some(memo) = &self.memo {
            if let Some(token) = memo.get(raw_token) {
                debug!(subject = %token.subject, "serving memoized verification result");
                return Ok(token);
            }
        }

        // Untrusted header parse: only kid and declared algorithm come out.
        let header = decode_header(raw_token).map_err(|e| {
            debug!(token = %abbreviate_token(raw_token), error = %e, "token header unparseable");
            AuthError::verification(VerificationReason::Malformed)
        })?;
        let kid = header
            .kid
            .ok_or_else(|| {
                debug!(token = %abbreviate_token(raw_token), "token header carries no kid");
                AuthError::verification(VerificationReason::Malformed)
            })?;

        let key = self.keys.get_key(&kid).await?;

        // The resolved key's algorithm is authoritative. A token declaring
        // anything else cannot carry a valid signature under this key.
        if header.alg != key.algorithm() {
            warn!(
                token = %abbreviate_token(raw_token),
                declared = ?header.alg,
                expected = ?key.algorithm(),
                "declared algorithm does not match signing key"
            );
            return Err(AuthError::verification(VerificationReason::BadSignature));
        }

        let mut validation = Validation::new(key.algorithm());
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.client_id]);
        validation.leeway = self.clock_skew.as_secs();

        let data = decode::<RawClaims>(raw_token, key.decoding_key(), &validation).map_err(|e| {
            let reason = reason_for(e.kind());
            warn!(
                token = %abbreviate_token(raw_token),
                reason = %reason,
                error = %e,
                "token rejected"
            );
            AuthError::verification(reason)
        })?;

        // Purpose check runs only after the signature held, so a correctly
        // signed refresh token is WRONG_TOKEN_USE, never BAD_SIGNATURE.
        match data.claims.token_use.as_deref().and_then(TokenUse::parse) {
            Some(_) => {}
            None => {
                warn!(
                    token = %abbreviate_token(raw_token),
                    token_use = data.claims.token_use.as_deref().unwrap_or("<absent>"),
                    "token purpose not acceptable"
                );
                return Err(AuthError::verification(VerificationReason::WrongTokenUse));
            }
        }

        let token = ClaimNormalizer::normalize(raw_token)?;
        debug!(
            subject = %token.subject,
            token = %abbreviate_token(raw_token),
            "token verified"
        );

        if let Some(memo) = &self.memo {
            memo.insert(raw_token, &token);
        }
        Ok(token)
    }
}

/// Map `jsonwebtoken` failure kinds onto the reason taxonomy.
fn reason_for(kind: &ErrorKind) -> VerificationReason {
    match kind {
        ErrorKind::InvalidSignature => VerificationReason::BadSignature,
        // Outside the validity window, either direction.
        ErrorKind::ExpiredSignature | ErrorKind::ImmatureSignature => VerificationReason::Expired,
        ErrorKind::InvalidIssuer => VerificationReason::BadIssuer,
        ErrorKind::InvalidAudience => VerificationReason::BadAudience,
        ErrorKind::MissingRequiredClaim(claim) => match claim.as_str() {
            "iss" => VerificationReason::BadIssuer,
            "aud" => VerificationReason::BadAudience,
            "exp" => VerificationReason::Expired,
            _ => VerificationReason::Malformed,
        },
        ErrorKind::InvalidToken
        | ErrorKind::Base64(_)
        | ErrorKind::Json(_)
        | ErrorKind::Utf8(_) => VerificationReason::Malformed,
        // Algorithm mismatches cannot have produced a valid signature.
        ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => {
            VerificationReason::BadSignature
        }
        _ => VerificationReason::BadSignature,
    }
}

/// Abbreviate a token for logging: first 8 and last 4 characters. Raw
/// tokens must never be logged whole.
pub(crate) fn abbreviate_token(token: &str) -> String {
    if token.len() <= 12 {
        return token.to_string();
    }
    format!("{}...{}", &token[..8], &token[token.len() - 4..])
}
