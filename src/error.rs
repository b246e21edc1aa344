//! Error taxonomy for the token lifecycle core.
//!
//! Failures split into two families the HTTP boundary must keep apart:
//!
//! - **Retryable** (`KeyRetrieval`, `ProviderUnavailable`): the identity
//!   provider is unreachable or returned malformed data. Mapped to a 5xx;
//!   a 401 here would wrongly imply the caller's token is invalid.
//! - **Terminal** (`Verification`, `ReauthRequired`): the presented token
//!   or refresh token is definitively rejected. Never retried with the same
//!   input. Mapped to 401/403 with a generic client-facing message; the
//!   detailed reason is logged, not returned.

use http::StatusCode;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type AuthResult<T> = Result<T, AuthError>;

/// Why a token failed verification.
///
/// Reasons are machine-readable so the boundary adapter can map them to
/// distinct HTTP statuses without re-deriving the cause from an error
/// message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum VerificationReason {
    /// Token is not a syntactically valid JWT (wrong segment count, bad
    /// encoding, missing key id).
    Malformed,
    /// Signature does not verify against the resolved signing key, or the
    /// declared algorithm cannot have produced a valid signature under it.
    BadSignature,
    /// `exp` is in the past (or `nbf` in the future) relative to
    /// verification time, beyond the configured clock-skew tolerance.
    Expired,
    /// `iss` does not exactly equal the configured provider issuer URL.
    BadIssuer,
    /// `aud` does not contain the configured client identifier.
    BadAudience,
    /// `token_use` is not `access` or `id`; refresh tokens are opaque and
    /// must never reach the verifier.
    WrongTokenUse,
    /// Key id absent from the key set even after a successful re-fetch:
    /// an unknown or rotated-out key.
    KeyUnavailable,
}

impl std::fmt::Display for VerificationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Malformed => "MALFORMED",
            Self::BadSignature => "BAD_SIGNATURE",
            Self::Expired => "EXPIRED",
            Self::BadIssuer => "BAD_ISSUER",
            Self::BadAudience => "BAD_AUDIENCE",
            Self::WrongTokenUse => "WRONG_TOKEN_USE",
            Self::KeyUnavailable => "KEY_UNAVAILABLE",
        };
        f.write_str(s)
    }
}

/// Authentication and token lifecycle errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AuthError {
    /// The provider's key endpoint is unreachable or returned malformed
    /// data. Transient; the caller may retry.
    #[error("signing key retrieval failed: {0}")]
    KeyRetrieval(String),

    /// A presented token was definitively rejected. Never retried with the
    /// same token.
    #[error("token verification failed: {reason}")]
    Verification {
        /// Machine-readable rejection cause.
        reason: VerificationReason,
    },

    /// The refresh token was rejected by the identity provider (revoked or
    /// expired). The caller must force a fresh sign-in.
    #[error("refresh rejected by identity provider; re-authentication required")]
    ReauthRequired,

    /// The identity provider's token endpoint is unreachable, timed out, or
    /// answered with a server error. Transient; the caller may retry.
    #[error("identity provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Internal session-store invariant violation (e.g. an empty session
    /// map leaked). Should be unreachable; logged as fatal.
    #[error("session store inconsistency: {0}")]
    StoreInconsistency(String),
}

impl AuthError {
    /// Shorthand constructor for verification failures.
    pub fn verification(reason: VerificationReason) -> Self {
        Self::Verification { reason }
    }

    /// Whether the operation may be retried with the same input.
    ///
    /// Bad-signature verdicts and refresh rejections are terminal; only
    /// provider-connectivity failures are worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::KeyRetrieval(_) | Self::ProviderUnavailable(_))
    }

    /// The verification reason, if this is a verification failure.
    pub fn verification_reason(&self) -> Option<VerificationReason> {
        match self {
            Self::Verification { reason } => Some(*reason),
            _ => None,
        }
    }

    /// HTTP status the boundary adapter should answer with.
    ///
    /// Provider outages are 502, not 401, since the caller's token has not
    /// been judged. Wrong token purpose is a 403: the token is authentic but not
    /// acceptable here.
    pub fn status_hint(&self) -> StatusCode {
        match self {
            Self::KeyRetrieval(_) | Self::ProviderUnavailable(_) => StatusCode::BAD_GATEWAY,
            Self::Verification {
                reason: VerificationReason::WrongTokenUse,
            } => StatusCode::FORBIDDEN,
            Self::Verification { .. } | Self::ReauthRequired => StatusCode::UNAUTHORIZED,
            Self::StoreInconsistency(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
