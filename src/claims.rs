//! Claim normalization and the canonical decoded-token type.
//!
//! The provider library's loosely-typed claim bags are converted here into
//! one uniform shape: header fields and payload claims as ordered maps,
//! timestamps as [`DateTime<Utc>`] instants, and claim values as a typed
//! tagged union ([`ClaimValue`]) rather than dynamically-typed objects.
//!
//! Normalization is forgiving about optional claims: null-valued claims are
//! dropped (and logged), and a single claim that fails conversion is
//! replaced with a sentinel instead of failing the whole decode: a
//! malformed optional claim must not block authentication when the
//! mandatory claims are valid.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::error::{AuthError, AuthResult, VerificationReason};

/// Accepted `token_use` purposes. Refresh tokens are opaque and never reach
/// the verifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenUse {
    /// An access token (`token_use = "access"`).
    #[serde(rename = "access")]
    Access,
    /// An identity token (`token_use = "id"`).
    #[serde(rename = "id")]
    Identity,
}

impl TokenUse {
    /// Parse the provider's `token_use` claim value. Anything other than
    /// `access` or `id` (including `refresh`) is rejected by the caller.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "access" => Some(Self::Access),
            "id" => Some(Self::Identity),
            _ => None,
        }
    }
}

/// A normalized claim value.
///
/// Deliberately has no object variant: nested objects in optional claims
/// are not something downstream authorization reads, and collapsing them to
/// [`ClaimValue::ConversionFailed`] keeps the claim map free of
/// dynamically-typed payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClaimValue {
    /// String claim.
    Str(String),
    /// Integer claim (fits `i64`).
    Int(i64),
    /// Non-integer numeric claim.
    Float(f64),
    /// Boolean claim.
    Bool(bool),
    /// List claim; elements normalized recursively.
    List(Vec<ClaimValue>),
    /// Sentinel for a claim whose value could not be converted.
    ConversionFailed,
}

impl ClaimValue {
    /// The claim as a string, if it is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// The claim as a list, if it is one.
    pub fn as_list(&self) -> Option<&[ClaimValue]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Convert a JSON claim value. Returns `None` for JSON null (the claim
    /// is dropped); objects become the sentinel.
    fn from_json(name: &str, value: &serde_json::Value) -> Option<Self> {
        use serde_json::Value;
        match value {
            Value::Null => None,
            Value::Bool(b) => Some(Self::Bool(*b)),
            Value::String(s) => Some(Self::Str(s.clone())),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(Self::Int(i))
                } else if let Some(f) = n.as_f64() {
                    Some(Self::Float(f))
                } else {
                    warn!(claim = %name, "claim value out of numeric range, substituting sentinel");
                    Some(Self::ConversionFailed)
                }
            }
            Value::Array(items) => Some(Self::List(
                items
                    .iter()
                    .map(|v| Self::from_json(name, v).unwrap_or(Self::ConversionFailed))
                    .collect(),
            )),
            Value::Object(_) => {
                warn!(claim = %name, "object-valued claim not representable, substituting sentinel");
                Some(Self::ConversionFailed)
            }
        }
    }
}

/// A verified, canonical token: the output of the verification pipeline.
///
/// Transient: produced once per verification call and not
/// persisted (the verifier may memoize it briefly by raw token string; see
/// [`VerifierOptions::memo_ttl_secs`](crate::config::VerifierOptions)).
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedToken {
    /// The `sub` claim, the principal the token asserts.
    pub subject: String,
    /// The `iss` claim, already matched against configuration.
    pub issuer: String,
    /// The `aud` entry matching the configured client id.
    pub audience: String,
    /// Token purpose (`access` or `id`).
    pub token_use: TokenUse,
    /// `iat` as an instant.
    pub issued_at: DateTime<Utc>,
    /// `exp` as an instant.
    pub expires_at: DateTime<Utc>,
    /// Decoded JOSE header fields, ordered by name.
    pub headers: BTreeMap<String, serde_json::Value>,
    /// Normalized payload claims, ordered by name. Null claims are absent;
    /// unconvertible claims carry [`ClaimValue::ConversionFailed`].
    pub claims: BTreeMap<String, ClaimValue>,
}

impl DecodedToken {
    /// Look up a normalized claim by name.
    pub fn claim(&self, name: &str) -> Option<&ClaimValue> {
        self.claims.get(name)
    }
}

/// Converts a raw (already signature-verified) token into a [`DecodedToken`].
pub struct ClaimNormalizer;

impl ClaimNormalizer {
    /// Decode header and payload of `raw_token` into the canonical shape.
    ///
    /// The caller must have verified the signature already; this function
    /// trusts the token's bytes but still validates the mandatory claims
    /// (`sub`, `iss`, `aud`, `token_use`, `iat`, `exp`) are present and
    /// well-typed.
    ///
    /// # Errors
    ///
    /// `Verification { Malformed }` when the token is not three Base64URL
    /// segments of JSON, or a mandatory claim is missing;
    /// `Verification { WrongTokenUse }` when `token_use` is not an accepted
    /// purpose.
    pub fn normalize(raw_token: &str) -> AuthResult<DecodedToken> {
        let mut parts = raw_token.split('.');
        let (header_b64, payload_b64) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(h), Some(p), Some(_sig), None) => (h, p),
            _ => return Err(malformed("token is not three segments")),
        };

        let headers: BTreeMap<String, serde_json::Value> = decode_json_segment(header_b64)?;
        let payload: BTreeMap<String, serde_json::Value> = decode_json_segment(payload_b64)?;

        let subject = required_str(&payload, "sub")?;
        let issuer = required_str(&payload, "iss")?;
        let audience = audience_from(&payload)?;
        let token_use = TokenUse::parse(&required_str(&payload, "token_use")?)
            .ok_or(AuthError::verification(VerificationReason::WrongTokenUse))?;
        let issued_at = required_instant(&payload, "iat")?;
        let expires_at = required_instant(&payload, "exp")?;

        let mut claims = BTreeMap::new();
        for (name, value) in &payload {
            if value.is_null() {
                debug!(claim = %name, "dropping null-valued claim");
                continue;
            }
            if let Some(converted) = ClaimValue::from_json(name, value) {
                claims.insert(name.clone(), converted);
            }
        }

        Ok(DecodedToken {
            subject,
            issuer,
            audience,
            token_use,
            issued_at,
            expires_at,
            headers,
            claims,
        })
    }
}

fn malformed(detail: &str) -> AuthError {
    debug!(detail = %detail, "token failed normalization");
    AuthError::verification(VerificationReason::Malformed)
}

fn decode_json_segment(segment: &str) -> AuthResult<BTreeMap<String, serde_json::Value>> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| malformed("segment is not valid Base64URL"))?;
    serde_json::from_slice(&bytes).map_err(|_| malformed("segment is not a JSON object"))
}

fn required_str(payload: &BTreeMap<String, serde_json::Value>, name: &str) -> AuthResult<String> {
    payload
        .get(name)
        .and_then(|v| v.as_str())
        .map(str::to_owned)
        .ok_or_else(|| malformed(&format!("missing mandatory claim {name}")))
}

/// `aud` is a string for Cognito-style tokens but may be an array per
/// RFC 7519; the first string entry is taken as the canonical audience.
fn audience_from(payload: &BTreeMap<String, serde_json::Value>) -> AuthResult<String> {
    match payload.get("aud") {
        Some(serde_json::Value::String(s)) => Ok(s.clone()),
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .find_map(|v| v.as_str())
            .map(str::to_owned)
            .ok_or_else(|| malformed("aud array holds no string")),
        _ => Err(malformed("missing mandatory claim aud")),
    }
}

fn required_instant(
    payload: &BTreeMap<String, serde_json::Value>,
    name: &str,
) -> AuthResult<DateTime<Utc>> {
    let secs = payload
        .get(name)
        .and_then(serde_json::Value::as_i64)
        .ok_or_else(|| malformed(&format!("missing mandatory claim {name}")))?;
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or_else(|| malformed(&format!("claim {name} is not a valid timestamp")))
}
