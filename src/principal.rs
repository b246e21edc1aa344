//! The request-scoped security principal.
//!
//! Absence of a token is a valid anonymous state, not an error, so the
//! principal is an explicit two-state type rather than an optional. For
//! authenticated callers, authorities are derived from the provider's
//! groups/roles claim and prefixed `ROLE_` per the downstream
//! role-check convention.

use crate::claims::{ClaimValue, DecodedToken};

/// Prefix applied to every derived authority.
pub const ROLE_PREFIX: &str = "ROLE_";

/// Claims consulted for role derivation, in precedence order.
const ROLES_CLAIMS: &[&str] = &["cognito:groups", "roles", "groups"];

/// A verified caller.
#[derive(Debug, Clone)]
pub struct AuthenticatedPrincipal {
    /// Token subject.
    pub subject: String,
    /// `ROLE_`-prefixed authorities derived from the roles claim.
    pub authorities: Vec<String>,
    /// The verified token with normalized claims.
    pub token: DecodedToken,
}

/// The security principal attached to a request.
#[derive(Debug, Clone)]
pub enum Principal {
    /// No token was presented.
    Anonymous,
    /// A token was presented and verified.
    Authenticated(AuthenticatedPrincipal),
}

impl Principal {
    /// Build a principal from a verified token.
    pub fn from_token(token: DecodedToken) -> Self {
        let authorities = derive_authorities(&token);
        Self::Authenticated(AuthenticatedPrincipal {
            subject: token.subject.clone(),
            authorities,
            token,
        })
    }

    /// Whether no identity is attached.
    pub fn is_anonymous(&self) -> bool {
        matches!(self, Self::Anonymous)
    }

    /// The verified subject, if any.
    pub fn subject(&self) -> Option<&str> {
        match self {
            Self::Anonymous => None,
            Self::Authenticated(p) => Some(&p.subject),
        }
    }

    /// Role-based check against the derived authorities.
    pub fn has_authority(&self, authority: &str) -> bool {
        match self {
            Self::Anonymous => false,
            Self::Authenticated(p) => p.authorities.iter().any(|a| a == authority),
        }
    }
}

/// Derive `ROLE_`-prefixed authorities from the first roles claim present.
///
/// A list claim yields one authority per string element; a plain string
/// claim yields a single authority. Non-string elements are skipped.
fn derive_authorities(token: &DecodedToken) -> Vec<String> {
    for claim_name in ROLES_CLAIMS {
        match token.claim(claim_name) {
            Some(ClaimValue::List(items)) => {
                return items
                    .iter()
                    .filter_map(ClaimValue::as_str)
                    .map(|role| format!("{ROLE_PREFIX}{role}"))
                    .collect();
            }
            Some(ClaimValue::Str(role)) => {
                return vec![format!("{ROLE_PREFIX}{role}")];
            }
            _ => {}
        }
    }
    Vec::new()
}
