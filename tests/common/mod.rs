//! Shared infrastructure for integration tests: a wiremock identity
//! provider with JWKS, token, and revocation endpoints, plus RSA key
//! generation and JWT minting helpers.

#![allow(dead_code)]

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use rsa::pkcs8::{EncodePrivateKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::RsaPrivateKey;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use boxoffice_auth::{
    IdentityProviderConfig, KeySetOptions, KeySetProvider, TokenVerifier, VerifierOptions,
    JWKS_PATH,
};

pub const TEST_CLIENT_ID: &str = "booking-web-client";

/// An RSA signing key with its public half as a JWK.
pub struct TestKey {
    pub kid: String,
    private_pem: Vec<u8>,
    pub jwk: serde_json::Value,
}

impl TestKey {
    /// Generate a fresh 2048-bit RSA key published under `kid`.
    pub fn generate(kid: &str) -> Self {
        let mut rng = rand::thread_rng();
        let private_key = RsaPrivateKey::new(&mut rng, 2048).expect("RSA key generation");
        let public_key = private_key.to_public_key();

        let private_pem = private_key
            .to_pkcs8_pem(LineEnding::LF)
            .expect("private key PEM")
            .as_bytes()
            .to_vec();

        let jwk = json!({
            "kty": "RSA",
            "use": "sig",
            "alg": "RS256",
            "kid": kid,
            "n": URL_SAFE_NO_PAD.encode(public_key.n().to_bytes_be()),
            "e": URL_SAFE_NO_PAD.encode(public_key.e().to_bytes_be()),
        });

        Self {
            kid: kid.to_string(),
            private_pem,
            jwk,
        }
    }

    /// Sign `claims` as an RS256 JWT carrying this key's kid.
    pub fn sign(&self, claims: &serde_json::Value) -> String {
        self.sign_with(claims, Algorithm::RS256, Some(&self.kid))
    }

    /// Sign with full control over the declared algorithm and kid.
    pub fn sign_with(
        &self,
        claims: &serde_json::Value,
        algorithm: Algorithm,
        kid: Option<&str>,
    ) -> String {
        let key = EncodingKey::from_rsa_pem(&self.private_pem).expect("RSA PEM");
        let mut header = Header::new(algorithm);
        header.kid = kid.map(str::to_owned);
        encode(&header, claims, &key).expect("JWT encoding")
    }
}

/// Flip the token's payload without re-signing, so the signature no longer
/// matches the content.
pub fn tamper_payload(token: &str) -> String {
    let parts: Vec<&str> = token.split('.').collect();
    assert_eq!(parts.len(), 3, "expected a three-segment JWT");

    let mut payload: serde_json::Value =
        serde_json::from_slice(&URL_SAFE_NO_PAD.decode(parts[1]).expect("payload Base64URL"))
            .expect("payload JSON");
    payload["sub"] = json!("attacker");
    let forged = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&payload).expect("payload bytes"));

    format!("{}.{}.{}", parts[0], forged, parts[2])
}

pub fn now_epoch() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock before epoch")
        .as_secs()
}

/// Standard access-token claims against the given issuer, expiring in an
/// hour. Callers override individual fields for negative cases.
pub fn access_claims(sub: &str, issuer: &str) -> serde_json::Value {
    let now = now_epoch();
    json!({
        "sub": sub,
        "iss": issuer,
        "aud": TEST_CLIENT_ID,
        "token_use": "access",
        "iat": now,
        "exp": now + 3600,
    })
}

/// A wiremock identity provider. Its base URI doubles as the issuer, so
/// the config's endpoint derivation resolves straight to the mocks.
pub struct MockIdentityProvider {
    pub server: MockServer,
}

impl MockIdentityProvider {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    pub fn issuer(&self) -> String {
        self.server.uri()
    }

    pub fn config(&self) -> IdentityProviderConfig {
        IdentityProviderConfig::new(self.issuer(), TEST_CLIENT_ID)
    }

    /// Publish the given keys at the well-known JWKS path.
    pub async fn mount_jwks(&self, keys: &[&TestKey]) {
        let jwks: Vec<&serde_json::Value> = keys.iter().map(|k| &k.jwk).collect();
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "keys": jwks })))
            .mount(&self.server)
            .await;
    }

    /// Make the JWKS endpoint answer with a server error.
    pub async fn mount_jwks_failure(&self) {
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(500))
            .mount(&self.server)
            .await;
    }

    /// Successful password grant at the token endpoint.
    pub async fn mount_password_grant(&self, access_token: &str, refresh_token: &str) {
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .and(body_string_contains("grant_type=password"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": access_token,
                "refresh_token": refresh_token,
                "token_type": "Bearer",
                "expires_in": 3600,
            })))
            .mount(&self.server)
            .await;
    }

    /// Password grant that answers without a refresh token. Providers must
    /// not do this; the sign-in path treats it as a provider fault.
    pub async fn mount_password_grant_without_refresh(&self, access_token: &str) {
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .and(body_string_contains("grant_type=password"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": access_token,
                "token_type": "Bearer",
                "expires_in": 3600,
            })))
            .mount(&self.server)
            .await;
    }

    /// Successful refresh grant. `refresh_token: None` mirrors providers
    /// that omit the refresh token from refresh responses.
    pub async fn mount_refresh_grant(&self, access_token: &str, refresh_token: Option<&str>) {
        let mut body = json!({
            "access_token": access_token,
            "token_type": "Bearer",
            "expires_in": 3600,
        });
        if let Some(refresh) = refresh_token {
            body["refresh_token"] = json!(refresh);
        }
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    /// Token endpoint rejects the grant outright (bad credentials or a
    /// revoked refresh token).
    pub async fn mount_grant_rejection(&self) {
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": "invalid_grant",
            })))
            .mount(&self.server)
            .await;
    }

    /// Token endpoint answers with a server error.
    pub async fn mount_grant_server_error(&self) {
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&self.server)
            .await;
    }

    pub async fn mount_revocation(&self, status: u16) {
        Mock::given(method("POST"))
            .and(path("/oauth2/revoke"))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }

    /// Drop every mounted mock so the provider's behavior can change
    /// mid-test.
    pub async fn reset(&self) {
        self.server.reset().await;
    }
}

/// Wire a verifier against the mock provider with default options.
pub fn verifier_for(mock: &MockIdentityProvider) -> Arc<TokenVerifier> {
    verifier_with_options(mock, VerifierOptions::default())
}

pub fn verifier_with_options(
    mock: &MockIdentityProvider,
    options: VerifierOptions,
) -> Arc<TokenVerifier> {
    let config = mock.config();
    let keys = Arc::new(KeySetProvider::new(
        config.jwks_uri(),
        KeySetOptions::default(),
        Duration::from_secs(2),
    ));
    Arc::new(TokenVerifier::new(
        config.issuer_url,
        config.client_id,
        keys,
        options,
    ))
}
