//! Sign-in, refresh, and sign-out flows against a mock identity provider:
//! write-through ordering, session identity across refreshes, and error
//! classification at the token endpoints.

mod common;

use common::MockIdentityProvider;
use std::sync::Arc;

use boxoffice_auth::{
    AuthError, HttpIdentityProvider, SessionTokenStore, TokenRefreshCoordinator,
};

fn coordinator(mock: &MockIdentityProvider) -> TokenRefreshCoordinator {
    TokenRefreshCoordinator::new(
        Arc::new(HttpIdentityProvider::new(mock.config())),
        Arc::new(SessionTokenStore::default()),
    )
}

#[tokio::test]
async fn sign_in_writes_through_to_the_store() {
    let mock = MockIdentityProvider::start().await;
    mock.mount_password_grant("access-1", "refresh-1").await;

    let coord = coordinator(&mock);
    let result = coord.sign_in("alice", "hunter2").await.expect("sign-in");

    assert_eq!(result.user_id, "alice");
    assert_eq!(result.access_token, "access-1");
    assert_eq!(result.refresh_token, "refresh-1");

    let record = coord
        .store()
        .get("alice", &result.session_id)
        .expect("record stored");
    assert_eq!(record.access_token, "access-1");
    assert_eq!(record.refresh_token, "refresh-1");
    assert_eq!(record.session_id, result.session_id);
}

#[tokio::test]
async fn two_sign_ins_open_independent_sessions() {
    let mock = MockIdentityProvider::start().await;
    mock.mount_password_grant("access-1", "refresh-1").await;

    let coord = coordinator(&mock);
    let first = coord.sign_in("alice", "hunter2").await.expect("first");
    let second = coord.sign_in("alice", "hunter2").await.expect("second");

    assert_ne!(first.session_id, second.session_id);
    assert_eq!(coord.store().session_count("alice"), 2);
}

#[tokio::test]
async fn refresh_replaces_in_place_and_preserves_session_identity() {
    let mock = MockIdentityProvider::start().await;
    mock.mount_password_grant("access-1", "refresh-1").await;
    mock.mount_refresh_grant("access-2", Some("refresh-2")).await;

    let coord = coordinator(&mock);
    let signed_in = coord.sign_in("alice", "hunter2").await.expect("sign-in");

    let refreshed = coord
        .refresh("alice", &signed_in.session_id, &signed_in.refresh_token)
        .await
        .expect("refresh");

    assert_eq!(refreshed.session_id, signed_in.session_id);
    assert_eq!(refreshed.access_token, "access-2");
    assert_eq!(refreshed.refresh_token, "refresh-2");

    let record = coord
        .store()
        .get("alice", &signed_in.session_id)
        .expect("record present");
    assert_eq!(record.access_token, "access-2");
    assert_eq!(coord.store().session_count("alice"), 1);
}

#[tokio::test]
async fn refresh_without_new_refresh_token_keeps_the_old_one() {
    let mock = MockIdentityProvider::start().await;
    mock.mount_password_grant("access-1", "refresh-1").await;
    mock.mount_refresh_grant("access-2", None).await;

    let coord = coordinator(&mock);
    let signed_in = coord.sign_in("alice", "hunter2").await.expect("sign-in");

    let refreshed = coord
        .refresh("alice", &signed_in.session_id, &signed_in.refresh_token)
        .await
        .expect("refresh");

    assert_eq!(refreshed.refresh_token, "refresh-1");
    let record = coord.store().get("alice", &signed_in.session_id).unwrap();
    assert_eq!(record.refresh_token, "refresh-1");
    assert_eq!(record.access_token, "access-2");
}

#[tokio::test]
async fn rejected_refresh_requires_reauth_and_leaves_the_record_alone() {
    let mock = MockIdentityProvider::start().await;
    mock.mount_password_grant("access-1", "refresh-1").await;

    let coord = coordinator(&mock);
    let signed_in = coord.sign_in("alice", "hunter2").await.expect("sign-in");

    mock.reset().await;
    mock.mount_grant_rejection().await;

    let err = coord
        .refresh("alice", &signed_in.session_id, &signed_in.refresh_token)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::ReauthRequired));
    assert!(!err.is_retryable());

    // Prior record untouched.
    let record = coord.store().get("alice", &signed_in.session_id).unwrap();
    assert_eq!(record.access_token, "access-1");
    assert_eq!(record.refresh_token, "refresh-1");
}

#[tokio::test]
async fn provider_server_error_is_retryable() {
    let mock = MockIdentityProvider::start().await;
    mock.mount_grant_server_error().await;

    let coord = coordinator(&mock);
    let err = coord.sign_in("alice", "hunter2").await.unwrap_err();
    assert!(matches!(err, AuthError::ProviderUnavailable(_)));
    assert!(err.is_retryable());
    assert_eq!(coord.store().session_count("alice"), 0);
}

#[tokio::test]
async fn sign_in_without_refresh_token_in_response_fails_closed() {
    let mock = MockIdentityProvider::start().await;
    mock.mount_password_grant_without_refresh("access-1").await;

    let coord = coordinator(&mock);
    let err = coord.sign_in("alice", "hunter2").await.unwrap_err();
    assert!(matches!(err, AuthError::ProviderUnavailable(_)));
    assert_eq!(coord.store().session_count("alice"), 0);
}

#[tokio::test]
async fn sign_out_removes_exactly_one_session() {
    let mock = MockIdentityProvider::start().await;
    mock.mount_password_grant("access-1", "refresh-1").await;
    mock.mount_revocation(200).await;

    let coord = coordinator(&mock);
    let first = coord.sign_in("alice", "hunter2").await.expect("first");
    let second = coord.sign_in("alice", "hunter2").await.expect("second");

    coord
        .sign_out("alice", &first.session_id)
        .await
        .expect("sign-out");

    assert!(coord.store().get("alice", &first.session_id).is_none());
    assert!(coord.store().get("alice", &second.session_id).is_some());
    assert_eq!(coord.store().session_count("alice"), 1);
}

#[tokio::test]
async fn sign_out_evicts_even_when_revocation_fails() {
    let mock = MockIdentityProvider::start().await;
    mock.mount_password_grant("access-1", "refresh-1").await;
    mock.mount_revocation(500).await;

    let coord = coordinator(&mock);
    let signed_in = coord.sign_in("alice", "hunter2").await.expect("sign-in");

    coord
        .sign_out("alice", &signed_in.session_id)
        .await
        .expect("sign-out is best-effort");
    assert!(coord.store().get("alice", &signed_in.session_id).is_none());
}

#[tokio::test]
async fn revoke_user_drops_every_session() {
    let mock = MockIdentityProvider::start().await;
    mock.mount_password_grant("access-1", "refresh-1").await;

    let coord = coordinator(&mock);
    let first = coord.sign_in("alice", "hunter2").await.expect("first");
    let second = coord.sign_in("alice", "hunter2").await.expect("second");

    coord.revoke_user("alice");

    assert!(coord.store().get("alice", &first.session_id).is_none());
    assert!(coord.store().get("alice", &second.session_id).is_none());
    assert_eq!(coord.store().session_count("alice"), 0);
}
