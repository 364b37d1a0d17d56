//! Sign-in, refresh timer and token lifecycle against a fake backend

mod common;

use common::{forge_token, now, Backend};
use flow_client::api::ApiError;
use flow_client::auth::{token, AuthError, AuthSession, MemoryTokenStore, TokenPair, TokenStore};
use flow_client::config::ClientConfig;
use flow_client::FlowClient;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

fn auth_with(backend: &Backend, refresh: Duration) -> (Arc<AuthSession>, Arc<MemoryTokenStore>) {
    let config = ClientConfig::new(&backend.url())
        .unwrap()
        .with_token_refresh_interval(refresh);
    let store = Arc::new(MemoryTokenStore::new());
    let auth = AuthSession::new(&config, reqwest::Client::new(), store.clone());
    (auth, store)
}

fn stored(store: &MemoryTokenStore) -> Option<TokenPair> {
    store.load().unwrap()
}

#[tokio::test]
async fn test_sign_in_stores_tokens_and_starts_refresher() {
    let backend = Backend::start().await;
    let (auth, store) = auth_with(&backend, Duration::from_secs(60));

    let user = auth.sign_in("ada@uni.edu", "secret").await.unwrap();
    assert_eq!(user.email.as_deref(), Some("ada@uni.edu"));
    assert!(auth.is_signed_in());
    assert!(auth.is_running());

    let tokens = stored(&store).unwrap();
    assert!(!token::is_expired(&tokens.access));
    assert!(!token::is_expired(&tokens.refresh));

    // Only one refresher per session
    assert!(!auth.start());

    auth.sign_out().await.unwrap();
    assert!(!auth.is_running());
    assert!(stored(&store).is_none());
    assert_eq!(backend.state.logouts.load(Ordering::SeqCst), 1);
    assert_eq!(backend.state.bearers.lock().last(), Some(&tokens.access));
}

#[tokio::test]
async fn test_wrong_password_is_rejected() {
    let backend = Backend::start().await;
    let (auth, store) = auth_with(&backend, Duration::from_secs(60));

    let err = auth.sign_in("ada@uni.edu", "wrong").await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidCredentials));
    assert!(!auth.is_running());
    assert!(stored(&store).is_none());
}

#[tokio::test]
async fn test_refresher_runs_periodically_until_sign_out() {
    let backend = Backend::start().await;
    let (auth, store) = auth_with(&backend, Duration::from_millis(100));

    auth.sign_in("ada@uni.edu", "secret").await.unwrap();
    let first = stored(&store).unwrap().access;

    tokio::time::sleep(Duration::from_millis(350)).await;
    assert!(backend.refreshes() >= 2);
    assert_ne!(stored(&store).unwrap().access, first);

    auth.sign_out().await.unwrap();
    let after_sign_out = backend.refreshes();
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(backend.refreshes(), after_sign_out);
}

#[tokio::test]
async fn test_expired_access_token_is_refreshed_lazily() {
    let backend = Backend::start().await;
    let (auth, store) = auth_with(&backend, Duration::from_secs(60));
    store
        .save(&TokenPair {
            access: forge_token(now() - 10),
            refresh: forge_token(now() + 3_600),
        })
        .unwrap();

    let access = auth.access_token().await.unwrap();
    assert!(!token::is_expired(&access));
    assert_eq!(backend.refreshes(), 1);
    assert_eq!(stored(&store).unwrap().access, access);

    // Still valid: no second round-trip
    assert_eq!(auth.access_token().await.unwrap(), access);
    assert_eq!(backend.refreshes(), 1);
}

#[tokio::test]
async fn test_rejected_refresh_ends_the_session() {
    let backend = Backend::start().await;
    let (auth, store) = auth_with(&backend, Duration::from_secs(60));
    auth.sign_in("ada@uni.edu", "secret").await.unwrap();
    backend.state.reject_refresh.store(true, Ordering::SeqCst);

    let err = auth.refresh().await.unwrap_err();
    assert!(matches!(err, AuthError::SessionExpired));
    assert!(stored(&store).is_none());
    assert!(matches!(auth.access_token().await, Err(AuthError::NotSignedIn)));
}

#[tokio::test]
async fn test_refresher_stops_when_the_session_expires() {
    let backend = Backend::start().await;
    let (auth, _store) = auth_with(&backend, Duration::from_millis(50));
    auth.sign_in("ada@uni.edu", "secret").await.unwrap();
    backend.state.reject_refresh.store(true, Ordering::SeqCst);

    assert!(common::wait_until(|| !auth.is_running()).await);
    assert!(!auth.is_signed_in());
}

#[tokio::test]
async fn test_restore_depends_on_refresh_token() {
    let backend = Backend::start().await;

    let (auth, store) = auth_with(&backend, Duration::from_secs(60));
    store
        .save(&TokenPair {
            access: forge_token(now() - 10),
            refresh: forge_token(now() + 3_600),
        })
        .unwrap();
    assert!(auth.restore().unwrap());
    assert!(auth.is_running());

    let (auth, store) = auth_with(&backend, Duration::from_secs(60));
    store
        .save(&TokenPair {
            access: forge_token(now() - 10),
            refresh: forge_token(now() - 5),
        })
        .unwrap();
    assert!(!auth.restore().unwrap());
    assert!(!auth.is_running());
    assert!(stored(&store).is_none());
}

#[tokio::test]
async fn test_api_retries_once_after_401() {
    let backend = Backend::start().await;
    let client = FlowClient::with_store(
        ClientConfig::new(&backend.url()).unwrap(),
        Arc::new(MemoryTokenStore::new()),
    )
    .unwrap();
    client.sign_in("ada@uni.edu", "secret").await.unwrap();
    backend.state.unauthorized_once.store(true, Ordering::SeqCst);

    let posts = client.api().posts().await.unwrap();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].content.as_deref(), Some("Welcome to Flow"));
    assert_eq!(backend.refreshes(), 1);
}

#[tokio::test]
async fn test_room_calls_need_a_session() {
    let backend = Backend::start().await;
    let client = FlowClient::with_store(
        ClientConfig::new(&backend.url()).unwrap(),
        Arc::new(MemoryTokenStore::new()),
    )
    .unwrap();

    let err = client.join_room("   ").await.unwrap_err();
    assert_eq!(err.to_string(), "Please enter a room name.");

    let err = client.create_room().await.unwrap_err();
    assert!(matches!(err, ApiError::Auth(AuthError::NotSignedIn)));
}
