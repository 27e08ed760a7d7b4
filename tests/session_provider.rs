mod support;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use secrecy::ExposeSecret;
use statement_analyzer::auth::{SessionProvider, SignInOutcome};
use statement_analyzer::client::{ApiClient, AuthEvents, TokenSource};
use support::{user, MockIdentity};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn provider(identity: &Arc<MockIdentity>) -> Arc<SessionProvider> {
    Arc::new(SessionProvider::new(identity.clone()))
}

async fn eventually(check: impl Fn() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test]
async fn refresh_session_loads_user() -> Result<()> {
    let identity = Arc::new(MockIdentity::signed_in(user(Some(&["admin"])), "t1"));
    let provider = provider(&identity);
    assert!(!provider.is_authenticated());

    provider.refresh_session().await?;

    let session = provider.session();
    assert!(session.is_authenticated);
    assert!(!session.loading);
    assert_eq!(session.user.map(|u| u.email), Some(Some("jane@example.com".to_string())));
    Ok(())
}

#[tokio::test]
async fn sign_in_failure_is_recorded_and_returned() -> Result<()> {
    let identity = Arc::new(MockIdentity::default());
    *identity.sign_in_error.lock().unwrap() = Some("provider unreachable".to_string());
    let provider = provider(&identity);

    let err = provider.sign_in().await.unwrap_err();

    assert_eq!(err.to_string(), "provider unreachable");
    assert_eq!(
        provider.session().error.as_deref(),
        Some("provider unreachable")
    );
    assert!(!provider.is_authenticated());
    Ok(())
}

#[tokio::test]
async fn sign_in_without_session_returns_redirect() -> Result<()> {
    let identity = Arc::new(MockIdentity::default());
    let provider = provider(&identity);

    let outcome = provider.sign_in().await?;
    assert!(matches!(outcome, SignInOutcome::Redirect { .. }));
    assert!(!provider.is_authenticated());
    Ok(())
}

#[tokio::test]
async fn sign_out_clears_user() -> Result<()> {
    let identity = Arc::new(MockIdentity::signed_in(user(Some(&["admin"])), "t1"));
    let provider = provider(&identity);
    provider.sign_in().await?;
    assert!(provider.has_role("admin"));

    provider.sign_out().await?;

    let session = provider.session();
    assert!(!session.is_authenticated);
    assert!(session.user.is_none());
    assert!(!provider.has_role("admin"));
    Ok(())
}

#[tokio::test]
async fn sign_out_failure_keeps_session() -> Result<()> {
    let identity = Arc::new(MockIdentity::signed_in(user(None), "t1"));
    *identity.sign_out_error.lock().unwrap() = Some("logout endpoint down".to_string());
    let provider = provider(&identity);
    provider.sign_in().await?;

    assert!(provider.sign_out().await.is_err());
    let session = provider.session();
    assert!(session.is_authenticated);
    assert_eq!(session.error.as_deref(), Some("logout endpoint down"));
    Ok(())
}

#[tokio::test]
async fn roles_require_groups_claim() -> Result<()> {
    let identity = Arc::new(MockIdentity::signed_in(user(None), "t1"));
    let provider = provider(&identity);
    assert!(!provider.has_role("admin"), "no user yet");

    provider.refresh_session().await?;
    assert!(provider.is_authenticated());
    assert!(!provider.has_role("admin"), "no groups claim");

    *identity.user.lock().unwrap() = Some(user(Some(&[])));
    provider.refresh_session().await?;
    assert!(!provider.has_role("admin"), "empty groups");
    Ok(())
}

#[tokio::test]
async fn get_token_refreshes_once() -> Result<()> {
    let identity = Arc::new(MockIdentity::signed_in(user(None), "unused"));
    *identity.token.lock().unwrap() = None;
    *identity.refreshed_token.lock().unwrap() = Some("t2".to_string());
    let provider = provider(&identity);

    let token = provider.get_token().await?;

    assert_eq!(token.expose_secret(), "t2");
    assert_eq!(identity.refreshes(), 1);
    Ok(())
}

#[tokio::test]
async fn get_token_propagates_refresh_failure() -> Result<()> {
    let identity = Arc::new(MockIdentity::default());
    let provider = provider(&identity);

    let err = provider.get_token().await.unwrap_err();

    assert_eq!(err.to_string(), "refresh rejected");
    assert_eq!(identity.refreshes(), 1);
    Ok(())
}

#[tokio::test]
async fn token_source_is_empty_when_signed_out() -> Result<()> {
    let identity = Arc::new(MockIdentity::signed_in(user(None), "t1"));
    let provider = provider(&identity);

    assert!(TokenSource::access_token(provider.as_ref()).await?.is_none());

    provider.refresh_session().await?;
    let token = TokenSource::access_token(provider.as_ref()).await?;
    assert_eq!(token.map(|t| t.expose_secret().to_string()).as_deref(), Some("t1"));
    Ok(())
}

#[tokio::test]
async fn token_source_falls_back_to_id_token() -> Result<()> {
    let identity = Arc::new(MockIdentity::signed_in(user(None), "unused"));
    let provider = provider(&identity);
    provider.refresh_session().await?;
    *identity.token.lock().unwrap() = None;
    *identity.id_token.lock().unwrap() = Some("id-token".to_string());

    let token = TokenSource::access_token(provider.as_ref()).await?;

    assert_eq!(
        token.map(|t| t.expose_secret().to_string()).as_deref(),
        Some("id-token")
    );
    Ok(())
}

#[tokio::test]
async fn expiry_event_triggers_sign_in() -> Result<()> {
    let identity = Arc::new(MockIdentity::signed_in(user(None), "t1"));
    let provider = provider(&identity);
    let events = AuthEvents::new();
    let listener = provider.spawn_token_expiry_listener(&events);

    assert_eq!(events.notify_token_expired(), 1);
    assert!(eventually(|| provider.is_authenticated()).await);

    drop(events);
    tokio::time::timeout(Duration::from_secs(1), listener).await??;
    assert_eq!(identity.sign_ins(), 1);
    Ok(())
}

#[tokio::test]
async fn rejected_request_signs_in_again_once() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/ping"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let identity = Arc::new(MockIdentity::signed_in(user(None), "t1"));
    *identity.refreshed_token.lock().unwrap() = Some("t2".to_string());
    let provider = provider(&identity);
    provider.refresh_session().await?;

    let events = AuthEvents::new();
    let _listener = provider.spawn_token_expiry_listener(&events);
    let api = ApiClient::with_client(reqwest::Client::new(), server.uri())
        .with_token_source(provider.clone())
        .with_auth_events(events.clone());

    let url = api.url("/api/ping");
    let response = api.send(|http| http.get(&url)).await?;

    assert_eq!(response.status(), 401);
    assert_eq!(identity.refreshes(), 1);
    assert!(eventually(|| identity.sign_ins() >= 1).await);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(identity.sign_ins(), 1);
    Ok(())
}
