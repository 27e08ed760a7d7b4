//! Authenticated HTTP access to the analysis backend.
//!
//! [`ApiClient`] wraps a `reqwest::Client` and the resolved base URL. Every
//! request is described by a closure so it can be re-issued: when the
//! backend answers 401 the client asks its [`TokenSource`] for a fresh token
//! and retries exactly once. If that does not help, a
//! [`AuthEvent::TokenExpired`] is broadcast on the [`AuthEvents`] handle the
//! client was built with, and the 401 is handed back to the caller.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::broadcast;

/// Supplies bearer tokens to [`ApiClient`].
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Current access token, or `None` when there is no session.
    async fn access_token(&self) -> Result<Option<SecretString>>;

    /// Obtain a fresh token after the backend rejected the current one.
    async fn refresh_access_token(&self) -> Result<Option<SecretString>>;
}

/// Notifications emitted by the HTTP layer for the session layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEvent {
    /// A request was still rejected after one token refresh.
    TokenExpired,
}

/// Broadcast handle shared by the HTTP client (sender side) and whoever
/// wants to react to auth failures.
#[derive(Debug, Clone)]
pub struct AuthEvents {
    tx: broadcast::Sender<AuthEvent>,
}

impl Default for AuthEvents {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthEvents {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(16);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.tx.subscribe()
    }

    /// Fire-and-forget; returns how many listeners were notified.
    pub fn notify_token_expired(&self) -> usize {
        self.tx.send(AuthEvent::TokenExpired).unwrap_or(0)
    }
}

/// `GET /health` response.
#[derive(Debug, Clone, Deserialize)]
pub struct HealthStatus {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub service: Option<String>,
}

/// HTTP client bound to one backend.
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    tokens: Option<Arc<dyn TokenSource>>,
    events: AuthEvents,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("statement-analyzer/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self::with_client(http, base_url))
    }

    pub fn with_client(http: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http,
            base_url,
            tokens: None,
            events: AuthEvents::new(),
        }
    }

    pub fn with_token_source(mut self, tokens: Arc<dyn TokenSource>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    pub fn with_auth_events(mut self, events: AuthEvents) -> Self {
        self.events = events;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for an API path such as `/api/upload/`.
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn current_token(&self) -> Option<SecretString> {
        let tokens = self.tokens.as_ref()?;
        match tokens.access_token().await {
            Ok(token) => token,
            Err(err) => {
                // Send the request anyway; the backend decides.
                tracing::warn!(error = %err, "Failed to get auth token");
                None
            }
        }
    }

    async fn dispatch(
        &self,
        build: &(dyn Fn(&Client) -> RequestBuilder + Send + Sync),
        token: Option<&SecretString>,
    ) -> reqwest::Result<Response> {
        let mut request = build(&self.http);
        if let Some(token) = token {
            request = request.bearer_auth(token.expose_secret());
        }
        request.send().await
    }

    /// Send a request, handling bearer tokens and the single 401 retry.
    ///
    /// Transport errors are returned as-is so callers can classify them
    /// (timeouts in particular).
    pub async fn send<F>(&self, build: F) -> reqwest::Result<Response>
    where
        F: Fn(&Client) -> RequestBuilder + Send + Sync,
    {
        let token = self.current_token().await;
        let response = self.dispatch(&build, token.as_ref()).await?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }
        let Some(tokens) = self.tokens.as_ref() else {
            return Ok(response);
        };

        tracing::info!(url = %response.url(), "Request unauthorized, refreshing token");
        let fresh = match tokens.refresh_access_token().await {
            Ok(Some(fresh)) => fresh,
            Ok(None) => {
                tracing::warn!("Token refresh produced no token");
                self.token_expired();
                return Ok(response);
            }
            Err(err) => {
                tracing::warn!(error = %err, "Token refresh failed");
                self.token_expired();
                return Ok(response);
            }
        };

        let retry = self.dispatch(&build, Some(&fresh)).await?;
        if retry.status() == StatusCode::UNAUTHORIZED {
            tracing::warn!(url = %retry.url(), "Request still unauthorized after token refresh");
            self.token_expired();
        }
        Ok(retry)
    }

    fn token_expired(&self) {
        let listeners = self.events.notify_token_expired();
        tracing::debug!(listeners, "Broadcast token expiry");
    }

    /// Check backend liveness.
    pub async fn health(&self) -> Result<HealthStatus> {
        let url = self.url("/health");
        let response = self
            .send(|http| http.get(&url))
            .await
            .context("Health check request failed")?
            .error_for_status()
            .context("Health check returned an error status")?;
        response
            .json::<HealthStatus>()
            .await
            .context("Failed to parse health check response")
    }
}
