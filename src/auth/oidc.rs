//! OIDC authorization-code flow with PKCE (S256).
//!
//! `sign_in` stores a verifier and state in the session cache and hands back
//! the authorize URL. Once the user has approved, [`OidcIdentity::complete_sign_in`]
//! exchanges the code for tokens.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use reqwest::{Client, StatusCode, Url};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::clock::{Clock, SystemClock};
use crate::config::ResolvedConfig;

use super::provider::{IdentityProvider, SignInOutcome, UserInfo};
use super::session::{PendingSignIn, SessionCache, SessionData};

/// Resolved identity-provider endpoints and client registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OidcSettings {
    pub client_id: String,
    pub redirect_url: String,
    pub scopes: Vec<String>,
    pub authorize_url: String,
    pub token_url: String,
    pub userinfo_url: String,
    pub revoke_url: String,
}

impl OidcSettings {
    pub fn from_config(config: &ResolvedConfig) -> Result<Self> {
        let auth = &config.auth;
        let base = config.auth_base_url();
        let client_id = auth
            .client_id
            .clone()
            .filter(|s| !s.trim().is_empty())
            .context("auth.client_id is required for OIDC sign-in")?;
        let redirect_url = auth
            .redirect_url
            .clone()
            .filter(|s| !s.trim().is_empty())
            .context("auth.redirect_url is required for OIDC sign-in")?;

        Ok(Self {
            client_id,
            redirect_url,
            scopes: auth.scopes.clone(),
            authorize_url: auth.endpoint_url(&base, &auth.authorize_endpoint),
            token_url: auth.endpoint_url(&base, &auth.token_endpoint),
            userinfo_url: auth.endpoint_url(&base, &auth.userinfo_endpoint),
            revoke_url: auth.endpoint_url(&base, &auth.revoke_endpoint),
        })
    }
}

/// Random PKCE code verifier (43 URL-safe characters).
pub fn generate_code_verifier() -> String {
    URL_SAFE_NO_PAD.encode(rand::random::<[u8; 32]>())
}

/// `BASE64URL(SHA256(verifier))`.
pub fn code_challenge(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

fn generate_state() -> String {
    URL_SAFE_NO_PAD.encode(rand::random::<[u8; 16]>())
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    id_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct OAuthError {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

pub struct OidcIdentity {
    http: Client,
    settings: OidcSettings,
    cache: SessionCache,
    profile: String,
    clock: Arc<dyn Clock>,
}

impl OidcIdentity {
    pub fn new(settings: OidcSettings, cache: SessionCache, profile: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            settings,
            cache,
            profile: profile.into(),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_client(mut self, http: Client) -> Self {
        self.http = http;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn session(&self) -> Result<SessionData> {
        Ok(self.cache.get(&self.profile)?.unwrap_or_default())
    }

    /// Authorize URL for a fresh PKCE pair; the pair is remembered in the
    /// session cache.
    pub fn begin_sign_in(&self) -> Result<String> {
        let verifier = generate_code_verifier();
        let state = generate_state();
        let challenge = code_challenge(&verifier);
        let scope = self.settings.scopes.join(" ");

        let url = Url::parse_with_params(
            &self.settings.authorize_url,
            &[
                ("response_type", "code"),
                ("client_id", self.settings.client_id.as_str()),
                ("redirect_uri", self.settings.redirect_url.as_str()),
                ("scope", scope.as_str()),
                ("state", state.as_str()),
                ("code_challenge", challenge.as_str()),
                ("code_challenge_method", "S256"),
            ],
        )
        .context("Invalid authorize endpoint")?;

        let now = self.clock.timestamp();
        self.cache.update(&self.profile, |s| {
            s.pending = Some(PendingSignIn {
                state,
                code_verifier: verifier,
                created_at: now,
            });
        })?;
        Ok(url.into())
    }

    /// Exchange an authorization code for tokens.
    pub async fn complete_sign_in(&self, code: &str, state: &str) -> Result<()> {
        let session = self.session()?;
        let pending = session
            .pending
            .as_ref()
            .context("No sign-in in progress; run login first")?;
        if pending.state != state {
            anyhow::bail!("Sign-in state mismatch; start the login again");
        }

        let verifier = pending.code_verifier.clone();
        let tokens = self
            .token_request(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.settings.redirect_url.as_str()),
                ("client_id", self.settings.client_id.as_str()),
                ("code_verifier", verifier.as_str()),
            ])
            .await?;

        self.store_tokens(tokens, true)?;
        tracing::info!(profile = %self.profile, "OIDC sign-in completed");
        Ok(())
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<TokenResponse> {
        let response = self
            .http
            .post(&self.settings.token_url)
            .form(form)
            .send()
            .await
            .context("Failed to reach token endpoint")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let err: OAuthError = serde_json::from_str(&body).unwrap_or_default();
            let detail = err
                .error_description
                .or(err.error)
                .unwrap_or_else(|| body.trim().to_string());
            anyhow::bail!("Token endpoint returned {status}: {detail}");
        }

        response
            .json::<TokenResponse>()
            .await
            .context("Failed to parse token response")
    }

    fn store_tokens(&self, tokens: TokenResponse, clear_pending: bool) -> Result<()> {
        let now = self.clock.timestamp();
        self.cache.update(&self.profile, |s| {
            s.access_token = Some(tokens.access_token);
            if tokens.refresh_token.is_some() {
                s.refresh_token = tokens.refresh_token;
            }
            if tokens.id_token.is_some() {
                s.id_token = tokens.id_token;
            }
            s.expires_at = tokens.expires_in.map(|secs| now + secs);
            s.captured_at = Some(now);
            if clear_pending {
                s.pending = None;
            }
        })?;
        Ok(())
    }

    /// Usable (present and unexpired) access token from the cache.
    fn valid_token(&self, session: &SessionData) -> Option<SecretString> {
        if session.is_expired(self.clock.timestamp()) {
            return None;
        }
        session.access_token()
    }
}

#[async_trait]
impl IdentityProvider for OidcIdentity {
    fn name(&self) -> &str {
        "oidc"
    }

    async fn sign_in(&self) -> Result<SignInOutcome> {
        let session = self.session()?;
        if self.valid_token(&session).is_some() {
            return Ok(SignInOutcome::SignedIn);
        }
        if session.refresh_token.is_some() && self.refresh_access_token().await.is_ok() {
            return Ok(SignInOutcome::SignedIn);
        }
        Ok(SignInOutcome::Redirect {
            url: self.begin_sign_in()?,
        })
    }

    async fn sign_out(&self) -> Result<()> {
        let session = self.session()?;
        if let Some(token) = session.access_token() {
            let result = self
                .http
                .post(&self.settings.revoke_url)
                .form(&[
                    ("token", token.expose_secret()),
                    ("token_type_hint", "access_token"),
                    ("client_id", self.settings.client_id.as_str()),
                ])
                .send()
                .await;
            match result {
                Ok(r) if r.status().is_success() => {}
                Ok(r) => tracing::warn!(status = r.status().as_u16(), "Token revocation rejected"),
                Err(err) => tracing::warn!(error = %err, "Token revocation failed"),
            }
        }
        self.cache.delete(&self.profile)
    }

    async fn user_info(&self) -> Result<Option<UserInfo>> {
        let session = self.session()?;
        let Some(token) = self.valid_token(&session) else {
            return Ok(None);
        };

        let response = self
            .http
            .get(&self.settings.userinfo_url)
            .bearer_auth(token.expose_secret())
            .send()
            .await
            .context("Failed to reach userinfo endpoint")?;

        match response.status() {
            StatusCode::UNAUTHORIZED => Ok(None),
            s if !s.is_success() => anyhow::bail!("Userinfo endpoint returned {s}"),
            _ => response
                .json::<UserInfo>()
                .await
                .map(Some)
                .context("Failed to parse userinfo response"),
        }
    }

    async fn access_token(&self) -> Result<SecretString> {
        let session = self.session()?;
        if session.access_token().is_none() {
            anyhow::bail!("Not signed in");
        }
        self.valid_token(&session)
            .context("Access token has expired")
    }

    async fn refresh_access_token(&self) -> Result<()> {
        let session = self.session()?;
        let refresh_token = session
            .refresh_token
            .clone()
            .filter(|t| !t.is_empty())
            .context("No refresh token available")?;

        let tokens = self
            .token_request(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.as_str()),
                ("client_id", self.settings.client_id.as_str()),
            ])
            .await?;
        self.store_tokens(tokens, false)?;
        tracing::debug!(profile = %self.profile, "Access token refreshed");
        Ok(())
    }

    async fn id_token(&self) -> Result<Option<SecretString>> {
        Ok(self.session()?.id_token())
    }
}
