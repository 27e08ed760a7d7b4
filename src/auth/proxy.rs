//! Cookie session behind a same-origin auth proxy.
//!
//! The proxy exposes `/auth/login`, `/auth/logout?session_hint=` and
//! `/auth/userinfo`. The session itself is a set of cookies the browser (or
//! `statement-analyzer login --cookie`) obtained from the login redirect.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{COOKIE, SET_COOKIE};
use reqwest::{Client, StatusCode};
use secrecy::SecretString;

use super::provider::{IdentityProvider, SignInOutcome, UserInfo};
use super::session::{SessionCache, SessionData};

pub const LOGIN_PATH: &str = "/auth/login";
pub const LOGOUT_PATH: &str = "/auth/logout";
pub const USERINFO_PATH: &str = "/auth/userinfo";

/// Cookie the proxy sets with the value it expects back on logout.
pub const SESSION_HINT_COOKIE: &str = "session_hint";

pub struct ProxySessionIdentity {
    http: Client,
    base_url: String,
    cache: SessionCache,
    profile: String,
}

impl ProxySessionIdentity {
    pub fn new(base_url: impl Into<String>, cache: SessionCache, profile: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            cache,
            profile: profile.into(),
        }
    }

    pub fn with_client(mut self, http: Client) -> Self {
        self.http = http;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn session(&self) -> Result<SessionData> {
        Ok(self.cache.get(&self.profile)?.unwrap_or_default())
    }

    /// Store a session cookie obtained outside this process.
    pub fn import_cookie(&self, name: &str, value: &str) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        self.cache.update(&self.profile, |s| {
            s.cookies.insert(name.to_string(), value.to_string());
            s.captured_at = Some(now);
        })?;
        tracing::info!(profile = %self.profile, cookie = %name, "Imported session cookie");
        Ok(())
    }

    /// Fetch user info with the cached cookies, merging any refreshed
    /// cookies back into the cache.
    async fn fetch_user_info(&self) -> Result<Option<UserInfo>> {
        let session = self.session()?;
        if !session.has_cookies() {
            return Ok(None);
        }

        let response = self
            .http
            .get(self.url(USERINFO_PATH))
            .header(COOKIE, session.cookie_header())
            .send()
            .await
            .context("Failed to reach auth proxy")?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Ok(None);
        }
        if !status.is_success() {
            anyhow::bail!("Auth proxy userinfo returned {status}");
        }

        let set_cookies: Vec<String> = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok().map(str::to_string))
            .collect();
        if !set_cookies.is_empty() {
            self.cache.update(&self.profile, |s| {
                for header in &set_cookies {
                    s.apply_set_cookie(header);
                }
            })?;
        }

        let user = response
            .json::<UserInfo>()
            .await
            .context("Failed to parse userinfo response")?;
        Ok(Some(user))
    }
}

#[async_trait]
impl IdentityProvider for ProxySessionIdentity {
    fn name(&self) -> &str {
        "proxy"
    }

    async fn sign_in(&self) -> Result<SignInOutcome> {
        if self.fetch_user_info().await?.is_some() {
            return Ok(SignInOutcome::SignedIn);
        }
        Ok(SignInOutcome::Redirect {
            url: self.url(LOGIN_PATH),
        })
    }

    async fn sign_out(&self) -> Result<()> {
        let session = self.session()?;
        if session.has_cookies() {
            let mut url = reqwest::Url::parse(&self.url(LOGOUT_PATH))
                .context("Invalid auth proxy URL")?;
            let hint = session
                .session_hint
                .as_deref()
                .or_else(|| session.cookies.get(SESSION_HINT_COOKIE).map(String::as_str));
            if let Some(hint) = hint {
                url.query_pairs_mut().append_pair("session_hint", hint);
            }

            let response = self
                .http
                .get(url)
                .header(COOKIE, session.cookie_header())
                .send()
                .await
                .context("Failed to reach auth proxy")?;
            let status = response.status();
            // Redirects back to the app count as success.
            if !(status.is_success() || status.is_redirection()) {
                anyhow::bail!("Auth proxy logout returned {status}");
            }
        }
        self.cache.delete(&self.profile)
    }

    async fn user_info(&self) -> Result<Option<UserInfo>> {
        self.fetch_user_info().await
    }

    async fn access_token(&self) -> Result<SecretString> {
        self.session()?
            .access_token()
            .context("No access token in proxy session")
    }

    async fn refresh_access_token(&self) -> Result<()> {
        match self.fetch_user_info().await? {
            Some(_) => Ok(()),
            None => anyhow::bail!("Proxy session has expired"),
        }
    }
}
