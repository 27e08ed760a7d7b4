//! Session cache for storing transient authentication state.
//!
//! Tokens, cookies and in-progress sign-in state live in one JSON file per
//! profile under the user cache directory. Nothing here is ever uploaded.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

/// Seconds before the recorded expiry at which a token is treated as
/// expired.
pub const EXPIRY_SKEW_SECS: i64 = 30;

/// State kept between starting an authorization-code sign-in and receiving
/// the code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingSignIn {
    pub state: String,
    pub code_verifier: String,
    pub created_at: i64,
}

/// Session data for one profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionData {
    #[serde(default)]
    pub access_token: Option<String>,

    #[serde(default)]
    pub refresh_token: Option<String>,

    #[serde(default)]
    pub id_token: Option<String>,

    /// Access token expiry (Unix timestamp).
    #[serde(default)]
    pub expires_at: Option<i64>,

    /// Session cookies (name -> value).
    #[serde(default)]
    pub cookies: BTreeMap<String, String>,

    /// Opaque hint the auth proxy wants back on logout.
    #[serde(default)]
    pub session_hint: Option<String>,

    /// When the session was captured (Unix timestamp).
    #[serde(default)]
    pub captured_at: Option<i64>,

    #[serde(default)]
    pub pending: Option<PendingSignIn>,
}

impl SessionData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.insert(name.into(), value.into());
        self
    }

    /// Format cookies as a Cookie header value.
    pub fn cookie_header(&self) -> String {
        self.cookies
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("; ")
    }

    pub fn has_cookies(&self) -> bool {
        !self.cookies.is_empty()
    }

    /// Merge a `Set-Cookie` header value. Attributes after the first `;`
    /// are ignored; an empty value removes the cookie.
    pub fn apply_set_cookie(&mut self, header: &str) {
        let pair = header.split(';').next().unwrap_or_default();
        let Some((name, value)) = pair.split_once('=') else {
            return;
        };
        let (name, value) = (name.trim(), value.trim());
        if name.is_empty() {
            return;
        }
        if value.is_empty() {
            self.cookies.remove(name);
        } else {
            self.cookies.insert(name.to_string(), value.to_string());
        }
    }

    /// Whether the access token is past its expiry (minus
    /// [`EXPIRY_SKEW_SECS`]) at `now`. Tokens without an expiry never
    /// expire locally.
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at
            .is_some_and(|exp| now >= exp.saturating_sub(EXPIRY_SKEW_SECS))
    }

    pub fn access_token(&self) -> Option<SecretString> {
        self.access_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .map(|t| SecretString::from(t.to_string()))
    }

    pub fn id_token(&self) -> Option<SecretString> {
        self.id_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .map(|t| SecretString::from(t.to_string()))
    }
}

/// Cache for session data, stored locally.
#[derive(Debug, Clone)]
pub struct SessionCache {
    cache_dir: PathBuf,
}

impl SessionCache {
    /// Create a new session cache.
    ///
    /// Uses `~/.cache/statement-analyzer/sessions/` by default.
    pub fn new() -> Result<Self> {
        let cache_dir = dirs::cache_dir()
            .context("Could not find cache directory")?
            .join("statement-analyzer")
            .join("sessions");
        Self::with_path(cache_dir)
    }

    /// Create a session cache at a custom location.
    pub fn with_path(cache_dir: impl AsRef<Path>) -> Result<Self> {
        let cache_dir = cache_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&cache_dir)
            .with_context(|| format!("Failed to create session cache dir: {cache_dir:?}"))?;
        Ok(Self { cache_dir })
    }

    fn session_file(&self, profile: &str) -> Result<PathBuf> {
        let valid = !profile.is_empty()
            && profile
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            anyhow::bail!("Invalid session profile name: {profile:?}");
        }
        Ok(self.cache_dir.join(format!("{profile}.json")))
    }

    /// Load session data for a profile.
    pub fn get(&self, profile: &str) -> Result<Option<SessionData>> {
        let path = self.session_file(profile)?;
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read session file: {path:?}"))?;

        let session: SessionData = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse session file: {path:?}"))?;

        Ok(Some(session))
    }

    /// Save session data for a profile.
    pub fn set(&self, profile: &str, session: &SessionData) -> Result<()> {
        let path = self.session_file(profile)?;
        let content =
            serde_json::to_string_pretty(session).context("Failed to serialize session")?;

        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write session file: {path:?}"))?;

        Ok(())
    }

    /// Load, modify and save a profile's session in one step.
    pub fn update<F>(&self, profile: &str, f: F) -> Result<SessionData>
    where
        F: FnOnce(&mut SessionData),
    {
        let mut session = self.get(profile)?.unwrap_or_default();
        f(&mut session);
        self.set(profile, &session)?;
        Ok(session)
    }

    /// Delete session data for a profile.
    pub fn delete(&self, profile: &str) -> Result<()> {
        let path = self.session_file(profile)?;
        if path.exists() {
            std::fs::remove_file(&path)
                .with_context(|| format!("Failed to delete session file: {path:?}"))?;
        }
        Ok(())
    }
}
