use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use anyhow::Result;
use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use crate::client::{AuthEvent, AuthEvents, TokenSource};

/// Claims describing the signed-in user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserInfo {
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default, alias = "preferred_username")]
    pub username: Option<String>,
    #[serde(default, alias = "displayName")]
    pub name: Option<String>,
    #[serde(default)]
    pub given_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    /// Missing and empty are different: missing never grants a role.
    #[serde(default)]
    pub groups: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl UserInfo {
    /// Best name to show for the user.
    pub fn display_name(&self) -> &str {
        [&self.name, &self.given_name, &self.username, &self.email, &self.sub]
            .into_iter()
            .find_map(|v| v.as_deref().filter(|s| !s.is_empty()))
            .unwrap_or("unknown user")
    }
}

/// What starting a sign-in produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignInOutcome {
    /// An existing session was found and is usable.
    SignedIn,
    /// The user has to finish signing in at `url`.
    Redirect { url: String },
}

/// An external identity provider.
///
/// Implementations talk to the provider; [`SessionProvider`] turns their
/// answers into a [`Session`].
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn sign_in(&self) -> Result<SignInOutcome>;

    async fn sign_out(&self) -> Result<()>;

    /// `Ok(None)` when there is no valid session.
    async fn user_info(&self) -> Result<Option<UserInfo>>;

    async fn access_token(&self) -> Result<SecretString>;

    async fn refresh_access_token(&self) -> Result<()>;

    /// ID token, used when no access token can be produced.
    async fn id_token(&self) -> Result<Option<SecretString>> {
        Ok(None)
    }
}

/// Session snapshot. Only [`SessionProvider`] mutates it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    pub user: Option<UserInfo>,
    pub is_authenticated: bool,
    pub loading: bool,
    pub error: Option<String>,
}

/// Owns the session and mediates every call into the identity provider.
pub struct SessionProvider {
    identity: Arc<dyn IdentityProvider>,
    session: RwLock<Session>,
}

impl SessionProvider {
    pub fn new(identity: Arc<dyn IdentityProvider>) -> Self {
        Self {
            identity,
            session: RwLock::new(Session::default()),
        }
    }

    /// Current session (a copy).
    pub fn session(&self) -> Session {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_authenticated
    }

    fn update(&self, f: impl FnOnce(&mut Session)) {
        let mut session = self.session.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut session);
    }

    fn record_error(&self, err: &anyhow::Error) {
        let message = format!("{err:#}");
        self.update(|s| s.error = Some(message));
    }

    /// Reload the user from the identity provider.
    pub async fn refresh_session(&self) -> Result<()> {
        self.update(|s| {
            s.loading = true;
            s.error = None;
        });

        let outcome = self.identity.user_info().await;
        self.update(|s| {
            s.loading = false;
            match &outcome {
                Ok(user) => {
                    s.is_authenticated = user.is_some();
                    s.user = user.clone();
                }
                Err(err) => {
                    s.is_authenticated = false;
                    s.user = None;
                    s.error = Some(format!("{err:#}"));
                }
            }
        });

        match outcome {
            Ok(user) => {
                tracing::debug!(
                    provider = self.identity.name(),
                    authenticated = user.is_some(),
                    "Session refreshed"
                );
                Ok(())
            }
            Err(err) => {
                tracing::warn!(provider = self.identity.name(), error = %err, "Failed to load user info");
                Err(err)
            }
        }
    }

    pub async fn sign_in(&self) -> Result<SignInOutcome> {
        self.update(|s| s.error = None);
        match self.identity.sign_in().await {
            Ok(SignInOutcome::SignedIn) => {
                tracing::info!(provider = self.identity.name(), "Signed in");
                self.refresh_session().await?;
                Ok(SignInOutcome::SignedIn)
            }
            Ok(redirect) => Ok(redirect),
            Err(err) => {
                tracing::warn!(provider = self.identity.name(), error = %err, "Sign in failed");
                self.record_error(&err);
                Err(err)
            }
        }
    }

    pub async fn sign_out(&self) -> Result<()> {
        self.update(|s| s.error = None);
        match self.identity.sign_out().await {
            Ok(()) => {
                tracing::info!(provider = self.identity.name(), "Signed out");
                self.update(|s| {
                    s.user = None;
                    s.is_authenticated = false;
                });
                Ok(())
            }
            Err(err) => {
                tracing::warn!(provider = self.identity.name(), error = %err, "Sign out failed");
                self.record_error(&err);
                Err(err)
            }
        }
    }

    /// Access token, refreshing once if the first attempt fails.
    pub async fn get_token(&self) -> Result<SecretString> {
        match self.identity.access_token().await {
            Ok(token) => Ok(token),
            Err(err) => {
                tracing::debug!(error = %err, "Access token unavailable, refreshing");
                if let Err(refresh_err) = self.identity.refresh_access_token().await {
                    tracing::warn!(error = %refresh_err, "Token refresh failed");
                    return Err(refresh_err);
                }
                self.identity.access_token().await
            }
        }
    }

    /// Whether the signed-in user belongs to `role`.
    pub fn has_role(&self, role: &str) -> bool {
        let session = self.session.read().unwrap_or_else(PoisonError::into_inner);
        session
            .user
            .as_ref()
            .and_then(|u| u.groups.as_ref())
            .is_some_and(|groups| groups.iter().any(|g| g == role))
    }

    /// Sign in again whenever the HTTP layer reports an expired token.
    ///
    /// The task ends when every [`AuthEvents`] sender is gone.
    pub fn spawn_token_expiry_listener(self: &Arc<Self>, events: &AuthEvents) -> JoinHandle<()> {
        let provider = Arc::clone(self);
        let mut rx = events.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(AuthEvent::TokenExpired) | Err(RecvError::Lagged(_)) => {
                        tracing::info!("Token expired, signing in again");
                        match provider.sign_in().await {
                            Ok(SignInOutcome::Redirect { url }) => {
                                tracing::warn!(url = %url, "Sign in required");
                            }
                            Ok(SignInOutcome::SignedIn) => {}
                            Err(err) => {
                                tracing::warn!(error = %err, "Re-sign-in after token expiry failed");
                            }
                        }
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}

#[async_trait]
impl TokenSource for SessionProvider {
    async fn access_token(&self) -> Result<Option<SecretString>> {
        if !self.is_authenticated() {
            return Ok(None);
        }
        match self.get_token().await {
            Ok(token) => Ok(Some(token)),
            Err(err) => match self.identity.id_token().await {
                Ok(Some(id_token)) => {
                    tracing::debug!("Falling back to ID token");
                    Ok(Some(id_token))
                }
                _ => Err(err),
            },
        }
    }

    async fn refresh_access_token(&self) -> Result<Option<SecretString>> {
        if !self.is_authenticated() {
            return Ok(None);
        }
        self.identity.refresh_access_token().await?;
        self.identity.access_token().await.map(Some)
    }
}
