//! Session-gated access through an external identity provider.
//!
//! Two interchangeable [`IdentityProvider`]s are supported, selected by
//! `auth.mode` in the configuration:
//!
//! - [`ProxySessionIdentity`]: cookie session behind a same-origin
//!   `/auth/*` proxy
//! - [`OidcIdentity`]: authorization-code + PKCE against an OIDC provider
//!
//! [`SessionProvider`] wraps either one, owns the [`Session`] and acts as the
//! HTTP client's [`TokenSource`](crate::client::TokenSource).

mod oidc;
mod provider;
mod proxy;
mod session;

pub use oidc::{code_challenge, generate_code_verifier, OidcIdentity, OidcSettings};
pub use provider::{IdentityProvider, Session, SessionProvider, SignInOutcome, UserInfo};
pub use proxy::{ProxySessionIdentity, LOGIN_PATH, LOGOUT_PATH, SESSION_HINT_COOKIE, USERINFO_PATH};
pub use session::{PendingSignIn, SessionCache, SessionData, EXPIRY_SKEW_SECS};

use std::sync::Arc;

use anyhow::Result;

use crate::config::{AuthMode, ResolvedConfig};

/// Build the identity provider selected by the configuration, or `None`
/// when auth is disabled.
pub fn identity_from_config(
    config: &ResolvedConfig,
    cache: SessionCache,
) -> Result<Option<Arc<dyn IdentityProvider>>> {
    let profile = config.auth.profile.clone();
    let identity: Arc<dyn IdentityProvider> = match config.auth.mode {
        AuthMode::None => return Ok(None),
        AuthMode::Proxy => Arc::new(ProxySessionIdentity::new(
            config.auth_base_url(),
            cache,
            profile,
        )),
        AuthMode::Oidc => Arc::new(OidcIdentity::new(
            OidcSettings::from_config(config)?,
            cache,
            profile,
        )),
    };
    Ok(Some(identity))
}
