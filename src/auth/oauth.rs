//! The begin/complete contract of an external OAuth provider and the
//! redirect-flow bookkeeping around it.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::session::{random_token, CookiePolicy};
use super::store::SessionStore;
use super::AuthError;
use crate::model::OAuthProfile;
use crate::server::Request;

pub const STATE_COOKIE: &str = "todo_oauth_state";
const STATE_PREFIX: &str = "oauth_state_";
const STATE_TTL: Duration = Duration::from_secs(10 * 60);

/// One OAuth 2.0 authorization-code provider.
pub trait OAuthProvider: Send + Sync {
    /// Path segment used in `/auth/{provider}`.
    fn name(&self) -> &str;

    /// Where to send the browser to start a login carrying `state`.
    fn authorize_url(&self, state: &str) -> String;

    /// Exchange an authorization code for the user's profile.
    fn exchange(&self, code: &str) -> Result<OAuthProfile, AuthError>;
}

/// Providers keyed by name.
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, Arc<dyn OAuthProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, provider: Arc<dyn OAuthProvider>) -> &mut Self {
        self.providers.insert(provider.name().to_string(), provider);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn OAuthProvider>> {
        self.providers.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

/// Result of starting a login.
#[derive(Debug)]
pub struct LoginRedirect {
    pub location: String,
    pub state_cookie: String,
}

/// Drives the two redirects of the authorization-code flow.
///
/// `state` is stored server-side and mirrored in an HTTP-only cookie; the
/// callback must present both, for the same provider, within ten minutes, and
/// each state is accepted once.
pub struct OAuthFlow {
    providers: ProviderRegistry,
    store: Arc<dyn SessionStore>,
    cookies: CookiePolicy,
}

impl OAuthFlow {
    pub fn new(providers: ProviderRegistry, store: Arc<dyn SessionStore>, cookies: CookiePolicy) -> Self {
        Self {
            providers,
            store,
            cookies,
        }
    }

    #[must_use]
    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    /// # Errors
    ///
    /// [`AuthError::UnknownProvider`], or a store failure.
    pub fn begin(&self, provider_name: &str) -> Result<LoginRedirect, AuthError> {
        let provider = self
            .providers
            .get(provider_name)
            .ok_or_else(|| AuthError::UnknownProvider(provider_name.to_string()))?;

        let state = random_token();
        self.store
            .set(&format!("{STATE_PREFIX}{state}"), provider.name(), STATE_TTL)?;
        debug!(provider = %provider.name(), "OAuth login started");

        Ok(LoginRedirect {
            location: provider.authorize_url(&state),
            state_cookie: self.cookies.render(STATE_COOKIE, &state, "/auth", STATE_TTL),
        })
    }

    /// Validate the callback and exchange its code.
    ///
    /// # Errors
    ///
    /// [`AuthError::UnknownProvider`], [`AuthError::InvalidState`],
    /// [`AuthError::Provider`] (including a provider-reported `error` query
    /// parameter), or a store failure.
    pub fn complete(&self, provider_name: &str, req: &Request) -> Result<OAuthProfile, AuthError> {
        let provider = self
            .providers
            .get(provider_name)
            .ok_or_else(|| AuthError::UnknownProvider(provider_name.to_string()))?;

        if let Some(err) = req.query_param("error") {
            return Err(AuthError::Provider(format!("provider returned error: {err}")));
        }

        let state = req.query_param("state").ok_or(AuthError::InvalidState)?;
        if req.cookie(STATE_COOKIE) != Some(state) {
            warn!(provider = %provider_name, "OAuth state does not match cookie");
            return Err(AuthError::InvalidState);
        }
        match self.store.take(&format!("{STATE_PREFIX}{state}"))? {
            Some(stored) if stored == provider.name() => {}
            _ => {
                warn!(provider = %provider_name, "OAuth state unknown, expired or for another provider");
                return Err(AuthError::InvalidState);
            }
        }

        let code = req
            .query_param("code")
            .filter(|c| !c.is_empty())
            .ok_or_else(|| AuthError::Provider("missing authorization code".to_string()))?;

        provider.exchange(code)
    }

    /// `Set-Cookie` value that removes the state cookie.
    #[must_use]
    pub fn expired_state_cookie(&self) -> String {
        self.cookies.render(STATE_COOKIE, "", "/auth", Duration::ZERO)
    }
}
