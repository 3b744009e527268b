//! Signed session cookies backed by a [`SessionStore`].
//!
//! The cookie carries `<key>.<tag>` where `key` is 32 random bytes and `tag` is
//! HMAC-SHA256 over the key, both base64url without padding. The tag is checked
//! before the store is consulted, so forged cookies never cost a backend round
//! trip. The store maps `session_<key>` to the user id.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use cookie::{Cookie, SameSite};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::store::{SessionError, SessionStore};
use super::AuthError;
use crate::ids::UserId;
use crate::server::Request;

type HmacSha256 = Hmac<Sha256>;

pub const SESSION_COOKIE: &str = "todo_session";
/// Seven days.
pub const SESSION_MAX_AGE: Duration = Duration::from_secs(7 * 24 * 60 * 60);

const SESSION_PREFIX: &str = "session_";

/// Cookie attributes shared by the session and OAuth state cookies.
#[derive(Debug, Clone)]
pub struct CookiePolicy {
    pub secure: bool,
}

impl CookiePolicy {
    /// `Set-Cookie` value for `name=value` with `HttpOnly`, `SameSite=Lax` and
    /// the given path and lifetime. A zero lifetime deletes the cookie.
    pub fn render(&self, name: &str, value: &str, path: &str, max_age: Duration) -> String {
        Cookie::build((name.to_string(), value.to_string()))
            .path(path.to_string())
            .http_only(true)
            .secure(self.secure)
            .same_site(SameSite::Lax)
            .max_age(cookie::time::Duration::seconds(
                i64::try_from(max_age.as_secs()).unwrap_or(i64::MAX),
            ))
            .build()
            .to_string()
    }
}

/// Issues, resolves and revokes sessions.
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    mac: HmacSha256,
    cookies: CookiePolicy,
}

impl SessionManager {
    /// # Errors
    ///
    /// [`SessionError::Key`] when the HMAC implementation rejects `secret`.
    pub fn new(
        store: Arc<dyn SessionStore>,
        secret: &[u8],
        cookies: CookiePolicy,
    ) -> Result<Self, SessionError> {
        let mac = HmacSha256::new_from_slice(secret).map_err(|e| SessionError::Key(e.to_string()))?;
        Ok(Self {
            store,
            mac,
            cookies,
        })
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    #[must_use]
    pub fn cookie_policy(&self) -> &CookiePolicy {
        &self.cookies
    }

    /// Start a session for `user_id` and return the `Set-Cookie` value.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub fn login(&self, user_id: UserId) -> Result<String, SessionError> {
        let key = random_token();
        self.store.set(
            &format!("{SESSION_PREFIX}{key}"),
            &user_id.to_string(),
            SESSION_MAX_AGE,
        )?;
        info!(user_id = %user_id, "Session created");
        let value = format!("{key}.{}", self.sign(&key));
        Ok(self.cookies.render(SESSION_COOKIE, &value, "/", SESSION_MAX_AGE))
    }

    /// Resolve the user behind the request's session cookie.
    ///
    /// # Errors
    ///
    /// [`AuthError::Unauthenticated`] for a missing, forged, expired or
    /// unparsable session; [`AuthError::Session`] when the store fails.
    pub fn resolve(&self, req: &Request) -> Result<UserId, AuthError> {
        let key = req
            .cookie(SESSION_COOKIE)
            .and_then(|value| self.verify(value))
            .ok_or(AuthError::Unauthenticated)?;

        let stored = self
            .store
            .get(&format!("{SESSION_PREFIX}{key}"))?
            .ok_or(AuthError::Unauthenticated)?;

        stored.parse::<UserId>().map_err(|e| {
            warn!(error = %e, "Session record holds an invalid user id");
            AuthError::Unauthenticated
        })
    }

    /// Drop the server-side record (if any) and return a deleting `Set-Cookie`.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub fn logout(&self, req: &Request) -> Result<String, SessionError> {
        if let Some(key) = req.cookie(SESSION_COOKIE).and_then(|v| self.verify(v)) {
            self.store.clear(&format!("{SESSION_PREFIX}{key}"))?;
            debug!("Session record cleared");
        }
        Ok(self.expired_cookie())
    }

    /// `Set-Cookie` value that removes the session cookie from the browser.
    #[must_use]
    pub fn expired_cookie(&self) -> String {
        self.cookies.render(SESSION_COOKIE, "", "/", Duration::ZERO)
    }

    fn sign(&self, key: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(key.as_bytes());
        URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
    }

    /// The session key inside a well-formed, correctly signed cookie value.
    fn verify<'v>(&self, value: &'v str) -> Option<&'v str> {
        let (key, tag) = value.split_once('.')?;
        let tag = URL_SAFE_NO_PAD.decode(tag).ok()?;
        let mut mac = self.mac.clone();
        mac.update(key.as_bytes());
        mac.verify_slice(&tag).ok()?;
        Some(key)
    }
}

/// 32 random bytes, base64url encoded.
pub fn random_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
