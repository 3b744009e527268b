//! # Auth Module
//!
//! Session-based login through external OAuth providers.
//!
//! - [`store`] holds the get/set/clear contract for session records and its
//!   in-memory and Redis backends.
//! - [`session`] issues signed session cookies and resolves them back to a
//!   [`UserId`](crate::ids::UserId).
//! - [`oauth`] defines the provider contract and the state-checked redirect flow.
//! - [`google`] is the Google implementation of that contract.
//!
//! A browser moves between two states: anonymous, and authenticated as one
//! user. Login moves it to authenticated; logout, account deletion and
//! session expiry move it back.

pub mod google;
pub mod oauth;
pub mod session;
pub mod store;

pub use google::{GoogleCredentials, GoogleProvider};
pub use oauth::{LoginRedirect, OAuthFlow, OAuthProvider, ProviderRegistry, STATE_COOKIE};
pub use session::{CookiePolicy, SessionManager, SESSION_COOKIE, SESSION_MAX_AGE};
#[cfg(feature = "redis")]
pub use store::RedisSessionStore;
pub use store::{MemorySessionStore, SessionError, SessionStore};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("no valid session")]
    Unauthenticated,
    #[error("unknown OAuth provider {0:?}")]
    UnknownProvider(String),
    #[error("OAuth state missing, mismatched or expired")]
    InvalidState,
    #[error("OAuth provider failure: {0}")]
    Provider(String),
    #[error(transparent)]
    Session(#[from] SessionError),
}
