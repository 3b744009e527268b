//! # Configuration Module
//!
//! Typed application configuration loaded from environment variables.
//!
//! ## Environment Variables
//!
//! | Variable | Default |
//! |---|---|
//! | `BACKEND_CONTAINER_PORT` | `4000` |
//! | `SERVER_WORKERS` | `8` |
//! | `POSTGRES_HOST` | unset: in-memory store |
//! | `POSTGRES_PORT` | `5432` |
//! | `POSTGRES_DB`, `POSTGRES_USER`, `POSTGRES_PASSWORD` | required with `POSTGRES_HOST` |
//! | `REDIS_HOST` | unset: in-memory sessions |
//! | `REDIS_PORT` | `6379` |
//! | `GOOGLE_CLIENT_ID`, `GOOGLE_CLIENT_SECRET`, `OAUTH_CALLBACK_URL` | unset: Google login disabled |
//! | `FRONTEND_URL` | `http://localhost:3000` |
//! | `COOKIE_SECURE` | `false` |
//! | `SESSION_SECRET` | random per process |
//!
//! Empty values count as unset. Ports must be in `1..=65535` and URLs must
//! parse; anything else is a [`ConfigError`] at startup.
//!
//! ## Usage
//!
//! ```rust
//! use todo_api::config::AppConfig;
//!
//! let config = AppConfig::from_lookup(|key| match key {
//!     "BACKEND_CONTAINER_PORT" => Some("8080".to_string()),
//!     _ => None,
//! })
//! .unwrap();
//! assert_eq!(config.port, 8080);
//! assert!(config.database.is_none());
//! ```

use rand::RngCore;
use std::fmt;
use thiserror::Error;
use url::Url;

use crate::auth::GoogleCredentials;

pub const DEFAULT_PORT: u16 = 4000;
pub const DEFAULT_WORKERS: usize = 8;
pub const DEFAULT_FRONTEND_URL: &str = "http://localhost:3000";
/// HMAC keys shorter than this are rejected.
pub const MIN_SECRET_BYTES: usize = 32;

const DB_MAX_CONNECTIONS: u32 = 10;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} is required when {because} is set")]
    Missing { var: &'static str, because: &'static str },
    #[error("{var}={value:?} is not a valid port (1-65535)")]
    InvalidPort { var: &'static str, value: String },
    #[error("{var}={value:?} is not a positive integer")]
    InvalidNumber { var: &'static str, value: String },
    #[error("{var}={value:?} is not a boolean")]
    InvalidBool { var: &'static str, value: String },
    #[error("{var}={value:?} is not a valid URL: {source}")]
    InvalidUrl {
        var: &'static str,
        value: String,
        #[source]
        source: url::ParseError,
    },
    #[error("SESSION_SECRET must be at least {MIN_SECRET_BYTES} bytes, got {len}")]
    SecretTooShort { len: usize },
}

#[derive(Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    pub max_connections: u32,
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"***")
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
}

impl RedisConfig {
    #[must_use]
    pub fn url(&self) -> String {
        format!("redis://{}:{}/", self.host, self.port)
    }
}

/// HMAC key for session cookies. Never printed.
#[derive(Clone)]
pub struct SessionSecret {
    bytes: Vec<u8>,
    generated: bool,
}

impl SessionSecret {
    /// 32 fresh random bytes; sessions will not survive a restart.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = vec![0u8; MIN_SECRET_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self {
            bytes,
            generated: true,
        }
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// True when no `SESSION_SECRET` was configured.
    #[must_use]
    pub fn is_generated(&self) -> bool {
        self.generated
    }
}

impl fmt::Debug for SessionSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionSecret")
            .field("bytes", &"***")
            .field("generated", &self.generated)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub workers: usize,
    /// `None` selects the in-memory store.
    pub database: Option<DatabaseConfig>,
    /// `None` selects in-memory sessions.
    pub redis: Option<RedisConfig>,
    /// `None` disables Google login.
    pub google: Option<GoogleCredentials>,
    pub frontend_url: String,
    pub cookie_secure: bool,
    pub session_secret: SessionSecret,
}

impl AppConfig {
    /// Load from the process environment.
    ///
    /// # Errors
    ///
    /// See [`AppConfig::from_lookup`].
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load through `lookup`, which maps a variable name to its value.
    ///
    /// # Errors
    ///
    /// [`ConfigError`] for malformed ports, counts, booleans or URLs, a short
    /// session secret, or a partially configured database or Google client.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port = parse_port(&get, "BACKEND_CONTAINER_PORT", DEFAULT_PORT)?;
        let workers = match get("SERVER_WORKERS") {
            None => DEFAULT_WORKERS,
            Some(v) => match v.trim().parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ConfigError::InvalidNumber {
                        var: "SERVER_WORKERS",
                        value: v,
                    })
                }
            },
        };

        let database = match get("POSTGRES_HOST") {
            None => None,
            Some(host) => {
                let required = |var: &'static str| {
                    get(var).ok_or(ConfigError::Missing {
                        var,
                        because: "POSTGRES_HOST",
                    })
                };
                Some(DatabaseConfig {
                    host,
                    port: parse_port(&get, "POSTGRES_PORT", 5432)?,
                    database: required("POSTGRES_DB")?,
                    user: required("POSTGRES_USER")?,
                    password: required("POSTGRES_PASSWORD")?,
                    max_connections: DB_MAX_CONNECTIONS,
                })
            }
        };

        let redis = match get("REDIS_HOST") {
            None => None,
            Some(host) => Some(RedisConfig {
                host,
                port: parse_port(&get, "REDIS_PORT", 6379)?,
            }),
        };

        let google = match get("GOOGLE_CLIENT_ID") {
            None => None,
            Some(client_id) => {
                let required = |var: &'static str| {
                    get(var).ok_or(ConfigError::Missing {
                        var,
                        because: "GOOGLE_CLIENT_ID",
                    })
                };
                let callback_url = required("OAUTH_CALLBACK_URL")?;
                check_url("OAUTH_CALLBACK_URL", &callback_url)?;
                Some(GoogleCredentials {
                    client_id,
                    client_secret: required("GOOGLE_CLIENT_SECRET")?,
                    callback_url,
                })
            }
        };

        let frontend_url = get("FRONTEND_URL").unwrap_or_else(|| DEFAULT_FRONTEND_URL.to_string());
        check_url("FRONTEND_URL", &frontend_url)?;

        let cookie_secure = match get("COOKIE_SECURE") {
            None => false,
            Some(v) => match v.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => {
                    return Err(ConfigError::InvalidBool {
                        var: "COOKIE_SECURE",
                        value: v,
                    })
                }
            },
        };

        let session_secret = match get("SESSION_SECRET") {
            None => SessionSecret::generate(),
            Some(v) if v.len() < MIN_SECRET_BYTES => {
                return Err(ConfigError::SecretTooShort { len: v.len() })
            }
            Some(v) => SessionSecret {
                bytes: v.into_bytes(),
                generated: false,
            },
        };

        Ok(Self {
            port,
            workers,
            database,
            redis,
            google,
            frontend_url,
            cookie_secure,
            session_secret,
        })
    }
}

fn parse_port<G>(get: &G, var: &'static str, default: u16) -> Result<u16, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    match get(var) {
        None => Ok(default),
        Some(v) => match v.trim().parse::<u16>() {
            Ok(p) if p > 0 => Ok(p),
            _ => Err(ConfigError::InvalidPort { var, value: v }),
        },
    }
}

fn check_url(var: &'static str, value: &str) -> Result<(), ConfigError> {
    Url::parse(value)
        .map(|_| ())
        .map_err(|source| ConfigError::InvalidUrl {
            var,
            value: value.to_string(),
            source,
        })
}
