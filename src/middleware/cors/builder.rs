use http::Method;

use super::{CorsConfigError, CorsMiddleware};

/// Validating builder for [`CorsMiddleware`].
///
/// Defaults: no origins, `Content-Type` and `Authorization` headers,
/// `GET, POST, PUT, DELETE, OPTIONS`, no credentials.
///
/// ```rust
/// use todo_api::middleware::CorsMiddlewareBuilder;
///
/// let cors = CorsMiddlewareBuilder::new()
///     .allowed_origins(&["http://localhost:3000"])
///     .allow_credentials(true)
///     .build()
///     .unwrap();
/// assert!(cors.allows_origin("http://localhost:3000"));
/// ```
pub struct CorsMiddlewareBuilder {
    allowed_origins: Vec<String>,
    allowed_headers: Vec<String>,
    allowed_methods: Vec<Method>,
    allow_credentials: bool,
    max_age: Option<u32>,
}

impl CorsMiddlewareBuilder {
    pub fn new() -> Self {
        Self {
            allowed_origins: vec![],
            allowed_headers: vec!["Content-Type".into(), "Authorization".into()],
            allowed_methods: vec![
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
            ],
            allow_credentials: false,
            max_age: None,
        }
    }

    pub fn allowed_origins(mut self, origins: &[&str]) -> Self {
        self.allowed_origins = origins.iter().map(|s| s.trim_end_matches('/').to_string()).collect();
        self
    }

    pub fn allowed_methods(mut self, methods: &[Method]) -> Self {
        self.allowed_methods = methods.to_vec();
        self
    }

    pub fn allowed_headers(mut self, headers: &[&str]) -> Self {
        self.allowed_headers = headers.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn allow_credentials(mut self, allow: bool) -> Self {
        self.allow_credentials = allow;
        self
    }

    /// Seconds browsers may cache a preflight answer.
    pub fn max_age(mut self, seconds: u32) -> Self {
        self.max_age = Some(seconds);
        self
    }

    /// # Errors
    ///
    /// See [`CorsConfigError`].
    pub fn build(self) -> Result<CorsMiddleware, CorsConfigError> {
        let wildcard = self.allowed_origins.iter().any(|o| o == "*");
        if self.allow_credentials && wildcard {
            return Err(CorsConfigError::WildcardWithCredentials);
        }
        if self.allow_credentials && self.allowed_origins.is_empty() {
            return Err(CorsConfigError::EmptyOriginsWithCredentials);
        }
        for origin in self.allowed_origins.iter().filter(|o| *o != "*") {
            let valid = url::Url::parse(origin)
                .map(|u| u.has_host() && matches!(u.scheme(), "http" | "https") && u.path() == "/")
                .unwrap_or(false);
            if !valid {
                return Err(CorsConfigError::InvalidOrigin {
                    origin: origin.clone(),
                });
            }
        }

        Ok(CorsMiddleware {
            wildcard,
            allowed_origins: self.allowed_origins,
            allowed_headers: self.allowed_headers,
            allowed_methods: self.allowed_methods,
            allow_credentials: self.allow_credentials,
            max_age: self.max_age,
        })
    }
}

impl Default for CorsMiddlewareBuilder {
    fn default() -> Self {
        Self::new()
    }
}
