//! CORS for the browser frontend.
//!
//! Registered as global middleware so pre-flight `OPTIONS` requests are answered
//! before route lookup: the router has no `OPTIONS` routes and would otherwise
//! return 404. Requests from origins outside the allow list pass through without
//! CORS headers and the browser blocks the response.

mod builder;
mod error;

pub use builder::CorsMiddlewareBuilder;
pub use error::CorsConfigError;

use http::{Method, StatusCode};
use tracing::{debug, warn};

use super::{Middleware, Next};
use crate::server::{Request, Response};

pub struct CorsMiddleware {
    pub(crate) wildcard: bool,
    pub(crate) allowed_origins: Vec<String>,
    pub(crate) allowed_headers: Vec<String>,
    pub(crate) allowed_methods: Vec<Method>,
    pub(crate) allow_credentials: bool,
    pub(crate) max_age: Option<u32>,
}

impl CorsMiddleware {
    /// Exact-origin policy for one frontend with cookies allowed.
    ///
    /// # Errors
    ///
    /// Returns [`CorsConfigError::InvalidOrigin`] when `frontend_url` is not an origin.
    pub fn for_frontend(frontend_url: &str) -> Result<Self, CorsConfigError> {
        CorsMiddlewareBuilder::new()
            .allowed_origins(&[frontend_url])
            .allow_credentials(true)
            .build()
    }

    #[must_use]
    pub fn allows_origin(&self, origin: &str) -> bool {
        self.wildcard || self.allowed_origins.iter().any(|o| o == origin)
    }

    fn allow_origin_value<'a>(&self, origin: &'a str) -> &'a str {
        if self.wildcard && !self.allow_credentials {
            "*"
        } else {
            origin
        }
    }

    fn methods_value(&self) -> String {
        self.allowed_methods
            .iter()
            .map(Method::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn apply_common(&self, res: &mut Response, origin: &str) {
        res.set_header("Access-Control-Allow-Origin", self.allow_origin_value(origin));
        if self.allow_credentials {
            res.set_header("Access-Control-Allow-Credentials", "true");
        }
        res.set_header("Vary", "Origin");
    }

    fn preflight(&self, req: &Request, origin: &str) -> Response {
        let mut res = Response::no_content();

        let method_ok = req
            .header("access-control-request-method")
            .and_then(|m| m.trim().parse::<Method>().ok())
            .is_some_and(|m| self.allowed_methods.contains(&m));
        let headers_ok = req
            .header("access-control-request-headers")
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|h| !h.is_empty())
                    .all(|h| self.allowed_headers.iter().any(|a| a.eq_ignore_ascii_case(h)))
            })
            .unwrap_or(true);

        if !method_ok || !headers_ok {
            warn!(
                origin = %origin,
                method_ok,
                headers_ok,
                "CORS preflight rejected"
            );
            return res;
        }

        self.apply_common(&mut res, origin);
        res.set_header("Access-Control-Allow-Methods", &self.methods_value());
        res.set_header("Access-Control-Allow-Headers", &self.allowed_headers.join(", "));
        if let Some(age) = self.max_age {
            res.set_header("Access-Control-Max-Age", &age.to_string());
        }
        res
    }
}

impl Middleware for CorsMiddleware {
    fn handle(&self, req: Request, next: Next<'_>) -> Response {
        let origin = req.header("origin").map(str::to_string);

        if req.method == Method::OPTIONS {
            return match origin.as_deref() {
                Some(o) if self.allows_origin(o) => self.preflight(&req, o),
                Some(o) => {
                    warn!(origin = %o, path = %req.path, "CORS preflight from disallowed origin");
                    Response::new(StatusCode::NO_CONTENT)
                }
                None => Response::no_content(),
            };
        }

        let mut res = next.run(req);
        match origin.as_deref() {
            Some(o) if self.allows_origin(o) => self.apply_common(&mut res, o),
            Some(o) => debug!(origin = %o, "CORS headers withheld"),
            None => {}
        }
        res
    }
}
