//! Route table and request dispatch.
//!
//! Lookup is a linear scan in registration order: the first route whose method
//! and compiled pattern both match wins. This keeps priority explicit
//! (`/todos/batch-complete` must be registered before `/todos/{id}`) at the cost
//! of O(n) matching, which is fine for a table of a few dozen routes.

use http::Method;
use serde_json::json;
use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::matcher::{PathMatcher, RouteError};
use crate::middleware::{BoxHandler, Handler, Middleware, Next};
use crate::server::{Request, Response};

/// Path parameters stay inline up to this count.
pub const MAX_INLINE_PARAMS: usize = 8;

/// Captured `(name, value)` pairs in template order.
pub type ParamVec = SmallVec<[(Arc<str>, String); MAX_INLINE_PARAMS]>;

/// Path parameters bound to a request after a route matched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathParams(ParamVec);

impl PathParams {
    /// Value for `name`. When a template repeats a name the last capture wins.
    #[inline]
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_ref(), v.as_str()))
    }
}

impl From<ParamVec> for PathParams {
    fn from(params: ParamVec) -> Self {
        Self(params)
    }
}

/// One registered route.
pub struct Route {
    method: Method,
    matcher: PathMatcher,
    handler: BoxHandler,
    middleware: Vec<Arc<dyn Middleware>>,
}

impl Route {
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    #[must_use]
    pub fn template(&self) -> &str {
        self.matcher.template()
    }

    #[must_use]
    pub fn param_names(&self) -> &[Arc<str>] {
        self.matcher.param_names()
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("template", &self.matcher.template())
            .field("middleware", &self.middleware.len())
            .finish()
    }
}

/// Route-specific middleware runs inside the router-wide layers.
impl Handler for Route {
    fn call(&self, req: Request) -> Response {
        Next::new(&self.middleware, self.handler.as_ref()).run(req)
    }
}

/// Returned by registration so a route can take its own middleware.
pub struct RouteHandle<'a> {
    route: &'a mut Route,
}

impl RouteHandle<'_> {
    /// Wrap this route's handler in `middleware`. The first call is outermost.
    pub fn with(self, middleware: Arc<dyn Middleware>) -> Self {
        self.route.middleware.push(middleware);
        self
    }
}

/// The application router.
///
/// Three kinds of middleware apply, outermost first:
///
/// 1. global middleware, run before lookup and also for unmatched requests,
/// 2. router-wide layers, run around every matched route,
/// 3. route-specific middleware attached through [`RouteHandle::with`].
pub struct Router {
    routes: Vec<Route>,
    global: Vec<Arc<dyn Middleware>>,
    layers: Vec<Arc<dyn Middleware>>,
    not_found: BoxHandler,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("routes", &self.routes)
            .field("global", &self.global.len())
            .field("layers", &self.layers.len())
            .finish()
    }
}

impl Router {
    #[must_use]
    pub fn new() -> Self {
        Self {
            routes: Vec::new(),
            global: Vec::new(),
            layers: Vec::new(),
            not_found: Arc::new(default_not_found),
        }
    }

    /// Register `handler` for `method` on `template`.
    ///
    /// # Errors
    ///
    /// Returns [`RouteError`] when the template is malformed; nothing is
    /// registered in that case.
    pub fn handle<H>(
        &mut self,
        method: Method,
        template: &str,
        handler: H,
    ) -> Result<RouteHandle<'_>, RouteError>
    where
        H: Handler + 'static,
    {
        let matcher = PathMatcher::compile(template)?;
        debug!(
            method = %method,
            template = %template,
            params = ?matcher.param_names(),
            priority = self.routes.len(),
            "Route registered"
        );
        self.routes.push(Route {
            method,
            matcher,
            handler: Arc::new(handler),
            middleware: Vec::new(),
        });
        let index = self.routes.len() - 1;
        Ok(RouteHandle {
            route: &mut self.routes[index],
        })
    }

    pub fn get<H: Handler + 'static>(
        &mut self,
        template: &str,
        handler: H,
    ) -> Result<RouteHandle<'_>, RouteError> {
        self.handle(Method::GET, template, handler)
    }

    pub fn post<H: Handler + 'static>(
        &mut self,
        template: &str,
        handler: H,
    ) -> Result<RouteHandle<'_>, RouteError> {
        self.handle(Method::POST, template, handler)
    }

    pub fn put<H: Handler + 'static>(
        &mut self,
        template: &str,
        handler: H,
    ) -> Result<RouteHandle<'_>, RouteError> {
        self.handle(Method::PUT, template, handler)
    }

    pub fn delete<H: Handler + 'static>(
        &mut self,
        template: &str,
        handler: H,
    ) -> Result<RouteHandle<'_>, RouteError> {
        self.handle(Method::DELETE, template, handler)
    }

    /// Add middleware around every matched route.
    pub fn layer(&mut self, middleware: Arc<dyn Middleware>) -> &mut Self {
        self.layers.push(middleware);
        self
    }

    /// Add middleware that runs before route lookup.
    pub fn global(&mut self, middleware: Arc<dyn Middleware>) -> &mut Self {
        self.global.push(middleware);
        self
    }

    /// Replace the handler used when no route matches.
    pub fn set_not_found<H: Handler + 'static>(&mut self, handler: H) -> &mut Self {
        self.not_found = Arc::new(handler);
        self
    }

    /// Registered routes in priority order.
    pub fn routes(&self) -> impl Iterator<Item = &Route> {
        self.routes.iter()
    }

    /// Print the route table to stdout.
    pub fn dump_routes(&self) {
        println!("[routes] count={}", self.routes.len());
        for route in &self.routes {
            println!("[route] {:<7} {}", route.method.as_str(), route.template());
        }
    }

    /// Find the first route matching `method` and `path`.
    #[must_use]
    pub fn find(&self, method: &Method, path: &str) -> Option<(&Route, PathParams)> {
        self.routes
            .iter()
            .filter(|r| &r.method == method)
            .find_map(|r| r.matcher.captures(path).map(|params| (r, params)))
    }

    /// Run `req` through global middleware, route lookup, route middleware and
    /// the handler.
    pub fn dispatch(&self, req: Request) -> Response {
        Next::new(&self.global, &Lookup(self)).run(req)
    }

    fn lookup(&self, mut req: Request) -> Response {
        let start = Instant::now();
        let found = self.find(&req.method, &req.path);
        let elapsed = start.elapsed();

        match found {
            Some((route, params)) => {
                log_match(&req, route, &params, elapsed);
                req.params = params;
                Next::new(&self.layers, route).run(req)
            }
            None => {
                warn!(
                    request_id = %req.request_id,
                    method = %req.method,
                    path = %req.path,
                    duration_us = elapsed.as_micros() as u64,
                    "No route matched"
                );
                self.not_found.call(req)
            }
        }
    }
}

struct Lookup<'a>(&'a Router);

impl Handler for Lookup<'_> {
    fn call(&self, req: Request) -> Response {
        self.0.lookup(req)
    }
}

fn log_match(req: &Request, route: &Route, params: &PathParams, elapsed: Duration) {
    if elapsed > Duration::from_millis(1) {
        warn!(
            request_id = %req.request_id,
            method = %req.method,
            path = %req.path,
            route = %route.template(),
            path_params = ?params,
            duration_us = elapsed.as_micros() as u64,
            "Slow route matching detected"
        );
    } else {
        info!(
            request_id = %req.request_id,
            method = %req.method,
            path = %req.path,
            route = %route.template(),
            path_params = ?params,
            duration_us = elapsed.as_micros() as u64,
            "Route matched"
        );
    }
}

/// 404 `{"error":"Resource not found","path":...}`.
pub fn default_not_found(req: Request) -> Response {
    Response::json(
        http::StatusCode::NOT_FOUND,
        &json!({ "error": "Resource not found", "path": req.path }),
    )
}
