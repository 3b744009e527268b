use std::sync::Arc;

use crate::server::{Request, Response};

/// Anything that turns a request into a response.
///
/// Implemented for every `Fn(Request) -> Response + Send + Sync`, so plain
/// closures register as route handlers.
pub trait Handler: Send + Sync {
    fn call(&self, req: Request) -> Response;
}

impl<F> Handler for F
where
    F: Fn(Request) -> Response + Send + Sync,
{
    fn call(&self, req: Request) -> Response {
        self(req)
    }
}

/// Shared, type-erased handler as stored in the route table.
pub type BoxHandler = Arc<dyn Handler>;

/// Cross-cutting behavior wrapped around a handler.
///
/// An implementation may act before the inner chain, short-circuit by
/// returning without calling [`Next::run`], or post-process the response the
/// inner chain produced.
pub trait Middleware: Send + Sync {
    fn handle(&self, req: Request, next: Next<'_>) -> Response;
}

/// The remainder of a middleware chain.
///
/// `Next::new(&[m1, m2], h).run(req)` evaluates `m1(m2(h))(req)`: the first
/// middleware in the slice is the outermost.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    middleware: &'a [Arc<dyn Middleware>],
    endpoint: &'a dyn Handler,
}

impl<'a> Next<'a> {
    pub fn new(middleware: &'a [Arc<dyn Middleware>], endpoint: &'a dyn Handler) -> Self {
        Self {
            middleware,
            endpoint,
        }
    }

    /// Hand the request to the next layer, or to the endpoint when none is left.
    pub fn run(self, req: Request) -> Response {
        match self.middleware.split_first() {
            Some((current, rest)) => current.handle(
                req,
                Next {
                    middleware: rest,
                    endpoint: self.endpoint,
                },
            ),
            None => self.endpoint.call(req),
        }
    }
}
