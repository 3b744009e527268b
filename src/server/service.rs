use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use http::StatusCode;
use tracing::{debug, error, warn};

use super::request::{read_request, Request, RequestReadError, MAX_BODY_BYTES};
use super::response::Response;
use crate::middleware::panic_message;
use crate::router::Router;

/// Bridges the listener and the router: reads a request off the wire,
/// dispatches it and writes the response back.
#[derive(Clone)]
pub struct AppService {
    router: Arc<Router>,
    max_body: usize,
}

impl AppService {
    pub fn new(router: Arc<Router>) -> Self {
        Self {
            router,
            max_body: MAX_BODY_BYTES,
        }
    }

    #[must_use]
    pub fn with_max_body(mut self, bytes: usize) -> Self {
        self.max_body = bytes;
        self
    }

    #[must_use]
    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Dispatch an already-parsed request.
    ///
    /// Panics that escape the router's own recovery layer (global middleware,
    /// the not-found handler) still end as a 500 here.
    pub fn call(&self, req: Request) -> Response {
        let request_id = req.request_id;
        match catch_unwind(AssertUnwindSafe(|| self.router.dispatch(req))) {
            Ok(res) => res,
            Err(payload) => {
                error!(
                    request_id = %request_id,
                    panic_message = %panic_message(payload.as_ref()),
                    "Panic outside route middleware"
                );
                Response::error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        }
    }

    /// Serve one `tiny_http` request to completion.
    pub fn handle(&self, mut raw: tiny_http::Request) {
        let res = match read_request(&mut raw, self.max_body) {
            Ok(req) => self.call(req),
            Err(RequestReadError::BodyTooLarge { limit }) => {
                warn!(url = %raw.url(), limit, "Request body too large");
                Response::error(StatusCode::PAYLOAD_TOO_LARGE, "Request body too large")
            }
            Err(e) => {
                warn!(url = %raw.url(), error = %e, "Unreadable request");
                Response::error(StatusCode::BAD_REQUEST, "Bad request")
            }
        };

        if let Err(e) = raw.respond(res.into_tiny_http()) {
            // Usually the client hung up first.
            debug!(error = %e, "Failed to write response");
        }
    }
}
