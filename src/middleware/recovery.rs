use std::panic::{catch_unwind, AssertUnwindSafe};

use http::StatusCode;
use tracing::error;

use super::{Middleware, Next};
use crate::server::{Request, Response};

/// Turns a panic anywhere in the inner chain into a 500.
///
/// Must sit outermost among the per-route layers to cover logging and
/// authentication as well as the handler.
pub struct RecoveryMiddleware;

impl Middleware for RecoveryMiddleware {
    fn handle(&self, req: Request, next: Next<'_>) -> Response {
        let request_id = req.request_id;
        let method = req.method.clone();
        let path = req.path.clone();

        match catch_unwind(AssertUnwindSafe(|| next.run(req))) {
            Ok(res) => res,
            Err(payload) => {
                error!(
                    request_id = %request_id,
                    method = %method,
                    path = %path,
                    panic_message = %panic_message(payload.as_ref()),
                    "Handler panicked"
                );
                Response::error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        }
    }
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "Unknown panic"
    }
}
