use std::time::Instant;

use tracing::{info, info_span, warn};

use super::{Middleware, Next};
use crate::server::{Request, Response};

/// Records one line per request: method, path, status and wall-clock duration.
///
/// The inner chain runs inside a `request` span so events emitted by handlers
/// carry the request id.
pub struct LoggingMiddleware;

impl Middleware for LoggingMiddleware {
    fn handle(&self, req: Request, next: Next<'_>) -> Response {
        let method = req.method.clone();
        let path = req.path.clone();
        let request_id = req.request_id;
        let span = info_span!("request", request_id = %request_id, method = %method, path = %path);

        let start = Instant::now();
        let res = span.in_scope(|| next.run(req));
        let latency = start.elapsed();

        let status = res.status.as_u16();
        if res.status.is_server_error() {
            warn!(
                request_id = %request_id,
                method = %method,
                path = %path,
                status,
                duration_ms = latency.as_secs_f64() * 1000.0,
                "Request failed"
            );
        } else {
            info!(
                request_id = %request_id,
                method = %method,
                path = %path,
                status,
                duration_ms = latency.as_secs_f64() * 1000.0,
                "Request completed"
            );
        }
        res
    }
}
