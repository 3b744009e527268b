use std::sync::Arc;

use http::StatusCode;
use tracing::{debug, error, warn};

use super::{Middleware, Next};
use crate::auth::{AuthError, SessionManager};
use crate::server::{Request, Response};
use crate::service::{ServiceError, UserService};

/// Rejects requests without a valid session with 401 `{"error":"Unauthorized"}`.
///
/// A session is valid when its signature checks out, the store still holds it
/// and the user it names has not deleted their account. On success the user id
/// is written to [`Request::user_id`] before the wrapped handler runs. On
/// failure the handler is never called.
pub struct AuthMiddleware {
    sessions: Arc<SessionManager>,
    users: UserService,
}

impl AuthMiddleware {
    pub fn new(sessions: Arc<SessionManager>, users: UserService) -> Self {
        Self { sessions, users }
    }

    /// 401 for a session whose account is gone. The stale record is dropped
    /// and the browser is told to forget the cookie.
    fn revoke(&self, req: &Request) -> Response {
        if let Err(e) = self.sessions.logout(req) {
            warn!(request_id = %req.request_id, error = %e, "Failed to clear stale session");
        }
        Response::error(StatusCode::UNAUTHORIZED, "Unauthorized")
            .with_header("Set-Cookie", &self.sessions.expired_cookie())
    }
}

fn internal_error() -> Response {
    Response::error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
}

impl Middleware for AuthMiddleware {
    fn handle(&self, mut req: Request, next: Next<'_>) -> Response {
        let user_id = match self.sessions.resolve(&req) {
            Ok(user_id) => user_id,
            Err(AuthError::Session(e)) => {
                error!(request_id = %req.request_id, error = %e, "Session lookup failed");
                return internal_error();
            }
            Err(e) => {
                debug!(request_id = %req.request_id, path = %req.path, reason = %e, "Unauthenticated request");
                return Response::error(StatusCode::UNAUTHORIZED, "Unauthorized");
            }
        };

        match self.users.get(user_id) {
            Ok(_) => {
                req.user_id = Some(user_id);
                next.run(req)
            }
            Err(ServiceError::UserNotFound) => {
                debug!(request_id = %req.request_id, user_id = %user_id, "Session for a deleted account");
                self.revoke(&req)
            }
            Err(e) => {
                error!(request_id = %req.request_id, error = %e, "User lookup failed");
                internal_error()
            }
        }
    }
}
