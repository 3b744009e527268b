//! # Middleware Module
//!
//! Request middleware composes by wrapping: each [`Middleware`] receives the
//! request and a [`Next`] standing for everything inside it. For `[m1, m2]`
//! registered in that order, execution is m1-pre, m2-pre, handler, m2-post,
//! m1-post.
//!
//! ## Provided middleware
//!
//! - [`CorsMiddleware`]: global; answers pre-flight requests and decorates responses
//! - [`RecoveryMiddleware`]: converts panics in inner layers into 500
//! - [`LoggingMiddleware`]: one structured line per request with its duration
//! - [`AuthMiddleware`]: session gate for protected routes
//!
//! ## Writing middleware
//!
//! ```rust
//! use todo_api::middleware::{Middleware, Next};
//! use todo_api::server::{Request, Response};
//!
//! struct PoweredBy;
//!
//! impl Middleware for PoweredBy {
//!     fn handle(&self, req: Request, next: Next<'_>) -> Response {
//!         let mut res = next.run(req);
//!         res.set_header("X-Powered-By", "todo-api");
//!         res
//!     }
//! }
//! ```

mod auth;
mod core;
mod cors;
mod logging;
mod recovery;

pub use auth::AuthMiddleware;
pub use core::{BoxHandler, Handler, Middleware, Next};
pub use cors::{CorsConfigError, CorsMiddleware, CorsMiddlewareBuilder};
pub use logging::LoggingMiddleware;
pub use recovery::{panic_message, RecoveryMiddleware};
