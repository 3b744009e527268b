//! # Router Module
//!
//! Hand-rolled HTTP routing: route templates compiled to anchored regular
//! expressions, an append-only route table scanned in registration order, and
//! middleware composition around each matched handler.
//!
//! ## Templates
//!
//! `{name}` placeholders capture one path segment (`[^/]+`). Everything else is
//! matched literally. Captured values are bound to
//! [`Request::params`](crate::server::Request) in declared order; when a name
//! repeats, the later capture shadows the earlier one on lookup.
//!
//! ```rust
//! use todo_api::router::PathMatcher;
//!
//! let m = PathMatcher::compile("/users/{user_id}/todos/{id}").unwrap();
//! let params = m.captures("/users/7/todos/42").unwrap();
//! assert_eq!(params.get("user_id"), Some("7"));
//! assert_eq!(params.get("id"), Some("42"));
//! assert!(m.captures("/users/7/todos").is_none());
//! ```
//!
//! ## Dispatch
//!
//! ```rust
//! use http::{Method, StatusCode};
//! use todo_api::router::Router;
//! use todo_api::server::{Request, Response};
//!
//! let mut router = Router::new();
//! router
//!     .get("/todos/{id}", |req: Request| {
//!         let id = req.param("id").unwrap_or_default().to_string();
//!         Response::json(StatusCode::OK, &serde_json::json!({ "id": id }))
//!     })
//!     .unwrap();
//!
//! let res = router.dispatch(Request::new(Method::GET, "/todos/5"));
//! assert_eq!(res.status, StatusCode::OK);
//!
//! let res = router.dispatch(Request::new(Method::GET, "/nope"));
//! assert_eq!(res.status, StatusCode::NOT_FOUND);
//! ```

mod core;
mod matcher;

pub use core::{default_not_found, ParamVec, PathParams, Route, RouteHandle, Router, MAX_INLINE_PARAMS};
pub use matcher::{PathMatcher, RouteError};
