//! # Todo API
//!
//! A multi-user todo list service: JSON over HTTP, OAuth login, cookie
//! sessions and per-user data isolation.
//!
//! ## Architecture
//!
//! Requests flow top to bottom; each layer only knows the one below it.
//!
//! - **[`server`]** - `tiny_http` worker pool, [`server::Request`] and [`server::Response`]
//! - **[`router`]** - regex path templates, first-match dispatch, typed path parameters
//! - **[`middleware`]** - wrapping middleware: CORS, panic recovery, request logging, auth gate
//! - **[`handlers`]** - HTTP endpoints and the error-to-status mapping
//! - **[`service`]** - validation and business rules
//! - **[`store`]** - repository traits with in-memory and PostgreSQL implementations
//! - **[`auth`]** - signed session cookies, session stores and OAuth providers
//! - **[`app`]** - shared state and the route table
//! - **[`config`]**, **[`logging`]**, **[`cli`]** - process setup
//!
//! ### Request Flow
//!
//! ```mermaid
//! sequenceDiagram
//!     participant Client
//!     participant Server as server::AppService
//!     participant Router as router::Router
//!     participant MW as middleware
//!     participant Handler as handlers
//!     participant Service as service
//!     participant Store as store
//!
//!     Client->>Server: HTTP request
//!     Server->>Router: dispatch(Request)
//!     Router->>MW: CORS (global)
//!     MW->>Router: lookup
//!     Router->>MW: Recovery, Logging, Auth
//!     MW->>Handler: Request + params + user id
//!     Handler->>Service: typed call
//!     Service->>Store: repository call
//!     Store-->>Service: rows or RepoError
//!     Service-->>Handler: value or ServiceError
//!     Handler-->>Client: JSON response
//! ```
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use http::{Method, StatusCode};
//! use todo_api::app::{build_router, frontend_cors, AppState, Backends};
//! use todo_api::auth::ProviderRegistry;
//! use todo_api::config::AppConfig;
//! use todo_api::server::Request;
//!
//! let config = AppConfig::from_lookup(|_| None).unwrap();
//! let state = AppState::new(&Backends::in_memory(), ProviderRegistry::new(), &config).unwrap();
//! let router = build_router(Arc::new(state), frontend_cors(&config.frontend_url).unwrap()).unwrap();
//!
//! let res = router.dispatch(Request::new(Method::GET, "/health"));
//! assert_eq!(res.status, StatusCode::OK);
//!
//! let res = router.dispatch(Request::new(Method::GET, "/todos"));
//! assert_eq!(res.status, StatusCode::UNAUTHORIZED);
//! ```

pub mod app;
pub mod auth;
pub mod cli;
pub mod config;
pub mod handlers;
pub mod ids;
pub mod logging;
pub mod middleware;
pub mod model;
pub mod router;
pub mod server;
pub mod service;
pub mod store;
