//! HTTP adapter: request/response types and the `tiny_http` worker pool.

pub mod http_server;
pub mod request;
pub mod response;
pub mod service;

pub use http_server::{HttpServer, ServerHandle, ShutdownTrigger};
pub use request::{Request, RequestReadError, MAX_BODY_BYTES};
pub use response::Response;
pub use service::AppService;
