use http::StatusCode;
use serde_json::json;

use super::ApiResult;
use crate::app::AppState;
use crate::server::{Request, Response};

/// `GET /`
pub fn home(_state: &AppState, _req: &Request) -> ApiResult {
    Ok(Response::json(
        StatusCode::OK,
        &json!({ "message": "Todo API", "version": env!("CARGO_PKG_VERSION") }),
    ))
}

/// `GET /health`
pub fn health(_state: &AppState, _req: &Request) -> ApiResult {
    Ok(Response::json(StatusCode::OK, &json!({ "status": "ok" })))
}
