//! # Handlers Module
//!
//! HTTP endpoints. Each handler borrows the shared [`AppState`](crate::app::AppState)
//! and the [`Request`] and returns an [`ApiResult`]. [`respond`] turns the
//! error side into a `{"error": ...}` response and logs internal failures with
//! the request id.
//!
//! - [`general`]: `/` and `/health`
//! - [`todo`]: todo CRUD and batch operations
//! - [`auth`]: OAuth login, logout and the `/me` account endpoints

pub mod auth;
pub mod general;
pub mod todo;

use http::StatusCode;
use thiserror::Error;
use tracing::error;

use crate::ids::UserId;
use crate::server::{Request, Response};
use crate::service::ServiceError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    NotFound(String),
    /// The detail is logged, never sent to the client.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn public_message(&self) -> &str {
        match self {
            ApiError::BadRequest(m) | ApiError::Unauthorized(m) | ApiError::NotFound(m) => m,
            ApiError::Internal(_) => "Internal server error",
        }
    }
}

impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self {
        match e {
            ServiceError::Validation(msg) => ApiError::BadRequest(msg),
            ServiceError::TodoNotFound => ApiError::NotFound("Todo not found".into()),
            ServiceError::UserNotFound => ApiError::NotFound("User not found".into()),
            ServiceError::Internal(source) => ApiError::Internal(source.to_string()),
        }
    }
}

pub type ApiResult = Result<Response, ApiError>;

/// Render a handler result, logging internal errors against `req`.
pub fn respond(req: &Request, result: ApiResult) -> Response {
    match result {
        Ok(res) => res,
        Err(e) => {
            if let ApiError::Internal(detail) = &e {
                error!(
                    request_id = %req.request_id,
                    method = %req.method,
                    path = %req.path,
                    error = %detail,
                    "Request failed"
                );
            }
            Response::error(e.status(), e.public_message())
        }
    }
}

/// The id the auth gate attached to this request.
pub(crate) fn current_user(req: &Request) -> Result<UserId, ApiError> {
    req.user_id
        .ok_or_else(|| ApiError::Unauthorized("Unauthorized".into()))
}
