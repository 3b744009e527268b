//! Business rules between the HTTP handlers and the store.
//!
//! Store errors never leave this layer as-is: not-found becomes the
//! service's own [`ServiceError::TodoNotFound`] or [`ServiceError::UserNotFound`],
//! anything else is wrapped as [`ServiceError::Internal`].

mod todo;
mod user;

pub use todo::{TodoService, MAX_BATCH_IDS};
pub use user::UserService;

use crate::store::RepoError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    /// The caller sent something unusable; the message is safe to show.
    #[error("{0}")]
    Validation(String),
    #[error("todo not found")]
    TodoNotFound,
    #[error("user not found")]
    UserNotFound,
    #[error("internal error: {0}")]
    Internal(#[source] RepoError),
}

impl ServiceError {
    pub(crate) fn from_todo_repo(e: RepoError) -> Self {
        match e {
            RepoError::NotFound => ServiceError::TodoNotFound,
            other => ServiceError::Internal(other),
        }
    }

    pub(crate) fn from_user_repo(e: RepoError) -> Self {
        match e {
            RepoError::NotFound => ServiceError::UserNotFound,
            other => ServiceError::Internal(other),
        }
    }
}
