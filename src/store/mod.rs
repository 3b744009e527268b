//! # Store Module
//!
//! Persistence contracts and their implementations.
//!
//! The service layer only sees the traits below. Every query is scoped by the
//! owning user, so a todo that belongs to somebody else is indistinguishable
//! from one that does not exist. Deletes are soft: rows get a `deleted_at`
//! timestamp and disappear from every read.
//!
//! - [`MemoryStore`]: `parking_lot::RwLock` over plain maps; the reference
//!   implementation used by tests and by the server when no database is configured.
//! - `PgStore` (feature `postgres`): `sqlx` against PostgreSQL.

mod memory;
#[cfg(feature = "postgres")]
mod postgres;

pub use memory::MemoryStore;
#[cfg(feature = "postgres")]
pub use postgres::{PgStore, PgStoreError};

use crate::ids::{TodoId, UserId};
use crate::model::{NewTodo, OAuthProfile, Todo, TodoPatch, User};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("record not found")]
    NotFound,
    /// Unique or foreign-key constraint violated.
    #[error("constraint violated: {0}")]
    Constraint(String),
    #[error("storage backend error: {0}")]
    Backend(String),
}

pub trait TodoRepository: Send + Sync {
    /// All live todos of `user_id`, newest first.
    fn list(&self, user_id: UserId) -> Result<Vec<Todo>, RepoError>;

    fn get(&self, id: TodoId, user_id: UserId) -> Result<Todo, RepoError>;

    fn create(&self, new: NewTodo) -> Result<Todo, RepoError>;

    fn update(&self, id: TodoId, user_id: UserId, patch: &TodoPatch) -> Result<Todo, RepoError>;

    fn delete(&self, id: TodoId, user_id: UserId) -> Result<(), RepoError>;

    /// Mark the live, owned todos among `ids` completed and return them.
    /// Ids that match nothing are skipped, not reported as errors.
    fn complete_many(&self, ids: &[TodoId], user_id: UserId) -> Result<Vec<Todo>, RepoError>;

    /// Delete the live, owned todos among `ids` and return the ids affected.
    fn delete_many(&self, ids: &[TodoId], user_id: UserId) -> Result<Vec<TodoId>, RepoError>;
}

pub trait UserRepository: Send + Sync {
    fn get(&self, id: UserId) -> Result<User, RepoError>;

    fn find_by_provider(&self, provider: &str, provider_id: &str) -> Result<User, RepoError>;

    fn create(&self, profile: &OAuthProfile) -> Result<User, RepoError>;

    /// Refresh email, name and avatar from a newer provider profile.
    fn update_profile(&self, id: UserId, profile: &OAuthProfile) -> Result<User, RepoError>;
}

/// Statements available inside an account transaction.
pub trait AccountTx {
    /// Delete every live todo of `user_id`; returns the count.
    fn delete_todos_of(&mut self, user_id: UserId) -> Result<u64, RepoError>;

    fn delete_user(&mut self, user_id: UserId) -> Result<(), RepoError>;
}

/// Runs a callback atomically: every statement commits, or none does.
pub trait TxManager: Send + Sync {
    /// Begin, run `f`, commit on `Ok`, roll back and return the error on `Err`.
    fn run_in_tx(
        &self,
        f: &mut dyn FnMut(&mut dyn AccountTx) -> Result<(), RepoError>,
    ) -> Result<(), RepoError>;
}
