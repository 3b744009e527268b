//! PostgreSQL store.
//!
//! The HTTP side is synchronous, so the pool lives on a small private Tokio
//! runtime and each repository call blocks on one query. Inside a transaction
//! every statement is a separate `block_on`; calls never nest.

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use std::time::Duration;
use thiserror::Error;
use tokio::runtime::Runtime;
use tracing::{debug, info, warn};

use super::{AccountTx, RepoError, TodoRepository, TxManager, UserRepository};
use crate::config::DatabaseConfig;
use crate::ids::{TodoId, UserId};
use crate::model::{NewTodo, OAuthProfile, Todo, TodoPatch, User};

const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");

const TODO_COLUMNS: &str =
    "id, title, description, completed, user_id, created_at, updated_at, deleted_at";
const USER_COLUMNS: &str =
    "id, email, name, avatar_url, provider, provider_id, created_at, updated_at, deleted_at";

#[derive(Debug, Error)]
pub enum PgStoreError {
    #[error("failed to start database runtime: {0}")]
    Runtime(#[from] std::io::Error),
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

#[derive(sqlx::FromRow)]
struct TodoRow {
    id: i64,
    title: String,
    description: Option<String>,
    completed: bool,
    user_id: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl From<TodoRow> for Todo {
    fn from(r: TodoRow) -> Self {
        Todo {
            id: TodoId(r.id),
            title: r.title,
            description: r.description,
            completed: r.completed,
            user_id: UserId(r.user_id),
            created_at: r.created_at,
            updated_at: r.updated_at,
            deleted_at: r.deleted_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    email: String,
    name: String,
    avatar_url: Option<String>,
    provider: String,
    provider_id: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl From<UserRow> for User {
    fn from(r: UserRow) -> Self {
        User {
            id: UserId(r.id),
            email: r.email,
            name: r.name,
            avatar_url: r.avatar_url,
            provider: r.provider,
            provider_id: r.provider_id,
            created_at: r.created_at,
            updated_at: r.updated_at,
            deleted_at: r.deleted_at,
        }
    }
}

fn repo_err(e: sqlx::Error) -> RepoError {
    match &e {
        sqlx::Error::RowNotFound => RepoError::NotFound,
        sqlx::Error::Database(db) if db.is_unique_violation() || db.is_foreign_key_violation() => {
            RepoError::Constraint(db.message().to_string())
        }
        _ => RepoError::Backend(e.to_string()),
    }
}

fn raw_ids(ids: &[TodoId]) -> Vec<i64> {
    ids.iter().map(|id| id.get()).collect()
}

pub struct PgStore {
    pool: PgPool,
    rt: Runtime,
}

/// Connection settings passed field by field, so credentials never go through
/// URL parsing and need no escaping.
pub fn connect_options(db: &DatabaseConfig) -> PgConnectOptions {
    PgConnectOptions::new()
        .host(&db.host)
        .port(db.port)
        .username(&db.user)
        .password(&db.password)
        .database(&db.database)
}

impl PgStore {
    /// Open a pool for `db` and check it with `SELECT 1`.
    ///
    /// # Errors
    ///
    /// [`PgStoreError`] when the runtime cannot start or the database is unreachable.
    pub fn connect(db: &DatabaseConfig) -> Result<Self, PgStoreError> {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("pg-store")
            .enable_all()
            .build()?;

        let pool = rt.block_on(
            PgPoolOptions::new()
                .max_connections(db.max_connections)
                .acquire_timeout(Duration::from_secs(5))
                .connect_with(connect_options(db)),
        )?;
        rt.block_on(sqlx::query("SELECT 1").execute(&pool))?;
        info!(max_connections = db.max_connections, "Database pool ready");

        Ok(Self { pool, rt })
    }

    /// Apply the bundled schema. Every statement is idempotent.
    ///
    /// # Errors
    ///
    /// Propagates the failing statement's error.
    pub fn migrate(&self) -> Result<(), PgStoreError> {
        self.rt.block_on(sqlx::raw_sql(SCHEMA).execute(&self.pool))?;
        debug!("Database schema ensured");
        Ok(())
    }

    pub fn close(&self) {
        self.rt.block_on(self.pool.close());
        info!("Database pool closed");
    }

    fn fetch_todo(&self, sql: &str, id: TodoId, user_id: UserId) -> Result<Todo, RepoError> {
        self.rt
            .block_on(
                sqlx::query_as::<_, TodoRow>(sql)
                    .bind(id.get())
                    .bind(user_id.get())
                    .fetch_optional(&self.pool),
            )
            .map_err(repo_err)?
            .map(Todo::from)
            .ok_or(RepoError::NotFound)
    }

    fn fetch_user(&self, sql: &str, bind: &[&str]) -> Result<User, RepoError> {
        let mut query = sqlx::query_as::<_, UserRow>(sql);
        for value in bind {
            query = query.bind(*value);
        }
        self.rt
            .block_on(query.fetch_optional(&self.pool))
            .map_err(repo_err)?
            .map(User::from)
            .ok_or(RepoError::NotFound)
    }
}

impl TodoRepository for PgStore {
    fn list(&self, user_id: UserId) -> Result<Vec<Todo>, RepoError> {
        let sql = format!(
            "SELECT {TODO_COLUMNS} FROM todos \
             WHERE user_id = $1 AND deleted_at IS NULL \
             ORDER BY created_at DESC, id DESC"
        );
        let rows = self
            .rt
            .block_on(
                sqlx::query_as::<_, TodoRow>(&sql)
                    .bind(user_id.get())
                    .fetch_all(&self.pool),
            )
            .map_err(repo_err)?;
        Ok(rows.into_iter().map(Todo::from).collect())
    }

    fn get(&self, id: TodoId, user_id: UserId) -> Result<Todo, RepoError> {
        let sql = format!(
            "SELECT {TODO_COLUMNS} FROM todos \
             WHERE id = $1 AND user_id = $2 AND deleted_at IS NULL"
        );
        self.fetch_todo(&sql, id, user_id)
    }

    fn create(&self, new: NewTodo) -> Result<Todo, RepoError> {
        // The owner must be a live user; a soft-deleted row still satisfies the FK.
        let sql = format!(
            "INSERT INTO todos (title, description, user_id) \
             SELECT $1, $2, $3 WHERE EXISTS \
               (SELECT 1 FROM users WHERE id = $3 AND deleted_at IS NULL) \
             RETURNING {TODO_COLUMNS}"
        );
        let row = self
            .rt
            .block_on(
                sqlx::query_as::<_, TodoRow>(&sql)
                    .bind(&new.title)
                    .bind(new.description.as_deref())
                    .bind(new.user_id.get())
                    .fetch_optional(&self.pool),
            )
            .map_err(repo_err)?;
        row.map(Todo::from).ok_or_else(|| {
            RepoError::Constraint(format!(
                "todos.user_id references missing user {}",
                new.user_id
            ))
        })
    }

    fn update(&self, id: TodoId, user_id: UserId, patch: &TodoPatch) -> Result<Todo, RepoError> {
        let sql = format!(
            "UPDATE todos SET \
               title = COALESCE($1, title), \
               description = COALESCE($2, description), \
               completed = COALESCE($3, completed), \
               updated_at = now() \
             WHERE id = $4 AND user_id = $5 AND deleted_at IS NULL \
             RETURNING {TODO_COLUMNS}"
        );
        self.rt
            .block_on(
                sqlx::query_as::<_, TodoRow>(&sql)
                    .bind(patch.title.as_deref())
                    .bind(patch.description.as_deref())
                    .bind(patch.completed)
                    .bind(id.get())
                    .bind(user_id.get())
                    .fetch_optional(&self.pool),
            )
            .map_err(repo_err)?
            .map(Todo::from)
            .ok_or(RepoError::NotFound)
    }

    fn delete(&self, id: TodoId, user_id: UserId) -> Result<(), RepoError> {
        let done = self
            .rt
            .block_on(
                sqlx::query(
                    "UPDATE todos SET deleted_at = now(), updated_at = now() \
                     WHERE id = $1 AND user_id = $2 AND deleted_at IS NULL",
                )
                .bind(id.get())
                .bind(user_id.get())
                .execute(&self.pool),
            )
            .map_err(repo_err)?;
        if done.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    fn complete_many(&self, ids: &[TodoId], user_id: UserId) -> Result<Vec<Todo>, RepoError> {
        let sql = format!(
            "UPDATE todos SET completed = TRUE, updated_at = now() \
             WHERE id = ANY($1) AND user_id = $2 AND deleted_at IS NULL \
             RETURNING {TODO_COLUMNS}"
        );
        let rows = self
            .rt
            .block_on(
                sqlx::query_as::<_, TodoRow>(&sql)
                    .bind(raw_ids(ids))
                    .bind(user_id.get())
                    .fetch_all(&self.pool),
            )
            .map_err(repo_err)?;
        Ok(rows.into_iter().map(Todo::from).collect())
    }

    fn delete_many(&self, ids: &[TodoId], user_id: UserId) -> Result<Vec<TodoId>, RepoError> {
        let deleted: Vec<i64> = self
            .rt
            .block_on(
                sqlx::query_scalar(
                    "UPDATE todos SET deleted_at = now(), updated_at = now() \
                     WHERE id = ANY($1) AND user_id = $2 AND deleted_at IS NULL \
                     RETURNING id",
                )
                .bind(raw_ids(ids))
                .bind(user_id.get())
                .fetch_all(&self.pool),
            )
            .map_err(repo_err)?;
        Ok(deleted.into_iter().map(TodoId).collect())
    }
}

impl UserRepository for PgStore {
    fn get(&self, id: UserId) -> Result<User, RepoError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1 AND deleted_at IS NULL");
        self.rt
            .block_on(
                sqlx::query_as::<_, UserRow>(&sql)
                    .bind(id.get())
                    .fetch_optional(&self.pool),
            )
            .map_err(repo_err)?
            .map(User::from)
            .ok_or(RepoError::NotFound)
    }

    fn find_by_provider(&self, provider: &str, provider_id: &str) -> Result<User, RepoError> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users \
             WHERE provider = $1 AND provider_id = $2 AND deleted_at IS NULL"
        );
        self.fetch_user(&sql, &[provider, provider_id])
    }

    fn create(&self, profile: &OAuthProfile) -> Result<User, RepoError> {
        let sql = format!(
            "INSERT INTO users (email, name, avatar_url, provider, provider_id) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {USER_COLUMNS}"
        );
        let row = self
            .rt
            .block_on(
                sqlx::query_as::<_, UserRow>(&sql)
                    .bind(&profile.email)
                    .bind(&profile.name)
                    .bind(profile.avatar_url.as_deref())
                    .bind(&profile.provider)
                    .bind(&profile.provider_id)
                    .fetch_one(&self.pool),
            )
            .map_err(repo_err)?;
        Ok(row.into())
    }

    fn update_profile(&self, id: UserId, profile: &OAuthProfile) -> Result<User, RepoError> {
        let sql = format!(
            "UPDATE users SET email = $1, name = $2, avatar_url = $3, updated_at = now() \
             WHERE id = $4 AND deleted_at IS NULL RETURNING {USER_COLUMNS}"
        );
        self.rt
            .block_on(
                sqlx::query_as::<_, UserRow>(&sql)
                    .bind(&profile.email)
                    .bind(&profile.name)
                    .bind(profile.avatar_url.as_deref())
                    .bind(id.get())
                    .fetch_optional(&self.pool),
            )
            .map_err(repo_err)?
            .map(User::from)
            .ok_or(RepoError::NotFound)
    }
}

struct PgTx<'a> {
    rt: &'a Runtime,
    tx: Transaction<'static, Postgres>,
}

impl AccountTx for PgTx<'_> {
    fn delete_todos_of(&mut self, user_id: UserId) -> Result<u64, RepoError> {
        let PgTx { rt, tx } = self;
        let done = rt
            .block_on(
                sqlx::query(
                    "UPDATE todos SET deleted_at = now(), updated_at = now() \
                     WHERE user_id = $1 AND deleted_at IS NULL",
                )
                .bind(user_id.get())
                .execute(&mut **tx),
            )
            .map_err(repo_err)?;
        Ok(done.rows_affected())
    }

    fn delete_user(&mut self, user_id: UserId) -> Result<(), RepoError> {
        let PgTx { rt, tx } = self;
        let done = rt
            .block_on(
                sqlx::query(
                    "UPDATE users SET deleted_at = now(), updated_at = now() \
                     WHERE id = $1 AND deleted_at IS NULL",
                )
                .bind(user_id.get())
                .execute(&mut **tx),
            )
            .map_err(repo_err)?;
        if done.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }
}

impl TxManager for PgStore {
    fn run_in_tx(
        &self,
        f: &mut dyn FnMut(&mut dyn AccountTx) -> Result<(), RepoError>,
    ) -> Result<(), RepoError> {
        let tx = self.rt.block_on(self.pool.begin()).map_err(repo_err)?;
        let mut scope = PgTx { rt: &self.rt, tx };
        match f(&mut scope) {
            Ok(()) => {
                self.rt.block_on(scope.tx.commit()).map_err(repo_err)?;
                debug!("Transaction committed");
                Ok(())
            }
            Err(e) => {
                if let Err(rollback) = self.rt.block_on(scope.tx.rollback()) {
                    warn!(error = %rollback, "Rollback failed; connection will be discarded");
                }
                debug!(error = %e, "Transaction rolled back");
                Err(e)
            }
        }
    }
}
