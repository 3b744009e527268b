use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info};

use super::ServiceError;
use crate::ids::{TodoId, UserId};
use crate::model::{
    BatchCompleteResult, BatchDeleteResult, BatchFailure, NewTodo, Todo, TodoPatch,
};
use crate::store::TodoRepository;

/// Upper bound on ids per batch request, counted before de-duplication.
pub const MAX_BATCH_IDS: usize = 100;

const NOT_FOUND: &str = "Todo not found";

#[derive(Clone)]
pub struct TodoService {
    repo: Arc<dyn TodoRepository>,
}

impl TodoService {
    pub fn new(repo: Arc<dyn TodoRepository>) -> Self {
        Self { repo }
    }

    pub fn list(&self, user_id: UserId) -> Result<Vec<Todo>, ServiceError> {
        self.repo.list(user_id).map_err(ServiceError::from_todo_repo)
    }

    pub fn get(&self, id: TodoId, user_id: UserId) -> Result<Todo, ServiceError> {
        self.repo.get(id, user_id).map_err(ServiceError::from_todo_repo)
    }

    /// Create a todo. The title must contain something other than whitespace.
    pub fn create(
        &self,
        user_id: UserId,
        title: String,
        description: Option<String>,
    ) -> Result<Todo, ServiceError> {
        require_title(&title)?;
        let todo = self
            .repo
            .create(NewTodo {
                user_id,
                title,
                description,
            })
            .map_err(ServiceError::from_todo_repo)?;
        debug!(todo_id = %todo.id, user_id = %user_id, "Todo created");
        Ok(todo)
    }

    /// Apply a partial update. Absent fields keep their stored value; an empty
    /// patch still bumps `updated_at`.
    pub fn update(
        &self,
        id: TodoId,
        user_id: UserId,
        patch: &TodoPatch,
    ) -> Result<Todo, ServiceError> {
        if let Some(title) = &patch.title {
            require_title(title)?;
        }
        self.repo
            .update(id, user_id, patch)
            .map_err(ServiceError::from_todo_repo)
    }

    pub fn delete(&self, id: TodoId, user_id: UserId) -> Result<(), ServiceError> {
        self.repo
            .delete(id, user_id)
            .map_err(ServiceError::from_todo_repo)?;
        debug!(todo_id = %id, user_id = %user_id, "Todo deleted");
        Ok(())
    }

    /// Complete every listed todo the caller owns. Ids that are missing,
    /// deleted, or owned by someone else land in `failed`; the call as a whole
    /// only fails on validation or a storage error.
    pub fn batch_complete(
        &self,
        user_id: UserId,
        ids: &[TodoId],
    ) -> Result<BatchCompleteResult, ServiceError> {
        let ids = normalize_ids(ids)?;
        let mut succeeded = self
            .repo
            .complete_many(&ids, user_id)
            .map_err(ServiceError::from_todo_repo)?;

        let done: HashSet<TodoId> = succeeded.iter().map(|t| t.id).collect();
        let failed = failures(&ids, &done);
        sort_by_request(&mut succeeded, &ids, |t| t.id);

        info!(
            user_id = %user_id,
            requested = ids.len(),
            succeeded = succeeded.len(),
            failed = failed.len(),
            "Batch complete"
        );
        Ok(BatchCompleteResult { succeeded, failed })
    }

    /// Delete every listed todo the caller owns; see [`Self::batch_complete`].
    pub fn batch_delete(
        &self,
        user_id: UserId,
        ids: &[TodoId],
    ) -> Result<BatchDeleteResult, ServiceError> {
        let ids = normalize_ids(ids)?;
        let mut succeeded = self
            .repo
            .delete_many(&ids, user_id)
            .map_err(ServiceError::from_todo_repo)?;

        let done: HashSet<TodoId> = succeeded.iter().copied().collect();
        let failed = failures(&ids, &done);
        sort_by_request(&mut succeeded, &ids, |id| *id);

        info!(
            user_id = %user_id,
            requested = ids.len(),
            succeeded = succeeded.len(),
            failed = failed.len(),
            "Batch delete"
        );
        Ok(BatchDeleteResult { succeeded, failed })
    }
}

fn require_title(title: &str) -> Result<(), ServiceError> {
    if title.trim().is_empty() {
        return Err(ServiceError::Validation("Title is required".into()));
    }
    Ok(())
}

/// Validate the batch size and collapse duplicates, keeping first occurrences.
fn normalize_ids(ids: &[TodoId]) -> Result<Vec<TodoId>, ServiceError> {
    if ids.is_empty() {
        return Err(ServiceError::Validation("IDs are required".into()));
    }
    if ids.len() > MAX_BATCH_IDS {
        return Err(ServiceError::Validation(format!(
            "Too many IDs (max {MAX_BATCH_IDS})"
        )));
    }
    let mut seen = HashSet::with_capacity(ids.len());
    Ok(ids.iter().copied().filter(|id| seen.insert(*id)).collect())
}

fn failures(requested: &[TodoId], done: &HashSet<TodoId>) -> Vec<BatchFailure> {
    requested
        .iter()
        .filter(|id| !done.contains(id))
        .map(|id| BatchFailure {
            id: *id,
            error: NOT_FOUND.to_string(),
        })
        .collect()
}

fn sort_by_request<T>(items: &mut [T], requested: &[TodoId], key: impl Fn(&T) -> TodoId) {
    items.sort_by_key(|item| {
        let id = key(item);
        requested.iter().position(|r| *r == id).unwrap_or(usize::MAX)
    });
}
