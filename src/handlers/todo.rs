use http::StatusCode;
use serde::Deserialize;
use tracing::debug;

use super::{current_user, ApiError, ApiResult};
use crate::app::AppState;
use crate::ids::TodoId;
use crate::model::TodoPatch;
use crate::server::{Request, Response};

#[derive(Debug, Deserialize)]
struct CreateTodoBody {
    /// Missing and empty are the same to the caller: both are a 400.
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BatchBody {
    #[serde(default)]
    ids: Vec<TodoId>,
}

fn body<T: serde::de::DeserializeOwned>(req: &Request) -> Result<T, ApiError> {
    req.json().map_err(|e| {
        debug!(request_id = %req.request_id, error = %e, "Rejected request body");
        ApiError::BadRequest("Invalid request body".into())
    })
}

fn path_id(req: &Request) -> Result<TodoId, ApiError> {
    req.param("id")
        .and_then(|raw| raw.parse().ok())
        .ok_or_else(|| ApiError::BadRequest("Invalid ID".into()))
}

/// `GET /todos`
pub fn list(state: &AppState, req: &Request) -> ApiResult {
    let user_id = current_user(req)?;
    let todos = state.todos.list(user_id)?;
    Ok(Response::json(StatusCode::OK, &todos))
}

/// `POST /todos`
pub fn create(state: &AppState, req: &Request) -> ApiResult {
    let user_id = current_user(req)?;
    let input: CreateTodoBody = body(req)?;
    let todo = state.todos.create(user_id, input.title, input.description)?;
    Ok(Response::json(StatusCode::CREATED, &todo))
}

/// `GET /todos/{id}`
pub fn get(state: &AppState, req: &Request) -> ApiResult {
    let user_id = current_user(req)?;
    let id = path_id(req)?;
    Ok(Response::json(StatusCode::OK, &state.todos.get(id, user_id)?))
}

/// `PUT /todos/{id}`
pub fn update(state: &AppState, req: &Request) -> ApiResult {
    let user_id = current_user(req)?;
    let id = path_id(req)?;
    let patch: TodoPatch = body(req)?;
    let todo = state.todos.update(id, user_id, &patch)?;
    Ok(Response::json(StatusCode::OK, &todo))
}

/// `DELETE /todos/{id}`
pub fn delete(state: &AppState, req: &Request) -> ApiResult {
    let user_id = current_user(req)?;
    let id = path_id(req)?;
    state.todos.delete(id, user_id)?;
    Ok(Response::no_content())
}

/// `POST /todos/batch-complete`
pub fn batch_complete(state: &AppState, req: &Request) -> ApiResult {
    let user_id = current_user(req)?;
    let input: BatchBody = body(req)?;
    let result = state.todos.batch_complete(user_id, &input.ids)?;
    Ok(Response::json(StatusCode::OK, &result))
}

/// `POST /todos/batch-delete`
pub fn batch_delete(state: &AppState, req: &Request) -> ApiResult {
    let user_id = current_user(req)?;
    let input: BatchBody = body(req)?;
    let result = state.todos.batch_delete(user_id, &input.ids)?;
    Ok(Response::json(StatusCode::OK, &result))
}
