use http::StatusCode;
use serde_json::json;
use tracing::{info, warn};

use super::{current_user, ApiError, ApiResult};
use crate::app::AppState;
use crate::auth::AuthError;
use crate::model::UserProfile;
use crate::server::{Request, Response};

fn provider_param(req: &Request) -> &str {
    req.param("provider").unwrap_or_default()
}

/// `GET /auth/{provider}`: redirect to the provider's consent page.
pub fn begin(state: &AppState, req: &Request) -> ApiResult {
    let provider = provider_param(req);
    let redirect = state.oauth.begin(provider).map_err(|e| match e {
        AuthError::UnknownProvider(_) => ApiError::NotFound("Provider not found".into()),
        other => ApiError::Internal(other.to_string()),
    })?;

    Ok(Response::redirect(&redirect.location).with_header("Set-Cookie", &redirect.state_cookie))
}

/// `GET /auth/{provider}/callback`: finish the login and send the browser
/// back to the frontend with a session cookie.
pub fn callback(state: &AppState, req: &Request) -> ApiResult {
    let provider = provider_param(req);
    let profile = state.oauth.complete(provider, req).map_err(|e| match e {
        AuthError::UnknownProvider(_) => ApiError::NotFound("Provider not found".into()),
        AuthError::Session(inner) => ApiError::Internal(inner.to_string()),
        other => {
            warn!(request_id = %req.request_id, provider = %provider, reason = %other, "OAuth callback rejected");
            ApiError::Unauthorized("Authentication failed".into())
        }
    })?;

    let user = state.users.find_or_create_from_oauth(&profile)?;
    let session_cookie = state
        .sessions
        .login(user.id)
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    info!(request_id = %req.request_id, user_id = %user.id, provider = %provider, "User logged in");

    let mut res = Response::redirect(&state.frontend_url);
    res.append_header("Set-Cookie", &session_cookie);
    res.append_header("Set-Cookie", &state.oauth.expired_state_cookie());
    Ok(res)
}

/// `POST /logout`. Succeeds with or without a live session.
pub fn logout(state: &AppState, req: &Request) -> ApiResult {
    let cookie = state
        .sessions
        .logout(req)
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Response::json(StatusCode::OK, &json!({ "message": "Logged out" }))
        .with_header("Set-Cookie", &cookie))
}

/// `GET /me`
pub fn me(state: &AppState, req: &Request) -> ApiResult {
    let user_id = current_user(req)?;
    let user = state.users.get(user_id)?;
    Ok(Response::json(StatusCode::OK, &UserProfile::from(user)))
}

/// `DELETE /me`: remove the account and its todos, then end the session.
pub fn delete_me(state: &AppState, req: &Request) -> ApiResult {
    let user_id = current_user(req)?;
    state.users.delete_account(user_id)?;

    // The account is gone either way; a stale record just expires on its own.
    let cookie = state.sessions.logout(req).unwrap_or_else(|e| {
        warn!(request_id = %req.request_id, error = %e, "Failed to clear session after account deletion");
        state.sessions.expired_cookie()
    });
    Ok(Response::no_content().with_header("Set-Cookie", &cookie))
}
