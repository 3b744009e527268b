//! Application wiring: shared state and the route table.
//!
//! Registration order is match priority, so the literal batch routes are
//! registered before `/todos/{id}`. The middleware stack, outermost first:
//!
//! 1. [`CorsMiddleware`] (global, answers pre-flight before lookup)
//! 2. [`RecoveryMiddleware`]
//! 3. [`LoggingMiddleware`]
//! 4. [`AuthMiddleware`] on protected routes only

use std::sync::Arc;

use url::Url;

use crate::auth::{
    CookiePolicy, MemorySessionStore, OAuthFlow, ProviderRegistry, SessionError, SessionManager,
    SessionStore,
};
use crate::config::AppConfig;
use crate::handlers::{auth, general, respond, todo, ApiResult};
use crate::middleware::{
    AuthMiddleware, CorsConfigError, CorsMiddleware, Handler, LoggingMiddleware, Middleware,
    RecoveryMiddleware,
};
use crate::router::{RouteError, Router};
use crate::server::Request;
use crate::service::{TodoService, UserService};
use crate::store::{MemoryStore, TodoRepository, TxManager, UserRepository};

/// The storage seams the application runs against.
#[derive(Clone)]
pub struct Backends {
    pub todos: Arc<dyn TodoRepository>,
    pub users: Arc<dyn UserRepository>,
    pub tx: Arc<dyn TxManager>,
    pub sessions: Arc<dyn SessionStore>,
}

impl Backends {
    /// Process-local store and sessions; nothing survives a restart.
    #[must_use]
    pub fn in_memory() -> Self {
        let store = Arc::new(MemoryStore::new());
        Self {
            todos: store.clone(),
            users: store.clone(),
            tx: store,
            sessions: Arc::new(MemorySessionStore::new()),
        }
    }
}

/// Everything a handler may touch. Cheap to share behind an `Arc`.
pub struct AppState {
    pub todos: TodoService,
    pub users: UserService,
    pub sessions: Arc<SessionManager>,
    pub oauth: OAuthFlow,
    /// Post-login redirect target.
    pub frontend_url: String,
}

impl AppState {
    /// # Errors
    ///
    /// [`SessionError::Key`] when the session secret is unusable.
    pub fn new(
        backends: &Backends,
        providers: ProviderRegistry,
        config: &AppConfig,
    ) -> Result<Self, SessionError> {
        let cookies = CookiePolicy {
            secure: config.cookie_secure,
        };
        let sessions = SessionManager::new(
            Arc::clone(&backends.sessions),
            config.session_secret.as_bytes(),
            cookies.clone(),
        )?;
        Ok(Self {
            todos: TodoService::new(Arc::clone(&backends.todos)),
            users: UserService::new(Arc::clone(&backends.users), Arc::clone(&backends.tx)),
            sessions: Arc::new(sessions),
            oauth: OAuthFlow::new(providers, Arc::clone(&backends.sessions), cookies),
            frontend_url: config.frontend_url.clone(),
        })
    }
}

type Endpoint = fn(&AppState, &Request) -> ApiResult;

fn endpoint(state: &Arc<AppState>, f: Endpoint) -> impl Handler + 'static {
    let state = Arc::clone(state);
    move |req: Request| {
        let result = f(&state, &req);
        respond(&req, result)
    }
}

/// CORS policy allowing the frontend's origin with credentials.
///
/// # Errors
///
/// [`CorsConfigError::InvalidOrigin`] when `frontend_url` has no usable origin.
pub fn frontend_cors(frontend_url: &str) -> Result<CorsMiddleware, CorsConfigError> {
    let origin = Url::parse(frontend_url)
        .map(|u| u.origin().ascii_serialization())
        .map_err(|_| CorsConfigError::InvalidOrigin {
            origin: frontend_url.to_string(),
        })?;
    CorsMiddleware::for_frontend(&origin)
}

/// Build the complete router.
///
/// # Errors
///
/// [`RouteError`] if a route template is malformed.
pub fn build_router(state: Arc<AppState>, cors: CorsMiddleware) -> Result<Router, RouteError> {
    let auth: Arc<dyn Middleware> = Arc::new(AuthMiddleware::new(
        Arc::clone(&state.sessions),
        state.users.clone(),
    ));
    let mut router = Router::new();

    router
        .global(Arc::new(cors))
        .layer(Arc::new(RecoveryMiddleware))
        .layer(Arc::new(LoggingMiddleware));

    router.get("/", endpoint(&state, general::home))?;
    router.get("/health", endpoint(&state, general::health))?;

    router.get("/auth/{provider}", endpoint(&state, auth::begin))?;
    router.get("/auth/{provider}/callback", endpoint(&state, auth::callback))?;
    router.post("/logout", endpoint(&state, auth::logout))?;
    router.get("/me", endpoint(&state, auth::me))?.with(Arc::clone(&auth));
    router.delete("/me", endpoint(&state, auth::delete_me))?.with(Arc::clone(&auth));

    router.get("/todos", endpoint(&state, todo::list))?.with(Arc::clone(&auth));
    router.post("/todos", endpoint(&state, todo::create))?.with(Arc::clone(&auth));
    router
        .post("/todos/batch-complete", endpoint(&state, todo::batch_complete))?
        .with(Arc::clone(&auth));
    router
        .post("/todos/batch-delete", endpoint(&state, todo::batch_delete))?
        .with(Arc::clone(&auth));
    router.get("/todos/{id}", endpoint(&state, todo::get))?.with(Arc::clone(&auth));
    router.put("/todos/{id}", endpoint(&state, todo::update))?.with(Arc::clone(&auth));
    router.delete("/todos/{id}", endpoint(&state, todo::delete))?.with(auth);

    Ok(router)
}
