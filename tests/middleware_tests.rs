use std::sync::{Arc, Mutex};

use http::{Method, StatusCode};
use serde_json::json;
use todo_api::auth::{CookiePolicy, MemorySessionStore, SessionManager, SessionStore, SESSION_COOKIE};
use todo_api::ids::UserId;
use todo_api::middleware::{
    AuthMiddleware, CorsMiddleware, CorsMiddlewareBuilder, LoggingMiddleware, Middleware, Next,
    RecoveryMiddleware,
};
use todo_api::model::OAuthProfile;
use todo_api::router::Router;
use todo_api::server::{Request, Response};
use todo_api::service::UserService;
use todo_api::store::MemoryStore;

use tracing_util::TestTracing;

type Journal = Arc<Mutex<Vec<String>>>;

/// Records entry and exit around the inner chain.
struct Recorder {
    name: &'static str,
    journal: Journal,
}

impl Middleware for Recorder {
    fn handle(&self, req: Request, next: Next<'_>) -> Response {
        self.journal.lock().unwrap().push(format!("{}-pre", self.name));
        let res = next.run(req);
        self.journal.lock().unwrap().push(format!("{}-post", self.name));
        res
    }
}

fn recorder(name: &'static str, journal: &Journal) -> Arc<dyn Middleware> {
    Arc::new(Recorder {
        name,
        journal: Arc::clone(journal),
    })
}

fn ok(_req: Request) -> Response {
    Response::json(StatusCode::OK, &json!({ "ok": true }))
}

#[test]
fn test_layers_wrap_in_registration_order() {
    let _tracing = TestTracing::init();
    let journal = Journal::default();
    let mut router = Router::new();
    router
        .layer(recorder("m1", &journal))
        .layer(recorder("m2", &journal));
    let inner = Arc::clone(&journal);
    router
        .get("/", move |_req: Request| {
            inner.lock().unwrap().push("handler".into());
            Response::no_content()
        })
        .unwrap();

    router.dispatch(Request::new(Method::GET, "/"));
    assert_eq!(
        *journal.lock().unwrap(),
        ["m1-pre", "m2-pre", "handler", "m2-post", "m1-post"]
    );
}

#[test]
fn test_global_runs_outside_layers_and_route_middleware() {
    let _tracing = TestTracing::init();
    let journal = Journal::default();
    let mut router = Router::new();
    router
        .global(recorder("global", &journal))
        .layer(recorder("layer", &journal));
    router.get("/", ok).unwrap().with(recorder("route", &journal));

    router.dispatch(Request::new(Method::GET, "/"));
    assert_eq!(
        *journal.lock().unwrap(),
        ["global-pre", "layer-pre", "route-pre", "route-post", "layer-post", "global-post"]
    );
}

#[test]
fn test_global_runs_for_unmatched_requests() {
    let _tracing = TestTracing::init();
    let journal = Journal::default();
    let mut router = Router::new();
    router
        .global(recorder("global", &journal))
        .layer(recorder("layer", &journal));
    router.get("/", ok).unwrap();

    let res = router.dispatch(Request::new(Method::GET, "/missing"));
    assert_eq!(res.status, StatusCode::NOT_FOUND);
    assert_eq!(*journal.lock().unwrap(), ["global-pre", "global-post"]);
}

/// Short-circuits with 418 without calling the inner chain.
struct Teapot;

impl Middleware for Teapot {
    fn handle(&self, _req: Request, _next: Next<'_>) -> Response {
        Response::error(StatusCode::IM_A_TEAPOT, "short and stout")
    }
}

#[test]
fn test_short_circuit_skips_handler() {
    let called = Arc::new(Mutex::new(false));
    let flag = Arc::clone(&called);
    let mut router = Router::new();
    router
        .get("/", move |_req: Request| {
            *flag.lock().unwrap() = true;
            Response::no_content()
        })
        .unwrap()
        .with(Arc::new(Teapot));

    let res = router.dispatch(Request::new(Method::GET, "/"));
    assert_eq!(res.status, StatusCode::IM_A_TEAPOT);
    assert!(!*called.lock().unwrap());
}

struct SessionFixture {
    router: Router,
    sessions: Arc<SessionManager>,
    users: UserService,
    seen: Arc<Mutex<Option<UserId>>>,
}

impl SessionFixture {
    fn new() -> Self {
        let store: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new());
        let sessions = Arc::new(
            SessionManager::new(store, b"middleware-test-secret-0123456789", CookiePolicy { secure: false })
                .unwrap(),
        );
        let db = Arc::new(MemoryStore::new());
        let users = UserService::new(db.clone(), db);
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        let mut router = Router::new();
        router
            .get("/private", move |req: Request| {
                *sink.lock().unwrap() = req.user_id;
                Response::no_content()
            })
            .unwrap()
            .with(Arc::new(AuthMiddleware::new(Arc::clone(&sessions), users.clone())));
        Self {
            router,
            sessions,
            users,
            seen,
        }
    }

    /// Register a user and return its id with a `Cookie` header value.
    fn signed_in(&self, subject: &str) -> (UserId, String) {
        let user = self
            .users
            .find_or_create_from_oauth(&OAuthProfile {
                provider: "fake".into(),
                provider_id: subject.into(),
                email: format!("{subject}@example.com"),
                name: subject.into(),
                avatar_url: None,
            })
            .unwrap();
        let set_cookie = self.sessions.login(user.id).unwrap();
        let pair = set_cookie.split(';').next().unwrap().to_string();
        (user.id, pair)
    }

    fn private(&self, cookie: &str) -> Response {
        self.router
            .dispatch(Request::new(Method::GET, "/private").with_header("Cookie", cookie))
    }
}

#[test]
fn test_auth_gate_rejects_without_calling_handler() {
    let _tracing = TestTracing::init();
    let fixture = SessionFixture::new();

    let res = fixture.router.dispatch(Request::new(Method::GET, "/private"));
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(res.body_json(), json!({ "error": "Unauthorized" }));

    let res = fixture.router.dispatch(
        Request::new(Method::GET, "/private").with_cookie(SESSION_COOKIE, "not.signed"),
    );
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert!(fixture.seen.lock().unwrap().is_none());
}

#[test]
fn test_auth_gate_attaches_user() {
    let fixture = SessionFixture::new();
    let (user_id, cookie) = fixture.signed_in("grace");

    let res = fixture.private(&cookie);
    assert_eq!(res.status, StatusCode::NO_CONTENT);
    assert_eq!(*fixture.seen.lock().unwrap(), Some(user_id));
}

#[test]
fn test_auth_gate_revokes_session_of_deleted_account() {
    let fixture = SessionFixture::new();
    let (user_id, cookie) = fixture.signed_in("grace");
    fixture.users.delete_account(user_id).unwrap();

    let res = fixture.private(&cookie);
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(res.body_json(), json!({ "error": "Unauthorized" }));
    assert!(res.header("Set-Cookie").unwrap().contains("Max-Age=0"));
    assert!(fixture.seen.lock().unwrap().is_none());

    // A session for an unknown id never existed as an account at all.
    let set_cookie = fixture.sessions.login(UserId(999)).unwrap();
    let stray = set_cookie.split(';').next().unwrap().to_string();
    assert_eq!(fixture.private(&stray).status, StatusCode::UNAUTHORIZED);
}

fn cors_router(cors: CorsMiddleware) -> Router {
    let mut router = Router::new();
    router.global(Arc::new(cors));
    router.get("/todos", ok).unwrap();
    router
}

#[test]
fn test_cors_preflight_answered_before_lookup() {
    let _tracing = TestTracing::init();
    let router = cors_router(CorsMiddleware::for_frontend("http://localhost:3000").unwrap());

    let res = router.dispatch(
        Request::new(Method::OPTIONS, "/todos")
            .with_header("Origin", "http://localhost:3000")
            .with_header("Access-Control-Request-Method", "POST")
            .with_header("Access-Control-Request-Headers", "content-type"),
    );
    assert_eq!(res.status, StatusCode::NO_CONTENT);
    assert_eq!(
        res.header("Access-Control-Allow-Origin"),
        Some("http://localhost:3000")
    );
    assert_eq!(res.header("Access-Control-Allow-Credentials"), Some("true"));
    assert!(res
        .header("Access-Control-Allow-Methods")
        .unwrap()
        .contains("DELETE"));
}

#[test]
fn test_cors_disallowed_origin_gets_no_headers() {
    let router = cors_router(CorsMiddleware::for_frontend("http://localhost:3000").unwrap());

    let res = router.dispatch(
        Request::new(Method::OPTIONS, "/todos")
            .with_header("Origin", "https://evil.example")
            .with_header("Access-Control-Request-Method", "GET"),
    );
    assert!(res.header("Access-Control-Allow-Origin").is_none());

    let res = router.dispatch(
        Request::new(Method::GET, "/todos").with_header("Origin", "https://evil.example"),
    );
    assert_eq!(res.status, StatusCode::OK);
    assert!(res.header("Access-Control-Allow-Origin").is_none());
}

#[test]
fn test_cors_decorates_simple_requests() {
    let router = cors_router(CorsMiddleware::for_frontend("http://localhost:3000").unwrap());
    let res = router.dispatch(
        Request::new(Method::GET, "/todos").with_header("Origin", "http://localhost:3000"),
    );
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(
        res.header("Access-Control-Allow-Origin"),
        Some("http://localhost:3000")
    );
    assert_eq!(res.header("Vary"), Some("Origin"));
}

#[test]
fn test_cors_builder_rejects_wildcard_with_credentials() {
    let result = CorsMiddlewareBuilder::new()
        .allowed_origins(&["*"])
        .allow_credentials(true)
        .build();
    assert!(result.is_err());
}

#[test]
fn test_recovery_turns_panic_into_500() {
    let _tracing = TestTracing::init();
    let mut router = Router::new();
    router.layer(Arc::new(RecoveryMiddleware));
    router
        .get("/boom", |_req: Request| -> Response { panic!("handler exploded") })
        .unwrap();
    router.get("/fine", ok).unwrap();

    let res = router.dispatch(Request::new(Method::GET, "/boom"));
    assert_eq!(res.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(res.body_json(), json!({ "error": "Internal server error" }));

    // The router keeps serving afterwards.
    let res = router.dispatch(Request::new(Method::GET, "/fine"));
    assert_eq!(res.status, StatusCode::OK);
}

#[test]
fn test_logging_records_request_outcome() {
    let (_tracing, logs) = TestTracing::capture();
    let mut router = Router::new();
    router.layer(Arc::new(LoggingMiddleware));
    router
        .get("/todos/{id}", |_req: Request| {
            Response::json(StatusCode::OK, &json!({ "ok": true }))
        })
        .unwrap();
    router
        .get("/broken", |_req: Request| {
            Response::error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        })
        .unwrap();

    router.dispatch(Request::new(Method::GET, "/todos/7"));
    let event = logs.find("Request completed").unwrap();
    assert_eq!(event["level"], "INFO");
    assert_eq!(event["method"], "GET");
    assert_eq!(event["path"], "/todos/7");
    assert_eq!(event["status"], 200);
    assert!(event["request_id"].is_string());
    assert!(event["duration_ms"].as_f64().unwrap() >= 0.0);

    router.dispatch(Request::new(Method::GET, "/broken"));
    let event = logs.find("Request failed").unwrap();
    assert_eq!(event["level"], "WARN");
    assert_eq!(event["path"], "/broken");
    assert_eq!(event["status"], 500);
}
