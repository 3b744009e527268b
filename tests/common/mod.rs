#![allow(dead_code)]

//! Shared fixtures: an in-memory application, a scripted OAuth provider and
//! raw-socket HTTP helpers.

use std::sync::Arc;

use http::Method;
use serde_json::Value;
use todo_api::app::{build_router, frontend_cors, AppState, Backends};
use todo_api::auth::{AuthError, OAuthProvider, ProviderRegistry, SESSION_COOKIE, STATE_COOKIE};
use todo_api::config::AppConfig;
use todo_api::model::OAuthProfile;
use todo_api::router::Router;
use todo_api::server::{Request, Response};

pub const FRONTEND: &str = "http://localhost:3000";

/// Provider named `fake`. Codes of the form `good-<subject>` exchange into a
/// profile for `<subject>`; every other code is rejected.
pub struct FakeProvider;

impl OAuthProvider for FakeProvider {
    fn name(&self) -> &str {
        "fake"
    }

    fn authorize_url(&self, state: &str) -> String {
        format!("https://provider.test/authorize?client_id=test&state={state}")
    }

    fn exchange(&self, code: &str) -> Result<OAuthProfile, AuthError> {
        let subject = code
            .strip_prefix("good-")
            .ok_or_else(|| AuthError::Provider(format!("bad code {code}")))?;
        Ok(OAuthProfile {
            provider: "fake".into(),
            provider_id: subject.into(),
            email: format!("{subject}@example.com"),
            name: subject.to_uppercase(),
            avatar_url: Some(format!("https://avatars.test/{subject}.png")),
        })
    }
}

pub fn test_config() -> AppConfig {
    AppConfig::from_lookup(|key| match key {
        "FRONTEND_URL" => Some(FRONTEND.to_string()),
        "SESSION_SECRET" => Some("0123456789abcdef0123456789abcdef".to_string()),
        _ => None,
    })
    .unwrap()
}

/// The full router over the given backends with [`FakeProvider`] registered.
pub struct TestApp {
    pub router: Router,
    pub backends: Backends,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_backends(Backends::in_memory())
    }

    pub fn with_backends(backends: Backends) -> Self {
        let config = test_config();
        let mut providers = ProviderRegistry::new();
        providers.register(Arc::new(FakeProvider));
        let state = AppState::new(&backends, providers, &config).unwrap();
        let router = build_router(Arc::new(state), frontend_cors(FRONTEND).unwrap()).unwrap();
        Self { router, backends }
    }

    pub fn send(&self, req: Request) -> Response {
        self.router.dispatch(req)
    }

    /// Request carrying `session` (a `todo_session=...` pair) when given.
    pub fn call(
        &self,
        method: Method,
        path: &str,
        session: Option<&str>,
        body: Option<Value>,
    ) -> Response {
        let mut req = Request::new(method, path);
        if let Some(cookie) = session {
            req = req.with_header("Cookie", cookie);
        }
        if let Some(body) = body {
            req = req.with_json(&body);
        }
        self.send(req)
    }

    /// Run the whole OAuth dance for `subject` and return the session cookie
    /// pair to send on later requests.
    pub fn login(&self, subject: &str) -> String {
        let begin = self.send(Request::new(Method::GET, "/auth/fake"));
        assert_eq!(begin.status.as_u16(), 307, "login start failed");
        let state = cookie_value(&begin, STATE_COOKIE).expect("state cookie");

        let callback = self.send(
            Request::new(
                Method::GET,
                &format!("/auth/fake/callback?code=good-{subject}&state={state}"),
            )
            .with_cookie(STATE_COOKIE, &state),
        );
        assert_eq!(callback.status.as_u16(), 307, "callback failed: {:?}", callback.body_json());
        let session = cookie_value(&callback, SESSION_COOKIE).expect("session cookie");
        format!("{SESSION_COOKIE}={session}")
    }
}

/// Value of the `name` cookie among the response's `Set-Cookie` headers.
pub fn cookie_value(res: &Response, name: &str) -> Option<String> {
    res.header_values("Set-Cookie").find_map(|header| {
        let pair = header.split(';').next()?;
        let (k, v) = pair.split_once('=')?;
        (k.trim() == name).then(|| v.trim().to_string())
    })
}

pub mod wire {
    use std::io::{Read, Write};
    use std::net::{SocketAddr, TcpStream};
    use std::time::Duration;

    /// Write `req` verbatim and read until the server closes the connection.
    pub fn send_request(addr: &SocketAddr, req: &str) -> String {
        let mut stream = TcpStream::connect(addr).unwrap();
        stream.write_all(req.as_bytes()).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let mut buf = Vec::new();
        let mut tmp = [0u8; 4096];
        loop {
            match stream.read(&mut tmp) {
                Ok(0) => break,
                Ok(n) => buf.extend_from_slice(&tmp[..n]),
                Err(ref e)
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut =>
                {
                    break
                }
                Err(e) => panic!("read error: {e:?}"),
            }
        }
        String::from_utf8_lossy(&buf).to_string()
    }

    /// Status code and JSON body (`Null` when absent) of a raw response.
    pub fn parse_response(resp: &str) -> (u16, serde_json::Value) {
        let (head, body) = resp.split_once("\r\n\r\n").unwrap_or((resp, ""));
        let status = head
            .lines()
            .next()
            .and_then(|line| line.split_whitespace().nth(1))
            .and_then(|code| code.parse().ok())
            .unwrap_or(0);
        (status, serde_json::from_str(body).unwrap_or_default())
    }
}
