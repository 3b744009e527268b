use http::StatusCode;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::error;

/// Response produced by handlers and middleware, written to the wire by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: StatusCode,
    /// Header list; names may repeat (`Set-Cookie`).
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Response {
    #[must_use]
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Serialize `body` as the JSON payload.
    ///
    /// A serialization failure is logged and turned into a bare 500 so a handler
    /// can never panic while rendering its own output.
    pub fn json<T: Serialize + ?Sized>(status: StatusCode, body: &T) -> Self {
        match serde_json::to_vec(body) {
            Ok(bytes) => Self {
                status,
                headers: vec![("Content-Type".to_string(), "application/json".to_string())],
                body: bytes,
            },
            Err(e) => {
                error!(error = %e, "Failed to serialize response body");
                Self::error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        }
    }

    /// `{"error": message}` with the given status.
    pub fn error(status: StatusCode, message: &str) -> Self {
        let body = json!({ "error": message }).to_string().into_bytes();
        Self {
            status,
            headers: vec![("Content-Type".to_string(), "application/json".to_string())],
            body,
        }
    }

    #[must_use]
    pub fn no_content() -> Self {
        Self::new(StatusCode::NO_CONTENT)
    }

    /// 307 Temporary Redirect to `location`.
    #[must_use]
    pub fn redirect(location: &str) -> Self {
        let mut res = Self::new(StatusCode::TEMPORARY_REDIRECT);
        res.set_header("Location", location);
        res
    }

    /// Replace every header named `name` with one value.
    pub fn set_header(&mut self, name: &str, value: &str) {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value.to_string()));
    }

    /// Add a header without touching existing ones of the same name.
    pub fn append_header(&mut self, name: &str, value: &str) {
        self.headers.push((name.to_string(), value.to_string()));
    }

    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.append_header(name, value);
        self
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn header_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Parse the body back into JSON, `Value::Null` when empty or not JSON.
    #[must_use]
    pub fn body_json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap_or(Value::Null)
    }

    /// Convert into a `tiny_http` response. Headers with bytes `tiny_http`
    /// refuses are dropped with a log line.
    pub fn into_tiny_http(self) -> tiny_http::Response<std::io::Cursor<Vec<u8>>> {
        let mut out = tiny_http::Response::from_data(self.body)
            .with_status_code(tiny_http::StatusCode(self.status.as_u16()));
        for (name, value) in &self.headers {
            match tiny_http::Header::from_bytes(name.as_bytes(), value.as_bytes()) {
                Ok(h) => out.add_header(h),
                Err(()) => error!(header = %name, "Dropping invalid response header"),
            }
        }
        out
    }
}
