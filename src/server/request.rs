use crate::ids::{RequestId, UserId};
use crate::router::PathParams;
use http::Method;
use serde::de::DeserializeOwned;
use smallvec::SmallVec;
use std::collections::HashMap;
use std::io::Read;
use thiserror::Error;
use tracing::debug;

/// Header storage: lowercase names, original values, inline for typical requests.
pub type HeaderVec = SmallVec<[(String, String); 16]>;

/// Largest request body accepted before the server answers 413.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// An inbound request after it has left the wire.
///
/// Everything a handler may need travels in explicit fields: route captures in
/// [`PathParams`], the authenticated user in `user_id`. Middleware that adds
/// request-scoped data writes to one of these fields rather than to an
/// untyped map.
#[derive(Debug, Clone)]
pub struct Request {
    pub request_id: RequestId,
    pub method: Method,
    /// Path without the query string.
    pub path: String,
    pub query: HashMap<String, String>,
    pub headers: HeaderVec,
    pub cookies: HashMap<String, String>,
    pub body: Vec<u8>,
    /// Filled by the router once a route matched.
    pub params: PathParams,
    /// Filled by the authentication middleware.
    pub user_id: Option<UserId>,
}

impl Request {
    /// Build a request for `method` and a target that may carry a query string.
    pub fn new(method: Method, target: &str) -> Self {
        let (path, query) = split_target(target);
        Self {
            request_id: RequestId::new(),
            method,
            path: path.to_string(),
            query: parse_query_params(query),
            headers: HeaderVec::new(),
            cookies: HashMap::new(),
            body: Vec::new(),
            params: PathParams::default(),
            user_id: None,
        }
    }

    /// Add a header; a `Cookie` header also refreshes the parsed cookie jar.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        let name = name.to_ascii_lowercase();
        if name == "cookie" {
            self.cookies.extend(parse_cookie_header(value));
        }
        self.headers.push((name, value.to_string()));
        self
    }

    #[must_use]
    pub fn with_cookie(mut self, name: &str, value: &str) -> Self {
        self.cookies.insert(name.to_string(), value.to_string());
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    #[must_use]
    pub fn with_json(self, body: &serde_json::Value) -> Self {
        self.with_header("content-type", "application/json")
            .with_body(body.to_string())
    }

    /// Case-insensitive header lookup.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    #[must_use]
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    /// Path parameter bound by the router; later duplicates win.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name)
    }

    /// Deserialize the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error for empty, malformed or mistyped bodies.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// Failures while pulling a request off the wire.
#[derive(Debug, Error)]
pub enum RequestReadError {
    #[error("unsupported method {0:?}")]
    Method(String),
    #[error("request body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },
    #[error("failed to read request body: {0}")]
    Io(#[from] std::io::Error),
}

/// Convert a `tiny_http` request into a [`Request`], reading at most
/// `max_body` bytes of body.
///
/// # Errors
///
/// See [`RequestReadError`].
pub fn read_request(
    raw: &mut tiny_http::Request,
    max_body: usize,
) -> Result<Request, RequestReadError> {
    let method = Method::from_bytes(raw.method().as_str().as_bytes())
        .map_err(|_| RequestReadError::Method(raw.method().as_str().to_string()))?;

    let headers: HeaderVec = raw
        .headers()
        .iter()
        .map(|h| {
            (
                h.field.as_str().as_str().to_ascii_lowercase(),
                h.value.as_str().to_string(),
            )
        })
        .collect();

    let request_id = RequestId::from_header_or_new(
        headers
            .iter()
            .find(|(k, _)| k == "x-request-id")
            .map(|(_, v)| v.as_str()),
    );

    let cookies = parse_cookies(&headers);

    if raw.body_length().is_some_and(|len| len > max_body) {
        return Err(RequestReadError::BodyTooLarge { limit: max_body });
    }
    let mut body = Vec::new();
    raw.as_reader()
        .take(max_body as u64 + 1)
        .read_to_end(&mut body)?;
    if body.len() > max_body {
        return Err(RequestReadError::BodyTooLarge { limit: max_body });
    }

    let (path, query) = split_target(raw.url());

    debug!(
        request_id = %request_id,
        method = %method,
        path = %path,
        header_count = headers.len(),
        cookie_count = cookies.len(),
        body_bytes = body.len(),
        "HTTP request parsed"
    );

    Ok(Request {
        request_id,
        method,
        path: path.to_string(),
        query: parse_query_params(query),
        headers,
        cookies,
        body,
        params: PathParams::default(),
        user_id: None,
    })
}

fn split_target(target: &str) -> (&str, &str) {
    match target.split_once('?') {
        Some((path, query)) => (if path.is_empty() { "/" } else { path }, query),
        None => (if target.is_empty() { "/" } else { target }, ""),
    }
}

/// Collect every `Cookie` header into one jar; later values win.
pub fn parse_cookies(headers: &[(String, String)]) -> HashMap<String, String> {
    headers
        .iter()
        .filter(|(k, _)| k == "cookie")
        .flat_map(|(_, v)| parse_cookie_header(v))
        .collect()
}

fn parse_cookie_header(value: &str) -> Vec<(String, String)> {
    value
        .split(';')
        .filter_map(|pair| {
            let mut parts = pair.trim().splitn(2, '=');
            let name = parts.next()?.trim();
            if name.is_empty() {
                return None;
            }
            let value = parts.next().unwrap_or("").trim();
            Some((name.to_string(), value.to_string()))
        })
        .collect()
}

pub fn parse_query_params(query: &str) -> HashMap<String, String> {
    url::form_urlencoded::parse(query.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cookies_multiple_headers() {
        let headers = vec![
            ("cookie".to_string(), "a=1; b=2".to_string()),
            ("accept".to_string(), "*/*".to_string()),
            ("cookie".to_string(), "b=3;c=".to_string()),
        ];
        let jar = parse_cookies(&headers);
        assert_eq!(jar.get("a").map(String::as_str), Some("1"));
        assert_eq!(jar.get("b").map(String::as_str), Some("3"));
        assert_eq!(jar.get("c").map(String::as_str), Some(""));
    }

    #[test]
    fn test_new_splits_query() {
        let req = Request::new(Method::GET, "/auth/google/callback?code=abc&state=x%2By");
        assert_eq!(req.path, "/auth/google/callback");
        assert_eq!(req.query_param("code"), Some("abc"));
        assert_eq!(req.query_param("state"), Some("x+y"));
    }

    #[test]
    fn test_header_lookup_ignores_case() {
        let req = Request::new(Method::GET, "/").with_header("Content-Type", "application/json");
        assert_eq!(req.header("content-type"), Some("application/json"));
        assert_eq!(req.header("CONTENT-TYPE"), Some("application/json"));
    }

    #[test]
    fn test_cookie_header_populates_jar() {
        let req = Request::new(Method::GET, "/").with_header("Cookie", "todo_session=abc.def");
        assert_eq!(req.cookie("todo_session"), Some("abc.def"));
    }
}
