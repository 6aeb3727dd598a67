//! Request and response types.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::TransportError;
use crate::multipart::MultipartPayload;

/// Transfer progress of one request direction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    /// `loaded / total * 100`, clamped to `0..=100`.
    pub percent: f64,
    pub loaded: u64,
    pub total: u64,
}

impl Progress {
    pub fn new(loaded: u64, total: u64) -> Self {
        let percent = if total == 0 {
            100.0
        } else {
            (loaded as f64 / total as f64 * 100.0).clamp(0.0, 100.0)
        };
        Self {
            percent,
            loaded,
            total,
        }
    }
}

/// Progress callback. Only invoked when the total length is known.
pub type ProgressCallback = Arc<dyn Fn(Progress) + Send + Sync>;

/// HTTP method.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Method {
    Get,
    #[default]
    Post,
    Put,
    Patch,
    Delete,
}

impl From<Method> for reqwest::Method {
    fn from(m: Method) -> Self {
        match m {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

/// Request body.
#[derive(Debug, Clone, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    /// Raw bytes sent with the caller's `Content-Type`.
    Bytes(Vec<u8>),
    /// Serialized with `serde_json`; defaults to `application/json`.
    Json(serde_json::Value),
    /// `multipart/form-data`; the boundary header is always generated.
    Multipart(MultipartPayload),
}

/// A single network exchange.
#[derive(Clone, Default)]
pub struct Request {
    pub url: String,
    pub method: Method,
    pub headers: Vec<(String, String)>,
    pub body: RequestBody,
    /// Per-request timeout; `None` falls back to the transport default.
    pub timeout: Option<Duration>,
    pub cancel: Option<CancellationToken>,
    pub on_upload_progress: Option<ProgressCallback>,
    pub on_download_progress: Option<ProgressCallback>,
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("url", &self.url)
            .field("method", &self.method)
            .field("headers", &self.headers)
            .field("body", &self.body)
            .field("timeout", &self.timeout)
            .field("cancelled", &self.cancel.as_ref().map(|c| c.is_cancelled()))
            .finish_non_exhaustive()
    }
}

impl Request {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method,
            ..Default::default()
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::Post, url)
    }

    pub fn put(url: impl Into<String>) -> Self {
        Self::new(Method::Put, url)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: RequestBody) -> Self {
        self.body = body;
        self
    }

    pub fn json(self, value: serde_json::Value) -> Self {
        self.body(RequestBody::Json(value))
    }

    pub fn multipart(self, payload: MultipartPayload) -> Self {
        self.body(RequestBody::Multipart(payload))
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn on_upload_progress(mut self, callback: ProgressCallback) -> Self {
        self.on_upload_progress = Some(callback);
        self
    }

    pub fn on_download_progress(mut self, callback: ProgressCallback) -> Self {
        self.on_download_progress = Some(callback);
        self
    }

    /// Returns `true` if a `Content-Type` header was set by the caller.
    pub fn has_content_type(&self) -> bool {
        self.headers
            .iter()
            .any(|(name, _)| name.eq_ignore_ascii_case("content-type"))
    }
}

/// A completed 2xx exchange.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Response {
    /// Returns the first header named `name` (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, TransportError> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_percent() {
        let p = Progress::new(50, 200);
        assert_eq!(p.percent, 25.0);
        assert_eq!(Progress::new(300, 200).percent, 100.0);
        assert_eq!(Progress::new(0, 0).percent, 100.0);
    }

    #[test]
    fn builder_sets_fields() {
        let req = Request::post("http://localhost/upload")
            .header("X-Trace", "abc")
            .timeout(Duration::from_secs(3))
            .json(serde_json::json!({"a": 1}));
        assert_eq!(req.method, Method::Post);
        assert_eq!(req.url, "http://localhost/upload");
        assert_eq!(req.timeout, Some(Duration::from_secs(3)));
        assert!(matches!(req.body, RequestBody::Json(_)));
        assert!(!req.has_content_type());
        assert!(req.header("content-type", "text/plain").has_content_type());
    }

    #[test]
    fn debug_omits_callbacks() {
        let req = Request::get("http://x").on_upload_progress(Arc::new(|_| {}));
        let dbg = format!("{req:?}");
        assert!(dbg.contains("http://x"));
        assert!(!dbg.contains("on_upload_progress"));
    }

    #[test]
    fn response_helpers() {
        let resp = Response {
            status: 200,
            headers: vec![("Content-Type".into(), "application/json".into())],
            body: br#"{"ok":true}"#.to_vec(),
        };
        assert_eq!(resp.header("content-type"), Some("application/json"));
        let v: serde_json::Value = resp.json().unwrap();
        assert_eq!(v["ok"], true);
        assert_eq!(resp.text(), r#"{"ok":true}"#);
    }
}
