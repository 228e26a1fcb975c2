//! The response object handed back to callers.

use crate::error::{Error, Result};
use crate::flush::FlushCoordinator;
use bytes::Bytes;
use hyper::{HeaderMap, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Raw pieces of a synthesized or passed-through response.
#[derive(Debug, Clone)]
pub struct ResponseParts {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub url: String,
    pub redirected: bool,
}

/// Fetch-style response. The body can be read once; clones read independently.
#[derive(Debug)]
pub struct MockResponse {
    status: StatusCode,
    headers: HeaderMap,
    url: String,
    redirected: bool,
    body: Bytes,
    body_used: AtomicBool,
    pass_through: bool,
    flush: Option<Arc<FlushCoordinator>>,
}

impl Clone for MockResponse {
    fn clone(&self) -> Self {
        Self {
            status: self.status,
            headers: self.headers.clone(),
            url: self.url.clone(),
            redirected: self.redirected,
            body: self.body.clone(),
            body_used: AtomicBool::new(false),
            pass_through: self.pass_through,
            flush: self.flush.clone(),
        }
    }
}

impl MockResponse {
    pub(crate) fn new(
        parts: ResponseParts,
        pass_through: bool,
        flush: Option<Arc<FlushCoordinator>>,
    ) -> Self {
        Self {
            status: parts.status,
            headers: parts.headers,
            url: parts.url,
            redirected: parts.redirected,
            body: parts.body,
            body_used: AtomicBool::new(false),
            pass_through,
            flush,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn status_text(&self) -> &'static str {
        self.status.canonical_reason().unwrap_or("")
    }

    /// Status in the 2xx range.
    pub fn ok(&self) -> bool {
        self.status.is_success()
    }

    pub fn redirected(&self) -> bool {
        self.redirected
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn body_used(&self) -> bool {
        self.body_used.load(Ordering::Acquire)
    }

    /// Whether a real fetcher produced this response.
    pub fn is_pass_through(&self) -> bool {
        self.pass_through
    }

    pub async fn bytes(&self) -> Result<Bytes> {
        let _read = self.flush.as_ref().map(|f| f.hold_body_read());
        if self.body_used.swap(true, Ordering::AcqRel) {
            return Err(Error::BodyUsed);
        }
        // body streams deliver on a later tick
        tokio::task::yield_now().await;
        Ok(self.body.clone())
    }

    pub async fn text(&self) -> Result<String> {
        let bytes = self.bytes().await?;
        String::from_utf8(bytes.to_vec()).map_err(|e| Error::Decode(e.to_string()))
    }

    pub async fn json<T: DeserializeOwned>(&self) -> Result<T> {
        let bytes = self.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| Error::Decode(e.to_string()))
    }

    /// Convert into an `http` response, e.g. to hand to hyper-based code.
    pub fn into_http(self) -> Response<Bytes> {
        let mut response = Response::new(self.body);
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::header::{HeaderValue, CONTENT_TYPE};
    use serde_json::{json, Value};

    fn response(status: StatusCode, body: &'static [u8]) -> MockResponse {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        MockResponse::new(
            ResponseParts {
                status,
                headers,
                body: Bytes::from_static(body),
                url: "http://a.com/".to_string(),
                redirected: false,
            },
            false,
            None,
        )
    }

    #[test]
    fn test_status_accessors() {
        let r = response(StatusCode::NOT_FOUND, b"");
        assert!(!r.ok());
        assert_eq!(r.status_text(), "Not Found");
        assert_eq!(r.header("content-type"), Some("application/json"));
        assert!(response(StatusCode::CREATED, b"").ok());
    }

    #[tokio::test]
    async fn test_body_reads_once() {
        let r = response(StatusCode::OK, br#"{"a":1}"#);
        let value: Value = r.json().await.unwrap();
        assert_eq!(value, json!({"a": 1}));
        assert!(r.body_used());
        assert!(matches!(r.text().await, Err(Error::BodyUsed)));

        let copy = r.clone();
        assert!(!copy.body_used());
        assert_eq!(copy.text().await.unwrap(), r#"{"a":1}"#);
    }

    #[tokio::test]
    async fn test_decode_errors() {
        let r = response(StatusCode::OK, b"not json");
        assert!(matches!(r.json::<Value>().await, Err(Error::Decode(_))));
    }

    #[test]
    fn test_into_http() {
        let http = response(StatusCode::ACCEPTED, b"done").into_http();
        assert_eq!(http.status(), StatusCode::ACCEPTED);
        assert_eq!(http.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(http.body(), &Bytes::from_static(b"done"));
    }
}
