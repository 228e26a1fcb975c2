//! Request normalization.
//!
//! Callers hand `fetch` a URL string, a parsed `url::Url`, or a Request-like
//! [`FetchRequest`] (also built from `hyper::Request`), plus a [`RequestInit`]
//! options bag. [`normalize`] folds these into one immutable [`CallRecord`]
//! which every matcher and the call history work from.

mod body;
mod url;

pub use self::body::RequestBody;
pub use self::url::{has_scheme, normalize_url, NormalizedUrl, UrlKind};

use crate::error::{Error, Result};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use hyper::header::{HeaderName, HeaderValue};
use hyper::{HeaderMap, Method};
use once_cell::sync::OnceCell;
use serde_json::Value;
use std::borrow::Cow;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// First argument of `fetch`.
#[derive(Debug, Clone)]
pub enum RequestInput {
    Url(String),
    Parsed(::url::Url),
    Request(FetchRequest),
}

impl From<&str> for RequestInput {
    fn from(value: &str) -> Self {
        RequestInput::Url(value.to_string())
    }
}

impl From<String> for RequestInput {
    fn from(value: String) -> Self {
        RequestInput::Url(value)
    }
}

impl From<&String> for RequestInput {
    fn from(value: &String) -> Self {
        RequestInput::Url(value.clone())
    }
}

impl From<::url::Url> for RequestInput {
    fn from(value: ::url::Url) -> Self {
        RequestInput::Parsed(value)
    }
}

impl From<FetchRequest> for RequestInput {
    fn from(value: FetchRequest) -> Self {
        RequestInput::Request(value)
    }
}

impl<B: Into<Bytes>> From<hyper::Request<B>> for RequestInput {
    fn from(value: hyper::Request<B>) -> Self {
        RequestInput::Request(FetchRequest::from(value))
    }
}

/// Options bag accompanying a call. Set fields override the Request-like input.
#[derive(Debug, Clone, Default)]
pub struct RequestInit {
    pub method: Option<String>,
    pub headers: Option<Vec<(String, String)>>,
    pub body: Option<RequestBody>,
    pub signal: Option<CancellationToken>,
}

impl RequestInit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    /// Append a header; repeated names produce multi-valued headers.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .get_or_insert_with(Vec::new)
            .push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<RequestBody>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// JSON body plus a `content-type: application/json` header.
    pub fn json(self, value: Value) -> Self {
        self.header("content-type", "application/json")
            .body(RequestBody::Json(value))
    }

    pub fn signal(mut self, token: CancellationToken) -> Self {
        self.signal = Some(token);
        self
    }
}

/// A Request-like value: the URL plus whatever the caller embedded in it.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    url: String,
    method: Option<String>,
    headers: Vec<(String, String)>,
    body: Option<RequestBody>,
    body_used: bool,
    signal: Option<CancellationToken>,
}

impl FetchRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: None,
            headers: Vec::new(),
            body: None,
            body_used: false,
            signal: None,
        }
    }

    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<RequestBody>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn signal(mut self, token: CancellationToken) -> Self {
        self.signal = Some(token);
        self
    }

    /// Mark the body as already read, as a platform request would after `text()`.
    pub fn consume_body(&mut self) -> Option<RequestBody> {
        self.body_used = true;
        self.body.take()
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn body_used(&self) -> bool {
        self.body_used
    }
}

impl<B: Into<Bytes>> From<hyper::Request<B>> for FetchRequest {
    fn from(request: hyper::Request<B>) -> Self {
        let (parts, body) = request.into_parts();
        let body: Bytes = body.into();
        let headers = parts
            .headers
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        Self {
            url: parts.uri.to_string(),
            method: Some(parts.method.as_str().to_string()),
            headers,
            body: (!body.is_empty()).then_some(RequestBody::Bytes(body)),
            body_used: false,
            signal: None,
        }
    }
}

/// Normalized view of one intercepted call.
#[derive(Debug)]
pub struct CallRecord {
    url: NormalizedUrl,
    method: String,
    headers: HeaderMap,
    body: Option<RequestBody>,
    parsed_body: OnceCell<Option<Value>>,
    request: Option<FetchRequest>,
    signal: Option<CancellationToken>,
    received_at: DateTime<Utc>,
}

impl CallRecord {
    /// Normalized URL: absolute, protocol-relative, or path plus query.
    pub fn url(&self) -> &str {
        &self.url.href
    }

    pub fn normalized_url(&self) -> &NormalizedUrl {
        &self.url
    }

    pub fn path(&self) -> &str {
        &self.url.path
    }

    pub fn query(&self) -> Option<&str> {
        self.url.query.as_deref()
    }

    /// Decoded query pairs in order of appearance.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        self.query()
            .map(|q| {
                ::url::form_urlencoded::parse(q.as_bytes())
                    .into_owned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Upper-case method.
    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// First value of a header, if it is valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn body(&self) -> Option<&RequestBody> {
        self.body.as_ref()
    }

    pub fn body_text(&self) -> Option<Cow<'_, str>> {
        self.body.as_ref().map(RequestBody::as_text)
    }

    /// Parsed body, computed once and cached.
    pub fn parsed_body(&self) -> Option<&Value> {
        self.parsed_body
            .get_or_init(|| self.body.as_ref().and_then(RequestBody::parse))
            .as_ref()
    }

    /// The Request-like value the caller passed, if any.
    pub fn request(&self) -> Option<&FetchRequest> {
        self.request.as_ref()
    }

    pub fn signal(&self) -> Option<&CancellationToken> {
        self.signal.as_ref()
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }
}

/// Build a [`CallRecord`] from the call arguments.
///
/// When `parse_body` is set the body is parsed immediately so body matchers
/// never need to read it again.
pub fn normalize(
    input: RequestInput,
    init: RequestInit,
    base: Option<&::url::Url>,
    parse_body: bool,
) -> Result<CallRecord> {
    let (raw_url, embedded) = match input {
        RequestInput::Url(url) => (url, None),
        RequestInput::Parsed(url) => (url.to_string(), None),
        RequestInput::Request(request) => (request.url.clone(), Some(request)),
    };

    let url = normalize_url(&raw_url, base)?;

    let method = init
        .method
        .or_else(|| embedded.as_ref().and_then(|r| r.method.clone()))
        .unwrap_or_else(|| "GET".to_string());
    let method = Method::from_bytes(method.to_uppercase().as_bytes())
        .map_err(|_| Error::InvalidInput(format!("invalid method '{method}'")))?
        .as_str()
        .to_string();

    let header_pairs = match (init.headers, embedded.as_ref()) {
        (Some(headers), _) => headers,
        (None, Some(request)) => request.headers.clone(),
        (None, None) => Vec::new(),
    };
    let headers = build_header_map(&header_pairs)?;

    let body = match (init.body, embedded.as_ref()) {
        (Some(body), _) => Some(body),
        (None, Some(request)) if request.body_used => {
            return Err(Error::InvalidInput(
                "request body has already been consumed".to_string(),
            ));
        }
        (None, Some(request)) => request.body.clone(),
        (None, None) => None,
    };

    let signal = init
        .signal
        .or_else(|| embedded.as_ref().and_then(|r| r.signal.clone()));

    let record = CallRecord {
        url,
        method,
        headers,
        body,
        parsed_body: OnceCell::new(),
        request: embedded,
        signal,
        received_at: Utc::now(),
    };

    if parse_body {
        let parsed = record.parsed_body().is_some();
        trace!(url = %record.url(), parsed, "parsed request body eagerly");
    }

    Ok(record)
}

fn build_header_map(pairs: &[(String, String)]) -> Result<HeaderMap> {
    let mut headers = HeaderMap::with_capacity(pairs.len());
    for (name, value) in pairs {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| Error::InvalidInput(format!("invalid header name '{name}'")))?;
        let header_value = HeaderValue::from_str(value)
            .map_err(|_| Error::InvalidInput(format!("invalid value for header '{name}'")))?;
        headers.append(header_name, header_value);
    }
    Ok(headers)
}
