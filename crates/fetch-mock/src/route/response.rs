//! Response directives and response synthesis.
//!
//! A route answers with a [`ResponseDirective`]: a bare status, a text, bytes
//! or JSON body, a full [`ResponseDescriptor`], or a function of the call that
//! produces any of these (possibly asynchronously).

use crate::config::FetchMockConfig;
use crate::error::{Error, Result, RouteConfigError};
use crate::request::CallRecord;
use crate::response::ResponseParts;
use base64::Engine;
use bytes::Bytes;
use futures::future::BoxFuture;
use hyper::header::{HeaderName, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use hyper::{HeaderMap, StatusCode};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Keys that mark a JSON object as a response descriptor rather than a body.
const DESCRIPTOR_KEYS: &[&str] = &["body", "status", "headers", "throws", "redirectUrl", "delay"];

/// Response-producing function. Returning a future lets it resolve later.
pub type ResponseFn =
    Arc<dyn Fn(&CallRecord) -> BoxFuture<'static, ResponseDirective> + Send + Sync>;

/// Latency applied before a response is delivered.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Delay {
    /// Fixed delay in milliseconds
    Fixed(u64),
    /// Random delay within `[min, max]` milliseconds
    Range { min: u64, max: u64 },
}

impl Delay {
    pub fn duration(&self) -> Duration {
        match self {
            Delay::Fixed(ms) => Duration::from_millis(*ms),
            Delay::Range { min, max } if max > min => {
                use rand::Rng;
                Duration::from_millis(rand::thread_rng().gen_range(*min..=*max))
            }
            Delay::Range { min, .. } => Duration::from_millis(*min),
        }
    }
}

impl From<u64> for Delay {
    fn from(ms: u64) -> Self {
        Delay::Fixed(ms)
    }
}

impl From<i32> for Delay {
    fn from(ms: i32) -> Self {
        Delay::Fixed(u64::try_from(ms).unwrap_or(0))
    }
}

impl From<Duration> for Delay {
    fn from(duration: Duration) -> Self {
        Delay::Fixed(duration.as_millis() as u64)
    }
}

/// Body of a synthesized response.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ResponseBody {
    #[default]
    Empty,
    Text(String),
    Bytes(Bytes),
    /// Serialized on delivery, with a JSON content-type when `send_as_json` is on
    Json(Value),
}

/// Everything a route can say about its response.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResponseDescriptor {
    pub status: Option<u16>,
    pub headers: Vec<(String, String)>,
    pub body: ResponseBody,
    /// Fail the call with a network error carrying this message
    pub throws: Option<String>,
    pub redirect_url: Option<String>,
    pub delay: Option<Delay>,
}

impl ResponseDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn text(mut self, body: impl Into<String>) -> Self {
        self.body = ResponseBody::Text(body.into());
        self
    }

    pub fn bytes(mut self, body: impl Into<Bytes>) -> Self {
        self.body = ResponseBody::Bytes(body.into());
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = ResponseBody::Json(body);
        self
    }

    pub fn throws(mut self, message: impl Into<String>) -> Self {
        self.throws = Some(message.into());
        self
    }

    pub fn redirect_url(mut self, url: impl Into<String>) -> Self {
        self.redirect_url = Some(url.into());
        self
    }

    pub fn delay(mut self, delay: impl Into<Delay>) -> Self {
        self.delay = Some(delay.into());
        self
    }

    fn validate(&self) -> Result<(), RouteConfigError> {
        if let Some(status) = self.status {
            validate_status(status)?;
        }
        for (name, value) in &self.headers {
            HeaderName::from_bytes(name.as_bytes()).map_err(|e| RouteConfigError::InvalidHeader {
                name: name.clone(),
                reason: e.to_string(),
            })?;
            HeaderValue::from_str(value).map_err(|e| RouteConfigError::InvalidHeader {
                name: name.clone(),
                reason: e.to_string(),
            })?;
        }
        if let (Some(url), Some(_)) = (&self.redirect_url, &self.throws) {
            return Err(RouteConfigError::InvalidResponse(format!(
                "redirect to '{url}' cannot be combined with throws"
            )));
        }
        Ok(())
    }
}

/// How a route responds.
#[derive(Clone)]
pub enum ResponseDirective {
    Status(u16),
    Text(String),
    Bytes(Bytes),
    Json(Value),
    Descriptor(ResponseDescriptor),
    Function(ResponseFn),
}

impl fmt::Debug for ResponseDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status(s) => f.debug_tuple("Status").field(s).finish(),
            Self::Text(t) => f.debug_tuple("Text").field(t).finish(),
            Self::Bytes(b) => f.debug_tuple("Bytes").field(b).finish(),
            Self::Json(v) => f.debug_tuple("Json").field(v).finish(),
            Self::Descriptor(d) => f.debug_tuple("Descriptor").field(d).finish(),
            Self::Function(_) => f.write_str("Function(..)"),
        }
    }
}

impl Default for ResponseDirective {
    fn default() -> Self {
        ResponseDirective::Status(200)
    }
}

impl ResponseDirective {
    /// Wrap a synchronous response function.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&CallRecord) -> ResponseDirective + Send + Sync + 'static,
    {
        ResponseDirective::Function(Arc::new(
            move |call: &CallRecord| -> BoxFuture<'static, ResponseDirective> {
                let directive = f(call);
                Box::pin(async move { directive })
            },
        ))
    }

    /// Wrap a response function that resolves later.
    pub fn from_async_fn<F, Fut>(f: F) -> Self
    where
        F: Fn(&CallRecord) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ResponseDirective> + Send + 'static,
    {
        ResponseDirective::Function(Arc::new(
            move |call: &CallRecord| -> BoxFuture<'static, ResponseDirective> { Box::pin(f(call)) },
        ))
    }

    /// Interpret a loosely typed value the way routes files declare responses:
    /// numbers are statuses, strings are text bodies, objects carrying any
    /// descriptor key are descriptors and any other value is a JSON body.
    pub fn from_value(value: Value) -> Result<Self, RouteConfigError> {
        match value {
            Value::Number(n) => n
                .as_u64()
                .and_then(|n| u16::try_from(n).ok())
                .map(ResponseDirective::Status)
                .ok_or_else(|| RouteConfigError::InvalidResponse(format!("invalid status {n}"))),
            Value::String(text) => Ok(ResponseDirective::Text(text)),
            Value::Object(ref map) if DESCRIPTOR_KEYS.iter().any(|k| map.contains_key(*k)) => {
                let raw: ResponseDescriptorRaw = serde_json::from_value(value)
                    .map_err(|e| RouteConfigError::InvalidResponse(e.to_string()))?;
                Ok(ResponseDirective::Descriptor(raw.try_into()?))
            }
            other => Ok(ResponseDirective::Json(other)),
        }
    }

    /// Check literal directives at registration time.
    pub(crate) fn validate(&self) -> Result<(), RouteConfigError> {
        match self {
            ResponseDirective::Status(status) => validate_status(*status),
            ResponseDirective::Descriptor(descriptor) => descriptor.validate(),
            _ => Ok(()),
        }
    }

    fn into_descriptor(self) -> ResponseDescriptor {
        match self {
            ResponseDirective::Status(status) => ResponseDescriptor::new().status(status),
            ResponseDirective::Text(text) => ResponseDescriptor::new().text(text),
            ResponseDirective::Bytes(bytes) => ResponseDescriptor::new().bytes(bytes),
            ResponseDirective::Json(value) => ResponseDescriptor::new().json(value),
            ResponseDirective::Descriptor(descriptor) => descriptor,
            // resolved before conversion
            ResponseDirective::Function(_) => ResponseDescriptor::new(),
        }
    }
}

impl From<u16> for ResponseDirective {
    fn from(status: u16) -> Self {
        ResponseDirective::Status(status)
    }
}

/// Integer literals default to `i32`; out-of-range values fail registration.
impl From<i32> for ResponseDirective {
    fn from(status: i32) -> Self {
        ResponseDirective::Status(u16::try_from(status).unwrap_or(0))
    }
}

impl From<StatusCode> for ResponseDirective {
    fn from(status: StatusCode) -> Self {
        ResponseDirective::Status(status.as_u16())
    }
}

impl From<&str> for ResponseDirective {
    fn from(text: &str) -> Self {
        ResponseDirective::Text(text.to_string())
    }
}

impl From<String> for ResponseDirective {
    fn from(text: String) -> Self {
        ResponseDirective::Text(text)
    }
}

impl From<Bytes> for ResponseDirective {
    fn from(bytes: Bytes) -> Self {
        ResponseDirective::Bytes(bytes)
    }
}

/// A JSON value is always a body; use [`ResponseDirective::from_value`] to
/// interpret descriptor-shaped objects.
impl From<Value> for ResponseDirective {
    fn from(value: Value) -> Self {
        ResponseDirective::Json(value)
    }
}

impl From<ResponseDescriptor> for ResponseDirective {
    fn from(descriptor: ResponseDescriptor) -> Self {
        ResponseDirective::Descriptor(descriptor)
    }
}

impl<'de> Deserialize<'de> for ResponseDirective {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        ResponseDirective::from_value(value).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum BodyMode {
    #[default]
    Text,
    Binary,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponseDescriptorRaw {
    #[serde(default, deserialize_with = "deserialize_status")]
    status: Option<u16>,
    #[serde(default)]
    headers: serde_json::Map<String, Value>,
    #[serde(default)]
    body: Option<Value>,
    #[serde(default)]
    mode: BodyMode,
    #[serde(default)]
    throws: Option<Value>,
    #[serde(default)]
    redirect_url: Option<String>,
    #[serde(default)]
    delay: Option<Delay>,
}

impl TryFrom<ResponseDescriptorRaw> for ResponseDescriptor {
    type Error = RouteConfigError;

    fn try_from(raw: ResponseDescriptorRaw) -> Result<Self, Self::Error> {
        let body = match (raw.body, raw.mode) {
            (None | Some(Value::Null), _) => ResponseBody::Empty,
            (Some(Value::String(encoded)), BodyMode::Binary) => {
                let decoded = base64::engine::general_purpose::STANDARD
                    .decode(encoded.as_bytes())
                    .map_err(|e| {
                        RouteConfigError::InvalidResponse(format!("binary body is not base64: {e}"))
                    })?;
                ResponseBody::Bytes(Bytes::from(decoded))
            }
            (Some(Value::String(text)), BodyMode::Text) => ResponseBody::Text(text),
            (Some(value), _) => ResponseBody::Json(value),
        };
        let headers = raw
            .headers
            .into_iter()
            .map(|(name, value)| match value {
                Value::String(s) => (name, s),
                other => (name, other.to_string()),
            })
            .collect();
        let throws = raw.throws.map(|value| match value {
            Value::String(s) => s,
            other => other.to_string(),
        });
        Ok(ResponseDescriptor {
            status: raw.status,
            headers,
            body,
            throws,
            redirect_url: raw.redirect_url,
            delay: raw.delay,
        })
    }
}

fn deserialize_status<'de, D>(deserializer: D) -> std::result::Result<Option<u16>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => n
            .as_u64()
            .and_then(|n| u16::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| D::Error::custom("invalid status code number")),
        Value::String(s) => s
            .parse::<u16>()
            .map(Some)
            .map_err(|_| D::Error::custom(format!("invalid status code string: {s}"))),
        _ => Err(D::Error::custom("status must be a number or string")),
    }
}

fn validate_status(status: u16) -> Result<(), RouteConfigError> {
    if (100..=599).contains(&status) {
        Ok(())
    } else {
        Err(RouteConfigError::InvalidStatus(status))
    }
}

/// Turn a directive into a concrete response for one call.
///
/// Function directives are resolved first, then the delay (the descriptor's,
/// else the route's) is slept, then `throws` fails the call.
pub(crate) async fn synthesize(
    directive: ResponseDirective,
    call: Arc<CallRecord>,
    route_delay: Option<Delay>,
    config: FetchMockConfig,
) -> Result<ResponseParts> {
    let mut directive = directive;
    while let ResponseDirective::Function(f) = directive {
        directive = f(&call).await;
    }
    let descriptor = directive.into_descriptor();

    if let Some(delay) = descriptor.delay.as_ref().or(route_delay.as_ref()) {
        let duration = delay.duration();
        debug!(url = %call.url(), delay_ms = duration.as_millis() as u64, "delaying response");
        tokio::time::sleep(duration).await;
    }

    if let Some(message) = descriptor.throws {
        return Err(Error::Network(message));
    }

    let status = descriptor.status.unwrap_or(200);
    if !(100..=599).contains(&status) {
        return Err(Error::InvalidResponse(format!("status {status} is out of range")));
    }
    let status = StatusCode::from_u16(status)
        .map_err(|e| Error::InvalidResponse(format!("status {status}: {e}")))?;

    let mut headers = HeaderMap::with_capacity(descriptor.headers.len() + 2);
    for (name, value) in &descriptor.headers {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| Error::InvalidResponse(format!("header '{name}': {e}")))?;
        let header_value = HeaderValue::from_str(value)
            .map_err(|e| Error::InvalidResponse(format!("header '{name}': {e}")))?;
        headers.append(header_name, header_value);
    }

    let body = match descriptor.body {
        ResponseBody::Empty => Bytes::new(),
        ResponseBody::Text(text) => Bytes::from(text),
        ResponseBody::Bytes(bytes) => bytes,
        ResponseBody::Json(value) => {
            let encoded = serde_json::to_vec(&value)
                .map_err(|e| Error::InvalidResponse(format!("body is not serializable: {e}")))?;
            if config.send_as_json && !headers.contains_key(CONTENT_TYPE) {
                headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            }
            Bytes::from(encoded)
        }
    };

    if config.include_content_length && !headers.contains_key(CONTENT_LENGTH) {
        headers.insert(CONTENT_LENGTH, HeaderValue::from(body.len()));
    }

    let (url, redirected) = match descriptor.redirect_url {
        Some(url) => (url, true),
        None => (call.url().to_string(), false),
    };

    Ok(ResponseParts {
        status,
        headers,
        body,
        url,
        redirected,
    })
}
