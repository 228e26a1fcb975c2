//! Request bodies as passed by callers.

use bytes::Bytes;
use serde_json::Value;
use std::borrow::Cow;

/// Body of an intercepted call.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Text(String),
    Bytes(Bytes),
    /// Structured value; matchers see it as-is, without a serialize/parse round trip
    Json(Value),
}

impl RequestBody {
    /// Parse the body for body matchers: JSON first, then UTF-8 text.
    /// Binary payloads that are neither yield `None`.
    pub fn parse(&self) -> Option<Value> {
        match self {
            RequestBody::Json(value) => Some(value.clone()),
            RequestBody::Text(text) => {
                Some(serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.clone())))
            }
            RequestBody::Bytes(bytes) => serde_json::from_slice(bytes).ok().or_else(|| {
                std::str::from_utf8(bytes)
                    .ok()
                    .map(|s| Value::String(s.to_string()))
            }),
        }
    }

    /// Text view of the body; invalid UTF-8 is replaced.
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            RequestBody::Text(text) => Cow::Borrowed(text),
            RequestBody::Bytes(bytes) => String::from_utf8_lossy(bytes),
            RequestBody::Json(value) => Cow::Owned(value.to_string()),
        }
    }

    /// Wire bytes, used when a call is passed through to a real fetcher.
    pub fn to_bytes(&self) -> Bytes {
        match self {
            RequestBody::Text(text) => Bytes::from(text.clone()),
            RequestBody::Bytes(bytes) => bytes.clone(),
            RequestBody::Json(value) => Bytes::from(value.to_string()),
        }
    }
}

impl From<String> for RequestBody {
    fn from(value: String) -> Self {
        RequestBody::Text(value)
    }
}

impl From<&str> for RequestBody {
    fn from(value: &str) -> Self {
        RequestBody::Text(value.to_string())
    }
}

impl From<Bytes> for RequestBody {
    fn from(value: Bytes) -> Self {
        RequestBody::Bytes(value)
    }
}

impl From<Vec<u8>> for RequestBody {
    fn from(value: Vec<u8>) -> Self {
        RequestBody::Bytes(Bytes::from(value))
    }
}

impl From<Value> for RequestBody {
    fn from(value: Value) -> Self {
        RequestBody::Json(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_body_parses_as_json_when_possible() {
        let body = RequestBody::from(r#"{"a": [1, 2]}"#);
        assert_eq!(body.parse(), Some(json!({"a": [1, 2]})));

        let body = RequestBody::from("plain words");
        assert_eq!(body.parse(), Some(json!("plain words")));
    }

    #[test]
    fn test_binary_body_falls_back() {
        let body = RequestBody::from(vec![0xff, 0xfe, 0x00]);
        assert_eq!(body.parse(), None);
        assert_eq!(body.to_bytes().len(), 3);

        let body = RequestBody::from(b"[true]".to_vec());
        assert_eq!(body.parse(), Some(json!([true])));
    }

    #[test]
    fn test_json_body_text_view() {
        let body = RequestBody::from(json!({"k": "v"}));
        assert_eq!(body.as_text(), r#"{"k":"v"}"#);
    }
}
