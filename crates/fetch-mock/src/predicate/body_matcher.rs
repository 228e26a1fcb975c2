//! Body matching against the parsed request body.

use crate::request::CallRecord;
use serde_json::Value;

/// Compiled body constraint.
#[derive(Debug, Clone)]
pub struct CompiledBodyMatcher {
    expected: Value,
    partial: bool,
}

impl CompiledBodyMatcher {
    pub fn new(expected: Value, partial: bool) -> Self {
        Self { expected, partial }
    }

    /// `GET`/`HEAD` calls and calls without a body never match.
    pub fn matches(&self, call: &CallRecord) -> bool {
        if matches!(call.method(), "GET" | "HEAD") {
            return false;
        }
        let Some(actual) = call.parsed_body() else {
            return false;
        };
        if self.partial {
            json_contains(actual, &self.expected)
        } else {
            json_equals(actual, &self.expected)
        }
    }
}

/// Structural equality where numbers compare by value (`1` equals `1.0`).
pub fn json_equals(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Number(a), Value::Number(e)) => match (a.as_f64(), e.as_f64()) {
            (Some(a), Some(e)) => a == e,
            _ => a == e,
        },
        (Value::Array(a), Value::Array(e)) => {
            a.len() == e.len() && a.iter().zip(e).all(|(a, e)| json_equals(a, e))
        }
        (Value::Object(a), Value::Object(e)) => {
            a.len() == e.len()
                && e.iter()
                    .all(|(k, ev)| a.get(k).is_some_and(|av| json_equals(av, ev)))
        }
        _ => actual == expected,
    }
}

/// Recursive subset check. Objects may carry extra keys; arrays must contain
/// the expected elements as an ordered subsequence.
pub fn json_contains(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Object(a), Value::Object(e)) => e
            .iter()
            .all(|(k, ev)| a.get(k).is_some_and(|av| json_contains(av, ev))),
        (Value::Array(a), Value::Array(e)) => {
            let mut remaining = a.iter();
            e.iter()
                .all(|ev| remaining.any(|av| json_contains(av, ev)))
        }
        _ => json_equals(actual, expected),
    }
}
