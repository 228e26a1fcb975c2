//! Matchers for multi-valued request fields: headers and query parameters.

use super::matcher::CachedValue;
use crate::error::RouteConfigError;
use crate::request::CallRecord;
use crate::route::OneOrMany;
use hyper::header::HeaderName;

/// One declared header constraint.
#[derive(Debug, Clone)]
pub struct CompiledHeaderMatcher {
    name: HeaderName,
    /// Sorted expected values
    expected: Vec<String>,
}

impl CompiledHeaderMatcher {
    pub fn compile(name: &str, value: &OneOrMany) -> Result<Self, RouteConfigError> {
        let header_name =
            HeaderName::from_bytes(name.as_bytes()).map_err(|e| RouteConfigError::InvalidHeader {
                name: name.to_string(),
                reason: e.to_string(),
            })?;
        let mut expected: Vec<String> = value.values().into_iter().map(str::to_string).collect();
        expected.sort();
        Ok(Self {
            name: header_name,
            expected,
        })
    }

    /// Values are compared order-insensitively. A single comma-joined actual
    /// value is split when several values are expected.
    pub fn matches(&self, call: &CallRecord) -> bool {
        let mut actual: Vec<String> = call
            .headers()
            .get_all(&self.name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(str::to_string)
            .collect();
        if actual.is_empty() {
            return false;
        }
        if actual.len() == 1 && self.expected.len() > 1 {
            actual = actual[0].split(',').map(|v| v.trim().to_string()).collect();
        }
        if actual.len() > 1 && self.expected.len() == 1 {
            return actual.join(", ") == self.expected[0];
        }
        actual.sort();
        actual == self.expected
    }
}

/// One declared query constraint.
#[derive(Debug, Clone)]
pub struct CompiledQueryMatcher {
    key: String,
    expected: Vec<CachedValue>,
}

impl CompiledQueryMatcher {
    pub fn compile(key: &str, value: &OneOrMany) -> Self {
        Self {
            key: key.to_string(),
            expected: value.values().into_iter().map(CachedValue::from).collect(),
        }
    }

    /// Every expected value must be among the call's values for the key.
    /// Extra keys and extra values are ignored.
    pub fn matches(&self, pairs: &[(String, String)]) -> bool {
        let actual: Vec<&str> = pairs
            .iter()
            .filter(|(k, _)| *k == self.key)
            .map(|(_, v)| v.as_str())
            .collect();
        !actual.is_empty()
            && self
                .expected
                .iter()
                .all(|expected| actual.iter().any(|v| expected.equals(v, true)))
    }
}

/// Compile all header constraints of a route.
pub fn compile_header_matchers(
    headers: &[(String, OneOrMany)],
) -> Result<Vec<CompiledHeaderMatcher>, RouteConfigError> {
    headers
        .iter()
        .map(|(name, value)| CompiledHeaderMatcher::compile(name, value))
        .collect()
}

/// Compile all query constraints of a route.
pub fn compile_query_matchers(query: &[(String, OneOrMany)]) -> Vec<CompiledQueryMatcher> {
    query
        .iter()
        .map(|(key, value)| CompiledQueryMatcher::compile(key, value))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{normalize, RequestInit};

    fn call(url: &str, init: RequestInit) -> CallRecord {
        normalize(url.into(), init, None, false).unwrap()
    }

    #[test]
    fn test_header_names_are_case_insensitive() {
        let m = CompiledHeaderMatcher::compile("X-Api-Key", &"secret".into()).unwrap();
        assert!(m.matches(&call("/", RequestInit::new().header("x-api-key", "secret"))));
        assert!(!m.matches(&call("/", RequestInit::new().header("x-api-key", "Secret"))));
        assert!(!m.matches(&call("/", RequestInit::new())));
    }

    #[test]
    fn test_header_lists_are_order_insensitive() {
        let m = CompiledHeaderMatcher::compile("accept", &vec!["b", "a"].into()).unwrap();
        let repeated = RequestInit::new().header("accept", "a").header("accept", "b");
        assert!(m.matches(&call("/", repeated)));
        assert!(m.matches(&call("/", RequestInit::new().header("accept", "b, a"))));
        assert!(!m.matches(&call("/", RequestInit::new().header("accept", "a"))));
    }

    #[test]
    fn test_single_expected_value_against_repeated_header() {
        let m = CompiledHeaderMatcher::compile("x-tag", &"a, b".into()).unwrap();
        let repeated = RequestInit::new().header("x-tag", "a").header("x-tag", "b");
        assert!(m.matches(&call("/", repeated)));
    }

    #[test]
    fn test_invalid_header_name() {
        assert!(matches!(
            CompiledHeaderMatcher::compile("bad name", &"v".into()),
            Err(RouteConfigError::InvalidHeader { .. })
        ));
    }

    #[test]
    fn test_query_superset_match() {
        let m = CompiledQueryMatcher::compile("q", &"shoes".into());
        let pairs = call("/search?q=shoes&page=2", RequestInit::new()).query_pairs();
        assert!(m.matches(&pairs));

        let pairs = call("/search?page=2", RequestInit::new()).query_pairs();
        assert!(!m.matches(&pairs));
    }

    #[test]
    fn test_query_list_values_must_all_appear() {
        let m = CompiledQueryMatcher::compile("tag", &vec!["a", "b"].into());
        let pairs = call("/?tag=b&tag=c&tag=a", RequestInit::new()).query_pairs();
        assert!(m.matches(&pairs));
        let pairs = call("/?tag=a", RequestInit::new()).query_pairs();
        assert!(!m.matches(&pairs));
    }
}
