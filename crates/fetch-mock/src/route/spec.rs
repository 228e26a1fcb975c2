//! Route declarations: what a caller registers before compilation.

use super::response::{Delay, ResponseDirective};
use crate::error::RouteConfigError;
use crate::request::CallRecord;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Predicate over a call record.
pub type MatchFn = Arc<dyn Fn(&CallRecord) -> bool + Send + Sync>;

/// A header or query value: one string or a list of strings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    pub fn values(&self) -> Vec<&str> {
        match self {
            OneOrMany::One(v) => vec![v.as_str()],
            OneOrMany::Many(vs) => vs.iter().map(String::as_str).collect(),
        }
    }
}

impl From<&str> for OneOrMany {
    fn from(value: &str) -> Self {
        OneOrMany::One(value.to_string())
    }
}

impl From<String> for OneOrMany {
    fn from(value: String) -> Self {
        OneOrMany::One(value)
    }
}

impl From<Vec<&str>> for OneOrMany {
    fn from(values: Vec<&str>) -> Self {
        OneOrMany::Many(values.into_iter().map(str::to_string).collect())
    }
}

impl From<Vec<String>> for OneOrMany {
    fn from(values: Vec<String>) -> Self {
        OneOrMany::Many(values)
    }
}

/// Where a url constraint comes from.
#[derive(Debug, Clone)]
pub enum UrlSource {
    /// String pattern, optionally prefixed (`begin:`, `end:`, `glob:`, `path:`, `express:`)
    Pattern(String),
    Regex(Regex),
    /// Exact match on the serialized URL
    Url(url::Url),
}

impl UrlSource {
    /// Human-readable form, used to derive route identifiers.
    pub fn describe(&self) -> String {
        match self {
            UrlSource::Pattern(p) => p.clone(),
            UrlSource::Regex(r) => r.as_str().to_string(),
            UrlSource::Url(u) => u.to_string(),
        }
    }
}

impl From<&str> for UrlSource {
    fn from(value: &str) -> Self {
        UrlSource::Pattern(value.to_string())
    }
}

impl From<String> for UrlSource {
    fn from(value: String) -> Self {
        UrlSource::Pattern(value)
    }
}

impl From<Regex> for UrlSource {
    fn from(value: Regex) -> Self {
        UrlSource::Regex(value)
    }
}

impl From<url::Url> for UrlSource {
    fn from(value: url::Url) -> Self {
        UrlSource::Url(value)
    }
}

/// Constraints and metadata for one route, all optional.
#[derive(Clone, Default)]
pub struct RouteOptions {
    pub name: Option<String>,
    pub url: Option<UrlSource>,
    pub method: Option<String>,
    pub headers: Vec<(String, OneOrMany)>,
    pub query: Vec<(String, OneOrMany)>,
    pub params: Vec<(String, String)>,
    pub body: Option<Value>,
    /// Overrides the instance-wide `match_partial_body` setting
    pub match_partial_body: Option<bool>,
    pub functions: Vec<MatchFn>,
    /// Values for matchers added with `define_matcher`, keyed by matcher name
    pub custom: BTreeMap<String, Value>,
    /// `None` means unlimited
    pub repeat: Option<usize>,
    /// Survives `remove_routes` unless sticky routes are included
    pub sticky: bool,
    pub delay: Option<Delay>,
}

impl fmt::Debug for RouteOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteOptions")
            .field("name", &self.name)
            .field("url", &self.url)
            .field("method", &self.method)
            .field("headers", &self.headers)
            .field("query", &self.query)
            .field("params", &self.params)
            .field("body", &self.body)
            .field("match_partial_body", &self.match_partial_body)
            .field("functions", &self.functions.len())
            .field("custom", &self.custom)
            .field("repeat", &self.repeat)
            .field("sticky", &self.sticky)
            .field("delay", &self.delay)
            .finish()
    }
}

impl RouteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn url(mut self, url: impl Into<UrlSource>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<OneOrMany>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<OneOrMany>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn match_partial_body(mut self, partial: bool) -> Self {
        self.match_partial_body = Some(partial);
        self
    }

    pub fn function<F>(mut self, f: F) -> Self
    where
        F: Fn(&CallRecord) -> bool + Send + Sync + 'static,
    {
        self.functions.push(Arc::new(f));
        self
    }

    pub fn custom(mut self, matcher: impl Into<String>, value: Value) -> Self {
        self.custom.insert(matcher.into(), value);
        self
    }

    pub fn repeat(mut self, times: usize) -> Self {
        self.repeat = Some(times);
        self
    }

    pub fn sticky(mut self, sticky: bool) -> Self {
        self.sticky = sticky;
        self
    }

    pub fn delay(mut self, delay: impl Into<Delay>) -> Self {
        self.delay = Some(delay.into());
        self
    }

    /// Whether any request constraint is declared.
    pub fn has_constraints(&self) -> bool {
        self.url.is_some()
            || self.method.is_some()
            || !self.headers.is_empty()
            || !self.query.is_empty()
            || !self.params.is_empty()
            || self.body.is_some()
            || !self.functions.is_empty()
            || !self.custom.is_empty()
    }

    /// Combine two declarations. Scalars declared on both sides conflict,
    /// list constraints accumulate.
    pub fn merge(mut self, other: RouteOptions) -> Result<Self, RouteConfigError> {
        fn take<T>(
            slot: &mut Option<T>,
            incoming: Option<T>,
            field: &'static str,
        ) -> Result<(), RouteConfigError> {
            match (slot.is_some(), incoming) {
                (true, Some(_)) => Err(RouteConfigError::Conflict(field)),
                (false, Some(value)) => {
                    *slot = Some(value);
                    Ok(())
                }
                (_, None) => Ok(()),
            }
        }

        take(&mut self.name, other.name, "name")?;
        take(&mut self.url, other.url, "url")?;
        take(&mut self.method, other.method, "method")?;
        take(&mut self.body, other.body, "body")?;
        take(
            &mut self.match_partial_body,
            other.match_partial_body,
            "match_partial_body",
        )?;
        take(&mut self.repeat, other.repeat, "repeat")?;
        take(&mut self.delay, other.delay, "delay")?;
        self.headers.extend(other.headers);
        self.query.extend(other.query);
        self.params.extend(other.params);
        self.functions.extend(other.functions);
        for (key, value) in other.custom {
            if self.custom.contains_key(&key) {
                return Err(RouteConfigError::Conflict("custom matcher"));
            }
            self.custom.insert(key, value);
        }
        self.sticky |= other.sticky;
        Ok(self)
    }
}

/// A bare string used as options is a route name.
impl From<&str> for RouteOptions {
    fn from(name: &str) -> Self {
        RouteOptions::new().name(name)
    }
}

impl From<String> for RouteOptions {
    fn from(name: String) -> Self {
        RouteOptions::new().name(name)
    }
}

/// First argument of `route`: what a call must look like.
#[derive(Clone)]
pub enum RouteMatcher {
    Url(UrlSource),
    Function(MatchFn),
    Options(RouteOptions),
    /// Matches every call
    Any,
}

impl fmt::Debug for RouteMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Url(u) => f.debug_tuple("Url").field(u).finish(),
            Self::Function(_) => f.write_str("Function(..)"),
            Self::Options(o) => f.debug_tuple("Options").field(o).finish(),
            Self::Any => f.write_str("Any"),
        }
    }
}

impl RouteMatcher {
    pub fn function<F>(f: F) -> Self
    where
        F: Fn(&CallRecord) -> bool + Send + Sync + 'static,
    {
        RouteMatcher::Function(Arc::new(f))
    }

    fn into_options(self) -> RouteOptions {
        match self {
            RouteMatcher::Url(url) => RouteOptions {
                url: Some(url),
                ..RouteOptions::default()
            },
            RouteMatcher::Function(f) => RouteOptions {
                functions: vec![f],
                ..RouteOptions::default()
            },
            RouteMatcher::Options(options) => options,
            RouteMatcher::Any => RouteOptions::default(),
        }
    }
}

impl From<&str> for RouteMatcher {
    fn from(value: &str) -> Self {
        RouteMatcher::Url(value.into())
    }
}

impl From<String> for RouteMatcher {
    fn from(value: String) -> Self {
        RouteMatcher::Url(value.into())
    }
}

impl From<Regex> for RouteMatcher {
    fn from(value: Regex) -> Self {
        RouteMatcher::Url(value.into())
    }
}

impl From<url::Url> for RouteMatcher {
    fn from(value: url::Url) -> Self {
        RouteMatcher::Url(value.into())
    }
}

impl From<RouteOptions> for RouteMatcher {
    fn from(value: RouteOptions) -> Self {
        RouteMatcher::Options(value)
    }
}

/// A full route declaration: constraints, metadata and response.
#[derive(Debug, Clone, Default)]
pub struct RouteSpec {
    pub options: RouteOptions,
    pub response: ResponseDirective,
}

impl RouteSpec {
    /// Merge a matcher, a response and extra options into one declaration.
    pub fn build(
        matcher: impl Into<RouteMatcher>,
        response: impl Into<ResponseDirective>,
        options: impl Into<RouteOptions>,
    ) -> Result<Self, RouteConfigError> {
        let options = matcher.into().into_options().merge(options.into())?;
        Ok(RouteSpec {
            options,
            response: response.into(),
        })
    }

    /// Name if given, else `METHOD pattern` derived from the constraints.
    pub fn identifier(&self) -> String {
        if let Some(name) = &self.options.name {
            return name.clone();
        }
        let method = self.options.method.as_deref().unwrap_or("*").to_uppercase();
        let url = self
            .options
            .url
            .as_ref()
            .map(UrlSource::describe)
            .unwrap_or_else(|| "*".to_string());
        format!("{method} {url}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_build_merges_matcher_and_options() {
        let spec = RouteSpec::build(
            "express:/users/:id",
            200,
            RouteOptions::new().method("get").name("user"),
        )
        .unwrap();
        assert!(matches!(
            spec.options.url,
            Some(UrlSource::Pattern(ref p)) if p == "express:/users/:id"
        ));
        assert_eq!(spec.options.method.as_deref(), Some("get"));
        assert_eq!(spec.identifier(), "user");
    }

    #[test]
    fn test_conflicting_declarations() {
        let err = RouteSpec::build("/a", 200, RouteOptions::new().url("/b")).unwrap_err();
        assert_eq!(err, RouteConfigError::Conflict("url"));

        let err = RouteSpec::build(
            RouteOptions::new().method("GET"),
            200,
            RouteOptions::new().method("POST"),
        )
        .unwrap_err();
        assert_eq!(err, RouteConfigError::Conflict("method"));

        let err = RouteSpec::build(
            RouteOptions::new().custom("tenant", json!("a")),
            200,
            RouteOptions::new().custom("tenant", json!("b")),
        )
        .unwrap_err();
        assert_eq!(err, RouteConfigError::Conflict("custom matcher"));
    }

    #[test]
    fn test_lists_accumulate() {
        let spec = RouteSpec::build(
            RouteOptions::new().header("x-a", "1"),
            200,
            RouteOptions::new().header("x-b", vec!["2", "3"]),
        )
        .unwrap();
        assert_eq!(spec.options.headers.len(), 2);
        assert_eq!(spec.options.headers[1].1.values(), vec!["2", "3"]);
    }

    #[test]
    fn test_derived_identifier() {
        let spec = RouteSpec::build("begin:http://a.com", 200, RouteOptions::new().method("post"))
            .unwrap();
        assert_eq!(spec.identifier(), "POST begin:http://a.com");

        let spec = RouteSpec::build(RouteMatcher::Any, 200, RouteOptions::new()).unwrap();
        assert_eq!(spec.identifier(), "* *");
        assert!(!spec.options.has_constraints());
    }
}
