//! Url pattern matching.
//!
//! Pattern forms:
//! - `*` matches every url
//! - `^X` / `begin:X` prefix, `end:X` suffix, `glob:X` shell glob, all on the full url
//! - `path:X` equality on the url path
//! - `express:/a/:b` path template with named params
//! - anything else is an exact match on the normalized url

use super::matcher::StringMatchCore;
use crate::error::RouteConfigError;
use crate::request::{normalize_url, CallRecord, UrlKind};
use crate::route::UrlSource;
use matchit::Router;
use std::sync::Arc;
use url::Url;

/// Compiled url constraint.
#[derive(Debug, Clone)]
pub enum UrlMatcher {
    Any,
    /// Operation on the full normalized url
    Href(StringMatchCore),
    /// Equality on the path only
    Path(String),
    /// Path-only pattern, compared with the call's path and query
    Relative(String),
    /// `//host/path`, also matching the same location over http and https
    ProtocolRelative(String),
    Express(Arc<ExpressPattern>),
}

impl UrlMatcher {
    pub fn compile(source: &UrlSource, base: Option<&Url>) -> Result<Self, RouteConfigError> {
        match source {
            UrlSource::Regex(regex) => Ok(UrlMatcher::Href(StringMatchCore::Regex(Arc::new(
                regex.clone(),
            )))),
            UrlSource::Url(url) => Ok(UrlMatcher::Href(StringMatchCore::equals(
                exact(url.as_str(), base)?,
            ))),
            UrlSource::Pattern(pattern) => Self::compile_pattern(pattern, base),
        }
    }

    fn compile_pattern(pattern: &str, base: Option<&Url>) -> Result<Self, RouteConfigError> {
        let invalid = |reason: String| RouteConfigError::InvalidUrlPattern {
            pattern: pattern.to_string(),
            reason,
        };

        if pattern == "*" {
            return Ok(UrlMatcher::Any);
        }
        if let Some(prefix) = pattern
            .strip_prefix("begin:")
            .or_else(|| pattern.strip_prefix('^'))
        {
            return Ok(UrlMatcher::Href(StringMatchCore::starts_with(prefix)));
        }
        if let Some(suffix) = pattern.strip_prefix("end:") {
            return Ok(UrlMatcher::Href(StringMatchCore::ends_with(suffix)));
        }
        if let Some(glob) = pattern.strip_prefix("glob:") {
            return StringMatchCore::glob(glob)
                .map(UrlMatcher::Href)
                .map_err(|e| invalid(e.to_string()));
        }
        if let Some(path) = pattern.strip_prefix("path:") {
            if path.is_empty() {
                return Err(invalid("path must not be empty".to_string()));
            }
            return Ok(UrlMatcher::Path(path.to_string()));
        }
        if let Some(template) = pattern.strip_prefix("express:") {
            return ExpressPattern::compile(template)
                .map(|p| UrlMatcher::Express(Arc::new(p)))
                .map_err(invalid);
        }

        let normalized = normalize_url(pattern, base).map_err(|e| invalid(e.to_string()))?;
        Ok(match normalized.kind {
            UrlKind::Absolute => UrlMatcher::Href(StringMatchCore::equals(normalized.href)),
            UrlKind::ProtocolRelative => UrlMatcher::ProtocolRelative(normalized.href),
            UrlKind::Relative => UrlMatcher::Relative(normalized.href),
        })
    }

    pub fn matches(&self, call: &CallRecord) -> bool {
        match self {
            UrlMatcher::Any => true,
            UrlMatcher::Href(core) => core.matches(call.url(), true),
            UrlMatcher::Path(path) => call.path() == path,
            UrlMatcher::Relative(expected) => {
                call.normalized_url().path_and_query() == *expected
            }
            UrlMatcher::ProtocolRelative(expected) => {
                let href = call.url();
                href == expected
                    || href
                        .strip_prefix("http:")
                        .or_else(|| href.strip_prefix("https:"))
                        .is_some_and(|rest| rest == expected)
            }
            UrlMatcher::Express(pattern) => pattern.params(call.path()).is_some(),
        }
    }

    pub fn express(&self) -> Option<&Arc<ExpressPattern>> {
        match self {
            UrlMatcher::Express(pattern) => Some(pattern),
            _ => None,
        }
    }
}

fn exact(raw: &str, base: Option<&Url>) -> Result<String, RouteConfigError> {
    normalize_url(raw, base)
        .map(|n| n.href)
        .map_err(|e| RouteConfigError::InvalidUrlPattern {
            pattern: raw.to_string(),
            reason: e.to_string(),
        })
}

/// An `express:` path template compiled into a radix router.
pub struct ExpressPattern {
    source: String,
    router: Router<()>,
}

impl std::fmt::Debug for ExpressPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ExpressPattern").field(&self.source).finish()
    }
}

impl ExpressPattern {
    /// Compile `/users/:id/*` style templates. A trailing `*` captures the
    /// rest of the path as `wildcard`.
    pub fn compile(template: &str) -> Result<Self, String> {
        if !template.starts_with('/') {
            return Err("express templates must start with '/'".to_string());
        }
        let route = to_router_syntax(template)?;
        let mut router = Router::new();
        router
            .insert(route, ())
            .map_err(|e| format!("cannot compile template: {e}"))?;
        Ok(Self {
            source: template.to_string(),
            router,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Captured params for `path`, percent-decoded, or `None` when it does
    /// not match. A trailing slash on the path is tolerated.
    pub fn params(&self, path: &str) -> Option<Vec<(String, String)>> {
        let matched = self.router.at(path).ok().or_else(|| {
            path.strip_suffix('/')
                .filter(|p| !p.is_empty())
                .and_then(|p| self.router.at(p).ok())
        })?;
        Some(
            matched
                .params
                .iter()
                .map(|(key, value)| {
                    let decoded = urlencoding::decode(value)
                        .map(|v| v.into_owned())
                        .unwrap_or_else(|_| value.to_string());
                    (key.to_string(), decoded)
                })
                .collect(),
        )
    }
}

/// Rewrite `:name` params as `{name}` and a trailing `*` as `{*wildcard}`.
fn to_router_syntax(template: &str) -> Result<String, String> {
    let mut out = String::with_capacity(template.len() + 8);
    let mut chars = template.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            ':' => {
                let mut name = String::new();
                while let Some(&next) = chars.peek() {
                    if next.is_ascii_alphanumeric() || next == '_' {
                        name.push(next);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if name.is_empty() {
                    return Err("parameter name missing after ':'".to_string());
                }
                out.push('{');
                out.push_str(&name);
                out.push('}');
            }
            '*' if chars.peek().is_none() && out.ends_with('/') => out.push_str("{*wildcard}"),
            '*' => return Err("'*' is only supported as the final path segment".to_string()),
            '{' => out.push_str("{{"),
            '}' => out.push_str("}}"),
            other => out.push(other),
        }
    }
    Ok(out)
}
