//! Matcher library: turns declared route constraints into predicates.
//!
//! Each constraint kind is a [`MatcherDefinition`]. The [`MatcherRegistry`]
//! holds the built-ins in evaluation order (url, method, headers, query,
//! params, body, functions) followed by kinds added at runtime. Compiling a
//! route runs every definition and ANDs the predicates that apply.
//!
//! # Module Structure
//!
//! - `matcher` - String helpers (CachedValue, StringMatchCore)
//! - `url_matcher` - Url patterns and express templates
//! - `field_matcher` - Header and query constraints
//! - `body_matcher` - Exact and partial body matching

mod body_matcher;
mod field_matcher;
mod matcher;
mod url_matcher;

pub use body_matcher::{json_contains, json_equals, CompiledBodyMatcher};
pub use field_matcher::{
    compile_header_matchers, compile_query_matchers, CompiledHeaderMatcher, CompiledQueryMatcher,
};
pub use matcher::{CachedValue, StringMatchCore};
pub use url_matcher::{ExpressPattern, UrlMatcher};

use crate::error::RouteConfigError;
use crate::request::CallRecord;
use crate::route::{MatchFn, RouteOptions};
use hyper::Method;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::trace;
use url::Url;

/// Instance settings that influence how constraints compile.
#[derive(Debug, Clone, Default)]
pub struct MatchContext {
    pub base_url: Option<Url>,
    pub match_partial_body: bool,
}

/// Compiles one constraint kind; `Ok(None)` when the route does not declare it.
pub type CompileFn = Arc<
    dyn Fn(&RouteOptions, &MatchContext) -> Result<Option<MatchFn>, RouteConfigError>
        + Send
        + Sync,
>;

/// A named constraint kind.
#[derive(Clone)]
pub struct MatcherDefinition {
    name: String,
    uses_body: bool,
    builtin: bool,
    compile: CompileFn,
}

impl fmt::Debug for MatcherDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MatcherDefinition")
            .field("name", &self.name)
            .field("uses_body", &self.uses_body)
            .finish()
    }
}

impl MatcherDefinition {
    fn builtin<F>(name: &str, uses_body: bool, compile: F) -> Self
    where
        F: Fn(&RouteOptions, &MatchContext) -> Result<Option<MatchFn>, RouteConfigError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.to_string(),
            uses_body,
            builtin: true,
            compile: Arc::new(compile),
        }
    }

    /// A runtime-defined matcher. Routes opt in by setting
    /// `RouteOptions::custom(name, value)`; `build` turns that value into a
    /// predicate or explains why it cannot.
    pub fn custom<F>(name: impl Into<String>, uses_body: bool, build: F) -> Self
    where
        F: Fn(&Value) -> Result<MatchFn, String> + Send + Sync + 'static,
    {
        let name = name.into();
        let key = name.clone();
        Self {
            name,
            uses_body,
            builtin: false,
            compile: Arc::new(move |options: &RouteOptions, _: &MatchContext| {
                options
                    .custom
                    .get(&key)
                    .map(|value| {
                        build(value).map_err(|reason| RouteConfigError::InvalidMatcherValue {
                            name: key.clone(),
                            reason,
                        })
                    })
                    .transpose()
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn uses_body(&self) -> bool {
        self.uses_body
    }
}

/// Ordered set of matcher kinds.
#[derive(Debug, Clone)]
pub struct MatcherRegistry {
    definitions: Vec<MatcherDefinition>,
}

impl Default for MatcherRegistry {
    fn default() -> Self {
        Self {
            definitions: builtin_definitions(),
        }
    }
}

impl MatcherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a matcher kind. Names must be unique, built-ins included.
    pub fn define(&mut self, definition: MatcherDefinition) -> Result<(), RouteConfigError> {
        if self.definitions.iter().any(|d| d.name == definition.name) {
            return Err(RouteConfigError::DuplicateMatcher(definition.name));
        }
        self.definitions.push(definition);
        Ok(())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.definitions.iter().map(|d| d.name.as_str())
    }

    /// Compile every declared constraint of `options` into one conjunction.
    pub fn compile(
        &self,
        options: &RouteOptions,
        context: &MatchContext,
    ) -> Result<CompiledMatcher, RouteConfigError> {
        for key in options.custom.keys() {
            if !self.definitions.iter().any(|d| !d.builtin && d.name == *key) {
                return Err(RouteConfigError::UnknownMatcher(key.clone()));
            }
        }

        let mut predicates = Vec::new();
        let mut uses_body = false;
        for definition in &self.definitions {
            if let Some(predicate) = (definition.compile)(options, context)? {
                uses_body |= definition.uses_body;
                predicates.push((definition.name.clone(), predicate));
            }
        }
        Ok(CompiledMatcher {
            predicates,
            uses_body,
        })
    }
}

/// Conjunction of compiled predicates. Empty matches every call.
#[derive(Clone)]
pub struct CompiledMatcher {
    predicates: Vec<(String, MatchFn)>,
    uses_body: bool,
}

impl fmt::Debug for CompiledMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledMatcher")
            .field(
                "predicates",
                &self.predicates.iter().map(|(n, _)| n).collect::<Vec<_>>(),
            )
            .field("uses_body", &self.uses_body)
            .finish()
    }
}

impl CompiledMatcher {
    pub fn matches(&self, call: &CallRecord) -> bool {
        for (name, predicate) in &self.predicates {
            if !predicate(call) {
                trace!(matcher = %name, url = %call.url(), "constraint rejected call");
                return false;
            }
        }
        true
    }

    /// Whether any applied constraint reads the request body.
    pub fn uses_body(&self) -> bool {
        self.uses_body
    }
}

/// Express pattern of a route, if its url is an `express:` template.
pub fn express_pattern(
    options: &RouteOptions,
    context: &MatchContext,
) -> Result<Option<Arc<ExpressPattern>>, RouteConfigError> {
    match &options.url {
        Some(source) => Ok(UrlMatcher::compile(source, context.base_url.as_ref())?
            .express()
            .cloned()),
        None => Ok(None),
    }
}

fn builtin_definitions() -> Vec<MatcherDefinition> {
    vec![
        MatcherDefinition::builtin("url", false, |options, context| {
            let Some(source) = &options.url else {
                return Ok(None);
            };
            let matcher = UrlMatcher::compile(source, context.base_url.as_ref())?;
            if matches!(matcher, UrlMatcher::Any) {
                return Ok(None);
            }
            Ok(Some(Arc::new(move |call: &CallRecord| matcher.matches(call)) as MatchFn))
        }),
        MatcherDefinition::builtin("method", false, |options, _| {
            let Some(method) = &options.method else {
                return Ok(None);
            };
            let parsed = Method::from_bytes(method.to_uppercase().as_bytes())
                .map_err(|_| RouteConfigError::InvalidMethod(method.clone()))?;
            let expected = CachedValue::new(parsed.as_str());
            Ok(Some(
                Arc::new(move |call: &CallRecord| expected.equals(call.method(), false)) as MatchFn,
            ))
        }),
        MatcherDefinition::builtin("headers", false, |options, _| {
            if options.headers.is_empty() {
                return Ok(None);
            }
            let matchers = compile_header_matchers(&options.headers)?;
            Ok(Some(Arc::new(move |call: &CallRecord| {
                matchers.iter().all(|m| m.matches(call))
            }) as MatchFn))
        }),
        MatcherDefinition::builtin("query", false, |options, _| {
            if options.query.is_empty() {
                return Ok(None);
            }
            let matchers = compile_query_matchers(&options.query);
            Ok(Some(Arc::new(move |call: &CallRecord| {
                let pairs = call.query_pairs();
                matchers.iter().all(|m| m.matches(&pairs))
            }) as MatchFn))
        }),
        MatcherDefinition::builtin("params", false, |options, context| {
            if options.params.is_empty() {
                return Ok(None);
            }
            let express =
                express_pattern(options, context)?.ok_or(RouteConfigError::ParamsWithoutExpress)?;
            let expected = options.params.clone();
            Ok(Some(Arc::new(move |call: &CallRecord| {
                let Some(captured) = express.params(call.path()) else {
                    return false;
                };
                expected
                    .iter()
                    .all(|(key, value)| captured.iter().any(|(k, v)| k == key && v == value))
            }) as MatchFn))
        }),
        MatcherDefinition::builtin("body", true, |options, context| {
            let Some(body) = &options.body else {
                return Ok(None);
            };
            let partial = options
                .match_partial_body
                .unwrap_or(context.match_partial_body);
            let matcher = CompiledBodyMatcher::new(body.clone(), partial);
            Ok(Some(Arc::new(move |call: &CallRecord| matcher.matches(call)) as MatchFn))
        }),
        MatcherDefinition::builtin("functions", false, |options, _| {
            if options.functions.is_empty() {
                return Ok(None);
            }
            let functions = options.functions.clone();
            Ok(Some(Arc::new(move |call: &CallRecord| {
                functions.iter().all(|f| f(call))
            }) as MatchFn))
        }),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{normalize, RequestInit};
    use serde_json::json;

    fn call(url: &str, init: RequestInit) -> CallRecord {
        normalize(url.into(), init, None, true).unwrap()
    }

    fn compile(options: RouteOptions) -> CompiledMatcher {
        MatcherRegistry::new()
            .compile(&options, &MatchContext::default())
            .unwrap()
    }

    #[test]
    fn test_builtin_order() {
        let names: Vec<_> = MatcherRegistry::new().names().map(str::to_string).collect();
        assert_eq!(
            names,
            vec!["url", "method", "headers", "query", "params", "body", "functions"]
        );
    }

    #[test]
    fn test_no_constraints_match_everything() {
        let m = compile(RouteOptions::new());
        assert!(m.matches(&call("http://a.com/anything", RequestInit::new())));
        assert!(!m.uses_body());
    }

    #[test]
    fn test_constraints_are_anded() {
        let m = compile(
            RouteOptions::new()
                .url("begin:http://a.com")
                .method("post")
                .header("x-k", "v")
                .query("q", "1")
                .function(|c| c.path() != "/blocked"),
        );
        let init = || RequestInit::new().method("POST").header("x-k", "v");
        assert!(m.matches(&call("http://a.com/ok?q=1", init())));
        assert!(!m.matches(&call("http://a.com/ok?q=2", init())));
        assert!(!m.matches(&call("http://a.com/blocked?q=1", init())));
        assert!(!m.matches(&call("http://a.com/ok?q=1", RequestInit::new().header("x-k", "v"))));
    }

    #[test]
    fn test_method_is_case_insensitive() {
        let m = compile(RouteOptions::new().method("Delete"));
        assert!(m.matches(&call("/x", RequestInit::new().method("delete"))));
    }

    #[test]
    fn test_params_require_express() {
        let err = MatcherRegistry::new()
            .compile(
                &RouteOptions::new().url("/a").param("id", "1"),
                &MatchContext::default(),
            )
            .unwrap_err();
        assert_eq!(err, RouteConfigError::ParamsWithoutExpress);

        let m = compile(
            RouteOptions::new()
                .url("express:/type/:instance")
                .param("instance", "shoe"),
        );
        assert!(m.matches(&call("/type/shoe", RequestInit::new())));
        assert!(!m.matches(&call("/type/hat", RequestInit::new())));
    }

    #[test]
    fn test_body_partial_option_overrides_context() {
        let registry = MatcherRegistry::new();
        let partial = MatchContext {
            match_partial_body: true,
            ..MatchContext::default()
        };
        let body = || RequestInit::new().method("POST").body(r#"{"a":1,"b":2}"#);

        let m = registry
            .compile(&RouteOptions::new().body(json!({"a": 1})), &partial)
            .unwrap();
        assert!(m.uses_body());
        assert!(m.matches(&call("/", body())));

        let m = registry
            .compile(
                &RouteOptions::new()
                    .body(json!({"a": 1}))
                    .match_partial_body(false),
                &partial,
            )
            .unwrap();
        assert!(!m.matches(&call("/", body())));
    }

    #[test]
    fn test_invalid_method() {
        let err = MatcherRegistry::new()
            .compile(&RouteOptions::new().method("NOT A METHOD"), &MatchContext::default())
            .unwrap_err();
        assert!(matches!(err, RouteConfigError::InvalidMethod(_)));
    }

    #[test]
    fn test_custom_matchers() {
        let mut registry = MatcherRegistry::new();
        registry
            .define(MatcherDefinition::custom("tenant", false, |value| {
                let tenant = value
                    .as_str()
                    .ok_or_else(|| "expected a string".to_string())?
                    .to_string();
                Ok(Arc::new(move |call: &CallRecord| {
                    call.header("x-tenant") == Some(tenant.as_str())
                }) as MatchFn)
            }))
            .unwrap();

        let m = registry
            .compile(
                &RouteOptions::new().custom("tenant", json!("acme")),
                &MatchContext::default(),
            )
            .unwrap();
        assert!(m.matches(&call("/", RequestInit::new().header("x-tenant", "acme"))));
        assert!(!m.matches(&call("/", RequestInit::new().header("x-tenant", "other"))));

        let err = registry
            .compile(
                &RouteOptions::new().custom("tenant", json!(3)),
                &MatchContext::default(),
            )
            .unwrap_err();
        assert!(matches!(err, RouteConfigError::InvalidMatcherValue { .. }));

        let err = registry
            .compile(
                &RouteOptions::new().custom("region", json!("eu")),
                &MatchContext::default(),
            )
            .unwrap_err();
        assert_eq!(err, RouteConfigError::UnknownMatcher("region".to_string()));

        let err = registry
            .define(MatcherDefinition::custom("url", false, |_| {
                Err("unused".to_string())
            }))
            .unwrap_err();
        assert_eq!(err, RouteConfigError::DuplicateMatcher("url".to_string()));
    }
}
