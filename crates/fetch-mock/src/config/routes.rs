//! Routes files: declarative route sets in YAML or JSON.
//!
//! ```yaml
//! config:
//!   warnOnFallback: false
//! routes:
//!   - name: user
//!     url: "express:/users/:id"
//!     method: GET
//!     response:
//!       status: 200
//!       body: { id: 1 }
//! fallback: 404
//! ```

use super::FetchMockConfig;
use crate::route::{Delay, OneOrMany, ResponseDirective, RouteOptions, RouteSpec, UrlSource};
use anyhow::Context;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

/// Serialization format of a routes file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutesFormat {
    Yaml,
    Json,
}

impl RoutesFormat {
    /// Pick the format from a file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()?.to_ascii_lowercase().as_str() {
            "yaml" | "yml" => Some(RoutesFormat::Yaml),
            "json" => Some(RoutesFormat::Json),
            _ => None,
        }
    }
}

/// A whole routes file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutesFile {
    #[serde(default)]
    pub config: FetchMockConfig,
    #[serde(default)]
    pub routes: Vec<RouteDefinition>,
    #[serde(default)]
    pub fallback: Option<ResponseDirective>,
}

impl RoutesFile {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let path = path.as_ref();
        let format = RoutesFormat::from_path(path).with_context(|| {
            format!(
                "cannot tell the format of {}: expected a .yaml, .yml or .json extension",
                path.display()
            )
        })?;
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read routes file {}", path.display()))?;
        let file = Self::parse(&contents, format)
            .with_context(|| format!("invalid routes file {}", path.display()))?;
        info!(
            path = %path.display(),
            routes = file.routes.len(),
            fallback = file.fallback.is_some(),
            "loaded routes file"
        );
        Ok(file)
    }

    pub fn parse(contents: &str, format: RoutesFormat) -> Result<Self, anyhow::Error> {
        let file: RoutesFile = match format {
            RoutesFormat::Yaml => serde_yaml::from_str(contents)?,
            RoutesFormat::Json => serde_json::from_str(contents)?,
        };
        file.validate()?;
        Ok(file)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        self.config.validate()
    }
}

/// One route as written in a routes file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RouteDefinition {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, OneOrMany>,
    #[serde(default)]
    pub query: BTreeMap<String, OneOrMany>,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Option<Value>,
    #[serde(default)]
    pub match_partial_body: Option<bool>,
    /// Values for runtime-defined matchers, keyed by matcher name
    #[serde(default)]
    pub matchers: BTreeMap<String, Value>,
    #[serde(default)]
    pub repeat: Option<usize>,
    #[serde(default)]
    pub sticky: bool,
    #[serde(default)]
    pub delay: Option<Delay>,
    #[serde(default)]
    pub response: ResponseDirective,
}

impl RouteDefinition {
    pub fn into_spec(self) -> RouteSpec {
        let options = RouteOptions {
            name: self.name,
            url: self.url.map(UrlSource::Pattern),
            method: self.method,
            headers: self.headers.into_iter().collect(),
            query: self.query.into_iter().collect(),
            params: self.params.into_iter().collect(),
            body: self.body,
            match_partial_body: self.match_partial_body,
            functions: Vec::new(),
            custom: self.matchers,
            repeat: self.repeat,
            sticky: self.sticky,
            delay: self.delay,
        };
        RouteSpec {
            options,
            response: self.response,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::ResponseBody;
    use serde_json::json;
    use std::io::Write;

    const YAML: &str = r#"
config:
  warnOnFallback: false
routes:
  - name: user
    url: "express:/users/:id"
    method: get
    response:
      status: 200
      body: { id: 1 }
  - url: "begin:http://a.com/search"
    query:
      q: shoes
    headers:
      accept: [application/json, text/plain]
    repeat: 2
    delay: { min: 5, max: 10 }
    response: "found"
fallback: 404
"#;

    #[test]
    fn test_parse_yaml_routes_file() {
        let file = RoutesFile::parse(YAML, RoutesFormat::Yaml).unwrap();
        assert!(!file.config.warn_on_fallback);
        assert_eq!(file.routes.len(), 2);
        assert!(matches!(file.fallback, Some(ResponseDirective::Status(404))));

        let spec = file.routes[0].clone().into_spec();
        assert_eq!(spec.identifier(), "user");
        match spec.response {
            ResponseDirective::Descriptor(d) => {
                assert_eq!(d.status, Some(200));
                assert_eq!(d.body, ResponseBody::Json(json!({"id": 1})));
            }
            other => panic!("expected descriptor, got {other:?}"),
        }

        let spec = file.routes[1].clone().into_spec();
        assert_eq!(spec.options.repeat, Some(2));
        assert_eq!(spec.options.delay, Some(Delay::Range { min: 5, max: 10 }));
        assert_eq!(
            spec.options.headers[0].1,
            OneOrMany::Many(vec!["application/json".to_string(), "text/plain".to_string()])
        );
        assert!(matches!(spec.response, ResponseDirective::Text(ref t) if t == "found"));
    }

    #[test]
    fn test_unknown_route_keys_are_rejected() {
        let err = RoutesFile::parse(r#"{"routes": [{"uri": "/x"}]}"#, RoutesFormat::Json)
            .unwrap_err();
        assert!(err.to_string().contains("uri"));
    }

    #[test]
    fn test_zero_repeat_is_accepted() {
        let file =
            RoutesFile::parse("routes:\n  - url: /x\n    repeat: 0\n", RoutesFormat::Yaml).unwrap();
        let spec = file.routes[0].clone().into_spec();
        assert_eq!(spec.options.repeat, Some(0));
    }

    #[test]
    fn test_from_file_picks_format_by_extension() {
        let mut json_file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            json_file,
            r#"{{"routes": [{{"url": "/ping", "response": "pong"}}]}}"#
        )
        .unwrap();
        let file = RoutesFile::from_file(json_file.path()).unwrap();
        assert_eq!(file.routes[0].url.as_deref(), Some("/ping"));

        let txt = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
        let err = RoutesFile::from_file(txt.path()).unwrap_err();
        assert!(err.to_string().contains("cannot tell the format"));
    }
}
