//! Route registration, removal and reset.

use super::{FetchMock, RouteTable, Shared};
use crate::config::RoutesFile;
use crate::error::{Result, RouteConfigError};
use crate::predicate::MatcherDefinition;
use crate::route::{ResponseDirective, Route, RouteMatcher, RouteOptions, RouteSpec};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Which routes `remove_routes` drops.
#[derive(Debug, Clone)]
pub struct RemoveRoutesOptions {
    /// Only routes with these names; `None` means every route
    pub names: Option<Vec<String>>,
    /// Sticky routes are kept unless this is set
    pub include_sticky: bool,
    pub include_fallback: bool,
}

impl Default for RemoveRoutesOptions {
    fn default() -> Self {
        Self {
            names: None,
            include_sticky: false,
            include_fallback: true,
        }
    }
}

impl RemoveRoutesOptions {
    pub fn names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: Some(names.into_iter().map(Into::into).collect()),
            include_fallback: false,
            ..Self::default()
        }
    }

    pub fn include_sticky(mut self, include: bool) -> Self {
        self.include_sticky = include;
        self
    }

    pub fn include_fallback(mut self, include: bool) -> Self {
        self.include_fallback = include;
        self
    }
}

impl Shared {
    fn compile(&self, spec: RouteSpec) -> Result<Route, RouteConfigError> {
        let context = self.config.read().match_context();
        let registry = self.registry.read();
        Route::new(spec, &registry, &context)
    }

    fn insert(&self, route: Route) -> Result<(), RouteConfigError> {
        let overwrite = self.config.read().overwrite_routes;
        let route = Arc::new(route);
        let mut table = self.routes.write();
        if let Some(name) = route.name() {
            if let Some(index) = table.routes.iter().position(|r| r.name() == Some(name)) {
                match overwrite {
                    None => return Err(RouteConfigError::DuplicateName(name.to_string())),
                    Some(true) => {
                        warn!(route = %name, "replacing existing route with the same name");
                        table.routes[index] = route;
                        return Ok(());
                    }
                    Some(false) => {
                        warn!(
                            route = %name,
                            "adding route behind an existing one with the same name"
                        );
                    }
                }
            }
        }
        debug!(route = %route.identifier(), position = table.routes.len(), "registered route");
        table.routes.push(route);
        Ok(())
    }
}

impl FetchMock {
    /// Register a fully built declaration.
    pub fn add_route(&self, spec: RouteSpec) -> Result<&Self> {
        let route = self.shared.compile(spec)?;
        self.shared.insert(route)?;
        Ok(self)
    }

    pub fn route(
        &self,
        matcher: impl Into<RouteMatcher>,
        response: impl Into<ResponseDirective>,
    ) -> Result<&Self> {
        self.route_with(matcher, response, RouteOptions::new())
    }

    /// Register a route with extra options (a `&str` here names the route).
    pub fn route_with(
        &self,
        matcher: impl Into<RouteMatcher>,
        response: impl Into<ResponseDirective>,
        options: impl Into<RouteOptions>,
    ) -> Result<&Self> {
        self.add_route(RouteSpec::build(matcher, response, options)?)
    }

    fn route_method(
        &self,
        method: &str,
        matcher: impl Into<RouteMatcher>,
        response: impl Into<ResponseDirective>,
    ) -> Result<&Self> {
        self.route_with(matcher, response, RouteOptions::new().method(method))
    }

    pub fn get(
        &self,
        matcher: impl Into<RouteMatcher>,
        response: impl Into<ResponseDirective>,
    ) -> Result<&Self> {
        self.route_method("GET", matcher, response)
    }

    pub fn post(
        &self,
        matcher: impl Into<RouteMatcher>,
        response: impl Into<ResponseDirective>,
    ) -> Result<&Self> {
        self.route_method("POST", matcher, response)
    }

    pub fn put(
        &self,
        matcher: impl Into<RouteMatcher>,
        response: impl Into<ResponseDirective>,
    ) -> Result<&Self> {
        self.route_method("PUT", matcher, response)
    }

    pub fn delete(
        &self,
        matcher: impl Into<RouteMatcher>,
        response: impl Into<ResponseDirective>,
    ) -> Result<&Self> {
        self.route_method("DELETE", matcher, response)
    }

    pub fn head(
        &self,
        matcher: impl Into<RouteMatcher>,
        response: impl Into<ResponseDirective>,
    ) -> Result<&Self> {
        self.route_method("HEAD", matcher, response)
    }

    pub fn patch(
        &self,
        matcher: impl Into<RouteMatcher>,
        response: impl Into<ResponseDirective>,
    ) -> Result<&Self> {
        self.route_method("PATCH", matcher, response)
    }

    /// Route that matches a single call.
    pub fn once(
        &self,
        matcher: impl Into<RouteMatcher>,
        response: impl Into<ResponseDirective>,
    ) -> Result<&Self> {
        self.route_with(matcher, response, RouteOptions::new().repeat(1))
    }

    /// Route that matches every call.
    pub fn any(&self, response: impl Into<ResponseDirective>) -> Result<&Self> {
        self.route(RouteMatcher::Any, response)
    }

    /// Route kept by `remove_routes` and `reset_behavior`.
    pub fn sticky(
        &self,
        matcher: impl Into<RouteMatcher>,
        response: impl Into<ResponseDirective>,
    ) -> Result<&Self> {
        self.route_with(matcher, response, RouteOptions::new().sticky(true))
    }

    /// Serve calls no ordinary route matched. Replaces any previous fallback.
    pub fn fallback(&self, response: impl Into<ResponseDirective>) -> Result<&Self> {
        let spec = RouteSpec::build(RouteMatcher::Any, response, RouteOptions::new())?;
        let route = Arc::new(self.shared.compile(spec)?);
        self.shared.routes.write().fallback = Some(route);
        Ok(self)
    }

    /// Hand unmatched calls to the real fetcher.
    pub fn pass_through(&self) -> &Self {
        self.shared.config.write().fallback_to_network = true;
        self
    }

    /// Add a matcher kind routes can opt into through `RouteOptions::custom`.
    pub fn define_matcher(&self, definition: MatcherDefinition) -> Result<&Self> {
        self.shared.registry.write().define(definition)?;
        Ok(self)
    }

    pub fn remove_routes(&self, options: RemoveRoutesOptions) -> &Self {
        let mut table = self.shared.routes.write();
        let before = table.routes.len();
        table.routes.retain(|route| {
            if route.is_sticky() && !options.include_sticky {
                return true;
            }
            match &options.names {
                None => false,
                Some(names) => !route.name().is_some_and(|n| names.iter().any(|x| x == n)),
            }
        });
        if options.include_fallback {
            table.fallback = None;
        }
        debug!(removed = before - table.routes.len(), "removed routes");
        self
    }

    /// Remove non-sticky routes and the fallback.
    pub fn reset_behavior(&self) -> &Self {
        self.remove_routes(RemoveRoutesOptions::default())
    }

    pub fn reset_history(&self) -> &Self {
        self.shared.history.clear();
        self
    }

    /// Clear history and restore every repeat budget.
    pub fn reset(&self) -> &Self {
        self.reset_history();
        let table = self.shared.routes.read();
        for route in table.routes.iter().chain(table.fallback.iter()) {
            route.reset();
        }
        self
    }

    /// A fresh instance with the same configuration, matchers and routes but
    /// its own counters and history.
    pub fn create_instance(&self) -> Result<FetchMock> {
        let config = self.shared.config.read().clone();
        let registry = self.shared.registry.read().clone();
        let context = config.match_context();

        let table = self.shared.routes.read();
        let recompile = |route: &Arc<Route>| -> Result<Arc<Route>, RouteConfigError> {
            Ok(Arc::new(Route::new(route.spec().clone(), &registry, &context)?))
        };
        let routes = table
            .routes
            .iter()
            .map(&recompile)
            .collect::<Result<Vec<_>, _>>()?;
        let fallback = table.fallback.as_ref().map(&recompile).transpose()?;
        drop(table);

        let shared = Shared {
            config: RwLock::new(config),
            registry: RwLock::new(registry),
            routes: RwLock::new(RouteTable { routes, fallback }),
            history: Default::default(),
            flush: Default::default(),
            fetcher: self.shared.fetcher.clone(),
        };
        Ok(FetchMock {
            shared: Arc::new(shared),
        })
    }

    /// Instance configured and populated from a routes file. Matchers the
    /// file refers to must be supplied up front.
    pub fn from_routes_file(
        file: &RoutesFile,
        matchers: impl IntoIterator<Item = MatcherDefinition>,
    ) -> Result<FetchMock> {
        let mut builder = FetchMock::builder().config(file.config.clone());
        for definition in matchers {
            builder = builder.matcher(definition);
        }
        let mock = builder.build()?;
        for definition in &file.routes {
            mock.add_route(definition.clone().into_spec())?;
        }
        if let Some(fallback) = &file.fallback {
            mock.fallback(fallback.clone())?;
        }
        info!(
            routes = file.routes.len(),
            fallback = file.fallback.is_some(),
            "built mock from routes file"
        );
        Ok(mock)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FetchMockConfig;
    use crate::error::Error;
    use crate::request::RequestInit;
    use crate::route::ResponseDescriptor;
    use serde_json::json;

    fn names(mock: &FetchMock) -> Vec<String> {
        mock.routes()
            .iter()
            .map(|r| r.identifier().to_string())
            .collect()
    }

    #[test]
    fn test_registration_order_is_kept() {
        let mock = FetchMock::new();
        mock.get("/a", 200)
            .unwrap()
            .post("/b", 201)
            .unwrap()
            .route_with("/c", 200, "third")
            .unwrap();
        assert_eq!(names(&mock), vec!["GET /a", "POST /b", "third"]);
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let mock = FetchMock::new();
        mock.route_with("/a", 200, "users").unwrap();
        let err = mock.route_with("/b", 200, "users").unwrap_err();
        assert!(matches!(
            err,
            Error::RouteConfig(RouteConfigError::DuplicateName(ref n)) if n == "users"
        ));
        // unnamed routes may repeat
        mock.route("/a", 200).unwrap().route("/a", 200).unwrap();
        assert_eq!(mock.routes().len(), 3);
    }

    #[test]
    fn test_overwrite_routes_replaces_in_place() {
        let mock = FetchMock::builder()
            .config(FetchMockConfig {
                overwrite_routes: Some(true),
                ..FetchMockConfig::default()
            })
            .build()
            .unwrap();
        mock.route_with("/a", 200, "first").unwrap();
        mock.route_with("/b", 200, "users").unwrap();
        mock.route_with("/c", 404, "users").unwrap();
        assert_eq!(mock.routes().len(), 2);
        let replaced = &mock.routes()[1];
        assert!(matches!(replaced.spec().response, ResponseDirective::Status(404)));
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn test_overwrite_routes_false_keeps_both() {
        let mock = FetchMock::builder()
            .config(FetchMockConfig {
                overwrite_routes: Some(false),
                ..FetchMockConfig::default()
            })
            .build()
            .unwrap();
        mock.route_with("/a", 200, RouteOptions::new().name("users").repeat(1))
            .unwrap();
        mock.route_with("/a", 201, "users").unwrap();
        assert!(logs_contain("adding route behind an existing one with the same name"));

        let routes = mock.routes();
        assert_eq!(routes.len(), 2);
        assert!(matches!(routes[0].spec().response, ResponseDirective::Status(200)));
        assert!(matches!(routes[1].spec().response, ResponseDirective::Status(201)));

        // the earlier route wins until its budget runs out
        let first = mock.fetch("/a", RequestInit::new()).unwrap().await.unwrap();
        let second = mock.fetch("/a", RequestInit::new()).unwrap().await.unwrap();
        assert_eq!(first.status(), 200);
        assert_eq!(second.status(), 201);
        assert!(mock.done_for(["users"]));
    }

    #[test]
    fn test_method_shorthand_conflicts_with_declared_method() {
        let mock = FetchMock::new();
        let err = mock
            .get(RouteOptions::new().url("/a").method("POST"), 200)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::RouteConfig(RouteConfigError::Conflict("method"))
        ));
    }

    #[test]
    fn test_remove_routes() {
        let mock = FetchMock::new();
        mock.route_with("/a", 200, "a").unwrap();
        mock.route_with("/b", 200, "b").unwrap();
        mock.sticky("/s", 200).unwrap();
        mock.fallback(404).unwrap();

        mock.remove_routes(RemoveRoutesOptions::names(["a"]));
        assert_eq!(names(&mock), vec!["b", "* /s"]);
        assert!(mock.fallback_route().is_some());

        mock.reset_behavior();
        assert_eq!(names(&mock), vec!["* /s"]);
        assert!(mock.fallback_route().is_none());

        mock.remove_routes(RemoveRoutesOptions::default().include_sticky(true));
        assert!(mock.routes().is_empty());
    }

    #[test]
    fn test_registration_errors_surface() {
        let mock = FetchMock::new();
        assert!(mock.route("express:/a/:id", 42).is_err());
        assert!(mock
            .route_with(RouteOptions::new().url("/a").param("id", "1"), 200, RouteOptions::new())
            .is_err());
        assert!(mock
            .route("/a", ResponseDescriptor::new().header("bad header", "x"))
            .is_err());
        assert!(mock.routes().is_empty());
    }

    #[test]
    fn test_create_instance_copies_routes_not_state() {
        let mock = FetchMock::new();
        mock.route_with("/a", json!({"ok": true}), RouteOptions::new().name("a").repeat(1))
            .unwrap();
        let route = mock.routes()[0].clone();
        assert!(route.try_consume());

        let copy = mock.create_instance().unwrap();
        let copied = copy.routes()[0].clone();
        assert_ne!(copied.id(), route.id());
        assert_eq!(copied.remaining(), Some(1));
        assert_eq!(route.remaining(), Some(0));
        assert_eq!(copy.config(), mock.config());
    }

    #[test]
    fn test_pass_through_enables_network_fallback() {
        let mock = FetchMock::new();
        assert!(!mock.config().fallback_to_network);
        mock.pass_through();
        assert!(mock.config().fallback_to_network);
    }
}
