//! Inspection of recorded calls.

use super::FetchMock;
use crate::error::Result;
use crate::history::{CallFilter, CallLog, CallOutcome};
use crate::predicate::CompiledMatcher;
use crate::route::{RouteMatcher, RouteOptions, RouteSpec, UrlSource};
use tracing::warn;

impl FetchMock {
    fn compile_filter(
        &self,
        matcher: RouteMatcher,
        options: RouteOptions,
    ) -> Result<CompiledMatcher> {
        let spec = RouteSpec::build(matcher, 200, options)?;
        let context = self.shared.config.read().match_context();
        let registry = self.shared.registry.read();
        Ok(registry.compile(&spec.options, &context)?)
    }

    /// Calls selected by `filter`, in arrival order.
    pub fn calls(&self, filter: impl Into<CallFilter>) -> Result<Vec<CallLog>> {
        self.calls_with(filter, RouteOptions::new())
    }

    /// Calls selected by `filter` that also satisfy the constraints in `options`.
    pub fn calls_with(
        &self,
        filter: impl Into<CallFilter>,
        options: impl Into<RouteOptions>,
    ) -> Result<Vec<CallLog>> {
        let options = options.into();
        let entries = self.shared.history.entries();

        let (selected, options): (Vec<CallLog>, RouteOptions) = match filter.into() {
            CallFilter::All => (entries, options),
            CallFilter::Matched => (
                entries.into_iter().filter(CallLog::is_matched).collect(),
                options,
            ),
            CallFilter::Unmatched => (
                entries
                    .into_iter()
                    .filter(|log| log.outcome() != CallOutcome::Matched)
                    .collect(),
                options,
            ),
            CallFilter::Route(name) if self.has_route_named(&name) => (
                entries
                    .into_iter()
                    .filter(|log| log.route_name() == Some(name.as_str()))
                    .collect(),
                options,
            ),
            CallFilter::Route(pattern) => {
                let matcher = RouteMatcher::Url(UrlSource::Pattern(pattern));
                return self.filter_by(entries, matcher, options);
            }
            CallFilter::Matcher(matcher) => return self.filter_by(entries, matcher, options),
        };

        if !options.has_constraints() {
            return Ok(selected);
        }
        self.filter_by(selected, RouteMatcher::Options(options), RouteOptions::new())
    }

    fn filter_by(
        &self,
        entries: Vec<CallLog>,
        matcher: RouteMatcher,
        options: RouteOptions,
    ) -> Result<Vec<CallLog>> {
        let compiled = self.compile_filter(matcher, options)?;
        Ok(entries
            .into_iter()
            .filter(|log| compiled.matches(log.record()))
            .collect())
    }

    fn has_route_named(&self, name: &str) -> bool {
        let table = self.shared.routes.read();
        table
            .routes
            .iter()
            .chain(table.fallback.iter())
            .any(|route| route.name() == Some(name))
    }

    pub fn called(&self, filter: impl Into<CallFilter>) -> Result<bool> {
        Ok(!self.calls(filter)?.is_empty())
    }

    pub fn last_call(&self, filter: impl Into<CallFilter>) -> Result<Option<CallLog>> {
        Ok(self.calls(filter)?.pop())
    }

    pub fn last_url(&self, filter: impl Into<CallFilter>) -> Result<Option<String>> {
        Ok(self.last_call(filter)?.map(|log| log.url().to_string()))
    }

    /// Whether every ordinary route has been called as expected: finite
    /// routes exactly `repeat` times, others at least once.
    pub fn done(&self) -> bool {
        let routes = self.routes();
        routes.iter().all(|route| self.route_done(route))
    }

    /// [`done`](Self::done) restricted to the named routes.
    pub fn done_for<I, S>(&self, names: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let routes = self.routes();
        names.into_iter().all(|name| {
            let name = name.as_ref();
            let mut named = routes.iter().filter(|r| r.name() == Some(name)).peekable();
            match named.peek() {
                Some(_) => named.all(|route| self.route_done(route)),
                None => {
                    warn!(route = %name, "done() asked about a route that is not registered");
                    false
                }
            }
        })
    }

    fn route_done(&self, route: &crate::route::Route) -> bool {
        let count = self.shared.history.count_for(route.id());
        let done = match route.repeat() {
            Some(expected) => count == expected,
            None => count > 0,
        };
        if !done {
            warn!(
                route = %route.identifier(),
                calls = count,
                expected = ?route.repeat(),
                "route has not been called as expected"
            );
        }
        done
    }

    /// Wait until every in-flight response has been delivered, and with
    /// `wait_for_body`, until every started body read has finished.
    pub async fn flush(&self, wait_for_body: bool) {
        self.shared.flush.flush(wait_for_body).await
    }
}
