//! Call history: every intercepted call in arrival order.

use crate::error::Error;
use crate::request::CallRecord;
use crate::response::MockResponse;
use crate::route::{Route, RouteMatcher, RouteOptions};
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use regex::Regex;
use std::sync::Arc;

/// How a call was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    /// Served by an ordinary route
    Matched,
    /// Served by the fallback route
    Fallback,
    /// Handed to the real fetcher
    PassThrough,
    /// Nothing handled it; the call failed
    Unmatched,
}

#[derive(Debug)]
struct CallLogInner {
    record: Arc<CallRecord>,
    route: Option<Arc<Route>>,
    outcome: CallOutcome,
    params: Vec<(String, String)>,
    response: OnceCell<Result<MockResponse, Error>>,
}

/// One history entry. Cheap to clone.
#[derive(Debug, Clone)]
pub struct CallLog {
    inner: Arc<CallLogInner>,
}

impl CallLog {
    pub(crate) fn new(
        record: Arc<CallRecord>,
        route: Option<Arc<Route>>,
        outcome: CallOutcome,
        params: Vec<(String, String)>,
    ) -> Self {
        Self {
            inner: Arc::new(CallLogInner {
                record,
                route,
                outcome,
                params,
                response: OnceCell::new(),
            }),
        }
    }

    /// Store how the call settled. Only the first settlement is kept.
    pub(crate) fn settle(&self, result: &Result<MockResponse, Error>) {
        let _ = self.inner.response.set(result.clone());
    }

    pub fn record(&self) -> &CallRecord {
        &self.inner.record
    }

    pub fn url(&self) -> &str {
        self.inner.record.url()
    }

    pub fn method(&self) -> &str {
        self.inner.record.method()
    }

    pub fn route(&self) -> Option<&Arc<Route>> {
        self.inner.route.as_ref()
    }

    pub fn route_name(&self) -> Option<&str> {
        self.inner.route.as_ref().and_then(|r| r.name())
    }

    pub fn outcome(&self) -> CallOutcome {
        self.inner.outcome
    }

    /// Served by an ordinary route, as opposed to fallback, pass-through or nothing.
    pub fn is_matched(&self) -> bool {
        self.inner.outcome == CallOutcome::Matched
    }

    /// Params captured by the serving route's `express:` url.
    pub fn params(&self) -> &[(String, String)] {
        &self.inner.params
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.inner
            .params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Delivered response, once the call has settled successfully.
    pub fn response(&self) -> Option<&MockResponse> {
        self.inner.response.get().and_then(|r| r.as_ref().ok())
    }

    /// Failure, once the call has settled with one.
    pub fn error(&self) -> Option<&Error> {
        self.inner.response.get().and_then(|r| r.as_ref().err())
    }

    pub fn is_settled(&self) -> bool {
        self.inner.response.get().is_some()
    }
}

/// Append-only log, cleared only by a history reset.
#[derive(Debug, Default)]
pub struct CallHistory {
    entries: RwLock<Vec<CallLog>>,
}

impl CallHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&self, log: CallLog) {
        self.entries.write().push(log);
    }

    pub fn entries(&self) -> Vec<CallLog> {
        self.entries.read().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Number of calls served by the route with this id.
    pub fn count_for(&self, route_id: u64) -> usize {
        self.entries
            .read()
            .iter()
            .filter(|log| log.route().is_some_and(|r| r.id() == route_id))
            .count()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

/// Which calls an inspection looks at.
#[derive(Debug, Clone, Default)]
pub enum CallFilter {
    #[default]
    All,
    /// Calls served by ordinary routes
    Matched,
    /// Calls served by the fallback, passed through, or not handled at all
    Unmatched,
    /// A route name when such a route is registered, otherwise a url pattern
    Route(String),
    /// Ad-hoc constraints compiled for this inspection
    Matcher(RouteMatcher),
}

impl From<bool> for CallFilter {
    fn from(matched: bool) -> Self {
        if matched {
            CallFilter::Matched
        } else {
            CallFilter::Unmatched
        }
    }
}

impl From<&str> for CallFilter {
    fn from(value: &str) -> Self {
        match value {
            "matched" => CallFilter::Matched,
            "unmatched" => CallFilter::Unmatched,
            other => CallFilter::Route(other.to_string()),
        }
    }
}

impl From<String> for CallFilter {
    fn from(value: String) -> Self {
        CallFilter::from(value.as_str())
    }
}

impl From<Regex> for CallFilter {
    fn from(value: Regex) -> Self {
        CallFilter::Matcher(value.into())
    }
}

impl From<RouteOptions> for CallFilter {
    fn from(value: RouteOptions) -> Self {
        CallFilter::Matcher(value.into())
    }
}

impl From<RouteMatcher> for CallFilter {
    fn from(value: RouteMatcher) -> Self {
        CallFilter::Matcher(value)
    }
}
