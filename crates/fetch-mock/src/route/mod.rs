//! Compiled routes.
//!
//! A [`Route`] pairs the conjunction of its declared constraints with a
//! response directive and an atomic repeat budget. Routes are compiled from a
//! [`RouteSpec`] at registration, so malformed constraints never reach
//! dispatch.

mod response;
mod spec;

pub use response::{Delay, ResponseBody, ResponseDescriptor, ResponseDirective, ResponseFn};
pub use spec::{MatchFn, OneOrMany, RouteMatcher, RouteOptions, RouteSpec, UrlSource};

use crate::config::FetchMockConfig;
use crate::error::{Result, RouteConfigError};
use crate::predicate::{
    express_pattern, CompiledMatcher, ExpressPattern, MatchContext, MatcherRegistry,
};
use crate::request::CallRecord;
use crate::response::ResponseParts;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

static NEXT_ROUTE_ID: AtomicU64 = AtomicU64::new(1);

/// A registered route.
#[derive(Debug)]
pub struct Route {
    id: u64,
    identifier: String,
    spec: RouteSpec,
    matcher: CompiledMatcher,
    express: Option<Arc<ExpressPattern>>,
    /// Remaining matches for finite routes
    remaining: Option<AtomicUsize>,
}

impl Route {
    pub fn new(
        spec: RouteSpec,
        registry: &MatcherRegistry,
        context: &MatchContext,
    ) -> Result<Self, RouteConfigError> {
        spec.response.validate()?;
        let matcher = registry.compile(&spec.options, context)?;
        let express = express_pattern(&spec.options, context)?;
        Ok(Self {
            id: NEXT_ROUTE_ID.fetch_add(1, Ordering::Relaxed),
            identifier: spec.identifier(),
            remaining: spec.options.repeat.map(AtomicUsize::new),
            matcher,
            express,
            spec,
        })
    }

    /// Unique across all instances in the process.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Explicit name, if one was given.
    pub fn name(&self) -> Option<&str> {
        self.spec.options.name.as_deref()
    }

    /// Name, or `METHOD pattern` for unnamed routes.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn spec(&self) -> &RouteSpec {
        &self.spec
    }

    pub fn repeat(&self) -> Option<usize> {
        self.spec.options.repeat
    }

    pub fn is_sticky(&self) -> bool {
        self.spec.options.sticky
    }

    pub fn uses_body(&self) -> bool {
        self.matcher.uses_body()
    }

    /// Remaining budget; `None` for unlimited routes.
    pub fn remaining(&self) -> Option<usize> {
        self.remaining.as_ref().map(|r| r.load(Ordering::Acquire))
    }

    fn exhausted(&self) -> bool {
        self.remaining() == Some(0)
    }

    /// Constraints hold and the budget is not exhausted.
    pub fn matches(&self, call: &CallRecord) -> bool {
        !self.exhausted() && self.matcher.matches(call)
    }

    /// Take one slot of the repeat budget. Always succeeds for unlimited routes.
    pub fn try_consume(&self) -> bool {
        match &self.remaining {
            None => true,
            Some(remaining) => remaining
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
                .is_ok(),
        }
    }

    /// Restore the repeat budget.
    pub fn reset(&self) {
        if let (Some(remaining), Some(repeat)) = (&self.remaining, self.spec.options.repeat) {
            remaining.store(repeat, Ordering::Release);
        }
    }

    /// Express params captured from the call path.
    pub fn params(&self, call: &CallRecord) -> Vec<(String, String)> {
        self.express
            .as_ref()
            .and_then(|p| p.params(call.path()))
            .unwrap_or_default()
    }

    /// Build the response for a call this route was selected for.
    pub async fn synthesize(
        &self,
        call: Arc<CallRecord>,
        config: FetchMockConfig,
    ) -> Result<ResponseParts> {
        response::synthesize(
            self.spec.response.clone(),
            call,
            self.spec.options.delay.clone(),
            config,
        )
        .await
    }
}
