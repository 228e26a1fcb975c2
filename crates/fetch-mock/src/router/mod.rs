//! The mock itself: route table, dispatch and inspection.
//!
//! A [`FetchMock`] owns an ordered list of routes (registration order is
//! precedence), an optional fallback route, its configuration, the call
//! history and the flush coordinator. Nothing is global: separate instances
//! never share routes, counters or history.

mod core;
mod dispatch;
mod inspect;

pub use self::core::RemoveRoutesOptions;
pub use self::dispatch::{FetchHandler, ResponseFuture};

use crate::config::FetchMockConfig;
use crate::error::{Error, Result};
use crate::fetcher::Fetcher;
use crate::flush::FlushCoordinator;
use crate::history::CallHistory;
use crate::predicate::{MatcherDefinition, MatcherRegistry};
use crate::route::Route;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Default)]
pub(crate) struct RouteTable {
    routes: Vec<Arc<Route>>,
    fallback: Option<Arc<Route>>,
}

impl RouteTable {
    fn uses_body(&self) -> bool {
        self.routes
            .iter()
            .chain(self.fallback.iter())
            .any(|route| route.uses_body())
    }
}

pub(crate) struct Shared {
    config: RwLock<FetchMockConfig>,
    registry: RwLock<MatcherRegistry>,
    routes: RwLock<RouteTable>,
    history: CallHistory,
    flush: Arc<FlushCoordinator>,
    fetcher: Option<Arc<dyn Fetcher>>,
}

impl Shared {
    fn new(
        config: FetchMockConfig,
        registry: MatcherRegistry,
        fetcher: Option<Arc<dyn Fetcher>>,
    ) -> Self {
        Self {
            config: RwLock::new(config),
            registry: RwLock::new(registry),
            routes: RwLock::new(RouteTable::default()),
            history: CallHistory::new(),
            flush: Arc::new(FlushCoordinator::new()),
            fetcher,
        }
    }
}

/// A fetch mock instance.
pub struct FetchMock {
    shared: Arc<Shared>,
}

impl fmt::Debug for FetchMock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table = self.shared.routes.read();
        f.debug_struct("FetchMock")
            .field("config", &*self.shared.config.read())
            .field("routes", &table.routes.len())
            .field("fallback", &table.fallback.is_some())
            .field("calls", &self.shared.history.len())
            .finish()
    }
}

impl Default for FetchMock {
    fn default() -> Self {
        Self::new()
    }
}

impl FetchMock {
    /// Instance with default configuration and the built-in matchers.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared::new(
                FetchMockConfig::default(),
                MatcherRegistry::new(),
                None,
            )),
        }
    }

    pub fn builder() -> FetchMockBuilder {
        FetchMockBuilder::default()
    }

    /// Snapshot of the configuration.
    pub fn config(&self) -> FetchMockConfig {
        self.shared.config.read().clone()
    }

    /// Ordinary routes in precedence order.
    pub fn routes(&self) -> Vec<Arc<Route>> {
        self.shared.routes.read().routes.clone()
    }

    pub fn fallback_route(&self) -> Option<Arc<Route>> {
        self.shared.routes.read().fallback.clone()
    }

    /// A clonable handle that dispatches calls into this instance.
    pub fn fetch_handler(&self) -> FetchHandler {
        FetchHandler::new(self.shared.clone())
    }
}

/// Builder for [`FetchMock`].
#[derive(Default)]
pub struct FetchMockBuilder {
    config: FetchMockConfig,
    fetcher: Option<Arc<dyn Fetcher>>,
    matchers: Vec<MatcherDefinition>,
}

impl FetchMockBuilder {
    pub fn config(mut self, config: FetchMockConfig) -> Self {
        self.config = config;
        self
    }

    /// Fetcher used for pass-through calls; defaults to a reqwest client.
    pub fn fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn matcher(mut self, definition: MatcherDefinition) -> Self {
        self.matchers.push(definition);
        self
    }

    pub fn build(self) -> Result<FetchMock> {
        self.config
            .validate()
            .map_err(|e| Error::InvalidInput(e.to_string()))?;
        let mut registry = MatcherRegistry::new();
        for definition in self.matchers {
            registry.define(definition)?;
        }
        Ok(FetchMock {
            shared: Arc::new(Shared::new(self.config, registry, self.fetcher)),
        })
    }
}
