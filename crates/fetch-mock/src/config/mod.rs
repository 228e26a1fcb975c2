//! Configuration types for fetch-mock instances.

mod routes;

pub use routes::{RouteDefinition, RoutesFile, RoutesFormat};

use crate::predicate::MatchContext;
use serde::{Deserialize, Serialize};
use url::Url;

fn default_true() -> bool {
    true
}

/// Instance-wide behavior switches.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchMockConfig {
    /// Encode JSON bodies with a `content-type: application/json` header
    #[serde(default = "default_true")]
    pub send_as_json: bool,

    /// Add `content-length` to synthesized responses
    #[serde(default = "default_true")]
    pub include_content_length: bool,

    /// Log a warning whenever the fallback route serves a call
    #[serde(default = "default_true")]
    pub warn_on_fallback: bool,

    /// What to do when a route reuses an existing name. Unset rejects it,
    /// `Some(true)` replaces the existing route in place and `Some(false)`
    /// appends it behind the existing one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overwrite_routes: Option<bool>,

    /// Default for routes that declare a body without `match_partial_body`
    #[serde(default)]
    pub match_partial_body: bool,

    /// Hand unmatched calls to the real fetcher instead of failing them
    #[serde(default)]
    pub fallback_to_network: bool,

    /// Base for relative call urls and relative url patterns
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<Url>,
}

impl Default for FetchMockConfig {
    fn default() -> Self {
        Self {
            send_as_json: true,
            include_content_length: true,
            warn_on_fallback: true,
            overwrite_routes: None,
            match_partial_body: false,
            fallback_to_network: false,
            base_url: None,
        }
    }
}

impl FetchMockConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if let Some(base) = &self.base_url {
            if base.cannot_be_a_base() {
                anyhow::bail!("baseUrl '{base}' cannot be used to resolve relative urls");
            }
            if base.fragment().is_some() {
                anyhow::bail!("baseUrl '{base}' must not carry a fragment");
            }
        }
        Ok(())
    }

    pub(crate) fn match_context(&self) -> MatchContext {
        MatchContext {
            base_url: self.base_url.clone(),
            match_partial_body: self.match_partial_body,
        }
    }
}
