//! In-process mock for a fetch-style HTTP client.
//!
//! Register routes (matching constraints plus a response directive) on a
//! [`FetchMock`], hand its [`FetchHandler`] to the code under test, then
//! inspect the recorded calls.
//!
//! ```no_run
//! # async fn demo() -> fetch_mock::Result<()> {
//! use fetch_mock::{FetchMock, RequestInit, RouteOptions};
//!
//! let mock = FetchMock::new();
//! mock.get("express:/users/:id", serde_json::json!({"id": 1}))?
//!     .fallback(404)?;
//!
//! let response = mock.fetch("http://api.test/users/1", RequestInit::new())?.await?;
//! assert_eq!(response.status(), 200);
//! assert!(mock.called(RouteOptions::new().method("get"))?);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod fetcher;
pub mod flush;
pub mod history;
pub mod predicate;
pub mod request;
pub mod response;
pub mod route;
pub mod router;

pub use config::{FetchMockConfig, RouteDefinition, RoutesFile, RoutesFormat};
pub use error::{Error, Result, RouteConfigError};
pub use fetcher::{Fetcher, ReqwestFetcher};
pub use history::{CallFilter, CallHistory, CallLog, CallOutcome};
pub use predicate::{MatcherDefinition, MatcherRegistry};
pub use request::{CallRecord, FetchRequest, RequestBody, RequestInit, RequestInput};
pub use response::{MockResponse, ResponseParts};
pub use route::{
    Delay, MatchFn, OneOrMany, ResponseBody, ResponseDescriptor, ResponseDirective, ResponseFn,
    Route, RouteMatcher, RouteOptions, RouteSpec, UrlSource,
};
pub use router::{FetchHandler, FetchMock, FetchMockBuilder, RemoveRoutesOptions, ResponseFuture};
