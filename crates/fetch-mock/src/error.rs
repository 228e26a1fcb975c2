//! Error taxonomy for registration, dispatch and response consumption.

use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors surfaced by a [`FetchMock`](crate::FetchMock) instance.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Call arguments could not be turned into a call record.
    #[error("invalid fetch input: {0}")]
    InvalidInput(String),

    /// A route could not be registered.
    #[error(transparent)]
    RouteConfig(#[from] RouteConfigError),

    /// No route, fallback or pass-through handled the call.
    #[error("no route matched {method} {url}")]
    Unmatched { method: String, url: String },

    /// A route's `throws` directive; indistinguishable from a real network failure.
    #[error("network error: {0}")]
    Network(String),

    /// The call's cancellation token fired before the response was delivered.
    #[error("the operation was aborted: {url}")]
    Aborted { url: String },

    /// A response directive produced something that is not a valid response.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The response body has already been read.
    #[error("body has already been consumed")]
    BodyUsed,

    /// The response body could not be decoded as requested.
    #[error("failed to decode body: {0}")]
    Decode(String),

    /// The real fetcher failed while passing a call through.
    #[error("pass-through request to {url} failed: {message}")]
    PassThrough { url: String, message: String },
}

impl Error {
    /// Whether this error came from a cancellation signal.
    pub fn is_abort(&self) -> bool {
        matches!(self, Error::Aborted { .. })
    }

    /// Whether this error means no route handled the call.
    pub fn is_unmatched(&self) -> bool {
        matches!(self, Error::Unmatched { .. })
    }
}

/// Errors raised while compiling a route, always at registration time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteConfigError {
    #[error("a route named '{0}' is already registered")]
    DuplicateName(String),

    #[error("invalid url pattern '{pattern}': {reason}")]
    InvalidUrlPattern { pattern: String, reason: String },

    #[error("invalid method '{0}'")]
    InvalidMethod(String),

    #[error("invalid header '{name}': {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error("'params' requires an 'express:' url pattern on the same route")]
    ParamsWithoutExpress,

    #[error("invalid status code {0}")]
    InvalidStatus(u16),

    #[error("'{0}' is declared more than once for the same route")]
    Conflict(&'static str),

    #[error("no matcher named '{0}' is defined")]
    UnknownMatcher(String),

    #[error("a matcher named '{0}' is already defined")]
    DuplicateMatcher(String),

    #[error("matcher '{name}' rejected its value: {reason}")]
    InvalidMatcherValue { name: String, reason: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_config_error_converts() {
        let err: Error = RouteConfigError::DuplicateName("users".to_string()).into();
        assert!(matches!(err, Error::RouteConfig(_)));
        assert_eq!(
            err.to_string(),
            "a route named 'users' is already registered"
        );
    }

    #[test]
    fn test_error_kinds() {
        let aborted = Error::Aborted {
            url: "http://a.com/".to_string(),
        };
        assert!(aborted.is_abort());
        assert!(!aborted.is_unmatched());

        let unmatched = Error::Unmatched {
            method: "GET".to_string(),
            url: "/x".to_string(),
        };
        assert!(unmatched.is_unmatched());
        assert_eq!(unmatched.to_string(), "no route matched GET /x");
    }
}
