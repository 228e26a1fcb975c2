//! Call dispatch: normalize, select a route, record, then synthesize.

use super::{FetchMock, RouteTable, Shared};
use crate::config::FetchMockConfig;
use crate::error::{Error, Result};
use crate::fetcher::{Fetcher, ReqwestFetcher};
use crate::history::{CallLog, CallOutcome};
use crate::request::{normalize, CallRecord, RequestInit, RequestInput};
use crate::response::MockResponse;
use crate::route::Route;
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Pending response of one dispatched call.
pub type ResponseFuture = BoxFuture<'static, Result<MockResponse>>;

enum Selection {
    Route(Arc<Route>, CallOutcome),
    PassThrough,
    Unmatched,
}

fn select(table: &RouteTable, call: &CallRecord, config: &FetchMockConfig) -> Selection {
    for route in &table.routes {
        if route.matches(call) && route.try_consume() {
            debug!(route = %route.identifier(), url = %call.url(), "route matched");
            return Selection::Route(route.clone(), CallOutcome::Matched);
        }
    }
    if let Some(fallback) = &table.fallback {
        if fallback.try_consume() {
            if config.warn_on_fallback {
                warn!(
                    method = %call.method(),
                    url = %call.url(),
                    "unmatched call handled by fallback"
                );
            }
            return Selection::Route(fallback.clone(), CallOutcome::Fallback);
        }
    }
    if config.fallback_to_network {
        debug!(url = %call.url(), "unmatched call passed through to the network");
        return Selection::PassThrough;
    }
    warn!(method = %call.method(), url = %call.url(), "no route matched call");
    Selection::Unmatched
}

async fn with_cancellation<F>(
    signal: Option<CancellationToken>,
    url: String,
    work: F,
) -> Result<MockResponse>
where
    F: Future<Output = Result<MockResponse>>,
{
    let Some(token) = signal else {
        return work.await;
    };
    if token.is_cancelled() {
        return Err(Error::Aborted { url });
    }
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(Error::Aborted { url }),
        result = work => result,
    }
}

/// Aborts the delivery task when the caller drops its response future.
struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

impl Shared {
    pub(crate) fn dispatch(
        &self,
        input: RequestInput,
        init: RequestInit,
    ) -> Result<ResponseFuture> {
        let runtime = Handle::try_current().map_err(|_| {
            Error::InvalidInput("fetch must be called from within a tokio runtime".to_string())
        })?;
        let config = self.config.read().clone();
        let (record, selection) = {
            let table = self.routes.read();
            let record = normalize(input, init, config.base_url.as_ref(), table.uses_body())?;
            let selection = select(&table, &record, &config);
            (Arc::new(record), selection)
        };

        let (route, outcome) = match &selection {
            Selection::Route(route, outcome) => (Some(route.clone()), *outcome),
            Selection::PassThrough => (None, CallOutcome::PassThrough),
            Selection::Unmatched => (None, CallOutcome::Unmatched),
        };
        let params = route
            .as_ref()
            .map(|r| r.params(&record))
            .unwrap_or_default();
        let log = CallLog::new(record.clone(), route, outcome, params);
        self.history.push(log.clone());

        let hold = self.flush.hold_delivery();
        let flush = self.flush.clone();
        let fetcher: Arc<dyn Fetcher> = match &self.fetcher {
            Some(fetcher) => fetcher.clone(),
            None => Arc::new(ReqwestFetcher::default()),
        };
        let signal = record.signal().cloned();
        let url = record.url().to_string();

        // Delivery starts now, not at first poll, so `flush` can drain calls
        // whose futures have not been awaited yet.
        let task = runtime.spawn({
            let url = url.clone();
            async move {
                let _hold = hold;
                let work = async {
                    match selection {
                        Selection::Route(route, _) => {
                            let parts = route.synthesize(record.clone(), config).await?;
                            Ok(MockResponse::new(parts, false, Some(flush)))
                        }
                        Selection::PassThrough => {
                            let parts = fetcher.fetch(&record).await?;
                            Ok(MockResponse::new(parts, true, Some(flush)))
                        }
                        Selection::Unmatched => Err(Error::Unmatched {
                            method: record.method().to_string(),
                            url: record.url().to_string(),
                        }),
                    }
                };
                let result = with_cancellation(signal, url, work).await;
                log.settle(&result);
                result
            }
        });
        let abort = AbortOnDrop(task.abort_handle());

        Ok(Box::pin(async move {
            let _abort = abort;
            match task.await {
                Ok(result) => result,
                Err(err) if err.is_cancelled() => Err(Error::Aborted { url }),
                Err(err) => Err(Error::InvalidResponse(format!(
                    "response task for {url} failed: {err}"
                ))),
            }
        }))
    }
}

/// Clonable entry point into a [`FetchMock`], for code that takes a fetch function.
#[derive(Clone)]
pub struct FetchHandler {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for FetchHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchHandler").finish_non_exhaustive()
    }
}

impl FetchHandler {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    pub fn fetch(
        &self,
        input: impl Into<RequestInput>,
        init: RequestInit,
    ) -> Result<ResponseFuture> {
        self.shared.dispatch(input.into(), init)
    }
}

impl FetchMock {
    /// Intercept one call.
    ///
    /// Malformed input fails immediately. Otherwise the call is recorded and
    /// the returned future resolves to the response, or to `Unmatched`,
    /// `Network`, `Aborted`, `InvalidResponse` or `PassThrough` errors.
    pub fn fetch(
        &self,
        input: impl Into<RequestInput>,
        init: RequestInit,
    ) -> Result<ResponseFuture> {
        self.shared.dispatch(input.into(), init)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::{ResponseDescriptor, RouteOptions};
    use hyper::StatusCode;
    use std::time::Duration;

    #[tokio::test]
    async fn test_first_match_wins() {
        let mock = FetchMock::new();
        mock.route("begin:http://a.com", 201).unwrap();
        mock.route("http://a.com/x", 202).unwrap();

        let response = mock.fetch("http://a.com/x", RequestInit::new()).unwrap().await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_invalid_input_is_synchronous() {
        let mock = FetchMock::new();
        mock.any(200).unwrap();
        let err = mock
            .fetch("", RequestInit::new())
            .err()
            .expect("empty url must fail synchronously");
        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(mock.calls(crate::history::CallFilter::All).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unmatched_is_recorded_and_rejected() {
        let mock = FetchMock::new();
        let future = mock.fetch("http://a.com/none", RequestInit::new()).unwrap();
        assert_eq!(mock.calls("unmatched").unwrap().len(), 1);
        let err = future.await.unwrap_err();
        assert!(err.is_unmatched());
    }

    #[tokio::test]
    async fn test_body_matchers_trigger_eager_parse() {
        let mock = FetchMock::new();
        mock.post(
            RouteOptions::new().url("/items").body(serde_json::json!({"a": 1})),
            204,
        )
        .unwrap();
        let response = mock
            .fetch("/items", RequestInit::new().method("POST").body(r#"{"a":1}"#))
            .unwrap()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_abort_before_and_during_delivery() {
        let mock = FetchMock::new();
        mock.route("/slow", ResponseDescriptor::new().status(200).delay(200))
            .unwrap();

        let token = CancellationToken::new();
        token.cancel();
        let err = mock
            .fetch("/slow", RequestInit::new().signal(token))
            .unwrap()
            .await
            .unwrap_err();
        assert!(err.is_abort());

        let token = CancellationToken::new();
        let future = mock
            .fetch("/slow", RequestInit::new().signal(token.clone()))
            .unwrap();
        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            token.cancel();
        });
        let err = future.await.unwrap_err();
        assert!(err.is_abort());
        canceller.await.unwrap();

        let calls = mock.calls(crate::history::CallFilter::All).unwrap();
        assert_eq!(calls.len(), 2);
        assert!(calls.iter().all(|c| c.error().is_some_and(Error::is_abort)));
        tokio::time::timeout(Duration::from_secs(1), mock.flush(true))
            .await
            .unwrap();
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn test_fallback_warns_unless_disabled() {
        let mock = FetchMock::new();
        mock.fallback(404).unwrap();
        mock.fetch("/loud", RequestInit::new()).unwrap().await.unwrap();
        assert!(logs_contain("unmatched call handled by fallback"));
        assert!(logs_contain("/loud"));

        let quiet = FetchMock::builder()
            .config(FetchMockConfig {
                warn_on_fallback: false,
                ..Default::default()
            })
            .build()
            .unwrap();
        quiet.fallback(404).unwrap();
        quiet.fetch("/quiet", RequestInit::new()).unwrap().await.unwrap();
        assert!(!logs_contain("/quiet"));
    }

    #[tokio::test]
    async fn test_flush_drains_unawaited_response() {
        let mock = FetchMock::new();
        mock.route("/slow", ResponseDescriptor::new().status(200).delay(50))
            .unwrap();

        let started = std::time::Instant::now();
        let pending = mock.fetch("/slow", RequestInit::new()).unwrap();
        tokio::time::timeout(Duration::from_secs(2), mock.flush(false))
            .await
            .expect("flush must not wait for the caller to poll the response");
        assert!(started.elapsed() >= Duration::from_millis(50));

        let response = pending.await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let calls = mock.calls(crate::history::CallFilter::All).unwrap();
        assert!(calls[0].response().is_some());
    }

    #[tokio::test]
    async fn test_delay_runs_from_the_call() {
        let mock = FetchMock::new();
        mock.route("/slow", ResponseDescriptor::new().delay(100)).unwrap();

        let started = std::time::Instant::now();
        let pending = mock.fetch("/slow", RequestInit::new()).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        pending.await.unwrap();
        assert!(started.elapsed() < Duration::from_millis(190));
    }

    #[test]
    fn test_fetch_outside_runtime_fails_synchronously() {
        let mock = FetchMock::new();
        mock.any(200).unwrap();
        let err = mock
            .fetch("/x", RequestInit::new())
            .err()
            .expect("no runtime to deliver on");
        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(mock.calls(crate::history::CallFilter::All).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dropped_future_settles_flush() {
        let mock = FetchMock::new();
        mock.route("/x", ResponseDescriptor::new().delay(10_000)).unwrap();
        let future = mock.fetch("/x", RequestInit::new()).unwrap();
        drop(future);
        tokio::time::timeout(Duration::from_millis(200), mock.flush(false))
            .await
            .unwrap();
    }
}
