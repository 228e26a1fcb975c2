//! Real network access for calls that pass through the mock.

use crate::error::{Error, Result};
use crate::request::{CallRecord, UrlKind};
use crate::response::ResponseParts;
use async_trait::async_trait;
use hyper::header::{CONTENT_LENGTH, HOST};
use hyper::Method;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::debug;

/// Performs a real request for a call record.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, call: &CallRecord) -> Result<ResponseParts>;
}

/// [`Fetcher`] backed by a reqwest client.
#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    client: reqwest::Client,
}

impl ReqwestFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Process-wide fetcher used when an instance has none configured.
    pub fn shared() -> &'static ReqwestFetcher {
        static DEFAULT: OnceLock<ReqwestFetcher> = OnceLock::new();
        DEFAULT.get_or_init(|| {
            let client = reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new());
            ReqwestFetcher::new(client)
        })
    }
}

impl Default for ReqwestFetcher {
    fn default() -> Self {
        Self::shared().clone()
    }
}

#[async_trait]
impl Fetcher for ReqwestFetcher {
    async fn fetch(&self, call: &CallRecord) -> Result<ResponseParts> {
        let target = match call.normalized_url().kind {
            UrlKind::Absolute => call.url().to_string(),
            UrlKind::ProtocolRelative => format!("http:{}", call.url()),
            UrlKind::Relative => {
                return Err(Error::PassThrough {
                    url: call.url().to_string(),
                    message: "relative urls cannot be fetched without a base url".to_string(),
                })
            }
        };
        let failed = |message: String| Error::PassThrough {
            url: target.clone(),
            message,
        };

        let method =
            Method::from_bytes(call.method().as_bytes()).map_err(|e| failed(e.to_string()))?;
        let mut request = self.client.request(method, &target);
        for (name, value) in call.headers() {
            if *name != HOST && *name != CONTENT_LENGTH {
                request = request.header(name.clone(), value.clone());
            }
        }
        if let Some(body) = call.body() {
            request = request.body(body.to_bytes());
        }

        debug!(url = %target, method = %call.method(), "passing call through");
        let response = request.send().await.map_err(|e| failed(e.to_string()))?;
        let status = response.status();
        let headers = response.headers().clone();
        let url = response.url().to_string();
        let redirected = url != target;
        let body = response.bytes().await.map_err(|e| failed(e.to_string()))?;

        Ok(ResponseParts {
            status,
            headers,
            body,
            url,
            redirected,
        })
    }
}
