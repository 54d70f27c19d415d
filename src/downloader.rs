//! # Downloader Module
//!
//! The seam between the engine and the network.
//!
//! The engine only ever calls [`Downloader::download`]; the default
//! implementation is backed by `reqwest` and configured from
//! [`CrawlerConfig`]. Tests and embedders can inject their own.

use async_trait::async_trait;
use reqwest::Client;
use tracing::trace;

use crate::builder::CrawlerConfig;
use crate::error::SpiderError;
use crate::request::Request;
use crate::response::Response;

#[async_trait]
pub trait Downloader: Send + Sync + 'static {
    /// Performs `request` and returns the response, whatever its status.
    async fn download(&self, request: Request) -> Result<Response, SpiderError>;
}

/// HTTP downloader backed by a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestDownloader {
    client: Client,
}

impl ReqwestDownloader {
    pub fn new(config: &CrawlerConfig) -> Result<Self, SpiderError> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.download_timeout)
            .pool_max_idle_per_host(config.max_concurrent_downloads)
            .build()
            .map_err(|e| {
                SpiderError::ConfigurationError(format!("failed to build http client: {e}"))
            })?;
        Ok(ReqwestDownloader { client })
    }

    pub fn from_client(client: Client) -> Self {
        ReqwestDownloader { client }
    }
}

#[async_trait]
impl Downloader for ReqwestDownloader {
    async fn download(&self, request: Request) -> Result<Response, SpiderError> {
        trace!("Sending {} {}", request.method, request.url);
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone());
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let resp = builder.send().await?;
        let url = resp.url().clone();
        let status = resp.status();
        let headers = resp.headers().clone();
        let body = resp.bytes().await?;
        trace!("Received {} from {} ({} bytes)", status, url, body.len());

        Ok(Response::new(request, url, status, headers, body))
    }
}
