//! Shared fixtures: an in-memory website served through the `Downloader` seam.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use spider_sync::{Downloader, Reactor, Request, Response, Scraper, SpiderError, async_trait};

pub const BASE: &str = "http://site.test";

pub fn url(path: &str) -> String {
    format!("{BASE}{path}")
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A scraper on its own freshly started reactor, downloading from `site`.
pub fn scraper(site: StaticSite) -> Scraper {
    scraper_on(Arc::new(site))
}

pub fn scraper_on(site: Arc<StaticSite>) -> Scraper {
    init_tracing();
    let reactor = Arc::new(Reactor::new());
    reactor.start().unwrap();
    Scraper::new(reactor).with_downloader(site)
}

#[derive(Clone)]
enum Page {
    Content {
        status: u16,
        body: String,
        delay: Duration,
    },
    Broken,
}

/// Pages keyed by path. Unknown paths answer 404, or the fallback page if set.
#[derive(Default)]
pub struct StaticSite {
    pages: HashMap<String, Page>,
    fallback: Option<Page>,
    hits: AtomicUsize,
}

impl StaticSite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(self, path: &str, body: &str) -> Self {
        self.page_with(path, 200, body, Duration::ZERO)
    }

    pub fn page_with(mut self, path: &str, status: u16, body: &str, delay: Duration) -> Self {
        self.pages.insert(
            path.to_string(),
            Page::Content {
                status,
                body: body.to_string(),
                delay,
            },
        );
        self
    }

    /// A path whose download always fails.
    pub fn broken(mut self, path: &str) -> Self {
        self.pages.insert(path.to_string(), Page::Broken);
        self
    }

    /// Every unknown path answers 200 with an empty body after `delay`.
    pub fn endless(mut self, delay: Duration) -> Self {
        self.fallback = Some(Page::Content {
            status: 200,
            body: String::new(),
            delay,
        });
        self
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Downloader for StaticSite {
    async fn download(&self, request: Request) -> Result<Response, SpiderError> {
        self.hits.fetch_add(1, Ordering::SeqCst);
        let page = self
            .pages
            .get(request.url.path())
            .or(self.fallback.as_ref())
            .cloned()
            .unwrap_or(Page::Content {
                status: 404,
                body: "not found".to_string(),
                delay: Duration::ZERO,
            });

        match page {
            Page::Broken => Err(SpiderError::GeneralError(format!(
                "connection reset: {}",
                request.url
            ))),
            Page::Content {
                status,
                body,
                delay,
            } => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                let url = request.url.clone();
                let status = StatusCode::from_u16(status)
                    .map_err(|e| SpiderError::GeneralError(e.to_string()))?;
                Ok(Response::new(
                    request,
                    url,
                    status,
                    HeaderMap::new(),
                    Bytes::from(body),
                ))
            }
        }
    }
}
