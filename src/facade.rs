//! # Facade Module
//!
//! Blocking entry points for callers that are not running an async runtime.
//!
//! ## Overview
//!
//! Every call builds a crawl, submits it to the [`Reactor`], and blocks the
//! calling thread in [`EventualResult::wait`](crate::eventual::EventualResult::wait)
//! until the crawl finishes or the timeout runs out. Crawl construction,
//! execution and result shaping all happen on the reactor thread; the caller
//! only ever sees the finished value.
//!
//! - [`fetch`]: download one target and return its response, whatever the status
//! - [`crawl`]: start at one target and hand every response to a callback
//! - [`run_spider`]: run a spider as it is defined
//!
//! The free functions use the process-wide reactor, which [`setup`] starts.
//! [`Scraper`] is the same API over an injected reactor, with default
//! settings, an optional shared [`Downloader`] and per-call [`CrawlOptions`].
//!
//! ## Example
//!
//! ```rust,ignore
//! spider_sync::setup()?;
//! let response = spider_sync::fetch("https://example.com")?;
//! println!("{} {}", response.status, response.text());
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{Instrument, debug, info_span};

use crate::builder::CrawlerBuilder;
use crate::collector::ItemCollection;
use crate::downloader::Downloader;
use crate::error::SpiderError;
use crate::eventual::CancellationToken;
use crate::item::ParseOutput;
use crate::reactor::Reactor;
use crate::rebind::{StartPoint, StartRequestsOverride};
use crate::request::HANDLE_HTTPSTATUS_ALL;
use crate::response::Response;
use crate::settings::{Settings, log_crawler_info};
use crate::spider::{DefaultSpider, Spider, SpiderArgs};
use crate::stats::StatCollector;

/// How long a blocking call waits when no timeout is given.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3600);

/// Per-call options of the blocking entry points.
#[derive(Debug, Clone)]
pub struct CrawlOptions {
    /// Install an [`ItemCollection`] and return the items.
    pub capture_items: bool,
    /// Return the finished [`CrawlerHandle`] instead of the shaped value.
    pub return_handle: bool,
    /// Overrides applied on top of the scraper's settings.
    pub settings: Settings,
    pub timeout: Duration,
    /// Extra arguments delivered to [`Spider::open`].
    pub spider_args: SpiderArgs,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        CrawlOptions {
            capture_items: true,
            return_handle: false,
            settings: Settings::new(),
            timeout: DEFAULT_TIMEOUT,
            spider_args: SpiderArgs::new(),
        }
    }
}

impl CrawlOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn capture_items(mut self, capture: bool) -> Self {
        self.capture_items = capture;
        self
    }

    pub fn return_handle(mut self, return_handle: bool) -> Self {
        self.return_handle = return_handle;
        self
    }

    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    pub fn setting(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.settings.set(key, value);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn spider_arg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.spider_args.insert(key.into(), value.into());
        self
    }
}

/// A finished crawl: its spider, statistics, settings and collected items.
pub struct CrawlerHandle<S: Spider> {
    spider: Arc<S>,
    stats: Arc<StatCollector>,
    items: Option<ItemCollection<S::Item>>,
    settings: Settings,
}

impl<S: Spider> Clone for CrawlerHandle<S> {
    fn clone(&self) -> Self {
        CrawlerHandle {
            spider: Arc::clone(&self.spider),
            stats: Arc::clone(&self.stats),
            items: self.items.clone(),
            settings: self.settings.clone(),
        }
    }
}

impl<S: Spider> CrawlerHandle<S> {
    pub fn spider(&self) -> &S {
        &self.spider
    }

    pub fn stats(&self) -> &StatCollector {
        &self.stats
    }

    /// The items collected during the crawl, if collection was enabled.
    pub fn items(&self) -> Option<Vec<S::Item>> {
        self.items.as_ref().map(ItemCollection::to_vec)
    }

    /// The settings the crawl ran with.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }
}

impl<S: Spider> fmt::Debug for CrawlerHandle<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrawlerHandle")
            .field("spider", &self.spider.name())
            .field("stats", &self.stats.snapshot())
            .field("items", &self.items.as_ref().map(ItemCollection::len))
            .field("settings", &self.settings)
            .finish()
    }
}

/// What a blocking call returns: the shaped value, or the whole finished crawl.
pub enum Output<T, S: Spider> {
    Value(T),
    Handle(CrawlerHandle<S>),
}

impl<T: Clone, S: Spider> Clone for Output<T, S> {
    fn clone(&self) -> Self {
        match self {
            Output::Value(value) => Output::Value(value.clone()),
            Output::Handle(handle) => Output::Handle(handle.clone()),
        }
    }
}

impl<T: fmt::Debug, S: Spider> fmt::Debug for Output<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Output::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Output::Handle(handle) => f.debug_tuple("Handle").field(handle).finish(),
        }
    }
}

impl<T, S: Spider> Output<T, S> {
    pub fn into_value(self) -> Option<T> {
        match self {
            Output::Value(value) => Some(value),
            Output::Handle(_) => None,
        }
    }

    pub fn into_handle(self) -> Option<CrawlerHandle<S>> {
        match self {
            Output::Value(_) => None,
            Output::Handle(handle) => Some(handle),
        }
    }
}

/// Runs blocking crawls on an injected reactor.
#[derive(Clone)]
pub struct Scraper {
    reactor: Arc<Reactor>,
    settings: Settings,
    downloader: Option<Arc<dyn Downloader>>,
}

impl Scraper {
    pub fn new(reactor: Arc<Reactor>) -> Self {
        Scraper {
            reactor,
            settings: Settings::new(),
            downloader: None,
        }
    }

    /// A scraper on the process-wide reactor.
    pub fn global() -> Self {
        Scraper::new(Reactor::global())
    }

    /// Default settings for every call; each call's overlay is merged on top.
    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Downloader shared by every crawl instead of a fresh HTTP client per crawl.
    pub fn with_downloader(mut self, downloader: Arc<dyn Downloader>) -> Self {
        self.downloader = Some(downloader);
        self
    }

    pub fn reactor(&self) -> &Arc<Reactor> {
        &self.reactor
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Downloads `target` and returns its response, whatever its status.
    pub fn fetch(&self, target: impl Into<StartPoint>) -> Result<Response, SpiderError> {
        self.fetch_with(DefaultSpider, target, CrawlOptions::default())
            .and_then(expect_value)
    }

    /// Downloads `target` through `spider`; its settings and status handling apply.
    pub fn fetch_with<S: Spider>(
        &self,
        spider: S,
        target: impl Into<StartPoint>,
        opts: CrawlOptions,
    ) -> Result<Output<Response, StartRequestsOverride<S>>, SpiderError> {
        let target: StartPoint = target.into();
        let request = target
            .into_request()?
            .with_meta(HANDLE_HTTPSTATUS_ALL, true)
            .with_dont_filter(true);
        let url = request.url.clone();
        let spider = StartRequestsOverride::new(spider, [request])?.stash_response();

        self.submit("fetch", spider, opts, move |handle| {
            handle
                .spider()
                .response()
                .ok_or(SpiderError::NoResponse(url))
        })
    }

    /// Crawls from `target`, handing every response to `callback`.
    ///
    /// Requests the callback builds with [`Response::follow`] come back to it.
    pub fn crawl<F>(&self, target: impl Into<StartPoint>, callback: F) -> Result<Vec<Value>, SpiderError>
    where
        F: Fn(Response) -> Result<ParseOutput<Value>, SpiderError> + Send + Sync + 'static,
    {
        self.crawl_with(DefaultSpider, target, callback, CrawlOptions::default())
            .and_then(expect_value)
    }

    pub fn crawl_with<S, F>(
        &self,
        spider: S,
        target: impl Into<StartPoint>,
        callback: F,
        opts: CrawlOptions,
    ) -> Result<Output<Vec<S::Item>, StartRequestsOverride<S>>, SpiderError>
    where
        S: Spider,
        F: Fn(Response) -> Result<ParseOutput<S::Item>, SpiderError> + Send + Sync + 'static,
    {
        let spider = StartRequestsOverride::new(spider, [target])?.with_callback(callback);
        self.submit("crawl", spider, opts, collected_items)
    }

    /// Runs `spider` with its own start requests and returns the scraped items.
    pub fn run_spider<S: Spider>(&self, spider: S) -> Result<Vec<S::Item>, SpiderError> {
        self.run_spider_with(spider, CrawlOptions::default())
            .and_then(expect_value)
    }

    pub fn run_spider_with<S: Spider>(
        &self,
        spider: S,
        opts: CrawlOptions,
    ) -> Result<Output<Vec<S::Item>, S>, SpiderError> {
        self.submit("run_spider", spider, opts, collected_items)
    }

    /// The skeleton shared by every entry point: run the crawl on the
    /// reactor, shape its result there, and block until it is published.
    fn submit<S, T, F>(
        &self,
        operation: &'static str,
        spider: S,
        opts: CrawlOptions,
        shape: F,
    ) -> Result<Output<T, S>, SpiderError>
    where
        S: Spider,
        T: Clone + Send + 'static,
        F: FnOnce(&CrawlerHandle<S>) -> Result<T, SpiderError> + Send + 'static,
    {
        let CrawlOptions {
            capture_items,
            return_handle,
            settings,
            timeout,
            spider_args,
        } = opts;
        let settings = self.settings.merged(&settings);
        let downloader = self.downloader.clone();
        let span = info_span!("blocking_crawl", operation, spider = %spider.name());

        let result = self.reactor.submit(move |cancel| {
            async move {
                let handle =
                    execute(spider, settings, downloader, capture_items, spider_args, cancel).await?;
                if return_handle {
                    Ok(Output::Handle(handle))
                } else {
                    shape(&handle).map(Output::Value)
                }
            }
            .instrument(span)
        })?;

        debug!("Waiting up to {:?} for {}", timeout, operation);
        result.wait(timeout)
    }
}

impl fmt::Debug for Scraper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scraper")
            .field("reactor_running", &self.reactor.is_running())
            .field("settings", &self.settings)
            .field("shared_downloader", &self.downloader.is_some())
            .finish()
    }
}

/// Builds and runs one crawl on the reactor thread.
async fn execute<S: Spider>(
    spider: S,
    settings: Settings,
    downloader: Option<Arc<dyn Downloader>>,
    capture_items: bool,
    spider_args: SpiderArgs,
    cancel: CancellationToken,
) -> Result<CrawlerHandle<S>, SpiderError> {
    log_crawler_info(spider.name(), &settings);

    let items = capture_items.then(ItemCollection::<S::Item>::new);
    let mut builder = CrawlerBuilder::new(spider)
        .with_settings(&settings)?
        .spider_args(spider_args);
    if let Some(items) = &items {
        builder = builder.add_pipeline(items.clone());
    }
    if let Some(downloader) = downloader {
        builder = builder.shared_downloader(downloader);
    }

    let crawler = builder.build()?;
    let spider = crawler.spider();
    let stats = crawler.get_stats();
    crawler.start_crawl_until(cancel.cancelled()).await?;

    Ok(CrawlerHandle {
        spider,
        stats,
        items,
        settings,
    })
}

fn collected_items<S: Spider>(handle: &CrawlerHandle<S>) -> Result<Vec<S::Item>, SpiderError> {
    Ok(handle.items().unwrap_or_default())
}

fn expect_value<T, S: Spider>(output: Output<T, S>) -> Result<T, SpiderError> {
    output.into_value().ok_or_else(|| {
        SpiderError::GeneralError("expected a value but the crawl returned a handle".into())
    })
}

/// Starts the process-wide reactor. Safe to call more than once.
pub fn setup() -> Result<(), SpiderError> {
    Reactor::global().start()
}

/// Downloads `target` on the process-wide reactor. See [`Scraper::fetch`].
pub fn fetch(target: impl Into<StartPoint>) -> Result<Response, SpiderError> {
    Scraper::global().fetch(target)
}

/// Crawls from `target` on the process-wide reactor. See [`Scraper::crawl`].
pub fn crawl<F>(target: impl Into<StartPoint>, callback: F) -> Result<Vec<Value>, SpiderError>
where
    F: Fn(Response) -> Result<ParseOutput<Value>, SpiderError> + Send + Sync + 'static,
{
    Scraper::global().crawl(target, callback)
}

/// Runs `spider` on the process-wide reactor. See [`Scraper::run_spider`].
pub fn run_spider<S: Spider>(spider: S) -> Result<Vec<S::Item>, SpiderError> {
    Scraper::global().run_spider(spider)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::CONCURRENT_REQUESTS;

    #[test]
    fn options_default_to_captured_values_and_an_hour() {
        let opts = CrawlOptions::default();
        assert!(opts.capture_items);
        assert!(!opts.return_handle);
        assert!(opts.settings.is_empty());
        assert_eq!(opts.timeout, Duration::from_secs(3600));
    }

    #[test]
    fn options_builder_sets_every_field() {
        let opts = CrawlOptions::new()
            .capture_items(false)
            .return_handle(true)
            .setting(CONCURRENT_REQUESTS, 2)
            .timeout(Duration::from_secs(5))
            .spider_arg("category", "books");

        assert!(!opts.capture_items);
        assert!(opts.return_handle);
        assert_eq!(opts.settings.get_usize(CONCURRENT_REQUESTS).unwrap(), Some(2));
        assert_eq!(opts.timeout, Duration::from_secs(5));
        assert_eq!(opts.spider_args.get("category"), Some(&Value::from("books")));
    }

    #[test]
    fn calls_before_start_are_rejected() {
        let scraper = Scraper::new(Arc::new(Reactor::new()));
        assert!(matches!(
            scraper.run_spider(DefaultSpider),
            Err(SpiderError::ReactorNotRunning)
        ));
    }

    #[test]
    fn malformed_target_fails_before_submission() {
        let scraper = Scraper::new(Arc::new(Reactor::new()));
        assert!(matches!(
            scraper.fetch("definitely not a url"),
            Err(SpiderError::ConfigurationError(_))
        ));
    }
}
