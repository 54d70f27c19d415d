//! # Builder Module
//!
//! Provides the `CrawlerBuilder`, a fluent API for constructing `Crawler`
//! instances, and `CrawlerConfig`, the engine's tunables.
//!
//! ## Overview
//!
//! The builder assembles a spider, a downloader and the item pipelines into
//! a ready-to-run crawl. Configuration comes either from explicit builder
//! calls or from a [`Settings`] map (`with_settings`), which is how the
//! blocking facade applies each call's settings overlay.
//!
//! ## Example
//!
//! ```rust,ignore
//! use spider_sync::builder::CrawlerBuilder;
//!
//! async fn crawl() -> Result<(), SpiderError> {
//!     let crawler = CrawlerBuilder::new(MySpider)
//!         .max_concurrent_downloads(10)
//!         .max_parser_workers(4)
//!         .add_pipeline(ItemCollection::new())
//!         .build()?;
//!
//!     crawler.start_crawl().await
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use crate::downloader::{Downloader, ReqwestDownloader};
use crate::error::SpiderError;
use crate::pipeline::Pipeline;
use crate::settings::{
    CHANNEL_CAPACITY, CONCURRENT_REQUESTS, DOWNLOAD_TIMEOUT, PARSER_WORKERS, SCHEDULER_MAX_PENDING,
    SHUTDOWN_GRACE, Settings, USER_AGENT,
};
use crate::spider::{Spider, SpiderArgs};

use super::Crawler;

/// Configuration for the crawler's concurrency and HTTP client.
#[derive(Debug, Clone)]
pub struct CrawlerConfig {
    /// The maximum number of concurrent downloads.
    pub max_concurrent_downloads: usize,
    /// The number of workers dedicated to parsing responses.
    pub parser_workers: usize,
    /// The capacity of communication channels between components.
    pub channel_capacity: usize,
    /// Requests the scheduler holds before it starts dropping new ones.
    pub max_pending_requests: usize,
    pub user_agent: String,
    pub download_timeout: Duration,
    /// How long a finished or cancelled crawl waits for its tasks before aborting them.
    pub shutdown_grace: Duration,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        CrawlerConfig {
            max_concurrent_downloads: num_cpus::get().max(16),
            parser_workers: num_cpus::get().clamp(4, 16),
            channel_capacity: 1000,
            max_pending_requests: 10_000,
            user_agent: format!("spider-sync/{}", env!("CARGO_PKG_VERSION")),
            download_timeout: Duration::from_secs(180),
            shutdown_grace: Duration::from_secs(30),
        }
    }
}

impl CrawlerConfig {
    /// Defaults overridden by whichever recognised keys `settings` holds.
    pub fn from_settings(settings: &Settings) -> Result<Self, SpiderError> {
        let mut config = CrawlerConfig::default();
        if let Some(n) = settings.get_usize(CONCURRENT_REQUESTS)? {
            config.max_concurrent_downloads = n;
        }
        if let Some(n) = settings.get_usize(PARSER_WORKERS)? {
            config.parser_workers = n;
        }
        if let Some(n) = settings.get_usize(CHANNEL_CAPACITY)? {
            config.channel_capacity = n;
        }
        if let Some(n) = settings.get_usize(SCHEDULER_MAX_PENDING)? {
            config.max_pending_requests = n;
        }
        if let Some(agent) = settings.get_str(USER_AGENT)? {
            config.user_agent = agent.to_string();
        }
        if let Some(timeout) = settings.get_duration_secs(DOWNLOAD_TIMEOUT)? {
            config.download_timeout = timeout;
        }
        if let Some(grace) = settings.get_duration_secs(SHUTDOWN_GRACE)? {
            config.shutdown_grace = grace;
        }
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), SpiderError> {
        if self.max_concurrent_downloads == 0 {
            return Err(SpiderError::ConfigurationError(
                "max_concurrent_downloads must be greater than 0.".to_string(),
            ));
        }
        if self.parser_workers == 0 {
            return Err(SpiderError::ConfigurationError(
                "parser_workers must be greater than 0.".to_string(),
            ));
        }
        if self.channel_capacity == 0 {
            return Err(SpiderError::ConfigurationError(
                "channel_capacity must be greater than 0.".to_string(),
            ));
        }
        Ok(())
    }
}

pub struct CrawlerBuilder<S: Spider> {
    crawler_config: CrawlerConfig,
    downloader: Option<Arc<dyn Downloader>>,
    spider: Option<S>,
    spider_args: SpiderArgs,
    item_pipelines: Vec<Box<dyn Pipeline<S::Item>>>,
}

impl<S: Spider> CrawlerBuilder<S> {
    /// Creates a new `CrawlerBuilder` for a given spider.
    pub fn new(spider: S) -> Self {
        CrawlerBuilder {
            crawler_config: CrawlerConfig::default(),
            downloader: None,
            spider: Some(spider),
            spider_args: SpiderArgs::new(),
            item_pipelines: Vec::new(),
        }
    }

    /// Replaces the whole configuration with one derived from `settings`.
    pub fn with_settings(mut self, settings: &Settings) -> Result<Self, SpiderError> {
        self.crawler_config = CrawlerConfig::from_settings(settings)?;
        Ok(self)
    }

    pub fn config(mut self, config: CrawlerConfig) -> Self {
        self.crawler_config = config;
        self
    }

    /// Sets the maximum number of concurrent downloads.
    pub fn max_concurrent_downloads(mut self, limit: usize) -> Self {
        self.crawler_config.max_concurrent_downloads = limit;
        self
    }

    /// Sets the maximum number of concurrent parser workers.
    pub fn max_parser_workers(mut self, limit: usize) -> Self {
        self.crawler_config.parser_workers = limit;
        self
    }

    /// Sets the capacity of communication channels between components.
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.crawler_config.channel_capacity = capacity;
        self
    }

    /// Sets a custom downloader for the crawler.
    pub fn downloader<D: Downloader>(mut self, downloader: D) -> Self {
        self.downloader = Some(Arc::new(downloader));
        self
    }

    /// Sets a downloader shared with other crawls.
    pub fn shared_downloader(mut self, downloader: Arc<dyn Downloader>) -> Self {
        self.downloader = Some(downloader);
        self
    }

    /// Adds an item pipeline to the crawler. Pipelines run in insertion order.
    pub fn add_pipeline<P>(mut self, pipeline: P) -> Self
    where
        P: Pipeline<S::Item>,
    {
        self.item_pipelines.push(Box::new(pipeline));
        self
    }

    /// Extra arguments passed to [`Spider::open`] when the crawler is built.
    pub fn spider_args(mut self, args: SpiderArgs) -> Self {
        self.spider_args = args;
        self
    }

    /// Builds the `Crawler`, opening the spider and creating the default
    /// downloader when none was set.
    pub fn build(mut self) -> Result<Crawler<S>, SpiderError> {
        self.crawler_config.validate()?;
        let mut spider = self.spider.take().ok_or_else(|| {
            SpiderError::ConfigurationError("Crawler must have a spider.".to_string())
        })?;
        spider.open(&self.spider_args)?;

        let downloader = match self.downloader {
            Some(downloader) => downloader,
            None => Arc::new(ReqwestDownloader::new(&self.crawler_config)?),
        };

        Ok(Crawler::new(
            spider,
            downloader,
            self.item_pipelines,
            self.crawler_config,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spider::DefaultSpider;
    use rstest::rstest;

    #[test]
    fn settings_override_defaults() {
        let settings = Settings::new()
            .with(CONCURRENT_REQUESTS, 3)
            .with(PARSER_WORKERS, 2)
            .with(USER_AGENT, "test-agent")
            .with(DOWNLOAD_TIMEOUT, 2.5)
            .with(SHUTDOWN_GRACE, 0.25);

        let config = CrawlerConfig::from_settings(&settings).unwrap();

        assert_eq!(config.max_concurrent_downloads, 3);
        assert_eq!(config.parser_workers, 2);
        assert_eq!(config.user_agent, "test-agent");
        assert_eq!(config.download_timeout, Duration::from_millis(2500));
        assert_eq!(config.shutdown_grace, Duration::from_millis(250));
        assert_eq!(config.channel_capacity, CrawlerConfig::default().channel_capacity);
    }

    #[rstest]
    #[case(CONCURRENT_REQUESTS)]
    #[case(PARSER_WORKERS)]
    #[case(CHANNEL_CAPACITY)]
    fn zero_limits_are_rejected(#[case] key: &str) {
        let settings = Settings::new().with(key, 0);
        assert!(matches!(
            CrawlerConfig::from_settings(&settings),
            Err(SpiderError::ConfigurationError(_))
        ));
    }

    #[test]
    fn build_fails_on_invalid_builder_config() {
        let result = CrawlerBuilder::new(DefaultSpider).max_parser_workers(0).build();
        assert!(matches!(result, Err(SpiderError::ConfigurationError(_))));
    }
}
