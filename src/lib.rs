//! # spider-sync
//!
//! Blocking `fetch` / `crawl` / `run_spider` calls on top of a crawl engine
//! that runs on one background event-loop thread.
//!
//! ## Layers
//!
//! - **Bridge**: [`reactor`], [`eventual`], [`collector`], [`rebind`] and
//!   [`facade`]. Work is submitted to the reactor thread and the caller blocks
//!   on an [`EventualResult`] with a timeout.
//! - **Engine**: [`spider`], [`request`], [`response`], [`item`],
//!   [`pipeline`], [`downloader`], [`scheduler`], [`crawler`], [`builder`],
//!   [`state`] and [`stats`]. A tokio crawl engine with a scheduler actor,
//!   concurrent downloads, parser workers and item pipelines.
//!
//! ## Example
//!
//! ```rust,ignore
//! use spider_sync::prelude::*;
//! use serde_json::json;
//!
//! fn main() -> Result<(), SpiderError> {
//!     spider_sync::setup()?;
//!
//!     let items = spider_sync::crawl("https://example.com", |response: Response| {
//!         Ok(ParseOutput::item(json!({ "url": response.url.as_str() })))
//!     })?;
//!     println!("{items:?}");
//!     Ok(())
//! }
//! ```

pub mod builder;
pub mod collector;
pub mod crawler;
pub mod downloader;
pub mod error;
pub mod eventual;
pub mod facade;
pub mod item;
pub mod pipeline;
pub mod prelude;
pub mod reactor;
pub mod rebind;
pub mod request;
pub mod response;
pub mod scheduler;
pub mod settings;
pub mod spider;
pub mod state;
pub mod stats;

pub use builder::{CrawlerBuilder, CrawlerConfig};
pub use collector::ItemCollection;
pub use crawler::Crawler;
pub use downloader::{Downloader, ReqwestDownloader};
pub use error::SpiderError;
pub use eventual::{CancellationToken, EventualResult};
pub use facade::{
    CrawlOptions, CrawlerHandle, DEFAULT_TIMEOUT, Output, Scraper, crawl, fetch, run_spider, setup,
};
pub use item::{ParseOutput, ScrapedItem};
pub use pipeline::Pipeline;
pub use reactor::Reactor;
pub use rebind::{START_CALLBACK, StartPoint, StartRequestsOverride};
pub use request::Request;
pub use response::Response;
pub use scheduler::Scheduler;
pub use settings::Settings;
pub use spider::{DefaultSpider, Spider, SpiderArgs};
pub use stats::{StatCollector, StatsSnapshot};

pub use async_trait::async_trait;
