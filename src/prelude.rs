//! A "prelude" for users of the `spider-sync` crate.
//!
//! This prelude re-exports the most commonly used traits, structs, and
//! functions so that they can be easily imported.
//!
//! # Example
//!
//! ```
//! use spider_sync::prelude::*;
//! ```

pub use crate::{
    // Blocking entry points
    CrawlOptions,
    CrawlerHandle,
    Output,
    Scraper,
    crawl,
    fetch,
    run_spider,
    setup,
    // Core traits
    Downloader,
    Pipeline,
    Spider,
    // Data types
    ParseOutput,
    Request,
    Response,
    Settings,
    SpiderError,
    StartRequestsOverride,
    // Essential re-exports for trait implementation
    async_trait,
};
