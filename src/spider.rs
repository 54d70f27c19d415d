//! # Spider Module
//!
//! Defines the `Spider` trait implemented by every crawl definition.
//!
//! ## Overview
//!
//! A spider says where a crawl starts (`start_urls` / `start_requests`) and
//! how responses turn into items and follow-up requests (`parse`). Requests
//! may name another callback; the engine then calls `parse_with` with that
//! name instead of `parse`. Spiders are shared by all parser workers of a
//! crawl, so callbacks take `&self` and any per-crawl state needs interior
//! mutability.
//!
//! ## Example
//!
//! ```rust,ignore
//! use spider_sync::prelude::*;
//! use serde_json::{json, Value};
//!
//! struct TitleSpider;
//!
//! #[async_trait]
//! impl Spider for TitleSpider {
//!     type Item = Value;
//!
//!     fn start_urls(&self) -> Vec<&str> {
//!         vec!["https://example.com"]
//!     }
//!
//!     async fn parse(&self, response: Response) -> Result<ParseOutput<Value>, SpiderError> {
//!         Ok(ParseOutput::item(json!({ "url": response.url.as_str() })))
//!     }
//! }
//! ```

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use url::Url;

use crate::error::SpiderError;
use crate::item::{ParseOutput, ScrapedItem};
use crate::request::Request;
use crate::response::Response;

/// Extra engine arguments handed to [`Spider::open`].
pub type SpiderArgs = HashMap<String, Value>;

/// Defines the contract for a web spider.
#[async_trait]
pub trait Spider: Send + Sync + 'static {
    /// The type of item that the spider scrapes.
    type Item: ScrapedItem;

    /// Name used in logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Returns the initial URLs to start crawling from.
    fn start_urls(&self) -> Vec<&str> {
        Vec::new()
    }

    /// Generates the initial requests to start crawling.
    ///
    /// A start url that does not parse is a `ConfigurationError`.
    fn start_requests(&self) -> Result<Vec<Request>, SpiderError> {
        self.start_urls()
            .into_iter()
            .map(|url| {
                Url::parse(url).map(Request::new).map_err(|e| {
                    SpiderError::ConfigurationError(format!("invalid start url '{url}': {e}"))
                })
            })
            .collect()
    }

    /// Non-2xx statuses that should still be parsed.
    fn handle_httpstatus_list(&self) -> &[u16] {
        &[]
    }

    /// Receives the extra engine arguments before the crawl starts.
    fn open(&mut self, _args: &SpiderArgs) -> Result<(), SpiderError> {
        Ok(())
    }

    /// Parses a response and extracts scraped items and new requests.
    async fn parse(&self, response: Response) -> Result<ParseOutput<Self::Item>, SpiderError>;

    /// Dispatches a response to the named callback of its request.
    async fn parse_with(
        &self,
        callback: &str,
        _response: Response,
    ) -> Result<ParseOutput<Self::Item>, SpiderError> {
        Err(SpiderError::ConfigurationError(format!(
            "spider '{}' has no callback named '{}'",
            self.name(),
            callback
        )))
    }
}

/// The spider used when a call does not supply one: no start urls, and a
/// `parse` that produces nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultSpider;

#[async_trait]
impl Spider for DefaultSpider {
    type Item = Value;

    fn name(&self) -> &str {
        "default"
    }

    async fn parse(&self, _response: Response) -> Result<ParseOutput<Value>, SpiderError> {
        Ok(ParseOutput::new())
    }
}
