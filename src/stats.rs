//! # Statistics Module
//!
//! Counters describing one crawl.
//!
//! Every crawl gets its own `StatCollector`; a finished
//! [`CrawlerHandle`](crate::facade::CrawlerHandle) exposes it so blocking
//! callers can inspect what happened after the fact.
//!
//! ## Example
//!
//! ```rust,ignore
//! let handle = scraper.run_spider_with(MySpider, CrawlOptions::new().return_handle(true))?
//!     .into_handle()
//!     .unwrap();
//! println!("{}", handle.stats());
//! println!("{}", handle.stats().to_json_string_pretty()?);
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::Serialize;

use crate::error::SpiderError;

/// A consistent copy of the counters, used for every kind of reporting.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub requests_enqueued: usize,
    pub requests_filtered: usize,
    pub requests_sent: usize,
    pub requests_succeeded: usize,
    pub requests_failed: usize,
    pub responses_received: usize,
    pub responses_ignored: usize,
    pub total_bytes_downloaded: usize,
    pub items_scraped: usize,
    pub items_processed: usize,
    pub items_dropped_by_pipeline: usize,
    pub parse_errors: usize,
    pub response_status_counts: BTreeMap<u16, usize>,
    #[serde(skip)]
    pub elapsed: Duration,
}

impl StatsSnapshot {
    fn formatted_bytes(&self) -> String {
        const KB: usize = 1024;
        const MB: usize = 1024 * KB;

        if self.total_bytes_downloaded >= MB {
            format!("{:.2} MB", self.total_bytes_downloaded as f64 / MB as f64)
        } else if self.total_bytes_downloaded >= KB {
            format!("{:.2} KB", self.total_bytes_downloaded as f64 / KB as f64)
        } else {
            format!("{} B", self.total_bytes_downloaded)
        }
    }
}

/// Collects statistics about one crawl. All updates are atomic.
#[derive(Debug)]
pub struct StatCollector {
    start_time: Instant,

    requests_enqueued: AtomicUsize,
    requests_filtered: AtomicUsize,
    requests_sent: AtomicUsize,
    requests_succeeded: AtomicUsize,
    requests_failed: AtomicUsize,

    responses_received: AtomicUsize,
    responses_ignored: AtomicUsize,
    response_status_counts: DashMap<u16, usize>,
    total_bytes_downloaded: AtomicUsize,

    items_scraped: AtomicUsize,
    items_processed: AtomicUsize,
    items_dropped_by_pipeline: AtomicUsize,
    parse_errors: AtomicUsize,
}

impl StatCollector {
    pub(crate) fn new() -> Self {
        StatCollector {
            start_time: Instant::now(),
            requests_enqueued: AtomicUsize::new(0),
            requests_filtered: AtomicUsize::new(0),
            requests_sent: AtomicUsize::new(0),
            requests_succeeded: AtomicUsize::new(0),
            requests_failed: AtomicUsize::new(0),
            responses_received: AtomicUsize::new(0),
            responses_ignored: AtomicUsize::new(0),
            response_status_counts: DashMap::new(),
            total_bytes_downloaded: AtomicUsize::new(0),
            items_scraped: AtomicUsize::new(0),
            items_processed: AtomicUsize::new(0),
            items_dropped_by_pipeline: AtomicUsize::new(0),
            parse_errors: AtomicUsize::new(0),
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let response_status_counts = self
            .response_status_counts
            .iter()
            .map(|entry| (*entry.key(), *entry.value()))
            .collect();

        StatsSnapshot {
            requests_enqueued: self.requests_enqueued.load(Ordering::SeqCst),
            requests_filtered: self.requests_filtered.load(Ordering::SeqCst),
            requests_sent: self.requests_sent.load(Ordering::SeqCst),
            requests_succeeded: self.requests_succeeded.load(Ordering::SeqCst),
            requests_failed: self.requests_failed.load(Ordering::SeqCst),
            responses_received: self.responses_received.load(Ordering::SeqCst),
            responses_ignored: self.responses_ignored.load(Ordering::SeqCst),
            total_bytes_downloaded: self.total_bytes_downloaded.load(Ordering::SeqCst),
            items_scraped: self.items_scraped.load(Ordering::SeqCst),
            items_processed: self.items_processed.load(Ordering::SeqCst),
            items_dropped_by_pipeline: self.items_dropped_by_pipeline.load(Ordering::SeqCst),
            parse_errors: self.parse_errors.load(Ordering::SeqCst),
            response_status_counts,
            elapsed: self.start_time.elapsed(),
        }
    }

    pub(crate) fn increment_requests_enqueued(&self) {
        self.requests_enqueued.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_requests_filtered(&self) {
        self.requests_filtered.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_requests_sent(&self) {
        self.requests_sent.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_requests_succeeded(&self) {
        self.requests_succeeded.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_requests_failed(&self) {
        self.requests_failed.fetch_add(1, Ordering::SeqCst);
    }

    /// Records a received response: its status code and body size.
    pub(crate) fn record_response(&self, status_code: u16, bytes: usize) {
        self.responses_received.fetch_add(1, Ordering::SeqCst);
        self.total_bytes_downloaded.fetch_add(bytes, Ordering::SeqCst);
        *self.response_status_counts.entry(status_code).or_insert(0) += 1;
    }

    pub(crate) fn increment_responses_ignored(&self) {
        self.responses_ignored.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn add_items_scraped(&self, count: usize) {
        self.items_scraped.fetch_add(count, Ordering::SeqCst);
    }

    pub(crate) fn increment_items_processed(&self) {
        self.items_processed.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_items_dropped_by_pipeline(&self) {
        self.items_dropped_by_pipeline.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_parse_errors(&self) {
        self.parse_errors.fetch_add(1, Ordering::SeqCst);
    }

    pub fn to_json_string(&self) -> Result<String, SpiderError> {
        Ok(serde_json::to_string(&self.snapshot())?)
    }

    pub fn to_json_string_pretty(&self) -> Result<String, SpiderError> {
        Ok(serde_json::to_string_pretty(&self.snapshot())?)
    }
}

impl Default for StatCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for StatCollector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let snapshot = self.snapshot();

        writeln!(f, "\nCrawl Statistics")?;
        writeln!(f, "----------------")?;
        writeln!(f, "  duration : {:?}", snapshot.elapsed)?;
        writeln!(
            f,
            "  requests : enqueued: {}, filtered: {}, sent: {}, ok: {}, fail: {}",
            snapshot.requests_enqueued,
            snapshot.requests_filtered,
            snapshot.requests_sent,
            snapshot.requests_succeeded,
            snapshot.requests_failed
        )?;
        writeln!(
            f,
            "  response : received: {}, ignored: {}, downloaded: {}",
            snapshot.responses_received,
            snapshot.responses_ignored,
            snapshot.formatted_bytes()
        )?;
        writeln!(
            f,
            "  items    : scraped: {}, processed: {}, dropped: {}, parse errors: {}",
            snapshot.items_scraped,
            snapshot.items_processed,
            snapshot.items_dropped_by_pipeline,
            snapshot.parse_errors
        )?;

        let status_string = if snapshot.response_status_counts.is_empty() {
            "none".to_string()
        } else {
            snapshot
                .response_status_counts
                .iter()
                .map(|(code, count)| format!("{}: {}", code, count))
                .collect::<Vec<String>>()
                .join(", ")
        };

        writeln!(f, "  status   : {}", status_string)
    }
}
