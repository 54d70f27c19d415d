//! Tracks work in flight inside one crawl.
//!
//! Each counter is raised before a unit of work is handed to the next stage
//! and lowered only after that stage has handed on everything it produced.
//! Together with the scheduler's pending count this makes "all zero" a
//! reliable signal that the crawl has nothing left to do.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub struct CrawlerState {
    /// Requests taken from the scheduler and not yet downloaded.
    pub in_flight_requests: AtomicUsize,
    /// Responses waiting for, or inside, a spider callback.
    pub parsing_responses: AtomicUsize,
    /// Items waiting for, or inside, the pipelines.
    pub processing_items: AtomicUsize,
}

impl CrawlerState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn is_idle(&self) -> bool {
        self.in_flight_requests.load(Ordering::SeqCst) == 0
            && self.parsing_responses.load(Ordering::SeqCst) == 0
            && self.processing_items.load(Ordering::SeqCst) == 0
    }

    pub(crate) fn enter(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn leave(counter: &AtomicUsize) {
        counter.fetch_sub(1, Ordering::SeqCst);
    }
}
