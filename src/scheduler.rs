//! # Scheduler Module
//!
//! The crawl frontier of one crawl: a FIFO request queue plus duplicate
//! detection.
//!
//! ## Architecture
//!
//! The scheduler runs as a small actor task. `enqueue_request` checks the
//! duplicate filter, counts the request as pending and posts it to the actor
//! over an internal channel; the actor keeps the queue and feeds requests to
//! the downloader over a bounded channel. A request stays "pending" until the
//! downloader calls [`Scheduler::mark_dispatched`], so there is no moment in
//! which a request is counted by neither the scheduler nor the crawler state.
//!
//! Requests with `dont_filter` set skip the duplicate filter, so explicit
//! one-shot requests are always issued.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crossbeam::queue::SegQueue;
use kanal::{AsyncReceiver, AsyncSender, bounded_async, unbounded_async};
use moka::sync::Cache;
use tracing::{debug, error, info, trace, warn};

use crate::error::SpiderError;
use crate::request::Request;

enum SchedulerMessage {
    Enqueue(Box<Request>),
    Shutdown,
}

/// What happened to a request passed to [`Scheduler::enqueue_request`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    Queued,
    /// Dropped by the duplicate filter.
    Filtered,
}

pub struct Scheduler {
    request_queue: SegQueue<Request>,
    seen_fingerprints: Cache<String, ()>,
    tx_internal: AsyncSender<SchedulerMessage>,
    pending_requests: AtomicUsize,
    pub(crate) is_shutting_down: AtomicBool,
    max_pending_requests: usize,
}

impl Scheduler {
    /// Creates a scheduler, spawns its actor on the current runtime and
    /// returns the receiving end the downloader reads from.
    pub fn new(max_pending_requests: usize, channel_capacity: usize) -> (Arc<Self>, AsyncReceiver<Request>) {
        let (tx_internal, rx_internal) = unbounded_async();
        let (tx_req_out, rx_req_out) = bounded_async(channel_capacity.max(1));

        let scheduler = Arc::new(Scheduler {
            request_queue: SegQueue::new(),
            seen_fingerprints: Cache::builder().max_capacity(100_000).build(),
            tx_internal,
            pending_requests: AtomicUsize::new(0),
            is_shutting_down: AtomicBool::new(false),
            max_pending_requests,
        });

        let scheduler_clone = Arc::clone(&scheduler);
        tokio::spawn(async move {
            scheduler_clone.run_loop(rx_internal, tx_req_out).await;
        });

        (scheduler, rx_req_out)
    }

    async fn run_loop(&self, rx_internal: AsyncReceiver<SchedulerMessage>, tx_req_out: AsyncSender<Request>) {
        debug!(
            "Scheduler run_loop started with max pending requests: {}",
            self.max_pending_requests
        );
        loop {
            // Drain control messages before handing out more work.
            if let Ok(Some(msg)) = rx_internal.try_recv() {
                if !self.handle_message(Ok(msg)) {
                    break;
                }
                continue;
            }

            if let Some(request) = self.request_queue.pop() {
                trace!("Sending request to crawler: {}", request.url);
                if tx_req_out.send(request).await.is_err() {
                    if !self.is_shutting_down.load(Ordering::SeqCst) {
                        error!("Crawler receiver dropped. Scheduler can no longer send requests.");
                    }
                    break;
                }
            } else if !self.handle_message(rx_internal.recv().await) {
                break;
            }
        }
        debug!(
            "Scheduler run_loop finished with {} pending requests remaining.",
            self.pending_requests.load(Ordering::SeqCst)
        );
    }

    fn handle_message(&self, msg: Result<SchedulerMessage, kanal::ReceiveError>) -> bool {
        match msg {
            Ok(SchedulerMessage::Enqueue(request)) => {
                self.request_queue.push(*request);
                true
            }
            Ok(SchedulerMessage::Shutdown) => {
                info!("Scheduler received shutdown signal.");
                self.is_shutting_down.store(true, Ordering::SeqCst);
                false
            }
            Err(_) => {
                warn!("Scheduler internal message channel closed.");
                self.is_shutting_down.store(true, Ordering::SeqCst);
                false
            }
        }
    }

    /// Adds a request to the frontier unless the duplicate filter rejects it.
    pub async fn enqueue_request(&self, request: Request) -> Result<Enqueued, SpiderError> {
        if self.is_shutting_down.load(Ordering::SeqCst) {
            return Err(SpiderError::GeneralError(format!(
                "scheduler is shutting down, request dropped: {}",
                request.url
            )));
        }

        let fingerprint = (!request.dont_filter).then(|| request.fingerprint());
        if let Some(fingerprint) = &fingerprint
            && self.seen_fingerprints.contains_key(fingerprint)
        {
            trace!("Filtered duplicate request: {}", request.url);
            return Ok(Enqueued::Filtered);
        }

        // Only accepted requests are fingerprinted; rejected ones may be retried.
        let current_pending = self.pending_requests.load(Ordering::SeqCst);
        if current_pending >= self.max_pending_requests {
            warn!(
                "Maximum pending requests reached ({}), request dropped: {}",
                self.max_pending_requests, request.url
            );
            return Err(SpiderError::GeneralError(
                "scheduler at maximum capacity, request dropped".into(),
            ));
        }

        if let Some(fingerprint) = &fingerprint {
            self.seen_fingerprints.insert(fingerprint.clone(), ());
        }
        self.pending_requests.fetch_add(1, Ordering::SeqCst);
        let url = request.url.clone();
        if self
            .tx_internal
            .send(SchedulerMessage::Enqueue(Box::new(request)))
            .await
            .is_err()
        {
            self.pending_requests.fetch_sub(1, Ordering::SeqCst);
            if let Some(fingerprint) = &fingerprint {
                self.seen_fingerprints.invalidate(fingerprint);
            }
            return Err(SpiderError::GeneralError(format!(
                "scheduler channel closed, request dropped: {url}"
            )));
        }

        trace!("Enqueued request: {}", url);
        Ok(Enqueued::Queued)
    }

    /// Called by the downloader once it has taken ownership of a request.
    pub(crate) fn mark_dispatched(&self) {
        self.pending_requests.fetch_sub(1, Ordering::SeqCst);
    }

    /// Stops the actor; requests still queued are discarded.
    pub async fn shutdown(&self) -> Result<(), SpiderError> {
        self.is_shutting_down.store(true, Ordering::SeqCst);
        if self.tx_internal.is_closed() {
            debug!("Scheduler internal channel already closed, skipping shutdown signal");
            return Ok(());
        }
        self.tx_internal
            .send(SchedulerMessage::Shutdown)
            .await
            .map_err(|e| SpiderError::GeneralError(format!("failed to send scheduler shutdown: {e}")))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.pending_requests.load(Ordering::SeqCst)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn is_idle(&self) -> bool {
        self.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn duplicates_are_filtered_unless_dont_filter() {
        let (scheduler, rx) = Scheduler::new(100, 10);
        let first = Request::get("https://example.com/a").unwrap();
        let again = first.clone();
        let forced = first.clone().with_dont_filter(true);

        assert_eq!(scheduler.enqueue_request(first).await.unwrap(), Enqueued::Queued);
        assert_eq!(scheduler.enqueue_request(again).await.unwrap(), Enqueued::Filtered);
        assert_eq!(scheduler.enqueue_request(forced).await.unwrap(), Enqueued::Queued);
        assert_eq!(scheduler.len(), 2);

        let a = rx.recv().await.unwrap();
        scheduler.mark_dispatched();
        let b = rx.recv().await.unwrap();
        scheduler.mark_dispatched();
        assert_eq!(a.url, b.url);
        assert!(b.dont_filter);
        assert!(scheduler.is_idle());
    }

    #[tokio::test]
    async fn requests_come_out_in_fifo_order() {
        let (scheduler, rx) = Scheduler::new(100, 10);
        for path in ["one", "two", "three"] {
            let req = Request::get(&format!("https://example.com/{path}")).unwrap();
            scheduler.enqueue_request(req).await.unwrap();
        }

        let mut paths = Vec::new();
        for _ in 0..3 {
            paths.push(rx.recv().await.unwrap().url.path().to_string());
        }
        assert_eq!(paths, ["/one", "/two", "/three"]);
    }

    #[tokio::test]
    async fn rejects_requests_after_shutdown_and_when_full() {
        let (scheduler, _rx) = Scheduler::new(1, 10);
        scheduler
            .enqueue_request(Request::get("https://example.com/1").unwrap())
            .await
            .unwrap();
        assert!(
            scheduler
                .enqueue_request(Request::get("https://example.com/2").unwrap())
                .await
                .is_err()
        );

        scheduler.shutdown().await.unwrap();
        assert!(
            scheduler
                .enqueue_request(Request::get("https://example.com/3").unwrap())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn request_dropped_at_capacity_can_be_retried() {
        let (scheduler, rx) = Scheduler::new(1, 10);
        let first = Request::get("https://example.com/a").unwrap();
        let second = Request::get("https://example.com/b").unwrap();

        assert_eq!(scheduler.enqueue_request(first).await.unwrap(), Enqueued::Queued);
        assert!(scheduler.enqueue_request(second.clone()).await.is_err());

        assert_eq!(rx.recv().await.unwrap().url.path(), "/a");
        scheduler.mark_dispatched();

        assert_eq!(scheduler.enqueue_request(second).await.unwrap(), Enqueued::Queued);
        assert_eq!(rx.recv().await.unwrap().url.path(), "/b");
    }
}
