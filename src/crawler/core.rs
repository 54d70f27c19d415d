//! The core Crawler implementation.
//!
//! This module defines the `Crawler` struct, which acts as the central
//! orchestrator of one crawl. It ties together the scheduler, downloader,
//! spider and item pipelines, runs until the crawl becomes idle (or a
//! shutdown is requested) and then winds every task down in order.
//!
//! It utilizes a task-based asynchronous model, spawning distinct tasks for
//! the scheduler, downloading, parsing and item processing. All of them are
//! plain `tokio::spawn` tasks, so on a current-thread runtime the whole crawl
//! runs on that runtime's thread.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use kanal::bounded_async;
use tracing::{debug, error, info, trace, warn};

use crate::builder::CrawlerConfig;
use crate::downloader::Downloader;
use crate::error::SpiderError;
use crate::pipeline::Pipeline;
use crate::scheduler::{Enqueued, Scheduler};
use crate::spider::Spider;
use crate::state::CrawlerState;
use crate::stats::StatCollector;

/// The central orchestrator for one crawl.
pub struct Crawler<S: Spider> {
    spider: Arc<S>,
    downloader: Arc<dyn Downloader>,
    item_pipelines: Vec<Box<dyn Pipeline<S::Item>>>,
    config: CrawlerConfig,
    stats: Arc<StatCollector>,
}

impl<S: Spider> Crawler<S> {
    pub(crate) fn new(
        spider: S,
        downloader: Arc<dyn Downloader>,
        item_pipelines: Vec<Box<dyn Pipeline<S::Item>>>,
        config: CrawlerConfig,
    ) -> Self {
        Crawler {
            spider: Arc::new(spider),
            downloader,
            item_pipelines,
            config,
            stats: Arc::new(StatCollector::new()),
        }
    }

    /// Runs the crawl until it has nothing left to do.
    pub async fn start_crawl(self) -> Result<(), SpiderError> {
        self.start_crawl_until(std::future::pending::<()>()).await
    }

    /// Runs the crawl until it has nothing left to do or `shutdown` resolves,
    /// whichever comes first.
    pub async fn start_crawl_until<F>(self, shutdown: F) -> Result<(), SpiderError>
    where
        F: Future<Output = ()> + Send,
    {
        let Crawler {
            spider,
            downloader,
            item_pipelines,
            config,
            stats,
        } = self;

        info!(
            "Crawler starting spider '{}': max_concurrent_downloads={}, parser_workers={}",
            spider.name(),
            config.max_concurrent_downloads,
            config.parser_workers
        );

        let start_requests = spider.start_requests()?;
        if start_requests.is_empty() {
            return Err(SpiderError::ConfigurationError(format!(
                "spider '{}' defines no start requests",
                spider.name()
            )));
        }

        let state = CrawlerState::new();
        let pipelines = Arc::new(item_pipelines);
        let (scheduler, req_rx) = Scheduler::new(config.max_pending_requests, config.channel_capacity);

        for mut request in start_requests {
            request.url.set_fragment(None);
            match scheduler.enqueue_request(request).await {
                Ok(Enqueued::Queued) => stats.increment_requests_enqueued(),
                Ok(Enqueued::Filtered) => stats.increment_requests_filtered(),
                Err(e) => error!("Failed to enqueue initial request: {}", e),
            }
        }

        trace!("Creating communication channels with capacity: {}", config.channel_capacity);
        let (res_tx, res_rx) = bounded_async(config.channel_capacity);
        let (item_tx, item_rx) = bounded_async(config.channel_capacity);

        let downloader_task = super::spawn_downloader_task(
            Arc::clone(&scheduler),
            req_rx,
            downloader,
            Arc::clone(&state),
            res_tx,
            config.max_concurrent_downloads,
            Arc::clone(&stats),
        );

        let parser_task = super::spawn_parser_task::<S>(
            Arc::clone(&scheduler),
            Arc::clone(&spider),
            Arc::clone(&state),
            res_rx,
            item_tx,
            config.parser_workers,
            Arc::clone(&stats),
        );

        let item_processor_task = super::spawn_item_processor_task(
            Arc::clone(&state),
            item_rx,
            Arc::clone(&pipelines),
            Arc::clone(&stats),
        );

        tokio::select! {
            _ = shutdown => {
                info!("Shutdown requested, stopping spider '{}' early.", spider.name());
            }
            _ = wait_until_idle(&scheduler, &state) => {
                info!("Crawl has become idle, initiating shutdown.");
            }
        };

        if let Err(e) = scheduler.shutdown().await {
            error!("Error during scheduler shutdown: {}", e);
        }

        let mut tasks = [
            ("downloader", downloader_task),
            ("parser", parser_task),
            ("item processor", item_processor_task),
        ];
        let drained = tokio::time::timeout(config.shutdown_grace, async {
            for (name, task) in tasks.iter_mut() {
                if let Err(e) = task.await {
                    error!("The {} task failed during shutdown: {}", name, e);
                }
            }
        })
        .await;
        if drained.is_err() {
            warn!(
                "Tasks did not complete within {:?}, aborting remaining tasks",
                config.shutdown_grace
            );
            // Dropping an aborted stage also drops its in-flight downloads and parses.
            for (_, task) in &tasks {
                task.abort();
            }
        }

        debug!("Closing item pipelines");
        for result in join_all(pipelines.iter().map(|p| p.close())).await {
            if let Err(e) = result {
                error!("Failed to close pipeline: {}", e);
            }
        }

        let snapshot = stats.snapshot();
        info!(
            "Crawl finished. Stats: requests_enqueued={}, requests_succeeded={}, items_scraped={}",
            snapshot.requests_enqueued, snapshot.requests_succeeded, snapshot.items_scraped
        );
        Ok(())
    }

    /// The spider instance shared by the crawl's workers.
    pub fn spider(&self) -> Arc<S> {
        Arc::clone(&self.spider)
    }

    /// Returns a cloned Arc to the `StatCollector` instance used by this crawler.
    pub fn get_stats(&self) -> Arc<StatCollector> {
        Arc::clone(&self.stats)
    }
}

async fn wait_until_idle(scheduler: &Scheduler, state: &CrawlerState) {
    loop {
        if scheduler.is_idle() && state.is_idle() {
            tokio::time::sleep(Duration::from_millis(20)).await;
            if scheduler.is_idle() && state.is_idle() {
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}
