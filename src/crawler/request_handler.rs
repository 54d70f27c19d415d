//! The downloader task: takes requests from the scheduler, downloads them
//! with bounded concurrency and forwards responses to the parser workers.

use std::sync::Arc;

use kanal::{AsyncReceiver, AsyncSender};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{error, trace, warn};

use crate::downloader::Downloader;
use crate::request::Request;
use crate::response::Response;
use crate::scheduler::Scheduler;
use crate::state::CrawlerState;
use crate::stats::StatCollector;

pub(crate) fn spawn_downloader_task(
    scheduler: Arc<Scheduler>,
    req_rx: AsyncReceiver<Request>,
    downloader: Arc<dyn Downloader>,
    state: Arc<CrawlerState>,
    res_tx: AsyncSender<Response>,
    max_concurrent_downloads: usize,
    stats: Arc<StatCollector>,
) -> tokio::task::JoinHandle<()> {
    let semaphore = Arc::new(Semaphore::new(max_concurrent_downloads));
    let mut tasks = JoinSet::new();

    tokio::spawn(async move {
        trace!(
            "Downloader task started with max_concurrent_downloads: {}",
            max_concurrent_downloads
        );
        while let Ok(request) = req_rx.recv().await {
            if scheduler.is_shutting_down.load(std::sync::atomic::Ordering::SeqCst) {
                trace!("Scheduler is shutting down, dropping request: {}", request.url);
                scheduler.mark_dispatched();
                continue;
            }

            // Counted as in flight before the scheduler stops counting it.
            CrawlerState::enter(&state.in_flight_requests);
            scheduler.mark_dispatched();

            let permit = match Arc::clone(&semaphore).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    warn!("Download semaphore closed, stopping downloader task.");
                    CrawlerState::leave(&state.in_flight_requests);
                    break;
                }
            };

            let downloader = Arc::clone(&downloader);
            let state = Arc::clone(&state);
            let stats = Arc::clone(&stats);
            let res_tx = res_tx.clone();

            tasks.spawn(async move {
                let url = request.url.clone();
                stats.increment_requests_sent();
                let start_time = Instant::now();

                match downloader.download(request).await {
                    Ok(response) => {
                        trace!("Downloaded {} in {:?}", url, start_time.elapsed());
                        stats.increment_requests_succeeded();
                        stats.record_response(response.status.as_u16(), response.body.len());

                        CrawlerState::enter(&state.parsing_responses);
                        if res_tx.send(response).await.is_err() {
                            error!("Response channel closed, dropping response for {}", url);
                            CrawlerState::leave(&state.parsing_responses);
                        }
                    }
                    Err(e) => {
                        error!("Download error for URL {}: {}", url, e);
                        stats.increment_requests_failed();
                    }
                }

                CrawlerState::leave(&state.in_flight_requests);
                drop(permit);
            });
        }

        trace!("Waiting for active download tasks to complete");
        while let Some(res) = tasks.join_next().await {
            if let Err(e) = res {
                error!("A download task failed: {:?}", e);
            }
        }
        trace!("Downloader task finished");
    })
}
