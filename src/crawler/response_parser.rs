//! # Response Parser Module
//!
//! Runs spider callbacks on downloaded responses.
//!
//! A fixed pool of parser workers shares the response channel. For every
//! response a worker first applies the HTTP status filter, then resolves the
//! callback (the request's named callback, or `Spider::parse`), and finally
//! hands the produced requests to the scheduler and the produced items to the
//! item processor. Callback errors and panics are logged and counted; they
//! never stop the crawl.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use kanal::{AsyncReceiver, AsyncSender};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, trace, warn};

use crate::error::SpiderError;
use crate::item::ParseOutput;
use crate::response::Response;
use crate::scheduler::{Enqueued, Scheduler};
use crate::spider::Spider;
use crate::state::CrawlerState;
use crate::stats::StatCollector;

#[allow(clippy::too_many_arguments)]
pub(crate) fn spawn_parser_task<S>(
    scheduler: Arc<Scheduler>,
    spider: Arc<S>,
    state: Arc<CrawlerState>,
    res_rx: AsyncReceiver<Response>,
    item_tx: AsyncSender<S::Item>,
    parser_workers: usize,
    stats: Arc<StatCollector>,
) -> tokio::task::JoinHandle<()>
where
    S: Spider,
{
    let mut workers = JoinSet::new();
    for worker_id in 0..parser_workers.max(1) {
        let res_rx = res_rx.clone();
        let spider = Arc::clone(&spider);
        let scheduler = Arc::clone(&scheduler);
        let item_tx = item_tx.clone();
        let state = Arc::clone(&state);
        let stats = Arc::clone(&stats);

        workers.spawn(async move {
            while let Ok(response) = res_rx.recv().await {
                if accepts_status(spider.as_ref(), &response) {
                    let start_time = Instant::now();
                    let url = response.url.clone();
                    match run_callback(spider.as_ref(), response).await {
                        Ok(outputs) => {
                            trace!("Worker {} parsed {} in {:?}", worker_id, url, start_time.elapsed());
                            process_crawl_outputs::<S>(outputs, &scheduler, &item_tx, &state, &stats).await;
                        }
                        Err(e) => {
                            error!("Spider parsing error for {}: {}", url, e);
                            stats.increment_parse_errors();
                        }
                    }
                } else {
                    debug!(
                        "Ignoring response {} ({}): HTTP status is not handled",
                        response.url, response.status
                    );
                    stats.increment_responses_ignored();
                }
                CrawlerState::leave(&state.parsing_responses);
            }
        });
    }
    drop(item_tx);

    tokio::spawn(async move {
        while let Some(res) = workers.join_next().await {
            if let Err(e) = res {
                error!("A parsing worker task failed: {:?}", e);
            }
        }
        trace!("Response parser finished");
    })
}

fn accepts_status<S: Spider>(spider: &S, response: &Response) -> bool {
    response.status.is_success()
        || response.request_from_response().handles_all_statuses()
        || spider
            .handle_httpstatus_list()
            .contains(&response.status.as_u16())
}

async fn run_callback<S: Spider>(spider: &S, response: Response) -> Result<ParseOutput<S::Item>, SpiderError> {
    let callback = response.request_from_response().callback.clone();
    let outcome = match callback {
        Some(name) => AssertUnwindSafe(spider.parse_with(&name, response)).catch_unwind().await,
        None => AssertUnwindSafe(spider.parse(response)).catch_unwind().await,
    };
    outcome.unwrap_or_else(|panic| Err(SpiderError::Panicked(crate::reactor::panic_message(&*panic))))
}

pub(crate) async fn process_crawl_outputs<S>(
    outputs: ParseOutput<S::Item>,
    scheduler: &Scheduler,
    item_tx: &AsyncSender<S::Item>,
    state: &CrawlerState,
    stats: &StatCollector,
) where
    S: Spider,
{
    let (items, requests) = outputs.into_parts();
    let items_len = items.len();
    let requests_len = requests.len();

    if requests_len > 0 || items_len > 0 {
        debug!(
            "Processing {} requests and {} items from spider output.",
            requests_len, items_len
        );
    }

    for request in requests {
        match scheduler.enqueue_request(request).await {
            Ok(Enqueued::Queued) => stats.increment_requests_enqueued(),
            Ok(Enqueued::Filtered) => stats.increment_requests_filtered(),
            Err(e) => warn!("Failed to enqueue request: {}", e),
        }
    }

    stats.add_items_scraped(items_len);
    for (idx, item) in items.into_iter().enumerate() {
        CrawlerState::enter(&state.processing_items);
        if item_tx.send(item).await.is_err() {
            warn!(
                "Item channel is closed, dropping {} scraped items",
                items_len - idx
            );
            CrawlerState::leave(&state.processing_items);
            break;
        }
    }
}
