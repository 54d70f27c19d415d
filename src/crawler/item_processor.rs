//! Contains the item processor functionality for the crawler.
//! Items go through the configured pipelines one at a time, in the order the
//! parser workers emitted them.

use std::sync::Arc;

use kanal::AsyncReceiver;
use tracing::{debug, error, trace};

use crate::item::ScrapedItem;
use crate::pipeline::Pipeline;
use crate::state::CrawlerState;
use crate::stats::StatCollector;

pub(crate) fn spawn_item_processor_task<I>(
    state: Arc<CrawlerState>,
    item_rx: AsyncReceiver<I>,
    pipelines: Arc<Vec<Box<dyn Pipeline<I>>>>,
    stats: Arc<StatCollector>,
) -> tokio::task::JoinHandle<()>
where
    I: ScrapedItem,
{
    tokio::spawn(async move {
        trace!("Item processor started with {} pipelines", pipelines.len());
        while let Ok(item) = item_rx.recv().await {
            let mut item_to_process = Some(item);
            for pipeline in pipelines.iter() {
                let Some(current_item) = item_to_process.take() else {
                    break;
                };
                match pipeline.process_item(current_item).await {
                    Ok(Some(next_item)) => item_to_process = Some(next_item),
                    Ok(None) => {
                        debug!("Pipeline '{}' dropped item", pipeline.name());
                        stats.increment_items_dropped_by_pipeline();
                    }
                    Err(e) => {
                        error!("Pipeline '{}' error: {}", pipeline.name(), e);
                        stats.increment_items_dropped_by_pipeline();
                    }
                }
            }

            if item_to_process.is_some() {
                stats.increment_items_processed();
            }
            CrawlerState::leave(&state.processing_items);
        }
        trace!("Item processor finished");
    })
}
