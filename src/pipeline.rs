//! Item pipelines: the stages every scraped item passes through, in order.

use async_trait::async_trait;

use crate::error::SpiderError;
use crate::item::ScrapedItem;

#[async_trait]
pub trait Pipeline<I: ScrapedItem>: Send + Sync + 'static {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Processes one item. Returning `Ok(None)` drops it from later stages.
    async fn process_item(&self, item: I) -> Result<Option<I>, SpiderError>;

    /// Called once after the last item of the crawl.
    async fn close(&self) -> Result<(), SpiderError> {
        Ok(())
    }
}
