//! The item sink that captures a crawl's output.
//!
//! An [`ItemCollection`] is installed as the last pipeline of one crawl and
//! appends every item that reaches it. Clones share the same storage, so the
//! facade keeps one clone and reads it once the crawl has finished.

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use async_trait::async_trait;
use tracing::trace;

use crate::error::SpiderError;
use crate::item::ScrapedItem;
use crate::pipeline::Pipeline;

#[derive(Debug)]
pub struct ItemCollection<I> {
    items: Arc<Mutex<Vec<I>>>,
}

impl<I> Clone for ItemCollection<I> {
    fn clone(&self) -> Self {
        ItemCollection {
            items: Arc::clone(&self.items),
        }
    }
}

impl<I> Default for ItemCollection<I> {
    fn default() -> Self {
        ItemCollection {
            items: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl<I> ItemCollection<I> {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<I>> {
        self.items.lock()
    }

    pub fn append(&self, item: I) {
        self.lock().push(item);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl<I: Clone> ItemCollection<I> {
    /// The collected items in arrival order.
    pub fn to_vec(&self) -> Vec<I> {
        self.lock().clone()
    }
}

#[async_trait]
impl<I: ScrapedItem> Pipeline<I> for ItemCollection<I> {
    fn name(&self) -> &str {
        "ItemCollection"
    }

    async fn process_item(&self, item: I) -> Result<Option<I>, SpiderError> {
        self.append(item.clone());
        trace!("Collected item #{}", self.len());
        Ok(Some(item))
    }
}
