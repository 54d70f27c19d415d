//! Scraped items and the output of a spider callback.

use std::fmt::Debug;

use crate::request::Request;

/// Marker for values a spider can emit.
///
/// Items are cloned out of the collection when a finished result is read,
/// so they must be `Clone`; they cross from the reactor thread to the caller,
/// so they must be `Send + Sync`.
pub trait ScrapedItem: Debug + Clone + Send + Sync + 'static {}

impl<T> ScrapedItem for T where T: Debug + Clone + Send + Sync + 'static {}

/// Items and follow-up requests returned by one callback invocation.
#[derive(Debug, Clone)]
pub struct ParseOutput<I> {
    items: Vec<I>,
    requests: Vec<Request>,
}

impl<I> Default for ParseOutput<I> {
    fn default() -> Self {
        ParseOutput {
            items: Vec::new(),
            requests: Vec::new(),
        }
    }
}

impl<I> ParseOutput<I> {
    pub fn new() -> Self {
        Self::default()
    }

    /// An output holding a single item.
    pub fn item(item: I) -> Self {
        let mut output = Self::new();
        output.add_item(item);
        output
    }

    pub fn add_item(&mut self, item: I) {
        self.items.push(item);
    }

    pub fn add_items(&mut self, items: impl IntoIterator<Item = I>) {
        self.items.extend(items);
    }

    pub fn add_request(&mut self, request: Request) {
        self.requests.push(request);
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty() && self.requests.is_empty()
    }

    pub fn into_parts(self) -> (Vec<I>, Vec<Request>) {
        (self.items, self.requests)
    }
}
