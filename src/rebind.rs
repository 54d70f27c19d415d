//! # Rebind Module
//!
//! Derives a one-shot spider from an existing one with different start
//! requests.
//!
//! ## Overview
//!
//! [`StartRequestsOverride`] wraps a base spider and implements [`Spider`] by
//! delegation. Only `start_requests` is replaced: it yields the start points
//! given at construction. Optionally every generated request is bound to a
//! callback supplied at call time; responses to those requests (and to
//! requests built from them with [`Response::follow`]) go to that callback,
//! everything else still goes to the base spider.
//!
//! ## Example
//!
//! ```rust,ignore
//! let spider = StartRequestsOverride::new(DefaultSpider, ["https://example.com"])?
//!     .with_callback(|response: Response| {
//!         Ok(ParseOutput::item(json!({ "status": response.status.as_u16() })))
//!     });
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, trace};
use url::Url;

use crate::error::SpiderError;
use crate::item::ParseOutput;
use crate::request::Request;
use crate::response::Response;
use crate::spider::{Spider, SpiderArgs};

/// Callback name reserved for requests generated by a [`StartRequestsOverride`].
pub const START_CALLBACK: &str = "start_requests_override";

/// Callback bound to the generated start requests.
pub type ItemsCallback<I> = Arc<dyn Fn(Response) -> Result<ParseOutput<I>, SpiderError> + Send + Sync>;

/// A place to start crawling from.
#[derive(Debug, Clone)]
pub enum StartPoint {
    /// A URL; becomes a GET request that bypasses the duplicate filter.
    Target(String),
    /// A request used as given.
    Request(Request),
}

impl From<&str> for StartPoint {
    fn from(target: &str) -> Self {
        StartPoint::Target(target.to_string())
    }
}

impl From<String> for StartPoint {
    fn from(target: String) -> Self {
        StartPoint::Target(target)
    }
}

impl From<&String> for StartPoint {
    fn from(target: &String) -> Self {
        StartPoint::Target(target.clone())
    }
}

impl From<Url> for StartPoint {
    fn from(url: Url) -> Self {
        StartPoint::Target(url.into())
    }
}

impl From<Request> for StartPoint {
    fn from(request: Request) -> Self {
        StartPoint::Request(request)
    }
}

impl StartPoint {
    pub(crate) fn into_request(self) -> Result<Request, SpiderError> {
        match self {
            StartPoint::Target(target) => {
                let url = Url::parse(&target).map_err(|e| {
                    SpiderError::ConfigurationError(format!("invalid target '{target}': {e}"))
                })?;
                Ok(Request::new(url).with_dont_filter(true))
            }
            StartPoint::Request(request) => Ok(request),
        }
    }
}

enum BoundCallback<I> {
    Items(ItemsCallback<I>),
    StashResponse,
}

/// A spider whose start requests are replaced for a single invocation.
pub struct StartRequestsOverride<S: Spider> {
    base: S,
    start_requests: Vec<Request>,
    callback: Option<BoundCallback<S::Item>>,
    stashed: Mutex<Option<Response>>,
    attrs: HashMap<String, Value>,
}

impl<S: Spider> StartRequestsOverride<S> {
    /// Wraps `base`, replacing its start requests with `start_points`.
    ///
    /// Fails with `ConfigurationError` if any target is not a valid URL.
    pub fn new<P>(base: S, start_points: impl IntoIterator<Item = P>) -> Result<Self, SpiderError>
    where
        P: Into<StartPoint>,
    {
        let start_requests = start_points
            .into_iter()
            .map(|point| Into::<StartPoint>::into(point).into_request())
            .collect::<Result<Vec<_>, _>>()?;
        debug!(
            "Overriding start requests of spider '{}' with {} request(s)",
            base.name(),
            start_requests.len()
        );
        Ok(StartRequestsOverride {
            base,
            start_requests,
            callback: None,
            stashed: Mutex::new(None),
            attrs: HashMap::new(),
        })
    }

    /// Sends the responses to the generated requests to `callback`.
    pub fn with_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(Response) -> Result<ParseOutput<S::Item>, SpiderError> + Send + Sync + 'static,
    {
        self.callback = Some(BoundCallback::Items(Arc::new(callback)));
        self
    }

    /// Keeps the response to the generated requests, readable with [`response`](Self::response).
    pub fn stash_response(mut self) -> Self {
        self.callback = Some(BoundCallback::StashResponse);
        self
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }

    pub fn attr(&self, key: &str) -> Option<&Value> {
        self.attrs.get(key)
    }

    /// The stashed response, if one arrived.
    pub fn response(&self) -> Option<Response> {
        self.stashed.lock().clone()
    }
}

#[async_trait]
impl<S: Spider> Spider for StartRequestsOverride<S> {
    type Item = S::Item;

    fn name(&self) -> &str {
        self.base.name()
    }

    fn start_requests(&self) -> Result<Vec<Request>, SpiderError> {
        let bound = self.callback.is_some();
        Ok(self
            .start_requests
            .iter()
            .cloned()
            .map(|request| {
                if bound {
                    request.with_callback(START_CALLBACK)
                } else {
                    request
                }
            })
            .collect())
    }

    fn handle_httpstatus_list(&self) -> &[u16] {
        self.base.handle_httpstatus_list()
    }

    fn open(&mut self, args: &SpiderArgs) -> Result<(), SpiderError> {
        self.base.open(args)
    }

    async fn parse(&self, response: Response) -> Result<ParseOutput<Self::Item>, SpiderError> {
        self.base.parse(response).await
    }

    async fn parse_with(
        &self,
        callback: &str,
        response: Response,
    ) -> Result<ParseOutput<Self::Item>, SpiderError> {
        match (&self.callback, callback == START_CALLBACK) {
            (Some(BoundCallback::Items(bound)), true) => (**bound)(response),
            (Some(BoundCallback::StashResponse), true) => {
                trace!("Stashing response from {}", response.url);
                *self.stashed.lock() = Some(response);
                Ok(ParseOutput::new())
            }
            _ => self.base.parse_with(callback, response).await,
        }
    }
}

impl<S: Spider + fmt::Debug> fmt::Debug for StartRequestsOverride<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StartRequestsOverride")
            .field("base", &self.base)
            .field("start_requests", &self.start_requests)
            .field("callback_bound", &self.callback.is_some())
            .field("attrs", &self.attrs)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spider::DefaultSpider;
    use bytes::Bytes;
    use reqwest::StatusCode;
    use reqwest::header::HeaderMap;
    use serde_json::json;

    struct NamedCallbacks;

    #[async_trait]
    impl Spider for NamedCallbacks {
        type Item = Value;

        fn start_urls(&self) -> Vec<&str> {
            vec!["https://example.com/original"]
        }

        async fn parse(&self, _response: Response) -> Result<ParseOutput<Value>, SpiderError> {
            Ok(ParseOutput::item(json!("base parse")))
        }

        async fn parse_with(
            &self,
            callback: &str,
            _response: Response,
        ) -> Result<ParseOutput<Value>, SpiderError> {
            Ok(ParseOutput::item(json!(format!("base {callback}"))))
        }
    }

    fn response_to(request: Request) -> Response {
        let url = request.url.clone();
        Response::new(request, url, StatusCode::OK, HeaderMap::new(), Bytes::new())
    }

    async fn dispatch<S: Spider>(spider: &S, request: Request) -> Vec<S::Item> {
        let callback = request.callback.clone();
        let response = response_to(request);
        let output = match callback {
            Some(name) => spider.parse_with(&name, response).await,
            None => spider.parse(response).await,
        };
        output.unwrap().into_parts().0
    }

    #[test]
    fn targets_become_unfiltered_get_requests() {
        let spider = StartRequestsOverride::new(DefaultSpider, ["https://example.com/a"]).unwrap();
        let requests = spider.start_requests().unwrap();

        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].url.as_str(), "https://example.com/a");
        assert_eq!(requests[0].method, reqwest::Method::GET);
        assert!(requests[0].dont_filter);
        assert!(requests[0].callback.is_none());
    }

    #[test]
    fn request_start_points_pass_through() {
        let request = Request::get("https://example.com/post")
            .unwrap()
            .with_method(reqwest::Method::POST)
            .with_meta("page", 2);
        let spider = StartRequestsOverride::new(DefaultSpider, [request]).unwrap();
        let generated = spider.start_requests().unwrap().remove(0);

        assert_eq!(generated.method, reqwest::Method::POST);
        assert_eq!(generated.meta("page"), Some(&json!(2)));
        assert!(!generated.dont_filter);
    }

    #[test]
    fn malformed_target_is_a_configuration_error() {
        let result = StartRequestsOverride::new(DefaultSpider, ["not a url"]);
        assert!(matches!(result, Err(SpiderError::ConfigurationError(_))));
    }

    #[tokio::test]
    async fn without_callback_responses_go_to_the_base_spider() {
        let spider = StartRequestsOverride::new(NamedCallbacks, ["https://example.com/x"]).unwrap();
        let request = spider.start_requests().unwrap().remove(0);

        assert_eq!(dispatch(&spider, request).await, vec![json!("base parse")]);
    }

    #[tokio::test]
    async fn explicit_callback_handles_generated_requests_only() {
        let spider = StartRequestsOverride::new(NamedCallbacks, ["https://example.com/x"])
            .unwrap()
            .with_callback(|response: Response| {
                Ok(ParseOutput::item(json!(format!("bound {}", response.url.path()))))
            });
        let generated = spider.start_requests().unwrap().remove(0);
        assert_eq!(generated.callback.as_deref(), Some(START_CALLBACK));

        assert_eq!(dispatch(&spider, generated).await, vec![json!("bound /x")]);

        let other = Request::get("https://example.com/y").unwrap().with_callback("details");
        assert_eq!(dispatch(&spider, other).await, vec![json!("base details")]);
        let plain = Request::get("https://example.com/z").unwrap();
        assert_eq!(dispatch(&spider, plain).await, vec![json!("base parse")]);
    }

    #[tokio::test]
    async fn stashed_response_is_kept_on_the_spider() {
        let spider = StartRequestsOverride::new(DefaultSpider, ["https://example.com/page"])
            .unwrap()
            .stash_response()
            .with_attr("purpose", "fetch");
        assert!(spider.response().is_none());

        let request = spider.start_requests().unwrap().remove(0);
        assert!(dispatch(&spider, request).await.is_empty());

        let stashed = spider.response().unwrap();
        assert_eq!(stashed.url.as_str(), "https://example.com/page");
        assert_eq!(spider.attr("purpose"), Some(&json!("fetch")));
        assert_eq!(spider.name(), "default");
    }
}
