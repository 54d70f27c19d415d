//! # Request Module
//!
//! The unit of work handed to the engine.
//!
//! A `Request` names its target, optionally the spider callback that should
//! handle its response, and carries free-form JSON metadata that is visible
//! again on the resulting [`Response`](crate::response::Response).

use std::borrow::Cow;
use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use bytes::Bytes;
use reqwest::Method;
use reqwest::header::HeaderMap;
use serde_json::Value;
use url::Url;

use crate::error::SpiderError;

/// Meta key that lets every HTTP status reach the spider callback.
pub const HANDLE_HTTPSTATUS_ALL: &str = "handle_httpstatus_all";

#[derive(Debug, Clone)]
pub struct Request {
    pub url: Url,
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
    /// Named spider callback; `None` resolves to [`Spider::parse`](crate::spider::Spider::parse).
    pub callback: Option<Cow<'static, str>>,
    /// Bypasses the scheduler's duplicate filter.
    pub dont_filter: bool,
    pub meta: HashMap<String, Value>,
}

impl Request {
    /// Creates a GET request for `url`.
    pub fn new(url: Url) -> Self {
        Request {
            url,
            method: Method::GET,
            headers: HeaderMap::new(),
            body: None,
            callback: None,
            dont_filter: false,
            meta: HashMap::new(),
        }
    }

    /// Parses `url` and creates a GET request for it.
    pub fn get(url: &str) -> Result<Self, SpiderError> {
        Ok(Request::new(Url::parse(url)?))
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_callback(mut self, callback: impl Into<Cow<'static, str>>) -> Self {
        self.callback = Some(callback.into());
        self
    }

    pub fn with_dont_filter(mut self, dont_filter: bool) -> Self {
        self.dont_filter = dont_filter;
        self
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    pub fn meta(&self, key: &str) -> Option<&Value> {
        self.meta.get(key)
    }

    /// Whether non-2xx responses to this request should still be parsed.
    pub fn handles_all_statuses(&self) -> bool {
        matches!(self.meta.get(HANDLE_HTTPSTATUS_ALL), Some(Value::Bool(true)))
    }

    /// Identifies requests for duplicate filtering: method, url without fragment and body.
    pub fn fingerprint(&self) -> String {
        let mut url = self.url.clone();
        url.set_fragment(None);
        let mut fingerprint = format!("{} {}", self.method, url);
        if let Some(body) = &self.body {
            let mut hasher = DefaultHasher::new();
            body.hash(&mut hasher);
            fingerprint.push_str(&format!(" {:016x}", hasher.finish()));
        }
        fingerprint
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_ignores_fragment_but_not_method_or_body() {
        let a = Request::get("https://example.com/page#top").unwrap();
        let b = Request::get("https://example.com/page").unwrap();
        let post = Request::get("https://example.com/page")
            .unwrap()
            .with_method(Method::POST);
        let post_with_body = post.clone().with_body("q=1");

        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(b.fingerprint(), post.fingerprint());
        assert_ne!(post.fingerprint(), post_with_body.fingerprint());
    }

    #[test]
    fn handles_all_statuses_reads_meta_flag() {
        let req = Request::get("https://example.com").unwrap();
        assert!(!req.handles_all_statuses());
        assert!(req.with_meta(HANDLE_HTTPSTATUS_ALL, true).handles_all_statuses());
    }

    #[test]
    fn get_rejects_malformed_urls() {
        assert!(matches!(
            Request::get("::not-a-url"),
            Err(SpiderError::UrlParseError(_))
        ));
    }
}
