//! # Response Module
//!
//! A downloaded page together with the request that produced it.

use std::borrow::Cow;

use bytes::Bytes;
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

use crate::error::SpiderError;
use crate::request::Request;

#[derive(Debug, Clone)]
pub struct Response {
    /// Final URL after any redirects followed by the downloader.
    pub url: Url,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    request: Request,
}

impl Response {
    pub fn new(request: Request, url: Url, status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        Response {
            url,
            status,
            headers,
            body,
            request,
        }
    }

    /// The request this response answers.
    pub fn request_from_response(&self) -> &Request {
        &self.request
    }

    /// Metadata of the originating request.
    pub fn meta(&self, key: &str) -> Option<&Value> {
        self.request.meta(key)
    }

    /// Body decoded as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, SpiderError> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Builds a request for `href`, resolved against this response's URL,
    /// that is handled by the same callback as this response.
    pub fn follow(&self, href: &str) -> Result<Request, SpiderError> {
        let url = self.url.join(href)?;
        let mut request = Request::new(url);
        request.callback = self.request.callback.clone();
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(callback: Option<&'static str>) -> Response {
        let mut request = Request::get("https://example.com/a/b").unwrap();
        request.callback = callback.map(Cow::Borrowed);
        let url = request.url.clone();
        Response::new(
            request,
            url,
            StatusCode::OK,
            HeaderMap::new(),
            Bytes::from_static(br#"{"title":"Works"}"#),
        )
    }

    #[test]
    fn follow_resolves_relative_urls_and_keeps_callback() {
        let resp = response(Some("parse_detail"));
        let next = resp.follow("../c?page=2").unwrap();

        assert_eq!(next.url.as_str(), "https://example.com/c?page=2");
        assert_eq!(next.callback.as_deref(), Some("parse_detail"));
        assert!(!next.dont_filter);
    }

    #[test]
    fn body_accessors() {
        let resp = response(None);
        assert_eq!(resp.text(), r#"{"title":"Works"}"#);
        let value: Value = resp.json().unwrap();
        assert_eq!(value["title"], "Works");
    }
}
