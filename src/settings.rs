//! # Settings Module
//!
//! A flat key/value configuration map.
//!
//! Process-level defaults live on the [`Scraper`](crate::facade::Scraper);
//! every call may pass an overlay which is merged on top of them before the
//! crawl is built. Values are JSON values so callers can pass numbers,
//! strings and booleans without a schema. Typed getters report mismatches as
//! [`SpiderError::ConfigurationError`].

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::SpiderError;

/// Maximum number of downloads in flight for one crawl.
pub const CONCURRENT_REQUESTS: &str = "CONCURRENT_REQUESTS";
/// Number of parser workers for one crawl.
pub const PARSER_WORKERS: &str = "PARSER_WORKERS";
/// Capacity of the channels between engine stages.
pub const CHANNEL_CAPACITY: &str = "CHANNEL_CAPACITY";
/// Upper bound on requests waiting in the scheduler.
pub const SCHEDULER_MAX_PENDING: &str = "SCHEDULER_MAX_PENDING";
/// `User-Agent` header sent by the default downloader.
pub const USER_AGENT: &str = "USER_AGENT";
/// Per-request download timeout, in seconds.
pub const DOWNLOAD_TIMEOUT: &str = "DOWNLOAD_TIMEOUT";
/// Seconds a stopping crawl waits for its tasks before aborting them.
pub const SHUTDOWN_GRACE: &str = "SHUTDOWN_GRACE";

/// A flat, string-keyed settings map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Settings {
    values: BTreeMap<String, Value>,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `key` to `value`, builder style.
    pub fn with<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        self.set(key, value);
        self
    }

    pub fn set<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<Value>,
    {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Returns a copy of `self` with every key of `overlay` written over it.
    pub fn merged(&self, overlay: &Settings) -> Settings {
        let mut merged = self.clone();
        for (key, value) in &overlay.values {
            merged.values.insert(key.clone(), value.clone());
        }
        merged
    }

    pub fn get_usize(&self, key: &str) -> Result<Option<usize>, SpiderError> {
        match self.values.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) => n
                .as_u64()
                .map(|n| Some(n as usize))
                .ok_or_else(|| mismatch(key, "a non-negative integer")),
            Some(Value::String(s)) => s
                .trim()
                .parse::<usize>()
                .map(Some)
                .map_err(|_| mismatch(key, "a non-negative integer")),
            Some(_) => Err(mismatch(key, "a non-negative integer")),
        }
    }

    pub fn get_str(&self, key: &str) -> Result<Option<&str>, SpiderError> {
        match self.values.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(_) => Err(mismatch(key, "a string")),
        }
    }

    /// Reads a duration expressed in (possibly fractional) seconds.
    pub fn get_duration_secs(&self, key: &str) -> Result<Option<Duration>, SpiderError> {
        let secs = match self.values.get(key) {
            None | Some(Value::Null) => return Ok(None),
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
            Some(_) => None,
        };
        secs.and_then(|secs| Duration::try_from_secs_f64(secs).ok())
            .map(Some)
            .ok_or_else(|| mismatch(key, "a non-negative number of seconds"))
    }
}

impl<K, V> FromIterator<(K, V)> for Settings
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut settings = Settings::new();
        for (key, value) in iter {
            settings.set(key, value);
        }
        settings
    }
}

fn mismatch(key: &str, expected: &str) -> SpiderError {
    SpiderError::ConfigurationError(format!("setting {key} must be {expected}"))
}

/// Logs the crate version and the effective settings at the start of a crawl.
pub fn log_crawler_info(spider_name: &str, settings: &Settings) {
    info!(
        "spider-sync {} starting crawl for spider '{}'",
        env!("CARGO_PKG_VERSION"),
        spider_name
    );
    if settings.is_empty() {
        debug!("No settings overrides");
    } else {
        let overrides: Vec<String> = settings.iter().map(|(k, v)| format!("{k}={v}")).collect();
        info!("Overridden settings: {}", overrides.join(", "));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn overlay_wins_over_defaults() {
        let defaults = Settings::new()
            .with(CONCURRENT_REQUESTS, 16)
            .with(USER_AGENT, "default-agent");
        let overlay = Settings::new().with(CONCURRENT_REQUESTS, 2);

        let merged = defaults.merged(&overlay);

        assert_eq!(merged.get_usize(CONCURRENT_REQUESTS).unwrap(), Some(2));
        assert_eq!(merged.get_str(USER_AGENT).unwrap(), Some("default-agent"));
        // the defaults are untouched
        assert_eq!(defaults.get_usize(CONCURRENT_REQUESTS).unwrap(), Some(16));
    }

    #[test]
    fn typed_getters_accept_strings() {
        let settings: Settings = [
            (PARSER_WORKERS, json!("4")),
            (DOWNLOAD_TIMEOUT, json!("1.5")),
        ]
        .into_iter()
        .collect();

        assert_eq!(settings.get_usize(PARSER_WORKERS).unwrap(), Some(4));
        assert_eq!(
            settings.get_duration_secs(DOWNLOAD_TIMEOUT).unwrap(),
            Some(Duration::from_millis(1500))
        );
    }

    #[test]
    fn type_mismatch_is_a_configuration_error() {
        let settings = Settings::new()
            .with(CONCURRENT_REQUESTS, "many")
            .with(USER_AGENT, 42)
            .with(DOWNLOAD_TIMEOUT, -1.0)
            .with(SHUTDOWN_GRACE, 1e30);

        assert!(matches!(
            settings.get_usize(CONCURRENT_REQUESTS),
            Err(SpiderError::ConfigurationError(_))
        ));
        assert!(settings.get_str(USER_AGENT).is_err());
        assert!(settings.get_duration_secs(DOWNLOAD_TIMEOUT).is_err());
        // too large for a Duration
        assert!(matches!(
            settings.get_duration_secs(SHUTDOWN_GRACE),
            Err(SpiderError::ConfigurationError(_))
        ));
        assert_eq!(settings.get_usize("MISSING").unwrap(), None);
    }
}
