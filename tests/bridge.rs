mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use serde_json::{Value, json};
use spider_sync::settings::SHUTDOWN_GRACE;
use spider_sync::{
    CrawlOptions, ParseOutput, Reactor, Response, Scraper, Spider, SpiderError, async_trait,
};

use common::{StaticSite, scraper, url};

/// Follows `/next/{n + 1}` forever and records when it is dropped.
struct EndlessSpider {
    dropped: Arc<AtomicBool>,
}

impl Drop for EndlessSpider {
    fn drop(&mut self) {
        self.dropped.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Spider for EndlessSpider {
    type Item = Value;

    fn start_urls(&self) -> Vec<&str> {
        vec!["http://site.test/next/0"]
    }

    async fn parse(&self, response: Response) -> Result<ParseOutput<Value>, SpiderError> {
        let n: u64 = response
            .url
            .path()
            .trim_start_matches("/next/")
            .parse()
            .map_err(SpiderError::other)?;
        let mut output = ParseOutput::item(json!(n));
        output.add_request(response.follow(&format!("/next/{}", n + 1))?);
        Ok(output)
    }
}

#[test]
fn stalled_crawl_times_out_and_is_wound_down() {
    let scraper = scraper(StaticSite::new().endless(Duration::from_millis(50)));
    let dropped = Arc::new(AtomicBool::new(false));
    let timeout = Duration::from_millis(300);

    let started = Instant::now();
    let result = scraper.run_spider_with(
        EndlessSpider {
            dropped: Arc::clone(&dropped),
        },
        CrawlOptions::new().timeout(timeout),
    );
    let elapsed = started.elapsed();

    assert!(matches!(result, Err(SpiderError::Timeout(t)) if t == timeout));
    assert!(elapsed >= timeout);
    assert!(elapsed < timeout + Duration::from_secs(1), "took {elapsed:?}");

    // The crawl never ends on its own; the spider is only released once the
    // cancellation reached it.
    let deadline = Instant::now() + Duration::from_secs(10);
    while !dropped.load(Ordering::SeqCst) && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }
    assert!(dropped.load(Ordering::SeqCst));

    // the reactor is still usable afterwards
    let response = scraper.fetch(url("/anything")).unwrap();
    assert_eq!(response.status.as_u16(), 200);
}

#[test]
fn hung_download_is_aborted_after_the_shutdown_grace() {
    let site = StaticSite::new().page_with("/next/0", 200, "", Duration::from_secs(3600));
    let scraper = scraper(site);
    let dropped = Arc::new(AtomicBool::new(false));
    let timeout = Duration::from_millis(100);

    let result = scraper.run_spider_with(
        EndlessSpider {
            dropped: Arc::clone(&dropped),
        },
        CrawlOptions::new().timeout(timeout).setting(SHUTDOWN_GRACE, 0.2),
    );
    assert!(matches!(result, Err(SpiderError::Timeout(t)) if t == timeout));

    // The download never finishes; the crawl is only released once the
    // stalled stage has been aborted.
    let deadline = Instant::now() + Duration::from_secs(5);
    while !dropped.load(Ordering::SeqCst) && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }
    assert!(dropped.load(Ordering::SeqCst));

    let response = scraper.fetch(url("/other")).unwrap();
    assert_eq!(response.status.as_u16(), 404);
}

#[test]
fn concurrent_crawls_never_share_collections() {
    let mut site = StaticSite::new();
    for crawl in ["left", "right"] {
        for step in 0..3 {
            let next = if step < 2 {
                format!("/{crawl}/{}", step + 1)
            } else {
                String::new()
            };
            site = site.page_with(
                &format!("/{crawl}/{step}"),
                200,
                &next,
                Duration::from_millis(15),
            );
        }
    }
    let scraper = scraper(site);

    let run = |crawl: &'static str| {
        let scraper = scraper.clone();
        thread::spawn(move || {
            scraper.crawl(url(&format!("/{crawl}/0")), move |response: Response| {
                let mut output = ParseOutput::item(json!({ "crawl": crawl, "path": response.url.path() }));
                let next = response.text();
                if !next.is_empty() {
                    output.add_request(response.follow(&next)?);
                }
                Ok(output)
            })
        })
    };
    let left = run("left");
    let right = run("right");

    for (name, handle) in [("left", left), ("right", right)] {
        let items = handle.join().unwrap().unwrap();
        let paths: Vec<&str> = items.iter().map(|i| i["path"].as_str().unwrap()).collect();
        assert_eq!(paths, [0, 1, 2].map(|s| format!("/{name}/{s}")));
        assert!(items.iter().all(|i| i["crawl"] == name));
    }
}

#[test]
fn setup_twice_keeps_one_reactor_thread() {
    common::init_tracing();
    spider_sync::setup().unwrap();
    let first = Reactor::global().thread_id();
    spider_sync::setup().unwrap();

    assert!(first.is_some());
    assert_eq!(Reactor::global().thread_id(), first);
    assert!(Reactor::global().is_running());
}

#[test]
fn free_functions_use_the_global_reactor() {
    spider_sync::setup().unwrap();

    // The global scraper has no injected downloader, so only failures that
    // happen before any network access are exercised here.
    assert!(matches!(
        spider_sync::fetch("no scheme"),
        Err(SpiderError::ConfigurationError(_))
    ));
    assert!(matches!(
        spider_sync::run_spider(spider_sync::DefaultSpider),
        Err(SpiderError::ConfigurationError(_))
    ));
}

#[test]
fn scrapers_on_a_stopped_reactor_fail_fast() {
    let scraper = Scraper::new(Arc::new(Reactor::new()));
    assert!(matches!(
        scraper.crawl(url("/a"), |_: Response| Ok(ParseOutput::new())),
        Err(SpiderError::ReactorNotRunning)
    ));
}
