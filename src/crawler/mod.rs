//! # Crawler Module
//!
//! The crawl engine driven by the blocking bridge.
//!
//! ## Key Components
//!
//! - **Crawler**: owns one crawl's spider, downloader and pipelines and runs it to completion
//! - **Downloader Task**: pulls requests from the scheduler and downloads them concurrently
//! - **Parser Task**: a pool of workers running spider callbacks on responses
//! - **Item Processor**: passes scraped items through the pipelines in emission order
//!
//! Components talk over `kanal` channels. Every task is spawned on the
//! current tokio runtime; the bridge runs that runtime on a single thread.

mod core;
mod item_processor;
mod request_handler;
mod response_parser;

pub use self::core::Crawler;
pub(crate) use item_processor::spawn_item_processor_task;
pub(crate) use request_handler::spawn_downloader_task;
pub(crate) use response_parser::spawn_parser_task;
