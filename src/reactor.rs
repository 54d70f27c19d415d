//! # Reactor Module
//!
//! The background event loop that every crawl runs on.
//!
//! ## Overview
//!
//! A [`Reactor`] owns one thread running a tokio current-thread runtime.
//! Callers hand it work with [`Reactor::submit`] and get an
//! [`EventualResult`] back immediately. Submissions travel through a FIFO
//! channel and are spawned on the loop in arrival order; since the runtime
//! has a single thread, two submissions never execute at the same time, they
//! only interleave at `.await` points.
//!
//! `start` is idempotent and thread-safe. The process-wide instance behind
//! the free functions of [`facade`](crate::facade) is [`Reactor::global`];
//! tests and embedders can create and inject their own.
//!
//! ## Example
//!
//! ```rust,ignore
//! let reactor = Reactor::new();
//! reactor.start()?;
//! let answer = reactor.submit(|_cancel| async { Ok(6 * 7) })?;
//! assert_eq!(answer.wait(Duration::from_secs(1))?, 42);
//! ```

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use std::thread::{self, ThreadId};

use futures_util::FutureExt;
use kanal::{Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, error, info, trace};

use crate::error::SpiderError;
use crate::eventual::{self, CancellationToken, EventualResult};

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

const THREAD_NAME: &str = "spider-reactor";

struct Running {
    jobs: Sender<Job>,
    thread_id: ThreadId,
}

/// A single background thread running an event loop.
#[derive(Default)]
pub struct Reactor {
    running: Mutex<Option<Running>>,
}

impl Reactor {
    /// Creates a stopped reactor.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide reactor used by the free functions.
    pub fn global() -> Arc<Reactor> {
        static GLOBAL: OnceLock<Arc<Reactor>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(Reactor::new())))
    }

    /// Starts the loop thread. Calling it again is a no-op.
    pub fn start(&self) -> Result<(), SpiderError> {
        let mut running = self.running.lock();
        if running.is_some() {
            trace!("Reactor already running");
            return Ok(());
        }

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| SpiderError::GeneralError(format!("failed to build reactor runtime: {e}")))?;
        let (jobs, rx) = kanal::unbounded::<Job>();

        let handle = thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || run_loop(runtime, rx))
            .map_err(|e| SpiderError::GeneralError(format!("failed to spawn reactor thread: {e}")))?;

        info!("Reactor started on thread '{}'", THREAD_NAME);
        *running = Some(Running {
            jobs,
            thread_id: handle.thread().id(),
        });
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    /// The id of the loop thread, once started.
    pub fn thread_id(&self) -> Option<ThreadId> {
        self.running
            .lock()
            .as_ref()
            .map(|running| running.thread_id)
    }

    /// Schedules `work` on the loop thread and returns its eventual result.
    ///
    /// `work` is called on the loop thread with the result's [`CancellationToken`].
    /// An error returned by the work fails the result unchanged; a panic
    /// fails it with [`SpiderError::Panicked`].
    pub fn submit<F, Fut, T>(&self, work: F) -> Result<EventualResult<T>, SpiderError>
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, SpiderError>> + Send + 'static,
        T: Send + 'static,
    {
        let running = self.running.lock();
        let running = running.as_ref().ok_or(SpiderError::ReactorNotRunning)?;

        let (publisher, result) = eventual::channel(Some(running.thread_id));
        let cancel = publisher.cancel_token();
        let job: Job = Box::pin(async move {
            let outcome = AssertUnwindSafe(async move { work(cancel).await })
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| {
                    let message = panic_message(&*panic);
                    error!("Reactor work panicked: {}", message);
                    Err(SpiderError::Panicked(message))
                });
            publisher.publish(outcome);
        });

        running
            .jobs
            .send(job)
            .map_err(|_| SpiderError::ReactorNotRunning)?;
        Ok(result)
    }
}

fn run_loop(runtime: tokio::runtime::Runtime, rx: Receiver<Job>) {
    let rx = rx.to_async();
    runtime.block_on(async move {
        while let Ok(job) = rx.recv().await {
            tokio::spawn(job);
        }
    });
    debug!("Reactor job channel closed, loop thread exiting");
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
