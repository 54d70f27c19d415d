//! # Eventual Result Module
//!
//! A value produced on the reactor thread and waited for on another.
//!
//! An [`EventualResult`] starts pending and moves exactly once to fulfilled,
//! failed or cancelled. The reactor side publishes through a [`Publisher`];
//! callers block in [`EventualResult::wait`] on a `Condvar` until the state
//! changes or the timeout runs out. A timed out wait cancels the result: the
//! state becomes cancelled, the operation's [`CancellationToken`] fires, and
//! whatever the operation publishes later is discarded.

use std::fmt;
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::Duration;

use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, trace};

use crate::error::SpiderError;

/// Cooperative cancellation signal shared between a result and its operation.
pub use tokio_util::sync::CancellationToken;

enum State<T> {
    Pending,
    Fulfilled(T),
    Failed(SpiderError),
    Cancelled,
}

impl<T> State<T> {
    fn is_pending(&self) -> bool {
        matches!(self, State::Pending)
    }

    fn name(&self) -> &'static str {
        match self {
            State::Pending => "pending",
            State::Fulfilled(_) => "fulfilled",
            State::Failed(_) => "failed",
            State::Cancelled => "cancelled",
        }
    }
}

struct Shared<T> {
    state: Mutex<State<T>>,
    ready: Condvar,
    cancel: CancellationToken,
    reactor_thread: Option<ThreadId>,
}

impl<T> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock()
    }

    /// Moves a pending result to `next`; returns `false` if it was already terminal.
    fn settle(&self, next: State<T>) -> bool {
        let mut state = self.lock();
        if !state.is_pending() {
            trace!(
                "Discarding {} outcome, result is already {}",
                next.name(),
                state.name()
            );
            return false;
        }
        *state = next;
        drop(state);
        self.ready.notify_all();
        true
    }
}

/// Handle to the outcome of work running on the reactor thread.
pub struct EventualResult<T> {
    shared: Arc<Shared<T>>,
}

/// The reactor-side half of an [`EventualResult`].
pub struct Publisher<T> {
    shared: Arc<Shared<T>>,
}

/// Creates a pending result and the publisher that settles it.
///
/// `reactor_thread` is the thread that must never block in `wait`.
pub fn channel<T>(reactor_thread: Option<ThreadId>) -> (Publisher<T>, EventualResult<T>) {
    let shared = Arc::new(Shared {
        state: Mutex::new(State::Pending),
        ready: Condvar::new(),
        cancel: CancellationToken::new(),
        reactor_thread,
    });
    (
        Publisher {
            shared: Arc::clone(&shared),
        },
        EventualResult { shared },
    )
}

impl<T> Publisher<T> {
    /// Publishes the operation's outcome. Ignored if the result was cancelled.
    pub fn publish(self, outcome: Result<T, SpiderError>) -> bool {
        let next = match outcome {
            Ok(value) => State::Fulfilled(value),
            Err(e) => State::Failed(e),
        };
        let published = self.shared.settle(next);
        if !published {
            debug!("Operation finished after its result was cancelled; outcome discarded");
        }
        published
    }

    /// The token the operation should watch for cancellation.
    pub fn cancel_token(&self) -> CancellationToken {
        self.shared.cancel.clone()
    }
}

impl<T> Drop for Publisher<T> {
    fn drop(&mut self) {
        // Work dropped without publishing (e.g. the reactor stopped) must not
        // leave callers waiting until their timeout.
        if self.shared.lock().is_pending() {
            self.shared.settle(State::Failed(SpiderError::GeneralError(
                "the operation was dropped before it produced a result".into(),
            )));
        }
    }
}

impl<T: Clone> EventualResult<T> {
    /// Blocks until the result is terminal or `timeout` elapses.
    ///
    /// On timeout the result is cancelled and `SpiderError::Timeout` is
    /// returned. Waiting again on a terminal result returns the same outcome.
    pub fn wait(&self, timeout: Duration) -> Result<T, SpiderError> {
        if self.shared.reactor_thread == Some(thread::current().id()) {
            return Err(SpiderError::WaitOnReactorThread);
        }

        let mut state = self.shared.lock();
        let wait = self
            .shared
            .ready
            .wait_while_for(&mut state, |state| state.is_pending(), timeout);

        if wait.timed_out() && state.is_pending() {
            drop(state);
            debug!("Wait timed out after {:?}, cancelling operation", timeout);
            self.cancel();
            return Err(SpiderError::Timeout(timeout));
        }

        match &*state {
            State::Fulfilled(value) => Ok(value.clone()),
            State::Failed(e) => Err(e.clone()),
            State::Cancelled => Err(SpiderError::Cancelled),
            State::Pending => unreachable!("wait_while_for returned a pending result without timing out"),
        }
    }
}

impl<T> EventualResult<T> {
    /// Cancels a pending result. Returns `false` if it was already terminal.
    ///
    /// The operation is only asked to stop through its [`CancellationToken`]; work
    /// already in progress may still run to completion, but its outcome is
    /// never observed through this result.
    pub fn cancel(&self) -> bool {
        let cancelled = self.shared.settle(State::Cancelled);
        if cancelled {
            self.shared.cancel.cancel();
        }
        cancelled
    }

    /// Whether the result has reached a terminal state.
    pub fn is_ready(&self) -> bool {
        !self.shared.lock().is_pending()
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(*self.shared.lock(), State::Cancelled)
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.shared.cancel.clone()
    }
}

impl<T> fmt::Debug for EventualResult<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventualResult")
            .field("state", &self.shared.lock().name())
            .finish()
    }
}
