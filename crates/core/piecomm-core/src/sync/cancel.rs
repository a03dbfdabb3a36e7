//! Cancellation tokens for interruptible waits.
//!
//! A [`CancelToken`] plays the role of a pending-signal flag: it belongs to
//! one caller context, may be fired from any context (including interrupt
//! handlers), and wakes whatever that caller is currently blocked on.
//! Blocking operations check it after registering their own waker and bail
//! out with [`Interrupted`].

use core::fmt;
use core::future::Future;
use core::pin::Pin;
use core::sync::atomic::{AtomicBool, Ordering};
use core::task::{Context, Poll, Waker};

use super::{WaitKey, WaitQueue};

/// Error returned when a wait was aborted by its [`CancelToken`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interrupted;

impl fmt::Display for Interrupted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("wait interrupted by cancellation")
    }
}

/// A one-shot, resettable cancellation flag with wakeup.
pub struct CancelToken {
    pending: AtomicBool,
    waiters: WaitQueue,
}

impl CancelToken {
    /// Creates a token with no cancellation pending.
    pub const fn new() -> Self {
        Self {
            pending: AtomicBool::new(false),
            waiters: WaitQueue::new(),
        }
    }

    /// Requests cancellation and wakes every wait observing this token.
    ///
    /// Safe to call from interrupt context.
    pub fn cancel(&self) {
        self.pending.store(true, Ordering::Release);
        self.waiters.wake_all();
    }

    /// Returns `true` if cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// Clears a pending cancellation so the token can be reused.
    pub fn reset(&self) {
        self.pending.store(false, Ordering::Release);
    }

    /// Returns `Err(Interrupted)` if cancellation is pending.
    pub fn check(&self) -> Result<(), Interrupted> {
        if self.is_cancelled() {
            Err(Interrupted)
        } else {
            Ok(())
        }
    }

    /// Subscribes `waker` to this token's cancellation.
    ///
    /// Pair every call with [`unsubscribe`](Self::unsubscribe) once the
    /// wait ends, or the queue keeps a stale waker until the next cancel.
    pub fn subscribe(&self, key: &mut Option<WaitKey>, waker: &Waker) {
        self.waiters.register(key, waker);
    }

    /// Drops a subscription made by [`subscribe`](Self::subscribe).
    pub fn unsubscribe(&self, key: WaitKey) {
        self.waiters.unregister(key);
    }

    /// Returns a future that resolves once cancellation is requested.
    pub fn cancelled(&self) -> CancelWaitFuture<'_> {
        CancelWaitFuture {
            token: self,
            key: None,
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Future returned by [`CancelToken::cancelled`].
pub struct CancelWaitFuture<'a> {
    token: &'a CancelToken,
    key: Option<WaitKey>,
}

impl Future for CancelWaitFuture<'_> {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.token.is_cancelled() {
            return Poll::Ready(());
        }
        let this = &mut *self;
        this.token.subscribe(&mut this.key, cx.waker());
        // Re-check after registration: cancel() may have run in between.
        if this.token.is_cancelled() {
            Poll::Ready(())
        } else {
            Poll::Pending
        }
    }
}

impl Drop for CancelWaitFuture<'_> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.token.unsubscribe(key);
        }
    }
}
