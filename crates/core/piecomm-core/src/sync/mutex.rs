//! Async-aware mutual exclusion lock with interruptible acquisition.
//!
//! Unlike [`IrqSpinLock`](super::IrqSpinLock), [`Mutex`] parks the current
//! task on a [`WaitQueue`] when contended, so it may guard long operations
//! such as bulk MMIO copies. Acquisition through
//! [`lock_interruptible`](Mutex::lock_interruptible) additionally gives up
//! with [`Interrupted`] when the caller's [`CancelToken`] fires, leaving the
//! lock untouched.
//!
//! Never take a `Mutex` from interrupt context.

use core::cell::UnsafeCell;
use core::future::Future;
use core::ops::{Deref, DerefMut};
use core::pin::Pin;
use core::sync::atomic::{AtomicBool, Ordering};
use core::task::{Context, Poll};

use super::{CancelToken, Interrupted, WaitKey, WaitQueue};

/// An async-aware mutual exclusion lock.
///
/// # Example
///
/// ```ignore
/// let state = Mutex::new(0u64);
///
/// async fn bump(state: &Mutex<u64>, cancel: &CancelToken) -> Result<(), Interrupted> {
///     let mut guard = state.lock_interruptible(cancel).await?;
///     *guard += 1;
///     Ok(())
/// }
/// ```
pub struct Mutex<T> {
    locked: AtomicBool,
    waiters: WaitQueue,
    name: &'static str,
    data: UnsafeCell<T>,
}

// SAFETY: The Mutex ensures exclusive access to `T` via atomic operations.
unsafe impl<T: Send> Send for Mutex<T> {}
unsafe impl<T: Send> Sync for Mutex<T> {}

impl<T> Mutex<T> {
    /// Creates a new unlocked `Mutex` wrapping `value`.
    pub const fn new(value: T) -> Self {
        Self::named("<unnamed>", value)
    }

    /// Creates a new unlocked `Mutex` with a name for diagnostics.
    pub const fn named(name: &'static str, value: T) -> Self {
        Self {
            locked: AtomicBool::new(false),
            waiters: WaitQueue::new(),
            name,
            data: UnsafeCell::new(value),
        }
    }

    /// Returns the diagnostic name given at construction.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Asynchronously acquires the lock.
    pub fn lock(&self) -> MutexLockFuture<'_, T> {
        MutexLockFuture {
            mutex: self,
            key: None,
        }
    }

    /// Asynchronously acquires the lock, giving up if `cancel` fires first.
    ///
    /// A lock that is free is taken even when cancellation is already
    /// pending; cancellation only aborts an acquisition that would block.
    pub fn lock_interruptible<'a>(
        &'a self,
        cancel: &'a CancelToken,
    ) -> InterruptibleLockFuture<'a, T> {
        InterruptibleLockFuture {
            inner: self.lock(),
            cancel,
            cancel_key: None,
        }
    }

    /// Attempts to acquire the lock without blocking.
    pub fn try_lock(&self) -> Option<MutexGuard<'_, T>> {
        if self
            .locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            Some(MutexGuard { mutex: self })
        } else {
            None
        }
    }

    /// Returns `true` if the lock is currently held.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }

    /// Returns a mutable reference to the data without locking.
    ///
    /// Exclusive borrow of the mutex proves no guard exists.
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }
}

/// Future returned by [`Mutex::lock`].
pub struct MutexLockFuture<'a, T> {
    mutex: &'a Mutex<T>,
    key: Option<WaitKey>,
}

impl<'a, T> MutexLockFuture<'a, T> {
    fn try_acquire(&mut self) -> Option<MutexGuard<'a, T>> {
        let guard = self.mutex.try_lock()?;
        if let Some(key) = self.key.take() {
            // Drop our entry if it is still queued; a consumed wakeup was meant for us.
            self.mutex.waiters.unregister(key);
        }
        Some(guard)
    }
}

impl<'a, T> Future for MutexLockFuture<'a, T> {
    type Output = MutexGuard<'a, T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;

        // Fast path.
        if let Some(guard) = this.try_acquire() {
            return Poll::Ready(guard);
        }

        // Register waker BEFORE retry to avoid a lost wakeup.
        this.mutex.waiters.register(&mut this.key, cx.waker());

        // The holder may have released between the attempt and registration.
        if let Some(guard) = this.try_acquire() {
            return Poll::Ready(guard);
        }

        Poll::Pending
    }
}

impl<T> Drop for MutexLockFuture<'_, T> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            // Woken but abandoned: hand the release notification to the next waiter.
            if !self.mutex.waiters.unregister(key) {
                self.mutex.waiters.wake_one();
            }
        }
    }
}

/// Future returned by [`Mutex::lock_interruptible`].
pub struct InterruptibleLockFuture<'a, T> {
    inner: MutexLockFuture<'a, T>,
    cancel: &'a CancelToken,
    cancel_key: Option<WaitKey>,
}

impl<'a, T> Future for InterruptibleLockFuture<'a, T> {
    type Output = Result<MutexGuard<'a, T>, Interrupted>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;

        if let Poll::Ready(guard) = Pin::new(&mut this.inner).poll(cx) {
            return Poll::Ready(Ok(guard));
        }

        // Blocked: make sure a cancel() wakes us, then check for one.
        this.cancel.subscribe(&mut this.cancel_key, cx.waker());
        if this.cancel.is_cancelled() {
            // Dropping `inner` (with the future) releases our queue slot.
            return Poll::Ready(Err(Interrupted));
        }

        Poll::Pending
    }
}

impl<T> Drop for InterruptibleLockFuture<'_, T> {
    fn drop(&mut self) {
        if let Some(key) = self.cancel_key.take() {
            self.cancel.unsubscribe(key);
        }
    }
}

/// RAII guard that releases the [`Mutex`] when dropped.
pub struct MutexGuard<'a, T> {
    mutex: &'a Mutex<T>,
}

impl<T> Deref for MutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: The guard guarantees exclusive access while it exists.
        unsafe { &*self.mutex.data.get() }
    }
}

impl<T> DerefMut for MutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: The guard guarantees exclusive access while it exists.
        unsafe { &mut *self.mutex.data.get() }
    }
}

impl<T> Drop for MutexGuard<'_, T> {
    fn drop(&mut self) {
        self.mutex.locked.store(false, Ordering::Release);
        self.mutex.waiters.wake_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::test_waker::{block_on, counting_waker, noop_waker};
    use std::sync::Arc;
    use std::sync::atomic::Ordering as StdOrdering;
    use std::task::Context;

    #[test]
    fn try_lock_succeeds_when_free() {
        let mutex = Mutex::new(42);
        let guard = mutex.try_lock();
        assert!(guard.is_some());
        assert_eq!(*guard.unwrap(), 42);
    }

    #[test]
    fn try_lock_fails_when_held() {
        let mutex = Mutex::new(42);
        let _guard = mutex.try_lock().unwrap();
        assert!(mutex.try_lock().is_none());
    }

    #[test]
    fn guard_mutate_and_release() {
        let mutex = Mutex::new(0);
        {
            let mut guard = block_on(mutex.lock());
            *guard = 99;
        }
        assert!(!mutex.is_locked());
        assert_eq!(*mutex.try_lock().unwrap(), 99);
    }

    #[test]
    fn lock_future_pending_when_held() {
        let mutex = Mutex::new(42);
        let _guard = mutex.try_lock().unwrap();

        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        let mut fut = mutex.lock();
        assert!(Pin::new(&mut fut).poll(&mut cx).is_pending());
    }

    #[test]
    fn drop_guard_wakes_waiter() {
        let mutex = Mutex::new(42);
        let guard = mutex.try_lock().unwrap();

        let (waker, count) = counting_waker();
        let mut cx = Context::from_waker(&waker);
        let mut fut = mutex.lock();
        assert!(Pin::new(&mut fut).poll(&mut cx).is_pending());

        drop(guard);
        assert_eq!(count.load(StdOrdering::SeqCst), 1);
        assert!(Pin::new(&mut fut).poll(&mut cx).is_ready());
    }

    #[test]
    fn abandoned_waiter_forwards_wakeup() {
        let mutex = Mutex::new(());
        let guard = mutex.try_lock().unwrap();

        let (w1, c1) = counting_waker();
        let (w2, c2) = counting_waker();
        let mut first = mutex.lock();
        let mut second = mutex.lock();
        assert!(Pin::new(&mut first).poll(&mut Context::from_waker(&w1)).is_pending());
        assert!(Pin::new(&mut second).poll(&mut Context::from_waker(&w2)).is_pending());

        // Release wakes `first`, which then gives up without polling.
        drop(guard);
        assert_eq!(c1.load(StdOrdering::SeqCst), 1);
        drop(first);

        // The wakeup must have moved on to `second`.
        assert_eq!(c2.load(StdOrdering::SeqCst), 1);
        assert!(Pin::new(&mut second).poll(&mut Context::from_waker(&w2)).is_ready());
    }

    #[test]
    fn interruptible_lock_takes_free_lock_even_if_cancelled() {
        let mutex = Mutex::new(1);
        let cancel = CancelToken::new();
        cancel.cancel();
        let guard = block_on(mutex.lock_interruptible(&cancel));
        assert!(guard.is_ok());
    }

    #[test]
    fn interruptible_lock_aborts_when_cancelled_while_blocked() {
        let mutex = Mutex::new(1);
        let cancel = CancelToken::new();
        let _held = mutex.try_lock().unwrap();

        let (waker, count) = counting_waker();
        let mut cx = Context::from_waker(&waker);
        let mut fut = mutex.lock_interruptible(&cancel);
        assert!(Pin::new(&mut fut).poll(&mut cx).is_pending());

        cancel.cancel();
        assert!(count.load(StdOrdering::SeqCst) >= 1, "cancel must wake the waiter");
        assert!(matches!(
            Pin::new(&mut fut).poll(&mut cx),
            Poll::Ready(Err(Interrupted))
        ));
        drop(fut);

        // Lock state untouched and no stale waiter left behind.
        assert!(mutex.is_locked());
        assert!(mutex.waiters.is_empty());
    }

    #[test]
    fn interrupted_acquire_leaves_lock_available() {
        let mutex = Arc::new(Mutex::new(0u32));
        let cancel = Arc::new(CancelToken::new());
        let held = mutex.try_lock().unwrap();

        let waiter = {
            let mutex = Arc::clone(&mutex);
            let cancel = Arc::clone(&cancel);
            std::thread::spawn(move || block_on(mutex.lock_interruptible(&cancel)).is_err())
        };
        std::thread::sleep(std::time::Duration::from_millis(20));
        cancel.cancel();
        assert!(waiter.join().unwrap());

        drop(held);
        assert!(mutex.try_lock().is_some());
    }

    #[test]
    fn contended_lock_serializes_threads() {
        let mutex = Arc::new(Mutex::new(0usize));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let mutex = Arc::clone(&mutex);
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        let mut guard = block_on(mutex.lock());
                        let v = *guard;
                        std::hint::spin_loop();
                        *guard = v + 1;
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(*mutex.try_lock().unwrap(), 800);
    }
}
