//! Keyed wait queue for interrupt-driven wakeups.
//!
//! [`WaitQueue`] stores [`Waker`]s of tasks waiting for an event. Interrupt
//! handlers or releasing lock holders call [`wake_one`](WaitQueue::wake_one)
//! or [`wake_all`](WaitQueue::wake_all) to resume them.
//!
//! Each registration is identified by a [`WaitKey`]. A future that is
//! re-polled updates its existing entry instead of piling up duplicates,
//! and a future that is dropped while still queued removes itself. When the
//! removal finds the entry already gone, the future was woken but will never
//! act on the wakeup; callers that hand off a single resource (see
//! [`Mutex`](super::Mutex)) must pass that wakeup on.

use alloc::collections::VecDeque;
use core::task::Waker;

use super::IrqSpinLock;

/// Identifies one registration in a [`WaitQueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitKey(u64);

struct Waiters {
    next_key: u64,
    /// FIFO: `wake_one` pops from the front.
    entries: VecDeque<(WaitKey, Waker)>,
}

/// A queue of tasks waiting for an event.
pub struct WaitQueue {
    waiters: IrqSpinLock<Waiters>,
}

impl WaitQueue {
    /// Creates an empty wait queue.
    pub const fn new() -> Self {
        Self {
            waiters: IrqSpinLock::named(
                "WaitQueue",
                Waiters {
                    next_key: 0,
                    entries: VecDeque::new(),
                },
            ),
        }
    }

    /// Registers `waker`, reusing the entry named by `key` if it is still queued.
    ///
    /// On return `key` names the live entry.
    pub fn register(&self, key: &mut Option<WaitKey>, waker: &Waker) {
        let mut waiters = self.waiters.lock();
        if let Some(existing) = *key {
            if let Some((_, slot)) = waiters.entries.iter_mut().find(|(k, _)| *k == existing) {
                if !slot.will_wake(waker) {
                    slot.clone_from(waker);
                }
                return;
            }
        }
        let fresh = WaitKey(waiters.next_key);
        waiters.next_key = waiters.next_key.wrapping_add(1);
        waiters.entries.push_back((fresh, waker.clone()));
        *key = Some(fresh);
    }

    /// Removes the entry named by `key`.
    ///
    /// Returns `true` if the entry was still queued, `false` if it had
    /// already been woken (and removed) by a `wake_*` call.
    pub fn unregister(&self, key: WaitKey) -> bool {
        let mut waiters = self.waiters.lock();
        if let Some(pos) = waiters.entries.iter().position(|(k, _)| *k == key) {
            waiters.entries.remove(pos);
            true
        } else {
            false
        }
    }

    /// Wakes the longest-waiting task. Returns `true` if one was queued.
    pub fn wake_one(&self) -> bool {
        let entry = self.waiters.lock().entries.pop_front();
        match entry {
            Some((_, waker)) => {
                waker.wake();
                true
            }
            None => false,
        }
    }

    /// Wakes every queued task. Returns how many were woken.
    pub fn wake_all(&self) -> usize {
        let drained = core::mem::take(&mut self.waiters.lock().entries);
        let count = drained.len();
        // Wake outside the lock.
        for (_, waker) in drained {
            waker.wake();
        }
        count
    }

    /// Returns the number of queued registrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.waiters.lock().entries.len()
    }

    /// Returns `true` if nobody is waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for WaitQueue {
    fn default() -> Self {
        Self::new()
    }
}
