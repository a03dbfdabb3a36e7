//! Synchronization primitives shared between interrupt and process context.
//!
//! [`IrqSpinLock`] guards short critical sections that an interrupt handler
//! may also enter. [`WaitQueue`] parks async tasks until an event fires.
//! [`Mutex`] serializes longer operations and supports interruptible
//! acquisition through a [`CancelToken`]. [`Generation`] is the
//! single-writer event counter an interrupt handler advances.

mod cancel;
mod generation;
mod irq_spinlock;
mod mutex;
mod waitqueue;

pub(crate) mod loom_compat;

#[cfg(any(test, feature = "test-util"))]
pub mod test_waker;


pub use cancel::{CancelToken, CancelWaitFuture, Interrupted};
pub use generation::Generation;
pub use irq_spinlock::{IrqSpinLock, IrqSpinLockGuard};
pub use mutex::{InterruptibleLockFuture, Mutex, MutexGuard, MutexLockFuture};
pub use waitqueue::{WaitKey, WaitQueue};
