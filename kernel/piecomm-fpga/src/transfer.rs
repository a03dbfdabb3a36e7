//! Blocking snapshot transfer.
//!
//! [`FpgaDevice::transfer`] is the process-context consumer. It takes the
//! access lock, and while no new generation exists it drops the lock and
//! parks on the device's reader queue. Once a generation is pending it
//! snapshots the hardware region into the driver-owned buffer, hands that
//! buffer to the caller and consumes exactly one generation.
//!
//! Cancellation is observed both while acquiring the lock and while
//! parked. A cancelled transfer returns without touching the region or the
//! `consumed` counter, and never holds the lock on return. Dropping the
//! transfer future mid-wait is equally safe.

use core::fmt;
use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll};

use piecomm_core::sync::{CancelToken, Interrupted, WaitKey};
use piecomm_core::{kdebug, kerr, kwarn};
use piecomm_driver_api::DriverError;
use piecomm_driver_api::user::UserBuffer;

use crate::accessor::SnapshotSource;
use crate::device::{FpgaDevice, TransferState};

/// Why a transfer did not deliver a full snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferError {
    /// The caller was cancelled before a snapshot was taken.
    Interrupted,
    /// The snapshot was taken and consumed, but only `delivered` bytes
    /// reached the caller.
    Partial {
        /// Bytes written to the caller's buffer.
        delivered: usize,
        /// Bytes of the snapshot the caller did not receive.
        missing: usize,
    },
    /// The hardware region could not be read.
    Hardware(DriverError),
    /// The device was removed.
    Detached,
}

impl fmt::Display for TransferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interrupted => f.write_str("transfer interrupted"),
            Self::Partial { delivered, missing } => {
                write!(f, "partial delivery: {delivered} bytes, {missing} missing")
            }
            Self::Hardware(err) => write!(f, "hardware access failed: {err}"),
            Self::Detached => f.write_str("device detached"),
        }
    }
}

impl<S: SnapshotSource> FpgaDevice<S> {
    /// Waits for a new generation and delivers one snapshot into `dest`.
    ///
    /// Returns the number of bytes delivered, which is the full snapshot
    /// size on success. The capacity of `dest` does not change what is
    /// snapshotted; a short destination yields [`TransferError::Partial`]
    /// and the generation is still consumed.
    ///
    /// # Errors
    ///
    /// See [`TransferError`].
    pub async fn transfer<B>(
        &self,
        dest: &mut B,
        cancel: &CancelToken,
    ) -> Result<usize, TransferError>
    where
        B: UserBuffer + ?Sized,
    {
        loop {
            if self.is_detached() {
                return Err(TransferError::Detached);
            }
            let mut state = match self.access.lock_interruptible(cancel).await {
                Ok(guard) => guard,
                Err(Interrupted) => return Err(self.interrupted()),
            };
            if self.is_detached() {
                return Err(TransferError::Detached);
            }
            if self.produced.is_ahead_of(state.consumed) {
                return self.deliver(&mut state, dest);
            }

            // Nothing new: release the lock before parking so other readers
            // and the next snapshot are not held up.
            let seen = state.consumed;
            drop(state);
            self.wait_for_generation(seen, cancel)
                .await
                .map_err(|err| match err {
                    TransferError::Interrupted => self.interrupted(),
                    other => other,
                })?;
        }
    }

    fn wait_for_generation<'a>(
        &'a self,
        seen: u64,
        cancel: &'a CancelToken,
    ) -> GenerationWait<'a, S> {
        GenerationWait {
            device: self,
            seen,
            cancel,
            reader_key: None,
            cancel_key: None,
        }
    }

    /// Snapshot, hand-off and consume. Runs with the access lock held.
    fn deliver<B>(&self, state: &mut TransferState, dest: &mut B) -> Result<usize, TransferError>
    where
        B: UserBuffer + ?Sized,
    {
        if let Err(err) = self.source.snapshot(&mut state.local) {
            kerr!("piecomm: snapshot failed: {}", err);
            return Err(TransferError::Hardware(err));
        }

        // A misbehaving buffer may claim more than it was offered.
        let missing = dest.copy_to_user(&state.local).min(state.local.len());
        state.consumed = state.consumed.wrapping_add(1);
        self.record_read(state.consumed);

        let delivered = state.local.len() - missing;
        if missing == 0 {
            Ok(delivered)
        } else {
            self.record_partial();
            kwarn!(
                "piecomm: short read, {} of {} bytes delivered",
                delivered,
                state.local.len()
            );
            Err(TransferError::Partial { delivered, missing })
        }
    }

    fn interrupted(&self) -> TransferError {
        self.record_interrupted();
        kdebug!("piecomm: read interrupted");
        TransferError::Interrupted
    }
}

/// Guarded wait for `produced` to move past `seen`.
///
/// Resolves `Ok` once a newer generation exists, or with an error on
/// detach or cancellation. The predicate is re-checked after registering on
/// both queues, so a notify or cancel landing between the first check and
/// registration is never lost.
struct GenerationWait<'a, S> {
    device: &'a FpgaDevice<S>,
    seen: u64,
    cancel: &'a CancelToken,
    reader_key: Option<WaitKey>,
    cancel_key: Option<WaitKey>,
}

impl<S> GenerationWait<'_, S> {
    fn outcome(&self) -> Option<Result<(), TransferError>> {
        if self.device.is_detached() {
            Some(Err(TransferError::Detached))
        } else if self.device.produced.is_ahead_of(self.seen) {
            Some(Ok(()))
        } else if self.cancel.is_cancelled() {
            Some(Err(TransferError::Interrupted))
        } else {
            None
        }
    }
}

impl<S> Future for GenerationWait<'_, S> {
    type Output = Result<(), TransferError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Some(outcome) = self.outcome() {
            return Poll::Ready(outcome);
        }
        let this = &mut *self;
        this.device.readers.register(&mut this.reader_key, cx.waker());
        this.cancel.subscribe(&mut this.cancel_key, cx.waker());
        match this.outcome() {
            Some(outcome) => Poll::Ready(outcome),
            None => Poll::Pending,
        }
    }
}

impl<S> Drop for GenerationWait<'_, S> {
    fn drop(&mut self) {
        if let Some(key) = self.reader_key.take() {
            self.device.readers.unregister(key);
        }
        if let Some(key) = self.cancel_key.take() {
            self.cancel.unsubscribe(key);
        }
    }
}
