//! Per-board device state and the interrupt notifier.
//!
//! [`FpgaDevice`] pairs two counters. `produced` is a [`Generation`]
//! advanced only by the interrupt handler. `consumed` lives inside the
//! access lock together with the local snapshot buffer and advances only
//! after a successful snapshot. Data is pending whenever the two differ
//! (compared modulo 2^64).
//!
//! Readers blocked waiting for a new generation sit on `readers`; the
//! notifier wakes all of them and they race for the access lock.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use piecomm_core::sync::{Generation, Mutex, WaitQueue};
use piecomm_core::{kdebug, ktrace};
use piecomm_driver_api::DriverError;
use piecomm_driver_api::irq::{InterruptHandler, IrqReturn};

use crate::accessor::{MmioSnapshot, SnapshotSource};

bitflags::bitflags! {
    /// Attachment state of an [`FpgaDevice`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DeviceFlags: u32 {
        /// The device is bound and serving reads.
        const ATTACHED        = 1 << 0;
        /// The interrupt handler is installed.
        const IRQ_BOUND       = 1 << 1;
        /// The character device node exists.
        const NODE_REGISTERED = 1 << 2;
        /// The device has been torn down; every read fails.
        const DETACHED        = 1 << 3;
    }
}

/// State owned by whoever holds the access lock.
pub(crate) struct TransferState {
    /// Generations consumed by completed snapshots.
    pub(crate) consumed: u64,
    /// Driver-owned copy of the most recent snapshot.
    pub(crate) local: Box<[u8]>,
}

/// Counters readable without taking the access lock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceStats {
    /// Interrupts observed (the `produced` generation).
    pub interrupts: u64,
    /// Snapshots handed to readers (the `consumed` generation).
    pub reads: u64,
    /// Transfers where the caller received fewer bytes than the snapshot.
    pub partial_deliveries: u64,
    /// Transfers abandoned because the caller was cancelled.
    pub interrupted_reads: u64,
}

/// One attached board.
pub struct FpgaDevice<S = MmioSnapshot> {
    pub(crate) source: S,
    pub(crate) produced: Generation,
    pub(crate) access: Mutex<TransferState>,
    pub(crate) readers: WaitQueue,
    flags: AtomicU32,
    /// Mirror of `TransferState::consumed` for lock-free statistics.
    reads: AtomicU64,
    partial: AtomicU64,
    interrupted: AtomicU64,
}

impl<S: SnapshotSource> FpgaDevice<S> {
    /// Creates the state for a freshly attached board.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::InvalidState`] for an empty source and
    /// [`DriverError::OutOfMemory`] if the local buffer cannot be allocated.
    pub fn new(source: S) -> Result<Self, DriverError> {
        let size = source.size();
        if size == 0 {
            return Err(DriverError::InvalidState);
        }
        let mut local = Vec::new();
        local
            .try_reserve_exact(size)
            .map_err(|_| DriverError::OutOfMemory)?;
        local.resize(size, 0);

        Ok(Self {
            source,
            produced: Generation::new(),
            access: Mutex::named(
                "piecomm.access",
                TransferState {
                    consumed: 0,
                    local: local.into_boxed_slice(),
                },
            ),
            readers: WaitQueue::new(),
            flags: AtomicU32::new(DeviceFlags::ATTACHED.bits()),
            reads: AtomicU64::new(0),
            partial: AtomicU64::new(0),
            interrupted: AtomicU64::new(0),
        })
    }

    /// Returns the snapshot size in bytes.
    #[must_use]
    pub fn snapshot_size(&self) -> usize {
        self.source.size()
    }

    /// Returns the snapshot source.
    pub fn source(&self) -> &S {
        &self.source
    }
}

impl<S> FpgaDevice<S> {
    /// Signals that the board has new data.
    ///
    /// Advances `produced` and wakes every blocked reader. Never blocks and
    /// never touches the hardware, so it is safe from interrupt context.
    pub fn notify(&self) {
        let generation = self.produced.advance();
        let woken = self.readers.wake_all();
        ktrace!("piecomm: generation {} woke {} reader(s)", generation, woken);
    }

    /// Returns how many generations are waiting to be consumed.
    #[must_use]
    pub fn pending(&self) -> u64 {
        self.produced
            .current()
            .wrapping_sub(self.reads.load(Ordering::Acquire))
    }

    /// Returns the current attachment flags.
    #[must_use]
    pub fn flags(&self) -> DeviceFlags {
        DeviceFlags::from_bits_truncate(self.flags.load(Ordering::Acquire))
    }

    /// Returns `true` once [`detach`](Self::detach) has run.
    #[must_use]
    pub fn is_detached(&self) -> bool {
        self.flags().contains(DeviceFlags::DETACHED)
    }

    /// Marks the device as torn down and wakes every blocked reader.
    ///
    /// Readers observe the flag on wakeup (or on their next lock
    /// acquisition) and fail with `Detached` without touching the region.
    pub fn detach(&self) {
        self.flags
            .fetch_or(DeviceFlags::DETACHED.bits(), Ordering::AcqRel);
        self.clear_flags(DeviceFlags::ATTACHED);
        let woken = self.readers.wake_all();
        kdebug!("piecomm: detached, woke {} reader(s)", woken);
    }

    /// Returns a snapshot of the device counters.
    #[must_use]
    pub fn stats(&self) -> DeviceStats {
        DeviceStats {
            interrupts: self.produced.current(),
            reads: self.reads.load(Ordering::Acquire),
            partial_deliveries: self.partial.load(Ordering::Relaxed),
            interrupted_reads: self.interrupted.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn set_flags(&self, flags: DeviceFlags) {
        self.flags.fetch_or(flags.bits(), Ordering::AcqRel);
    }

    pub(crate) fn clear_flags(&self, flags: DeviceFlags) {
        self.flags.fetch_and(!flags.bits(), Ordering::AcqRel);
    }

    pub(crate) fn record_read(&self, consumed: u64) {
        self.reads.store(consumed, Ordering::Release);
    }

    pub(crate) fn record_partial(&self) {
        self.partial.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_interrupted(&self) {
        self.interrupted.fetch_add(1, Ordering::Relaxed);
    }
}

impl<S: Send + Sync> InterruptHandler for FpgaDevice<S> {
    fn handle_irq(&self) -> IrqReturn {
        self.notify();
        IrqReturn::Handled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeSource;
    use piecomm_core::sync::test_waker::counting_waker;

    #[test]
    fn new_device_is_attached_and_idle() {
        let device = FpgaDevice::new(FakeSource::new(64)).unwrap();
        assert_eq!(device.flags(), DeviceFlags::ATTACHED);
        assert_eq!(device.pending(), 0);
        assert_eq!(device.stats(), DeviceStats::default());
        assert_eq!(device.snapshot_size(), 64);
    }

    #[test]
    fn empty_source_rejected() {
        assert_eq!(
            FpgaDevice::new(FakeSource::new(0)).err(),
            Some(DriverError::InvalidState)
        );
    }

    #[test]
    fn notify_advances_produced() {
        let device = FpgaDevice::new(FakeSource::new(64)).unwrap();
        device.notify();
        device.notify();
        assert_eq!(device.stats().interrupts, 2);
        assert_eq!(device.pending(), 2);
        assert_eq!(device.source().calls(), 0, "notify must not touch hardware");
    }

    #[test]
    fn notify_wakes_every_reader() {
        let device = FpgaDevice::new(FakeSource::new(64)).unwrap();
        let (w1, c1) = counting_waker();
        let (w2, c2) = counting_waker();
        device.readers.register(&mut None, &w1);
        device.readers.register(&mut None, &w2);

        device.notify();
        assert_eq!(c1.load(Ordering::SeqCst), 1);
        assert_eq!(c2.load(Ordering::SeqCst), 1);
        assert!(device.readers.is_empty());
    }

    #[test]
    fn handle_irq_reports_handled() {
        let device = FpgaDevice::new(FakeSource::new(8)).unwrap();
        assert_eq!(device.handle_irq(), IrqReturn::Handled);
        assert_eq!(device.stats().interrupts, 1);
    }

    #[test]
    fn detach_sets_flags_and_wakes() {
        let device = FpgaDevice::new(FakeSource::new(8)).unwrap();
        device.set_flags(DeviceFlags::IRQ_BOUND);
        let (waker, count) = counting_waker();
        device.readers.register(&mut None, &waker);

        device.detach();
        assert!(device.is_detached());
        assert!(!device.flags().contains(DeviceFlags::ATTACHED));
        assert!(device.flags().contains(DeviceFlags::IRQ_BOUND));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
