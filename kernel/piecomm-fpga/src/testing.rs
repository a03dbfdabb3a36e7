//! Test doubles for the hardware region, the user boundary and the kernel
//! probe services.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicUsize, Ordering};
use std::time::Duration;

use piecomm_driver_api::DriverError;
use piecomm_driver_api::irq::InterruptHandler;
use piecomm_driver_api::pci::{PciAddress, PciBar, PciDeviceInfo};
use piecomm_driver_api::probe::{ChrdevNumber, PciProbeContext};
use piecomm_driver_api::resource::{IrqLine, IrqVectors, MmioRegion};
use piecomm_driver_api::user::UserBuffer;

use crate::accessor::SnapshotSource;

/// Fill with the 1-based call number instead of a fixed byte.
const FILL_CALL_NUMBER: u16 = 0x100;

/// Instrumented snapshot source.
///
/// Fills the destination with a recognizable byte and counts overlapping
/// invocations, which must never happen while the access lock works.
pub(crate) struct FakeSource {
    size: usize,
    delay: Duration,
    calls: AtomicUsize,
    fill: AtomicU16,
    failing: AtomicBool,
    busy: AtomicBool,
    overlaps: AtomicUsize,
}

impl FakeSource {
    pub(crate) fn new(size: usize) -> Self {
        Self::slow(size, Duration::ZERO)
    }

    /// A source whose snapshot takes `delay`, widening race windows.
    pub(crate) fn slow(size: usize, delay: Duration) -> Self {
        Self {
            size,
            delay,
            calls: AtomicUsize::new(0),
            fill: AtomicU16::new(FILL_CALL_NUMBER),
            failing: AtomicBool::new(false),
            busy: AtomicBool::new(false),
            overlaps: AtomicUsize::new(0),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn overlaps(&self) -> usize {
        self.overlaps.load(Ordering::SeqCst)
    }

    pub(crate) fn set_fill(&self, byte: u8) {
        self.fill.store(u16::from(byte), Ordering::SeqCst);
    }

    pub(crate) fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl SnapshotSource for FakeSource {
    fn size(&self) -> usize {
        self.size
    }

    fn snapshot(&self, dest: &mut [u8]) -> Result<(), DriverError> {
        if self.busy.swap(true, Ordering::SeqCst) {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }

        let result = if self.failing.load(Ordering::SeqCst) {
            Err(DriverError::IoError)
        } else {
            let fill = self.fill.load(Ordering::SeqCst);
            let byte = if fill == FILL_CALL_NUMBER {
                call as u8
            } else {
                fill as u8
            };
            dest.fill(byte);
            Ok(())
        };
        self.busy.store(false, Ordering::SeqCst);
        result
    }
}

/// A user buffer that faults after `accept` bytes.
pub(crate) struct ShortBuffer {
    data: Vec<u8>,
    accept: usize,
}

impl ShortBuffer {
    pub(crate) fn new(capacity: usize, accept: usize) -> Self {
        Self {
            data: vec![0; capacity],
            accept,
        }
    }
}

impl UserBuffer for ShortBuffer {
    fn capacity(&self) -> usize {
        self.data.len()
    }

    fn copy_to_user(&mut self, src: &[u8]) -> usize {
        let n = src.len().min(self.accept).min(self.data.len());
        self.data[..n].copy_from_slice(&src[..n]);
        src.len() - n
    }
}

/// Probe services a test can make fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Step {
    Enable,
    MapBar,
    AllocVectors,
    RequestIrq,
    RegisterChrdev,
}

type InstalledHandler = (IrqLine, &'static str, Arc<dyn InterruptHandler>);

/// In-memory kernel: BAR0 is backed by a heap buffer, interrupts are raised
/// by hand and every claimed resource is tracked.
pub(crate) struct FakeContext {
    info: PciDeviceInfo,
    bar: Vec<u64>,
    fail: Option<Step>,
    log: Vec<Step>,
    enabled: bool,
    mapped: Option<MmioRegion>,
    vectors: Option<IrqVectors>,
    handler: Option<InstalledHandler>,
    node: Option<(ChrdevNumber, &'static str)>,
}

impl FakeContext {
    const BAR_BASE: u64 = 0xFEB0_0000;

    /// A board with a `bar_size`-byte BAR0 (rounded up to whole words).
    pub(crate) fn new(bar_size: usize) -> Self {
        let words = bar_size.div_ceil(8);
        let mut bars = [PciBar::Unused; 6];
        bars[0] = PciBar::Memory {
            base: Self::BAR_BASE,
            size: (words * 8) as u64,
            prefetchable: false,
        };
        Self {
            info: PciDeviceInfo {
                address: PciAddress {
                    bus: 1,
                    device: 0,
                    function: 0,
                },
                vendor_id: crate::config::VENDOR_ID,
                device_id: crate::config::DEVICE_ID,
                revision: 0,
                subsystem_vendor_id: 0,
                subsystem_device_id: 0,
                interrupt_line: 11,
                bars,
            },
            bar: vec![0; words],
            fail: None,
            log: Vec::new(),
            enabled: false,
            mapped: None,
            vectors: None,
            handler: None,
            node: None,
        }
    }

    pub(crate) fn set_ids(&mut self, vendor: u16, device: u16) {
        self.info.vendor_id = vendor;
        self.info.device_id = device;
    }

    pub(crate) fn make_bar_io(&mut self) {
        self.info.bars[0] = PciBar::Io {
            base: 0xC000,
            size: 0x100,
        };
    }

    pub(crate) fn fail_at(&mut self, step: Step) {
        self.fail = Some(step);
    }

    pub(crate) fn log(&self) -> Vec<Step> {
        self.log.clone()
    }

    /// Overwrites the start of BAR0 as the board would.
    pub(crate) fn write_bar(&mut self, bytes: &[u8]) {
        for (word, chunk) in self.bar.iter_mut().zip(bytes.chunks(8)) {
            let mut raw = word.to_ne_bytes();
            raw[..chunk.len()].copy_from_slice(chunk);
            *word = u64::from_ne_bytes(raw);
        }
    }

    /// Delivers one interrupt to the installed handler, if any.
    pub(crate) fn raise_irq(&self) {
        if let Some((_, _, handler)) = &self.handler {
            handler.handle_irq();
        }
    }

    pub(crate) fn irq_installed(&self) -> bool {
        self.handler.is_some()
    }

    pub(crate) fn irq_name(&self) -> Option<&'static str> {
        self.handler.as_ref().map(|(_, name, _)| *name)
    }

    pub(crate) fn node_name(&self) -> Option<&'static str> {
        self.node.map(|(_, name)| name)
    }

    /// `true` if nothing is claimed, mapped or enabled.
    pub(crate) fn is_clean(&self) -> bool {
        !self.enabled
            && self.mapped.is_none()
            && self.vectors.is_none()
            && self.handler.is_none()
            && self.node.is_none()
    }

    fn step(&mut self, step: Step) -> Result<(), DriverError> {
        if self.fail == Some(step) {
            return Err(DriverError::Busy);
        }
        self.log.push(step);
        Ok(())
    }
}

impl PciProbeContext for FakeContext {
    fn device(&self) -> &PciDeviceInfo {
        &self.info
    }

    fn enable_device(&mut self) -> Result<(), DriverError> {
        self.step(Step::Enable)?;
        self.enabled = true;
        Ok(())
    }

    fn disable_device(&mut self) {
        self.enabled = false;
    }

    fn map_bar(&mut self, index: usize) -> Result<MmioRegion, DriverError> {
        let (base, size) = self
            .info
            .bar(index)
            .memory()
            .ok_or(DriverError::Unsupported)?;
        self.step(Step::MapBar)?;
        // SAFETY: `bar` lives as long as the context and is never resized.
        let region = unsafe { MmioRegion::new(base, self.bar.as_ptr() as usize, size as usize) };
        self.mapped = Some(region);
        Ok(region)
    }

    fn unmap_bar(&mut self, region: MmioRegion) {
        assert_eq!(self.mapped.take(), Some(region));
    }

    fn alloc_irq_vectors(&mut self, min: u8, max: u8) -> Result<IrqVectors, DriverError> {
        self.step(Step::AllocVectors)?;
        let count = max.min(4);
        if count < min {
            return Err(DriverError::Unsupported);
        }
        // SAFETY: fake vectors, never delivered by real hardware.
        let vectors = unsafe { IrqVectors::new(48, count) };
        self.vectors = Some(vectors);
        Ok(vectors)
    }

    fn free_irq_vectors(&mut self, vectors: IrqVectors) {
        assert_eq!(self.vectors.take(), Some(vectors));
    }

    fn request_irq(
        &mut self,
        line: IrqLine,
        name: &'static str,
        handler: Arc<dyn InterruptHandler>,
    ) -> Result<(), DriverError> {
        self.step(Step::RequestIrq)?;
        self.handler = Some((line, name, handler));
        Ok(())
    }

    fn free_irq(&mut self, line: IrqLine) {
        let installed = self.handler.take().map(|(l, _, _)| l);
        assert_eq!(installed, Some(line));
    }

    fn register_chrdev(&mut self, name: &'static str) -> Result<ChrdevNumber, DriverError> {
        self.step(Step::RegisterChrdev)?;
        let number = ChrdevNumber {
            major: 240,
            minor: 0,
        };
        self.node = Some((number, name));
        Ok(number)
    }

    fn unregister_chrdev(&mut self, number: ChrdevNumber) {
        assert_eq!(self.node.take().map(|(n, _)| n), Some(number));
    }
}
