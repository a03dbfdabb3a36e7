//! Hardware resource claims: mapped MMIO regions and interrupt lines.

use core::mem::size_of;
use core::sync::atomic::{Ordering, fence};

use crate::error::DriverError;

/// An exclusive claim on a memory-mapped I/O region.
///
/// The driver only ever reads through a region. Reads are volatile so the
/// compiler neither caches nor elides them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MmioRegion {
    phys_base: u64,
    virt_base: usize,
    size: usize,
}

impl MmioRegion {
    /// Creates a new MMIO region descriptor.
    ///
    /// # Safety
    ///
    /// The caller must ensure that:
    /// - `virt_base` maps `phys_base` for `size` bytes with device (uncached)
    ///   memory attributes.
    /// - The mapping stays valid for as long as any copy of this descriptor
    ///   is used.
    #[must_use]
    pub const unsafe fn new(phys_base: u64, virt_base: usize, size: usize) -> Self {
        Self {
            phys_base,
            virt_base,
            size,
        }
    }

    /// Returns the physical base address.
    #[must_use]
    pub const fn phys_base(&self) -> u64 {
        self.phys_base
    }

    /// Returns the virtual base address.
    #[must_use]
    pub const fn virt_base(&self) -> usize {
        self.virt_base
    }

    /// Returns the size of the region in bytes.
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Copies `dest.len()` bytes starting at `offset` out of the region.
    ///
    /// Reads are issued in ascending address order, 64 bits at a time while
    /// the source is word-aligned and byte-wise for the tail. An acquire
    /// fence follows the last read so later loads of `dest` are not hoisted
    /// above the device accesses.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::IoError`] if the range falls outside the region.
    pub fn copy_from_io(&self, offset: usize, dest: &mut [u8]) -> Result<(), DriverError> {
        let end = offset.checked_add(dest.len()).ok_or(DriverError::IoError)?;
        if end > self.size {
            return Err(DriverError::IoError);
        }

        let src = self.virt_base + offset;
        let mut done = 0;

        if src % size_of::<u64>() == 0 {
            for chunk in dest.chunks_exact_mut(size_of::<u64>()) {
                // SAFETY: `src + done` is 8-byte aligned and the 8 bytes at it
                // lie inside the mapping (checked against `size` above).
                let word = unsafe { core::ptr::read_volatile((src + done) as *const u64) };
                chunk.copy_from_slice(&word.to_ne_bytes());
                done += size_of::<u64>();
            }
        }

        for byte in &mut dest[done..] {
            // SAFETY: `src + done` lies inside the mapping.
            *byte = unsafe { core::ptr::read_volatile((src + done) as *const u8) };
            done += 1;
        }

        fence(Ordering::Acquire);
        Ok(())
    }
}

/// An allocated interrupt vector owned by one driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IrqLine {
    vector: u32,
}

impl IrqLine {
    /// Creates a new IRQ line descriptor.
    ///
    /// # Safety
    ///
    /// The caller must ensure the vector was allocated to this device and is
    /// not claimed by another driver.
    #[must_use]
    pub const unsafe fn new(vector: u32) -> Self {
        Self { vector }
    }

    /// Returns the interrupt vector number.
    #[must_use]
    pub const fn vector(&self) -> u32 {
        self.vector
    }
}

/// A contiguous block of MSI/MSI-X vectors allocated to one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IrqVectors {
    base: u32,
    count: u8,
}

impl IrqVectors {
    /// Creates a vector block descriptor.
    ///
    /// # Safety
    ///
    /// The caller must ensure vectors `base..base + count` were allocated to
    /// this device.
    #[must_use]
    pub const unsafe fn new(base: u32, count: u8) -> Self {
        Self { base, count }
    }

    /// Returns the number of vectors in the block.
    #[must_use]
    pub const fn count(&self) -> u8 {
        self.count
    }

    /// Returns the line for the `index`-th vector of the block.
    #[must_use]
    pub const fn line(&self, index: u8) -> Option<IrqLine> {
        if index < self.count {
            Some(IrqLine {
                vector: self.base + index as u32,
            })
        } else {
            None
        }
    }
}
