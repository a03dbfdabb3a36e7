//! Hardware region accessor.
//!
//! A [`SnapshotSource`] produces a point-in-time copy of the board's
//! output region. The hardware may rewrite the region at any moment, so a
//! snapshot is best effort and not transactionally consistent with the
//! board's own write cadence.
//!
//! Only call [`SnapshotSource::snapshot`] from process context while
//! holding the device's access lock.

use piecomm_driver_api::DriverError;
use piecomm_driver_api::resource::MmioRegion;

/// Something a fixed-size snapshot can be taken of.
pub trait SnapshotSource: Send + Sync {
    /// Returns the snapshot size in bytes.
    fn size(&self) -> usize;

    /// Copies the whole region into `dest`, which is exactly
    /// [`size`](Self::size) bytes long.
    ///
    /// # Errors
    ///
    /// Returns an error if the region cannot be read.
    fn snapshot(&self, dest: &mut [u8]) -> Result<(), DriverError>;
}

/// Snapshot source backed by a mapped PCI BAR.
#[derive(Debug, Clone, Copy)]
pub struct MmioSnapshot {
    region: MmioRegion,
    size: usize,
}

impl MmioSnapshot {
    /// Reads the first `size` bytes of `region`.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::InvalidState`] if `size` is zero or larger
    /// than the region.
    pub fn new(region: MmioRegion, size: usize) -> Result<Self, DriverError> {
        if size == 0 || size > region.size() {
            return Err(DriverError::InvalidState);
        }
        Ok(Self { region, size })
    }
}

impl SnapshotSource for MmioSnapshot {
    fn size(&self) -> usize {
        self.size
    }

    fn snapshot(&self, dest: &mut [u8]) -> Result<(), DriverError> {
        if dest.len() != self.size {
            return Err(DriverError::InvalidState);
        }
        self.region.copy_from_io(0, dest)
    }
}
