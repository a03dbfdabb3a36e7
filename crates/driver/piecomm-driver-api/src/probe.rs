//! Probe context for PCI drivers.
//!
//! The kernel implements [`PciProbeContext`] for each matched device and
//! passes it to the driver's probe and remove functions. Every service a
//! driver may need during attach and detach goes through it, so a driver
//! never reaches for global kernel state.

use alloc::sync::Arc;
use core::fmt;

use crate::error::DriverError;
use crate::irq::InterruptHandler;
use crate::pci::PciDeviceInfo;
use crate::resource::{IrqLine, IrqVectors, MmioRegion};

/// Major/minor number of a registered character device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChrdevNumber {
    /// Major number.
    pub major: u32,
    /// Minor number.
    pub minor: u32,
}

impl fmt::Display for ChrdevNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.major, self.minor)
    }
}

/// Kernel services available to a PCI driver for one device.
pub trait PciProbeContext {
    /// Returns the configuration-space summary of the device.
    fn device(&self) -> &PciDeviceInfo;

    /// Enables memory decoding and bus mastering.
    ///
    /// # Errors
    ///
    /// Returns an error if the device cannot be enabled.
    fn enable_device(&mut self) -> Result<(), DriverError>;

    /// Undoes [`enable_device`](Self::enable_device).
    fn disable_device(&mut self);

    /// Claims and maps memory BAR `index`.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Busy`] if another driver holds the BAR, or
    /// [`DriverError::Unsupported`] if it is not a memory BAR.
    fn map_bar(&mut self, index: usize) -> Result<MmioRegion, DriverError>;

    /// Unmaps and releases a region returned by [`map_bar`](Self::map_bar).
    fn unmap_bar(&mut self, region: MmioRegion);

    /// Allocates between `min` and `max` MSI/MSI-X vectors.
    ///
    /// # Errors
    ///
    /// Returns an error if fewer than `min` vectors are available.
    fn alloc_irq_vectors(&mut self, min: u8, max: u8) -> Result<IrqVectors, DriverError>;

    /// Releases vectors returned by [`alloc_irq_vectors`](Self::alloc_irq_vectors).
    fn free_irq_vectors(&mut self, vectors: IrqVectors);

    /// Installs `handler` on `line`.
    ///
    /// # Errors
    ///
    /// Returns an error if the line cannot be claimed.
    fn request_irq(
        &mut self,
        line: IrqLine,
        name: &'static str,
        handler: Arc<dyn InterruptHandler>,
    ) -> Result<(), DriverError>;

    /// Removes the handler installed on `line`.
    ///
    /// On return the handler is no longer running and will not run again.
    fn free_irq(&mut self, line: IrqLine);

    /// Allocates a device number and creates the `/dev/<name>` node.
    ///
    /// # Errors
    ///
    /// Returns an error if no number is available or node creation fails.
    fn register_chrdev(&mut self, name: &'static str) -> Result<ChrdevNumber, DriverError>;

    /// Destroys the node and releases the device number.
    fn unregister_chrdev(&mut self, number: ChrdevNumber);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chrdev_number_display() {
        let n = ChrdevNumber {
            major: 240,
            minor: 0,
        };
        assert_eq!(format!("{n}"), "240:0");
    }
}
