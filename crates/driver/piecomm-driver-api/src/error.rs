//! Errors of the probe services and of device access.
//!
//! Probe failures come back from [`PciProbeContext`](crate::probe::PciProbeContext)
//! calls and are unwound by the driver. Access failures surface at read
//! time, for example when a [`MmioRegion`](crate::resource::MmioRegion)
//! copy falls outside the mapped BAR.

use core::fmt;

/// Failure of a probe service or a device access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverError {
    /// The device is not in the driver's id table.
    DeviceNotFound,
    /// The device was found but cannot be driven as configured, e.g. the
    /// snapshot does not fit its BAR or no interrupt vector was handed out.
    InitFailed,
    /// The BAR is not a memory BAR, or too few interrupt vectors exist.
    Unsupported,
    /// A read of mapped device memory fell outside the region.
    IoError,
    /// A snapshot size is zero or does not match the region it is read from.
    InvalidState,
    /// The snapshot buffer could not be allocated.
    OutOfMemory,
    /// A vector, IRQ or device number is already claimed.
    Busy,
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DeviceNotFound => f.write_str("device not found"),
            Self::InitFailed => f.write_str("driver initialization failed"),
            Self::Unsupported => f.write_str("operation not supported"),
            Self::IoError => f.write_str("device memory access out of range"),
            Self::InvalidState => f.write_str("invalid snapshot size"),
            Self::OutOfMemory => f.write_str("out of memory"),
            Self::Busy => f.write_str("resource busy"),
        }
    }
}
