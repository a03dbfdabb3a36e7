//! PCI identity and driver matching.

use core::fmt;

/// PCI bus/device/function address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PciAddress {
    /// Bus number.
    pub bus: u8,
    /// Device number (0-31).
    pub device: u8,
    /// Function number (0-7).
    pub function: u8,
}

impl fmt::Display for PciAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02x}:{:02x}.{}", self.bus, self.device, self.function)
    }
}

/// Wildcard for [`PciDeviceId`] fields.
pub const PCI_ANY_ID: u16 = 0xFFFF;

/// One entry of a driver's PCI id table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PciDeviceId {
    /// Vendor ID, or [`PCI_ANY_ID`].
    pub vendor: u16,
    /// Device ID, or [`PCI_ANY_ID`].
    pub device: u16,
    /// Subsystem vendor ID, or [`PCI_ANY_ID`].
    pub subvendor: u16,
    /// Subsystem device ID, or [`PCI_ANY_ID`].
    pub subdevice: u16,
}

impl PciDeviceId {
    /// Matches a specific vendor/device pair with any subsystem.
    #[must_use]
    pub const fn new(vendor: u16, device: u16) -> Self {
        Self {
            vendor,
            device,
            subvendor: PCI_ANY_ID,
            subdevice: PCI_ANY_ID,
        }
    }

    /// Returns `true` if this entry matches `info`.
    #[must_use]
    pub fn matches(&self, info: &PciDeviceInfo) -> bool {
        let field = |want: u16, have: u16| want == PCI_ANY_ID || want == have;
        field(self.vendor, info.vendor_id)
            && field(self.device, info.device_id)
            && field(self.subvendor, info.subsystem_vendor_id)
            && field(self.subdevice, info.subsystem_device_id)
    }
}

/// Returns the first entry of `table` matching `info`.
#[must_use]
pub fn match_id<'a>(table: &'a [PciDeviceId], info: &PciDeviceInfo) -> Option<&'a PciDeviceId> {
    table.iter().find(|id| id.matches(info))
}

/// Decoded PCI Base Address Register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PciBar {
    /// Memory-mapped BAR.
    Memory {
        /// Base physical address.
        base: u64,
        /// Size in bytes.
        size: u64,
        /// Whether the region is prefetchable.
        prefetchable: bool,
    },
    /// I/O port BAR.
    Io {
        /// Base I/O port.
        base: u32,
        /// Size in bytes.
        size: u32,
    },
    /// Slot unused or consumed by the upper half of a 64-bit BAR.
    Unused,
}

impl PciBar {
    /// Returns `(base, size)` if this is a memory BAR.
    #[must_use]
    pub const fn memory(&self) -> Option<(u64, u64)> {
        match *self {
            Self::Memory { base, size, .. } => Some((base, size)),
            _ => None,
        }
    }
}

/// Configuration-space summary of a discovered PCI function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PciDeviceInfo {
    /// Bus/device/function address.
    pub address: PciAddress,
    /// Vendor ID.
    pub vendor_id: u16,
    /// Device ID.
    pub device_id: u16,
    /// Revision ID.
    pub revision: u8,
    /// Subsystem vendor ID.
    pub subsystem_vendor_id: u16,
    /// Subsystem device ID.
    pub subsystem_device_id: u16,
    /// Legacy interrupt line configured by firmware.
    pub interrupt_line: u8,
    /// Base Address Registers.
    pub bars: [PciBar; 6],
}

impl PciDeviceInfo {
    /// Returns BAR `index`, or [`PciBar::Unused`] if out of range.
    #[must_use]
    pub fn bar(&self, index: usize) -> PciBar {
        self.bars.get(index).copied().unwrap_or(PciBar::Unused)
    }
}
