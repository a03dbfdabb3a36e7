//! Interrupt-driven snapshot driver for the piecomm PCI FPGA board.
//!
//! The board exposes a fixed-size output region through BAR0 and raises an
//! interrupt whenever that region holds new data. The driver turns this
//! into a blocking `read`: each read waits for an interrupt generation that
//! has not been consumed yet, snapshots the whole region into driver memory
//! and copies the snapshot to the caller.
//!
//! # Layout
//!
//! - [`device`]: per-board state, the generation counters and the
//!   interrupt notifier.
//! - [`transfer`]: the blocking, cancellable transfer engine.
//! - [`accessor`]: ordered bulk reads of the mapped region.
//! - [`chardev`]: the `open`/`read` entry points of the device node.
//! - [`lifecycle`]: PCI probe and remove.
//! - [`config`]: board constants.

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

extern crate alloc;

pub mod accessor;
pub mod chardev;
pub mod config;
pub mod device;
pub mod lifecycle;
pub mod transfer;

#[cfg(test)]
mod testing;

use piecomm_core::kinfo;
use piecomm_driver_api::pci::{PciDeviceId, PciDeviceInfo, match_id};

pub use chardev::{FpgaFile, ReadError};
pub use config::FpgaConfig;
pub use device::{DeviceFlags, DeviceStats, FpgaDevice};
pub use lifecycle::{FpgaBinding, probe, remove};
pub use transfer::TransferError;

/// What the kernel's PCI core needs to route devices to this driver.
#[derive(Debug, Clone, Copy)]
pub struct FpgaDriver {
    /// Driver name.
    pub name: &'static str,
    /// Devices the driver binds to.
    pub id_table: &'static [PciDeviceId],
}

impl FpgaDriver {
    /// Returns `true` if this driver should be probed for `info`.
    #[must_use]
    pub fn matches(&self, info: &PciDeviceInfo) -> bool {
        match_id(self.id_table, info).is_some()
    }
}

/// Module entry: applies the log level and returns the driver descriptor.
pub fn init() -> FpgaDriver {
    piecomm_core::log::set_max_level(config::MAX_LOG_LEVEL);
    kinfo!("piecomm: loading {} driver", config::DRIVER_NAME);
    FpgaDriver {
        name: config::DRIVER_NAME,
        id_table: &config::ID_TABLE,
    }
}
