//! Driver-model interface between the piecomm FPGA driver and its host kernel.
//!
//! The kernel side owns device discovery, BAR mapping, interrupt vector
//! allocation and character-device registration. It hands a driver a
//! [`PciProbeContext`](probe::PciProbeContext) through which all of those
//! services are requested, and the driver answers with resource claims
//! ([`MmioRegion`](resource::MmioRegion), [`IrqLine`](resource::IrqLine))
//! plus an [`InterruptHandler`](irq::InterruptHandler).
//!
//! Memory crossing into user space goes through the
//! [`UserBuffer`](user::UserBuffer) trait so the driver never dereferences
//! a caller-supplied address directly.

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

extern crate alloc;

pub mod error;
pub mod irq;
pub mod pci;
pub mod probe;
pub mod resource;
pub mod user;

pub use error::DriverError;
