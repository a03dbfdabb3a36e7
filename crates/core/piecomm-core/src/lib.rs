//! Core synchronization and logging primitives for the piecomm driver stack.
//!
//! This crate contains the host-testable building blocks the FPGA driver is
//! assembled from: interrupt-safe spin locks, a keyed waker queue, an async
//! mutex whose acquisition can be interrupted, a monotonically increasing
//! generation counter, a cancellation token, and the kernel log macros.
//!
//! Nothing here touches hardware directly, so everything can be exercised
//! with `cargo test`, loom and shuttle on the host.

#![cfg_attr(not(any(test, feature = "test-util")), no_std)]
#![warn(missing_docs)]

extern crate alloc;

pub mod log;
pub mod sync;
