//! Interrupt handler contract.
//!
//! The kernel's interrupt dispatch invokes [`InterruptHandler::handle_irq`]
//! in interrupt context. Implementations must not sleep, allocate or take a
//! lock that process context may hold for an unbounded time.

/// Result of an interrupt handler invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqReturn {
    /// The interrupt was not raised by this device (shared lines).
    None,
    /// The interrupt was recognized and serviced.
    Handled,
}

/// A device-side interrupt handler.
pub trait InterruptHandler: Send + Sync {
    /// Services one interrupt.
    fn handle_irq(&self) -> IrqReturn;
}
