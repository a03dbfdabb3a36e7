//! Compile-time driver configuration.
//!
//! The constants describe the production board. [`FpgaConfig`] bundles
//! them so probe can be exercised against differently sized regions.

use core::fmt;

use piecomm_core::log::LogLevel;
use piecomm_driver_api::pci::PciDeviceId;

/// PCI vendor ID of the board.
pub const VENDOR_ID: u16 = 0x10ec;

/// PCI device ID of the board.
pub const DEVICE_ID: u16 = 0x8168;

/// Name the driver registers its interrupt handler under.
pub const DRIVER_NAME: &str = "bbn_fpga";

/// Name of the character device node.
pub const NODE_NAME: &str = "piecomm1";

/// Bytes copied out of the mapped region per transfer.
pub const SNAPSHOT_SIZE: usize = 32 * 1024;

/// BAR holding the snapshot region.
pub const SNAPSHOT_BAR: usize = 0;

/// Fewest MSI/MSI-X vectors the driver accepts.
pub const MIN_IRQ_VECTORS: u8 = 1;

/// Most MSI/MSI-X vectors the driver asks for.
pub const MAX_IRQ_VECTORS: u8 = 6;

/// Most verbose level the driver enables at module init.
pub const MAX_LOG_LEVEL: LogLevel = LogLevel::Info;

/// Devices this driver binds to.
pub static ID_TABLE: [PciDeviceId; 1] = [PciDeviceId::new(VENDOR_ID, DEVICE_ID)];

/// Parameters of one attached board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FpgaConfig {
    /// Bytes per snapshot.
    pub snapshot_size: usize,
    /// BAR index holding the snapshot region.
    pub bar: usize,
    /// Minimum interrupt vectors to allocate.
    pub min_vectors: u8,
    /// Maximum interrupt vectors to allocate.
    pub max_vectors: u8,
    /// Character device node name.
    pub node_name: &'static str,
    /// Interrupt handler name.
    pub irq_name: &'static str,
}

impl FpgaConfig {
    /// The production board configuration.
    pub const DEFAULT: Self = Self {
        snapshot_size: SNAPSHOT_SIZE,
        bar: SNAPSHOT_BAR,
        min_vectors: MIN_IRQ_VECTORS,
        max_vectors: MAX_IRQ_VECTORS,
        node_name: NODE_NAME,
        irq_name: DRIVER_NAME,
    };

    /// Returns the production configuration.
    #[must_use]
    pub const fn new() -> Self {
        Self::DEFAULT
    }

    /// Returns a copy with a different snapshot size.
    #[must_use]
    pub const fn with_snapshot_size(mut self, snapshot_size: usize) -> Self {
        self.snapshot_size = snapshot_size;
        self
    }

    /// Returns a copy reading from a different BAR.
    #[must_use]
    pub const fn with_bar(mut self, bar: usize) -> Self {
        self.bar = bar;
        self
    }

    /// Checks the configuration against a BAR of `bar_size` bytes.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] describing the first violated constraint.
    pub fn validate(&self, bar_size: usize) -> Result<(), ConfigError> {
        if self.snapshot_size == 0 {
            return Err(ConfigError::EmptySnapshot);
        }
        if self.snapshot_size > bar_size {
            return Err(ConfigError::SnapshotExceedsBar {
                snapshot: self.snapshot_size,
                bar: bar_size,
            });
        }
        if self.min_vectors == 0 || self.min_vectors > self.max_vectors {
            return Err(ConfigError::VectorRange {
                min: self.min_vectors,
                max: self.max_vectors,
            });
        }
        Ok(())
    }
}

impl Default for FpgaConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// A rejected [`FpgaConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// The snapshot size is zero.
    EmptySnapshot,
    /// The snapshot does not fit in the BAR.
    SnapshotExceedsBar {
        /// Requested snapshot size.
        snapshot: usize,
        /// Actual BAR size.
        bar: usize,
    },
    /// The vector range is empty or inverted.
    VectorRange {
        /// Requested minimum.
        min: u8,
        /// Requested maximum.
        max: u8,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptySnapshot => f.write_str("snapshot size is zero"),
            Self::SnapshotExceedsBar { snapshot, bar } => {
                write!(f, "snapshot of {snapshot} bytes exceeds {bar}-byte BAR")
            }
            Self::VectorRange { min, max } => write!(f, "bad irq vector range {min}..={max}"),
        }
    }
}
