//! Attach and detach.
//!
//! Attach order: map the BAR, create the device state, install the
//! interrupt handler, then expose the device node. No reader can block on
//! the device before its interrupt source is wired up. A failure at any
//! step unwinds the completed ones in reverse.
//!
//! Detach frees the interrupt first, then wakes and fails every blocked
//! reader, removes the node and waits for an in-flight snapshot to finish
//! before the BAR is unmapped.

use alloc::sync::Arc;

use piecomm_core::{kinfo, kwarn};
use piecomm_driver_api::DriverError;
use piecomm_driver_api::irq::InterruptHandler;
use piecomm_driver_api::pci::match_id;
use piecomm_driver_api::probe::{ChrdevNumber, PciProbeContext};
use piecomm_driver_api::resource::{IrqLine, IrqVectors, MmioRegion};

use crate::accessor::MmioSnapshot;
use crate::chardev::{self, FpgaFile, ReadError};
use crate::config::{FpgaConfig, ID_TABLE};
use crate::device::{DeviceFlags, FpgaDevice};

/// Resources held by one attached board.
pub struct FpgaBinding {
    device: Arc<FpgaDevice>,
    region: MmioRegion,
    vectors: IrqVectors,
    irq: IrqLine,
    node: ChrdevNumber,
}

impl FpgaBinding {
    /// Returns the shared device state.
    #[must_use]
    pub fn device(&self) -> &Arc<FpgaDevice> {
        &self.device
    }

    /// Returns the interrupt line the handler is installed on.
    #[must_use]
    pub fn irq(&self) -> IrqLine {
        self.irq
    }

    /// Returns the device node number.
    #[must_use]
    pub fn node(&self) -> ChrdevNumber {
        self.node
    }

    /// Opens a handle on the device node.
    ///
    /// # Errors
    ///
    /// Returns [`ReadError::NoDevice`] once the device is detached.
    pub fn open(&self) -> Result<FpgaFile, ReadError> {
        chardev::open(&self.device)
    }
}

/// Steps of [`probe`] that completed and must be undone on failure.
#[derive(Default)]
struct Progress {
    enabled: bool,
    region: Option<MmioRegion>,
    vectors: Option<IrqVectors>,
    irq: Option<IrqLine>,
}

impl Progress {
    fn unwind<C: PciProbeContext + ?Sized>(self, ctx: &mut C) {
        if let Some(irq) = self.irq {
            ctx.free_irq(irq);
        }
        if let Some(vectors) = self.vectors {
            ctx.free_irq_vectors(vectors);
        }
        if let Some(region) = self.region {
            ctx.unmap_bar(region);
        }
        if self.enabled {
            ctx.disable_device();
        }
    }
}

/// Binds the driver to the device behind `ctx`.
///
/// # Errors
///
/// Returns [`DriverError::DeviceNotFound`] for a device not in the id table
/// and otherwise the error of the failed step. Every step completed before
/// the failure has been undone on return.
pub fn probe<C>(ctx: &mut C, config: &FpgaConfig) -> Result<FpgaBinding, DriverError>
where
    C: PciProbeContext + ?Sized,
{
    let mut progress = Progress::default();
    match attach(ctx, config, &mut progress) {
        Ok(binding) => Ok(binding),
        Err(err) => {
            kwarn!("piecomm: probe failed: {}", err);
            progress.unwind(ctx);
            Err(err)
        }
    }
}

fn attach<C>(
    ctx: &mut C,
    config: &FpgaConfig,
    progress: &mut Progress,
) -> Result<FpgaBinding, DriverError>
where
    C: PciProbeContext + ?Sized,
{
    let info = *ctx.device();
    if match_id(&ID_TABLE, &info).is_none() {
        return Err(DriverError::DeviceNotFound);
    }
    kinfo!(
        "piecomm: probing {:04x}:{:04x} at {}",
        info.vendor_id,
        info.device_id,
        info.address
    );

    let Some((bar_base, bar_size)) = info.bar(config.bar).memory() else {
        kwarn!("piecomm: BAR{} is not a memory BAR", config.bar);
        return Err(DriverError::Unsupported);
    };
    kinfo!(
        "piecomm: BAR{} is {} bytes at {:#x}",
        config.bar,
        bar_size,
        bar_base
    );
    let bar_size = usize::try_from(bar_size).map_err(|_| DriverError::Unsupported)?;
    if let Err(err) = config.validate(bar_size) {
        kwarn!("piecomm: {}", err);
        return Err(DriverError::InitFailed);
    }

    ctx.enable_device()?;
    progress.enabled = true;

    let region = ctx.map_bar(config.bar)?;
    progress.region = Some(region);

    let device = Arc::new(FpgaDevice::new(MmioSnapshot::new(
        region,
        config.snapshot_size,
    )?)?);

    let vectors = ctx.alloc_irq_vectors(config.min_vectors, config.max_vectors)?;
    progress.vectors = Some(vectors);
    kinfo!("piecomm: {} irq vector(s) allocated", vectors.count());

    let irq = vectors.line(0).ok_or(DriverError::InitFailed)?;
    let handler: Arc<dyn InterruptHandler> = device.clone();
    ctx.request_irq(irq, config.irq_name, handler)?;
    progress.irq = Some(irq);
    device.set_flags(DeviceFlags::IRQ_BOUND);

    let node = ctx.register_chrdev(config.node_name)?;
    device.set_flags(DeviceFlags::NODE_REGISTERED);
    kinfo!(
        "piecomm: /dev/{} ({}) ready, irq vector {}",
        config.node_name,
        node,
        irq.vector()
    );

    Ok(FpgaBinding {
        device,
        region,
        vectors,
        irq,
        node,
    })
}

/// Unbinds the driver and releases every resource of `binding`.
///
/// Completes once no snapshot of the region is in progress.
pub async fn remove<C>(binding: FpgaBinding, ctx: &mut C)
where
    C: PciProbeContext + ?Sized,
{
    let FpgaBinding {
        device,
        region,
        vectors,
        irq,
        node,
    } = binding;
    kinfo!("piecomm: removing /dev node {}", node);

    ctx.free_irq(irq);
    ctx.free_irq_vectors(vectors);
    device.clear_flags(DeviceFlags::IRQ_BOUND);

    device.detach();
    ctx.unregister_chrdev(node);
    device.clear_flags(DeviceFlags::NODE_REGISTERED);

    // A reader that took the lock before `detach` may still be copying
    // out of the region.
    drop(device.access.lock().await);

    ctx.unmap_bar(region);
    ctx.disable_device();
    kinfo!("piecomm: remove done");
}
