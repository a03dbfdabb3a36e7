//! Character device entry points.
//!
//! Every open handle shares the one [`FpgaDevice`] of its board, so all
//! readers consume from a single generation stream.

use alloc::sync::Arc;
use core::fmt;

use piecomm_core::sync::CancelToken;
use piecomm_driver_api::user::{UserBuffer, UserSlice};

use crate::accessor::{MmioSnapshot, SnapshotSource};
use crate::device::FpgaDevice;
use crate::transfer::TransferError;

/// Interrupted system call; restart after the signal is handled.
pub const ERESTARTSYS: isize = 512;
/// I/O error.
pub const EIO: isize = 5;
/// Bad address.
pub const EFAULT: isize = 14;
/// No such device.
pub const ENODEV: isize = 19;

/// Failure of a `read` on the device node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadError {
    /// The caller was signalled; the read may be restarted.
    Interrupted,
    /// The board could not be read.
    Io,
    /// The board is gone.
    NoDevice,
    /// Nothing could be written to the caller's buffer.
    Fault,
}

impl ReadError {
    /// Returns the negative errno reported to user space.
    #[must_use]
    pub const fn errno(self) -> isize {
        match self {
            Self::Interrupted => -ERESTARTSYS,
            Self::Io => -EIO,
            Self::NoDevice => -ENODEV,
            Self::Fault => -EFAULT,
        }
    }
}

impl fmt::Display for ReadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interrupted => f.write_str("read interrupted"),
            Self::Io => f.write_str("device I/O error"),
            Self::NoDevice => f.write_str("no such device"),
            Self::Fault => f.write_str("bad user buffer"),
        }
    }
}

impl From<TransferError> for ReadError {
    fn from(err: TransferError) -> Self {
        match err {
            TransferError::Interrupted => Self::Interrupted,
            TransferError::Hardware(_) => Self::Io,
            TransferError::Detached => Self::NoDevice,
            TransferError::Partial { delivered: 0, .. } => Self::Fault,
            TransferError::Partial { .. } => Self::Io,
        }
    }
}

/// An open handle on the device node.
pub struct FpgaFile<S = MmioSnapshot> {
    device: Arc<FpgaDevice<S>>,
}

/// Opens a handle on `device`.
///
/// # Errors
///
/// Returns [`ReadError::NoDevice`] if the device has been detached.
pub fn open<S>(device: &Arc<FpgaDevice<S>>) -> Result<FpgaFile<S>, ReadError> {
    if device.is_detached() {
        return Err(ReadError::NoDevice);
    }
    Ok(FpgaFile {
        device: Arc::clone(device),
    })
}

impl<S: SnapshotSource> FpgaFile<S> {
    /// Returns the device this handle reads from.
    pub fn device(&self) -> &Arc<FpgaDevice<S>> {
        &self.device
    }

    /// Blocks for the next generation and copies one snapshot into `buf`.
    ///
    /// A short copy is reported as a short count; callers must compare the
    /// result against the snapshot size.
    ///
    /// # Errors
    ///
    /// See [`ReadError`].
    pub async fn read<B>(&self, buf: &mut B, cancel: &CancelToken) -> Result<usize, ReadError>
    where
        B: UserBuffer + ?Sized,
    {
        match self.device.transfer(buf, cancel).await {
            Ok(delivered) => Ok(delivered),
            Err(TransferError::Partial { delivered, .. }) if delivered > 0 => Ok(delivered),
            Err(err) => Err(err.into()),
        }
    }

    /// Validates a raw user range and reads into it.
    ///
    /// # Errors
    ///
    /// Returns [`ReadError::Fault`] if the range is not in user space, and
    /// otherwise as [`read`](Self::read).
    ///
    /// # Safety
    ///
    /// `addr..addr + len` must be mapped, writable memory of the calling
    /// process for the duration of the call.
    pub async unsafe fn read_user(
        &self,
        addr: usize,
        len: usize,
        cancel: &CancelToken,
    ) -> Result<usize, ReadError> {
        let slice = UserSlice::new(addr, len).map_err(|_| ReadError::Fault)?;
        // SAFETY: forwarded from this function's contract.
        let mut writer = unsafe { slice.writer() };
        self.read(&mut writer, cancel).await
    }
}
