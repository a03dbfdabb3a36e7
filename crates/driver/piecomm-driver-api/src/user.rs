//! The kernel/user memory boundary.
//!
//! A read entry point receives a raw `(addr, len)` pair from user space.
//! [`UserSlice`] validates that the range lies in the user half of the
//! address space; it does not prove the pages are mapped. Data is handed
//! across the boundary only through [`UserBuffer::copy_to_user`], which
//! reports how many bytes could *not* be written, mirroring a faulting
//! user copy.

use core::fmt;

/// Upper bound of canonical user-space addresses on x86_64.
const USER_ADDR_MAX: usize = 0x0000_8000_0000_0000;

/// A user address range failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserFault {
    /// Start of the rejected range.
    pub addr: usize,
}

impl fmt::Display for UserFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bad user address {:#x}", self.addr)
    }
}

/// A validated user-space byte range (pointer + length).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserSlice {
    addr: usize,
    len: usize,
}

impl UserSlice {
    /// Validates a user buffer described by a raw address and length.
    ///
    /// # Errors
    ///
    /// Returns [`UserFault`] if any byte of the range lies outside user
    /// address space or the range overflows.
    pub fn new(addr: usize, len: usize) -> Result<Self, UserFault> {
        if len == 0 {
            return Ok(Self { addr: 0, len: 0 });
        }
        let end = addr.checked_add(len).ok_or(UserFault { addr })?;
        if end > USER_ADDR_MAX {
            return Err(UserFault { addr });
        }
        Ok(Self { addr, len })
    }

    /// Returns the start address.
    #[must_use]
    pub const fn addr(&self) -> usize {
        self.addr
    }

    /// Returns the length in bytes.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the range is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Turns the validated range into a writable [`UserBuffer`].
    ///
    /// # Safety
    ///
    /// The caller must ensure the range is mapped, writable and not aliased
    /// by kernel memory for the lifetime of the returned writer.
    #[must_use]
    pub const unsafe fn writer(self) -> UserWriter {
        UserWriter { slice: self }
    }
}

/// Destination of a copy across the kernel/user boundary.
pub trait UserBuffer {
    /// Returns how many bytes the destination can take.
    fn capacity(&self) -> usize;

    /// Copies as much of `src` as fits to the start of the destination.
    ///
    /// Returns the number of bytes of `src` that were **not** copied; zero
    /// means full delivery.
    fn copy_to_user(&mut self, src: &[u8]) -> usize;
}

impl UserBuffer for [u8] {
    fn capacity(&self) -> usize {
        self.len()
    }

    fn copy_to_user(&mut self, src: &[u8]) -> usize {
        let n = src.len().min(self.len());
        self[..n].copy_from_slice(&src[..n]);
        src.len() - n
    }
}

/// A [`UserSlice`] the caller has vouched is mapped and writable.
#[derive(Debug)]
pub struct UserWriter {
    slice: UserSlice,
}

impl UserBuffer for UserWriter {
    fn capacity(&self) -> usize {
        self.slice.len
    }

    fn copy_to_user(&mut self, src: &[u8]) -> usize {
        let n = src.len().min(self.slice.len);
        if n > 0 {
            // SAFETY: `UserSlice::writer` requires the range to be mapped,
            // writable and disjoint from kernel memory; `n` is within it.
            unsafe {
                core::ptr::copy_nonoverlapping(src.as_ptr(), self.slice.addr as *mut u8, n);
            }
        }
        src.len() - n
    }
}
