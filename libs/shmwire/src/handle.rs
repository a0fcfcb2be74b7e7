// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Transferable OS resource handle: a list of file descriptors plus opaque
//! integers.

use std::fmt;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd, RawFd};

use crate::codec::{ChildHandle, Decoder, Encoder, RegionHandle, WireType};
use crate::error::{Result, WireError};

enum Descriptors {
    Owned(Vec<OwnedFd>),
    /// Kept open by whoever constructed the handle.
    Borrowed(Vec<RawFd>),
}

/// File descriptors plus integers that travel together across a process
/// boundary.
///
/// Owned descriptors are closed exactly once, when the handle drops.
/// Copies are explicit ([`HandleResource::try_clone`]) because duplicating
/// a descriptor can fail.
pub struct HandleResource {
    fds: Descriptors,
    ints: Vec<i32>,
}

impl HandleResource {
    pub const OFFSET_OF_HANDLE: usize = 0;

    pub fn new(fds: Vec<OwnedFd>, ints: Vec<i32>) -> Self {
        Self {
            fds: Descriptors::Owned(fds),
            ints,
        }
    }

    pub fn from_fd(fd: OwnedFd) -> Self {
        Self::new(vec![fd], Vec::new())
    }

    /// A handle with no fds and no ints; encoded as a null record.
    pub fn empty() -> Self {
        Self::new(Vec::new(), Vec::new())
    }

    /// Wraps descriptors without taking ownership. They are never closed by
    /// this handle.
    ///
    /// # Safety
    ///
    /// Every fd in `fds` must be open and stay open for the lifetime of the
    /// returned handle.
    pub unsafe fn borrow_raw(fds: Vec<RawFd>, ints: Vec<i32>) -> Self {
        Self {
            fds: Descriptors::Borrowed(fds),
            ints,
        }
    }

    pub fn num_fds(&self) -> usize {
        match &self.fds {
            Descriptors::Owned(fds) => fds.len(),
            Descriptors::Borrowed(fds) => fds.len(),
        }
    }

    pub fn num_ints(&self) -> usize {
        self.ints.len()
    }

    pub fn ints(&self) -> &[i32] {
        &self.ints
    }

    pub fn is_empty(&self) -> bool {
        self.num_fds() == 0 && self.ints.is_empty()
    }

    pub fn owns_fds(&self) -> bool {
        matches!(self.fds, Descriptors::Owned(_))
    }

    pub fn fd(&self, index: usize) -> Option<BorrowedFd<'_>> {
        match &self.fds {
            Descriptors::Owned(fds) => fds.get(index).map(|fd| fd.as_fd()),
            // SAFETY: `borrow_raw` callers keep these open while `self` lives.
            Descriptors::Borrowed(fds) => fds
                .get(index)
                .map(|raw| unsafe { BorrowedFd::borrow_raw(*raw) }),
        }
    }

    pub fn fds(&self) -> Vec<BorrowedFd<'_>> {
        (0..self.num_fds()).filter_map(|i| self.fd(i)).collect()
    }

    /// Duplicates every descriptor into a new owning handle. If any
    /// duplication fails, the ones already made are closed and the whole
    /// copy fails.
    pub fn try_clone(&self) -> Result<Self> {
        let fds = self
            .fds()
            .into_iter()
            .map(|fd| fd.try_clone_to_owned())
            .collect::<std::io::Result<Vec<_>>>()
            .map_err(|e| {
                tracing::warn!("[HandleResource] Failed to duplicate fd: {}", e);
                WireError::HandleDuplicationFailed(e)
            })?;
        Ok(Self::new(fds, self.ints.clone()))
    }

    /// Writes this handle as the child of the slot at
    /// `parent_offset + OFFSET_OF_HANDLE`.
    pub fn write_embedded<'a>(
        &'a self,
        enc: &mut Encoder<'a>,
        parent: RegionHandle,
        parent_offset: usize,
    ) -> Result<ChildHandle> {
        enc.write_embedded_handle(self, parent, parent_offset + Self::OFFSET_OF_HANDLE)
    }
}

impl Default for HandleResource {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for HandleResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let raw: Vec<RawFd> = match &self.fds {
            Descriptors::Owned(fds) => fds.iter().map(|fd| fd.as_raw_fd()).collect(),
            Descriptors::Borrowed(fds) => fds.clone(),
        };
        f.debug_struct("HandleResource")
            .field("fds", &raw)
            .field("ints", &self.ints)
            .field("owned", &self.owns_fds())
            .finish()
    }
}

impl WireType for HandleResource {
    const INLINE_SIZE: usize = 16;

    fn encode_inline(&self, _out: &mut [u8]) {}

    fn encode_embedded<'a>(
        &'a self,
        enc: &mut Encoder<'a>,
        parent: RegionHandle,
        offset: usize,
    ) -> Result<()> {
        self.write_embedded(enc, parent, offset).map(|_| ())
    }

    fn decode(dec: &mut Decoder<'_>, parent: RegionHandle, offset: usize) -> Result<Self> {
        dec.read_embedded_handle(parent, offset + Self::OFFSET_OF_HANDLE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::fd::FromRawFd;

    /// Non-blocking pipe: (read end, write end).
    fn pipe() -> (OwnedFd, OwnedFd) {
        let mut fds = [0; 2];
        let rc = unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_NONBLOCK | libc::O_CLOEXEC) };
        assert_eq!(rc, 0, "pipe2 failed: {}", std::io::Error::last_os_error());
        unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) }
    }

    /// True once every write end of the pipe has been closed.
    fn writers_closed(read_end: &OwnedFd) -> bool {
        let mut byte = 0u8;
        let n = unsafe { libc::read(read_end.as_raw_fd(), (&mut byte as *mut u8).cast(), 1) };
        n == 0
    }

    #[test]
    fn test_copy_keeps_resource_alive_until_last_close() {
        let (read_end, write_end) = pipe();
        let handle = HandleResource::new(vec![write_end], vec![42]);
        let copy = handle.try_clone().unwrap();

        assert_eq!(copy.ints(), &[42]);
        assert_ne!(
            copy.fd(0).unwrap().as_raw_fd(),
            handle.fd(0).unwrap().as_raw_fd()
        );

        drop(handle);
        assert!(!writers_closed(&read_end));
        drop(copy);
        assert!(writers_closed(&read_end));
    }

    #[test]
    fn test_borrowed_handle_never_closes() {
        let (read_end, write_end) = pipe();
        let borrowed = unsafe { HandleResource::borrow_raw(vec![write_end.as_raw_fd()], vec![]) };
        assert!(!borrowed.owns_fds());

        drop(borrowed);
        assert!(!writers_closed(&read_end));
        drop(write_end);
        assert!(writers_closed(&read_end));
    }

    #[test]
    fn test_copy_of_borrowed_is_owned() {
        let (_read_end, write_end) = pipe();
        let borrowed = unsafe { HandleResource::borrow_raw(vec![write_end.as_raw_fd()], vec![7]) };
        let copy = borrowed.try_clone().unwrap();

        assert!(copy.owns_fds());
        assert_eq!(copy.num_fds(), 1);
        assert_eq!(copy.ints(), &[7]);
    }

    #[test]
    fn test_failed_duplication_fails_whole_copy() {
        let (_read_end, write_end) = pipe();
        // 1 << 20 is above any default RLIMIT_NOFILE, so it is never open.
        let bogus =
            unsafe { HandleResource::borrow_raw(vec![write_end.as_raw_fd(), 1 << 20], vec![]) };

        assert!(matches!(
            bogus.try_clone(),
            Err(WireError::HandleDuplicationFailed(_))
        ));
    }

    #[test]
    fn test_empty_handle() {
        let handle = HandleResource::default();
        assert!(handle.is_empty());
        assert_eq!(handle.num_fds(), 0);
        assert!(handle.fd(0).is_none());
    }
}
