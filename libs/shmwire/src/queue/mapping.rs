// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::ffi::c_void;
use std::os::fd::{AsRawFd, BorrowedFd};
use std::ptr::NonNull;

use tracing::{trace, warn};

use crate::error::{Result, WireError};

/// OS page size, falling back to 4 KiB if `sysconf` cannot say.
pub fn page_size() -> usize {
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 { size as usize } else { 4096 }
}

/// A read/write shared mapping of one grantor.
///
/// The OS mapping starts on the page boundary at or below the grantor's
/// offset; [`MappedRegion::as_ptr`] points at the grantor's first byte. The
/// mapping is removed when the region drops.
#[derive(Debug)]
pub struct MappedRegion {
    base: NonNull<u8>,
    mapped_len: usize,
    file_offset: u64,
    page_offset: usize,
    extent: usize,
    grantor: usize,
}

// SAFETY: the mapping is plain shared memory; it carries no thread affinity.
unsafe impl Send for MappedRegion {}
unsafe impl Sync for MappedRegion {}

impl MappedRegion {
    pub(crate) fn map(
        fd: BorrowedFd<'_>,
        offset: u64,
        extent: u64,
        grantor: usize,
    ) -> Result<Self> {
        let map_failed = |reason: String| WireError::MapFailed { grantor, reason };

        let page = page_size() as u64;
        let file_offset = offset & !(page - 1);
        let page_offset = (offset - file_offset) as usize;
        let extent = usize::try_from(extent)
            .map_err(|_| map_failed(format!("extent {} overflows usize", extent)))?;
        let mapped_len = page_offset
            .checked_add(extent)
            .ok_or_else(|| map_failed("mapping length overflows usize".to_string()))?;
        let file_offset_arg = libc::off_t::try_from(file_offset)
            .map_err(|_| map_failed(format!("offset {} overflows off_t", file_offset)))?;

        let address = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                mapped_len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd.as_raw_fd(),
                file_offset_arg,
            )
        };
        if address == libc::MAP_FAILED {
            let err = std::io::Error::last_os_error();
            warn!(
                "[MappedRegion] mmap of grantor {} ({} bytes at {}) failed: {}",
                grantor, mapped_len, file_offset, err
            );
            return Err(map_failed(err.to_string()));
        }
        let base = NonNull::new(address.cast::<u8>())
            .ok_or_else(|| map_failed("mmap returned null".to_string()))?;

        trace!(
            "[MappedRegion] Mapped grantor {} at {:p} ({} bytes, page offset {})",
            grantor, base, mapped_len, page_offset
        );
        Ok(Self {
            base,
            mapped_len,
            file_offset,
            page_offset,
            extent,
            grantor,
        })
    }

    /// First byte of the grantor.
    pub fn as_ptr(&self) -> *const u8 {
        self.as_mut_ptr()
    }

    pub fn as_mut_ptr(&self) -> *mut u8 {
        // SAFETY: page_offset < page size <= mapped_len.
        unsafe { self.base.as_ptr().add(self.page_offset) }
    }

    /// Grantor size in bytes.
    pub fn len(&self) -> usize {
        self.extent
    }

    pub fn is_empty(&self) -> bool {
        self.extent == 0
    }

    /// Page-aligned file offset the OS mapping starts at.
    pub fn mapping_file_offset(&self) -> u64 {
        self.file_offset
    }

    /// Distance from the OS mapping start to the grantor's first byte.
    pub fn page_offset(&self) -> usize {
        self.page_offset
    }

    /// Length of the OS mapping, page offset included.
    pub fn mapped_len(&self) -> usize {
        self.mapped_len
    }

    /// Copies `bytes` into the grantor at `offset`.
    pub fn write_at(&self, offset: usize, bytes: &[u8]) -> Result<()> {
        self.check_range(offset, bytes.len())?;
        // SAFETY: range checked against the live mapping.
        unsafe {
            std::ptr::copy_nonoverlapping(
                bytes.as_ptr(),
                self.as_mut_ptr().add(offset),
                bytes.len(),
            );
        }
        Ok(())
    }

    /// Copies `out.len()` bytes from the grantor at `offset`.
    pub fn read_at(&self, offset: usize, out: &mut [u8]) -> Result<()> {
        self.check_range(offset, out.len())?;
        // SAFETY: range checked against the live mapping.
        unsafe {
            std::ptr::copy_nonoverlapping(self.as_ptr().add(offset), out.as_mut_ptr(), out.len());
        }
        Ok(())
    }

    fn check_range(&self, offset: usize, len: usize) -> Result<()> {
        match offset.checked_add(len) {
            Some(end) if end <= self.extent => Ok(()),
            _ => Err(WireError::MapFailed {
                grantor: self.grantor,
                reason: format!(
                    "access {}..{} outside mapped extent {}",
                    offset,
                    offset.saturating_add(len),
                    self.extent
                ),
            }),
        }
    }
}

impl Drop for MappedRegion {
    fn drop(&mut self) {
        let rc = unsafe { libc::munmap(self.base.as_ptr().cast::<c_void>(), self.mapped_len) };
        if rc != 0 {
            warn!(
                "[MappedRegion] munmap at {:p} failed: {}",
                self.base,
                std::io::Error::last_os_error()
            );
        } else {
            trace!("[MappedRegion] Unmapped {:p}", self.base);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_size_is_power_of_two() {
        assert!(page_size().is_power_of_two());
    }
}
