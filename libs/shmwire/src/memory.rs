// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Named shared-memory blocks and the allocator that produces them.

use crate::buffers::WireString;
use crate::codec::{Decoder, Encoder, RegionHandle, WireType, get_u64, put_u64};
use crate::error::{Result, WireError};
use crate::handle::HandleResource;
use crate::queue::MappedRegion;

/// A block of shared memory: the handle that backs it, its size, and the
/// allocator name that produced it.
#[derive(Debug)]
pub struct SharedMemory {
    name: WireString<'static>,
    handle: HandleResource,
    size: u64,
}

impl SharedMemory {
    const OFFSET_OF_HANDLE: usize = 0;
    const OFFSET_OF_SIZE: usize = 16;
    const OFFSET_OF_NAME: usize = 24;

    pub fn new(name: &str, handle: HandleResource, size: u64) -> Result<Self> {
        Ok(Self {
            name: WireString::try_from(name)?,
            handle,
            size,
        })
    }

    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn handle(&self) -> &HandleResource {
        &self.handle
    }

    pub fn into_handle(self) -> HandleResource {
        self.handle
    }

    pub fn is_valid(&self) -> bool {
        self.handle.num_fds() > 0
    }

    pub fn try_clone(&self) -> Result<Self> {
        Ok(Self {
            name: self.name.clone(),
            handle: self.handle.try_clone()?,
            size: self.size,
        })
    }

    /// Maps the whole block read/write through fd 0.
    pub fn map(&self) -> Result<MappedRegion> {
        let fd = self.handle.fd(0).ok_or_else(|| WireError::MapFailed {
            grantor: 0,
            reason: format!("shared memory '{}' has no fd", self.name),
        })?;
        MappedRegion::map(fd, 0, self.size, 0)
    }
}

impl WireType for SharedMemory {
    const INLINE_SIZE: usize = 48;

    fn encode_inline(&self, out: &mut [u8]) {
        put_u64(out, Self::OFFSET_OF_SIZE, self.size);
        let name_end = Self::OFFSET_OF_NAME + WireString::INLINE_SIZE;
        self.name.encode_inline(&mut out[Self::OFFSET_OF_NAME..name_end]);
    }

    fn encode_embedded<'a>(
        &'a self,
        enc: &mut Encoder<'a>,
        parent: RegionHandle,
        offset: usize,
    ) -> Result<()> {
        self.handle
            .write_embedded(enc, parent, offset + Self::OFFSET_OF_HANDLE)?;
        self.name
            .write_embedded(enc, parent, offset + Self::OFFSET_OF_NAME)?;
        Ok(())
    }

    fn decode(dec: &mut Decoder<'_>, parent: RegionHandle, offset: usize) -> Result<Self> {
        let inline = dec.inline_bytes(parent, offset, Self::INLINE_SIZE)?;
        let size = get_u64(inline, Self::OFFSET_OF_SIZE);
        let handle = dec.decode(parent, offset + Self::OFFSET_OF_HANDLE)?;
        let name: WireString<'static> = dec.decode(parent, offset + Self::OFFSET_OF_NAME)?;
        Ok(Self { name, handle, size })
    }
}

/// Allocates anonymous shared memory with `memfd_create`.
#[cfg(target_os = "linux")]
#[derive(Debug, Default, Clone, Copy)]
pub struct MemfdAllocator;

#[cfg(target_os = "linux")]
impl MemfdAllocator {
    pub const NAME: &'static str = "memfd";

    pub fn new() -> Self {
        Self
    }

    /// A close-on-exec memfd of exactly `size` bytes, with its size sealed.
    pub fn allocate(&self, size: u64) -> Result<SharedMemory> {
        use std::os::fd::{FromRawFd, OwnedFd};

        let length = libc::off_t::try_from(size).map_err(|_| {
            WireError::Configuration(format!("shared memory size {} overflows off_t", size))
        })?;

        let raw = unsafe {
            libc::memfd_create(
                c"shmwire".as_ptr(),
                libc::MFD_CLOEXEC | libc::MFD_ALLOW_SEALING,
            )
        };
        if raw < 0 {
            return Err(WireError::Io(std::io::Error::last_os_error()));
        }
        // SAFETY: memfd_create returned a fresh descriptor nobody else owns.
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };

        if unsafe { libc::ftruncate(raw, length) } != 0 {
            return Err(WireError::Io(std::io::Error::last_os_error()));
        }
        let seals = libc::F_SEAL_SHRINK | libc::F_SEAL_GROW | libc::F_SEAL_SEAL;
        if unsafe { libc::fcntl(raw, libc::F_ADD_SEALS, seals) } != 0 {
            return Err(WireError::Io(std::io::Error::last_os_error()));
        }

        tracing::debug!("[MemfdAllocator] Allocated {} bytes on fd {}", size, raw);
        SharedMemory::new(Self::NAME, HandleResource::from_fd(fd), size)
    }
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_and_map() {
        let memory = MemfdAllocator::new().allocate(4096).unwrap();
        assert_eq!(memory.name(), "memfd");
        assert_eq!(memory.size(), 4096);
        assert!(memory.is_valid());

        let region = memory.map().unwrap();
        region.write_at(100, b"hello").unwrap();

        let copy = memory.try_clone().unwrap();
        let other = copy.map().unwrap();
        let mut out = [0u8; 5];
        other.read_at(100, &mut out).unwrap();
        assert_eq!(&out, b"hello");
    }

    #[test]
    fn test_size_is_sealed() {
        use std::os::fd::AsRawFd;

        let memory = MemfdAllocator::new().allocate(4096).unwrap();
        let raw = memory.handle().fd(0).unwrap().as_raw_fd();
        assert_ne!(unsafe { libc::ftruncate(raw, 0) }, 0);
        assert_ne!(unsafe { libc::ftruncate(raw, 8192) }, 0);
    }

    #[test]
    fn test_map_without_fd_fails() {
        let memory = SharedMemory::new("none", HandleResource::empty(), 64).unwrap();
        assert!(!memory.is_valid());
        assert!(matches!(memory.map(), Err(WireError::MapFailed { .. })));
    }
}
