// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use super::{GrantorDescriptor, MappedRegion};
use crate::buffers::OwnedBuffer;
use crate::codec::{Decoder, Encoder, RegionHandle, WireType, get_u32, put_u32};
use crate::error::{Result, WireError};
use crate::handle::HandleResource;

/// Concurrency contract of the queue a descriptor describes.
///
/// The descriptor only records the contract; the ring-buffer algorithm that
/// honors it lives with whoever maps the region.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum QueueFlavor {
    /// One writer, one reader. Writes that would overflow and reads that
    /// would underflow are rejected.
    Synchronized = 0x01,
    /// One writer, any number of readers. Writes always succeed; readers
    /// detect that they were lapped.
    UnsynchronizedWrite = 0x02,
}

impl QueueFlavor {
    pub fn bits(self) -> u32 {
        self as u32
    }

    pub fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            0x01 => Some(QueueFlavor::Synchronized),
            0x02 => Some(QueueFlavor::UnsynchronizedWrite),
            _ => None,
        }
    }
}

/// Size of each ring-buffer position counter.
pub const POSITION_SIZE: u64 = std::mem::size_of::<u64>() as u64;

/// Where two processes find a ring buffer's read counter, write counter and
/// data inside shared memory.
///
/// ```text
/// grantor 0 (READ_PTR_POS)   [offset 0,  8 bytes]        read position
/// grantor 1 (WRITE_PTR_POS)  [offset 8,  8 bytes]        write position
/// grantor 2 (DATA_PTR_POS)   [offset 16, capacity bytes] element storage
/// ```
#[derive(Debug)]
pub struct QueueDescriptor {
    grantors: OwnedBuffer<'static, GrantorDescriptor>,
    handle: HandleResource,
    quantum: u32,
    flavor: QueueFlavor,
}

impl QueueDescriptor {
    pub const READ_PTR_POS: usize = 0;
    pub const WRITE_PTR_POS: usize = 1;
    pub const DATA_PTR_POS: usize = 2;
    pub const MIN_GRANTOR_COUNT: usize = 3;

    pub const OFFSET_OF_GRANTORS: usize = 0;
    pub const OFFSET_OF_HANDLE: usize = 24;
    const OFFSET_OF_QUANTUM: usize = 40;
    const OFFSET_OF_FLAGS: usize = 44;

    /// Describes an existing grantor layout.
    pub fn new(
        grantors: Vec<GrantorDescriptor>,
        handle: HandleResource,
        quantum: u32,
        flavor: QueueFlavor,
    ) -> Result<Self> {
        if grantors.len() < Self::MIN_GRANTOR_COUNT {
            return Err(WireError::InvalidDescriptor(format!(
                "{} grantors, at least {} required",
                grantors.len(),
                Self::MIN_GRANTOR_COUNT
            )));
        }
        for position in [Self::READ_PTR_POS, Self::WRITE_PTR_POS] {
            if grantors[position].extent != POSITION_SIZE {
                return Err(WireError::InvalidDescriptor(format!(
                    "position grantor {} spans {} bytes, expected {}",
                    position, grantors[position].extent, POSITION_SIZE
                )));
            }
        }
        Ok(Self {
            grantors: OwnedBuffer::try_from_vec(grantors)?,
            handle,
            quantum,
            flavor,
        })
    }

    /// Lays out read position, write position and `capacity` bytes of data
    /// back to back in fd 0 of `handle`.
    pub fn with_capacity(
        capacity: u64,
        quantum: u32,
        handle: HandleResource,
        flavor: QueueFlavor,
    ) -> Result<Self> {
        let data_offset = u32::try_from(2 * POSITION_SIZE).map_err(|_| {
            WireError::InvalidDescriptor("position counters overflow u32".to_string())
        })?;
        let grantors = vec![
            GrantorDescriptor::new(0, 0, POSITION_SIZE),
            GrantorDescriptor::new(0, POSITION_SIZE as u32, POSITION_SIZE),
            GrantorDescriptor::new(0, data_offset, capacity),
        ];
        Self::new(grantors, handle, quantum, flavor)
    }

    /// Allocates a memfd big enough for the default layout and describes it.
    #[cfg(target_os = "linux")]
    pub fn create(capacity: u64, quantum: u32, flavor: QueueFlavor) -> Result<Self> {
        let total = 2 * POSITION_SIZE + capacity;
        let memory = crate::memory::MemfdAllocator::new().allocate(total)?;
        tracing::debug!(
            "[QueueDescriptor] Created {:?} queue: {} bytes data, quantum {}",
            flavor, capacity, quantum
        );
        Self::with_capacity(capacity, quantum, memory.into_handle(), flavor)
    }

    /// Data region size in bytes.
    pub fn size(&self) -> u64 {
        self.grantors[Self::DATA_PTR_POS].extent
    }

    /// Size of one element in bytes.
    pub fn quantum(&self) -> u32 {
        self.quantum
    }

    pub fn flavor(&self) -> QueueFlavor {
        self.flavor
    }

    pub fn flags(&self) -> u32 {
        self.flavor.bits()
    }

    pub fn count_grantors(&self) -> usize {
        self.grantors.len()
    }

    pub fn grantors(&self) -> &[GrantorDescriptor] {
        self.grantors.as_slice()
    }

    pub fn handle(&self) -> &HandleResource {
        &self.handle
    }

    pub fn is_handle_valid(&self) -> bool {
        self.handle.num_fds() > 0
    }

    /// Copy for another attaching party; duplicates every fd.
    pub fn try_clone(&self) -> Result<Self> {
        Ok(Self {
            grantors: self.grantors.clone(),
            handle: self.handle.try_clone()?,
            quantum: self.quantum,
            flavor: self.flavor,
        })
    }

    /// Maps grantor `index` read/write and shared.
    pub fn map_region(&self, index: usize) -> Result<MappedRegion> {
        let grantor = self.grantors.get(index).ok_or_else(|| WireError::MapFailed {
            grantor: index,
            reason: format!("only {} grantors", self.grantors.len()),
        })?;
        let fd = self
            .handle
            .fd(grantor.fd_index as usize)
            .ok_or_else(|| WireError::MapFailed {
                grantor: index,
                reason: format!(
                    "fd index {} outside handle of {} fds",
                    grantor.fd_index,
                    self.handle.num_fds()
                ),
            })?;
        MappedRegion::map(fd, u64::from(grantor.offset), grantor.extent, index)
    }

    /// Unmaps a region returned by [`QueueDescriptor::map_region`].
    pub fn unmap_region(&self, region: MappedRegion) {
        drop(region);
    }
}

impl WireType for QueueDescriptor {
    const INLINE_SIZE: usize = 48;

    fn encode_inline(&self, out: &mut [u8]) {
        let grantors_end = Self::OFFSET_OF_GRANTORS + OwnedBuffer::<GrantorDescriptor>::INLINE_SIZE;
        self.grantors
            .encode_inline(&mut out[Self::OFFSET_OF_GRANTORS..grantors_end]);
        put_u32(out, Self::OFFSET_OF_QUANTUM, self.quantum);
        put_u32(out, Self::OFFSET_OF_FLAGS, self.flags());
    }

    fn encode_embedded<'a>(
        &'a self,
        enc: &mut Encoder<'a>,
        parent: RegionHandle,
        offset: usize,
    ) -> Result<()> {
        self.grantors
            .write_embedded(enc, parent, offset + Self::OFFSET_OF_GRANTORS)?;
        self.handle
            .write_embedded(enc, parent, offset + Self::OFFSET_OF_HANDLE)?;
        Ok(())
    }

    fn decode(dec: &mut Decoder<'_>, parent: RegionHandle, offset: usize) -> Result<Self> {
        let inline = dec.inline_bytes(parent, offset, Self::INLINE_SIZE)?;
        let quantum = get_u32(inline, Self::OFFSET_OF_QUANTUM);
        let flags = get_u32(inline, Self::OFFSET_OF_FLAGS);
        let flavor = QueueFlavor::from_bits(flags)
            .ok_or_else(|| WireError::corrupt(format!("unknown queue flavor {:#x}", flags)))?;

        let grantors: OwnedBuffer<'static, GrantorDescriptor> =
            dec.decode(parent, offset + Self::OFFSET_OF_GRANTORS)?;
        let handle: HandleResource = dec.decode(parent, offset + Self::OFFSET_OF_HANDLE)?;
        if handle.is_empty() {
            return Err(WireError::corrupt("queue descriptor without a handle"));
        }

        Self::new(Vec::from(grantors), handle, quantum, flavor).map_err(|e| match e {
            WireError::InvalidDescriptor(reason) => WireError::CorruptTransport(reason),
            other => other,
        })
    }
}
