// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use crate::codec::{Decoder, RegionHandle, WireType, get_u32, get_u64, put_u32, put_u64};
use crate::error::Result;

/// One contiguous slice of a shared region: which fd it lives in, where it
/// starts, and how many bytes it spans.
///
/// ```text
/// +-------+----------+--------+---------+--------+
/// | flags | fd_index | offset | padding | extent |
/// |  u32  |   u32    |  u32   |   u32   |  u64   |
/// +-------+----------+--------+---------+--------+
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct GrantorDescriptor {
    pub flags: u32,
    pub fd_index: u32,
    pub offset: u32,
    pub extent: u64,
}

impl GrantorDescriptor {
    pub const fn new(fd_index: u32, offset: u32, extent: u64) -> Self {
        Self {
            flags: 0,
            fd_index,
            offset,
            extent,
        }
    }

    /// First byte past the grantor within its fd.
    pub fn end(&self) -> u64 {
        u64::from(self.offset) + self.extent
    }
}

impl WireType for GrantorDescriptor {
    const INLINE_SIZE: usize = 24;

    fn encode_inline(&self, out: &mut [u8]) {
        put_u32(out, 0, self.flags);
        put_u32(out, 4, self.fd_index);
        put_u32(out, 8, self.offset);
        put_u64(out, 16, self.extent);
    }

    fn decode(dec: &mut Decoder<'_>, parent: RegionHandle, offset: usize) -> Result<Self> {
        let bytes = dec.inline_bytes(parent, offset, Self::INLINE_SIZE)?;
        Ok(Self {
            flags: get_u32(bytes, 0),
            fd_index: get_u32(bytes, 4),
            offset: get_u32(bytes, 8),
            extent: get_u64(bytes, 16),
        })
    }
}
