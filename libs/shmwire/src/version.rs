// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::fmt;

use crate::codec::{Decoder, RegionHandle, WireType, get_u32, put_u32};
use crate::error::Result;

/// `major.minor` interface version, packed as `major << 16 | minor` on the
/// wire. Ordering compares major first.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InterfaceVersion {
    pub major: u16,
    pub minor: u16,
}

impl InterfaceVersion {
    pub const fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }

    pub const fn packed(self) -> u32 {
        (self.major as u32) << 16 | self.minor as u32
    }

    pub const fn from_packed(packed: u32) -> Self {
        Self {
            major: (packed >> 16) as u16,
            minor: (packed & 0xffff) as u16,
        }
    }

    /// A client built against `self` can talk to a server at `server`.
    pub fn is_compatible_with(self, server: InterfaceVersion) -> bool {
        self.major == server.major && self.minor <= server.minor
    }
}

impl fmt::Display for InterfaceVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl WireType for InterfaceVersion {
    const INLINE_SIZE: usize = 4;

    fn encode_inline(&self, out: &mut [u8]) {
        put_u32(out, 0, self.packed());
    }

    fn decode(dec: &mut Decoder<'_>, parent: RegionHandle, offset: usize) -> Result<Self> {
        let bytes = dec.inline_bytes(parent, offset, Self::INLINE_SIZE)?;
        Ok(Self::from_packed(get_u32(bytes, 0)))
    }
}
