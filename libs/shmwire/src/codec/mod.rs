// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Embedded-buffer codec.
//!
//! A transport is a sequence of regions. Each region is a 32-byte header
//! followed by its payload:
//!
//! ```text
//! +--------+------+---------+--------+------+---------------+---------+
//! | magic  |  id  |   len   | parent | kind | parent_offset | payload |
//! | u32    | u32  |   u64   |  u32   | u32  |      u64      | len     |
//! +--------+------+---------+--------+------+---------------+---------+
//! ```
//!
//! A parent links to a child through a 16-byte slot inside the parent's
//! payload (`tag: u32, region: u32, offset: u64`). A slot is a buffer or
//! handle record (the child region was written for this slot), a reference
//! (points into a region another slot wrote first) or null.

mod backref;
mod decoder;
mod encoder;
mod transport;
mod wire_type;

pub use backref::{BackreferenceTable, SourceSpan};
pub use decoder::Decoder;
pub use encoder::Encoder;
pub use transport::{InProcessTransport, Transport};
pub use wire_type::WireType;
pub(crate) use wire_type::{get_i32, get_u32, get_u64, put_i32, put_u32, put_u64};

use crate::error::{Result, WireError};

pub const REGION_MAGIC: u32 = u32::from_le_bytes(*b"SWRG");
pub const REGION_HEADER_SIZE: usize = 32;
pub const SLOT_SIZE: usize = 16;
pub const SLOT_ALIGNMENT: usize = 8;

const NO_PARENT: u32 = u32::MAX;

/// Index of a region within a transport.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegionHandle(pub u32);

impl RegionHandle {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Where an embedded child lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChildHandle {
    Null,
    /// The child was written into its own region for this slot.
    Buffer(RegionHandle),
    /// The child aliases bytes another slot wrote first.
    Reference { region: RegionHandle, offset: u64 },
}

impl ChildHandle {
    pub fn location(&self) -> Option<(RegionHandle, u64)> {
        match *self {
            ChildHandle::Null => None,
            ChildHandle::Buffer(region) => Some((region, 0)),
            ChildHandle::Reference { region, offset } => Some((region, offset)),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ChildHandle::Null)
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, ChildHandle::Reference { .. })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum RegionKind {
    Root = 1,
    Buffer = 2,
    Handle = 3,
}

impl RegionKind {
    fn from_raw(raw: u32) -> Result<Self> {
        match raw {
            1 => Ok(RegionKind::Root),
            2 => Ok(RegionKind::Buffer),
            3 => Ok(RegionKind::Handle),
            other => Err(WireError::corrupt(format!("unknown region kind {}", other))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SlotTag {
    Unwritten = 0,
    Buffer = 1,
    Reference = 2,
    Null = 3,
    Handle = 4,
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct Slot {
    pub tag: SlotTag,
    pub region: RegionHandle,
    pub offset: u64,
}

impl Slot {
    pub fn null() -> Self {
        Self {
            tag: SlotTag::Null,
            region: RegionHandle(0),
            offset: 0,
        }
    }

    pub fn child(tag: SlotTag, region: RegionHandle) -> Self {
        Self {
            tag,
            region,
            offset: 0,
        }
    }

    pub fn reference(region: RegionHandle, offset: u64) -> Self {
        Self {
            tag: SlotTag::Reference,
            region,
            offset,
        }
    }

    pub fn encode(&self) -> [u8; SLOT_SIZE] {
        let mut out = [0u8; SLOT_SIZE];
        put_u32(&mut out, 0, self.tag as u32);
        put_u32(&mut out, 4, self.region.0);
        put_u64(&mut out, 8, self.offset);
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let tag = match get_u32(bytes, 0) {
            0 => SlotTag::Unwritten,
            1 => SlotTag::Buffer,
            2 => SlotTag::Reference,
            3 => SlotTag::Null,
            4 => SlotTag::Handle,
            other => return Err(WireError::corrupt(format!("unknown slot tag {}", other))),
        };
        Ok(Self {
            tag,
            region: RegionHandle(get_u32(bytes, 4)),
            offset: get_u64(bytes, 8),
        })
    }
}

/// Decoded region header plus where its payload sits in the transport.
#[derive(Clone, Copy, Debug)]
pub(crate) struct RegionSpan {
    pub payload_offset: usize,
    pub len: usize,
    pub kind: RegionKind,
    pub parent: Option<(RegionHandle, u64)>,
}

pub(crate) fn encode_header(
    id: RegionHandle,
    len: usize,
    kind: RegionKind,
    parent: Option<(RegionHandle, u64)>,
) -> [u8; REGION_HEADER_SIZE] {
    let mut out = [0u8; REGION_HEADER_SIZE];
    put_u32(&mut out, 0, REGION_MAGIC);
    put_u32(&mut out, 4, id.0);
    put_u64(&mut out, 8, len as u64);
    let (parent_id, parent_offset) = parent.map_or((NO_PARENT, 0), |(p, o)| (p.0, o));
    put_u32(&mut out, 16, parent_id);
    put_u32(&mut out, 20, kind as u32);
    put_u64(&mut out, 24, parent_offset);
    out
}

pub(crate) fn align_up(value: usize, alignment: usize) -> usize {
    (value + alignment - 1) & !(alignment - 1)
}

/// Walks every region in `transport`, validating headers as it goes.
pub(crate) fn scan_regions(transport: &dyn Transport) -> Result<Vec<RegionSpan>> {
    let mut regions: Vec<RegionSpan> = Vec::new();
    let mut cursor = 0usize;
    let total = transport.len();

    while cursor < total {
        let header_offset = align_up(cursor, transport.alignment());
        let header = transport.read(header_offset, REGION_HEADER_SIZE)?;

        if get_u32(header, 0) != REGION_MAGIC {
            return Err(WireError::corrupt(format!(
                "bad region magic at byte {}",
                header_offset
            )));
        }
        let id = get_u32(header, 4) as usize;
        if id != regions.len() {
            return Err(WireError::corrupt(format!(
                "region id {} out of sequence (expected {})",
                id,
                regions.len()
            )));
        }
        let len = usize::try_from(get_u64(header, 8))
            .map_err(|_| WireError::corrupt("region length overflows usize"))?;
        let kind = RegionKind::from_raw(get_u32(header, 20))?;
        let parent = match get_u32(header, 16) {
            NO_PARENT => None,
            parent_id if (parent_id as usize) < regions.len() => {
                Some((RegionHandle(parent_id), get_u64(header, 24)))
            }
            parent_id => {
                return Err(WireError::corrupt(format!(
                    "region {} names unknown parent {}",
                    id, parent_id
                )));
            }
        };

        let payload_offset = header_offset + REGION_HEADER_SIZE;
        let end = payload_offset
            .checked_add(len)
            .filter(|end| *end <= total)
            .ok_or_else(|| WireError::corrupt(format!("region {} overruns transport", id)))?;

        regions.push(RegionSpan {
            payload_offset,
            len,
            kind,
            parent,
        });
        cursor = end;
    }

    Ok(regions)
}
