// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use tracing::trace;

use super::{
    ChildHandle, RegionHandle, RegionKind, RegionSpan, SLOT_ALIGNMENT, SLOT_SIZE, Slot, SlotTag,
    Transport, WireType, get_i32, get_u32, scan_regions,
};
use crate::buffers::OwnedBuffer;
use crate::error::{Result, WireError};
use crate::handle::HandleResource;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct MaterializedKey {
    region: RegionHandle,
    offset: u64,
    count: usize,
    type_id: TypeId,
}

/// One deserialization pass over a transport.
///
/// The region directory is validated up front. Shared reads
/// ([`Decoder::read_shared`]) are memoized per pass, so two slots that
/// reference the same canonical bytes hand back the same `Arc`.
pub struct Decoder<'a> {
    transport: &'a dyn Transport,
    regions: Vec<RegionSpan>,
    materialized: HashMap<MaterializedKey, Arc<dyn Any + Send + Sync>>,
}

impl<'a> Decoder<'a> {
    pub fn new(transport: &'a dyn Transport) -> Result<Self> {
        let regions = scan_regions(transport)?;
        trace!("[Decoder] {} regions in transport", regions.len());
        Ok(Self {
            transport,
            regions,
            materialized: HashMap::new(),
        })
    }

    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    /// Decodes the first top-level region as a `T`.
    pub fn read_root<T: WireType>(&mut self) -> Result<T> {
        let root = self
            .regions
            .iter()
            .position(|span| span.kind == RegionKind::Root)
            .ok_or_else(|| WireError::corrupt("transport has no top-level region"))?;
        self.read_root_at(RegionHandle(root as u32))
    }

    /// Decodes the top-level region `root` as a `T`.
    pub fn read_root_at<T: WireType>(&mut self, root: RegionHandle) -> Result<T> {
        let span = self.span(root)?;
        if span.kind != RegionKind::Root {
            return Err(WireError::corrupt(format!(
                "region {} is not a top-level region",
                root.0
            )));
        }
        if span.len != T::INLINE_SIZE {
            return Err(WireError::corrupt(format!(
                "top-level region {} holds {} bytes, expected {}",
                root.0,
                span.len,
                T::INLINE_SIZE
            )));
        }
        T::decode(self, root, 0)
    }

    /// Decodes a `T` whose inline bytes sit at `(parent, offset)`.
    pub fn decode<T: WireType>(&mut self, parent: RegionHandle, offset: usize) -> Result<T> {
        T::decode(self, parent, offset)
    }

    /// Full payload of `region`.
    pub fn region_bytes(&self, region: RegionHandle) -> Result<&'a [u8]> {
        let span = self.span(region)?;
        self.transport.read(span.payload_offset, span.len)
    }

    /// `len` payload bytes of `region` starting at `offset`.
    pub fn inline_bytes(
        &self,
        region: RegionHandle,
        offset: usize,
        len: usize,
    ) -> Result<&'a [u8]> {
        let span = self.span(region)?;
        match offset.checked_add(len) {
            Some(end) if end <= span.len => self.transport.read(span.payload_offset + offset, len),
            _ => Err(WireError::corrupt(format!(
                "{} bytes at +{} overrun region {} of {} bytes",
                len, offset, region.0, span.len
            ))),
        }
    }

    /// Resolves the buffer slot at `(parent, slot_offset)`. References are
    /// returned as such, pointing at the canonical bytes.
    pub fn read_embedded(&self, parent: RegionHandle, slot_offset: usize) -> Result<ChildHandle> {
        self.resolve(parent, slot_offset, RegionKind::Buffer)
    }

    /// Decodes the `OwnedBuffer<T>` at `(parent, offset)`, returning the
    /// same instance for every slot that aliases the same canonical bytes.
    pub fn read_shared<T>(
        &mut self,
        parent: RegionHandle,
        offset: usize,
    ) -> Result<Arc<OwnedBuffer<'static, T>>>
    where
        T: WireType + Send + Sync + 'static,
    {
        let inline = self.inline_bytes(parent, offset, OwnedBuffer::<T>::INLINE_SIZE)?;
        let count = get_u32(inline, 16) as usize;
        let child = self.resolve(
            parent,
            offset + OwnedBuffer::<T>::OFFSET_OF_BUFFER,
            RegionKind::Buffer,
        )?;
        let Some((region, base)) = child.location() else {
            return Ok(Arc::new(OwnedBuffer::decode(self, parent, offset)?));
        };

        let key = MaterializedKey {
            region,
            offset: base,
            count,
            type_id: TypeId::of::<T>(),
        };
        if let Some(existing) = self.materialized.get(&key) {
            if let Ok(buffer) = Arc::clone(existing).downcast::<OwnedBuffer<'static, T>>() {
                return Ok(buffer);
            }
        }

        let decoded = Arc::new(OwnedBuffer::<'static, T>::decode(self, parent, offset)?);
        self.materialized
            .insert(key, Arc::clone(&decoded) as Arc<dyn Any + Send + Sync>);
        Ok(decoded)
    }

    /// Decodes `count` elements from the buffer slot at
    /// `(parent, slot_offset)`.
    pub(crate) fn read_embedded_elements<T: WireType>(
        &mut self,
        parent: RegionHandle,
        slot_offset: usize,
        count: usize,
        nul_terminated: bool,
    ) -> Result<Vec<T>> {
        let child = self.resolve(parent, slot_offset, RegionKind::Buffer)?;
        let Some((region, base)) = child.location() else {
            if count == 0 && !nul_terminated {
                return Ok(Vec::new());
            }
            return Err(WireError::corrupt(format!(
                "null buffer at region {} +{} claims {} elements",
                parent.0, slot_offset, count
            )));
        };

        let base = usize::try_from(base)
            .map_err(|_| WireError::corrupt("reference offset overflows usize"))?;
        let stride = T::INLINE_SIZE;
        // Zero-sized elements carry no bytes, so the count is bounded by the
        // transport size instead.
        if stride == 0 && count > self.transport.capacity() {
            return Err(WireError::corrupt(format!(
                "{} zero-sized elements exceed a transport of {} bytes",
                count,
                self.transport.capacity()
            )));
        }
        let body = count
            .checked_mul(stride)
            .ok_or_else(|| WireError::corrupt(format!("element count {} overflows", count)))?;
        let run = body
            .checked_add(usize::from(nul_terminated))
            .ok_or_else(|| WireError::corrupt(format!("element count {} overflows", count)))?;
        // Bounds-check the whole run (and terminator) before decoding.
        let terminator = self.inline_bytes(region, base, run)?;
        if nul_terminated && terminator[body] != 0 {
            return Err(WireError::corrupt(format!(
                "string in region {} is not NUL-terminated",
                region.0
            )));
        }

        (0..count)
            .map(|i| T::decode(self, region, base + i * stride))
            .collect()
    }

    /// Reconstructs the handle in the slot at `(parent, slot_offset)`,
    /// duplicating each fd out of the transport's table. A null slot yields
    /// an empty handle.
    pub fn read_embedded_handle(
        &mut self,
        parent: RegionHandle,
        slot_offset: usize,
    ) -> Result<HandleResource> {
        let child = self.resolve(parent, slot_offset, RegionKind::Handle)?;
        let Some((region, base)) = child.location() else {
            return Ok(HandleResource::empty());
        };
        if base != 0 {
            return Err(WireError::corrupt(format!(
                "handle reference into the middle of region {}",
                region.0
            )));
        }

        let payload = self.region_bytes(region)?;
        if payload.len() < 8 {
            return Err(WireError::corrupt(format!(
                "handle region {} is truncated",
                region.0
            )));
        }
        let num_fds = get_u32(payload, 0) as usize;
        let num_ints = get_u32(payload, 4) as usize;
        if payload.len() != 8 + 4 * (num_fds + num_ints) {
            return Err(WireError::corrupt(format!(
                "handle region {} holds {} bytes for {} fds and {} ints",
                region.0,
                payload.len(),
                num_fds,
                num_ints
            )));
        }

        let mut fds = Vec::with_capacity(num_fds);
        for i in 0..num_fds {
            let index = get_u32(payload, 8 + 4 * i);
            let duplicate = self
                .transport
                .fd(index)?
                .try_clone_to_owned()
                .map_err(WireError::HandleDuplicationFailed)?;
            fds.push(duplicate);
        }
        let ints_at = 8 + 4 * num_fds;
        let ints = (0..num_ints)
            .map(|i| get_i32(payload, ints_at + 4 * i))
            .collect();

        Ok(HandleResource::new(fds, ints))
    }

    fn span(&self, region: RegionHandle) -> Result<&RegionSpan> {
        self.regions
            .get(region.index())
            .ok_or_else(|| WireError::corrupt(format!("region {} does not exist", region.0)))
    }

    fn resolve(
        &self,
        parent: RegionHandle,
        slot_offset: usize,
        expected: RegionKind,
    ) -> Result<ChildHandle> {
        let span = self.span(parent)?;
        let absolute = span.payload_offset.checked_add(slot_offset).ok_or_else(|| {
            WireError::corrupt(format!(
                "slot offset {} overflows region {}",
                slot_offset, parent.0
            ))
        })?;
        if absolute % SLOT_ALIGNMENT != 0 {
            return Err(WireError::corrupt(format!(
                "no slot at misaligned region {} +{}",
                parent.0, slot_offset
            )));
        }
        let slot = Slot::decode(self.inline_bytes(parent, slot_offset, SLOT_SIZE)?)?;

        match slot.tag {
            SlotTag::Null => Ok(ChildHandle::Null),
            SlotTag::Unwritten => Err(WireError::corrupt(format!(
                "no embedded record at region {} +{}",
                parent.0, slot_offset
            ))),
            SlotTag::Buffer | SlotTag::Handle => {
                let child = self.span(slot.region)?;
                let tag_matches = match expected {
                    RegionKind::Handle => slot.tag == SlotTag::Handle,
                    _ => slot.tag == SlotTag::Buffer,
                };
                if !tag_matches || child.kind != expected {
                    return Err(WireError::corrupt(format!(
                        "region {} is a {:?} region, expected {:?}",
                        slot.region.0, child.kind, expected
                    )));
                }
                if child.parent != Some((parent, slot_offset as u64)) {
                    return Err(WireError::corrupt(format!(
                        "region {} was not written for region {} +{}",
                        slot.region.0, parent.0, slot_offset
                    )));
                }
                Ok(ChildHandle::Buffer(slot.region))
            }
            SlotTag::Reference => {
                let target = self.span(slot.region)?;
                if target.kind != expected {
                    return Err(WireError::corrupt(format!(
                        "reference to {:?} region {}, expected {:?}",
                        target.kind, slot.region.0, expected
                    )));
                }
                if slot.offset > target.len as u64 {
                    return Err(WireError::corrupt(format!(
                        "reference offset {} past end of region {}",
                        slot.offset, slot.region.0
                    )));
                }
                Ok(ChildHandle::Reference {
                    region: slot.region,
                    offset: slot.offset,
                })
            }
        }
    }
}
