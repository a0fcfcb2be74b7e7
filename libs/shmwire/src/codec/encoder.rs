// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::marker::PhantomData;

use tracing::{debug, trace};

use super::{
    BackreferenceTable, ChildHandle, REGION_HEADER_SIZE, RegionHandle, RegionKind, RegionSpan,
    SLOT_ALIGNMENT, SLOT_SIZE, Slot, SlotTag, SourceSpan, Transport, WireType, encode_header,
    scan_regions,
};
use crate::error::{Result, WireError};
use crate::handle::HandleResource;

const STRING_KEY: &str = "shmwire::WireString";
const HANDLE_KEY: &str = "shmwire::HandleResource";

/// One serialization pass over a transport.
///
/// Values handed to the encoder are borrowed for `'a`, so a source address
/// cannot be freed and reused while the pass is still deduplicating on it.
/// Each encoder starts with an empty [`BackreferenceTable`]; regions already
/// in the transport are kept and new ones are appended after them.
pub struct Encoder<'a> {
    transport: &'a mut dyn Transport,
    regions: Vec<RegionSpan>,
    backrefs: BackreferenceTable,
    first_new_region: usize,
    _values: PhantomData<&'a ()>,
}

impl<'a> Encoder<'a> {
    pub fn new(transport: &'a mut dyn Transport) -> Result<Self> {
        let regions = scan_regions(&*transport)?;
        let first_new_region = regions.len();
        Ok(Self {
            transport,
            regions,
            backrefs: BackreferenceTable::new(),
            first_new_region,
            _values: PhantomData,
        })
    }

    /// Writes `bytes` as a new top-level region.
    pub fn write_buffer(&mut self, bytes: &[u8]) -> Result<RegionHandle> {
        self.allocate(RegionKind::Root, bytes, None)
    }

    /// Writes `value`'s inline bytes as a new top-level region, followed by
    /// everything embedded in it.
    pub fn write_root<T: WireType>(&mut self, value: &'a T) -> Result<RegionHandle> {
        let mut inline = vec![0u8; T::INLINE_SIZE];
        value.encode_inline(&mut inline);
        let root = self.write_buffer(&inline)?;
        value.encode_embedded(self, root, 0)?;
        Ok(root)
    }

    /// Writes a null record into the slot at `(parent, slot_offset)`.
    pub fn write_embedded_null(
        &mut self,
        parent: RegionHandle,
        slot_offset: usize,
    ) -> Result<ChildHandle> {
        self.write_slot(parent, slot_offset, Slot::null())?;
        Ok(ChildHandle::Null)
    }

    /// Canonical location of `data` if this pass already wrote it.
    pub fn find_buffer<T: WireType>(&self, data: &[T]) -> Option<(RegionHandle, u64)> {
        self.backrefs.find(&SourceSpan::of_slice(
            data,
            std::any::type_name::<T>(),
            T::INLINE_SIZE,
            false,
        ))
    }

    /// Regions written by this pass.
    pub fn regions_written(&self) -> usize {
        self.regions.len() - self.first_new_region
    }

    pub fn backreferences(&self) -> &BackreferenceTable {
        &self.backrefs
    }

    /// Ends the pass and returns the number of regions it wrote.
    pub fn finish(self) -> usize {
        let written = self.regions_written();
        debug!(
            "[Encoder] Pass finished: {} regions, {} backreference entries, {} bytes in transport",
            written,
            self.backrefs.len(),
            self.transport.len()
        );
        written
    }

    /// Writes `elements` as the child of `(parent, slot_offset)`, or a
    /// reference if this pass already wrote the same memory.
    ///
    /// Empty element lists become null records unless `nul_terminated`, in
    /// which case a single NUL byte is still written.
    pub(crate) fn write_embedded_elements<T: WireType>(
        &mut self,
        elements: &'a [T],
        parent: RegionHandle,
        slot_offset: usize,
        nul_terminated: bool,
    ) -> Result<ChildHandle> {
        self.slot_position(parent, slot_offset)?;
        if elements.is_empty() && !nul_terminated {
            return self.write_embedded_null(parent, slot_offset);
        }

        let key = if nul_terminated {
            STRING_KEY
        } else {
            std::any::type_name::<T>()
        };
        let span = SourceSpan::of_slice(elements, key, T::INLINE_SIZE, nul_terminated);
        if let Some(child) = self.write_reference(&span, parent, slot_offset)? {
            return Ok(child);
        }

        let stride = T::INLINE_SIZE;
        let payload_len = elements
            .len()
            .checked_mul(stride)
            .and_then(|len| len.checked_add(usize::from(nul_terminated)))
            .ok_or(WireError::AllocationLimitExceeded {
                requested: elements.len(),
            })?;
        let mut payload = vec![0u8; payload_len];
        if stride > 0 {
            for (chunk, element) in payload.chunks_exact_mut(stride).zip(elements) {
                element.encode_inline(chunk);
            }
        }

        let child = self.allocate(
            RegionKind::Buffer,
            &payload,
            Some((parent, slot_offset as u64)),
        )?;
        self.write_slot(parent, slot_offset, Slot::child(SlotTag::Buffer, child))?;
        self.backrefs.record(span, child);

        for (i, element) in elements.iter().enumerate() {
            element.encode_embedded(self, child, i * stride)?;
        }
        Ok(ChildHandle::Buffer(child))
    }

    /// Writes `handle` as the child of `(parent, slot_offset)`. The fds go
    /// into the transport's out-of-band table; the region lists their
    /// indices followed by the handle's ints. An empty handle is null.
    pub fn write_embedded_handle(
        &mut self,
        handle: &'a HandleResource,
        parent: RegionHandle,
        slot_offset: usize,
    ) -> Result<ChildHandle> {
        self.slot_position(parent, slot_offset)?;
        if handle.is_empty() {
            return self.write_embedded_null(parent, slot_offset);
        }

        let span = SourceSpan::of_object(handle, HANDLE_KEY);
        if let Some(child) = self.write_reference(&span, parent, slot_offset)? {
            return Ok(child);
        }

        let fds = handle.fds();
        let ints = handle.ints();
        let mut payload = Vec::with_capacity(8 + 4 * (fds.len() + ints.len()));
        payload.extend_from_slice(&count_u32(fds.len())?.to_le_bytes());
        payload.extend_from_slice(&count_u32(ints.len())?.to_le_bytes());
        // Fd indices are filled in once the region is allocated.
        payload.resize(8 + 4 * fds.len(), 0);
        for value in ints {
            payload.extend_from_slice(&value.to_le_bytes());
        }

        let child = self.allocate(
            RegionKind::Handle,
            &payload,
            Some((parent, slot_offset as u64)),
        )?;
        let indices_at = self.regions[child.index()].payload_offset + 8;
        for (i, fd) in fds.into_iter().enumerate() {
            let index = self.transport.attach_fd(fd)?;
            self.transport.write(indices_at + 4 * i, &index.to_le_bytes())?;
        }
        self.write_slot(parent, slot_offset, Slot::child(SlotTag::Handle, child))?;
        self.backrefs.record(span, child);
        Ok(ChildHandle::Buffer(child))
    }

    fn write_reference(
        &mut self,
        span: &SourceSpan,
        parent: RegionHandle,
        slot_offset: usize,
    ) -> Result<Option<ChildHandle>> {
        let Some((region, offset)) = self.backrefs.find(span) else {
            return Ok(None);
        };
        self.write_slot(parent, slot_offset, Slot::reference(region, offset))?;
        debug!(
            "[Encoder] Backreference from region {} +{} to region {} +{}",
            parent.0, slot_offset, region.0, offset
        );
        Ok(Some(ChildHandle::Reference { region, offset }))
    }

    fn allocate(
        &mut self,
        kind: RegionKind,
        payload: &[u8],
        parent: Option<(RegionHandle, u64)>,
    ) -> Result<RegionHandle> {
        let id = u32::try_from(self.regions.len())
            .map(RegionHandle)
            .map_err(|_| WireError::AllocationLimitExceeded {
                requested: self.regions.len() + 1,
            })?;
        let total = REGION_HEADER_SIZE
            .checked_add(payload.len())
            .ok_or(WireError::TransportFull {
                requested: usize::MAX,
                available: self.transport.capacity(),
            })?;

        let header_offset = self.transport.allocate_region(total)?;
        let payload_offset = header_offset + REGION_HEADER_SIZE;
        self.transport
            .write(header_offset, &encode_header(id, payload.len(), kind, parent))?;
        self.transport.write(payload_offset, payload)?;

        self.regions.push(RegionSpan {
            payload_offset,
            len: payload.len(),
            kind,
            parent,
        });
        trace!(
            "[Encoder] Region {} ({:?}, {} bytes) at byte {}",
            id.0,
            kind,
            payload.len(),
            header_offset
        );
        Ok(id)
    }

    /// Absolute transport offset of the slot at `(parent, slot_offset)`.
    fn slot_position(&self, parent: RegionHandle, slot_offset: usize) -> Result<usize> {
        let span = self.regions.get(parent.index()).ok_or_else(|| {
            WireError::corrupt(format!("parent region {} was never written", parent.0))
        })?;
        let absolute = span.payload_offset.checked_add(slot_offset).ok_or_else(|| {
            WireError::corrupt(format!(
                "slot offset {} overflows region {}",
                slot_offset, parent.0
            ))
        })?;
        if absolute % SLOT_ALIGNMENT != 0 {
            return Err(WireError::BadAlignment {
                offset: slot_offset,
                alignment: SLOT_ALIGNMENT,
            });
        }
        if slot_offset
            .checked_add(SLOT_SIZE)
            .is_none_or(|end| end > span.len)
        {
            return Err(WireError::corrupt(format!(
                "slot at +{} overruns region {} of {} bytes",
                slot_offset, parent.0, span.len
            )));
        }
        Ok(absolute)
    }

    fn write_slot(&mut self, parent: RegionHandle, slot_offset: usize, slot: Slot) -> Result<()> {
        let at = self.slot_position(parent, slot_offset)?;
        self.transport.write(at, &slot.encode())
    }
}

fn count_u32(count: usize) -> Result<u32> {
    u32::try_from(count).map_err(|_| WireError::AllocationLimitExceeded { requested: count })
}
