// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Byte-addressable medium the codec writes into.

use std::os::fd::{AsFd, BorrowedFd, OwnedFd};

use super::align_up;
use crate::config::TransportConfig;
use crate::error::{Result, WireError};

/// Opaque byte-addressable medium with an alignment and capacity contract,
/// plus an out-of-band table for file descriptors.
///
/// Regions returned by [`Transport::allocate_region`] start on a multiple of
/// [`Transport::alignment`] and are zero-filled. Bytes are never moved once
/// allocated, so offsets stay valid for the life of the transport.
pub trait Transport {
    fn alignment(&self) -> usize;

    fn capacity(&self) -> usize;

    /// Bytes in use, including alignment padding.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reserves `size` bytes and returns their starting offset.
    fn allocate_region(&mut self, size: usize) -> Result<usize>;

    fn write(&mut self, offset: usize, bytes: &[u8]) -> Result<()>;

    fn read(&self, offset: usize, len: usize) -> Result<&[u8]>;

    /// Adds `fd` to the out-of-band table and returns its index. The
    /// transport keeps its own duplicate.
    fn attach_fd(&mut self, fd: BorrowedFd<'_>) -> Result<u32>;

    fn fd(&self, index: u32) -> Result<BorrowedFd<'_>>;
}

/// In-memory transport. Attached fds are duplicated into the transport the
/// way fd passing would install them in a receiving process.
#[derive(Debug)]
pub struct InProcessTransport {
    data: Vec<u8>,
    capacity: usize,
    alignment: usize,
    fds: Vec<OwnedFd>,
}

impl InProcessTransport {
    pub const DEFAULT_ALIGNMENT: usize = 8;

    pub fn new(capacity: usize) -> Self {
        Self {
            data: Vec::new(),
            capacity,
            alignment: Self::DEFAULT_ALIGNMENT,
            fds: Vec::new(),
        }
    }

    pub fn with_alignment(capacity: usize, alignment: usize) -> Result<Self> {
        if !alignment.is_power_of_two() {
            return Err(WireError::Configuration(format!(
                "transport alignment must be a power of two, got {}",
                alignment
            )));
        }
        Ok(Self {
            alignment,
            ..Self::new(capacity)
        })
    }

    pub fn from_config(config: &TransportConfig) -> Result<Self> {
        Self::with_alignment(config.capacity, config.alignment)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn fd_count(&self) -> usize {
        self.fds.len()
    }

    /// Drops all bytes and closes every attached fd.
    pub fn clear(&mut self) {
        self.data.clear();
        self.fds.clear();
    }

    fn check_range(&self, offset: usize, len: usize) -> Result<()> {
        match offset.checked_add(len) {
            Some(end) if end <= self.data.len() => Ok(()),
            _ => Err(WireError::corrupt(format!(
                "range {}..{} outside transport of {} bytes",
                offset,
                offset.saturating_add(len),
                self.data.len()
            ))),
        }
    }
}

impl Transport for InProcessTransport {
    fn alignment(&self) -> usize {
        self.alignment
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn len(&self) -> usize {
        self.data.len()
    }

    fn allocate_region(&mut self, size: usize) -> Result<usize> {
        let start = align_up(self.data.len(), self.alignment);
        let end = start
            .checked_add(size)
            .filter(|end| *end <= self.capacity)
            .ok_or(WireError::TransportFull {
                requested: size,
                available: self.capacity.saturating_sub(start),
            })?;
        self.data.resize(end, 0);
        Ok(start)
    }

    fn write(&mut self, offset: usize, bytes: &[u8]) -> Result<()> {
        self.check_range(offset, bytes.len())?;
        self.data[offset..offset + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    fn read(&self, offset: usize, len: usize) -> Result<&[u8]> {
        self.check_range(offset, len)?;
        Ok(&self.data[offset..offset + len])
    }

    fn attach_fd(&mut self, fd: BorrowedFd<'_>) -> Result<u32> {
        let index = u32::try_from(self.fds.len()).map_err(|_| {
            WireError::AllocationLimitExceeded {
                requested: self.fds.len() + 1,
            }
        })?;
        let duplicate = fd
            .try_clone_to_owned()
            .map_err(WireError::HandleDuplicationFailed)?;
        self.fds.push(duplicate);
        Ok(index)
    }

    fn fd(&self, index: u32) -> Result<BorrowedFd<'_>> {
        self.fds
            .get(index as usize)
            .map(|fd| fd.as_fd())
            .ok_or_else(|| {
                WireError::corrupt(format!(
                    "fd index {} outside table of {}",
                    index,
                    self.fds.len()
                ))
            })
    }
}
