// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Length-prefixed element buffer that either owns its storage or borrows
//! someone else's.
//!
//! A borrowed buffer is a view: it is never freed, resized or written
//! through by this value, and the `'a` lifetime keeps the source alive for
//! as long as the view exists. Copies are always owned.

use std::fmt;
use std::ops::{Deref, Index, IndexMut};

use crate::codec::{ChildHandle, Decoder, Encoder, RegionHandle, WireType, get_u32};
use crate::error::{Result, WireError};

/// Largest element count representable on the wire.
pub const MAX_ELEMENTS: usize = u32::MAX as usize;

enum Storage<'a, T> {
    Owned(Box<[T]>),
    Borrowed(&'a [T]),
}

pub struct OwnedBuffer<'a, T> {
    storage: Storage<'a, T>,
}

fn check_len(len: usize) -> Result<()> {
    if len > MAX_ELEMENTS {
        return Err(WireError::AllocationLimitExceeded { requested: len });
    }
    Ok(())
}

impl<'a, T> OwnedBuffer<'a, T> {
    /// Empty owned buffer. Zero-length storage is never allocated or freed.
    pub fn new() -> Self {
        Self {
            storage: Storage::Owned(Box::default()),
        }
    }

    /// Takes ownership of `elements` without copying.
    pub fn try_from_vec(elements: Vec<T>) -> Result<Self> {
        check_len(elements.len())?;
        Ok(Self {
            storage: Storage::Owned(elements.into_boxed_slice()),
        })
    }

    /// Wraps external memory without copying. The result does not own it.
    pub fn borrowed(data: &'a [T]) -> Result<Self> {
        check_len(data.len())?;
        Ok(Self {
            storage: Storage::Borrowed(data),
        })
    }

    /// Drops any owned storage and starts borrowing `data`.
    pub fn set_to_external(&mut self, data: &'a [T]) -> Result<()> {
        check_len(data.len())?;
        self.storage = Storage::Borrowed(data);
        Ok(())
    }

    pub fn owns_buffer(&self) -> bool {
        matches!(self.storage, Storage::Owned(_))
    }

    pub fn as_slice(&self) -> &[T] {
        match &self.storage {
            Storage::Owned(elements) => elements,
            Storage::Borrowed(elements) => elements,
        }
    }

    /// Mutable view of owned storage. Borrowed buffers are read-only.
    pub fn as_mut_slice(&mut self) -> Result<&mut [T]> {
        match &mut self.storage {
            Storage::Owned(elements) => Ok(elements),
            Storage::Borrowed(_) => Err(WireError::BorrowViolation {
                operation: "mutate",
            }),
        }
    }

    /// Element count as carried on the wire.
    pub fn len_u32(&self) -> u32 {
        // Every constructor enforces MAX_ELEMENTS.
        self.as_slice().len() as u32
    }

    /// Moves the contents out, leaving `self` empty.
    pub fn take(&mut self) -> Self {
        std::mem::take(self)
    }
}

impl<'a, T: Clone> OwnedBuffer<'a, T> {
    /// Copies `data` into freshly owned storage.
    pub fn try_from_slice(data: &[T]) -> Result<Self> {
        check_len(data.len())?;
        Ok(Self {
            storage: Storage::Owned(data.into()),
        })
    }

    /// Hands the elements to the caller and leaves `self` empty and
    /// non-owning. Borrowed contents are copied first.
    pub fn release_ownership(&mut self) -> Vec<T> {
        match std::mem::replace(&mut self.storage, Storage::Borrowed(&[])) {
            Storage::Owned(elements) => elements.into_vec(),
            Storage::Borrowed(elements) => elements.to_vec(),
        }
    }

    /// Detaches from any borrowed source.
    pub fn into_owned(self) -> OwnedBuffer<'static, T> {
        let elements = match self.storage {
            Storage::Owned(elements) => elements,
            Storage::Borrowed(elements) => elements.into(),
        };
        OwnedBuffer {
            storage: Storage::Owned(elements),
        }
    }
}

impl<'a, T: Clone + Default> OwnedBuffer<'a, T> {
    /// Reallocates to `len` elements, keeping the first `min(old, len)` and
    /// filling the rest with `T::default()`. The result always owns its
    /// storage.
    pub fn resize(&mut self, len: usize) -> Result<()> {
        check_len(len)?;
        let keep = len.min(self.len());
        let mut next = Vec::with_capacity(len);
        next.extend_from_slice(&self.as_slice()[..keep]);
        next.resize(len, T::default());
        self.storage = Storage::Owned(next.into_boxed_slice());
        Ok(())
    }
}

impl<T> Default for OwnedBuffer<'_, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> Clone for OwnedBuffer<'_, T> {
    fn clone(&self) -> Self {
        Self {
            storage: Storage::Owned(self.as_slice().into()),
        }
    }
}

impl<T> Deref for OwnedBuffer<'_, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        self.as_slice()
    }
}

impl<T> Index<usize> for OwnedBuffer<'_, T> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        &self.as_slice()[index]
    }
}

impl<T> IndexMut<usize> for OwnedBuffer<'_, T> {
    /// Panics on a borrowed buffer; use [`OwnedBuffer::as_mut_slice`] to get
    /// the error instead.
    fn index_mut(&mut self, index: usize) -> &mut T {
        match &mut self.storage {
            Storage::Owned(elements) => &mut elements[index],
            Storage::Borrowed(_) => panic!(
                "{}",
                WireError::BorrowViolation {
                    operation: "index mutably"
                }
            ),
        }
    }
}

impl<'b, T: PartialEq<U>, U> PartialEq<OwnedBuffer<'b, U>> for OwnedBuffer<'_, T> {
    fn eq(&self, other: &OwnedBuffer<'b, U>) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl<T: Eq> Eq for OwnedBuffer<'_, T> {}

impl<T: fmt::Debug> fmt::Debug for OwnedBuffer<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnedBuffer")
            .field("owns", &self.owns_buffer())
            .field("elements", &self.as_slice())
            .finish()
    }
}

impl<T> TryFrom<Vec<T>> for OwnedBuffer<'_, T> {
    type Error = WireError;

    fn try_from(elements: Vec<T>) -> Result<Self> {
        Self::try_from_vec(elements)
    }
}

impl<T: Clone> From<OwnedBuffer<'_, T>> for Vec<T> {
    fn from(buffer: OwnedBuffer<'_, T>) -> Self {
        match buffer.storage {
            Storage::Owned(elements) => elements.into_vec(),
            Storage::Borrowed(elements) => elements.to_vec(),
        }
    }
}

impl<'s, T> IntoIterator for &'s OwnedBuffer<'_, T> {
    type Item = &'s T;
    type IntoIter = std::slice::Iter<'s, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.as_slice().iter()
    }
}

// Inline layout: embedded slot @0, element count @16.
const OFFSET_OF_LEN: usize = 16;

impl<T: WireType> OwnedBuffer<'_, T> {
    /// Offset of the embedded-buffer slot inside the inline header.
    pub const OFFSET_OF_BUFFER: usize = 0;

    /// Writes the elements as a child of the slot at
    /// `parent_offset + OFFSET_OF_BUFFER` in `parent`.
    pub fn write_embedded<'a>(
        &'a self,
        enc: &mut Encoder<'a>,
        parent: RegionHandle,
        parent_offset: usize,
    ) -> Result<ChildHandle> {
        enc.write_embedded_elements(
            self.as_slice(),
            parent,
            parent_offset + Self::OFFSET_OF_BUFFER,
            false,
        )
    }
}

impl<T: WireType> WireType for OwnedBuffer<'_, T> {
    const INLINE_SIZE: usize = 24;

    fn encode_inline(&self, out: &mut [u8]) {
        out[OFFSET_OF_LEN..OFFSET_OF_LEN + 4].copy_from_slice(&self.len_u32().to_le_bytes());
    }

    fn encode_embedded<'a>(
        &'a self,
        enc: &mut Encoder<'a>,
        parent: RegionHandle,
        offset: usize,
    ) -> Result<()> {
        self.write_embedded(enc, parent, offset).map(|_| ())
    }

    fn decode(dec: &mut Decoder<'_>, parent: RegionHandle, offset: usize) -> Result<Self> {
        let inline = dec.inline_bytes(parent, offset, Self::INLINE_SIZE)?;
        let count = get_u32(inline, OFFSET_OF_LEN) as usize;
        let elements =
            dec.read_embedded_elements::<T>(parent, offset + Self::OFFSET_OF_BUFFER, count, false)?;
        Self::try_from_vec(elements)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_copy_construction_is_independent() {
        let mut source = vec![1, 2, 3];
        let buffer = OwnedBuffer::try_from_slice(&source).unwrap();
        source[0] = 99;

        assert!(buffer.owns_buffer());
        assert_eq!(buffer.as_slice(), &[1, 2, 3]);
    }

    #[test]
    fn test_borrowed_buffer_observes_external_mutation() {
        let external = [Cell::new(5), Cell::new(6)];
        let buffer = OwnedBuffer::borrowed(&external).unwrap();
        external[0].set(9);

        assert!(!buffer.owns_buffer());
        assert_eq!(buffer[0].get(), 9);
    }

    #[test]
    fn test_clone_of_borrowed_is_owned() {
        let data = [4u16, 5, 6];
        let borrowed = OwnedBuffer::borrowed(&data).unwrap();
        let copy = borrowed.clone();

        assert!(copy.owns_buffer());
        assert_eq!(copy, borrowed);
        assert_ne!(copy.as_ptr(), borrowed.as_ptr());
    }

    #[test]
    fn test_take_leaves_source_empty() {
        let mut buffer = OwnedBuffer::try_from_vec(vec![1u8, 2]).unwrap();
        let moved = buffer.take();

        assert!(buffer.is_empty());
        assert_eq!(moved.as_slice(), &[1, 2]);
    }

    #[test]
    fn test_resize_keeps_prefix_and_becomes_owned() {
        let data = [1i32, 2, 3, 4];
        let mut buffer = OwnedBuffer::borrowed(&data).unwrap();

        buffer.resize(2).unwrap();
        assert!(buffer.owns_buffer());
        assert_eq!(buffer.as_slice(), &[1, 2]);

        buffer.resize(4).unwrap();
        assert_eq!(buffer.as_slice(), &[1, 2, 0, 0]);
        assert_eq!(data, [1, 2, 3, 4]);
    }

    #[test]
    fn test_release_ownership_copies_borrowed_data() {
        let data = vec![7u32, 8];
        let mut buffer = OwnedBuffer::borrowed(&data).unwrap();
        let released = buffer.release_ownership();

        assert_eq!(released, data);
        assert_ne!(released.as_ptr(), data.as_ptr());
        assert!(buffer.is_empty());
        assert!(!buffer.owns_buffer());
    }

    #[test]
    fn test_release_ownership_hands_over_owned_storage() {
        let mut buffer = OwnedBuffer::try_from_vec(vec![1u8, 2, 3]).unwrap();
        let ptr = buffer.as_ptr();
        let released = buffer.release_ownership();

        assert_eq!(released.as_ptr(), ptr);
        assert!(!buffer.owns_buffer());
    }

    #[test]
    fn test_mutating_borrowed_is_a_borrow_violation() {
        let data = [1u8];
        let mut buffer = OwnedBuffer::borrowed(&data).unwrap();

        assert!(matches!(
            buffer.as_mut_slice(),
            Err(WireError::BorrowViolation { .. })
        ));
    }

    #[test]
    #[should_panic(expected = "Borrow violation")]
    fn test_index_mut_on_borrowed_panics() {
        let data = [1u8];
        let mut buffer = OwnedBuffer::borrowed(&data).unwrap();
        buffer[0] = 2;
    }

    #[test]
    fn test_checked_indexing() {
        let buffer = OwnedBuffer::try_from_slice(&[10u8, 20]).unwrap();
        assert_eq!(buffer.get(1), Some(&20));
        assert_eq!(buffer.get(2), None);
    }

    #[test]
    fn test_equality_ignores_ownership() {
        let data = [1i64, 2];
        let owned = OwnedBuffer::try_from_slice(&data).unwrap();
        let borrowed = OwnedBuffer::borrowed(&data).unwrap();
        assert_eq!(owned, borrowed);

        let other = OwnedBuffer::try_from_slice(&[1i64, 3]).unwrap();
        assert_ne!(owned, other);
    }

    /// `len` unit values without touching memory.
    fn units(len: usize) -> Vec<()> {
        let mut units = Vec::new();
        // SAFETY: a `Vec<()>` has capacity `usize::MAX` and `()` has no
        // invalid bit patterns.
        unsafe { units.set_len(len) };
        units
    }

    #[test]
    fn test_element_count_is_capped() {
        let at_limit = units(MAX_ELEMENTS);
        assert_eq!(OwnedBuffer::borrowed(&at_limit).unwrap().len_u32(), u32::MAX);

        let over = units(MAX_ELEMENTS + 1);
        assert!(matches!(
            OwnedBuffer::borrowed(&over),
            Err(WireError::AllocationLimitExceeded { requested }) if requested == MAX_ELEMENTS + 1
        ));
        assert!(matches!(
            OwnedBuffer::try_from_vec(units(MAX_ELEMENTS + 1)),
            Err(WireError::AllocationLimitExceeded { .. })
        ));

        let mut buffer: OwnedBuffer<'_, ()> = OwnedBuffer::new();
        assert!(matches!(
            buffer.resize(MAX_ELEMENTS + 1),
            Err(WireError::AllocationLimitExceeded { .. })
        ));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_zero_length_buffers() {
        let buffer: OwnedBuffer<'_, u64> = OwnedBuffer::new();
        assert!(buffer.owns_buffer());
        assert_eq!(buffer.len_u32(), 0);
        assert_eq!(buffer, OwnedBuffer::<u64>::default());
    }
}
