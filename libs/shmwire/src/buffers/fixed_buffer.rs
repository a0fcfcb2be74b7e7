// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::ops::{Deref, DerefMut};

use crate::codec::{Decoder, Encoder, RegionHandle, WireType};
use crate::error::{Result, WireError};

/// Compile-time-sized array stored inline in its parent.
///
/// Nest for more dimensions: `FixedBuffer<FixedBuffer<f32, 4>, 4>` is a 4x4
/// matrix laid out row by row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FixedBuffer<T, const N: usize> {
    elements: [T; N],
}

impl<T, const N: usize> FixedBuffer<T, N> {
    pub const fn new(elements: [T; N]) -> Self {
        Self { elements }
    }

    pub const fn element_count() -> usize {
        N
    }

    pub fn as_slice(&self) -> &[T] {
        &self.elements
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.elements
    }

    pub fn into_array(self) -> [T; N] {
        self.elements
    }
}

impl<T: Clone, const N: usize> FixedBuffer<T, N> {
    /// Copies exactly `N` elements out of `data`.
    pub fn try_from_slice(data: &[T]) -> Result<Self> {
        let elements: [T; N] = data
            .to_vec()
            .try_into()
            .map_err(|_| WireError::LengthMismatch {
                expected: N,
                actual: data.len(),
            })?;
        Ok(Self { elements })
    }
}

impl<T: Default, const N: usize> Default for FixedBuffer<T, N> {
    fn default() -> Self {
        Self {
            elements: std::array::from_fn(|_| T::default()),
        }
    }
}

impl<T, const N: usize> From<[T; N]> for FixedBuffer<T, N> {
    fn from(elements: [T; N]) -> Self {
        Self { elements }
    }
}

impl<T, const N: usize> Deref for FixedBuffer<T, N> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.elements
    }
}

impl<T, const N: usize> DerefMut for FixedBuffer<T, N> {
    fn deref_mut(&mut self) -> &mut [T] {
        &mut self.elements
    }
}

impl<T: WireType, const N: usize> WireType for FixedBuffer<T, N> {
    const INLINE_SIZE: usize = N * T::INLINE_SIZE;

    fn encode_inline(&self, out: &mut [u8]) {
        if T::INLINE_SIZE == 0 {
            return;
        }
        for (chunk, element) in out.chunks_exact_mut(T::INLINE_SIZE).zip(&self.elements) {
            element.encode_inline(chunk);
        }
    }

    fn encode_embedded<'a>(
        &'a self,
        enc: &mut Encoder<'a>,
        parent: RegionHandle,
        offset: usize,
    ) -> Result<()> {
        for (i, element) in self.elements.iter().enumerate() {
            element.encode_embedded(enc, parent, offset + i * T::INLINE_SIZE)?;
        }
        Ok(())
    }

    fn decode(dec: &mut Decoder<'_>, parent: RegionHandle, offset: usize) -> Result<Self> {
        let decoded = (0..N)
            .map(|i| T::decode(dec, parent, offset + i * T::INLINE_SIZE))
            .collect::<Result<Vec<T>>>()?;
        let elements: [T; N] = decoded.try_into().map_err(|rest: Vec<T>| {
            WireError::corrupt(format!("expected {} fixed elements, decoded {}", N, rest.len()))
        })?;
        Ok(Self { elements })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_slice_requires_exact_length() {
        let ok = FixedBuffer::<u8, 3>::try_from_slice(&[1, 2, 3]).unwrap();
        assert_eq!(ok.as_slice(), &[1, 2, 3]);

        let err = FixedBuffer::<u8, 3>::try_from_slice(&[1, 2]).unwrap_err();
        assert!(matches!(
            err,
            WireError::LengthMismatch {
                expected: 3,
                actual: 2
            }
        ));
    }

    #[test]
    fn test_nested_dimensions() {
        let mut matrix: FixedBuffer<FixedBuffer<i32, 2>, 3> = FixedBuffer::default();
        matrix[2][1] = 7;

        assert_eq!(FixedBuffer::<FixedBuffer<i32, 2>, 3>::element_count(), 3);
        assert_eq!(matrix[2].as_slice(), &[0, 7]);
        assert_eq!(
            <FixedBuffer<FixedBuffer<i32, 2>, 3> as WireType>::INLINE_SIZE,
            24
        );
    }

    #[test]
    fn test_zero_sized_elements_encode_to_nothing() {
        let empty: FixedBuffer<FixedBuffer<u8, 0>, 2> = FixedBuffer::default();
        assert_eq!(FixedBuffer::<FixedBuffer<u8, 0>, 2>::INLINE_SIZE, 0);
        empty.encode_inline(&mut []);
    }

    #[test]
    fn test_copies_are_values() {
        let a = FixedBuffer::new([1.5f32, 2.5]);
        let mut b = a;
        b[0] = 0.0;
        assert_ne!(a, b);
        assert_eq!(a.into_array(), [1.5, 2.5]);
    }
}
