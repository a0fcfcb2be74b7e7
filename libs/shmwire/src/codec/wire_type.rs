// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use super::{Decoder, Encoder, RegionHandle};
use crate::error::{Result, WireError};

/// A value with a fixed-size inline representation and, optionally,
/// embedded children written as separate regions.
///
/// `encode_inline` fills exactly `INLINE_SIZE` bytes and leaves embedded
/// slots zeroed; `encode_embedded` then fills those slots once the inline
/// bytes sit at `(parent, offset)` in the transport. `decode` reads both
/// back from the same coordinates.
pub trait WireType: Sized {
    const INLINE_SIZE: usize;

    fn encode_inline(&self, out: &mut [u8]);

    fn encode_embedded<'a>(
        &'a self,
        _enc: &mut Encoder<'a>,
        _parent: RegionHandle,
        _offset: usize,
    ) -> Result<()> {
        Ok(())
    }

    fn decode(dec: &mut Decoder<'_>, parent: RegionHandle, offset: usize) -> Result<Self>;
}

macro_rules! le_accessors {
    ($($get:ident, $put:ident => $ty:ty;)*) => {$(
        pub(crate) fn $get(bytes: &[u8], at: usize) -> $ty {
            let mut raw = [0u8; std::mem::size_of::<$ty>()];
            raw.copy_from_slice(&bytes[at..at + std::mem::size_of::<$ty>()]);
            <$ty>::from_le_bytes(raw)
        }

        pub(crate) fn $put(bytes: &mut [u8], at: usize, value: $ty) {
            bytes[at..at + std::mem::size_of::<$ty>()].copy_from_slice(&value.to_le_bytes());
        }
    )*};
}

le_accessors! {
    get_u32, put_u32 => u32;
    get_i32, put_i32 => i32;
    get_u64, put_u64 => u64;
}

macro_rules! impl_wire_primitive {
    ($($ty:ty),* $(,)?) => {$(
        impl WireType for $ty {
            const INLINE_SIZE: usize = std::mem::size_of::<$ty>();

            fn encode_inline(&self, out: &mut [u8]) {
                out.copy_from_slice(&self.to_le_bytes());
            }

            fn decode(dec: &mut Decoder<'_>, parent: RegionHandle, offset: usize) -> Result<Self> {
                let bytes = dec.inline_bytes(parent, offset, Self::INLINE_SIZE)?;
                let mut raw = [0u8; std::mem::size_of::<$ty>()];
                raw.copy_from_slice(bytes);
                Ok(<$ty>::from_le_bytes(raw))
            }
        }
    )*};
}

impl_wire_primitive!(u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);

impl WireType for bool {
    const INLINE_SIZE: usize = 1;

    fn encode_inline(&self, out: &mut [u8]) {
        out[0] = u8::from(*self);
    }

    fn decode(dec: &mut Decoder<'_>, parent: RegionHandle, offset: usize) -> Result<Self> {
        match dec.inline_bytes(parent, offset, 1)?[0] {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(WireError::corrupt(format!("invalid bool byte {:#04x}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_le_accessors() {
        let mut bytes = [0u8; 16];
        put_u32(&mut bytes, 0, 0xDEAD_BEEF);
        put_i32(&mut bytes, 4, -2);
        put_u64(&mut bytes, 8, 1 << 40);

        assert_eq!(bytes[0], 0xEF);
        assert_eq!(get_u32(&bytes, 0), 0xDEAD_BEEF);
        assert_eq!(get_i32(&bytes, 4), -2);
        assert_eq!(get_u64(&bytes, 8), 1 << 40);
    }

    #[test]
    fn test_primitive_inline_sizes() {
        assert_eq!(<u8 as WireType>::INLINE_SIZE, 1);
        assert_eq!(<i16 as WireType>::INLINE_SIZE, 2);
        assert_eq!(<f32 as WireType>::INLINE_SIZE, 4);
        assert_eq!(<u64 as WireType>::INLINE_SIZE, 8);
        assert_eq!(<bool as WireType>::INLINE_SIZE, 1);
    }
}
