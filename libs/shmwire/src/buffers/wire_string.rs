// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::fmt;

use super::OwnedBuffer;
use crate::codec::{ChildHandle, Decoder, Encoder, RegionHandle, WireType, get_u32};
use crate::error::{Result, WireError};

/// UTF-8 string wire value.
///
/// The embedded payload is written with a trailing NUL so a C peer can use
/// the bytes in place; the inline length excludes it.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct WireString<'a> {
    // Always valid UTF-8: every constructor takes `&str`/`String` or
    // validates decoded bytes.
    bytes: OwnedBuffer<'a, u8>,
}

const OFFSET_OF_LEN: usize = 16;

impl<'a> WireString<'a> {
    pub const OFFSET_OF_BUFFER: usize = 0;

    pub fn new() -> Self {
        Self::default()
    }

    /// Borrows `value` without copying.
    pub fn borrowed(value: &'a str) -> Result<Self> {
        Ok(Self {
            bytes: OwnedBuffer::borrowed(value.as_bytes())?,
        })
    }

    pub fn set_to_external(&mut self, value: &'a str) -> Result<()> {
        self.bytes.set_to_external(value.as_bytes())
    }

    pub fn as_str(&self) -> &str {
        // SAFETY: `bytes` only ever holds UTF-8 (see field invariant).
        unsafe { std::str::from_utf8_unchecked(self.bytes.as_slice()) }
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.bytes.as_slice()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn owns_buffer(&self) -> bool {
        self.bytes.owns_buffer()
    }

    pub fn clear(&mut self) {
        self.bytes = OwnedBuffer::new();
    }

    pub fn into_owned(self) -> WireString<'static> {
        WireString {
            bytes: self.bytes.into_owned(),
        }
    }

    pub fn write_embedded<'e>(
        &'e self,
        enc: &mut Encoder<'e>,
        parent: RegionHandle,
        parent_offset: usize,
    ) -> Result<ChildHandle> {
        enc.write_embedded_elements(
            self.bytes.as_slice(),
            parent,
            parent_offset + Self::OFFSET_OF_BUFFER,
            true,
        )
    }
}

impl TryFrom<&str> for WireString<'_> {
    type Error = WireError;

    fn try_from(value: &str) -> Result<Self> {
        Ok(Self {
            bytes: OwnedBuffer::try_from_slice(value.as_bytes())?,
        })
    }
}

impl TryFrom<String> for WireString<'_> {
    type Error = WireError;

    fn try_from(value: String) -> Result<Self> {
        Ok(Self {
            bytes: OwnedBuffer::try_from_vec(value.into_bytes())?,
        })
    }
}

impl From<WireString<'_>> for String {
    fn from(value: WireString<'_>) -> Self {
        value.as_str().to_owned()
    }
}

impl PartialEq<str> for WireString<'_> {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl PartialEq<&str> for WireString<'_> {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

impl PartialEq<String> for WireString<'_> {
    fn eq(&self, other: &String) -> bool {
        self.as_str() == other.as_str()
    }
}

impl fmt::Debug for WireString<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

impl fmt::Display for WireString<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl WireType for WireString<'_> {
    const INLINE_SIZE: usize = 24;

    fn encode_inline(&self, out: &mut [u8]) {
        let len = self.bytes.len_u32().to_le_bytes();
        out[OFFSET_OF_LEN..OFFSET_OF_LEN + 4].copy_from_slice(&len);
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
        let len = get_u32(inline, OFFSET_OF_LEN) as usize;
        let bytes =
            dec.read_embedded_elements::<u8>(parent, offset + Self::OFFSET_OF_BUFFER, len, true)?;
        let value = String::from_utf8(bytes)
            .map_err(|e| WireError::corrupt(format!("string is not UTF-8: {}", e)))?;
        Self::try_from(value)
    }
}
