// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::collections::BTreeMap;

use super::RegionHandle;

/// Source memory that is about to be written: an address range plus enough
/// type information to translate a sub-range into a wire offset.
#[derive(Clone, Copy, Debug)]
pub struct SourceSpan {
    start: usize,
    len: usize,
    key: &'static str,
    element_size: usize,
    wire_stride: usize,
    exact: bool,
}

impl SourceSpan {
    /// A slice whose elements occupy `wire_stride` bytes each on the wire.
    /// `exact` spans only match a previous write of the same range.
    pub fn of_slice<T>(data: &[T], key: &'static str, wire_stride: usize, exact: bool) -> Self {
        Self {
            start: data.as_ptr() as usize,
            len: std::mem::size_of_val(data),
            key,
            element_size: std::mem::size_of::<T>(),
            wire_stride,
            exact,
        }
    }

    /// A single object identified by its address.
    pub fn of_object<T>(object: &T, key: &'static str) -> Self {
        let size = std::mem::size_of::<T>();
        Self {
            start: object as *const T as usize,
            len: size,
            key,
            element_size: size,
            wire_stride: 0,
            exact: true,
        }
    }

    fn is_addressable(&self) -> bool {
        self.len > 0 && self.element_size > 0
    }
}

#[derive(Debug)]
struct Entry {
    span: SourceSpan,
    region: RegionHandle,
}

/// Source address → canonical (region, byte offset) for one encode pass.
///
/// The first writer of an address owns the canonical location; later
/// writers of the same memory, or of a sub-range of it, get a reference.
#[derive(Debug, Default)]
pub struct BackreferenceTable {
    entries: BTreeMap<usize, Vec<Entry>>,
    count: usize,
}

impl BackreferenceTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, span: SourceSpan, region: RegionHandle) {
        if !span.is_addressable() {
            return;
        }
        self.entries
            .entry(span.start)
            .or_default()
            .push(Entry { span, region });
        self.count += 1;
    }

    pub fn find(&self, span: &SourceSpan) -> Option<(RegionHandle, u64)> {
        if !span.is_addressable() {
            return None;
        }
        for (start, entries) in self.entries.range(..=span.start).rev() {
            let delta = span.start - start;
            for entry in entries {
                let known = &entry.span;
                if known.key != span.key
                    || known.element_size != span.element_size
                    || known.wire_stride != span.wire_stride
                {
                    continue;
                }
                if known.exact || span.exact {
                    if delta == 0 && known.len == span.len {
                        return Some((entry.region, 0));
                    }
                    continue;
                }
                if delta + span.len <= known.len && delta % known.element_size == 0 {
                    let offset = delta / known.element_size * known.wire_stride;
                    return Some((entry.region, offset as u64));
                }
            }
        }
        None
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sub_range_translates_to_wire_offset() {
        let data = [1u32, 2, 3, 4];
        let mut table = BackreferenceTable::new();
        table.record(SourceSpan::of_slice(&data, "u32", 4, false), RegionHandle(3));

        let tail = SourceSpan::of_slice(&data[2..], "u32", 4, false);
        assert_eq!(table.find(&tail), Some((RegionHandle(3), 8)));
    }

    #[test]
    fn test_wider_wire_stride() {
        let data = [0u8; 6];
        let mut table = BackreferenceTable::new();
        table.record(SourceSpan::of_slice(&data, "wide", 24, false), RegionHandle(1));

        let sub = SourceSpan::of_slice(&data[1..3], "wide", 24, false);
        assert_eq!(table.find(&sub), Some((RegionHandle(1), 24)));
    }

    #[test]
    fn test_exact_spans_reject_sub_ranges() {
        let text = "abcdef";
        let mut table = BackreferenceTable::new();
        table.record(
            SourceSpan::of_slice(text.as_bytes(), "str", 1, true),
            RegionHandle(2),
        );

        let prefix = SourceSpan::of_slice(&text.as_bytes()[..3], "str", 1, true);
        assert_eq!(table.find(&prefix), None);
        let whole = SourceSpan::of_slice(text.as_bytes(), "str", 1, true);
        assert_eq!(table.find(&whole), Some((RegionHandle(2), 0)));
    }

    #[test]
    fn test_keys_do_not_alias() {
        let data = [1u8, 2];
        let mut table = BackreferenceTable::new();
        table.record(SourceSpan::of_slice(&data, "a", 1, false), RegionHandle(1));

        assert_eq!(
            table.find(&SourceSpan::of_slice(&data, "b", 1, false)),
            None
        );
    }

    #[test]
    fn test_empty_spans_are_never_recorded() {
        let data: [u16; 0] = [];
        let mut table = BackreferenceTable::new();
        table.record(SourceSpan::of_slice(&data, "u16", 2, false), RegionHandle(1));
        assert!(table.is_empty());
    }
}
