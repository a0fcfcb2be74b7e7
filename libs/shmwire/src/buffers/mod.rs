// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Variable-length and fixed-size wire values.

mod fixed_buffer;
mod owned_buffer;
mod wire_string;

pub use fixed_buffer::FixedBuffer;
pub use owned_buffer::{MAX_ELEMENTS, OwnedBuffer};
pub use wire_string::WireString;
