// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Shared-memory ring-buffer descriptors.

mod descriptor;
mod grantor;
mod mapping;

pub use descriptor::{POSITION_SIZE, QueueDescriptor, QueueFlavor};
pub use grantor::GrantorDescriptor;
pub use mapping::{MappedRegion, page_size};
