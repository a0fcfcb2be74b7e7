// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Wire-format and shared-memory-descriptor runtime for cross-process
//! interfaces.
//!
//! Two pieces carry the weight:
//!
//! - [`codec`]: writes graphs of variable-length values into a flat
//!   [`Transport`] using (parent region, byte offset) coordinates, writing
//!   each source object once and emitting backreferences for repeats.
//! - [`queue`]: the [`QueueDescriptor`] that tells two processes where the
//!   read counter, write counter and data region of a ring buffer live inside
//!   shared memory.
//!
//! Everything else ([`buffers`], [`handle`], [`memory`], [`status`],
//! [`version`]) is a wire value those two move around.

#![cfg(unix)]

pub mod buffers;
pub mod codec;
pub mod config;
pub mod error;
pub mod handle;
pub mod instrumentation;
pub mod logging;
pub mod memory;
pub mod queue;
pub mod registry;
pub mod status;
pub mod task_runner;
pub mod version;

pub use buffers::{FixedBuffer, OwnedBuffer, WireString};
pub use codec::{
    ChildHandle, Decoder, Encoder, InProcessTransport, RegionHandle, Transport, WireType,
};
pub use config::WireConfig;
pub use error::{Result, WireError};
pub use handle::HandleResource;
pub use instrumentation::{
    CallSite, InstrumentationEvent, InstrumentationHookProvider, Instrumentor, TracingHookProvider,
};
#[cfg(target_os = "linux")]
pub use memory::MemfdAllocator;
pub use memory::SharedMemory;
pub use queue::{GrantorDescriptor, MappedRegion, QueueDescriptor, QueueFlavor};
pub use registry::{
    InterfaceRegistration, InterfaceRegistry, StubFactory, StubFactoryFn, StubObject,
    global_registry,
};
pub use status::{ExceptionCode, Status};
pub use task_runner::{BoundedTaskQueue, TaskRunner};
pub use version::InterfaceVersion;

#[doc(hidden)]
pub use inventory;
