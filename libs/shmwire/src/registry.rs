// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Interface descriptor to stub-factory registry.
//!
//! Generated interface code registers a factory per descriptor at link time
//! with [`register_interface!`](crate::register_interface); the process-wide
//! [`global_registry`] picks those up on first access. Factories can also be
//! added at runtime with [`InterfaceRegistry::register`].

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use parking_lot::RwLock;

use crate::error::{Result, WireError};

/// A type-erased interface object: a server implementation or the stub that
/// wraps it.
pub type StubObject = Arc<dyn Any + Send + Sync>;

/// Wraps a server implementation in the stub for its interface.
pub type StubFactory = Arc<dyn Fn(StubObject) -> anyhow::Result<StubObject> + Send + Sync>;

/// Factory form usable in a `static` link-time entry.
pub type StubFactoryFn = fn(StubObject) -> anyhow::Result<StubObject>;

/// Link-time registration entry. Not for direct use; see
/// [`register_interface!`](crate::register_interface).
pub struct InterfaceRegistration {
    pub descriptor: &'static str,
    pub factory: StubFactoryFn,
}

inventory::collect!(InterfaceRegistration);

/// Registers a stub factory for an interface descriptor at link time.
///
/// ```ignore
/// shmwire::register_interface!("vendor.camera@1.0::ICamera", wrap_camera);
/// ```
#[macro_export]
macro_rules! register_interface {
    ($descriptor:expr, $factory:expr) => {
        $crate::inventory::submit! {
            $crate::registry::InterfaceRegistration {
                descriptor: $descriptor,
                factory: $factory,
            }
        }
    };
}

#[derive(Default)]
pub struct InterfaceRegistry {
    factories: RwLock<HashMap<String, StubFactory>>,
}

static GLOBAL_REGISTRY: LazyLock<InterfaceRegistry> = LazyLock::new(|| {
    let registry = InterfaceRegistry::new();
    for registration in inventory::iter::<InterfaceRegistration> {
        if let Err(e) = registry.register(registration.descriptor, registration.factory) {
            tracing::warn!("[InterfaceRegistry] Skipping link-time registration: {}", e);
        }
    }
    tracing::info!(
        "[InterfaceRegistry] {} interface(s) registered at startup",
        registry.len()
    );
    registry
});

/// The process-wide registry, seeded from link-time registrations.
pub fn global_registry() -> &'static InterfaceRegistry {
    &GLOBAL_REGISTRY
}

impl InterfaceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&self, descriptor: &str, factory: F) -> Result<()>
    where
        F: Fn(StubObject) -> anyhow::Result<StubObject> + Send + Sync + 'static,
    {
        let mut factories = self.factories.write();
        if factories.contains_key(descriptor) {
            return Err(WireError::Configuration(format!(
                "Interface '{}' is already registered",
                descriptor
            )));
        }
        factories.insert(descriptor.to_string(), Arc::new(factory));
        tracing::debug!("[InterfaceRegistry] Registered '{}'", descriptor);
        Ok(())
    }

    pub fn unregister(&self, descriptor: &str) -> bool {
        self.factories.write().remove(descriptor).is_some()
    }

    pub fn lookup(&self, descriptor: &str) -> Option<StubFactory> {
        self.factories.read().get(descriptor).cloned()
    }

    pub fn contains(&self, descriptor: &str) -> bool {
        self.factories.read().contains_key(descriptor)
    }

    /// Wraps `implementation` in the stub registered for `descriptor`.
    pub fn construct(&self, descriptor: &str, implementation: StubObject) -> Result<StubObject> {
        let factory = self.lookup(descriptor).ok_or_else(|| {
            WireError::Configuration(format!("No stub registered for '{}'", descriptor))
        })?;
        Ok(factory(implementation)?)
    }

    pub fn len(&self) -> usize {
        self.factories.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn descriptors(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.read().keys().cloned().collect();
        names.sort();
        names
    }
}
