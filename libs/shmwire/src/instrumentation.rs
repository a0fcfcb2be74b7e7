// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Hooks fired around interface calls for profilers and tracers.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;

use crate::config::InstrumentationConfig;
use crate::version::InterfaceVersion;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InstrumentationEvent {
    ServerApiEntry,
    ServerApiExit,
    ClientApiEntry,
    ClientApiExit,
    SyncCallbackEntry,
    SyncCallbackExit,
    AsyncCallbackEntry,
    AsyncCallbackExit,
    PassthroughEntry,
    PassthroughExit,
}

impl InstrumentationEvent {
    pub fn is_entry(self) -> bool {
        matches!(
            self,
            Self::ServerApiEntry
                | Self::ClientApiEntry
                | Self::SyncCallbackEntry
                | Self::AsyncCallbackEntry
                | Self::PassthroughEntry
        )
    }
}

/// The method an event belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CallSite<'a> {
    pub package: &'a str,
    pub version: InterfaceVersion,
    pub interface: &'a str,
    pub method: &'a str,
}

impl fmt::Display for CallSite<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{}::{}::{}",
            self.package, self.version, self.interface, self.method
        )
    }
}

/// Receives instrumentation events. `args` are the call's arguments on entry
/// and its results on exit.
pub trait InstrumentationHookProvider: Send + Sync {
    /// Whether this provider wants events for `package`.
    fn accepts(&self, _package: &str) -> bool {
        true
    }

    fn dispatch(&self, event: InstrumentationEvent, site: &CallSite<'_>, args: &[&dyn Any]);
}

/// Fans events out to registered providers while enabled.
pub struct Instrumentor {
    providers: RwLock<Vec<Arc<dyn InstrumentationHookProvider>>>,
    enabled: AtomicBool,
    prefix: String,
}

impl Instrumentor {
    /// A disabled instrumentor with no providers.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            providers: RwLock::new(Vec::new()),
            enabled: AtomicBool::new(false),
            prefix: prefix.into(),
        }
    }

    pub fn from_config(config: &InstrumentationConfig) -> Self {
        let instrumentor = Self::new(config.prefix.clone());
        instrumentor.set_enabled(config.enabled);
        instrumentor
    }

    pub fn register(&self, provider: Arc<dyn InstrumentationHookProvider>) {
        let mut providers = self.providers.write();
        providers.push(provider);
        tracing::debug!(
            "[Instrumentor] Registered provider ({} total)",
            providers.len()
        );
    }

    pub fn provider_count(&self) -> usize {
        self.providers.read().len()
    }

    pub fn set_enabled(&self, enabled: bool) {
        if self.enabled.swap(enabled, Ordering::AcqRel) != enabled {
            tracing::info!(
                "[Instrumentor] {} instrumentation",
                if enabled { "Enable" } else { "Disable" }
            );
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Sends `event` to every provider that accepts `site.package`. No-op
    /// while disabled.
    pub fn dispatch(&self, event: InstrumentationEvent, site: &CallSite<'_>, args: &[&dyn Any]) {
        if !self.is_enabled() {
            return;
        }
        for provider in self.providers.read().iter() {
            if provider.accepts(site.package) {
                provider.dispatch(event, site, args);
            }
        }
    }
}

/// Logs each event at `trace` level.
#[derive(Debug, Default)]
pub struct TracingHookProvider {
    prefix: String,
}

impl TracingHookProvider {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl InstrumentationHookProvider for TracingHookProvider {
    fn dispatch(&self, event: InstrumentationEvent, site: &CallSite<'_>, args: &[&dyn Any]) {
        tracing::trace!(
            "[{}] {:?} {} ({} args)",
            self.prefix,
            event,
            site,
            args.len()
        );
    }
}
