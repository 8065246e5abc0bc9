//! Mode → capability dispatch table.
//!
//! Populated at startup, then sealed. Lookups take a shared read lock and
//! never block each other.

mod capability;
mod schema;

pub use capability::{AgentCapability, AgentError, AgentHandler, JobContext, RetryPolicy};
pub use schema::{FieldKind, InputSchema};

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use cee_core::Mode;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::errors::RegistryError;

/// What a `register` call did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Registration {
    /// No capability existed for the mode.
    Inserted,
    /// An identical capability was already present.
    Unchanged,
    /// A different capability was overwritten.
    Replaced,
}

/// Registry of agent capabilities keyed by mode.
#[derive(Default)]
pub struct AgentRegistry {
    capabilities: RwLock<HashMap<Mode, Arc<AgentCapability>>>,
    sealed: AtomicBool,
}

impl AgentRegistry {
    /// Create an empty, unsealed registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a capability.
    ///
    /// Re-registering an identical capability is a no-op; a different one for
    /// the same mode replaces the old entry with a warning.
    pub fn register(&self, capability: AgentCapability) -> Result<Registration, RegistryError> {
        let mode = capability.mode;
        if mode == Mode::Unknown {
            return Err(RegistryError::UnknownMode);
        }
        if self.is_sealed() {
            return Err(RegistryError::Sealed(mode));
        }

        let mut caps = self.capabilities.write();
        match caps.get(&mode) {
            Some(existing) if existing.same_as(&capability) => {
                debug!(%mode, "capability already registered");
                Ok(Registration::Unchanged)
            }
            Some(_) => {
                warn!(%mode, roles = %capability.required_roles, "replacing registered capability");
                let _ = caps.insert(mode, Arc::new(capability));
                Ok(Registration::Replaced)
            }
            None => {
                info!(%mode, roles = %capability.required_roles, "capability registered");
                let _ = caps.insert(mode, Arc::new(capability));
                Ok(Registration::Inserted)
            }
        }
    }

    /// Capability for `mode`, if any. `unknown` never resolves.
    pub fn lookup(&self, mode: Mode) -> Option<Arc<AgentCapability>> {
        self.capabilities.read().get(&mode).cloned()
    }

    /// End the startup phase; later `register` calls fail.
    pub fn seal(&self) {
        if !self.sealed.swap(true, Ordering::AcqRel) {
            info!(modes = self.len(), "agent registry sealed");
        }
    }

    /// Whether the registry has been sealed.
    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::Acquire)
    }

    /// Registered modes in stable order.
    pub fn modes(&self) -> Vec<Mode> {
        let mut modes: Vec<Mode> = self.capabilities.read().keys().copied().collect();
        modes.sort();
        modes
    }

    /// Number of registered capabilities.
    pub fn len(&self) -> usize {
        self.capabilities.read().len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.capabilities.read().is_empty()
    }
}
