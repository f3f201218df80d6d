//! # Execution Context
//!
//! The persistent namespace pair statements evaluate in. It outlives any
//! single statement: bindings made by one submission are visible to every
//! later one, until the engine stops and the context is dropped.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::instance::RuntimeInstance;
use crate::script::namespace::{Namespace, NamespaceRef};

/// Global/local scope pair on top of a booted runtime. `global` is the
/// runtime's top level; `local` chains to it, so lookups walk outward
/// while definitions always land in the innermost scope.
pub struct ExecutionContext {
    global: NamespaceRef,
    local: NamespaceRef,
    created_at: DateTime<Utc>,
}

impl ExecutionContext {
    /// Creates a fresh context on `instance`'s top level. Nothing from an
    /// earlier context carries over.
    pub fn create(instance: &RuntimeInstance) -> Self {
        let global = instance.top_level();
        let local = Namespace::with_parent(global.clone());
        let created_at = Utc::now();
        debug!(%created_at, "created execution context");
        Self {
            global,
            local,
            created_at,
        }
    }

    pub(crate) fn local(&self) -> &NamespaceRef {
        &self.local
    }

    /// Handle to the runtime's top-level namespace this context is bound to.
    pub fn global(&self) -> &NamespaceRef {
        &self.global
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}
