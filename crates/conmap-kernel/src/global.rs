//! Process-wide registry slot.
//!
//! Populate a [`RegistryBuilder`] during single-threaded startup, then
//! [`install`] it once. Afterwards any thread may resolve maps through
//! [`concept_map`] without further coordination.

use crate::concept::ConceptId;
use crate::concept_map::ConceptMap;
use crate::error::ConceptError;
use crate::registry::{Registry, RegistryBuilder};
use std::sync::{Arc, OnceLock};

static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Seal `builder` and make it the process registry.
///
/// With the default config every registered map is resolved first, so an
/// incomplete map leaves the slot empty.
pub fn install(builder: RegistryBuilder) -> Result<&'static Registry, ConceptError> {
    if REGISTRY.get().is_some() {
        return Err(ConceptError::AlreadyInstalled);
    }
    let registry = builder.seal()?;
    REGISTRY
        .set(registry)
        .map_err(|_| ConceptError::AlreadyInstalled)?;
    REGISTRY.get().ok_or(ConceptError::NotInstalled)
}

pub fn registry() -> Result<&'static Registry, ConceptError> {
    REGISTRY.get().ok_or(ConceptError::NotInstalled)
}

pub fn is_installed() -> bool {
    REGISTRY.get().is_some()
}

/// Resolve (concept, `T`) against the process registry.
pub fn concept_map<T: ?Sized + 'static>(
    concept: impl Into<ConceptId>,
) -> Result<Arc<ConceptMap>, ConceptError> {
    registry()?.concept_map_for::<T>(concept)
}
