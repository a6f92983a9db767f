//! The merge engine.
//!
//! Sources are folded in precedence order; a name already present is never
//! replaced:
//!
//! ```text
//! explicit bindings
//!   ▸ default map for (C, T)
//!     ▸ resolved map of C.refined[0]
//!       ▸ resolved map of C.refined[1]
//!         ▸ …
//! ```
//!
//! Two refined concepts offering *different* implementations for a name that
//! is still unbound form a diamond conflict, settled by [`DiamondPolicy`].

use crate::bindings::{Bindings, Implementation};
use crate::concept::ConceptId;
use crate::config::DiamondPolicy;
use crate::error::ConceptError;
use crate::signature::ModelId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, trace};

/// Which source a merged binding came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "concept", rename_all = "snake_case")]
pub enum Provenance {
    Explicit,
    Default,
    Refined(ConceptId),
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Explicit => f.write_str("explicit"),
            Self::Default => f.write_str("default"),
            Self::Refined(concept) => write!(f, "refined:{concept}"),
        }
    }
}

/// A merged binding.
#[derive(Debug, Clone)]
pub struct Entry {
    pub implementation: Implementation,
    pub provenance: Provenance,
}

/// Accumulator for one merge.
pub(crate) struct Merge<'a> {
    concept: &'a ConceptId,
    model: ModelId,
    policy: DiamondPolicy,
    entries: BTreeMap<String, Entry>,
}

impl<'a> Merge<'a> {
    /// Start from the explicit bindings of the build call.
    pub(crate) fn new(
        concept: &'a ConceptId,
        model: ModelId,
        policy: DiamondPolicy,
        explicit: Bindings,
    ) -> Self {
        let entries = explicit
            .into_entries()
            .into_iter()
            .map(|(name, implementation)| {
                (
                    name,
                    Entry {
                        implementation,
                        provenance: Provenance::Explicit,
                    },
                )
            })
            .collect();
        Self {
            concept,
            model,
            policy,
            entries,
        }
    }

    /// Fold in a lower-precedence source.
    pub(crate) fn absorb<'s>(
        &mut self,
        source: impl IntoIterator<Item = (&'s str, &'s Implementation)>,
        provenance: &Provenance,
    ) -> Result<(), ConceptError> {
        for (name, implementation) in source {
            let Some(existing) = self.entries.get(name) else {
                self.entries.insert(
                    name.to_string(),
                    Entry {
                        implementation: implementation.clone(),
                        provenance: provenance.clone(),
                    },
                );
                continue;
            };
            if existing.implementation.same_as(implementation) {
                continue;
            }
            match (&existing.provenance, provenance) {
                (Provenance::Refined(first), Provenance::Refined(second)) => match self.policy {
                    DiamondPolicy::FirstDeclared => debug!(
                        concept = %self.concept,
                        model = %self.model,
                        operation = name,
                        kept = %first,
                        dropped = %second,
                        "diamond conflict settled by declaration order"
                    ),
                    DiamondPolicy::Reject => {
                        return Err(ConceptError::AmbiguousOperation {
                            concept: self.concept.clone(),
                            model: self.model.name().to_string(),
                            name: name.to_string(),
                            first: first.clone(),
                            second: second.clone(),
                        });
                    }
                },
                (kept, _) => trace!(
                    concept = %self.concept,
                    model = %self.model,
                    operation = name,
                    kept = %kept,
                    shadowed = %provenance,
                    "binding shadowed"
                ),
            }
        }
        Ok(())
    }

    pub(crate) fn finish(self) -> BTreeMap<String, Entry> {
        self.entries
    }
}
