//! Concept descriptors.
//!
//! A concept names a set of required operations (clauses) and the concepts it
//! refines. Descriptors are plain data; the transitive view lives in
//! [`crate::graph::ConceptGraph`] once every descriptor is known.

use crate::error::ConceptError;
use crate::signature::{Signature, SignatureId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Identity of a concept.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConceptId(pub String);

impl ConceptId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ConceptId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ConceptId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ConceptId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&ConceptId> for ConceptId {
    fn from(id: &ConceptId) -> Self {
        id.clone()
    }
}

/// One required operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clause {
    pub name: String,
    pub signature: SignatureId,
}

impl Clause {
    pub fn new<S: Signature>(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            signature: SignatureId::of::<S>(),
        }
    }
}

/// A concept as declared: its own clauses plus the concepts it refines, in
/// declaration order.
#[derive(Debug, Clone)]
pub struct ConceptDescriptor {
    id: ConceptId,
    own_clauses: BTreeMap<String, SignatureId>,
    refined: Vec<ConceptId>,
    duplicate_clauses: Vec<String>,
}

impl ConceptDescriptor {
    pub fn new(id: impl Into<ConceptId>) -> Self {
        Self {
            id: id.into(),
            own_clauses: BTreeMap::new(),
            refined: Vec::new(),
            duplicate_clauses: Vec::new(),
        }
    }

    /// Require operation `name` with signature `S`.
    pub fn requires<S: Signature>(self, name: impl Into<String>) -> Self {
        self.requires_clause(Clause::new::<S>(name))
    }

    pub fn requires_clause(mut self, clause: Clause) -> Self {
        if self.own_clauses.contains_key(&clause.name) {
            self.duplicate_clauses.push(clause.name);
        } else {
            self.own_clauses.insert(clause.name, clause.signature);
        }
        self
    }

    /// Refine another concept. Repeating a refinement is a no-op.
    pub fn refines(mut self, concept: impl Into<ConceptId>) -> Self {
        let concept = concept.into();
        if !self.refined.contains(&concept) {
            self.refined.push(concept);
        }
        self
    }

    pub fn id(&self) -> &ConceptId {
        &self.id
    }

    pub fn own_clauses(&self) -> &BTreeMap<String, SignatureId> {
        &self.own_clauses
    }

    pub fn refined_concepts(&self) -> &[ConceptId] {
        &self.refined
    }

    pub(crate) fn validate(&self) -> Result<(), ConceptError> {
        match self.duplicate_clauses.first() {
            Some(name) => Err(ConceptError::DuplicateClause {
                concept: self.id.clone(),
                name: name.clone(),
            }),
            None => Ok(()),
        }
    }
}
