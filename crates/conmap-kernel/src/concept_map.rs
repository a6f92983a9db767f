//! Resolved concept maps.
//!
//! A [`ConceptMap`] is the verified binding of every operation a concept
//! requires, for one model type. It is immutable once built and normally
//! shared as `Arc<ConceptMap>` out of the registry cache.
//!
//! A [`DefaultConceptMap`] has the same layout without the coverage
//! guarantee; it only ever feeds a merge.

use crate::bindings::Implementation;
use crate::concept::ConceptId;
use crate::erase::ErasedFn;
use crate::error::ConceptError;
use crate::merge::{Entry, Provenance};
use crate::signature::{ModelId, Signature, SignatureId};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// One row of a map summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationRow {
    pub name: String,
    pub signature: String,
    pub provenance: Provenance,
    pub shape: String,
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConceptMapSummary {
    pub concept: ConceptId,
    pub model: String,
    pub fingerprint: String,
    pub operations: Vec<OperationRow>,
}

/// A complete, coverage-verified concept map.
#[derive(Debug, Clone)]
pub struct ConceptMap {
    concept: ConceptId,
    model: ModelId,
    clauses: BTreeMap<String, SignatureId>,
    entries: BTreeMap<String, Entry>,
}

impl ConceptMap {
    /// Callers guarantee `entries` covers `clauses` with matching signatures.
    pub(crate) fn new(
        concept: ConceptId,
        model: ModelId,
        clauses: BTreeMap<String, SignatureId>,
        entries: BTreeMap<String, Entry>,
    ) -> Self {
        Self {
            concept,
            model,
            clauses,
            entries,
        }
    }

    pub fn concept(&self) -> &ConceptId {
        &self.concept
    }

    pub fn model(&self) -> ModelId {
        self.model
    }

    /// The implementation bound to `name`.
    ///
    /// Always succeeds for operations the concept requires. Any other name
    /// that was not bound fails with `MissingOperation`.
    pub fn get(&self, name: &str) -> Result<&Implementation, ConceptError> {
        self.entries
            .get(name)
            .map(|entry| &entry.implementation)
            .ok_or_else(|| ConceptError::MissingOperation {
                concept: self.concept.clone(),
                model: self.model.name().to_string(),
                name: name.to_string(),
                available: self.entries.keys().cloned().collect(),
            })
    }

    /// `name`'s implementation erased to the concept's declared signature.
    ///
    /// `S` must be that declared signature. An unbound name fails as in
    /// [`Self::get`].
    pub fn erased<S: Signature>(&self, name: &str) -> Result<ErasedFn<S>, ConceptError> {
        let implementation = self.get(name)?;
        let declared = self
            .clauses
            .get(name)
            .copied()
            .ok_or_else(|| ConceptError::UndeclaredOperation {
                concept: self.concept.clone(),
                name: name.to_string(),
            })?;
        let mismatch = |actual: SignatureId| ConceptError::SignatureMismatch {
            concept: self.concept.clone(),
            model: self.model.name().to_string(),
            name: name.to_string(),
            expected: declared.name().to_string(),
            actual: actual.name().to_string(),
        };
        if !declared.is::<S>() {
            return Err(mismatch(SignatureId::of::<S>()));
        }
        implementation
            .erased::<S>()
            .ok_or_else(|| mismatch(implementation.signature()))
    }

    /// Look up, erase, and invoke in one step.
    pub fn call<S: Signature>(
        &self,
        name: &str,
        args: S::Args,
    ) -> Result<S::Output, ConceptError> {
        Ok(self.erased::<S>(name)?.call(args))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn provenance(&self, name: &str) -> Option<&Provenance> {
        self.entries.get(name).map(|entry| &entry.provenance)
    }

    /// Every operation the concept requires, with its declared signature.
    pub fn clauses(&self) -> &BTreeMap<String, SignatureId> {
        &self.clauses
    }

    pub(crate) fn entries(&self) -> &BTreeMap<String, Entry> {
        &self.entries
    }

    /// Content hash of the map layout: names, signatures, and provenance.
    ///
    /// Excludes implementation identity, so two builds from the same inputs
    /// hash equally.
    pub fn fingerprint(&self) -> String {
        layout_fingerprint(&self.concept, self.model, &self.entries)
    }

    pub fn summary(&self) -> ConceptMapSummary {
        summarize(&self.concept, self.model, &self.entries, &self.clauses)
    }
}

/// A possibly partial map used only as merge input.
#[derive(Debug, Clone)]
pub struct DefaultConceptMap {
    concept: ConceptId,
    model: ModelId,
    entries: BTreeMap<String, Entry>,
}

impl DefaultConceptMap {
    pub(crate) fn new(
        concept: ConceptId,
        model: ModelId,
        entries: BTreeMap<String, Entry>,
    ) -> Self {
        Self {
            concept,
            model,
            entries,
        }
    }

    pub fn concept(&self) -> &ConceptId {
        &self.concept
    }

    pub fn model(&self) -> ModelId {
        self.model
    }

    pub fn get(&self, name: &str) -> Option<&Implementation> {
        self.entries.get(name).map(|entry| &entry.implementation)
    }

    pub fn provenance(&self, name: &str) -> Option<&Provenance> {
        self.entries.get(name).map(|entry| &entry.provenance)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn entries(&self) -> &BTreeMap<String, Entry> {
        &self.entries
    }

    pub fn fingerprint(&self) -> String {
        layout_fingerprint(&self.concept, self.model, &self.entries)
    }
}

fn layout_fingerprint(
    concept: &ConceptId,
    model: ModelId,
    entries: &BTreeMap<String, Entry>,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"concept:");
    hasher.update(concept.as_str().as_bytes());
    hasher.update(b"\nmodel:");
    hasher.update(model.name().as_bytes());
    hasher.update(b"\n");
    for (name, entry) in entries {
        hasher.update(name.as_bytes());
        hasher.update(b":");
        hasher.update(entry.implementation.signature().name().as_bytes());
        hasher.update(b":");
        hasher.update(entry.provenance.to_string().as_bytes());
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}

fn summarize(
    concept: &ConceptId,
    model: ModelId,
    entries: &BTreeMap<String, Entry>,
    clauses: &BTreeMap<String, SignatureId>,
) -> ConceptMapSummary {
    ConceptMapSummary {
        concept: concept.clone(),
        model: model.name().to_string(),
        fingerprint: layout_fingerprint(concept, model, entries),
        operations: entries
            .iter()
            .map(|(name, entry)| OperationRow {
                name: name.clone(),
                signature: entry.implementation.signature().name().to_string(),
                provenance: entry.provenance.clone(),
                shape: entry.implementation.shape().to_string(),
                required: clauses.contains_key(name),
            })
            .collect(),
    }
}
