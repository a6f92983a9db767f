//! Completeness checking: does a merged map satisfy its concept?

use crate::concept::ConceptId;
use crate::error::ConceptError;
use crate::merge::Entry;
use crate::signature::{ModelId, SignatureId};
use std::collections::{BTreeMap, BTreeSet};

/// `required − provided`, sorted. Order and multiplicity of the inputs do
/// not matter.
pub fn missing_operations<'a>(
    required: impl IntoIterator<Item = &'a str>,
    provided: impl IntoIterator<Item = &'a str>,
) -> Vec<String> {
    let required: BTreeSet<&str> = required.into_iter().collect();
    let provided: BTreeSet<&str> = provided.into_iter().collect();
    required
        .difference(&provided)
        .map(|name| (*name).to_string())
        .collect()
}

/// Fail with `IncompleteMap` naming every missing operation.
pub fn check_complete<'a>(
    concept: &ConceptId,
    model: ModelId,
    required: impl IntoIterator<Item = &'a str>,
    provided: impl IntoIterator<Item = &'a str>,
) -> Result<(), ConceptError> {
    let missing = missing_operations(required, provided);
    if missing.is_empty() {
        return Ok(());
    }
    Err(ConceptError::IncompleteMap {
        concept: concept.clone(),
        model: model.name().to_string(),
        missing,
    })
}

/// Every required operation must be bound with exactly its declared signature.
pub(crate) fn check_signatures(
    concept: &ConceptId,
    model: ModelId,
    clauses: &BTreeMap<String, SignatureId>,
    entries: &BTreeMap<String, Entry>,
) -> Result<(), ConceptError> {
    for (name, expected) in clauses {
        let Some(entry) = entries.get(name) else {
            continue;
        };
        let actual = entry.implementation.signature();
        if actual != *expected {
            return Err(ConceptError::SignatureMismatch {
                concept: concept.clone(),
                model: model.name().to_string(),
                name: name.clone(),
                expected: expected.name().to_string(),
                actual: actual.name().to_string(),
            });
        }
    }
    Ok(())
}
