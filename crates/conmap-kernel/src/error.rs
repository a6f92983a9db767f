//! Error types for concept-map resolution.
//!
//! Every variant signals an invalid static configuration. None is retried or
//! recovered internally; callers are expected to abort startup.

use crate::concept::ConceptId;
use std::fmt;

pub mod failure_class {
    pub const DEFINITION_CYCLE: &str = "concept_graph.cycle";
    pub const UNKNOWN_CONCEPT: &str = "concept_graph.unknown_concept";
    pub const DUPLICATE_CLAUSE: &str = "concept_graph.duplicate_clause";
    pub const CLAUSE_CONFLICT: &str = "concept_graph.clause_conflict";
    pub const DUPLICATE_DEFINITION: &str = "registry.duplicate_definition";
    pub const DUPLICATE_BINDING: &str = "bindings.duplicate_name";
    pub const INCOMPLETE_MAP: &str = "concept_map.incomplete";
    pub const AMBIGUOUS_OPERATION: &str = "concept_map.ambiguous_operation";
    pub const SIGNATURE_MISMATCH: &str = "concept_map.signature_mismatch";
    pub const MISSING_OPERATION: &str = "concept_map.missing_operation";
    pub const UNDECLARED_OPERATION: &str = "concept_map.undeclared_operation";
    pub const REGISTRY_SLOT: &str = "registry.global_slot";
}

/// What a duplicate registration collided on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefinitionKind {
    Concept,
    DefaultMap,
    CustomMap,
}

impl fmt::Display for DefinitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Concept => "concept",
            Self::DefaultMap => "default concept map",
            Self::CustomMap => "concept map",
        })
    }
}

fn render_path(path: &[ConceptId]) -> String {
    path.iter()
        .map(ConceptId::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}

fn render_model(model: &Option<String>) -> String {
    model.as_deref().map(|m| format!(" / {m}")).unwrap_or_default()
}

fn join_names(names: &[String]) -> String {
    names.join(", ")
}

/// Errors raised while defining concepts, registering maps, or resolving them.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConceptError {
    /// The refinement relation has a cycle. `path` starts and ends on the
    /// same concept.
    #[error("refinement cycle: {}", render_path(.path))]
    DefinitionCycle { path: Vec<ConceptId> },

    /// A concept was referenced but never defined.
    #[error("unknown concept {concept} (referenced by {referenced_by})")]
    UnknownConcept {
        concept: ConceptId,
        referenced_by: String,
    },

    /// One descriptor declares the same operation twice.
    #[error("concept {concept} declares operation `{name}` more than once")]
    DuplicateClause { concept: ConceptId, name: String },

    /// An operation is required with two different signatures.
    #[error(
        "concept {concept} requires `{name}` as both `{first}` and `{second}` \
         across its refinements"
    )]
    ClauseConflict {
        concept: ConceptId,
        name: String,
        first: String,
        second: String,
    },

    /// A second definition for an existing key.
    #[error(
        "duplicate {kind} for {concept}{}: first defined at {first}, again at {second}",
        render_model(.model)
    )]
    DuplicateDefinition {
        kind: DefinitionKind,
        concept: ConceptId,
        model: Option<String>,
        first: String,
        second: String,
    },

    /// One binding set names the same operation twice.
    #[error("operation `{name}` is bound more than once in {origin}")]
    DuplicateBinding { name: String, origin: String },

    /// The merged map does not cover every required operation.
    #[error(
        "incomplete concept map for {concept} / {model}: missing {}",
        join_names(.missing)
    )]
    IncompleteMap {
        concept: ConceptId,
        model: String,
        missing: Vec<String>,
    },

    /// Two refined concepts supply different implementations of one name.
    #[error(
        "ambiguous operation `{name}` for {concept} / {model}: provided by both {first} and {second}"
    )]
    AmbiguousOperation {
        concept: ConceptId,
        model: String,
        name: String,
        first: ConceptId,
        second: ConceptId,
    },

    /// An implementation does not have the signature the concept declares.
    #[error(
        "signature mismatch for `{name}` in {concept} / {model}: expected `{expected}`, got `{actual}`"
    )]
    SignatureMismatch {
        concept: ConceptId,
        model: String,
        name: String,
        expected: String,
        actual: String,
    },

    /// Lookup of a name that is not in a built map.
    #[error(
        "concept map for {concept} / {model} has no operation `{name}` (available: {})",
        join_names(.available)
    )]
    MissingOperation {
        concept: ConceptId,
        model: String,
        name: String,
        available: Vec<String>,
    },

    /// Erasure requested for a name the concept does not declare.
    #[error("concept {concept} declares no operation `{name}`")]
    UndeclaredOperation { concept: ConceptId, name: String },

    #[error("a process-wide registry is already installed")]
    AlreadyInstalled,

    #[error("no process-wide registry is installed")]
    NotInstalled,
}

impl ConceptError {
    /// Stable class used in reports.
    pub fn failure_class(&self) -> &'static str {
        match self {
            Self::DefinitionCycle { .. } => failure_class::DEFINITION_CYCLE,
            Self::UnknownConcept { .. } => failure_class::UNKNOWN_CONCEPT,
            Self::DuplicateClause { .. } => failure_class::DUPLICATE_CLAUSE,
            Self::ClauseConflict { .. } => failure_class::CLAUSE_CONFLICT,
            Self::DuplicateDefinition { .. } => failure_class::DUPLICATE_DEFINITION,
            Self::DuplicateBinding { .. } => failure_class::DUPLICATE_BINDING,
            Self::IncompleteMap { .. } => failure_class::INCOMPLETE_MAP,
            Self::AmbiguousOperation { .. } => failure_class::AMBIGUOUS_OPERATION,
            Self::SignatureMismatch { .. } => failure_class::SIGNATURE_MISMATCH,
            Self::MissingOperation { .. } => failure_class::MISSING_OPERATION,
            Self::UndeclaredOperation { .. } => failure_class::UNDECLARED_OPERATION,
            Self::AlreadyInstalled | Self::NotInstalled => failure_class::REGISTRY_SLOT,
        }
    }
}
