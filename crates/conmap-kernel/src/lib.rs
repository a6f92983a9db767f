//! # Concept-map kernel
//!
//! Resolves how a model type implements a concept (a named set of required
//! operations, possibly refining other concepts) and turns the resolved
//! bindings into uniform entries for a dispatch table.
//!
//! Every check runs ahead of dynamic use: the concept graph is validated when
//! the registry is sealed, and each concept map is verified complete the first
//! time it is resolved.
//!
//! ## Architecture
//!
//! ```text
//! Signature / ModelId     ← fn-pointer signatures, model type identity
//!     │
//! ConceptDescriptor       ← own clauses + ordered refinements
//!     │
//! ConceptGraph            ← acyclic, closed; memoized all_clauses
//!     │
//! RegistryBuilder         ← concepts, default maps, custom maps (init phase)
//!     │ seal
//! Registry                ← merge → completeness → ConceptMap (once per key)
//!     │
//! ConceptMap::erased      ← ErasedFn<S>: one entry type per signature
//! ```
//!
//! ## Example
//!
//! ```
//! use conmap_kernel::{Bindings, ConceptDescriptor, RegistryBuilder};
//!
//! struct Foo;
//!
//! let mut builder = RegistryBuilder::new();
//! builder.define_concept(ConceptDescriptor::new("Greet").requires::<fn() -> i32>("hello"))?;
//! builder.define_concept(
//!     ConceptDescriptor::new("Loud").requires::<fn() -> i32>("shout").refines("Greet"),
//! )?;
//! builder.register_custom_for::<Foo>("Greet", Bindings::new().bind_fn::<fn() -> i32>("hello", || 1))?;
//! builder.register_custom_for::<Foo>("Loud", Bindings::new().bind_fn::<fn() -> i32>("shout", || 2))?;
//! let registry = builder.seal()?;
//!
//! let loud = registry.concept_map_for::<Foo>("Loud")?;
//! assert_eq!(loud.call::<fn() -> i32>("hello", ())?, 1);
//! assert_eq!(loud.call::<fn() -> i32>("shout", ())?, 2);
//! # Ok::<(), conmap_kernel::ConceptError>(())
//! ```

pub mod bindings;
pub mod completeness;
pub mod concept;
pub mod concept_map;
pub mod config;
pub mod erase;
pub mod error;
pub mod global;
pub mod graph;
pub mod merge;
pub mod preflight;
pub mod registry;
pub mod signature;

pub use bindings::{Bindings, Implementation};
pub use completeness::{check_complete, missing_operations};
pub use concept::{Clause, ConceptDescriptor, ConceptId};
pub use concept_map::{ConceptMap, ConceptMapSummary, DefaultConceptMap, OperationRow};
pub use config::{ConfigError, DiamondPolicy, ResolverConfig};
pub use erase::{ErasedFn, Implements, erase, erase_fn};
pub use error::{ConceptError, DefinitionKind};
pub use graph::{ConceptGraph, ResolvedConcept};
pub use merge::Provenance;
pub use preflight::{PreflightFailure, PreflightReport};
pub use registry::{FamilyPredicate, MapKey, Registry, RegistryBuilder, Source};
pub use signature::{ModelId, Signature, SignatureId};
