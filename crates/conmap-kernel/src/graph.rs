//! The fixed concept graph.
//!
//! Built once from every descriptor in the program. Resolution rejects
//! unknown references and refinement cycles, and memoizes each concept's
//! transitive clause set so merges never walk the graph again.

use crate::concept::{ConceptDescriptor, ConceptId};
use crate::error::{ConceptError, DefinitionKind};
use crate::signature::SignatureId;
use std::collections::BTreeMap;

/// A descriptor together with its memoized transitive clauses.
#[derive(Debug, Clone)]
pub struct ResolvedConcept {
    descriptor: ConceptDescriptor,
    all_clauses: BTreeMap<String, SignatureId>,
}

impl ResolvedConcept {
    pub fn id(&self) -> &ConceptId {
        self.descriptor.id()
    }

    pub fn own_clauses(&self) -> &BTreeMap<String, SignatureId> {
        self.descriptor.own_clauses()
    }

    pub fn refined_concepts(&self) -> &[ConceptId] {
        self.descriptor.refined_concepts()
    }

    /// Own clauses plus every clause of every transitively refined concept,
    /// deduplicated by name.
    pub fn all_clauses(&self) -> &BTreeMap<String, SignatureId> {
        &self.all_clauses
    }

    /// Declared signature of `name`, wherever in the refinement tree it comes from.
    pub fn signature(&self, name: &str) -> Option<SignatureId> {
        self.all_clauses.get(name).copied()
    }
}

/// An acyclic, closed set of concepts.
#[derive(Debug, Clone, Default)]
pub struct ConceptGraph {
    concepts: BTreeMap<ConceptId, ResolvedConcept>,
}

impl ConceptGraph {
    /// Validate and resolve a complete set of descriptors.
    pub fn resolve(
        descriptors: impl IntoIterator<Item = ConceptDescriptor>,
    ) -> Result<Self, ConceptError> {
        let mut declared: BTreeMap<ConceptId, (usize, ConceptDescriptor)> = BTreeMap::new();
        for (idx, descriptor) in descriptors.into_iter().enumerate() {
            descriptor.validate()?;
            if let Some((first, _)) = declared.get(descriptor.id()) {
                return Err(ConceptError::DuplicateDefinition {
                    kind: DefinitionKind::Concept,
                    concept: descriptor.id().clone(),
                    model: None,
                    first: format!("descriptor #{first}"),
                    second: format!("descriptor #{idx}"),
                });
            }
            declared.insert(descriptor.id().clone(), (idx, descriptor));
        }
        let declared: BTreeMap<ConceptId, ConceptDescriptor> = declared
            .into_iter()
            .map(|(id, (_, descriptor))| (id, descriptor))
            .collect();

        for descriptor in declared.values() {
            for refined in descriptor.refined_concepts() {
                if !declared.contains_key(refined) {
                    return Err(ConceptError::UnknownConcept {
                        concept: refined.clone(),
                        referenced_by: format!("concept {}", descriptor.id()),
                    });
                }
            }
        }

        let mut closed: BTreeMap<ConceptId, BTreeMap<String, SignatureId>> = BTreeMap::new();
        let mut stack = Vec::new();
        for id in declared.keys() {
            close_clauses(id, &declared, &mut closed, &mut stack)?;
        }

        let concepts = declared
            .into_iter()
            .map(|(id, descriptor)| {
                let all_clauses = closed.remove(&id).unwrap_or_default();
                (
                    id,
                    ResolvedConcept {
                        descriptor,
                        all_clauses,
                    },
                )
            })
            .collect();
        Ok(Self { concepts })
    }

    pub fn concept(&self, id: &ConceptId) -> Option<&ResolvedConcept> {
        self.concepts.get(id)
    }

    /// Like [`Self::concept`], failing with `UnknownConcept` on a miss.
    pub fn require(
        &self,
        id: &ConceptId,
        referenced_by: &str,
    ) -> Result<&ResolvedConcept, ConceptError> {
        self.concepts
            .get(id)
            .ok_or_else(|| ConceptError::UnknownConcept {
                concept: id.clone(),
                referenced_by: referenced_by.to_string(),
            })
    }

    pub fn contains(&self, id: &ConceptId) -> bool {
        self.concepts.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.concepts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.concepts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResolvedConcept> {
        self.concepts.values()
    }
}

/// Depth-first closure of `id`'s clauses. `stack` holds the ancestors being
/// visited; meeting one again is a cycle.
fn close_clauses(
    id: &ConceptId,
    declared: &BTreeMap<ConceptId, ConceptDescriptor>,
    closed: &mut BTreeMap<ConceptId, BTreeMap<String, SignatureId>>,
    stack: &mut Vec<ConceptId>,
) -> Result<(), ConceptError> {
    if closed.contains_key(id) {
        return Ok(());
    }
    if let Some(pos) = stack.iter().position(|ancestor| ancestor == id) {
        let mut path = stack[pos..].to_vec();
        path.push(id.clone());
        return Err(ConceptError::DefinitionCycle { path });
    }
    let descriptor = declared
        .get(id)
        .ok_or_else(|| ConceptError::UnknownConcept {
            concept: id.clone(),
            referenced_by: stack
                .last()
                .map(|parent| format!("concept {parent}"))
                .unwrap_or_else(|| "graph".to_string()),
        })?;

    stack.push(id.clone());
    for refined in descriptor.refined_concepts() {
        close_clauses(refined, declared, closed, stack)?;
    }
    stack.pop();

    let mut all = descriptor.own_clauses().clone();
    for refined in descriptor.refined_concepts() {
        let Some(inherited) = closed.get(refined) else {
            continue;
        };
        for (name, signature) in inherited {
            match all.get(name) {
                Some(existing) if existing != signature => {
                    return Err(ConceptError::ClauseConflict {
                        concept: id.clone(),
                        name: name.clone(),
                        first: existing.name().to_string(),
                        second: signature.name().to_string(),
                    });
                }
                Some(_) => {}
                None => {
                    all.insert(name.clone(), *signature);
                }
            }
        }
    }
    closed.insert(id.clone(), all);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn greet() -> ConceptDescriptor {
        ConceptDescriptor::new("Greet").requires::<fn() -> i32>("hello")
    }

    #[test]
    fn all_clauses_is_the_transitive_union() {
        let graph = ConceptGraph::resolve([
            greet(),
            ConceptDescriptor::new("Loud")
                .requires::<fn() -> i32>("shout")
                .refines("Greet"),
            ConceptDescriptor::new("Louder")
                .requires::<fn() -> i32>("scream")
                .refines("Loud"),
        ])
        .expect("graph must resolve");

        let louder = graph.concept(&ConceptId::new("Louder")).expect("Louder");
        let names: Vec<&str> = louder.all_clauses().keys().map(String::as_str).collect();
        assert_eq!(names, vec!["hello", "scream", "shout"]);
        assert_eq!(louder.own_clauses().len(), 1);
        assert_eq!(graph.len(), 3);
    }

    #[test]
    fn diamond_clauses_are_deduplicated() {
        let graph = ConceptGraph::resolve([
            greet(),
            ConceptDescriptor::new("Left").refines("Greet"),
            ConceptDescriptor::new("Right").refines("Greet"),
            ConceptDescriptor::new("Both").refines("Left").refines("Right"),
        ])
        .expect("diamond is acyclic");
        let both = graph.concept(&ConceptId::new("Both")).expect("Both");
        assert_eq!(both.all_clauses().len(), 1);
        assert!(both.signature("hello").is_some_and(|s| s.is::<fn() -> i32>()));
    }

    #[test]
    fn cycles_are_reported_with_their_path() {
        let err = ConceptGraph::resolve([
            ConceptDescriptor::new("A").refines("B"),
            ConceptDescriptor::new("B").refines("C"),
            ConceptDescriptor::new("C").refines("A"),
        ])
        .expect_err("cycle must be rejected");
        assert_eq!(
            err,
            ConceptError::DefinitionCycle {
                path: ["A", "B", "C", "A"].into_iter().map(ConceptId::new).collect(),
            }
        );
    }

    #[test]
    fn self_refinement_is_a_cycle() {
        let err = ConceptGraph::resolve([ConceptDescriptor::new("A").refines("A")])
            .expect_err("self refinement must be rejected");
        assert_eq!(err.failure_class(), "concept_graph.cycle");
    }

    #[test]
    fn unknown_refinement_is_rejected() {
        let err = ConceptGraph::resolve([ConceptDescriptor::new("Loud").refines("Greet")])
            .expect_err("Greet is undefined");
        assert_eq!(
            err,
            ConceptError::UnknownConcept {
                concept: ConceptId::new("Greet"),
                referenced_by: "concept Loud".to_string(),
            }
        );
    }

    #[test]
    fn conflicting_signatures_are_rejected() {
        let err = ConceptGraph::resolve([
            greet(),
            ConceptDescriptor::new("Odd")
                .requires::<fn() -> String>("hello")
                .refines("Greet"),
        ])
        .expect_err("hello has two signatures");
        assert_eq!(err.failure_class(), "concept_graph.clause_conflict");
    }

    #[test]
    fn duplicate_descriptor_is_rejected() {
        let err = ConceptGraph::resolve([greet(), greet()]).expect_err("defined twice");
        assert!(matches!(
            err,
            ConceptError::DuplicateDefinition {
                kind: DefinitionKind::Concept,
                ..
            }
        ));
    }
}
