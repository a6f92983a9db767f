//! Two-phase registry of concepts and concept maps.
//!
//! Phase one is a single-threaded [`RegistryBuilder`]: define every concept,
//! register author defaults and user maps. [`RegistryBuilder::seal`] fixes
//! the graph and yields a read-only [`Registry`]. Phase two resolves maps on
//! demand; each (concept, model) key is resolved at most once per process,
//! even under concurrent requests, and the result (success or failure) is
//! shared from then on.
//!
//! A map is registered either for one exact model type or for a family of
//! model types, selected by a predicate over [`ModelId`]. An exact
//! registration always wins over a family; two families accepting the same
//! model for the same concept are a duplicate definition.

use crate::bindings::Bindings;
use crate::completeness::{check_complete, check_signatures};
use crate::concept::{ConceptDescriptor, ConceptId};
use crate::concept_map::{ConceptMap, DefaultConceptMap};
use crate::config::ResolverConfig;
use crate::error::{ConceptError, DefinitionKind};
use crate::graph::{ConceptGraph, ResolvedConcept};
use crate::merge::{Merge, Provenance};
use crate::preflight::{PreflightFailure, PreflightReport};
use crate::signature::{ModelId, SignatureId};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::panic::Location;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};
use tracing::{debug, trace, warn};

/// Source location of a registration.
#[derive(Debug, Clone, Copy)]
pub struct Source(&'static Location<'static>);

impl Source {
    #[track_caller]
    fn caller() -> Self {
        Self(Location::caller())
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.0.file(), self.0.line(), self.0.column())
    }
}

/// Key of a concept map.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MapKey {
    pub concept: ConceptId,
    pub model: ModelId,
}

impl MapKey {
    pub fn new(concept: impl Into<ConceptId>, model: ModelId) -> Self {
        Self {
            concept: concept.into(),
            model,
        }
    }
}

impl fmt::Display for MapKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} / {}", self.concept, self.model)
    }
}

#[derive(Debug, Clone)]
struct Registered<T> {
    value: T,
    source: Source,
}

/// Membership test for a family of model types.
pub type FamilyPredicate = fn(ModelId) -> bool;

#[derive(Debug, Clone)]
struct Family {
    concept: ConceptId,
    matches: FamilyPredicate,
    bindings: Bindings,
}

/// Registered maps of one kind: exact keys plus families, in registration order.
#[derive(Debug, Default)]
struct MapTable {
    exact: HashMap<MapKey, Registered<Bindings>>,
    families: Vec<Registered<Family>>,
}

impl MapTable {
    fn insert(
        &mut self,
        kind: DefinitionKind,
        key: MapKey,
        bindings: Bindings,
        source: Source,
    ) -> Result<(), ConceptError> {
        bindings.validate(|| format!("{kind} for {key} at {source}"))?;
        if let Some(existing) = self.exact.get(&key) {
            return Err(ConceptError::DuplicateDefinition {
                kind,
                concept: key.concept,
                model: Some(key.model.name().to_string()),
                first: existing.source.to_string(),
                second: source.to_string(),
            });
        }
        self.exact.insert(
            key,
            Registered {
                value: bindings,
                source,
            },
        );
        Ok(())
    }

    fn insert_family(
        &mut self,
        kind: DefinitionKind,
        concept: ConceptId,
        matches: FamilyPredicate,
        bindings: Bindings,
        source: Source,
    ) -> Result<(), ConceptError> {
        bindings.validate(|| format!("{kind} family for {concept} at {source}"))?;
        self.families.push(Registered {
            value: Family {
                concept,
                matches,
                bindings,
            },
            source,
        });
        Ok(())
    }

    /// Bindings registered for `key`: the exact entry, else the single
    /// family that accepts the model.
    fn lookup(
        &self,
        kind: DefinitionKind,
        key: &MapKey,
    ) -> Result<Option<&Bindings>, ConceptError> {
        if let Some(registered) = self.exact.get(key) {
            return Ok(Some(&registered.value));
        }
        let mut matching = self.families.iter().filter(|family| {
            family.value.concept == key.concept && (family.value.matches)(key.model)
        });
        let Some(first) = matching.next() else {
            return Ok(None);
        };
        if let Some(second) = matching.next() {
            return Err(ConceptError::DuplicateDefinition {
                kind,
                concept: key.concept.clone(),
                model: Some(key.model.name().to_string()),
                first: format!("{} (family)", first.source),
                second: format!("{} (family)", second.source),
            });
        }
        trace!(
            key = %key,
            kind = %kind,
            source = %first.source,
            "map selected from family"
        );
        Ok(Some(&first.value.bindings))
    }

    fn len(&self) -> usize {
        self.exact.len() + self.families.len()
    }
}

/// Initialisation-phase registry.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    config: ResolverConfig,
    concepts: BTreeMap<ConceptId, Registered<ConceptDescriptor>>,
    defaults: MapTable,
    customs: MapTable,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: ResolverConfig) -> Self {
        self.config = config;
        self
    }

    #[track_caller]
    pub fn define_concept(&mut self, descriptor: ConceptDescriptor) -> Result<(), ConceptError> {
        let source = Source::caller();
        descriptor.validate()?;
        if let Some(existing) = self.concepts.get(descriptor.id()) {
            return Err(ConceptError::DuplicateDefinition {
                kind: DefinitionKind::Concept,
                concept: descriptor.id().clone(),
                model: None,
                first: existing.source.to_string(),
                second: source.to_string(),
            });
        }
        self.concepts.insert(
            descriptor.id().clone(),
            Registered {
                value: descriptor,
                source,
            },
        );
        Ok(())
    }

    /// Register the concept author's fallback bindings for (concept, model).
    /// They may be partial.
    #[track_caller]
    pub fn register_default(
        &mut self,
        concept: impl Into<ConceptId>,
        model: ModelId,
        bindings: Bindings,
    ) -> Result<(), ConceptError> {
        let source = Source::caller();
        let key = MapKey::new(concept, model);
        self.defaults.insert(DefinitionKind::DefaultMap, key, bindings, source)
    }

    /// Register fallback bindings for every model `matches` accepts.
    #[track_caller]
    pub fn register_default_family(
        &mut self,
        concept: impl Into<ConceptId>,
        matches: FamilyPredicate,
        bindings: Bindings,
    ) -> Result<(), ConceptError> {
        let source = Source::caller();
        self.defaults.insert_family(
            DefinitionKind::DefaultMap,
            concept.into(),
            matches,
            bindings,
            source,
        )
    }

    #[track_caller]
    pub fn register_default_for<T: ?Sized + 'static>(
        &mut self,
        concept: impl Into<ConceptId>,
        bindings: Bindings,
    ) -> Result<(), ConceptError> {
        self.register_default(concept, ModelId::of::<T>(), bindings)
    }

    /// Register the user's concept map bindings for (concept, model).
    #[track_caller]
    pub fn register_custom(
        &mut self,
        concept: impl Into<ConceptId>,
        model: ModelId,
        bindings: Bindings,
    ) -> Result<(), ConceptError> {
        let source = Source::caller();
        let key = MapKey::new(concept, model);
        self.customs.insert(DefinitionKind::CustomMap, key, bindings, source)
    }

    #[track_caller]
    pub fn register_custom_family(
        &mut self,
        concept: impl Into<ConceptId>,
        matches: FamilyPredicate,
        bindings: Bindings,
    ) -> Result<(), ConceptError> {
        let source = Source::caller();
        self.customs.insert_family(
            DefinitionKind::CustomMap,
            concept.into(),
            matches,
            bindings,
            source,
        )
    }

    #[track_caller]
    pub fn register_custom_for<T: ?Sized + 'static>(
        &mut self,
        concept: impl Into<ConceptId>,
        bindings: Bindings,
    ) -> Result<(), ConceptError> {
        self.register_custom(concept, ModelId::of::<T>(), bindings)
    }

    /// Fix the concept graph and end the registration phase.
    pub fn seal(self) -> Result<Registry, ConceptError> {
        let graph = ConceptGraph::resolve(self.concepts.into_values().map(|r| r.value))?;

        for (kind, table) in [
            (DefinitionKind::DefaultMap, &self.defaults),
            (DefinitionKind::CustomMap, &self.customs),
        ] {
            for (key, registered) in sorted_entries(&table.exact) {
                if !graph.contains(&key.concept) {
                    return Err(ConceptError::UnknownConcept {
                        concept: key.concept.clone(),
                        referenced_by: format!("{kind} registered at {}", registered.source),
                    });
                }
            }
            for family in &table.families {
                if !graph.contains(&family.value.concept) {
                    return Err(ConceptError::UnknownConcept {
                        concept: family.value.concept.clone(),
                        referenced_by: format!("{kind} family registered at {}", family.source),
                    });
                }
            }
        }

        debug!(
            concepts = graph.len(),
            default_maps = self.defaults.len(),
            custom_maps = self.customs.len(),
            "concept registry sealed"
        );

        let registry = Registry {
            config: self.config,
            graph,
            defaults: self.defaults,
            customs: self.customs,
            resolved: Cache::default(),
            resolved_defaults: Cache::default(),
        };
        if registry.config.preflight_on_seal
            && let Some((_, err)) = registry.preflight_errors().into_iter().next()
        {
            return Err(err);
        }
        Ok(registry)
    }
}

fn key_order(a: &MapKey, b: &MapKey) -> std::cmp::Ordering {
    (&a.concept, a.model.name()).cmp(&(&b.concept, b.model.name()))
}

fn sorted_entries<T>(map: &HashMap<MapKey, T>) -> Vec<(&MapKey, &T)> {
    let mut entries: Vec<(&MapKey, &T)> = map.iter().collect();
    entries.sort_by(|(a, _), (b, _)| key_order(a, b));
    entries
}

type Slot<T> = Arc<OnceLock<Result<Arc<T>, ConceptError>>>;

/// Per-key exactly-once cells.
struct Cache<T> {
    cells: RwLock<HashMap<MapKey, Slot<T>>>,
}

impl<T> Default for Cache<T> {
    fn default() -> Self {
        Self {
            cells: RwLock::new(HashMap::new()),
        }
    }
}

impl<T> Cache<T> {
    fn get_or_init(
        &self,
        key: &MapKey,
        init: impl FnOnce() -> Result<T, ConceptError>,
    ) -> Result<Arc<T>, ConceptError> {
        self.slot(key).get_or_init(|| init().map(Arc::new)).clone()
    }

    fn slot(&self, key: &MapKey) -> Slot<T> {
        if let Some(slot) = self
            .cells
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
        {
            return Arc::clone(slot);
        }
        let mut cells = self.cells.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(cells.entry(key.clone()).or_default())
    }

    fn resolved(&self) -> usize {
        self.cells
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|slot| slot.get().is_some())
            .count()
    }
}

impl<T> fmt::Debug for Cache<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("resolved", &self.resolved())
            .finish()
    }
}

/// Sealed, read-only registry.
#[derive(Debug)]
pub struct Registry {
    config: ResolverConfig,
    graph: ConceptGraph,
    defaults: MapTable,
    customs: MapTable,
    resolved: Cache<ConceptMap>,
    resolved_defaults: Cache<DefaultConceptMap>,
}

impl Registry {
    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn graph(&self) -> &ConceptGraph {
        &self.graph
    }

    pub fn concept(&self, id: &ConceptId) -> Option<&ResolvedConcept> {
        self.graph.concept(id)
    }

    pub fn all_clauses(
        &self,
        id: &ConceptId,
    ) -> Result<&BTreeMap<String, SignatureId>, ConceptError> {
        Ok(self.graph.require(id, "all_clauses")?.all_clauses())
    }

    /// The process-lifetime concept map for (concept, model): the registered
    /// custom bindings (or none) merged with defaults and refined maps.
    pub fn concept_map(
        &self,
        concept: &ConceptId,
        model: ModelId,
    ) -> Result<Arc<ConceptMap>, ConceptError> {
        let key = MapKey::new(concept, model);
        self.resolved.get_or_init(&key, || {
            let explicit = self
                .customs
                .lookup(DefinitionKind::CustomMap, &key)?
                .cloned()
                .unwrap_or_default();
            self.build(concept, model, explicit)
        })
    }

    pub fn concept_map_for<T: ?Sized + 'static>(
        &self,
        concept: impl Into<ConceptId>,
    ) -> Result<Arc<ConceptMap>, ConceptError> {
        self.concept_map(&concept.into(), ModelId::of::<T>())
    }

    /// The resolved default map for (concept, model), if one was registered.
    pub fn default_map(
        &self,
        concept: &ConceptId,
        model: ModelId,
    ) -> Result<Option<Arc<DefaultConceptMap>>, ConceptError> {
        let key = MapKey::new(concept, model);
        let Some(bindings) = self.defaults.lookup(DefinitionKind::DefaultMap, &key)? else {
            return Ok(None);
        };
        self.resolved_defaults
            .get_or_init(&key, || self.build_default(concept, model, bindings.clone()))
            .map(Some)
    }

    /// Merge `explicit` with the default map and every refined concept's
    /// resolved map, then require full coverage. Not cached.
    pub fn build(
        &self,
        concept: &ConceptId,
        model: ModelId,
        explicit: Bindings,
    ) -> Result<ConceptMap, ConceptError> {
        let resolved = self.graph.require(concept, "build")?;
        explicit.validate(|| format!("explicit bindings for {concept} / {model}"))?;

        let mut merge = Merge::new(concept, model, self.config.diamond_policy, explicit);
        if let Some(default) = self.default_map(concept, model)? {
            merge.absorb(
                default
                    .entries()
                    .iter()
                    .map(|(name, entry)| (name.as_str(), &entry.implementation)),
                &Provenance::Default,
            )?;
        }
        self.absorb_refined(&mut merge, resolved, model)?;
        let entries = merge.finish();

        let clauses = resolved.all_clauses();
        check_complete(
            concept,
            model,
            clauses.keys().map(String::as_str),
            entries.keys().map(String::as_str),
        )?;
        check_signatures(concept, model, clauses, &entries)?;

        debug!(
            concept = %concept,
            model = %model,
            operations = entries.len(),
            "concept map resolved"
        );
        Ok(ConceptMap::new(concept.clone(), model, clauses.clone(), entries))
    }

    pub fn build_for<T: ?Sized + 'static>(
        &self,
        concept: impl Into<ConceptId>,
        explicit: Bindings,
    ) -> Result<ConceptMap, ConceptError> {
        self.build(&concept.into(), ModelId::of::<T>(), explicit)
    }

    /// Merge `explicit` with every refined concept's resolved map, without
    /// a coverage requirement. Not cached.
    pub fn build_default(
        &self,
        concept: &ConceptId,
        model: ModelId,
        explicit: Bindings,
    ) -> Result<DefaultConceptMap, ConceptError> {
        let resolved = self.graph.require(concept, "build_default")?;
        explicit.validate(|| format!("default bindings for {concept} / {model}"))?;

        let mut merge = Merge::new(concept, model, self.config.diamond_policy, explicit);
        self.absorb_refined(&mut merge, resolved, model)?;
        Ok(DefaultConceptMap::new(concept.clone(), model, merge.finish()))
    }

    fn absorb_refined(
        &self,
        merge: &mut Merge<'_>,
        resolved: &ResolvedConcept,
        model: ModelId,
    ) -> Result<(), ConceptError> {
        for refined in resolved.refined_concepts() {
            let map = self.concept_map(refined, model)?;
            merge.absorb(
                map.entries()
                    .iter()
                    .map(|(name, entry)| (name.as_str(), &entry.implementation)),
                &Provenance::Refined(refined.clone()),
            )?;
        }
        Ok(())
    }

    /// Every key with an exact default or custom registration, sorted.
    pub fn registered_keys(&self) -> Vec<MapKey> {
        let mut keys: Vec<MapKey> = self
            .defaults
            .exact
            .keys()
            .chain(self.customs.exact.keys())
            .cloned()
            .collect();
        keys.sort_by(key_order);
        keys.dedup();
        keys
    }

    /// Keys of one kind that preflight resolves: every exact registration,
    /// plus each family applied to the models the registry names exactly.
    fn preflight_keys(&self, table: &MapTable) -> Vec<MapKey> {
        let mut models: Vec<ModelId> = self
            .registered_keys()
            .into_iter()
            .map(|key| key.model)
            .collect();
        models.sort_by_key(|model| model.name());
        models.dedup();
        let mut keys: Vec<MapKey> = table.exact.keys().cloned().collect();
        for family in &table.families {
            for &model in &models {
                if (family.value.matches)(model) {
                    keys.push(MapKey::new(&family.value.concept, model));
                }
            }
        }
        keys.sort_by(key_order);
        keys.dedup();
        keys
    }

    /// Number of concept maps resolved so far (successfully or not).
    pub fn resolved_count(&self) -> usize {
        self.resolved.resolved()
    }

    /// Resolve every registered map and report each failure.
    pub fn preflight(&self) -> PreflightReport {
        let mut checked = 0;
        let failures: Vec<PreflightFailure> = self
            .preflight_errors_counted(&mut checked)
            .into_iter()
            .map(|((key, kind), err)| {
                warn!(key = %key, error = %err, "preflight rejected concept map");
                PreflightFailure::new(&key.concept, key.model.name(), kind, &err)
            })
            .collect();
        let report = PreflightReport::from_failures(checked, failures);
        debug!(
            checked = report.checked,
            failures = report.failures.len(),
            "preflight finished"
        );
        report
    }

    fn preflight_errors(&self) -> Vec<((MapKey, DefinitionKind), ConceptError)> {
        let mut checked = 0;
        self.preflight_errors_counted(&mut checked)
    }

    fn preflight_errors_counted(
        &self,
        checked: &mut usize,
    ) -> Vec<((MapKey, DefinitionKind), ConceptError)> {
        let mut errors = Vec::new();
        for key in self.preflight_keys(&self.defaults) {
            *checked += 1;
            if let Err(err) = self.default_map(&key.concept, key.model) {
                errors.push(((key, DefinitionKind::DefaultMap), err));
            }
        }
        for key in self.preflight_keys(&self.customs) {
            *checked += 1;
            if let Err(err) = self.concept_map(&key.concept, key.model) {
                errors.push(((key, DefinitionKind::CustomMap), err));
            }
        }
        errors
    }
}
