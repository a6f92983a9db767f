//! End-to-end resolution scenarios: precedence, completeness, refinement,
//! and erasure, exercised through a sealed registry.

use conmap_kernel::{
    Bindings, ConceptDescriptor, ConceptError, ConceptId, DiamondPolicy, ErasedFn, ModelId,
    Provenance, Registry, RegistryBuilder, ResolverConfig,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

struct Foo;
struct Bar;

type Nullary = fn() -> i32;

fn greet() -> ConceptDescriptor {
    ConceptDescriptor::new("Greet").requires::<Nullary>("hello")
}

fn loud() -> ConceptDescriptor {
    ConceptDescriptor::new("Loud")
        .requires::<Nullary>("shout")
        .refines("Greet")
}

fn seal(builder: RegistryBuilder) -> Registry {
    builder.seal().expect("registry must seal")
}

fn builder_with(concepts: impl IntoIterator<Item = ConceptDescriptor>) -> RegistryBuilder {
    let mut builder = RegistryBuilder::new();
    for concept in concepts {
        builder.define_concept(concept).expect("define concept");
    }
    builder
}

#[test]
fn scenario_a_direct_binding() {
    let mut builder = builder_with([greet()]);
    builder
        .register_custom_for::<Foo>("Greet", Bindings::new().bind_fn::<Nullary>("hello", || 1))
        .expect("register");
    let registry = seal(builder);

    let map = registry.concept_map_for::<Foo>("Greet").expect("complete");
    assert_eq!(map.call::<Nullary>("hello", ()), Ok(1));
    assert_eq!(map.provenance("hello"), Some(&Provenance::Explicit));
}

#[test]
fn scenario_b_operations_are_pulled_from_refined_concepts() {
    let mut builder = builder_with([greet(), loud()]);
    builder
        .register_custom_for::<Foo>("Greet", Bindings::new().bind_fn::<Nullary>("hello", || 1))
        .expect("register Greet");
    builder
        .register_custom_for::<Foo>("Loud", Bindings::new().bind_fn::<Nullary>("shout", || 2))
        .expect("register Loud");
    let registry = seal(builder);

    let map = registry.concept_map_for::<Foo>("Loud").expect("complete");
    assert_eq!(map.call::<Nullary>("hello", ()), Ok(1));
    assert_eq!(map.call::<Nullary>("shout", ()), Ok(2));
    assert_eq!(
        map.provenance("hello"),
        Some(&Provenance::Refined(ConceptId::new("Greet")))
    );
}

/// Seal without resolving registered maps up front.
fn deferred() -> ResolverConfig {
    ResolverConfig {
        preflight_on_seal: false,
        ..ResolverConfig::default()
    }
}

fn greet_without_hello(config: ResolverConfig) -> RegistryBuilder {
    let mut builder = builder_with([greet()]).with_config(config);
    builder
        .register_custom_for::<Foo>("Greet", Bindings::new().bind_fn::<Nullary>("wave", || 0))
        .expect("register");
    builder
}

#[test]
fn scenario_c_missing_operation_fails_the_build() {
    let expected = ConceptError::IncompleteMap {
        concept: ConceptId::new("Greet"),
        model: std::any::type_name::<Foo>().to_string(),
        missing: vec!["hello".to_string()],
    };

    let err = greet_without_hello(ResolverConfig::default())
        .seal()
        .expect_err("an incomplete registered map blocks startup");
    assert_eq!(err, expected);

    let registry = seal(greet_without_hello(deferred()));
    let err = registry
        .concept_map_for::<Foo>("Greet")
        .expect_err("hello is not bound anywhere");
    assert_eq!(err, expected);
}

#[test]
fn scenario_d_explicit_binding_beats_default() {
    let mut builder = builder_with([greet()]);
    builder
        .register_default_for::<Foo>("Greet", Bindings::new().bind_fn::<Nullary>("hello", || 10))
        .expect("register default");
    builder
        .register_custom_for::<Foo>("Greet", Bindings::new().bind_fn::<Nullary>("hello", || 20))
        .expect("register custom");
    let registry = seal(builder);

    let map = registry.concept_map_for::<Foo>("Greet").expect("complete");
    assert_eq!(map.call::<Nullary>("hello", ()), Ok(20));
}

#[test]
fn default_map_alone_can_complete_a_concept() {
    let mut builder = builder_with([greet()]);
    builder
        .register_default_for::<Foo>("Greet", Bindings::new().bind_fn::<Nullary>("hello", || 10))
        .expect("register default");
    let registry = seal(builder);

    let map = registry.concept_map_for::<Foo>("Greet").expect("default suffices");
    assert_eq!(map.call::<Nullary>("hello", ()), Ok(10));
    assert_eq!(map.provenance("hello"), Some(&Provenance::Default));
    assert!(registry.concept_map_for::<Bar>("Greet").is_err());
}

#[test]
fn explicit_overrides_refined_and_default() {
    let mut builder = builder_with([greet(), loud()]);
    builder
        .register_custom_for::<Foo>("Greet", Bindings::new().bind_fn::<Nullary>("hello", || 1))
        .expect("register Greet");
    builder
        .register_default_for::<Foo>(
            "Loud",
            Bindings::new()
                .bind_fn::<Nullary>("hello", || 5)
                .bind_fn::<Nullary>("shout", || 6),
        )
        .expect("register Loud default");
    let registry = seal(builder);

    let from_default = registry.concept_map_for::<Foo>("Loud").expect("complete");
    assert_eq!(from_default.call::<Nullary>("hello", ()), Ok(5));
    assert_eq!(from_default.call::<Nullary>("shout", ()), Ok(6));

    let explicit = registry
        .build_for::<Foo>("Loud", Bindings::new().bind_fn::<Nullary>("hello", || 9))
        .expect("complete");
    assert_eq!(explicit.call::<Nullary>("hello", ()), Ok(9));
    assert_eq!(explicit.call::<Nullary>("shout", ()), Ok(6));
}

#[test]
fn partial_default_is_completed_by_custom_bindings() {
    let mut builder = builder_with([ConceptDescriptor::new("Shape")
        .requires::<fn(f64) -> f64>("area")
        .requires::<fn() -> &'static str>("name")]);
    builder
        .register_default_for::<Foo>(
            "Shape",
            Bindings::new().bind_fn::<fn() -> &'static str>("name", || "shape"),
        )
        .expect("partial default");
    builder
        .register_custom_for::<Foo>(
            "Shape",
            Bindings::new().bind_fn::<fn(f64) -> f64>("area", |side| side * side),
        )
        .expect("custom");
    let registry = seal(builder);

    let default = registry
        .default_map(&ConceptId::new("Shape"), ModelId::of::<Foo>())
        .expect("default resolves")
        .expect("default registered");
    assert_eq!(default.len(), 1);

    let map = registry.concept_map_for::<Foo>("Shape").expect("complete");
    assert_eq!(map.call::<fn(f64) -> f64>("area", (3.0,)), Ok(9.0));
    assert_eq!(map.call::<fn() -> &'static str>("name", ()), Ok("shape"));
}

#[test]
fn completeness_reports_exactly_the_missing_set() {
    let registry = seal(builder_with([
        greet(),
        ConceptDescriptor::new("Wide")
            .requires::<Nullary>("a")
            .requires::<Nullary>("b")
            .requires::<Nullary>("c")
            .refines("Greet"),
    ]));

    // Greet / Foo has no map, so the refined lookup fails first.
    let err = registry
        .build_for::<Foo>("Wide", Bindings::new().bind_fn::<Nullary>("b", || 0))
        .expect_err("Greet / Foo is incomplete");
    assert!(matches!(
        &err,
        ConceptError::IncompleteMap { concept, missing, .. }
            if concept == &ConceptId::new("Greet") && missing == &vec!["hello".to_string()]
    ));

    let registry = seal(builder_with([ConceptDescriptor::new("Wide")
        .requires::<Nullary>("a")
        .requires::<Nullary>("b")
        .requires::<Nullary>("c")]));
    let err = registry
        .build_for::<Foo>(
            "Wide",
            Bindings::new()
                .bind_fn::<Nullary>("b", || 0)
                .bind_fn::<Nullary>("unrelated", || 0),
        )
        .expect_err("a and c are missing");
    match err {
        ConceptError::IncompleteMap { missing, .. } => {
            assert_eq!(missing, vec!["a".to_string(), "c".to_string()]);
        }
        other => panic!("unexpected error: {other}"),
    }

    let ok = registry.build_for::<Foo>(
        "Wide",
        Bindings::new()
            .bind_fn::<Nullary>("a", || 1)
            .bind_fn::<Nullary>("b", || 2)
            .bind_fn::<Nullary>("c", || 3),
    );
    assert!(ok.is_ok());
}

#[test]
fn transitive_refinement_reaches_the_root() {
    let mut builder = builder_with([
        ConceptDescriptor::new("Root").requires::<Nullary>("r"),
        ConceptDescriptor::new("Mid")
            .requires::<Nullary>("m")
            .refines("Root"),
        ConceptDescriptor::new("Leaf")
            .requires::<Nullary>("l")
            .refines("Mid"),
    ]);
    builder
        .register_custom_for::<Foo>("Root", Bindings::new().bind_fn::<Nullary>("r", || 100))
        .expect("Root");
    builder
        .register_custom_for::<Foo>("Mid", Bindings::new().bind_fn::<Nullary>("m", || 10))
        .expect("Mid");
    builder
        .register_custom_for::<Foo>("Leaf", Bindings::new().bind_fn::<Nullary>("l", || 1))
        .expect("Leaf");
    let registry = seal(builder);

    let leaf = registry.concept_map_for::<Foo>("Leaf").expect("complete");
    let total: i32 = ["r", "m", "l"]
        .iter()
        .map(|name| leaf.call::<Nullary>(name, ()).expect("bound"))
        .sum();
    assert_eq!(total, 111);
    assert_eq!(leaf.names().collect::<Vec<_>>(), vec!["l", "m", "r"]);
}

#[test]
fn overriding_in_the_middle_hides_the_root_binding() {
    let mut builder = builder_with([
        ConceptDescriptor::new("Root").requires::<Nullary>("r"),
        ConceptDescriptor::new("Mid").refines("Root"),
        ConceptDescriptor::new("Leaf").refines("Mid"),
    ]);
    builder
        .register_custom_for::<Foo>("Root", Bindings::new().bind_fn::<Nullary>("r", || 1))
        .expect("Root");
    builder
        .register_custom_for::<Foo>("Mid", Bindings::new().bind_fn::<Nullary>("r", || 2))
        .expect("Mid");
    let registry = seal(builder);

    let leaf = registry.concept_map_for::<Foo>("Leaf").expect("complete");
    assert_eq!(leaf.call::<Nullary>("r", ()), Ok(2));
}

fn diamond_builder(config: ResolverConfig) -> RegistryBuilder {
    let mut builder = builder_with([
        greet(),
        ConceptDescriptor::new("Left").refines("Greet"),
        ConceptDescriptor::new("Right").refines("Greet"),
        ConceptDescriptor::new("Both").refines("Left").refines("Right"),
    ])
    .with_config(config);
    builder
        .register_custom_for::<Foo>("Greet", Bindings::new().bind_fn::<Nullary>("hello", || 1))
        .expect("Greet");
    builder
}

#[test]
fn diamond_through_a_shared_ancestor_is_not_a_conflict() {
    let registry = seal(diamond_builder(ResolverConfig {
        diamond_policy: DiamondPolicy::Reject,
        ..ResolverConfig::default()
    }));
    let both = registry.concept_map_for::<Foo>("Both").expect("same binding on both paths");
    assert_eq!(both.call::<Nullary>("hello", ()), Ok(1));
    assert_eq!(
        both.provenance("hello"),
        Some(&Provenance::Refined(ConceptId::new("Left")))
    );
}

#[test]
fn diamond_conflict_prefers_first_declared_refinement() {
    let mut builder = diamond_builder(ResolverConfig::default());
    builder
        .register_custom_for::<Foo>("Left", Bindings::new().bind_fn::<Nullary>("hello", || 2))
        .expect("Left");
    builder
        .register_custom_for::<Foo>("Right", Bindings::new().bind_fn::<Nullary>("hello", || 3))
        .expect("Right");
    let registry = seal(builder);

    let both = registry.concept_map_for::<Foo>("Both").expect("complete");
    assert_eq!(both.call::<Nullary>("hello", ()), Ok(2));
}

fn hello_impl() -> i32 {
    7
}

#[test]
fn one_function_bound_on_both_sides_of_a_diamond_is_not_a_conflict() {
    let hello: Nullary = hello_impl;
    let mut builder = diamond_builder(ResolverConfig {
        diamond_policy: DiamondPolicy::Reject,
        ..ResolverConfig::default()
    });
    builder
        .register_custom_for::<Foo>("Left", Bindings::new().bind_fn("hello", hello))
        .expect("Left");
    builder
        .register_custom_for::<Foo>("Right", Bindings::new().bind_fn("hello", hello))
        .expect("Right");
    let registry = seal(builder);

    let both = registry
        .concept_map_for::<Foo>("Both")
        .expect("Left and Right bind the same function");
    assert_eq!(both.call::<Nullary>("hello", ()), Ok(7));
}

#[test]
fn diamond_conflict_can_be_made_fatal() {
    let mut builder = diamond_builder(ResolverConfig {
        diamond_policy: DiamondPolicy::Reject,
        ..ResolverConfig::default()
    });
    builder
        .register_custom_for::<Foo>("Left", Bindings::new().bind_fn::<Nullary>("hello", || 2))
        .expect("Left");
    let registry = seal(builder);

    let err = registry
        .concept_map_for::<Foo>("Both")
        .expect_err("Left and Right disagree on hello");
    assert_eq!(
        err,
        ConceptError::AmbiguousOperation {
            concept: ConceptId::new("Both"),
            model: std::any::type_name::<Foo>().to_string(),
            name: "hello".to_string(),
            first: ConceptId::new("Left"),
            second: ConceptId::new("Right"),
        }
    );
}

#[test]
fn rebuilding_with_identical_inputs_is_idempotent() {
    let registry = seal(builder_with([greet()]));
    let bindings = Bindings::new().bind_fn::<Nullary>("hello", || 42);

    let first = registry.build_for::<Foo>("Greet", bindings.clone()).expect("first");
    let second = registry.build_for::<Foo>("Greet", bindings).expect("second");
    assert_eq!(first.fingerprint(), second.fingerprint());
    assert_eq!(first.summary(), second.summary());
    assert_eq!(
        first.call::<Nullary>("hello", ()),
        second.call::<Nullary>("hello", ())
    );
}

#[test]
fn wrong_signature_is_caught_at_build() {
    let registry = seal(builder_with([greet()]));
    let err = registry
        .build_for::<Foo>("Greet", Bindings::new().bind_fn::<fn() -> i64>("hello", || 1))
        .expect_err("hello must be fn() -> i32");
    assert_eq!(err.failure_class(), "concept_map.signature_mismatch");
}

#[test]
fn erased_entries_behave_like_direct_calls() {
    let registry = seal(builder_with([ConceptDescriptor::new("Counter")
        .requires::<fn() -> usize>("tick")
        .requires::<fn(usize, usize) -> usize>("add")
        .requires::<fn(String) -> String>("label")]));

    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    let prefix = String::from("#");
    let map = registry
        .build_for::<Foo>(
            "Counter",
            Bindings::new()
                .bind::<fn() -> usize, _>("tick", move || counter.fetch_add(1, Ordering::SeqCst))
                .bind_fn::<fn(usize, usize) -> usize>("add", |a, b| a + b)
                .bind::<fn(String) -> String, _>("label", move |s: String| format!("{prefix}{s}")),
        )
        .expect("complete");

    let tick: ErasedFn<fn() -> usize> = map.erased("tick").expect("tick");
    assert!(!tick.is_bare());
    assert_eq!(tick.call(()), 0);
    assert_eq!(tick.call(()), 1);
    assert_eq!(hits.load(Ordering::SeqCst), 2);

    let add: ErasedFn<fn(usize, usize) -> usize> = map.erased("add").expect("add");
    assert!(add.is_bare());
    assert_eq!(add.call((2, 3)), 5);

    assert_eq!(
        map.call::<fn(String) -> String>("label", ("x".to_string(),)),
        Ok("#x".to_string())
    );
}

#[test]
fn lookup_outside_the_map_names_the_alternatives() {
    let mut builder = builder_with([greet()]);
    builder
        .register_custom_for::<Foo>("Greet", Bindings::new().bind_fn::<Nullary>("hello", || 1))
        .expect("register");
    let registry = seal(builder);
    let map = registry.concept_map_for::<Foo>("Greet").expect("complete");

    let err = map.get("goodbye").expect_err("not bound");
    insta::assert_snapshot!(
        err.to_string().replace(std::any::type_name::<Foo>(), "Foo"),
        @"concept map for Greet / Foo has no operation `goodbye` (available: hello)"
    );
}

#[test]
fn preflight_reports_every_broken_key() {
    let mut builder = builder_with([greet(), loud()]).with_config(deferred());
    builder
        .register_custom_for::<Foo>("Greet", Bindings::new().bind_fn::<Nullary>("hello", || 1))
        .expect("Greet / Foo");
    builder
        .register_custom_for::<Foo>("Loud", Bindings::new())
        .expect("Loud / Foo");
    builder
        .register_custom_for::<Bar>("Greet", Bindings::new())
        .expect("Greet / Bar");
    let registry = seal(builder);

    let report = registry.preflight();
    assert!(!report.accepted());
    assert_eq!(report.checked, 3);
    assert_eq!(report.failure_classes, vec!["concept_map.incomplete".to_string()]);
    let keys: Vec<(&str, bool)> = report
        .failures
        .iter()
        .map(|failure| (failure.concept.as_str(), failure.model.ends_with("Foo")))
        .collect();
    assert_eq!(keys, vec![("Greet", false), ("Loud", true)]);

    let json = report.to_json().expect("report serializes");
    assert_eq!(json["reportKind"], "conmap.preflight.v1");
    assert_eq!(json["result"], "rejected");
}

#[test]
fn default_map_of_a_refining_concept_pulls_in_refined_operations() {
    let mut builder = builder_with([greet(), loud()]);
    builder
        .register_custom_for::<Foo>("Greet", Bindings::new().bind_fn::<Nullary>("hello", || 1))
        .expect("Greet / Foo");
    builder
        .register_default_for::<Foo>("Loud", Bindings::new().bind_fn::<Nullary>("shout", || 2))
        .expect("Loud / Foo default");
    let registry = seal(builder);

    let default = registry
        .default_map(&ConceptId::new("Loud"), ModelId::of::<Foo>())
        .expect("default resolves")
        .expect("default registered");
    assert_eq!(default.names().collect::<Vec<_>>(), vec!["hello", "shout"]);
    assert_eq!(
        default.provenance("hello"),
        Some(&Provenance::Refined(ConceptId::new("Greet")))
    );
    assert_eq!(default.provenance("shout"), Some(&Provenance::Explicit));
    let hello = default
        .get("hello")
        .and_then(|implementation| implementation.erased::<Nullary>())
        .expect("hello erases to its declared signature");
    assert_eq!(hello.call(()), 1);
}
