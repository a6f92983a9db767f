//! Operation bindings: name → implementation.
//!
//! A [`Bindings`] value is the raw input to a merge: the explicit mappings
//! of one `build` call, a registered default map, or a registered custom map.

use crate::erase::{ErasedFn, Implements, erase, erase_fn};
use crate::error::ConceptError;
use crate::signature::{Signature, SignatureId};
use std::any::{Any, type_name};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// One bound implementation, already in its erased, signature-typed form.
///
/// Cloning shares the implementation; two clones are the same binding.
#[derive(Clone)]
pub struct Implementation {
    signature: SignatureId,
    shape: &'static str,
    function: Arc<dyn Any + Send + Sync>,
    same_target: fn(&ErasedAny, &ErasedAny) -> bool,
}

type ErasedAny = dyn Any + Send + Sync;

fn same_target<S: Signature>(a: &ErasedAny, b: &ErasedAny) -> bool {
    match (a.downcast_ref::<ErasedFn<S>>(), b.downcast_ref::<ErasedFn<S>>()) {
        (Some(a), Some(b)) => a.same_target(b),
        _ => false,
    }
}

impl Implementation {
    /// Bind an implementation that may capture state.
    pub fn new<S, F>(f: F) -> Self
    where
        S: Signature,
        F: Implements<S>,
    {
        Self {
            signature: SignatureId::of::<S>(),
            shape: type_name::<F>(),
            function: Arc::new(erase::<S, F>(f)),
            same_target: same_target::<S>,
        }
    }

    /// Bind a capture-free implementation (function item, fn pointer, or
    /// non-capturing closure).
    pub fn from_fn<S: Signature>(f: S) -> Self {
        Self {
            signature: SignatureId::of::<S>(),
            shape: type_name::<S>(),
            function: Arc::new(erase_fn(f)),
            same_target: same_target::<S>,
        }
    }

    pub fn signature(&self) -> SignatureId {
        self.signature
    }

    /// Type name of the implementation as it was bound.
    pub fn shape(&self) -> &'static str {
        self.shape
    }

    /// The erased function, if `S` is this binding's signature.
    pub fn erased<S: Signature>(&self) -> Option<ErasedFn<S>> {
        self.function.downcast_ref::<ErasedFn<S>>().cloned()
    }

    /// Whether both handles call the same target: clones of one binding, or
    /// two bindings of the same bare function.
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.function, &other.function)
            || (self.signature == other.signature
                && (self.same_target)(self.function.as_ref(), other.function.as_ref()))
    }
}

impl fmt::Debug for Implementation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Implementation")
            .field("signature", &self.signature)
            .field("shape", &self.shape)
            .finish()
    }
}

/// An ordered set of bindings for one (concept, model) pair.
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    entries: BTreeMap<String, Implementation>,
    duplicates: Vec<String>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name` to a closure or other stateful callable.
    pub fn bind<S, F>(self, name: impl Into<String>, f: F) -> Self
    where
        S: Signature,
        F: Implements<S>,
    {
        self.bind_implementation(name, Implementation::new::<S, F>(f))
    }

    /// Bind `name` to a capture-free function.
    pub fn bind_fn<S: Signature>(self, name: impl Into<String>, f: S) -> Self {
        self.bind_implementation(name, Implementation::from_fn(f))
    }

    pub fn bind_implementation(
        mut self,
        name: impl Into<String>,
        implementation: Implementation,
    ) -> Self {
        let name = name.into();
        if self.entries.contains_key(&name) {
            self.duplicates.push(name);
        } else {
            self.entries.insert(name, implementation);
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&Implementation> {
        self.entries.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Implementation)> {
        self.entries.iter().map(|(name, imp)| (name.as_str(), imp))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Reject names bound more than once; `origin` describes where the set
    /// came from for the error message.
    pub(crate) fn validate(&self, origin: impl FnOnce() -> String) -> Result<(), ConceptError> {
        match self.duplicates.first() {
            Some(name) => Err(ConceptError::DuplicateBinding {
                name: name.clone(),
                origin: origin(),
            }),
            None => Ok(()),
        }
    }

    pub(crate) fn into_entries(self) -> BTreeMap<String, Implementation> {
        self.entries
    }
}
