//! Function erasure.
//!
//! Turns any implementation of a [`Signature`] into an [`ErasedFn<S>`]: one
//! concrete type per signature, so implementations of different shapes slot
//! into identically typed dispatch-table entries.
//!
//! ```text
//! fn pointer  ──erase_fn──▶ ErasedFn::Bare(S)              (no allocation)
//! closure F   ──erase────▶ ErasedFn::Shared(Arc<dyn ..>)   (state boxed once)
//! ```
//!
//! A shared trait object is the (function reference, opaque context) pair:
//! the vtable entry takes the boxed context plus the call arguments.

use crate::signature::Signature;
use std::fmt;
use std::sync::Arc;

/// Anything callable with the argument tuple of `S`.
///
/// Blanket-implemented for every `Fn(A1, .., An) -> R + Send + Sync + 'static`
/// matching `S = fn(A1, .., An) -> R`.
pub trait Implements<S: Signature>: Send + Sync + 'static {
    fn call_packed(&self, args: S::Args) -> S::Output;
}

macro_rules! impl_implements {
    ($($arg:ident),*) => {
        impl<F, R, $($arg),*> Implements<fn($($arg),*) -> R> for F
        where
            F: Fn($($arg),*) -> R + Send + Sync + 'static,
            R: 'static,
            $($arg: 'static,)*
        {
            #[allow(non_snake_case)]
            #[inline]
            fn call_packed(&self, ($($arg,)*): ($($arg,)*)) -> R {
                self($($arg),*)
            }
        }
    };
}

impl_implements!();
impl_implements!(A1);
impl_implements!(A1, A2);
impl_implements!(A1, A2, A3);
impl_implements!(A1, A2, A3, A4);
impl_implements!(A1, A2, A3, A4, A5);
impl_implements!(A1, A2, A3, A4, A5, A6);

/// Uniformly shaped callable for signature `S`.
pub struct ErasedFn<S: Signature> {
    repr: Repr<S>,
}

enum Repr<S: Signature> {
    Bare(S),
    Shared(Arc<dyn Implements<S>>),
}

impl<S: Signature> ErasedFn<S> {
    /// Invoke with packed arguments.
    #[inline]
    pub fn call(&self, args: S::Args) -> S::Output {
        match &self.repr {
            Repr::Bare(f) => f.invoke(args),
            Repr::Shared(f) => f.call_packed(args),
        }
    }

    /// True when no heap context backs this function.
    pub fn is_bare(&self) -> bool {
        matches!(self.repr, Repr::Bare(_))
    }

    /// Whether both handles refer to the same underlying implementation.
    pub fn same_target(&self, other: &Self) -> bool {
        match (&self.repr, &other.repr) {
            (Repr::Bare(a), Repr::Bare(b)) => a == b,
            (Repr::Shared(a), Repr::Shared(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl<S: Signature> Clone for ErasedFn<S> {
    fn clone(&self) -> Self {
        let repr = match &self.repr {
            Repr::Bare(f) => Repr::Bare(*f),
            Repr::Shared(f) => Repr::Shared(Arc::clone(f)),
        };
        Self { repr }
    }
}

impl<S: Signature> fmt::Debug for ErasedFn<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_bare() { "bare" } else { "shared" };
        write!(f, "ErasedFn<{}>({kind})", std::any::type_name::<S>())
    }
}

/// Erase a capture-free implementation; never allocates.
///
/// Non-capturing closures coerce to `S` at the call site.
pub fn erase_fn<S: Signature>(f: S) -> ErasedFn<S> {
    ErasedFn {
        repr: Repr::Bare(f),
    }
}

/// Erase an implementation that may capture state.
pub fn erase<S, F>(f: F) -> ErasedFn<S>
where
    S: Signature,
    F: Implements<S>,
{
    ErasedFn {
        repr: Repr::Shared(Arc::new(f)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn double(x: i32) -> i32 {
        x * 2
    }

    #[test]
    fn bare_functions_skip_the_heap() {
        let erased = erase_fn::<fn(i32) -> i32>(double);
        assert!(erased.is_bare());
        assert_eq!(erased.call((21,)), double(21));

        let nullary = erase_fn::<fn() -> i32>(|| 7);
        assert!(nullary.is_bare());
        assert_eq!(nullary.call(()), 7);
    }

    #[test]
    fn capturing_closures_keep_their_state() {
        let offset = 10;
        let erased = erase::<fn(i32) -> i32, _>(move |x: i32| x + offset);
        assert!(!erased.is_bare());
        assert_eq!(erased.call((5,)), 15);
    }

    #[test]
    fn side_effects_match_direct_calls() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let erased =
            erase::<fn() -> usize, _>(move || counter.fetch_add(1, Ordering::SeqCst) + 1);

        assert_eq!(erased.call(()), 1);
        assert_eq!(erased.clone().call(()), 2);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn different_shapes_share_one_entry_type() {
        let k = String::from("!");
        let table: Vec<ErasedFn<fn(String) -> String>> = vec![
            erase_fn::<fn(String) -> String>(|s| s.to_uppercase()),
            erase::<fn(String) -> String, _>(move |s: String| format!("{s}{k}")),
        ];
        let out: Vec<String> = table.iter().map(|f| f.call(("hi".to_string(),))).collect();
        assert_eq!(out, vec!["HI".to_string(), "hi!".to_string()]);
    }

    #[test]
    fn clones_point_at_the_same_target() {
        let shared = erase::<fn() -> u8, _>(|| 1u8);
        assert!(shared.same_target(&shared.clone()));
        let other = erase::<fn() -> u8, _>(|| 1u8);
        assert!(!shared.same_target(&other));

        let bare = erase_fn::<fn(i32) -> i32>(double);
        assert!(bare.same_target(&bare.clone()));
        assert!(!bare.same_target(&erase::<fn(i32) -> i32, _>(double)));
    }
}
