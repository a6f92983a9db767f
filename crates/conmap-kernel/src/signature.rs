//! Operation signatures and model identities.
//!
//! A signature is written as a plain function-pointer type, e.g.
//! `fn(i32, String) -> bool`. The pointer type doubles as the zero-allocation
//! representation of a capture-free implementation, so the same type both
//! names the calling convention and carries the fast path.
//!
//! Argument types must be `'static`; borrowed receivers are the business of
//! the container that owns the erased value, not of this kernel.

use std::any::{TypeId, type_name};
use std::fmt;

/// A calling convention: argument tuple in, output out.
///
/// Implemented for `fn(A1, .., An) -> R` with `n <= 6`.
pub trait Signature: Copy + PartialEq + Send + Sync + 'static {
    /// Arguments packed as a tuple (`()` for nullary operations).
    type Args: 'static;
    /// Return type.
    type Output: 'static;

    /// Call a bare function of this signature with packed arguments.
    fn invoke(self, args: Self::Args) -> Self::Output;

    /// Number of arguments.
    const ARITY: usize;
}

macro_rules! impl_signature {
    ($arity:expr; $($arg:ident),*) => {
        impl<R: 'static, $($arg: 'static),*> Signature for fn($($arg),*) -> R {
            type Args = ($($arg,)*);
            type Output = R;

            #[allow(non_snake_case)]
            #[inline]
            fn invoke(self, ($($arg,)*): Self::Args) -> R {
                self($($arg),*)
            }

            const ARITY: usize = $arity;
        }
    };
}

impl_signature!(0;);
impl_signature!(1; A1);
impl_signature!(2; A1, A2);
impl_signature!(3; A1, A2, A3);
impl_signature!(4; A1, A2, A3, A4);
impl_signature!(5; A1, A2, A3, A4, A5);
impl_signature!(6; A1, A2, A3, A4, A5, A6);

/// Runtime identity of a [`Signature`].
///
/// Equality is decided by `TypeId`; the name is carried for diagnostics.
#[derive(Clone, Copy)]
pub struct SignatureId {
    type_id: TypeId,
    name: &'static str,
    arity: usize,
}

impl SignatureId {
    pub fn of<S: Signature>() -> Self {
        Self {
            type_id: TypeId::of::<S>(),
            name: type_name::<S>(),
            arity: S::ARITY,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    pub fn is<S: Signature>(&self) -> bool {
        self.type_id == TypeId::of::<S>()
    }
}

impl PartialEq for SignatureId {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for SignatureId {}

impl std::hash::Hash for SignatureId {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
    }
}

impl fmt::Debug for SignatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SignatureId({})", self.name)
    }
}

impl fmt::Display for SignatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Identity of a model type: the `T` in "how `T` models concept `C`".
#[derive(Clone, Copy)]
pub struct ModelId {
    type_id: TypeId,
    name: &'static str,
}

impl ModelId {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for ModelId {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for ModelId {}

impl std::hash::Hash for ModelId {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
    }
}

impl fmt::Debug for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ModelId({})", self.name)
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}
