//! Passing modes
//!
//! A passing mode decides who releases a host handle and how:
//!
//! | mode        | owner   | on drop                      | writable |
//! |-------------|---------|------------------------------|----------|
//! | `Automatic` | host    | nothing                      | yes      |
//! | `Manual`    | library | `free`                       | yes      |
//! | `Shared`    | both    | `disown` (never a hard free) | yes      |
//! | `Constant`  | host    | nothing                      | no       |
//!
//! The mode is a type parameter of every container, fixed at construction and
//! never inferred from usage. Two trait bounds enforce the table at compile
//! time: write accessors need [`Mutable`] (not implemented for [`Constant`]),
//! and a container of kind `K` can only be built in modes implementing
//! [`ModeFor<K>`] (`Shared` only for [`Shareable`] kinds).
//!
//! All cleanup goes through one function, [`release`].
//!
//! A `Constant` tensor has no write accessors:
//!
//! ```compile_fail
//! use hostlink::{Constant, GenericTensor, MReal};
//! fn zero(t: &mut GenericTensor<Constant>) {
//!     t.data_mut::<MReal>().unwrap()[0] = 0.0;
//! }
//! ```
//!
//! and a data list cannot be shared:
//!
//! ```compile_fail
//! use hostlink::{DataList, Shared};
//! let _list: DataList<Shared> = DataList::empty();
//! ```

use hostlink_core::abi::MInt;
use hostlink_core::kind::ArgumentKind;
use hostlink_core::Result;
use std::fmt;

/// Run-time view of a passing mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Passing {
    Automatic,
    Manual,
    Shared,
    Constant,
}

impl fmt::Display for Passing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Passing::Automatic => "Automatic",
            Passing::Manual => "Manual",
            Passing::Shared => "Shared",
            Passing::Constant => "Constant",
        };
        f.write_str(name)
    }
}

mod sealed {
    pub trait Sealed {}
}

/// Compile-time passing mode
pub trait PassingMode: sealed::Sealed {
    const MODE: Passing;
}

/// Modes that allow in-place mutation
pub trait Mutable: PassingMode {}

/// The host owns the handle
#[derive(Debug, Clone, Copy)]
pub struct Automatic;

/// The library owns the handle exclusively
#[derive(Debug, Clone, Copy)]
pub struct Manual;

/// The host reference-counts the handle
#[derive(Debug, Clone, Copy)]
pub struct Shared;

/// Read-only view of a host-owned handle
#[derive(Debug, Clone, Copy)]
pub struct Constant;

macro_rules! passing_mode {
    ($($mode:ident),*) => {
        $(
            impl sealed::Sealed for $mode {}
            impl PassingMode for $mode {
                const MODE: Passing = Passing::$mode;
            }
        )*
    };
}

passing_mode!(Automatic, Manual, Shared, Constant);

impl Mutable for Automatic {}
impl Mutable for Manual {}
impl Mutable for Shared {}

/// Modes in which the host keeps ownership (drop never releases)
pub trait HostOwned: PassingMode {}

impl HostOwned for Automatic {}
impl HostOwned for Constant {}

/// Opaque host handle
pub trait RawHandle: Copy + fmt::Debug {
    fn null() -> Self;
    fn is_null(self) -> bool;
}

impl<T> RawHandle for *mut T {
    fn null() -> Self {
        std::ptr::null_mut()
    }

    fn is_null(self) -> bool {
        <*mut T>::is_null(self)
    }
}

/// Per-kind handle operations supplied by the host
///
/// Implemented for every kind a container can wrap.
pub trait ContainerKind: ArgumentKind<Value: RawHandle> {
    /// Deep copy into a new, independent handle
    fn clone_raw(raw: Self::Value) -> Result<Self::Value>;

    fn free(raw: Self::Value);

    fn disown(raw: Self::Value);

    /// Host reference count; 0 or negative for kinds that cannot be shared
    fn share_count(raw: Self::Value) -> MInt;
}

/// Kinds the host can reference-count
pub trait Shareable: ContainerKind {}

/// Passing modes valid for containers of kind `K`
pub trait ModeFor<K: ContainerKind>: PassingMode {}

impl<K: ContainerKind> ModeFor<K> for Automatic {}
impl<K: ContainerKind> ModeFor<K> for Manual {}
impl<K: ContainerKind> ModeFor<K> for Constant {}
impl<K: Shareable> ModeFor<K> for Shared {}

/// Release a handle according to its passing mode
///
/// A null handle is a no-op in every mode.
pub fn release<K: ContainerKind>(raw: K::Value, mode: Passing) {
    if raw.is_null() {
        return;
    }
    match mode {
        Passing::Manual => {
            tracing::debug!(kind = %K::TYPE, handle = ?raw, "free");
            K::free(raw);
        }
        Passing::Shared => {
            tracing::debug!(kind = %K::TYPE, handle = ?raw, "disown");
            K::disown(raw);
        }
        Passing::Automatic | Passing::Constant => {}
    }
}

/// Deep-copy a handle; the copy is always owned by the caller (Manual)
///
/// Copying a null handle yields a null handle.
pub fn clone_handle<K: ContainerKind>(raw: K::Value) -> Result<K::Value> {
    if raw.is_null() {
        return Ok(raw);
    }
    let copy = K::clone_raw(raw)?;
    tracing::debug!(kind = %K::TYPE, from = ?raw, to = ?copy, "clone");
    Ok(copy)
}

/// Host share count of a handle (0 for a null handle)
pub fn share_count<K: ContainerKind>(raw: K::Value) -> MInt {
    if raw.is_null() {
        return 0;
    }
    K::share_count(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_constants() {
        assert_eq!(Automatic::MODE, Passing::Automatic);
        assert_eq!(Manual::MODE, Passing::Manual);
        assert_eq!(Shared::MODE, Passing::Shared);
        assert_eq!(Constant::MODE, Passing::Constant);
        assert_eq!(Passing::Shared.to_string(), "Shared");
    }

    fn is_mutable<P: Mutable>() -> bool {
        true
    }

    #[test]
    fn test_mutable_modes() {
        assert!(is_mutable::<Automatic>());
        assert!(is_mutable::<Manual>());
        assert!(is_mutable::<Shared>());
    }
}
