//! Generic container
//!
//! [`Container<K, P>`] wraps one raw host handle of kind `K` under passing
//! mode `P`. The per-kind modules ([`crate::tensor`], [`crate::numeric_array`],
//! [`crate::data_list`]) add shape and data accessors on top; lifecycle is the
//! same for all of them:
//!
//! - construction from a raw handle never clones
//! - [`Container::try_clone`] always deep-copies into a `Manual` container
//! - moving out (Rust move, [`Container::take`] or [`Container::into_raw`])
//!   leaves nothing behind to release
//! - drop calls [`release`] exactly once, then forgets the handle

use crate::passing::{
    ContainerKind, Manual, ModeFor, Passing, PassingMode, RawHandle, clone_handle, release,
    share_count,
};
use hostlink_core::abi::{MArgument, MInt};
use hostlink_core::Result;
use std::fmt;
use std::marker::PhantomData;

/// One host handle plus the rule for releasing it
pub struct Container<K: ContainerKind, P: PassingMode> {
    raw: K::Value,
    _marker: PhantomData<(K, P)>,
}

impl<K: ContainerKind, P: ModeFor<K>> Container<K, P> {
    /// Container that manages nothing
    pub fn empty() -> Self {
        Self {
            raw: <K::Value as RawHandle>::null(),
            _marker: PhantomData,
        }
    }

    /// Wrap an existing handle without cloning it
    ///
    /// # Safety
    /// `raw` must be null or a live handle of kind `K`, and `P` must describe
    /// who is responsible for it. Under `Manual` or `Shared` no other owner may
    /// release it.
    pub unsafe fn from_raw(raw: K::Value) -> Self {
        tracing::trace!(kind = %K::TYPE, mode = %P::MODE, handle = ?raw, "adopt");
        Self {
            raw,
            _marker: PhantomData,
        }
    }
}

impl<K: ContainerKind, P: PassingMode> Container<K, P> {
    /// The wrapped handle (null when empty)
    pub fn raw(&self) -> K::Value {
        self.raw
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_null()
    }

    pub fn mode(&self) -> Passing {
        P::MODE
    }

    /// Host reference count, 0 when empty or not shareable
    pub fn share_count(&self) -> MInt {
        share_count::<K>(self.raw)
    }

    /// Deep copy into a new container owned by the library
    pub fn try_clone(&self) -> Result<Container<K, Manual>> {
        let raw = clone_handle::<K>(self.raw)?;
        Ok(Container {
            raw,
            _marker: PhantomData,
        })
    }

    /// Move the handle out, leaving this container empty
    pub fn take(&mut self) -> Self {
        Self {
            raw: std::mem::replace(&mut self.raw, <K::Value as RawHandle>::null()),
            _marker: PhantomData,
        }
    }

    /// Give up responsibility for the handle without releasing it
    pub fn into_raw(self) -> K::Value {
        let this = std::mem::ManuallyDrop::new(self);
        this.raw
    }

    /// Release the handle now and become empty
    pub fn reset(&mut self) {
        release::<K>(self.raw, P::MODE);
        self.raw = <K::Value as RawHandle>::null();
    }

    /// Write the handle into a result slot
    ///
    /// Ownership is unchanged: the slot's own convention decides what the host
    /// does with the handle afterwards.
    ///
    /// # Safety
    /// `res` must point at writable storage for a value of kind `K`.
    pub unsafe fn pass(&self, res: &mut MArgument) {
        tracing::trace!(kind = %K::TYPE, handle = ?self.raw, "pass");
        unsafe { K::write(res, self.raw) }
    }
}

impl<K: ContainerKind> Container<K, Manual> {
    /// Replace the managed handle with a deep copy of `other`
    ///
    /// The copy is made first; the old handle is released before the new one
    /// is taken over.
    pub fn assign_from<Q: PassingMode>(&mut self, other: &Container<K, Q>) -> Result<()> {
        let copy = clone_handle::<K>(other.raw)?;
        self.reset();
        self.raw = copy;
        Ok(())
    }
}

impl<K: ContainerKind, P: PassingMode> Drop for Container<K, P> {
    fn drop(&mut self) {
        self.reset();
    }
}

impl<K: ContainerKind, P: PassingMode> fmt::Debug for Container<K, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("kind", &K::TYPE)
            .field("mode", &P::MODE)
            .field("raw", &self.raw)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::passing::{Automatic, Constant, Shared};
    use crate::sim;
    use crate::tensor::{GenericTensor, TensorType};
    use hostlink_core::kind;

    #[test]
    fn test_empty_container_releases_nothing() {
        sim::install();
        let c = Container::<kind::Tensor, Manual>::empty();
        assert!(c.is_empty());
        assert_eq!(c.share_count(), 0);
        assert_eq!(c.mode(), Passing::Manual);
        drop(c);
    }

    #[test]
    fn test_manual_drop_frees_once() {
        sim::install();
        let t = GenericTensor::<Manual>::new(TensorType::Real, &[2]).unwrap();
        let raw = t.raw();
        drop(t);
        assert_eq!(sim::events(raw).frees, 1);
        assert_eq!(sim::events(raw).disowns, 0);
    }

    #[test]
    fn test_automatic_and_constant_never_release() {
        sim::install();
        let raw = sim::new_tensor(TensorType::Integer, &[3]);
        drop(unsafe { GenericTensor::<Automatic>::from_raw(raw) });
        drop(unsafe { GenericTensor::<Constant>::from_raw(raw) });
        assert_eq!(sim::events(raw).frees, 0);
        assert_eq!(sim::events(raw).disowns, 0);
        assert!(sim::is_live(raw));
        sim::free_tensor(raw);
    }

    #[test]
    fn test_shared_drop_disowns() {
        sim::install();
        let raw = sim::new_tensor(TensorType::Real, &[1]);
        sim::share(raw);
        let shared = unsafe { GenericTensor::<Shared>::from_raw(raw) };
        assert_eq!(shared.share_count(), 1);
        drop(shared);
        assert_eq!(sim::events(raw).disowns, 1);
        assert_eq!(sim::events(raw).frees, 0);
        sim::free_tensor(raw);
    }

    #[test]
    fn test_take_leaves_source_empty() {
        sim::install();
        let mut a = GenericTensor::<Manual>::new(TensorType::Real, &[2]).unwrap();
        let raw = a.raw();
        let b = a.take();
        assert!(a.is_empty());
        drop(a);
        assert_eq!(sim::events(raw).frees, 0);
        drop(b);
        assert_eq!(sim::events(raw).frees, 1);
    }

    #[test]
    fn test_clone_is_manual_and_independent() {
        sim::install();
        let raw = sim::new_tensor(TensorType::Real, &[4]);
        let source = unsafe { GenericTensor::<Automatic>::from_raw(raw) };
        let copy = source.try_clone().unwrap();
        assert_eq!(copy.mode(), Passing::Manual);
        assert_ne!(copy.raw(), raw);

        let copy_raw = copy.raw();
        drop(copy);
        assert_eq!(sim::events(copy_raw).frees, 1);
        assert!(sim::is_live(raw));
        assert_eq!(sim::events(raw).frees, 0);
        drop(source);
        sim::free_tensor(raw);
    }

    #[test]
    fn test_assign_from_releases_old_handle() {
        sim::install();
        let mut lhs = GenericTensor::<Manual>::new(TensorType::Real, &[2]).unwrap();
        let old = lhs.raw();
        let raw = sim::new_tensor(TensorType::Real, &[5]);
        let rhs = unsafe { GenericTensor::<Constant>::from_raw(raw) };

        lhs.assign_from(&rhs).unwrap();
        assert_eq!(sim::events(old).frees, 1);
        assert_ne!(lhs.raw(), raw);
        assert_eq!(lhs.flattened_length(), 5);

        drop(rhs);
        assert!(sim::is_live(raw));
        sim::free_tensor(raw);
    }

    #[test]
    fn test_into_raw_skips_release() {
        sim::install();
        let t = GenericTensor::<Manual>::new(TensorType::Integer, &[1]).unwrap();
        let raw = t.into_raw();
        assert_eq!(sim::events(raw).frees, 0);
        sim::free_tensor(raw);
    }

    #[test]
    fn test_pass_writes_handle() {
        sim::install();
        let t = GenericTensor::<Manual>::new(TensorType::Integer, &[1]).unwrap();
        let mut out: hostlink_core::abi::MTensor = std::ptr::null_mut();
        let mut res = MArgument { tensor: &mut out };
        unsafe { t.pass(&mut res) };
        assert_eq!(out, t.raw());
        assert_eq!(t.mode(), Passing::Manual);
    }
}
