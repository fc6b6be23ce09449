//! Typed argument slots
//!
//! [`PrimitiveWrapper<K>`] is a typed view of one call-argument slot of kind
//! `K`. Besides reading and writing the slot, it knows how to append a value
//! of its kind to a collection, which is the single place where per-kind
//! insertion lives ([`NodeKind`]).
//!
//! The erased kind ([`kind::Any`]) has no insertion of its own: the caller
//! must say which concrete kind the slot holds
//! ([`PrimitiveWrapper::add_to_data_store_as`]).

use crate::container::Container;
use crate::data_list::DataList;
use crate::library::api;
use crate::passing::{ContainerKind, Manual, Mutable};
use hostlink_core::abi::{DataStore, MArgument, MBool, MComplex, MInt, MReal};
use hostlink_core::kind::{self, ArgumentKind, MArgumentType};
use hostlink_core::registry::{self, error_name};
use hostlink_core::{Result, TypedArgument};
use std::ffi::{CString, c_char};
use std::marker::PhantomData;

/// Kinds that can be appended to a collection
pub trait NodeKind: ArgumentKind {
    /// Append `value` under `name` (null for unnamed)
    ///
    /// # Safety
    /// `ds` must be a live collection and `name` null or NUL-terminated. For
    /// container kinds the collection takes over `value`.
    unsafe fn add_raw(ds: DataStore, name: *const c_char, value: Self::Value);
}

macro_rules! node_kind {
    ($($kind:ident => $add:ident),* $(,)?) => {
        $(
            impl NodeKind for kind::$kind {
                unsafe fn add_raw(ds: DataStore, name: *const c_char, value: Self::Value) {
                    unsafe { (api().data_store.$add)(ds, name, value) }
                }
            }
        )*
    };
}

node_kind!(
    Boolean => add_boolean,
    Integer => add_integer,
    Real => add_real,
    Complex => add_complex,
    Utf8String => add_string,
    Tensor => add_tensor,
    SparseArray => add_sparse_array,
    NumericArray => add_numeric_array,
    Image => add_image,
    DataStore => add_data_store,
);

/// Checked target of an insertion: a live collection and an optional C label
pub(crate) struct Target {
    ds: DataStore,
    name: Option<CString>,
}

impl Target {
    pub(crate) fn new(ds: DataStore, name: Option<&str>) -> Result<Self> {
        if ds.is_null() {
            return Err(registry::raise(error_name::DL_NULL_RAW_DATA_STORE));
        }
        let name = match name {
            Some(n) => Some(CString::new(n).map_err(|_| {
                registry::raise(error_name::DL_PUSH_BACK_TYPE_ERROR)
                    .with_debug(format!("node name {n:?} contains NUL"))
            })?),
            None => None,
        };
        Ok(Self { ds, name })
    }

    fn name_ptr(&self) -> *const c_char {
        self.name.as_ref().map_or(std::ptr::null(), |n| n.as_ptr())
    }

    /// # Safety
    /// For container kinds the collection takes over `value`.
    pub(crate) unsafe fn add<K: NodeKind>(&self, value: K::Value) {
        tracing::trace!(kind = %K::TYPE, name = ?self.name, "add node");
        unsafe { K::add_raw(self.ds, self.name_ptr(), value) }
    }

    fn add_str(&self, value: &str) -> Result<()> {
        let text = CString::new(value).map_err(|_| {
            registry::raise(error_name::DL_PUSH_BACK_TYPE_ERROR)
                .with_debug("string value contains NUL")
        })?;
        // The host copies the string before returning.
        unsafe { self.add::<kind::Utf8String>(text.as_ptr().cast_mut()) };
        Ok(())
    }
}

/// Values that know their own kind and can be appended to a collection
///
/// Library-owned containers are handed over to the collection; everything
/// else is copied.
pub trait IntoNode {
    fn add_to(self, ds: DataStore, name: Option<&str>) -> Result<()>;
}

macro_rules! scalar_into_node {
    ($($ty:ty => $kind:ident),* $(,)?) => {
        $(
            impl IntoNode for $ty {
                fn add_to(self, ds: DataStore, name: Option<&str>) -> Result<()> {
                    let target = Target::new(ds, name)?;
                    unsafe { target.add::<kind::$kind>(self) };
                    Ok(())
                }
            }
        )*
    };
}

// `MBool` is a plain `i32`, so it is left out: an untyped integer literal
// must resolve to `MInt`.
scalar_into_node!(
    MInt => Integer,
    MReal => Real,
    MComplex => Complex,
);

impl IntoNode for bool {
    fn add_to(self, ds: DataStore, name: Option<&str>) -> Result<()> {
        let target = Target::new(ds, name)?;
        unsafe { target.add::<kind::Boolean>(MBool::from(self)) };
        Ok(())
    }
}

impl IntoNode for &str {
    fn add_to(self, ds: DataStore, name: Option<&str>) -> Result<()> {
        Target::new(ds, name)?.add_str(self)
    }
}

impl IntoNode for String {
    fn add_to(self, ds: DataStore, name: Option<&str>) -> Result<()> {
        self.as_str().add_to(ds, name)
    }
}

/// Container variants hand their raw handle over to the collection.
impl IntoNode for TypedArgument {
    fn add_to(self, ds: DataStore, name: Option<&str>) -> Result<()> {
        let target = Target::new(ds, name)?;
        unsafe {
            match self {
                TypedArgument::Boolean(v) => target.add::<kind::Boolean>(MBool::from(v)),
                TypedArgument::Integer(v) => target.add::<kind::Integer>(v),
                TypedArgument::Real(v) => target.add::<kind::Real>(v),
                TypedArgument::Complex(v) => target.add::<kind::Complex>(v),
                TypedArgument::Tensor(v) => target.add::<kind::Tensor>(v),
                TypedArgument::SparseArray(v) => target.add::<kind::SparseArray>(v),
                TypedArgument::NumericArray(v) => target.add::<kind::NumericArray>(v),
                TypedArgument::Image(v) => target.add::<kind::Image>(v),
                TypedArgument::UTF8String(s) => return target.add_str(&s),
                TypedArgument::DataStore(v) => target.add::<kind::DataStore>(v),
            }
        }
        Ok(())
    }
}

/// A library-owned container moves into the collection.
impl<K: ContainerKind + NodeKind> IntoNode for Container<K, Manual> {
    fn add_to(self, ds: DataStore, name: Option<&str>) -> Result<()> {
        let target = Target::new(ds, name)?;
        unsafe { target.add::<K>(self.into_raw()) };
        Ok(())
    }
}

/// Typed view of one call-argument slot
pub struct PrimitiveWrapper<'a, K: ArgumentKind> {
    arg: &'a mut MArgument,
    _kind: PhantomData<K>,
}

impl<'a, K: ArgumentKind> PrimitiveWrapper<'a, K> {
    /// Wrap a slot
    ///
    /// # Safety
    /// A non-null `arg` must point at live storage for a value of kind `K`
    /// (for [`kind::Any`], of whatever kind the caller later names) for as
    /// long as the wrapper lives.
    pub unsafe fn new(arg: &'a mut MArgument) -> Result<Self> {
        if arg.is_null() {
            return registry::fail(error_name::ARGUMENT_CREATE_NULL, format!("{} slot", K::TYPE));
        }
        Ok(Self {
            arg,
            _kind: PhantomData,
        })
    }

    pub fn get(&self) -> K::Value {
        unsafe { K::read(self.arg) }
    }

    pub fn set(&mut self, value: K::Value) {
        unsafe { K::write(self.arg, value) }
    }

    pub fn kind(&self) -> MArgumentType {
        K::TYPE
    }

    /// The wrapped slot
    pub fn raw(&self) -> MArgument {
        *self.arg
    }
}

impl<'a, K: NodeKind> PrimitiveWrapper<'a, K> {
    /// Append `value` as an unnamed node of kind `K`
    ///
    /// # Safety
    /// For container kinds `value` must be a live handle; the collection takes
    /// it over.
    pub unsafe fn add_data_store_node<P: Mutable>(
        list: &mut DataList<P>,
        value: K::Value,
    ) -> Result<()> {
        let target = Target::new(list.raw(), None)?;
        unsafe { target.add::<K>(value) };
        Ok(())
    }

    /// Append `value` as a node of kind `K` labelled `name`
    ///
    /// # Safety
    /// As for [`Self::add_data_store_node`].
    pub unsafe fn add_named_data_store_node<P: Mutable>(
        list: &mut DataList<P>,
        name: &str,
        value: K::Value,
    ) -> Result<()> {
        let target = Target::new(list.raw(), Some(name))?;
        unsafe { target.add::<K>(value) };
        Ok(())
    }

    /// Append this slot's value to `list`
    ///
    /// # Safety
    /// For container kinds the collection takes over the handle in the slot;
    /// nobody else may release it afterwards.
    pub unsafe fn add_to_data_store<P: Mutable>(
        &self,
        list: &mut DataList<P>,
        name: Option<&str>,
    ) -> Result<()> {
        let target = Target::new(list.raw(), name)?;
        unsafe { target.add::<K>(self.get()) };
        Ok(())
    }
}

impl PrimitiveWrapper<'_, kind::Any> {
    /// Append the slot's value, read as kind `ty`
    ///
    /// The erased kind itself cannot be stored and fails with
    /// `ArgumentAddNodeMArgument`.
    ///
    /// # Safety
    /// The wrapped slot must hold a value of kind `ty`. For container kinds the
    /// collection takes over the handle.
    pub unsafe fn add_to_data_store_as<P: Mutable>(
        &self,
        list: &mut DataList<P>,
        name: Option<&str>,
        ty: MArgumentType,
    ) -> Result<()> {
        if ty == MArgumentType::MArgument {
            return Err(registry::raise(error_name::ARGUMENT_ADD_NODE_MARGUMENT));
        }
        let target = Target::new(list.raw(), name)?;
        let slot = self.get();
        unsafe {
            match ty {
                MArgumentType::MArgument => {}
                MArgumentType::Boolean => target.add::<kind::Boolean>(kind::Boolean::read(&slot)),
                MArgumentType::Integer => target.add::<kind::Integer>(kind::Integer::read(&slot)),
                MArgumentType::Real => target.add::<kind::Real>(kind::Real::read(&slot)),
                MArgumentType::Complex => target.add::<kind::Complex>(kind::Complex::read(&slot)),
                MArgumentType::Tensor => target.add::<kind::Tensor>(kind::Tensor::read(&slot)),
                MArgumentType::SparseArray => {
                    target.add::<kind::SparseArray>(kind::SparseArray::read(&slot))
                }
                MArgumentType::NumericArray => {
                    target.add::<kind::NumericArray>(kind::NumericArray::read(&slot))
                }
                MArgumentType::Image => target.add::<kind::Image>(kind::Image::read(&slot)),
                MArgumentType::UTF8String => {
                    target.add::<kind::Utf8String>(kind::Utf8String::read(&slot))
                }
                MArgumentType::DataStore => {
                    target.add::<kind::DataStore>(kind::DataStore::read(&slot))
                }
            }
        }
        Ok(())
    }
}

/// Scalar slot types that are read by value
pub type IntegerArgument<'a> = PrimitiveWrapper<'a, kind::Integer>;
pub type RealArgument<'a> = PrimitiveWrapper<'a, kind::Real>;
pub type BooleanArgument<'a> = PrimitiveWrapper<'a, kind::Boolean>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim;
    use crate::tensor::{GenericTensor, TensorType};
    use hostlink_core::abi::MTensor;

    #[test]
    fn test_null_slot_is_rejected() {
        let mut arg = MArgument::null();
        let err = unsafe { PrimitiveWrapper::<kind::Integer>::new(&mut arg) }.err().unwrap();
        assert_eq!(err.name(), error_name::ARGUMENT_CREATE_NULL);
    }

    #[test]
    fn test_get_and_set() {
        let mut storage: MInt = 4;
        let mut arg = MArgument { integer: &mut storage };
        let mut w = unsafe { IntegerArgument::new(&mut arg) }.unwrap();
        assert_eq!(w.get(), 4);
        w.set(9);
        assert_eq!(w.get(), 9);
        assert_eq!(w.kind(), MArgumentType::Integer);
        drop(w);
        assert_eq!(storage, 9);
    }

    #[test]
    fn test_add_slot_value_to_list() {
        sim::install();
        let mut list = DataList::<Manual>::new().unwrap();
        let mut storage: MReal = 2.5;
        let mut arg = MArgument { real: &mut storage };
        let w = unsafe { RealArgument::new(&mut arg) }.unwrap();
        unsafe { w.add_to_data_store(&mut list, Some("r")) }.unwrap();
        unsafe { RealArgument::add_data_store_node(&mut list, 1.0) }.unwrap();
        assert_eq!(list.length(), 2);
        assert_eq!(list.front().name().as_deref(), Some("r"));
        assert_eq!(list.back().value().unwrap(), TypedArgument::Real(1.0));
    }

    #[test]
    fn test_erased_slot_needs_concrete_kind() {
        sim::install();
        let mut list = DataList::<Manual>::new().unwrap();
        let mut value: MInt = 11;
        let mut slot = MArgument { integer: &mut value };
        let w = unsafe { PrimitiveWrapper::<kind::Any>::new(&mut slot) }.unwrap();
        let err = unsafe { w.add_to_data_store_as(&mut list, None, MArgumentType::MArgument) }
            .unwrap_err();
        assert_eq!(err.name(), error_name::ARGUMENT_ADD_NODE_MARGUMENT);
        assert_eq!(list.length(), 0);

        unsafe { w.add_to_data_store_as(&mut list, None, MArgumentType::Integer) }.unwrap();
        assert_eq!(list.front().value().unwrap(), TypedArgument::Integer(11));
    }

    #[test]
    fn test_manual_container_moves_into_list() {
        sim::install();
        let t = GenericTensor::<Manual>::new(TensorType::Integer, &[3]).unwrap();
        let raw: MTensor = t.raw();
        let mut list = DataList::<Manual>::new().unwrap();
        list.push_back(t).unwrap();
        assert_eq!(sim::events(raw).frees, 0);
        assert!(sim::is_live(raw));
        drop(list);
        assert!(!sim::is_live(raw));
    }

    #[test]
    fn test_empty_list_rejects_insertion() {
        sim::install();
        let mut list = DataList::<Manual>::empty();
        let err = list.push_back(1i64).unwrap_err();
        assert_eq!(err.name(), error_name::DL_NULL_RAW_DATA_STORE);
        let err = unsafe { IntegerArgument::add_data_store_node(&mut list, 1) }.unwrap_err();
        assert_eq!(err.name(), error_name::DL_NULL_RAW_DATA_STORE);
    }

    #[test]
    fn test_name_with_nul_is_rejected() {
        sim::install();
        let mut list = DataList::<Manual>::new().unwrap();
        let err = list.push_named("a\0b", 1i64).unwrap_err();
        assert_eq!(err.name(), error_name::DL_PUSH_BACK_TYPE_ERROR);
    }
}
