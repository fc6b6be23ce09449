//! Heterogeneous ordered collections
//!
//! [`DataList<P>`] wraps a host collection: an ordered sequence of
//! optionally named nodes whose values may each be of a different kind.
//! Reading is lazy; nodes are fetched from the host as the iterator advances.
//!
//! ```ignore
//! let mut list = DataList::<Manual>::new()?;
//! list.push_named("n", 3i64)?;
//! list.push_back(tensor)?; // the list takes the tensor over
//! for value in list.values::<TypedArgument>() {
//!     println!("{:?}", value?.kind());
//! }
//! ```
//!
//! Collections are copied, never reference-counted, so `Shared` is not a
//! valid mode for them.

use crate::argument::{IntoNode, NodeKind, Target};
use crate::container::Container;
use crate::data_node::{DataListIter, DataNode, GenericDataNode, NodeValue};
use crate::library::api;
use crate::passing::{ContainerKind, Manual, ModeFor, Mutable};
use hostlink_core::abi::{DataStore, MInt};
use hostlink_core::kind;
use hostlink_core::registry::{self, error_name};
use hostlink_core::Result;

/// Container specialization for collections
pub type DataList<P> = Container<kind::DataStore, P>;

impl ContainerKind for kind::DataStore {
    fn clone_raw(raw: DataStore) -> Result<DataStore> {
        let copy = unsafe { (api().data_store.copy)(raw) };
        if copy.is_null() {
            return registry::fail(error_name::DL_CLONE_ERROR, "host returned no copy");
        }
        Ok(copy)
    }

    fn free(raw: DataStore) {
        unsafe { (api().data_store.free)(raw) }
    }

    /// Collections have no host reference count to drop.
    fn disown(_raw: DataStore) {}

    fn share_count(_raw: DataStore) -> MInt {
        0
    }
}

impl DataList<Manual> {
    /// New empty collection owned by the library
    pub fn new() -> Result<Self> {
        let raw = unsafe { (api().data_store.create)() };
        if raw.is_null() {
            return registry::fail(error_name::DL_CREATE_ERROR, "host returned no collection");
        }
        Ok(unsafe { Self::from_raw(raw) })
    }
}

impl<P: ModeFor<kind::DataStore>> DataList<P> {
    /// Number of nodes (0 when empty)
    pub fn length(&self) -> MInt {
        if self.is_empty() {
            return 0;
        }
        unsafe { (api().data_store.get_length)(self.raw()) }
    }

    /// First node (null when the list has none)
    pub fn front(&self) -> GenericDataNode<'_> {
        if self.is_empty() {
            return unsafe { GenericDataNode::from_raw(std::ptr::null_mut()) };
        }
        unsafe { GenericDataNode::from_raw((api().data_store.first_node)(self.raw())) }
    }

    /// Last node (null when the list has none)
    pub fn back(&self) -> GenericDataNode<'_> {
        if self.is_empty() {
            return unsafe { GenericDataNode::from_raw(std::ptr::null_mut()) };
        }
        unsafe { GenericDataNode::from_raw((api().data_store.last_node)(self.raw())) }
    }

    /// Untyped nodes, front to back
    pub fn iter(&self) -> DataListIter<'_> {
        DataListIter::new(self.front())
    }

    /// Nodes bound to `T`; a node of another kind yields `DLInvalidNodeType`
    pub fn nodes<'a, T: NodeValue + 'a>(
        &'a self,
    ) -> impl Iterator<Item = Result<DataNode<'a, T>>> + 'a {
        self.iter().map(DataNode::new)
    }

    /// Node values bound to `T`
    pub fn values<'a, T: NodeValue + 'a>(&'a self) -> impl Iterator<Item = Result<T>> + 'a {
        self.nodes::<T>().map(|n| n.map(|n| n.into_parts().1))
    }

    /// Node names (`None` for unnamed nodes)
    pub fn names(&self) -> impl Iterator<Item = Option<String>> + '_ {
        self.iter().map(|n| n.name())
    }
}

impl<P: ModeFor<kind::DataStore> + Mutable> DataList<P> {
    /// Append an unnamed node; the kind follows from the value's type
    pub fn push_back<T: IntoNode>(&mut self, value: T) -> Result<()> {
        value.add_to(self.raw(), None)
    }

    /// Append a node labelled `name`
    pub fn push_named<T: IntoNode>(&mut self, name: &str, value: T) -> Result<()> {
        value.add_to(self.raw(), Some(name))
    }

    /// Append a raw value as a node of the explicitly named kind `K`
    ///
    /// Needed for raw array handles, whose Rust type does not say whether
    /// they are tensors or numeric arrays.
    ///
    /// # Safety
    /// For container kinds `value` must be a live handle of kind `K`; the list
    /// takes it over.
    pub unsafe fn push_back_as<K: NodeKind>(&mut self, name: Option<&str>, value: K::Value) -> Result<()> {
        let target = Target::new(self.raw(), name)?;
        unsafe { target.add::<K>(value) };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::numeric_array::{GenericNumericArray, NumericArrayType};
    use crate::passing::{Automatic, Constant};
    use crate::sim;
    use crate::tensor::{GenericTensor, TensorType};
    use hostlink_core::abi::{MComplex, MReal};
    use hostlink_core::kind::MArgumentType;
    use hostlink_core::TypedArgument;

    #[test]
    fn test_mixed_kinds_keep_order() {
        sim::install();
        let mut list = DataList::<Manual>::new().unwrap();
        list.push_named("i", 1i64).unwrap();
        list.push_named("r", 2.0).unwrap();
        list.push_back(MComplex::new(0.0, 1.0)).unwrap();
        list.push_named("s", "three").unwrap();
        list.push_back(false).unwrap();

        assert_eq!(list.length(), 5);
        let kinds: Vec<_> = list.iter().map(|n| n.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                MArgumentType::Integer,
                MArgumentType::Real,
                MArgumentType::Complex,
                MArgumentType::UTF8String,
                MArgumentType::Boolean,
            ]
        );
        let names: Vec<_> = list.names().collect();
        assert_eq!(
            names,
            vec![Some("i".into()), Some("r".into()), None, Some("s".into()), None]
        );
    }

    #[test]
    fn test_homogeneous_values() {
        sim::install();
        let mut list = DataList::<Manual>::new().unwrap();
        for x in [1.5, 2.5, 3.5] {
            list.push_back(x).unwrap();
        }
        let values: Result<Vec<MReal>> = list.values::<MReal>().collect();
        assert_eq!(values.unwrap(), vec![1.5, 2.5, 3.5]);

        list.push_back(4i64).unwrap();
        let err = list.values::<MReal>().find_map(|v| v.err()).unwrap();
        assert_eq!(err.name(), error_name::DL_INVALID_NODE_TYPE);
    }

    #[test]
    fn test_empty_list_has_no_nodes() {
        let list = DataList::<Constant>::empty();
        assert_eq!(list.length(), 0);
        assert!(list.front().is_null());
        assert!(list.back().is_null());
        assert_eq!(list.iter().count(), 0);
    }

    #[test]
    fn test_clone_is_deep_and_manual() {
        sim::install();
        let mut list = DataList::<Manual>::new().unwrap();
        let t = GenericTensor::<Manual>::from_slice(&[2], &[1.0, 2.0]).unwrap();
        list.push_named("t", t).unwrap();

        let copy = list.try_clone().unwrap();
        assert_ne!(copy.raw(), list.raw());
        let original = list.front().typed::<GenericTensor<Automatic>>().unwrap();
        let copied = copy.front().typed::<GenericTensor<Automatic>>().unwrap();
        assert_ne!(original.value().raw(), copied.value().raw());

        let copy_raw = copy.raw();
        drop(copied);
        drop(copy);
        assert_eq!(sim::events(copy_raw).frees, 1);
        assert!(sim::is_live(list.raw()));
    }

    #[test]
    fn test_nested_lists() {
        sim::install();
        let mut inner = DataList::<Manual>::new().unwrap();
        inner.push_back(7i64).unwrap();
        let mut outer = DataList::<Manual>::new().unwrap();
        outer.push_named("inner", inner).unwrap();

        let node = outer.front().typed::<DataList<Automatic>>().unwrap();
        assert_eq!(node.name(), Some("inner"));
        let nested = node.value();
        assert_eq!(nested.length(), 1);
        assert_eq!(nested.front().value().unwrap(), TypedArgument::Integer(7));
    }

    #[test]
    fn test_raw_array_needs_explicit_kind() {
        sim::install();
        let array = GenericNumericArray::<Manual>::new(NumericArrayType::Real32, &[4]).unwrap();
        let tensor = GenericTensor::<Manual>::new(TensorType::Integer, &[1]).unwrap();
        let mut list = DataList::<Manual>::new().unwrap();
        unsafe {
            list.push_back_as::<kind::NumericArray>(Some("na"), array.into_raw())
                .unwrap();
            list.push_back_as::<kind::Tensor>(None, tensor.into_raw())
                .unwrap();
        }
        let kinds: Vec<_> = list.iter().map(|n| n.kind()).collect();
        assert_eq!(kinds, vec![MArgumentType::NumericArray, MArgumentType::Tensor]);
    }

    #[test]
    fn test_automatic_list_can_grow() {
        sim::install();
        let owned = DataList::<Manual>::new().unwrap();
        {
            let mut view = unsafe { DataList::<Automatic>::from_raw(owned.raw()) };
            view.push_back(1i64).unwrap();
        }
        assert_eq!(owned.length(), 1);
        assert!(sim::is_live(owned.raw()));
    }
}
