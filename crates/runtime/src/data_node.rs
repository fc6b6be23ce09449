//! Collection nodes
//!
//! [`GenericDataNode`] is an untyped reference to one node of a host
//! collection; [`DataNode<T>`] binds it to a static value type. Both borrow
//! the collection they came from, so they cannot outlive it.
//!
//! # Usage
//!
//! ```ignore
//! for node in list.nodes::<MInt>() {
//!     let (name, value) = node?.into_parts();
//! }
//! ```
//!
//! Binding a node to [`TypedArgument`] accepts any kind; the run-time kind is
//! then part of the value.

use crate::container::Container;
use crate::library::api;
use crate::passing::{ContainerKind, HostOwned, ModeFor};
use hostlink_core::abi::{DataStoreNode, MArgument, MComplex, MImage, MInt, MReal, MSparseArray};
use hostlink_core::kind::{self, ArgumentKind, MArgumentType};
use hostlink_core::registry::{self, error_name};
use hostlink_core::{Result, TypedArgument};
use std::ffi::{CStr, c_char};
use std::fmt;
use std::marker::PhantomData;

/// Untyped reference to a collection node; null marks the end of a list
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct GenericDataNode<'a> {
    raw: DataStoreNode,
    _list: PhantomData<&'a ()>,
}

impl<'a> GenericDataNode<'a> {
    /// # Safety
    /// `raw` must be null or a node of a collection that outlives `'a`.
    pub unsafe fn from_raw(raw: DataStoreNode) -> Self {
        Self {
            raw,
            _list: PhantomData,
        }
    }

    pub fn raw(&self) -> DataStoreNode {
        self.raw
    }

    pub fn is_null(&self) -> bool {
        self.raw.is_null()
    }

    /// Following node (null at the end)
    pub fn next(&self) -> GenericDataNode<'a> {
        if self.is_null() {
            return *self;
        }
        unsafe { Self::from_raw((api().data_store.node_next)(self.raw)) }
    }

    /// Node label; `None` for unnamed nodes
    pub fn name(&self) -> Option<String> {
        if self.is_null() {
            return None;
        }
        let mut out: *mut c_char = std::ptr::null_mut();
        let status = unsafe { (api().data_store.node_name)(self.raw, &mut out) };
        if status != 0 || out.is_null() {
            return None;
        }
        Some(unsafe { CStr::from_ptr(out) }.to_string_lossy().into_owned())
    }

    /// Run-time kind of the payload (`MArgument` if unknown)
    pub fn kind(&self) -> MArgumentType {
        if self.is_null() {
            return MArgumentType::MArgument;
        }
        let raw = unsafe { (api().data_store.node_data_type)(self.raw) };
        MArgumentType::from_raw(raw).unwrap_or(MArgumentType::MArgument)
    }

    /// Slot pointing at the payload storage
    pub fn raw_value(&self) -> Result<MArgument> {
        if self.is_null() {
            return Err(registry::raise(error_name::DL_NULL_RAW_NODE));
        }
        let mut arg = MArgument::null();
        let status = unsafe { (api().data_store.node_get_data)(self.raw, &mut arg) };
        if status != 0 || arg.is_null() {
            return registry::fail(error_name::DL_GET_NODE_DATA_ERROR, format!("status {status}"));
        }
        Ok(arg)
    }

    /// Payload together with its kind
    pub fn value(&self) -> Result<TypedArgument> {
        let ty = self.kind();
        let arg = self.raw_value()?;
        unsafe { TypedArgument::from_argument(&arg, ty) }.ok_or_else(|| {
            registry::raise(error_name::DL_INVALID_NODE_TYPE).with_debug(format!("node kind {ty}"))
        })
    }

    /// Bind to a static value type
    pub fn typed<T: NodeValue>(self) -> Result<DataNode<'a, T>> {
        DataNode::new(self)
    }
}

impl fmt::Debug for GenericDataNode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GenericDataNode({:p})", self.raw)
    }
}

/// Lazy forward iteration over a collection's nodes
pub struct DataListIter<'a> {
    current: GenericDataNode<'a>,
}

impl<'a> DataListIter<'a> {
    pub(crate) fn new(first: GenericDataNode<'a>) -> Self {
        Self { current: first }
    }
}

impl<'a> Iterator for DataListIter<'a> {
    type Item = GenericDataNode<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current.is_null() {
            return None;
        }
        let node = self.current;
        self.current = node.next();
        Some(node)
    }
}

impl std::iter::FusedIterator for DataListIter<'_> {}

/// Static types a node payload can be read as
pub trait NodeValue: Sized {
    /// Whether a node of kind `ty` can be read as `Self`
    fn accepts(ty: MArgumentType) -> bool;

    /// # Safety
    /// `arg` must point at node storage of kind `ty`, and `accepts(ty)` must hold.
    unsafe fn read(arg: &MArgument, ty: MArgumentType) -> Result<Self>;
}

macro_rules! node_value {
    ($($ty:ty => $kind:ident),* $(,)?) => {
        $(
            impl NodeValue for $ty {
                fn accepts(ty: MArgumentType) -> bool {
                    ty == <kind::$kind as ArgumentKind>::TYPE
                }

                unsafe fn read(arg: &MArgument, _: MArgumentType) -> Result<Self> {
                    Ok(unsafe { kind::$kind::read(arg) })
                }
            }
        )*
    };
}

node_value!(
    MInt => Integer,
    MReal => Real,
    MComplex => Complex,
    MSparseArray => SparseArray,
    MImage => Image,
);

impl NodeValue for bool {
    fn accepts(ty: MArgumentType) -> bool {
        ty == MArgumentType::Boolean
    }

    unsafe fn read(arg: &MArgument, _: MArgumentType) -> Result<Self> {
        Ok(unsafe { kind::Boolean::read(arg) } != 0)
    }
}

impl NodeValue for String {
    fn accepts(ty: MArgumentType) -> bool {
        ty == MArgumentType::UTF8String
    }

    unsafe fn read(arg: &MArgument, _: MArgumentType) -> Result<Self> {
        let ptr = unsafe { kind::Utf8String::read(arg) };
        if ptr.is_null() {
            return Ok(String::new());
        }
        Ok(unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned())
    }
}

impl NodeValue for TypedArgument {
    fn accepts(ty: MArgumentType) -> bool {
        ty != MArgumentType::MArgument
    }

    unsafe fn read(arg: &MArgument, ty: MArgumentType) -> Result<Self> {
        unsafe { TypedArgument::from_argument(arg, ty) }
            .ok_or_else(|| registry::raise(error_name::DL_INVALID_NODE_TYPE))
    }
}

/// Container payloads stay owned by the collection, so only host-owned views
/// can be bound to a node.
impl<K, P> NodeValue for Container<K, P>
where
    K: ContainerKind,
    P: ModeFor<K> + HostOwned,
{
    fn accepts(ty: MArgumentType) -> bool {
        ty == K::TYPE
    }

    unsafe fn read(arg: &MArgument, _: MArgumentType) -> Result<Self> {
        Ok(unsafe { Self::from_raw(K::read(arg)) })
    }
}

/// A node bound to value type `T`
pub struct DataNode<'a, T> {
    node: GenericDataNode<'a>,
    name: Option<String>,
    value: T,
}

impl<'a, T: NodeValue> DataNode<'a, T> {
    /// Bind `node`, failing for a null node or a payload of another kind
    pub fn new(node: GenericDataNode<'a>) -> Result<Self> {
        if node.is_null() {
            return Err(registry::raise(error_name::DL_NULL_RAW_NODE));
        }
        let ty = node.kind();
        if !T::accepts(ty) {
            return registry::fail(
                error_name::DL_INVALID_NODE_TYPE,
                format!("node holds {ty}, requested {}", std::any::type_name::<T>()),
            );
        }
        let arg = node.raw_value()?;
        let value = unsafe { T::read(&arg, ty)? };
        Ok(Self {
            node,
            name: node.name(),
            value,
        })
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    /// The bound value; scalars are copies, so edits stay in this view
    pub fn value_mut(&mut self) -> &mut T {
        &mut self.value
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn has_next(&self) -> bool {
        !self.node.next().is_null()
    }

    /// Bind the following node
    pub fn next<U: NodeValue>(&self) -> Result<DataNode<'a, U>> {
        DataNode::new(self.node.next())
    }

    /// Run-time kind of the payload
    pub fn value_type(&self) -> MArgumentType {
        self.node.kind()
    }

    pub fn node(&self) -> GenericDataNode<'a> {
        self.node
    }

    /// Split into `(name, value)`
    pub fn into_parts(self) -> (Option<String>, T) {
        (self.name, self.value)
    }
}

impl<'a, T: NodeValue> From<DataNode<'a, T>> for (Option<String>, T) {
    fn from(node: DataNode<'a, T>) -> Self {
        node.into_parts()
    }
}

impl<T: fmt::Debug> fmt::Debug for DataNode<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataNode")
            .field("name", &self.name)
            .field("value", &self.value)
            .finish()
    }
}
