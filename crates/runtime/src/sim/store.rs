//! Ordered collections
//!
//! A collection owns the container handles added to it: freeing the
//! collection frees them, copying it copies them.

use super::{World, handle, id_of, world};
use crate::library::DataStoreFunctions;
use hostlink_core::abi::{
    DataStore, DataStoreNode, MArgument, MBool, MComplex, MImage, MInt, MNumericArray, MReal,
    MSparseArray, MTensor,
};
use hostlink_core::kind::MArgumentType;
use std::cell::UnsafeCell;
use std::ffi::{CStr, CString, c_char, c_int};

const FAILED: c_int = 1;

/// Storage behind one node; large and aligned enough for every kind
#[repr(C, align(8))]
#[derive(Clone, Copy, Default)]
struct Slot {
    words: [u64; 2],
}

pub(super) struct Node {
    id: usize,
    name: Option<CString>,
    ty: MArgumentType,
    slot: Box<UnsafeCell<Slot>>,
    /// Backing buffer of a string payload
    text: Option<CString>,
}

impl Node {
    fn slot_ptr(&self) -> *mut Slot {
        self.slot.get()
    }

    /// Handle stored in a container payload
    fn handle_id(&self) -> usize {
        unsafe { *self.slot_ptr().cast::<usize>() }
    }
}

#[derive(Default)]
pub(super) struct Store {
    nodes: Vec<Node>,
}

impl World {
    fn create_store(&mut self) -> usize {
        let id = self.allocate_id();
        self.stores.insert(id, Store::default());
        id
    }

    fn push_node<V: Copy>(
        &mut self,
        store: usize,
        name: Option<CString>,
        ty: MArgumentType,
        value: V,
        text: Option<CString>,
    ) {
        const { assert!(std::mem::size_of::<V>() <= std::mem::size_of::<Slot>()) };
        if !self.stores.contains_key(&store) {
            tracing::warn!(store, %ty, "add to unknown collection");
            return;
        }
        let id = self.allocate_id();
        let slot = Box::new(UnsafeCell::new(Slot::default()));
        unsafe { slot.get().cast::<V>().write(value) };
        let Some(target) = self.stores.get_mut(&store) else {
            return;
        };
        let position = target.nodes.len();
        target.nodes.push(Node {
            id,
            name,
            ty,
            slot,
            text,
        });
        self.nodes.insert(id, (store, position));
    }

    fn node(&self, id: usize) -> Option<&Node> {
        let &(store, position) = self.nodes.get(&id)?;
        self.stores.get(&store)?.nodes.get(position)
    }

    pub(super) fn free_store(&mut self, id: usize) {
        let Some(store) = self.stores.remove(&id) else {
            tracing::warn!(handle = id, "free of unknown collection");
            return;
        };
        self.record(id).frees += 1;
        for node in store.nodes {
            self.nodes.remove(&node.id);
            match node.ty {
                MArgumentType::Tensor | MArgumentType::NumericArray => {
                    self.free_array(node.handle_id());
                }
                MArgumentType::DataStore => self.free_store(node.handle_id()),
                _ => {}
            }
        }
    }

    fn copy_store(&mut self, id: usize) -> Option<usize> {
        let source: Vec<_> = self
            .stores
            .get(&id)?
            .nodes
            .iter()
            .map(|n| {
                let slot = unsafe { *n.slot_ptr() };
                (n.name.clone(), n.ty, slot, n.text.clone(), n.handle_id())
            })
            .collect();
        let copy = self.create_store();
        for (name, ty, slot, text, nested) in source {
            match ty {
                MArgumentType::Tensor | MArgumentType::NumericArray => {
                    let Some(cloned) = self.clone_array(nested) else {
                        self.free_store(copy);
                        return None;
                    };
                    self.push_node(copy, name, ty, cloned, None);
                }
                MArgumentType::DataStore => {
                    let Some(cloned) = self.copy_store(nested) else {
                        self.free_store(copy);
                        return None;
                    };
                    self.push_node(copy, name, ty, cloned, None);
                }
                MArgumentType::UTF8String => {
                    let ptr = text.as_ref().map_or(std::ptr::null_mut(), |t| t.as_ptr().cast_mut());
                    self.push_node(copy, name, ty, ptr, text);
                }
                _ => self.push_node(copy, name, ty, slot, None),
            }
        }
        Some(copy)
    }
}

unsafe fn node_label(name: *const c_char) -> Option<CString> {
    if name.is_null() {
        return None;
    }
    Some(unsafe { CStr::from_ptr(name) }.to_owned())
}

unsafe fn add<V: Copy>(ds: DataStore, name: *const c_char, ty: MArgumentType, value: V) {
    let label = unsafe { node_label(name) };
    world().push_node(id_of(ds), label, ty, value, None);
}

unsafe extern "C" fn create() -> DataStore {
    handle(world().create_store())
}

unsafe extern "C" fn copy(ds: DataStore) -> DataStore {
    world()
        .copy_store(id_of(ds))
        .map_or(std::ptr::null_mut(), handle)
}

unsafe extern "C" fn free(ds: DataStore) {
    world().free_store(id_of(ds));
}

unsafe extern "C" fn get_length(ds: DataStore) -> MInt {
    world()
        .stores
        .get(&id_of(ds))
        .map_or(0, |s| s.nodes.len() as MInt)
}

unsafe extern "C" fn first_node(ds: DataStore) -> DataStoreNode {
    world()
        .stores
        .get(&id_of(ds))
        .and_then(|s| s.nodes.first())
        .map_or(std::ptr::null_mut(), |n| handle(n.id))
}

unsafe extern "C" fn last_node(ds: DataStore) -> DataStoreNode {
    world()
        .stores
        .get(&id_of(ds))
        .and_then(|s| s.nodes.last())
        .map_or(std::ptr::null_mut(), |n| handle(n.id))
}

unsafe extern "C" fn node_next(node: DataStoreNode) -> DataStoreNode {
    let w = world();
    let Some(&(store, position)) = w.nodes.get(&id_of(node)) else {
        return std::ptr::null_mut();
    };
    w.stores
        .get(&store)
        .and_then(|s| s.nodes.get(position + 1))
        .map_or(std::ptr::null_mut(), |n| handle(n.id))
}

unsafe extern "C" fn node_name(node: DataStoreNode, out: *mut *mut c_char) -> c_int {
    if out.is_null() {
        return FAILED;
    }
    let w = world();
    let Some(node) = w.node(id_of(node)) else {
        return FAILED;
    };
    let name = node
        .name
        .as_ref()
        .map_or(std::ptr::null_mut(), |n| n.as_ptr().cast_mut());
    unsafe { *out = name };
    0
}

unsafe extern "C" fn node_data_type(node: DataStoreNode) -> c_int {
    world()
        .node(id_of(node))
        .map_or(MArgumentType::MArgument.as_raw(), |n| n.ty.as_raw())
}

unsafe extern "C" fn node_get_data(node: DataStoreNode, out: *mut MArgument) -> c_int {
    if out.is_null() {
        return FAILED;
    }
    let w = world();
    let Some(node) = w.node(id_of(node)) else {
        return FAILED;
    };
    unsafe {
        *out = MArgument {
            integer: node.slot_ptr().cast(),
        }
    };
    0
}

unsafe extern "C" fn add_boolean(ds: DataStore, name: *const c_char, value: MBool) {
    unsafe { add(ds, name, MArgumentType::Boolean, value) }
}

unsafe extern "C" fn add_integer(ds: DataStore, name: *const c_char, value: MInt) {
    unsafe { add(ds, name, MArgumentType::Integer, value) }
}

unsafe extern "C" fn add_real(ds: DataStore, name: *const c_char, value: MReal) {
    unsafe { add(ds, name, MArgumentType::Real, value) }
}

unsafe extern "C" fn add_complex(ds: DataStore, name: *const c_char, value: MComplex) {
    unsafe { add(ds, name, MArgumentType::Complex, value) }
}

unsafe extern "C" fn add_string(ds: DataStore, name: *const c_char, value: *mut c_char) {
    let text = if value.is_null() {
        CString::default()
    } else {
        unsafe { CStr::from_ptr(value) }.to_owned()
    };
    let ptr = text.as_ptr().cast_mut();
    let label = unsafe { node_label(name) };
    world().push_node(id_of(ds), label, MArgumentType::UTF8String, ptr, Some(text));
}

unsafe extern "C" fn add_tensor(ds: DataStore, name: *const c_char, value: MTensor) {
    unsafe { add(ds, name, MArgumentType::Tensor, value) }
}

unsafe extern "C" fn add_sparse_array(ds: DataStore, name: *const c_char, value: MSparseArray) {
    unsafe { add(ds, name, MArgumentType::SparseArray, value) }
}

unsafe extern "C" fn add_numeric_array(ds: DataStore, name: *const c_char, value: MNumericArray) {
    unsafe { add(ds, name, MArgumentType::NumericArray, value) }
}

unsafe extern "C" fn add_image(ds: DataStore, name: *const c_char, value: MImage) {
    unsafe { add(ds, name, MArgumentType::Image, value) }
}

unsafe extern "C" fn add_data_store(ds: DataStore, name: *const c_char, value: DataStore) {
    if ds == value {
        tracing::warn!(handle = id_of(ds), "collection added to itself");
        return;
    }
    unsafe { add(ds, name, MArgumentType::DataStore, value) }
}

pub(super) const DATA_STORE: DataStoreFunctions = DataStoreFunctions {
    create,
    copy,
    free,
    get_length,
    first_node,
    last_node,
    node_next,
    node_name,
    node_data_type,
    node_get_data,
    add_boolean,
    add_integer,
    add_real,
    add_complex,
    add_string,
    add_tensor,
    add_sparse_array,
    add_numeric_array,
    add_image,
    add_data_store,
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{events, is_live, new_tensor};
    use crate::tensor::TensorType;

    fn integer_at(node: DataStoreNode) -> MInt {
        let mut arg = MArgument::null();
        assert_eq!(unsafe { node_get_data(node, &mut arg) }, 0);
        unsafe { *arg.integer }
    }

    #[test]
    fn test_nodes_keep_order_and_names() {
        unsafe {
            let ds = create();
            let name = CString::new("b").unwrap();
            add_integer(ds, std::ptr::null(), 1);
            add_integer(ds, name.as_ptr(), 2);
            assert_eq!(get_length(ds), 2);

            let first = first_node(ds);
            let second = node_next(first);
            assert_eq!(second, last_node(ds));
            assert!(node_next(second).is_null());
            assert_eq!(integer_at(first), 1);
            assert_eq!(integer_at(second), 2);

            let mut out: *mut c_char = std::ptr::null_mut();
            assert_eq!(node_name(first, &mut out), 0);
            assert!(out.is_null());
            assert_eq!(node_name(second, &mut out), 0);
            assert_eq!(CStr::from_ptr(out).to_str().unwrap(), "b");
            free(ds);
        }
    }

    #[test]
    fn test_free_releases_nested_handles() {
        unsafe {
            let outer = create();
            let inner = create();
            let t = new_tensor(TensorType::Real, &[2]);
            add_tensor(inner, std::ptr::null(), t);
            add_data_store(outer, std::ptr::null(), inner);
            free(outer);
            assert!(!is_live(inner));
            assert!(!is_live(t));
            assert_eq!(events(t).frees, 1);
        }
    }

    #[test]
    fn test_copy_is_deep() {
        unsafe {
            let ds = create();
            let t = new_tensor(TensorType::Integer, &[1]);
            add_tensor(ds, std::ptr::null(), t);
            let s = CString::new("hi").unwrap();
            add_string(ds, std::ptr::null(), s.as_ptr().cast_mut());

            let dup = copy(ds);
            assert_eq!(get_length(dup), 2);
            let mut arg = MArgument::null();
            node_get_data(first_node(dup), &mut arg);
            let copied = *arg.tensor;
            assert_ne!(copied, t);

            free(ds);
            assert!(is_live(copied));
            node_get_data(last_node(dup), &mut arg);
            assert_eq!(CStr::from_ptr(*arg.utf8string).to_str().unwrap(), "hi");
            free(dup);
            assert!(!is_live(copied));
        }
    }

    #[test]
    fn test_failed_copy_leaves_no_collection_behind() {
        let mut w = World::new();
        let ds = w.create_store();
        w.push_node(ds, None, MArgumentType::Integer, 5 as MInt, None);
        w.push_node(ds, None, MArgumentType::Tensor, usize::MAX, None);
        assert_eq!(w.copy_store(ds), None);
        assert_eq!(w.stores.len(), 1);
        assert!(w.stores.contains_key(&ds));
    }

    #[test]
    fn test_unknown_node_queries_fail() {
        let bogus: DataStoreNode = handle(usize::MAX);
        let mut arg = MArgument::null();
        unsafe {
            assert_ne!(node_get_data(bogus, &mut arg), 0);
            assert_eq!(node_data_type(bogus), 0);
            assert!(node_next(bogus).is_null());
        }
    }
}
