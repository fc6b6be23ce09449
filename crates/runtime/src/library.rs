//! Host callback tables
//!
//! The host hands the library one [`LibraryFunctions`] table when it loads it
//! (`hostlink_initialize`). Every handle operation in this crate goes through
//! that table; the library never touches host memory layouts directly.
//!
//! # Detached mode
//!
//! Before a table is installed (or after `hostlink_uninitialize`) [`api`]
//! returns a detached table: creation callbacks report failure, getters return
//! zero or null, and release callbacks do nothing. Code that needs a real host
//! can ask for one explicitly with [`library`], which fails with
//! `LibDataError`.

use crate::error::catch_library_errors;
use hostlink_core::abi::{
    DataStore, DataStoreNode, MArgument, MBool, MComplex, MImage, MInt, MLink, MNumericArray,
    MReal, MSparseArray, MTensor,
};
use hostlink_core::Result;
use hostlink_core::registry::{self, error_name};
use std::ffi::{c_char, c_int, c_void};
use std::sync::{Arc, PoisonError, RwLock};

/// Version of the callback table layout
pub const LIBRARY_VERSION: MInt = 1;

/// Tensor callbacks
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct TensorFunctions {
    pub new: unsafe extern "C" fn(MInt, MInt, *const MInt, *mut MTensor) -> c_int,
    pub clone: unsafe extern "C" fn(MTensor, *mut MTensor) -> c_int,
    pub free: unsafe extern "C" fn(MTensor),
    pub disown: unsafe extern "C" fn(MTensor),
    pub share_count: unsafe extern "C" fn(MTensor) -> MInt,
    pub get_type: unsafe extern "C" fn(MTensor) -> MInt,
    pub get_rank: unsafe extern "C" fn(MTensor) -> MInt,
    pub get_dimensions: unsafe extern "C" fn(MTensor) -> *const MInt,
    pub get_flattened_length: unsafe extern "C" fn(MTensor) -> MInt,
    pub get_integer_data: unsafe extern "C" fn(MTensor) -> *mut MInt,
    pub get_real_data: unsafe extern "C" fn(MTensor) -> *mut MReal,
    pub get_complex_data: unsafe extern "C" fn(MTensor) -> *mut MComplex,
}

/// Numeric array callbacks
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct NumericArrayFunctions {
    pub new: unsafe extern "C" fn(c_int, MInt, *const MInt, *mut MNumericArray) -> c_int,
    pub clone: unsafe extern "C" fn(MNumericArray, *mut MNumericArray) -> c_int,
    pub free: unsafe extern "C" fn(MNumericArray),
    pub disown: unsafe extern "C" fn(MNumericArray),
    pub share_count: unsafe extern "C" fn(MNumericArray) -> MInt,
    pub get_type: unsafe extern "C" fn(MNumericArray) -> c_int,
    pub get_rank: unsafe extern "C" fn(MNumericArray) -> MInt,
    pub get_dimensions: unsafe extern "C" fn(MNumericArray) -> *const MInt,
    pub get_flattened_length: unsafe extern "C" fn(MNumericArray) -> MInt,
    pub get_data: unsafe extern "C" fn(MNumericArray) -> *mut c_void,
    /// `(out, source, target type, method, tolerance)`
    pub convert_type:
        unsafe extern "C" fn(*mut MNumericArray, MNumericArray, c_int, c_int, MReal) -> c_int,
}

/// Ordered collection callbacks
///
/// Every `add_*` callback appends a trailing node; a null name means unnamed.
/// Container values added to a store are owned by the store afterwards.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct DataStoreFunctions {
    pub create: unsafe extern "C" fn() -> DataStore,
    pub copy: unsafe extern "C" fn(DataStore) -> DataStore,
    pub free: unsafe extern "C" fn(DataStore),
    pub get_length: unsafe extern "C" fn(DataStore) -> MInt,
    pub first_node: unsafe extern "C" fn(DataStore) -> DataStoreNode,
    pub last_node: unsafe extern "C" fn(DataStore) -> DataStoreNode,
    pub node_next: unsafe extern "C" fn(DataStoreNode) -> DataStoreNode,
    /// Writes the node's name (or null) into the out pointer
    pub node_name: unsafe extern "C" fn(DataStoreNode, *mut *mut c_char) -> c_int,
    pub node_data_type: unsafe extern "C" fn(DataStoreNode) -> c_int,
    pub node_get_data: unsafe extern "C" fn(DataStoreNode, *mut MArgument) -> c_int,
    pub add_boolean: unsafe extern "C" fn(DataStore, *const c_char, MBool),
    pub add_integer: unsafe extern "C" fn(DataStore, *const c_char, MInt),
    pub add_real: unsafe extern "C" fn(DataStore, *const c_char, MReal),
    pub add_complex: unsafe extern "C" fn(DataStore, *const c_char, MComplex),
    pub add_string: unsafe extern "C" fn(DataStore, *const c_char, *mut c_char),
    pub add_tensor: unsafe extern "C" fn(DataStore, *const c_char, MTensor),
    pub add_sparse_array: unsafe extern "C" fn(DataStore, *const c_char, MSparseArray),
    pub add_numeric_array: unsafe extern "C" fn(DataStore, *const c_char, MNumericArray),
    pub add_image: unsafe extern "C" fn(DataStore, *const c_char, MImage),
    pub add_data_store: unsafe extern "C" fn(DataStore, *const c_char, DataStore),
}

/// Side-channel link callbacks
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct LinkFunctions {
    /// Link attached to the call currently executing, or null
    pub main_link: unsafe extern "C" fn() -> MLink,
    /// Queue one encoded packet
    pub put_packet: unsafe extern "C" fn(MLink, *const u8, usize) -> c_int,
    /// Let the host evaluate queued packets
    pub process: unsafe extern "C" fn(MLink) -> c_int,
}

/// The full table handed over by the host
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct LibraryFunctions {
    pub version: MInt,
    pub tensor: TensorFunctions,
    pub numeric_array: NumericArrayFunctions,
    pub data_store: DataStoreFunctions,
    pub link: LinkFunctions,
    /// `(path, 'R' | 'W')`, nonzero when access is allowed
    pub validate_path: unsafe extern "C" fn(*const c_char, c_char) -> MBool,
    /// Nonzero when the user asked to abort
    pub abort_q: unsafe extern "C" fn() -> MInt,
}

static LIBRARY: RwLock<Option<Arc<LibraryFunctions>>> = RwLock::new(None);

/// Install the host's callback table
pub fn install(functions: LibraryFunctions) -> Result<()> {
    if functions.version != LIBRARY_VERSION {
        return registry::fail(
            error_name::VERSION_ERROR,
            format!(
                "host table version {} does not match {}",
                functions.version, LIBRARY_VERSION
            ),
        );
    }
    *LIBRARY.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(functions));
    tracing::debug!("host callback table installed");
    Ok(())
}

/// Detach from the host
pub fn uninstall() {
    *LIBRARY.write().unwrap_or_else(PoisonError::into_inner) = None;
    tracing::debug!("host callback table removed");
}

pub fn is_installed() -> bool {
    LIBRARY
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .is_some()
}

/// The installed table
pub fn library() -> Result<Arc<LibraryFunctions>> {
    match LIBRARY.read().unwrap_or_else(PoisonError::into_inner).as_ref() {
        Some(functions) => Ok(Arc::clone(functions)),
        None => registry::fail(error_name::LIB_DATA_ERROR, "no host callback table installed"),
    }
}

/// The installed table, or the detached one
pub fn api() -> Arc<LibraryFunctions> {
    match LIBRARY.read().unwrap_or_else(PoisonError::into_inner).as_ref() {
        Some(functions) => Arc::clone(functions),
        None => Arc::new(detached::TABLE),
    }
}

/// Fail with `Aborted` if the host has a pending abort request
pub fn check_abort() -> Result<()> {
    let aborted = unsafe { (api().abort_q)() } != 0;
    if aborted {
        return Err(registry::raise(error_name::ABORTED));
    }
    Ok(())
}

/// Host entry point: install the callback table
///
/// Returns `NoError` (0), `LibDataError` for a null table or `VersionError`
/// for a table of a different layout version.
///
/// # Safety
/// `functions` must be null or point to a valid table; it is copied.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hostlink_initialize(functions: *const LibraryFunctions) -> c_int {
    crate::logging::init_logging();
    registry::initialize();
    catch_library_errors(|| {
        if functions.is_null() {
            return registry::fail(error_name::LIB_DATA_ERROR, "null callback table");
        }
        install(unsafe { *functions })
    })
}

/// Host entry point: drop the callback table
#[unsafe(no_mangle)]
pub extern "C" fn hostlink_uninitialize() {
    uninstall();
}

mod detached {
    use super::*;
    use std::ptr;

    const FAILED: c_int = 1;

    unsafe extern "C" fn tensor_new(_: MInt, _: MInt, _: *const MInt, _: *mut MTensor) -> c_int {
        FAILED
    }
    unsafe extern "C" fn tensor_clone(_: MTensor, _: *mut MTensor) -> c_int {
        FAILED
    }
    unsafe extern "C" fn tensor_release(_: MTensor) {}
    unsafe extern "C" fn tensor_int(_: MTensor) -> MInt {
        0
    }
    unsafe extern "C" fn tensor_dims(_: MTensor) -> *const MInt {
        ptr::null()
    }
    unsafe extern "C" fn tensor_integer_data(_: MTensor) -> *mut MInt {
        ptr::null_mut()
    }
    unsafe extern "C" fn tensor_real_data(_: MTensor) -> *mut MReal {
        ptr::null_mut()
    }
    unsafe extern "C" fn tensor_complex_data(_: MTensor) -> *mut MComplex {
        ptr::null_mut()
    }

    unsafe extern "C" fn numeric_new(
        _: c_int,
        _: MInt,
        _: *const MInt,
        _: *mut MNumericArray,
    ) -> c_int {
        FAILED
    }
    unsafe extern "C" fn numeric_type(_: MNumericArray) -> c_int {
        0
    }
    unsafe extern "C" fn numeric_data(_: MNumericArray) -> *mut c_void {
        ptr::null_mut()
    }
    unsafe extern "C" fn numeric_convert(
        _: *mut MNumericArray,
        _: MNumericArray,
        _: c_int,
        _: c_int,
        _: MReal,
    ) -> c_int {
        FAILED
    }

    unsafe extern "C" fn store_create() -> DataStore {
        ptr::null_mut()
    }
    unsafe extern "C" fn store_copy(_: DataStore) -> DataStore {
        ptr::null_mut()
    }
    unsafe extern "C" fn store_free(_: DataStore) {}
    unsafe extern "C" fn store_length(_: DataStore) -> MInt {
        0
    }
    unsafe extern "C" fn store_node(_: DataStore) -> DataStoreNode {
        ptr::null_mut()
    }
    unsafe extern "C" fn node_next(_: DataStoreNode) -> DataStoreNode {
        ptr::null_mut()
    }
    unsafe extern "C" fn node_name(_: DataStoreNode, _: *mut *mut c_char) -> c_int {
        FAILED
    }
    unsafe extern "C" fn node_type(_: DataStoreNode) -> c_int {
        0
    }
    unsafe extern "C" fn node_data(_: DataStoreNode, _: *mut MArgument) -> c_int {
        FAILED
    }
    unsafe extern "C" fn add_boolean(_: DataStore, _: *const c_char, _: MBool) {}
    unsafe extern "C" fn add_integer(_: DataStore, _: *const c_char, _: MInt) {}
    unsafe extern "C" fn add_real(_: DataStore, _: *const c_char, _: MReal) {}
    unsafe extern "C" fn add_complex(_: DataStore, _: *const c_char, _: MComplex) {}
    unsafe extern "C" fn add_string(_: DataStore, _: *const c_char, _: *mut c_char) {}
    unsafe extern "C" fn add_tensor(_: DataStore, _: *const c_char, _: MTensor) {}
    unsafe extern "C" fn add_sparse(_: DataStore, _: *const c_char, _: MSparseArray) {}
    unsafe extern "C" fn add_image(_: DataStore, _: *const c_char, _: MImage) {}
    unsafe extern "C" fn add_store(_: DataStore, _: *const c_char, _: DataStore) {}

    unsafe extern "C" fn main_link() -> MLink {
        ptr::null_mut()
    }
    unsafe extern "C" fn put_packet(_: MLink, _: *const u8, _: usize) -> c_int {
        FAILED
    }
    unsafe extern "C" fn process(_: MLink) -> c_int {
        FAILED
    }
    unsafe extern "C" fn validate_path(_: *const c_char, _: c_char) -> MBool {
        0
    }
    unsafe extern "C" fn abort_q() -> MInt {
        0
    }

    pub(super) const TABLE: LibraryFunctions = LibraryFunctions {
        version: LIBRARY_VERSION,
        tensor: TensorFunctions {
            new: tensor_new,
            clone: tensor_clone,
            free: tensor_release,
            disown: tensor_release,
            share_count: tensor_int,
            get_type: tensor_int,
            get_rank: tensor_int,
            get_dimensions: tensor_dims,
            get_flattened_length: tensor_int,
            get_integer_data: tensor_integer_data,
            get_real_data: tensor_real_data,
            get_complex_data: tensor_complex_data,
        },
        numeric_array: NumericArrayFunctions {
            new: numeric_new,
            clone: tensor_clone,
            free: tensor_release,
            disown: tensor_release,
            share_count: tensor_int,
            get_type: numeric_type,
            get_rank: tensor_int,
            get_dimensions: tensor_dims,
            get_flattened_length: tensor_int,
            get_data: numeric_data,
            convert_type: numeric_convert,
        },
        data_store: DataStoreFunctions {
            create: store_create,
            copy: store_copy,
            free: store_free,
            get_length: store_length,
            first_node: store_node,
            last_node: store_node,
            node_next,
            node_name,
            node_data_type: node_type,
            node_get_data: node_data,
            add_boolean,
            add_integer,
            add_real,
            add_complex,
            add_string,
            add_tensor,
            add_sparse_array: add_sparse,
            add_numeric_array: add_tensor,
            add_image,
            add_data_store: add_store,
        },
        link: LinkFunctions {
            main_link,
            put_packet,
            process,
        },
        validate_path,
        abort_q,
    };
}
