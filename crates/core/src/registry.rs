//! Process-wide error registry
//!
//! Holds every [`ErrorKind`] the library knows about. The registry is created
//! on first use (init-once, thread-safe) and seeded with the built-in kinds;
//! ids start at [`error_code::VERSION_ERROR`] and decrease by one per
//! registration, so user kinds get negative ids. Ids are never reused.
//!
//! # Usage
//!
//! ```
//! use hostlink_core::registry::{self, error_name};
//!
//! registry::register("Overflow", "value too large").unwrap();
//! let err = registry::raise("Overflow").with_debug("index=5");
//! assert!(err.id() < 0);
//!
//! let missing = registry::raise("NoSuchError");
//! assert_eq!(missing.name(), error_name::ERROR_MANAGER_THROW_NAME_ERROR);
//! ```
//!
//! Registration is expected during single-threaded setup; lookups may run
//! from any thread afterwards.

use crate::error::{ErrorKind, RaisedError};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

/// Status codes of the kinds with fixed ids
pub mod error_code {
    pub const VERSION_ERROR: i32 = 7;
    pub const FUNCTION_ERROR: i32 = 6;
    pub const MEMORY_ERROR: i32 = 5;
    pub const NUMERICAL_ERROR: i32 = 4;
    pub const DIMENSIONS_ERROR: i32 = 3;
    pub const RANK_ERROR: i32 = 2;
    pub const TYPE_ERROR: i32 = 1;
    pub const NO_ERROR: i32 = 0;
}

/// Names of the built-in kinds
pub mod error_name {
    pub const VERSION_ERROR: &str = "VersionError";
    pub const FUNCTION_ERROR: &str = "FunctionError";
    pub const MEMORY_ERROR: &str = "MemoryError";
    pub const NUMERICAL_ERROR: &str = "NumericalError";
    pub const DIMENSIONS_ERROR: &str = "DimensionsError";
    pub const RANK_ERROR: &str = "RankError";
    pub const TYPE_ERROR: &str = "TypeError";
    pub const NO_ERROR: &str = "NoError";

    pub const LIB_DATA_ERROR: &str = "LibDataError";
    pub const ARGUMENT_INDEX_ERROR: &str = "ArgumentIndexError";
    pub const ARGUMENT_NUMERIC_ARRAY_ERROR: &str = "ArgumentNumericArrayError";
    pub const ARGUMENT_TENSOR_ERROR: &str = "ArgumentTensorError";
    pub const ARGUMENT_DATA_LIST_ERROR: &str = "ArgumentDataListError";

    pub const ERROR_MANAGER_THROW_ID_ERROR: &str = "ErrorManagerThrowIdError";
    pub const ERROR_MANAGER_THROW_NAME_ERROR: &str = "ErrorManagerThrowNameError";
    pub const ERROR_MANAGER_CREATE_NAME_ERROR: &str = "ErrorManagerCreateNameError";

    pub const NUMERIC_ARRAY_INIT_ERROR: &str = "NumericArrayInitError";
    pub const NUMERIC_ARRAY_NEW_ERROR: &str = "NumericArrayNewError";
    pub const NUMERIC_ARRAY_CLONE_ERROR: &str = "NumericArrayCloneError";
    pub const NUMERIC_ARRAY_TYPE_ERROR: &str = "NumericArrayTypeError";
    pub const NUMERIC_ARRAY_SIZE_ERROR: &str = "NumericArraySizeError";
    pub const NUMERIC_ARRAY_INDEX_ERROR: &str = "NumericArrayIndexError";
    pub const NUMERIC_ARRAY_CONVERSION_ERROR: &str = "NumericArrayConversionError";

    pub const TENSOR_INIT_ERROR: &str = "TensorInitError";
    pub const TENSOR_NEW_ERROR: &str = "TensorNewError";
    pub const TENSOR_CLONE_ERROR: &str = "TensorCloneError";
    pub const TENSOR_TYPE_ERROR: &str = "TensorTypeError";
    pub const TENSOR_SIZE_ERROR: &str = "TensorSizeError";
    pub const TENSOR_INDEX_ERROR: &str = "TensorIndexError";

    pub const LINK_ENCODE_ERROR: &str = "LinkEncodeError";
    pub const LINK_PUT_PACKET_ERROR: &str = "LinkPutPacketError";
    pub const LINK_PROCESS_ERROR: &str = "LinkProcessError";
    pub const LINK_NOT_AVAILABLE_ERROR: &str = "LinkNotAvailableError";

    pub const DL_NULL_RAW_NODE: &str = "DLNullRawNode";
    pub const DL_INVALID_NODE_TYPE: &str = "DLInvalidNodeType";
    pub const DL_GET_NODE_DATA_ERROR: &str = "DLGetNodeDataError";
    pub const DL_NULL_RAW_DATA_STORE: &str = "DLNullRawDataStore";
    pub const DL_PUSH_BACK_TYPE_ERROR: &str = "DLPushBackTypeError";
    pub const DL_CREATE_ERROR: &str = "DLCreateError";
    pub const DL_CLONE_ERROR: &str = "DLCloneError";

    pub const ARGUMENT_CREATE_NULL: &str = "ArgumentCreateNull";
    pub const ARGUMENT_ADD_NODE_MARGUMENT: &str = "ArgumentAddNodeMArgument";

    pub const INVALID_OPEN_MODE: &str = "InvalidOpenMode";
    pub const PATH_NOT_VALIDATED: &str = "PathNotValidated";
    pub const OPEN_FILE_FAILED: &str = "OpenFileFailed";

    pub const ABORTED: &str = "Aborted";
}

use error_name::*;

/// Built-in kinds, in seeding order
const BUILTIN_ERRORS: &[(&str, &str)] = &[
    (VERSION_ERROR, "An error was caused by an incompatible function call. The library was compiled with a previous host library version."),
    (FUNCTION_ERROR, "An error occurred in the library function."),
    (MEMORY_ERROR, "An error was caused by failed memory allocation or insufficient memory."),
    (NUMERICAL_ERROR, "A numerical error was encountered."),
    (DIMENSIONS_ERROR, "An error caused by inconsistent dimensions or by exceeding array bounds."),
    (RANK_ERROR, "An error was caused by a tensor with an inconsistent rank."),
    (TYPE_ERROR, "An error caused by inconsistent types was encountered."),
    (NO_ERROR, "No errors occurred."),
    (LIB_DATA_ERROR, "Library data is not set."),
    (ARGUMENT_INDEX_ERROR, "An error was caused by an incorrect argument index."),
    (ARGUMENT_NUMERIC_ARRAY_ERROR, "An error was caused by a NumericArray argument."),
    (ARGUMENT_TENSOR_ERROR, "An error was caused by a Tensor argument."),
    (ARGUMENT_DATA_LIST_ERROR, "An error was caused by a DataStore argument."),
    (ERROR_MANAGER_THROW_ID_ERROR, "An exception was thrown with a non-existent id."),
    (ERROR_MANAGER_THROW_NAME_ERROR, "An exception was thrown with a non-existent name."),
    (ERROR_MANAGER_CREATE_NAME_ERROR, "An exception was registered with a name that already exists."),
    (NUMERIC_ARRAY_INIT_ERROR, "Failed to construct NumericArray."),
    (NUMERIC_ARRAY_NEW_ERROR, "Failed to create a new NumericArray."),
    (NUMERIC_ARRAY_CLONE_ERROR, "Failed to clone NumericArray."),
    (NUMERIC_ARRAY_TYPE_ERROR, "An error was caused by a NumericArray type mismatch."),
    (NUMERIC_ARRAY_SIZE_ERROR, "An error was caused by an incorrect NumericArray size."),
    (NUMERIC_ARRAY_INDEX_ERROR, "An error was caused by attempting to access a nonexistent NumericArray element."),
    (NUMERIC_ARRAY_CONVERSION_ERROR, "Failed to convert NumericArray from different type."),
    (TENSOR_INIT_ERROR, "Failed to construct Tensor."),
    (TENSOR_NEW_ERROR, "Failed to create a new MTensor."),
    (TENSOR_CLONE_ERROR, "Failed to clone MTensor."),
    (TENSOR_TYPE_ERROR, "An error was caused by an MTensor type mismatch."),
    (TENSOR_SIZE_ERROR, "An error was caused by an incorrect Tensor size."),
    (TENSOR_INDEX_ERROR, "An error was caused by attempting to access a nonexistent Tensor element."),
    (LINK_ENCODE_ERROR, "Could not encode an expression for the link."),
    (LINK_PUT_PACKET_ERROR, "Could not send a packet over the link."),
    (LINK_PROCESS_ERROR, "The host failed to process a packet sent over the link."),
    (LINK_NOT_AVAILABLE_ERROR, "No link to the host is available."),
    (DL_NULL_RAW_NODE, "DataStoreNode passed to Node wrapper was null"),
    (DL_INVALID_NODE_TYPE, "DataStoreNode passed to Node wrapper carries data of invalid type"),
    (DL_GET_NODE_DATA_ERROR, "DataStoreNode_getData failed"),
    (DL_NULL_RAW_DATA_STORE, "DataStore passed to DataList was null"),
    (DL_PUSH_BACK_TYPE_ERROR, "Element to be added to the DataList has incorrect type"),
    (DL_CREATE_ERROR, "Failed to create a new DataStore"),
    (DL_CLONE_ERROR, "Failed to copy DataStore"),
    (ARGUMENT_CREATE_NULL, "Trying to create Argument object from nullptr"),
    (ARGUMENT_ADD_NODE_MARGUMENT, "Trying to add DataStore Node of type MArgument (aka MType_Undef)"),
    (INVALID_OPEN_MODE, "Specified open mode is invalid."),
    (PATH_NOT_VALIDATED, "File path could not be validated under desired open mode."),
    (OPEN_FILE_FAILED, "Could not open file."),
    (ABORTED, "Computation aborted by the user."),
];

struct Registry {
    /// Registration order, which is also descending id order
    kinds: Vec<Arc<ErrorKind>>,
    by_name: HashMap<String, usize>,
    next_id: i32,
}

impl Registry {
    fn seeded() -> Self {
        let mut registry = Registry {
            kinds: Vec::with_capacity(BUILTIN_ERRORS.len()),
            by_name: HashMap::with_capacity(BUILTIN_ERRORS.len()),
            next_id: error_code::VERSION_ERROR,
        };
        for (name, message) in BUILTIN_ERRORS {
            registry.insert(name, message);
        }
        registry
    }

    fn insert(&mut self, name: &str, message: &str) -> Arc<ErrorKind> {
        let kind = Arc::new(ErrorKind::new(self.next_id, name, message));
        self.next_id -= 1;
        self.by_name.insert(name.to_string(), self.kinds.len());
        self.kinds.push(Arc::clone(&kind));
        kind
    }

    fn by_name(&self, name: &str) -> Option<&Arc<ErrorKind>> {
        self.by_name.get(name).map(|&i| &self.kinds[i])
    }

    fn by_id(&self, id: i32) -> Option<&Arc<ErrorKind>> {
        // Ids are contiguous and descending from the base.
        let index = usize::try_from(error_code::VERSION_ERROR.checked_sub(id)?).ok()?;
        self.kinds.get(index)
    }

    /// A built-in kind; these are seeded before the registry is reachable
    fn builtin(&self, name: &str) -> Arc<ErrorKind> {
        match self.by_name(name) {
            Some(kind) => Arc::clone(kind),
            None => Arc::new(ErrorKind::new(error_code::FUNCTION_ERROR, name, "")),
        }
    }
}

static REGISTRY: OnceLock<RwLock<Registry>> = OnceLock::new();

fn registry() -> &'static RwLock<Registry> {
    REGISTRY.get_or_init(|| {
        tracing::debug!(count = BUILTIN_ERRORS.len(), "seeding error registry");
        RwLock::new(Registry::seeded())
    })
}

fn read<R>(f: impl FnOnce(&Registry) -> R) -> R {
    let guard = registry().read().unwrap_or_else(PoisonError::into_inner);
    f(&guard)
}

fn write<R>(f: impl FnOnce(&mut Registry) -> R) -> R {
    let mut guard = registry().write().unwrap_or_else(PoisonError::into_inner);
    f(&mut guard)
}

/// Force initialization (seeding) of the registry
pub fn initialize() {
    let _ = registry();
}

/// Register a new error kind under the next free id
///
/// Re-registering a name with the same message is a no-op. Re-registering it
/// with a different message fails with `ErrorManagerCreateNameError` and leaves
/// the registry unchanged.
pub fn register(name: &str, message: &str) -> Result<(), RaisedError> {
    write(|reg| match reg.by_name(name) {
        Some(existing) if existing.message() == message => Ok(()),
        Some(existing) => {
            let existing_id = existing.id();
            Err(RaisedError::new(reg.builtin(ERROR_MANAGER_CREATE_NAME_ERROR))
                .with_debug(format!("{name} is already registered with id {existing_id}")))
        }
        None => {
            let kind = reg.insert(name, message);
            tracing::debug!(id = kind.id(), name, "registered error kind");
            Ok(())
        }
    })
}

/// Register each pair in order, stopping at the first failure
pub fn register_errors(errors: &[(&str, &str)]) -> Result<(), RaisedError> {
    for (name, message) in errors {
        register(name, message)?;
    }
    Ok(())
}

/// Look up a kind by id
pub fn find_error(id: i32) -> Result<Arc<ErrorKind>, RaisedError> {
    read(|reg| match reg.by_id(id) {
        Some(kind) => Ok(Arc::clone(kind)),
        None => Err(RaisedError::new(reg.builtin(ERROR_MANAGER_THROW_ID_ERROR))
            .with_debug(format!("no error with id {id}"))),
    })
}

/// Look up a kind by name
pub fn find_error_by_name(name: &str) -> Result<Arc<ErrorKind>, RaisedError> {
    read(|reg| match reg.by_name(name) {
        Some(kind) => Ok(Arc::clone(kind)),
        None => Err(RaisedError::new(reg.builtin(ERROR_MANAGER_THROW_NAME_ERROR))
            .with_debug(format!("no error named {name}"))),
    })
}

/// Raise the named error
///
/// An unknown name yields the lookup-failure error instead.
pub fn raise(name: &str) -> RaisedError {
    find_error_by_name(name).map_or_else(|e| e, RaisedError::new)
}

/// Raise the error with the given id
///
/// An unknown id yields the lookup-failure error instead.
pub fn raise_id(id: i32) -> RaisedError {
    find_error(id).map_or_else(|e| e, RaisedError::new)
}

/// `Err` of the named error with debug info attached
pub fn fail<T>(name: &str, debug: impl Into<String>) -> Result<T, RaisedError> {
    Err(raise(name).with_debug(debug))
}

/// Snapshot of every registered kind, in registration order
pub fn entries() -> Vec<Arc<ErrorKind>> {
    read(|reg| reg.kinds.clone())
}

/// Number of registered kinds
pub fn len() -> usize {
    read(|reg| reg.kinds.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_builtin_ids() {
        assert_eq!(find_error_by_name(VERSION_ERROR).unwrap().id(), 7);
        assert_eq!(find_error_by_name(FUNCTION_ERROR).unwrap().id(), error_code::FUNCTION_ERROR);
        assert_eq!(find_error_by_name(TYPE_ERROR).unwrap().id(), 1);
        assert_eq!(find_error_by_name(NO_ERROR).unwrap().id(), 0);
        assert_eq!(find_error_by_name(LIB_DATA_ERROR).unwrap().id(), -1);
        assert_eq!(find_error(-1).unwrap().name(), LIB_DATA_ERROR);
    }

    #[test]
    fn test_builtin_ids_strictly_decrease() {
        let all = entries();
        assert!(all.len() >= BUILTIN_ERRORS.len());
        for pair in all.windows(2) {
            assert_eq!(pair[0].id() - 1, pair[1].id());
        }
    }

    #[test]
    fn test_lookup_failures() {
        let err = find_error(i32::MIN).unwrap_err();
        assert_eq!(err.name(), ERROR_MANAGER_THROW_ID_ERROR);
        let err = find_error(8).unwrap_err();
        assert_eq!(err.name(), ERROR_MANAGER_THROW_ID_ERROR);
        let err = find_error_by_name("DefinitelyNotRegistered").unwrap_err();
        assert_eq!(err.name(), ERROR_MANAGER_THROW_NAME_ERROR);
        assert_eq!(raise("DefinitelyNotRegistered").name(), ERROR_MANAGER_THROW_NAME_ERROR);
    }

    #[test]
    #[serial]
    fn test_register_is_idempotent() {
        register("RegistryTestIdempotent", "same message").unwrap();
        let id = find_error_by_name("RegistryTestIdempotent").unwrap().id();
        let before = len();
        register("RegistryTestIdempotent", "same message").unwrap();
        assert_eq!(len(), before);
        assert_eq!(find_error_by_name("RegistryTestIdempotent").unwrap().id(), id);
        assert!(id < 0);
    }

    #[test]
    #[serial]
    fn test_duplicate_registration_leaves_entry_unchanged() {
        register("RegistryTestDuplicate", "first").unwrap();
        let kind = find_error_by_name("RegistryTestDuplicate").unwrap();
        let before = len();

        let err = register("RegistryTestDuplicate", "second").unwrap_err();
        assert_eq!(err.name(), ERROR_MANAGER_CREATE_NAME_ERROR);

        let after = find_error_by_name("RegistryTestDuplicate").unwrap();
        assert_eq!(after.id(), kind.id());
        assert_eq!(after.message(), "first");
        assert_eq!(len(), before);
    }

    #[test]
    #[serial]
    fn test_batch_registration_stops_at_failure() {
        register("RegistryTestBatchA", "a").unwrap();
        let result = register_errors(&[
            ("RegistryTestBatchB", "b"),
            ("RegistryTestBatchA", "not a"),
            ("RegistryTestBatchC", "c"),
        ]);
        assert!(result.is_err());
        assert!(find_error_by_name("RegistryTestBatchB").is_ok());
        assert!(find_error_by_name("RegistryTestBatchC").is_err());
    }

    #[test]
    #[serial]
    fn test_next_id_is_not_consumed_by_noop() {
        register("RegistryTestCounterA", "a").unwrap();
        register("RegistryTestCounterA", "a").unwrap();
        register("RegistryTestCounterB", "b").unwrap();
        let a = find_error_by_name("RegistryTestCounterA").unwrap().id();
        let b = find_error_by_name("RegistryTestCounterB").unwrap().id();
        assert_eq!(b, a - 1);
    }
}
