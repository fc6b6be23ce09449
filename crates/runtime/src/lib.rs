//! Hostlink Runtime: marshalling between native library code and a dynamic host
//!
//! Key design principles:
//! - Passing mode: a type parameter that decides who releases a host handle
//! - Container: one raw handle plus its passing mode, one lifecycle for every kind
//! - DataList: heterogeneous ordered collection, read through typed node views
//! - Boundary: every entry point returns a single integer status; errors and
//!   panics never cross into the host
//!
//! All handle operations go through the callback table the host installs with
//! `hostlink_initialize`. The [`sim`] module provides an in-process table.

pub mod args;
pub mod argument;
pub mod config;
pub mod container;
pub mod data_list;
pub mod data_node;
pub mod error;
pub mod file;
pub mod library;
pub mod logging;
pub mod numeric_array;
pub mod passing;
pub mod sim;
pub mod tensor;
pub mod transport;

pub use hostlink_core as core;
pub use hostlink_core::{
    ErrorKind, Expr, MArgument, MArgumentType, MBool, MComplex, MInt, MReal, RaisedError, Result,
    TypedArgument, error_code, error_name, registry,
};

// Passing modes and containers
pub use container::Container;
pub use passing::{Automatic, Constant, HostOwned, Manual, Mutable, Passing, PassingMode, Shared};

pub use data_list::DataList;
pub use data_node::{DataListIter, DataNode, GenericDataNode, NodeValue};
pub use numeric_array::{ConversionMethod, GenericNumericArray, NumericArrayType};
pub use tensor::{GenericTensor, TensorType};

// Argument slots
pub use args::ArgumentManager;
pub use argument::{IntoNode, NodeKind, PrimitiveWrapper};

// Boundary and side channel (exported for the host)
pub use error::{
    catch_library_errors, hostlink_clear_error, hostlink_error_code, hostlink_get_error,
    hostlink_has_error, hostlink_take_error,
};
pub use library::{check_abort, hostlink_initialize, hostlink_uninitialize};
pub use transport::{
    SendParameters, hostlink_send_registered_errors, hostlink_set_exception_details_symbol,
};
