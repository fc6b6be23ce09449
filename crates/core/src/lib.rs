//! Hostlink Core: host-independent pieces of the marshalling layer
//!
//! Everything here can be used without a host callback table installed.
//!
//! # Modules
//!
//! - `abi`: Raw C ABI types (scalars, opaque handles, the argument slot union)
//! - `kind`: Kind tags and the static-type to kind mapping
//! - `value`: `TypedArgument`, the erased value sum type
//! - `error`: `ErrorKind` and `RaisedError`
//! - `registry`: Process-wide error registry with monotonic ids
//! - `expr`: Side-channel expression model

pub mod abi;
pub mod error;
pub mod expr;
pub mod kind;
pub mod registry;
pub mod value;

pub use abi::{
    DataStore, DataStoreNode, HostStatus, MArgument, MBool, MComplex, MImage, MInt, MLink,
    MNumericArray, MReal, MSparseArray, MTensor,
};
pub use error::{ErrorKind, RaisedError};
pub use expr::{Expr, ExprError};
pub use kind::{ArgumentKind, MArgumentType, Primitive};
pub use registry::{error_code, error_name};
pub use value::TypedArgument;

/// Result type used throughout the marshalling layer
pub type Result<T, E = RaisedError> = std::result::Result<T, E>;
