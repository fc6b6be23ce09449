//! Erased typed values
//!
//! [`TypedArgument`] is the closed sum over every concrete kind's
//! representation. It is what a reader gets when the kind of a slot or node is
//! only known at run time: match on it exhaustively instead of guessing.

use crate::abi::{
    DataStore, MArgument, MComplex, MImage, MInt, MNumericArray, MReal, MSparseArray, MTensor,
};
use crate::kind::{self, ArgumentKind, MArgumentType};
use std::ffi::CStr;

/// A value together with its run-time kind
///
/// Container variants carry the raw handle only; they do not own it.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedArgument {
    Boolean(bool),
    Integer(MInt),
    Real(MReal),
    Complex(MComplex),
    Tensor(MTensor),
    SparseArray(MSparseArray),
    NumericArray(MNumericArray),
    Image(MImage),
    UTF8String(String),
    DataStore(DataStore),
}

impl TypedArgument {
    pub fn kind(&self) -> MArgumentType {
        match self {
            TypedArgument::Boolean(_) => MArgumentType::Boolean,
            TypedArgument::Integer(_) => MArgumentType::Integer,
            TypedArgument::Real(_) => MArgumentType::Real,
            TypedArgument::Complex(_) => MArgumentType::Complex,
            TypedArgument::Tensor(_) => MArgumentType::Tensor,
            TypedArgument::SparseArray(_) => MArgumentType::SparseArray,
            TypedArgument::NumericArray(_) => MArgumentType::NumericArray,
            TypedArgument::Image(_) => MArgumentType::Image,
            TypedArgument::UTF8String(_) => MArgumentType::UTF8String,
            TypedArgument::DataStore(_) => MArgumentType::DataStore,
        }
    }

    /// Read the value behind a slot of kind `ty`
    ///
    /// Returns `None` for the erased kind, which has no value of its own.
    /// Strings are copied out (invalid UTF-8 is replaced).
    ///
    /// # Safety
    /// `arg` must point at live storage holding a value of kind `ty`; for
    /// strings the stored pointer must be null or NUL-terminated.
    pub unsafe fn from_argument(arg: &MArgument, ty: MArgumentType) -> Option<Self> {
        let value = unsafe {
            match ty {
                MArgumentType::MArgument => return None,
                MArgumentType::Boolean => TypedArgument::Boolean(kind::Boolean::read(arg) != 0),
                MArgumentType::Integer => TypedArgument::Integer(kind::Integer::read(arg)),
                MArgumentType::Real => TypedArgument::Real(kind::Real::read(arg)),
                MArgumentType::Complex => TypedArgument::Complex(kind::Complex::read(arg)),
                MArgumentType::Tensor => TypedArgument::Tensor(kind::Tensor::read(arg)),
                MArgumentType::SparseArray => {
                    TypedArgument::SparseArray(kind::SparseArray::read(arg))
                }
                MArgumentType::NumericArray => {
                    TypedArgument::NumericArray(kind::NumericArray::read(arg))
                }
                MArgumentType::Image => TypedArgument::Image(kind::Image::read(arg)),
                MArgumentType::UTF8String => {
                    let ptr = kind::Utf8String::read(arg);
                    let s = if ptr.is_null() {
                        String::new()
                    } else {
                        CStr::from_ptr(ptr).to_string_lossy().into_owned()
                    };
                    TypedArgument::UTF8String(s)
                }
                MArgumentType::DataStore => TypedArgument::DataStore(kind::DataStore::read(arg)),
            }
        };
        Some(value)
    }

    pub fn as_integer(&self) -> Option<MInt> {
        match self {
            TypedArgument::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_real(&self) -> Option<MReal> {
        match self {
            TypedArgument::Real(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            TypedArgument::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            TypedArgument::UTF8String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<bool> for TypedArgument {
    fn from(v: bool) -> Self {
        TypedArgument::Boolean(v)
    }
}

impl From<MInt> for TypedArgument {
    fn from(v: MInt) -> Self {
        TypedArgument::Integer(v)
    }
}

impl From<MReal> for TypedArgument {
    fn from(v: MReal) -> Self {
        TypedArgument::Real(v)
    }
}

impl From<MComplex> for TypedArgument {
    fn from(v: MComplex) -> Self {
        TypedArgument::Complex(v)
    }
}

impl From<&str> for TypedArgument {
    fn from(v: &str) -> Self {
        TypedArgument::UTF8String(v.to_string())
    }
}

impl From<String> for TypedArgument {
    fn from(v: String) -> Self {
        TypedArgument::UTF8String(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::{CString, c_char};

    #[test]
    fn test_read_scalars() {
        let mut i: MInt = 42;
        let mut b: crate::abi::MBool = 1;
        unsafe {
            let v = TypedArgument::from_argument(&MArgument { integer: &mut i }, MArgumentType::Integer);
            assert_eq!(v, Some(TypedArgument::Integer(42)));
            let v = TypedArgument::from_argument(&MArgument { boolean: &mut b }, MArgumentType::Boolean);
            assert_eq!(v.and_then(|v| v.as_bool()), Some(true));
        }
    }

    #[test]
    fn test_read_string() {
        let owned = CString::new("héllo").unwrap();
        let mut ptr: *mut c_char = owned.as_ptr() as *mut c_char;
        let v = unsafe {
            TypedArgument::from_argument(&MArgument { utf8string: &mut ptr }, MArgumentType::UTF8String)
        };
        assert_eq!(v.as_ref().and_then(|v| v.as_str()), Some("héllo"));
        assert_eq!(v.map(|v| v.kind()), Some(MArgumentType::UTF8String));
    }

    #[test]
    fn test_erased_kind_has_no_value() {
        let mut i: MInt = 0;
        let v = unsafe { TypedArgument::from_argument(&MArgument { integer: &mut i }, MArgumentType::MArgument) };
        assert!(v.is_none());
    }

    #[test]
    fn test_kind_tags() {
        assert_eq!(TypedArgument::from(1.5).kind(), MArgumentType::Real);
        assert_eq!(TypedArgument::from("x").kind(), MArgumentType::UTF8String);
        assert_eq!(
            TypedArgument::NumericArray(std::ptr::null_mut()).kind(),
            MArgumentType::NumericArray
        );
    }
}
