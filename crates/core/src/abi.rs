//! Raw ABI types shared with the host runtime
//!
//! These mirror the C declarations the host publishes. Handles are opaque
//! pointers: the library never dereferences them, it only hands them back to
//! host callbacks.
//!
//! # Array handles
//!
//! The host uses one representation for both array-like buffers (tensors) and
//! numeric arrays, so [`MTensor`] and [`MNumericArray`] are the same Rust type.
//! Nothing can tell them apart from the static type alone; see
//! [`crate::kind::Primitive`] for how that ambiguity is kept out of type-driven
//! dispatch.

use std::ffi::c_char;

/// Host machine integer
pub type MInt = i64;

/// Host machine real
pub type MReal = f64;

/// Host boolean (C `int`, zero is false)
pub type MBool = i32;

/// Host complex number: `ri[0]` is the real part, `ri[1]` the imaginary part
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MComplex {
    pub ri: [MReal; 2],
}

impl MComplex {
    pub const fn new(re: MReal, im: MReal) -> Self {
        Self { ri: [re, im] }
    }

    pub const fn re(&self) -> MReal {
        self.ri[0]
    }

    pub const fn im(&self) -> MReal {
        self.ri[1]
    }
}

/// Opaque array buffer owned by the host
#[repr(C)]
pub struct ArrayStruct {
    _private: [u8; 0],
}

/// Opaque sparse array owned by the host
#[repr(C)]
pub struct SparseArrayStruct {
    _private: [u8; 0],
}

/// Opaque image owned by the host
#[repr(C)]
pub struct ImageStruct {
    _private: [u8; 0],
}

/// Opaque ordered collection owned by the host
#[repr(C)]
pub struct DataStoreStruct {
    _private: [u8; 0],
}

/// Opaque node of an ordered collection
#[repr(C)]
pub struct DataStoreNodeStruct {
    _private: [u8; 0],
}

/// Opaque link endpoint used for structured side-channel traffic
#[repr(C)]
pub struct LinkStruct {
    _private: [u8; 0],
}

pub type MTensor = *mut ArrayStruct;
/// Bit-identical to [`MTensor`] at the ABI level.
pub type MNumericArray = *mut ArrayStruct;
pub type MSparseArray = *mut SparseArrayStruct;
pub type MImage = *mut ImageStruct;
pub type DataStore = *mut DataStoreStruct;
pub type DataStoreNode = *mut DataStoreNodeStruct;
pub type MLink = *mut LinkStruct;

/// One call-argument slot
///
/// Every slot is a pointer to storage owned by the host (or by a collection
/// node). Which field is meaningful depends on the slot's declared kind.
#[repr(C)]
#[derive(Clone, Copy)]
pub union MArgument {
    pub boolean: *mut MBool,
    pub integer: *mut MInt,
    pub real: *mut MReal,
    pub complex: *mut MComplex,
    pub tensor: *mut MTensor,
    pub sparse: *mut MSparseArray,
    pub numeric: *mut MNumericArray,
    pub image: *mut MImage,
    pub utf8string: *mut *mut c_char,
    pub data_store: *mut DataStore,
}

impl MArgument {
    /// Slot with no storage behind it
    pub const fn null() -> Self {
        MArgument {
            integer: std::ptr::null_mut(),
        }
    }

    /// True when the slot does not point at any storage
    pub fn is_null(&self) -> bool {
        // All fields are thin pointers sharing the same bits.
        unsafe { self.integer.is_null() }
    }
}

impl std::fmt::Debug for MArgument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MArgument({:p})", unsafe { self.integer })
    }
}

/// Status value returned by host callbacks: zero means success
pub type HostStatus = std::ffi::c_int;
