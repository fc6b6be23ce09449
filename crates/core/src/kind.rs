//! Tagged-kind registry
//!
//! Maps the closed set of argument kinds to their native representation.
//!
//! - [`MArgumentType`] is the run-time tag, numbered exactly as the host numbers it.
//! - Each marker type in this module (e.g. [`Integer`], [`Tensor`]) is the
//!   compile-time tag: its [`ArgumentKind`] impl fixes the representation type
//!   and knows how to read and write a call-argument slot of that kind.
//! - [`Primitive`] goes the other way, from a caller's static type to the one
//!   kind it stands for. It is deliberately not implemented for the array
//!   handle type, which the host shares between tensors and numeric arrays:
//!
//! ```compile_fail
//! use hostlink_core::abi::MTensor;
//! use hostlink_core::kind::Primitive;
//!
//! fn tag_of<T: Primitive>() {}
//! tag_of::<MTensor>(); // ambiguous: tensor or numeric array?
//! ```

use crate::abi::{
    DataStore as RawDataStore, MArgument, MBool, MComplex, MImage, MInt, MNumericArray, MReal,
    MSparseArray, MTensor,
};
use std::ffi::c_char;
use std::fmt;

/// Run-time kind tag of a call-argument slot or collection node
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MArgumentType {
    /// Fully erased slot, no concrete kind attached
    MArgument = 0,
    Boolean = 1,
    Integer = 2,
    Real = 3,
    Complex = 4,
    Tensor = 5,
    SparseArray = 6,
    NumericArray = 7,
    Image = 8,
    UTF8String = 9,
    DataStore = 10,
}

impl MArgumentType {
    /// Every tag, in host numbering order
    pub const ALL: [MArgumentType; 11] = [
        MArgumentType::MArgument,
        MArgumentType::Boolean,
        MArgumentType::Integer,
        MArgumentType::Real,
        MArgumentType::Complex,
        MArgumentType::Tensor,
        MArgumentType::SparseArray,
        MArgumentType::NumericArray,
        MArgumentType::Image,
        MArgumentType::UTF8String,
        MArgumentType::DataStore,
    ];

    /// Decode a tag reported by the host
    pub fn from_raw(raw: i32) -> Option<Self> {
        Self::ALL.get(usize::try_from(raw).ok()?).copied()
    }

    pub const fn as_raw(self) -> i32 {
        self as i32
    }

    /// True for kinds whose slot holds a host handle with a lifetime to manage
    pub const fn is_container(self) -> bool {
        matches!(
            self,
            MArgumentType::Tensor
                | MArgumentType::SparseArray
                | MArgumentType::NumericArray
                | MArgumentType::Image
                | MArgumentType::DataStore
        )
    }

    /// True for kinds held by value in the slot
    pub const fn is_primitive(self) -> bool {
        matches!(
            self,
            MArgumentType::Boolean
                | MArgumentType::Integer
                | MArgumentType::Real
                | MArgumentType::Complex
                | MArgumentType::UTF8String
        )
    }

    pub const fn name(self) -> &'static str {
        match self {
            MArgumentType::MArgument => "MArgument",
            MArgumentType::Boolean => "Boolean",
            MArgumentType::Integer => "Integer",
            MArgumentType::Real => "Real",
            MArgumentType::Complex => "Complex",
            MArgumentType::Tensor => "Tensor",
            MArgumentType::SparseArray => "SparseArray",
            MArgumentType::NumericArray => "NumericArray",
            MArgumentType::Image => "Image",
            MArgumentType::UTF8String => "UTF8String",
            MArgumentType::DataStore => "DataStore",
        }
    }
}

impl fmt::Display for MArgumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Compile-time kind tag
///
/// Binds a [`MArgumentType`] to the type stored behind a slot of that kind.
pub trait ArgumentKind {
    const TYPE: MArgumentType;

    /// Native representation of a value of this kind
    type Value: Copy;

    /// Read the value behind `arg`.
    ///
    /// # Safety
    /// `arg` must point at live storage holding a value of this kind.
    unsafe fn read(arg: &MArgument) -> Self::Value;

    /// Overwrite the value behind `arg`.
    ///
    /// # Safety
    /// `arg` must point at live, writable storage for a value of this kind.
    unsafe fn write(arg: &mut MArgument, value: Self::Value);
}

macro_rules! argument_kind {
    ($(#[$doc:meta])* $marker:ident, $tag:ident, $value:ty, $field:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct $marker;

        impl ArgumentKind for $marker {
            const TYPE: MArgumentType = MArgumentType::$tag;
            type Value = $value;

            unsafe fn read(arg: &MArgument) -> $value {
                unsafe { *arg.$field }
            }

            unsafe fn write(arg: &mut MArgument, value: $value) {
                unsafe { *arg.$field = value }
            }
        }
    };
}

argument_kind!(Boolean, Boolean, MBool, boolean);
argument_kind!(Integer, Integer, MInt, integer);
argument_kind!(Real, Real, MReal, real);
argument_kind!(Complex, Complex, MComplex, complex);
argument_kind!(
    /// Array buffer (tensor)
    Tensor,
    Tensor,
    MTensor,
    tensor
);
argument_kind!(SparseArray, SparseArray, MSparseArray, sparse);
argument_kind!(
    /// Numeric array; same raw handle type as [`Tensor`]
    NumericArray,
    NumericArray,
    MNumericArray,
    numeric
);
argument_kind!(Image, Image, MImage, image);
argument_kind!(
    /// NUL-terminated UTF-8 string
    Utf8String,
    UTF8String,
    *mut c_char,
    utf8string
);
argument_kind!(
    /// Ordered heterogeneous collection
    DataStore,
    DataStore,
    RawDataStore,
    data_store
);

/// The fully erased slot kind
///
/// Reading yields the slot itself; writing rebinds the slot to other storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Any;

impl ArgumentKind for Any {
    const TYPE: MArgumentType = MArgumentType::MArgument;
    type Value = MArgument;

    unsafe fn read(arg: &MArgument) -> MArgument {
        *arg
    }

    unsafe fn write(arg: &mut MArgument, value: MArgument) {
        *arg = value;
    }
}

/// Static types that identify exactly one kind
///
/// Implemented for every representation type except the shared array handle
/// ([`MTensor`] / [`MNumericArray`]); callers holding one of those must name
/// the kind explicitly.
pub trait Primitive: Copy {
    type Kind: ArgumentKind<Value = Self>;
}

impl Primitive for MBool {
    type Kind = Boolean;
}

impl Primitive for MInt {
    type Kind = Integer;
}

impl Primitive for MReal {
    type Kind = Real;
}

impl Primitive for MComplex {
    type Kind = Complex;
}

impl Primitive for MSparseArray {
    type Kind = SparseArray;
}

impl Primitive for MImage {
    type Kind = Image;
}

impl Primitive for *mut c_char {
    type Kind = Utf8String;
}

impl Primitive for RawDataStore {
    type Kind = DataStore;
}

/// Tag of the kind a static type stands for
pub const fn primitive_type<T: Primitive>() -> MArgumentType {
    <T::Kind as ArgumentKind>::TYPE
}
