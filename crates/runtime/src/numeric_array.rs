//! Numeric array containers
//!
//! [`GenericNumericArray<P>`] wraps host numeric arrays: dense arrays of any
//! of the host's machine element types. The raw handle type is the same as a
//! tensor's; the kind is carried by the container type instead.

use crate::container::Container;
use crate::library::api;
use crate::passing::{ContainerKind, Manual, ModeFor, Mutable, Shareable};
use crate::tensor::{OffsetError, row_major_offset};
use hostlink_core::abi::{MComplex, MInt, MNumericArray, MReal};
use hostlink_core::kind;
use hostlink_core::registry::{self, error_name};
use hostlink_core::Result;
use std::ffi::{c_int, c_void};
use std::fmt;

/// Container specialization for numeric arrays
pub type GenericNumericArray<P> = Container<kind::NumericArray, P>;

/// Element type of a numeric array, numbered as the host numbers it
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NumericArrayType {
    Undef = 0,
    Bit8 = 1,
    UBit8 = 2,
    Bit16 = 3,
    UBit16 = 4,
    Bit32 = 5,
    UBit32 = 6,
    Bit64 = 7,
    UBit64 = 8,
    Real32 = 9,
    Real64 = 10,
    ComplexReal32 = 11,
    ComplexReal64 = 12,
}

impl NumericArrayType {
    pub const ALL: [NumericArrayType; 13] = [
        NumericArrayType::Undef,
        NumericArrayType::Bit8,
        NumericArrayType::UBit8,
        NumericArrayType::Bit16,
        NumericArrayType::UBit16,
        NumericArrayType::Bit32,
        NumericArrayType::UBit32,
        NumericArrayType::Bit64,
        NumericArrayType::UBit64,
        NumericArrayType::Real32,
        NumericArrayType::Real64,
        NumericArrayType::ComplexReal32,
        NumericArrayType::ComplexReal64,
    ];

    pub fn from_raw(raw: c_int) -> Option<Self> {
        Self::ALL.get(usize::try_from(raw).ok()?).copied()
    }

    pub const fn as_raw(self) -> c_int {
        self as c_int
    }

    /// Size of one element in bytes (0 for `Undef`)
    pub const fn element_size(self) -> usize {
        match self {
            NumericArrayType::Undef => 0,
            NumericArrayType::Bit8 | NumericArrayType::UBit8 => 1,
            NumericArrayType::Bit16 | NumericArrayType::UBit16 => 2,
            NumericArrayType::Bit32 | NumericArrayType::UBit32 | NumericArrayType::Real32 => 4,
            NumericArrayType::Bit64
            | NumericArrayType::UBit64
            | NumericArrayType::Real64
            | NumericArrayType::ComplexReal32 => 8,
            NumericArrayType::ComplexReal64 => 16,
        }
    }
}

impl fmt::Display for NumericArrayType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// How the host converts elements between numeric array types
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionMethod {
    /// Fail if any value is not exactly representable
    Check = 1,
    ClipCheck = 2,
    Coerce = 3,
    ClipCoerce = 4,
    Round = 5,
    ClipRound = 6,
    Scale = 7,
    ClipScale = 8,
}

impl ConversionMethod {
    pub fn from_raw(raw: c_int) -> Option<Self> {
        match raw {
            1 => Some(ConversionMethod::Check),
            2 => Some(ConversionMethod::ClipCheck),
            3 => Some(ConversionMethod::Coerce),
            4 => Some(ConversionMethod::ClipCoerce),
            5 => Some(ConversionMethod::Round),
            6 => Some(ConversionMethod::ClipRound),
            7 => Some(ConversionMethod::Scale),
            8 => Some(ConversionMethod::ClipScale),
            _ => None,
        }
    }

    /// True for the methods that clamp out-of-range values
    pub const fn clips(self) -> bool {
        matches!(
            self,
            ConversionMethod::ClipCheck
                | ConversionMethod::ClipCoerce
                | ConversionMethod::ClipRound
                | ConversionMethod::ClipScale
        )
    }
}

/// Rust types that can be numeric array elements
pub trait NumericArrayElement: Copy {
    const TYPE: NumericArrayType;
}

macro_rules! numeric_array_element {
    ($($ty:ty => $tag:ident),* $(,)?) => {
        $(
            impl NumericArrayElement for $ty {
                const TYPE: NumericArrayType = NumericArrayType::$tag;
            }
        )*
    };
}

numeric_array_element!(
    i8 => Bit8,
    u8 => UBit8,
    i16 => Bit16,
    u16 => UBit16,
    i32 => Bit32,
    u32 => UBit32,
    i64 => Bit64,
    u64 => UBit64,
    f32 => Real32,
    MReal => Real64,
    MComplex => ComplexReal64,
);

impl ContainerKind for kind::NumericArray {
    fn clone_raw(raw: MNumericArray) -> Result<MNumericArray> {
        let mut out: MNumericArray = std::ptr::null_mut();
        let status = unsafe { (api().numeric_array.clone)(raw, &mut out) };
        if status != 0 || out.is_null() {
            return registry::fail(
                error_name::NUMERIC_ARRAY_CLONE_ERROR,
                format!("status {status}"),
            );
        }
        Ok(out)
    }

    fn free(raw: MNumericArray) {
        unsafe { (api().numeric_array.free)(raw) }
    }

    fn disown(raw: MNumericArray) {
        unsafe { (api().numeric_array.disown)(raw) }
    }

    fn share_count(raw: MNumericArray) -> MInt {
        unsafe { (api().numeric_array.share_count)(raw) }
    }
}

impl Shareable for kind::NumericArray {}

impl GenericNumericArray<Manual> {
    /// Create a new zero-filled numeric array owned by the library
    pub fn new(ty: NumericArrayType, dims: &[MInt]) -> Result<Self> {
        let mut out: MNumericArray = std::ptr::null_mut();
        let rank = dims.len() as MInt;
        let status =
            unsafe { (api().numeric_array.new)(ty.as_raw(), rank, dims.as_ptr(), &mut out) };
        if status != 0 || out.is_null() {
            return registry::fail(
                error_name::NUMERIC_ARRAY_NEW_ERROR,
                format!("type {ty}, dims {dims:?}, status {status}"),
            );
        }
        tracing::debug!(%ty, ?dims, handle = ?out, "new numeric array");
        Ok(unsafe { Self::from_raw(out) })
    }

    /// Create a numeric array with the given shape and contents
    pub fn from_slice<T: NumericArrayElement>(dims: &[MInt], values: &[T]) -> Result<Self> {
        let mut array = Self::new(T::TYPE, dims)?;
        let data = array.data_mut::<T>()?;
        if data.len() != values.len() {
            return registry::fail(
                error_name::NUMERIC_ARRAY_SIZE_ERROR,
                format!("{} values for {} elements", values.len(), data.len()),
            );
        }
        data.copy_from_slice(values);
        Ok(array)
    }
}

impl<P: ModeFor<kind::NumericArray>> GenericNumericArray<P> {
    pub fn rank(&self) -> MInt {
        unsafe { (api().numeric_array.get_rank)(self.raw()) }
    }

    pub fn dimensions(&self) -> &[MInt] {
        let rank = usize::try_from(self.rank()).unwrap_or(0);
        let dims = unsafe { (api().numeric_array.get_dimensions)(self.raw()) };
        if dims.is_null() || rank == 0 {
            return &[];
        }
        unsafe { std::slice::from_raw_parts(dims, rank) }
    }

    pub fn flattened_length(&self) -> MInt {
        unsafe { (api().numeric_array.get_flattened_length)(self.raw()) }
    }

    pub fn element_type(&self) -> NumericArrayType {
        NumericArrayType::from_raw(unsafe { (api().numeric_array.get_type)(self.raw()) })
            .unwrap_or(NumericArrayType::Undef)
    }

    /// Pointer to the first element, unchecked
    pub fn raw_data(&self) -> *mut c_void {
        unsafe { (api().numeric_array.get_data)(self.raw()) }
    }

    /// Convert into a new numeric array of another element type
    pub fn convert(
        &self,
        target: NumericArrayType,
        method: ConversionMethod,
        tolerance: MReal,
    ) -> Result<GenericNumericArray<Manual>> {
        let mut out: MNumericArray = std::ptr::null_mut();
        let status = unsafe {
            (api().numeric_array.convert_type)(
                &mut out,
                self.raw(),
                target.as_raw(),
                method as c_int,
                tolerance,
            )
        };
        if status != 0 || out.is_null() {
            return registry::fail(
                error_name::NUMERIC_ARRAY_CONVERSION_ERROR,
                format!("Conversion to type {target} failed."),
            );
        }
        tracing::debug!(from = %self.element_type(), to = %target, ?method, "converted numeric array");
        Ok(unsafe { GenericNumericArray::<Manual>::from_raw(out) })
    }

    fn checked_data<T: NumericArrayElement>(&self) -> Result<(*mut T, usize)> {
        if self.is_empty() {
            return registry::fail(
                error_name::NUMERIC_ARRAY_INIT_ERROR,
                "numeric array container is empty",
            );
        }
        let actual = self.element_type();
        if actual != T::TYPE {
            return registry::fail(
                error_name::NUMERIC_ARRAY_TYPE_ERROR,
                format!("requested {}, array holds {}", T::TYPE, actual),
            );
        }
        let len = usize::try_from(self.flattened_length()).unwrap_or(0);
        let ptr = self.raw_data().cast::<T>();
        if ptr.is_null() && len > 0 {
            return registry::fail(error_name::NUMERIC_ARRAY_INIT_ERROR, "host returned no data");
        }
        Ok((ptr, len))
    }

    /// Elements in row-major order
    pub fn data<T: NumericArrayElement>(&self) -> Result<&[T]> {
        let (ptr, len) = self.checked_data::<T>()?;
        if len == 0 {
            return Ok(&[]);
        }
        Ok(unsafe { std::slice::from_raw_parts(ptr, len) })
    }

    /// Element at a multi-dimensional position
    pub fn at<T: NumericArrayElement>(&self, position: &[MInt]) -> Result<T> {
        let data = self.data::<T>()?;
        let offset = row_major_offset(self.dimensions(), position).map_err(|e| {
            registry::raise(match e {
                OffsetError::Rank => error_name::NUMERIC_ARRAY_SIZE_ERROR,
                OffsetError::Bounds => error_name::NUMERIC_ARRAY_INDEX_ERROR,
            })
            .with_debug(format!("position {position:?} in {:?}", self.dimensions()))
        })?;
        Ok(data[offset])
    }
}

impl<P: ModeFor<kind::NumericArray> + Mutable> GenericNumericArray<P> {
    /// Mutable elements in row-major order
    pub fn data_mut<T: NumericArrayElement>(&mut self) -> Result<&mut [T]> {
        let (ptr, len) = self.checked_data::<T>()?;
        if len == 0 {
            return Ok(&mut []);
        }
        Ok(unsafe { std::slice::from_raw_parts_mut(ptr, len) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::passing::Constant;
    use crate::sim;

    #[test]
    fn test_type_numbering() {
        for (i, ty) in NumericArrayType::ALL.iter().enumerate() {
            assert_eq!(ty.as_raw() as usize, i);
        }
        assert_eq!(NumericArrayType::from_raw(13), None);
        assert_eq!(NumericArrayType::ComplexReal64.element_size(), 16);
        assert_eq!(ConversionMethod::from_raw(0), None);
        assert!(ConversionMethod::ClipRound.clips());
        assert!(!ConversionMethod::Round.clips());
    }

    #[test]
    fn test_new_and_fill() {
        sim::install();
        let mut a = GenericNumericArray::<Manual>::new(NumericArrayType::UBit16, &[2, 2]).unwrap();
        assert_eq!(a.flattened_length(), 4);
        assert_eq!(a.element_type(), NumericArrayType::UBit16);
        a.data_mut::<u16>().unwrap().copy_from_slice(&[1, 2, 3, 4]);
        assert_eq!(a.at::<u16>(&[1, 0]).unwrap(), 3);
        assert_eq!(
            a.data::<i16>().unwrap_err().name(),
            error_name::NUMERIC_ARRAY_TYPE_ERROR
        );
    }

    #[test]
    fn test_convert_rounds_into_new_array() {
        sim::install();
        let reals = GenericNumericArray::<Manual>::from_slice(&[3], &[1.4f64, 2.6, -0.5]).unwrap();
        let ints = reals
            .convert(NumericArrayType::Bit32, ConversionMethod::Round, 0.0)
            .unwrap();
        assert_eq!(ints.data::<i32>().unwrap(), &[1, 3, -1]);
        assert_eq!(reals.data::<f64>().unwrap(), &[1.4, 2.6, -0.5]);
    }

    #[test]
    fn test_convert_check_fails_on_inexact_value() {
        sim::install();
        let reals = GenericNumericArray::<Manual>::from_slice(&[2], &[1.0f64, 2.5]).unwrap();
        let err = reals
            .convert(NumericArrayType::Bit8, ConversionMethod::Check, 0.0)
            .unwrap_err();
        assert_eq!(err.name(), error_name::NUMERIC_ARRAY_CONVERSION_ERROR);
        assert!(err.debug().contains("Bit8"));
    }

    #[test]
    fn test_clip_coerce_clamps() {
        sim::install();
        let big = GenericNumericArray::<Manual>::from_slice(&[3], &[300i64, -5, 7]).unwrap();
        let bytes = big
            .convert(NumericArrayType::UBit8, ConversionMethod::ClipCoerce, 0.0)
            .unwrap();
        assert_eq!(bytes.data::<u8>().unwrap(), &[255, 0, 7]);
    }

    #[test]
    fn test_constant_view_reads() {
        sim::install();
        let owned = GenericNumericArray::<Manual>::from_slice(&[2], &[5u8, 6]).unwrap();
        let view = unsafe { GenericNumericArray::<Constant>::from_raw(owned.raw()) };
        assert_eq!(view.data::<u8>().unwrap(), &[5, 6]);
        drop(view);
        assert!(sim::is_live(owned.raw()));
    }
}
