//! Dense arrays: tensors and numeric arrays share one storage model

use super::{handle, id_of, world};
use crate::library::{NumericArrayFunctions, TensorFunctions};
use crate::numeric_array::{ConversionMethod, NumericArrayType};
use crate::tensor::TensorType;
use hostlink_core::abi::{MComplex, MInt, MNumericArray, MReal, MTensor};
use std::ffi::{c_int, c_void};

const FAILED: c_int = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    Tensor,
    Numeric,
}

#[derive(Debug, Clone)]
pub(super) struct Array {
    family: Family,
    /// Host element type code of the family
    ty: i64,
    dims: Vec<MInt>,
    len: usize,
    elem_size: usize,
    /// Word storage keeps every element type aligned
    data: Vec<u64>,
    shares: MInt,
}

impl Array {
    fn new(family: Family, ty: i64, dims: Vec<MInt>) -> Option<Self> {
        let elem_size = match family {
            Family::Tensor => match TensorType::from_raw(ty)? {
                TensorType::Integer | TensorType::Real => 8,
                TensorType::Complex => 16,
            },
            Family::Numeric => match NumericArrayType::from_raw(c_int::try_from(ty).ok()?)? {
                NumericArrayType::Undef => return None,
                t => t.element_size(),
            },
        };
        let mut len = 1usize;
        for &d in &dims {
            len = len.checked_mul(usize::try_from(d).ok()?)?;
        }
        let words = len.checked_mul(elem_size)?.div_ceil(8);
        Some(Self {
            family,
            ty,
            dims,
            len,
            elem_size,
            data: vec![0; words],
            shares: 0,
        })
    }

    fn bytes(&self) -> &[u8] {
        unsafe {
            std::slice::from_raw_parts(self.data.as_ptr().cast::<u8>(), self.len * self.elem_size)
        }
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        unsafe {
            std::slice::from_raw_parts_mut(
                self.data.as_mut_ptr().cast::<u8>(),
                self.len * self.elem_size,
            )
        }
    }

    fn numeric_type(&self) -> Option<NumericArrayType> {
        match self.family {
            Family::Numeric => NumericArrayType::from_raw(c_int::try_from(self.ty).ok()?),
            Family::Tensor => None,
        }
    }
}

impl super::World {
    pub(super) fn insert_array(&mut self, array: Array) -> usize {
        let id = self.allocate_id();
        self.arrays.insert(id, array);
        id
    }

    pub(super) fn clone_array(&mut self, id: usize) -> Option<usize> {
        let mut copy = self.arrays.get(&id)?.clone();
        copy.shares = 0;
        Some(self.insert_array(copy))
    }

    pub(super) fn free_array(&mut self, id: usize) {
        if self.arrays.remove(&id).is_some() {
            self.record(id).frees += 1;
        } else {
            tracing::warn!(handle = id, "free of unknown array");
        }
    }
}

unsafe fn read_dims(rank: MInt, dims: *const MInt) -> Option<Vec<MInt>> {
    let rank = usize::try_from(rank).ok()?;
    if rank == 0 {
        return Some(Vec::new());
    }
    if dims.is_null() {
        return None;
    }
    Some(unsafe { std::slice::from_raw_parts(dims, rank) }.to_vec())
}

unsafe fn create(family: Family, ty: i64, rank: MInt, dims: *const MInt, out: *mut MTensor) -> c_int {
    if out.is_null() {
        return FAILED;
    }
    let Some(array) = (unsafe { read_dims(rank, dims) }).and_then(|d| Array::new(family, ty, d))
    else {
        return FAILED;
    };
    let id = world().insert_array(array);
    unsafe { *out = handle(id) };
    0
}

unsafe extern "C" fn tensor_new(ty: MInt, rank: MInt, dims: *const MInt, out: *mut MTensor) -> c_int {
    unsafe { create(Family::Tensor, ty, rank, dims, out) }
}

unsafe extern "C" fn numeric_new(
    ty: c_int,
    rank: MInt,
    dims: *const MInt,
    out: *mut MNumericArray,
) -> c_int {
    unsafe { create(Family::Numeric, i64::from(ty), rank, dims, out) }
}

unsafe extern "C" fn array_clone(source: MTensor, out: *mut MTensor) -> c_int {
    if out.is_null() {
        return FAILED;
    }
    match world().clone_array(id_of(source)) {
        Some(id) => {
            unsafe { *out = handle(id) };
            0
        }
        None => FAILED,
    }
}

unsafe extern "C" fn array_free(raw: MTensor) {
    world().free_array(id_of(raw));
}

unsafe extern "C" fn array_disown(raw: MTensor) {
    let id = id_of(raw);
    let mut w = world();
    if let Some(array) = w.arrays.get_mut(&id) {
        array.shares = (array.shares - 1).max(0);
    }
    w.record(id).disowns += 1;
}

unsafe extern "C" fn array_share_count(raw: MTensor) -> MInt {
    world().arrays.get(&id_of(raw)).map_or(0, |a| a.shares)
}

unsafe extern "C" fn tensor_type(raw: MTensor) -> MInt {
    world().arrays.get(&id_of(raw)).map_or(0, |a| a.ty)
}

unsafe extern "C" fn numeric_type(raw: MNumericArray) -> c_int {
    world()
        .arrays
        .get(&id_of(raw))
        .and_then(Array::numeric_type)
        .map_or(0, NumericArrayType::as_raw)
}

unsafe extern "C" fn array_rank(raw: MTensor) -> MInt {
    world()
        .arrays
        .get(&id_of(raw))
        .map_or(0, |a| a.dims.len() as MInt)
}

unsafe extern "C" fn array_dims(raw: MTensor) -> *const MInt {
    world()
        .arrays
        .get(&id_of(raw))
        .map_or(std::ptr::null(), |a| a.dims.as_ptr())
}

unsafe extern "C" fn array_length(raw: MTensor) -> MInt {
    world()
        .arrays
        .get(&id_of(raw))
        .map_or(0, |a| a.len as MInt)
}

fn tensor_data(raw: MTensor, ty: TensorType) -> *mut c_void {
    let mut w = world();
    match w.arrays.get_mut(&id_of(raw)) {
        Some(a) if a.family == Family::Tensor && a.ty == ty.as_raw() => {
            a.data.as_mut_ptr().cast()
        }
        _ => std::ptr::null_mut(),
    }
}

unsafe extern "C" fn tensor_integer_data(raw: MTensor) -> *mut MInt {
    tensor_data(raw, TensorType::Integer).cast()
}

unsafe extern "C" fn tensor_real_data(raw: MTensor) -> *mut MReal {
    tensor_data(raw, TensorType::Real).cast()
}

unsafe extern "C" fn tensor_complex_data(raw: MTensor) -> *mut MComplex {
    tensor_data(raw, TensorType::Complex).cast()
}

unsafe extern "C" fn numeric_data(raw: MNumericArray) -> *mut c_void {
    world()
        .arrays
        .get_mut(&id_of(raw))
        .map_or(std::ptr::null_mut(), |a| a.data.as_mut_ptr().cast())
}

unsafe extern "C" fn numeric_convert(
    out: *mut MNumericArray,
    source: MNumericArray,
    target: c_int,
    method: c_int,
    tolerance: MReal,
) -> c_int {
    if out.is_null() {
        return FAILED;
    }
    let (Some(target), Some(method)) = (
        NumericArrayType::from_raw(target),
        ConversionMethod::from_raw(method),
    ) else {
        return FAILED;
    };
    let mut w = world();
    let Some(src) = w.arrays.get(&id_of(source)) else {
        return FAILED;
    };
    let Some(from) = src.numeric_type() else {
        return FAILED;
    };
    let Some(mut dst) = Array::new(Family::Numeric, i64::from(target.as_raw()), src.dims.clone())
    else {
        return FAILED;
    };
    for i in 0..src.len {
        let value = read_scalar(from, src.bytes(), i);
        let Some(converted) = convert_scalar(value, target, method, tolerance) else {
            tracing::debug!(index = i, %from, %target, ?method, "element not convertible");
            return FAILED;
        };
        write_scalar(target, dst.bytes_mut(), i, converted);
    }
    let id = w.insert_array(dst);
    unsafe { *out = handle(id) };
    0
}

/// One element widened to a common representation
#[derive(Debug, Clone, Copy, PartialEq)]
enum Scalar {
    Int(i128),
    Real(f64),
    Complex(f64, f64),
}

fn at<const N: usize>(bytes: &[u8], offset: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[offset..offset + N]);
    out
}

fn read_scalar(ty: NumericArrayType, bytes: &[u8], i: usize) -> Scalar {
    use NumericArrayType as T;
    let off = i * ty.element_size();
    match ty {
        T::Undef => Scalar::Int(0),
        T::Bit8 => Scalar::Int(i8::from_ne_bytes(at(bytes, off)).into()),
        T::UBit8 => Scalar::Int(u8::from_ne_bytes(at(bytes, off)).into()),
        T::Bit16 => Scalar::Int(i16::from_ne_bytes(at(bytes, off)).into()),
        T::UBit16 => Scalar::Int(u16::from_ne_bytes(at(bytes, off)).into()),
        T::Bit32 => Scalar::Int(i32::from_ne_bytes(at(bytes, off)).into()),
        T::UBit32 => Scalar::Int(u32::from_ne_bytes(at(bytes, off)).into()),
        T::Bit64 => Scalar::Int(i64::from_ne_bytes(at(bytes, off)).into()),
        T::UBit64 => Scalar::Int(u64::from_ne_bytes(at(bytes, off)).into()),
        T::Real32 => Scalar::Real(f32::from_ne_bytes(at(bytes, off)).into()),
        T::Real64 => Scalar::Real(f64::from_ne_bytes(at(bytes, off))),
        T::ComplexReal32 => Scalar::Complex(
            f32::from_ne_bytes(at(bytes, off)).into(),
            f32::from_ne_bytes(at(bytes, off + 4)).into(),
        ),
        T::ComplexReal64 => Scalar::Complex(
            f64::from_ne_bytes(at(bytes, off)),
            f64::from_ne_bytes(at(bytes, off + 8)),
        ),
    }
}

fn write_scalar(ty: NumericArrayType, bytes: &mut [u8], i: usize, value: Scalar) {
    use NumericArrayType as T;
    let off = i * ty.element_size();
    let mut put = |src: &[u8], at: usize| bytes[at..at + src.len()].copy_from_slice(src);
    match (ty, value) {
        (T::Bit8, Scalar::Int(v)) => put(&(v as i8).to_ne_bytes(), off),
        (T::UBit8, Scalar::Int(v)) => put(&(v as u8).to_ne_bytes(), off),
        (T::Bit16, Scalar::Int(v)) => put(&(v as i16).to_ne_bytes(), off),
        (T::UBit16, Scalar::Int(v)) => put(&(v as u16).to_ne_bytes(), off),
        (T::Bit32, Scalar::Int(v)) => put(&(v as i32).to_ne_bytes(), off),
        (T::UBit32, Scalar::Int(v)) => put(&(v as u32).to_ne_bytes(), off),
        (T::Bit64, Scalar::Int(v)) => put(&(v as i64).to_ne_bytes(), off),
        (T::UBit64, Scalar::Int(v)) => put(&(v as u64).to_ne_bytes(), off),
        (T::Real32, Scalar::Real(x)) => put(&(x as f32).to_ne_bytes(), off),
        (T::Real64, Scalar::Real(x)) => put(&x.to_ne_bytes(), off),
        (T::ComplexReal32, Scalar::Complex(re, im)) => {
            put(&(re as f32).to_ne_bytes(), off);
            put(&(im as f32).to_ne_bytes(), off + 4);
        }
        (T::ComplexReal64, Scalar::Complex(re, im)) => {
            put(&re.to_ne_bytes(), off);
            put(&im.to_ne_bytes(), off + 8);
        }
        (ty, value) => tracing::warn!(%ty, ?value, "element does not match target type"),
    }
}

fn integer_range(ty: NumericArrayType) -> Option<(i128, i128)> {
    use NumericArrayType as T;
    let range = match ty {
        T::Bit8 => (i8::MIN.into(), i8::MAX.into()),
        T::UBit8 => (0, u8::MAX.into()),
        T::Bit16 => (i16::MIN.into(), i16::MAX.into()),
        T::UBit16 => (0, u16::MAX.into()),
        T::Bit32 => (i32::MIN.into(), i32::MAX.into()),
        T::UBit32 => (0, u32::MAX.into()),
        T::Bit64 => (i64::MIN.into(), i64::MAX.into()),
        T::UBit64 => (0, u64::MAX.into()),
        _ => return None,
    };
    Some(range)
}

fn is_checked(method: ConversionMethod) -> bool {
    matches!(method, ConversionMethod::Check | ConversionMethod::ClipCheck)
}

/// Real to integer under `method`; range is checked by the caller
fn real_to_integer(x: f64, hi: i128, method: ConversionMethod, tolerance: f64) -> Option<i128> {
    use ConversionMethod as M;
    if !x.is_finite() {
        return None;
    }
    let r = match method {
        M::Check | M::ClipCheck => {
            let r = x.round();
            if (x - r).abs() > tolerance {
                return None;
            }
            r
        }
        M::Coerce | M::ClipCoerce => x.trunc(),
        M::Round | M::ClipRound => x.round(),
        M::Scale | M::ClipScale => (x * hi as f64).round(),
    };
    Some(r as i128)
}

fn convert_scalar(
    value: Scalar,
    target: NumericArrayType,
    method: ConversionMethod,
    tolerance: f64,
) -> Option<Scalar> {
    if let Some((lo, hi)) = integer_range(target) {
        let v = match value {
            Scalar::Int(v) => v,
            Scalar::Real(x) => real_to_integer(x, hi, method, tolerance)?,
            Scalar::Complex(re, im) => {
                if im != 0.0 && is_checked(method) {
                    return None;
                }
                real_to_integer(re, hi, method, tolerance)?
            }
        };
        if v < lo || v > hi {
            if !method.clips() {
                return None;
            }
            return Some(Scalar::Int(v.clamp(lo, hi)));
        }
        return Some(Scalar::Int(v));
    }

    let narrow = target == NumericArrayType::Real32 || target == NumericArrayType::ComplexReal32;
    let exact = |x: f64| !is_checked(method) || !narrow || ((x as f32) as f64 - x).abs() <= tolerance;
    let (re, im) = match value {
        Scalar::Int(v) => {
            let x = v as f64;
            if is_checked(method) && x as i128 != v {
                return None;
            }
            (x, 0.0)
        }
        Scalar::Real(x) => (x, 0.0),
        Scalar::Complex(re, im) => (re, im),
    };
    if !exact(re) || !exact(im) {
        return None;
    }
    match target {
        NumericArrayType::Real32 | NumericArrayType::Real64 => {
            if im != 0.0 && is_checked(method) {
                return None;
            }
            Some(Scalar::Real(re))
        }
        NumericArrayType::ComplexReal32 | NumericArrayType::ComplexReal64 => {
            Some(Scalar::Complex(re, im))
        }
        _ => None,
    }
}

pub(super) const TENSOR: TensorFunctions = TensorFunctions {
    new: tensor_new,
    clone: array_clone,
    free: array_free,
    disown: array_disown,
    share_count: array_share_count,
    get_type: tensor_type,
    get_rank: array_rank,
    get_dimensions: array_dims,
    get_flattened_length: array_length,
    get_integer_data: tensor_integer_data,
    get_real_data: tensor_real_data,
    get_complex_data: tensor_complex_data,
};

pub(super) const NUMERIC_ARRAY: NumericArrayFunctions = NumericArrayFunctions {
    new: numeric_new,
    clone: array_clone,
    free: array_free,
    disown: array_disown,
    share_count: array_share_count,
    get_type: numeric_type,
    get_rank: array_rank,
    get_dimensions: array_dims,
    get_flattened_length: array_length,
    get_data: numeric_data,
    convert_type: numeric_convert,
};

/// Create a zero-filled tensor owned by the caller; null if the shape is invalid
pub fn new_tensor(ty: TensorType, dims: &[MInt]) -> MTensor {
    let mut out: MTensor = std::ptr::null_mut();
    let status = unsafe { tensor_new(ty.as_raw(), dims.len() as MInt, dims.as_ptr(), &mut out) };
    if status != 0 {
        return std::ptr::null_mut();
    }
    out
}

/// Free a tensor created with [`new_tensor`]
pub fn free_tensor(raw: MTensor) {
    unsafe { array_free(raw) }
}

/// Add one host-side reference to an array
pub fn share(raw: MTensor) {
    if let Some(array) = world().arrays.get_mut(&id_of(raw)) {
        array.shares += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_shapes_fail() {
        let mut out: MTensor = std::ptr::null_mut();
        unsafe {
            assert_ne!(tensor_new(3, 1, [-1].as_ptr(), &mut out), 0);
            assert_ne!(tensor_new(9, 1, [2].as_ptr(), &mut out), 0);
            assert_ne!(tensor_new(3, 1, std::ptr::null(), &mut out), 0);
            assert_ne!(numeric_new(0, 1, [2].as_ptr(), &mut out), 0);
        }
        assert!(out.is_null());
    }

    #[test]
    fn test_scalar_tensor_has_one_element() {
        let raw = new_tensor(TensorType::Real, &[]);
        assert!(!raw.is_null());
        unsafe {
            assert_eq!(array_rank(raw), 0);
            assert_eq!(array_length(raw), 1);
            assert!(tensor_integer_data(raw).is_null());
            assert!(!tensor_real_data(raw).is_null());
        }
        free_tensor(raw);
    }

    #[test]
    fn test_disown_drops_share() {
        let raw = new_tensor(TensorType::Integer, &[1]);
        share(raw);
        share(raw);
        unsafe {
            assert_eq!(array_share_count(raw), 2);
            array_disown(raw);
            assert_eq!(array_share_count(raw), 1);
        }
        free_tensor(raw);
    }

    #[test]
    fn test_scalar_conversions() {
        use ConversionMethod as M;
        use NumericArrayType as T;
        assert_eq!(
            convert_scalar(Scalar::Real(2.5), T::Bit8, M::Coerce, 0.0),
            Some(Scalar::Int(2))
        );
        assert_eq!(convert_scalar(Scalar::Int(-1), T::UBit16, M::Coerce, 0.0), None);
        assert_eq!(
            convert_scalar(Scalar::Int(-1), T::UBit16, M::ClipRound, 0.0),
            Some(Scalar::Int(0))
        );
        assert_eq!(convert_scalar(Scalar::Real(f64::NAN), T::Bit32, M::ClipCoerce, 0.0), None);
        assert_eq!(
            convert_scalar(Scalar::Real(2.05), T::Bit32, M::Check, 0.1),
            Some(Scalar::Int(2))
        );
        assert_eq!(convert_scalar(Scalar::Complex(1.0, 1.0), T::Real64, M::Check, 0.0), None);
        assert_eq!(
            convert_scalar(Scalar::Int(3), T::ComplexReal64, M::Check, 0.0),
            Some(Scalar::Complex(3.0, 0.0))
        );
        assert_eq!(convert_scalar(Scalar::Real(0.1), T::Real32, M::Check, 0.0), None);
        assert_eq!(
            convert_scalar(Scalar::Real(0.5), T::Real32, M::Check, 0.0),
            Some(Scalar::Real(0.5))
        );
    }
}
