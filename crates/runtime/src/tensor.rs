//! Tensor containers
//!
//! [`GenericTensor<P>`] is the container specialization for host tensors:
//! dense arrays of integers, reals or complex numbers.
//!
//! Shape accessors are plain reads through the callback table. Typed data
//! access checks the element type first and fails with `TensorTypeError` on a
//! mismatch; [`GenericTensor::raw_data`] does not check anything and is meant
//! for callers that already inspected [`GenericTensor::element_type`].

use crate::container::Container;
use crate::library::api;
use crate::passing::{ContainerKind, Manual, ModeFor, Mutable, Shareable};
use hostlink_core::abi::{MComplex, MInt, MReal, MTensor};
use hostlink_core::kind::{self, MArgumentType};
use hostlink_core::registry::{self, error_name};
use hostlink_core::Result;
use std::ffi::c_void;
use std::fmt;

/// Container specialization for tensors
pub type GenericTensor<P> = Container<kind::Tensor, P>;

/// Element type of a tensor, numbered like the kind tags
#[repr(i64)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorType {
    Integer = 2,
    Real = 3,
    Complex = 4,
}

impl TensorType {
    pub fn from_raw(raw: MInt) -> Option<Self> {
        match raw {
            2 => Some(TensorType::Integer),
            3 => Some(TensorType::Real),
            4 => Some(TensorType::Complex),
            _ => None,
        }
    }

    pub const fn as_raw(self) -> MInt {
        self as MInt
    }

    pub const fn argument_type(self) -> MArgumentType {
        match self {
            TensorType::Integer => MArgumentType::Integer,
            TensorType::Real => MArgumentType::Real,
            TensorType::Complex => MArgumentType::Complex,
        }
    }
}

impl fmt::Display for TensorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.argument_type().name())
    }
}

/// Rust types that can be tensor elements
pub trait TensorElement: Copy {
    const TYPE: TensorType;

    /// # Safety
    /// `t` must be a live tensor whose element type is `Self::TYPE`.
    unsafe fn data_ptr(t: MTensor) -> *mut Self;
}

impl TensorElement for MInt {
    const TYPE: TensorType = TensorType::Integer;

    unsafe fn data_ptr(t: MTensor) -> *mut Self {
        unsafe { (api().tensor.get_integer_data)(t) }
    }
}

impl TensorElement for MReal {
    const TYPE: TensorType = TensorType::Real;

    unsafe fn data_ptr(t: MTensor) -> *mut Self {
        unsafe { (api().tensor.get_real_data)(t) }
    }
}

impl TensorElement for MComplex {
    const TYPE: TensorType = TensorType::Complex;

    unsafe fn data_ptr(t: MTensor) -> *mut Self {
        unsafe { (api().tensor.get_complex_data)(t) }
    }
}

impl ContainerKind for kind::Tensor {
    fn clone_raw(raw: MTensor) -> Result<MTensor> {
        let mut out: MTensor = std::ptr::null_mut();
        let status = unsafe { (api().tensor.clone)(raw, &mut out) };
        if status != 0 || out.is_null() {
            return registry::fail(error_name::TENSOR_CLONE_ERROR, format!("status {status}"));
        }
        Ok(out)
    }

    fn free(raw: MTensor) {
        unsafe { (api().tensor.free)(raw) }
    }

    fn disown(raw: MTensor) {
        unsafe { (api().tensor.disown)(raw) }
    }

    fn share_count(raw: MTensor) -> MInt {
        unsafe { (api().tensor.share_count)(raw) }
    }
}

impl Shareable for kind::Tensor {}

impl GenericTensor<Manual> {
    /// Create a new zero-filled tensor owned by the library
    pub fn new(ty: TensorType, dims: &[MInt]) -> Result<Self> {
        let mut out: MTensor = std::ptr::null_mut();
        let rank = dims.len() as MInt;
        let status = unsafe { (api().tensor.new)(ty.as_raw(), rank, dims.as_ptr(), &mut out) };
        if status != 0 || out.is_null() {
            return registry::fail(
                error_name::TENSOR_NEW_ERROR,
                format!("type {ty}, dims {dims:?}, status {status}"),
            );
        }
        tracing::debug!(%ty, ?dims, handle = ?out, "new tensor");
        Ok(unsafe { Self::from_raw(out) })
    }

    /// Create a tensor with the given shape and contents
    pub fn from_slice<T: TensorElement>(dims: &[MInt], values: &[T]) -> Result<Self> {
        let mut tensor = Self::new(T::TYPE, dims)?;
        let data = tensor.data_mut::<T>()?;
        if data.len() != values.len() {
            return registry::fail(
                error_name::TENSOR_SIZE_ERROR,
                format!("{} values for {} elements", values.len(), data.len()),
            );
        }
        data.copy_from_slice(values);
        Ok(tensor)
    }
}

impl<P: ModeFor<kind::Tensor>> GenericTensor<P> {
    pub fn rank(&self) -> MInt {
        unsafe { (api().tensor.get_rank)(self.raw()) }
    }

    pub fn dimensions(&self) -> &[MInt] {
        let rank = usize::try_from(self.rank()).unwrap_or(0);
        let dims = unsafe { (api().tensor.get_dimensions)(self.raw()) };
        if dims.is_null() || rank == 0 {
            return &[];
        }
        unsafe { std::slice::from_raw_parts(dims, rank) }
    }

    pub fn flattened_length(&self) -> MInt {
        unsafe { (api().tensor.get_flattened_length)(self.raw()) }
    }

    /// Element type as reported by the host
    pub fn element_type(&self) -> Option<TensorType> {
        TensorType::from_raw(unsafe { (api().tensor.get_type)(self.raw()) })
    }

    /// Pointer to the first element, unchecked
    ///
    /// Null when the container is empty or the host reports an unknown
    /// element type.
    pub fn raw_data(&self) -> *mut c_void {
        let raw = self.raw();
        unsafe {
            match self.element_type() {
                Some(TensorType::Integer) => (api().tensor.get_integer_data)(raw).cast(),
                Some(TensorType::Real) => (api().tensor.get_real_data)(raw).cast(),
                Some(TensorType::Complex) => (api().tensor.get_complex_data)(raw).cast(),
                None => std::ptr::null_mut(),
            }
        }
    }

    fn checked_data<T: TensorElement>(&self) -> Result<(*mut T, usize)> {
        if self.is_empty() {
            return registry::fail(error_name::TENSOR_INIT_ERROR, "tensor container is empty");
        }
        match self.element_type() {
            Some(ty) if ty == T::TYPE => {}
            actual => {
                return registry::fail(
                    error_name::TENSOR_TYPE_ERROR,
                    format!("requested {}, tensor holds {:?}", T::TYPE, actual),
                );
            }
        }
        let len = usize::try_from(self.flattened_length()).unwrap_or(0);
        let ptr = unsafe { T::data_ptr(self.raw()) };
        if ptr.is_null() && len > 0 {
            return registry::fail(error_name::TENSOR_INIT_ERROR, "host returned no data");
        }
        Ok((ptr, len))
    }

    /// Elements in row-major order
    pub fn data<T: TensorElement>(&self) -> Result<&[T]> {
        let (ptr, len) = self.checked_data::<T>()?;
        if len == 0 {
            return Ok(&[]);
        }
        Ok(unsafe { std::slice::from_raw_parts(ptr, len) })
    }

    /// Element at a multi-dimensional position
    pub fn at<T: TensorElement>(&self, position: &[MInt]) -> Result<T> {
        let data = self.data::<T>()?;
        let offset = row_major_offset(self.dimensions(), position).map_err(|e| {
            registry::raise(match e {
                OffsetError::Rank => error_name::TENSOR_SIZE_ERROR,
                OffsetError::Bounds => error_name::TENSOR_INDEX_ERROR,
            })
            .with_debug(format!("position {position:?} in {:?}", self.dimensions()))
        })?;
        Ok(data[offset])
    }
}

impl<P: ModeFor<kind::Tensor> + Mutable> GenericTensor<P> {
    /// Mutable elements in row-major order
    pub fn data_mut<T: TensorElement>(&mut self) -> Result<&mut [T]> {
        let (ptr, len) = self.checked_data::<T>()?;
        if len == 0 {
            return Ok(&mut []);
        }
        Ok(unsafe { std::slice::from_raw_parts_mut(ptr, len) })
    }
}

pub(crate) enum OffsetError {
    /// Position has the wrong number of coordinates
    Rank,
    /// A coordinate is outside its dimension
    Bounds,
}

/// Flat offset of a zero-based position
pub(crate) fn row_major_offset(
    dims: &[MInt],
    position: &[MInt],
) -> std::result::Result<usize, OffsetError> {
    if dims.len() != position.len() {
        return Err(OffsetError::Rank);
    }
    let mut offset = 0usize;
    for (&d, &p) in dims.iter().zip(position) {
        if p < 0 || p >= d {
            return Err(OffsetError::Bounds);
        }
        offset = offset * d as usize + p as usize;
    }
    Ok(offset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::passing::{Automatic, Constant};
    use crate::sim;
    use hostlink_core::error_code;

    #[test]
    fn test_new_real_matrix() {
        sim::install();
        let t = GenericTensor::<Manual>::new(TensorType::Real, &[3, 3]).unwrap();
        assert_eq!(t.rank(), 2);
        assert_eq!(t.dimensions(), &[3, 3]);
        assert_eq!(t.flattened_length(), 9);
        assert_eq!(t.element_type(), Some(TensorType::Real));
        assert!(t.data::<MReal>().unwrap().iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_clone_mutation_does_not_reach_source() {
        sim::install();
        let source = GenericTensor::<Manual>::from_slice(&[2, 2], &[1.0, 2.0, 3.0, 4.0]).unwrap();
        let mut copy = source.try_clone().unwrap();
        copy.data_mut::<MReal>().unwrap()[0] = 100.0;
        assert_eq!(source.data::<MReal>().unwrap(), &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(copy.data::<MReal>().unwrap()[0], 100.0);
    }

    #[test]
    fn test_type_mismatch_is_reported() {
        sim::install();
        let t = GenericTensor::<Manual>::new(TensorType::Integer, &[2]).unwrap();
        let err = t.data::<MReal>().unwrap_err();
        assert_eq!(err.name(), error_name::TENSOR_TYPE_ERROR);
        assert!(!t.raw_data().is_null());
    }

    #[test]
    fn test_empty_container_data_is_init_error() {
        let t = GenericTensor::<Constant>::empty();
        let err = t.data::<MInt>().unwrap_err();
        assert_eq!(err.name(), error_name::TENSOR_INIT_ERROR);
    }

    #[test]
    fn test_at_checks_rank_and_bounds() {
        sim::install();
        let t = GenericTensor::<Manual>::from_slice(&[2, 3], &[1i64, 2, 3, 4, 5, 6]).unwrap();
        assert_eq!(t.at::<MInt>(&[1, 2]).unwrap(), 6);
        assert_eq!(t.at::<MInt>(&[0, 1]).unwrap(), 2);
        assert_eq!(
            t.at::<MInt>(&[2, 0]).unwrap_err().name(),
            error_name::TENSOR_INDEX_ERROR
        );
        assert_eq!(
            t.at::<MInt>(&[1]).unwrap_err().name(),
            error_name::TENSOR_SIZE_ERROR
        );
    }

    #[test]
    fn test_from_slice_size_mismatch() {
        sim::install();
        let err = GenericTensor::<Manual>::from_slice(&[3], &[1i64, 2]).unwrap_err();
        assert_eq!(err.name(), error_name::TENSOR_SIZE_ERROR);
    }

    #[test]
    fn test_host_creation_failure() {
        sim::install();
        let err = GenericTensor::<Manual>::new(TensorType::Real, &[-1]).unwrap_err();
        assert_eq!(err.name(), error_name::TENSOR_NEW_ERROR);
        assert!(err.id() < error_code::NO_ERROR);
    }

    #[test]
    fn test_automatic_view_can_write() {
        sim::install();
        let raw = sim::new_tensor(TensorType::Integer, &[2]);
        {
            let mut view = unsafe { GenericTensor::<Automatic>::from_raw(raw) };
            view.data_mut::<MInt>().unwrap()[1] = 7;
        }
        let view = unsafe { GenericTensor::<Constant>::from_raw(raw) };
        assert_eq!(view.data::<MInt>().unwrap(), &[0, 7]);
        sim::free_tensor(raw);
    }
}
