//! Entry-point arguments
//!
//! [`ArgumentManager`] wraps the `(argc, args, res)` triple the host passes to
//! every library function and gives typed access to it.
//!
//! ```ignore
//! #[unsafe(no_mangle)]
//! pub unsafe extern "C" fn scale(
//!     argc: MInt,
//!     args: *mut MArgument,
//!     res: MArgument,
//! ) -> c_int {
//!     catch_library_errors(|| {
//!         let mut mngr = unsafe { ArgumentManager::new(argc, args, res)? };
//!         let t = mngr.get_tensor::<Constant>(0)?;
//!         let factor = mngr.get_real(1)?;
//!         let mut out = t.try_clone()?;
//!         out.data_mut::<MReal>()?.iter_mut().for_each(|x| *x *= factor);
//!         mngr.set_container(out);
//!         Ok(())
//!     })
//! }
//! ```

use crate::argument::PrimitiveWrapper;
use crate::container::Container;
use crate::data_list::DataList;
use crate::numeric_array::GenericNumericArray;
use crate::passing::{ContainerKind, ModeFor, PassingMode};
use crate::tensor::GenericTensor;
use hostlink_core::abi::{MArgument, MBool, MComplex, MInt, MReal};
use hostlink_core::kind::{self, ArgumentKind};
use hostlink_core::registry::{self, error_name};
use hostlink_core::Result;
use std::cell::RefCell;
use std::ffi::{CStr, CString};

thread_local! {
    /// String result of the last call on this thread; the host reads it after return
    static RESULT_STRING: RefCell<Option<CString>> = const { RefCell::new(None) };
}

/// Typed access to the arguments and result slot of one call
pub struct ArgumentManager<'a> {
    args: &'a mut [MArgument],
    res: MArgument,
}

impl<'a> ArgumentManager<'a> {
    /// # Safety
    /// `args` must point at `argc` slots whose kinds match what the host
    /// declared for this function, and `res` at storage for the declared
    /// result kind. Container arguments are adopted in whatever passing mode
    /// the caller names at the getter, which must match the host declaration.
    pub unsafe fn new(argc: MInt, args: *mut MArgument, res: MArgument) -> Result<Self> {
        let len = usize::try_from(argc).map_err(|_| {
            registry::raise(error_name::ARGUMENT_INDEX_ERROR).with_debug(format!("argc {argc}"))
        })?;
        let args: &'a mut [MArgument] = if len == 0 {
            Default::default()
        } else {
            if args.is_null() {
                return registry::fail(
                    error_name::ARGUMENT_INDEX_ERROR,
                    format!("{len} arguments but no slots"),
                );
            }
            unsafe { std::slice::from_raw_parts_mut(args, len) }
        };
        Ok(Self { args, res })
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    fn slot(&self, index: usize) -> Result<&MArgument> {
        let len = self.args.len();
        self.args.get(index).ok_or_else(|| {
            registry::raise(error_name::ARGUMENT_INDEX_ERROR)
                .with_debug(format!("index {index} out of range [0, {len})"))
        })
    }

    fn slot_mut(&mut self, index: usize) -> Result<&mut MArgument> {
        let len = self.args.len();
        self.args.get_mut(index).ok_or_else(|| {
            registry::raise(error_name::ARGUMENT_INDEX_ERROR)
                .with_debug(format!("index {index} out of range [0, {len})"))
        })
    }

    /// Raw value of kind `K` at `index`
    pub fn get<K: ArgumentKind>(&self, index: usize) -> Result<K::Value> {
        let slot = self.slot(index)?;
        Ok(unsafe { K::read(slot) })
    }

    pub fn get_boolean(&self, index: usize) -> Result<bool> {
        Ok(self.get::<kind::Boolean>(index)? != 0)
    }

    pub fn get_integer(&self, index: usize) -> Result<MInt> {
        self.get::<kind::Integer>(index)
    }

    pub fn get_real(&self, index: usize) -> Result<MReal> {
        self.get::<kind::Real>(index)
    }

    pub fn get_complex(&self, index: usize) -> Result<MComplex> {
        self.get::<kind::Complex>(index)
    }

    /// String argument, copied out (invalid UTF-8 is replaced)
    pub fn get_string(&self, index: usize) -> Result<String> {
        let ptr = self.get::<kind::Utf8String>(index)?;
        if ptr.is_null() {
            return Ok(String::new());
        }
        Ok(unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned())
    }

    /// Container argument under passing mode `P`
    pub fn get_container<K, P>(&self, index: usize) -> Result<Container<K, P>>
    where
        K: ContainerKind,
        P: ModeFor<K>,
    {
        let raw = self.get::<K>(index)?;
        tracing::trace!(index, kind = %K::TYPE, mode = %P::MODE, "container argument");
        Ok(unsafe { Container::from_raw(raw) })
    }

    pub fn get_tensor<P: ModeFor<kind::Tensor>>(&self, index: usize) -> Result<GenericTensor<P>> {
        self.get_container(index).map_err(|e| {
            registry::raise(error_name::ARGUMENT_TENSOR_ERROR).with_debug(e.to_string())
        })
    }

    pub fn get_numeric_array<P: ModeFor<kind::NumericArray>>(
        &self,
        index: usize,
    ) -> Result<GenericNumericArray<P>> {
        self.get_container(index).map_err(|e| {
            registry::raise(error_name::ARGUMENT_NUMERIC_ARRAY_ERROR).with_debug(e.to_string())
        })
    }

    pub fn get_data_list<P: ModeFor<kind::DataStore>>(&self, index: usize) -> Result<DataList<P>> {
        self.get_container(index).map_err(|e| {
            registry::raise(error_name::ARGUMENT_DATA_LIST_ERROR).with_debug(e.to_string())
        })
    }

    /// Typed view of the slot at `index`
    pub fn get_wrapper<K: ArgumentKind>(&mut self, index: usize) -> Result<PrimitiveWrapper<'_, K>> {
        let slot = self.slot_mut(index)?;
        unsafe { PrimitiveWrapper::new(slot) }
    }

    /// Write a raw result of kind `K`
    pub fn set<K: ArgumentKind>(&mut self, value: K::Value) {
        unsafe { K::write(&mut self.res, value) }
    }

    pub fn set_boolean(&mut self, value: bool) {
        self.set::<kind::Boolean>(MBool::from(value));
    }

    pub fn set_integer(&mut self, value: MInt) {
        self.set::<kind::Integer>(value);
    }

    pub fn set_real(&mut self, value: MReal) {
        self.set::<kind::Real>(value);
    }

    pub fn set_complex(&mut self, value: MComplex) {
        self.set::<kind::Complex>(value);
    }

    /// String result; the buffer lives until the next string result on this thread
    pub fn set_string(&mut self, value: &str) -> Result<()> {
        let text = CString::new(value).map_err(|_| {
            registry::raise(error_name::TYPE_ERROR).with_debug("string result contains NUL")
        })?;
        let ptr = text.as_ptr().cast_mut();
        RESULT_STRING.with(|s| *s.borrow_mut() = Some(text));
        self.set::<kind::Utf8String>(ptr);
        Ok(())
    }

    /// Hand a container to the host as the result
    ///
    /// The container gives up its handle: a library-owned (`Manual`) handle
    /// becomes the host's, and no mode releases anything on the way out.
    pub fn set_container<K: ContainerKind, P: PassingMode>(&mut self, container: Container<K, P>) {
        let raw = container.into_raw();
        tracing::trace!(kind = %K::TYPE, mode = %P::MODE, handle = ?raw, "container result");
        self.set::<K>(raw);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::passing::{Automatic, Constant, Manual};
    use crate::sim;
    use crate::tensor::TensorType;
    use hostlink_core::abi::MTensor;

    #[test]
    fn test_scalar_round_trip_through_slots() {
        let mut n: MInt = 41;
        let mut x: MReal = 0.5;
        let mut b: MBool = 1;
        let mut slots = [
            MArgument { integer: &mut n },
            MArgument { real: &mut x },
            MArgument { boolean: &mut b },
        ];
        let mut out: MInt = 0;
        let res = MArgument { integer: &mut out };
        let mut mngr = unsafe { ArgumentManager::new(3, slots.as_mut_ptr(), res) }.unwrap();
        assert_eq!(mngr.len(), 3);
        assert_eq!(mngr.get_integer(0).unwrap(), 41);
        assert_eq!(mngr.get_real(1).unwrap(), 0.5);
        assert!(mngr.get_boolean(2).unwrap());
        mngr.set_integer(mngr.get_integer(0).unwrap() + 1);
        assert_eq!(out, 42);
    }

    #[test]
    fn test_bad_index_is_argument_index_error() {
        let mut n: MInt = 1;
        let mut slots = [MArgument { integer: &mut n }];
        let mngr = unsafe { ArgumentManager::new(1, slots.as_mut_ptr(), MArgument::null()) }.unwrap();
        let err = mngr.get_integer(1).unwrap_err();
        assert_eq!(err.name(), error_name::ARGUMENT_INDEX_ERROR);
        assert!(err.debug().contains("index 1"));
    }

    #[test]
    fn test_invalid_argc() {
        let err = unsafe { ArgumentManager::new(-1, std::ptr::null_mut(), MArgument::null()) }
            .err()
            .unwrap();
        assert_eq!(err.name(), error_name::ARGUMENT_INDEX_ERROR);
        let err = unsafe { ArgumentManager::new(2, std::ptr::null_mut(), MArgument::null()) }
            .err()
            .unwrap();
        assert_eq!(err.name(), error_name::ARGUMENT_INDEX_ERROR);
        let empty = unsafe { ArgumentManager::new(0, std::ptr::null_mut(), MArgument::null()) };
        assert!(empty.unwrap().is_empty());
    }

    #[test]
    fn test_string_argument_and_result() {
        let text = CString::new("in").unwrap();
        let mut ptr = text.as_ptr().cast_mut();
        let mut slots = [MArgument { utf8string: &mut ptr }];
        let mut out: *mut std::ffi::c_char = std::ptr::null_mut();
        let res = MArgument { utf8string: &mut out };
        let mut mngr = unsafe { ArgumentManager::new(1, slots.as_mut_ptr(), res) }.unwrap();
        assert_eq!(mngr.get_string(0).unwrap(), "in");
        mngr.set_string("out").unwrap();
        assert_eq!(unsafe { CStr::from_ptr(out) }.to_str().unwrap(), "out");
        assert_eq!(
            mngr.set_string("a\0b").unwrap_err().name(),
            error_name::TYPE_ERROR
        );
    }

    #[test]
    fn test_container_arguments_follow_requested_mode() {
        sim::install();
        let mut raw = sim::new_tensor(TensorType::Real, &[2]);
        let mut slots = [MArgument { tensor: &mut raw }];
        let mut out: MTensor = std::ptr::null_mut();
        let res = MArgument { tensor: &mut out };
        let mut mngr = unsafe { ArgumentManager::new(1, slots.as_mut_ptr(), res) }.unwrap();

        drop(mngr.get_tensor::<Constant>(0).unwrap());
        drop(mngr.get_tensor::<Automatic>(0).unwrap());
        assert_eq!(sim::events(raw).frees, 0);

        let result = mngr
            .get_tensor::<Constant>(0)
            .unwrap()
            .try_clone()
            .unwrap();
        let result_raw = result.raw();
        mngr.set_container::<kind::Tensor, Manual>(result);
        assert_eq!(out, result_raw);
        assert_eq!(sim::events(result_raw).frees, 0);
        assert!(sim::is_live(result_raw));

        sim::free_tensor(raw);
        sim::free_tensor(result_raw);
    }

    #[test]
    fn test_wrapper_edits_argument_slot() {
        let mut n: MInt = 1;
        let mut slots = [MArgument { integer: &mut n }];
        let mut mngr = unsafe { ArgumentManager::new(1, slots.as_mut_ptr(), MArgument::null()) }.unwrap();
        mngr.get_wrapper::<kind::Integer>(0).unwrap().set(5);
        assert_eq!(mngr.get_integer(0).unwrap(), 5);
        assert!(mngr.get_wrapper::<kind::Integer>(3).is_err());
    }
}
