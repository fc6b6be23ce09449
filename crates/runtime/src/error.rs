//! Entry-point boundary
//!
//! Every entry point the host calls returns one integer status. This module is
//! the single place where a `Result` (or a panic) becomes that status:
//!
//! - `Ok` maps to `NoError` (0)
//! - a [`RaisedError`] maps to its kind's id; its parameters, if any, are sent
//!   to the host over the side channel first
//! - a panic maps to `FunctionError`
//!
//! The converted error is also kept in a thread-local slot so hosts that want
//! the text can fetch it:
//!
//! ```ignore
//! let status = hostlink_send_registered_errors(link);
//! if hostlink_has_error() {
//!     let text = hostlink_take_error();
//!     // copy it before the next call on this thread
//! }
//! ```

use crate::transport::SendParameters;
use hostlink_core::registry::{self, error_code, error_name};
use hostlink_core::{RaisedError, Result};
use std::cell::RefCell;
use std::ffi::{CString, c_char, c_int};
use std::panic::{self, AssertUnwindSafe};
use std::ptr;

thread_local! {
    /// Last error converted at the boundary on this thread
    static LAST_ERROR: RefCell<Option<RaisedError>> = const { RefCell::new(None) };

    /// Backing buffer for the pointer handed out by `hostlink_get_error`
    static ERROR_CSTRING: RefCell<Option<CString>> = const { RefCell::new(None) };
}

/// Record `err` as this thread's last error
pub fn set_last_error(err: RaisedError) {
    ERROR_CSTRING.with(|cs| *cs.borrow_mut() = None);
    LAST_ERROR.with(|e| *e.borrow_mut() = Some(err));
}

/// Take (and clear) the last error
pub fn take_last_error() -> Option<RaisedError> {
    LAST_ERROR.with(|e| e.borrow_mut().take())
}

pub fn has_last_error() -> bool {
    LAST_ERROR.with(|e| e.borrow().is_some())
}

/// Id of the last error without clearing it
pub fn last_error_id() -> Option<i32> {
    LAST_ERROR.with(|e| e.borrow().as_ref().map(RaisedError::id))
}

pub fn clear_last_error() {
    LAST_ERROR.with(|e| *e.borrow_mut() = None);
    ERROR_CSTRING.with(|cs| *cs.borrow_mut() = None);
}

/// Format a panic payload into an error message
pub fn format_panic_payload(payload: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Run `f` and translate its outcome into a status code
pub fn catch_library_errors<F>(f: F) -> c_int
where
    F: FnOnce() -> Result<()>,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => error_code::NO_ERROR,
        Ok(Err(err)) => {
            tracing::warn!(error = %err, "entry point failed");
            if err.has_parameters() {
                let symbol = crate::transport::exception_details_symbol();
                let status = err.send_parameters(&symbol);
                if status != error_code::NO_ERROR {
                    tracing::warn!(status, %symbol, "could not send error parameters");
                }
            }
            let id = err.id();
            set_last_error(err);
            id
        }
        Err(payload) => {
            let message = format_panic_payload(&payload);
            tracing::error!(panic = %message, "entry point panicked");
            set_last_error(registry::raise(error_name::FUNCTION_ERROR).with_debug(message));
            error_code::FUNCTION_ERROR
        }
    }
}

fn cache_cstring(text: String) -> *const c_char {
    let safe: String = text
        .chars()
        .map(|c| if c == '\0' { '?' } else { c })
        .collect();
    let Ok(cstring) = CString::new(safe) else {
        return ptr::null();
    };
    ERROR_CSTRING.with(|cs| {
        let ptr = cstring.as_ptr();
        *cs.borrow_mut() = Some(cstring);
        ptr
    })
}

/// Check if an error is pending on this thread (FFI-safe)
#[unsafe(no_mangle)]
pub extern "C" fn hostlink_has_error() -> bool {
    has_last_error()
}

/// Status code of the pending error, `NoError` if none (FFI-safe)
#[unsafe(no_mangle)]
pub extern "C" fn hostlink_error_code() -> c_int {
    last_error_id().unwrap_or(error_code::NO_ERROR)
}

/// The pending error as text, or null (FFI-safe)
///
/// # WARNING: Pointer Lifetime
/// The returned pointer is only valid until the next error call on this
/// thread. Callers must copy the string immediately if they need to retain it.
#[unsafe(no_mangle)]
pub extern "C" fn hostlink_get_error() -> *const c_char {
    let text = LAST_ERROR.with(|e| e.borrow().as_ref().map(ToString::to_string));
    match text {
        Some(text) => cache_cstring(text),
        None => ptr::null(),
    }
}

/// Take (and clear) the pending error as text, or null (FFI-safe)
///
/// Same pointer lifetime as [`hostlink_get_error`].
#[unsafe(no_mangle)]
pub extern "C" fn hostlink_take_error() -> *const c_char {
    match take_last_error() {
        Some(err) => cache_cstring(err.to_string()),
        None => ptr::null(),
    }
}

/// Clear any pending error (FFI-safe)
#[unsafe(no_mangle)]
pub extern "C" fn hostlink_clear_error() {
    clear_last_error();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CStr;

    #[test]
    fn test_ok_maps_to_no_error() {
        clear_last_error();
        assert_eq!(catch_library_errors(|| Ok(())), error_code::NO_ERROR);
        assert!(!hostlink_has_error());
        assert!(hostlink_get_error().is_null());
    }

    #[test]
    fn test_error_maps_to_its_id() {
        clear_last_error();
        let status = catch_library_errors(|| registry::fail(error_name::TENSOR_INDEX_ERROR, "i=9"));
        let expected = registry::find_error_by_name(error_name::TENSOR_INDEX_ERROR)
            .unwrap()
            .id();
        assert_eq!(status, expected);
        assert!(status < 0);
        assert_eq!(hostlink_error_code(), expected);

        let text = unsafe { CStr::from_ptr(hostlink_get_error()) }
            .to_str()
            .unwrap()
            .to_string();
        assert!(text.contains("TensorIndexError"));
        assert!(text.contains("i=9"));

        assert!(!hostlink_take_error().is_null());
        assert!(!hostlink_has_error());
    }

    #[test]
    fn test_panic_maps_to_function_error() {
        clear_last_error();
        let status = catch_library_errors(|| panic!("boom"));
        assert_eq!(status, error_code::FUNCTION_ERROR);
        let err = take_last_error().unwrap();
        assert_eq!(err.name(), error_name::FUNCTION_ERROR);
        assert_eq!(err.debug(), "boom");
    }

    #[test]
    fn test_format_panic_payload() {
        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("owned"));
        assert_eq!(format_panic_payload(&payload), "owned");
        let payload: Box<dyn std::any::Any + Send> = Box::new(42);
        assert_eq!(format_panic_payload(&payload), "unknown panic");
    }

    #[test]
    fn test_clear_error() {
        set_last_error(registry::raise(error_name::ABORTED));
        assert!(hostlink_has_error());
        hostlink_clear_error();
        assert!(!hostlink_has_error());
        assert_eq!(hostlink_error_code(), error_code::NO_ERROR);
    }
}
