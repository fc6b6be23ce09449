//! Integration test for the host handshake
//!
//! Runs as its own binary so nothing else installs a callback table first.
//! Everything happens in one test because the table is process-wide.

use hostlink::error::take_last_error;
use hostlink::library::{self, LIBRARY_VERSION};
use hostlink::sim;
use hostlink::{
    DataList, GenericTensor, Manual, TensorType, error_code, error_name, hostlink_initialize,
    hostlink_uninitialize, registry,
};

#[test]
fn test_detached_then_installed() {
    // Detached: creation fails cleanly, nothing crashes
    assert!(!library::is_installed());
    assert_eq!(
        library::library().unwrap_err().name(),
        error_name::LIB_DATA_ERROR
    );
    assert_eq!(
        GenericTensor::<Manual>::new(TensorType::Real, &[2]).unwrap_err().name(),
        error_name::TENSOR_NEW_ERROR
    );
    assert_eq!(
        DataList::<Manual>::new().unwrap_err().name(),
        error_name::DL_CREATE_ERROR
    );

    let status = unsafe { hostlink_initialize(std::ptr::null()) };
    assert_eq!(
        status,
        registry::find_error_by_name(error_name::LIB_DATA_ERROR)
            .unwrap()
            .id()
    );
    assert_eq!(take_last_error().unwrap().name(), error_name::LIB_DATA_ERROR);

    // A table from another version is refused
    let mut stale = sim::table();
    stale.version = LIBRARY_VERSION - 1;
    assert_eq!(
        unsafe { hostlink_initialize(&stale) },
        error_code::VERSION_ERROR
    );
    assert!(!library::is_installed());

    // Installed
    let table = sim::table();
    assert_eq!(unsafe { hostlink_initialize(&table) }, error_code::NO_ERROR);
    assert!(library::is_installed());
    let t = GenericTensor::<Manual>::new(TensorType::Real, &[2]).unwrap();
    assert_eq!(t.flattened_length(), 2);
    drop(t);

    hostlink_uninitialize();
    assert!(!library::is_installed());
}
