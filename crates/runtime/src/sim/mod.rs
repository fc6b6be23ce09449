//! In-process host
//!
//! A complete [`LibraryFunctions`] table backed by plain Rust collections.
//! It lets the marshalling layer run without a real host runtime: unit tests,
//! integration tests and embedders that only need the data model use it.
//!
//! Handles are ids from one monotonic counter, cast to pointers. They are
//! never dereferenced and never reused, so a freed handle stays invalid.
//! Data and dimension pointers handed out are real and stay valid until the
//! owning array or collection is freed.
//!
//! Release calls are counted per handle ([`events`]), including after the
//! handle is gone.
//!
//! Abort requests, path denials and the main link are per thread, so
//! parallel tests do not see each other's setup.

mod arrays;
mod link;
mod store;

use crate::library::{self, LIBRARY_VERSION, LibraryFunctions};
use hostlink_core::abi::MInt;
use hostlink_core::registry;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::ffi::{CStr, c_char};
use std::sync::{LazyLock, Mutex, MutexGuard, PoisonError};

pub use arrays::{free_tensor, new_tensor, share};
pub use link::{break_link, new_link, set_main_link, symbol_value, take_packets};

/// Release calls recorded for one handle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Events {
    pub frees: u32,
    pub disowns: u32,
}

struct World {
    next_id: usize,
    arrays: HashMap<usize, arrays::Array>,
    stores: HashMap<usize, store::Store>,
    /// node id -> (store id, position)
    nodes: HashMap<usize, (usize, usize)>,
    links: HashMap<usize, link::Link>,
    events: HashMap<usize, Events>,
}

impl World {
    fn new() -> Self {
        Self {
            next_id: 1,
            arrays: HashMap::new(),
            stores: HashMap::new(),
            nodes: HashMap::new(),
            links: HashMap::new(),
            events: HashMap::new(),
        }
    }

    fn allocate_id(&mut self) -> usize {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn record(&mut self, id: usize) -> &mut Events {
        self.events.entry(id).or_default()
    }
}

static WORLD: LazyLock<Mutex<World>> = LazyLock::new(|| Mutex::new(World::new()));

fn world() -> MutexGuard<'static, World> {
    WORLD.lock().unwrap_or_else(PoisonError::into_inner)
}

fn id_of<T>(raw: *mut T) -> usize {
    raw as usize
}

fn handle<T>(id: usize) -> *mut T {
    id as *mut T
}

thread_local! {
    static ABORT: Cell<bool> = const { Cell::new(false) };
    static DENIED: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
}

/// Install the in-process table (idempotent)
pub fn install() {
    registry::initialize();
    if let Err(e) = library::install(table()) {
        tracing::error!(error = %e, "in-process host table rejected");
    }
}

/// The callback table, for hosts that want to install it themselves
pub fn table() -> LibraryFunctions {
    LibraryFunctions {
        version: LIBRARY_VERSION,
        tensor: arrays::TENSOR,
        numeric_array: arrays::NUMERIC_ARRAY,
        data_store: store::DATA_STORE,
        link: link::LINK,
        validate_path,
        abort_q,
    }
}

/// Release calls seen for `raw` so far
pub fn events<T>(raw: *mut T) -> Events {
    world()
        .events
        .get(&id_of(raw))
        .copied()
        .unwrap_or_default()
}

/// True while `raw` names a live array, collection or link
pub fn is_live<T>(raw: *mut T) -> bool {
    let id = id_of(raw);
    let w = world();
    w.arrays.contains_key(&id) || w.stores.contains_key(&id) || w.links.contains_key(&id)
}

/// Number of live arrays and collections
pub fn live_count() -> usize {
    let w = world();
    w.arrays.len() + w.stores.len()
}

/// Make `abort_q` report a pending abort on this thread
pub fn set_abort(requested: bool) {
    ABORT.with(|a| a.set(requested));
}

/// Refuse access to every path starting with `prefix` on this thread
pub fn deny_paths(prefix: &str) {
    DENIED.with(|d| d.borrow_mut().push(prefix.to_string()));
}

/// Drop this thread's path denials
pub fn allow_all_paths() {
    DENIED.with(|d| d.borrow_mut().clear());
}

unsafe extern "C" fn abort_q() -> MInt {
    MInt::from(ABORT.with(Cell::get))
}

unsafe extern "C" fn validate_path(path: *const c_char, _mode: c_char) -> i32 {
    if path.is_null() {
        return 0;
    }
    let path = unsafe { CStr::from_ptr(path) }.to_string_lossy();
    let denied = DENIED.with(|d| d.borrow().iter().any(|p| path.starts_with(p.as_str())));
    i32::from(!denied)
}

/// Handle as a plain id
pub fn handle_id<T>(raw: *mut T) -> usize {
    id_of(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::TensorType;

    #[test]
    fn test_ids_are_never_reused() {
        install();
        let a = new_tensor(TensorType::Integer, &[1]);
        free_tensor(a);
        let b = new_tensor(TensorType::Integer, &[1]);
        assert_ne!(handle_id(a), handle_id(b));
        assert!(!is_live(a));
        assert!(is_live(b));
        assert_eq!(events(a).frees, 1);
        free_tensor(b);
    }

    #[test]
    fn test_abort_is_per_thread() {
        install();
        set_abort(true);
        assert_eq!(unsafe { abort_q() }, 1);
        let other = std::thread::spawn(|| unsafe { abort_q() }).join().unwrap();
        assert_eq!(other, 0);
        set_abort(false);
    }

    #[test]
    fn test_path_denial() {
        deny_paths("/secret");
        let ok = std::ffi::CString::new("/tmp/x").unwrap();
        let bad = std::ffi::CString::new("/secret/x").unwrap();
        unsafe {
            assert_eq!(validate_path(ok.as_ptr(), b'R' as c_char), 1);
            assert_eq!(validate_path(bad.as_ptr(), b'W' as c_char), 0);
        }
        allow_all_paths();
        assert_eq!(unsafe { validate_path(bad.as_ptr(), b'R' as c_char) }, 1);
    }
}
