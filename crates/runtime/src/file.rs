//! File access for library functions
//!
//! Paths coming from the host must pass the host's own path validation before
//! the library touches them. [`open_file`] does both steps: it parses a C-style
//! mode string, asks the host whether the access is allowed and opens the file.
//!
//! ```ignore
//! let mut f = open_file("/tmp/out.bin", "wb")?;
//! f.write_all(&bytes)?;
//! ```

use crate::library::api;
use hostlink_core::registry::{self, error_name};
use hostlink_core::Result;
use std::ffi::{CString, c_char};
use std::fs::{File, OpenOptions};
use std::path::Path;

/// Access a path is validated for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

impl Access {
    fn as_c_char(self) -> c_char {
        match self {
            Access::Read => b'R' as c_char,
            Access::Write => b'W' as c_char,
        }
    }
}

/// Parsed C-style open mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenMode {
    read: bool,
    write: bool,
    append: bool,
    truncate: bool,
    create: bool,
    binary: bool,
}

impl OpenMode {
    /// Parse `"r"`, `"w"`, `"a"`, `"r+"`, `"w+"` or `"a+"`, each optionally with `b`
    pub fn parse(mode: &str) -> Result<Self> {
        let binary = mode.contains('b');
        let base: String = mode.chars().filter(|&c| c != 'b').collect();
        if mode.matches('b').count() > 1 {
            return registry::fail(error_name::INVALID_OPEN_MODE, mode);
        }
        let (read, write, append, truncate, create) = match base.as_str() {
            "r" => (true, false, false, false, false),
            "w" => (false, true, false, true, true),
            "a" => (false, true, true, false, true),
            "r+" => (true, true, false, false, false),
            "w+" => (true, true, false, true, true),
            "a+" => (true, true, true, false, true),
            _ => return registry::fail(error_name::INVALID_OPEN_MODE, mode),
        };
        Ok(Self {
            read,
            write,
            append,
            truncate,
            create,
            binary,
        })
    }

    /// Strictest access the mode needs
    pub fn access(&self) -> Access {
        if self.write {
            Access::Write
        } else {
            Access::Read
        }
    }

    pub fn is_binary(&self) -> bool {
        self.binary
    }

    fn options(&self) -> OpenOptions {
        let mut options = OpenOptions::new();
        options
            .read(self.read)
            .write(self.write && !self.append)
            .append(self.append)
            .truncate(self.truncate)
            .create(self.create);
        options
    }
}

/// Ask the host whether `path` may be accessed
pub fn validate_path(path: &Path, access: Access) -> Result<()> {
    let text = path.to_string_lossy();
    let c_path = CString::new(text.as_bytes())
        .map_err(|_| registry::raise(error_name::PATH_NOT_VALIDATED).with_debug(text.to_string()))?;
    let allowed = unsafe { (api().validate_path)(c_path.as_ptr(), access.as_c_char()) } != 0;
    if !allowed {
        return registry::fail(error_name::PATH_NOT_VALIDATED, text.to_string());
    }
    Ok(())
}

/// Validate `path` for `mode` and open it
pub fn open_file(path: impl AsRef<Path>, mode: &str) -> Result<File> {
    let path = path.as_ref();
    let mode = OpenMode::parse(mode)?;
    validate_path(path, mode.access())?;
    mode.options().open(path).map_err(|e| {
        registry::raise(error_name::OPEN_FILE_FAILED)
            .with_debug(format!("{}: {e}", path.display()))
    })
}
