//! Side channel to the host
//!
//! Structured data travels to the host as [`Expr`] packets over a link. Two
//! things use it:
//!
//! - [`dump_registry`] sends every registered error kind as
//!   `<| name -> {id, message}, ... |>` so the host can map status codes back
//!   to names.
//! - [`SendParameters`] flushes the auxiliary parameters of a failed call by
//!   evaluating `Set[symbol, {params...}]` on the host, where `symbol` is the
//!   exception-details symbol (configurable, see [`crate::config`]).

use crate::config::config;
use crate::error::catch_library_errors;
use crate::library::api;
use hostlink_core::abi::MLink;
use hostlink_core::registry::{self, error_code, error_name};
use hostlink_core::{Expr, RaisedError, Result};
use std::ffi::{CStr, c_char, c_int};
use std::sync::{LazyLock, PoisonError, RwLock};

static EXCEPTION_SYMBOL: LazyLock<RwLock<String>> =
    LazyLock::new(|| RwLock::new(config().exception_symbol.clone()));

/// Host symbol that receives the parameters of a failed call
pub fn exception_details_symbol() -> String {
    EXCEPTION_SYMBOL
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

pub fn set_exception_details_symbol(symbol: impl Into<String>) {
    let symbol = symbol.into();
    tracing::debug!(%symbol, "exception details symbol changed");
    *EXCEPTION_SYMBOL
        .write()
        .unwrap_or_else(PoisonError::into_inner) = symbol;
}

/// Link of the call currently executing
pub fn main_link() -> Result<MLink> {
    let link = unsafe { (api().link.main_link)() };
    if link.is_null() {
        return Err(registry::raise(error_name::LINK_NOT_AVAILABLE_ERROR));
    }
    Ok(link)
}

/// Encode `expr` and queue it on `link`
pub fn put_expr(link: MLink, expr: &Expr) -> Result<()> {
    if link.is_null() {
        return Err(registry::raise(error_name::LINK_NOT_AVAILABLE_ERROR));
    }
    let bytes = expr.to_bytes().map_err(|e| {
        registry::raise(error_name::LINK_ENCODE_ERROR).with_debug(e.to_string())
    })?;
    let status = unsafe { (api().link.put_packet)(link, bytes.as_ptr(), bytes.len()) };
    if status != 0 {
        return registry::fail(error_name::LINK_PUT_PACKET_ERROR, format!("status {status}"));
    }
    tracing::trace!(expr = %expr.to_debug_string(), "packet sent");
    Ok(())
}

/// Let the host evaluate what has been queued on `link`
pub fn process(link: MLink) -> Result<()> {
    let status = unsafe { (api().link.process)(link) };
    if status != 0 {
        return registry::fail(error_name::LINK_PROCESS_ERROR, format!("status {status}"));
    }
    Ok(())
}

/// The registry as `<| name -> {id, message}, ... |>`, in registration order
pub fn registry_expr() -> Expr {
    let rules = registry::entries()
        .iter()
        .map(|kind| {
            Expr::rule(
                kind.name(),
                Expr::list(vec![kind.id().into(), kind.message().into()]),
            )
        })
        .collect();
    Expr::association(rules)
}

/// Send the whole registry over `link`
pub fn dump_registry(link: MLink) -> Result<()> {
    put_expr(link, &registry_expr())
}

/// Flushing a raised error's parameters to the host
pub trait SendParameters {
    /// Evaluate `Set[symbol, params]` on the host
    ///
    /// Returns `NoError` when there is nothing to send or the send succeeded,
    /// otherwise the id of the step that failed. Never panics.
    fn send_parameters(&self, symbol: &str) -> c_int;
}

impl SendParameters for RaisedError {
    fn send_parameters(&self, symbol: &str) -> c_int {
        let Some(bytes) = self.parameters() else {
            return error_code::NO_ERROR;
        };
        let result = Expr::from_bytes(bytes)
            .map_err(|e| registry::raise(error_name::LINK_ENCODE_ERROR).with_debug(e.to_string()))
            .and_then(|params| {
                let link = main_link()?;
                put_expr(link, &Expr::evaluate_packet(Expr::set(symbol, params)))?;
                process(link)
            });
        match result {
            Ok(()) => error_code::NO_ERROR,
            Err(e) => {
                tracing::debug!(error = %e, "parameter flush failed");
                e.id()
            }
        }
    }
}

/// Host entry point: send the registry over `link`
#[unsafe(no_mangle)]
pub extern "C" fn hostlink_send_registered_errors(link: MLink) -> c_int {
    catch_library_errors(|| dump_registry(link))
}

/// Host entry point: change the exception-details symbol
///
/// # Safety
/// `symbol` must be null or NUL-terminated.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hostlink_set_exception_details_symbol(symbol: *const c_char) -> c_int {
    catch_library_errors(|| {
        if symbol.is_null() {
            return registry::fail(error_name::FUNCTION_ERROR, "null symbol");
        }
        let symbol = unsafe { CStr::from_ptr(symbol) }
            .to_str()
            .map_err(|e| registry::raise(error_name::FUNCTION_ERROR).with_debug(e.to_string()))?;
        set_exception_details_symbol(symbol);
        Ok(())
    })
}
