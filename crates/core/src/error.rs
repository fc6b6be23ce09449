//! Error kinds and raised errors
//!
//! An [`ErrorKind`] is an immutable registered definition (id, name, message).
//! A [`RaisedError`] is one failure in flight toward the entry-point boundary:
//! it points at its kind and carries mutable diagnostic state (debug text and
//! optional side-channel parameters).
//!
//! Kinds are obtained from the process-wide registry in [`crate::registry`];
//! internal routines return `Result<T, RaisedError>` and propagate with `?`.

use crate::expr::Expr;
use std::fmt;
use std::sync::Arc;

/// Immutable registered error definition
#[derive(Debug, PartialEq, Eq)]
pub struct ErrorKind {
    id: i32,
    name: String,
    message: String,
}

impl ErrorKind {
    pub(crate) fn new(id: i32, name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// A live error instance
#[derive(Debug, Clone)]
pub struct RaisedError {
    kind: Arc<ErrorKind>,
    debug: String,
    /// bincode-encoded `List[...]` of parameters
    params: Option<Vec<u8>>,
}

impl RaisedError {
    pub fn new(kind: Arc<ErrorKind>) -> Self {
        Self {
            kind,
            debug: String::new(),
            params: None,
        }
    }

    pub fn kind(&self) -> &Arc<ErrorKind> {
        &self.kind
    }

    pub fn id(&self) -> i32 {
        self.kind.id
    }

    pub fn name(&self) -> &str {
        &self.kind.name
    }

    pub fn message(&self) -> &str {
        &self.kind.message
    }

    /// Debug text attached on the way to the boundary (empty if none)
    pub fn debug(&self) -> &str {
        &self.debug
    }

    pub fn set_debug_info(&mut self, info: impl Into<String>) {
        self.debug = info.into();
    }

    pub fn with_debug(mut self, info: impl Into<String>) -> Self {
        self.set_debug_info(info);
        self
    }

    /// Attach auxiliary parameters, encoded now so the payload is fixed at raise time
    ///
    /// Encoding failures drop the payload; the error itself is kept.
    pub fn set_message_parameters<I>(&mut self, params: I)
    where
        I: IntoIterator,
        I::Item: Into<Expr>,
    {
        let list = Expr::list(params.into_iter().map(Into::into).collect());
        match list.to_bytes() {
            Ok(bytes) => self.params = Some(bytes),
            Err(e) => {
                tracing::warn!(error = %e, kind = self.name(), "dropping error parameters");
                self.params = None;
            }
        }
    }

    pub fn with_parameters<I>(mut self, params: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Expr>,
    {
        self.set_message_parameters(params);
        self
    }

    pub fn has_parameters(&self) -> bool {
        self.params.is_some()
    }

    /// Encoded parameter list, if any
    pub fn parameters(&self) -> Option<&[u8]> {
        self.params.as_deref()
    }

    pub fn take_parameters(&mut self) -> Option<Vec<u8>> {
        self.params.take()
    }
}

impl fmt::Display for RaisedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.name(), self.id(), self.message())?;
        if !self.debug.is_empty() {
            write!(f, " [{}]", self.debug)?;
        }
        Ok(())
    }
}

impl std::error::Error for RaisedError {}
