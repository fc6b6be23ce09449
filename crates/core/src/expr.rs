//! Side-channel expressions
//!
//! A small structured value model for data sent to the host over a link:
//! the error-registry dump and the parameters attached to a raised error.
//!
//! # Encoding
//!
//! Expressions travel as bincode-encoded [`Expr`] trees, one tree per packet.
//! For logging use [`Expr::to_debug_string`], which renders a compact
//! InputForm-like text (`{1, 2}`, `"a" -> 3`, `<|"k" -> v|>`).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error while encoding or decoding an expression
#[derive(Debug)]
pub enum ExprError {
    /// Bincode encoding/decoding error (preserves original error for debugging)
    BincodeError(Box<bincode::Error>),
    /// Decoded tree does not have the expected shape
    UnexpectedShape(String),
}

impl fmt::Display for ExprError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExprError::BincodeError(e) => write!(f, "Bincode error: {}", e),
            ExprError::UnexpectedShape(msg) => write!(f, "Unexpected expression shape: {}", msg),
        }
    }
}

impl std::error::Error for ExprError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExprError::BincodeError(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<bincode::Error> for ExprError {
    fn from(e: bincode::Error) -> Self {
        ExprError::BincodeError(Box::new(e))
    }
}

/// A structured host value
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Expr {
    Integer(i64),
    Real(f64),
    String(String),
    Symbol(String),
    /// `head[args...]`
    Function { head: String, args: Vec<Expr> },
}

impl Expr {
    pub fn symbol(name: impl Into<String>) -> Self {
        Expr::Symbol(name.into())
    }

    pub fn function(head: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Function {
            head: head.into(),
            args,
        }
    }

    pub fn list(items: Vec<Expr>) -> Self {
        Self::function("List", items)
    }

    pub fn rule(lhs: impl Into<Expr>, rhs: impl Into<Expr>) -> Self {
        Self::function("Rule", vec![lhs.into(), rhs.into()])
    }

    /// Association of rules, in the given order
    pub fn association(rules: Vec<Expr>) -> Self {
        Self::function("Association", rules)
    }

    /// `Set[symbol, value]`
    pub fn set(symbol: impl Into<String>, value: Expr) -> Self {
        Self::function("Set", vec![Expr::Symbol(symbol.into()), value])
    }

    /// Ask the host to evaluate `expr`
    pub fn evaluate_packet(expr: Expr) -> Self {
        Self::function("EvaluatePacket", vec![expr])
    }

    /// Head of a function expression
    pub fn head(&self) -> Option<&str> {
        match self {
            Expr::Function { head, .. } => Some(head),
            _ => None,
        }
    }

    /// Arguments of a function expression (empty for atoms)
    pub fn args(&self) -> &[Expr] {
        match self {
            Expr::Function { args, .. } => args,
            _ => &[],
        }
    }

    /// True for `head[...]` with the given head
    pub fn has_head(&self, name: &str) -> bool {
        self.head() == Some(name)
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Expr::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Expr::String(s) | Expr::Symbol(s) => Some(s),
            _ => None,
        }
    }

    /// Serialize to binary format
    pub fn to_bytes(&self) -> Result<Vec<u8>, ExprError> {
        bincode::serialize(self).map_err(ExprError::from)
    }

    /// Deserialize from binary format
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ExprError> {
        bincode::deserialize(bytes).map_err(ExprError::from)
    }

    /// Convert to human-readable debug string
    pub fn to_debug_string(&self) -> String {
        match self {
            Expr::Integer(v) => v.to_string(),
            Expr::Real(v) => format!("{v:?}"),
            Expr::String(s) => format!("{s:?}"),
            Expr::Symbol(s) => s.clone(),
            Expr::Function { head, args } => {
                let parts: Vec<String> = args.iter().map(|a| a.to_debug_string()).collect();
                match head.as_str() {
                    "List" => format!("{{{}}}", parts.join(", ")),
                    "Association" => format!("<|{}|>", parts.join(", ")),
                    "Rule" if parts.len() == 2 => format!("{} -> {}", parts[0], parts[1]),
                    _ => format!("{}[{}]", head, parts.join(", ")),
                }
            }
        }
    }
}

impl From<i64> for Expr {
    fn from(v: i64) -> Self {
        Expr::Integer(v)
    }
}

impl From<i32> for Expr {
    fn from(v: i32) -> Self {
        Expr::Integer(v.into())
    }
}

impl From<f64> for Expr {
    fn from(v: f64) -> Self {
        Expr::Real(v)
    }
}

impl From<bool> for Expr {
    fn from(v: bool) -> Self {
        Expr::Symbol(if v { "True" } else { "False" }.to_string())
    }
}

impl From<&str> for Expr {
    fn from(v: &str) -> Self {
        Expr::String(v.to_string())
    }
}

impl From<String> for Expr {
    fn from(v: String) -> Self {
        Expr::String(v)
    }
}

impl<T: Into<Expr>> From<Vec<T>> for Expr {
    fn from(items: Vec<T>) -> Self {
        Expr::list(items.into_iter().map(Into::into).collect())
    }
}
