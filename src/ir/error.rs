//! IR error contracts.

use std::error::Error;
use std::fmt;

/// Stable IR error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrErrorKind {
    /// A required IR invariant was violated.
    InvariantViolation,
    /// A name collides with an existing definition.
    DuplicateName,
    /// A named entity could not be resolved.
    UnknownName,
    /// An expression's type does not fit its context.
    TypeMismatch,
    /// A local or function index is out of range.
    IndexOutOfRange,
}

/// IR error payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrError {
    /// Error category.
    pub kind: IrErrorKind,
    /// Human-readable error summary.
    pub message: String,
    /// Optional additional detail.
    pub detail: Option<String>,
}

impl IrError {
    /// Creates an IR error.
    pub fn new(kind: IrErrorKind, message: impl Into<String>, detail: Option<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            detail,
        }
    }

    /// Creates an `InvariantViolation` error.
    pub fn invariant_violation(message: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(
            IrErrorKind::InvariantViolation,
            message,
            Some(detail.into()),
        )
    }

    /// Creates a `DuplicateName` error.
    pub fn duplicate_name(message: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(IrErrorKind::DuplicateName, message, Some(detail.into()))
    }

    /// Creates an `UnknownName` error.
    pub fn unknown_name(message: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(IrErrorKind::UnknownName, message, Some(detail.into()))
    }

    /// Creates a `TypeMismatch` error.
    pub fn type_mismatch(message: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(IrErrorKind::TypeMismatch, message, Some(detail.into()))
    }

    /// Creates an `IndexOutOfRange` error.
    pub fn index_out_of_range(message: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(IrErrorKind::IndexOutOfRange, message, Some(detail.into()))
    }
}

impl fmt::Display for IrError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)?;
        if let Some(detail) = &self.detail {
            write!(f, " ({detail})")?;
        }
        Ok(())
    }
}

impl Error for IrError {}
