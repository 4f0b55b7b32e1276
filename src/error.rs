//! Error types shared by every layer of the crate.
//!
//! Definition problems, precondition failures and dispatch bookkeeping failures
//! each get their own variant. Exceptions raised by advice bodies or by the
//! original join point travel through [`Error::Thrown`] and are never rewritten.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::joinpoint::Throwable;
use crate::reflect::classfile::ClassFileError;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Malformed pattern or expression text, or an inconsistent aspect definition.
    #[error("invalid definition `{subject}`: {reason}")]
    Definition { subject: String, reason: String },

    /// Null-like or empty subject handed to a matcher or tracker.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// Advice/pointcut bookkeeping went out of bounds inside a controller.
    #[error("advice incorrectly mapped at join point {join_point}: {detail}")]
    InternalDispatch { join_point: String, detail: String },

    /// A definition file could not be read.
    #[error("cannot read {}: {source}", path.display())]
    Io { path: PathBuf, #[source] source: Arc<std::io::Error> },

    /// A bytecode backend failed to read a class.
    #[error("class file: {0}")]
    ClassFile(#[from] ClassFileError),

    /// Exception raised by an advice body or the original join point.
    #[error("{0}")]
    Thrown(Throwable),
}

impl Error {
    pub fn definition(subject: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Definition { subject: subject.into(), reason: reason.into() }
    }

    pub fn internal(join_point: impl Into<String>, detail: impl Into<String>) -> Self {
        Error::InternalDispatch { join_point: join_point.into(), detail: detail.into() }
    }

    /// Raise a business exception.
    pub fn thrown(class_name: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Thrown(Throwable::new(class_name, message))
    }

    pub fn is_definition(&self) -> bool {
        matches!(self, Error::Definition { .. })
    }

    /// The carried exception, if this error is a business failure.
    pub fn throwable(&self) -> Option<&Throwable> {
        match self {
            Error::Thrown(t) => Some(t),
            _ => None,
        }
    }
}

impl From<Throwable> for Error {
    fn from(value: Throwable) -> Self {
        Error::Thrown(value)
    }
}
