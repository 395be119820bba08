//! # Error Types
//!
//! Every failure of a kernel call travels through [`KernelError`]. The host
//! treats any variant as a failed call; none is retried or recovered here.

use std::sync::Arc;

use lua_tensor::IndexError;
use thiserror::Error;

/// Result alias used throughout the kernel.
pub type KernelResult<T> = Result<T, KernelError>;

/// Errors surfaced to the host by a Lua kernel.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum KernelError {
    /// Top-level evaluation did not yield exactly one function, or the
    /// function returned the wrong number of values.
    #[error("script structure: {detail}")]
    ScriptStructure { detail: String },

    /// Compilation failed or the script raised; the Lua diagnostic is kept verbatim.
    #[error("{diagnostic}")]
    ScriptExecution { diagnostic: String },

    /// A tensor accessor was called with the wrong number of indices.
    #[error("tensor get: expected number of arguments to be equal to rank {rank}, got {got}")]
    Arity { rank: usize, got: usize },

    /// A tensor accessor was called with an out-of-range index.
    #[error("tensor get: {detail}")]
    Bounds { detail: String },

    /// A returned `shape` field is missing or not a dense 1-based array.
    #[error("output {slot}: malformed shape: {detail}")]
    MalformedShape { slot: usize, detail: String },

    /// A returned slot value is not a tensor table.
    #[error("output {slot}: {detail}")]
    Type { slot: usize, detail: String },

    /// Script and host disagree on whether an output slot is present.
    #[error("output {slot}: {detail}")]
    SlotMismatch { slot: usize, detail: String },

    /// The returned accessor failed while the output was being read.
    #[error("output {slot}: evaluation failed: {detail}")]
    Evaluation { slot: usize, detail: String },

    /// Kernel construction found a missing or mistyped attribute.
    #[error("attribute '{name}': {detail}")]
    Attribute { name: String, detail: String },

    /// An operator could not be added to its domain.
    #[error("registration: {detail}")]
    Registration { detail: String },
}

/// Fieldless discriminant of [`KernelError`], for matching without payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ScriptStructure,
    ScriptExecution,
    Arity,
    Bounds,
    MalformedShape,
    Type,
    SlotMismatch,
    Evaluation,
    Attribute,
    Registration,
}

impl KernelError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            KernelError::ScriptStructure { .. } => ErrorKind::ScriptStructure,
            KernelError::ScriptExecution { .. } => ErrorKind::ScriptExecution,
            KernelError::Arity { .. } => ErrorKind::Arity,
            KernelError::Bounds { .. } => ErrorKind::Bounds,
            KernelError::MalformedShape { .. } => ErrorKind::MalformedShape,
            KernelError::Type { .. } => ErrorKind::Type,
            KernelError::SlotMismatch { .. } => ErrorKind::SlotMismatch,
            KernelError::Evaluation { .. } => ErrorKind::Evaluation,
            KernelError::Attribute { .. } => ErrorKind::Attribute,
            KernelError::Registration { .. } => ErrorKind::Registration,
        }
    }

    pub(crate) fn structure(detail: impl Into<String>) -> Self {
        KernelError::ScriptStructure {
            detail: detail.into(),
        }
    }

    /// Wrap a failure reported by the Lua runtime.
    ///
    /// A bridge error raised by a host accessor inside the script keeps its
    /// own kind; anything else becomes [`KernelError::ScriptExecution`].
    pub(crate) fn from_script(err: &mlua::Error) -> Self {
        match bridge_error(err) {
            Some(inner) => inner.clone(),
            None => KernelError::ScriptExecution {
                diagnostic: diagnostic(err),
            },
        }
    }

    /// Hand this error to Lua so it can unwind through script frames.
    pub(crate) fn into_lua_error(self) -> mlua::Error {
        mlua::Error::ExternalError(Arc::new(self))
    }
}

impl From<IndexError> for KernelError {
    fn from(err: IndexError) -> Self {
        match err {
            IndexError::Arity { rank, got } => KernelError::Arity { rank, got },
            other => KernelError::Bounds {
                detail: other.to_string(),
            },
        }
    }
}

/// Find a [`KernelError`] raised by a host callback somewhere in the cause chain.
pub(crate) fn bridge_error(err: &mlua::Error) -> Option<&KernelError> {
    match err {
        mlua::Error::ExternalError(inner) => inner.downcast_ref::<KernelError>(),
        mlua::Error::CallbackError { cause, .. } => bridge_error(cause),
        _ => None,
    }
}

/// The message a script failure carries, without mlua's wrapping.
pub(crate) fn diagnostic(err: &mlua::Error) -> String {
    match err {
        mlua::Error::RuntimeError(message) => message.clone(),
        mlua::Error::SyntaxError { message, .. } => message.clone(),
        mlua::Error::CallbackError { cause, .. } => diagnostic(cause),
        other => other.to_string(),
    }
}
