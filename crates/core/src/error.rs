use core::fmt;
use std::sync::Arc;

/// Canonical error codes raised by schema construction and query evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    BadArgument,
    Memory,
    ContextIncomplete,
    NameCollision,
    IndexCollision,
    EmptyName,
    /// A collection interface is missing a mandatory callback.
    IncompleteInterface,
    /// Key retrieval declared with both (or neither) key type and key reservation.
    InconsistentKeys,
    /// A collaborator callback failed or returned something unusable.
    InterfaceError,
    EmptySet,
    ArithmeticError,
    NotFound,
    AlreadyBound,
    ShapeMismatch,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::BadArgument => "bad-argument",
            ErrorCode::Memory => "memory",
            ErrorCode::ContextIncomplete => "context-incomplete",
            ErrorCode::NameCollision => "name-collision",
            ErrorCode::IndexCollision => "index-collision",
            ErrorCode::EmptyName => "empty-name",
            ErrorCode::IncompleteInterface => "incomplete-interface",
            ErrorCode::InconsistentKeys => "inconsistent-keys",
            ErrorCode::InterfaceError => "interface-error",
            ErrorCode::EmptySet => "empty-set",
            ErrorCode::ArithmeticError => "arithmetic-error",
            ErrorCode::NotFound => "not-found",
            ErrorCode::AlreadyBound => "already-bound",
            ErrorCode::ShapeMismatch => "shape-mismatch",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("{code}: {message}")]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
    #[source]
    pub source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), source: None }
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// Compose an error with a source cause.
    pub fn with_source(mut self, source: impl Into<Option<Arc<dyn std::error::Error + Send + Sync>>>) -> Self {
        self.source = source.into();
        self
    }

    pub fn bad_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BadArgument, message)
    }

    pub fn interface(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InterfaceError, message)
    }

    pub fn arithmetic(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ArithmeticError, message)
    }

    pub fn not_found(what: &str) -> Self {
        Self::new(ErrorCode::NotFound, format!("not found: {what}"))
    }
}

pub type Result<T, E = Error> = core::result::Result<T, E>;
