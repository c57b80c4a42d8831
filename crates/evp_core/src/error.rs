use serde::{Deserialize, Serialize};
use std::fmt;

/// Single structured error shape used across the index, collector and pack layers,
/// and printed as-is by the CLI boundary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppError {
    pub code: String,
    pub message: String,
    pub details: Option<String>,
    pub retryable: bool,
}

/// Coarse error taxonomy. Derived from the code suffix so call sites only pick a code.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    DimensionMismatch,
    Persistence,
    PartialSource,
    Pattern,
    Internal,
}

impl ErrorKind {
    pub fn from_code(code: &str) -> Self {
        if code.ends_with("_DIMENSION_MISMATCH") {
            ErrorKind::DimensionMismatch
        } else if code.ends_with("_PATTERN_INVALID") {
            ErrorKind::Pattern
        } else if code.ends_with("_INVALID") || code.starts_with("VALIDATION_") {
            ErrorKind::Validation
        } else if code.ends_with("_NOT_FOUND") {
            ErrorKind::NotFound
        } else if code.ends_with("_SOURCE_MISSING") {
            ErrorKind::PartialSource
        } else if code.ends_with("_WRITE_FAILED")
            || code.ends_with("_READ_FAILED")
            || code.ends_with("_ENCODE_FAILED")
            || code.ends_with("_DECODE_FAILED")
            || code.ends_with("_IO_FAILED")
        {
            ErrorKind::Persistence
        } else {
            ErrorKind::Internal
        }
    }
}

impl AppError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
            retryable: false,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn kind(&self) -> ErrorKind {
        ErrorKind::from_code(&self.code)
    }

    /// PartialSource and Pattern conditions are logged and flagged, never propagated as failures.
    pub fn is_fatal(&self) -> bool {
        !matches!(self.kind(), ErrorKind::PartialSource | ErrorKind::Pattern)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {}
