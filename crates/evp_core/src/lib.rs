pub mod clock;
pub mod config;
pub mod documents;
pub mod error;
pub mod hashing;
pub mod logging;
pub mod provenance;
pub mod redact;
pub mod text;

#[cfg(test)]
mod tests {
    use super::error::{AppError, ErrorKind};

    #[test]
    fn app_error_is_structured() {
        let err = AppError::new("INDEX_PERSIST_WRITE_FAILED", "write failed").with_retryable(false);
        assert_eq!(err.code, "INDEX_PERSIST_WRITE_FAILED");
        assert_eq!(err.message, "write failed");
        assert_eq!(err.retryable, false);
        assert_eq!(err.kind(), ErrorKind::Persistence);
        assert!(err.is_fatal());
    }

    #[test]
    fn error_kind_follows_code_suffix() {
        assert_eq!(ErrorKind::from_code("INDEX_DIMENSION_MISMATCH"), ErrorKind::DimensionMismatch);
        assert_eq!(ErrorKind::from_code("PACK_REQUEST_INVALID"), ErrorKind::Validation);
        assert_eq!(ErrorKind::from_code("REDACTION_PATTERN_INVALID"), ErrorKind::Pattern);
        assert_eq!(ErrorKind::from_code("PACK_NOT_FOUND"), ErrorKind::NotFound);
        assert_eq!(ErrorKind::from_code("EVIDENCE_SOURCE_MISSING"), ErrorKind::PartialSource);
        assert_eq!(ErrorKind::from_code("SOMETHING_ELSE"), ErrorKind::Internal);
        assert!(!AppError::new("EVIDENCE_SOURCE_MISSING", "x").is_fatal());
    }
}
