//! Error types for session operations.

use thiserror::Error;

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Session-specific errors.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Stored record is not base64-wrapped JSON. Recovered by starting a
    /// fresh session.
    #[error("Malformed session record: {0}")]
    MalformedRecord(String),

    /// Store read failed. Recovered by treating the session as absent.
    #[error("Session store unavailable: {0}")]
    StoreUnavailable(String),

    /// Store write or delete failed.
    #[error("Session store write failed: {0}")]
    StoreWrite(String),

    /// Handler assigned something that is neither null nor an object.
    #[error("Invalid session assignment: {0}")]
    InvalidAssignment(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization error
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl SessionError {
    /// Reclassify a store error raised while saving or deleting.
    pub fn into_write_failure(self) -> Self {
        match self {
            SessionError::StoreWrite(_) => self,
            other => SessionError::StoreWrite(other.to_string()),
        }
    }

    /// Whether the middleware absorbs this error instead of failing the
    /// request.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SessionError::MalformedRecord(_) | SessionError::StoreUnavailable(_)
        )
    }
}

impl From<SessionError> for satchel_core::Error {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::StoreWrite(_) | SessionError::StoreUnavailable(_) => {
                satchel_core::Error::ServiceUnavailable(err.to_string())
            }
            SessionError::Serialization(msg) => satchel_core::Error::Serialization(msg),
            other => satchel_core::Error::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_failure_wraps_once() {
        let err = SessionError::Config("bad".into()).into_write_failure();
        assert!(matches!(err, SessionError::StoreWrite(ref msg) if msg == "Configuration error: bad"));

        let again = err.into_write_failure();
        assert!(matches!(again, SessionError::StoreWrite(ref msg) if msg == "Configuration error: bad"));
    }

    #[test]
    fn test_recoverable() {
        assert!(SessionError::MalformedRecord("x".into()).is_recoverable());
        assert!(SessionError::StoreUnavailable("x".into()).is_recoverable());
        assert!(!SessionError::StoreWrite("x".into()).is_recoverable());
        assert!(!SessionError::InvalidAssignment("x".into()).is_recoverable());
    }

    #[test]
    fn test_framework_error_mapping() {
        let err: satchel_core::Error = SessionError::StoreWrite("down".into()).into();
        assert_eq!(err.status_code(), 503);

        let err: satchel_core::Error = SessionError::InvalidAssignment("42".into()).into();
        assert_eq!(err.status_code(), 500);
    }
}
