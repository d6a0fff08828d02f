//! Error types for the zoneplane control plane
//!
//! Every service operation returns [`Result`]. Errors fall into a small
//! taxonomy ([`ErrorKind`]) that decides both the status code surfaced at
//! the API boundary and whether the failure may be retried.

use thiserror::Error;

/// Result type alias for control-plane operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the control plane
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed input: bad rdata, TTL, CIDR, CRN, names, shapes
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A profile or per-zone quota would be exceeded
    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Unknown zone, record, pool, resolver, network or access request
    #[error("Not found: {0}")]
    NotFound(String),

    /// Duplicate names, referenced entities, illegal state transitions
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Caller is not allowed to perform the operation
    #[error("Not authorized: {0}")]
    Authorization(String),

    /// Backing store temporarily unavailable
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Optimistic-concurrency collision at commit time
    #[error("Store revision mismatch: expected {expected}, found {found}")]
    RevisionMismatch {
        /// Revision the writer read
        expected: u64,
        /// Revision currently held by the store
        found: u64,
    },

    /// Network-fabric collaborator failed transiently
    #[error("Network fabric error: {0}")]
    Fabric(String),

    /// Transient failures persisted past the internal retry budget
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Caller-side polling gave up
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors (file store)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

/// Coarse classification of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Authorization,
    Transient,
    Internal,
}

impl Error {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a quota error
    pub fn quota_exceeded(msg: impl Into<String>) -> Self {
        Self::QuotaExceeded(msg.into())
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a conflict error
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Create an authorization error
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Authorization(msg.into())
    }

    /// Create a store-unavailable error
    pub fn store_unavailable(msg: impl Into<String>) -> Self {
        Self::StoreUnavailable(msg.into())
    }

    /// Create a network-fabric error
    pub fn fabric(msg: impl Into<String>) -> Self {
        Self::Fabric(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) | Self::QuotaExceeded(_) => ErrorKind::Validation,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Conflict(_) | Self::RevisionMismatch { .. } => ErrorKind::Conflict,
            Self::Authorization(_) => ErrorKind::Authorization,
            Self::StoreUnavailable(_)
            | Self::Fabric(_)
            | Self::ServiceUnavailable(_)
            | Self::Timeout(_) => ErrorKind::Transient,
            Self::Config(_) | Self::Io(_) | Self::Json(_) | Self::Other(_) => ErrorKind::Internal,
        }
    }

    /// HTTP-equivalent status code surfaced at the API boundary
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) | Self::QuotaExceeded(_) => 400,
            Self::Authorization(_) => 403,
            Self::NotFound(_) => 404,
            Self::Conflict(_) | Self::RevisionMismatch { .. } => 409,
            Self::StoreUnavailable(_) | Self::Fabric(_) | Self::ServiceUnavailable(_) => 503,
            Self::Timeout(_) => 504,
            Self::Config(_) | Self::Io(_) | Self::Json(_) | Self::Other(_) => 500,
        }
    }

    /// Stable machine-readable code for error bodies
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_failed",
            Self::QuotaExceeded(_) => "quota_exceeded",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) | Self::RevisionMismatch { .. } => "conflict",
            Self::Authorization(_) => "not_authorized",
            Self::StoreUnavailable(_) | Self::Fabric(_) | Self::ServiceUnavailable(_) => {
                "service_unavailable"
            }
            Self::Timeout(_) => "timeout",
            Self::Config(_) | Self::Io(_) | Self::Json(_) | Self::Other(_) => "internal_error",
        }
    }

    /// Whether a caller may retry the failed operation unchanged
    ///
    /// Only transient infrastructure failures qualify. Validation, conflict,
    /// authorization and not-found errors are never retried automatically.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    /// Whether this is a not-found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_is_a_validation_failure() {
        let err = Error::quota_exceeded("too many locations");
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.status_code(), 400);
        assert!(!err.is_retryable());
    }

    #[test]
    fn transient_errors_are_retryable() {
        assert!(Error::store_unavailable("down").is_retryable());
        assert!(Error::fabric("502").is_retryable());
        assert!(!Error::not_found("zone").is_retryable());
        assert!(!Error::conflict("dup").is_retryable());
        assert_eq!(Error::store_unavailable("down").status_code(), 503);
    }
}
