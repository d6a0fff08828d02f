//! Request-scoped context
//!
//! Every service call receives the caller's identity explicitly instead of
//! reading process-wide state. The context is cheap to clone and carries
//! the optional correlation ID that is echoed in logs.

use serde::{Deserialize, Serialize};

/// Identity and tracing metadata for a single control-plane request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    /// Service instance the request is scoped to
    pub instance_id: String,
    /// Authenticated account making the request
    pub account_id: String,
    /// Caller-supplied correlation ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl RequestContext {
    /// Create a context without a correlation ID
    pub fn new(instance_id: impl Into<String>, account_id: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            account_id: account_id.into(),
            correlation_id: None,
        }
    }

    /// Attach a correlation ID
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Correlation ID or `-` for log fields
    pub fn correlation(&self) -> &str {
        self.correlation_id.as_deref().unwrap_or("-")
    }
}
