/// Reasons a write payload is rejected before it touches a store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Body was not valid JSON.
    #[error("request body must be valid JSON")]
    InvalidJson,

    /// Body parsed but was not a JSON object (null, array, scalar).
    #[error("request body must be a JSON object")]
    NotAnObject,

    /// A required field is absent or null.
    #[error("missing required field: {0}")]
    MissingField(String),

    /// Status writes need either a component update or a metrics object.
    #[error("status update requires `component` and `status`, or a `metrics` object")]
    EmptyStatusUpdate,
}

/// Errors returned by store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A previous holder of the store lock panicked mid-update.
    #[error("{0} store lock poisoned")]
    Poisoned(&'static str),
}

/// Failures of the outbound workflow-run integration.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// No `owner/name` repository configured.
    #[error("GitHub repository not configured")]
    NotConfigured,

    #[error("request timed out")]
    Timeout,

    #[error("request failed: {0}")]
    Request(String),

    /// Remote answered with a non-success HTTP status.
    #[error("GitHub API responded with status {0}")]
    Status(u16),

    #[error("malformed response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for BridgeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            BridgeError::Timeout
        } else if err.is_decode() {
            BridgeError::Malformed(err.to_string())
        } else if let Some(status) = err.status() {
            BridgeError::Status(status.as_u16())
        } else {
            BridgeError::Request(err.to_string())
        }
    }
}
