//! Error types for the PTO store
//!
//! Every operation in the raw data store and the observation store returns
//! one of these kinds. The route layer maps them to transport status codes
//! with [`Error::http_status_code`].

use thiserror::Error;

/// Common result type for PTO store operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for the PTO store
#[derive(Debug, Error)]
pub enum Error {
    // Lookup errors
    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    #[error("{kind} already exists: {name}")]
    AlreadyExists { kind: &'static str, name: String },

    // Input errors
    #[error("missing required metadata field: {0}")]
    MissingField(String),

    #[error("malformed input: {0}")]
    MalformedInput(String),

    // Storage errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage error: {0}")]
    Storage(String),

    // Server-side errors
    #[error("internal error: {0}")]
    Internal(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl Error {
    /// Create a not found error for an entity of the given kind
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    /// Create an already exists error for an entity of the given kind
    pub fn already_exists(kind: &'static str, name: impl Into<String>) -> Self {
        Self::AlreadyExists {
            kind,
            name: name.into(),
        }
    }

    /// Create a missing field error
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField(field.into())
    }

    /// Create a malformed input error
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedInput(msg.into())
    }

    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Check if this is a not found error
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if the caller, not the server, is at fault
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.http_status_code())
    }

    /// Get HTTP status code for the route layer
    #[must_use]
    pub fn http_status_code(&self) -> u16 {
        match self {
            // 400 Bad Request
            Self::MissingField(_) | Self::MalformedInput(_) => 400,

            // 404 Not Found
            Self::NotFound { .. } => 404,

            // 409 Conflict
            Self::AlreadyExists { .. } => 409,

            // 500 Internal Server Error
            Self::Io(_) | Self::Storage(_) | Self::Internal(_) | Self::Configuration(_) => 500,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        if e.is_io() {
            Self::Io(e.into())
        } else {
            Self::MalformedInput(e.to_string())
        }
    }
}
