//! Error types for the renderer.
//!
//! Fatal conditions (I/O failures, object id exhaustion) are propagated with `?`
//! and poison the session. The recoverable categories are logged at the call
//! site and the offending primitive is skipped.

/// Result type alias for renderer operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while producing a document.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The object id space (or the configured object limit) is used up
    #[error("Object ids exhausted: limit of {limit} objects reached")]
    ResourceExhausted {
        /// Largest object number that may be allocated
        limit: u32,
    },

    /// An external conversion step (image to PDF) failed
    #[error("External tool failed for '{source_name}': {reason}")]
    ExternalTool {
        /// Source the tool was run on
        source_name: String,
        /// Failure description
        reason: String,
    },

    /// A converted image page could not be imported
    #[error("Image import failed: {0}")]
    ImageImport(String),

    /// An outline font could not be located or parsed
    #[error("Font unavailable: {0}")]
    FontUnavailable(String),

    /// A primitive was called in a state where it is not allowed
    #[error("Contract violation: {0}")]
    ContractViolation(String),

    /// Configuration could not be read
    #[error("Invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}

impl From<lopdf::Error> for Error {
    fn from(err: lopdf::Error) -> Self {
        Error::ImageImport(err.to_string())
    }
}

impl Error {
    /// Whether the session can keep drawing after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::ExternalTool { .. }
                | Error::ImageImport(_)
                | Error::FontUnavailable(_)
                | Error::ContractViolation(_)
        )
    }
}
