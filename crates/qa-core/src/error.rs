//! Error types for the retrieval engine.

use thiserror::Error;

/// Result type alias using QaError.
pub type Result<T> = std::result::Result<T, QaError>;

/// Errors that can occur in the retrieval engine.
///
/// Most of these never reach a caller of the engine facade: lookup misses,
/// collaborator failures and malformed model output all degrade to a smaller
/// result set. They surface from the lower-level building blocks and from
/// configuration loading.
#[derive(Error, Debug)]
pub enum QaError {
    /// A corpus record could not be turned into a typed fragment.
    #[error("Invalid fragment {id}: {reason}")]
    InvalidFragment { id: String, reason: String },

    /// Invalid argument provided.
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// The external vector store failed.
    #[error("Vector store error: {message}")]
    VectorStore { message: String },

    /// The external language model failed.
    #[error("Language model error: {message}")]
    LanguageModel { message: String },

    /// An external call did not finish in time.
    #[error("{operation} timed out after {millis}ms")]
    Timeout { operation: String, millis: u64 },

    /// Every retrieval path failed, including the default semantic search.
    #[error("Retrieval failed: {message}")]
    RetrievalFailed { message: String },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Internal error (unexpected).
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl QaError {
    /// Create an invalid fragment error.
    pub fn invalid_fragment(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidFragment {
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create a vector store error.
    pub fn vector_store(message: impl Into<String>) -> Self {
        Self::VectorStore {
            message: message.into(),
        }
    }

    /// Create a language model error.
    pub fn language_model(message: impl Into<String>) -> Self {
        Self::LanguageModel {
            message: message.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, millis: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            millis,
        }
    }

    /// Create a retrieval failure.
    pub fn retrieval_failed(message: impl Into<String>) -> Self {
        Self::RetrievalFailed {
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Stable machine-readable code, used for structured failure reasons.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidFragment { .. } => "INVALID_FRAGMENT",
            Self::InvalidArgument { .. } => "INVALID_ARGUMENT",
            Self::VectorStore { .. } => "VECTOR_STORE_ERROR",
            Self::LanguageModel { .. } => "LANGUAGE_MODEL_ERROR",
            Self::Timeout { .. } => "TIMEOUT",
            Self::RetrievalFailed { .. } => "RETRIEVAL_FAILED",
            Self::Io(_) => "IO_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Config { .. } => "CONFIG_ERROR",
            Self::Internal { .. } => "INTERNAL_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = QaError::invalid_fragment("chap01-3", "missing answer");
        assert!(err.to_string().contains("chap01-3"));
        assert!(err.to_string().contains("missing answer"));

        let err = QaError::timeout("dimension planning", 8000);
        assert_eq!(err.to_string(), "dimension planning timed out after 8000ms");
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            QaError::vector_store("connection refused").error_code(),
            "VECTOR_STORE_ERROR"
        );
        assert_eq!(QaError::timeout("llm", 1).error_code(), "TIMEOUT");
        assert_eq!(QaError::config("bad k1").error_code(), "CONFIG_ERROR");
    }
}
