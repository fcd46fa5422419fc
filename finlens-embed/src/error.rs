//! Error types for the embedding system

/// Result type for embedding operations.
///
/// This is a convenience type alias that uses [`EmbedError`] as the error type.
/// Used throughout the crate for operations that can fail.
pub type Result<T> = std::result::Result<T, EmbedError>;

/// Error type for all embedding operations.
///
/// Every failure of the embedding service ends up in one of these variants so
/// that callers can wrap it into their own error without losing the cause.
///
/// # Error Categories
///
/// - **Configuration Errors**: missing API key, invalid endpoint or limits
/// - **Transport Errors**: connection failures and timeouts
/// - **Service Errors**: non-success HTTP status (rate limits, quota, auth)
/// - **Response Errors**: bodies that do not contain a usable vector
/// - **Dimension Errors**: vectors whose length differs from the others
#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    /// Error when the provider configuration is invalid
    #[error("Invalid embedding configuration: {message}")]
    InvalidConfig { message: String },

    /// The request never produced an HTTP response
    #[error("Embedding request failed: {source}")]
    Request {
        #[from]
        source: reqwest::Error,
    },

    /// The service answered with a non-success status
    #[error("Embedding service returned {status}: {message}")]
    Service { status: u16, message: String },

    /// The service answered, but the body did not contain a usable vector
    #[error("Malformed embedding response: {message}")]
    MalformedResponse { message: String },

    /// A vector's length differs from the dimension established earlier
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Generic errors from other libraries
    #[error("External error: {source}")]
    External {
        #[from]
        source: anyhow::Error,
    },
}

impl EmbedError {
    /// Create an invalid configuration error with a custom message.
    ///
    /// # Arguments
    /// * `message` - A descriptive error message explaining what's wrong with the configuration
    pub fn invalid_config<S: Into<String>>(message: S) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create a malformed response error with a custom message.
    pub fn malformed<S: Into<String>>(message: S) -> Self {
        Self::MalformedResponse {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_carry_cause() {
        let err = EmbedError::Service {
            status: 429,
            message: "Rate limit reached".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Embedding service returned 429: Rate limit reached"
        );

        let err = EmbedError::DimensionMismatch {
            expected: 1536,
            actual: 3,
        };
        assert!(err.to_string().contains("expected 1536, got 3"));
    }

    #[test]
    fn test_constructors() {
        assert!(matches!(
            EmbedError::invalid_config("no key"),
            EmbedError::InvalidConfig { .. }
        ));
        assert_eq!(
            EmbedError::malformed("missing data").to_string(),
            "Malformed embedding response: missing data"
        );
    }
}
