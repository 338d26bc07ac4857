//! Error types for the runtime client

use thiserror::Error;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur when talking to the container runtime
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// Engine API returned an error status code
    #[error("API error (status {status}): {message}")]
    ApiError {
        /// HTTP status code
        status: u16,
        /// Error message from the API
        message: String,
    },

    /// Failed to parse response
    #[error("Failed to parse response: {0}")]
    ParseError(String),

    /// Container does not exist (anymore)
    #[error("Container not found: {0}")]
    NotFound(String),

    /// CLI command exited unsuccessfully
    #[error("Command '{command}' failed (exit code {exit_code}): {stderr}")]
    CommandFailed {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    /// CLI binary could not be executed at all
    #[error("Failed to execute '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

impl ClientError {
    /// Create an API error from status code and message
    pub fn api_error(status: u16, message: impl Into<String>) -> Self {
        Self::ApiError {
            status,
            message: message.into(),
        }
    }

    /// Check if this error is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_)) || matches!(self, Self::ApiError { status: 404, .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(ClientError::api_error(404, "no such container").is_not_found());
        assert!(ClientError::NotFound("abc".to_string()).is_not_found());
        assert!(!ClientError::api_error(409, "conflict").is_not_found());
        assert!(!ClientError::api_error(500, "boom").is_not_found());
    }

    #[test]
    fn test_command_failed_message() {
        let err = ClientError::CommandFailed {
            command: "docker stop abc".to_string(),
            exit_code: 1,
            stderr: "daemon unavailable".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Command 'docker stop abc' failed (exit code 1): daemon unavailable"
        );
    }
}
