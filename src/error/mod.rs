use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Local persistence errors. Never fatal to a session operation.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database connection failed: {message}")]
    Connection { message: String },

    #[error("Query failed: {message}")]
    Query { message: String },

    #[error("Failed to (de)serialize value for key '{key}': {message}")]
    Serialization { key: String, message: String },

    #[error("Migration failed: {message}")]
    Migration { message: String },

    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// Remote analysis service errors
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Network error: {message}")]
    Transport { message: String },

    #[error("Upload failed: {message}")]
    Upload { message: String },

    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("Not found: {resource}")]
    NotFound { resource: String },

    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl GatewayError {
    /// Whether the request never produced a server response.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            GatewayError::Transport { .. }
                | GatewayError::Upload { .. }
                | GatewayError::Timeout { .. }
        )
    }
}

/// Malformed local input, rejected before any network call
#[derive(Debug, Error)]
#[error("Validation failed: {field} - {reason}")]
pub struct ValidationError {
    pub field: String,
    pub reason: String,
}

impl ValidationError {
    /// Create a validation error for a field
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type alias for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_display() {
        let err = AppError::Config {
            message: "missing key".to_string(),
        };
        assert_eq!(err.to_string(), "Configuration error: missing key");

        let err = AppError::Internal {
            message: "unexpected".to_string(),
        };
        assert_eq!(err.to_string(), "Internal error: unexpected");
    }

    #[test]
    fn test_storage_error_display() {
        let err = StorageError::Connection {
            message: "failed to connect".to_string(),
        };
        assert_eq!(err.to_string(), "Database connection failed: failed to connect");

        let err = StorageError::Serialization {
            key: "session_history".to_string(),
            message: "expected value".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to (de)serialize value for key 'session_history': expected value"
        );

        let err = StorageError::Migration {
            message: "version mismatch".to_string(),
        };
        assert_eq!(err.to_string(), "Migration failed: version mismatch");
    }

    #[test]
    fn test_gateway_error_display() {
        let err = GatewayError::Server {
            status: 500,
            message: "analysis backend crashed".to_string(),
        };
        assert_eq!(err.to_string(), "Server error (500): analysis backend crashed");

        let err = GatewayError::NotFound {
            resource: "session S1".to_string(),
        };
        assert_eq!(err.to_string(), "Not found: session S1");

        let err = GatewayError::Upload {
            message: "connection reset".to_string(),
        };
        assert_eq!(err.to_string(), "Upload failed: connection reset");

        let err = GatewayError::Timeout { timeout_ms: 5000 };
        assert_eq!(err.to_string(), "Request timeout after 5000ms");
    }

    #[test]
    fn test_gateway_error_is_transport() {
        assert!(GatewayError::Transport {
            message: "unreachable".to_string()
        }
        .is_transport());
        assert!(GatewayError::Timeout { timeout_ms: 10 }.is_transport());
        assert!(!GatewayError::Server {
            status: 400,
            message: "bad".to_string()
        }
        .is_transport());
        assert!(!GatewayError::NotFound {
            resource: "x".to_string()
        }
        .is_transport());
    }

    #[test]
    fn test_validation_error_conversion_to_app_error() {
        let err: AppError = ValidationError::new("question", "cannot be empty").into();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(err.to_string(), "Validation failed: question - cannot be empty");
    }

    #[test]
    fn test_gateway_error_conversion_to_app_error() {
        let app_err: AppError = GatewayError::Timeout { timeout_ms: 1000 }.into();
        assert!(matches!(app_err, AppError::Gateway(_)));
    }

    #[test]
    fn test_storage_error_conversion_to_app_error() {
        let app_err: AppError = StorageError::Query {
            message: "locked".to_string(),
        }
        .into();
        assert!(matches!(app_err, AppError::Storage(_)));
    }
}
