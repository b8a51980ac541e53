/// Unified error handling for the puente driver core
///
/// Two families matter to callers: transport failures, which the
/// executor already retried across every known host, and everything
/// else, which is terminal for the call that raised it. Well-formed
/// error responses (4xx/5xx) are not errors at this layer; they are
/// handed to the caller as responses.

use thiserror::Error;

use crate::config::ConfigError;
use crate::protocol::TransportError;

/// Main error type for puente operations
#[derive(Debug, Error)]
pub enum PuenteError {
    /// Configuration errors; fatal at construction time
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A single transport-level failure
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Every known host was tried once and none answered
    #[error("no host answered after {attempts} attempt(s): {source}")]
    NoHostAvailable {
        attempts: usize,
        #[source]
        source: TransportError,
    },

    /// Cluster endpoint discovery errors
    #[error("Host resolution error: {message}")]
    Resolve { message: String },

    /// Response body could not be decoded into the requested type
    #[error("Deserialization error: {0}")]
    Deserialize(#[from] serde_json::Error),

    /// Internal errors (should not happen in normal operation)
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Result type alias for puente operations
pub type PuenteResult<T> = Result<T, PuenteError>;

/// Convenience methods for creating specific error types
impl PuenteError {
    /// Create a host resolution error
    pub fn resolve<S: Into<String>>(message: S) -> Self {
        PuenteError::Resolve {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        PuenteError::Internal {
            message: message.into(),
        }
    }

    /// Check if this error is recoverable (can retry)
    pub fn is_recoverable(&self) -> bool {
        match self {
            PuenteError::Transport(_) => true,
            PuenteError::Resolve { .. } => true,
            PuenteError::NoHostAvailable { .. } => false,
            PuenteError::Config(_) => false,
            PuenteError::Deserialize(_) => false,
            PuenteError::Internal { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let error = PuenteError::resolve("endpoint listing unavailable");
        assert!(matches!(error, PuenteError::Resolve { .. }));
        assert_eq!(
            error.to_string(),
            "Host resolution error: endpoint listing unavailable"
        );
    }

    #[test]
    fn test_error_recoverability() {
        let transport = PuenteError::Transport(TransportError::Timeout {
            host: "db1.internal:8529".to_string(),
        });
        assert!(transport.is_recoverable());

        let config = PuenteError::Config(ConfigError::ValidationError("test".to_string()));
        assert!(!config.is_recoverable());

        let exhausted = PuenteError::NoHostAvailable {
            attempts: 3,
            source: TransportError::ConnectionRefused {
                host: "db1.internal:8529".to_string(),
            },
        };
        assert!(!exhausted.is_recoverable());
    }

    #[test]
    fn test_exhaustion_wraps_last_cause() {
        let error = PuenteError::NoHostAvailable {
            attempts: 3,
            source: TransportError::ConnectionRefused {
                host: "db3.internal:8529".to_string(),
            },
        };

        let rendered = error.to_string();
        assert!(rendered.contains("3 attempt(s)"));
        assert!(rendered.contains("db3.internal:8529"));
    }

    #[test]
    fn test_config_error_conversion() {
        let error: PuenteError = ConfigError::ValidationError("endpoints cannot be empty".to_string()).into();
        assert!(matches!(error, PuenteError::Config(_)));
    }
}
