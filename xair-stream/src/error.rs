//! Error types for the xair-stream crate.

use xair_protocol::{InvalidRateError, MessageError};

use crate::registry::HandleId;

/// Errors from the datagram transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Socket-level failure
    #[error("Socket error: {0}")]
    Io(#[from] std::io::Error),

    /// Packet could not be encoded or decoded
    #[error(transparent)]
    Message(#[from] MessageError),

    /// The transport has been shut down
    #[error("Transport closed")]
    Closed,
}

/// Errors from the subscription registry.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The requested rate is not usable
    #[error(transparent)]
    InvalidRate(#[from] InvalidRateError),

    /// Maximum number of distinct subscriptions reached
    #[error("Registry is full (max {max_subscriptions} subscriptions)")]
    RegistryFull {
        /// The configured limit
        max_subscriptions: usize,
    },

    /// The handle is unknown or already removed
    #[error("Subscription handle not found: {0}")]
    NotFound(HandleId),
}

/// Invalid configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Configuration error: {0}")]
pub struct ConfigError(pub String);

/// Errors that can occur while running the sync engine.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// Transport failure
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Registry failure
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Invalid configuration provided
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An error occurred during shutdown
    #[error("Shutdown error: {0}")]
    Shutdown(String),
}

/// Convenience type alias for Results using StreamError.
pub type Result<T> = std::result::Result<T, StreamError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = TransportError::Closed;
        assert_eq!(error.to_string(), "Transport closed");

        let error = RegistryError::RegistryFull {
            max_subscriptions: 8,
        };
        assert_eq!(error.to_string(), "Registry is full (max 8 subscriptions)");

        let error = RegistryError::NotFound(HandleId::new(3));
        assert_eq!(error.to_string(), "Subscription handle not found: sub-3");

        let error = ConfigError("window must be positive".to_string());
        assert_eq!(error.to_string(), "Configuration error: window must be positive");
    }

    #[test]
    fn test_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let error: StreamError = TransportError::from(io).into();
        match error {
            StreamError::Transport(TransportError::Io(e)) => {
                assert_eq!(e.kind(), std::io::ErrorKind::ConnectionRefused);
            }
            _ => panic!("Expected Transport(Io) variant"),
        }

        let error: StreamError = RegistryError::from(InvalidRateError(0.0)).into();
        assert!(matches!(error, StreamError::Registry(RegistryError::InvalidRate(_))));
    }
}
