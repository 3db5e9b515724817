use thiserror::Error;
use xair_protocol::{ParameterPath, ValueDomain};
use xair_stream::{ConfigError, RegistryError, TransportError};

/// Errors that can occur in the mixer sync facade
#[derive(Error, Debug)]
pub enum SyncError {
    /// Invalid configuration
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Subscription bookkeeping failed
    #[error("Subscription error: {0}")]
    Registry(#[from] RegistryError),

    /// The console transport could not be set up
    #[error("Failed to open console transport: {0}")]
    Transport(#[from] TransportError),

    /// Value does not fit the parameter it is written to
    #[error("Cannot write {found:?} value to {path} (expects {expected:?})")]
    ValueMismatch {
        path: ParameterPath,
        expected: ValueDomain,
        found: ValueDomain,
    },

    /// Background worker thread could not be started
    #[error("Failed to spawn sync worker: {0}")]
    WorkerSpawn(#[source] std::io::Error),

    /// Background worker is no longer running
    #[error("Sync worker has shut down")]
    WorkerDisconnected,
}

/// Result type for mixer sync operations
pub type Result<T> = std::result::Result<T, SyncError>;
