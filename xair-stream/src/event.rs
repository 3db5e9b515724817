//! Event types for the xair-stream crate.

use std::time::{Duration, Instant};

use xair_protocol::{DecodeFault, InvalidPathError, ParameterPath, Rate};

/// Lifecycle and warning events emitted by the sync engine.
///
/// None of these are fatal. Warnings are also logged through `tracing`.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// Subscription request sent and its window extended.
    SubscriptionRenewed {
        path: ParameterPath,
        rate: Rate,
        expires_at: Instant,
    },

    /// A subscription's window ran out before it could be renewed.
    SubscriptionLapsed {
        path: ParameterPath,
        overdue: Duration,
    },

    /// Subscription dropped because no consumer wants it any more.
    SubscriptionTornDown { path: ParameterPath },

    /// Sending a request to the console failed.
    TransportSendFailure {
        path: ParameterPath,
        error: String,
        attempt: u32,
        retry_in: Duration,
    },

    /// Inbound message for an address outside the parameter vocabulary.
    UnrecognizedPath {
        address: String,
        error: InvalidPathError,
    },

    /// Inbound value outside its parameter's domain.
    DecodeFault {
        path: ParameterPath,
        fault: DecodeFault,
        /// Whether the update was discarded rather than stored clamped
        dropped: bool,
    },
}

impl SyncEvent {
    /// The parameter path the event concerns, if it has a valid one
    pub fn path(&self) -> Option<&ParameterPath> {
        match self {
            SyncEvent::SubscriptionRenewed { path, .. }
            | SyncEvent::SubscriptionLapsed { path, .. }
            | SyncEvent::SubscriptionTornDown { path }
            | SyncEvent::TransportSendFailure { path, .. }
            | SyncEvent::DecodeFault { path, .. } => Some(path),
            SyncEvent::UnrecognizedPath { .. } => None,
        }
    }

    /// Whether this event reports something going wrong
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            SyncEvent::SubscriptionLapsed { .. }
                | SyncEvent::TransportSendFailure { .. }
                | SyncEvent::UnrecognizedPath { .. }
                | SyncEvent::DecodeFault { .. }
        )
    }
}
