//! # xair-stream
//!
//! Subscription engine for X-Air style consoles.
//!
//! The console only streams a parameter while a `/subscribe` request for it
//! is alive, and each request lapses after a fixed window. This crate keeps
//! those requests alive on behalf of any number of consumers:
//!
//! - [`SubscriptionRegistry`] merges consumer interests into one subscription
//!   per path, at the fastest requested rate
//! - [`RenewalScheduler`] renews subscriptions before they lapse, retries
//!   failed sends with backoff, and tears down unused ones
//! - [`UpdateIngestor`] validates inbound messages and writes them into the
//!   [`state_store::CurrentValueStore`]
//! - [`Transport`] abstracts the datagram socket, with [`UdpTransport`] as the
//!   production implementation
//!
//! Problems that do not stop the engine are reported as [`SyncEvent`]s on a
//! broadcast channel and logged through `tracing`.

pub mod backoff;
pub mod config;
pub mod error;
pub mod event;
pub mod ingest;
pub mod registry;
pub mod scheduler;
pub mod transport;

pub use backoff::Backoff;
pub use config::{FaultPolicy, SyncConfig, TeardownPolicy, DEFAULT_LOCAL_PORT};
pub use error::{ConfigError, RegistryError, Result, StreamError, TransportError};
pub use event::SyncEvent;
pub use ingest::{IngestOutcome, UpdateIngestor};
pub use registry::{
    ConsumerId, DueSubscription, HandleId, RegistryStats, Removal, Subscription,
    SubscriptionHandle, SubscriptionRegistry,
};
pub use scheduler::{RenewalScheduler, TickReport};
pub use transport::{Transport, UdpTransport};

/// Create the broadcast channel sync events are published on
pub fn event_channel(
    config: &SyncConfig,
) -> (
    tokio::sync::broadcast::Sender<SyncEvent>,
    tokio::sync::broadcast::Receiver<SyncEvent>,
) {
    tokio::sync::broadcast::channel(config.event_buffer_size)
}
