//! Inbound update handling
//!
//! Turns raw console messages into store writes. Every failure here is local
//! to one message: it is logged, reported as a [`SyncEvent`] and dropped.

use std::sync::Arc;
use std::time::{Duration, Instant};

use state_store::{Clock, CurrentValueStore, Update};
use tokio::sync::{broadcast, watch};
use xair_protocol::codec::{self, Decoded};
use xair_protocol::{DecodeFault, InboundMessage, InvalidPathError, ParameterPath};

use crate::config::{FaultPolicy, SyncConfig};
use crate::error::TransportError;
use crate::event::SyncEvent;
use crate::transport::Transport;

/// What happened to one inbound message
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    /// Value decoded cleanly and was stored
    Stored(Update),
    /// Value was out of range and stored clamped
    StoredClamped(Update, DecodeFault),
    /// Value could not be used and was discarded
    Dropped(ParameterPath, DecodeFault),
    /// Address is not a known parameter
    Unrecognized(InvalidPathError),
}

impl IngestOutcome {
    /// The store update, if the message produced one
    pub fn update(&self) -> Option<&Update> {
        match self {
            IngestOutcome::Stored(update) | IngestOutcome::StoredClamped(update, _) => Some(update),
            _ => None,
        }
    }

    pub fn is_stored(&self) -> bool {
        self.update().is_some()
    }
}

/// Validates inbound messages and writes them into the store
#[derive(Debug, Clone)]
pub struct UpdateIngestor {
    store: CurrentValueStore,
    events: broadcast::Sender<SyncEvent>,
    fault_policy: FaultPolicy,
    recv_error_pause: Duration,
}

impl UpdateIngestor {
    pub fn new(
        store: CurrentValueStore,
        events: broadcast::Sender<SyncEvent>,
        config: &SyncConfig,
    ) -> Self {
        Self {
            store,
            events,
            fault_policy: config.fault_policy,
            recv_error_pause: config.recv_error_pause,
        }
    }

    /// Ingest a message received now, according to the store's clock
    pub fn ingest(&self, message: &InboundMessage) -> IngestOutcome {
        let now = self.store.clock().now();
        self.ingest_at(message, now)
    }

    /// Ingest a message received at `now`
    pub fn ingest_at(&self, message: &InboundMessage, now: Instant) -> IngestOutcome {
        let path = match ParameterPath::parse(&message.address) {
            Ok(path) => path,
            Err(error) => {
                tracing::warn!("Dropping message for unrecognized address: {}", error);
                let _ = self.events.send(SyncEvent::UnrecognizedPath {
                    address: message.address.clone(),
                    error: error.clone(),
                });
                return IngestOutcome::Unrecognized(error);
            }
        };

        match codec::decode_args(path.kind(), &message.args) {
            Decoded::Clean(value) => IngestOutcome::Stored(self.store.write(path, value, now)),
            Decoded::Clamped(value, fault) => match self.fault_policy {
                FaultPolicy::Clamp => {
                    tracing::warn!("Storing clamped value for {}: {}", path, fault);
                    self.report_fault(path, fault.clone(), false);
                    IngestOutcome::StoredClamped(self.store.write(path, value, now), fault)
                }
                FaultPolicy::Drop => {
                    tracing::warn!("Dropping out-of-range value for {}: {}", path, fault);
                    self.report_fault(path, fault.clone(), true);
                    IngestOutcome::Dropped(path, fault)
                }
            },
            Decoded::Rejected(fault) => {
                tracing::warn!("Dropping update for {}: {}", path, fault);
                self.report_fault(path, fault.clone(), true);
                IngestOutcome::Dropped(path, fault)
            }
        }
    }

    /// Receive and ingest until shutdown is signalled
    ///
    /// Malformed datagrams are skipped. Socket errors pause briefly before
    /// listening again.
    pub async fn run(&self, transport: Arc<dyn Transport>, mut shutdown: watch::Receiver<bool>) {
        tracing::debug!("Update ingestor started");

        loop {
            tokio::select! {
                result = transport.recv() => match result {
                    Ok(messages) => {
                        for message in &messages {
                            self.ingest(message);
                        }
                    }
                    Err(TransportError::Message(e)) => {
                        tracing::debug!("Skipping malformed datagram: {}", e);
                    }
                    Err(TransportError::Closed) => {
                        tracing::debug!("Transport closed, stopping ingestor");
                        break;
                    }
                    Err(e) => {
                        tracing::warn!("Receive failed: {}", e);
                        tokio::time::sleep(self.recv_error_pause).await;
                    }
                },
                _ = shutdown.changed() => break,
            }
        }

        tracing::debug!("Update ingestor stopped");
    }

    fn report_fault(&self, path: ParameterPath, fault: DecodeFault, dropped: bool) {
        let _ = self.events.send(SyncEvent::DecodeFault {
            path,
            fault,
            dropped,
        });
    }
}
