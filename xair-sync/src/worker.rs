//! Background worker thread
//!
//! Spawns a thread with its own tokio runtime that runs the renewal scheduler
//! and the update ingestor, sends one-off commands, and forwards sync events
//! to the blocking event iterator.

use std::sync::{mpsc, Arc, Mutex};
use std::thread::{self, JoinHandle};

use state_store::CurrentValueStore;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use xair_stream::{
    RenewalScheduler, SubscriptionRegistry, SyncConfig, SyncEvent, Transport, TransportError,
    UdpTransport, UpdateIngestor,
};

/// Commands sent from the sync facade to the background worker
#[derive(Debug)]
pub enum WorkerCommand {
    /// Send a command to the console once
    Send(xair_protocol::Command),
    /// Run a scheduler tick now instead of waiting for the next interval
    Tick,
    /// Stop the worker
    Shutdown,
}

/// Where the worker gets its transport from
pub enum TransportSource {
    /// Bind a UDP socket inside the worker runtime
    Udp,
    /// Use a transport supplied by the caller
    Provided(Arc<dyn Transport>),
}

/// Shared state the worker drives
pub struct WorkerContext {
    pub config: SyncConfig,
    pub registry: Arc<SubscriptionRegistry>,
    pub store: CurrentValueStore,
    pub events: broadcast::Sender<SyncEvent>,
}

/// Bounded hand-off of sync events to the blocking iterator
///
/// When the queue is full the oldest event is discarded, so an application
/// that never reads events holds at most `capacity` of them.
pub struct EventQueue {
    tx: mpsc::SyncSender<SyncEvent>,
    rx: Arc<Mutex<mpsc::Receiver<SyncEvent>>>,
    dropped: u64,
}

impl EventQueue {
    /// Create a queue and the receiver shared with the facade
    pub fn bounded(capacity: usize) -> (Self, Arc<Mutex<mpsc::Receiver<SyncEvent>>>) {
        let (tx, rx) = mpsc::sync_channel(capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let queue = Self {
            tx,
            rx: Arc::clone(&rx),
            dropped: 0,
        };
        (queue, rx)
    }

    /// Queue an event, evicting the oldest one if the queue is full
    pub fn push(&mut self, event: SyncEvent) {
        let event = match self.tx.try_send(event) {
            Ok(()) => return,
            Err(mpsc::TrySendError::Disconnected(_)) => return,
            Err(mpsc::TrySendError::Full(event)) => event,
        };

        // A reader blocked in recv() holds the lock only while the queue is empty
        if let Ok(rx) = self.rx.try_lock() {
            let _ = rx.try_recv();
        }
        // Either the evicted event or this one is lost
        let _ = self.tx.try_send(event);
        self.dropped += 1;

        if self.dropped == 1 || self.dropped % 1000 == 0 {
            tracing::warn!(
                "Sync event queue full, {} events discarded so far",
                self.dropped
            );
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

/// Spawn the background sync worker
///
/// `ready_tx` receives the outcome of transport setup before the worker
/// starts its loops.
pub fn spawn_sync_worker(
    context: WorkerContext,
    source: TransportSource,
    command_rx: tokio::sync::mpsc::UnboundedReceiver<WorkerCommand>,
    event_queue: EventQueue,
    ready_tx: mpsc::Sender<Result<(), TransportError>>,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("xair-sync-worker".to_string())
        .spawn(move || {
            let rt = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    tracing::error!("Failed to create tokio runtime for sync worker: {}", e);
                    let _ = ready_tx.send(Err(TransportError::Io(e)));
                    return;
                }
            };

            rt.block_on(run_worker(context, source, command_rx, event_queue, ready_tx));
        })
}

async fn run_worker(
    context: WorkerContext,
    source: TransportSource,
    mut command_rx: tokio::sync::mpsc::UnboundedReceiver<WorkerCommand>,
    mut event_queue: EventQueue,
    ready_tx: mpsc::Sender<Result<(), TransportError>>,
) {
    let WorkerContext {
        config,
        registry,
        store,
        events,
    } = context;

    let transport: Arc<dyn Transport> = match source {
        TransportSource::Udp => match UdpTransport::bind(&config).await {
            Ok(transport) => Arc::new(transport),
            Err(e) => {
                tracing::error!("Failed to bind console transport: {}", e);
                let _ = ready_tx.send(Err(e));
                return;
            }
        },
        TransportSource::Provided(transport) => transport,
    };

    // Subscribe before anything can emit
    let mut event_rx = events.subscribe();

    let scheduler = Arc::new(RenewalScheduler::new(
        registry,
        store.clone(),
        transport.clone(),
        events.clone(),
        &config,
    ));
    let ingestor = UpdateIngestor::new(store, events, &config);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let scheduler_task = tokio::spawn({
        let scheduler = scheduler.clone();
        let shutdown = shutdown_rx.clone();
        async move { scheduler.run(shutdown).await }
    });
    let ingest_task = tokio::spawn({
        let transport = transport.clone();
        async move { ingestor.run(transport, shutdown_rx).await }
    });

    let _ = ready_tx.send(Ok(()));
    tracing::info!("Sync worker started for console {}", config.console_addr);

    loop {
        tokio::select! {
            command = command_rx.recv() => match command {
                Some(WorkerCommand::Send(command)) => {
                    if let Err(e) = transport.send(&command).await {
                        tracing::warn!("Failed to send {}: {}", command, e);
                    }
                }
                Some(WorkerCommand::Tick) => {
                    scheduler.tick().await;
                }
                Some(WorkerCommand::Shutdown) | None => {
                    tracing::info!("Sync worker received shutdown command");
                    break;
                }
            },

            event = event_rx.recv() => match event {
                Ok(event) => event_queue.push(event),
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!("Sync event consumer lagged, {} events dropped", missed);
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    let _ = shutdown_tx.send(true);
    if let Err(e) = scheduler_task.await {
        tracing::error!("Renewal scheduler task failed: {}", e);
    }
    if let Err(e) = ingest_task.await {
        tracing::error!("Update ingestor task failed: {}", e);
    }

    if event_queue.dropped() > 0 {
        tracing::debug!(
            "{} sync events were discarded unread",
            event_queue.dropped()
        );
    }
    tracing::info!("Sync worker shut down");
}
