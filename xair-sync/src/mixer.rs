//! Sync-first mixer facade
//!
//! Provides a blocking API over the subscription engine. All async work runs
//! on a background worker thread.

use std::sync::{mpsc, Arc, Mutex};
use std::thread::{self, JoinHandle};

use state_store::{
    ChangeIterator, Clock, CurrentValueEntry, CurrentValueStore, ListenerId, SystemClock, Update,
};
use tokio::sync::mpsc::UnboundedSender;
use xair_protocol::{codec, Command, ParameterPath, ParameterValue};
use xair_stream::{
    event_channel, ConsumerId, RegistryStats, Removal, SubscriptionHandle, SubscriptionRegistry,
    SyncConfig, SyncEvent, Transport,
};

use crate::error::{Result, SyncError};
use crate::iter::SyncEventIterator;
use crate::worker::{
    spawn_sync_worker, EventQueue, TransportSource, WorkerCommand, WorkerContext,
};

/// Live, thread-safe view of a console's parameters
///
/// Consumers declare interest in parameters with [`subscribe`](Self::subscribe);
/// the background worker keeps the console streaming them and writes every
/// update into a current-value store that can be read at any time from any
/// thread. All methods are blocking and cheap.
///
/// # Example
///
/// ```rust,ignore
/// use xair_sync::{MixerSync, SyncConfig};
/// use xair_protocol::ParameterPath;
///
/// let mixer = MixerSync::connect(SyncConfig::for_console("192.168.1.50:10024".parse()?))?;
///
/// let fader = ParameterPath::channel_fader(1)?;
/// let handle = mixer.subscribe(fader, 5.0)?;
///
/// mixer.on_update(fader, |update| {
///     println!("{} -> {:?}", update.path, update.value.approx_db());
/// });
///
/// if let Some(entry) = mixer.current_entry(&fader) {
///     println!("{:?} (stale: {})", entry.value, entry.stale);
/// }
///
/// mixer.unsubscribe(&handle)?;
/// ```
pub struct MixerSync {
    /// Merged subscriptions (shared with the scheduler)
    registry: Arc<SubscriptionRegistry>,

    /// Last known values (shared with the ingestor)
    store: CurrentValueStore,

    /// Send commands to background worker
    command_tx: UnboundedSender<WorkerCommand>,

    /// Sync events forwarded by the worker
    event_rx: Arc<Mutex<mpsc::Receiver<SyncEvent>>>,

    config: SyncConfig,

    /// Background worker handle, taken on shutdown
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl MixerSync {
    /// Connect to the console named in `config` over UDP
    ///
    /// Binds the local port before returning, so address errors surface here.
    pub fn connect(config: SyncConfig) -> Result<Self> {
        Self::start(config, TransportSource::Udp, Arc::new(SystemClock))
    }

    /// Run against a caller-supplied transport and clock
    pub fn with_transport(
        config: SyncConfig,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        Self::start(config, TransportSource::Provided(transport), clock)
    }

    fn start(config: SyncConfig, source: TransportSource, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;

        let store = CurrentValueStore::with_clock(clock.clone(), config.subscription_window);
        let registry = Arc::new(SubscriptionRegistry::new(config.max_subscriptions, clock));
        let (events, _) = event_channel(&config);

        let (command_tx, command_rx) = tokio::sync::mpsc::unbounded_channel();
        let (event_queue, event_rx) = EventQueue::bounded(config.event_buffer_size);
        let (ready_tx, ready_rx) = mpsc::channel();

        let context = WorkerContext {
            config: config.clone(),
            registry: registry.clone(),
            store: store.clone(),
            events,
        };
        let worker = spawn_sync_worker(context, source, command_rx, event_queue, ready_tx)
            .map_err(SyncError::WorkerSpawn)?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = worker.join();
                return Err(e.into());
            }
            Err(_) => {
                let _ = worker.join();
                return Err(SyncError::WorkerDisconnected);
            }
        }

        Ok(Self {
            registry,
            store,
            command_tx,
            event_rx,
            config,
            worker: Mutex::new(Some(worker)),
        })
    }

    // ========================================================================
    // Subscriptions
    // ========================================================================

    /// Ask for updates to `path` at `rate_hz`
    ///
    /// The rate is rounded to the console's 0.5 Hz steps. Each call registers
    /// a separate interest; the console is asked for the fastest rate among
    /// all interests in the path.
    pub fn subscribe(&self, path: ParameterPath, rate_hz: f64) -> Result<SubscriptionHandle> {
        self.subscribe_as(self.registry.next_consumer(), path, rate_hz)
    }

    /// Like [`subscribe`](Self::subscribe), on behalf of a known consumer
    pub fn subscribe_as(
        &self,
        consumer: ConsumerId,
        path: ParameterPath,
        rate_hz: f64,
    ) -> Result<SubscriptionHandle> {
        let handle = self.registry.add_interest(consumer, path, rate_hz)?;
        self.wake();
        Ok(handle)
    }

    /// Withdraw an interest
    ///
    /// Once no interest in the path remains, renewal stops and the console's
    /// stream lapses; the last value stays readable and turns stale.
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) -> Result<()> {
        if self.registry.remove_interest(handle)? == Removal::TornDown {
            self.wake();
        }
        Ok(())
    }

    /// Allocate a consumer id for grouping subscriptions
    pub fn new_consumer(&self) -> ConsumerId {
        self.registry.next_consumer()
    }

    pub fn subscription_stats(&self) -> RegistryStats {
        self.registry.stats()
    }

    pub fn is_subscribed(&self, path: &ParameterPath) -> bool {
        self.registry.contains(path)
    }

    // ========================================================================
    // Values
    // ========================================================================

    /// The last value received for `path`, stale or not
    pub fn current_value(&self, path: &ParameterPath) -> Option<ParameterValue> {
        self.store.value(path)
    }

    /// The last value received for `path` with its freshness
    pub fn current_entry(&self, path: &ParameterPath) -> Option<CurrentValueEntry> {
        self.store.get(path)
    }

    /// Entries for every path received so far
    pub fn snapshot(&self) -> Vec<CurrentValueEntry> {
        self.store.snapshot()
    }

    /// Call `callback` for every accepted update to `path`, in arrival order
    ///
    /// Callbacks run on the worker thread and should return quickly. They
    /// hold `path` locked, so they must not write to it, nor to a path whose
    /// own callback writes back to `path`.
    pub fn on_update<F>(&self, path: ParameterPath, callback: F) -> ListenerId
    where
        F: Fn(&Update) + Send + Sync + 'static,
    {
        self.store.on_change(path, callback)
    }

    pub fn remove_update_listener(&self, path: &ParameterPath, id: ListenerId) -> bool {
        self.store.remove_listener(path, id)
    }

    /// Blocking iterator over every accepted update
    pub fn updates(&self) -> ChangeIterator {
        self.store.watch_all()
    }

    /// Blocking iterator over sync events (renewals, lapses, faults)
    ///
    /// Events queue up whether or not anyone reads them; once
    /// [`SyncConfig::event_buffer_size`] are waiting, the oldest are discarded.
    pub fn events(&self) -> SyncEventIterator {
        SyncEventIterator::new(Arc::clone(&self.event_rx))
    }

    /// The underlying store
    pub fn store(&self) -> &CurrentValueStore {
        &self.store
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    // ========================================================================
    // Outbound commands
    // ========================================================================

    /// Change a parameter on the console
    ///
    /// The new value arrives in the store through the normal update stream,
    /// if the path is subscribed.
    pub fn set_value(&self, path: ParameterPath, value: ParameterValue) -> Result<()> {
        let expected = path.kind().domain();
        if value.domain() != expected {
            return Err(SyncError::ValueMismatch {
                path,
                expected,
                found: value.domain(),
            });
        }
        self.send(WorkerCommand::Send(Command::Set { path, value }))
    }

    /// Set a fader to a level in dB
    pub fn set_fader_db(&self, path: ParameterPath, db: f32) -> Result<()> {
        self.set_value(path, ParameterValue::normalized(codec::db_to_normalized(db)))
    }

    /// Mute the main L/R bus
    pub fn mute_main(&self) -> Result<()> {
        self.set_value(ParameterPath::main_mute(), ParameterValue::Boolean(false))
    }

    /// Unmute the main L/R bus
    pub fn unmute_main(&self) -> Result<()> {
        self.set_value(ParameterPath::main_mute(), ParameterValue::Boolean(true))
    }

    /// Ask the console for the current value of `path` once
    pub fn query(&self, path: ParameterPath) -> Result<()> {
        self.send(WorkerCommand::Send(Command::Query { path }))
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Stop the background worker and wait for it to exit
    ///
    /// Console subscriptions are left to lapse. Safe to call more than once.
    pub fn shutdown(&self) -> Result<()> {
        let _ = self.command_tx.send(WorkerCommand::Shutdown);

        let handle = match self.worker.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };

        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                // Dropped from a callback on the worker itself
                return Ok(());
            }
            handle.join().map_err(|_| SyncError::WorkerDisconnected)?;
        }
        Ok(())
    }

    fn send(&self, command: WorkerCommand) -> Result<()> {
        self.command_tx
            .send(command)
            .map_err(|_| SyncError::WorkerDisconnected)
    }

    fn wake(&self) {
        let _ = self.command_tx.send(WorkerCommand::Tick);
    }
}

impl Drop for MixerSync {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            tracing::warn!("Sync worker did not shut down cleanly: {}", e);
        }
    }
}

impl std::fmt::Debug for MixerSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MixerSync")
            .field("console", &self.config.console_addr)
            .field("subscriptions", &self.registry.stats())
            .field("values", &self.store.len())
            .finish()
    }
}
