//! Current-value store
//!
//! The [`CurrentValueStore`] is the authoritative snapshot of the last known
//! value of every observed parameter.
//!
//! # Architecture
//!
//! ```text
//! CurrentValueStore
//!     │
//!     ├── slots: DashMap<ParameterPath, Arc<Slot>>
//!     │       │
//!     │       └── Slot
//!     │            ├── write_lock: Mutex<()>        (serializes writes to one path)
//!     │            ├── value: RwLock<Option<Recorded>>
//!     │            ├── lease: RwLock<Option<Lease>>
//!     │            └── listeners: RwLock<Vec<(ListenerId, Listener)>>
//!     │
//!     └── watchers: Mutex<Vec<mpsc::Sender<Update>>>  (ChangeIterator feeds)
//! ```
//!
//! Writes to different paths only meet in the map shard lookup and never wait
//! on each other. Writes to one path are serialized, and listeners for that
//! path run in write order while the path's write lock is held. Listeners may
//! read the store, but must not write to the path they are listening on. A
//! listener may write to another path only if no listener on that path writes
//! back, directly or through a chain: two such writes running on different
//! threads each hold the lock the other needs.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use xair_protocol::{ParameterPath, ParameterValue};

use crate::clock::{Clock, SystemClock};
use crate::entry::{is_stale, CurrentValueEntry, Lease};
use crate::event::Update;
use crate::iter::ChangeIterator;

/// Default subscription window used for staleness when no lease is known
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(10);

/// Callback invoked for every accepted update on a path
pub type Listener = Arc<dyn Fn(&Update) + Send + Sync>;

/// Identifies a registered listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Get the raw ID value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ListenerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy)]
struct Recorded {
    value: ParameterValue,
    last_updated_at: Instant,
}

#[derive(Default)]
struct Slot {
    write_lock: Mutex<()>,
    value: RwLock<Option<Recorded>>,
    lease: RwLock<Option<Lease>>,
    listeners: RwLock<Vec<(ListenerId, Listener)>>,
}

/// Thread-safe store of the last known value per parameter
///
/// Cloning is cheap; clones share the same state.
///
/// # Example
///
/// ```rust
/// use std::sync::{Arc, Mutex};
/// use state_store::CurrentValueStore;
/// use xair_protocol::{ParameterPath, ParameterValue};
///
/// let store = CurrentValueStore::new();
/// let path = ParameterPath::channel_fader(1).unwrap();
///
/// let seen = Arc::new(Mutex::new(Vec::new()));
/// let sink = Arc::clone(&seen);
/// store.on_change(path, move |update| sink.lock().unwrap().push(update.value));
///
/// store.write(path, ParameterValue::Normalized(0.5), std::time::Instant::now());
///
/// assert_eq!(store.get(&path).unwrap().value, ParameterValue::Normalized(0.5));
/// assert_eq!(seen.lock().unwrap().len(), 1);
/// ```
#[derive(Clone)]
pub struct CurrentValueStore {
    slots: Arc<DashMap<ParameterPath, Arc<Slot>>>,
    watchers: Arc<Mutex<Vec<mpsc::Sender<Update>>>>,
    next_listener_id: Arc<AtomicU64>,
    clock: Arc<dyn Clock>,
    window: Duration,
}

impl CurrentValueStore {
    /// Create an empty store on the system clock
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock), DEFAULT_WINDOW)
    }

    /// Create an empty store with an explicit clock and subscription window
    pub fn with_clock(clock: Arc<dyn Clock>, window: Duration) -> Self {
        Self {
            slots: Arc::new(DashMap::new()),
            watchers: Arc::new(Mutex::new(Vec::new())),
            next_listener_id: Arc::new(AtomicU64::new(1)),
            clock,
            window,
        }
    }

    /// The clock used for staleness
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    // ========================================================================
    // Reading
    // ========================================================================

    /// Latest snapshot for a path, with staleness evaluated now
    ///
    /// Returns `None` if the path has never been observed.
    pub fn get(&self, path: &ParameterPath) -> Option<CurrentValueEntry> {
        self.get_at(path, self.clock.now())
    }

    /// Latest snapshot for a path, with staleness evaluated at `now`
    pub fn get_at(&self, path: &ParameterPath, now: Instant) -> Option<CurrentValueEntry> {
        let slot = self.existing_slot(path)?;
        let recorded = (*slot.value.read())?;
        let lease = *slot.lease.read();

        Some(CurrentValueEntry {
            path: *path,
            value: recorded.value,
            last_updated_at: recorded.last_updated_at,
            stale: is_stale(recorded.last_updated_at, lease.as_ref(), now, self.window),
        })
    }

    /// Last accepted value for a path, ignoring staleness
    pub fn value(&self, path: &ParameterPath) -> Option<ParameterValue> {
        let slot = self.existing_slot(path)?;
        let recorded = *slot.value.read();
        recorded.map(|r| r.value)
    }

    /// Snapshots of every observed path, ordered by path
    pub fn snapshot(&self) -> Vec<CurrentValueEntry> {
        let now = self.clock.now();
        let mut entries: Vec<_> = self
            .paths()
            .iter()
            .filter_map(|path| self.get_at(path, now))
            .collect();
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        entries
    }

    /// Every path that has been observed
    pub fn paths(&self) -> Vec<ParameterPath> {
        self.slots
            .iter()
            .filter(|slot| slot.value().value.read().is_some())
            .map(|slot| *slot.key())
            .collect()
    }

    /// Number of observed paths
    pub fn len(&self) -> usize {
        self.paths().len()
    }

    /// Check if no path has been observed yet
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ========================================================================
    // Writing
    // ========================================================================

    /// Accept an update for a path
    ///
    /// Always refreshes the path's last-updated time. Every listener on the
    /// path is invoked once, in write order, and every `ChangeIterator`
    /// receives the update.
    pub fn write(&self, path: ParameterPath, value: ParameterValue, now: Instant) -> Update {
        let slot = self.slot(path);
        let _serialized = slot.write_lock.lock();

        let previous = {
            let mut recorded = slot.value.write();
            let previous = (*recorded).map(|r| r.value);
            *recorded = Some(Recorded {
                value,
                last_updated_at: now,
            });
            previous
        };

        let update = Update::new(path, value, previous, now);

        if update.changed {
            tracing::debug!("{} changed: {:?} -> {:?}", path, previous, value);
        } else {
            tracing::trace!("{} refreshed: {:?}", path, value);
        }

        let listeners: Vec<Listener> = slot
            .listeners
            .read()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for listener in listeners {
            let result = panic::catch_unwind(AssertUnwindSafe(|| listener(&update)));
            if result.is_err() {
                tracing::error!("Listener for {} panicked while handling update", path);
            }
        }

        self.broadcast(&update);
        update
    }

    // ========================================================================
    // Listeners
    // ========================================================================

    /// Register a callback for every accepted update on `path`
    ///
    /// Multiple listeners per path are allowed; each is invoked exactly once
    /// per update. The listener runs with `path` locked for writing; see the
    /// module docs for which writes it may make.
    pub fn on_change<F>(&self, path: ParameterPath, listener: F) -> ListenerId
    where
        F: Fn(&Update) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_listener_id.fetch_add(1, Ordering::Relaxed));
        self.slot(path)
            .listeners
            .write()
            .push((id, Arc::new(listener)));

        tracing::debug!("Registered {} for {}", id, path);
        id
    }

    /// Remove a listener, returning whether it was registered
    pub fn remove_listener(&self, path: &ParameterPath, id: ListenerId) -> bool {
        let Some(slot) = self.existing_slot(path) else {
            return false;
        };
        let mut listeners = slot.listeners.write();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        before != listeners.len()
    }

    /// Number of listeners registered on a path
    pub fn listener_count(&self, path: &ParameterPath) -> usize {
        self.existing_slot(path)
            .map(|slot| slot.listeners.read().len())
            .unwrap_or(0)
    }

    /// Create a blocking iterator over every update accepted from now on
    pub fn watch_all(&self) -> ChangeIterator {
        let (tx, rx) = mpsc::channel();
        self.watchers.lock().push(tx);
        ChangeIterator::new(rx)
    }

    // ========================================================================
    // Leases
    // ========================================================================

    /// Record the update stream the console was asked for
    pub fn set_lease(&self, path: ParameterPath, lease: Lease) {
        *self.slot(path).lease.write() = Some(lease);
    }

    /// Mark a path's lease as no longer renewed
    ///
    /// The last expiry is kept so reads turn stale once the console's
    /// window runs out.
    pub fn end_lease(&self, path: &ParameterPath) {
        if let Some(slot) = self.existing_slot(path) {
            if let Some(lease) = slot.lease.write().as_mut() {
                lease.renewing = false;
            }
        }
    }

    /// The lease currently recorded for a path
    pub fn lease(&self, path: &ParameterPath) -> Option<Lease> {
        self.existing_slot(path).and_then(|slot| *slot.lease.read())
    }

    /// Leases for every path that has one
    pub fn leases(&self) -> HashMap<ParameterPath, Lease> {
        self.slots
            .iter()
            .filter_map(|slot| (*slot.value().lease.read()).map(|lease| (*slot.key(), lease)))
            .collect()
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn slot(&self, path: ParameterPath) -> Arc<Slot> {
        Arc::clone(self.slots.entry(path).or_default().value())
    }

    fn existing_slot(&self, path: &ParameterPath) -> Option<Arc<Slot>> {
        self.slots.get(path).map(|slot| Arc::clone(slot.value()))
    }

    fn broadcast(&self, update: &Update) {
        let mut watchers = self.watchers.lock();
        watchers.retain(|tx| tx.send(update.clone()).is_ok());
    }
}

impl Default for CurrentValueStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CurrentValueStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CurrentValueStore")
            .field("path_count", &self.len())
            .field("window", &self.window)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::Mutex as StdMutex;
    use xair_protocol::Rate;

    fn fader(channel: u8) -> ParameterPath {
        ParameterPath::channel_fader(channel).unwrap()
    }

    fn manual_store() -> (CurrentValueStore, ManualClock) {
        let clock = ManualClock::new();
        let store = CurrentValueStore::with_clock(Arc::new(clock.clone()), DEFAULT_WINDOW);
        (store, clock)
    }

    #[test]
    fn test_get_unobserved_is_none() {
        let store = CurrentValueStore::new();
        assert!(store.get(&fader(1)).is_none());
        assert!(store.value(&fader(1)).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_write_and_get() {
        let (store, clock) = manual_store();
        let path = fader(3);

        let update = store.write(path, ParameterValue::Normalized(0.4), clock.now());
        assert!(update.changed);
        assert_eq!(update.previous, None);

        let entry = store.get(&path).unwrap();
        assert_eq!(entry.value, ParameterValue::Normalized(0.4));
        assert_eq!(entry.last_updated_at, clock.now());
        assert!(!entry.stale);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_listener_sees_refreshes_and_changes() {
        let (store, clock) = manual_store();
        let path = fader(1);
        let seen = Arc::new(StdMutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        store.on_change(path, move |update| {
            sink.lock().unwrap().push((update.value, update.changed));
        });

        store.write(path, ParameterValue::Normalized(0.1), clock.now());
        clock.advance(Duration::from_millis(100));
        store.write(path, ParameterValue::Normalized(0.1), clock.now());
        store.write(path, ParameterValue::Normalized(0.2), clock.now());

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                (ParameterValue::Normalized(0.1), true),
                (ParameterValue::Normalized(0.1), false),
                (ParameterValue::Normalized(0.2), true),
            ]
        );

        // Liveness refresh moved the timestamp
        assert_eq!(store.get(&path).unwrap().last_updated_at, clock.now());
    }

    #[test]
    fn test_listener_delivery_order() {
        let (store, clock) = manual_store();
        let path = fader(2);
        let seen = Arc::new(StdMutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        store.on_change(path, move |update| {
            sink.lock().unwrap().push(update.value.as_normalized().unwrap());
        });

        for value in [0.1, 0.2, 0.3] {
            store.write(path, ParameterValue::Normalized(value), clock.now());
        }

        assert_eq!(*seen.lock().unwrap(), vec![0.1, 0.2, 0.3]);
    }

    #[test]
    fn test_multiple_listeners_each_once() {
        let (store, clock) = manual_store();
        let path = ParameterPath::main_mute();
        let counts = Arc::new(StdMutex::new([0usize; 2]));

        for i in 0..2 {
            let counts = Arc::clone(&counts);
            store.on_change(path, move |_| counts.lock().unwrap()[i] += 1);
        }
        // A listener on another path is not invoked
        let other = Arc::new(StdMutex::new(0usize));
        let other_sink = Arc::clone(&other);
        store.on_change(fader(1), move |_| *other_sink.lock().unwrap() += 1);

        store.write(path, ParameterValue::Boolean(true), clock.now());

        assert_eq!(*counts.lock().unwrap(), [1, 1]);
        assert_eq!(*other.lock().unwrap(), 0);
        assert_eq!(store.listener_count(&path), 2);
    }

    #[test]
    fn test_remove_listener() {
        let (store, clock) = manual_store();
        let path = fader(4);
        let count = Arc::new(StdMutex::new(0usize));

        let sink = Arc::clone(&count);
        let id = store.on_change(path, move |_| *sink.lock().unwrap() += 1);
        store.write(path, ParameterValue::Normalized(0.5), clock.now());

        assert!(store.remove_listener(&path, id));
        assert!(!store.remove_listener(&path, id));
        store.write(path, ParameterValue::Normalized(0.6), clock.now());

        assert_eq!(*count.lock().unwrap(), 1);
    }

    #[test]
    fn test_panicking_listener_does_not_poison_store() {
        let (store, clock) = manual_store();
        let path = fader(5);
        let count = Arc::new(StdMutex::new(0usize));

        store.on_change(path, |_| panic!("listener failure"));
        let sink = Arc::clone(&count);
        store.on_change(path, move |_| *sink.lock().unwrap() += 1);

        store.write(path, ParameterValue::Normalized(0.5), clock.now());
        store.write(path, ParameterValue::Normalized(0.6), clock.now());

        assert_eq!(*count.lock().unwrap(), 2);
        assert_eq!(store.value(&path), Some(ParameterValue::Normalized(0.6)));
    }

    #[test]
    fn test_listener_can_read_store() {
        let (store, clock) = manual_store();
        let path = fader(6);
        let reader = store.clone();
        let seen = Arc::new(StdMutex::new(None));

        let sink = Arc::clone(&seen);
        store.on_change(path, move |update| {
            *sink.lock().unwrap() = reader.value(&update.path);
        });
        store.write(path, ParameterValue::Normalized(0.9), clock.now());

        assert_eq!(*seen.lock().unwrap(), Some(ParameterValue::Normalized(0.9)));
    }

    #[test]
    fn test_listener_can_mirror_to_other_path() {
        let (store, clock) = manual_store();
        let writer = store.clone();
        let mirrored = Arc::new(StdMutex::new(Vec::new()));

        store.on_change(fader(7), move |update| {
            writer.write(fader(8), update.value, update.received_at);
        });
        let sink = Arc::clone(&mirrored);
        store.on_change(fader(8), move |update| {
            sink.lock().unwrap().push(update.value);
        });

        // Writers on both threads: fader 7 mirrors into 8, nothing writes back
        let other = store.clone();
        let now = clock.now();
        let handle = std::thread::spawn(move || {
            for _ in 0..100 {
                other.write(fader(8), ParameterValue::Normalized(0.1), now);
            }
        });
        for _ in 0..100 {
            store.write(fader(7), ParameterValue::Normalized(0.4), now);
        }
        handle.join().unwrap();

        assert_eq!(mirrored.lock().unwrap().len(), 200);
        assert_eq!(store.value(&fader(7)), Some(ParameterValue::Normalized(0.4)));
    }

    #[test]
    fn test_staleness_without_lease() {
        let (store, clock) = manual_store();
        let path = fader(7);
        store.write(path, ParameterValue::Normalized(0.5), clock.now());

        clock.advance(DEFAULT_WINDOW);
        assert!(!store.get(&path).unwrap().stale);

        clock.advance(Duration::from_millis(1));
        assert!(store.get(&path).unwrap().stale);
    }

    #[test]
    fn test_staleness_with_lease() {
        let (store, clock) = manual_store();
        let path = fader(8);
        store.set_lease(
            path,
            Lease {
                rate: Rate::from_hz(5.0).unwrap(),
                expires_at: clock.now() + DEFAULT_WINDOW,
                renewing: true,
            },
        );
        store.write(path, ParameterValue::Normalized(0.5), clock.now());

        clock.advance(Duration::from_millis(400));
        assert!(!store.get(&path).unwrap().stale);

        clock.advance(Duration::from_millis(1));
        assert!(store.get(&path).unwrap().stale);

        // A fresh update clears staleness
        store.write(path, ParameterValue::Normalized(0.5), clock.now());
        assert!(!store.get(&path).unwrap().stale);
    }

    #[test]
    fn test_end_lease_keeps_expiry() {
        let (store, clock) = manual_store();
        let path = fader(9);
        let expires_at = clock.now() + DEFAULT_WINDOW;
        store.set_lease(
            path,
            Lease {
                rate: Rate::from_hz(1.0).unwrap(),
                expires_at,
                renewing: true,
            },
        );

        store.end_lease(&path);

        let lease = store.lease(&path).unwrap();
        assert!(!lease.renewing);
        assert_eq!(lease.expires_at, expires_at);
        assert_eq!(store.leases().len(), 1);
    }

    #[test]
    fn test_lease_alone_does_not_fabricate_value() {
        let (store, clock) = manual_store();
        let path = fader(10);
        store.set_lease(
            path,
            Lease {
                rate: Rate::default(),
                expires_at: clock.now() + DEFAULT_WINDOW,
                renewing: true,
            },
        );

        assert!(store.get(&path).is_none());
        assert!(store.paths().is_empty());
    }

    #[test]
    fn test_watch_all_receives_updates() {
        let (store, clock) = manual_store();
        let iter = store.watch_all();

        store.write(fader(1), ParameterValue::Normalized(0.1), clock.now());
        store.write(ParameterPath::main_mute(), ParameterValue::Boolean(false), clock.now());

        let updates: Vec<_> = iter.try_iter().collect();
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].path, fader(1));
        assert_eq!(updates[1].value, ParameterValue::Boolean(false));
    }

    #[test]
    fn test_snapshot_sorted() {
        let (store, clock) = manual_store();
        store.write(ParameterPath::main_fader(), ParameterValue::Normalized(0.7), clock.now());
        store.write(fader(2), ParameterValue::Normalized(0.2), clock.now());
        store.write(fader(1), ParameterValue::Normalized(0.1), clock.now());

        let paths: Vec<_> = store.snapshot().into_iter().map(|e| e.path).collect();
        assert_eq!(paths, vec![fader(1), fader(2), ParameterPath::main_fader()]);
    }

    #[test]
    fn test_clone_shares_state() {
        let store = CurrentValueStore::new();
        let cloned = store.clone();

        store.write(fader(1), ParameterValue::Normalized(0.3), Instant::now());
        assert_eq!(cloned.value(&fader(1)), Some(ParameterValue::Normalized(0.3)));
    }

    #[test]
    fn test_concurrent_writes_to_different_paths() {
        let store = CurrentValueStore::new();
        let handles: Vec<_> = (1..=18u8)
            .map(|channel| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        store.write(
                            fader(channel),
                            ParameterValue::Normalized(i as f32 / 100.0),
                            Instant::now(),
                        );
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.len(), 18);
        for channel in 1..=18u8 {
            assert_eq!(store.value(&fader(channel)), Some(ParameterValue::Normalized(0.99)));
        }
    }
}
