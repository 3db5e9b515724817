//! Current-Value Store for X-Air parameters
//!
//! A thread-safe snapshot of the last known value of every observed console
//! parameter, with per-path change listeners and lazily computed staleness.
//!
//! # Features
//!
//! - **Non-blocking reads**: `get()` never waits on writes to other paths
//! - **Ordered notification**: listeners see updates for a path in write order
//! - **Liveness tracking**: every write refreshes `last_updated_at`, even when
//!   the value is unchanged
//! - **Lazy staleness**: computed on read from the path's lease, no background sweep
//! - **Blocking iteration**: consume all updates via `watch_all()`
//!
//! # Quick Start
//!
//! ```rust
//! use std::time::Instant;
//! use state_store::CurrentValueStore;
//! use xair_protocol::{ParameterPath, ParameterValue};
//!
//! let store = CurrentValueStore::new();
//! let main = ParameterPath::main_fader();
//!
//! assert!(store.get(&main).is_none());
//!
//! store.write(main, ParameterValue::Normalized(0.75), Instant::now());
//! let entry = store.get(&main).unwrap();
//! assert_eq!(entry.value.approx_db(), Some(0.0));
//! assert!(!entry.stale);
//! ```

pub mod clock;
pub mod entry;
pub mod event;
pub mod iter;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use entry::{is_stale, CurrentValueEntry, Lease};
pub use event::Update;
pub use iter::ChangeIterator;
pub use store::{CurrentValueStore, Listener, ListenerId, DEFAULT_WINDOW};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::clock::{Clock, ManualClock, SystemClock};
    pub use crate::entry::{CurrentValueEntry, Lease};
    pub use crate::event::Update;
    pub use crate::iter::ChangeIterator;
    pub use crate::store::{CurrentValueStore, ListenerId};
}
