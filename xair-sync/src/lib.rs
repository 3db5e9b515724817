//! # xair-sync
//!
//! Keep a live, thread-safe view of an X-Air console's parameters.
//!
//! The console streams a parameter only while it has an unexpired
//! `/subscribe` request for it. [`MixerSync`] hides that: consumers say which
//! parameters they care about and how often, and read the latest values from
//! any thread, with a `stale` flag telling them when updates have stopped.
//!
//! ```rust,ignore
//! use xair_sync::prelude::*;
//!
//! let mixer = MixerSync::connect(SyncConfig::for_console("192.168.1.50:10024".parse()?))?;
//! let main = ParameterPath::main_fader();
//! let _handle = mixer.subscribe(main, 2.0)?;
//!
//! for update in mixer.updates() {
//!     println!("{}: {:?} dB", update.path, update.value.approx_db());
//! }
//! ```
//!
//! Everything async runs on one background thread with its own tokio
//! runtime; the API itself is synchronous.

pub mod error;
pub mod iter;
pub mod logging;
pub mod mixer;
mod worker;

pub use error::{Result, SyncError};
pub use iter::SyncEventIterator;
pub use logging::{init_logging, init_logging_from_env, LoggingError, LoggingMode};
pub use mixer::MixerSync;

// Re-export the types that appear in the facade's signatures
pub use state_store::{Clock, CurrentValueEntry, ListenerId, ManualClock, SystemClock, Update};
pub use xair_protocol::{ParameterKind, ParameterPath, ParameterValue, Rate};
pub use xair_stream::{
    ConsumerId, FaultPolicy, RegistryStats, SubscriptionHandle, SyncConfig, SyncEvent,
    TeardownPolicy, Transport,
};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        MixerSync, ParameterPath, ParameterValue, SubscriptionHandle, SyncConfig, SyncError,
        SyncEvent,
    };
}
