//! Store records and staleness
//!
//! Staleness is never swept in the background. It is derived on every read
//! from the time of the last accepted update and the lease the scheduler
//! published for the path.

use std::time::{Duration, Instant};

use xair_protocol::{ParameterPath, ParameterValue, Rate};

/// Snapshot of the last known value of a parameter
#[derive(Debug, Clone, PartialEq)]
pub struct CurrentValueEntry {
    /// The parameter
    pub path: ParameterPath,

    /// Last accepted value
    pub value: ParameterValue,

    /// When the last update (changed or not) was accepted
    pub last_updated_at: Instant,

    /// Whether the value should no longer be trusted as current
    pub stale: bool,
}

impl CurrentValueEntry {
    /// Time since the last accepted update
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_updated_at)
    }
}

/// The update stream the store should expect for a path
///
/// Published by the renewal scheduler each time it (re)subscribes, and ended
/// when the last consumer goes away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lease {
    /// Merged rate the console was asked to stream at
    pub rate: Rate,

    /// When the console stops streaming unless renewed
    pub expires_at: Instant,

    /// Whether further renewals are planned
    pub renewing: bool,
}

impl Lease {
    /// Longest acceptable gap between updates: two periods at the lease rate
    pub fn max_gap(&self) -> Duration {
        self.rate.period() * 2
    }
}

/// Decide whether a value last refreshed at `last_updated_at` is stale
///
/// With a lease, the value is stale once two update periods pass without an
/// update or once the lease window runs out. Without one, it is stale once a
/// full subscription window passes without an update.
pub fn is_stale(
    last_updated_at: Instant,
    lease: Option<&Lease>,
    now: Instant,
    window: Duration,
) -> bool {
    let age = now.saturating_duration_since(last_updated_at);
    match lease {
        Some(lease) => age > lease.max_gap() || now > lease.expires_at,
        None => age > window,
    }
}
