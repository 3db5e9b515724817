//! Consumer interest tracking and subscription merging
//!
//! Many consumers may want updates for the same parameter at different rates.
//! The registry keeps exactly one merged subscription per path, running at the
//! fastest rate any current consumer asked for, and tracks where each one is
//! in its renewal lifecycle for the scheduler.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use state_store::{Clock, SystemClock};
use xair_protocol::{ParameterPath, Rate};

use crate::backoff::Backoff;
use crate::error::RegistryError;

/// Result type for registry operations
pub type RegistryResult<T> = std::result::Result<T, RegistryError>;

/// Identifies one consumer of parameter updates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConsumerId(u64);

impl ConsumerId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConsumerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "consumer-{}", self.0)
    }
}

/// Unique identifier for one registered interest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(u64);

impl HandleId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Token returned to a consumer for one registered interest
///
/// Pass it back to [`SubscriptionRegistry::remove_interest`] to withdraw the
/// interest. Each handle can be removed once.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    id: HandleId,
    consumer: ConsumerId,
    path: ParameterPath,
    rate: Rate,
}

impl SubscriptionHandle {
    pub fn id(&self) -> HandleId {
        self.id
    }

    pub fn consumer(&self) -> ConsumerId {
        self.consumer
    }

    pub fn path(&self) -> &ParameterPath {
        &self.path
    }

    /// The rate this consumer asked for, after quantization
    pub fn rate(&self) -> Rate {
        self.rate
    }
}

impl fmt::Display for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} @ {} ({})", self.id, self.path, self.rate, self.consumer)
    }
}

#[derive(Debug, Clone, Copy)]
struct Interest {
    consumer: ConsumerId,
    rate: Rate,
}

/// The merged outbound subscription for one path
#[derive(Debug, Clone)]
pub struct Subscription {
    /// The subscribed parameter
    pub path: ParameterPath,
    /// Fastest rate among current interests
    pub rate: Rate,
    /// When the subscription was first created
    pub created_at: Instant,
    /// Last successful send, `None` until the first one
    pub requested_at: Option<Instant>,
    /// When the console stops sending without a renewal
    pub expires_at: Instant,
    /// Whether the last renewal attempt succeeded
    pub renewing: bool,
    /// No consumers remain; removed on the next scheduler tick
    pub torn_down: bool,
    /// Consecutive failed sends
    pub failures: u32,
    /// Earliest time of the next attempt after a failure
    pub retry_at: Option<Instant>,
    /// Successful sends so far
    pub renewals: u64,
    resend: bool,
    lapse_reported: bool,
    interests: HashMap<HandleId, Interest>,
}

impl Subscription {
    fn new(path: ParameterPath, rate: Rate, now: Instant) -> Self {
        Self {
            path,
            rate,
            created_at: now,
            requested_at: None,
            expires_at: now,
            renewing: false,
            torn_down: false,
            failures: 0,
            retry_at: None,
            renewals: 0,
            resend: true,
            lapse_reported: false,
            interests: HashMap::new(),
        }
    }

    /// Number of interests currently held
    pub fn interest_count(&self) -> usize {
        self.interests.len()
    }

    /// Distinct consumers holding interests, in id order
    pub fn consumers(&self) -> Vec<ConsumerId> {
        let mut consumers: Vec<_> = self
            .interests
            .values()
            .map(|interest| interest.consumer)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        consumers.sort();
        consumers
    }

    /// Whether a send is needed at `now`
    ///
    /// True when the remaining window is shorter than `margin` or the merged
    /// rate went up, unless a retry is still backing off.
    pub fn is_due(&self, now: Instant, margin: Duration) -> bool {
        if self.torn_down {
            return false;
        }
        if let Some(retry_at) = self.retry_at {
            if now < retry_at {
                return false;
            }
        }
        self.resend || self.expires_at.saturating_duration_since(now) < margin
    }

    /// Whether the console's window has run out
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }

    fn merged_rate(&self) -> Option<Rate> {
        self.interests.values().map(|interest| interest.rate).max()
    }
}

/// A subscription the scheduler should send now
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DueSubscription {
    pub path: ParameterPath,
    pub rate: Rate,
    /// Set once per gap when the window already ran out
    pub overdue: Option<Duration>,
}

/// What remains of a subscription after an interest is withdrawn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    /// Other interests keep the subscription alive at this merged rate
    Remaining { interests: usize, rate: Rate },
    /// That was the last interest; the subscription will be torn down
    TornDown,
}

/// Registry statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Live merged subscriptions
    pub subscriptions: usize,
    /// Interests across all live subscriptions
    pub interests: usize,
    /// Distinct consumers across all live subscriptions
    pub consumers: usize,
    /// Subscriptions waiting to be reaped
    pub torn_down: usize,
}

/// Thread-safe registry of merged subscriptions, keyed by path
pub struct SubscriptionRegistry {
    subscriptions: DashMap<ParameterPath, Subscription>,
    /// Subscriptions not torn down; slots are reserved under the entry lock
    live: AtomicUsize,
    next_handle: AtomicU64,
    next_consumer: AtomicU64,
    max_subscriptions: usize,
    clock: Arc<dyn Clock>,
}

impl SubscriptionRegistry {
    /// Create a registry allowing up to `max_subscriptions` distinct paths
    pub fn new(max_subscriptions: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            subscriptions: DashMap::new(),
            live: AtomicUsize::new(0),
            next_handle: AtomicU64::new(1),
            next_consumer: AtomicU64::new(1),
            max_subscriptions,
            clock,
        }
    }

    /// Allocate a fresh consumer id
    pub fn next_consumer(&self) -> ConsumerId {
        ConsumerId::new(self.next_consumer.fetch_add(1, Ordering::Relaxed))
    }

    /// Register a consumer's interest in a path at a rate in Hz
    ///
    /// Creates the path's subscription (due immediately) or raises its merged
    /// rate if this consumer asks for more than the current one.
    pub fn add_interest(
        &self,
        consumer: ConsumerId,
        path: ParameterPath,
        rate_hz: f64,
    ) -> RegistryResult<SubscriptionHandle> {
        let rate = Rate::from_hz(rate_hz)?;
        self.add_interest_at_rate(consumer, path, rate, self.clock.now())
    }

    /// Register an interest with an already quantized rate
    pub fn add_interest_at_rate(
        &self,
        consumer: ConsumerId,
        path: ParameterPath,
        rate: Rate,
        now: Instant,
    ) -> RegistryResult<SubscriptionHandle> {
        let mut entry = match self.subscriptions.entry(path) {
            Entry::Occupied(occupied) => {
                let mut entry = occupied.into_ref();
                if entry.torn_down {
                    self.reserve_slot()?;
                    tracing::debug!("Reviving subscription for {} before teardown", path);
                    entry.torn_down = false;
                }
                entry
            }
            Entry::Vacant(vacant) => {
                self.reserve_slot()?;
                vacant.insert(Subscription::new(path, rate, now))
            }
        };
        let id = HandleId::new(self.next_handle.fetch_add(1, Ordering::Relaxed));
        let subscription = entry.value_mut();

        subscription
            .interests
            .insert(id, Interest { consumer, rate });

        let previous = subscription.rate;
        subscription.rate = subscription.merged_rate().unwrap_or(rate);
        if subscription.rate > previous {
            subscription.resend = true;
        }

        tracing::debug!(
            "Interest {} from {} in {} at {}, merged rate {}",
            id,
            consumer,
            path,
            rate,
            subscription.rate
        );

        Ok(SubscriptionHandle {
            id,
            consumer,
            path,
            rate,
        })
    }

    /// Withdraw a previously registered interest
    ///
    /// The merged rate is recomputed from the remaining interests; a lower
    /// rate takes effect at the next renewal. Removing the last interest
    /// marks the subscription for teardown.
    pub fn remove_interest(&self, handle: &SubscriptionHandle) -> RegistryResult<Removal> {
        let mut entry = self
            .subscriptions
            .get_mut(&handle.path)
            .ok_or(RegistryError::NotFound(handle.id))?;
        let subscription = entry.value_mut();

        if subscription.interests.remove(&handle.id).is_none() {
            return Err(RegistryError::NotFound(handle.id));
        }

        match subscription.merged_rate() {
            Some(rate) => {
                subscription.rate = rate;
                tracing::debug!(
                    "Removed {} from {}, merged rate now {}",
                    handle.id,
                    handle.path,
                    rate
                );
                Ok(Removal::Remaining {
                    interests: subscription.interests.len(),
                    rate,
                })
            }
            None => {
                subscription.torn_down = true;
                subscription.resend = false;
                self.live.fetch_sub(1, Ordering::AcqRel);
                tracing::debug!("Last interest in {} removed, tearing down", handle.path);
                Ok(Removal::TornDown)
            }
        }
    }

    // ========================================================================
    // Scheduler hooks
    // ========================================================================

    /// Subscriptions that need a send at `now`
    ///
    /// Subscriptions whose window already ran out carry the overdue time,
    /// reported once per gap.
    pub fn due(&self, now: Instant, margin: Duration) -> Vec<DueSubscription> {
        let mut due: Vec<_> = self
            .subscriptions
            .iter_mut()
            .filter_map(|mut entry| {
                let subscription = entry.value_mut();
                if !subscription.is_due(now, margin) {
                    return None;
                }

                let overdue = if subscription.requested_at.is_some()
                    && subscription.is_expired(now)
                    && !subscription.lapse_reported
                {
                    subscription.lapse_reported = true;
                    Some(now.saturating_duration_since(subscription.expires_at))
                } else {
                    None
                };

                Some(DueSubscription {
                    path: subscription.path,
                    rate: subscription.rate,
                    overdue,
                })
            })
            .collect();
        due.sort_by_key(|d| d.path);
        due
    }

    /// Record a successful send of `sent_rate` for a path
    ///
    /// Returns the updated subscription, or `None` if it was reaped meanwhile.
    pub fn mark_sent(
        &self,
        path: &ParameterPath,
        sent_rate: Rate,
        now: Instant,
        window: Duration,
    ) -> Option<Subscription> {
        let mut entry = self.subscriptions.get_mut(path)?;
        let subscription = entry.value_mut();

        subscription.requested_at = Some(now);
        subscription.expires_at = now + window;
        subscription.renewing = !subscription.torn_down;
        subscription.failures = 0;
        subscription.retry_at = None;
        subscription.renewals += 1;
        subscription.lapse_reported = false;
        // An interest may have raised the rate while the send was in flight
        subscription.resend = !subscription.torn_down && subscription.rate > sent_rate;

        Some(subscription.clone())
    }

    /// Record a failed send and schedule the retry
    ///
    /// Returns the consecutive failure count and the delay until the retry.
    pub fn mark_failed(
        &self,
        path: &ParameterPath,
        now: Instant,
        backoff: &Backoff,
    ) -> Option<(u32, Duration)> {
        let mut entry = self.subscriptions.get_mut(path)?;
        let subscription = entry.value_mut();

        subscription.renewing = false;
        subscription.failures = subscription.failures.saturating_add(1);
        let delay = backoff.delay(subscription.failures);
        subscription.retry_at = Some(now + delay);

        Some((subscription.failures, delay))
    }

    /// Remove and return every subscription with no interests left
    pub fn reap_torn_down(&self) -> Vec<Subscription> {
        let candidates: Vec<ParameterPath> = self
            .subscriptions
            .iter()
            .filter(|entry| entry.torn_down)
            .map(|entry| *entry.key())
            .collect();

        let mut reaped: Vec<_> = candidates
            .into_iter()
            .filter_map(|path| {
                self.subscriptions
                    .remove_if(&path, |_, subscription| subscription.torn_down)
                    .map(|(_, subscription)| subscription)
            })
            .collect();
        reaped.sort_by_key(|s| s.path);
        reaped
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Snapshot of a path's subscription, including one pending teardown
    pub fn get(&self, path: &ParameterPath) -> Option<Subscription> {
        self.subscriptions.get(path).map(|entry| entry.value().clone())
    }

    /// Current merged rate for a live subscription
    pub fn merged_rate(&self, path: &ParameterPath) -> Option<Rate> {
        self.subscriptions
            .get(path)
            .filter(|entry| !entry.torn_down)
            .map(|entry| entry.rate)
    }

    /// Snapshots of all live subscriptions, sorted by path
    pub fn active(&self) -> Vec<Subscription> {
        let mut active: Vec<_> = self
            .subscriptions
            .iter()
            .filter(|entry| !entry.torn_down)
            .map(|entry| entry.value().clone())
            .collect();
        active.sort_by_key(|s| s.path);
        active
    }

    /// Whether a path has a live subscription
    pub fn contains(&self, path: &ParameterPath) -> bool {
        self.merged_rate(path).is_some()
    }

    /// Number of live subscriptions
    pub fn len(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> RegistryStats {
        let mut stats = RegistryStats::default();
        let mut consumers = HashSet::new();
        for entry in self.subscriptions.iter() {
            if entry.torn_down {
                stats.torn_down += 1;
                continue;
            }
            stats.subscriptions += 1;
            stats.interests += entry.interests.len();
            consumers.extend(entry.interests.values().map(|interest| interest.consumer));
        }
        stats.consumers = consumers.len();
        stats
    }

    pub fn max_subscriptions(&self) -> usize {
        self.max_subscriptions
    }

    /// Claim room for one more live subscription, or fail when full
    fn reserve_slot(&self) -> RegistryResult<()> {
        self.live
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |live| {
                (live < self.max_subscriptions).then_some(live + 1)
            })
            .map(|_| ())
            .map_err(|_| RegistryError::RegistryFull {
                max_subscriptions: self.max_subscriptions,
            })
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new(256, Arc::new(SystemClock))
    }
}

impl fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("stats", &self.stats())
            .field("max_subscriptions", &self.max_subscriptions)
            .finish()
    }
}
