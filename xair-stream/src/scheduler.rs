//! Subscription renewal
//!
//! The console forgets a subscription once its window runs out. The
//! [`RenewalScheduler`] resends `/subscribe` for every live path before that
//! happens, retries failed sends with backoff, and lets go of paths nobody
//! wants any more.
//!
//! # Tick
//!
//! Each tick, in order:
//! 1. Reap torn-down subscriptions: end their store lease and, depending on
//!    [`TeardownPolicy`], send `/unsubscribe`
//! 2. Report subscriptions whose window already ran out
//! 3. Send `/subscribe` for every due subscription and publish the new lease
//!    to the store, or schedule a retry on failure

use std::sync::Arc;
use std::time::{Duration, Instant};

use state_store::{Clock, CurrentValueStore, Lease};
use tokio::sync::{broadcast, watch, Mutex};
use tokio::time::{interval, MissedTickBehavior};
use xair_protocol::Command;

use crate::backoff::Backoff;
use crate::config::{SyncConfig, TeardownPolicy};
use crate::event::SyncEvent;
use crate::registry::{DueSubscription, Subscription, SubscriptionRegistry};
use crate::transport::Transport;

/// Summary of one scheduler tick
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Subscribe commands sent successfully
    pub renewed: usize,
    /// Sends that failed and were scheduled for retry
    pub failed: usize,
    /// Subscriptions that ran out before renewal
    pub lapsed: usize,
    /// Subscriptions removed for lack of consumers
    pub torn_down: usize,
}

impl TickReport {
    pub fn is_idle(&self) -> bool {
        *self == TickReport::default()
    }
}

/// Keeps console subscriptions alive
pub struct RenewalScheduler {
    registry: Arc<SubscriptionRegistry>,
    store: CurrentValueStore,
    transport: Arc<dyn Transport>,
    events: broadcast::Sender<SyncEvent>,
    backoff: Backoff,
    window: Duration,
    margin: Duration,
    tick_interval: Duration,
    teardown_policy: TeardownPolicy,
    tick_lock: Mutex<()>,
}

impl RenewalScheduler {
    pub fn new(
        registry: Arc<SubscriptionRegistry>,
        store: CurrentValueStore,
        transport: Arc<dyn Transport>,
        events: broadcast::Sender<SyncEvent>,
        config: &SyncConfig,
    ) -> Self {
        Self {
            registry,
            store,
            transport,
            events,
            backoff: Backoff::from_config(config),
            window: config.subscription_window,
            margin: config.renewal_margin(),
            tick_interval: config.tick_interval,
            teardown_policy: config.teardown,
            tick_lock: Mutex::new(()),
        }
    }

    /// Run one tick at the store clock's current time
    pub async fn tick(&self) -> TickReport {
        let now = self.store.clock().now();
        self.tick_at(now).await
    }

    /// Run one tick as of `now`
    ///
    /// Concurrent calls are serialized.
    pub async fn tick_at(&self, now: Instant) -> TickReport {
        let _guard = self.tick_lock.lock().await;
        let mut report = TickReport::default();

        for subscription in self.registry.reap_torn_down() {
            self.teardown(subscription).await;
            report.torn_down += 1;
        }

        for due in self.registry.due(now, self.margin) {
            if let Some(overdue) = due.overdue {
                tracing::warn!(
                    "Subscription for {} lapsed {:?} ago, updates may have been missed",
                    due.path,
                    overdue
                );
                let _ = self.events.send(SyncEvent::SubscriptionLapsed {
                    path: due.path,
                    overdue,
                });
                report.lapsed += 1;
            }

            if self.renew(due, now).await {
                report.renewed += 1;
            } else {
                report.failed += 1;
            }
        }

        if !report.is_idle() {
            tracing::trace!("Scheduler tick: {:?}", report);
        }
        report
    }

    /// Tick on an interval until shutdown is signalled
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::debug!("Renewal scheduler started (tick every {:?})", self.tick_interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await;
                }
                _ = shutdown.changed() => {
                    break;
                }
            }
        }

        tracing::debug!("Renewal scheduler stopped");
    }

    async fn renew(&self, due: DueSubscription, now: Instant) -> bool {
        let command = Command::Subscribe {
            path: due.path,
            rate: due.rate,
        };

        match self.transport.send(&command).await {
            Ok(()) => {
                let Some(subscription) =
                    self.registry
                        .mark_sent(&due.path, due.rate, now, self.window)
                else {
                    return true;
                };

                self.store.set_lease(
                    due.path,
                    Lease {
                        rate: due.rate,
                        expires_at: subscription.expires_at,
                        renewing: subscription.renewing,
                    },
                );

                tracing::debug!(
                    "Renewed {} at {} until +{:?}",
                    due.path,
                    due.rate,
                    self.window
                );
                let _ = self.events.send(SyncEvent::SubscriptionRenewed {
                    path: due.path,
                    rate: due.rate,
                    expires_at: subscription.expires_at,
                });
                true
            }
            Err(e) => {
                let Some((attempt, retry_in)) =
                    self.registry.mark_failed(&due.path, now, &self.backoff)
                else {
                    return false;
                };

                if let Some(mut lease) = self.store.lease(&due.path) {
                    lease.renewing = false;
                    self.store.set_lease(due.path, lease);
                }

                tracing::warn!(
                    "Failed to send {} (attempt {}): {}, retrying in {:?}",
                    command,
                    attempt,
                    e,
                    retry_in
                );
                let _ = self.events.send(SyncEvent::TransportSendFailure {
                    path: due.path,
                    error: e.to_string(),
                    attempt,
                    retry_in,
                });
                false
            }
        }
    }

    async fn teardown(&self, subscription: Subscription) {
        let path = subscription.path;
        self.store.end_lease(&path);

        match self.teardown_policy {
            TeardownPolicy::Lapse => {
                tracing::debug!("Letting subscription for {} lapse", path);
            }
            TeardownPolicy::ExplicitUnsubscribe => {
                // Best effort: the console drops the path at window end anyway
                if let Err(e) = self.transport.send(&Command::Unsubscribe { path }).await {
                    tracing::warn!("Failed to unsubscribe {}: {}", path, e);
                } else {
                    tracing::debug!("Unsubscribed {}", path);
                }
            }
        }

        let _ = self.events.send(SyncEvent::SubscriptionTornDown { path });
    }
}

impl std::fmt::Debug for RenewalScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenewalScheduler")
            .field("window", &self.window)
            .field("margin", &self.margin)
            .field("tick_interval", &self.tick_interval)
            .field("teardown_policy", &self.teardown_policy)
            .finish()
    }
}
