//! Configuration types for the xair-stream crate
//!
//! This module defines the settings that control how subscriptions are kept
//! alive, how send failures are retried, and how malformed updates are
//! handled.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

use xair_protocol::CONSOLE_PORT;

use crate::error::ConfigError;

/// Local port the console's replies are received on by default
pub const DEFAULT_LOCAL_PORT: u16 = 11111;

/// What to do when the last consumer of a path goes away
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TeardownPolicy {
    /// Stop renewing and let the console's window run out
    #[default]
    Lapse,
    /// Also send `/unsubscribe <path>` to the console
    ExplicitUnsubscribe,
}

/// What to do with a fader value the console sent outside `[0.0, 1.0]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FaultPolicy {
    /// Store the clamped value and report the fault
    #[default]
    Clamp,
    /// Discard the update and report the fault
    Drop,
}

/// Configuration for the subscription engine
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Address of the console
    /// Default: 192.168.1.1:10024
    pub console_addr: SocketAddr,

    /// Local UDP port to bind (0 picks an ephemeral port)
    /// Default: 11111
    pub local_port: u16,

    /// How long the console keeps a subscription alive without renewal
    /// Default: 10 seconds
    pub subscription_window: Duration,

    /// Fraction of the window after which a subscription is renewed
    /// Default: 0.8 (renew 8 seconds into a 10 second window)
    pub renewal_fraction: f64,

    /// How often the scheduler scans for due subscriptions
    /// Default: 250 milliseconds
    pub tick_interval: Duration,

    /// First retry delay after a failed send
    /// Default: 1 second
    pub retry_backoff_base: Duration,

    /// Upper bound on the retry delay
    /// Default: 30 seconds
    pub retry_backoff_max: Duration,

    /// Relative spread applied to each retry delay
    /// Default: 0.2 (±20%)
    pub retry_jitter: f64,

    /// Pause after a receive error before listening again
    /// Default: 100 milliseconds
    pub recv_error_pause: Duration,

    /// Teardown behaviour for paths nobody is interested in any more
    /// Default: Lapse
    pub teardown: TeardownPolicy,

    /// Handling of out-of-range fader values
    /// Default: Clamp
    pub fault_policy: FaultPolicy,

    /// Maximum number of distinct paths subscribed at once
    /// Default: 256
    pub max_subscriptions: usize,

    /// Buffer size for the sync event channel
    /// Default: 1000
    pub event_buffer_size: usize,

    /// Receive buffer size for one datagram
    /// Default: 4096 bytes
    pub recv_buffer_size: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            console_addr: SocketAddr::V4(SocketAddrV4::new(
                Ipv4Addr::new(192, 168, 1, 1),
                CONSOLE_PORT,
            )),
            local_port: DEFAULT_LOCAL_PORT,
            subscription_window: Duration::from_secs(10),
            renewal_fraction: 0.8,
            tick_interval: Duration::from_millis(250),
            retry_backoff_base: Duration::from_secs(1),
            retry_backoff_max: Duration::from_secs(30),
            retry_jitter: 0.2,
            recv_error_pause: Duration::from_millis(100),
            teardown: TeardownPolicy::Lapse,
            fault_policy: FaultPolicy::Clamp,
            max_subscriptions: 256,
            event_buffer_size: 1000,
            recv_buffer_size: 4096,
        }
    }
}

impl SyncConfig {
    /// Create a new SyncConfig with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a SyncConfig talking to the given console address
    pub fn for_console(console_addr: SocketAddr) -> Self {
        Self {
            console_addr,
            ..Default::default()
        }
    }

    /// Create a SyncConfig that renews early and retries quickly
    ///
    /// Suited to lossy networks where a single dropped renewal should not
    /// open a gap in updates.
    pub fn fast_renewal() -> Self {
        Self {
            renewal_fraction: 0.5,
            tick_interval: Duration::from_millis(100),
            retry_backoff_base: Duration::from_millis(250),
            retry_backoff_max: Duration::from_secs(5),
            ..Default::default()
        }
    }

    /// Time before expiry at which a subscription becomes due
    pub fn renewal_margin(&self) -> Duration {
        let renew_after = self
            .subscription_window
            .mul_f64(self.renewal_fraction.clamp(0.0, 1.0));
        self.subscription_window.saturating_sub(renew_after)
    }

    /// Validate the configuration and return any issues
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.subscription_window.is_zero() {
            return Err(ConfigError(
                "Subscription window must be greater than 0".to_string(),
            ));
        }

        if !(self.renewal_fraction > 0.0 && self.renewal_fraction < 1.0) {
            return Err(ConfigError(format!(
                "Renewal fraction {} must be between 0 and 1 (exclusive)",
                self.renewal_fraction
            )));
        }

        if self.tick_interval.is_zero() {
            return Err(ConfigError(
                "Tick interval must be greater than 0".to_string(),
            ));
        }

        if self.tick_interval >= self.renewal_margin() {
            return Err(ConfigError(format!(
                "Tick interval {:?} must be shorter than the renewal margin {:?}",
                self.tick_interval,
                self.renewal_margin()
            )));
        }

        if self.retry_backoff_base.is_zero() || self.retry_backoff_base > self.retry_backoff_max {
            return Err(ConfigError(
                "Invalid retry backoff: base must be positive and not exceed max".to_string(),
            ));
        }

        if !(0.0..1.0).contains(&self.retry_jitter) {
            return Err(ConfigError(format!(
                "Retry jitter {} must be in [0, 1)",
                self.retry_jitter
            )));
        }

        if self.max_subscriptions == 0 {
            return Err(ConfigError(
                "Max subscriptions must be greater than 0".to_string(),
            ));
        }

        if self.event_buffer_size == 0 {
            return Err(ConfigError(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        if self.recv_buffer_size < 64 {
            return Err(ConfigError(
                "Receive buffer size must be at least 64 bytes".to_string(),
            ));
        }

        Ok(())
    }

    /// Builder pattern methods for fluent configuration

    pub fn with_console_addr(mut self, addr: SocketAddr) -> Self {
        self.console_addr = addr;
        self
    }

    pub fn with_local_port(mut self, port: u16) -> Self {
        self.local_port = port;
        self
    }

    pub fn with_window(mut self, window: Duration) -> Self {
        self.subscription_window = window;
        self
    }

    pub fn with_renewal_fraction(mut self, fraction: f64) -> Self {
        self.renewal_fraction = fraction;
        self
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    pub fn with_retry_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.retry_backoff_base = base;
        self.retry_backoff_max = max;
        self
    }

    pub fn with_retry_jitter(mut self, jitter: f64) -> Self {
        self.retry_jitter = jitter;
        self
    }

    pub fn with_teardown(mut self, policy: TeardownPolicy) -> Self {
        self.teardown = policy;
        self
    }

    pub fn with_fault_policy(mut self, policy: FaultPolicy) -> Self {
        self.fault_policy = policy;
        self
    }

    pub fn with_max_subscriptions(mut self, max: usize) -> Self {
        self.max_subscriptions = max;
        self
    }

    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = size;
        self
    }
}
