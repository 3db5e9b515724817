//! Subscription rates
//!
//! The console accepts subscription rates in steps of 0.5 Hz. Rates are kept
//! as integer step counts so comparisons and merges never drift; conversion
//! to and from Hz only happens at the API boundary.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::InvalidRateError;

/// Hz represented by one rate step
pub const HZ_PER_STEP: f64 = 0.5;

/// Slowest supported rate, in steps
pub const MIN_STEPS: u32 = 1;

/// Fastest supported rate, in steps (20 Hz)
pub const MAX_STEPS: u32 = 40;

/// A subscription rate quantized to 0.5 Hz steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Rate(u32);

impl Rate {
    /// Quantize a rate in Hz to the nearest supported step
    ///
    /// Rejects non-positive and non-finite input. Positive rates below one
    /// step round up to the slowest rate; rates above 20 Hz are capped.
    pub fn from_hz(hz: f64) -> Result<Self, InvalidRateError> {
        if !hz.is_finite() || hz <= 0.0 {
            return Err(InvalidRateError(hz));
        }
        let steps = (hz / HZ_PER_STEP).round();
        Ok(Self::from_steps(steps.min(MAX_STEPS as f64) as u32))
    }

    /// Build a rate from a step count, clamped to the supported range
    pub fn from_steps(steps: u32) -> Self {
        Self(steps.clamp(MIN_STEPS, MAX_STEPS))
    }

    /// The step count sent on the wire
    pub fn steps(self) -> u32 {
        self.0
    }

    /// The rate in Hz
    pub fn as_hz(self) -> f64 {
        self.0 as f64 * HZ_PER_STEP
    }

    /// Time between consecutive updates at this rate
    pub fn period(self) -> Duration {
        Duration::from_secs_f64(1.0 / self.as_hz())
    }
}

impl Default for Rate {
    /// 1 Hz
    fn default() -> Self {
        Self(2)
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} Hz", self.as_hz())
    }
}
