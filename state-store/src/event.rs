//! Accepted updates
//!
//! Every value written to the store produces an [`Update`], whether or not
//! the value differs from the one already stored. Listeners can tell a value
//! change from a liveness refresh via [`Update::changed`].

use std::time::Instant;

use xair_protocol::{ParameterPath, ParameterValue};

/// An update accepted by the store
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    /// The parameter that was written
    pub path: ParameterPath,

    /// The value now stored
    pub value: ParameterValue,

    /// The value stored before this write, if any
    pub previous: Option<ParameterValue>,

    /// Whether `value` differs from `previous`
    pub changed: bool,

    /// When the update was received
    pub received_at: Instant,
}

impl Update {
    /// Create an update, deriving `changed` from the previous value
    pub fn new(
        path: ParameterPath,
        value: ParameterValue,
        previous: Option<ParameterValue>,
        received_at: Instant,
    ) -> Self {
        Self {
            path,
            value,
            previous,
            changed: previous != Some(value),
            received_at,
        }
    }

    /// Whether this write only refreshed liveness
    pub fn is_refresh(&self) -> bool {
        !self.changed
    }
}
