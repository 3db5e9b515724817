//! Error types for the xair-protocol crate.

use crate::path::ParameterKind;

/// A parameter address that does not match any known template.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidPathError {
    /// The path does not match any recognized template
    #[error("Unrecognized parameter path: {0}")]
    UnknownTemplate(String),

    /// The channel segment is malformed or out of range
    #[error("Invalid channel index '{index}' in {path}: expected two digits 01-18")]
    InvalidChannel {
        /// The full path being parsed
        path: String,
        /// The offending channel segment
        index: String,
    },

    /// A channel index was given for a kind that has none, or vice versa
    #[error("Parameter kind {kind} {reason}")]
    ScopeMismatch {
        /// The kind being constructed
        kind: ParameterKind,
        /// What was wrong
        reason: &'static str,
    },
}

/// A wire value outside the domain declared for its parameter.
///
/// Faults are recoverable: out-of-range fader values are clamped, everything
/// else is discarded.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeFault {
    /// Fader value outside `[0.0, 1.0]`
    #[error("Fader value {value} outside [0.0, 1.0], clamped to {clamped}")]
    OutOfRange {
        /// The value received
        value: f32,
        /// The value after clamping
        clamped: f32,
    },

    /// Fader value is not a number; treated as `0.0`
    #[error("Fader value is NaN, treated as 0.0")]
    NotANumber,

    /// On/off value other than 0 or 1
    #[error("Invalid on/off value {0}: expected 0 or 1")]
    InvalidBoolean(i32),

    /// Argument type does not match the parameter kind
    #[error("Unexpected {found} argument for {kind}")]
    UnexpectedType {
        /// The parameter kind being decoded
        kind: ParameterKind,
        /// Type tag of the argument received
        found: &'static str,
    },

    /// The message carried no value argument
    #[error("Missing value argument")]
    MissingArgument,
}

/// Rejected subscription rate.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
#[error("Invalid subscription rate {0} Hz: must be a positive, finite number")]
pub struct InvalidRateError(pub f64);

/// Errors encoding or decoding OSC packets.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MessageError {
    /// Failed to encode an outbound packet
    #[error("Failed to encode OSC packet: {0}")]
    Encode(String),

    /// Failed to decode an inbound datagram
    #[error("Failed to decode OSC packet: {0}")]
    Decode(String),
}
