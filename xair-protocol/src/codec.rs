//! Conversion between wire arguments and typed values
//!
//! Decoding never fails hard: out-of-range and NaN fader values are clamped
//! and flagged, anything else outside its domain is rejected with a
//! [`DecodeFault`] so the caller can drop the update and report it.

use crate::error::DecodeFault;
use crate::path::{ParameterKind, ValueDomain};
use crate::value::{ParameterValue, WireValue};

/// Outcome of decoding one wire argument.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// Value was inside its domain
    Clean(ParameterValue),
    /// Value was outside its domain and has been corrected
    Clamped(ParameterValue, DecodeFault),
    /// Value could not be interpreted
    Rejected(DecodeFault),
}

impl Decoded {
    /// The usable value, if any
    pub fn value(&self) -> Option<ParameterValue> {
        match self {
            Decoded::Clean(v) | Decoded::Clamped(v, _) => Some(*v),
            Decoded::Rejected(_) => None,
        }
    }

    /// The fault raised while decoding, if any
    pub fn fault(&self) -> Option<&DecodeFault> {
        match self {
            Decoded::Clean(_) => None,
            Decoded::Clamped(_, fault) | Decoded::Rejected(fault) => Some(fault),
        }
    }
}

/// Decode a fader float, clamping into `[0.0, 1.0]`
///
/// NaN is treated as `0.0` and flagged like any other out-of-range value.
pub fn decode_fader(wire: f32) -> Decoded {
    if wire.is_nan() {
        return Decoded::Clamped(ParameterValue::Normalized(0.0), DecodeFault::NotANumber);
    }

    let clamped = wire.clamp(0.0, 1.0);
    if clamped == wire {
        Decoded::Clean(ParameterValue::Normalized(wire))
    } else {
        Decoded::Clamped(
            ParameterValue::Normalized(clamped),
            DecodeFault::OutOfRange {
                value: wire,
                clamped,
            },
        )
    }
}

/// Decode an on/off integer; only `0` and `1` are valid
pub fn decode_mute(wire: i32) -> Result<ParameterValue, DecodeFault> {
    match wire {
        0 => Ok(ParameterValue::Boolean(false)),
        1 => Ok(ParameterValue::Boolean(true)),
        other => Err(DecodeFault::InvalidBoolean(other)),
    }
}

/// Decode a wire argument for the given parameter kind
///
/// Fader kinds also accept integers (the console never sends them, but OSC
/// tools do); on/off kinds accept floats that are exactly `0.0` or `1.0`.
pub fn decode(kind: ParameterKind, wire: &WireValue) -> Decoded {
    match (kind.domain(), wire) {
        (ValueDomain::Fader, WireValue::Float(v)) => decode_fader(*v),
        (ValueDomain::Fader, WireValue::Int(v)) => decode_fader(*v as f32),
        (ValueDomain::OnOff, WireValue::Int(v)) => match decode_mute(*v) {
            Ok(value) => Decoded::Clean(value),
            Err(fault) => Decoded::Rejected(fault),
        },
        (ValueDomain::OnOff, WireValue::Float(v)) if *v == 0.0 || *v == 1.0 => {
            Decoded::Clean(ParameterValue::Boolean(*v == 1.0))
        }
        (ValueDomain::OnOff, WireValue::Float(v)) => {
            Decoded::Rejected(DecodeFault::InvalidBoolean(v.round() as i32))
        }
        (_, other) => Decoded::Rejected(DecodeFault::UnexpectedType {
            kind,
            found: other.type_name(),
        }),
    }
}

/// Decode the first argument of a message, if there is one
pub fn decode_args(kind: ParameterKind, args: &[WireValue]) -> Decoded {
    match args.first() {
        Some(wire) => decode(kind, wire),
        None => Decoded::Rejected(DecodeFault::MissingArgument),
    }
}

/// Encode a typed value as its wire argument
pub fn encode(value: &ParameterValue) -> WireValue {
    match value {
        ParameterValue::Normalized(v) => WireValue::Float(v.clamp(0.0, 1.0)),
        ParameterValue::Boolean(on) => WireValue::Int(i32::from(*on)),
    }
}

/// Approximate level in dB for a normalized fader position
///
/// Follows the console's four-segment linear fader law:
///
/// | position        | dB             |
/// |-----------------|----------------|
/// | `0.5 ..= 1.0`   | `-10 ..= +10`  |
/// | `0.25 .. 0.5`   | `-30 .. -10`   |
/// | `0.0625 .. 0.25`| `-60 .. -30`   |
/// | `0 .. 0.0625`   | `-90 .. -60`   |
///
/// `0.75` maps to exactly `0.0` dB and `0.0` maps to negative infinity. The
/// mapping is monotonic; it is for display only.
pub fn approx_db(normalized: f32) -> f32 {
    let f = if normalized.is_nan() {
        0.0
    } else {
        normalized.clamp(0.0, 1.0)
    };

    if f >= 0.5 {
        f * 40.0 - 30.0
    } else if f >= 0.25 {
        f * 80.0 - 50.0
    } else if f >= 0.0625 {
        f * 160.0 - 70.0
    } else if f > 0.0 {
        f * 480.0 - 90.0
    } else {
        f32::NEG_INFINITY
    }
}

/// Inverse of [`approx_db`], for outbound set operations
pub fn db_to_normalized(db: f32) -> f32 {
    if db.is_nan() || db <= -90.0 {
        return 0.0;
    }

    let f = if db >= -10.0 {
        (db + 30.0) / 40.0
    } else if db >= -30.0 {
        (db + 50.0) / 80.0
    } else if db >= -60.0 {
        (db + 70.0) / 160.0
    } else {
        (db + 90.0) / 480.0
    };
    f.clamp(0.0, 1.0)
}
