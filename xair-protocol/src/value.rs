//! Typed parameter values and raw wire arguments

use serde::{Deserialize, Serialize};

use crate::codec;
use crate::path::ValueDomain;

/// A decoded parameter value.
///
/// Engineering units are derived on demand: [`ParameterValue::approx_db`]
/// maps a fader position onto the console's dB scale, it is never stored.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ParameterValue {
    /// Fader position in `[0.0, 1.0]`
    Normalized(f32),
    /// On/off state; `true` mirrors wire `1` (channel on, not muted)
    Boolean(bool),
}

impl ParameterValue {
    /// Build a normalized value, clamping into `[0.0, 1.0]`
    pub fn normalized(value: f32) -> Self {
        if value.is_nan() {
            return ParameterValue::Normalized(0.0);
        }
        ParameterValue::Normalized(value.clamp(0.0, 1.0))
    }

    /// The fader position, if this is a normalized value
    pub fn as_normalized(&self) -> Option<f32> {
        match self {
            ParameterValue::Normalized(v) => Some(*v),
            ParameterValue::Boolean(_) => None,
        }
    }

    /// The on/off state, if this is a boolean value
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParameterValue::Boolean(b) => Some(*b),
            ParameterValue::Normalized(_) => None,
        }
    }

    /// Approximate level in dB for fader values
    pub fn approx_db(&self) -> Option<f32> {
        self.as_normalized().map(codec::approx_db)
    }

    /// The wire domain this value belongs to
    pub fn domain(&self) -> ValueDomain {
        match self {
            ParameterValue::Normalized(_) => ValueDomain::Fader,
            ParameterValue::Boolean(_) => ValueDomain::OnOff,
        }
    }
}

/// A single OSC argument as received from or sent to the console.
#[derive(Debug, Clone, PartialEq)]
pub enum WireValue {
    /// 32-bit float (`f`)
    Float(f32),
    /// 32-bit integer (`i`)
    Int(i32),
    /// String (`s`)
    Text(String),
    /// Any other OSC type, by tag name
    Unsupported(&'static str),
}

impl WireValue {
    /// Short type name used in diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            WireValue::Float(_) => "float",
            WireValue::Int(_) => "int",
            WireValue::Text(_) => "string",
            WireValue::Unsupported(name) => name,
        }
    }
}

impl From<f32> for WireValue {
    fn from(value: f32) -> Self {
        WireValue::Float(value)
    }
}

impl From<i32> for WireValue {
    fn from(value: i32) -> Self {
        WireValue::Int(value)
    }
}
