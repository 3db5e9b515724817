//! # xair-protocol
//!
//! Parameter vocabulary and wire codec for X-Air style mixing consoles.
//!
//! The console exposes its parameters as OSC addresses such as
//! `/ch/01/mix/fader` or `/lr/mix/on`. This crate provides:
//!
//! - [`ParameterPath`]: validated, canonical parameter addresses
//! - [`ParameterValue`]: typed values (normalized fader positions, on/off states)
//! - [`codec`]: conversion between wire arguments and typed values, including
//!   the fader dB law
//! - [`Rate`]: subscription rates quantized to the console's 0.5 Hz steps
//! - [`Command`] / [`InboundMessage`]: OSC messages exchanged with the console
//!
//! ## Usage
//!
//! ```rust
//! use xair_protocol::{codec, ParameterPath, ParameterValue};
//!
//! let path: ParameterPath = "/ch/07/mix/fader".parse().unwrap();
//! assert_eq!(path.to_string(), "/ch/07/mix/fader");
//!
//! let value = ParameterValue::normalized(0.75);
//! assert_eq!(value.approx_db(), Some(0.0));
//! assert_eq!(codec::db_to_normalized(0.0), 0.75);
//! ```

pub mod codec;
pub mod error;
pub mod message;
pub mod path;
pub mod rate;
pub mod value;

pub use codec::Decoded;
pub use error::{DecodeFault, InvalidPathError, InvalidRateError, MessageError};
pub use message::{Command, InboundMessage};
pub use path::{ChannelIndex, ParameterKind, ParameterPath, ValueDomain};
pub use rate::Rate;
pub use value::{ParameterValue, WireValue};

/// UDP port the console listens on for OSC
pub const CONSOLE_PORT: u16 = 10024;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        Command, Decoded, DecodeFault, InboundMessage, InvalidPathError, ParameterKind,
        ParameterPath, ParameterValue, Rate, WireValue,
    };
}
