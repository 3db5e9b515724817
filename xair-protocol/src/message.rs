//! OSC messages exchanged with the console
//!
//! Outbound traffic is modelled as [`Command`]s, inbound datagrams are
//! flattened into [`InboundMessage`]s. Packet encoding is delegated to `rosc`.

use rosc::{OscMessage, OscPacket, OscType};

use crate::codec;
use crate::error::MessageError;
use crate::path::ParameterPath;
use crate::rate::Rate;
use crate::value::{ParameterValue, WireValue};

/// Address of the subscribe command
pub const SUBSCRIBE_ADDRESS: &str = "/subscribe";

/// Address of the unsubscribe command
pub const UNSUBSCRIBE_ADDRESS: &str = "/unsubscribe";

/// A command sent to the console.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// `/subscribe ,si <path> <steps>` - stream `path` for one window
    Subscribe { path: ParameterPath, rate: Rate },
    /// `/unsubscribe ,s <path>` - stop streaming `path`
    Unsubscribe { path: ParameterPath },
    /// `<path> ,f|,i <value>` - change a parameter
    Set {
        path: ParameterPath,
        value: ParameterValue,
    },
    /// `<path>` with no arguments - ask for the current value once
    Query { path: ParameterPath },
}

impl Command {
    /// The parameter this command concerns
    pub fn path(&self) -> &ParameterPath {
        match self {
            Command::Subscribe { path, .. }
            | Command::Unsubscribe { path }
            | Command::Set { path, .. }
            | Command::Query { path } => path,
        }
    }

    /// Build the OSC message for this command
    pub fn to_osc(&self) -> OscMessage {
        match self {
            Command::Subscribe { path, rate } => OscMessage {
                addr: SUBSCRIBE_ADDRESS.to_string(),
                args: vec![
                    OscType::String(path.to_string()),
                    OscType::Int(rate.steps() as i32),
                ],
            },
            Command::Unsubscribe { path } => OscMessage {
                addr: UNSUBSCRIBE_ADDRESS.to_string(),
                args: vec![OscType::String(path.to_string())],
            },
            Command::Set { path, value } => OscMessage {
                addr: path.to_string(),
                args: vec![wire_to_osc(codec::encode(value))],
            },
            Command::Query { path } => OscMessage {
                addr: path.to_string(),
                args: Vec::new(),
            },
        }
    }

    /// Encode this command as a UDP datagram
    pub fn encode(&self) -> Result<Vec<u8>, MessageError> {
        rosc::encoder::encode(&OscPacket::Message(self.to_osc()))
            .map_err(|e| MessageError::Encode(format!("{e:?}")))
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Subscribe { path, rate } => {
                write!(f, "{SUBSCRIBE_ADDRESS} {path} {}", rate.steps())
            }
            Command::Unsubscribe { path } => write!(f, "{UNSUBSCRIBE_ADDRESS} {path}"),
            Command::Set { path, value } => match value {
                ParameterValue::Normalized(v) => write!(f, "{path} {v}"),
                ParameterValue::Boolean(on) => write!(f, "{path} {}", i32::from(*on)),
            },
            Command::Query { path } => write!(f, "{path}"),
        }
    }
}

/// A message received from the console, not yet validated.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    /// Raw OSC address
    pub address: String,
    /// Arguments in wire order
    pub args: Vec<WireValue>,
}

impl InboundMessage {
    /// Create an inbound message
    pub fn new(address: impl Into<String>, args: Vec<WireValue>) -> Self {
        Self {
            address: address.into(),
            args,
        }
    }

    /// Convert a decoded OSC message
    pub fn from_osc(message: OscMessage) -> Self {
        Self {
            address: message.addr,
            args: message.args.into_iter().map(osc_to_wire).collect(),
        }
    }
}

/// Decode a UDP datagram, flattening bundles into their messages
pub fn decode_datagram(bytes: &[u8]) -> Result<Vec<InboundMessage>, MessageError> {
    let (_, packet) =
        rosc::decoder::decode_udp(bytes).map_err(|e| MessageError::Decode(format!("{e:?}")))?;

    let mut messages = Vec::new();
    flatten(packet, &mut messages);
    Ok(messages)
}

fn flatten(packet: OscPacket, out: &mut Vec<InboundMessage>) {
    match packet {
        OscPacket::Message(message) => out.push(InboundMessage::from_osc(message)),
        OscPacket::Bundle(bundle) => {
            for inner in bundle.content {
                flatten(inner, out);
            }
        }
    }
}

fn osc_to_wire(arg: OscType) -> WireValue {
    match arg {
        OscType::Float(v) => WireValue::Float(v),
        OscType::Int(v) => WireValue::Int(v),
        OscType::Double(v) => WireValue::Float(v as f32),
        OscType::Long(v) => i32::try_from(v)
            .map(WireValue::Int)
            .unwrap_or(WireValue::Unsupported("long")),
        OscType::Bool(v) => WireValue::Int(i32::from(v)),
        OscType::String(v) => WireValue::Text(v),
        OscType::Blob(_) => WireValue::Unsupported("blob"),
        OscType::Nil => WireValue::Unsupported("nil"),
        OscType::Inf => WireValue::Unsupported("inf"),
        _ => WireValue::Unsupported("other"),
    }
}

fn wire_to_osc(value: WireValue) -> OscType {
    match value {
        WireValue::Float(v) => OscType::Float(v),
        WireValue::Int(v) => OscType::Int(v),
        WireValue::Text(v) => OscType::String(v),
        WireValue::Unsupported(_) => OscType::Nil,
    }
}
