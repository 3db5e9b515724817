//! Parameter addresses
//!
//! A [`ParameterPath`] identifies a single console parameter. Paths are
//! validated on construction and always render to their canonical form, so
//! `parse(format(p)) == p` and `format(parse(s)) == s` for every valid `s`.
//!
//! Recognized templates:
//!
//! | Template              | Kind                          |
//! |-----------------------|-------------------------------|
//! | `/ch/<NN>/mix/fader`  | [`ParameterKind::ChannelFader`] |
//! | `/ch/<NN>/mix/on`     | [`ParameterKind::ChannelMute`]  |
//! | `/lr/mix/fader`       | [`ParameterKind::MainFader`]    |
//! | `/lr/mix/on`          | [`ParameterKind::MainMute`]     |
//!
//! `NN` is exactly two digits, zero padded, `01` through `18`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::InvalidPathError;

/// Lowest input channel number
pub const MIN_CHANNEL: u8 = 1;

/// Highest input channel number
pub const MAX_CHANNEL: u8 = 18;

/// An input channel number in `1..=18`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelIndex(u8);

impl ChannelIndex {
    /// Create a channel index, rejecting numbers outside `1..=18`
    pub fn new(channel: u8) -> Option<Self> {
        (MIN_CHANNEL..=MAX_CHANNEL)
            .contains(&channel)
            .then_some(Self(channel))
    }

    /// Get the channel number
    pub fn get(self) -> u8 {
        self.0
    }

    /// Parse the two-digit channel segment of a path
    fn parse_segment(path: &str, segment: &str) -> Result<Self, InvalidPathError> {
        let invalid = || InvalidPathError::InvalidChannel {
            path: path.to_string(),
            index: segment.to_string(),
        };

        let bytes = segment.as_bytes();
        if bytes.len() != 2 || !bytes.iter().all(u8::is_ascii_digit) {
            return Err(invalid());
        }

        let number = (bytes[0] - b'0') * 10 + (bytes[1] - b'0');
        Self::new(number).ok_or_else(invalid)
    }

    /// Iterate over every channel
    pub fn all() -> impl Iterator<Item = ChannelIndex> {
        (MIN_CHANNEL..=MAX_CHANNEL).map(ChannelIndex)
    }
}

impl fmt::Display for ChannelIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}", self.0)
    }
}

/// Value domain carried by a parameter on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueDomain {
    /// Float in `[0.0, 1.0]`
    Fader,
    /// Integer `0` or `1`
    OnOff,
}

/// The kinds of parameter this crate understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum ParameterKind {
    /// Input channel fader level
    ChannelFader,
    /// Input channel on/mute state
    ChannelMute,
    /// Main L/R bus fader level
    MainFader,
    /// Main L/R bus on/mute state
    MainMute,
}

impl ParameterKind {
    /// Every known kind
    pub const ALL: [ParameterKind; 4] = [
        ParameterKind::ChannelFader,
        ParameterKind::ChannelMute,
        ParameterKind::MainFader,
        ParameterKind::MainMute,
    ];

    /// Whether paths of this kind carry a channel index
    pub fn is_channel_scoped(self) -> bool {
        matches!(self, ParameterKind::ChannelFader | ParameterKind::ChannelMute)
    }

    /// The wire value domain for this kind
    pub fn domain(self) -> ValueDomain {
        match self {
            ParameterKind::ChannelFader | ParameterKind::MainFader => ValueDomain::Fader,
            ParameterKind::ChannelMute | ParameterKind::MainMute => ValueDomain::OnOff,
        }
    }

    fn leaf(self) -> &'static str {
        match self.domain() {
            ValueDomain::Fader => "fader",
            ValueDomain::OnOff => "on",
        }
    }
}

impl fmt::Display for ParameterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ParameterKind::ChannelFader => "channel fader",
            ParameterKind::ChannelMute => "channel mute",
            ParameterKind::MainFader => "main fader",
            ParameterKind::MainMute => "main mute",
        };
        f.write_str(name)
    }
}

/// A validated console parameter address.
///
/// Immutable once built. Equality and hashing follow the canonical string
/// form, which is fully determined by the kind and channel.
///
/// # Example
///
/// ```rust
/// use xair_protocol::{ParameterKind, ParameterPath};
///
/// let path = ParameterPath::parse("/ch/03/mix/on").unwrap();
/// assert_eq!(path.kind(), ParameterKind::ChannelMute);
/// assert_eq!(path.channel().map(|c| c.get()), Some(3));
///
/// assert!(ParameterPath::parse("/ch/3/mix/on").is_err());
/// assert!(ParameterPath::parse("/ch/19/mix/on").is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ParameterPath {
    kind: ParameterKind,
    channel: Option<ChannelIndex>,
}

impl ParameterPath {
    /// Parse and validate a raw path string
    pub fn parse(raw: &str) -> Result<Self, InvalidPathError> {
        let unknown = || InvalidPathError::UnknownTemplate(raw.to_string());

        let rest = raw.strip_prefix('/').ok_or_else(unknown)?;
        let segments: Vec<&str> = rest.split('/').collect();

        match segments.as_slice() {
            ["ch", index, "mix", leaf] => {
                let kind = match *leaf {
                    "fader" => ParameterKind::ChannelFader,
                    "on" => ParameterKind::ChannelMute,
                    _ => return Err(unknown()),
                };
                let channel = ChannelIndex::parse_segment(raw, index)?;
                Ok(Self {
                    kind,
                    channel: Some(channel),
                })
            }
            ["lr", "mix", "fader"] => Ok(Self::main_fader()),
            ["lr", "mix", "on"] => Ok(Self::main_mute()),
            _ => Err(unknown()),
        }
    }

    /// Build a path from structured fields
    ///
    /// Channel-scoped kinds require a channel in `1..=18`; other kinds must
    /// not be given one.
    pub fn new(kind: ParameterKind, channel: Option<u8>) -> Result<Self, InvalidPathError> {
        match (kind.is_channel_scoped(), channel) {
            (true, Some(number)) => {
                let channel = ChannelIndex::new(number).ok_or_else(|| {
                    InvalidPathError::InvalidChannel {
                        path: format!("/ch/{number:02}/mix/{}", kind.leaf()),
                        index: number.to_string(),
                    }
                })?;
                Ok(Self {
                    kind,
                    channel: Some(channel),
                })
            }
            (true, None) => Err(InvalidPathError::ScopeMismatch {
                kind,
                reason: "requires a channel index",
            }),
            (false, Some(_)) => Err(InvalidPathError::ScopeMismatch {
                kind,
                reason: "does not take a channel index",
            }),
            (false, None) => Ok(Self {
                kind,
                channel: None,
            }),
        }
    }

    /// `/ch/<NN>/mix/fader`
    pub fn channel_fader(channel: u8) -> Result<Self, InvalidPathError> {
        Self::new(ParameterKind::ChannelFader, Some(channel))
    }

    /// `/ch/<NN>/mix/on`
    pub fn channel_mute(channel: u8) -> Result<Self, InvalidPathError> {
        Self::new(ParameterKind::ChannelMute, Some(channel))
    }

    /// `/lr/mix/fader`
    pub fn main_fader() -> Self {
        Self {
            kind: ParameterKind::MainFader,
            channel: None,
        }
    }

    /// `/lr/mix/on`
    pub fn main_mute() -> Self {
        Self {
            kind: ParameterKind::MainMute,
            channel: None,
        }
    }

    /// The parameter kind
    pub fn kind(&self) -> ParameterKind {
        self.kind
    }

    /// The channel index, for channel-scoped kinds
    pub fn channel(&self) -> Option<ChannelIndex> {
        self.channel
    }

    /// Render the canonical string form
    pub fn format(&self) -> String {
        self.to_string()
    }

    /// Every path in the vocabulary
    pub fn all() -> Vec<ParameterPath> {
        let mut paths = Vec::with_capacity(2 * MAX_CHANNEL as usize + 2);
        for channel in ChannelIndex::all() {
            for kind in [ParameterKind::ChannelFader, ParameterKind::ChannelMute] {
                paths.push(Self {
                    kind,
                    channel: Some(channel),
                });
            }
        }
        paths.push(Self::main_fader());
        paths.push(Self::main_mute());
        paths
    }
}

impl fmt::Display for ParameterPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.channel {
            Some(channel) => write!(f, "/ch/{}/mix/{}", channel, self.kind.leaf()),
            None => write!(f, "/lr/mix/{}", self.kind.leaf()),
        }
    }
}

impl FromStr for ParameterPath {
    type Err = InvalidPathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<&str> for ParameterPath {
    type Error = InvalidPathError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl TryFrom<String> for ParameterPath {
    type Error = InvalidPathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ParameterPath> for String {
    fn from(path: ParameterPath) -> Self {
        path.to_string()
    }
}
