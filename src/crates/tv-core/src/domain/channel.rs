//! Channel and tuning value types.
//!
//! A channel is either an analog channel number or a digital major/minor
//! pair.  The textual boundary form accepted from clients is a bare
//! non-negative integer for analog (`"7"`) and `major.minor` for digital
//! (`"7.1"`).  [`Display`] renders the same forms, so the string
//! representation round-trips.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error produced when a channel string cannot be parsed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChannelParseError {
    /// The input was empty.
    #[error("empty channel string")]
    Empty,
    /// The input was not a bare integer or a `major.minor` pair.
    #[error("malformed channel {0:?}")]
    Malformed(String),
}

/// A broadcast channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Channel {
    /// Analog channel number.
    Analog(u32),
    /// Digital channel, addressed as a major/minor pair.
    Digital { major: u32, minor: u32 },
}

impl FromStr for Channel {
    type Err = ChannelParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ChannelParseError::Empty);
        }
        let malformed = || ChannelParseError::Malformed(s.to_string());
        match s.split_once('.') {
            None => s.parse::<u32>().map(Channel::Analog).map_err(|_| malformed()),
            Some((major, minor)) => {
                let major = major.parse::<u32>().map_err(|_| malformed())?;
                let minor = minor.parse::<u32>().map_err(|_| malformed())?;
                Ok(Channel::Digital { major, minor })
            }
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Analog(n) => write!(f, "{n}"),
            Channel::Digital { major, minor } => write!(f, "{major}.{minor}"),
        }
    }
}

impl TryFrom<String> for Channel {
    type Error = ChannelParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Channel> for String {
    fn from(c: Channel) -> String {
        c.to_string()
    }
}

/// Antenna selector.  Some devices require digital channels to be tied to a
/// specific antenna input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Antenna(pub u8);

/// A tuning request: which antenna, which channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tune {
    pub antenna: Antenna,
    pub channel: Channel,
}

impl Tune {
    pub fn new(antenna: Antenna, channel: Channel) -> Self {
        Self { antenna, channel }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_integer_is_analog() {
        assert_eq!("7".parse(), Ok(Channel::Analog(7)));
    }

    #[test]
    fn test_parse_dotted_pair_is_digital() {
        assert_eq!("7.1".parse(), Ok(Channel::Digital { major: 7, minor: 1 }));
    }

    #[test]
    fn test_parse_empty_string_is_error() {
        assert_eq!("".parse::<Channel>(), Err(ChannelParseError::Empty));
    }

    #[test]
    fn test_parse_three_components_is_error() {
        assert_eq!(
            "7.1.2".parse::<Channel>(),
            Err(ChannelParseError::Malformed("7.1.2".to_string()))
        );
    }

    #[test]
    fn test_parse_non_numeric_pair_is_error() {
        assert_eq!(
            "a.b".parse::<Channel>(),
            Err(ChannelParseError::Malformed("a.b".to_string()))
        );
    }

    #[test]
    fn test_parse_negative_is_error() {
        assert!("-3".parse::<Channel>().is_err());
    }

    #[test]
    fn test_display_round_trips_analog_and_digital() {
        for s in ["42", "7.1", "0.0"] {
            let ch: Channel = s.parse().unwrap();
            assert_eq!(ch.to_string(), s);
        }
    }
}
