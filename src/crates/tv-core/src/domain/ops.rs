//! The model-agnostic operation vocabulary.
//!
//! Clients describe what they want done to a television as an [`Op`]: an
//! attribute (which knob), an operator (how the knob is acted on), and a
//! typed value.  Drivers translate an `Op` into their vendor's wire format
//! or reject the combination as unsupported.
//!
//! The value payload is a tagged [`Value`] enum rather than an opaque blob,
//! so a driver's support table is an exhaustive `match` and an ill-typed
//! payload cannot reach the codec.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::channel::{Channel, Tune};

// ── Attributes ────────────────────────────────────────────────────────────────

/// A controllable knob on a television.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Attribute {
    Power,
    Volume,
    Mute,
    Osd,
    Input,
    Tuning,
    Screen,
    Contrast,
    Brightness,
    Color,
    Tint,
    Sharpness,
    Lock,
    AudioBalance,
    ColorTemperature,
    Backlight,
    Pip,
    /// Pre-serialized vendor bytes, forwarded verbatim.
    Raw,
}

impl Attribute {
    /// Attributes whose value is an on/off switch.
    pub fn is_switch(self) -> bool {
        matches!(
            self,
            Attribute::Power
                | Attribute::Mute
                | Attribute::Osd
                | Attribute::Screen
                | Attribute::Lock
                | Attribute::Pip
        )
    }

    /// Attributes whose value is a bounded 0..=100 level.
    pub fn is_level(self) -> bool {
        matches!(
            self,
            Attribute::Volume
                | Attribute::Contrast
                | Attribute::Brightness
                | Attribute::Color
                | Attribute::Tint
                | Attribute::Sharpness
                | Attribute::AudioBalance
                | Attribute::ColorTemperature
                | Attribute::Backlight
        )
    }

    fn as_str(self) -> &'static str {
        match self {
            Attribute::Power => "power",
            Attribute::Volume => "volume",
            Attribute::Mute => "mute",
            Attribute::Osd => "osd",
            Attribute::Input => "input",
            Attribute::Tuning => "tuning",
            Attribute::Screen => "screen",
            Attribute::Contrast => "contrast",
            Attribute::Brightness => "brightness",
            Attribute::Color => "color",
            Attribute::Tint => "tint",
            Attribute::Sharpness => "sharpness",
            Attribute::Lock => "lock",
            Attribute::AudioBalance => "audio-balance",
            Attribute::ColorTemperature => "color-temperature",
            Attribute::Backlight => "backlight",
            Attribute::Pip => "pip",
            Attribute::Raw => "raw",
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Attribute {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        const ALL: &[Attribute] = &[
            Attribute::Power,
            Attribute::Volume,
            Attribute::Mute,
            Attribute::Osd,
            Attribute::Input,
            Attribute::Tuning,
            Attribute::Screen,
            Attribute::Contrast,
            Attribute::Brightness,
            Attribute::Color,
            Attribute::Tint,
            Attribute::Sharpness,
            Attribute::Lock,
            Attribute::AudioBalance,
            Attribute::ColorTemperature,
            Attribute::Backlight,
            Attribute::Pip,
            Attribute::Raw,
        ];
        ALL.iter().copied().find(|a| a.as_str() == s).ok_or(())
    }
}

// ── Operators ─────────────────────────────────────────────────────────────────

/// How an attribute is acted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    Set,
    Increment,
    Decrement,
    Toggle,
    Query,
}

impl Operator {
    fn as_str(self) -> &'static str {
        match self {
            Operator::Set => "set",
            Operator::Increment => "up",
            Operator::Decrement => "down",
            Operator::Toggle => "toggle",
            Operator::Query => "query",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "set" => Ok(Operator::Set),
            "up" => Ok(Operator::Increment),
            "down" => Ok(Operator::Decrement),
            "toggle" => Ok(Operator::Toggle),
            "query" => Ok(Operator::Query),
            _ => Err(()),
        }
    }
}

// ── Input selections ──────────────────────────────────────────────────────────

/// The physical connection kind of an input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Connection {
    Coaxial,
    Component,
    Composite,
    Hdmi,
    Scart,
    Pc,
    /// A connection kind specific to a given television model.
    Special,
}

impl FromStr for Connection {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "coaxial" => Ok(Connection::Coaxial),
            "component" => Ok(Connection::Component),
            "composite" => Ok(Connection::Composite),
            "hdmi" => Ok(Connection::Hdmi),
            "scart" => Ok(Connection::Scart),
            "pc" => Ok(Connection::Pc),
            "special" => Ok(Connection::Special),
            _ => Err(()),
        }
    }
}

/// An input selection: the connection kind plus the ordinal within it
/// (HDMI 2, component 1, …).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputNumber {
    pub connection: Connection,
    pub number: u32,
}

impl InputNumber {
    pub fn new(connection: Connection, number: u32) -> Self {
        Self { connection, number }
    }
}

// ── Operations ────────────────────────────────────────────────────────────────

/// Typed payload of an operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// No payload (toggles and queries).
    None,
    /// On/off.
    Switch(bool),
    /// Bounded level; serialized clamped to 0..=100.
    Level(i32),
    Input(InputNumber),
    Tune(Tune),
    /// Opaque vendor bytes.
    Raw(Vec<u8>),
}

/// A single operation against a television.
#[derive(Debug, Clone, PartialEq)]
pub struct Op {
    pub attribute: Attribute,
    pub operator: Operator,
    pub value: Value,
}

impl Op {
    pub fn new(attribute: Attribute, operator: Operator, value: Value) -> Self {
        Self {
            attribute,
            operator,
            value,
        }
    }

    pub fn set(attribute: Attribute, value: Value) -> Self {
        Self::new(attribute, Operator::Set, value)
    }

    pub fn query(attribute: Attribute) -> Self {
        Self::new(attribute, Operator::Query, Value::None)
    }

    pub fn toggle(attribute: Attribute) -> Self {
        Self::new(attribute, Operator::Toggle, Value::None)
    }

    pub fn increment(attribute: Attribute) -> Self {
        Self::new(attribute, Operator::Increment, Value::None)
    }

    pub fn decrement(attribute: Attribute) -> Self {
        Self::new(attribute, Operator::Decrement, Value::None)
    }
}

/// Clamps a level value into the 0..=100 range every level attribute uses.
pub fn clamp_level(value: i32) -> u8 {
    value.clamp(0, 100) as u8
}

// ── Cached device state ───────────────────────────────────────────────────────

/// The observable subset of device state a driver mirrors.
///
/// Updated only by a driver's response parser; the last parsed answer or
/// notification wins.  Fields the device has not yet reported hold their
/// defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct State {
    pub power: bool,
    pub volume: u8,
    pub mute: bool,
    pub screen: bool,
    pub input: Option<InputNumber>,
    pub channel: Option<Channel>,
}

/// A single field change parsed from an inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum StateUpdate {
    Power(bool),
    Volume(u8),
    Mute(bool),
    Screen(bool),
    Input(InputNumber),
    Channel(Channel),
    MacAddress([u8; 6]),
}

impl StateUpdate {
    /// The attribute this update reports on, if it corresponds to one.
    pub fn attribute(&self) -> Option<Attribute> {
        match self {
            StateUpdate::Power(_) => Some(Attribute::Power),
            StateUpdate::Volume(_) => Some(Attribute::Volume),
            StateUpdate::Mute(_) => Some(Attribute::Mute),
            StateUpdate::Screen(_) => Some(Attribute::Screen),
            StateUpdate::Input(_) => Some(Attribute::Input),
            StateUpdate::Channel(_) => Some(Attribute::Tuning),
            StateUpdate::MacAddress(_) => None,
        }
    }
}

impl State {
    /// Applies one parsed update.  MAC addresses are device metadata, not
    /// state, and are ignored here.
    pub fn apply(&mut self, update: &StateUpdate) {
        match update {
            StateUpdate::Power(v) => self.power = *v,
            StateUpdate::Volume(v) => self.volume = *v,
            StateUpdate::Mute(v) => self.mute = *v,
            StateUpdate::Screen(v) => self.screen = *v,
            StateUpdate::Input(v) => self.input = Some(*v),
            StateUpdate::Channel(v) => self.channel = Some(*v),
            StateUpdate::MacAddress(_) => {}
        }
    }
}
