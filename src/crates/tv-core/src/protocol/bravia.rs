//! Codec for the Sony Bravia "Simple IP control" protocol.
//!
//! Every line on the wire is exactly 24 ASCII bytes:
//!
//! ```text
//! *S<type><cmd><value>\n
//!   │     │    └ 16 bytes, zero-padded left for commands,
//!   │     │      '#'-padded right for enquiries
//!   │     └ four-letter command identifier
//!   └ 'E' enquiry | 'C' command | 'A' answer | 'N' notify
//! ```
//!
//! Two sentinel values exist: sixteen `#` means "no data" and sixteen `F`
//! in an answer means the previous command for that identifier was
//! rejected.  Answers carry no sequence number; correlation is strictly
//! per-command FIFO order, which the driver enforces.

use crate::domain::channel::Channel;
use crate::domain::ops::{
    clamp_level, Attribute, Connection, InputNumber, Op, Operator, StateUpdate, Value,
};

// ── Protocol constants ────────────────────────────────────────────────────────

/// TCP port the control service listens on.
pub const PORT: u16 = 20060;

/// Total frame length including the trailing `\n`.
pub const FRAME_LEN: usize = 24;

/// Width of the value field.
pub const VALUE_LEN: usize = 16;

/// Value field meaning "no data".
pub const NO_DATA: &str = "################";

/// Answer value meaning "the command was rejected".
pub const ERROR_SENTINEL: &str = "FFFFFFFFFFFFFFFF";

pub const CMD_POWER: &str = "POWR";
pub const CMD_VOLUME: &str = "VOLU";
pub const CMD_MUTE: &str = "AMUT";
pub const CMD_SCREEN_MUTE: &str = "PMUT";
pub const CMD_TOGGLE_SCREEN_MUTE: &str = "TPMU";
pub const CMD_PIP: &str = "PIPI";
pub const CMD_TOGGLE_PIP: &str = "TPIP";
pub const CMD_INPUT: &str = "INPT";
pub const CMD_CHANNEL: &str = "CHNN";
pub const CMD_MAC_ADDRESS: &str = "MADR";
pub const CMD_REMOTE_KEY: &str = "IRCC";

/// Remote-control codes sent through `IRCC`.
pub const RK_VOLUME_UP: u8 = 30;
pub const RK_VOLUME_DOWN: u8 = 31;

// ── Frame kinds ───────────────────────────────────────────────────────────────

/// The direction/type byte of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Enquiry,
    Command,
    Answer,
    Notify,
}

impl FrameKind {
    pub fn as_byte(self) -> u8 {
        match self {
            FrameKind::Enquiry => b'E',
            FrameKind::Command => b'C',
            FrameKind::Answer => b'A',
            FrameKind::Notify => b'N',
        }
    }
}

impl TryFrom<u8> for FrameKind {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            b'E' => Ok(FrameKind::Enquiry),
            b'C' => Ok(FrameKind::Command),
            b'A' => Ok(FrameKind::Answer),
            b'N' => Ok(FrameKind::Notify),
            _ => Err(()),
        }
    }
}

// ── Outbound requests ─────────────────────────────────────────────────────────

/// A client-originated frame.
///
/// `Command` writes a value, `Enquiry` reads one; `Raw` forwards
/// caller-supplied bytes verbatim so unsupported vendor extensions remain
/// reachable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BraviaRequest {
    Command { id: &'static str, value: String },
    Enquiry { id: &'static str, data: String },
    Raw(Vec<u8>),
}

impl BraviaRequest {
    pub fn command(id: &'static str, value: impl Into<String>) -> Self {
        BraviaRequest::Command {
            id,
            value: value.into(),
        }
    }

    pub fn enquiry(id: &'static str) -> Self {
        BraviaRequest::Enquiry {
            id,
            data: String::new(),
        }
    }

    pub fn enquiry_with(id: &'static str, data: impl Into<String>) -> Self {
        BraviaRequest::Enquiry {
            id,
            data: data.into(),
        }
    }

    /// The four-letter identifier answers for this request will carry.
    ///
    /// For raw frames the identifier sits at bytes 3..7; anything shorter
    /// correlates under the empty identifier.
    pub fn id(&self) -> &str {
        match self {
            BraviaRequest::Command { id, .. } | BraviaRequest::Enquiry { id, .. } => id,
            BraviaRequest::Raw(bytes) => bytes
                .get(3..7)
                .and_then(|b| std::str::from_utf8(b).ok())
                .unwrap_or(""),
        }
    }

    pub fn serialize(&self) -> Vec<u8> {
        match self {
            BraviaRequest::Command { id, value } => frame(FrameKind::Command, id, &pad_left(value)),
            BraviaRequest::Enquiry { id, data } => frame(FrameKind::Enquiry, id, &pad_right(data)),
            BraviaRequest::Raw(bytes) => bytes.clone(),
        }
    }
}

fn frame(kind: FrameKind, id: &str, value: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(FRAME_LEN);
    out.extend_from_slice(b"*S");
    out.push(kind.as_byte());
    out.extend_from_slice(id.as_bytes());
    out.extend_from_slice(value.as_bytes());
    out.push(0x0A);
    out
}

/// Left-pads with `0` to the 16-byte value width.  A value already at full
/// width (the sentinels) passes through; longer values are truncated.
fn pad_left(s: &str) -> String {
    let s = truncated(s);
    format!("{:0>width$}", s, width = VALUE_LEN)
}

/// Right-pads with `#` to the 16-byte value width.
fn pad_right(s: &str) -> String {
    let s = truncated(s);
    format!("{:#<width$}", s, width = VALUE_LEN)
}

fn truncated(s: &str) -> &str {
    if s.len() > VALUE_LEN {
        &s[..VALUE_LEN]
    } else {
        s
    }
}

fn switch_value(on: bool) -> String {
    u8::from(on).to_string()
}

/// Wire encoding of a connection kind in the first `INPT` field.
pub fn connection_to_wire(connection: Connection) -> u32 {
    match connection {
        Connection::Coaxial => 0,
        Connection::Hdmi => 1,
        Connection::Scart => 2,
        Connection::Composite => 3,
        Connection::Component => 4,
        Connection::Special => 5,
        Connection::Pc => 6,
    }
}

/// Inverse of [`connection_to_wire`].
pub fn connection_from_wire(value: u32) -> Option<Connection> {
    match value {
        0 => Some(Connection::Coaxial),
        1 => Some(Connection::Hdmi),
        2 => Some(Connection::Scart),
        3 => Some(Connection::Composite),
        4 => Some(Connection::Component),
        5 => Some(Connection::Special),
        6 => Some(Connection::Pc),
        _ => None,
    }
}

fn input_value(input: InputNumber) -> String {
    format!(
        "{:08}{:08}",
        connection_to_wire(input.connection),
        input.number
    )
}

fn channel_value(channel: Channel) -> String {
    match channel {
        Channel::Analog(n) => format!("{n:08}.0000000"),
        Channel::Digital { major, minor } => format!("{major:08}.{minor:07}"),
    }
}

/// Maps an operation onto its Bravia request.
///
/// Returns `None` for combinations the protocol cannot express.
pub fn request_for(op: &Op) -> Option<BraviaRequest> {
    use Attribute as A;
    use Operator as O;

    let request = match (op.attribute, op.operator, &op.value) {
        (A::Power, O::Set, Value::Switch(on)) => {
            BraviaRequest::command(CMD_POWER, switch_value(*on))
        }
        (A::Power, O::Query, _) => BraviaRequest::enquiry(CMD_POWER),

        (A::Volume, O::Set, Value::Level(v)) => {
            BraviaRequest::command(CMD_VOLUME, clamp_level(*v).to_string())
        }
        (A::Volume, O::Increment, _) => {
            BraviaRequest::command(CMD_REMOTE_KEY, RK_VOLUME_UP.to_string())
        }
        (A::Volume, O::Decrement, _) => {
            BraviaRequest::command(CMD_REMOTE_KEY, RK_VOLUME_DOWN.to_string())
        }
        (A::Volume, O::Query, _) => BraviaRequest::enquiry(CMD_VOLUME),

        (A::Mute, O::Set, Value::Switch(on)) => {
            BraviaRequest::command(CMD_MUTE, switch_value(*on))
        }
        (A::Mute, O::Query, _) => BraviaRequest::enquiry(CMD_MUTE),

        // Picture mute is the complement of "screen on".
        (A::Screen, O::Set, Value::Switch(on)) => {
            BraviaRequest::command(CMD_SCREEN_MUTE, switch_value(!*on))
        }
        (A::Screen, O::Toggle, _) => BraviaRequest::command(CMD_TOGGLE_SCREEN_MUTE, NO_DATA),
        (A::Screen, O::Query, _) => BraviaRequest::enquiry(CMD_SCREEN_MUTE),

        (A::Pip, O::Set, Value::Switch(on)) => BraviaRequest::command(CMD_PIP, switch_value(*on)),
        (A::Pip, O::Toggle, _) => BraviaRequest::command(CMD_TOGGLE_PIP, NO_DATA),

        (A::Input, O::Set, Value::Input(input)) => {
            BraviaRequest::command(CMD_INPUT, input_value(*input))
        }
        (A::Input, O::Query, _) => BraviaRequest::enquiry(CMD_INPUT),

        (A::Tuning, O::Set, Value::Tune(tune)) => {
            BraviaRequest::command(CMD_CHANNEL, channel_value(tune.channel))
        }

        (A::Raw, _, Value::Raw(bytes)) => {
            let mut buf = bytes.clone();
            if buf.last() != Some(&0x0A) {
                buf.push(0x0A);
            }
            BraviaRequest::Raw(buf)
        }

        _ => return None,
    };
    Some(request)
}

// ── Inbound frames ────────────────────────────────────────────────────────────

/// A parsed inbound frame: answer or notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: FrameKind,
    /// Four-letter command identifier.
    pub command: String,
    /// The 16-byte value field, unpadded-as-received.
    pub value: String,
}

impl Frame {
    pub fn is_error(&self) -> bool {
        self.value == ERROR_SENTINEL
    }
}

/// Parses one line as read off the socket (trailing `\n` included or not).
///
/// Lines shorter than 24 bytes, with an unknown type byte, or with a
/// non-ASCII command/value are dropped by returning `None`; this parser
/// never panics on device input.
pub fn parse_frame(line: &[u8]) -> Option<Frame> {
    if line.len() < FRAME_LEN {
        return None;
    }
    let kind = FrameKind::try_from(line[2]).ok()?;
    let command = std::str::from_utf8(&line[3..7]).ok()?.to_string();
    let value = std::str::from_utf8(&line[7..23]).ok()?.to_string();
    Some(Frame {
        kind,
        command,
        value,
    })
}

/// Decodes a non-error value field into the typed state change it reports.
///
/// Unknown identifiers and undecodable digits yield `None`; an answer whose
/// value does not decode still acknowledges its request, so the caller
/// treats `None` as "nothing to record", not as a failure.
pub fn decode_value(command: &str, value: &str) -> Option<StateUpdate> {
    match command {
        CMD_POWER => Some(StateUpdate::Power(parse_switch(value)?)),
        CMD_VOLUME => Some(StateUpdate::Volume(clamp_level(parse_number(value)? as i32))),
        CMD_MUTE => Some(StateUpdate::Mute(parse_switch(value)?)),
        CMD_SCREEN_MUTE => Some(StateUpdate::Screen(!parse_switch(value)?)),
        CMD_INPUT => {
            let connection = connection_from_wire(field(value, 0..8)?)?;
            let number = field(value, 8..16)?;
            Some(StateUpdate::Input(InputNumber::new(connection, number)))
        }
        CMD_CHANNEL => {
            let major = field(value, 0..8)?;
            if value.as_bytes().get(8) != Some(&b'.') {
                return None;
            }
            let minor = field(value, 9..16)?;
            let channel = if minor == 0 {
                Channel::Analog(major)
            } else {
                Channel::Digital { major, minor }
            };
            Some(StateUpdate::Channel(channel))
        }
        CMD_MAC_ADDRESS => {
            let mut mac = [0u8; 6];
            let hex = value.get(0..12)?.as_bytes();
            for (i, pair) in hex.chunks_exact(2).enumerate() {
                mac[i] = u8::from_str_radix(std::str::from_utf8(pair).ok()?, 16).ok()?;
            }
            Some(StateUpdate::MacAddress(mac))
        }
        _ => None,
    }
}

fn parse_number(value: &str) -> Option<u32> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    value.parse().ok()
}

fn parse_switch(value: &str) -> Option<bool> {
    Some(parse_number(value)? == 1)
}

fn field(value: &str, range: std::ops::Range<usize>) -> Option<u32> {
    parse_number(value.get(range)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::channel::{Antenna, Tune};

    fn serialize(op: &Op) -> Vec<u8> {
        request_for(op).expect("operation must serialize").serialize()
    }

    // ── Outbound framing ──────────────────────────────────────────────────────

    #[test]
    fn test_every_request_is_24_bytes_newline_terminated() {
        let ops = [
            Op::set(Attribute::Power, Value::Switch(true)),
            Op::set(Attribute::Volume, Value::Level(50)),
            Op::increment(Attribute::Volume),
            Op::set(Attribute::Mute, Value::Switch(false)),
            Op::set(Attribute::Screen, Value::Switch(true)),
            Op::toggle(Attribute::Screen),
            Op::set(Attribute::Pip, Value::Switch(true)),
            Op::toggle(Attribute::Pip),
            Op::set(
                Attribute::Input,
                Value::Input(InputNumber::new(Connection::Hdmi, 1)),
            ),
            Op::set(
                Attribute::Tuning,
                Value::Tune(Tune::new(Antenna(0), Channel::Analog(7))),
            ),
            Op::query(Attribute::Power),
            Op::query(Attribute::Input),
        ];
        for op in &ops {
            let bytes = serialize(op);
            assert_eq!(bytes.len(), FRAME_LEN, "{op:?}");
            assert_eq!(*bytes.last().unwrap(), 0x0A, "{op:?}");
        }
    }

    #[test]
    fn test_volume_set_pads_left_with_zeros() {
        let op = Op::set(Attribute::Volume, Value::Level(50));
        assert_eq!(serialize(&op), b"*SCVOLU0000000000000050\x0A");
    }

    #[test]
    fn test_enquiry_pads_right_with_hashes() {
        let op = Op::query(Attribute::Power);
        assert_eq!(serialize(&op), b"*SEPOWR################\x0A");
    }

    #[test]
    fn test_enquiry_with_data_keeps_data_on_the_left() {
        let req = BraviaRequest::enquiry_with(CMD_MAC_ADDRESS, "eth0");
        assert_eq!(req.serialize(), b"*SEMADReth0############\x0A");
    }

    #[test]
    fn test_sentinels_are_exactly_sixteen_wide() {
        assert_eq!(NO_DATA.len(), VALUE_LEN);
        assert!(NO_DATA.bytes().all(|b| b == b'#'));
        assert_eq!(ERROR_SENTINEL.len(), VALUE_LEN);
        assert!(ERROR_SENTINEL.bytes().all(|b| b == b'F'));
    }

    #[test]
    fn test_screen_toggle_sends_no_data_sentinel() {
        let op = Op::toggle(Attribute::Screen);
        assert_eq!(serialize(&op), b"*SCTPMU################\x0A");
    }

    #[test]
    fn test_screen_set_inverts_onto_picture_mute() {
        let on = Op::set(Attribute::Screen, Value::Switch(true));
        assert_eq!(serialize(&on), b"*SCPMUT0000000000000000\x0A");
        let off = Op::set(Attribute::Screen, Value::Switch(false));
        assert_eq!(serialize(&off), b"*SCPMUT0000000000000001\x0A");
    }

    #[test]
    fn test_volume_steps_use_remote_key_codes() {
        assert_eq!(
            serialize(&Op::increment(Attribute::Volume)),
            b"*SCIRCC0000000000000030\x0A"
        );
        assert_eq!(
            serialize(&Op::decrement(Attribute::Volume)),
            b"*SCIRCC0000000000000031\x0A"
        );
    }

    #[test]
    fn test_volume_set_clamps_out_of_range_levels() {
        let high = Op::set(Attribute::Volume, Value::Level(150));
        assert_eq!(serialize(&high), b"*SCVOLU0000000000000100\x0A");
        let low = Op::set(Attribute::Volume, Value::Level(-1));
        assert_eq!(serialize(&low), b"*SCVOLU0000000000000000\x0A");
    }

    #[test]
    fn test_input_encodes_two_eight_digit_fields() {
        let op = Op::set(
            Attribute::Input,
            Value::Input(InputNumber::new(Connection::Hdmi, 2)),
        );
        assert_eq!(serialize(&op), b"*SCINPT0000000100000002\x0A");
    }

    #[test]
    fn test_digital_tuning_is_major_dot_minor() {
        let op = Op::set(
            Attribute::Tuning,
            Value::Tune(Tune::new(Antenna(0), Channel::Digital { major: 7, minor: 1 })),
        );
        assert_eq!(serialize(&op), b"*SCCHNN00000007.0000001\x0A");
    }

    #[test]
    fn test_analog_tuning_has_zero_minor() {
        let op = Op::set(
            Attribute::Tuning,
            Value::Tune(Tune::new(Antenna(0), Channel::Analog(3))),
        );
        assert_eq!(serialize(&op), b"*SCCHNN00000003.0000000\x0A");
    }

    #[test]
    fn test_raw_appends_missing_newline_and_keeps_id() {
        let op = Op::set(Attribute::Raw, Value::Raw(b"*SCPOWR0000000000000001".to_vec()));
        let req = request_for(&op).unwrap();
        assert_eq!(req.id(), "POWR");
        assert_eq!(req.serialize(), b"*SCPOWR0000000000000001\x0A");
    }

    #[test]
    fn test_unsupported_combinations_return_none() {
        assert!(request_for(&Op::toggle(Attribute::Power)).is_none());
        assert!(request_for(&Op::set(Attribute::Osd, Value::Switch(true))).is_none());
        assert!(request_for(&Op::set(Attribute::Backlight, Value::Level(3))).is_none());
        assert!(request_for(&Op::set(Attribute::Volume, Value::Switch(true))).is_none());
    }

    // ── Inbound parsing ───────────────────────────────────────────────────────

    #[test]
    fn test_parse_answer_frame() {
        let frame = parse_frame(b"*SAVOLU0000000000000050\x0A").unwrap();
        assert_eq!(frame.kind, FrameKind::Answer);
        assert_eq!(frame.command, "VOLU");
        assert_eq!(frame.value, "0000000000000050");
        assert!(!frame.is_error());
    }

    #[test]
    fn test_parse_notification_frame() {
        let frame = parse_frame(b"*SNPOWR0000000000000001\x0A").unwrap();
        assert_eq!(frame.kind, FrameKind::Notify);
        assert_eq!(frame.command, "POWR");
    }

    #[test]
    fn test_error_sentinel_is_detected() {
        let frame = parse_frame(b"*SAPOWRFFFFFFFFFFFFFFFF\x0A").unwrap();
        assert!(frame.is_error());
    }

    #[test]
    fn test_short_lines_are_dropped() {
        assert!(parse_frame(b"*SAVOLU50\x0A").is_none());
        assert!(parse_frame(b"").is_none());
    }

    #[test]
    fn test_unknown_type_byte_is_dropped() {
        assert!(parse_frame(b"*SXVOLU0000000000000050\x0A").is_none());
    }

    #[test]
    fn test_decode_power_and_mute_switches() {
        assert_eq!(
            decode_value(CMD_POWER, "0000000000000001"),
            Some(StateUpdate::Power(true))
        );
        assert_eq!(
            decode_value(CMD_MUTE, "0000000000000000"),
            Some(StateUpdate::Mute(false))
        );
    }

    #[test]
    fn test_decode_volume() {
        assert_eq!(
            decode_value(CMD_VOLUME, "0000000000000050"),
            Some(StateUpdate::Volume(50))
        );
    }

    #[test]
    fn test_decode_screen_inverts_picture_mute() {
        assert_eq!(
            decode_value(CMD_SCREEN_MUTE, "0000000000000001"),
            Some(StateUpdate::Screen(false))
        );
        assert_eq!(
            decode_value(CMD_SCREEN_MUTE, "0000000000000000"),
            Some(StateUpdate::Screen(true))
        );
    }

    #[test]
    fn test_decode_input_splits_eight_digit_fields() {
        assert_eq!(
            decode_value(CMD_INPUT, "0000000100000002"),
            Some(StateUpdate::Input(InputNumber::new(Connection::Hdmi, 2)))
        );
    }

    #[test]
    fn test_input_wire_mapping_is_a_bijection() {
        for n in 0..=6 {
            let connection = connection_from_wire(n).expect("wire value must decode");
            assert_eq!(connection_to_wire(connection), n);
        }
        assert_eq!(connection_from_wire(7), None);
    }

    #[test]
    fn test_decode_channel_forms() {
        assert_eq!(
            decode_value(CMD_CHANNEL, "00000007.0000001"),
            Some(StateUpdate::Channel(Channel::Digital { major: 7, minor: 1 }))
        );
        assert_eq!(
            decode_value(CMD_CHANNEL, "00000042.0000000"),
            Some(StateUpdate::Channel(Channel::Analog(42)))
        );
    }

    #[test]
    fn test_decode_mac_address() {
        assert_eq!(
            decode_value(CMD_MAC_ADDRESS, "0004a3b2c1d0####"),
            Some(StateUpdate::MacAddress([0x00, 0x04, 0xA3, 0xB2, 0xC1, 0xD0]))
        );
    }

    #[test]
    fn test_decode_rejects_garbage_without_panicking() {
        assert_eq!(decode_value(CMD_POWER, "################"), None);
        assert_eq!(decode_value(CMD_INPUT, "garbagegarbage!!"), None);
        assert_eq!(decode_value(CMD_CHANNEL, "0000000700000001"), None); // missing dot
        assert_eq!(decode_value("ZZZZ", "0000000000000001"), None);
        assert_eq!(decode_value(CMD_MAC_ADDRESS, "zz"), None);
    }
}
