//! Codec for the LG serial control protocol.
//!
//! Wire format, one command per frame:
//!
//! ```text
//! <class><code> <set-id> <data> … <data>\r
//! ```
//!
//! The class/code digraph is two raw ASCII letters; the set ID and every
//! data byte are rendered as two lowercase hex digits; fields are separated
//! by a single `0x20` space and the frame ends with `0x0D`.  Booleans encode
//! as `00`/`01`; multi-byte integers encode big-endian, one hex field per
//! byte.
//!
//! Replies arrive asynchronously on the same line, terminated by the letter
//! `x`:
//!
//! ```text
//! <code> <set-id> <status><data>x        e.g.  "a 01 OK01x"
//! ```

use crate::domain::channel::Channel;
use crate::domain::ops::{clamp_level, Attribute, Op, Operator, Value};

// ── Remote-control key codes ──────────────────────────────────────────────────

pub const RK_VOLUME_UP: u8 = 0x02;
pub const RK_VOLUME_DOWN: u8 = 0x03;

// Antenna bytes of the `ma` tuning payload.
const TUNE_ANALOG_ANTENNA: u8 = 0x01;
const TUNE_DIGITAL_ANTENNA: u8 = 0x22;

// ── Outbound commands ─────────────────────────────────────────────────────────

/// A single LG command: the two-letter digraph plus its data bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LgCommand {
    pub class: u8,
    pub code: u8,
    pub data: Vec<u8>,
}

impl LgCommand {
    fn new(class: u8, code: u8, data: Vec<u8>) -> Self {
        Self { class, code, data }
    }

    fn switch(class: u8, code: u8, on: bool) -> Self {
        Self::new(class, code, vec![u8::from(on)])
    }

    /// Renders the frame addressed to `set_id`, including the trailing CR.
    pub fn serialize(&self, set_id: u8) -> Vec<u8> {
        let mut out = Vec::with_capacity(6 + 3 * self.data.len());
        out.push(self.class);
        out.push(self.code);
        out.push(b' ');
        push_hex(&mut out, set_id);
        for byte in &self.data {
            out.push(b' ');
            push_hex(&mut out, *byte);
        }
        out.push(0x0D);
        out
    }
}

fn push_hex(out: &mut Vec<u8>, byte: u8) {
    const DIGITS: &[u8; 16] = b"0123456789abcdef";
    out.push(DIGITS[usize::from(byte >> 4)]);
    out.push(DIGITS[usize::from(byte & 0x0F)]);
}

/// What an operation turns into on the wire: a regular command frame, or
/// caller-supplied raw bytes forwarded as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LgFrame {
    Command(LgCommand),
    Raw(Vec<u8>),
}

impl LgFrame {
    pub fn serialize(&self, set_id: u8) -> Vec<u8> {
        match self {
            LgFrame::Command(cmd) => cmd.serialize(set_id),
            LgFrame::Raw(bytes) => bytes.clone(),
        }
    }
}

/// Tuning payload of the `ma` command: physical channel, major, minor,
/// antenna, each integer big-endian.
fn tuning_data(channel: Channel) -> Vec<u8> {
    let (phys, major, minor, antenna) = match channel {
        Channel::Analog(n) => (n as u8, 0u16, 0u16, TUNE_ANALOG_ANTENNA),
        Channel::Digital { major, minor } => {
            (0, major as u16, minor as u16, TUNE_DIGITAL_ANTENNA)
        }
    };
    let mut data = vec![phys];
    data.extend_from_slice(&major.to_be_bytes());
    data.extend_from_slice(&minor.to_be_bytes());
    data.push(antenna);
    data
}

/// Maps an operation onto its LG frame.
///
/// Returns `None` for attribute/operator/value combinations this protocol
/// cannot express; the driver reports those as unsupported.
pub fn frame_for(op: &Op) -> Option<LgFrame> {
    use Attribute as A;
    use Operator as O;

    let cmd = match (op.attribute, op.operator, &op.value) {
        (A::Power, O::Set, Value::Switch(on)) => LgCommand::switch(b'k', b'a', *on),
        (A::Mute, O::Set, Value::Switch(on)) => LgCommand::switch(b'k', b'e', *on),
        (A::Osd, O::Set, Value::Switch(on)) => LgCommand::switch(b'k', b'l', *on),
        (A::Lock, O::Set, Value::Switch(on)) => LgCommand::switch(b'k', b'm', *on),
        // Screen mute is the complement of "screen on".
        (A::Screen, O::Set, Value::Switch(on)) => LgCommand::switch(b'k', b'd', !*on),

        (A::Volume, O::Set, Value::Level(v)) => level(b'k', b'f', *v),
        (A::Volume, O::Increment, _) => LgCommand::new(b'm', b'c', vec![RK_VOLUME_UP]),
        (A::Volume, O::Decrement, _) => LgCommand::new(b'm', b'c', vec![RK_VOLUME_DOWN]),

        (A::Contrast, O::Set, Value::Level(v)) => level(b'k', b'g', *v),
        (A::Brightness, O::Set, Value::Level(v)) => level(b'k', b'h', *v),
        (A::Color, O::Set, Value::Level(v)) => level(b'k', b'i', *v),
        (A::Tint, O::Set, Value::Level(v)) => level(b'k', b'j', *v),
        (A::Sharpness, O::Set, Value::Level(v)) => level(b'k', b'k', *v),
        (A::AudioBalance, O::Set, Value::Level(v)) => level(b'k', b't', *v),
        (A::ColorTemperature, O::Set, Value::Level(v)) => level(b'k', b'u', *v),
        (A::Backlight, O::Set, Value::Level(v)) => level(b'm', b'g', *v),

        (A::Input, O::Set, Value::Input(input)) => {
            LgCommand::new(b'x', b'b', vec![input.number as u8])
        }
        (A::Tuning, O::Set, Value::Tune(tune)) => {
            LgCommand::new(b'm', b'a', tuning_data(tune.channel))
        }

        (A::Raw, _, Value::Raw(bytes)) => {
            let mut buf = bytes.clone();
            if buf.last() != Some(&0x0D) {
                buf.push(0x0D);
            }
            return Some(LgFrame::Raw(buf));
        }

        _ => return None,
    };
    Some(LgFrame::Command(cmd))
}

fn level(class: u8, code: u8, value: i32) -> LgCommand {
    LgCommand::new(class, code, vec![clamp_level(value)])
}

// ── Inbound replies ───────────────────────────────────────────────────────────

/// A parsed acknowledgement line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LgReply {
    /// The command code letter being acknowledged.
    pub sub_command: u8,
    pub set_id: u8,
    /// Two-letter status, `"OK"` or `"NG"`.
    pub status: String,
    pub data: Vec<u8>,
}

impl LgReply {
    pub fn is_ack(&self) -> bool {
        self.status == "OK"
    }
}

/// Parses one reply frame as read off the line, up to and including the
/// terminating `x`.
///
/// Leading garbage through the last CR-LF is stripped first.  Anything that
/// does not match `<code> <set-id> <status><data>x` yields `None`; the
/// caller skips such frames.
pub fn parse_reply(frame: &[u8]) -> Option<LgReply> {
    let frame = match frame.windows(2).rposition(|w| w == b"\r\n") {
        Some(pos) => &frame[pos + 2..],
        None => frame,
    };

    // <code> SP <hh> SP <ss> [<hh>…] 'x' is at least 8 bytes.
    if frame.len() < 8 || frame[1] != b' ' || frame[4] != b' ' {
        return None;
    }
    if *frame.last()? != b'x' {
        return None;
    }

    let sub_command = frame[0];
    let set_id = hex_pair(frame[2], frame[3])?;
    let status = std::str::from_utf8(&frame[5..7]).ok()?.to_string();

    let hex = &frame[7..frame.len() - 1];
    if hex.len() % 2 != 0 {
        return None;
    }
    let mut data = Vec::with_capacity(hex.len() / 2);
    for pair in hex.chunks_exact(2) {
        data.push(hex_pair(pair[0], pair[1])?);
    }

    Some(LgReply {
        sub_command,
        set_id,
        status,
        data,
    })
}

fn hex_digit(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

fn hex_pair(hi: u8, lo: u8) -> Option<u8> {
    Some(hex_digit(hi)? << 4 | hex_digit(lo)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::channel::{Antenna, Tune};
    use crate::domain::ops::{Connection, InputNumber};

    fn serialize(op: &Op, set_id: u8) -> Vec<u8> {
        frame_for(op).expect("operation must serialize").serialize(set_id)
    }

    #[test]
    fn test_power_on_serializes_to_exact_bytes() {
        let op = Op::set(Attribute::Power, Value::Switch(true));
        assert_eq!(serialize(&op, 1), b"ka 01 01\x0D");
    }

    #[test]
    fn test_power_off_encodes_zero() {
        let op = Op::set(Attribute::Power, Value::Switch(false));
        assert_eq!(serialize(&op, 1), b"ka 01 00\x0D");
    }

    #[test]
    fn test_set_id_renders_as_two_hex_digits() {
        let op = Op::set(Attribute::Mute, Value::Switch(true));
        assert_eq!(serialize(&op, 0x10), b"ke 10 01\x0D");
    }

    #[test]
    fn test_digital_tuning_payload_is_big_endian_per_byte() {
        let op = Op::set(
            Attribute::Tuning,
            Value::Tune(Tune::new(
                Antenna(0),
                Channel::Digital { major: 2, minor: 1 },
            )),
        );
        assert_eq!(serialize(&op, 1), b"ma 01 00 00 02 00 01 22\x0D");
    }

    #[test]
    fn test_analog_tuning_sets_physical_channel_and_antenna() {
        let op = Op::set(
            Attribute::Tuning,
            Value::Tune(Tune::new(Antenna(0), Channel::Analog(42))),
        );
        assert_eq!(serialize(&op, 1), b"ma 01 2a 00 00 00 00 01\x0D");
    }

    #[test]
    fn test_volume_set_clamps_out_of_range_levels() {
        let high = Op::set(Attribute::Volume, Value::Level(150));
        assert_eq!(serialize(&high, 1), b"kf 01 64\x0D");
        let low = Op::set(Attribute::Volume, Value::Level(-5));
        assert_eq!(serialize(&low, 1), b"kf 01 00\x0D");
    }

    #[test]
    fn test_volume_steps_use_remote_key_codes() {
        assert_eq!(serialize(&Op::increment(Attribute::Volume), 1), b"mc 01 02\x0D");
        assert_eq!(serialize(&Op::decrement(Attribute::Volume), 1), b"mc 01 03\x0D");
    }

    #[test]
    fn test_screen_set_is_inverted() {
        // Screen on means screen-mute off.
        let on = Op::set(Attribute::Screen, Value::Switch(true));
        assert_eq!(serialize(&on, 1), b"kd 01 00\x0D");
        let off = Op::set(Attribute::Screen, Value::Switch(false));
        assert_eq!(serialize(&off, 1), b"kd 01 01\x0D");
    }

    #[test]
    fn test_picture_level_digraphs() {
        let cases: &[(Attribute, &[u8])] = &[
            (Attribute::Contrast, b"kg 01 32\x0D"),
            (Attribute::Brightness, b"kh 01 32\x0D"),
            (Attribute::Color, b"ki 01 32\x0D"),
            (Attribute::Tint, b"kj 01 32\x0D"),
            (Attribute::Sharpness, b"kk 01 32\x0D"),
            (Attribute::AudioBalance, b"kt 01 32\x0D"),
            (Attribute::ColorTemperature, b"ku 01 32\x0D"),
            (Attribute::Backlight, b"mg 01 32\x0D"),
        ];
        for (attribute, expected) in cases {
            let op = Op::set(*attribute, Value::Level(50));
            assert_eq!(&serialize(&op, 1), expected, "{attribute}");
        }
    }

    #[test]
    fn test_input_set_uses_ordinal_byte() {
        let op = Op::set(
            Attribute::Input,
            Value::Input(InputNumber::new(Connection::Hdmi, 2)),
        );
        assert_eq!(serialize(&op, 1), b"xb 01 02\x0D");
    }

    #[test]
    fn test_raw_appends_missing_terminator() {
        let op = Op::set(Attribute::Raw, Value::Raw(b"ka 00 01".to_vec()));
        assert_eq!(serialize(&op, 1), b"ka 00 01\x0D");
        let already = Op::set(Attribute::Raw, Value::Raw(b"ka 00 01\x0D".to_vec()));
        assert_eq!(serialize(&already, 1), b"ka 00 01\x0D");
    }

    #[test]
    fn test_unsupported_combinations_return_none() {
        assert!(frame_for(&Op::toggle(Attribute::Power)).is_none());
        assert!(frame_for(&Op::query(Attribute::Volume)).is_none());
        assert!(frame_for(&Op::set(Attribute::Pip, Value::Switch(true))).is_none());
        // Ill-typed payloads are rejected, not coerced.
        assert!(frame_for(&Op::set(Attribute::Power, Value::Level(1))).is_none());
    }

    // ── Reply parsing ─────────────────────────────────────────────────────────

    #[test]
    fn test_parse_reply_basic_ack() {
        let reply = parse_reply(b"a 01 OK01x").unwrap();
        assert_eq!(reply.sub_command, b'a');
        assert_eq!(reply.set_id, 1);
        assert_eq!(reply.status, "OK");
        assert_eq!(reply.data, vec![0x01]);
        assert!(reply.is_ack());
    }

    #[test]
    fn test_parse_reply_nak_status() {
        let reply = parse_reply(b"f 01 NG00x").unwrap();
        assert!(!reply.is_ack());
    }

    #[test]
    fn test_parse_reply_strips_leading_garbage() {
        let reply = parse_reply(b"\x00junk\r\na 01 OK01x").unwrap();
        assert_eq!(reply.sub_command, b'a');
        assert_eq!(reply.data, vec![0x01]);
    }

    #[test]
    fn test_parse_reply_multi_byte_data() {
        let reply = parse_reply(b"a 01 OK0102x").unwrap();
        assert_eq!(reply.data, vec![0x01, 0x02]);
    }

    #[test]
    fn test_parse_reply_rejects_malformed_frames() {
        assert!(parse_reply(b"").is_none());
        assert!(parse_reply(b"ab 01 OK01x").is_none()); // no space after code
        assert!(parse_reply(b"a 01 OK1x").is_none()); // odd hex digits
        assert!(parse_reply(b"a zz OK01x").is_none()); // bad set id
        assert!(parse_reply(b"a 01 OKzzx").is_none()); // bad data hex
        assert!(parse_reply(b"a 01 OK01").is_none()); // missing terminator
    }
}
