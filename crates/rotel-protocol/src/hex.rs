//! HEX dialect frame encoder/decoder.
//!
//! # Frame format
//!
//! ```text
//! 0xFE <count> <device-id> <type> <payload...> <checksum>
//! ```
//!
//! - `count`: number of bytes from `device-id` to the end of the payload
//! - `type`: command or response type (see [`rotel_core::command::hex`])
//! - `checksum`: sum of bytes 1 up to the end of the payload, truncated to
//!   `u8`. A checksum of `0xFD` is sent as `FD 00` and `0xFE` as `FD 01`.
//!
//! Commands carry a single payload byte. Standard responses carry the
//! front-panel display characters and flag bytes, decoded by
//! [`hex_text`](crate::hex_text).

use std::sync::Arc;

use bytes::{BufMut, BytesMut};
use rotel_core::command::{LogicalCommand, NativeToken, hex};
use rotel_core::error::{Error, Result};
use rotel_core::events::FeedbackEvent;
use rotel_core::model::DeviceModel;
use rotel_core::types::{Dialect, Zone};
use tracing::{debug, trace};

use crate::codec::WireCodec;
use crate::hex_text;

/// Number of consecutive rejected frames after which the stream is
/// considered out of sync for good.
pub const MAX_CONSECUTIVE_REJECTS: usize = 64;

/// Sum of `frame[1..=last]`, truncated to `u8`.
pub fn checksum(frame: &[u8], last: usize) -> u8 {
    frame
        .iter()
        .take(last + 1)
        .skip(1)
        .fold(0u8, |acc, b| acc.wrapping_add(*b))
}

/// Build a command frame with escaped checksum.
pub fn encode_frame(device_id: u8, kind: u8, payload: u8) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(7);
    buf.put_u8(hex::START);
    buf.put_u8(0x03);
    buf.put_u8(device_id);
    buf.put_u8(kind);
    buf.put_u8(payload);
    let sum = checksum(&buf, 4);
    match sum {
        hex::ESCAPE => buf.put_slice(&[hex::ESCAPE, 0x00]),
        hex::START => buf.put_slice(&[hex::ESCAPE, 0x01]),
        other => buf.put_u8(other),
    }
    buf.to_vec()
}

/// Build a standard-response display frame for `model`.
///
/// `chars` is padded with blanks (or truncated) to the display width and
/// `flags` with zeroes to the flag count.
pub fn encode_response(model: &DeviceModel, chars: &[u8], flags: &[u8]) -> Vec<u8> {
    let layout = &model.hex;
    let mut text = chars.to_vec();
    text.resize(layout.chars, b' ');
    let mut bits = flags.to_vec();
    bits.resize(layout.flags, 0);

    let mut buf = BytesMut::with_capacity(layout.response_len() + 1);
    buf.put_u8(hex::START);
    buf.put_u8((layout.response_len() - 3) as u8);
    buf.put_u8(layout.device_id);
    buf.put_u8(hex::STANDARD_RESPONSE);
    if layout.chars_before_flags {
        buf.put_slice(&text);
        buf.put_slice(&bits);
    } else {
        buf.put_slice(&bits);
        buf.put_slice(&text);
    }
    let sum = checksum(&buf, buf.len() - 1);
    match sum {
        hex::ESCAPE => buf.put_slice(&[hex::ESCAPE, 0x00]),
        hex::START => buf.put_slice(&[hex::ESCAPE, 0x01]),
        other => buf.put_u8(other),
    }
    buf.to_vec()
}

/// Check a complete frame against the model's layout.
///
/// Returns the frame type on success.
pub fn validate_frame(model: &DeviceModel, frame: &[u8]) -> Result<u8> {
    if frame.len() < 6 {
        return Err(Error::Protocol(format!(
            "unexpected frame length {}",
            frame.len()
        )));
    }
    if frame[0] != hex::START {
        return Err(Error::Protocol(format!("unexpected start byte {:02X}", frame[0])));
    }
    if frame[2] != model.hex.device_id {
        return Err(Error::Protocol(format!(
            "unexpected device id {:02X} (expected {:02X})",
            frame[2], model.hex.device_id
        )));
    }
    let kind = frame[3];
    if !hex::is_known_type(kind) {
        return Err(Error::Protocol(format!("unexpected frame type {:02X}", kind)));
    }

    // Command echoes carry their own length; display frames must match the
    // model's layout.
    let mut expected_len = if kind == hex::STANDARD_RESPONSE {
        model.hex.response_len()
    } else {
        usize::from(frame[1]) + 3
    };
    if usize::from(frame[1]) + 3 != expected_len {
        return Err(Error::Protocol(format!(
            "unexpected count {} (expected {})",
            frame[1],
            expected_len.saturating_sub(3)
        )));
    }

    let sum = checksum(frame, expected_len - 2);
    if sum == hex::ESCAPE || sum == hex::START {
        expected_len += 1;
    }
    if frame.len() != expected_len {
        return Err(Error::Protocol(format!(
            "unexpected frame length {} (expected {})",
            frame.len(),
            expected_len
        )));
    }

    let tail = &frame[frame.len() - 2..];
    let valid = match sum {
        hex::ESCAPE => tail == [hex::ESCAPE, 0x00],
        hex::START => tail == [hex::ESCAPE, 0x01],
        other => tail[1] == other,
    };
    if !valid {
        return Err(Error::Protocol(format!(
            "invalid checksum {:02X?} (computed {:02X})",
            tail, sum
        )));
    }
    Ok(kind)
}

/// Codec for the fixed-frame HEX dialect.
pub struct HexCodec {
    model: Arc<DeviceModel>,
    buf: Vec<u8>,
    capacity: usize,
    started: bool,
    count: usize,
    rejected: usize,
}

impl HexCodec {
    pub fn new(model: Arc<DeviceModel>) -> Self {
        let capacity = 6 + model.hex.chars + model.hex.flags;
        HexCodec {
            model,
            buf: Vec::with_capacity(capacity),
            capacity,
            started: false,
            count: 0,
            rejected: 0,
        }
    }

    #[cfg(test)]
    fn consecutive_rejects(&self) -> usize {
        self.rejected
    }

    fn handle_frame(&mut self, frame: &[u8], events: &mut Vec<FeedbackEvent>) {
        trace!(bytes = ?frame, "HEX frame");
        match validate_frame(&self.model, frame) {
            Ok(hex::STANDARD_RESPONSE) => {
                self.rejected = 0;
                events.extend(hex_text::interpret_standard_response(&self.model, frame));
            }
            Ok(kind) => {
                self.rejected = 0;
                debug!(kind, "ignoring HEX frame");
            }
            Err(e) => {
                self.rejected += 1;
                debug!(err = %e, rejected = self.rejected, "rejected HEX frame");
            }
        }
    }
}

impl WireCodec for HexCodec {
    fn dialect(&self) -> Dialect {
        Dialect::Hex
    }

    fn encode(&self, zone: Zone, cmd: LogicalCommand, value: Option<i32>) -> Result<Vec<u8>> {
        let token = self
            .model
            .commands
            .lookup(Dialect::Hex, zone, cmd)
            .ok_or_else(|| Error::Unsupported(format!("{} in {} with HEX", cmd, zone)))?;
        let NativeToken::Hex { kind, key } = *token else {
            return Err(Error::Unsupported(format!("{} has no HEX encoding", cmd)));
        };
        let payload = match value {
            Some(v) => (v & 0xFF) as u8,
            None if cmd.takes_value() => {
                return Err(Error::InvalidParameter(format!("{} needs a value", cmd)));
            }
            None => key,
        };
        Ok(encode_frame(self.model.hex.device_id, kind, payload))
    }

    fn decode(&mut self, data: &[u8]) -> Vec<FeedbackEvent> {
        let mut events = Vec::new();
        for &b in data {
            if b == hex::START {
                self.started = true;
                self.count = 0;
                self.buf.clear();
            }
            if !self.started {
                continue;
            }
            if self.buf.len() < self.capacity {
                self.buf.push(b);
            }
            let index = self.buf.len();
            if index == 2 {
                self.count = usize::from(b);
            } else if self.count > 0 && index == self.count + 3 {
                if b == hex::ESCAPE {
                    self.count += 1;
                } else {
                    let frame = std::mem::take(&mut self.buf);
                    self.handle_frame(&frame, &mut events);
                    self.buf = frame;
                    self.buf.clear();
                    self.started = false;
                }
            }
        }
        events
    }

    fn reset(&mut self) {
        self.buf.clear();
        self.started = false;
        self.count = 0;
        self.rejected = 0;
    }

    fn framing_failed(&self) -> bool {
        self.rejected > MAX_CONSECUTIVE_REJECTS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rotel_core::command::CommandTable;
    use rotel_core::model::{HexLayout, SourceEntry};
    use rotel_core::types::Source;

    fn model() -> Arc<DeviceModel> {
        let mut commands = CommandTable::new();
        commands.insert(
            Dialect::Hex,
            Zone::MAIN,
            LogicalCommand::PowerOn,
            NativeToken::hex(hex::PRIMARY_CMD, 0x4B),
        );
        commands.insert(
            Dialect::Hex,
            Zone::MAIN,
            LogicalCommand::VolumeSet,
            NativeToken::hex(hex::VOLUME_CMD, 0),
        );
        commands.insert(
            Dialect::Hex,
            Zone::AUX1,
            LogicalCommand::VolumeUp,
            NativeToken::hex(hex::ZONE2_CMD, 0x0B),
        );
        Arc::new(DeviceModel {
            name: "test",
            hex: HexLayout {
                device_id: 0xA5,
                chars: 13,
                flags: 0,
                chars_before_flags: true,
            },
            sources: vec![SourceEntry::standard(Source::Cd)],
            commands,
            ..DeviceModel::default()
        })
    }

    /// Standard response for the test model showing `text`.
    fn response(text: &str) -> Vec<u8> {
        let mut f = vec![hex::START, 15, 0xA5, hex::STANDARD_RESPONSE];
        let mut chars = text.as_bytes().to_vec();
        chars.resize(13, b' ');
        f.extend_from_slice(&chars);
        let sum = checksum(&f, f.len() - 1);
        match sum {
            hex::ESCAPE => f.extend_from_slice(&[hex::ESCAPE, 0]),
            hex::START => f.extend_from_slice(&[hex::ESCAPE, 1]),
            s => f.push(s),
        }
        f
    }

    #[test]
    fn encode_power_on() {
        let codec = HexCodec::new(model());
        let frame = codec
            .encode(Zone::MAIN, LogicalCommand::PowerOn, None)
            .unwrap();
        let sum = 0x03u8
            .wrapping_add(0xA5)
            .wrapping_add(0x10)
            .wrapping_add(0x4B);
        assert_eq!(frame, vec![0xFE, 0x03, 0xA5, 0x10, 0x4B, sum]);
    }

    #[test]
    fn encode_value_replaces_key() {
        let codec = HexCodec::new(model());
        let frame = codec
            .encode(Zone::MAIN, LogicalCommand::VolumeSet, Some(42))
            .unwrap();
        assert_eq!(&frame[..5], &[0xFE, 0x03, 0xA5, 0x30, 42]);
        assert!(matches!(
            codec.encode(Zone::MAIN, LogicalCommand::VolumeSet, None),
            Err(Error::InvalidParameter(_))
        ));
    }

    #[test]
    fn encode_zone_command() {
        let codec = HexCodec::new(model());
        let frame = codec
            .encode(Zone::AUX1, LogicalCommand::VolumeUp, None)
            .unwrap();
        assert_eq!(&frame[..5], &[0xFE, 0x03, 0xA5, 0x16, 0x0B]);
    }

    #[test]
    fn encode_unsupported() {
        let codec = HexCodec::new(model());
        assert!(matches!(
            codec.encode(Zone::MAIN, LogicalCommand::BalanceSet, Some(3)),
            Err(Error::Unsupported(_))
        ));
        assert!(matches!(
            codec.encode(Zone::AUX2, LogicalCommand::VolumeUp, None),
            Err(Error::Unsupported(_))
        ));
    }

    #[test]
    fn checksum_escapes() {
        // 03 + 00 + 10 + key: pick keys landing on FD and FE.
        let fd = encode_frame(0x00, 0x10, 0xFD - 0x13);
        assert_eq!(&fd[5..], &[0xFD, 0x00]);
        let fe = encode_frame(0x00, 0x10, 0xFE - 0x13);
        assert_eq!(&fe[5..], &[0xFD, 0x01]);
    }

    #[test]
    fn decode_escaped_command_echo() {
        let model = Arc::new(DeviceModel {
            hex: HexLayout {
                device_id: 0x00,
                ..HexLayout::default()
            },
            ..DeviceModel::default()
        });
        let frame = encode_frame(0x00, 0x10, 0xFD - 0x13);
        assert_eq!(frame.len(), 7);
        assert_eq!(validate_frame(&model, &frame).unwrap(), 0x10);
        let mut codec = HexCodec::new(model);
        assert!(codec.decode(&frame).is_empty());
        assert_eq!(codec.consecutive_rejects(), 0);
    }

    #[test]
    fn decode_standard_response() {
        let mut codec = HexCodec::new(model());
        let events = codec.decode(&response("VOL 40"));
        assert!(events.contains(&FeedbackEvent::new("volume", "40")));
        assert!(events.contains(&FeedbackEvent::new("power", "on")));
    }

    #[test]
    fn decode_split_across_reads() {
        let mut codec = HexCodec::new(model());
        let frame = response("CD");
        let (a, b) = frame.split_at(7);
        assert!(codec.decode(a).is_empty());
        let events = codec.decode(b);
        assert!(events.contains(&FeedbackEvent::new("source", "cd")));
    }

    #[test]
    fn decode_skips_leading_garbage() {
        let mut codec = HexCodec::new(model());
        let mut data = vec![0x00, 0x42, 0x13];
        data.extend_from_slice(&response("MUTE ON"));
        let events = codec.decode(&data);
        assert!(events.contains(&FeedbackEvent::new("mute", "on")));
    }

    #[test]
    fn decode_rejects_wrong_device_id() {
        let mut codec = HexCodec::new(model());
        let mut frame = response("VOL 40");
        frame[2] = 0x11;
        assert!(codec.decode(&frame).is_empty());
        assert_eq!(codec.consecutive_rejects(), 1);
        // A good frame afterwards resets the count.
        assert!(!codec.decode(&response("VOL 41")).is_empty());
        assert_eq!(codec.consecutive_rejects(), 0);
    }

    #[test]
    fn validate_rejects_bad_checksum_and_count() {
        let m = model();
        let mut frame = response("VOL 40");
        let last = frame.len() - 1;
        frame[last] = frame[last].wrapping_add(1);
        assert!(validate_frame(&m, &frame).is_err());

        let mut frame = response("VOL 40");
        frame[1] = 14;
        assert!(validate_frame(&m, &frame).is_err());

        let mut frame = response("VOL 40");
        frame[3] = 0x99;
        assert!(validate_frame(&m, &frame).is_err());

        assert!(validate_frame(&m, &[0xFE, 0x03, 0xA5]).is_err());
    }

    #[test]
    fn encode_response_matches_layout() {
        let m = model();
        let frame = encode_response(&m, b"VOL 40", &[]);
        assert_eq!(frame, response("VOL 40"));
        assert_eq!(validate_frame(&m, &frame).unwrap(), hex::STANDARD_RESPONSE);
    }

    #[test]
    fn persistent_garbage_is_framing_failure() {
        let mut codec = HexCodec::new(model());
        let mut bad = response("VOL 40");
        bad[2] = 0x11;
        for _ in 0..=MAX_CONSECUTIVE_REJECTS {
            codec.decode(&bad);
        }
        assert!(codec.framing_failed());
        codec.reset();
        assert!(!codec.framing_failed());
    }
}
