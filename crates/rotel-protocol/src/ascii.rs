//! ASCII dialect encoder/decoder (V1 and V2).
//!
//! Commands are plain tokens terminated by `!` (`power_on!`, `vol_45!`);
//! queries in the V2 vocabulary end with `?` instead. Feedback is a stream
//! of `key=value` frames terminated by `!` (V1) or `$` (V2).
//!
//! V1 additionally sends the front-panel text as a length-prefixed frame,
//! `display=NNN,<NNN characters>`, whose text may itself contain the
//! terminator.

use std::sync::Arc;

use bytes::{BufMut, BytesMut};
use rotel_core::command::{LogicalCommand, NativeToken, ValueFormat};
use rotel_core::error::{Error, Result};
use rotel_core::events::FeedbackEvent;
use rotel_core::model::DeviceModel;
use rotel_core::types::{Dialect, Zone};
use tracing::{debug, trace, warn};

use crate::codec::WireCodec;
use crate::keys;

/// A partial frame longer than this is discarded.
pub const MAX_FRAME_LEN: usize = 256;

const DISPLAY_PREFIX: &[u8] = b"display=";
/// `display=` plus three length digits plus the comma.
const DISPLAY_HEADER_LEN: usize = 12;

/// Feedback terminator for `dialect`.
pub fn terminator(dialect: Dialect) -> u8 {
    match dialect {
        Dialect::AsciiV2 => b'$',
        _ => b'!',
    }
}

/// Address `base` to `zone` the way `dialect` does it: `zone2_vol_up` in
/// V1, `z2:vol_up` in V2. Main-zone tokens are unchanged.
pub fn zone_token(dialect: Dialect, zone: Zone, base: &str) -> String {
    if zone.is_main() {
        return base.to_string();
    }
    match dialect {
        Dialect::AsciiV1 => format!("zone{}_{}", zone.display_number(), base),
        Dialect::AsciiV2 => format!("z{}:{}", zone.display_number(), base),
        Dialect::Hex => base.to_string(),
    }
}

enum DisplayHeader {
    Incomplete,
    Length(usize),
    Invalid,
}

fn display_header(buf: &[u8]) -> DisplayHeader {
    let avail = &buf[DISPLAY_PREFIX.len()..buf.len().min(DISPLAY_HEADER_LEN)];
    for (i, b) in avail.iter().enumerate() {
        let ok = if i < 3 { b.is_ascii_digit() } else { *b == b',' };
        if !ok {
            return DisplayHeader::Invalid;
        }
    }
    if buf.len() < DISPLAY_HEADER_LEN {
        return DisplayHeader::Incomplete;
    }
    let digits = &buf[DISPLAY_PREFIX.len()..DISPLAY_PREFIX.len() + 3];
    let len = digits
        .iter()
        .fold(0usize, |acc, d| acc * 10 + usize::from(d - b'0'));
    DisplayHeader::Length(len)
}

fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

/// Codec for the two ASCII dialects.
pub struct AsciiCodec {
    dialect: Dialect,
    model: Arc<DeviceModel>,
    buf: Vec<u8>,
}

impl AsciiCodec {
    pub fn new(dialect: Dialect, model: Arc<DeviceModel>) -> Self {
        AsciiCodec {
            dialect,
            model,
            buf: Vec::new(),
        }
    }

    fn terminator(&self) -> u8 {
        terminator(self.dialect)
    }

    /// Try to take one length-prefixed display frame off the buffer.
    ///
    /// Returns `None` when the buffer does not start with a well-formed
    /// display header, `Some(false)` when more bytes are needed.
    fn take_display(&mut self, events: &mut Vec<FeedbackEvent>) -> Option<bool> {
        if self.dialect != Dialect::AsciiV1 || !self.buf.starts_with(DISPLAY_PREFIX) {
            return None;
        }
        let len = match display_header(&self.buf) {
            DisplayHeader::Invalid => return None,
            DisplayHeader::Incomplete => return Some(false),
            DisplayHeader::Length(len) => len,
        };
        let end = DISPLAY_HEADER_LEN + len;
        if self.buf.len() < end {
            return Some(false);
        }
        let text = latin1(&self.buf[DISPLAY_HEADER_LEN..end]);
        let mut consumed = end;
        if self.buf.get(end) == Some(&self.terminator()) {
            consumed += 1;
        }
        self.buf.drain(..consumed);

        if len >= 2 && len % 2 == 0 {
            let half: String = text.chars().take(len / 2).collect();
            let rest: String = text.chars().skip(len / 2).collect();
            events.push(FeedbackEvent::new(keys::LINE1, half));
            events.push(FeedbackEvent::new(keys::LINE2, rest));
        } else {
            events.push(FeedbackEvent::new(keys::LINE1, text));
        }
        Some(true)
    }

    fn parse_frame(&self, frame: &[u8]) -> Option<FeedbackEvent> {
        let text = latin1(frame);
        let Some((key, value)) = text.split_once('=') else {
            debug!(frame = %text, "discarding feedback without '='");
            return None;
        };
        let key = key.trim().to_ascii_lowercase();
        if key.is_empty() {
            debug!(frame = %text, "discarding feedback with empty key");
            return None;
        }
        let value = value.to_string();
        let event = match key.as_str() {
            keys::DISPLAY1 => FeedbackEvent::new(keys::LINE1, value),
            keys::DISPLAY2 => FeedbackEvent::new(keys::LINE2, value),
            _ => match keys::split_preset_key(&key) {
                Some((stem, Some(n))) => FeedbackEvent::with_preset(stem, value, n),
                Some((stem, None)) => FeedbackEvent::new(stem, value),
                None => FeedbackEvent::new(key, value),
            },
        };
        Some(event)
    }
}

impl WireCodec for AsciiCodec {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn encode(&self, zone: Zone, cmd: LogicalCommand, value: Option<i32>) -> Result<Vec<u8>> {
        let token = self
            .model
            .commands
            .lookup(self.dialect, zone, cmd)
            .ok_or_else(|| {
                Error::Unsupported(format!("{} in {} with {}", cmd, zone, self.dialect))
            })?;
        let NativeToken::Ascii { token, format } = token else {
            return Err(Error::Unsupported(format!(
                "{} has no {} encoding",
                cmd, self.dialect
            )));
        };

        let mut buf = BytesMut::with_capacity(token.len() + 5);
        buf.put_slice(token.as_bytes());
        if *format != ValueFormat::None {
            let v = value
                .ok_or_else(|| Error::InvalidParameter(format!("{} needs a value", cmd)))?;
            if let Some(rendered) = format.render(v) {
                buf.put_slice(rendered.as_bytes());
            }
        }
        if !token.ends_with('?') {
            buf.put_u8(b'!');
        }
        Ok(buf.to_vec())
    }

    fn decode(&mut self, data: &[u8]) -> Vec<FeedbackEvent> {
        trace!(bytes = ?data, "ASCII data");
        self.buf.extend_from_slice(data);
        let term = self.terminator();
        let mut events = Vec::new();

        loop {
            let skip = self
                .buf
                .iter()
                .take_while(|b| **b == b'\r' || **b == b'\n')
                .count();
            self.buf.drain(..skip);
            if self.buf.is_empty() {
                break;
            }

            match self.take_display(&mut events) {
                Some(true) => continue,
                Some(false) => break,
                None => {}
            }

            let Some(pos) = self.buf.iter().position(|&b| b == term) else {
                if self.buf.len() > MAX_FRAME_LEN {
                    warn!(len = self.buf.len(), "feedback buffer overflow, resetting");
                    self.buf.clear();
                }
                break;
            };
            let frame: Vec<u8> = self.buf.drain(..=pos).take(pos).collect();
            if let Some(event) = self.parse_frame(&frame) {
                debug!(%event, "feedback");
                events.push(event);
            }
        }
        events
    }

    fn reset(&mut self) {
        self.buf.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rotel_core::command::CommandTable;

    fn model() -> Arc<DeviceModel> {
        let mut commands = CommandTable::new();
        for dialect in [Dialect::AsciiV1, Dialect::AsciiV2] {
            commands.insert(dialect, Zone::MAIN, LogicalCommand::PowerOn, NativeToken::ascii("power_on"));
            commands.insert(
                dialect,
                Zone::MAIN,
                LogicalCommand::VolumeSet,
                NativeToken::ascii_with("vol_", ValueFormat::TwoDigits),
            );
            commands.insert(
                dialect,
                Zone::MAIN,
                LogicalCommand::BassSet,
                NativeToken::ascii_with("bass_", ValueFormat::SignedTone),
            );
            commands.insert(
                dialect,
                Zone::MAIN,
                LogicalCommand::BalanceSet,
                NativeToken::ascii_with("balance_", ValueFormat::Balance),
            );
            commands.insert(
                dialect,
                Zone::AUX1,
                LogicalCommand::VolumeUp,
                NativeToken::ascii(zone_token(dialect, Zone::AUX1, "vol_up")),
            );
        }
        commands.insert(
            Dialect::AsciiV2,
            Zone::MAIN,
            LogicalCommand::PowerGet,
            NativeToken::ascii("power?"),
        );
        Arc::new(DeviceModel {
            name: "test",
            dialects: vec![Dialect::AsciiV1, Dialect::AsciiV2],
            commands,
            ..DeviceModel::default()
        })
    }

    fn v1() -> AsciiCodec {
        AsciiCodec::new(Dialect::AsciiV1, model())
    }

    fn v2() -> AsciiCodec {
        AsciiCodec::new(Dialect::AsciiV2, model())
    }

    #[test]
    fn encode_plain_and_valued_commands() {
        let c = v1();
        assert_eq!(c.encode(Zone::MAIN, LogicalCommand::PowerOn, None).unwrap(), b"power_on!");
        assert_eq!(
            c.encode(Zone::MAIN, LogicalCommand::VolumeSet, Some(5)).unwrap(),
            b"vol_05!"
        );
        assert_eq!(
            c.encode(Zone::MAIN, LogicalCommand::BassSet, Some(-4)).unwrap(),
            b"bass_-04!"
        );
        assert_eq!(
            c.encode(Zone::MAIN, LogicalCommand::BalanceSet, Some(0)).unwrap(),
            b"balance_000!"
        );
        assert!(matches!(
            c.encode(Zone::MAIN, LogicalCommand::VolumeSet, None),
            Err(Error::InvalidParameter(_))
        ));
    }

    #[test]
    fn encode_zone_prefixes() {
        assert_eq!(
            v1().encode(Zone::AUX1, LogicalCommand::VolumeUp, None).unwrap(),
            b"zone2_vol_up!"
        );
        assert_eq!(
            v2().encode(Zone::AUX1, LogicalCommand::VolumeUp, None).unwrap(),
            b"z2:vol_up!"
        );
        assert_eq!(zone_token(Dialect::AsciiV2, Zone::MAIN, "mute"), "mute");
    }

    #[test]
    fn encode_query_has_no_bang() {
        assert_eq!(v2().encode(Zone::MAIN, LogicalCommand::PowerGet, None).unwrap(), b"power?");
    }

    #[test]
    fn encode_unsupported() {
        assert!(matches!(
            v1().encode(Zone::MAIN, LogicalCommand::PowerGet, None),
            Err(Error::Unsupported(_))
        ));
        assert!(matches!(
            v2().encode(Zone::AUX3, LogicalCommand::VolumeUp, None),
            Err(Error::Unsupported(_))
        ));
    }

    #[test]
    fn decode_v2_frames() {
        let mut c = v2();
        let events = c.decode(b"power=on$volume=45$");
        assert_eq!(
            events,
            vec![
                FeedbackEvent::new("power", "on"),
                FeedbackEvent::new("volume", "45")
            ]
        );
    }

    #[test]
    fn decode_split_terminator() {
        let mut c = v1();
        assert!(c.decode(b"source=cd").is_empty());
        assert_eq!(c.decode(b"!"), vec![FeedbackEvent::new("source", "cd")]);
    }

    #[test]
    fn decode_ignores_crlf() {
        let mut c = v1();
        let events = c.decode(b"\r\nmute=on!\r\nvolume=12!");
        assert_eq!(
            events,
            vec![FeedbackEvent::new("mute", "on"), FeedbackEvent::new("volume", "12")]
        );
    }

    #[test]
    fn decode_resyncs_after_malformed_frame() {
        let mut c = v2();
        let events = c.decode(b"garbage$=x$power=standby$");
        assert_eq!(events, vec![FeedbackEvent::new("power", "standby")]);
    }

    #[test]
    fn decode_overflow_discards_buffer() {
        let mut c = v2();
        let junk = vec![b'x'; MAX_FRAME_LEN + 1];
        assert!(c.decode(&junk).is_empty());
        assert_eq!(c.decode(b"power=on$"), vec![FeedbackEvent::new("power", "on")]);
    }

    #[test]
    fn decode_preset_keys() {
        let mut c = v2();
        let events = c.decode(b"fm_preset12=8790$dab_preset=none$");
        assert_eq!(
            events,
            vec![
                FeedbackEvent::with_preset("fm_preset", "8790", 12),
                FeedbackEvent::new("dab_preset", "none")
            ]
        );
    }

    #[test]
    fn decode_v1_display_frame_with_terminator_inside() {
        let mut c = v1();
        let events = c.decode(b"display=010,HI!! THERE!volume=20!");
        assert_eq!(
            events,
            vec![
                FeedbackEvent::new("line1", "HI!! "),
                FeedbackEvent::new("line2", "THERE"),
                FeedbackEvent::new("volume", "20"),
            ]
        );
    }

    #[test]
    fn decode_v1_display_split_and_odd() {
        let mut c = v1();
        assert!(c.decode(b"display=0").is_empty());
        assert!(c.decode(b"05,AB").is_empty());
        assert_eq!(c.decode(b"CDE"), vec![FeedbackEvent::new("line1", "ABCDE")]);
    }

    #[test]
    fn decode_display1_display2() {
        let mut c = v1();
        let events = c.decode(b"display1=TUNER!display2=FM 87.90!");
        assert_eq!(
            events,
            vec![
                FeedbackEvent::new("line1", "TUNER"),
                FeedbackEvent::new("line2", "FM 87.90")
            ]
        );
    }

    #[test]
    fn reset_drops_partial_frame() {
        let mut c = v1();
        assert!(c.decode(b"volume=4").is_empty());
        c.reset();
        assert_eq!(c.decode(b"mute=off!"), vec![FeedbackEvent::new("mute", "off")]);
    }
}
