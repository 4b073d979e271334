//! Interpretation of HEX standard-response display frames.
//!
//! HEX receivers do not report state as key/value pairs. Instead every
//! change is echoed as a snapshot of the front-panel display plus a few
//! flag bytes. This module scrapes that text for volume, mute, tone, DSP
//! mode, source and zone information and turns it into the same feedback
//! keys the ASCII dialects produce.

use rotel_core::events::FeedbackEvent;
use rotel_core::model::DeviceModel;
use rotel_core::types::{DspMode, Source, Zone};
use tracing::debug;

use crate::keys;

const VOLUME_PREFIXES: [&str; 2] = ["volume ", "vol "];
const MUTE_PREFIX: &str = "mute ";
const BASS_PREFIXES: [&str; 2] = ["bass ", "lf "];
const TREBLE_PREFIXES: [&str; 2] = ["treble ", "hf "];
const MULTI_IN_PREFIX: &str = "multi in ";
const BYPASS_PREFIX: &str = "bypass";
const STEREO_PREFIX: &str = "stereo";
const RECORD_PREFIX: &str = "rec ";
const FOLLOW_MAIN_TEXT: &str = "source";

/// Zone prefixes and the device zone number they designate. `zone ` and
/// `zone2 ` both address zone 2.
const ZONE_PREFIXES: [(&str, u8); 4] = [("zone ", 2), ("zone2 ", 2), ("zone3 ", 3), ("zone4 ", 4)];

/// DSP display prefixes, tried in order after `bypass` and `stereo`.
const DSP_PREFIXES: &[(&[&str], DspMode)] = &[
    (&["3 stereo", "dolby 3 stereo"], DspMode::Stereo3),
    (&["5ch stereo"], DspMode::Stereo5),
    (&["7ch stereo"], DspMode::Stereo7),
    (&["music 1", "dsp 1"], DspMode::Dsp1),
    (&["music 2", "dsp 2"], DspMode::Dsp2),
    (&["music 3", "dsp 3"], DspMode::Dsp3),
    (&["music 4", "dsp 4"], DspMode::Dsp4),
    (
        &["prologic  cin", "dolby pl  c", "pl x cinema", "dolby pl x c"],
        DspMode::PliiCinema,
    ),
    (
        &["prologic  mus", "dolby pl  m", "pl x music", "dolby pl x m"],
        DspMode::PliiMusic,
    ),
    (
        &["prologic  gam", "dolby pl  g", "pl x game", "dolby pl x g"],
        DspMode::PliiGame,
    ),
    (&["dolby pl z"], DspMode::Pliiz),
    (&["prologic  emu", "dolby pro logic"], DspMode::ProLogic),
    (&["neo 6 cinema", "dts neo:6 c"], DspMode::Neo6Cinema),
    (&["neo 6 music", "dts neo:6 m"], DspMode::Neo6Music),
];

/// Native bitstream formats. The receiver is not post-processing, so these
/// all report as no DSP mode.
const PASSTHROUGH_PREFIXES: [&str; 8] = [
    "dts-es",
    "dts 96",
    "dts",
    "dolby d ex",
    "dolby digital",
    "lpcm",
    "pcm",
    "mpeg",
];

/// Which kinds of information a text segment may hold.
#[derive(Debug, Clone, Copy, Default)]
struct Search {
    source: bool,
    multi_in: bool,
    zone: bool,
    record: bool,
    record_after_source: bool,
    dsp: bool,
    stereo: bool,
    /// The segment shares the display with other information, so a source
    /// match does not imply the zone is unmuted.
    multiple_info: bool,
}

/// Decode one validated standard-response frame into feedback events.
///
/// `frame` is the complete frame including start byte and checksum; its
/// length has already been checked against the model's layout.
pub fn interpret_standard_response(model: &DeviceModel, frame: &[u8]) -> Vec<FeedbackEvent> {
    let layout = &model.hex;
    let flags_start = layout.flags_offset();
    let chars_start = layout.chars_offset();
    let flags = frame
        .get(flags_start..flags_start + layout.flags)
        .unwrap_or(&[]);
    let display: Vec<char> = frame
        .get(chars_start..chars_start + layout.chars)
        .unwrap_or(&[])
        .iter()
        .map(|&b| if b < 0x20 { ' ' } else { char::from(b) })
        .collect();

    let mut parser = DisplayParser::new(model);
    let text: String = display.iter().collect();
    debug!(text = %text, flags = ?flags, "HEX display frame");

    for (i, bit) in model.hex_flags.zone_power.iter().enumerate() {
        if let Some(bit) = bit {
            let zone = Zone::new(i as u8 + 1).unwrap_or(Zone::AUX1);
            let value = if bit.is_set(flags) { keys::ON } else { keys::STANDBY };
            parser.emit(keys::zone_key(keys::POWER, zone), value);
        }
    }

    let mut check_source = true;
    let mut check_multi_in = false;
    match model.hex_flags.multi_input {
        Some(bit) if bit.is_set(flags) => {
            parser.emit_source(keys::SOURCE, Source::Multi);
            check_source = false;
        }
        Some(_) => {}
        None => check_multi_in = true,
    }
    let check_stereo = match model.hex_flags.more_than_two_channels {
        Some(bit) => !bit.is_set(flags),
        None => true,
    };

    let lower = text.trim().to_ascii_lowercase();
    let zone_display = ZONE_PREFIXES.iter().any(|(p, _)| lower.starts_with(p));
    if !lower.is_empty() && !zone_display {
        parser.emit(keys::POWER, keys::ON);
    }

    if layout.chars == 42 {
        parser.parse_text(
            &segment(&display, 0, 14),
            Search {
                source: check_source,
                multi_in: check_multi_in,
                multiple_info: true,
                ..Search::default()
            },
        );
        let multi = Search {
            multiple_info: true,
            ..Search::default()
        };
        parser.parse_text(&segment(&display, 14, 21), multi);
        parser.emit(keys::LINE1, segment(&display, 0, 21));
        parser.parse_text(&segment(&display, 35, 42), multi);
        parser.parse_text(
            &segment(&display, 21, 42),
            Search {
                zone: true,
                record: true,
                dsp: true,
                stereo: true,
                multiple_info: true,
                ..Search::default()
            },
        );
        parser.emit(keys::LINE2, segment(&display, 21, 42));
    } else {
        parser.parse_text(
            &text,
            Search {
                source: check_source,
                multi_in: check_multi_in,
                zone: true,
                record_after_source: true,
                dsp: true,
                stereo: check_stereo,
                ..Search::default()
            },
        );
        parser.emit(keys::LINE1, text.clone());
    }

    if lower.is_empty() {
        parser.emit(keys::POWER, keys::POWER_OFF_DELAYED);
    }

    parser.events
}

fn segment(display: &[char], start: usize, end: usize) -> String {
    let end = end.min(display.len());
    let start = start.min(end);
    display[start..end].iter().collect()
}

/// Collapse the blanks between a leading sign and the digits: `"+ 3"` → `"+3"`.
fn extract_number(text: &str, prefix_len: usize) -> String {
    let rest = text.get(prefix_len..).unwrap_or("").trim();
    match rest.chars().next() {
        Some(sign @ ('+' | '-')) => format!("{}{}", sign, rest[1..].trim_start()),
        _ => rest.to_string(),
    }
}

fn matched_prefix<'p>(lower: &str, prefixes: &[&'p str]) -> Option<&'p str> {
    prefixes.iter().copied().find(|p| lower.starts_with(p))
}

struct DisplayParser<'a> {
    model: &'a DeviceModel,
    events: Vec<FeedbackEvent>,
}

impl<'a> DisplayParser<'a> {
    fn new(model: &'a DeviceModel) -> Self {
        DisplayParser {
            model,
            events: Vec::new(),
        }
    }

    fn emit(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.events.push(FeedbackEvent::new(key, value));
    }

    /// Emit a source key, provided the model declares the source.
    fn emit_source(&mut self, key: impl Into<String>, source: Source) -> bool {
        if self.model.has_source(source) {
            self.emit(key, source.token());
            true
        } else {
            false
        }
    }

    fn parse_text(&mut self, text: &str, search: Search) {
        let value = text.trim();
        let lower = value.to_ascii_lowercase();

        if search.record {
            let on = lower.starts_with(RECORD_PREFIX);
            self.emit(keys::RECORD_SEL, if on { keys::ON } else { keys::OFF });
        }
        if search.zone {
            let number = ZONE_PREFIXES
                .iter()
                .find(|(p, _)| lower.starts_with(p))
                .map_or(1, |(_, n)| *n);
            self.emit(keys::ZONE, number.to_string());
        }

        if let Some(p) = matched_prefix(&lower, &VOLUME_PREFIXES) {
            self.emit(keys::VOLUME, extract_number(value, p.len()));
            self.emit(keys::MUTE, keys::OFF);
        } else if lower.starts_with(MUTE_PREFIX) {
            let rest = value[MUTE_PREFIX.len()..].trim();
            if rest.eq_ignore_ascii_case(keys::ON) {
                self.emit(keys::MUTE, keys::ON);
            } else {
                debug!(value = rest, "invalid mute text");
            }
        } else if let Some(p) = matched_prefix(&lower, &BASS_PREFIXES) {
            self.emit(keys::BASS, extract_number(value, p.len()));
        } else if let Some(p) = matched_prefix(&lower, &TREBLE_PREFIXES) {
            self.emit(keys::TREBLE, extract_number(value, p.len()));
        } else if search.multi_in && lower.starts_with(MULTI_IN_PREFIX) {
            let rest = value[MULTI_IN_PREFIX.len()..].trim();
            if rest.eq_ignore_ascii_case(keys::ON) {
                self.emit_source(keys::SOURCE, Source::Multi);
            } else if !rest.eq_ignore_ascii_case(keys::OFF) {
                debug!(value = rest, "invalid multi input text");
            }
        } else if search.dsp && lower.starts_with(BYPASS_PREFIX) {
            self.emit(keys::DSP_MODE, DspMode::None.token());
        } else if search.dsp && search.stereo && lower.starts_with(STEREO_PREFIX) {
            self.emit(keys::DSP_MODE, DspMode::None.token());
        } else if let Some(mode) = search
            .dsp
            .then(|| dsp_from_text(&lower))
            .flatten()
        {
            self.emit(keys::DSP_MODE, mode.token());
        } else if let Some((prefix, number)) = search
            .zone
            .then(|| ZONE_PREFIXES.iter().find(|(p, _)| lower.starts_with(p)))
            .flatten()
        {
            if let Some(zone) = Zone::from_display_number(*number) {
                self.parse_zone(zone, &value[prefix.len()..], search.multiple_info);
            }
        } else if search.record && lower.starts_with(RECORD_PREFIX) {
            self.parse_record(&value[RECORD_PREFIX.len()..]);
        } else if search.source || search.record_after_source {
            self.parse_source_and_record(value, search);
        }
    }

    /// Longest source label the text starts with. With `accept_follow_main`,
    /// the bare word `source` means "follow the main zone".
    fn parse_source(&self, text: &str, accept_follow_main: bool) -> Option<Source> {
        let value = text.trim();
        if value.is_empty() {
            return None;
        }
        if accept_follow_main && value.eq_ignore_ascii_case(FOLLOW_MAIN_TEXT) {
            return self
                .model
                .has_source(Source::FollowMain)
                .then_some(Source::FollowMain);
        }
        self.model
            .sources
            .iter()
            .filter(|e| e.source != Source::FollowMain && value.starts_with(e.label))
            .max_by_key(|e| e.label.len())
            .map(|e| e.source)
    }

    fn parse_source_and_record(&mut self, text: &str, search: Search) {
        let Some(source) = self.parse_source(text, false) else {
            return;
        };
        if search.source {
            self.emit(keys::SOURCE, source.token());
            if !search.multiple_info {
                self.emit(keys::MUTE, keys::OFF);
            }
        }
        if search.record_after_source {
            let label_len = self
                .model
                .source_label(source)
                .unwrap_or(source.label())
                .len();
            let rest = text.get(label_len..).unwrap_or("");
            if let Some(record) = self.parse_source(rest, true) {
                self.emit(keys::RECORD, record.token());
            }
        }
    }

    fn parse_record(&mut self, text: &str) {
        match self.parse_source(text, true) {
            Some(source) => self.emit(keys::RECORD, source.token()),
            None => debug!(value = text.trim(), "invalid record source text"),
        }
    }

    fn parse_zone(&mut self, zone: Zone, text: &str, multiple_info: bool) {
        let value = text.trim();
        let lower = value.to_ascii_lowercase();
        if let Some(p) = matched_prefix(&lower, &VOLUME_PREFIXES) {
            self.emit(keys::zone_key(keys::VOLUME, zone), extract_number(value, p.len()));
            self.emit(keys::zone_key(keys::MUTE, zone), keys::OFF);
        } else if lower.starts_with(MUTE_PREFIX) {
            let rest = value[MUTE_PREFIX.len()..].trim();
            if rest.eq_ignore_ascii_case(keys::ON) {
                self.emit(keys::zone_key(keys::MUTE, zone), keys::ON);
            } else {
                debug!(%zone, value = rest, "invalid zone mute text");
            }
        } else if !value.eq_ignore_ascii_case(keys::OFF) {
            match self.parse_source(value, true) {
                Some(source) => {
                    self.emit(keys::zone_key(keys::SOURCE, zone), source.token());
                    if !multiple_info {
                        self.emit(keys::zone_key(keys::MUTE, zone), keys::OFF);
                    }
                }
                None => debug!(%zone, value, "invalid zone source text"),
            }
        }
    }
}

fn dsp_from_text(lower: &str) -> Option<DspMode> {
    for (prefixes, mode) in DSP_PREFIXES {
        if matched_prefix(lower, prefixes).is_some() {
            return Some(*mode);
        }
    }
    if let Some(format) = matched_prefix(lower, &PASSTHROUGH_PREFIXES) {
        debug!(format, "native bitstream format");
        return Some(DspMode::None);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use rotel_core::model::{FlagBit, HexFlags, HexLayout, SourceEntry};

    fn model(chars: usize, flags: usize) -> DeviceModel {
        DeviceModel {
            name: "test",
            extra_zones: 3,
            hex: HexLayout {
                device_id: 0xC2,
                chars,
                flags,
                chars_before_flags: true,
            },
            sources: vec![
                SourceEntry::standard(Source::Cd),
                SourceEntry::standard(Source::Tuner),
                SourceEntry::standard(Source::Video1),
                SourceEntry::labelled(Source::Video2, "VIDEO 2"),
                SourceEntry::labelled(Source::Tape, "TAPE"),
                SourceEntry::standard(Source::Multi),
                SourceEntry::standard(Source::FollowMain),
            ],
            ..DeviceModel::default()
        }
    }

    /// Build a standard-response frame around `text` padded to the layout.
    fn frame(model: &DeviceModel, text: &str, flags: &[u8]) -> Vec<u8> {
        let mut f = vec![0xFE, 0, model.hex.device_id, 0x20];
        let mut chars = text.as_bytes().to_vec();
        chars.resize(model.hex.chars, b' ');
        let mut flag_bytes = flags.to_vec();
        flag_bytes.resize(model.hex.flags, 0);
        if model.hex.chars_before_flags {
            f.extend_from_slice(&chars);
            f.extend_from_slice(&flag_bytes);
        } else {
            f.extend_from_slice(&flag_bytes);
            f.extend_from_slice(&chars);
        }
        f.push(0);
        f
    }

    fn pairs(events: &[FeedbackEvent]) -> Vec<(String, String)> {
        events
            .iter()
            .map(|e| (e.key.clone(), e.value.clone()))
            .collect()
    }

    fn has(events: &[FeedbackEvent], key: &str, value: &str) -> bool {
        events.iter().any(|e| e.key == key && e.value == value)
    }

    #[test]
    fn volume_display() {
        let m = model(13, 0);
        let events = interpret_standard_response(&m, &frame(&m, "VOLUME  45", &[]));
        assert_eq!(
            pairs(&events),
            vec![
                ("power".into(), "on".into()),
                ("zone".into(), "1".into()),
                ("volume".into(), "45".into()),
                ("mute".into(), "off".into()),
                ("line1".into(), "VOLUME  45   ".into()),
            ]
        );
    }

    #[test]
    fn signed_tone_collapses_blanks() {
        let m = model(13, 0);
        let events = interpret_standard_response(&m, &frame(&m, "BASS  + 3", &[]));
        assert!(has(&events, "bass", "+3"));
        let events = interpret_standard_response(&m, &frame(&m, "HF -  2", &[]));
        assert!(has(&events, "treble", "-2"));
    }

    #[test]
    fn mute_on_display() {
        let m = model(13, 0);
        let events = interpret_standard_response(&m, &frame(&m, "MUTE ON", &[]));
        assert!(has(&events, "mute", "on"));
        let events = interpret_standard_response(&m, &frame(&m, "MUTE ???", &[]));
        assert!(!events.iter().any(|e| e.key == "mute"));
    }

    #[test]
    fn source_uses_longest_label() {
        let m = model(13, 0);
        let events = interpret_standard_response(&m, &frame(&m, "VIDEO 2", &[]));
        assert!(has(&events, "source", "video2"));
        assert!(has(&events, "mute", "off"));
    }

    #[test]
    fn record_source_after_label() {
        let m = model(13, 0);
        let events = interpret_standard_response(&m, &frame(&m, "CD     TAPE", &[]));
        assert!(has(&events, "source", "cd"));
        assert!(has(&events, "record", "tape"));

        let events = interpret_standard_response(&m, &frame(&m, "CD   SOURCE", &[]));
        assert!(has(&events, "record", "main"));
    }

    #[test]
    fn dsp_modes() {
        let m = model(13, 0);
        let cases = [
            ("DOLBY PL  C", "dolby_plii_movie"),
            ("PL X MUSIC", "dolby_plii_music"),
            ("DOLBY PL Z", "dolby_pliiz"),
            ("DTS NEO:6 C", "dts_neo6_cinema"),
            ("5CH STEREO", "stereo5"),
            ("DSP 3", "dsp3"),
            ("DOLBY DIGITAL", "none"),
            ("BYPASS", "none"),
            ("STEREO", "none"),
        ];
        for (text, token) in cases {
            let events = interpret_standard_response(&m, &frame(&m, text, &[]));
            assert!(has(&events, "dsp_mode", token), "{text}: {events:?}");
        }
    }

    #[test]
    fn stereo_ignored_with_more_than_two_channels() {
        let mut m = model(13, 1);
        m.hex_flags.more_than_two_channels = Some(FlagBit::new(0, 0x01));
        let events = interpret_standard_response(&m, &frame(&m, "STEREO", &[0x01]));
        assert!(!events.iter().any(|e| e.key == "dsp_mode"));
        let events = interpret_standard_response(&m, &frame(&m, "STEREO", &[0x00]));
        assert!(has(&events, "dsp_mode", "none"));
    }

    #[test]
    fn zone_display_does_not_power_main() {
        let m = model(13, 0);
        let events = interpret_standard_response(&m, &frame(&m, "ZONE3 VOL 20", &[]));
        assert!(!events.iter().any(|e| e.key == "power"));
        assert!(has(&events, "zone", "3"));
        assert!(has(&events, "volume_zone3", "20"));
        assert!(has(&events, "mute_zone3", "off"));

        let events = interpret_standard_response(&m, &frame(&m, "ZONE SOURCE", &[]));
        assert!(has(&events, "zone", "2"));
        assert!(has(&events, "source_zone2", "main"));

        let events = interpret_standard_response(&m, &frame(&m, "ZONE4 OFF", &[]));
        assert!(!events.iter().any(|e| e.key.starts_with("source")));
    }

    #[test]
    fn blank_display_signals_power_off() {
        let m = model(13, 0);
        let events = interpret_standard_response(&m, &frame(&m, "", &[]));
        assert_eq!(events.last(), Some(&FeedbackEvent::new("power", "off_delayed")));
        assert!(!has(&events, "power", "on"));
    }

    #[test]
    fn zone_power_and_multi_input_flags() {
        let mut m = model(13, 2);
        m.hex_flags = HexFlags {
            zone_power: [Some(FlagBit::new(0, 0x01)), Some(FlagBit::new(0, 0x02)), None],
            multi_input: Some(FlagBit::new(1, 0x80)),
            more_than_two_channels: None,
        };
        let events = interpret_standard_response(&m, &frame(&m, "CD", &[0x01, 0x80]));
        assert!(has(&events, "power_zone2", "on"));
        assert!(has(&events, "power_zone3", "standby"));
        assert!(has(&events, "source", "multi_input"));
        // Source search is disabled while multi input is active.
        assert!(!has(&events, "source", "cd"));
    }

    #[test]
    fn multi_in_text_without_flag() {
        let m = model(13, 0);
        let events = interpret_standard_response(&m, &frame(&m, "MULTI IN ON", &[]));
        assert!(has(&events, "source", "multi_input"));
    }

    #[test]
    fn wide_display_splits_lines() {
        let m = model(42, 0);
        let mut text = String::new();
        text.push_str(&format!("{:<14}", "TUNER"));
        text.push_str(&format!("{:<7}", ""));
        text.push_str(&format!("{:<14}", "REC CD"));
        text.push_str(&format!("{:<7}", "VOL 32"));
        let events = interpret_standard_response(&m, &frame(&m, &text, &[]));
        // The source shares the display with other information, so it is
        // not followed by an implied unmute.
        let source_at = events.iter().position(|e| e.key == "source").unwrap();
        assert_eq!(events[source_at].value, "tuner");
        assert_ne!(events[source_at + 1].key, "mute");
        assert!(has(&events, "line1", &text[..21]));
        assert!(has(&events, "line2", &text[21..]));
        assert!(has(&events, "volume", "32"));
        assert!(has(&events, "record_sel", "on"));
        assert!(has(&events, "record", "cd"));
    }

    #[test]
    fn control_characters_become_spaces() {
        let m = model(13, 0);
        let mut f = frame(&m, "CD", &[]);
        f[6] = 0x01;
        let events = interpret_standard_response(&m, &f);
        assert!(has(&events, "line1", "CD           "));
    }

    #[test]
    fn extract_number_variants() {
        assert_eq!(extract_number("VOL 45", 4), "45");
        assert_eq!(extract_number("BASS +  5", 5), "+5");
        assert_eq!(extract_number("LF - 10", 3), "-10");
        assert_eq!(extract_number("VOL", 4), "");
    }
}
