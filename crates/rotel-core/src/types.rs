//! Core types used throughout rotel-rs.
//!
//! These types describe receiver state independently of the wire dialect
//! (HEX, ASCII V1, ASCII V2) the connected device happens to speak.

use std::fmt;
use std::str::FromStr;

/// Error returned when a token cannot be parsed into one of the enums in
/// this module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseTokenError {
    kind: &'static str,
    value: String,
}

impl ParseTokenError {
    fn new(kind: &'static str, value: &str) -> Self {
        ParseTokenError {
            kind,
            value: value.to_string(),
        }
    }
}

impl fmt::Display for ParseTokenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {}: {}", self.kind, self.value)
    }
}

impl std::error::Error for ParseTokenError {}

/// Maximum number of auxiliary zones a device can declare.
pub const MAX_AUX_ZONES: u8 = 4;

/// Number of slots in a per-zone array (main zone plus auxiliary zones).
pub const ZONE_SLOTS: usize = MAX_AUX_ZONES as usize + 1;

/// Zone index: 0 is the main zone (and device-wide state), 1-4 are
/// auxiliary zones.
///
/// Auxiliary zone `k` is what the device itself calls "zone k+1" on its
/// front panel and in feedback keys (`volume_zone2` is [`Zone::AUX1`]).
/// A `Zone` can only be built through the constants or [`Zone::new`], so
/// every value is a valid index into a `[T; ZONE_SLOTS]` array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Zone(u8);

impl Zone {
    /// Main zone.
    pub const MAIN: Zone = Zone(0);
    /// First auxiliary zone (device "zone 2").
    pub const AUX1: Zone = Zone(1);
    /// Second auxiliary zone (device "zone 3").
    pub const AUX2: Zone = Zone(2);
    /// Third auxiliary zone (device "zone 4").
    pub const AUX3: Zone = Zone(3);
    /// Fourth auxiliary zone (device "zone 5").
    pub const AUX4: Zone = Zone(4);

    /// Create a zone from a raw index, `None` if the index exceeds
    /// [`MAX_AUX_ZONES`].
    pub fn new(index: u8) -> Option<Self> {
        (index <= MAX_AUX_ZONES).then_some(Zone(index))
    }

    /// Create a zone from the device's own numbering (main = 1, first extra
    /// zone = 2, ...).
    pub fn from_display_number(number: u8) -> Option<Self> {
        number.checked_sub(1).and_then(Zone::new)
    }

    /// Raw index, 0 for the main zone.
    pub fn index(&self) -> u8 {
        self.0
    }

    /// Array slot for per-zone storage.
    pub fn slot(&self) -> usize {
        self.0 as usize
    }

    /// Zone number as shown by the device (main = 1).
    pub fn display_number(&self) -> u8 {
        self.0 + 1
    }

    /// Whether this is the main zone.
    pub fn is_main(&self) -> bool {
        self.0 == 0
    }

    /// Every zone, main first.
    pub fn all() -> [Zone; ZONE_SLOTS] {
        [Zone(0), Zone(1), Zone(2), Zone(3), Zone(4)]
    }

    /// The auxiliary zones `AUX1..=AUXn` for a device declaring `count`
    /// extra zones.
    pub fn auxiliaries(count: u8) -> impl Iterator<Item = Zone> {
        (1..=count.min(MAX_AUX_ZONES)).map(Zone)
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_main() {
            write!(f, "main")
        } else {
            write!(f, "zone{}", self.display_number())
        }
    }
}

/// Tri-state power of a zone.
///
/// `Unknown` is a first-class state: nothing has been heard from the device
/// since start or since the last reconnect. It must be rendered as
/// indeterminate, never as off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Power {
    #[default]
    Unknown,
    On,
    Off,
}

impl Power {
    pub fn is_on(&self) -> bool {
        matches!(self, Power::On)
    }
}

impl fmt::Display for Power {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Power::Unknown => "unknown",
            Power::On => "on",
            Power::Off => "off",
        };
        write!(f, "{s}")
    }
}

/// Wire format spoken by a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    /// Fixed-frame binary protocol (`FE` start byte, checksum).
    Hex,
    /// First-generation ASCII protocol, feedback terminated by `!`.
    AsciiV1,
    /// Second-generation ASCII protocol, feedback terminated by `$`.
    AsciiV2,
}

impl Dialect {
    /// Whether this is one of the two ASCII dialects.
    pub fn is_ascii(&self) -> bool {
        !matches!(self, Dialect::Hex)
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Dialect::Hex => "HEX",
            Dialect::AsciiV1 => "ASCII_V1",
            Dialect::AsciiV2 => "ASCII_V2",
        };
        write!(f, "{s}")
    }
}

impl FromStr for Dialect {
    type Err = ParseTokenError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hex" => Ok(Dialect::Hex),
            "ascii_v1" | "ascii-v1" | "v1" => Ok(Dialect::AsciiV1),
            "ascii_v2" | "ascii-v2" | "v2" => Ok(Dialect::AsciiV2),
            _ => Err(ParseTokenError::new("dialect", s)),
        }
    }
}

/// Connection status reported to the integration layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionStatus {
    /// Connected and hearing from the device.
    Online,
    /// Configuration cannot work; no automatic retry.
    OfflineConfigError,
    /// Communication failed; the reconnect supervisor keeps retrying.
    OfflineCommError,
}

impl ConnectionStatus {
    pub fn is_online(&self) -> bool {
        matches!(self, ConnectionStatus::Online)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionStatus::Online => "online",
            ConnectionStatus::OfflineConfigError => "offline (configuration error)",
            ConnectionStatus::OfflineCommError => "offline (communication error)",
        };
        write!(f, "{s}")
    }
}

/// Input source.
///
/// Each source has a wire token (used by ASCII feedback such as
/// `source=video1` and by the session to resolve it) and a default
/// front-panel label (used to recognise the source in HEX display text).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    Cd,
    Tuner,
    Fm,
    Dab,
    Iradio,
    Tape,
    Phono,
    Video1,
    Video2,
    Video3,
    Video4,
    Video5,
    Video6,
    Video7,
    Video8,
    Usb,
    PcUsb,
    Bluetooth,
    Optical1,
    Optical2,
    Coax1,
    Coax2,
    Aux1,
    Aux2,
    Network,
    Xlr,
    /// 7.1/5.1 analogue multi-channel input.
    Multi,
    /// Auxiliary zone follows the main zone's source.
    FollowMain,
}

impl Source {
    /// Every source, in declaration order.
    pub const ALL: [Source; 28] = [
        Source::Cd,
        Source::Tuner,
        Source::Fm,
        Source::Dab,
        Source::Iradio,
        Source::Tape,
        Source::Phono,
        Source::Video1,
        Source::Video2,
        Source::Video3,
        Source::Video4,
        Source::Video5,
        Source::Video6,
        Source::Video7,
        Source::Video8,
        Source::Usb,
        Source::PcUsb,
        Source::Bluetooth,
        Source::Optical1,
        Source::Optical2,
        Source::Coax1,
        Source::Coax2,
        Source::Aux1,
        Source::Aux2,
        Source::Network,
        Source::Xlr,
        Source::Multi,
        Source::FollowMain,
    ];

    /// Wire token used in ASCII feedback and in decoded HEX events.
    pub fn token(&self) -> &'static str {
        match self {
            Source::Cd => "cd",
            Source::Tuner => "tuner",
            Source::Fm => "fm",
            Source::Dab => "dab",
            Source::Iradio => "iradio",
            Source::Tape => "tape",
            Source::Phono => "phono",
            Source::Video1 => "video1",
            Source::Video2 => "video2",
            Source::Video3 => "video3",
            Source::Video4 => "video4",
            Source::Video5 => "video5",
            Source::Video6 => "video6",
            Source::Video7 => "video7",
            Source::Video8 => "video8",
            Source::Usb => "usb",
            Source::PcUsb => "pc_usb",
            Source::Bluetooth => "bluetooth",
            Source::Optical1 => "opt1",
            Source::Optical2 => "opt2",
            Source::Coax1 => "coax1",
            Source::Coax2 => "coax2",
            Source::Aux1 => "aux1",
            Source::Aux2 => "aux2",
            Source::Network => "network",
            Source::Xlr => "bal_xlr",
            Source::Multi => "multi_input",
            Source::FollowMain => "main",
        }
    }

    /// Default front-panel label.
    pub fn label(&self) -> &'static str {
        match self {
            Source::Cd => "CD",
            Source::Tuner => "TUNER",
            Source::Fm => "FM",
            Source::Dab => "DAB",
            Source::Iradio => "IRADIO",
            Source::Tape => "TAPE",
            Source::Phono => "PHONO",
            Source::Video1 => "VIDEO 1",
            Source::Video2 => "VIDEO 2",
            Source::Video3 => "VIDEO 3",
            Source::Video4 => "VIDEO 4",
            Source::Video5 => "VIDEO 5",
            Source::Video6 => "VIDEO 6",
            Source::Video7 => "VIDEO 7",
            Source::Video8 => "VIDEO 8",
            Source::Usb => "USB",
            Source::PcUsb => "PC-USB",
            Source::Bluetooth => "BLUETOOTH",
            Source::Optical1 => "OPTICAL 1",
            Source::Optical2 => "OPTICAL 2",
            Source::Coax1 => "COAX 1",
            Source::Coax2 => "COAX 2",
            Source::Aux1 => "AUX 1",
            Source::Aux2 => "AUX 2",
            Source::Network => "NETWORK",
            Source::Xlr => "XLR",
            Source::Multi => "MULTI",
            Source::FollowMain => "SOURCE",
        }
    }

    /// Look a source up by its wire token (case-insensitive).
    pub fn from_token(token: &str) -> Option<Source> {
        let token = token.trim();
        Source::ALL
            .iter()
            .copied()
            .find(|s| s.token().eq_ignore_ascii_case(token))
    }

    /// Whether this is a radio source with numbered presets.
    pub fn is_radio(&self) -> bool {
        matches!(self, Source::Tuner | Source::Fm | Source::Dab | Source::Iradio)
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl FromStr for Source {
    type Err = ParseTokenError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if let Some(source) = Source::from_token(s) {
            return Ok(source);
        }
        Source::ALL
            .iter()
            .copied()
            .find(|src| src.label().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseTokenError::new("source", s))
    }
}

/// Surround / DSP processing mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DspMode {
    /// Bypass, plain stereo, or a native bitstream format.
    #[default]
    None,
    Stereo3,
    Stereo5,
    Stereo7,
    Dsp1,
    Dsp2,
    Dsp3,
    Dsp4,
    PliiCinema,
    PliiMusic,
    PliiGame,
    Pliiz,
    ProLogic,
    Neo6Cinema,
    Neo6Music,
    Dolby,
    Dts,
}

impl DspMode {
    pub const ALL: [DspMode; 17] = [
        DspMode::None,
        DspMode::Stereo3,
        DspMode::Stereo5,
        DspMode::Stereo7,
        DspMode::Dsp1,
        DspMode::Dsp2,
        DspMode::Dsp3,
        DspMode::Dsp4,
        DspMode::PliiCinema,
        DspMode::PliiMusic,
        DspMode::PliiGame,
        DspMode::Pliiz,
        DspMode::ProLogic,
        DspMode::Neo6Cinema,
        DspMode::Neo6Music,
        DspMode::Dolby,
        DspMode::Dts,
    ];

    /// Feedback token (`dsp_mode=<token>`).
    pub fn token(&self) -> &'static str {
        match self {
            DspMode::None => "none",
            DspMode::Stereo3 => "dolby_3_stereo",
            DspMode::Stereo5 => "stereo5",
            DspMode::Stereo7 => "stereo7",
            DspMode::Dsp1 => "dsp1",
            DspMode::Dsp2 => "dsp2",
            DspMode::Dsp3 => "dsp3",
            DspMode::Dsp4 => "dsp4",
            DspMode::PliiCinema => "dolby_plii_movie",
            DspMode::PliiMusic => "dolby_plii_music",
            DspMode::PliiGame => "dolby_plii_game",
            DspMode::Pliiz => "dolby_pliiz",
            DspMode::ProLogic => "dolby_prologic",
            DspMode::Neo6Cinema => "dts_neo6_cinema",
            DspMode::Neo6Music => "dts_neo6_music",
            DspMode::Dolby => "dolby",
            DspMode::Dts => "dts",
        }
    }

    /// Resolve a feedback token. `bypass` and `stereo` are accepted as
    /// aliases of [`DspMode::None`].
    pub fn from_token(token: &str) -> Option<DspMode> {
        let token = token.trim();
        if token.eq_ignore_ascii_case("bypass") || token.eq_ignore_ascii_case("stereo") {
            return Some(DspMode::None);
        }
        DspMode::ALL
            .iter()
            .copied()
            .find(|m| m.token().eq_ignore_ascii_case(token))
    }
}

impl fmt::Display for DspMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.token())
    }
}

impl FromStr for DspMode {
    type Err = ParseTokenError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        DspMode::from_token(s).ok_or_else(|| ParseTokenError::new("DSP mode", s))
    }
}

/// Transport state of a disc/stream player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PlayStatus {
    Playing,
    Paused,
    #[default]
    Stopped,
}

impl FromStr for PlayStatus {
    type Err = ParseTokenError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "play" => Ok(PlayStatus::Playing),
            "pause" => Ok(PlayStatus::Paused),
            "stop" => Ok(PlayStatus::Stopped),
            _ => Err(ParseTokenError::new("play status", s)),
        }
    }
}

impl fmt::Display for PlayStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PlayStatus::Playing => "play",
            PlayStatus::Paused => "pause",
            PlayStatus::Stopped => "stop",
        };
        write!(f, "{s}")
    }
}

/// Repeat mode of a player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RepeatMode {
    #[default]
    Off,
    Track,
    Disc,
}

impl FromStr for RepeatMode {
    type Err = ParseTokenError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" => Ok(RepeatMode::Off),
            "track" => Ok(RepeatMode::Track),
            "disc" | "all" => Ok(RepeatMode::Disc),
            _ => Err(ParseTokenError::new("repeat mode", s)),
        }
    }
}

impl fmt::Display for RepeatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RepeatMode::Off => "off",
            RepeatMode::Track => "track",
            RepeatMode::Disc => "disc",
        };
        write!(f, "{s}")
    }
}

/// Which of the A/B speaker outputs are active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SpeakerGroups {
    pub a: bool,
    pub b: bool,
}

impl FromStr for SpeakerGroups {
    type Err = ParseTokenError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "a" => Ok(SpeakerGroups { a: true, b: false }),
            "b" => Ok(SpeakerGroups { a: false, b: true }),
            "a_b" | "ab" => Ok(SpeakerGroups { a: true, b: true }),
            "off" => Ok(SpeakerGroups::default()),
            _ => Err(ParseTokenError::new("speaker selection", s)),
        }
    }
}

impl fmt::Display for SpeakerGroups {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match (self.a, self.b) {
            (true, true) => "a_b",
            (true, false) => "a",
            (false, true) => "b",
            (false, false) => "off",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zone_constants_and_numbering() {
        assert!(Zone::MAIN.is_main());
        assert_eq!(Zone::MAIN.display_number(), 1);
        assert_eq!(Zone::AUX1.display_number(), 2);
        assert_eq!(Zone::AUX3.slot(), 3);
        assert_eq!(Zone::from_display_number(4), Some(Zone::AUX3));
        assert_eq!(Zone::from_display_number(0), None);
        assert_eq!(Zone::new(5), None);
        assert_eq!(Zone::new(4), Some(Zone::AUX4));
    }

    #[test]
    fn zone_display() {
        assert_eq!(Zone::MAIN.to_string(), "main");
        assert_eq!(Zone::AUX1.to_string(), "zone2");
    }

    #[test]
    fn zone_auxiliaries_are_bounded() {
        let zones: Vec<Zone> = Zone::auxiliaries(3).collect();
        assert_eq!(zones, vec![Zone::AUX1, Zone::AUX2, Zone::AUX3]);
        assert_eq!(Zone::auxiliaries(9).count(), 4);
        assert_eq!(Zone::auxiliaries(0).count(), 0);
    }

    #[test]
    fn power_default_is_unknown() {
        assert_eq!(Power::default(), Power::Unknown);
        assert!(!Power::Unknown.is_on());
        assert!(Power::On.is_on());
    }

    #[test]
    fn dialect_from_str() {
        assert_eq!("HEX".parse::<Dialect>().unwrap(), Dialect::Hex);
        assert_eq!("ascii_v1".parse::<Dialect>().unwrap(), Dialect::AsciiV1);
        assert_eq!("v2".parse::<Dialect>().unwrap(), Dialect::AsciiV2);
        let err = "rs485".parse::<Dialect>().unwrap_err();
        assert_eq!(err.to_string(), "unknown dialect: rs485");
    }

    #[test]
    fn source_token_and_label_lookup() {
        assert_eq!(Source::from_token("VIDEO1"), Some(Source::Video1));
        assert_eq!(Source::from_token("multi_input"), Some(Source::Multi));
        assert_eq!(Source::from_token("nope"), None);
        assert_eq!("VIDEO 3".parse::<Source>().unwrap(), Source::Video3);
        assert_eq!("pc_usb".parse::<Source>().unwrap(), Source::PcUsb);
    }

    #[test]
    fn source_tokens_are_unique() {
        for (i, a) in Source::ALL.iter().enumerate() {
            for b in &Source::ALL[i + 1..] {
                assert_ne!(a.token(), b.token());
            }
        }
    }

    #[test]
    fn dsp_aliases() {
        assert_eq!(DspMode::from_token("bypass"), Some(DspMode::None));
        assert_eq!(DspMode::from_token("stereo"), Some(DspMode::None));
        assert_eq!(
            DspMode::from_token("dolby_plii_game"),
            Some(DspMode::PliiGame)
        );
        assert_eq!(DspMode::from_token("dolby_pliix_game"), None);
    }

    #[test]
    fn play_status_and_repeat_parse() {
        assert_eq!("PLAY".parse::<PlayStatus>().unwrap(), PlayStatus::Playing);
        assert!("rewind".parse::<PlayStatus>().is_err());
        assert_eq!("all".parse::<RepeatMode>().unwrap(), RepeatMode::Disc);
    }

    #[test]
    fn speaker_groups_parse_and_display() {
        let ab: SpeakerGroups = "a_b".parse().unwrap();
        assert!(ab.a && ab.b);
        assert_eq!(ab.to_string(), "a_b");
        assert_eq!("off".parse::<SpeakerGroups>().unwrap().to_string(), "off");
        assert!("c".parse::<SpeakerGroups>().is_err());
    }
}
