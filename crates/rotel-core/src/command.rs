//! Logical commands and the per-dialect command table.
//!
//! A [`LogicalCommand`] names what the caller wants (raise volume, select
//! VIDEO 2) independently of the wire format. Each [`DeviceModel`] carries a
//! [`CommandTable`] that maps `(dialect, zone, command)` to the
//! [`NativeToken`] the device understands. A missing entry means the command
//! is unsupported for that combination; the command sequencer turns that into
//! a silent no-op.
//!
//! [`DeviceModel`]: crate::model::DeviceModel

use std::collections::HashMap;
use std::fmt;

use crate::types::{Dialect, DspMode, Source, Zone};

/// Frame constants of the HEX dialect.
pub mod hex {
    /// Start-of-frame marker.
    pub const START: u8 = 0xFE;
    /// Escape marker for checksum bytes equal to `FD` or `FE`.
    pub const ESCAPE: u8 = 0xFD;

    pub const PRIMARY_CMD: u8 = 0x10;
    pub const MAIN_ZONE_CMD: u8 = 0x14;
    pub const RECORD_SRC_CMD: u8 = 0x15;
    pub const ZONE2_CMD: u8 = 0x16;
    pub const ZONE3_CMD: u8 = 0x17;
    pub const ZONE4_CMD: u8 = 0x18;
    pub const VOLUME_CMD: u8 = 0x30;
    pub const ZONE2_VOLUME_CMD: u8 = 0x32;
    pub const ZONE3_VOLUME_CMD: u8 = 0x33;
    pub const ZONE4_VOLUME_CMD: u8 = 0x34;
    pub const TRIGGER_CMD: u8 = 0x40;

    pub const STANDARD_RESPONSE: u8 = 0x20;
    pub const TRIGGER_STATUS: u8 = 0x21;
    pub const SMART_DISPLAY_DATA_1: u8 = 0x22;
    pub const SMART_DISPLAY_DATA_2: u8 = 0x23;

    /// Command-type byte for a zone-addressed command, `None` for the main
    /// zone or a zone beyond the third auxiliary one.
    pub fn zone_cmd(aux_index: u8) -> Option<u8> {
        match aux_index {
            1 => Some(ZONE2_CMD),
            2 => Some(ZONE3_CMD),
            3 => Some(ZONE4_CMD),
            _ => None,
        }
    }

    /// Command-type byte for a direct zone volume command.
    pub fn zone_volume_cmd(aux_index: u8) -> Option<u8> {
        match aux_index {
            0 => Some(VOLUME_CMD),
            1 => Some(ZONE2_VOLUME_CMD),
            2 => Some(ZONE3_VOLUME_CMD),
            3 => Some(ZONE4_VOLUME_CMD),
            _ => None,
        }
    }

    /// Whether `kind` is a type byte the decoder accepts.
    pub fn is_known_type(kind: u8) -> bool {
        matches!(
            kind,
            PRIMARY_CMD
                | MAIN_ZONE_CMD
                | RECORD_SRC_CMD
                | ZONE2_CMD
                | ZONE3_CMD
                | ZONE4_CMD
                | VOLUME_CMD
                | ZONE2_VOLUME_CMD
                | ZONE3_VOLUME_CMD
                | ZONE4_VOLUME_CMD
                | TRIGGER_CMD
                | STANDARD_RESPONSE
                | TRIGGER_STATUS
                | SMART_DISPLAY_DATA_1
                | SMART_DISPLAY_DATA_2
        )
    }
}

/// A dialect-independent command identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalCommand {
    PowerToggle,
    PowerOn,
    PowerOff,
    /// Power state query. On HEX devices this is a display refresh.
    PowerGet,

    /// Cycle the shared front-panel display to the next zone.
    ZoneSelect,
    RecordFunctionSelect,
    ToneControlSelect,

    SourceSelect(Source),
    RecordSourceSelect(Source),
    SourceGet,

    VolumeUp,
    VolumeDown,
    VolumeSet,
    VolumeGet,
    VolumeGetMin,
    VolumeGetMax,

    MuteToggle,
    MuteOn,
    MuteOff,
    MuteGet,

    BassUp,
    BassDown,
    BassSet,
    BassGet,
    TrebleUp,
    TrebleDown,
    TrebleSet,
    TrebleGet,
    ToneMaxGet,
    ToneBypassOn,
    ToneBypassOff,
    ToneBypassGet,

    BalanceLeft,
    BalanceRight,
    BalanceSet,
    BalanceGet,

    DspSelect(DspMode),
    DspModeGet,

    Play,
    Pause,
    Stop,
    TrackForward,
    TrackBackward,
    PlayStatusGet,
    CdPlayStatusGet,
    TrackGet,
    RandomToggle,
    RandomGet,
    RepeatToggle,
    RepeatGet,

    FrequencyGet,
    /// Current preset of a radio source.
    PresetGet(Source),

    DimmerSet,
    DimmerGet,

    UpdateAuto,
    UpdateManual,
    DisplayRefresh,

    SpeakerGet,
    SpeakerAToggle,
    SpeakerBToggle,

    ModelGet,
    VersionGet,
}

impl LogicalCommand {
    /// Whether the command carries an integer argument.
    pub fn takes_value(&self) -> bool {
        matches!(
            self,
            LogicalCommand::VolumeSet
                | LogicalCommand::BassSet
                | LogicalCommand::TrebleSet
                | LogicalCommand::BalanceSet
                | LogicalCommand::DimmerSet
        )
    }

    /// Whether the command only queries state.
    pub fn is_query(&self) -> bool {
        matches!(
            self,
            LogicalCommand::PowerGet
                | LogicalCommand::SourceGet
                | LogicalCommand::VolumeGet
                | LogicalCommand::VolumeGetMin
                | LogicalCommand::VolumeGetMax
                | LogicalCommand::MuteGet
                | LogicalCommand::BassGet
                | LogicalCommand::TrebleGet
                | LogicalCommand::ToneMaxGet
                | LogicalCommand::ToneBypassGet
                | LogicalCommand::BalanceGet
                | LogicalCommand::DspModeGet
                | LogicalCommand::PlayStatusGet
                | LogicalCommand::CdPlayStatusGet
                | LogicalCommand::TrackGet
                | LogicalCommand::RandomGet
                | LogicalCommand::RepeatGet
                | LogicalCommand::FrequencyGet
                | LogicalCommand::PresetGet(_)
                | LogicalCommand::DimmerGet
                | LogicalCommand::SpeakerGet
                | LogicalCommand::ModelGet
                | LogicalCommand::VersionGet
        )
    }
}

impl fmt::Display for LogicalCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicalCommand::SourceSelect(s) => write!(f, "SourceSelect({})", s.token()),
            LogicalCommand::RecordSourceSelect(s) => {
                write!(f, "RecordSourceSelect({})", s.token())
            }
            LogicalCommand::DspSelect(m) => write!(f, "DspSelect({})", m.token()),
            LogicalCommand::PresetGet(s) => write!(f, "PresetGet({})", s.token()),
            other => write!(f, "{other:?}"),
        }
    }
}

/// How an integer argument is rendered after an ASCII command token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ValueFormat {
    /// The command takes no argument.
    #[default]
    None,
    /// Zero-padded two digits: `vol_05!`.
    TwoDigits,
    /// Signed tone level: `+03`, `-10`, `000`.
    SignedTone,
    /// Balance: `l05` (left), `r05` (right), `000`.
    Balance,
    /// Plain decimal: `dimmer_3!`.
    Plain,
}

impl ValueFormat {
    /// Render `value` in this format. `None` for [`ValueFormat::None`].
    pub fn render(&self, value: i32) -> Option<String> {
        match self {
            ValueFormat::None => None,
            ValueFormat::TwoDigits => Some(format!("{:02}", value.max(0))),
            ValueFormat::SignedTone => Some(match value {
                0 => "000".to_string(),
                v if v > 0 => format!("+{v:02}"),
                v => format!("-{:02}", v.unsigned_abs()),
            }),
            ValueFormat::Balance => Some(match value {
                0 => "000".to_string(),
                v if v > 0 => format!("r{v:02}"),
                v => format!("l{:02}", v.unsigned_abs()),
            }),
            ValueFormat::Plain => Some(value.to_string()),
        }
    }

    /// Parse a rendered argument back into an integer.
    pub fn parse(&self, text: &str) -> Option<i32> {
        match self {
            ValueFormat::None => None,
            ValueFormat::TwoDigits | ValueFormat::Plain => {
                if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
                    return None;
                }
                text.parse().ok()
            }
            ValueFormat::SignedTone => {
                if text == "000" {
                    return Some(0);
                }
                let (sign, digits) = text.split_at_checked(1)?;
                let magnitude: i32 = digits.parse().ok()?;
                match sign {
                    "+" => Some(magnitude),
                    "-" => Some(-magnitude),
                    _ => None,
                }
            }
            ValueFormat::Balance => {
                if text == "000" {
                    return Some(0);
                }
                let (side, digits) = text.split_at_checked(1)?;
                let magnitude: i32 = digits.parse().ok()?;
                match side {
                    "l" | "L" => Some(-magnitude),
                    "r" | "R" => Some(magnitude),
                    _ => None,
                }
            }
        }
    }
}

/// The device-native form of a logical command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativeToken {
    /// HEX frame type and key byte. When a value is sent it replaces `key`.
    Hex { kind: u8, key: u8 },
    /// ASCII token without the terminating `!`. Commands that take a value
    /// end with the separator (`vol_`) and name the value format.
    Ascii { token: String, format: ValueFormat },
}

impl NativeToken {
    pub fn hex(kind: u8, key: u8) -> Self {
        NativeToken::Hex { kind, key }
    }

    pub fn ascii(token: impl Into<String>) -> Self {
        NativeToken::Ascii {
            token: token.into(),
            format: ValueFormat::None,
        }
    }

    pub fn ascii_with(token: impl Into<String>, format: ValueFormat) -> Self {
        NativeToken::Ascii {
            token: token.into(),
            format,
        }
    }
}

/// Lookup table from `(dialect, zone, command)` to native token.
///
/// Built once per model and never mutated afterwards.
#[derive(Debug, Clone, Default)]
pub struct CommandTable {
    entries: HashMap<(Dialect, Zone, LogicalCommand), NativeToken>,
}

impl CommandTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an entry.
    pub fn insert(&mut self, dialect: Dialect, zone: Zone, cmd: LogicalCommand, token: NativeToken) {
        self.entries.insert((dialect, zone, cmd), token);
    }

    /// Remove an entry, returning it if it was present.
    pub fn remove(&mut self, dialect: Dialect, zone: Zone, cmd: LogicalCommand) -> Option<NativeToken> {
        self.entries.remove(&(dialect, zone, cmd))
    }

    pub fn lookup(&self, dialect: Dialect, zone: Zone, cmd: LogicalCommand) -> Option<&NativeToken> {
        self.entries.get(&(dialect, zone, cmd))
    }

    pub fn supports(&self, dialect: Dialect, zone: Zone, cmd: LogicalCommand) -> bool {
        self.entries.contains_key(&(dialect, zone, cmd))
    }

    /// Every entry of one dialect, in unspecified order.
    pub fn entries(
        &self,
        dialect: Dialect,
    ) -> impl Iterator<Item = (Zone, LogicalCommand, &NativeToken)> + '_ {
        self.entries
            .iter()
            .filter(move |((d, _, _), _)| *d == dialect)
            .map(|((_, zone, cmd), token)| (*zone, *cmd, token))
    }

    /// Whether any entry exists for this dialect.
    pub fn has_dialect(&self, dialect: Dialect) -> bool {
        self.entries.keys().any(|(d, _, _)| *d == dialect)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
