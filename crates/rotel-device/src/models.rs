//! Rotel model definitions.
//!
//! Each supported receiver is described by a [`DeviceModel`] capability
//! descriptor: the dialects it speaks, its zones, the features it has and
//! their ranges, the layout of its HEX display frames, and the command table
//! translating logical commands into native tokens.
//!
//! Models are defined as factory functions (e.g. [`rsp_1570()`]) that return
//! a fully populated [`DeviceModel`]. The command table is derived from the
//! declared capabilities by [`finish`], so a factory only states *what* the
//! device has. The following models are supported:
//!
//! | Model    | Dialects    | Baud   | Zones | Volume | Tone | Notes                         |
//! |----------|-------------|--------|-------|--------|------|-------------------------------|
//! | RSX-1065 | HEX         | 19200  | 1     | 0-90   | ±12  | stepped tone probe            |
//! | RSP-1066 | HEX         | 19200  | 1     | 0-90   | ±12  | zone via record select        |
//! | RSP-1570 | HEX, V1     | 115200 | 3     | 0-96   | ±10  | 42-char display, direct zones |
//! | RSP-1572 | HEX, V1     | 115200 | 3     | 0-96   | ±10  | 42-char display, direct zones |
//! | RA-1570  | V1          | 115200 | 0     | 0-96   | ±10  | dimmer, speakers              |
//! | RCD-1572 | V1          | 115200 | 0     | -      | -    | CD player                     |
//! | RCX-1500 | V1          | 115200 | 0     | 0-50   | ±10  | CD receiver, FM/DAB presets   |
//! | RAP-1580 | V1          | 115200 | 0     | 0-96   | ±10  | no auto update                |
//! | RSP-1582 | V1          | 115200 | 0     | 0-96   | ±10  | no auto update                |
//! | RA-1572  | V2          | 115200 | 0     | 0-96   | ±10  | tone bypass                   |
//! | RA-1592  | V2          | 115200 | 0     | 0-96   | ±10  | tone bypass                   |
//! | A14      | V2          | 115200 | 0     | 0-96   | ±10  | streaming, FM/DAB/iRadio      |

use std::collections::HashMap;

use rotel_core::command::{CommandTable, LogicalCommand, NativeToken, ValueFormat, hex};
use rotel_core::model::{
    DeviceModel, FlagBit, HexFlags, HexLayout, LevelRange, Quirk, SourceEntry, ZoneSelectCommand,
};
use rotel_core::types::{Dialect, DspMode, Source, Zone};
use rotel_protocol::ascii::zone_token;

use rotel_core::command::LogicalCommand as C;

// ---------------------------------------------------------------------------
// HEX key bytes
// ---------------------------------------------------------------------------

const HEX_POWER_TOGGLE: u8 = 0x0A;
const HEX_POWER_OFF: u8 = 0x4A;
const HEX_POWER_ON: u8 = 0x4B;
const HEX_VOLUME_UP: u8 = 0x0B;
const HEX_VOLUME_DOWN: u8 = 0x0C;
const HEX_TREBLE_UP: u8 = 0x0D;
const HEX_TREBLE_DOWN: u8 = 0x0E;
const HEX_BASS_UP: u8 = 0x0F;
const HEX_BASS_DOWN: u8 = 0x10;
const HEX_MUTE_TOGGLE: u8 = 0x1E;
const HEX_RECORD_FUNCTION_SELECT: u8 = 0x17;
const HEX_ZONE_SELECT: u8 = 0x23;
const HEX_TONE_CONTROL_SELECT: u8 = 0x67;
/// Asks the device to resend its display, which doubles as a power query.
const HEX_DISPLAY_REFRESH: u8 = 0xFF;

const HEX_SOURCE_KEYS: [(Source, u8); 10] = [
    (Source::Cd, 0x02),
    (Source::Tuner, 0x03),
    (Source::Tape, 0x04),
    (Source::Video1, 0x05),
    (Source::Video2, 0x06),
    (Source::Video3, 0x07),
    (Source::Video4, 0x08),
    (Source::Video5, 0x09),
    (Source::Multi, 0x15),
    (Source::Phono, 0x35),
];

// ---------------------------------------------------------------------------
// ASCII vocabularies
// ---------------------------------------------------------------------------

/// Tokens shared by both ASCII dialects.
const ASCII_COMMON: &[(LogicalCommand, &str)] = &[
    (C::PowerOn, "power_on"),
    (C::PowerOff, "power_off"),
    (C::PowerToggle, "power_toggle"),
    (C::VolumeUp, "vol_up"),
    (C::VolumeDown, "vol_dwn"),
    (C::MuteToggle, "mute"),
    (C::MuteOn, "mute_on"),
    (C::MuteOff, "mute_off"),
    (C::BassUp, "bass_up"),
    (C::BassDown, "bass_down"),
    (C::TrebleUp, "treble_up"),
    (C::TrebleDown, "treble_down"),
    (C::BalanceLeft, "balance_l"),
    (C::BalanceRight, "balance_r"),
    (C::ToneBypassOn, "tcbypass_on"),
    (C::ToneBypassOff, "tcbypass_off"),
    (C::Play, "play"),
    (C::Pause, "pause"),
    (C::Stop, "stop"),
    (C::TrackForward, "trkf"),
    (C::TrackBackward, "trkb"),
    (C::RandomToggle, "rnd"),
    (C::RepeatToggle, "rpt"),
    (C::SpeakerAToggle, "speaker_a"),
    (C::SpeakerBToggle, "speaker_b"),
];

/// Commands whose argument follows the token.
const ASCII_VALUED: &[(LogicalCommand, &str, ValueFormat)] = &[
    (C::VolumeSet, "vol_", ValueFormat::TwoDigits),
    (C::BassSet, "bass_", ValueFormat::SignedTone),
    (C::TrebleSet, "treble_", ValueFormat::SignedTone),
    (C::BalanceSet, "balance_", ValueFormat::Balance),
    (C::DimmerSet, "dimmer_", ValueFormat::Plain),
];

const ASCII_V1_ONLY: &[(LogicalCommand, &str)] = &[
    (C::PowerGet, "get_current_power"),
    (C::SourceGet, "get_current_source"),
    (C::VolumeGet, "get_volume"),
    (C::VolumeGetMin, "get_volume_min"),
    (C::VolumeGetMax, "get_volume_max"),
    (C::MuteGet, "get_mute_status"),
    (C::BassGet, "get_bass"),
    (C::TrebleGet, "get_treble"),
    (C::ToneMaxGet, "get_tone_max"),
    (C::BalanceGet, "get_balance"),
    (C::DspModeGet, "get_dsp_mode"),
    (C::PlayStatusGet, "get_play_status"),
    (C::CdPlayStatusGet, "get_cd_play_status"),
    (C::FrequencyGet, "get_current_freq"),
    (C::DimmerGet, "get_current_dimmer"),
    (C::SpeakerGet, "get_speaker"),
    (C::ModelGet, "get_product_type"),
    (C::VersionGet, "get_product_version"),
    (C::UpdateAuto, "display_update_auto"),
    (C::UpdateManual, "display_update_manual"),
    (C::DisplayRefresh, "get_display"),
];

const ASCII_V2_ONLY: &[(LogicalCommand, &str)] = &[
    (C::PowerGet, "power?"),
    (C::SourceGet, "source?"),
    (C::VolumeGet, "volume?"),
    (C::MuteGet, "mute?"),
    (C::BassGet, "bass?"),
    (C::TrebleGet, "treble?"),
    (C::BalanceGet, "balance?"),
    (C::ToneBypassGet, "tcbypass?"),
    (C::DspModeGet, "dsp_mode?"),
    (C::PlayStatusGet, "status?"),
    (C::TrackGet, "track?"),
    (C::RandomGet, "rnd?"),
    (C::RepeatGet, "rpt?"),
    (C::FrequencyGet, "freq?"),
    (C::DimmerGet, "dimmer?"),
    (C::SpeakerGet, "speaker?"),
    (C::ModelGet, "model?"),
    (C::VersionGet, "version?"),
    (C::UpdateAuto, "rs232_update_on"),
    (C::UpdateManual, "rs232_update_off"),
];

/// Commands an auxiliary zone with its own command set understands.
const ZONE_COMMANDS: &[LogicalCommand] = &[
    C::PowerOn,
    C::PowerOff,
    C::PowerToggle,
    C::VolumeUp,
    C::VolumeDown,
    C::VolumeSet,
    C::MuteToggle,
    C::MuteOn,
    C::MuteOff,
    C::SourceGet,
    C::VolumeGet,
    C::MuteGet,
];

/// ASCII token of a radio preset query.
fn preset_token(dialect: Dialect, source: Source) -> Option<&'static str> {
    match (dialect, source) {
        (Dialect::AsciiV1, Source::Fm | Source::Tuner) => Some("get_fm_preset"),
        (Dialect::AsciiV1, Source::Dab) => Some("get_dab_preset"),
        (Dialect::AsciiV2, Source::Fm | Source::Tuner) => Some("fm_preset?"),
        (Dialect::AsciiV2, Source::Dab) => Some("dab_preset?"),
        (Dialect::AsciiV2, Source::Iradio) => Some("iradio_preset?"),
        _ => None,
    }
}

/// ASCII token selecting a DSP mode.
fn dsp_token(mode: DspMode) -> &'static str {
    match mode {
        DspMode::None => "bypass",
        other => other.token(),
    }
}

/// Whether the model's capabilities call for `cmd` at all.
fn wanted(model: &DeviceModel, cmd: LogicalCommand) -> bool {
    match cmd {
        C::VolumeUp | C::VolumeDown | C::VolumeGet | C::MuteToggle | C::MuteOn | C::MuteOff => {
            model.has_volume()
        }
        C::VolumeSet => model.has_volume() && model.direct_volume,
        C::VolumeGetMin | C::VolumeGetMax => {
            model.has_volume() && !model.has_quirk(Quirk::NoVolumeBoundsQuery)
        }
        C::MuteGet => model.has_volume() && !model.has_quirk(Quirk::NoMuteQuery),
        C::BassUp
        | C::BassDown
        | C::BassSet
        | C::BassGet
        | C::TrebleUp
        | C::TrebleDown
        | C::TrebleSet
        | C::TrebleGet
        | C::ToneMaxGet
        | C::ToneControlSelect => model.has_tone(),
        C::ToneBypassOn | C::ToneBypassOff | C::ToneBypassGet => model.has_tone_bypass,
        C::BalanceLeft | C::BalanceRight | C::BalanceSet | C::BalanceGet => model.has_balance(),
        C::DspSelect(_) | C::DspModeGet => model.has_dsp,
        C::Play
        | C::Pause
        | C::Stop
        | C::TrackForward
        | C::TrackBackward
        | C::PlayStatusGet
        | C::TrackGet => model.has_play_control,
        C::CdPlayStatusGet => {
            model.has_play_control
                && (model.has_quirk(Quirk::CdPlayStatus)
                    || model.has_quirk(Quirk::CdPlayStatusWhenCdSource))
        }
        C::RandomToggle | C::RandomGet | C::RepeatToggle | C::RepeatGet => {
            model.has_random_repeat
        }
        C::FrequencyGet => model.has_frequency,
        C::DimmerSet => model.has_dimmer(),
        C::DimmerGet => model.has_dimmer() && model.dimmer_readable,
        C::SpeakerGet | C::SpeakerAToggle | C::SpeakerBToggle => model.has_speaker_groups,
        C::ModelGet | C::VersionGet => model.has_identity,
        C::SourceGet | C::SourceSelect(_) => model.has_source_control,
        C::RecordSourceSelect(_) => model.has_source_control && model.direct_zone_commands,
        C::ZoneSelect => model.zone_select == Some(ZoneSelectCommand::ZoneSelect),
        C::PresetGet(source) => model.preset_queries.values().any(|q| *q == C::PresetGet(source)),
        C::PowerToggle
        | C::PowerOn
        | C::PowerOff
        | C::PowerGet
        | C::RecordFunctionSelect
        | C::UpdateAuto
        | C::UpdateManual
        | C::DisplayRefresh => true,
    }
}

fn hex_table(model: &DeviceModel, table: &mut CommandTable) {
    let mut put = |zone: Zone, cmd: LogicalCommand, kind: u8, key: u8| {
        if wanted(model, cmd) {
            table.insert(Dialect::Hex, zone, cmd, NativeToken::hex(kind, key));
        }
    };
    let primary = hex::PRIMARY_CMD;

    put(Zone::MAIN, C::PowerToggle, primary, HEX_POWER_TOGGLE);
    put(Zone::MAIN, C::PowerOff, primary, HEX_POWER_OFF);
    put(Zone::MAIN, C::PowerOn, primary, HEX_POWER_ON);
    put(Zone::MAIN, C::PowerGet, primary, HEX_DISPLAY_REFRESH);
    put(Zone::MAIN, C::DisplayRefresh, primary, HEX_DISPLAY_REFRESH);
    put(Zone::MAIN, C::VolumeUp, primary, HEX_VOLUME_UP);
    put(Zone::MAIN, C::VolumeDown, primary, HEX_VOLUME_DOWN);
    put(Zone::MAIN, C::MuteToggle, primary, HEX_MUTE_TOGGLE);
    put(Zone::MAIN, C::TrebleUp, primary, HEX_TREBLE_UP);
    put(Zone::MAIN, C::TrebleDown, primary, HEX_TREBLE_DOWN);
    put(Zone::MAIN, C::BassUp, primary, HEX_BASS_UP);
    put(Zone::MAIN, C::BassDown, primary, HEX_BASS_DOWN);
    put(Zone::MAIN, C::RecordFunctionSelect, primary, HEX_RECORD_FUNCTION_SELECT);
    put(Zone::MAIN, C::ZoneSelect, primary, HEX_ZONE_SELECT);
    if !model.has_quirk(Quirk::SteppedToneProbe) {
        put(Zone::MAIN, C::ToneControlSelect, primary, HEX_TONE_CONTROL_SELECT);
    }
    if model.direct_volume {
        put(Zone::MAIN, C::VolumeSet, hex::VOLUME_CMD, 0);
    }

    let source_kind = if model.direct_zone_commands {
        hex::MAIN_ZONE_CMD
    } else {
        primary
    };
    for (source, key) in HEX_SOURCE_KEYS {
        if !model.has_source(source) {
            continue;
        }
        put(Zone::MAIN, C::SourceSelect(source), source_kind, key);
        put(Zone::MAIN, C::RecordSourceSelect(source), hex::RECORD_SRC_CMD, key);
    }

    if !model.direct_zone_commands {
        return;
    }
    for zone in Zone::auxiliaries(model.extra_zones) {
        let Some(kind) = hex::zone_cmd(zone.index()) else {
            continue;
        };
        put(zone, C::PowerToggle, kind, HEX_POWER_TOGGLE);
        put(zone, C::PowerOff, kind, HEX_POWER_OFF);
        put(zone, C::PowerOn, kind, HEX_POWER_ON);
        put(zone, C::VolumeUp, kind, HEX_VOLUME_UP);
        put(zone, C::VolumeDown, kind, HEX_VOLUME_DOWN);
        put(zone, C::MuteToggle, kind, HEX_MUTE_TOGGLE);
        if let Some(volume_kind) = hex::zone_volume_cmd(zone.index()) {
            if model.direct_volume {
                put(zone, C::VolumeSet, volume_kind, 0);
            }
        }
        for (source, key) in HEX_SOURCE_KEYS {
            if model.has_source(source) {
                put(zone, C::SourceSelect(source), kind, key);
            }
        }
    }
}

fn ascii_table(model: &DeviceModel, dialect: Dialect, table: &mut CommandTable) {
    let queries = match dialect {
        Dialect::AsciiV1 => ASCII_V1_ONLY,
        _ => ASCII_V2_ONLY,
    };
    let mut main: Vec<(LogicalCommand, NativeToken)> = Vec::new();
    for (cmd, token) in ASCII_COMMON.iter().chain(queries) {
        main.push((*cmd, NativeToken::ascii(*token)));
    }
    for (cmd, token, format) in ASCII_VALUED {
        main.push((*cmd, NativeToken::ascii_with(*token, *format)));
    }
    for entry in &model.sources {
        if entry.source == Source::FollowMain {
            continue;
        }
        let token = entry.source.token();
        main.push((C::SourceSelect(entry.source), NativeToken::ascii(token)));
        main.push((
            C::RecordSourceSelect(entry.source),
            NativeToken::ascii(format!("record_{token}")),
        ));
    }
    for mode in DspMode::ALL {
        main.push((C::DspSelect(mode), NativeToken::ascii(dsp_token(mode))));
    }
    for cmd in model.preset_queries.values() {
        if let C::PresetGet(source) = cmd {
            if let Some(token) = preset_token(dialect, *source) {
                main.push((*cmd, NativeToken::ascii(token)));
            }
        }
    }

    for (cmd, token) in &main {
        if wanted(model, *cmd) {
            table.insert(dialect, Zone::MAIN, *cmd, token.clone());
        }
    }

    if !model.direct_zone_commands {
        return;
    }
    for zone in Zone::auxiliaries(model.extra_zones) {
        for (cmd, token) in &main {
            let zoned = ZONE_COMMANDS.contains(cmd) || matches!(cmd, C::SourceSelect(_));
            if !zoned || !wanted(model, *cmd) {
                continue;
            }
            let NativeToken::Ascii { token, format } = token else {
                continue;
            };
            table.insert(
                dialect,
                zone,
                *cmd,
                NativeToken::ascii_with(zone_token(dialect, zone, token), *format),
            );
        }
    }
}

/// Derive the command table of `model` from its declared capabilities.
///
/// Radio preset queries must already be declared in `preset_queries`; their
/// tokens are added for every dialect that names them.
pub fn finish(mut model: DeviceModel) -> DeviceModel {
    let mut table = CommandTable::new();
    for dialect in model.dialects.clone() {
        match dialect {
            Dialect::Hex => hex_table(&model, &mut table),
            Dialect::AsciiV1 | Dialect::AsciiV2 => ascii_table(&model, dialect, &mut table),
        }
    }
    model.commands = table;
    model
}

fn presets(entries: &[(Dialect, Source)]) -> HashMap<(Dialect, Source), LogicalCommand> {
    entries
        .iter()
        .map(|(dialect, source)| ((*dialect, *source), C::PresetGet(*source)))
        .collect()
}

fn sources(list: &[Source]) -> Vec<SourceEntry> {
    list.iter().copied().map(SourceEntry::standard).collect()
}

const HEX_CLASSIC_SOURCES: [Source; 8] = [
    Source::Cd,
    Source::Tuner,
    Source::Tape,
    Source::Video1,
    Source::Video2,
    Source::Video3,
    Source::Video4,
    Source::Video5,
];

/// RSX-1065 model definition.
///
/// Surround receiver with a 13-character display and one extra zone driven
/// through the shared display. It has no tone control select key, so tone
/// levels are probed by stepping treble and bass.
pub fn rsx_1065() -> DeviceModel {
    finish(DeviceModel {
        name: "RSX-1065",
        default_dialect: Dialect::Hex,
        dialects: vec![Dialect::Hex],
        default_baud_rate: 19_200,
        extra_zones: 1,
        volume: Some(LevelRange::new(0, 90)),
        tone_max: Some(12),
        has_dsp: true,
        hex: HexLayout {
            device_id: 0xC5,
            ..HexLayout::default()
        },
        zone_select: Some(ZoneSelectCommand::ZoneSelect),
        sources: sources(&HEX_CLASSIC_SOURCES),
        quirks: vec![Quirk::SteppedToneProbe],
        ..DeviceModel::default()
    })
}

/// RSP-1066 model definition.
///
/// Surround processor whose front panel cycles between the main zone and
/// zone 2 with the record function select key.
pub fn rsp_1066() -> DeviceModel {
    finish(DeviceModel {
        name: "RSP-1066",
        default_dialect: Dialect::Hex,
        dialects: vec![Dialect::Hex],
        default_baud_rate: 19_200,
        extra_zones: 1,
        volume: Some(LevelRange::new(0, 90)),
        tone_max: Some(12),
        has_dsp: true,
        hex: HexLayout {
            device_id: 0xC2,
            ..HexLayout::default()
        },
        zone_select: Some(ZoneSelectCommand::RecordFunctionSelect),
        sources: sources(&HEX_CLASSIC_SOURCES),
        ..DeviceModel::default()
    })
}

fn rsp_157x(name: &'static str, device_id: u8) -> DeviceModel {
    let mut list = HEX_CLASSIC_SOURCES.to_vec();
    list.extend([Source::Multi, Source::FollowMain]);
    finish(DeviceModel {
        name,
        default_dialect: Dialect::Hex,
        dialects: vec![Dialect::Hex, Dialect::AsciiV1],
        default_baud_rate: 115_200,
        extra_zones: 3,
        direct_zone_commands: true,
        volume: Some(LevelRange::new(0, 96)),
        direct_volume: true,
        tone_max: Some(10),
        has_dsp: true,
        hex: HexLayout {
            device_id,
            chars: 42,
            flags: 5,
            chars_before_flags: true,
        },
        hex_flags: HexFlags {
            zone_power: [
                Some(FlagBit::new(4, 0x01)),
                Some(FlagBit::new(4, 0x02)),
                Some(FlagBit::new(4, 0x04)),
            ],
            multi_input: Some(FlagBit::new(3, 0x40)),
            more_than_two_channels: Some(FlagBit::new(2, 0x80)),
        },
        zone_select: Some(ZoneSelectCommand::ZoneSelect),
        sources: sources(&list),
        ..DeviceModel::default()
    })
}

/// RSP-1570 model definition.
///
/// Surround processor with a two-line 42-character display, three extra
/// zones with their own command sets, and both HEX and ASCII V1 control.
pub fn rsp_1570() -> DeviceModel {
    rsp_157x("RSP-1570", 0xA5)
}

/// RSP-1572 model definition. Same protocol surface as the RSP-1570.
pub fn rsp_1572() -> DeviceModel {
    rsp_157x("RSP-1572", 0xA6)
}

/// RA-1570 model definition.
///
/// Stereo integrated amplifier with balance, dimmer and speaker groups.
pub fn ra_1570() -> DeviceModel {
    finish(DeviceModel {
        name: "RA-1570",
        default_dialect: Dialect::AsciiV1,
        dialects: vec![Dialect::AsciiV1],
        default_baud_rate: 115_200,
        volume: Some(LevelRange::new(0, 96)),
        direct_volume: true,
        tone_max: Some(10),
        balance_max: Some(15),
        dimmer: Some(LevelRange::new(0, 6)),
        dimmer_readable: true,
        has_speaker_groups: true,
        has_identity: true,
        sources: sources(&[
            Source::Cd,
            Source::Tuner,
            Source::Phono,
            Source::Video1,
            Source::Video2,
            Source::Usb,
            Source::Optical1,
            Source::Coax1,
            Source::Xlr,
        ]),
        ..DeviceModel::default()
    })
}

/// RCD-1572 model definition.
///
/// CD player: no volume, no source selection, CD-specific play status.
pub fn rcd_1572() -> DeviceModel {
    finish(DeviceModel {
        name: "RCD-1572",
        default_dialect: Dialect::AsciiV1,
        dialects: vec![Dialect::AsciiV1],
        default_baud_rate: 115_200,
        has_source_control: false,
        has_play_control: true,
        has_random_repeat: true,
        dimmer: Some(LevelRange::new(0, 6)),
        dimmer_readable: true,
        sources: sources(&[Source::Cd]),
        quirks: vec![Quirk::CdPlayStatus, Quirk::NoPlayStatusAfterPause],
        ..DeviceModel::default()
    })
}

/// RCX-1500 model definition.
///
/// CD receiver with FM and DAB tuners. It never answers mute queries and
/// reports the CD play status separately when the CD source is active.
pub fn rcx_1500() -> DeviceModel {
    finish(DeviceModel {
        name: "RCX-1500",
        default_dialect: Dialect::AsciiV1,
        dialects: vec![Dialect::AsciiV1],
        default_baud_rate: 115_200,
        volume: Some(LevelRange::new(0, 50)),
        direct_volume: true,
        tone_max: Some(10),
        has_play_control: true,
        has_frequency: true,
        dimmer: Some(LevelRange::new(0, 6)),
        sources: sources(&[
            Source::Cd,
            Source::Fm,
            Source::Dab,
            Source::Iradio,
            Source::Aux1,
            Source::Usb,
        ]),
        preset_queries: presets(&[
            (Dialect::AsciiV1, Source::Fm),
            (Dialect::AsciiV1, Source::Dab),
        ]),
        quirks: vec![
            Quirk::NoMuteQuery,
            Quirk::CdPlayStatusWhenCdSource,
            Quirk::NoPlayStatusAfterPause,
        ],
        ..DeviceModel::default()
    })
}

fn rap_rsp_158x(name: &'static str) -> DeviceModel {
    finish(DeviceModel {
        name,
        default_dialect: Dialect::AsciiV1,
        dialects: vec![Dialect::AsciiV1],
        default_baud_rate: 115_200,
        volume: Some(LevelRange::new(0, 96)),
        direct_volume: true,
        tone_max: Some(10),
        has_dsp: true,
        has_frequency: true,
        dimmer: Some(LevelRange::new(0, 6)),
        dimmer_readable: true,
        has_identity: true,
        sources: sources(&[
            Source::Cd,
            Source::Tuner,
            Source::Video1,
            Source::Video2,
            Source::Video3,
            Source::Video4,
            Source::Video5,
            Source::Video6,
            Source::Video7,
            Source::Video8,
            Source::Usb,
            Source::Multi,
        ]),
        quirks: vec![Quirk::NoAutoUpdate, Quirk::NoVolumeBoundsQuery],
        ..DeviceModel::default()
    })
}

/// RAP-1580 model definition.
pub fn rap_1580() -> DeviceModel {
    rap_rsp_158x("RAP-1580")
}

/// RSP-1582 model definition.
pub fn rsp_1582() -> DeviceModel {
    rap_rsp_158x("RSP-1582")
}

fn ra_15x2(name: &'static str) -> DeviceModel {
    finish(DeviceModel {
        name,
        default_dialect: Dialect::AsciiV2,
        dialects: vec![Dialect::AsciiV2],
        default_baud_rate: 115_200,
        volume: Some(LevelRange::new(0, 96)),
        direct_volume: true,
        tone_max: Some(10),
        balance_max: Some(15),
        has_tone_bypass: true,
        has_frequency: true,
        dimmer: Some(LevelRange::new(0, 6)),
        dimmer_readable: true,
        has_speaker_groups: true,
        has_identity: true,
        sources: sources(&[
            Source::Cd,
            Source::Tuner,
            Source::Phono,
            Source::Usb,
            Source::PcUsb,
            Source::Bluetooth,
            Source::Optical1,
            Source::Optical2,
            Source::Coax1,
            Source::Coax2,
            Source::Aux1,
            Source::Xlr,
        ]),
        ..DeviceModel::default()
    })
}

/// RA-1572 model definition.
pub fn ra_1572() -> DeviceModel {
    ra_15x2("RA-1572")
}

/// RA-1592 model definition.
pub fn ra_1592() -> DeviceModel {
    ra_15x2("RA-1592")
}

/// A14 model definition.
///
/// Streaming integrated amplifier with FM, DAB and internet radio.
pub fn a14() -> DeviceModel {
    finish(DeviceModel {
        name: "A14",
        default_dialect: Dialect::AsciiV2,
        dialects: vec![Dialect::AsciiV2],
        default_baud_rate: 115_200,
        volume: Some(LevelRange::new(0, 96)),
        direct_volume: true,
        tone_max: Some(10),
        balance_max: Some(15),
        has_tone_bypass: true,
        has_play_control: true,
        has_random_repeat: true,
        has_frequency: true,
        dimmer: Some(LevelRange::new(0, 6)),
        dimmer_readable: true,
        has_speaker_groups: true,
        has_identity: true,
        sources: sources(&[
            Source::Cd,
            Source::Fm,
            Source::Dab,
            Source::Iradio,
            Source::Network,
            Source::Usb,
            Source::PcUsb,
            Source::Bluetooth,
            Source::Optical1,
            Source::Coax1,
            Source::Aux1,
            Source::Phono,
        ]),
        preset_queries: presets(&[
            (Dialect::AsciiV2, Source::Fm),
            (Dialect::AsciiV2, Source::Dab),
            (Dialect::AsciiV2, Source::Iradio),
        ]),
        ..DeviceModel::default()
    })
}

/// Returns all supported model definitions.
pub fn all_models() -> Vec<DeviceModel> {
    vec![
        rsx_1065(),
        rsp_1066(),
        rsp_1570(),
        rsp_1572(),
        ra_1570(),
        rcd_1572(),
        rcx_1500(),
        rap_1580(),
        rsp_1582(),
        ra_1572(),
        ra_1592(),
        a14(),
    ]
}

/// Look a model up by name, ignoring case and dashes (`rsp1570` finds
/// "RSP-1570").
pub fn model_by_name(name: &str) -> Option<DeviceModel> {
    let wanted: String = name
        .chars()
        .filter(|c| *c != '-' && *c != '_')
        .collect::<String>()
        .to_ascii_lowercase();
    all_models().into_iter().find(|m| {
        m.name
            .chars()
            .filter(|c| *c != '-')
            .collect::<String>()
            .to_ascii_lowercase()
            == wanted
    })
}
