//! Static device capability descriptors.
//!
//! A [`DeviceModel`] describes everything the client needs to know about a
//! receiver: which dialects it speaks, how many extra zones it has, which
//! features exist and their numeric ranges, the HEX display layout, and the
//! command table mapping logical commands to native tokens. Models are built
//! once (see `rotel_device::models`) and never mutated afterwards.

use std::collections::HashMap;

use crate::command::{CommandTable, LogicalCommand};
use crate::types::{Dialect, Source, Zone};

/// An inclusive numeric range reported or accepted by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelRange {
    pub min: i32,
    pub max: i32,
}

impl LevelRange {
    pub const fn new(min: i32, max: i32) -> Self {
        LevelRange { min, max }
    }

    /// Symmetric range `-max..=max`, as used for tone and balance.
    pub const fn symmetric(max: i32) -> Self {
        LevelRange { min: -max, max }
    }

    pub fn contains(&self, value: i32) -> bool {
        value >= self.min && value <= self.max
    }

    /// Convert a percentage (clamped to 0..=100) into a device level.
    pub fn from_percent(&self, percent: f64) -> i32 {
        let pct = percent.clamp(0.0, 100.0);
        let span = f64::from(self.max - self.min);
        self.min + (pct * span / 100.0).round() as i32
    }

    /// Convert a device level into a percentage of the range.
    pub fn to_percent(&self, value: i32) -> f64 {
        if self.max == self.min {
            return 0.0;
        }
        f64::from(value - self.min) * 100.0 / f64::from(self.max - self.min)
    }
}

/// A single bit inside the flag bytes of a HEX display frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlagBit {
    /// Index of the flag byte, 0-based within the flags field.
    pub byte: usize,
    pub mask: u8,
}

impl FlagBit {
    pub const fn new(byte: usize, mask: u8) -> Self {
        FlagBit { byte, mask }
    }

    /// Whether the bit is set in `flags`. Out-of-range bytes read as unset.
    pub fn is_set(&self, flags: &[u8]) -> bool {
        flags.get(self.byte).is_some_and(|b| b & self.mask != 0)
    }

    /// Set or clear the bit in `flags`.
    pub fn apply(&self, flags: &mut [u8], on: bool) {
        if let Some(b) = flags.get_mut(self.byte) {
            if on {
                *b |= self.mask;
            } else {
                *b &= !self.mask;
            }
        }
    }
}

/// Flag bits a HEX model may declare in its display frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HexFlags {
    /// Power bits for device zones 2, 3 and 4.
    pub zone_power: [Option<FlagBit>; 3],
    pub multi_input: Option<FlagBit>,
    pub more_than_two_channels: Option<FlagBit>,
}

/// Shape of HEX standard-response display frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HexLayout {
    /// Device identifier byte carried in every frame.
    pub device_id: u8,
    /// Number of display characters.
    pub chars: usize,
    /// Number of flag bytes.
    pub flags: usize,
    /// Whether the characters precede the flags in the frame.
    pub chars_before_flags: bool,
}

impl HexLayout {
    /// Frame length of a standard response, checksum included, escape
    /// excluded.
    pub fn response_len(&self) -> usize {
        5 + self.chars + self.flags
    }

    /// Offset of the first display character.
    pub fn chars_offset(&self) -> usize {
        if self.chars_before_flags { 4 } else { 4 + self.flags }
    }

    /// Offset of the first flag byte.
    pub fn flags_offset(&self) -> usize {
        if self.chars_before_flags { 4 + self.chars } else { 4 }
    }
}

impl Default for HexLayout {
    fn default() -> Self {
        HexLayout {
            device_id: 0,
            chars: 13,
            flags: 0,
            chars_before_flags: true,
        }
    }
}

/// Command used to cycle a shared front-panel display through zones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneSelectCommand {
    ZoneSelect,
    RecordFunctionSelect,
}

impl ZoneSelectCommand {
    pub fn command(&self) -> LogicalCommand {
        match self {
            ZoneSelectCommand::ZoneSelect => LogicalCommand::ZoneSelect,
            ZoneSelectCommand::RecordFunctionSelect => LogicalCommand::RecordFunctionSelect,
        }
    }
}

/// Named per-model deviations from the generic behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Quirk {
    /// Do not send the auto-update request when priming.
    NoAutoUpdate,
    /// The device does not answer volume min/max queries.
    NoVolumeBoundsQuery,
    /// The device does not answer mute queries.
    NoMuteQuery,
    /// Play status is read with the CD-specific query.
    CdPlayStatus,
    /// Use the CD-specific play status query when the CD source is active.
    CdPlayStatusWhenCdSource,
    /// Probe tone levels by stepping treble and bass instead of cycling the
    /// tone control display.
    SteppedToneProbe,
    /// Pause does not need a play status query afterwards.
    NoPlayStatusAfterPause,
}

/// A selectable source and the label the device shows for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceEntry {
    pub source: Source,
    pub label: &'static str,
}

impl SourceEntry {
    /// Entry using the default front-panel label.
    pub fn standard(source: Source) -> Self {
        SourceEntry {
            source,
            label: source.label(),
        }
    }

    pub fn labelled(source: Source, label: &'static str) -> Self {
        SourceEntry { source, label }
    }
}

/// Capability descriptor for one receiver model.
#[derive(Debug, Clone)]
pub struct DeviceModel {
    /// Human-readable model name (e.g. "RSP-1570").
    pub name: &'static str,
    pub default_dialect: Dialect,
    pub dialects: Vec<Dialect>,
    pub default_baud_rate: u32,
    /// Number of auxiliary zones (0-4).
    pub extra_zones: u8,
    /// Whether auxiliary zones have their own command set rather than being
    /// driven through the shared display.
    pub direct_zone_commands: bool,
    pub volume: Option<LevelRange>,
    /// Whether volume can be set to an absolute level.
    pub direct_volume: bool,
    /// Tone (bass/treble) maximum; the range is symmetric.
    pub tone_max: Option<i32>,
    /// Balance maximum; the range is symmetric.
    pub balance_max: Option<i32>,
    pub dimmer: Option<LevelRange>,
    pub dimmer_readable: bool,
    pub has_dsp: bool,
    pub has_play_control: bool,
    pub has_source_control: bool,
    pub has_frequency: bool,
    pub has_speaker_groups: bool,
    pub has_random_repeat: bool,
    pub has_tone_bypass: bool,
    pub has_identity: bool,
    pub hex: HexLayout,
    pub hex_flags: HexFlags,
    pub zone_select: Option<ZoneSelectCommand>,
    /// Query sent after a reconnect to check the device is there.
    pub power_probe: LogicalCommand,
    pub sources: Vec<SourceEntry>,
    /// Radio preset query per (dialect, source).
    pub preset_queries: HashMap<(Dialect, Source), LogicalCommand>,
    pub quirks: Vec<Quirk>,
    pub commands: CommandTable,
}

impl DeviceModel {
    pub fn supports_dialect(&self, dialect: Dialect) -> bool {
        self.dialects.contains(&dialect)
    }

    /// Whether `zone` exists on this model.
    pub fn has_zone(&self, zone: Zone) -> bool {
        zone.index() <= self.extra_zones
    }

    /// Every zone of the model, main first.
    pub fn zones(&self) -> impl Iterator<Item = Zone> {
        std::iter::once(Zone::MAIN).chain(Zone::auxiliaries(self.extra_zones))
    }

    pub fn has_quirk(&self, quirk: Quirk) -> bool {
        self.quirks.contains(&quirk)
    }

    pub fn has_volume(&self) -> bool {
        self.volume.is_some()
    }

    pub fn has_tone(&self) -> bool {
        self.tone_max.is_some()
    }

    pub fn has_balance(&self) -> bool {
        self.balance_max.is_some()
    }

    pub fn has_dimmer(&self) -> bool {
        self.dimmer.is_some()
    }

    /// Label the device shows for `source`, `None` if the model lacks it.
    pub fn source_label(&self, source: Source) -> Option<&'static str> {
        self.sources
            .iter()
            .find(|e| e.source == source)
            .map(|e| e.label)
    }

    pub fn has_source(&self, source: Source) -> bool {
        self.sources.iter().any(|e| e.source == source)
    }

    /// Resolve a feedback token to one of the model's sources. The follow-main
    /// pseudo source is accepted for auxiliary zones only.
    pub fn source_from_token(&self, token: &str, zone: Zone) -> Option<Source> {
        let source = Source::from_token(token)?;
        if source == Source::FollowMain {
            return (!zone.is_main()).then_some(source);
        }
        self.has_source(source).then_some(source)
    }

    pub fn preset_query(&self, dialect: Dialect, source: Source) -> Option<LogicalCommand> {
        self.preset_queries.get(&(dialect, source)).copied()
    }

    /// Whether auxiliary zones have their own power commands.
    pub fn has_zone_power_commands(&self, dialect: Dialect) -> bool {
        Zone::auxiliaries(self.extra_zones).any(|z| {
            self.commands.supports(dialect, z, LogicalCommand::PowerToggle)
                || self.commands.supports(dialect, z, LogicalCommand::PowerOn)
        })
    }

    pub fn tone_range(&self) -> Option<LevelRange> {
        self.tone_max.map(LevelRange::symmetric)
    }

    pub fn balance_range(&self) -> Option<LevelRange> {
        self.balance_max.map(LevelRange::symmetric)
    }
}

impl Default for DeviceModel {
    fn default() -> Self {
        DeviceModel {
            name: "generic",
            default_dialect: Dialect::Hex,
            dialects: vec![Dialect::Hex],
            default_baud_rate: 19_200,
            extra_zones: 0,
            direct_zone_commands: false,
            volume: None,
            direct_volume: false,
            tone_max: None,
            balance_max: None,
            dimmer: None,
            dimmer_readable: false,
            has_dsp: false,
            has_play_control: false,
            has_source_control: true,
            has_frequency: false,
            has_speaker_groups: false,
            has_random_repeat: false,
            has_tone_bypass: false,
            has_identity: false,
            hex: HexLayout::default(),
            hex_flags: HexFlags::default(),
            zone_select: None,
            power_probe: LogicalCommand::PowerGet,
            sources: Vec::new(),
            preset_queries: HashMap::new(),
            quirks: Vec::new(),
            commands: CommandTable::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_range_percent_conversion() {
        let r = LevelRange::new(0, 96);
        assert_eq!(r.from_percent(50.0), 48);
        assert_eq!(r.from_percent(150.0), 96);
        assert_eq!(r.from_percent(-3.0), 0);
        assert!((r.to_percent(24) - 25.0).abs() < 1e-9);
        let sym = LevelRange::symmetric(10);
        assert!(sym.contains(-10));
        assert!(!sym.contains(11));
        assert_eq!(LevelRange::new(5, 5).to_percent(5), 0.0);
    }

    #[test]
    fn flag_bit_set_and_apply() {
        let bit = FlagBit::new(1, 0x04);
        let mut flags = [0u8; 2];
        assert!(!bit.is_set(&flags));
        bit.apply(&mut flags, true);
        assert_eq!(flags, [0x00, 0x04]);
        assert!(bit.is_set(&flags));
        bit.apply(&mut flags, false);
        assert!(!bit.is_set(&flags));
        assert!(!FlagBit::new(5, 1).is_set(&flags));
    }

    #[test]
    fn hex_layout_offsets() {
        let before = HexLayout {
            device_id: 0xC2,
            chars: 42,
            flags: 5,
            chars_before_flags: true,
        };
        assert_eq!(before.response_len(), 52);
        assert_eq!(before.chars_offset(), 4);
        assert_eq!(before.flags_offset(), 46);

        let after = HexLayout {
            chars_before_flags: false,
            ..before
        };
        assert_eq!(after.chars_offset(), 9);
        assert_eq!(after.flags_offset(), 4);
    }

    #[test]
    fn model_zone_and_source_queries() {
        let model = DeviceModel {
            extra_zones: 2,
            sources: vec![
                SourceEntry::standard(Source::Cd),
                SourceEntry::labelled(Source::Video1, "DVD"),
            ],
            ..DeviceModel::default()
        };
        assert!(model.has_zone(Zone::AUX2));
        assert!(!model.has_zone(Zone::AUX3));
        assert_eq!(model.zones().count(), 3);
        assert_eq!(model.source_label(Source::Video1), Some("DVD"));
        assert_eq!(model.source_label(Source::Tuner), None);
        assert_eq!(model.source_from_token("cd", Zone::MAIN), Some(Source::Cd));
        assert_eq!(model.source_from_token("tuner", Zone::MAIN), None);
        assert_eq!(model.source_from_token("main", Zone::MAIN), None);
        assert_eq!(
            model.source_from_token("main", Zone::AUX1),
            Some(Source::FollowMain)
        );
    }

    #[test]
    fn model_defaults() {
        let model = DeviceModel::default();
        assert!(model.supports_dialect(Dialect::Hex));
        assert!(!model.supports_dialect(Dialect::AsciiV1));
        assert!(!model.has_volume());
        assert!(!model.has_quirk(Quirk::NoMuteQuery));
        assert_eq!(model.power_probe, LogicalCommand::PowerGet);
        assert!(!model.has_zone_power_commands(Dialect::Hex));
    }
}
