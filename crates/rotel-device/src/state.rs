//! Interpreted device state.
//!
//! The session keeps one [`SessionState`] per device. It is only mutated by
//! the session, from the dispatcher context or under the command sequencer,
//! and is guarded by a `tokio::sync::Mutex` inside the session. Callers get
//! copies through `RotelClient::snapshot()`.

use rotel_core::events::{Attribute, StateValue};
use rotel_core::model::{DeviceModel, LevelRange};
use rotel_core::types::{
    DspMode, PlayStatus, Power, RepeatMode, Source, SpeakerGroups, ZONE_SLOTS, Zone,
};

/// Channels renotified when the main zone powers on or off.
pub const MAIN_POWER_ATTRIBUTES: [Attribute; 17] = [
    Attribute::Power,
    Attribute::Source,
    Attribute::RecordSource,
    Attribute::Dsp,
    Attribute::Volume,
    Attribute::Mute,
    Attribute::Bass,
    Attribute::Treble,
    Attribute::Balance,
    Attribute::ToneBypass,
    Attribute::PlayStatus,
    Attribute::Track,
    Attribute::Random,
    Attribute::Repeat,
    Attribute::Frequency,
    Attribute::Preset,
    Attribute::Dimmer,
];

/// Channels renotified when an auxiliary zone powers on or off.
pub const ZONE_POWER_ATTRIBUTES: [Attribute; 4] = [
    Attribute::Power,
    Attribute::Source,
    Attribute::Volume,
    Attribute::Mute,
];

/// State of one zone. Zone 0 also carries the tone, balance and tuner
/// fields, which the auxiliary zones never use.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ZoneState {
    pub power: Power,
    pub source: Option<Source>,
    /// Volume in raw device units.
    pub volume: i32,
    pub mute: bool,
    /// The zone output is at a fixed level and cannot be adjusted.
    pub fixed_volume: bool,
    pub bass: i32,
    pub treble: i32,
    pub balance: i32,
    pub frequency: f64,
}

/// Complete interpreted state of the device.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    zones: [ZoneState; ZONE_SLOTS],
    pub record_source: Option<Source>,
    pub dsp: DspMode,
    pub play_status: PlayStatus,
    pub track: i32,
    pub random: bool,
    pub repeat: RepeatMode,
    pub preset: i32,
    pub dimmer: i32,
    pub tone_bypass: bool,
    pub speakers: SpeakerGroups,
    pub line1: String,
    pub line2: String,
    pub model_name: String,
    pub version: String,
    /// Zone shown on a shared front panel, in device numbering (main = 1).
    pub display_zone: u8,
    /// The front panel is showing the record source selection.
    pub selecting_record: bool,
    /// Volume bounds, learned from the device when it reports them.
    pub volume_range: Option<LevelRange>,
    pub tone_range: Option<LevelRange>,
    pub balance_range: Option<LevelRange>,
}

impl SessionState {
    /// Fresh state for `model`: every power unknown, ranges from the model.
    pub fn new(model: &DeviceModel) -> Self {
        let mut zones: [ZoneState; ZONE_SLOTS] = Default::default();
        // Devices without source selection only ever play their one source.
        if !model.has_source_control {
            zones[Zone::MAIN.slot()].source = model.sources.first().map(|e| e.source);
        }
        SessionState {
            zones,
            record_source: None,
            dsp: DspMode::None,
            play_status: PlayStatus::default(),
            track: 0,
            random: false,
            repeat: RepeatMode::default(),
            preset: 0,
            dimmer: 0,
            tone_bypass: false,
            speakers: SpeakerGroups::default(),
            line1: String::new(),
            line2: String::new(),
            model_name: String::new(),
            version: String::new(),
            display_zone: 1,
            selecting_record: false,
            volume_range: model.volume,
            tone_range: model.tone_range(),
            balance_range: model.balance_range(),
        }
    }

    pub fn zone(&self, zone: Zone) -> &ZoneState {
        &self.zones[zone.slot()]
    }

    pub fn zone_mut(&mut self, zone: Zone) -> &mut ZoneState {
        &mut self.zones[zone.slot()]
    }

    pub fn power(&self, zone: Zone) -> Power {
        self.zone(zone).power
    }

    pub fn is_on(&self, zone: Zone) -> bool {
        self.zone(zone).power.is_on()
    }

    /// Forget every zone's power. Everything else is kept as last known.
    pub fn reset_power(&mut self) {
        for zone in &mut self.zones {
            zone.power = Power::Unknown;
        }
    }

    /// Reported value of `attribute` in `zone`.
    ///
    /// Everything but power, the display lines and the device identity is
    /// [`StateValue::Undefined`] while the zone is not on.
    pub fn value(&self, zone: Zone, attribute: Attribute) -> StateValue {
        let z = self.zone(zone);
        match attribute {
            Attribute::Power => return StateValue::Power(z.power),
            Attribute::Line1 => return StateValue::Text(self.line1.clone()),
            Attribute::Line2 => return StateValue::Text(self.line2.clone()),
            Attribute::Model => return StateValue::Text(self.model_name.clone()),
            Attribute::Version => return StateValue::Text(self.version.clone()),
            _ => {}
        }
        if !z.power.is_on() {
            return StateValue::Undefined;
        }
        match attribute {
            Attribute::Source => z.source.map_or(StateValue::Undefined, StateValue::Source),
            Attribute::Volume if z.fixed_volume => StateValue::Undefined,
            Attribute::Volume => StateValue::Int(z.volume),
            Attribute::FixedVolume => StateValue::Bool(z.fixed_volume),
            Attribute::Mute => StateValue::Bool(z.mute),
            _ if !zone.is_main() => StateValue::Undefined,
            Attribute::Bass => StateValue::Int(z.bass),
            Attribute::Treble => StateValue::Int(z.treble),
            Attribute::Balance => StateValue::Int(z.balance),
            Attribute::Frequency => StateValue::Float(z.frequency),
            Attribute::RecordSource => self
                .record_source
                .map_or(StateValue::Undefined, StateValue::Source),
            Attribute::Dsp => StateValue::Dsp(self.dsp),
            Attribute::PlayStatus => StateValue::PlayStatus(self.play_status),
            Attribute::Track => StateValue::Int(self.track),
            Attribute::Random => StateValue::Bool(self.random),
            Attribute::Repeat => StateValue::Repeat(self.repeat),
            Attribute::Preset => StateValue::Int(self.preset),
            Attribute::Dimmer => StateValue::Int(self.dimmer),
            Attribute::ToneBypass => StateValue::Bool(self.tone_bypass),
            Attribute::Speakers => StateValue::Speakers(self.speakers),
            Attribute::Power
            | Attribute::Line1
            | Attribute::Line2
            | Attribute::Model
            | Attribute::Version => StateValue::Undefined,
        }
    }

    /// Channels to renotify after a power transition of `zone`.
    pub fn power_attributes(zone: Zone) -> &'static [Attribute] {
        if zone.is_main() {
            &MAIN_POWER_ATTRIBUTES
        } else {
            &ZONE_POWER_ATTRIBUTES
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models;

    #[test]
    fn new_state_is_unknown_with_model_ranges() {
        let model = models::rsp_1570();
        let state = SessionState::new(&model);
        for zone in Zone::all() {
            assert_eq!(state.power(zone), Power::Unknown);
        }
        assert_eq!(state.volume_range, Some(LevelRange::new(0, 96)));
        assert_eq!(state.tone_range, Some(LevelRange::new(-10, 10)));
        assert_eq!(state.balance_range, None);
        assert_eq!(state.display_zone, 1);
        assert_eq!(state.zone(Zone::MAIN).source, None);
    }

    #[test]
    fn player_without_source_control_starts_on_its_source() {
        let state = SessionState::new(&models::rcd_1572());
        assert_eq!(state.zone(Zone::MAIN).source, Some(Source::Cd));
    }

    #[test]
    fn values_undefined_unless_zone_on() {
        let mut state = SessionState::new(&models::rsp_1570());
        state.zone_mut(Zone::MAIN).volume = 40;
        assert_eq!(
            state.value(Zone::MAIN, Attribute::Power),
            StateValue::Power(Power::Unknown)
        );
        assert!(state.value(Zone::MAIN, Attribute::Volume).is_undefined());

        state.zone_mut(Zone::MAIN).power = Power::On;
        assert_eq!(state.value(Zone::MAIN, Attribute::Volume), StateValue::Int(40));
        assert!(state.value(Zone::AUX1, Attribute::Volume).is_undefined());

        state.line1 = "CD".into();
        state.zone_mut(Zone::MAIN).power = Power::Off;
        assert_eq!(
            state.value(Zone::MAIN, Attribute::Line1),
            StateValue::Text("CD".into())
        );
    }

    #[test]
    fn fixed_zone_volume_is_undefined() {
        let mut state = SessionState::new(&models::rsp_1570());
        let zone = state.zone_mut(Zone::AUX2);
        zone.power = Power::On;
        zone.volume = 30;
        zone.fixed_volume = true;
        assert!(state.value(Zone::AUX2, Attribute::Volume).is_undefined());
        assert_eq!(
            state.value(Zone::AUX2, Attribute::FixedVolume),
            StateValue::Bool(true)
        );
        // Device-wide channels belong to the main zone.
        assert!(state.value(Zone::AUX2, Attribute::Dsp).is_undefined());
    }

    #[test]
    fn reset_power_keeps_values() {
        let mut state = SessionState::new(&models::ra_1572());
        state.zone_mut(Zone::MAIN).power = Power::On;
        state.zone_mut(Zone::MAIN).volume = 25;
        state.volume_range = Some(LevelRange::new(0, 76));
        state.reset_power();
        assert_eq!(state.power(Zone::MAIN), Power::Unknown);
        assert_eq!(state.zone(Zone::MAIN).volume, 25);
        assert_eq!(state.volume_range, Some(LevelRange::new(0, 76)));
    }

    #[test]
    fn power_attribute_sets() {
        assert_eq!(SessionState::power_attributes(Zone::AUX1).len(), 4);
        assert!(SessionState::power_attributes(Zone::MAIN).contains(&Attribute::Dimmer));
    }
}
