//! Simulated receiver.
//!
//! [`SimulatedTransport`] stands in for a real device: every command frame
//! written to it is decoded back into a logical command through the model's
//! command table, applied to an internal device state, and answered with
//! the feedback a receiver of that model would send in the active dialect.
//! ASCII dialects get `key=value` lines; HEX gets standard-response display
//! frames that the HEX display parser reads back.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{BufMut, BytesMut};
use tracing::{debug, trace};

use rotel_core::command::{LogicalCommand, NativeToken, ValueFormat, hex};
use rotel_core::error::{Error, Result};
use rotel_core::model::{DeviceModel, LevelRange, ZoneSelectCommand};
use rotel_core::transport::Transport;
use rotel_core::types::{
    Dialect, DspMode, PlayStatus, RepeatMode, Source, SpeakerGroups, ZONE_SLOTS, Zone,
};
use rotel_protocol::ascii::terminator;
use rotel_protocol::hex::encode_response;
use rotel_protocol::keys;

use LogicalCommand as C;

const INITIAL_VOLUMES: [i32; ZONE_SLOTS] = [50, 20, 30, 40, 40];
const FIRMWARE_VERSION: &str = "1.00";
const RADIO_FREQUENCY: &str = "93.50";

/// What a decoded command addresses, as it will be reported back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum View {
    Main,
    Volume,
    Mute,
    Bass,
    Treble,
    Record,
    ZoneVolume(Zone),
    ZoneMute(Zone),
    ZoneSource(Zone),
}

/// Reverse of the model's command table for one dialect.
struct CommandIndex {
    hex: HashMap<(u8, u8), (Zone, LogicalCommand)>,
    hex_valued: HashMap<u8, (Zone, LogicalCommand)>,
    ascii: HashMap<String, (Zone, LogicalCommand)>,
    ascii_valued: Vec<(String, ValueFormat, Zone, LogicalCommand)>,
}

impl CommandIndex {
    fn new(model: &DeviceModel, dialect: Dialect) -> Self {
        let mut index = CommandIndex {
            hex: HashMap::new(),
            hex_valued: HashMap::new(),
            ascii: HashMap::new(),
            ascii_valued: Vec::new(),
        };
        for (zone, cmd, token) in model.commands.entries(dialect) {
            match token {
                NativeToken::Hex { kind, .. } if cmd.takes_value() => {
                    index.hex_valued.insert(*kind, (zone, cmd));
                }
                NativeToken::Hex { kind, key } => {
                    // The power query and the display refresh share a key.
                    index.hex.entry((*kind, *key)).or_insert((zone, cmd));
                }
                NativeToken::Ascii { token, format } if *format != ValueFormat::None => {
                    index
                        .ascii_valued
                        .push((token.clone(), *format, zone, cmd));
                }
                NativeToken::Ascii { token, .. } => {
                    index.ascii.insert(token.clone(), (zone, cmd));
                }
            }
        }
        // Longest prefix first so `zone2_vol_` never loses to `vol_`.
        index
            .ascii_valued
            .sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        index
    }

    fn decode_hex(
        &self,
        model: &DeviceModel,
        frame: &[u8],
    ) -> Option<(Zone, LogicalCommand, Option<i32>)> {
        let [start, _, id, kind, payload, ..] = *frame else {
            return None;
        };
        if start != hex::START || id != model.hex.device_id {
            return None;
        }
        if let Some((zone, cmd)) = self.hex_valued.get(&kind) {
            return Some((*zone, *cmd, Some(i32::from(payload))));
        }
        self.hex
            .get(&(kind, payload))
            .map(|(zone, cmd)| (*zone, *cmd, None))
    }

    fn decode_ascii(&self, frame: &[u8]) -> Option<(Zone, LogicalCommand, Option<i32>)> {
        let text = String::from_utf8_lossy(frame);
        let text = text.trim().trim_end_matches('!');
        if let Some((zone, cmd)) = self.ascii.get(text) {
            return Some((*zone, *cmd, None));
        }
        self.ascii_valued
            .iter()
            .find_map(|(prefix, format, zone, cmd)| {
                let value = format.parse(text.strip_prefix(prefix.as_str())?)?;
                Some((*zone, *cmd, Some(value)))
            })
    }
}

/// Internal state of the simulated receiver.
#[derive(Debug, Clone)]
struct DeviceState {
    power: [bool; ZONE_SLOTS],
    source: [Source; ZONE_SLOTS],
    volume: [i32; ZONE_SLOTS],
    mute: [bool; ZONE_SLOTS],
    record_source: Source,
    bass: i32,
    treble: i32,
    balance: i32,
    tone_bypass: bool,
    dsp: DspMode,
    play_status: PlayStatus,
    track: i32,
    random: bool,
    repeat: RepeatMode,
    dimmer: i32,
    speakers: SpeakerGroups,
    auto_update: bool,
    volume_range: LevelRange,
    tone_max: i32,
    balance_max: i32,
    /// Zone shown on the front panel (device numbering), 0 while the
    /// record source is being selected.
    display_zone: u8,
    /// Presses of the tone control select key since the last record key.
    tone_presses: u32,
}

impl DeviceState {
    fn new(model: &DeviceModel) -> Self {
        let first = model
            .sources
            .iter()
            .map(|e| e.source)
            .find(|s| *s != Source::FollowMain)
            .unwrap_or(Source::Cd);
        let mut source = [first; ZONE_SLOTS];
        if model.has_source(Source::FollowMain) {
            source[1..].fill(Source::FollowMain);
        }
        DeviceState {
            power: [false; ZONE_SLOTS],
            source,
            volume: INITIAL_VOLUMES,
            mute: [false; ZONE_SLOTS],
            record_source: first,
            bass: 0,
            treble: 0,
            balance: 0,
            tone_bypass: false,
            dsp: DspMode::None,
            play_status: PlayStatus::Stopped,
            track: 1,
            random: false,
            repeat: RepeatMode::Off,
            dimmer: 0,
            speakers: SpeakerGroups { a: true, b: false },
            auto_update: false,
            volume_range: model.volume.unwrap_or(LevelRange::new(0, 0)),
            tone_max: model.tone_max.unwrap_or(0),
            balance_max: model.balance_max.unwrap_or(0),
            display_zone: 1,
            tone_presses: 0,
        }
    }

    /// Apply `cmd` and return what the device shows afterwards.
    fn apply(
        &mut self,
        model: &DeviceModel,
        zone: Zone,
        cmd: LogicalCommand,
        value: Option<i32>,
    ) -> View {
        let z = zone.slot();
        let aux = !zone.is_main();
        let volume_view = if aux { View::ZoneVolume(zone) } else { View::Volume };
        let mute_view = if aux { View::ZoneMute(zone) } else { View::Mute };
        let tone = LevelRange::symmetric(self.tone_max);

        match cmd {
            C::PowerOn => self.power[z] = true,
            C::PowerOff => self.power[z] = false,
            C::PowerToggle => self.power[z] = !self.power[z],
            C::SourceSelect(source) => {
                self.source[z] = source;
                if !aux {
                    self.display_zone = 1;
                }
            }
            C::RecordSourceSelect(source) => {
                self.record_source = source;
                return View::Record;
            }
            C::VolumeUp => {
                self.volume[z] = (self.volume[z] + 1).min(self.volume_range.max);
                self.mute[z] = false;
                return volume_view;
            }
            C::VolumeDown => {
                self.volume[z] = (self.volume[z] - 1).max(self.volume_range.min);
                self.mute[z] = false;
                return volume_view;
            }
            C::VolumeSet => {
                if let Some(v) = value {
                    self.volume[z] = v.clamp(self.volume_range.min, self.volume_range.max);
                }
                return volume_view;
            }
            C::VolumeGet | C::VolumeGetMin | C::VolumeGetMax => return volume_view,
            C::MuteToggle => {
                self.mute[z] = !self.mute[z];
                return mute_view;
            }
            C::MuteOn | C::MuteOff => {
                self.mute[z] = cmd == C::MuteOn;
                return mute_view;
            }
            C::MuteGet => return mute_view,
            C::BassUp | C::BassDown | C::BassSet | C::BassGet => {
                self.bass = step(self.bass, cmd, C::BassUp, C::BassDown, value, tone);
                return View::Bass;
            }
            C::TrebleUp | C::TrebleDown | C::TrebleSet | C::TrebleGet => {
                self.treble = step(self.treble, cmd, C::TrebleUp, C::TrebleDown, value, tone);
                return View::Treble;
            }
            C::ToneControlSelect => {
                self.tone_presses += 1;
                return if self.tone_presses % 2 == 1 {
                    View::Treble
                } else {
                    View::Bass
                };
            }
            C::BalanceLeft | C::BalanceRight | C::BalanceSet => {
                let range = LevelRange::symmetric(self.balance_max);
                self.balance = step(self.balance, cmd, C::BalanceRight, C::BalanceLeft, value, range);
            }
            C::ToneBypassOn => self.tone_bypass = true,
            C::ToneBypassOff => self.tone_bypass = false,
            C::DspSelect(mode) => self.dsp = mode,
            C::Play => self.play_status = PlayStatus::Playing,
            C::Stop => self.play_status = PlayStatus::Stopped,
            C::Pause => {
                self.play_status = match self.play_status {
                    PlayStatus::Paused => PlayStatus::Playing,
                    _ => PlayStatus::Paused,
                }
            }
            C::TrackForward => self.track += 1,
            C::TrackBackward => self.track = (self.track - 1).max(1),
            C::RandomToggle => self.random = !self.random,
            C::RepeatToggle => {
                self.repeat = match self.repeat {
                    RepeatMode::Off => RepeatMode::Track,
                    RepeatMode::Track => RepeatMode::Disc,
                    RepeatMode::Disc => RepeatMode::Off,
                }
            }
            C::DimmerSet => {
                let range = model.dimmer.unwrap_or(LevelRange::new(0, 0));
                if let Some(v) = value {
                    self.dimmer = v.clamp(range.min, range.max);
                }
            }
            C::SpeakerAToggle => self.speakers.a = !self.speakers.a,
            C::SpeakerBToggle => self.speakers.b = !self.speakers.b,
            C::UpdateAuto => self.auto_update = true,
            C::UpdateManual => self.auto_update = false,
            C::RecordFunctionSelect => return self.press_record_key(model),
            C::ZoneSelect => return self.press_zone_key(model),
            _ => {}
        }
        if aux { View::ZoneSource(zone) } else { View::Main }
    }

    /// The record key opens the record source selection, and on models
    /// that use it as the zone selector, walks on through the zones.
    fn press_record_key(&mut self, model: &DeviceModel) -> View {
        self.tone_presses = 0;
        if model.zone_select != Some(ZoneSelectCommand::RecordFunctionSelect) {
            return View::Record;
        }
        let last = model.extra_zones + 1;
        self.display_zone = match self.display_zone {
            1 if self.power[0] => 0,
            0 | 1 if last >= 2 => 2,
            n if n >= 2 && n < last => n + 1,
            _ => 1,
        };
        self.display_view()
    }

    fn press_zone_key(&mut self, model: &DeviceModel) -> View {
        // With a single extra zone and no zone commands, the zone key
        // toggles that zone's power while the panel shows it.
        if model.extra_zones == 1 && !model.direct_zone_commands {
            let shown = self.display_zone == 2 || !self.power[0];
            if shown {
                self.power[1] = !self.power[1];
                self.display_zone = 2;
                return View::ZoneSource(Zone::AUX1);
            }
        }
        let last = model.extra_zones + 1;
        self.display_zone = if self.display_zone >= last { 1 } else { self.display_zone + 1 };
        self.display_view()
    }

    fn display_view(&self) -> View {
        match self.display_zone {
            0 => View::Record,
            1 => View::Main,
            n => Zone::from_display_number(n).map_or(View::Main, View::ZoneSource),
        }
    }
}

fn step(
    current: i32,
    cmd: LogicalCommand,
    up: LogicalCommand,
    down: LogicalCommand,
    value: Option<i32>,
    range: LevelRange,
) -> i32 {
    let next = if cmd == up {
        current + 1
    } else if cmd == down {
        current - 1
    } else {
        value.unwrap_or(current)
    };
    next.clamp(range.min, range.max)
}

/// A receiver simulated in memory, speaking one dialect of one model.
pub struct SimulatedTransport {
    model: Arc<DeviceModel>,
    dialect: Dialect,
    index: CommandIndex,
    device: DeviceState,
    pending: BytesMut,
    connected: bool,
}

impl SimulatedTransport {
    pub fn new(model: Arc<DeviceModel>, dialect: Dialect) -> Self {
        SimulatedTransport {
            index: CommandIndex::new(&model, dialect),
            device: DeviceState::new(&model),
            model,
            dialect,
            pending: BytesMut::new(),
            connected: false,
        }
    }

    /// Start the simulation with the main zone already on.
    pub fn powered_on(mut self) -> Self {
        self.device.power[0] = true;
        self
    }

    fn decode(&self, frame: &[u8]) -> Option<(Zone, LogicalCommand, Option<i32>)> {
        match self.dialect {
            Dialect::Hex => self.index.decode_hex(&self.model, frame),
            Dialect::AsciiV1 | Dialect::AsciiV2 => self.index.decode_ascii(frame),
        }
    }

    fn respond(&mut self, zone: Zone, cmd: LogicalCommand, value: Option<i32>) {
        let main_power = matches!(
            cmd,
            C::PowerOn | C::PowerOff | C::PowerToggle | C::PowerGet | C::DisplayRefresh
        ) && zone.is_main();
        if !self.device.power[0] && !main_power {
            trace!(%cmd, "device in standby, command ignored");
            return;
        }
        let view = self.device.apply(&self.model, zone, cmd, value);
        match self.dialect {
            Dialect::Hex => {
                let frame = self.display_frame(view);
                self.pending.put_slice(&frame);
            }
            Dialect::AsciiV1 | Dialect::AsciiV2 => {
                let end = terminator(self.dialect);
                for (key, value) in self.ascii_feedback(zone, cmd) {
                    self.pending.put_slice(key.as_bytes());
                    self.pending.put_u8(b'=');
                    self.pending.put_slice(value.as_bytes());
                    self.pending.put_u8(end);
                }
            }
        }
    }

    fn label(&self, source: Source) -> &'static str {
        if source == Source::FollowMain {
            return "SOURCE";
        }
        self.model.source_label(source).unwrap_or(source.label())
    }

    // -----------------------------------------------------------------
    // ASCII feedback
    // -----------------------------------------------------------------

    fn ascii_feedback(&self, zone: Zone, cmd: LogicalCommand) -> Vec<(String, String)> {
        let d = &self.device;
        let z = zone.slot();
        let v1 = self.dialect == Dialect::AsciiV1;
        let on_off = |on: bool| (if on { keys::ON } else { keys::OFF }).to_string();
        let tone = |v: i32| ValueFormat::SignedTone.render(v).unwrap_or_default();
        let key = |base: &str| keys::zone_key(base, zone);

        let reply = match cmd {
            C::PowerOn | C::PowerOff | C::PowerToggle | C::PowerGet => {
                let state = if d.power[z] { keys::ON } else { keys::STANDBY };
                (key(keys::POWER), state.to_string())
            }
            C::UpdateAuto | C::UpdateManual => {
                let k = if v1 { keys::DISPLAY_UPDATE } else { keys::UPDATE_MODE };
                let mode = if d.auto_update { "auto" } else { "manual" };
                (k.to_string(), mode.to_string())
            }
            C::SourceSelect(_) | C::SourceGet => (key(keys::SOURCE), d.source[z].token().to_string()),
            C::RecordSourceSelect(_) => (keys::RECORD.to_string(), d.record_source.token().to_string()),
            C::VolumeGetMin => (keys::VOLUME_MIN.to_string(), d.volume_range.min.to_string()),
            C::VolumeGetMax => (keys::VOLUME_MAX.to_string(), d.volume_range.max.to_string()),
            C::VolumeUp | C::VolumeDown | C::VolumeSet | C::VolumeGet => {
                (key(keys::VOLUME), format!("{:02}", d.volume[z]))
            }
            C::MuteToggle | C::MuteOn | C::MuteOff | C::MuteGet => (key(keys::MUTE), on_off(d.mute[z])),
            C::ToneMaxGet => (keys::TONE_MAX.to_string(), format!("{:02}", d.tone_max)),
            C::BassUp | C::BassDown | C::BassSet | C::BassGet => (keys::BASS.to_string(), tone(d.bass)),
            C::TrebleUp | C::TrebleDown | C::TrebleSet | C::TrebleGet => {
                (keys::TREBLE.to_string(), tone(d.treble))
            }
            C::BalanceLeft | C::BalanceRight | C::BalanceSet | C::BalanceGet => (
                keys::BALANCE.to_string(),
                ValueFormat::Balance.render(d.balance).unwrap_or_default(),
            ),
            C::ToneBypassOn | C::ToneBypassOff | C::ToneBypassGet => {
                (keys::TONE_BYPASS.to_string(), on_off(d.tone_bypass))
            }
            C::DspSelect(_) | C::DspModeGet => (keys::DSP_MODE.to_string(), d.dsp.token().to_string()),
            C::Play | C::Pause | C::Stop | C::PlayStatusGet | C::CdPlayStatusGet => {
                let k = if v1 { keys::PLAY_STATUS } else { keys::STATUS };
                (k.to_string(), d.play_status.to_string())
            }
            C::TrackForward | C::TrackBackward | C::TrackGet => {
                (keys::TRACK.to_string(), format!("{:03}", d.track))
            }
            C::RandomToggle | C::RandomGet => {
                let k = if v1 { keys::RANDOM } else { keys::SHUFFLE };
                (k.to_string(), on_off(d.random))
            }
            C::RepeatToggle | C::RepeatGet => (keys::REPEAT.to_string(), d.repeat.to_string()),
            C::FrequencyGet => {
                let freq = if d.source[0].is_radio() { RADIO_FREQUENCY } else { keys::OFF };
                (keys::FREQUENCY.to_string(), freq.to_string())
            }
            C::PresetGet(source) => {
                let stem = match source {
                    Source::Dab => keys::DAB_PRESET,
                    Source::Iradio => keys::IRADIO_PRESET,
                    _ => keys::FM_PRESET,
                };
                (format!("{stem}1"), RADIO_FREQUENCY.to_string())
            }
            C::DimmerSet | C::DimmerGet => (keys::DIMMER.to_string(), d.dimmer.to_string()),
            C::SpeakerAToggle | C::SpeakerBToggle | C::SpeakerGet => {
                (keys::SPEAKER.to_string(), d.speakers.to_string())
            }
            C::ModelGet => (keys::MODEL.to_string(), self.model.name.to_string()),
            C::VersionGet => (keys::VERSION.to_string(), FIRMWARE_VERSION.to_string()),
            C::DisplayRefresh => {
                let text = format!("{:<20}{:<20}", self.label(d.source[0]), self.volume_text(7));
                (keys::DISPLAY.to_string(), format!("{:03},{}", text.len(), text))
            }
            C::ZoneSelect
            | C::RecordFunctionSelect
            | C::ToneControlSelect => return Vec::new(),
        };
        vec![reply]
    }

    // -----------------------------------------------------------------
    // HEX display frames
    // -----------------------------------------------------------------

    fn volume_text(&self, width: usize) -> String {
        let d = &self.device;
        let v = d.volume[0];
        let label = if width > 7 { "VOLUME" } else { "VOL" };
        if v == d.volume_range.min {
            format!("{label} MIN")
        } else if v == d.volume_range.max {
            format!("{label} MAX")
        } else if width > 7 {
            format!(" {label}   {v:02} ")
        } else {
            format!("{label}  {v:02}")
        }
    }

    fn tone_text(name: &str, v: i32, wide: bool) -> String {
        match (wide, v) {
            (true, 0) => format!("{name:>7}    0 "),
            (true, v) if v > 0 => format!("{name:>7}  +{v:02} "),
            (true, v) => format!("{name:>7}  -{:02} ", v.unsigned_abs()),
            (false, 0) => format!("{name}    0"),
            (false, v) if v > 0 => format!("{name} + {v:02}"),
            (false, v) => format!("{name} - {:02}", v.unsigned_abs()),
        }
    }

    fn zone_text(&self, zone: Zone, view: View) -> String {
        let d = &self.device;
        let z = zone.slot();
        let prefix = format!("ZONE{}", zone.display_number());
        match view {
            View::ZoneVolume(_) => format!("{prefix} VOL {:02}", d.volume[z]),
            View::ZoneMute(_) if d.mute[z] => format!("{prefix} MUTE ON"),
            _ if !d.power[z] => format!("{prefix} OFF"),
            _ => format!("{prefix} {}", self.label(d.source[z])),
        }
    }

    /// Front panel text for `view`.
    fn display_text(&self, view: View) -> String {
        let d = &self.device;
        if !d.power[0] {
            return String::new();
        }
        let source = self.label(d.source[0]);
        let record = format!("REC {}", self.label(d.record_source));

        if self.model.hex.chars == 42 {
            let right = match view {
                View::Bass => Self::tone_text("LF", d.bass, false),
                View::Treble => Self::tone_text("HF", d.treble, false),
                _ if d.mute[0] => "MUTE ON".to_string(),
                _ => self.volume_text(7),
            };
            let line2 = match view {
                View::ZoneVolume(zone) | View::ZoneMute(zone) | View::ZoneSource(zone) => {
                    self.zone_text(zone, view)
                }
                View::Record => record,
                _ => String::new(),
            };
            return format!("{source:<14}{right:<7}{line2:<21}");
        }

        match view {
            View::Volume => self.volume_text(13),
            View::Mute if d.mute[0] => "MUTE ON".to_string(),
            View::Bass => Self::tone_text("BASS", d.bass, true),
            View::Treble => Self::tone_text("TREBLE", d.treble, true),
            View::Record => format!("{source:<7}{}", self.label(d.record_source)),
            View::ZoneVolume(zone) | View::ZoneMute(zone) | View::ZoneSource(zone) => {
                self.zone_text(zone, view)
            }
            _ => source.to_string(),
        }
    }

    fn display_frame(&self, view: View) -> Vec<u8> {
        let text = self.display_text(view);
        let flags = &self.model.hex_flags;
        let mut bits = vec![0u8; self.model.hex.flags];
        if let Some(bit) = flags.multi_input {
            bit.apply(&mut bits, self.device.source[0] == Source::Multi);
        }
        for (i, bit) in flags.zone_power.iter().enumerate() {
            if let Some(bit) = bit {
                bit.apply(&mut bits, self.device.power[i + 1]);
            }
        }
        encode_response(&self.model, text.as_bytes(), &bits)
    }
}

#[async_trait]
impl Transport for SimulatedTransport {
    async fn open(&mut self) -> Result<()> {
        if !self.connected {
            debug!(model = self.model.name, dialect = %self.dialect, "simulated connection opened");
            self.connected = true;
        }
        Ok(())
    }

    async fn send(&mut self, data: &[u8]) -> Result<()> {
        if !self.connected {
            return Err(Error::NotConnected);
        }
        match self.decode(data) {
            Some((zone, cmd, value)) => {
                trace!(%zone, %cmd, ?value, "simulator received command");
                self.respond(zone, cmd, value);
            }
            None => debug!(bytes = ?data, "simulator cannot decode command"),
        }
        Ok(())
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        if !self.connected {
            return Err(Error::NotConnected);
        }
        if self.pending.is_empty() {
            tokio::time::sleep(timeout).await;
            return Err(Error::Timeout);
        }
        let n = self.pending.len().min(buf.len());
        buf[..n].copy_from_slice(&self.pending.split_to(n));
        Ok(n)
    }

    async fn close(&mut self) -> Result<()> {
        if self.connected {
            debug!("simulated connection closed");
        }
        self.connected = false;
        self.pending.clear();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rotel_core::events::FeedbackEvent;
    use rotel_protocol::codec::codec_for;

    use crate::models;

    /// Encode `cmd`, pass it through the simulator and decode the reply.
    async fn exchange(
        sim: &mut SimulatedTransport,
        zone: Zone,
        cmd: LogicalCommand,
        value: Option<i32>,
    ) -> Vec<FeedbackEvent> {
        let mut codec = codec_for(sim.dialect, sim.model.clone());
        let frame = codec.encode(zone, cmd, value).unwrap();
        sim.send(&frame).await.unwrap();
        let mut buf = [0u8; 512];
        match sim.receive(&mut buf, Duration::from_millis(10)).await {
            Ok(n) => codec.decode(&buf[..n]),
            Err(Error::Timeout) => Vec::new(),
            Err(e) => panic!("unexpected error {e}"),
        }
    }

    fn value_of<'a>(events: &'a [FeedbackEvent], key: &str) -> Option<&'a str> {
        events
            .iter()
            .find(|e| e.key == key)
            .map(|e| e.value.trim())
    }

    async fn open(model: DeviceModel, dialect: Dialect) -> SimulatedTransport {
        let mut sim = SimulatedTransport::new(Arc::new(model), dialect);
        sim.open().await.unwrap();
        sim
    }

    #[tokio::test]
    async fn ascii_v2_loopback() {
        let mut sim = open(models::ra_1572(), Dialect::AsciiV2).await;
        let events = exchange(&mut sim, Zone::MAIN, C::PowerGet, None).await;
        assert_eq!(value_of(&events, "power"), Some("standby"));

        // Standby: nothing but power commands answer.
        assert!(exchange(&mut sim, Zone::MAIN, C::VolumeGet, None).await.is_empty());

        let events = exchange(&mut sim, Zone::MAIN, C::PowerOn, None).await;
        assert_eq!(value_of(&events, "power"), Some("on"));
        let events = exchange(&mut sim, Zone::MAIN, C::VolumeSet, Some(33)).await;
        assert_eq!(value_of(&events, "volume"), Some("33"));
        let events = exchange(&mut sim, Zone::MAIN, C::BassSet, Some(-4)).await;
        assert_eq!(value_of(&events, "bass"), Some("-04"));
        let events = exchange(&mut sim, Zone::MAIN, C::BalanceLeft, None).await;
        assert_eq!(value_of(&events, "balance"), Some("l01"));
        let events = exchange(&mut sim, Zone::MAIN, C::SourceSelect(Source::Phono), None).await;
        assert_eq!(value_of(&events, "source"), Some("phono"));
        let events = exchange(&mut sim, Zone::MAIN, C::SpeakerBToggle, None).await;
        assert_eq!(value_of(&events, "speaker"), Some("a_b"));
        let events = exchange(&mut sim, Zone::MAIN, C::ModelGet, None).await;
        assert_eq!(value_of(&events, "model"), Some("RA-1572"));
    }

    #[tokio::test]
    async fn ascii_v1_zone_commands() {
        let mut sim = open(models::rsp_1570(), Dialect::AsciiV1).await.powered_on();
        let events = exchange(&mut sim, Zone::AUX2, C::PowerOn, None).await;
        assert_eq!(value_of(&events, "power_zone3"), Some("on"));
        let events = exchange(&mut sim, Zone::AUX2, C::VolumeUp, None).await;
        assert_eq!(value_of(&events, "volume_zone3"), Some("31"));
        let events = exchange(&mut sim, Zone::MAIN, C::VolumeGetMax, None).await;
        assert_eq!(value_of(&events, "volume_max"), Some("96"));
        let events = exchange(&mut sim, Zone::MAIN, C::UpdateAuto, None).await;
        assert_eq!(value_of(&events, "display_update"), Some("auto"));
    }

    #[tokio::test]
    async fn ascii_v1_display_refresh_is_length_prefixed() {
        let mut sim = open(models::rsp_1570(), Dialect::AsciiV1).await.powered_on();
        let events = exchange(&mut sim, Zone::MAIN, C::DisplayRefresh, None).await;
        assert_eq!(value_of(&events, "line1"), Some("CD"));
        assert_eq!(value_of(&events, "line2"), Some("VOL  50"));
    }

    #[tokio::test]
    async fn hex_small_display() {
        let mut sim = open(models::rsp_1066(), Dialect::Hex).await;
        let events = exchange(&mut sim, Zone::MAIN, C::PowerGet, None).await;
        assert_eq!(value_of(&events, "power"), Some("off_delayed"));

        let events = exchange(&mut sim, Zone::MAIN, C::PowerOn, None).await;
        assert_eq!(value_of(&events, "power"), Some("on"));
        assert_eq!(value_of(&events, "source"), Some("cd"));

        let events = exchange(&mut sim, Zone::MAIN, C::VolumeDown, None).await;
        assert_eq!(value_of(&events, "volume"), Some("49"));
        let events = exchange(&mut sim, Zone::MAIN, C::MuteToggle, None).await;
        assert_eq!(value_of(&events, "mute"), Some("on"));

        // Record key then two tone select presses lands on bass.
        exchange(&mut sim, Zone::MAIN, C::RecordFunctionSelect, None).await;
        let events = exchange(&mut sim, Zone::MAIN, C::ToneControlSelect, None).await;
        assert_eq!(value_of(&events, "treble"), Some("0"));
        exchange(&mut sim, Zone::MAIN, C::ToneControlSelect, None).await;
        let events = exchange(&mut sim, Zone::MAIN, C::BassUp, None).await;
        assert_eq!(value_of(&events, "bass"), Some("+01"));

        let events = exchange(&mut sim, Zone::MAIN, C::PowerOff, None).await;
        assert_eq!(value_of(&events, "power"), Some("off_delayed"));
    }

    #[tokio::test]
    async fn hex_wide_display_reports_zones_and_flags() {
        let mut sim = open(models::rsp_1570(), Dialect::Hex).await.powered_on();
        let events = exchange(&mut sim, Zone::AUX1, C::PowerOn, None).await;
        assert_eq!(value_of(&events, "power_zone2"), Some("on"));
        assert_eq!(value_of(&events, "power_zone3"), Some("standby"));

        let events = exchange(&mut sim, Zone::AUX1, C::VolumeDown, None).await;
        assert_eq!(value_of(&events, "volume_zone2"), Some("19"));
        assert_eq!(value_of(&events, "volume"), Some("50"));

        let events = exchange(&mut sim, Zone::MAIN, C::SourceSelect(Source::Multi), None).await;
        assert_eq!(value_of(&events, "source"), Some("multi_input"));
    }

    #[tokio::test]
    async fn closed_simulator_refuses_io() {
        let mut sim = SimulatedTransport::new(Arc::new(models::a14()), Dialect::AsciiV2);
        assert!(!sim.is_connected());
        assert!(matches!(sim.send(b"power?").await, Err(Error::NotConnected)));
        sim.open().await.unwrap();
        sim.send(b"power?").await.unwrap();
        sim.close().await.unwrap();
        sim.close().await.unwrap();
        let mut buf = [0u8; 16];
        assert!(matches!(
            sim.receive(&mut buf, Duration::from_millis(1)).await,
            Err(Error::NotConnected)
        ));
    }
}
