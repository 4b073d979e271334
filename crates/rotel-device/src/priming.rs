//! Post-power-on priming plans.
//!
//! After a zone powers on, the session waits for the device to settle and
//! then walks a fixed list of queries that pull every value the model can
//! report. The lists are pure data built from the dialect and the model's
//! capabilities; the session executes them under the command sequencer.
//!
//! HEX devices have no queries at all. They are coaxed into showing each
//! value on the front panel (step the volume down and back up, cycle the
//! tone control display) and the display frames are parsed as feedback.

use std::time::Duration;

use rotel_core::command::LogicalCommand;
use rotel_core::model::{DeviceModel, Quirk, ZoneSelectCommand};
use rotel_core::types::{Dialect, Source, Zone};

/// Delay between the power-on event and the first priming step.
pub const SETTLE_DELAY: Duration = Duration::from_millis(2500);

/// Pause after each ASCII query.
const QUERY_PAUSE_MS: u64 = 50;
/// Pause after each HEX key press.
const KEY_PAUSE_MS: u64 = 100;
/// Extra wait for the bounds replies before asking for values.
const BOUNDS_SETTLE_MS: u64 = 250;

/// One step of a priming plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Send `cmd` for `zone`, then pause.
    Send {
        zone: Zone,
        cmd: LogicalCommand,
        pause_ms: u64,
    },
    /// Pause without sending.
    Pause(u64),
    /// Cycle the shared display until it shows `zone`.
    SelectZone(Zone),
    /// Press `select` `count` times, 200 ms apart.
    SelectFeature { count: u32, select: LogicalCommand },
}

/// Runtime facts a plan depends on, read just before it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrimingContext {
    /// Zone shown on the front panel, device numbering.
    pub display_zone: u8,
    pub selecting_record: bool,
    pub main_source: Option<Source>,
}

impl Default for PrimingContext {
    fn default() -> Self {
        PrimingContext {
            display_zone: 1,
            selecting_record: false,
            main_source: None,
        }
    }
}

#[derive(Default)]
struct Plan(Vec<Step>);

impl Plan {
    fn send(&mut self, zone: Zone, cmd: LogicalCommand, pause_ms: u64) -> &mut Self {
        self.0.push(Step::Send {
            zone,
            cmd,
            pause_ms,
        });
        self
    }

    fn query(&mut self, cmd: LogicalCommand) -> &mut Self {
        self.send(Zone::MAIN, cmd, QUERY_PAUSE_MS)
    }

    fn key(&mut self, cmd: LogicalCommand) -> &mut Self {
        self.send(Zone::MAIN, cmd, KEY_PAUSE_MS)
    }
}

/// Steps run after the main zone powers on.
pub fn main_zone(dialect: Dialect, model: &DeviceModel, ctx: &PrimingContext) -> Vec<Step> {
    match dialect {
        Dialect::Hex => hex_main(model, ctx),
        Dialect::AsciiV1 => ascii_v1_main(model, ctx),
        Dialect::AsciiV2 => ascii_v2_main(model, ctx),
    }
}

/// Steps run after auxiliary `zone` powers on. Empty when the model has
/// nothing to query for that zone.
pub fn aux_zone(dialect: Dialect, model: &DeviceModel, zone: Zone) -> Vec<Step> {
    let mut plan = Plan::default();
    if zone.is_main() || !model.has_zone(zone) {
        return plan.0;
    }
    match dialect {
        Dialect::Hex => {
            plan.0.push(Step::SelectZone(zone));
            let target = if model.direct_zone_commands {
                zone
            } else {
                Zone::MAIN
            };
            plan.send(target, LogicalCommand::VolumeDown, KEY_PAUSE_MS)
                .send(target, LogicalCommand::VolumeUp, KEY_PAUSE_MS);
        }
        Dialect::AsciiV1 | Dialect::AsciiV2 if model.direct_zone_commands => {
            plan.send(zone, LogicalCommand::SourceGet, QUERY_PAUSE_MS)
                .send(zone, LogicalCommand::VolumeGet, QUERY_PAUSE_MS)
                .send(zone, LogicalCommand::MuteGet, QUERY_PAUSE_MS);
        }
        _ => {}
    }
    plan.0
}

fn hex_main(model: &DeviceModel, ctx: &PrimingContext) -> Vec<Step> {
    let mut plan = Plan::default();
    if model.hex.chars <= 13 && model.has_volume() {
        plan.key(LogicalCommand::VolumeDown)
            .key(LogicalCommand::VolumeUp);
    }
    if model.extra_zones >= 1 {
        if ctx.display_zone != 1
            && model.zone_select == Some(ZoneSelectCommand::RecordFunctionSelect)
        {
            plan.0.push(Step::SelectZone(Zone::MAIN));
        } else if !ctx.selecting_record {
            plan.key(LogicalCommand::RecordFunctionSelect);
        }
    } else {
        plan.key(LogicalCommand::RecordFunctionSelect);
    }
    if model.has_tone() {
        if model.has_quirk(Quirk::SteppedToneProbe) {
            plan.key(LogicalCommand::TrebleDown)
                .key(LogicalCommand::TrebleUp)
                .key(LogicalCommand::BassDown)
                .key(LogicalCommand::BassUp);
        } else {
            plan.0.push(Step::SelectFeature {
                count: 2,
                select: LogicalCommand::ToneControlSelect,
            });
        }
    }
    plan.0
}

fn ascii_v1_main(model: &DeviceModel, ctx: &PrimingContext) -> Vec<Step> {
    let mut plan = Plan::default();
    if !model.has_quirk(Quirk::NoAutoUpdate) {
        plan.query(LogicalCommand::UpdateAuto);
    }
    if model.has_source_control {
        plan.query(LogicalCommand::SourceGet);
    }
    if model.has_volume() || model.has_tone() {
        if model.has_volume() && !model.has_quirk(Quirk::NoVolumeBoundsQuery) {
            plan.query(LogicalCommand::VolumeGetMin)
                .query(LogicalCommand::VolumeGetMax);
        }
        if model.has_tone() {
            plan.query(LogicalCommand::ToneMaxGet);
        }
        plan.0.push(Step::Pause(BOUNDS_SETTLE_MS));
        if model.has_volume() {
            plan.query(LogicalCommand::VolumeGet);
            if !model.has_quirk(Quirk::NoMuteQuery) {
                plan.query(LogicalCommand::MuteGet);
            }
        }
        if model.has_tone() {
            plan.query(LogicalCommand::BassGet)
                .query(LogicalCommand::TrebleGet);
        }
    }
    if model.has_balance() {
        plan.query(LogicalCommand::BalanceGet);
    }
    if model.has_play_control {
        let cd_status = model.has_quirk(Quirk::CdPlayStatus)
            || (model.has_quirk(Quirk::CdPlayStatusWhenCdSource)
                && ctx.main_source == Some(Source::Cd));
        plan.query(if cd_status {
            LogicalCommand::CdPlayStatusGet
        } else {
            LogicalCommand::PlayStatusGet
        });
    }
    common_tail(&mut plan, model);
    plan.0
}

fn ascii_v2_main(model: &DeviceModel, ctx: &PrimingContext) -> Vec<Step> {
    let mut plan = Plan::default();
    plan.query(LogicalCommand::UpdateAuto);
    if model.has_source_control {
        plan.query(LogicalCommand::SourceGet);
    }
    if model.has_volume() {
        plan.query(LogicalCommand::VolumeGet)
            .query(LogicalCommand::MuteGet);
    }
    if model.has_tone() {
        plan.query(LogicalCommand::BassGet)
            .query(LogicalCommand::TrebleGet);
    }
    if model.has_tone_bypass {
        plan.query(LogicalCommand::ToneBypassGet);
    }
    if model.has_balance() {
        plan.query(LogicalCommand::BalanceGet);
    }
    if model.has_play_control {
        plan.query(LogicalCommand::PlayStatusGet);
        if ctx.main_source == Some(Source::Cd) && !model.has_source_control {
            plan.query(LogicalCommand::TrackGet);
        }
    }
    if model.has_random_repeat {
        plan.query(LogicalCommand::RandomGet)
            .query(LogicalCommand::RepeatGet);
    }
    common_tail(&mut plan, model);
    plan.0
}

fn common_tail(plan: &mut Plan, model: &DeviceModel) {
    if model.has_dsp {
        plan.query(LogicalCommand::DspModeGet);
    }
    if model.has_frequency {
        plan.query(LogicalCommand::FrequencyGet);
    }
    if model.has_dimmer() && model.dimmer_readable {
        plan.query(LogicalCommand::DimmerGet);
    }
    if model.has_speaker_groups {
        plan.query(LogicalCommand::SpeakerGet);
    }
    if model.has_identity {
        plan.query(LogicalCommand::ModelGet)
            .query(LogicalCommand::VersionGet);
    }
}
