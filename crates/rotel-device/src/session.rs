//! Device session -- the state machine between the wire and the caller.
//!
//! The session interprets every decoded [`FeedbackEvent`] into
//! [`SessionState`], emits [`DeviceEvent`]s for the channels that changed,
//! and drives the device: logical commands from callers, follow-up queries,
//! post-power-on priming and the reconnect probe all go through the one
//! [`Sequencer`].
//!
//! Lock order is always sequencer, then state. Feedback handling only ever
//! takes the state lock; anything that needs to write is spawned.

use std::sync::{Arc, Mutex as StdMutex, PoisonError, Weak};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use rotel_core::command::LogicalCommand;
use rotel_core::error::{Error, Result};
use rotel_core::events::{Attribute, DeviceEvent, FeedbackEvent, reason};
use rotel_core::model::{DeviceModel, LevelRange, Quirk, ZoneSelectCommand};
use rotel_core::transport::Transport;
use rotel_core::types::{
    ConnectionStatus, Dialect, DspMode, PlayStatus, Power, RepeatMode, Source, SpeakerGroups,
    ZONE_SLOTS, Zone,
};
use rotel_protocol::codec::codec_for;
use rotel_protocol::io::spawn_io_task;
use rotel_protocol::keys;

use crate::dispatcher::{FeedbackHandler, spawn_dispatcher};
use crate::priming::{self, PrimingContext, Step};
use crate::sequencer::{Sequence, Sequencer, SubmitOutcome};
use crate::state::SessionState;
use crate::timers::TimerSlot;

/// Pause after the record function key before the source key.
const RECORD_SELECT_PAUSE_MS: u64 = 100;
/// Pause after the first key of a front-panel feature selection.
const FEATURE_PRE_PAUSE_MS: u64 = 100;
/// Pause after each press of a front-panel select key.
const FEATURE_SELECT_PAUSE_MS: u64 = 200;
/// Pause between a dialect 1 pause command and the status query.
const PAUSE_STATUS_DELAY_MS: u64 = 50;

const PRIMING_TIMER_NAMES: [&str; ZONE_SLOTS] = [
    "main priming",
    "zone2 priming",
    "zone3 priming",
    "zone4 priming",
    "zone5 priming",
];

/// Timing and channel settings of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    /// Wait between a power-on event and its priming sequence.
    pub settle_delay: Duration,
    /// Silence after a blank HEX display before power is taken as off.
    pub power_off_grace: Duration,
    /// Capacity of the notification broadcast channel.
    pub event_capacity: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        SessionOptions {
            settle_delay: priming::SETTLE_DELAY,
            power_off_grace: Duration::from_millis(2000),
            event_capacity: 256,
        }
    }
}

/// Result of one reconnection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectOutcome {
    Online,
    /// Communication failed; retry on the next poll.
    Failed,
    /// The transport cannot be opened as configured; stop retrying.
    ConfigError,
}

/// A feedback value that could not be interpreted.
struct InvalidValue;

type Interpretation = std::result::Result<(), InvalidValue>;

/// Channels to notify after a state update, in first-touched order.
#[derive(Default)]
struct Changes(Vec<(Zone, Attribute)>);

impl Changes {
    /// Apply `update` and record `attribute` if its reported value changed.
    fn track(
        &mut self,
        state: &mut SessionState,
        zone: Zone,
        attribute: Attribute,
        update: impl FnOnce(&mut SessionState),
    ) {
        let before = state.value(zone, attribute);
        update(state);
        if state.value(zone, attribute) != before {
            self.force(zone, attribute);
        }
    }

    fn force(&mut self, zone: Zone, attribute: Attribute) {
        if !self.0.contains(&(zone, attribute)) {
            self.0.push((zone, attribute));
        }
    }

    fn force_power_group(&mut self, zone: Zone) {
        for attribute in SessionState::power_attributes(zone) {
            self.force(zone, *attribute);
        }
    }
}

/// The device session. Shared behind an `Arc` by the client, the
/// dispatcher, the supervisor and the timer jobs.
pub struct Session {
    model: Arc<DeviceModel>,
    dialect: Dialect,
    options: SessionOptions,
    state: Mutex<SessionState>,
    sequencer: Sequencer,
    status: StdMutex<(ConnectionStatus, String)>,
    event_tx: broadcast::Sender<DeviceEvent>,
    power_off: TimerSlot,
    priming: [TimerSlot; ZONE_SLOTS],
    dispatcher_cancel: CancellationToken,
    weak: Weak<Session>,
}

impl Session {
    /// Create the session and start its IO and dispatcher tasks.
    ///
    /// The transport is not opened here; the first reconnect does that.
    pub fn start(
        model: Arc<DeviceModel>,
        dialect: Dialect,
        transport: Box<dyn Transport>,
        options: SessionOptions,
    ) -> Arc<Session> {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let io = spawn_io_task(transport, codec_for(dialect, model.clone()), inbound_tx);
        let sequencer = Sequencer::new(codec_for(dialect, model.clone()), io);
        let (event_tx, _) = broadcast::channel(options.event_capacity.max(1));

        let session = Arc::new_cyclic(|weak| Session {
            state: Mutex::new(SessionState::new(&model)),
            model,
            dialect,
            options,
            sequencer,
            status: StdMutex::new((ConnectionStatus::OfflineCommError, String::new())),
            event_tx,
            power_off: TimerSlot::new("power off"),
            priming: PRIMING_TIMER_NAMES.map(TimerSlot::new),
            dispatcher_cancel: CancellationToken::new(),
            weak: weak.clone(),
        });

        spawn_dispatcher(inbound_rx, session.clone(), session.dispatcher_cancel.clone());
        debug!(model = session.model.name, dialect = %dialect, "session started");
        session
    }

    pub fn model(&self) -> &DeviceModel {
        &self.model
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.event_tx.subscribe()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .0
    }

    pub fn is_connected(&self) -> bool {
        self.sequencer.io().is_connected()
    }

    pub async fn snapshot(&self) -> SessionState {
        self.state.lock().await.clone()
    }

    /// Volume bounds as currently known: learned from the device, else the
    /// model's.
    pub async fn volume_range(&self) -> Option<LevelRange> {
        self.state.lock().await.volume_range.or(self.model.volume)
    }

    /// Stop every timer and task and close the transport.
    pub async fn shutdown(&self) {
        self.power_off.cancel();
        for slot in &self.priming {
            slot.cancel();
        }
        self.dispatcher_cancel.cancel();
        self.sequencer.io().stop().await;
        debug!("session shut down");
    }

    // -----------------------------------------------------------------
    // Status and notifications
    // -----------------------------------------------------------------

    fn set_status(&self, status: ConnectionStatus, reason: &str) {
        {
            let mut current = self.status.lock().unwrap_or_else(PoisonError::into_inner);
            if current.0 == status && current.1 == reason {
                return;
            }
            *current = (status, reason.to_string());
        }
        if status.is_online() {
            info!("device online");
        } else {
            info!(%status, reason, "device offline");
        }
        let _ = self.event_tx.send(DeviceEvent::ConnectionStatusChanged {
            status,
            reason: reason.to_string(),
        });
    }

    /// Report a communication failure and close the transport. The
    /// supervisor reopens it on its next poll.
    async fn fail_communication(&self, reason: &str) {
        self.set_status(ConnectionStatus::OfflineCommError, reason);
        let _ = self.sequencer.io().close().await;
    }

    fn emit(&self, state: &SessionState, changes: &Changes) {
        for &(zone, attribute) in &changes.0 {
            let value = state.value(zone, attribute);
            debug!(%zone, ?attribute, %value, "state changed");
            let _ = self.event_tx.send(DeviceEvent::StateChanged {
                zone,
                attribute,
                value,
            });
        }
    }

    // -----------------------------------------------------------------
    // Power transitions and timers
    // -----------------------------------------------------------------

    fn power_on(&self, state: &mut SessionState, zone: Zone, changes: &mut Changes) {
        let previous = state.power(zone);
        state.zone_mut(zone).power = Power::On;
        if previous != Power::On {
            changes.force_power_group(zone);
            self.schedule_priming(zone);
        }
    }

    /// Switch `zone` off. For the main zone, `cascade` also switches every
    /// auxiliary zone off.
    fn power_off(&self, state: &mut SessionState, zone: Zone, changes: &mut Changes, cascade: bool) {
        self.priming[zone.slot()].cancel();
        state.zone_mut(zone).power = Power::Off;
        changes.force_power_group(zone);
        if cascade && zone.is_main() {
            for aux in Zone::auxiliaries(self.model.extra_zones) {
                self.power_off(state, aux, changes, false);
            }
        }
    }

    fn schedule_priming(&self, zone: Zone) {
        let Some(session) = self.weak.upgrade() else {
            return;
        };
        self.priming[zone.slot()].schedule(self.options.settle_delay, move |token| async move {
            session.run_priming(zone, token).await;
        });
    }

    /// Start the power-off grace timer. When it fires without any feedback
    /// in between, the main zone is off. Auxiliary zones follow it with
    /// `all_zones`, or when the model cannot report their power separately.
    fn arm_power_off(&self, all_zones: bool) {
        let Some(session) = self.weak.upgrade() else {
            return;
        };
        let cascade = all_zones || !self.model.has_zone_power_commands(self.dialect);
        self.power_off.schedule(self.options.power_off_grace, move |_| async move {
            debug!(cascade, "no feedback after power-off signal, device is off");
            let mut state = session.state.lock().await;
            let mut changes = Changes::default();
            session.power_off(&mut state, Zone::MAIN, &mut changes, cascade);
            session.emit(&state, &changes);
        });
    }

    async fn force_all_off(&self) {
        let mut state = self.state.lock().await;
        let mut changes = Changes::default();
        self.power_off(&mut state, Zone::MAIN, &mut changes, true);
        self.emit(&state, &changes);
    }

    // -----------------------------------------------------------------
    // Feedback interpretation
    // -----------------------------------------------------------------

    async fn handle_feedback(&self, event: FeedbackEvent) {
        self.power_off.cancel();

        if event.key == keys::ERROR {
            debug!(value = %event.value, "device reported a read error");
            self.fail_communication(reason::READING_THREAD).await;
            return;
        }
        self.set_status(ConnectionStatus::Online, "");

        let (base, zone) = keys::split_zone_key(&event.key);
        if !self.model.has_zone(zone) {
            debug!(key = %event.key, "feedback for an undeclared zone, ignored");
            return;
        }
        let value = event.value.trim();

        let mut state = self.state.lock().await;
        let mut changes = Changes::default();
        let mut follow_ups = Vec::new();
        let result = self.interpret(
            &mut state,
            base,
            zone,
            value,
            event.preset,
            &mut changes,
            &mut follow_ups,
        );
        if result.is_err() {
            debug!(key = %event.key, value, "invalid feedback value, ignored");
        }
        self.emit(&state, &changes);
        drop(state);

        if !follow_ups.is_empty() {
            self.spawn_follow_ups(follow_ups);
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn interpret(
        &self,
        state: &mut SessionState,
        base: &str,
        zone: Zone,
        value: &str,
        preset: Option<u32>,
        changes: &mut Changes,
        follow_ups: &mut Vec<LogicalCommand>,
    ) -> Interpretation {
        match base {
            keys::POWER => {
                let value = value.to_ascii_lowercase();
                match value.as_str() {
                    keys::ON => self.power_on(state, zone, changes),
                    keys::STANDBY | keys::OFF => {
                        let cascade =
                            zone.is_main() && !self.model.has_zone_power_commands(self.dialect);
                        self.power_off(state, zone, changes, cascade);
                    }
                    keys::POWER_OFF_DELAYED if zone.is_main() => self.arm_power_off(false),
                    _ => return Err(InvalidValue),
                }
            }
            keys::VOLUME_MIN | keys::VOLUME_MAX => {
                let v = parse_int(value)?;
                let mut range = state
                    .volume_range
                    .or(self.model.volume)
                    .unwrap_or(LevelRange::new(v, v));
                if base == keys::VOLUME_MIN {
                    range.min = v;
                } else {
                    range.max = v;
                }
                debug!(min = range.min, max = range.max, "volume bounds learned");
                state.volume_range = Some(range);
            }
            keys::VOLUME if value.eq_ignore_ascii_case(keys::FIX) && !zone.is_main() => {
                track_volume(state, zone, changes, |z| z.fixed_volume = true);
            }
            keys::VOLUME => {
                let v = parse_level(value, state.volume_range)?;
                track_volume(state, zone, changes, |z| {
                    z.fixed_volume = false;
                    z.volume = v;
                });
            }
            keys::MUTE => {
                let on = parse_on_off(value)?;
                changes.track(state, zone, Attribute::Mute, |s| s.zone_mut(zone).mute = on);
            }
            keys::TONE_MAX => {
                let v = parse_int(value)?;
                debug!(max = v, "tone bounds learned");
                state.tone_range = Some(LevelRange::symmetric(v));
            }
            keys::BASS => {
                let v = parse_level(value, state.tone_range)?;
                changes.track(state, Zone::MAIN, Attribute::Bass, |s| {
                    s.zone_mut(Zone::MAIN).bass = v
                });
            }
            keys::TREBLE => {
                let v = parse_level(value, state.tone_range)?;
                changes.track(state, Zone::MAIN, Attribute::Treble, |s| {
                    s.zone_mut(Zone::MAIN).treble = v
                });
            }
            keys::BALANCE_MAX => {
                let v = parse_int(value)?;
                state.balance_range = Some(LevelRange::symmetric(v));
            }
            keys::BALANCE => {
                let v = parse_balance(value, state.balance_range)?;
                changes.track(state, Zone::MAIN, Attribute::Balance, |s| {
                    s.zone_mut(Zone::MAIN).balance = v
                });
            }
            keys::SOURCE => {
                let source = self
                    .model
                    .source_from_token(value, zone)
                    .ok_or(InvalidValue)?;
                let previous = state.zone(zone).source;
                changes.track(state, zone, Attribute::Source, |s| {
                    s.zone_mut(zone).source = Some(source)
                });
                if zone.is_main() && previous != Some(source) {
                    if self.model.has_frequency {
                        follow_ups.push(LogicalCommand::FrequencyGet);
                    }
                    if let Some(query) = self.model.preset_query(self.dialect, source) {
                        follow_ups.push(query);
                    }
                }
            }
            keys::RECORD => {
                let source = self
                    .model
                    .source_from_token(value, Zone::MAIN)
                    .ok_or(InvalidValue)?;
                changes.track(state, Zone::MAIN, Attribute::RecordSource, |s| {
                    s.record_source = Some(source)
                });
            }
            keys::DSP_MODE => {
                let token = value.to_ascii_lowercase().replace("pliix", "plii");
                let mode = DspMode::from_token(&token).ok_or(InvalidValue)?;
                changes.track(state, Zone::MAIN, Attribute::Dsp, |s| s.dsp = mode);
            }
            keys::PLAY_STATUS | keys::STATUS => {
                let status: PlayStatus = value.parse().map_err(|_| InvalidValue)?;
                changes.track(state, Zone::MAIN, Attribute::PlayStatus, |s| {
                    s.play_status = status
                });
            }
            keys::TRACK => {
                let track = parse_int(value)?;
                let cd_player = state.zone(Zone::MAIN).source == Some(Source::Cd)
                    && !self.model.has_source_control;
                if cd_player {
                    changes.track(state, Zone::MAIN, Attribute::Track, |s| s.track = track);
                }
            }
            keys::RANDOM | keys::SHUFFLE => {
                let on = parse_on_off(value)?;
                changes.track(state, Zone::MAIN, Attribute::Random, |s| s.random = on);
            }
            keys::REPEAT => {
                let mode: RepeatMode = value.parse().map_err(|_| InvalidValue)?;
                changes.track(state, Zone::MAIN, Attribute::Repeat, |s| s.repeat = mode);
            }
            keys::FM_PRESET | keys::DAB_PRESET | keys::IRADIO_PRESET => {
                let index = preset.ok_or(InvalidValue)?;
                let index = i32::try_from(index).map_err(|_| InvalidValue)?;
                changes.track(state, Zone::MAIN, Attribute::Preset, |s| s.preset = index);
                if let Ok(frequency) = parse_frequency(value) {
                    changes.track(state, Zone::MAIN, Attribute::Frequency, |s| {
                        s.zone_mut(Zone::MAIN).frequency = frequency
                    });
                }
            }
            keys::FREQUENCY => {
                let frequency = parse_frequency(value)?;
                changes.track(state, Zone::MAIN, Attribute::Frequency, |s| {
                    s.zone_mut(Zone::MAIN).frequency = frequency
                });
            }
            keys::DIMMER => {
                let level = if value.eq_ignore_ascii_case("high") {
                    self.model.dimmer.ok_or(InvalidValue)?.max
                } else if value.eq_ignore_ascii_case(keys::ON) {
                    // Some firmware reports "on" where "high" is documented.
                    debug!("dimmer reported as \"on\", ignored");
                    return Ok(());
                } else {
                    parse_int(value)?
                };
                changes.track(state, Zone::MAIN, Attribute::Dimmer, |s| s.dimmer = level);
            }
            keys::TONE_BYPASS => {
                let on = parse_on_off(value)?;
                changes.track(state, Zone::MAIN, Attribute::ToneBypass, |s| {
                    s.tone_bypass = on
                });
            }
            keys::SPEAKER => {
                let groups: SpeakerGroups = value.parse().map_err(|_| InvalidValue)?;
                changes.track(state, Zone::MAIN, Attribute::Speakers, |s| {
                    s.speakers = groups
                });
            }
            keys::MODEL => {
                changes.track(state, Zone::MAIN, Attribute::Model, |s| {
                    s.model_name = value.to_string()
                });
            }
            keys::VERSION => {
                changes.track(state, Zone::MAIN, Attribute::Version, |s| {
                    s.version = value.to_string()
                });
            }
            keys::LINE1 => {
                changes.track(state, Zone::MAIN, Attribute::Line1, |s| {
                    s.line1 = value.to_string()
                });
            }
            keys::LINE2 => {
                changes.track(state, Zone::MAIN, Attribute::Line2, |s| {
                    s.line2 = value.to_string()
                });
            }
            keys::ZONE => {
                state.display_zone = value.parse().map_err(|_| InvalidValue)?;
            }
            keys::RECORD_SEL => {
                state.selecting_record = value.eq_ignore_ascii_case(keys::ON);
            }
            keys::UPDATE_MODE | keys::DISPLAY_UPDATE => {}
            other => debug!(key = other, value, "unhandled feedback key"),
        }
        Ok(())
    }

    fn spawn_follow_ups(&self, commands: Vec<LogicalCommand>) {
        let Some(session) = self.weak.upgrade() else {
            return;
        };
        tokio::spawn(async move {
            let result = async {
                let mut seq = session.sequencer.begin(None).await?;
                for cmd in commands {
                    seq.send(Zone::MAIN, cmd, None).await?;
                }
                Ok::<_, Error>(())
            }
            .await;
            if let Err(err) = result {
                debug!(%err, "follow-up command failed");
                session.fail_communication(reason::SENDING_COMMAND).await;
            }
        });
    }

    // -----------------------------------------------------------------
    // Priming
    // -----------------------------------------------------------------

    async fn run_priming(&self, zone: Zone, cancel: CancellationToken) {
        debug!(%zone, "priming started");
        let result = async {
            let mut seq = self.sequencer.begin(Some(cancel)).await?;
            let steps = if zone.is_main() {
                let ctx = {
                    let state = self.state.lock().await;
                    PrimingContext {
                        display_zone: state.display_zone,
                        selecting_record: state.selecting_record,
                        main_source: state.zone(Zone::MAIN).source,
                    }
                };
                priming::main_zone(self.dialect, &self.model, &ctx)
            } else {
                priming::aux_zone(self.dialect, &self.model, zone)
            };
            for step in steps {
                self.run_step(&mut seq, step).await?;
            }
            Ok::<_, Error>(())
        }
        .await;

        match result {
            Ok(()) => debug!(%zone, "priming done"),
            Err(Error::Interrupted) => debug!(%zone, "priming interrupted"),
            Err(err) => {
                debug!(%zone, %err, "priming failed");
                let reason = if zone.is_main() {
                    reason::INIT_SEQUENCE
                } else {
                    reason::INIT_SEQUENCE_ZONE
                };
                self.fail_communication(reason).await;
            }
        }
    }

    async fn run_step(&self, seq: &mut Sequence<'_>, step: Step) -> Result<()> {
        match step {
            Step::Send {
                zone,
                cmd,
                pause_ms,
            } => {
                seq.send(zone, cmd, None).await?;
                seq.pause(pause_ms).await
            }
            Step::Pause(ms) => seq.pause(ms).await,
            Step::SelectZone(zone) => self.select_zone(seq, zone).await,
            Step::SelectFeature { count, select } => {
                self.select_feature(seq, count, None, select).await
            }
        }
    }

    /// Cycle a shared HEX front panel to `zone`.
    async fn select_zone(&self, seq: &mut Sequence<'_>, zone: Zone) -> Result<()> {
        let extra = i32::from(self.model.extra_zones);
        let Some(select) = self.model.zone_select else {
            return Ok(());
        };
        if self.dialect != Dialect::Hex || extra < 1 {
            return Ok(());
        }
        let (current, main_on, selecting_record) = {
            let state = self.state.lock().await;
            (
                i32::from(state.display_zone),
                state.is_on(Zone::MAIN),
                state.selecting_record,
            )
        };
        let target = i32::from(zone.display_number());
        if target == current {
            return Ok(());
        }
        let by_record_key = select == ZoneSelectCommand::RecordFunctionSelect;
        let count = if target < current {
            let mut n = target + extra - current;
            if main_on && by_record_key {
                n += 1;
            }
            n
        } else {
            let mut n = target - current;
            if main_on && current == 1 && by_record_key && !selecting_record {
                n += 1;
            }
            n
        };
        let count = u32::try_from(count).unwrap_or(0);
        debug!(%zone, current, count, "selecting zone on front panel");
        self.select_feature(seq, count, None, select.command()).await
    }

    /// Press `pre` once, then `select` `count` times (HEX only).
    async fn select_feature(
        &self,
        seq: &mut Sequence<'_>,
        count: u32,
        pre: Option<LogicalCommand>,
        select: LogicalCommand,
    ) -> Result<()> {
        if self.dialect != Dialect::Hex {
            return Ok(());
        }
        if let Some(pre) = pre {
            seq.send(Zone::MAIN, pre, None).await?;
            seq.pause(FEATURE_PRE_PAUSE_MS).await?;
        }
        for _ in 0..count {
            seq.send(Zone::MAIN, select, None).await?;
            seq.pause(FEATURE_SELECT_PAUSE_MS).await?;
        }
        Ok(())
    }

    /// Bring the tone control of `count` presses up on a HEX display.
    async fn select_tone_control(&self, seq: &mut Sequence<'_>, count: u32) -> Result<()> {
        if self.dialect == Dialect::Hex && !self.model.has_quirk(Quirk::SteppedToneProbe) {
            self.select_feature(
                seq,
                count,
                Some(LogicalCommand::RecordFunctionSelect),
                LogicalCommand::ToneControlSelect,
            )
            .await?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------
    // Reconnection
    // -----------------------------------------------------------------

    /// Close, reopen and probe the device.
    pub async fn reconnect(&self) -> ReconnectOutcome {
        debug!("trying to reconnect");
        let io = self.sequencer.io();
        let _ = io.close().await;
        self.state.lock().await.reset_power();

        let failure = match io.open().await {
            Ok(()) => self.probe().await.err(),
            Err(err) if err.is_config() => {
                warn!(%err, "transport configuration rejected, giving up");
                self.set_status(ConnectionStatus::OfflineConfigError, reason::CONFIG_TRANSPORT);
                return ReconnectOutcome::ConfigError;
            }
            Err(err) => {
                warn!(%err, "reconnection failed");
                Some(reason::RECONNECTION)
            }
        };

        match failure {
            None => {
                self.set_status(ConnectionStatus::Online, "");
                ReconnectOutcome::Online
            }
            Some(reason) => {
                self.force_all_off().await;
                self.set_status(ConnectionStatus::OfflineCommError, reason);
                ReconnectOutcome::Failed
            }
        }
    }

    /// Send the power probe with the power-off timer armed, so a silent
    /// device is taken as off.
    async fn probe(&self) -> std::result::Result<(), &'static str> {
        let sent = match self.sequencer.begin(None).await {
            Ok(mut seq) => {
                self.arm_power_off(true);
                seq.send(Zone::MAIN, self.model.power_probe, None).await
            }
            Err(err) => Err(err),
        };
        if let Err(err) = sent {
            warn!(%err, "first command after reconnection failed");
            self.power_off.cancel();
            let _ = self.sequencer.io().close().await;
            return Err(reason::FIRST_COMMAND_AFTER_RECONNECTION);
        }
        Ok(())
    }

    // -----------------------------------------------------------------
    // Logical commands
    // -----------------------------------------------------------------

    /// Execute a logical command for `zone`.
    ///
    /// Fails with [`Error::NotConnected`] while the device is offline, and
    /// with the I/O error when a write fails (the session then goes
    /// offline and the supervisor takes over). Everything else is an
    /// outcome, including commands the model does not support.
    pub async fn submit(
        &self,
        zone: Zone,
        cmd: LogicalCommand,
        value: Option<i32>,
    ) -> Result<SubmitOutcome> {
        if !self.status().is_online() || !self.is_connected() {
            debug!(%zone, %cmd, "device not online, command refused");
            return Err(Error::NotConnected);
        }
        if !self.model.has_zone(zone) {
            debug!(%zone, %cmd, "zone not declared by the model");
            return Ok(SubmitOutcome::Unsupported);
        }

        let mut seq = self.sequencer.begin(None).await?;
        let result = self.execute(&mut seq, zone, cmd, value).await;
        drop(seq);

        match result {
            Ok(outcome) => {
                debug!(%zone, %cmd, ?value, ?outcome, "command handled");
                Ok(outcome)
            }
            Err(err @ Error::InvalidParameter(_)) => Err(err),
            Err(err) => {
                debug!(%zone, %cmd, %err, "command failed");
                self.fail_communication(reason::SENDING_COMMAND).await;
                Err(err)
            }
        }
    }

    async fn is_on(&self, zone: Zone) -> bool {
        self.state.lock().await.is_on(zone)
    }

    fn supports(&self, zone: Zone, cmd: LogicalCommand) -> bool {
        self.model.commands.supports(self.dialect, zone, cmd)
    }

    /// Zone whose commands address `zone` on this device: `zone` itself
    /// when it has direct commands, else the main zone after cycling the
    /// shared HEX display to `zone`. `None` when neither works.
    async fn route(
        &self,
        seq: &mut Sequence<'_>,
        zone: Zone,
        cmd: LogicalCommand,
    ) -> Result<Option<Zone>> {
        if zone.is_main() || self.supports(zone, cmd) {
            return Ok(Some(zone));
        }
        if self.dialect == Dialect::Hex && self.model.extra_zones >= 1 {
            self.select_zone(seq, zone).await?;
            return Ok(Some(Zone::MAIN));
        }
        Ok(None)
    }

    async fn execute(
        &self,
        seq: &mut Sequence<'_>,
        zone: Zone,
        cmd: LogicalCommand,
        value: Option<i32>,
    ) -> Result<SubmitOutcome> {
        use LogicalCommand as C;

        if cmd.takes_value() && value.is_none() {
            return Err(Error::InvalidParameter(format!("{cmd} needs a value")));
        }

        match cmd {
            C::PowerOn | C::PowerOff | C::PowerToggle => self.power(seq, zone, cmd).await,

            C::SourceSelect(_) => {
                if !self.is_on(zone).await {
                    return Ok(SubmitOutcome::Ignored);
                }
                match self.route(seq, zone, cmd).await? {
                    Some(target) => seq.send(target, cmd, None).await,
                    None => Ok(SubmitOutcome::Unsupported),
                }
            }

            C::RecordSourceSelect(source) => {
                if !self.is_on(Zone::MAIN).await {
                    return Ok(SubmitOutcome::Ignored);
                }
                if self.supports(Zone::MAIN, cmd) {
                    return seq.send(Zone::MAIN, cmd, None).await;
                }
                let select = C::SourceSelect(source);
                if !self.supports(Zone::MAIN, select) {
                    return Ok(SubmitOutcome::Unsupported);
                }
                seq.send(Zone::MAIN, C::RecordFunctionSelect, None).await?;
                seq.pause(RECORD_SELECT_PAUSE_MS).await?;
                seq.send(Zone::MAIN, select, None).await
            }

            C::VolumeUp | C::VolumeDown | C::VolumeSet => self.volume(seq, zone, cmd, value).await,

            C::MuteOn | C::MuteOff | C::MuteToggle => self.mute(seq, zone, cmd).await,

            C::BassUp | C::BassDown | C::BassSet => {
                self.tone(seq, zone, cmd, value, 2, C::BassUp, C::BassDown)
                    .await
            }
            C::TrebleUp | C::TrebleDown | C::TrebleSet => {
                self.tone(seq, zone, cmd, value, 1, C::TrebleUp, C::TrebleDown)
                    .await
            }

            C::BalanceSet => {
                if !self.is_on(Zone::MAIN).await {
                    return Ok(SubmitOutcome::Ignored);
                }
                let range = self.state.lock().await.balance_range;
                if !in_range(range, value) {
                    return Ok(SubmitOutcome::Ignored);
                }
                seq.send(zone, cmd, value).await
            }

            C::DimmerSet => {
                if !self.is_on(Zone::MAIN).await {
                    return Ok(SubmitOutcome::Ignored);
                }
                let Some(range) = self.model.dimmer else {
                    return Ok(SubmitOutcome::Unsupported);
                };
                if !in_range(Some(range), value) {
                    return Ok(SubmitOutcome::Ignored);
                }
                seq.send(zone, cmd, value).await
            }

            C::Pause => {
                if !self.is_on(Zone::MAIN).await {
                    return Ok(SubmitOutcome::Ignored);
                }
                let outcome = seq.send(zone, cmd, None).await?;
                if outcome == SubmitOutcome::Sent
                    && self.dialect == Dialect::AsciiV1
                    && !self.model.has_quirk(Quirk::NoPlayStatusAfterPause)
                {
                    seq.pause(PAUSE_STATUS_DELAY_MS).await?;
                    seq.send(Zone::MAIN, C::PlayStatusGet, None).await?;
                }
                Ok(outcome)
            }

            C::DspSelect(_)
            | C::BalanceLeft
            | C::BalanceRight
            | C::ToneBypassOn
            | C::ToneBypassOff
            | C::Play
            | C::Stop
            | C::TrackForward
            | C::TrackBackward
            | C::RandomToggle
            | C::RepeatToggle
            | C::SpeakerAToggle
            | C::SpeakerBToggle => {
                if !self.is_on(Zone::MAIN).await {
                    return Ok(SubmitOutcome::Ignored);
                }
                seq.send(zone, cmd, None).await
            }

            // Queries and raw front-panel keys go straight out.
            _ => seq.send(zone, cmd, value).await,
        }
    }

    async fn power(
        &self,
        seq: &mut Sequence<'_>,
        zone: Zone,
        cmd: LogicalCommand,
    ) -> Result<SubmitOutcome> {
        if zone.is_main() || self.supports(zone, cmd) {
            return seq.send(zone, cmd, None).await;
        }
        // A single extra zone without its own power commands is toggled
        // with the zone select key while the panel shows it.
        if self.dialect == Dialect::Hex && self.model.extra_zones == 1 && zone == Zone::AUX1 {
            let (main_on, zone_on) = {
                let state = self.state.lock().await;
                (state.is_on(Zone::MAIN), state.is_on(zone))
            };
            let wanted = match cmd {
                LogicalCommand::PowerOn => !zone_on,
                LogicalCommand::PowerOff => zone_on,
                _ => true,
            };
            if !wanted {
                return Ok(SubmitOutcome::Ignored);
            }
            if main_on || zone_on {
                self.select_zone(seq, zone).await?;
            }
            return seq.send(Zone::MAIN, LogicalCommand::ZoneSelect, None).await;
        }
        Ok(SubmitOutcome::Unsupported)
    }

    async fn volume(
        &self,
        seq: &mut Sequence<'_>,
        zone: Zone,
        cmd: LogicalCommand,
        value: Option<i32>,
    ) -> Result<SubmitOutcome> {
        let (on, fixed, current, range) = {
            let state = self.state.lock().await;
            let z = state.zone(zone);
            (
                z.power.is_on(),
                z.fixed_volume,
                z.volume,
                state.volume_range.or(self.model.volume),
            )
        };
        if !on || fixed {
            return Ok(SubmitOutcome::Ignored);
        }
        if !self.model.has_volume() {
            return Ok(SubmitOutcome::Unsupported);
        }

        let step_cmd = match (cmd, value) {
            (LogicalCommand::VolumeSet, Some(target)) => {
                if !in_range(range, Some(target)) {
                    return Ok(SubmitOutcome::Ignored);
                }
                let direct = self.model.direct_volume
                    && (zone.is_main() || self.supports(zone, LogicalCommand::VolumeSet));
                if direct {
                    return seq.send(zone, cmd, value).await;
                }
                match target.cmp(&current) {
                    std::cmp::Ordering::Greater => LogicalCommand::VolumeUp,
                    std::cmp::Ordering::Less => LogicalCommand::VolumeDown,
                    std::cmp::Ordering::Equal => return Ok(SubmitOutcome::Ignored),
                }
            }
            _ => cmd,
        };

        match self.route(seq, zone, step_cmd).await? {
            Some(target) => seq.send(target, step_cmd, None).await,
            None => Ok(SubmitOutcome::Unsupported),
        }
    }

    async fn mute(
        &self,
        seq: &mut Sequence<'_>,
        zone: Zone,
        cmd: LogicalCommand,
    ) -> Result<SubmitOutcome> {
        let (on, muted) = {
            let state = self.state.lock().await;
            (state.is_on(zone), state.zone(zone).mute)
        };
        if !on {
            return Ok(SubmitOutcome::Ignored);
        }
        if !self.model.has_volume() {
            return Ok(SubmitOutcome::Unsupported);
        }
        if zone.is_main() && self.dialect == Dialect::Hex {
            // HEX devices only know the toggle key.
            let toggle = match cmd {
                LogicalCommand::MuteOn => !muted,
                LogicalCommand::MuteOff => muted,
                _ => true,
            };
            if !toggle {
                return Ok(SubmitOutcome::Ignored);
            }
            return seq.send(zone, LogicalCommand::MuteToggle, None).await;
        }
        seq.send(zone, cmd, None).await
    }

    #[allow(clippy::too_many_arguments)]
    async fn tone(
        &self,
        seq: &mut Sequence<'_>,
        zone: Zone,
        cmd: LogicalCommand,
        value: Option<i32>,
        selects: u32,
        up: LogicalCommand,
        down: LogicalCommand,
    ) -> Result<SubmitOutcome> {
        if !zone.is_main() || !self.model.has_tone() {
            return Ok(SubmitOutcome::Unsupported);
        }
        let (on, range, current) = {
            let state = self.state.lock().await;
            let main = state.zone(Zone::MAIN);
            let current = if up == LogicalCommand::BassUp {
                main.bass
            } else {
                main.treble
            };
            (main.power.is_on(), state.tone_range, current)
        };
        if !on {
            return Ok(SubmitOutcome::Ignored);
        }

        let step = match value {
            Some(target) if cmd != up && cmd != down => {
                if !in_range(range, Some(target)) {
                    return Ok(SubmitOutcome::Ignored);
                }
                if self.dialect != Dialect::Hex {
                    return seq.send(zone, cmd, value).await;
                }
                match target.cmp(&current) {
                    std::cmp::Ordering::Greater => up,
                    std::cmp::Ordering::Less => down,
                    std::cmp::Ordering::Equal => return Ok(SubmitOutcome::Ignored),
                }
            }
            _ => cmd,
        };
        self.select_tone_control(seq, selects).await?;
        seq.send(zone, step, None).await
    }
}

#[async_trait]
impl FeedbackHandler for Session {
    async fn on_feedback(&self, event: FeedbackEvent) {
        self.handle_feedback(event).await;
    }

    async fn on_read_failure(&self, error: Error) {
        debug!(%error, "reading feedback failed");
        self.set_status(ConnectionStatus::OfflineCommError, reason::READING_THREAD);
    }
}

fn track_volume(
    state: &mut SessionState,
    zone: Zone,
    changes: &mut Changes,
    update: impl FnOnce(&mut crate::state::ZoneState),
) {
    let before = (
        state.value(zone, Attribute::Volume),
        state.value(zone, Attribute::FixedVolume),
    );
    update(state.zone_mut(zone));
    if state.value(zone, Attribute::Volume) != before.0 {
        changes.force(zone, Attribute::Volume);
    }
    if state.value(zone, Attribute::FixedVolume) != before.1 {
        changes.force(zone, Attribute::FixedVolume);
    }
}

fn in_range(range: Option<LevelRange>, value: Option<i32>) -> bool {
    match (range, value) {
        (Some(range), Some(v)) => range.contains(v),
        (None, Some(_)) => true,
        (_, None) => false,
    }
}

fn parse_int(value: &str) -> std::result::Result<i32, InvalidValue> {
    value.trim().parse().map_err(|_| InvalidValue)
}

fn parse_on_off(value: &str) -> std::result::Result<bool, InvalidValue> {
    if value.eq_ignore_ascii_case(keys::ON) {
        Ok(true)
    } else if value.eq_ignore_ascii_case(keys::OFF) {
        Ok(false)
    } else {
        Err(InvalidValue)
    }
}

/// Numeric level, or a `min`/`max` sentinel resolved with `range`.
fn parse_level(value: &str, range: Option<LevelRange>) -> std::result::Result<i32, InvalidValue> {
    if value.eq_ignore_ascii_case(keys::MIN) {
        range.map(|r| r.min).ok_or(InvalidValue)
    } else if value.eq_ignore_ascii_case(keys::MAX) {
        range.map(|r| r.max).ok_or(InvalidValue)
    } else {
        parse_int(value)
    }
}

/// `L05` is left (negative), `R05` right, `000` centre.
fn parse_balance(value: &str, range: Option<LevelRange>) -> std::result::Result<i32, InvalidValue> {
    let mut chars = value.chars();
    match chars.next() {
        Some('l' | 'L') => parse_int(chars.as_str()).map(|v| -v),
        Some('r' | 'R') => parse_int(chars.as_str()),
        _ => parse_level(value, range),
    }
}

fn parse_frequency(value: &str) -> std::result::Result<f64, InvalidValue> {
    if value.eq_ignore_ascii_case(keys::OFF) {
        return Ok(0.0);
    }
    let value = value
        .strip_suffix(['k', 'K'])
        .unwrap_or(value)
        .trim();
    value.parse().map_err(|_| InvalidValue)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rotel_core::events::StateValue;
    use rotel_test_harness::{MockHandle, MockTransport};

    use crate::models;

    const STEP: Duration = Duration::from_millis(10);

    struct Fixture {
        session: Arc<Session>,
        mock: MockHandle,
        events: broadcast::Receiver<DeviceEvent>,
    }

    impl Fixture {
        /// A session whose device is connected and online, with the probe
        /// already out of the way.
        async fn online(model: DeviceModel, dialect: Dialect) -> Fixture {
            let mock = MockTransport::lenient();
            let handle = mock.handle();
            let session = Session::start(
                Arc::new(model),
                dialect,
                Box::new(mock),
                SessionOptions::default(),
            );
            let events = session.subscribe();
            assert_eq!(session.reconnect().await, ReconnectOutcome::Online);
            handle.clear_sent();
            Fixture {
                session,
                mock: handle,
                events,
            }
        }

        async fn feed(&self, data: &[u8]) {
            self.mock.push_inbound(data);
            settle().await;
        }

        fn drain(&mut self) -> Vec<DeviceEvent> {
            let mut out = Vec::new();
            while let Ok(e) = self.events.try_recv() {
                out.push(e);
            }
            out
        }

        fn changed(&mut self) -> Vec<(Zone, Attribute, StateValue)> {
            self.drain()
                .into_iter()
                .filter_map(|e| match e {
                    DeviceEvent::StateChanged {
                        zone,
                        attribute,
                        value,
                    } => Some((zone, attribute, value)),
                    _ => None,
                })
                .collect()
        }
    }

    /// Let the IO, dispatcher and spawned tasks run.
    async fn settle() {
        for _ in 0..5 {
            tokio::time::sleep(STEP).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn power_on_primes_in_declared_order() {
        let mut fx = Fixture::online(models::ra_1570(), Dialect::AsciiV1).await;
        fx.feed(b"power=on!").await;
        assert_eq!(fx.session.snapshot().await.power(Zone::MAIN), Power::On);
        assert!(fx.mock.sent_text().is_empty(), "nothing before the settle delay");

        // Any other outbound command waits for the priming sequence.
        tokio::time::sleep(Duration::from_millis(2500)).await;
        let session = fx.session.clone();
        let interleaved = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(60)).await;
            session.submit(Zone::MAIN, LogicalCommand::PowerOff, None).await
        });
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(
            interleaved.await.unwrap().unwrap(),
            SubmitOutcome::Sent
        );

        let sent = fx.mock.sent_text();
        assert_eq!(
            sent,
            vec![
                "display_update_auto!",
                "get_current_source!",
                "get_volume_min!",
                "get_volume_max!",
                "get_tone_max!",
                "get_volume!",
                "get_mute_status!",
                "get_bass!",
                "get_treble!",
                "get_balance!",
                "get_current_dimmer!",
                "get_speaker!",
                "get_product_type!",
                "get_product_version!",
                "power_off!",
            ]
        );
        // Power-on renotifies the whole main zone group.
        let changed = fx.changed();
        assert!(changed.contains(&(Zone::MAIN, Attribute::Power, StateValue::Power(Power::On))));
        assert!(changed.iter().any(|(_, a, _)| *a == Attribute::Dimmer));
    }

    #[tokio::test(start_paused = true)]
    async fn power_off_pending_is_cancelled_by_any_feedback() {
        let fx = Fixture::online(models::rsp_1066(), Dialect::Hex).await;
        fx.session.state.lock().await.zone_mut(Zone::MAIN).power = Power::On;
        fx.session
            .handle_feedback(FeedbackEvent::new(keys::POWER, keys::POWER_OFF_DELAYED))
            .await;
        assert!(fx.session.power_off.is_pending());
        tokio::time::sleep(Duration::from_millis(1500)).await;
        fx.session
            .handle_feedback(FeedbackEvent::new(keys::VOLUME, "40"))
            .await;
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(fx.session.snapshot().await.power(Zone::MAIN), Power::On);
    }

    #[tokio::test(start_paused = true)]
    async fn power_off_pending_expires_into_off() {
        let mut fx = Fixture::online(models::ra_1572(), Dialect::AsciiV2).await;
        fx.feed(b"power=on$").await;
        fx.drain();
        fx.session
            .handle_feedback(FeedbackEvent::new(keys::POWER, keys::POWER_OFF_DELAYED))
            .await;
        tokio::time::sleep(Duration::from_millis(1900)).await;
        assert_eq!(fx.session.snapshot().await.power(Zone::MAIN), Power::On);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(fx.session.snapshot().await.power(Zone::MAIN), Power::Off);
        let changed = fx.changed();
        assert!(changed.contains(&(Zone::MAIN, Attribute::Volume, StateValue::Undefined)));
    }

    #[tokio::test(start_paused = true)]
    async fn power_off_pending_expiry_cascades_without_zone_power_commands() {
        let fx = Fixture::online(models::rsx_1065(), Dialect::Hex).await;
        {
            let mut state = fx.session.state.lock().await;
            state.zone_mut(Zone::MAIN).power = Power::On;
            state.zone_mut(Zone::AUX1).power = Power::On;
        }
        fx.session
            .handle_feedback(FeedbackEvent::new(keys::POWER, keys::POWER_OFF_DELAYED))
            .await;
        tokio::time::sleep(Duration::from_millis(2100)).await;
        let state = fx.session.snapshot().await;
        assert_eq!(state.power(Zone::MAIN), Power::Off);
        assert_eq!(state.power(Zone::AUX1), Power::Off);
    }

    #[tokio::test(start_paused = true)]
    async fn power_off_pending_expiry_keeps_independent_zones() {
        let fx = Fixture::online(models::rsp_1570(), Dialect::AsciiV1).await;
        fx.feed(b"power=on!power_zone2=on!").await;
        fx.session
            .handle_feedback(FeedbackEvent::new(keys::POWER, keys::POWER_OFF_DELAYED))
            .await;
        tokio::time::sleep(Duration::from_millis(2100)).await;
        let state = fx.session.snapshot().await;
        assert_eq!(state.power(Zone::MAIN), Power::Off);
        assert_eq!(state.power(Zone::AUX1), Power::On);
    }

    #[tokio::test(start_paused = true)]
    async fn volume_sentinel_uses_learned_bounds() {
        let mut fx = Fixture::online(models::rsp_1570(), Dialect::AsciiV1).await;
        fx.feed(b"power=on!power_zone2=on!volume_max=76!volume_zone2=max!").await;
        let state = fx.session.snapshot().await;
        assert_eq!(state.zone(Zone::AUX1).volume, 76);
        assert!(fx
            .changed()
            .contains(&(Zone::AUX1, Attribute::Volume, StateValue::Int(76))));

        fx.feed(b"volume_zone2=fix!").await;
        let state = fx.session.snapshot().await;
        assert!(state.zone(Zone::AUX1).fixed_volume);
        assert!(state.value(Zone::AUX1, Attribute::Volume).is_undefined());
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_value_drops_only_that_event() {
        let fx = Fixture::online(models::ra_1572(), Dialect::AsciiV2).await;
        fx.feed(b"power=on$volume=loud$mute=on$").await;
        let state = fx.session.snapshot().await;
        assert_eq!(state.zone(Zone::MAIN).volume, 0);
        assert!(state.zone(Zone::MAIN).mute);
    }

    #[tokio::test(start_paused = true)]
    async fn per_key_rules() {
        let fx = Fixture::online(models::a14(), Dialect::AsciiV2).await;
        fx.feed(
            b"power=on$balance=L05$tone_max=10$bass=max$treble=-03$dsp_mode=dolby_pliix_music$\
              speaker=a_b$repeat=all$shuffle=on$dimmer=high$freq=87.5k$tcbypass=on$model=A14$",
        )
        .await;
        let state = fx.session.snapshot().await;
        let main = state.zone(Zone::MAIN);
        assert_eq!(main.balance, -5);
        assert_eq!(main.bass, 10);
        assert_eq!(main.treble, -3);
        assert!((main.frequency - 87.5).abs() < 1e-9);
        assert_eq!(state.dsp, DspMode::PliiMusic);
        assert_eq!(state.speakers, SpeakerGroups { a: true, b: true });
        assert_eq!(state.repeat, RepeatMode::Disc);
        assert!(state.random);
        assert_eq!(state.dimmer, 6);
        assert!(state.tone_bypass);
        assert_eq!(state.model_name, "A14");

        // "on" is a firmware alias that is deliberately not interpreted.
        fx.feed(b"dimmer=on$").await;
        assert_eq!(fx.session.snapshot().await.dimmer, 6);
    }

    #[tokio::test(start_paused = true)]
    async fn source_change_queries_frequency_and_preset() {
        let fx = Fixture::online(models::a14(), Dialect::AsciiV2).await;
        fx.feed(b"power=on$").await;
        fx.session.priming[0].cancel();
        fx.mock.clear_sent();

        fx.feed(b"source=fm$").await;
        assert_eq!(fx.mock.sent_text(), vec!["freq?", "fm_preset?"]);

        // Same source again: nothing to re-derive.
        fx.mock.clear_sent();
        fx.feed(b"source=fm$fm_preset7=9350$").await;
        assert!(fx.mock.sent_text().is_empty());
        let state = fx.session.snapshot().await;
        assert_eq!(state.preset, 7);
        assert!((state.zone(Zone::MAIN).frequency - 9350.0).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn main_standby_cascades_without_zone_power_commands() {
        let fx = Fixture::online(models::rsx_1065(), Dialect::Hex).await;
        {
            let mut state = fx.session.state.lock().await;
            state.zone_mut(Zone::MAIN).power = Power::On;
            state.zone_mut(Zone::AUX1).power = Power::On;
        }
        fx.session
            .handle_feedback(FeedbackEvent::new(keys::POWER, keys::STANDBY))
            .await;
        let state = fx.session.snapshot().await;
        assert_eq!(state.power(Zone::AUX1), Power::Off);

        let fx = Fixture::online(models::rsp_1570(), Dialect::AsciiV1).await;
        fx.feed(b"power=on!power_zone3=on!power=standby!").await;
        assert_eq!(fx.session.snapshot().await.power(Zone::AUX2), Power::On);
    }

    #[tokio::test(start_paused = true)]
    async fn unsupported_commands_never_write() {
        let fx = Fixture::online(models::ra_1572(), Dialect::AsciiV2).await;
        fx.feed(b"power=on$").await;
        fx.session.priming[0].cancel();
        fx.mock.clear_sent();

        let s = &fx.session;
        assert_eq!(
            s.submit(Zone::MAIN, LogicalCommand::SourceSelect(Source::Video5), None)
                .await
                .unwrap(),
            SubmitOutcome::Unsupported
        );
        assert_eq!(
            s.submit(Zone::AUX1, LogicalCommand::VolumeUp, None)
                .await
                .unwrap(),
            SubmitOutcome::Unsupported
        );
        assert_eq!(
            s.submit(Zone::MAIN, LogicalCommand::DspSelect(DspMode::Dts), None)
                .await
                .unwrap(),
            SubmitOutcome::Unsupported
        );
        assert!(fx.mock.sent_data().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn commands_ignored_while_zone_off_or_out_of_bounds() {
        let fx = Fixture::online(models::ra_1572(), Dialect::AsciiV2).await;
        let s = &fx.session;
        assert_eq!(
            s.submit(Zone::MAIN, LogicalCommand::VolumeUp, None).await.unwrap(),
            SubmitOutcome::Ignored
        );
        fx.feed(b"power=on$volume=20$").await;
        s.priming[0].cancel();
        fx.mock.clear_sent();
        assert_eq!(
            s.submit(Zone::MAIN, LogicalCommand::VolumeSet, Some(200)).await.unwrap(),
            SubmitOutcome::Ignored
        );
        assert_eq!(
            s.submit(Zone::MAIN, LogicalCommand::VolumeSet, Some(30)).await.unwrap(),
            SubmitOutcome::Sent
        );
        assert_eq!(
            s.submit(Zone::MAIN, LogicalCommand::BassSet, Some(-4)).await.unwrap(),
            SubmitOutcome::Sent
        );
        assert_eq!(fx.mock.sent_text(), vec!["vol_30!", "bass_-04!"]);
        assert!(matches!(
            s.submit(Zone::MAIN, LogicalCommand::VolumeSet, None).await,
            Err(Error::InvalidParameter(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn hex_volume_set_steps_toward_target() {
        let fx = Fixture::online(models::rsp_1066(), Dialect::Hex).await;
        {
            let mut state = fx.session.state.lock().await;
            state.zone_mut(Zone::MAIN).power = Power::On;
            state.zone_mut(Zone::MAIN).volume = 40;
            state.zone_mut(Zone::MAIN).mute = true;
        }
        let s = &fx.session;
        assert_eq!(
            s.submit(Zone::MAIN, LogicalCommand::VolumeSet, Some(45)).await.unwrap(),
            SubmitOutcome::Sent
        );
        assert_eq!(
            s.submit(Zone::MAIN, LogicalCommand::VolumeSet, Some(40)).await.unwrap(),
            SubmitOutcome::Ignored
        );
        // Already muted: nothing to toggle.
        assert_eq!(
            s.submit(Zone::MAIN, LogicalCommand::MuteOn, None).await.unwrap(),
            SubmitOutcome::Ignored
        );
        assert_eq!(
            s.submit(Zone::MAIN, LogicalCommand::MuteOff, None).await.unwrap(),
            SubmitOutcome::Sent
        );
        let model = s.model();
        let up = rotel_protocol::hex::encode_frame(
            model.hex.device_id,
            rotel_core::command::hex::PRIMARY_CMD,
            0x0B,
        );
        let mute = rotel_protocol::hex::encode_frame(
            model.hex.device_id,
            rotel_core::command::hex::PRIMARY_CMD,
            0x1E,
        );
        assert_eq!(fx.mock.sent_data(), vec![up, mute]);
    }

    #[tokio::test(start_paused = true)]
    async fn hex_zone_source_cycles_the_display() {
        let fx = Fixture::online(models::rsp_1066(), Dialect::Hex).await;
        {
            let mut state = fx.session.state.lock().await;
            state.zone_mut(Zone::MAIN).power = Power::On;
            state.zone_mut(Zone::AUX1).power = Power::On;
        }
        let s = &fx.session;
        assert_eq!(
            s.submit(Zone::AUX1, LogicalCommand::SourceSelect(Source::Tuner), None)
                .await
                .unwrap(),
            SubmitOutcome::Sent
        );
        // Display on zone 1, main on, record key as selector: two presses.
        let model = s.model();
        let id = model.hex.device_id;
        let primary = rotel_core::command::hex::PRIMARY_CMD;
        let record = rotel_protocol::hex::encode_frame(id, primary, 0x17);
        let tuner = rotel_protocol::hex::encode_frame(id, primary, 0x03);
        assert_eq!(fx.mock.sent_data(), vec![record.clone(), record, tuner]);
    }

    #[tokio::test(start_paused = true)]
    async fn write_failure_goes_offline_and_closes() {
        let mut fx = Fixture::online(models::ra_1572(), Dialect::AsciiV2).await;
        fx.feed(b"power=on$").await;
        fx.session.priming[0].cancel();
        fx.drain();

        fx.mock.fail_next_send(Error::ConnectionLost);
        assert!(fx
            .session
            .submit(Zone::MAIN, LogicalCommand::MuteToggle, None)
            .await
            .is_err());
        assert_eq!(fx.session.status(), ConnectionStatus::OfflineCommError);
        assert!(!fx.session.is_connected());
        assert!(fx.drain().contains(&DeviceEvent::ConnectionStatusChanged {
            status: ConnectionStatus::OfflineCommError,
            reason: reason::SENDING_COMMAND.to_string(),
        }));
        assert!(matches!(
            fx.session.submit(Zone::MAIN, LogicalCommand::MuteToggle, None).await,
            Err(Error::NotConnected)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_probe_failure_forces_zones_off() {
        let mock = MockTransport::closed();
        let handle = mock.handle();
        let session = Session::start(
            Arc::new(models::rsp_1570()),
            Dialect::AsciiV1,
            Box::new(mock),
            SessionOptions::default(),
        );
        handle.fail_next_send(Error::ConnectionLost);
        assert_eq!(session.reconnect().await, ReconnectOutcome::Failed);
        assert_eq!(session.status(), ConnectionStatus::OfflineCommError);
        let state = session.snapshot().await;
        for zone in session.model().zones() {
            assert_eq!(state.power(zone), Power::Off);
        }
        assert_eq!(handle.open_count(), 1);

        handle.fail_next_open(Error::Transport("no route".into()));
        assert_eq!(session.reconnect().await, ReconnectOutcome::Failed);

        handle.fail_next_open(Error::Config("bad port".into()));
        assert_eq!(session.reconnect().await, ReconnectOutcome::ConfigError);
        assert_eq!(session.status(), ConnectionStatus::OfflineConfigError);
    }

    #[tokio::test(start_paused = true)]
    async fn silent_device_after_reconnect_is_off() {
        let mock = MockTransport::closed();
        let handle = mock.handle();
        let session = Session::start(
            Arc::new(models::rsp_1570()),
            Dialect::Hex,
            Box::new(mock),
            SessionOptions::default(),
        );
        assert_eq!(session.reconnect().await, ReconnectOutcome::Online);
        assert_eq!(handle.sent_data().len(), 1, "exactly one probe");
        assert_eq!(session.snapshot().await.power(Zone::MAIN), Power::Unknown);
        tokio::time::sleep(Duration::from_millis(2100)).await;
        let state = session.snapshot().await;
        assert_eq!(state.power(Zone::MAIN), Power::Off);
        assert_eq!(state.power(Zone::AUX3), Power::Off);
    }

    #[tokio::test(start_paused = true)]
    async fn zone_power_off_cancels_its_priming() {
        let fx = Fixture::online(models::rsp_1570(), Dialect::AsciiV1).await;
        fx.feed(b"power_zone2=on!").await;
        assert!(fx.session.priming[Zone::AUX1.slot()].is_pending());
        fx.feed(b"power_zone2=standby!").await;
        assert!(!fx.session.priming[Zone::AUX1.slot()].is_pending());
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(fx.mock.sent_text().is_empty());
    }

    #[test]
    fn value_parsers() {
        let range = Some(LevelRange::new(0, 76));
        assert_eq!(parse_level("max", range).ok(), Some(76));
        assert!(parse_level("max", None).is_err());
        assert_eq!(parse_level("+03", None).ok(), Some(3));
        assert_eq!(parse_balance("R07", None).ok(), Some(7));
        assert_eq!(parse_balance("l07", None).ok(), Some(-7));
        assert_eq!(parse_balance("000", None).ok(), Some(0));
        assert_eq!(parse_frequency("off").ok(), Some(0.0));
        assert_eq!(parse_frequency("1234K").ok(), Some(1234.0));
        assert!(parse_on_off("maybe").is_err());
    }
}
