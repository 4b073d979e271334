//! Feedback and notification event types.
//!
//! Two kinds of event flow through rotel-rs:
//!
//! - [`FeedbackEvent`] -- a decoded `key=value` unit produced by a wire codec
//!   from the device's byte stream, consumed by the device session.
//! - [`DeviceEvent`] -- a notification emitted by the session through a
//!   [`tokio::sync::broadcast`] channel when interpreted state changes or the
//!   connection status moves.

use std::fmt;

use crate::types::{ConnectionStatus, DspMode, PlayStatus, Power, RepeatMode, Source, SpeakerGroups, Zone};

/// A single decoded unit of device feedback.
///
/// Keys follow the ASCII vocabulary (`power`, `volume_zone2`, `source`, ...)
/// whatever the dialect; the HEX codec maps its display text onto the same
/// keys. Radio preset keys carry their index separately: `fm_preset12=...`
/// decodes to `key = "fm_preset"`, `preset = Some(12)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedbackEvent {
    pub key: String,
    pub value: String,
    pub preset: Option<u32>,
}

impl FeedbackEvent {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        FeedbackEvent {
            key: key.into(),
            value: value.into(),
            preset: None,
        }
    }

    pub fn with_preset(key: impl Into<String>, value: impl Into<String>, preset: u32) -> Self {
        FeedbackEvent {
            key: key.into(),
            value: value.into(),
            preset: Some(preset),
        }
    }
}

impl fmt::Display for FeedbackEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.preset {
            Some(n) => write!(f, "{}{}={}", self.key, n, self.value),
            None => write!(f, "{}={}", self.key, self.value),
        }
    }
}

/// A piece of state the session reports to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attribute {
    Power,
    Source,
    RecordSource,
    Volume,
    Mute,
    Bass,
    Treble,
    Balance,
    FixedVolume,
    Frequency,
    Dsp,
    PlayStatus,
    Track,
    Random,
    Repeat,
    Preset,
    Dimmer,
    ToneBypass,
    Speakers,
    Line1,
    Line2,
    Model,
    Version,
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Attribute::Power => "power",
            Attribute::Source => "source",
            Attribute::RecordSource => "record_source",
            Attribute::Volume => "volume",
            Attribute::Mute => "mute",
            Attribute::Bass => "bass",
            Attribute::Treble => "treble",
            Attribute::Balance => "balance",
            Attribute::FixedVolume => "fixed_volume",
            Attribute::Frequency => "frequency",
            Attribute::Dsp => "dsp",
            Attribute::PlayStatus => "play_status",
            Attribute::Track => "track",
            Attribute::Random => "random",
            Attribute::Repeat => "repeat",
            Attribute::Preset => "preset",
            Attribute::Dimmer => "dimmer",
            Attribute::ToneBypass => "tone_bypass",
            Attribute::Speakers => "speakers",
            Attribute::Line1 => "line1",
            Attribute::Line2 => "line2",
            Attribute::Model => "model",
            Attribute::Version => "version",
        };
        write!(f, "{s}")
    }
}

/// Value carried by a [`DeviceEvent::StateChanged`] notification.
///
/// Every channel of a zone other than its power is `Undefined` while that
/// zone is not powered on. Power itself is never `Undefined`; an unknown
/// power state is `Power(Power::Unknown)`.
#[derive(Debug, Clone, PartialEq)]
pub enum StateValue {
    Undefined,
    Power(Power),
    Bool(bool),
    Int(i32),
    Float(f64),
    Text(String),
    Source(Source),
    Dsp(DspMode),
    PlayStatus(PlayStatus),
    Repeat(RepeatMode),
    Speakers(SpeakerGroups),
}

impl StateValue {
    pub fn is_undefined(&self) -> bool {
        matches!(self, StateValue::Undefined)
    }
}

impl fmt::Display for StateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateValue::Undefined => write!(f, "UNDEF"),
            StateValue::Power(p) => write!(f, "{p}"),
            StateValue::Bool(b) => write!(f, "{}", if *b { "on" } else { "off" }),
            StateValue::Int(v) => write!(f, "{v}"),
            StateValue::Float(v) => write!(f, "{v}"),
            StateValue::Text(s) => write!(f, "{s}"),
            StateValue::Source(s) => write!(f, "{}", s.token()),
            StateValue::Dsp(m) => write!(f, "{m}"),
            StateValue::PlayStatus(p) => write!(f, "{p}"),
            StateValue::Repeat(r) => write!(f, "{r}"),
            StateValue::Speakers(s) => write!(f, "{s}"),
        }
    }
}

/// Reason codes attached to [`DeviceEvent::ConnectionStatusChanged`].
pub mod reason {
    pub const READING_THREAD: &str = "comm-error-reading-thread";
    pub const SENDING_COMMAND: &str = "comm-error-sending-command";
    pub const INIT_SEQUENCE: &str = "comm-error-init-sequence";
    pub const INIT_SEQUENCE_ZONE: &str = "comm-error-init-sequence-zone";
    pub const RECONNECTION: &str = "comm-error-reconnection";
    pub const FIRST_COMMAND_AFTER_RECONNECTION: &str = "comm-error-first-command-after-reconnection";
    pub const CONFIG_SERIAL_OVER_IP: &str = "config-error-invalid-serial-over-ip";
    pub const CONFIG_TRANSPORT: &str = "config-error-transport";
}

/// A notification emitted by the device session.
///
/// Subscribe via `RotelClient::subscribe()`. Delivery is best-effort through
/// a bounded broadcast channel; a lagging subscriber loses the oldest events
/// but the session state itself always converges to the latest feedback.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    /// A channel of a zone changed value (or became undefined).
    StateChanged {
        zone: Zone,
        attribute: Attribute,
        value: StateValue,
    },

    /// The connection status changed.
    ConnectionStatusChanged {
        status: ConnectionStatus,
        /// Reason code, empty when going online.
        reason: String,
    },
}
