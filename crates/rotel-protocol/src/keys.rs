//! Feedback key vocabulary shared by all codecs.
//!
//! The ASCII dialects report state as `key=value`. The HEX codec maps its
//! display text onto the same keys, so the device session only ever sees
//! one vocabulary. Zone-qualified keys carry the device's own zone number
//! as a `_zoneN` suffix (`volume_zone2` is the first auxiliary zone).

use rotel_core::types::Zone;

pub const POWER: &str = "power";
pub const VOLUME: &str = "volume";
pub const VOLUME_MIN: &str = "volume_min";
pub const VOLUME_MAX: &str = "volume_max";
pub const MUTE: &str = "mute";
pub const SOURCE: &str = "source";
pub const RECORD: &str = "record";
pub const RECORD_SEL: &str = "record_sel";
pub const ZONE: &str = "zone";
pub const TONE_MAX: &str = "tone_max";
pub const BASS: &str = "bass";
pub const TREBLE: &str = "treble";
pub const BALANCE: &str = "balance";
pub const BALANCE_MAX: &str = "balance_max";
pub const DSP_MODE: &str = "dsp_mode";
pub const PLAY_STATUS: &str = "play_status";
pub const STATUS: &str = "status";
pub const TRACK: &str = "track";
pub const RANDOM: &str = "random";
pub const SHUFFLE: &str = "shuffle";
pub const REPEAT: &str = "repeat";
pub const FREQUENCY: &str = "freq";
pub const DIMMER: &str = "dimmer";
pub const TONE_BYPASS: &str = "tcbypass";
pub const SPEAKER: &str = "speaker";
pub const MODEL: &str = "model";
pub const VERSION: &str = "version";
pub const LINE1: &str = "line1";
pub const LINE2: &str = "line2";
pub const UPDATE_MODE: &str = "update_mode";
pub const DISPLAY_UPDATE: &str = "display_update";
pub const ERROR: &str = "error";

/// V1 length-prefixed display frame (`display=NNN,<text>`).
pub const DISPLAY: &str = "display";
pub const DISPLAY1: &str = "display1";
pub const DISPLAY2: &str = "display2";

/// Radio preset key stems; the device appends the preset number.
pub const FM_PRESET: &str = "fm_preset";
pub const DAB_PRESET: &str = "dab_preset";
pub const IRADIO_PRESET: &str = "iradio_preset";
const PRESET_STEMS: [&str; 3] = [FM_PRESET, DAB_PRESET, IRADIO_PRESET];

pub const ON: &str = "on";
pub const OFF: &str = "off";
pub const STANDBY: &str = "standby";
/// Blank HEX display: power may be going off.
pub const POWER_OFF_DELAYED: &str = "off_delayed";
pub const MIN: &str = "min";
pub const MAX: &str = "max";
pub const FIX: &str = "fix";

/// Key for `base` in `zone`: the bare key for the main zone, `base_zoneN`
/// for auxiliary zones.
pub fn zone_key(base: &str, zone: Zone) -> String {
    if zone.is_main() {
        base.to_string()
    } else {
        format!("{}_zone{}", base, zone.display_number())
    }
}

/// Split a `_zoneN` suffix off a key. Keys without a valid suffix belong
/// to the main zone.
pub fn split_zone_key(key: &str) -> (&str, Zone) {
    if let Some((base, number)) = key.rsplit_once("_zone") {
        if !base.is_empty() && number.len() == 1 {
            let zone = number
                .parse::<u8>()
                .ok()
                .filter(|n| *n >= 2)
                .and_then(Zone::from_display_number);
            if let Some(zone) = zone {
                return (base, zone);
            }
        }
    }
    (key, Zone::MAIN)
}

/// Split a radio preset key into its stem and preset number.
///
/// `fm_preset12` yields `("fm_preset", Some(12))`, a bare `fm_preset` yields
/// `("fm_preset", None)`. Any other key yields `None`.
pub fn split_preset_key(key: &str) -> Option<(&'static str, Option<u32>)> {
    let stem_len = key.trim_end_matches(|c: char| c.is_ascii_digit()).len();
    let (stem, digits) = key.split_at(stem_len);
    let stem = PRESET_STEMS.iter().copied().find(|s| *s == stem)?;
    if digits.is_empty() {
        Some((stem, None))
    } else {
        Some((stem, digits.parse().ok()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zone_keys_use_device_numbering() {
        assert_eq!(zone_key(VOLUME, Zone::MAIN), "volume");
        assert_eq!(zone_key(VOLUME, Zone::AUX1), "volume_zone2");
        assert_eq!(zone_key(POWER, Zone::AUX4), "power_zone5");
    }

    #[test]
    fn split_zone_suffix() {
        assert_eq!(split_zone_key("volume_zone2"), ("volume", Zone::AUX1));
        assert_eq!(split_zone_key("source_zone4"), ("source", Zone::AUX3));
        assert_eq!(split_zone_key("power_zone5"), ("power", Zone::AUX4));
        assert_eq!(split_zone_key("volume"), ("volume", Zone::MAIN));
        assert_eq!(split_zone_key("volume_zone1"), ("volume_zone1", Zone::MAIN));
        assert_eq!(split_zone_key("volume_zone9"), ("volume_zone9", Zone::MAIN));
        assert_eq!(split_zone_key("_zone2"), ("_zone2", Zone::MAIN));
    }

    #[test]
    fn split_preset_keys() {
        assert_eq!(split_preset_key("fm_preset12"), Some((FM_PRESET, Some(12))));
        assert_eq!(split_preset_key("dab_preset3"), Some((DAB_PRESET, Some(3))));
        assert_eq!(split_preset_key("iradio_preset"), Some((IRADIO_PRESET, None)));
        assert_eq!(split_preset_key("volume"), None);
        assert_eq!(split_preset_key("am_preset2"), None);
    }
}
