use serde::{Deserialize, Serialize};

use crate::app::config::ScrcpySettings;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct MirrorFlags {
    pub stay_awake: bool,
    pub turn_screen_off: bool,
    pub disable_screensaver: bool,
    pub show_touches: bool,
    pub always_on_top: bool,
    pub fullscreen: bool,
    pub no_audio: bool,
    pub extra_args: Vec<String>,
}

impl MirrorFlags {
    pub fn from_settings(settings: &ScrcpySettings) -> Self {
        Self {
            stay_awake: settings.stay_awake,
            turn_screen_off: settings.turn_screen_off,
            disable_screensaver: settings.disable_screensaver,
            show_touches: settings.show_touches,
            always_on_top: settings.always_on_top,
            fullscreen: settings.fullscreen,
            no_audio: !settings.enable_audio_playback,
            extra_args: settings
                .extra_args
                .split_whitespace()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

pub fn build_mirroring_args(
    serial: &str,
    title: &str,
    max_size: u32,
    bit_rate: &str,
    flags: &MirrorFlags,
) -> Vec<String> {
    let mut args = vec!["-s".to_string(), serial.to_string()];
    if !title.trim().is_empty() {
        args.push("--window-title".to_string());
        args.push(title.trim().to_string());
    }
    if flags.stay_awake {
        args.push("--stay-awake".to_string());
    }
    if flags.turn_screen_off {
        args.push("--turn-screen-off".to_string());
    }
    if flags.disable_screensaver {
        args.push("--disable-screensaver".to_string());
    }
    if flags.show_touches {
        args.push("--show-touches".to_string());
    }
    if flags.always_on_top {
        args.push("--always-on-top".to_string());
    }
    if flags.fullscreen {
        args.push("--fullscreen".to_string());
    }
    if flags.no_audio {
        args.push("--no-audio".to_string());
    }
    if !bit_rate.trim().is_empty() {
        args.push("--video-bit-rate".to_string());
        args.push(bit_rate.trim().to_string());
    }
    if max_size > 0 {
        args.push("--max-size".to_string());
        args.push(max_size.to_string());
    }
    args.extend(flags.extra_args.iter().cloned());
    args
}
