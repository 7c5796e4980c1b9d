pub(crate) const MAX_REPEAT_DELAY_MS: u64 = 10_000;
pub(crate) const MAX_PITCH: f32 = 2.0;
pub(crate) const MAX_VOLUME: f32 = 1.0;
pub(crate) const MIN_SPEECH_RATE_WPM: f32 = 40.0;
pub(crate) const MAX_SPEECH_RATE_WPM: f32 = 600.0;

pub(crate) fn default_repeat_delay_ms() -> u64 {
    500
}

pub(crate) fn default_pitch() -> f32 {
    1.0
}

pub(crate) fn default_volume() -> f32 {
    1.0
}

pub(crate) fn default_speech_rate_wpm() -> f32 {
    170.0
}

pub(crate) fn default_data_dir() -> String {
    ".read-repeat".to_string()
}

pub(crate) fn default_day_highlight() -> crate::config::HighlightColor {
    crate::config::HighlightColor {
        r: 0.2,
        g: 0.4,
        b: 0.7,
        a: 0.35,
    }
}

pub(crate) fn default_night_highlight() -> crate::config::HighlightColor {
    crate::config::HighlightColor {
        r: 0.8,
        g: 0.8,
        b: 0.5,
        a: 0.35,
    }
}

pub(crate) fn default_log_level() -> crate::config::LogLevel {
    crate::config::LogLevel::Debug
}
