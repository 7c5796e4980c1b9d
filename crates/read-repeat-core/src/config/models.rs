use super::defaults;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use ts_rs::TS;

/// High-level reader configuration; deserializable from TOML tables.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub theme: ThemeMode,
    pub day_highlight: HighlightColor,
    pub night_highlight: HighlightColor,
    pub repeat_delay_ms: u64,
    pub pitch: f32,
    pub volume: f32,
    pub speech_rate_wpm: f32,
    pub data_dir: String,
    pub log_level: LogLevel,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            theme: ThemeMode::Night,
            day_highlight: defaults::default_day_highlight(),
            night_highlight: defaults::default_night_highlight(),
            repeat_delay_ms: defaults::default_repeat_delay_ms(),
            pitch: defaults::default_pitch(),
            volume: defaults::default_volume(),
            speech_rate_wpm: defaults::default_speech_rate_wpm(),
            data_dir: defaults::default_data_dir(),
            log_level: defaults::default_log_level(),
        }
    }
}

impl AppConfig {
    /// Clamp values that came from disk into ranges the engine accepts.
    pub fn sanitized(mut self) -> Self {
        self.repeat_delay_ms = self.repeat_delay_ms.min(defaults::MAX_REPEAT_DELAY_MS);
        self.pitch = clamp_finite(self.pitch, 0.0, defaults::MAX_PITCH, defaults::default_pitch());
        self.volume = clamp_finite(
            self.volume,
            0.0,
            defaults::MAX_VOLUME,
            defaults::default_volume(),
        );
        self.speech_rate_wpm = clamp_finite(
            self.speech_rate_wpm,
            defaults::MIN_SPEECH_RATE_WPM,
            defaults::MAX_SPEECH_RATE_WPM,
            defaults::default_speech_rate_wpm(),
        );
        self.day_highlight = self.day_highlight.clamped();
        self.night_highlight = self.night_highlight.clamped();
        if self.data_dir.trim().is_empty() {
            self.data_dir = defaults::default_data_dir();
        }
        self
    }

    pub fn repeat_delay(&self) -> Duration {
        Duration::from_millis(self.repeat_delay_ms)
    }

    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(&self.data_dir)
    }

    pub fn highlight(&self) -> HighlightColor {
        match self.theme {
            ThemeMode::Day => self.day_highlight,
            ThemeMode::Night => self.night_highlight,
        }
    }
}

fn clamp_finite(value: f32, min: f32, max: f32, fallback: f32) -> f32 {
    if value.is_finite() {
        value.clamp(min, max)
    } else {
        fallback
    }
}

/// Theme mode.
#[derive(Debug, Clone, Copy, Deserialize, serde::Serialize, PartialEq, Eq, Default, TS)]
#[serde(rename_all = "kebab-case")]
#[ts(export)]
pub enum ThemeMode {
    Day,
    #[default]
    Night,
}

impl std::fmt::Display for ThemeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ThemeMode::Day => "Day",
            ThemeMode::Night => "Night",
        };
        write!(f, "{}", label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Deserialize, serde::Serialize, TS)]
#[ts(export)]
pub struct HighlightColor {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl HighlightColor {
    fn clamped(self) -> Self {
        HighlightColor {
            r: self.r.clamp(0.0, 1.0),
            g: self.g.clamp(0.0, 1.0),
            b: self.b.clamp(0.0, 1.0),
            a: self.a.clamp(0.0, 1.0),
        }
    }
}

/// Supported logging verbosity levels.
#[derive(Debug, Clone, Copy, Deserialize, serde::Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    #[default]
    Debug,
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_filter_str())
    }
}

impl LogLevel {
    pub fn as_filter_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}
