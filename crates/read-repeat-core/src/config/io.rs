use super::models::AppConfig;
use super::tables::ConfigTables;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

/// Load configuration from disk, falling back to defaults on any error.
pub fn load_config(path: &Path) -> AppConfig {
    let contents = match fs::read_to_string(path) {
        Ok(data) => {
            info!(path = %path.display(), "Loaded base config");
            data
        }
        Err(err) => {
            warn!(
                path = %path.display(),
                "Falling back to default config: {err}"
            );
            return AppConfig::default();
        }
    };

    match parse_config(&contents) {
        Ok(cfg) => {
            debug!("Parsed configuration from disk");
            cfg
        }
        Err(err) => {
            warn!(path = %path.display(), "Invalid config TOML: {err}");
            AppConfig::default()
        }
    }
}

pub fn parse_config(contents: &str) -> Result<AppConfig, toml::de::Error> {
    let tables: ConfigTables = toml::from_str(contents)?;
    Ok(AppConfig::from(tables).sanitized())
}

pub fn serialize_config(config: &AppConfig) -> Result<String, toml::ser::Error> {
    toml::to_string_pretty(&ConfigTables::from(config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LogLevel, ThemeMode};

    #[test]
    fn empty_document_uses_defaults() {
        let cfg = parse_config("").expect("empty config parses");
        assert_eq!(cfg, AppConfig::default());
        assert_eq!(cfg.repeat_delay_ms, 500);
        assert_eq!(cfg.pitch, 1.0);
        assert_eq!(cfg.volume, 1.0);
    }

    #[test]
    fn reads_sectioned_tables() {
        let cfg = parse_config(
            r#"
            [appearance]
            theme = "day"

            [playback]
            repeat_delay_ms = 1200
            volume = 0.5

            [library]
            data_dir = "/tmp/library"

            [logging]
            log_level = "warn"
            "#,
        )
        .expect("config parses");
        assert_eq!(cfg.theme, ThemeMode::Day);
        assert_eq!(cfg.repeat_delay_ms, 1200);
        assert_eq!(cfg.volume, 0.5);
        assert_eq!(cfg.pitch, 1.0);
        assert_eq!(cfg.data_dir, "/tmp/library");
        assert_eq!(cfg.log_level, LogLevel::Warn);
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let cfg = parse_config(
            r#"
            [playback]
            repeat_delay_ms = 99999
            pitch = 7.5
            volume = -1.0
            speech_rate_wpm = 5.0

            [library]
            data_dir = "   "
            "#,
        )
        .expect("config parses");
        assert_eq!(cfg.repeat_delay_ms, 10_000);
        assert_eq!(cfg.pitch, 2.0);
        assert_eq!(cfg.volume, 0.0);
        assert_eq!(cfg.speech_rate_wpm, 40.0);
        assert_eq!(cfg.data_dir, ".read-repeat");
    }

    #[test]
    fn invalid_toml_is_reported() {
        assert!(parse_config("[playback\nrepeat_delay_ms = ").is_err());
        assert!(parse_config("[logging]\nlog_level = \"loud\"").is_err());
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let path = std::env::temp_dir().join("read_repeat_missing_config_does_not_exist.toml");
        assert_eq!(load_config(&path), AppConfig::default());
    }

    #[test]
    fn serialized_config_parses_back() {
        let mut cfg = AppConfig::default();
        cfg.theme = ThemeMode::Day;
        cfg.repeat_delay_ms = 750;
        cfg.log_level = LogLevel::Info;
        let text = serialize_config(&cfg).expect("config serializes");
        assert!(text.contains("[playback]"));
        assert_eq!(parse_config(&text).expect("config parses"), cfg);
    }
}
