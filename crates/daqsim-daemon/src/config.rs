//! Configuration management.
//!
//! The configuration file is TOML. Values are looked up key by key: a
//! missing file, a missing key or a value of the wrong type falls back to
//! the built-in default, so a broken configuration never stops the daemon.

use anyhow::{Context, Result};
use daqsim_core::config::{ConfigLookup, Defaults, RawValue};
use daqsim_core::{BankConfig, DEFAULT_DELIMITER, DEFAULT_WINDOW};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// TOML backed configuration lookup.
#[derive(Debug, Clone, Default)]
pub struct TomlConfig {
    table: toml::Table,
}

impl TomlConfig {
    /// Loads configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content =
            std::fs::read_to_string(path.as_ref()).context("Failed to read configuration file")?;
        Self::parse(&content)
    }

    /// Loads configuration, falling back to defaults if the file is
    /// missing or malformed.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path.as_ref()) {
            Ok(config) => {
                info!("Loaded configuration from: {}", path.as_ref().display());
                config
            }
            Err(e) => {
                warn!(
                    "Configuration {} not used: {:#}. Using defaults.",
                    path.as_ref().display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Parses configuration from TOML text.
    pub fn parse(content: &str) -> Result<Self> {
        let table: toml::Table = toml::from_str(content).context("Failed to parse configuration")?;
        Ok(Self { table })
    }
}

impl ConfigLookup for TomlConfig {
    fn raw(&self, key: &str) -> Option<RawValue> {
        let mut parts = key.split('.');
        let mut value = self.table.get(parts.next()?)?;
        for part in parts {
            value = value.as_table()?.get(part)?;
        }

        Some(match value {
            toml::Value::Integer(v) => RawValue::Int(*v),
            toml::Value::Float(v) => RawValue::Float(*v),
            toml::Value::String(s) => RawValue::Text(s.clone()),
            _ => RawValue::Other,
        })
    }
}

/// Effective daemon settings.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Time between samples
    pub sample_interval: Duration,
    /// Time between log records
    pub log_interval: Duration,
    /// Directory holding the log files
    pub log_dir: PathBuf,
    /// Log field delimiter
    pub delimiter: char,
    /// Moving-average window per analogue channel
    pub filter_window: usize,
    /// Sensor bank layout
    pub bank: BankConfig,
}

impl Settings {
    /// Reads settings from a lookup, using defaults for anything unusable.
    pub fn from_lookup(config: &impl ConfigLookup) -> Self {
        let bank_defaults = BankConfig::default();

        let window = config.int_key("filter.window", DEFAULT_WINDOW as i64);
        // Negative windows fall through to the filter's own default
        let filter_window = usize::try_from(window).unwrap_or(0);

        let bank = BankConfig {
            analogue_count: to_u32(config, "sensors.analogue.count", bank_defaults.analogue_count),
            analogue_first_id: to_u32(
                config,
                "sensors.analogue.first_id",
                bank_defaults.analogue_first_id,
            ),
            analogue_min: config.float_key("sensors.analogue.min", bank_defaults.analogue_min),
            analogue_max: config.float_key("sensors.analogue.max", bank_defaults.analogue_max),
            analogue_bits: to_u32(config, "sensors.analogue.bits", bank_defaults.analogue_bits),
            analogue_decimals: to_u32(
                config,
                "sensors.analogue.decimals",
                bank_defaults.analogue_decimals as u32,
            ) as usize,
            digital_count: to_u32(config, "sensors.digital.count", bank_defaults.digital_count),
            digital_first_id: to_u32(
                config,
                "sensors.digital.first_id",
                bank_defaults.digital_first_id,
            ),
        };

        Self {
            sample_interval: config.seconds_key("sampling.interval", default_sample_interval()),
            log_interval: config.seconds_key("logging.interval", default_log_interval()),
            log_dir: PathBuf::from(config.text_key("logging.directory", default_log_dir())),
            delimiter: config.char_key("logging.delimiter", DEFAULT_DELIMITER),
            filter_window,
            bank,
        }
    }

    /// Serializes the effective settings in configuration file layout.
    pub fn to_toml(&self) -> Result<String> {
        let file = SettingsFile {
            sampling: SamplingSection {
                interval: self.sample_interval.as_secs_f64(),
            },
            logging: LoggingSection {
                interval: self.log_interval.as_secs_f64(),
                directory: self.log_dir.display().to_string(),
                delimiter: self.delimiter.to_string(),
            },
            filter: FilterSection {
                window: self.filter_window,
            },
            sensors: SensorsSection {
                analogue: AnalogueSection {
                    count: self.bank.analogue_count,
                    first_id: self.bank.analogue_first_id,
                    min: self.bank.analogue_min,
                    max: self.bank.analogue_max,
                    bits: self.bank.analogue_bits,
                    decimals: self.bank.analogue_decimals,
                },
                digital: DigitalSection {
                    count: self.bank.digital_count,
                    first_id: self.bank.digital_first_id,
                },
            },
        };
        toml::to_string_pretty(&file).context("Failed to serialize configuration")
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_lookup(&Defaults)
    }
}

fn to_u32(config: &impl ConfigLookup, key: &str, default: u32) -> u32 {
    let value = config.int_key(key, i64::from(default));
    u32::try_from(value).unwrap_or_else(|_| {
        warn!("Config key {} out of range ({}), using {}", key, value, default);
        default
    })
}

// Default value functions
fn default_sample_interval() -> f64 {
    1.0
}

fn default_log_interval() -> f64 {
    5.0
}

fn default_log_dir() -> &'static str {
    "LogData"
}

/// Configuration file layout, used for printing the effective settings.
#[derive(Serialize)]
struct SettingsFile {
    sampling: SamplingSection,
    logging: LoggingSection,
    filter: FilterSection,
    sensors: SensorsSection,
}

#[derive(Serialize)]
struct SamplingSection {
    interval: f64,
}

#[derive(Serialize)]
struct LoggingSection {
    interval: f64,
    directory: String,
    delimiter: String,
}

#[derive(Serialize)]
struct FilterSection {
    window: usize,
}

#[derive(Serialize)]
struct SensorsSection {
    analogue: AnalogueSection,
    digital: DigitalSection,
}

#[derive(Serialize)]
struct AnalogueSection {
    count: u32,
    first_id: u32,
    min: f64,
    max: f64,
    bits: u32,
    decimals: usize,
}

#[derive(Serialize)]
struct DigitalSection {
    count: u32,
    first_id: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.sample_interval, Duration::from_secs(1));
        assert_eq!(settings.log_interval, Duration::from_secs(5));
        assert_eq!(settings.log_dir, PathBuf::from("LogData"));
        assert_eq!(settings.delimiter, ',');
        assert_eq!(settings.filter_window, 10);
        assert_eq!(settings.bank, BankConfig::default());
    }

    #[test]
    fn test_nested_keys() {
        let config = TomlConfig::parse(
            r#"
            [sampling]
            interval = 0.25

            [logging]
            interval = 2
            directory = "/tmp/daq"
            delimiter = ";"

            [sensors.analogue]
            count = 2
            min = 0
            max = 10.0
            "#,
        )
        .unwrap();
        let settings = Settings::from_lookup(&config);

        assert_eq!(settings.sample_interval, Duration::from_millis(250));
        assert_eq!(settings.log_interval, Duration::from_secs(2));
        assert_eq!(settings.log_dir, PathBuf::from("/tmp/daq"));
        assert_eq!(settings.delimiter, ';');
        assert_eq!(settings.bank.analogue_count, 2);
        assert_eq!(settings.bank.analogue_min, 0.0);
        assert_eq!(settings.bank.analogue_max, 10.0);
        assert_eq!(settings.bank.digital_count, 3);
    }

    #[test]
    fn test_malformed_values_fall_back() {
        let config = TomlConfig::parse(
            r#"
            sampling = { interval = "soon" }
            logging = { delimiter = "::", interval = -4 }
            filter = { window = -2 }
            sensors = { analogue = { count = -1, bits = "ten" } }
            "#,
        )
        .unwrap();
        let settings = Settings::from_lookup(&config);

        assert_eq!(settings.sample_interval, Duration::from_secs(1));
        assert_eq!(settings.log_interval, Duration::from_secs(5));
        assert_eq!(settings.delimiter, ',');
        assert_eq!(settings.filter_window, 0);
        assert_eq!(settings.bank.analogue_count, 5);
        assert_eq!(settings.bank.analogue_bits, 10);
    }

    #[test]
    fn test_key_through_non_table() {
        let config = TomlConfig::parse("sampling = 3").unwrap();
        assert_eq!(config.raw("sampling.interval"), None);
        assert_eq!(config.raw("sampling"), Some(RawValue::Int(3)));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let config = TomlConfig::load_or_default(tmp.path().join("nope.toml"));
        assert_eq!(Settings::from_lookup(&config), Settings::default());
    }

    #[test]
    fn test_malformed_file_uses_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("bad.toml");
        std::fs::write(&path, "[sampling\ninterval = ").unwrap();
        assert!(TomlConfig::load(&path).is_err());
        let config = TomlConfig::load_or_default(&path);
        assert_eq!(config.int_key("filter.window", 4), 4);
    }

    #[test]
    fn test_to_toml_round_trip() {
        let mut settings = Settings::default();
        settings.delimiter = '\t';
        settings.filter_window = 4;
        let text = settings.to_toml().unwrap();
        let reloaded = Settings::from_lookup(&TomlConfig::parse(&text).unwrap());
        assert_eq!(reloaded, settings);
    }
}
