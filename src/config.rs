//! Runtime settings, read from a [ron] file.
//!
//! Every field has a default, so a file only needs to name what it changes:
//!
//! ```text
//! (port: Some("/dev/ttyACM0"), period_ms: 2, csv_separator: ";")
//! ```

use serde::{Deserialize, Serialize};
use std::{
    borrow::Cow,
    fmt,
    fs::File,
    io::{Read, Write},
    path::{Path, PathBuf},
    time::Duration,
};

/// Settings for the acquisition, the consumers and the front-end.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Serial device to open; asked for interactively when absent.
    pub port: Option<String>,
    /// Baud rate of the serial link.
    pub baud_rate: u32,
    /// Auto-send period requested from the device, in milliseconds.
    pub period_ms: u8,
    /// How long one poll of the serial port may wait for data.
    pub poll_timeout_ms: u64,
    /// Frames retained for the live view.
    pub view_capacity: usize,
    /// Frames retained between two log flushes.
    pub log_capacity: usize,
    /// Field delimiter of the CSV log.
    pub csv_separator: String,
    /// Where the CSV log is written.
    pub log_path: PathBuf,
    /// Live view refresh period, in milliseconds.
    pub ui_refresh_ms: u64,
    /// Log flush period, in milliseconds.
    pub log_flush_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: None,
            baud_rate: 115_200,
            period_ms: 1,
            poll_timeout_ms: 1,
            // Four seconds of history at the default 1 kHz period
            view_capacity: 4096,
            log_capacity: 1024,
            csv_separator: ",".to_owned(),
            log_path: PathBuf::from("finger_data.csv"),
            ui_refresh_ms: 20,
            log_flush_ms: 20,
        }
    }
}

/// Returned when a [Config] cannot be loaded or saved.
#[derive(Debug)]
pub enum ConfigError {
    /// Returned when the file cannot be read or written.
    IoError(std::io::Error),

    /// Returned when the file is not valid RON for a [Config].
    RonSpannedError(ron::de::SpannedError),

    /// Returned when serialization fails.
    RonError(ron::Error),

    /// Returned when a setting is out of range.
    Invalid(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use ConfigError as CE;
        let msg = match self {
            CE::IoError(error) => Cow::from(format!("io error: {}", error)),
            CE::RonSpannedError(error) => Cow::from(format!("config syntax error: {}", error)),
            CE::RonError(error) => Cow::from(format!("ron error: {}", error)),
            CE::Invalid(what) => Cow::from(format!("invalid setting: {}", what)),
        };

        write!(f, "{}", msg)
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(value: std::io::Error) -> Self {
        Self::IoError(value)
    }
}

impl Config {
    /// Reads a [Config] from the path provided.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let mut handle = File::open(path)?;
        Self::from_reader(&mut handle)
    }

    /// Reads a [Config] from the [Read]able object provided.
    pub fn from_reader(reader: &mut impl Read) -> Result<Self, ConfigError> {
        let mut text = Vec::new();
        reader.read_to_end(&mut text)?;
        let config =
            ron::de::from_bytes::<Config>(&text).map_err(ConfigError::RonSpannedError)?;
        config.validate()?;
        Ok(config)
    }

    /// Writes the [Config] out to the path provided.
    pub fn to_path(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let text = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(ConfigError::RonError)?;
        File::create(path)?.write_all(text.as_bytes())?;
        Ok(())
    }

    /// Checks the settings that would otherwise misbehave at runtime.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.baud_rate == 0 {
            return Err(ConfigError::Invalid("baud_rate must be positive"));
        }
        if self.poll_timeout_ms == 0 {
            return Err(ConfigError::Invalid("poll_timeout_ms must be positive"));
        }
        if self.view_capacity == 0 || self.log_capacity == 0 {
            return Err(ConfigError::Invalid("buffer capacities must be positive"));
        }
        if self.csv_separator.is_empty() {
            return Err(ConfigError::Invalid("csv_separator must not be empty"));
        }
        Ok(())
    }

    /// [Self::poll_timeout_ms] as a [Duration].
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    /// [Self::ui_refresh_ms] as a [Duration].
    pub fn ui_refresh(&self) -> Duration {
        Duration::from_millis(self.ui_refresh_ms)
    }

    /// [Self::log_flush_ms] as a [Duration].
    pub fn log_flush(&self) -> Duration {
        Duration::from_millis(self.log_flush_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn partial_file_keeps_defaults() {
        let text = r#"(port: Some("/dev/ttyUSB0"), period_ms: 4)"#;
        let config = Config::from_reader(&mut text.as_bytes()).unwrap();

        assert_eq!(config.port.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(config.period_ms, 4);
        assert_eq!(config.baud_rate, 115_200);
        assert_eq!(config.csv_separator, ",");
        assert_eq!(config.view_capacity, 4096);
    }

    #[test]
    fn empty_struct_is_default() {
        let config = Config::from_reader(&mut "()".as_bytes()).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn rejects_invalid_values() {
        let res = Config::from_reader(&mut "(log_capacity: 0)".as_bytes());
        assert!(matches!(res, Err(ConfigError::Invalid(_))));

        let res = Config::from_reader(&mut r#"(csv_separator: "")"#.as_bytes());
        assert!(matches!(res, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_syntax_errors() {
        let res = Config::from_reader(&mut "(period_ms: \"fast\")".as_bytes());
        assert!(matches!(res, Err(ConfigError::RonSpannedError(_))));
    }

    #[test]
    fn file_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tactile.ron");

        let config = Config {
            port: Some("COM3".to_owned()),
            csv_separator: ";".to_owned(),
            log_flush_ms: 100,
            ..Config::default()
        };
        config.to_path(&path).unwrap();

        assert_eq!(Config::from_path(&path).unwrap(), config);
    }

    #[test]
    fn missing_file() {
        let dir = tempdir().unwrap();
        let res = Config::from_path(dir.path().join("nope.ron"));
        assert!(matches!(res, Err(ConfigError::IoError(_))));
    }
}
