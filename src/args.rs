// Commandline argument parsers using clap for the tactile host tools

use crate::config::{Config, ConfigError};

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Arguments of the `tactile` binary, which talks to a real sensor board.
#[derive(Debug, Parser, Clone)]
#[clap(version, about)]
pub struct TactileArgs {
    #[command(subcommand, long_about)]
    /// Which task to perform
    pub command: CommandTask,

    /// RON settings file; options given here take precedence over it
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Auto-send period requested from the board, in milliseconds
    #[arg(short = 'p', long = "period", global = true)]
    pub period_ms: Option<u8>,
}

/// The tasks the `tactile` binary can perform.
#[derive(Debug, Subcommand, Clone)]
pub enum CommandTask {
    /// List the serial devices present on this machine
    #[command(about)]
    List,

    /// Show the sensor data live
    #[command(about)]
    Monitor(DeviceArgs),

    /// Log the sensor data to a CSV file
    #[command(about)]
    Record(RecordCommand),
}

/// Which serial device to talk to, and how fast.
#[derive(Debug, Args, Clone)]
pub struct DeviceArgs {
    /// Serial device of the sensor board; asked for when not given
    #[arg(short = 'd', long = "device")]
    pub port: Option<String>,

    /// Baud rate of the serial link
    #[arg(short = 'b', long = "baud")]
    pub baud_rate: Option<u32>,
}

/// Options of the `record` subcommand.
#[derive(Debug, Args, Clone)]
pub struct RecordCommand {
    /// The device to record from
    #[command(flatten)]
    pub device: DeviceArgs,

    /// Filename for the CSV log to be written to
    #[arg(short = 'o', long = "out")]
    pub outfile: Option<PathBuf>,

    /// Field delimiter of the CSV log
    #[arg(short = 's', long = "separator")]
    pub separator: Option<String>,

    /// Record for this many seconds without the live view
    #[arg(long = "seconds")]
    pub seconds: Option<u64>,
}

impl TactileArgs {
    /// Reads the settings file, if one was named, and lays the command line
    /// over it.
    pub fn load_config(&self) -> Result<Config, ConfigError> {
        let mut config = match &self.config {
            Some(path) => Config::from_path(path)?,
            None => Config::default(),
        };
        self.apply(&mut config);
        config.validate()?;
        Ok(config)
    }

    /// Overrides the settings given on the command line.
    pub fn apply(&self, config: &mut Config) {
        if let Some(period_ms) = self.period_ms {
            config.period_ms = period_ms;
        }
        let device = match &self.command {
            CommandTask::List => return,
            CommandTask::Monitor(device) => device,
            CommandTask::Record(record) => {
                if let Some(outfile) = &record.outfile {
                    config.log_path = outfile.clone();
                }
                if let Some(separator) = &record.separator {
                    config.csv_separator = separator.clone();
                }
                &record.device
            }
        };
        if let Some(port) = &device.port {
            config.port = Some(port.clone());
        }
        if let Some(baud_rate) = device.baud_rate {
            config.baud_rate = baud_rate;
        }
    }
}

/// Arguments of the `monitor` binary, which runs against a simulated board.
#[derive(Debug, Parser, Clone)]
#[clap(version, about)]
pub struct DummyArgs {
    /// Probability that any byte from the simulated board is corrupted
    #[arg(short = 'x', long = "corruption", default_value_t = 0.0)]
    pub corruption: f64,

    /// Amplitude of the noise added to every simulated reading
    #[arg(short = 'n', long = "noise", default_value_t = 20.0)]
    pub noise: f64,

    /// Seed for a reproducible simulation
    #[arg(long = "seed")]
    pub seed: Option<u64>,

    /// Also log the simulated data to this CSV file
    #[arg(short = 'o', long = "out")]
    pub outfile: Option<PathBuf>,

    /// RON settings file
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Auto-send period requested from the simulated board, in milliseconds
    #[arg(short = 'p', long = "period")]
    pub period_ms: Option<u8>,
}

impl DummyArgs {
    /// Reads the settings file, if one was named, and lays the command line
    /// over it.
    pub fn load_config(&self) -> Result<Config, ConfigError> {
        let mut config = match &self.config {
            Some(path) => Config::from_path(path)?,
            None => Config::default(),
        };
        if let Some(period_ms) = self.period_ms {
            config.period_ms = period_ms;
        }
        if let Some(outfile) = &self.outfile {
            config.log_path = outfile.clone();
        }
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn record_overrides_config() {
        let args = TactileArgs::try_parse_from([
            "tactile", "record", "-d", "/dev/ttyACM1", "-o", "run.csv", "-s", ";", "-p", "5",
        ])
        .unwrap();
        let config = args.load_config().unwrap();

        assert_eq!(config.port.as_deref(), Some("/dev/ttyACM1"));
        assert_eq!(config.log_path, PathBuf::from("run.csv"));
        assert_eq!(config.csv_separator, ";");
        assert_eq!(config.period_ms, 5);
        assert_eq!(config.baud_rate, Config::default().baud_rate);
    }

    #[test]
    fn file_settings_survive_unless_overridden() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tactile.ron");
        fs::write(&path, "(baud_rate: 921600, period_ms: 4, port: Some(\"/dev/ttyUSB3\"))").unwrap();

        let args = TactileArgs::try_parse_from([
            "tactile",
            "monitor",
            "--baud",
            "460800",
            "--config",
            path.to_str().unwrap(),
        ])
        .unwrap();
        let config = args.load_config().unwrap();

        assert_eq!(config.baud_rate, 460800);
        assert_eq!(config.period_ms, 4);
        assert_eq!(config.port.as_deref(), Some("/dev/ttyUSB3"));
    }

    #[test]
    fn invalid_override_is_rejected() {
        let args = TactileArgs::try_parse_from(["tactile", "record", "-s", ""]).unwrap();
        assert!(matches!(args.load_config(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn list_takes_no_device() {
        let args = TactileArgs::try_parse_from(["tactile", "list"]).unwrap();
        assert!(matches!(args.command, CommandTask::List));
        assert!(TactileArgs::try_parse_from(["tactile", "list", "-d", "x"]).is_err());
    }

    #[test]
    fn command_definitions_are_consistent() {
        use clap::CommandFactory;
        TactileArgs::command().debug_assert();
        DummyArgs::command().debug_assert();
    }

    #[test]
    fn dummy_defaults() {
        let args = DummyArgs::try_parse_from(["monitor"]).unwrap();
        assert_eq!(args.corruption, 0.0);
        assert!(args.seed.is_none());
        assert_eq!(args.load_config().unwrap(), Config::default());
    }
}
