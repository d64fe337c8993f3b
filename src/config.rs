use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::link::DEFAULT_BAUD;
use crate::plot::PlotSettings;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

fn load<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn default_baud() -> u32 {
    DEFAULT_BAUD
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("measurements")
}

fn default_settle_ms() -> u64 {
    2000
}

fn default_send_timeout_ms() -> u64 {
    5000
}

fn default_poll_interval_ms() -> u64 {
    50
}

fn default_idle_delay_ms() -> u64 {
    100
}

fn default_true() -> bool {
    true
}

fn default_font_paths() -> Vec<PathBuf> {
    [
        "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
        "/usr/share/fonts/TTF/DejaVuSans.ttf",
        "/usr/share/fonts/dejavu/DejaVuSans.ttf",
        "/usr/share/fonts/dejavu-sans-fonts/DejaVuSans.ttf",
    ]
    .into_iter()
    .map(PathBuf::from)
    .collect()
}

/// Settings for the measurement receiver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiverConfig {
    /// Serial device, e.g. `/dev/ttyACM0`.
    #[serde(default)]
    pub port: Option<String>,
    #[serde(default = "default_baud")]
    pub baud_rate: u32,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Wait after opening the port; the board resets on connect.
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Pause at the end of every loop cycle.
    #[serde(default = "default_idle_delay_ms")]
    pub idle_delay_ms: u64,
    #[serde(default = "default_true")]
    pub plots: bool,
    #[serde(default)]
    pub viewer: Option<String>,
    #[serde(default = "default_font_paths")]
    pub font_paths: Vec<PathBuf>,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: default_baud(),
            output_dir: default_output_dir(),
            settle_ms: default_settle_ms(),
            send_timeout_ms: default_send_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            idle_delay_ms: default_idle_delay_ms(),
            plots: true,
            viewer: None,
            font_paths: default_font_paths(),
        }
    }
}

impl ReceiverConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        load(path.as_ref())
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn idle_delay(&self) -> Duration {
        Duration::from_millis(self.idle_delay_ms)
    }

    pub fn plot_settings(&self) -> PlotSettings {
        PlotSettings {
            viewer: self.viewer.clone(),
            font_paths: self.font_paths.clone(),
            ..PlotSettings::default()
        }
    }
}

fn default_interval_secs() -> u64 {
    3
}

fn default_wrap_width() -> usize {
    24
}

fn default_max_lines() -> usize {
    5
}

fn default_raw_lines() -> usize {
    8
}

fn default_log_command() -> String {
    "dmesg".to_string()
}

fn default_log_timeout_ms() -> u64 {
    2000
}

/// Settings for the on-board status display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Characters per display line.
    #[serde(default = "default_wrap_width")]
    pub wrap_width: usize,
    /// Wrapped log lines shown under the header.
    #[serde(default = "default_max_lines")]
    pub max_lines: usize,
    /// Raw kernel log lines considered, counted from the end.
    #[serde(default = "default_raw_lines")]
    pub raw_lines: usize,
    #[serde(default = "default_log_command")]
    pub log_command: String,
    /// Extra arguments, e.g. `--level=err,warn`.
    #[serde(default)]
    pub log_args: Vec<String>,
    #[serde(default = "default_log_timeout_ms")]
    pub log_timeout_ms: u64,
    /// Emit ANSI clear/home before every frame.
    #[serde(default = "default_true")]
    pub ansi: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            wrap_width: default_wrap_width(),
            max_lines: default_max_lines(),
            raw_lines: default_raw_lines(),
            log_command: default_log_command(),
            log_args: Vec::new(),
            log_timeout_ms: default_log_timeout_ms(),
            ansi: true,
        }
    }
}

impl MonitorConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        load(path.as_ref())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn log_timeout(&self) -> Duration {
        Duration::from_millis(self.log_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_receiver_defaults_from_empty_yaml() {
        let cfg: ReceiverConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(cfg.baud_rate, 115200);
        assert_eq!(cfg.output_dir, PathBuf::from("measurements"));
        assert_eq!(cfg.send_timeout(), Duration::from_secs(5));
        assert!(cfg.plots);
        assert!(!cfg.font_paths.is_empty());
    }

    #[test]
    fn test_receiver_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "port: /dev/ttyUSB1\nbaud_rate: 9600\nplots: false\nviewer: feh").unwrap();

        let cfg = ReceiverConfig::from_file(file.path()).unwrap();
        assert_eq!(cfg.port.as_deref(), Some("/dev/ttyUSB1"));
        assert_eq!(cfg.baud_rate, 9600);
        assert!(!cfg.plots);
        assert_eq!(cfg.plot_settings().viewer.as_deref(), Some("feh"));
        assert_eq!(cfg.poll_interval(), Duration::from_millis(50));
    }

    #[test]
    fn test_bad_yaml_reports_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "baud_rate: [fast]").unwrap();
        let err = ReceiverConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));

        let missing = MonitorConfig::from_file("/nonexistent/monitor.yaml").unwrap_err();
        assert!(matches!(missing, ConfigError::Read { .. }));
    }

    #[test]
    fn test_monitor_defaults() {
        let cfg = MonitorConfig::default();
        assert_eq!(cfg.interval(), Duration::from_secs(3));
        assert_eq!(cfg.wrap_width, 24);
        assert_eq!(cfg.max_lines, 5);
        assert_eq!(cfg.log_command, "dmesg");
    }
}
