//! Station configuration read from `.qcrun/station.toml`.
//!
//! Values are layered: file, then environment (`QCRUN_REMOTE_HOST`,
//! `QCRUN_REMOTE_USER`), then command-line flags. A missing file yields the
//! defaults of the BHV bench.
//!
//! ```toml
//! catalog_file = "catalog.json"
//!
//! [remote]
//! host = "192.168.0.30"
//! user = "distiller"
//! command_timeout_secs = 30
//!
//! [retry]
//! remote_max_attempts = 5
//!
//! [firmware]
//! uf2_dir = "ULP"
//! files_dir = "BHV"
//!
//! [output]
//! results_csv = "hardware_test_results.csv"
//! results_xlsx = "hardware_test_results.xlsx"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::retry::{DEFAULT_REMOTE_MAX_ATTEMPTS, RetryPolicy};

pub const STATION_DIR: &str = ".qcrun";
pub const CONFIG_FILE: &str = "station.toml";

/// Connection to the compute module under test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// ssh binary
    #[serde(default = "default_ssh_cmd")]
    pub ssh_cmd: String,
    /// Extra `-o` options passed to ssh, e.g. `StrictHostKeyChecking=no`
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
    #[serde(default = "default_shutdown_command")]
    pub shutdown_command: String,
    #[serde(default = "default_shutdown_attempts")]
    pub shutdown_attempts: u32,
}

fn default_host() -> String {
    "192.168.0.30".to_string()
}

fn default_user() -> String {
    "distiller".to_string()
}

fn default_port() -> u16 {
    22
}

fn default_ssh_cmd() -> String {
    "ssh".to_string()
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_command_timeout() -> u64 {
    30
}

fn default_shutdown_command() -> String {
    "sudo shutdown now".to_string()
}

fn default_shutdown_attempts() -> u32 {
    3
}

impl Default for RemoteSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            user: default_user(),
            port: default_port(),
            ssh_cmd: default_ssh_cmd(),
            options: Vec::new(),
            connect_timeout_secs: default_connect_timeout(),
            command_timeout_secs: default_command_timeout(),
            shutdown_command: default_shutdown_command(),
            shutdown_attempts: default_shutdown_attempts(),
        }
    }
}

impl RemoteSection {
    /// `user@host`
    pub fn target(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrySection {
    #[serde(default = "default_remote_max_attempts")]
    pub remote_max_attempts: u32,
}

fn default_remote_max_attempts() -> u32 {
    DEFAULT_REMOTE_MAX_ATTEMPTS
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            remote_max_attempts: default_remote_max_attempts(),
        }
    }
}

/// UF2 flashing and file upload over the UART.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FirmwareSection {
    /// Directory holding the `.uf2` images
    #[serde(default = "default_uf2_dir")]
    pub uf2_dir: PathBuf,
    /// Directory holding the application files
    #[serde(default = "default_files_dir")]
    pub files_dir: PathBuf,
    /// Mount points of the RP2 bootloader volume, checked in order
    #[serde(default = "default_volume_paths")]
    pub volume_paths: Vec<PathBuf>,
    /// File that marks a mounted bootloader volume
    #[serde(default = "default_info_marker")]
    pub info_marker: String,
    #[serde(default = "default_nuke_image")]
    pub nuke_image: String,
    #[serde(default = "default_micropython_image")]
    pub micropython_image: String,
    #[serde(default = "default_uart_glob")]
    pub uart_glob: String,
    #[serde(default = "default_ampy_cmd")]
    pub ampy_cmd: String,
    /// Files to upload, relative to `files_dir`
    #[serde(default = "default_files")]
    pub files: Vec<String>,
    #[serde(default = "default_mount_timeout")]
    pub mount_timeout_secs: u64,
    #[serde(default = "default_unmount_timeout")]
    pub unmount_timeout_secs: u64,
    #[serde(default = "default_file_timeout")]
    pub file_timeout_secs: u64,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Pause after the nuke image before waiting for the volume again
    #[serde(default = "default_reappear_delay")]
    pub reappear_delay_secs: u64,
    /// Pause after flashing MicroPython before looking for the UART
    #[serde(default = "default_settle_delay")]
    pub settle_delay_secs: u64,
}

fn default_uf2_dir() -> PathBuf {
    PathBuf::from("ULP")
}

fn default_files_dir() -> PathBuf {
    PathBuf::from("BHV")
}

fn default_volume_paths() -> Vec<PathBuf> {
    vec![
        PathBuf::from("/Volumes/RPI-RP2 1"),
        PathBuf::from("/Volumes/RPI-RP2"),
    ]
}

fn default_info_marker() -> String {
    "INFO_UF2.TXT".to_string()
}

fn default_nuke_image() -> String {
    "flash_nuke.uf2".to_string()
}

fn default_micropython_image() -> String {
    "RPI_PICO-20240222-v1.22.2.uf2".to_string()
}

fn default_uart_glob() -> String {
    "/dev/tty.usb*".to_string()
}

fn default_ampy_cmd() -> String {
    "ampy".to_string()
}

fn default_files() -> Vec<String> {
    [
        "bin/loading1.bin",
        "bin/loading2.bin",
        "eink_driver_sam.py",
        "pamir_uart_protocols.py",
        "neopixel_controller.py",
        "power_manager.py",
        "battery.py",
        "debug_handler.py",
        "uart_handler.py",
        "threaded_task_manager.py",
        "main.py",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_mount_timeout() -> u64 {
    60
}

fn default_unmount_timeout() -> u64 {
    30
}

fn default_file_timeout() -> u64 {
    30
}

fn default_poll_interval() -> u64 {
    1000
}

fn default_reappear_delay() -> u64 {
    5
}

fn default_settle_delay() -> u64 {
    3
}

impl Default for FirmwareSection {
    fn default() -> Self {
        Self {
            uf2_dir: default_uf2_dir(),
            files_dir: default_files_dir(),
            volume_paths: default_volume_paths(),
            info_marker: default_info_marker(),
            nuke_image: default_nuke_image(),
            micropython_image: default_micropython_image(),
            uart_glob: default_uart_glob(),
            ampy_cmd: default_ampy_cmd(),
            files: default_files(),
            mount_timeout_secs: default_mount_timeout(),
            unmount_timeout_secs: default_unmount_timeout(),
            file_timeout_secs: default_file_timeout(),
            poll_interval_ms: default_poll_interval(),
            reappear_delay_secs: default_reappear_delay(),
            settle_delay_secs: default_settle_delay(),
        }
    }
}

/// Where durable records go. Relative paths resolve against the station directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputSection {
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    #[serde(default = "default_sessions_dir")]
    pub sessions_dir: PathBuf,
    #[serde(default = "default_results_csv")]
    pub results_csv: PathBuf,
    /// Formatted copy of the results sheet, rebuilt after every session.
    #[serde(default = "default_results_xlsx")]
    pub results_xlsx: PathBuf,
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_sessions_dir() -> PathBuf {
    PathBuf::from("sessions")
}

fn default_results_csv() -> PathBuf {
    PathBuf::from("hardware_test_results.csv")
}

fn default_results_xlsx() -> PathBuf {
    PathBuf::from("hardware_test_results.xlsx")
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
            sessions_dir: default_sessions_dir(),
            results_csv: default_results_csv(),
            results_xlsx: default_results_xlsx(),
        }
    }
}

/// Parsed `station.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StationToml {
    /// JSON catalog replacing the built-in one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog_file: Option<PathBuf>,
    #[serde(default)]
    pub remote: RemoteSection,
    #[serde(default)]
    pub retry: RetrySection,
    #[serde(default)]
    pub firmware: FirmwareSection,
    #[serde(default)]
    pub output: OutputSection,
}

impl StationToml {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse station.toml")
    }

    /// Load `path`, or defaults when it does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize station.toml")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Apply `QCRUN_REMOTE_HOST` / `QCRUN_REMOTE_USER` when set.
    pub fn apply_env(&mut self) {
        if let Ok(host) = std::env::var("QCRUN_REMOTE_HOST")
            && !host.trim().is_empty()
        {
            self.remote.host = host.trim().to_string();
        }
        if let Ok(user) = std::env::var("QCRUN_REMOTE_USER")
            && !user.trim().is_empty()
        {
            self.remote.user = user.trim().to_string();
        }
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.remote.host.trim().is_empty() {
            warnings.push("remote.host is empty".to_string());
        }
        if self.remote.user.trim().is_empty() {
            warnings.push("remote.user is empty".to_string());
        }
        if self.remote.command_timeout_secs == 0 {
            warnings.push("remote.command_timeout_secs must be greater than 0".to_string());
        }
        if self.retry.remote_max_attempts == 0 {
            warnings.push(
                "retry.remote_max_attempts is 0; remote checks will still run once".to_string(),
            );
        }
        if self.firmware.volume_paths.is_empty() {
            warnings.push("firmware.volume_paths is empty; T01 can never find the bootloader".to_string());
        }
        if self.firmware.files.is_empty() {
            warnings.push("firmware.files is empty; nothing will be uploaded".to_string());
        }
        if let Err(e) = glob::Pattern::new(&self.firmware.uart_glob) {
            warnings.push(format!(
                "Invalid firmware.uart_glob '{}': {}",
                self.firmware.uart_glob, e
            ));
        }

        warnings
    }
}

/// Resolved runtime configuration for one station.
#[derive(Debug, Clone)]
pub struct StationConfig {
    pub station_dir: PathBuf,
    pub config_file: PathBuf,
    pub toml: StationToml,
    pub verbose: bool,
    /// Answer confirmations with their default instead of prompting
    pub yes: bool,
}

impl StationConfig {
    /// Load configuration for `station_dir`, reading `config_file` when given
    /// and `<station_dir>/.qcrun/station.toml` otherwise.
    pub fn load(station_dir: &Path, config_file: Option<&Path>) -> Result<Self> {
        let station_dir = if station_dir.exists() {
            station_dir
                .canonicalize()
                .context("Failed to resolve station directory")?
        } else {
            station_dir.to_path_buf()
        };
        let config_file = config_file
            .map(Path::to_path_buf)
            .unwrap_or_else(|| Self::default_config_path(&station_dir));

        let mut toml = StationToml::load_or_default(&config_file)?;
        toml.apply_env();

        Ok(Self {
            station_dir,
            config_file,
            toml,
            verbose: false,
            yes: false,
        })
    }

    pub fn default_config_path(station_dir: &Path) -> PathBuf {
        station_dir.join(STATION_DIR).join(CONFIG_FILE)
    }

    pub fn with_cli_args(mut self, verbose: bool, yes: bool, host: Option<String>) -> Self {
        self.verbose = verbose;
        self.yes = yes;
        if let Some(host) = host {
            self.toml.remote.host = host;
        }
        self
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.station_dir.join(path)
        }
    }

    pub fn log_dir(&self) -> PathBuf {
        self.resolve(&self.toml.output.log_dir)
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.resolve(&self.toml.output.sessions_dir)
    }

    pub fn results_csv(&self) -> PathBuf {
        self.resolve(&self.toml.output.results_csv)
    }

    pub fn results_xlsx(&self) -> PathBuf {
        self.resolve(&self.toml.output.results_xlsx)
    }

    pub fn catalog_file(&self) -> Option<PathBuf> {
        self.toml.catalog_file.as_deref().map(|p| self.resolve(p))
    }

    pub fn uf2_dir(&self) -> PathBuf {
        self.resolve(&self.toml.firmware.uf2_dir)
    }

    pub fn files_dir(&self) -> PathBuf {
        self.resolve(&self.toml.firmware.files_dir)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.toml.retry.remote_max_attempts)
    }

    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(self.log_dir()).context("Failed to create log directory")?;
        std::fs::create_dir_all(self.sessions_dir())
            .context("Failed to create sessions directory")?;
        Ok(())
    }

    pub fn validate(&self) -> Vec<String> {
        let mut warnings = self.toml.validate();
        if let Some(catalog) = self.catalog_file()
            && !catalog.exists()
        {
            warnings.push(format!(
                "catalog_file {} does not exist; the built-in catalog will be used",
                catalog.display()
            ));
        }
        warnings
    }
}
