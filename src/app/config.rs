use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::app::error::AppError;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ToolSettings {
    /// Explicit paths override the bundled binaries when non-empty.
    pub adb_path: String,
    pub aapt_path: String,
    pub scrcpy_path: String,
    /// Root of the bundled `<os>/<arch>/<tool>` tree. Empty means next to the executable.
    pub resource_dir: String,
    /// Extraction target. Empty means `$HOME/.wepray/bin`.
    pub cache_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceSettings {
    pub poll_interval_ms: u64,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 3_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessSettings {
    pub teardown_timeout_ms: u64,
    /// 0 disables the timeout; commands may then block for as long as the tool runs.
    pub command_timeout_ms: u64,
}

impl Default for ProcessSettings {
    fn default() -> Self {
        Self {
            teardown_timeout_ms: 1_000,
            command_timeout_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstallSettings {
    pub reinstall: bool,
}

impl Default for InstallSettings {
    fn default() -> Self {
        Self { reinstall: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScrcpySettings {
    pub stay_awake: bool,
    pub turn_screen_off: bool,
    pub disable_screensaver: bool,
    pub show_touches: bool,
    pub always_on_top: bool,
    pub fullscreen: bool,
    pub enable_audio_playback: bool,
    pub bitrate: String,
    pub max_size: u32,
    pub extra_args: String,
}

impl Default for ScrcpySettings {
    fn default() -> Self {
        Self {
            stay_awake: true,
            turn_screen_off: false,
            disable_screensaver: true,
            show_touches: false,
            always_on_top: false,
            fullscreen: false,
            enable_audio_playback: true,
            bitrate: "8M".to_string(),
            max_size: 1024,
            extra_args: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingSettings {
    pub log_level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            log_level: "INFO".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub tools: ToolSettings,
    #[serde(default)]
    pub device: DeviceSettings,
    #[serde(default)]
    pub process: ProcessSettings,
    #[serde(default)]
    pub install: InstallSettings,
    #[serde(default)]
    pub scrcpy: ScrcpySettings,
    #[serde(default)]
    pub logging: LoggingSettings,
    #[serde(default)]
    pub version: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            tools: ToolSettings::default(),
            device: DeviceSettings::default(),
            process: ProcessSettings::default(),
            install: InstallSettings::default(),
            scrcpy: ScrcpySettings::default(),
            logging: LoggingSettings::default(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var("WEPRAY_CONFIG_PATH") {
        return PathBuf::from(path);
    }
    home_dir().join(".wepray_config.json")
}

pub fn backup_config_path() -> PathBuf {
    let path = config_path();
    path.with_extension("backup.json")
}

pub fn load_config(trace_id: &str) -> Result<AppConfig, AppError> {
    load_config_from_path(&config_path()).map_err(|err| err.with_trace_id(trace_id))
}

pub fn save_config(config: &AppConfig, trace_id: &str) -> Result<(), AppError> {
    save_config_to_path(config, &config_path(), &backup_config_path())
        .map_err(|err| err.with_trace_id(trace_id))
}

pub fn load_config_from_path(path: &Path) -> Result<AppConfig, AppError> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let raw = fs::read_to_string(path)
        .map_err(|err| AppError::system(format!("Failed to read config: {err}"), ""))?;
    let config: AppConfig = serde_json::from_str(&raw)
        .map_err(|err| AppError::system(format!("Failed to parse config: {err}"), ""))?;
    Ok(validate_config(config))
}

pub fn save_config_to_path(
    config: &AppConfig,
    path: &Path,
    backup_path: &Path,
) -> Result<(), AppError> {
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    if path.exists() {
        let _ = fs::copy(path, backup_path);
    }
    let payload = serde_json::to_string_pretty(config)
        .map_err(|err| AppError::system(format!("Failed to serialize config: {err}"), ""))?;
    fs::write(path, payload)
        .map_err(|err| AppError::system(format!("Failed to write config: {err}"), ""))?;
    Ok(())
}

/// Default per-user extraction directory for bundled binaries.
pub fn default_cache_dir() -> PathBuf {
    home_dir().join(".wepray").join("bin")
}

/// Default bundled resource root: `resources/` beside the running executable.
pub fn default_resource_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("resources")))
        .unwrap_or_else(|| PathBuf::from("resources"))
}

impl ToolSettings {
    pub fn cache_dir(&self) -> PathBuf {
        if self.cache_dir.trim().is_empty() {
            default_cache_dir()
        } else {
            PathBuf::from(self.cache_dir.trim())
        }
    }

    pub fn resource_dir(&self) -> PathBuf {
        if self.resource_dir.trim().is_empty() {
            default_resource_dir()
        } else {
            PathBuf::from(self.resource_dir.trim())
        }
    }
}

fn validate_config(mut config: AppConfig) -> AppConfig {
    if config.device.poll_interval_ms < 250 {
        config.device.poll_interval_ms = 3_000;
    }
    if config.process.teardown_timeout_ms == 0 || config.process.teardown_timeout_ms > 30_000 {
        config.process.teardown_timeout_ms = 1_000;
    }
    if config.logging.log_level.trim().is_empty() {
        config.logging.log_level = "INFO".to_string();
    }
    config
}
