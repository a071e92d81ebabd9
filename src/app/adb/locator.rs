use std::path::{Path, PathBuf};

use crate::app::adb::command::Tool;
use crate::app::config::ToolSettings;

pub fn normalize_command_path(value: &str) -> String {
    let trimmed = value.trim();
    if let Some(inner) = trimmed
        .strip_prefix('"')
        .and_then(|candidate| candidate.strip_suffix('"'))
    {
        return inner.trim().to_string();
    }
    if let Some(inner) = trimmed
        .strip_prefix('\'')
        .and_then(|candidate| candidate.strip_suffix('\''))
    {
        return inner.trim().to_string();
    }
    trimmed.to_string()
}

/// Configured override for `tool`, if the user set one.
pub fn configured_tool_path(settings: &ToolSettings, tool: Tool) -> Option<PathBuf> {
    let raw = match tool {
        Tool::Adb => &settings.adb_path,
        Tool::Aapt => &settings.aapt_path,
        Tool::Scrcpy => &settings.scrcpy_path,
    };
    let normalized = normalize_command_path(raw);
    if normalized.is_empty() {
        None
    } else {
        Some(PathBuf::from(normalized))
    }
}

pub fn validate_tool_path(tool: Tool, path: &Path) -> Result<(), String> {
    if path.as_os_str().is_empty() {
        return Err(format!("{tool} command is empty"));
    }
    if path.is_dir() {
        return Err(format!("{tool} path must point to an executable file"));
    }
    if !path.exists() {
        return Err(format!("{tool} executable not found at the configured path"));
    }
    Ok(())
}
