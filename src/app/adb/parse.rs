use std::sync::OnceLock;

use regex::Regex;

use crate::app::models::{DeviceLine, DeviceStatus};

const DEVICE_LIST_HEADER: &str = "List of devices attached";

/// Parses `adb devices -l`. Everything up to and including the header is dropped, as
/// are daemon notices (`* daemon started successfully`). Without a header the first
/// line is treated as one.
pub fn parse_device_lines(output: &str) -> Vec<DeviceLine> {
    let body_start = output
        .lines()
        .position(|line| line.trim_start().starts_with(DEVICE_LIST_HEADER))
        .map_or(1, |index| index + 1);
    output
        .lines()
        .skip(body_start)
        .filter(|line| !line.trim().is_empty())
        .filter(|line| !line.trim_start().starts_with('*'))
        .map(|line| {
            let mut tokens = line.split_whitespace();
            let serial = tokens.next().unwrap_or_default().to_string();
            let status = DeviceStatus::from_token(tokens.next().unwrap_or_default());
            let model_hint = tokens
                .find_map(|token| token.strip_prefix("model:"))
                .filter(|value| !value.is_empty())
                .map(|value| value.replace('_', " "));
            DeviceLine {
                serial,
                status,
                model_hint,
            }
        })
        .collect()
}

/// Trimmed `getprop` value; blank output means the property is unset.
pub fn parse_property_value(output: &str) -> Option<String> {
    let value = output.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// First `Physical size: WxH` in `wm size` output.
pub fn parse_physical_size(output: &str) -> Option<String> {
    static PHYSICAL_SIZE: OnceLock<Option<Regex>> = OnceLock::new();
    let re = PHYSICAL_SIZE
        .get_or_init(|| Regex::new(r"Physical size:\s*(\d+x\d+)").ok())
        .as_ref()?;
    re.captures(output).map(|caps| caps[1].to_string())
}

/// Failure code from `adb install` output such as `Failure [INSTALL_FAILED_OLDER_SDK: ...]`.
pub fn parse_install_failure(output: &str) -> Option<String> {
    static INSTALL_FAILURE: OnceLock<Option<Regex>> = OnceLock::new();
    let re = INSTALL_FAILURE
        .get_or_init(|| Regex::new(r"Failure\s*\[([A-Z0-9_]+)").ok())
        .as_ref()?;
    re.captures(output).map(|caps| caps[1].to_string())
}
