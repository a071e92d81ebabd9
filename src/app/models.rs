use serde::{Deserialize, Serialize};

/// Placeholder for descriptive device fields that could not be read.
pub const UNKNOWN: &str = "Unknown";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum DeviceStatus {
    Connected,
    Offline,
    Unauthorized,
    Bootloader,
    Recovery,
    Unknown,
}

impl DeviceStatus {
    pub fn from_token(token: &str) -> Self {
        match token {
            "device" => DeviceStatus::Connected,
            "offline" => DeviceStatus::Offline,
            "unauthorized" => DeviceStatus::Unauthorized,
            "bootloader" => DeviceStatus::Bootloader,
            "recovery" => DeviceStatus::Recovery,
            _ => DeviceStatus::Unknown,
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, DeviceStatus::Connected)
    }
}

/// One row of `adb devices -l` before any per-device queries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceLine {
    pub serial: String,
    pub status: DeviceStatus,
    pub model_hint: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Device {
    pub serial_number: String,
    pub model_name: String,
    pub manufacturer: String,
    pub android_version: String,
    pub sdk_version: String,
    pub resolution: String,
    pub status: DeviceStatus,
}

impl Device {
    pub fn unreachable(serial: &str, status: DeviceStatus) -> Self {
        Self {
            serial_number: serial.to_string(),
            model_name: UNKNOWN.to_string(),
            manufacturer: UNKNOWN.to_string(),
            android_version: UNKNOWN.to_string(),
            sdk_version: UNKNOWN.to_string(),
            resolution: UNKNOWN.to_string(),
            status,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApkInfo {
    pub app_name: Option<String>,
    pub package_name: Option<String>,
    pub version_code: Option<String>,
    pub version_name: Option<String>,
    pub min_sdk_version: Option<String>,
    pub target_sdk_version: Option<String>,
    pub compile_sdk_version: Option<String>,
    pub icon_path: Option<String>,
    /// Never present in badging output; filled by callers that have signer data.
    pub signing_key: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApkPermissions {
    pub package_name: Option<String>,
    pub permissions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstallOutcome {
    pub serial: String,
    pub success: bool,
    pub failure_code: Option<String>,
    pub raw_output: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandResponse<T> {
    pub trace_id: String,
    pub data: T,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_status_vocabulary() {
        assert_eq!(DeviceStatus::from_token("device"), DeviceStatus::Connected);
        assert_eq!(DeviceStatus::from_token("offline"), DeviceStatus::Offline);
        assert_eq!(
            DeviceStatus::from_token("unauthorized"),
            DeviceStatus::Unauthorized
        );
        assert_eq!(DeviceStatus::from_token("bootloader"), DeviceStatus::Bootloader);
        assert_eq!(DeviceStatus::from_token("recovery"), DeviceStatus::Recovery);
        assert_eq!(DeviceStatus::from_token("sideload"), DeviceStatus::Unknown);
        assert_eq!(DeviceStatus::from_token("DEVICE"), DeviceStatus::Unknown);
    }

    #[test]
    fn unreachable_device_fills_unknown() {
        let device = Device::unreachable("ABC", DeviceStatus::Offline);
        assert_eq!(device.serial_number, "ABC");
        for field in [
            &device.model_name,
            &device.manufacturer,
            &device.android_version,
            &device.sdk_version,
            &device.resolution,
        ] {
            assert_eq!(field, UNKNOWN);
        }
    }
}
