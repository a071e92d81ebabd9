use std::fmt;

use serde::{Deserialize, Serialize};

use crate::app::adb::scrcpy::{build_mirroring_args, MirrorFlags};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    Adb,
    Aapt,
    Scrcpy,
}

impl Tool {
    pub const ALL: [Tool; 3] = [Tool::Adb, Tool::Aapt, Tool::Scrcpy];

    pub fn name(&self) -> &'static str {
        match self {
            Tool::Adb => "adb",
            Tool::Aapt => "aapt2",
            Tool::Scrcpy => "scrcpy",
        }
    }

    /// File name of the executable on the given OS.
    pub fn file_name(&self, os: &str) -> String {
        if os == "windows" {
            format!("{}.exe", self.name())
        } else {
            self.name().to_string()
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One external-tool invocation, fully described before it runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToolCommand {
    ListDevices,
    GetProperty {
        serial: String,
        key: String,
    },
    InstallApk {
        serial: String,
        apk_path: String,
        reinstall: bool,
    },
    UninstallApp {
        serial: String,
        package: String,
    },
    SendDeepLink {
        serial: String,
        url: String,
    },
    ExecuteShell {
        serial: String,
        command: String,
    },
    DumpBadging {
        apk_path: String,
    },
    DumpPermissions {
        apk_path: String,
    },
    DumpXmlTree {
        apk_path: String,
        asset_path: String,
    },
    StartMirroring {
        serial: String,
        title: String,
        max_size: u32,
        bit_rate: String,
        flags: MirrorFlags,
    },
}

impl ToolCommand {
    /// Runs until the user closes it rather than until the tool finishes its work.
    pub fn is_interactive(&self) -> bool {
        matches!(self, ToolCommand::StartMirroring { .. })
    }

    pub fn tool(&self) -> Tool {
        match self {
            ToolCommand::ListDevices
            | ToolCommand::GetProperty { .. }
            | ToolCommand::InstallApk { .. }
            | ToolCommand::UninstallApp { .. }
            | ToolCommand::SendDeepLink { .. }
            | ToolCommand::ExecuteShell { .. } => Tool::Adb,
            ToolCommand::DumpBadging { .. }
            | ToolCommand::DumpPermissions { .. }
            | ToolCommand::DumpXmlTree { .. } => Tool::Aapt,
            ToolCommand::StartMirroring { .. } => Tool::Scrcpy,
        }
    }

    pub fn args(&self) -> Vec<String> {
        match self {
            ToolCommand::ListDevices => strings(&["devices", "-l"]),
            ToolCommand::GetProperty { serial, key } => {
                let mut args = device_prefix(serial);
                args.extend(strings(&["shell", "getprop"]));
                args.push(key.clone());
                args
            }
            ToolCommand::InstallApk {
                serial,
                apk_path,
                reinstall,
            } => {
                let mut args = device_prefix(serial);
                args.push("install".to_string());
                if *reinstall {
                    args.push("-r".to_string());
                }
                args.push(apk_path.clone());
                args
            }
            ToolCommand::UninstallApp { serial, package } => {
                let mut args = device_prefix(serial);
                args.push("uninstall".to_string());
                args.push(package.clone());
                args
            }
            ToolCommand::SendDeepLink { serial, url } => {
                let mut args = device_prefix(serial);
                args.extend(strings(&[
                    "shell",
                    "am",
                    "start",
                    "-a",
                    "android.intent.action.VIEW",
                    "-d",
                ]));
                args.push(url.clone());
                args
            }
            ToolCommand::ExecuteShell { serial, command } => {
                let mut args = device_prefix(serial);
                args.push("shell".to_string());
                args.extend(command.split_whitespace().map(|token| token.to_string()));
                args
            }
            ToolCommand::DumpBadging { apk_path } => {
                let mut args = strings(&["dump", "badging"]);
                args.push(apk_path.clone());
                args
            }
            ToolCommand::DumpPermissions { apk_path } => {
                let mut args = strings(&["dump", "permissions"]);
                args.push(apk_path.clone());
                args
            }
            ToolCommand::DumpXmlTree {
                apk_path,
                asset_path,
            } => {
                let mut args = strings(&["dump", "xmltree"]);
                args.push(apk_path.clone());
                args.push("--file".to_string());
                args.push(asset_path.clone());
                args
            }
            ToolCommand::StartMirroring {
                serial,
                title,
                max_size,
                bit_rate,
                flags,
            } => build_mirroring_args(serial, title, *max_size, bit_rate, flags),
        }
    }

    /// `<tool> <args...>` for log lines.
    pub fn display(&self) -> String {
        let mut parts = vec![self.tool().name().to_string()];
        parts.extend(self.args());
        parts.join(" ")
    }
}

fn device_prefix(serial: &str) -> Vec<String> {
    vec!["-s".to_string(), serial.to_string()]
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|item| item.to_string()).collect()
}
