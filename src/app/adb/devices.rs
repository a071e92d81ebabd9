use tracing::{debug, info, warn};

use crate::app::adb::command::ToolCommand;
use crate::app::adb::parse::{parse_device_lines, parse_physical_size, parse_property_value};
use crate::app::adb::runner::{CommandExecutor, ExecutionResult};
use crate::app::error::AppError;
use crate::app::models::{Device, DeviceLine, UNKNOWN};

pub const PROP_MODEL: &str = "ro.product.model";
pub const PROP_MANUFACTURER: &str = "ro.product.manufacturer";
pub const PROP_ANDROID_VERSION: &str = "ro.build.version.release";
pub const PROP_SDK_VERSION: &str = "ro.build.version.sdk";

/// Lists attached devices and fills in details for the connected ones.
///
/// Only the `adb devices -l` call itself can fail the operation. Per-device lookups
/// degrade the affected field to `"Unknown"` and never abort the record.
pub fn list_devices(executor: &dyn CommandExecutor, trace_id: &str) -> Result<Vec<Device>, AppError> {
    let output = executor
        .execute(&ToolCommand::ListDevices, trace_id)
        .into_output(trace_id)?;
    let lines = parse_device_lines(&output);
    info!(trace_id = %trace_id, count = lines.len(), "list_devices");

    Ok(lines
        .iter()
        .map(|line| describe_device(executor, line, trace_id))
        .collect())
}

pub fn describe_device(executor: &dyn CommandExecutor, line: &DeviceLine, trace_id: &str) -> Device {
    if !line.status.is_connected() {
        debug!(
            trace_id = %trace_id,
            serial = %line.serial,
            status = ?line.status,
            "skipping detail queries for unreachable device"
        );
        return Device::unreachable(&line.serial, line.status);
    }

    let model_name = match &line.model_hint {
        Some(model) => model.clone(),
        None => query_property(executor, &line.serial, PROP_MODEL, trace_id),
    };

    Device {
        serial_number: line.serial.clone(),
        model_name,
        manufacturer: query_property(executor, &line.serial, PROP_MANUFACTURER, trace_id),
        android_version: query_property(executor, &line.serial, PROP_ANDROID_VERSION, trace_id),
        sdk_version: query_property(executor, &line.serial, PROP_SDK_VERSION, trace_id),
        resolution: query_resolution(executor, &line.serial, trace_id),
        status: line.status,
    }
}

fn query_property(executor: &dyn CommandExecutor, serial: &str, key: &str, trace_id: &str) -> String {
    let command = ToolCommand::GetProperty {
        serial: serial.to_string(),
        key: key.to_string(),
    };
    match executor.execute(&command, trace_id) {
        ExecutionResult::Success { output } => {
            parse_property_value(&output).unwrap_or_else(|| UNKNOWN.to_string())
        }
        ExecutionResult::Failure { message, .. } => {
            warn!(trace_id = %trace_id, serial = %serial, key = %key, error = %message, "getprop failed");
            UNKNOWN.to_string()
        }
    }
}

fn query_resolution(executor: &dyn CommandExecutor, serial: &str, trace_id: &str) -> String {
    let command = ToolCommand::ExecuteShell {
        serial: serial.to_string(),
        command: "wm size".to_string(),
    };
    match executor.execute(&command, trace_id) {
        ExecutionResult::Success { output } => {
            parse_physical_size(&output).unwrap_or_else(|| UNKNOWN.to_string())
        }
        ExecutionResult::Failure { message, .. } => {
            warn!(trace_id = %trace_id, serial = %serial, error = %message, "wm size failed");
            UNKNOWN.to_string()
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use crate::app::adb::command::ToolCommand;
    use crate::app::adb::runner::{CommandExecutor, ExecutionResult};

    /// Replays canned results keyed by argument vector and records every call.
    #[derive(Default)]
    pub struct ScriptedExecutor {
        responses: HashMap<Vec<String>, ExecutionResult>,
        pub calls: Mutex<Vec<ToolCommand>>,
    }

    impl ScriptedExecutor {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn respond(mut self, command: ToolCommand, result: ExecutionResult) -> Self {
            self.responses.insert(command.args(), result);
            self
        }

        pub fn ok(self, command: ToolCommand, output: &str) -> Self {
            self.respond(
                command,
                ExecutionResult::Success {
                    output: output.to_string(),
                },
            )
        }

        pub fn recorded(&self) -> Vec<ToolCommand> {
            self.calls.lock().expect("calls").clone()
        }
    }

    impl CommandExecutor for ScriptedExecutor {
        fn execute(&self, command: &ToolCommand, _trace_id: &str) -> ExecutionResult {
            self.calls.lock().expect("calls").push(command.clone());
            self.responses
                .get(&command.args())
                .cloned()
                .unwrap_or_else(|| ExecutionResult::failure("adb command failed with exit code: 1", Some(1)))
        }
    }

    pub fn prop(serial: &str, key: &str) -> ToolCommand {
        ToolCommand::GetProperty {
            serial: serial.to_string(),
            key: key.to_string(),
        }
    }

    pub fn wm_size(serial: &str) -> ToolCommand {
        ToolCommand::ExecuteShell {
            serial: serial.to_string(),
            command: "wm size".to_string(),
        }
    }
}
