use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use uuid::Uuid;

use crate::app::adb::apk::validate_apk;
use crate::app::adb::badging::{parse_badging, parse_permissions};
use crate::app::adb::command::ToolCommand;
use crate::app::adb::devices;
use crate::app::adb::observer::{DevicePoller, DeviceWatch};
use crate::app::adb::parse::parse_install_failure;
use crate::app::adb::runner::CommandExecutor;
use crate::app::adb::scrcpy::MirrorFlags;
use crate::app::config::ScrcpySettings;
use crate::app::error::AppError;
use crate::app::models::{ApkInfo, ApkPermissions, CommandResponse, Device, InstallOutcome};

pub fn resolve_trace_id(input: Option<String>) -> String {
    input
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

fn ensure_non_empty(value: &str, field: &str, trace_id: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::validation(format!("{field} is required"), trace_id));
    }
    Ok(())
}

fn run_primary(
    executor: &dyn CommandExecutor,
    command: ToolCommand,
    trace_id: &str,
) -> Result<String, AppError> {
    executor
        .execute(&command, trace_id)
        .into_output(trace_id)
        .inspect_err(|err| {
            warn!(trace_id = %trace_id, error = %err.error, "tool command failed");
        })
}

pub fn list_devices(
    executor: &dyn CommandExecutor,
    trace_id: Option<String>,
) -> Result<CommandResponse<Vec<Device>>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    let data = devices::list_devices(executor, &trace_id)?;
    Ok(CommandResponse { trace_id, data })
}

pub fn watch_devices(
    executor: Arc<dyn CommandExecutor>,
    interval: Duration,
    trace_id: Option<String>,
) -> DeviceWatch {
    let trace_id = resolve_trace_id(trace_id);
    info!(trace_id = %trace_id, "watch_devices");
    DevicePoller::start(executor, interval, trace_id)
}

pub fn install_apk(
    executor: &dyn CommandExecutor,
    serial: String,
    apk_path: String,
    reinstall: bool,
    trace_id: Option<String>,
) -> Result<CommandResponse<InstallOutcome>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    info!(trace_id = %trace_id, serial = %serial, "install_apk");
    ensure_non_empty(&serial, "serial", &trace_id)?;
    let apk = validate_apk(&apk_path, &trace_id)?;

    let command = ToolCommand::InstallApk {
        serial: serial.clone(),
        apk_path: apk.to_string_lossy().to_string(),
        reinstall,
    };
    let raw_output = run_primary(executor, command, &trace_id)?;
    // adb can exit 0 and still report a package-manager failure.
    let failure_code = parse_install_failure(&raw_output);
    if let Some(code) = &failure_code {
        warn!(trace_id = %trace_id, serial = %serial, code = %code, "apk install rejected");
    }

    Ok(CommandResponse {
        trace_id,
        data: InstallOutcome {
            serial,
            success: failure_code.is_none(),
            failure_code,
            raw_output,
        },
    })
}

pub fn uninstall_app(
    executor: &dyn CommandExecutor,
    serial: String,
    package: String,
    trace_id: Option<String>,
) -> Result<CommandResponse<String>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    info!(trace_id = %trace_id, serial = %serial, package = %package, "uninstall_app");
    ensure_non_empty(&serial, "serial", &trace_id)?;
    ensure_non_empty(&package, "package", &trace_id)?;

    let data = run_primary(
        executor,
        ToolCommand::UninstallApp { serial, package },
        &trace_id,
    )?;
    Ok(CommandResponse { trace_id, data })
}

pub fn send_deep_link(
    executor: &dyn CommandExecutor,
    serial: String,
    url: String,
    trace_id: Option<String>,
) -> Result<CommandResponse<String>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    info!(trace_id = %trace_id, serial = %serial, "send_deep_link");
    ensure_non_empty(&serial, "serial", &trace_id)?;
    ensure_non_empty(&url, "url", &trace_id)?;
    if !url.contains(':') {
        return Err(AppError::validation(
            "url must include a scheme, e.g. myapp://path",
            &trace_id,
        ));
    }

    let data = run_primary(
        executor,
        ToolCommand::SendDeepLink {
            serial,
            url: url.trim().to_string(),
        },
        &trace_id,
    )?;
    Ok(CommandResponse { trace_id, data })
}

pub fn run_shell(
    executor: &dyn CommandExecutor,
    serial: String,
    command: String,
    trace_id: Option<String>,
) -> Result<CommandResponse<String>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    info!(trace_id = %trace_id, serial = %serial, "run_shell");
    ensure_non_empty(&serial, "serial", &trace_id)?;
    ensure_non_empty(&command, "command", &trace_id)?;

    let data = run_primary(
        executor,
        ToolCommand::ExecuteShell { serial, command },
        &trace_id,
    )?;
    Ok(CommandResponse { trace_id, data })
}

pub fn inspect_apk(
    executor: &dyn CommandExecutor,
    apk_path: String,
    trace_id: Option<String>,
) -> Result<CommandResponse<ApkInfo>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    info!(trace_id = %trace_id, "inspect_apk");
    let apk = validate_apk(&apk_path, &trace_id)?;

    let output = run_primary(
        executor,
        ToolCommand::DumpBadging {
            apk_path: apk.to_string_lossy().to_string(),
        },
        &trace_id,
    )?;
    Ok(CommandResponse {
        trace_id,
        data: parse_badging(&output),
    })
}

pub fn list_apk_permissions(
    executor: &dyn CommandExecutor,
    apk_path: String,
    trace_id: Option<String>,
) -> Result<CommandResponse<ApkPermissions>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    info!(trace_id = %trace_id, "list_apk_permissions");
    let apk = validate_apk(&apk_path, &trace_id)?;

    let output = run_primary(
        executor,
        ToolCommand::DumpPermissions {
            apk_path: apk.to_string_lossy().to_string(),
        },
        &trace_id,
    )?;
    Ok(CommandResponse {
        trace_id,
        data: parse_permissions(&output),
    })
}

pub fn dump_xml_tree(
    executor: &dyn CommandExecutor,
    apk_path: String,
    asset_path: String,
    trace_id: Option<String>,
) -> Result<CommandResponse<String>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    info!(trace_id = %trace_id, asset = %asset_path, "dump_xml_tree");
    ensure_non_empty(&asset_path, "asset_path", &trace_id)?;
    let apk = validate_apk(&apk_path, &trace_id)?;

    let data = run_primary(
        executor,
        ToolCommand::DumpXmlTree {
            apk_path: apk.to_string_lossy().to_string(),
            asset_path,
        },
        &trace_id,
    )?;
    Ok(CommandResponse { trace_id, data })
}

/// Opens a scrcpy window and blocks until it is closed.
pub fn start_mirroring(
    executor: &dyn CommandExecutor,
    serial: String,
    title: Option<String>,
    settings: &ScrcpySettings,
    trace_id: Option<String>,
) -> Result<CommandResponse<String>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    info!(trace_id = %trace_id, serial = %serial, "start_mirroring");
    ensure_non_empty(&serial, "serial", &trace_id)?;

    let title = title
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| serial.clone());
    let command = ToolCommand::StartMirroring {
        serial,
        title,
        max_size: settings.max_size,
        bit_rate: settings.bitrate.clone(),
        flags: MirrorFlags::from_settings(settings),
    };
    let data = run_primary(executor, command, &trace_id)?;
    Ok(CommandResponse { trace_id, data })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::adb::devices::testing::ScriptedExecutor;
    use crate::app::adb::runner::ExecutionResult;
    use std::fs::File;
    use std::io::Write;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;
    use zip::write::FileOptions;

    fn fixture_apk(dir: &Path) -> PathBuf {
        let path = dir.join("app.apk");
        let file = File::create(&path).expect("apk");
        let mut zip = zip::ZipWriter::new(file);
        zip.start_file("AndroidManifest.xml", FileOptions::<()>::default())
            .expect("manifest");
        zip.write_all(b"<manifest/>").expect("write");
        zip.finish().expect("finish");
        path
    }

    fn install_command(serial: &str, apk: &Path) -> ToolCommand {
        ToolCommand::InstallApk {
            serial: serial.to_string(),
            apk_path: apk.to_string_lossy().to_string(),
            reinstall: true,
        }
    }

    #[test]
    fn resolves_trace_id() {
        assert_eq!(resolve_trace_id(Some("abc".to_string())), "abc");
        assert!(!resolve_trace_id(Some("  ".to_string())).trim().is_empty());
        assert!(!resolve_trace_id(None).is_empty());
    }

    #[test]
    fn install_reports_success() {
        let tmp = TempDir::new().expect("tmp");
        let apk = fixture_apk(tmp.path());
        let executor = ScriptedExecutor::new().ok(
            install_command("ABC123", &apk),
            "Performing Streamed Install\nSuccess\n",
        );

        let response = install_apk(
            &executor,
            "ABC123".to_string(),
            apk.to_string_lossy().to_string(),
            true,
            Some("t".to_string()),
        )
        .expect("install");
        assert_eq!(response.trace_id, "t");
        assert!(response.data.success);
        assert_eq!(response.data.failure_code, None);
    }

    #[test]
    fn install_detects_package_manager_failure() {
        let tmp = TempDir::new().expect("tmp");
        let apk = fixture_apk(tmp.path());
        let executor = ScriptedExecutor::new().ok(
            install_command("ABC123", &apk),
            "Failure [INSTALL_FAILED_VERSION_DOWNGRADE]\n",
        );

        let response = install_apk(
            &executor,
            "ABC123".to_string(),
            apk.to_string_lossy().to_string(),
            true,
            None,
        )
        .expect("install");
        assert!(!response.data.success);
        assert_eq!(
            response.data.failure_code.as_deref(),
            Some("INSTALL_FAILED_VERSION_DOWNGRADE")
        );
    }

    #[test]
    fn install_exit_code_failure_is_an_error() {
        let tmp = TempDir::new().expect("tmp");
        let apk = fixture_apk(tmp.path());
        let executor = ScriptedExecutor::new();

        let err = install_apk(
            &executor,
            "ABC123".to_string(),
            apk.to_string_lossy().to_string(),
            true,
            Some("t".to_string()),
        )
        .unwrap_err();
        assert_eq!(err.code, "ERR_EXECUTION");
        assert!(err.error.contains("exit code: 1"));
    }

    #[test]
    fn install_validates_before_running() {
        let executor = ScriptedExecutor::new();
        let err = install_apk(
            &executor,
            "ABC123".to_string(),
            "/this/path/should/not/exist.apk".to_string(),
            true,
            None,
        )
        .unwrap_err();
        assert_eq!(err.code, "ERR_VALIDATION");
        assert!(executor.recorded().is_empty());

        let err = install_apk(&executor, " ".to_string(), "x.apk".to_string(), true, None)
            .unwrap_err();
        assert_eq!(err.error, "serial is required");
    }

    #[test]
    fn inspect_apk_parses_badging() {
        let tmp = TempDir::new().expect("tmp");
        let apk = fixture_apk(tmp.path());
        let executor = ScriptedExecutor::new().ok(
            ToolCommand::DumpBadging {
                apk_path: apk.to_string_lossy().to_string(),
            },
            "package: name='com.example' versionCode='5' versionName='0.5'\nsdkVersion:'26'\n",
        );

        let response =
            inspect_apk(&executor, apk.to_string_lossy().to_string(), None).expect("inspect");
        assert_eq!(response.data.package_name.as_deref(), Some("com.example"));
        assert_eq!(response.data.min_sdk_version.as_deref(), Some("26"));
    }

    #[test]
    fn deep_link_requires_scheme() {
        let executor = ScriptedExecutor::new();
        let err = send_deep_link(&executor, "A".to_string(), "no-scheme".to_string(), None)
            .unwrap_err();
        assert_eq!(err.code, "ERR_VALIDATION");

        let executor = ScriptedExecutor::new().ok(
            ToolCommand::SendDeepLink {
                serial: "A".to_string(),
                url: "myapp://home".to_string(),
            },
            "Starting: Intent { act=android.intent.action.VIEW dat=myapp://home }\n",
        );
        let response =
            send_deep_link(&executor, "A".to_string(), " myapp://home ".to_string(), None)
                .expect("deep link");
        assert!(response.data.contains("Starting: Intent"));
    }

    #[test]
    fn mirroring_defaults_title_to_serial() {
        let settings = ScrcpySettings {
            max_size: 0,
            bitrate: String::new(),
            stay_awake: false,
            disable_screensaver: false,
            ..ScrcpySettings::default()
        };
        let executor = ScriptedExecutor::new().respond(
            ToolCommand::StartMirroring {
                serial: "R3CR".to_string(),
                title: "R3CR".to_string(),
                max_size: 0,
                bit_rate: String::new(),
                flags: MirrorFlags::from_settings(&settings),
            },
            ExecutionResult::Success {
                output: "INFO: Renderer: opengl\n".to_string(),
            },
        );

        let response = start_mirroring(&executor, "R3CR".to_string(), None, &settings, None)
            .expect("mirror");
        assert!(response.data.contains("Renderer"));
        let recorded = executor.recorded();
        assert_eq!(recorded[0].args(), vec!["-s", "R3CR", "--window-title", "R3CR"]);
    }

    #[test]
    fn uninstall_and_shell_require_arguments() {
        let executor = ScriptedExecutor::new();
        let err = uninstall_app(&executor, "A".to_string(), "".to_string(), None).unwrap_err();
        assert_eq!(err.error, "package is required");
        let err = run_shell(&executor, "A".to_string(), "  ".to_string(), None).unwrap_err();
        assert_eq!(err.error, "command is required");
        assert!(executor.recorded().is_empty());
    }
}
