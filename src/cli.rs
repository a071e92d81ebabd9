use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::error;

use crate::app::commands::{
    dump_xml_tree, inspect_apk, install_apk, list_apk_permissions, list_devices, resolve_trace_id,
    run_shell, send_deep_link, start_mirroring, uninstall_app, watch_devices,
};
use crate::app::config::{config_path, load_config, save_config, AppConfig};
use crate::app::error::AppError;
use crate::app::logging::init_logging;
use crate::app::state::AppState;

#[derive(Debug, Parser)]
#[command(name = "wepray", version, about = "Manage Android devices through adb, aapt2 and scrcpy")]
pub struct Cli {
    /// Trace id attached to every log line; generated when omitted.
    #[arg(long, global = true, env = "WEPRAY_TRACE_ID")]
    pub trace_id: Option<String>,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// List attached devices with their properties.
    Devices,
    /// Poll the device list until interrupted.
    Watch {
        /// Stop after this many snapshots.
        #[arg(long)]
        count: Option<usize>,
    },
    /// Install an APK on a device.
    Install {
        #[arg(short, long)]
        serial: String,
        apk: String,
        /// Do not pass `-r` even if the config enables reinstall.
        #[arg(long)]
        no_reinstall: bool,
    },
    /// Uninstall a package.
    Uninstall {
        #[arg(short, long)]
        serial: String,
        package: String,
    },
    /// Open a deep link on a device.
    Deeplink {
        #[arg(short, long)]
        serial: String,
        url: String,
    },
    /// Run a shell command on a device.
    Shell {
        #[arg(short, long)]
        serial: String,
        #[arg(trailing_var_arg = true, required = true)]
        command: Vec<String>,
    },
    /// Show package metadata from `aapt2 dump badging`.
    Badging { apk: String },
    /// Show requested permissions from `aapt2 dump permissions`.
    Permissions { apk: String },
    /// Dump a compiled XML asset from an APK.
    Xmltree {
        apk: String,
        #[arg(long, default_value = "AndroidManifest.xml")]
        file: String,
    },
    /// Mirror a device screen with scrcpy.
    Mirror {
        #[arg(short, long)]
        serial: String,
        #[arg(long)]
        title: Option<String>,
    },
    /// Print the effective configuration, or write the defaults.
    Config {
        #[arg(long)]
        reset: bool,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<(), AppError> {
    let payload = serde_json::to_string_pretty(value)
        .map_err(|err| AppError::system(format!("Failed to serialize output: {err}"), ""))?;
    println!("{payload}");
    Ok(())
}

fn dispatch(cli: Cli, state: &AppState) -> Result<(), AppError> {
    let executor = state.executor();
    let trace_id = cli.trace_id;
    match cli.command {
        CliCommand::Devices => print_json(&list_devices(executor.as_ref(), trace_id)?),
        CliCommand::Watch { count } => {
            let watch = watch_devices(executor, state.poll_interval(), trace_id);
            let limit = count.unwrap_or(usize::MAX);
            for snapshot in watch.take(limit) {
                match snapshot {
                    Ok(devices) => print_json(&devices)?,
                    Err(err) => print_json(&err)?,
                }
            }
            Ok(())
        }
        CliCommand::Install {
            serial,
            apk,
            no_reinstall,
        } => {
            let reinstall = state.config.install.reinstall && !no_reinstall;
            print_json(&install_apk(executor.as_ref(), serial, apk, reinstall, trace_id)?)
        }
        CliCommand::Uninstall { serial, package } => {
            print_json(&uninstall_app(executor.as_ref(), serial, package, trace_id)?)
        }
        CliCommand::Deeplink { serial, url } => {
            print_json(&send_deep_link(executor.as_ref(), serial, url, trace_id)?)
        }
        CliCommand::Shell { serial, command } => print_json(&run_shell(
            executor.as_ref(),
            serial,
            command.join(" "),
            trace_id,
        )?),
        CliCommand::Badging { apk } => print_json(&inspect_apk(executor.as_ref(), apk, trace_id)?),
        CliCommand::Permissions { apk } => {
            print_json(&list_apk_permissions(executor.as_ref(), apk, trace_id)?)
        }
        CliCommand::Xmltree { apk, file } => {
            print_json(&dump_xml_tree(executor.as_ref(), apk, file, trace_id)?)
        }
        CliCommand::Mirror { serial, title } => print_json(&start_mirroring(
            executor.as_ref(),
            serial,
            title,
            &state.config.scrcpy,
            trace_id,
        )?),
        CliCommand::Config { reset } => {
            if reset {
                let trace_id = resolve_trace_id(trace_id);
                save_config(&AppConfig::default(), &trace_id)?;
                println!("{}", config_path().display());
                Ok(())
            } else {
                print_json(&state.config)
            }
        }
    }
}

/// Falls back to defaults on a broken config file. The error is kept so it can be
/// logged once the subscriber for the effective level is installed.
fn startup_config(loaded: Result<AppConfig, AppError>) -> (AppConfig, Option<AppError>) {
    match loaded {
        Ok(config) => (config, None),
        Err(err) => (AppConfig::default(), Some(err)),
    }
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let trace_id = resolve_trace_id(cli.trace_id.clone());
    let (config, load_error) = startup_config(load_config(&trace_id));
    init_logging(&config.logging.log_level);
    if let Some(err) = load_error {
        error!(trace_id = %trace_id, error = %err.error, "failed to load config; using defaults");
    }

    let cli = Cli {
        trace_id: Some(trace_id),
        command: cli.command,
    };
    let state = AppState::new(config);
    match dispatch(cli, &state) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(trace_id = %err.trace_id, code = %err.code, error = %err.error, "command failed");
            let _ = print_json(&err);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_install_subcommand() {
        let cli = Cli::try_parse_from(["wepray", "install", "-s", "ABC123", "/tmp/app.apk"])
            .expect("parse");
        match cli.command {
            CliCommand::Install {
                serial,
                apk,
                no_reinstall,
            } => {
                assert_eq!(serial, "ABC123");
                assert_eq!(apk, "/tmp/app.apk");
                assert!(!no_reinstall);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn shell_collects_trailing_tokens() {
        let cli = Cli::try_parse_from(["wepray", "shell", "-s", "A", "wm", "size"]).expect("parse");
        match cli.command {
            CliCommand::Shell { serial, command } => {
                assert_eq!(serial, "A");
                assert_eq!(command, vec!["wm", "size"]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn broken_config_falls_back_to_defaults_and_keeps_error() {
        let tmp = tempfile::TempDir::new().expect("tmp");
        let path = tmp.path().join("config.json");
        std::fs::write(&path, "{ not json").expect("write");

        let (config, load_error) =
            startup_config(crate::app::config::load_config_from_path(&path));
        assert_eq!(config, AppConfig::default());
        let err = load_error.expect("load error");
        assert_eq!(err.code, "ERR_SYSTEM");
        assert!(err.error.contains("Failed to parse config"));
    }

    #[test]
    fn valid_config_has_no_startup_error() {
        let mut custom = AppConfig::default();
        custom.logging.log_level = "debug".to_string();
        let (config, load_error) = startup_config(Ok(custom));
        assert_eq!(config.logging.log_level, "debug");
        assert!(load_error.is_none());
    }

    #[test]
    fn global_trace_id_is_accepted_after_subcommand() {
        let cli = Cli::try_parse_from(["wepray", "devices", "--trace-id", "t-1"]).expect("parse");
        assert_eq!(cli.trace_id.as_deref(), Some("t-1"));
    }
}
