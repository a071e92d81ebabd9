use std::collections::HashMap;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::app::adb::command::{Tool, ToolCommand};
use crate::app::adb::locator::{configured_tool_path, validate_tool_path};
use crate::app::adb::resolver::{BinaryResolver, DirectoryBundle};
use crate::app::config::AppConfig;
use crate::app::error::AppError;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Outcome of one subprocess invocation. Exactly one variant holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionResult {
    Success { output: String },
    Failure { message: String, exit_code: Option<i32> },
}

impl ExecutionResult {
    pub fn failure(message: impl Into<String>, exit_code: Option<i32>) -> Self {
        ExecutionResult::Failure {
            message: message.into(),
            exit_code,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionResult::Success { .. })
    }

    pub fn output(&self) -> Option<&str> {
        match self {
            ExecutionResult::Success { output } => Some(output),
            ExecutionResult::Failure { .. } => None,
        }
    }

    pub fn into_output(self, trace_id: &str) -> Result<String, AppError> {
        match self {
            ExecutionResult::Success { output } => Ok(output),
            ExecutionResult::Failure { message, .. } => Err(AppError::execution(message, trace_id)),
        }
    }
}

/// Anything that can run a [`ToolCommand`]. Implementations never panic or return
/// errors across this boundary; every problem becomes a `Failure`.
pub trait CommandExecutor: Send + Sync {
    fn execute(&self, command: &ToolCommand, trace_id: &str) -> ExecutionResult;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    pub teardown_timeout: Duration,
    pub command_timeout: Option<Duration>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            teardown_timeout: Duration::from_secs(1),
            command_timeout: None,
        }
    }
}

impl RunOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            teardown_timeout: Duration::from_millis(config.process.teardown_timeout_ms),
            command_timeout: match config.process.command_timeout_ms {
                0 => None,
                ms => Some(Duration::from_millis(ms)),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationState {
    NotStarted,
    Running,
    Succeeded,
    Failed,
    Cleaned,
}

/// Owns a running child and tears it down exactly once, on drop at the latest.
struct ChildGuard<'a> {
    child: Child,
    /// The child leads its own process group; signals go to the whole group.
    grouped: bool,
    state: InvocationState,
    teardown_timeout: Duration,
    tool: &'a str,
    trace_id: &'a str,
}

impl ChildGuard<'_> {
    fn advance(&mut self, next: InvocationState) {
        debug!(
            trace_id = %self.trace_id,
            tool = %self.tool,
            from = ?self.state,
            to = ?next,
            "invocation state"
        );
        self.state = next;
    }

    fn cleanup(&mut self) {
        if self.state == InvocationState::Cleaned {
            return;
        }
        drop(self.child.stdin.take());
        drop(self.child.stdout.take());
        drop(self.child.stderr.take());

        if !matches!(self.child.try_wait(), Ok(Some(_))) {
            request_termination(&mut self.child, self.grouped);
            let deadline = Instant::now() + self.teardown_timeout;
            let mut exited = false;
            while Instant::now() < deadline {
                match self.child.try_wait() {
                    Ok(Some(_)) => {
                        exited = true;
                        break;
                    }
                    Ok(None) => thread::sleep(Duration::from_millis(20)),
                    Err(_) => break,
                }
            }
            if !exited {
                warn!(
                    trace_id = %self.trace_id,
                    tool = %self.tool,
                    "process ignored termination request; killing"
                );
                force_kill(&mut self.child, self.grouped);
            }
            let _ = self.child.wait();
        }
        self.advance(InvocationState::Cleaned);
    }
}

impl Drop for ChildGuard<'_> {
    fn drop(&mut self) {
        self.cleanup();
    }
}

#[cfg(unix)]
fn send_signal(child: &Child, grouped: bool, signal: nix::sys::signal::Signal) {
    use nix::sys::signal::{kill, killpg};
    use nix::unistd::Pid;

    let pid = Pid::from_raw(child.id() as i32);
    let _ = if grouped {
        killpg(pid, signal)
    } else {
        kill(pid, signal)
    };
}

#[cfg(unix)]
fn request_termination(child: &mut Child, grouped: bool) {
    send_signal(child, grouped, nix::sys::signal::Signal::SIGTERM);
}

#[cfg(unix)]
fn force_kill(child: &mut Child, grouped: bool) {
    if grouped {
        send_signal(child, true, nix::sys::signal::Signal::SIGKILL);
    } else {
        let _ = child.kill();
    }
}

#[cfg(not(unix))]
fn request_termination(child: &mut Child, _grouped: bool) {
    let _ = child.kill();
}

#[cfg(not(unix))]
fn force_kill(child: &mut Child, _grouped: bool) {
    let _ = child.kill();
}

fn spawn_drain<R: Read + Send + 'static>(
    mut reader: R,
    sink: Arc<Mutex<Vec<u8>>>,
) -> JoinHandle<io::Result<()>> {
    thread::spawn(move || {
        let mut temp = [0u8; 4096];
        loop {
            let count = reader.read(&mut temp)?;
            if count == 0 {
                return Ok(());
            }
            sink.lock()
                .map_err(|_| io::Error::new(io::ErrorKind::Other, "output buffer lock poisoned"))?
                .extend_from_slice(&temp[..count]);
        }
    })
}

/// Joins the drain threads and returns the merged output, or the first read error.
fn collect_output(
    readers: Vec<JoinHandle<io::Result<()>>>,
    merged: &Mutex<Vec<u8>>,
) -> Result<String, String> {
    let mut first_error = None;
    for reader in readers {
        let outcome = match reader.join() {
            Ok(Ok(())) => continue,
            Ok(Err(err)) => err.to_string(),
            Err(_) => "output reader panicked".to_string(),
        };
        if first_error.is_none() {
            first_error = Some(outcome);
        }
    }
    if let Some(err) = first_error {
        return Err(err);
    }
    merged
        .lock()
        .map(|buffer| String::from_utf8_lossy(&buffer).to_string())
        .map_err(|_| "output buffer lock poisoned".to_string())
}

fn wait_for_exit(child: &mut Child, timeout: Option<Duration>, tool: &str) -> Result<ExitStatus, String> {
    let Some(limit) = timeout else {
        return child
            .wait()
            .map_err(|err| format!("Failed to wait for {tool} command: {err}"));
    };
    let start = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) => {
                if start.elapsed() > limit {
                    return Err(format!(
                        "{tool} command timed out after {} ms",
                        limit.as_millis()
                    ));
                }
                thread::sleep(POLL_INTERVAL);
            }
            Err(err) => return Err(format!("Failed to poll {tool} command: {err}")),
        }
    }
}

/// Runs `program` with stdout and stderr merged into one buffer.
///
/// The output is drained completely before the exit code is inspected. The child is
/// torn down on every path (graceful termination, bounded wait, then kill). With a
/// command timeout the child runs in its own process group so teardown also reaches
/// anything it left running in the background.
pub fn run_merged(
    tool: &str,
    program: &Path,
    args: &[String],
    options: RunOptions,
    trace_id: &str,
) -> ExecutionResult {
    let grouped = cfg!(unix) && options.command_timeout.is_some();
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    #[cfg(unix)]
    if grouped {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }
    let spawned = command.spawn();
    let child = match spawned {
        Ok(child) => child,
        Err(err) => {
            debug!(
                trace_id = %trace_id,
                tool = %tool,
                from = ?InvocationState::NotStarted,
                to = ?InvocationState::Cleaned,
                "invocation state"
            );
            return ExecutionResult::failure(format!("Failed to start {tool}: {err}"), None);
        }
    };

    let mut guard = ChildGuard {
        child,
        grouped,
        state: InvocationState::NotStarted,
        teardown_timeout: options.teardown_timeout,
        tool,
        trace_id,
    };
    guard.advance(InvocationState::Running);

    let merged = Arc::new(Mutex::new(Vec::<u8>::new()));
    let mut readers = Vec::with_capacity(2);
    if let Some(stdout) = guard.child.stdout.take() {
        readers.push(spawn_drain(stdout, Arc::clone(&merged)));
    }
    if let Some(stderr) = guard.child.stderr.take() {
        readers.push(spawn_drain(stderr, Arc::clone(&merged)));
    }

    let status = match wait_for_exit(&mut guard.child, options.command_timeout, tool) {
        Ok(status) => status,
        Err(message) => {
            guard.advance(InvocationState::Failed);
            guard.cleanup();
            // Detached: a descendant outside the group may still hold the pipes.
            drop(readers);
            warn!(trace_id = %trace_id, tool = %tool, error = %message, "tool command aborted");
            return ExecutionResult::failure(message, None);
        }
    };

    let output = match collect_output(readers, &merged) {
        Ok(output) => output,
        Err(err) => {
            guard.advance(InvocationState::Failed);
            guard.cleanup();
            warn!(trace_id = %trace_id, tool = %tool, error = %err, "failed to read tool output");
            return ExecutionResult::failure(format!("Failed to read {tool} output: {err}"), None);
        }
    };

    let result = match status.code() {
        Some(0) => {
            guard.advance(InvocationState::Succeeded);
            ExecutionResult::Success { output }
        }
        Some(code) => {
            guard.advance(InvocationState::Failed);
            ExecutionResult::failure(format!("{tool} command failed with exit code: {code}"), Some(code))
        }
        None => {
            guard.advance(InvocationState::Failed);
            ExecutionResult::failure(format!("{tool} command terminated by signal"), None)
        }
    };
    guard.cleanup();
    result
}

/// Runs descriptors against the bundled (or configured) tool binaries.
pub struct ProcessRunner {
    resolver: Arc<BinaryResolver>,
    overrides: HashMap<Tool, PathBuf>,
    options: RunOptions,
}

impl ProcessRunner {
    pub fn new(resolver: Arc<BinaryResolver>, options: RunOptions) -> Self {
        Self {
            resolver,
            overrides: HashMap::new(),
            options,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        let bundle = DirectoryBundle::new(config.tools.resource_dir());
        let resolver = Arc::new(BinaryResolver::new(
            Box::new(bundle),
            config.tools.cache_dir(),
        ));
        let mut runner = Self::new(resolver, RunOptions::from_config(config));
        for tool in Tool::ALL {
            if let Some(path) = configured_tool_path(&config.tools, tool) {
                runner = runner.with_override(tool, path);
            }
        }
        runner
    }

    pub fn with_override(mut self, tool: Tool, path: impl Into<PathBuf>) -> Self {
        self.overrides.insert(tool, path.into());
        self
    }

    /// Interactive sessions such as mirroring run until the user ends them, so the
    /// command timeout never applies to them.
    pub fn options_for(&self, command: &ToolCommand) -> RunOptions {
        if command.is_interactive() {
            RunOptions {
                command_timeout: None,
                ..self.options
            }
        } else {
            self.options
        }
    }

    pub fn program_for(&self, tool: Tool, trace_id: &str) -> Result<PathBuf, AppError> {
        if let Some(path) = self.overrides.get(&tool) {
            validate_tool_path(tool, path)
                .map_err(|message| AppError::resolution(message, trace_id))?;
            return Ok(path.clone());
        }
        self.resolver
            .resolve(tool, trace_id)
            .map(|handle| handle.path)
    }
}

impl CommandExecutor for ProcessRunner {
    fn execute(&self, command: &ToolCommand, trace_id: &str) -> ExecutionResult {
        let tool = command.tool();
        let program = match self.program_for(tool, trace_id) {
            Ok(program) => program,
            Err(err) => {
                warn!(trace_id = %trace_id, tool = %tool, error = %err.error, "tool unavailable");
                return ExecutionResult::failure(err.error, None);
            }
        };

        info!(trace_id = %trace_id, command = %command.display(), "run tool command");
        let started = Instant::now();
        let options = self.options_for(command);
        let result = run_merged(tool.name(), &program, &command.args(), options, trace_id);
        debug!(
            trace_id = %trace_id,
            tool = %tool,
            elapsed_ms = started.elapsed().as_millis() as u64,
            success = result.is_success(),
            "tool command finished"
        );
        result
    }
}
