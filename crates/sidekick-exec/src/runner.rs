use std::io::Read;
use std::path::Path;
use std::path::PathBuf;
use std::process::Child;
use std::process::Command;
use std::process::ExitStatus;
use std::process::Stdio;
use std::sync::mpsc;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use wait_timeout::ChildExt;

use crate::contracts::CommandOutcome;
use crate::contracts::CommandResult;

pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// How long output pipes may stay open once the command is gone, when the
/// timeout budget is already spent.
const DRAIN_GRACE: Duration = Duration::from_millis(200);

/// Pids of running commands. Each leads its own process group, so a
/// terminal interrupt does not reach them on its own.
static ACTIVE_COMMANDS: Mutex<Vec<u32>> = Mutex::new(Vec::new());

/// Kills every command still running. Called on interrupt before exiting.
pub fn kill_active_commands() {
    let active = ACTIVE_COMMANDS.lock().unwrap_or_else(PoisonError::into_inner);
    for pid in active.iter() {
        kill_group(*pid);
    }
}

/// Runs one test command to completion or timeout.
///
/// Failures of any kind are described by the returned result; running a
/// command never errors.
pub trait CommandRunner {
    fn run(&self, command: &str, timeout: Duration) -> CommandResult;
}

/// Runs commands through the platform shell with the user's environment and
/// privileges. Only the working directory is fixed; command content is not
/// restricted in any way.
#[derive(Debug, Clone)]
pub struct ShellCommandRunner {
    cwd: PathBuf,
}

impl ShellCommandRunner {
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self { cwd: cwd.into() }
    }
}

impl CommandRunner for ShellCommandRunner {
    fn run(&self, command: &str, timeout: Duration) -> CommandResult {
        let started = Instant::now();
        let result = |exit_code, stdout, stderr, outcome| CommandResult {
            command: command.to_string(),
            exit_code,
            stdout,
            stderr,
            outcome,
            timeout,
            elapsed: started.elapsed(),
        };

        let mut child = match spawn_shell(command, &self.cwd) {
            Ok(child) => child,
            Err(err) => {
                tracing::warn!(command, error = %err, "failed to spawn command");
                return result(
                    None,
                    String::new(),
                    format!("failed to spawn command: {err}"),
                    CommandOutcome::SpawnError,
                );
            }
        };

        let pid = child.id();
        ACTIVE_COMMANDS
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(pid);

        let (done_tx, done_rx) = mpsc::channel();
        let stdout_capture = child
            .stdout
            .take()
            .map(|pipe| spawn_reader(pipe, done_tx.clone()));
        let stderr_capture = child
            .stderr
            .take()
            .map(|pipe| spawn_reader(pipe, done_tx.clone()));
        drop(done_tx);
        let readers = usize::from(stdout_capture.is_some()) + usize::from(stderr_capture.is_some());

        let waited = child.wait_timeout(timeout);
        if !matches!(waited, Ok(Some(_))) {
            terminate(&mut child);
        }
        // Background jobs left in the group would keep the pipes open.
        kill_group(pid);
        ACTIVE_COMMANDS
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|active| *active != pid);

        let drain_until = (started + timeout).max(Instant::now() + DRAIN_GRACE);
        if !drain_readers(&done_rx, readers, drain_until) {
            tracing::warn!(
                command,
                "output still held open by a detached process, keeping partial output"
            );
        }
        let stdout = captured(stdout_capture.as_ref());
        let mut stderr = captured(stderr_capture.as_ref());

        let finished = match waited {
            Ok(Some(status)) => {
                let code = exit_code(status);
                let outcome = if status.success() {
                    CommandOutcome::Success
                } else {
                    CommandOutcome::Failure
                };
                result(Some(code), stdout, stderr, outcome)
            }
            Ok(None) => result(None, stdout, stderr, CommandOutcome::Timeout),
            Err(err) => {
                if !stderr.is_empty() && !stderr.ends_with('\n') {
                    stderr.push('\n');
                }
                stderr.push_str(&format!("failed to wait for command: {err}"));
                result(None, stdout, stderr, CommandOutcome::SpawnError)
            }
        };

        tracing::info!(
            command,
            outcome = finished.outcome.label(),
            exit_code = ?finished.exit_code,
            elapsed_ms = finished.elapsed.as_millis() as u64,
            "command finished"
        );
        finished
    }
}

fn spawn_shell(command: &str, cwd: &Path) -> std::io::Result<Child> {
    let mut shell = shell_command(command);
    shell
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        // Own process group so a timeout can take down the whole pipeline.
        shell.process_group(0);
    }
    shell.spawn()
}

#[cfg(not(target_os = "windows"))]
fn shell_command(command: &str) -> Command {
    let mut shell = Command::new("sh");
    shell.arg("-c").arg(command);
    shell
}

#[cfg(target_os = "windows")]
fn shell_command(command: &str) -> Command {
    let mut shell = Command::new("cmd");
    shell.arg("/C").arg(command);
    shell
}

fn kill_group(pid: u32) {
    #[cfg(unix)]
    {
        if let Ok(pgid) = libc::pid_t::try_from(pid) {
            // SAFETY: killpg only sends a signal; the group was created by
            // `process_group(0)` at spawn time and is led by our child.
            unsafe {
                libc::killpg(pgid, libc::SIGKILL);
            }
        }
    }
    #[cfg(not(unix))]
    let _ = pid;
}

fn terminate(child: &mut Child) {
    kill_group(child.id());
    if let Err(err) = child.kill() {
        tracing::debug!(error = %err, "kill after timeout");
    }
    if let Err(err) = child.wait() {
        tracing::warn!(error = %err, "failed to reap timed out command");
    }
}

type Capture = Arc<Mutex<Vec<u8>>>;

/// Copies `pipe` into a shared buffer and reports on `done` at end of
/// stream. A process outside our group may hold the pipe forever, so the
/// thread is never joined.
fn spawn_reader<R>(mut pipe: R, done: mpsc::Sender<()>) -> Capture
where
    R: Read + Send + 'static,
{
    let capture = Capture::default();
    let sink = Arc::clone(&capture);
    thread::spawn(move || {
        let mut chunk = [0u8; 8192];
        loop {
            match pipe.read(&mut chunk) {
                Ok(0) | Err(_) => break,
                Ok(read) => {
                    sink.lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .extend_from_slice(&chunk[..read]);
                }
            }
        }
        let _ = done.send(());
    });
    capture
}

/// Waits for `pending` readers to hit end of stream. False if the deadline
/// passed first.
fn drain_readers(done: &mpsc::Receiver<()>, mut pending: usize, deadline: Instant) -> bool {
    while pending > 0 {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if done.recv_timeout(remaining).is_err() {
            return false;
        }
        pending -= 1;
    }
    true
}

fn captured(capture: Option<&Capture>) -> String {
    capture
        .map(|capture| {
            let bytes = capture.lock().unwrap_or_else(PoisonError::into_inner);
            String::from_utf8_lossy(&bytes).into_owned()
        })
        .unwrap_or_default()
}

fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    -1
}
