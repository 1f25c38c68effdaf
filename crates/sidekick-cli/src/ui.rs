use std::io;
use std::io::IsTerminal;
use std::io::Write;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::thread;
use std::thread::JoinHandle;
use std::time::Duration;

use crossterm::cursor::MoveTo;
use crossterm::cursor::MoveToColumn;
use crossterm::queue;
use crossterm::style::Color;
use crossterm::style::Print;
use crossterm::style::ResetColor;
use crossterm::style::SetForegroundColor;
use crossterm::style::Stylize;
use crossterm::terminal::Clear;
use crossterm::terminal::ClearType;
use sidekick_core::actions::Action;
use sidekick_core::approvals::ApprovalCategory;
use sidekick_core::approvals::ApprovalResponse;
use sidekick_core::approvals::Confirm;
use sidekick_core::error::PlanParseError;
use sidekick_exec::contracts::CommandOutcome;
use sidekick_exec::contracts::CommandResult;
use sidekick_exec::contracts::ExecutionEvent;

pub const SPINNER_FRAMES: [char; 8] = ['⠇', '⠏', '⠋', '⠙', '⠹', '⠸', '⠼', '⠴'];
const SPINNER_FRAME: Duration = Duration::from_millis(100);

/// Serializes spinner frames against the interrupt handler's last words.
static TERMINAL: Mutex<()> = Mutex::new(());
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

fn terminal_lock() -> MutexGuard<'static, ()> {
    TERMINAL.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Plain,
    System,
    Error,
    Success,
    Plan,
    Test,
}

impl Role {
    fn color(self) -> Option<Color> {
        match self {
            Self::Plain => None,
            Self::System => Some(Color::Yellow),
            Self::Error => Some(Color::Red),
            Self::Success => Some(Color::Green),
            Self::Plan => Some(Color::Cyan),
            Self::Test => Some(Color::Magenta),
        }
    }
}

pub fn print(role: Role, text: &str) {
    match role.color() {
        Some(color) => println!("{}", text.with(color)),
        None => println!("{text}"),
    }
}

pub fn clear_screen() {
    let mut stdout = io::stdout();
    if !stdout.is_terminal() {
        return;
    }
    let _ = queue!(stdout, Clear(ClearType::All), MoveTo(0, 0));
    let _ = stdout.flush();
}

/// Prints `prompt` and reads one line. `None` means end of input.
pub fn read_line(prompt: &str) -> io::Result<Option<String>> {
    let mut stdout = io::stdout();
    write!(stdout, "{}", prompt.bold())?;
    stdout.flush()?;
    let mut line = String::new();
    if io::stdin().read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim_end_matches(&['\r', '\n'][..]).to_string()))
}

/// Reads lines until one containing only `.`, or end of input.
pub fn read_block() -> io::Result<String> {
    let mut lines = Vec::new();
    let stdin = io::stdin();
    loop {
        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim_end_matches(&['\r', '\n'][..]);
        if line == "." {
            break;
        }
        lines.push(line.to_string());
    }
    Ok(lines.join("\n"))
}

/// Background progress indicator for blocking calls.
///
/// The animation thread is stopped and joined when the value is dropped, so
/// the line is always cleared before anything else is printed.
pub struct Spinner {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Spinner {
    pub fn start(message: &str) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let message = message.to_string();
        let handle = thread::spawn(move || spin(&message, &thread_stop));
        Self {
            stop,
            handle: Some(handle),
        }
    }

    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            handle.thread().unpark();
            let _ = handle.join();
        }
    }
}

impl Drop for Spinner {
    fn drop(&mut self) {
        self.stop();
    }
}

fn spin(message: &str, stop: &AtomicBool) {
    let mut stdout = io::stdout();
    for frame in SPINNER_FRAMES.iter().cycle() {
        if stop.load(Ordering::SeqCst) {
            break;
        }
        {
            let _terminal = terminal_lock();
            if INTERRUPTED.load(Ordering::SeqCst) {
                return;
            }
            let _ = queue!(
                stdout,
                MoveToColumn(0),
                SetForegroundColor(Color::Cyan),
                Print(frame),
                ResetColor,
                Print(format!(" {message}"))
            );
            let _ = stdout.flush();
        }
        thread::park_timeout(SPINNER_FRAME);
    }
    let _terminal = terminal_lock();
    clear_line(&mut stdout);
}

fn clear_line(stdout: &mut io::Stdout) {
    let _ = queue!(stdout, MoveToColumn(0), Clear(ClearType::CurrentLine));
    let _ = stdout.flush();
}

/// On SIGINT: stop drawing, kill running test commands, say goodbye and
/// exit with status 0.
#[cfg(unix)]
pub fn install_interrupt_handler() -> io::Result<()> {
    use signal_hook::consts::SIGINT;
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT])?;
    thread::spawn(move || {
        if signals.forever().next().is_some() {
            let _terminal = terminal_lock();
            INTERRUPTED.store(true, Ordering::SeqCst);
            sidekick_exec::runner::kill_active_commands();
            let mut stdout = io::stdout();
            clear_line(&mut stdout);
            println!("\nExiting. Goodbye!");
            tracing::info!("interrupted");
            crate::logging::flush();
            std::process::exit(0);
        }
    });
    Ok(())
}

#[cfg(not(unix))]
pub fn install_interrupt_handler() -> io::Result<()> {
    Ok(())
}

pub fn proposal_header(category: ApprovalCategory) -> &'static str {
    match category {
        ApprovalCategory::Files => "🤖 Sidekick has proposed the following file changes:",
        ApprovalCategory::Tests => "🤖 Sidekick has proposed the following tests:",
    }
}

pub fn proposal_question(category: ApprovalCategory) -> &'static str {
    match category {
        ApprovalCategory::Files => "Apply these file changes? [y/N/always]: ",
        ApprovalCategory::Tests => "Run these tests? [y/N/always]: ",
    }
}

pub fn proposal_lines(actions: &[&Action]) -> Vec<String> {
    actions
        .iter()
        .enumerate()
        .map(|(index, action)| format!("  {}. {}", index + 1, action.summary()))
        .collect()
}

/// Interactive confirmation on stdin/stdout. End of input declines.
pub struct TerminalConfirm;

impl Confirm for TerminalConfirm {
    fn confirm(
        &mut self,
        category: ApprovalCategory,
        actions: &[&Action],
    ) -> io::Result<ApprovalResponse> {
        println!();
        print(Role::Plan, proposal_header(category));
        for line in proposal_lines(actions) {
            println!("{line}");
        }
        let answer = read_line(&format!("\n{}", proposal_question(category)))?;
        Ok(answer
            .as_deref()
            .map(ApprovalResponse::parse)
            .unwrap_or(ApprovalResponse::No))
    }
}

pub fn render_reply(reply: &str) {
    print(Role::System, &format!("\n🤖 Sidekick:\n{reply}"));
}

pub fn render_parse_error(err: &PlanParseError) {
    print(Role::Error, &format!("\nCould not parse the AI's plan. Error: {err}"));
    print(Role::System, &format!("Raw response:\n{}", err.raw()));
}

pub fn render_event(event: &ExecutionEvent) {
    for (role, line) in event_lines(event) {
        print(role, &line);
    }
}

pub fn event_lines(event: &ExecutionEvent) -> Vec<(Role, String)> {
    match event {
        ExecutionEvent::UnrecognizedAction { index, raw } => vec![(
            Role::Error,
            format!("Skipping action #{}: unrecognized entry {raw}", index + 1),
        )],
        ExecutionEvent::FilesDeclined => vec![(Role::Plain, "File changes aborted.".to_string())],
        ExecutionEvent::OverwriteNotice { path } => vec![(
            Role::System,
            format!("⚠️ Note: '{path}' will be completely overwritten."),
        )],
        ExecutionEvent::FileWritten { path, .. } => {
            vec![(Role::Success, format!("✅ Wrote file: {path}"))]
        }
        ExecutionEvent::FileRejected { path, reason } => vec![(
            Role::Error,
            format!("SECURITY ERROR: Refusing to write to an unsafe path: {path} ({reason})"),
        )],
        ExecutionEvent::FileFailed { path, error } => {
            vec![(Role::Error, format!("Error writing file {path}: {error}"))]
        }
        ExecutionEvent::TestsDeclined => vec![(Role::Plain, "Tests skipped.".to_string())],
        ExecutionEvent::TestStarted { command } => {
            vec![(Role::Test, format!("🚀 Running test: `{command}`"))]
        }
        ExecutionEvent::TestFinished(result) => command_result_lines(result),
    }
}

pub fn command_result_lines(result: &CommandResult) -> Vec<(Role, String)> {
    let mut lines = Vec::new();
    let mut push = |role: Role, text: &str| lines.push((role, text.to_string()));
    match result.outcome {
        CommandOutcome::Success => {
            push(Role::Plain, "--- TEST OUTPUT ---");
            push(Role::Plain, result.stdout.trim_end());
            push(Role::Plain, "--- END TEST ---");
            push(Role::Success, "✅ Test completed successfully.");
        }
        CommandOutcome::Failure => {
            push(Role::Plain, "--- TEST FAILED ---");
            push(Role::Plain, result.stdout.trim_end());
            push(Role::Plain, "--- STDERR ---");
            push(Role::Plain, result.stderr.trim_end());
            push(Role::Plain, "--- END TEST ---");
            let code = result
                .exit_code
                .map_or_else(|| "unknown".to_string(), |code| code.to_string());
            push(Role::Error, &format!("❌ Test failed with exit code {code}."));
        }
        CommandOutcome::Timeout => {
            if !result.stdout.trim().is_empty() || !result.stderr.trim().is_empty() {
                push(Role::Plain, "--- PARTIAL OUTPUT ---");
                push(Role::Plain, result.stdout.trim_end());
                push(Role::Plain, "--- STDERR ---");
                push(Role::Plain, result.stderr.trim_end());
                push(Role::Plain, "--- END TEST ---");
            }
            push(
                Role::Error,
                &format!(
                    "❌ Test did not finish: Command timed out after {} seconds.",
                    result.timeout.as_secs_f64()
                ),
            );
        }
        CommandOutcome::SpawnError => {
            push(
                Role::Error,
                &format!("❌ Could not start the test command: {}", result.stderr.trim()),
            );
        }
    }
    lines
}
