use std::path::PathBuf;
use std::time::Duration;

use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    Success,
    Failure,
    Timeout,
    SpawnError,
}

impl CommandOutcome {
    pub fn label(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Timeout => "timeout",
            Self::SpawnError => "spawn_error",
        }
    }
}

/// Everything captured from one shell command.
///
/// `exit_code` is `None` only for `Timeout` and `SpawnError`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub command: String,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub outcome: CommandOutcome,
    pub timeout: Duration,
    pub elapsed: Duration,
}

impl CommandResult {
    pub fn succeeded(&self) -> bool {
        self.outcome == CommandOutcome::Success
    }
}

/// Progress reported by the plan executor, in the order things happen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionEvent {
    UnrecognizedAction { index: usize, raw: Value },
    FilesDeclined,
    OverwriteNotice { path: String },
    FileWritten { path: String, resolved: PathBuf },
    FileRejected { path: String, reason: String },
    FileFailed { path: String, error: String },
    TestsDeclined,
    TestStarted { command: String },
    TestFinished(CommandResult),
}

/// Summary of one executed plan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionReport {
    pub files_written: Vec<PathBuf>,
    pub files_rejected: Vec<String>,
    pub files_failed: Vec<String>,
    pub tests: Vec<CommandResult>,
    pub unrecognized: usize,
    pub files_declined: bool,
    pub tests_declined: bool,
}

impl ExecutionReport {
    pub fn tests_passed(&self) -> usize {
        self.tests.iter().filter(|result| result.succeeded()).count()
    }

    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if self.files_declined {
            parts.push("file changes declined".to_string());
        } else {
            parts.push(format!("{} file(s) written", self.files_written.len()));
            if !self.files_rejected.is_empty() {
                parts.push(format!("{} rejected", self.files_rejected.len()));
            }
            if !self.files_failed.is_empty() {
                parts.push(format!("{} failed", self.files_failed.len()));
            }
        }
        if self.tests_declined {
            parts.push("tests skipped".to_string());
        } else if !self.tests.is_empty() {
            parts.push(format!(
                "{}/{} test(s) passed",
                self.tests_passed(),
                self.tests.len()
            ));
        }
        if self.unrecognized > 0 {
            parts.push(format!("{} unrecognized action(s)", self.unrecognized));
        }
        parts.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn test_result(command: &str, outcome: CommandOutcome, exit_code: Option<i32>) -> CommandResult {
        CommandResult {
            command: command.to_string(),
            exit_code,
            stdout: String::new(),
            stderr: String::new(),
            outcome,
            timeout: Duration::from_secs(30),
            elapsed: Duration::from_millis(10),
        }
    }

    #[test]
    fn declined_files_summary_mentions_nothing_else() {
        let report = ExecutionReport {
            files_declined: true,
            ..ExecutionReport::default()
        };
        assert_eq!(report.summary(), "file changes declined");
    }

    #[test]
    fn skipped_tests_follow_written_files() {
        let report = ExecutionReport {
            files_written: vec![PathBuf::from("/work/app/main.py")],
            tests_declined: true,
            ..ExecutionReport::default()
        };
        assert_eq!(report.summary(), "1 file(s) written, tests skipped");
    }

    #[test]
    fn mixed_turn_counts_every_outcome() {
        let report = ExecutionReport {
            files_written: vec![PathBuf::from("/work/app/a.py"), PathBuf::from("/work/app/b.py")],
            files_rejected: vec!["../outside.txt".to_string()],
            files_failed: vec!["locked.txt".to_string()],
            tests: vec![
                test_result("exit 1", CommandOutcome::Failure, Some(1)),
                test_result("echo ok", CommandOutcome::Success, Some(0)),
                test_result("sleep 60", CommandOutcome::Timeout, None),
            ],
            unrecognized: 1,
            files_declined: false,
            tests_declined: false,
        };
        assert_eq!(report.tests_passed(), 1);
        assert_eq!(
            report.summary(),
            "2 file(s) written, 1 rejected, 1 failed, 1/3 test(s) passed, 1 unrecognized action(s)"
        );
    }
}
