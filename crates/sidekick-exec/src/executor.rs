use std::io;
use std::time::Duration;

use sidekick_core::actions::Action;
use sidekick_core::actions::Plan;
use sidekick_core::approvals::ApprovalCategory;
use sidekick_core::approvals::Authorization;
use sidekick_core::approvals::Confirm;
use sidekick_core::approvals::ConfirmationGate;

use crate::contracts::ExecutionEvent;
use crate::contracts::ExecutionReport;
use crate::materializer::write_file;
use crate::runner::CommandRunner;
use crate::runner::DEFAULT_COMMAND_TIMEOUT;
use crate::sandbox::PathSandbox;
use crate::sandbox::SandboxDecision;

/// Applies one plan: file changes first, then tests, each stage behind its
/// own confirmation.
///
/// Per-action failures (sandbox rejections, write errors, failing tests) are
/// reported through events and never stop the remaining actions. The only
/// error returned is a failure to read the user's confirmation.
pub struct PlanExecutor<'a, R> {
    sandbox: &'a PathSandbox,
    runner: &'a R,
    timeout: Duration,
}

impl<'a, R> PlanExecutor<'a, R>
where
    R: CommandRunner,
{
    pub fn new(sandbox: &'a PathSandbox, runner: &'a R) -> Self {
        Self {
            sandbox,
            runner,
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn execute<F>(
        &self,
        plan: &Plan,
        gate: &mut ConfirmationGate,
        confirm: &mut dyn Confirm,
        on_event: &mut F,
    ) -> io::Result<ExecutionReport>
    where
        F: FnMut(ExecutionEvent),
    {
        let mut report = ExecutionReport::default();
        let partitioned = plan.partition();

        for (index, action) in &partitioned.unrecognized {
            if let Action::Unrecognized { raw } = action {
                tracing::warn!(index, %raw, "skipping unrecognized action");
                on_event(ExecutionEvent::UnrecognizedAction {
                    index: *index,
                    raw: raw.clone(),
                });
            }
            report.unrecognized += 1;
        }

        if !partitioned.file_actions.is_empty() {
            let authorization =
                gate.authorize(ApprovalCategory::Files, &partitioned.file_actions, confirm)?;
            if authorization == Authorization::Declined {
                // Tests would run against files that were never written.
                report.files_declined = true;
                on_event(ExecutionEvent::FilesDeclined);
                return Ok(report);
            }
            for action in &partitioned.file_actions {
                self.apply_file_action(action, &mut report, on_event);
            }
        }

        if !partitioned.test_actions.is_empty() {
            let authorization =
                gate.authorize(ApprovalCategory::Tests, &partitioned.test_actions, confirm)?;
            if authorization == Authorization::Declined {
                report.tests_declined = true;
                on_event(ExecutionEvent::TestsDeclined);
                return Ok(report);
            }
            for action in &partitioned.test_actions {
                if let Action::Test { command } = action {
                    on_event(ExecutionEvent::TestStarted {
                        command: command.clone(),
                    });
                    let result = self.runner.run(command, self.timeout);
                    report.tests.push(result.clone());
                    on_event(ExecutionEvent::TestFinished(result));
                }
            }
        }

        tracing::info!(summary = %report.summary(), "plan executed");
        Ok(report)
    }

    fn apply_file_action<F>(&self, action: &Action, report: &mut ExecutionReport, on_event: &mut F)
    where
        F: FnMut(ExecutionEvent),
    {
        let (path, content) = match action {
            Action::CreateFile { path, content } => (path, content),
            Action::EditFile { path, content } => {
                on_event(ExecutionEvent::OverwriteNotice { path: path.clone() });
                (path, content)
            }
            Action::Test { .. } | Action::Unrecognized { .. } => return,
        };

        let resolved = match self.sandbox.resolve(path) {
            SandboxDecision::Admit(resolved) => resolved,
            SandboxDecision::Reject(reason) => {
                report.files_rejected.push(path.clone());
                on_event(ExecutionEvent::FileRejected {
                    path: path.clone(),
                    reason: reason.to_string(),
                });
                return;
            }
        };

        match write_file(&resolved, content) {
            Ok(()) => {
                report.files_written.push(resolved.clone());
                on_event(ExecutionEvent::FileWritten {
                    path: path.clone(),
                    resolved,
                });
            }
            Err(err) => {
                tracing::warn!(path = %path, error = %err, "file write failed");
                report.files_failed.push(path.clone());
                on_event(ExecutionEvent::FileFailed {
                    path: path.clone(),
                    error: err.to_string(),
                });
            }
        }
    }
}
