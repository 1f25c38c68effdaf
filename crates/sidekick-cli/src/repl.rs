use std::io;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use sidekick_core::approvals::Confirm;
use sidekick_core::approvals::ConfirmationGate;
use sidekick_core::config::Config;
use sidekick_core::error::PlanParseError;
use sidekick_core::plan_parser::parse_reply;
use sidekick_exec::adapters::ChatProvider;
use sidekick_exec::adapters::OpenAiCompatProvider;
use sidekick_exec::contracts::ExecutionEvent;
use sidekick_exec::contracts::ExecutionReport;
use sidekick_exec::executor::PlanExecutor;
use sidekick_exec::runner::CommandRunner;
use sidekick_exec::runner::ShellCommandRunner;
use sidekick_exec::sandbox::PathSandbox;

use crate::ui;
use crate::ui::Role;
use crate::ui::Spinner;
use crate::ui::TerminalConfirm;

pub const PROMPT: &str = "sidekick prompt > ";
const THINKING: &str = "Thinking...";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlashCommand {
    Help,
    Exit,
    Model,
    LlmServer,
    SystemPrompt,
}

impl SlashCommand {
    /// Anything that is not a known command is sent to the model as-is.
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "/help" => Some(Self::Help),
            "/exit" | "/quit" => Some(Self::Exit),
            "/model" => Some(Self::Model),
            "/llm_server" => Some(Self::LlmServer),
            "/system_prompt" => Some(Self::SystemPrompt),
            _ => None,
        }
    }
}

const HELP: &[(&str, &str)] = &[
    ("/help", "Show this help message."),
    ("/model", "Change the active AI model."),
    ("/llm_server", "Change the LLM server API URL."),
    ("/system_prompt", "View and replace the system prompt for this session."),
    ("/exit", "Exit the application (also /quit)."),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Exit,
}

/// What one model reply turned into.
#[derive(Debug)]
pub enum TurnOutcome {
    /// No plan block: the reply is shown as plain text.
    Conversation,
    ParseDefect(PlanParseError),
    Executed(ExecutionReport),
}

pub fn process_reply<R, F>(
    reply: &str,
    executor: &PlanExecutor<'_, R>,
    gate: &mut ConfirmationGate,
    confirm: &mut dyn Confirm,
    on_event: &mut F,
) -> io::Result<TurnOutcome>
where
    R: CommandRunner,
    F: FnMut(ExecutionEvent),
{
    match parse_reply(reply) {
        Ok(None) => Ok(TurnOutcome::Conversation),
        Err(err) => {
            tracing::warn!(%err, "unparseable plan");
            Ok(TurnOutcome::ParseDefect(err))
        }
        Ok(Some(plan)) => {
            tracing::info!(actions = plan.len(), "executing plan");
            executor
                .execute(&plan, gate, confirm, on_event)
                .map(TurnOutcome::Executed)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelChoiceError {
    NotANumber,
    OutOfRange,
}

/// Maps a 1-based menu answer onto the listed models.
pub fn select_model<'a>(models: &'a [String], answer: &str) -> Result<&'a str, ModelChoiceError> {
    let choice: usize = answer
        .trim()
        .parse()
        .map_err(|_| ModelChoiceError::NotANumber)?;
    choice
        .checked_sub(1)
        .and_then(|index| models.get(index))
        .map(String::as_str)
        .ok_or(ModelChoiceError::OutOfRange)
}

pub struct Session {
    config: Config,
    gate: ConfirmationGate,
    sandbox: PathSandbox,
    runner: ShellCommandRunner,
    provider: OpenAiCompatProvider,
}

impl Session {
    pub fn new(config: Config, sandbox: PathSandbox) -> anyhow::Result<Self> {
        let provider = build_provider(&config, &config.provider.api_base)?;
        let runner = ShellCommandRunner::new(PathBuf::from(sandbox.root()));
        Ok(Self {
            config,
            gate: ConfirmationGate::new(),
            sandbox,
            runner,
            provider,
        })
    }

    pub fn run(&mut self) -> anyhow::Result<()> {
        ui::clear_screen();
        ui::print(
            Role::System,
            &format!("Welcome to Sidekick! Using model: {}", self.config.provider.model),
        );
        ui::print(Role::System, "Type /help for a list of commands.");
        tracing::info!(
            model = %self.config.provider.model,
            api_base = %self.provider.api_base(),
            root = %self.sandbox.root().display(),
            "session started"
        );

        loop {
            let Some(line) = ui::read_line(&format!("\n{PROMPT}"))? else {
                println!();
                break;
            };
            let input = line.trim();
            if input.is_empty() {
                continue;
            }

            let result = match SlashCommand::parse(input) {
                Some(command) => self.handle_command(command),
                None => self.turn(input).map(|()| Flow::Continue),
            };
            match result {
                Ok(Flow::Continue) => {}
                Ok(Flow::Exit) => break,
                Err(err) => {
                    tracing::error!(error = format!("{err:#}"), "turn failed");
                    ui::print(Role::Error, &format!("An unexpected error occurred: {err:#}"));
                }
            }
        }

        ui::print(Role::System, "Exiting. Goodbye!");
        tracing::info!("session ended");
        Ok(())
    }

    fn turn(&mut self, request: &str) -> anyhow::Result<()> {
        let reply = {
            let _spinner = Spinner::start(THINKING);
            self.provider.complete(
                &self.config.provider.model,
                &self.config.prompt.system_prompt,
                request,
            )
        };
        let reply = match reply {
            Ok(reply) => reply,
            Err(err) => {
                tracing::error!(%err, "model request failed");
                ui::print(
                    Role::Error,
                    &format!("Error communicating with the model server: {err}"),
                );
                return Ok(());
            }
        };

        let executor = PlanExecutor::new(&self.sandbox, &self.runner)
            .with_timeout(Duration::from_secs(self.config.runner.timeout_secs));
        let outcome = process_reply(
            &reply,
            &executor,
            &mut self.gate,
            &mut TerminalConfirm,
            &mut |event| ui::render_event(&event),
        )
        .context("reading confirmation")?;

        match outcome {
            TurnOutcome::Conversation => ui::render_reply(&reply),
            TurnOutcome::ParseDefect(err) => ui::render_parse_error(&err),
            TurnOutcome::Executed(report) => {
                let summary = report.summary();
                tracing::info!(%summary, passed = report.tests_passed(), "turn finished");
                ui::print(Role::System, &format!("\n{summary}"));
            }
        }
        Ok(())
    }

    fn handle_command(&mut self, command: SlashCommand) -> anyhow::Result<Flow> {
        tracing::debug!(?command, "slash command");
        match command {
            SlashCommand::Exit => return Ok(Flow::Exit),
            SlashCommand::Help => {
                println!("\nAvailable Commands:");
                for (name, about) in HELP {
                    println!("  {name:<16}- {about}");
                }
            }
            SlashCommand::Model => self.choose_model()?,
            SlashCommand::LlmServer => self.change_server()?,
            SlashCommand::SystemPrompt => self.edit_system_prompt()?,
        }
        Ok(Flow::Continue)
    }

    fn choose_model(&mut self) -> anyhow::Result<()> {
        ui::print(Role::System, "Fetching available models...");
        let models = match self.provider.list_models() {
            Ok(models) => models,
            Err(err) => {
                tracing::warn!(%err, "listing models failed");
                ui::print(Role::Error, &format!("Error fetching models: {err}"));
                Vec::new()
            }
        };
        if models.is_empty() {
            ui::print(Role::Error, "Could not retrieve models. Please check your server.");
            return Ok(());
        }

        println!("\nPlease select a model:");
        for (index, model) in models.iter().enumerate() {
            println!("  {}. {model}", index + 1);
        }
        let answer = ui::read_line("Enter number: ")?.unwrap_or_default();
        match select_model(&models, &answer) {
            Ok(model) => {
                self.config.provider.model = model.to_string();
                tracing::info!(model, "model changed");
                ui::print(Role::Success, &format!("Model changed to: {model}"));
            }
            Err(ModelChoiceError::OutOfRange) => ui::print(Role::Error, "Invalid selection."),
            Err(ModelChoiceError::NotANumber) => {
                ui::print(Role::Error, "Invalid input. Please enter a number.")
            }
        }
        Ok(())
    }

    fn change_server(&mut self) -> anyhow::Result<()> {
        ui::print(
            Role::System,
            &format!("Current LLM server: {}", self.provider.api_base()),
        );
        let answer = ui::read_line("Enter the API Base URL (empty keeps it): ")?.unwrap_or_default();
        let api_base = answer.trim();
        if api_base.is_empty() {
            ui::print(Role::System, "LLM Server URL update canceled.");
            return Ok(());
        }
        self.provider = build_provider(&self.config, api_base)?;
        self.config.provider.api_base = self.provider.api_base().to_string();
        tracing::info!(api_base = %self.provider.api_base(), "llm server changed");
        ui::print(
            Role::Success,
            &format!("LLM Server URL updated to: {}", self.provider.api_base()),
        );
        Ok(())
    }

    fn edit_system_prompt(&mut self) -> anyhow::Result<()> {
        ui::print(Role::System, "\nCurrent system prompt:");
        println!("{}", self.config.prompt.system_prompt);
        ui::print(
            Role::System,
            "Enter a new system prompt. Finish with a line containing only '.'; leave it empty to keep the current one.",
        );
        let replacement = ui::read_block()?;
        if replacement.trim().is_empty() {
            ui::print(Role::System, "System prompt update canceled.");
        } else {
            self.config.prompt.system_prompt = replacement;
            tracing::info!("system prompt replaced");
            ui::print(Role::Success, "System prompt updated for this session.");
        }
        Ok(())
    }
}

fn build_provider(config: &Config, api_base: &str) -> anyhow::Result<OpenAiCompatProvider> {
    OpenAiCompatProvider::new(
        api_base,
        &config.provider.api_key,
        Duration::from_secs(config.provider.request_timeout_secs),
    )
    .with_context(|| format!("configuring LLM client for {api_base}"))
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::time::Duration;

    use pretty_assertions::assert_eq;
    use sidekick_core::actions::Action;
    use sidekick_core::approvals::ApprovalCategory;
    use sidekick_core::approvals::ApprovalResponse;
    use sidekick_exec::contracts::CommandResult;

    use super::*;

    struct UnreachableRunner;

    impl CommandRunner for UnreachableRunner {
        fn run(&self, command: &str, _timeout: Duration) -> CommandResult {
            panic!("no command should run, got {command}");
        }
    }

    fn never_asked(_: ApprovalCategory, _: &[&Action]) -> io::Result<ApprovalResponse> {
        panic!("no confirmation should be requested");
    }

    #[test]
    fn slash_commands_are_case_insensitive() {
        assert_eq!(SlashCommand::parse("/HELP"), Some(SlashCommand::Help));
        assert_eq!(SlashCommand::parse(" /Quit "), Some(SlashCommand::Exit));
        assert_eq!(SlashCommand::parse("/exit"), Some(SlashCommand::Exit));
        assert_eq!(SlashCommand::parse("/llm_server"), Some(SlashCommand::LlmServer));
        assert_eq!(
            SlashCommand::parse("/System_Prompt"),
            Some(SlashCommand::SystemPrompt)
        );
        assert_eq!(SlashCommand::parse("/model"), Some(SlashCommand::Model));
    }

    #[test]
    fn unknown_slash_input_goes_to_the_model() {
        assert_eq!(SlashCommand::parse("/frobnicate"), None);
        assert_eq!(SlashCommand::parse("write /help text"), None);
    }

    #[test]
    fn reply_without_fence_touches_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let sandbox = PathSandbox::new(dir.path()).expect("sandbox");
        let runner = UnreachableRunner;
        let executor = PlanExecutor::new(&sandbox, &runner);
        let mut gate = ConfirmationGate::new();
        let mut events = Vec::new();

        let outcome = process_reply(
            "Here is a haiku about rust:\nred flakes on iron",
            &executor,
            &mut gate,
            &mut never_asked,
            &mut |event| events.push(event),
        )
        .expect("process");

        assert!(matches!(outcome, TurnOutcome::Conversation));
        assert!(events.is_empty());
        assert_eq!(gate, ConfirmationGate::new());
        let entries = fs::read_dir(dir.path()).expect("read_dir").count();
        assert_eq!(entries, 0);
    }

    #[test]
    fn broken_plan_is_a_parse_defect_not_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let sandbox = PathSandbox::new(dir.path()).expect("sandbox");
        let runner = UnreachableRunner;
        let executor = PlanExecutor::new(&sandbox, &runner);
        let mut gate = ConfirmationGate::new();

        let outcome = process_reply(
            "```json\n{\"actions\": [\n```",
            &executor,
            &mut gate,
            &mut never_asked,
            &mut |_| {},
        )
        .expect("process");

        match outcome {
            TurnOutcome::ParseDefect(err) => assert!(err.raw().contains("actions")),
            other => panic!("expected parse defect, got {other:?}"),
        }
    }

    #[test]
    fn empty_plan_prompts_for_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let sandbox = PathSandbox::new(dir.path()).expect("sandbox");
        let runner = UnreachableRunner;
        let executor = PlanExecutor::new(&sandbox, &runner);
        let mut gate = ConfirmationGate::new();

        let outcome = process_reply(
            "```json\n{\"actions\": []}\n```",
            &executor,
            &mut gate,
            &mut never_asked,
            &mut |_| {},
        )
        .expect("process");

        match outcome {
            TurnOutcome::Executed(report) => assert_eq!(report, ExecutionReport::default()),
            other => panic!("expected executed, got {other:?}"),
        }
    }

    #[test]
    fn model_menu_is_one_based() {
        let models = vec!["alpha".to_string(), "beta".to_string()];
        assert_eq!(select_model(&models, "2"), Ok("beta"));
        assert_eq!(select_model(&models, " 1\n"), Ok("alpha"));
        assert_eq!(select_model(&models, "0"), Err(ModelChoiceError::OutOfRange));
        assert_eq!(select_model(&models, "3"), Err(ModelChoiceError::OutOfRange));
        assert_eq!(select_model(&models, "beta"), Err(ModelChoiceError::NotANumber));
        assert_eq!(select_model(&models, ""), Err(ModelChoiceError::NotANumber));
    }
}
