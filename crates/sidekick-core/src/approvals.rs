use std::io;

use super::actions::Action;

/// Independently gated groups of actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalCategory {
    Files,
    Tests,
}

impl ApprovalCategory {
    pub fn label(self) -> &'static str {
        match self {
            Self::Files => "files",
            Self::Tests => "tests",
        }
    }
}

/// Per-category gate state. `AlwaysAllow` is terminal for the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GateState {
    #[default]
    Ask,
    AlwaysAllow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalResponse {
    Yes,
    No,
    Always,
}

impl ApprovalResponse {
    /// `y`/`yes` approve once, `always` approves for the rest of the
    /// session, anything else (including an empty line) declines.
    pub fn parse(input: &str) -> Self {
        match input.trim().to_ascii_lowercase().as_str() {
            "y" | "yes" => Self::Yes,
            "always" => Self::Always,
            _ => Self::No,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Yes => "yes",
            Self::No => "no",
            Self::Always => "always",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authorization {
    Authorized,
    Declined,
}

/// Asks the user about one batch of proposed actions.
///
/// Implementations must show every action before reading a single response.
pub trait Confirm {
    fn confirm(
        &mut self,
        category: ApprovalCategory,
        actions: &[&Action],
    ) -> io::Result<ApprovalResponse>;
}

impl<F> Confirm for F
where
    F: FnMut(ApprovalCategory, &[&Action]) -> io::Result<ApprovalResponse>,
{
    fn confirm(
        &mut self,
        category: ApprovalCategory,
        actions: &[&Action],
    ) -> io::Result<ApprovalResponse> {
        self(category, actions)
    }
}

/// Session-scoped confirmation policy: one state machine for file changes
/// and one for test commands. A new session means a new gate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfirmationGate {
    files: GateState,
    tests: GateState,
}

impl ConfirmationGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, category: ApprovalCategory) -> GateState {
        match category {
            ApprovalCategory::Files => self.files,
            ApprovalCategory::Tests => self.tests,
        }
    }

    fn state_mut(&mut self, category: ApprovalCategory) -> &mut GateState {
        match category {
            ApprovalCategory::Files => &mut self.files,
            ApprovalCategory::Tests => &mut self.tests,
        }
    }

    /// Prompts at most once per call. In `AlwaysAllow` the prompt is skipped.
    pub fn authorize(
        &mut self,
        category: ApprovalCategory,
        actions: &[&Action],
        confirm: &mut dyn Confirm,
    ) -> io::Result<Authorization> {
        if self.state(category) == GateState::AlwaysAllow {
            tracing::debug!(category = category.label(), "auto-approved");
            return Ok(Authorization::Authorized);
        }

        let response = confirm.confirm(category, actions)?;
        tracing::info!(
            category = category.label(),
            actions = actions.len(),
            response = response.label(),
            "confirmation answered"
        );
        match response {
            ApprovalResponse::Yes => Ok(Authorization::Authorized),
            ApprovalResponse::Always => {
                *self.state_mut(category) = GateState::AlwaysAllow;
                Ok(Authorization::Authorized)
            }
            ApprovalResponse::No => Ok(Authorization::Declined),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn test_action() -> Action {
        Action::Test {
            command: "true".to_string(),
        }
    }

    #[test]
    fn parses_responses_case_insensitively() {
        assert_eq!(ApprovalResponse::parse("y"), ApprovalResponse::Yes);
        assert_eq!(ApprovalResponse::parse(" YES \n"), ApprovalResponse::Yes);
        assert_eq!(ApprovalResponse::parse("Always"), ApprovalResponse::Always);
        assert_eq!(ApprovalResponse::parse(""), ApprovalResponse::No);
        assert_eq!(ApprovalResponse::parse("n"), ApprovalResponse::No);
        assert_eq!(ApprovalResponse::parse("sure"), ApprovalResponse::No);
    }

    #[test]
    fn yes_and_no_leave_gate_in_ask() {
        let action = test_action();
        let mut gate = ConfirmationGate::new();
        let mut answers = vec![ApprovalResponse::No, ApprovalResponse::Yes].into_iter();
        let mut confirm = |_: ApprovalCategory, _: &[&Action]| -> io::Result<ApprovalResponse> {
            Ok(answers.next().expect("answer"))
        };

        let first = gate.authorize(ApprovalCategory::Tests, &[&action], &mut confirm);
        assert_eq!(first.expect("authorize"), Authorization::Declined);
        assert_eq!(gate.state(ApprovalCategory::Tests), GateState::Ask);

        let second = gate.authorize(ApprovalCategory::Tests, &[&action], &mut confirm);
        assert_eq!(second.expect("authorize"), Authorization::Authorized);
        assert_eq!(gate.state(ApprovalCategory::Tests), GateState::Ask);
    }

    #[test]
    fn always_is_monotone_and_skips_future_prompts() {
        let action = test_action();
        let mut gate = ConfirmationGate::new();
        let mut prompts = 0;
        let mut confirm = |_: ApprovalCategory, _: &[&Action]| -> io::Result<ApprovalResponse> {
            prompts += 1;
            Ok(ApprovalResponse::Always)
        };

        for _ in 0..5 {
            let outcome = gate
                .authorize(ApprovalCategory::Files, &[&action], &mut confirm)
                .expect("authorize");
            assert_eq!(outcome, Authorization::Authorized);
            assert_eq!(gate.state(ApprovalCategory::Files), GateState::AlwaysAllow);
        }
        assert_eq!(prompts, 1);
        assert_eq!(gate.state(ApprovalCategory::Tests), GateState::Ask);
    }

    #[test]
    fn prompt_receives_the_whole_batch() {
        let first = test_action();
        let second = Action::Test {
            command: "echo ok".to_string(),
        };
        let mut gate = ConfirmationGate::new();
        let mut seen = Vec::new();
        let mut confirm =
            |category: ApprovalCategory, actions: &[&Action]| -> io::Result<ApprovalResponse> {
                seen.push((category, actions.len()));
                Ok(ApprovalResponse::No)
            };

        gate.authorize(ApprovalCategory::Tests, &[&first, &second], &mut confirm)
            .expect("authorize");
        assert_eq!(seen, vec![(ApprovalCategory::Tests, 2)]);
    }

    #[test]
    fn prompt_failure_propagates_without_changing_state() {
        let action = test_action();
        let mut gate = ConfirmationGate::new();
        let mut confirm = |_: ApprovalCategory, _: &[&Action]| -> io::Result<ApprovalResponse> {
            Err(io::Error::new(io::ErrorKind::UnexpectedEof, "stdin closed"))
        };

        let result = gate.authorize(ApprovalCategory::Files, &[&action], &mut confirm);
        assert!(result.is_err());
        assert_eq!(gate, ConfirmationGate::new());
    }
}
