use serde::Deserialize;
use serde_json::Value;

use super::approvals::ApprovalCategory;

/// One operation proposed by the model.
///
/// Values are never mutated after decoding; executing an action only touches
/// the filesystem or spawns a process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    CreateFile { path: String, content: String },
    /// Full overwrite, same semantics as `CreateFile`.
    EditFile { path: String, content: String },
    Test { command: String },
    /// Anything without a known `command` tag or with the wrong fields.
    /// Never executed.
    Unrecognized { raw: Value },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
enum WireAction {
    CreateFile { path: String, content: String },
    EditFile { path: String, content: String },
    Test { test_command: String },
}

impl From<WireAction> for Action {
    fn from(wire: WireAction) -> Self {
        match wire {
            WireAction::CreateFile { path, content } => Self::CreateFile { path, content },
            WireAction::EditFile { path, content } => Self::EditFile { path, content },
            WireAction::Test { test_command } => Self::Test {
                command: test_command,
            },
        }
    }
}

impl Action {
    /// Decodes one entry of the `actions` array. Entries that do not match a
    /// known shape become `Unrecognized` instead of failing the whole plan.
    pub fn from_value(value: &Value) -> Self {
        match WireAction::deserialize(value) {
            Ok(wire) => wire.into(),
            Err(_) => Self::Unrecognized { raw: value.clone() },
        }
    }

    pub fn command_name(&self) -> &'static str {
        match self {
            Self::CreateFile { .. } => "create_file",
            Self::EditFile { .. } => "edit_file",
            Self::Test { .. } => "test",
            Self::Unrecognized { .. } => "unrecognized",
        }
    }

    pub fn category(&self) -> Option<ApprovalCategory> {
        match self {
            Self::CreateFile { .. } | Self::EditFile { .. } => Some(ApprovalCategory::Files),
            Self::Test { .. } => Some(ApprovalCategory::Tests),
            Self::Unrecognized { .. } => None,
        }
    }

    /// One-line description used when listing proposals for confirmation.
    pub fn summary(&self) -> String {
        match self {
            Self::CreateFile { path, .. } | Self::EditFile { path, .. } => {
                format!("{} on file '{path}'", self.command_name())
            }
            Self::Test { command } => format!("Run command: `{command}`"),
            Self::Unrecognized { raw } => format!("unrecognized action {raw}"),
        }
    }
}

/// Ordered actions decoded from a single model reply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    actions: Vec<Action>,
}

/// A plan split by approval category, relative order kept inside each part.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct PartitionedPlan<'a> {
    pub file_actions: Vec<&'a Action>,
    pub test_actions: Vec<&'a Action>,
    /// Index into the original plan and the entry itself.
    pub unrecognized: Vec<(usize, &'a Action)>,
}

impl Plan {
    pub fn new(actions: Vec<Action>) -> Self {
        Self { actions }
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn partition(&self) -> PartitionedPlan<'_> {
        let mut partitioned = PartitionedPlan::default();
        for (index, action) in self.actions.iter().enumerate() {
            match action.category() {
                Some(ApprovalCategory::Files) => partitioned.file_actions.push(action),
                Some(ApprovalCategory::Tests) => partitioned.test_actions.push(action),
                None => partitioned.unrecognized.push((index, action)),
            }
        }
        partitioned
    }
}
