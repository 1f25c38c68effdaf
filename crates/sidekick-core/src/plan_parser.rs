use serde_json::Value;

use super::actions::Action;
use super::actions::Plan;
use super::error::PlanParseError;

pub const PLAN_FENCE_OPEN: &str = "```json";
pub const FENCE_CLOSE: &str = "```";

/// Returns the body of the first ```` ```json ```` block, if any.
///
/// Only the first block counts; any later fenced blocks are ignored so the
/// same reply always yields the same plan. A block with no closing fence
/// runs to the end of the reply.
pub fn extract_plan_block(raw: &str) -> Option<&str> {
    let start = raw.find(PLAN_FENCE_OPEN)? + PLAN_FENCE_OPEN.len();
    let rest = &raw[start..];
    let body = match rest.find(FENCE_CLOSE) {
        Some(end) => &rest[..end],
        None => rest,
    };
    Some(body.trim())
}

/// Turns a raw model reply into a plan.
///
/// `Ok(None)` means the reply is plain conversation and should be shown
/// verbatim.
pub fn parse_reply(raw: &str) -> Result<Option<Plan>, PlanParseError> {
    let Some(body) = extract_plan_block(raw) else {
        return Ok(None);
    };

    let document: Value = serde_json::from_str(body).map_err(|err| PlanParseError::Decode {
        message: err.to_string(),
        raw: raw.to_string(),
    })?;

    let shape_error = |message: &str| PlanParseError::Shape {
        message: message.to_string(),
        raw: raw.to_string(),
    };

    let Some(object) = document.as_object() else {
        return Err(shape_error("top-level value is not an object"));
    };
    let Some(actions) = object.get("actions") else {
        return Err(shape_error("missing `actions` key"));
    };
    let Some(entries) = actions.as_array() else {
        return Err(shape_error("`actions` is not an array"));
    };

    let actions = entries.iter().map(Action::from_value).collect();
    Ok(Some(Plan::new(actions)))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn plain_reply_has_no_plan() {
        let reply = "Here is a poem about the sea.\nWaves come and go.";
        assert_eq!(parse_reply(reply), Ok(None));
    }

    #[test]
    fn untagged_fence_is_not_a_plan() {
        let reply = "Try this:\n```\nls -la\n```";
        assert_eq!(parse_reply(reply), Ok(None));
    }

    #[test]
    fn parses_first_json_block() {
        let reply = "Sure.\n```json\n{\"actions\": [{\"command\": \"create_file\", \"path\": \"notes.txt\", \"content\": \"hello\"}]}\n```\nDone.";
        let plan = parse_reply(reply).expect("parse").expect("plan");
        assert_eq!(
            plan.actions(),
            &[Action::CreateFile {
                path: "notes.txt".to_string(),
                content: "hello".to_string(),
            }]
        );
    }

    #[test]
    fn later_blocks_are_ignored() {
        let reply = concat!(
            "```json\n{\"actions\": [{\"command\": \"test\", \"test_command\": \"echo one\"}]}\n```\n",
            "```json\n{\"actions\": [{\"command\": \"test\", \"test_command\": \"echo two\"}]}\n```\n",
        );
        let plan = parse_reply(reply).expect("parse").expect("plan");
        assert_eq!(
            plan.actions(),
            &[Action::Test {
                command: "echo one".to_string(),
            }]
        );
    }

    #[test]
    fn unterminated_block_runs_to_end_of_reply() {
        let reply = "```json\n{\"actions\": []}\n";
        let plan = parse_reply(reply).expect("parse").expect("plan");
        assert!(plan.is_empty());
    }

    #[test]
    fn malformed_json_is_a_decode_error_with_raw_reply() {
        let reply = "```json\n{\"actions\": [\n```";
        let err = parse_reply(reply).expect_err("decode error");
        assert!(matches!(err, PlanParseError::Decode { .. }));
        assert_eq!(err.raw(), reply);
    }

    #[test]
    fn missing_actions_key_is_a_shape_error() {
        let reply = "```json\n{\"steps\": []}\n```";
        let err = parse_reply(reply).expect_err("shape error");
        assert!(matches!(err, PlanParseError::Shape { .. }));
        assert_eq!(err.raw(), reply);
    }

    #[test]
    fn non_object_and_non_array_shapes_are_rejected() {
        for reply in ["```json\n[1, 2]\n```", "```json\n{\"actions\": \"all\"}\n```"] {
            let err = parse_reply(reply).expect_err("shape error");
            assert!(matches!(err, PlanParseError::Shape { .. }), "{reply}");
        }
    }

    #[test]
    fn unknown_entries_survive_as_unrecognized() {
        let reply = "```json\n{\"actions\": [{\"command\": \"rm\", \"path\": \"/\"}, {\"command\": \"test\", \"test_command\": \"true\"}]}\n```";
        let plan = parse_reply(reply).expect("parse").expect("plan");
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.actions()[0].command_name(), "unrecognized");
        assert_eq!(plan.actions()[1].command_name(), "test");
    }
}
