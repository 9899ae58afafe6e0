//! Workflow step tree.
//!
//! A workflow is an ordered list of steps where CONDITION steps own two
//! nested lists (`yesSteps` / `noSteps`). Successor lookup walks the tree
//! recursively: the step after the last step of a branch is the successor of
//! the CONDITION that owns the branch, and so on up to the root. Running off
//! the end of the root list ends the workflow.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub id: String,
    #[serde(flatten)]
    pub action: StepAction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum StepAction {
    Start,
    Email {
        template_id: Uuid,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subject: Option<String>,
    },
    Delay {
        #[serde(default)]
        duration: u64,
        #[serde(default)]
        unit: DelayUnit,
    },
    Condition {
        field: String,
        operator: ConditionOperator,
        #[serde(default)]
        value: Value,
        #[serde(default)]
        yes_steps: Vec<WorkflowStep>,
        #[serde(default)]
        no_steps: Vec<WorkflowStep>,
    },
    Tag {
        #[serde(default)]
        action: TagAction,
        tag: String,
    },
    Assign {
        agent_id: AgentTarget,
    },
    #[serde(other)]
    Unknown,
}

impl StepAction {
    pub fn kind(&self) -> &'static str {
        match self {
            StepAction::Start => "START",
            StepAction::Email { .. } => "EMAIL",
            StepAction::Delay { .. } => "DELAY",
            StepAction::Condition { .. } => "CONDITION",
            StepAction::Tag { .. } => "TAG",
            StepAction::Assign { .. } => "ASSIGN",
            StepAction::Unknown => "UNKNOWN",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DelayUnit {
    Minutes,
    #[default]
    Hours,
    Days,
}

impl DelayUnit {
    pub fn seconds(&self) -> u64 {
        match self {
            DelayUnit::Minutes => 60,
            DelayUnit::Hours => 3_600,
            DelayUnit::Days => 86_400,
        }
    }
}

impl From<String> for DelayUnit {
    fn from(raw: String) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "minute" | "minutes" => DelayUnit::Minutes,
            "day" | "days" => DelayUnit::Days,
            _ => DelayUnit::Hours,
        }
    }
}

impl From<DelayUnit> for String {
    fn from(unit: DelayUnit) -> Self {
        match unit {
            DelayUnit::Minutes => "minutes",
            DelayUnit::Hours => "hours",
            DelayUnit::Days => "days",
        }
        .to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ConditionOperator {
    Equals,
    GreaterThan,
    Contains,
    NotEmpty,
    /// Never matches.
    Unsupported(String),
}

impl From<String> for ConditionOperator {
    fn from(raw: String) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "equals" => ConditionOperator::Equals,
            "greater_than" => ConditionOperator::GreaterThan,
            "contains" => ConditionOperator::Contains,
            "not_empty" => ConditionOperator::NotEmpty,
            _ => ConditionOperator::Unsupported(raw),
        }
    }
}

impl From<ConditionOperator> for String {
    fn from(op: ConditionOperator) -> Self {
        match op {
            ConditionOperator::Equals => "equals".to_string(),
            ConditionOperator::GreaterThan => "greater_than".to_string(),
            ConditionOperator::Contains => "contains".to_string(),
            ConditionOperator::NotEmpty => "not_empty".to_string(),
            ConditionOperator::Unsupported(raw) => raw,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TagAction {
    #[default]
    Add,
    Remove,
}

impl From<String> for TagAction {
    fn from(raw: String) -> Self {
        if raw.trim().eq_ignore_ascii_case("remove") {
            TagAction::Remove
        } else {
            TagAction::Add
        }
    }
}

impl From<TagAction> for String {
    fn from(action: TagAction) -> Self {
        match action {
            TagAction::Add => "add".to_string(),
            TagAction::Remove => "remove".to_string(),
        }
    }
}

/// `"auto"` selects round robin; anything else must be an agent id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AgentTarget {
    Auto,
    Agent(Uuid),
    Invalid(String),
}

impl From<String> for AgentTarget {
    fn from(raw: String) -> Self {
        let trimmed = raw.trim();
        if trimmed.eq_ignore_ascii_case("auto") {
            return AgentTarget::Auto;
        }
        match Uuid::parse_str(trimmed) {
            Ok(id) => AgentTarget::Agent(id),
            Err(_) => AgentTarget::Invalid(raw),
        }
    }
}

impl From<AgentTarget> for String {
    fn from(target: AgentTarget) -> Self {
        match target {
            AgentTarget::Auto => "auto".to_string(),
            AgentTarget::Agent(id) => id.to_string(),
            AgentTarget::Invalid(raw) => raw,
        }
    }
}

/// Where execution goes after a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextStep<'a> {
    Step(&'a str),
    End,
}

impl<'a> NextStep<'a> {
    pub fn step_id(&self) -> Option<&'a str> {
        match self {
            NextStep::Step(id) => Some(id),
            NextStep::End => None,
        }
    }

    fn from_option(id: Option<&'a str>) -> Self {
        id.map_or(NextStep::End, NextStep::Step)
    }
}

/// Enrollment entry point: the first START step at the root, else the first step.
pub fn entry_step_id(steps: &[WorkflowStep]) -> Option<&str> {
    steps
        .iter()
        .find(|s| matches!(s.action, StepAction::Start))
        .or_else(|| steps.first())
        .map(|s| s.id.as_str())
}

pub fn find_step<'a>(steps: &'a [WorkflowStep], id: &str) -> Option<&'a WorkflowStep> {
    for step in steps {
        if step.id == id {
            return Some(step);
        }
        if let StepAction::Condition {
            yes_steps,
            no_steps,
            ..
        } = &step.action
        {
            if let Some(found) = find_step(yes_steps, id).or_else(|| find_step(no_steps, id)) {
                return Some(found);
            }
        }
    }
    None
}

/// Successor of `id` in document order, rejoining parent lists at branch ends.
/// `None` means `id` is not in the tree at all.
pub fn successor_of<'a>(steps: &'a [WorkflowStep], id: &str) -> Option<NextStep<'a>> {
    for (index, step) in steps.iter().enumerate() {
        let following = steps.get(index + 1).map(|s| s.id.as_str());
        if step.id == id {
            return Some(NextStep::from_option(following));
        }
        if let StepAction::Condition {
            yes_steps,
            no_steps,
            ..
        } = &step.action
        {
            for branch in [yes_steps, no_steps] {
                if let Some(next) = successor_of(branch, id) {
                    return Some(match next {
                        NextStep::Step(_) => next,
                        NextStep::End => NextStep::from_option(following),
                    });
                }
            }
        }
    }
    None
}

/// Resolves the step that follows `current`. For a CONDITION, `branch` carries
/// the evaluation result; an empty selected branch falls through to the
/// condition's own successor.
pub fn resolve_next<'a>(
    root: &'a [WorkflowStep],
    current: &'a WorkflowStep,
    branch: Option<bool>,
) -> NextStep<'a> {
    if let (
        StepAction::Condition {
            yes_steps,
            no_steps,
            ..
        },
        Some(matched),
    ) = (&current.action, branch)
    {
        let selected = if matched { yes_steps } else { no_steps };
        if let Some(first) = selected.first() {
            return NextStep::Step(first.id.as_str());
        }
    }
    successor_of(root, &current.id).unwrap_or(NextStep::End)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tree() -> Vec<WorkflowStep> {
        serde_json::from_value(json!([
            { "id": "start", "type": "START" },
            { "id": "welcome", "type": "EMAIL", "templateId": "6f1c1a58-8f4a-4bde-9d7c-2d9d5f6c0a11" },
            {
                "id": "is-hot", "type": "CONDITION",
                "field": "leadScore", "operator": "greater_than", "value": 10,
                "yesSteps": [
                    { "id": "tag-hot", "type": "TAG", "tag": "hot" },
                    { "id": "assign", "type": "ASSIGN", "agentId": "auto" }
                ],
                "noSteps": []
            },
            { "id": "wait", "type": "DELAY", "duration": 2, "unit": "hours" },
            { "id": "last", "type": "TAG", "action": "remove", "tag": "new" }
        ]))
        .unwrap()
    }

    #[test]
    fn test_deserializes_typed_steps() {
        let steps = tree();
        assert_eq!(steps.len(), 5);
        assert_eq!(
            steps[3].action,
            StepAction::Delay {
                duration: 2,
                unit: DelayUnit::Hours
            }
        );
        match &steps[2].action {
            StepAction::Condition {
                operator,
                yes_steps,
                no_steps,
                ..
            } => {
                assert_eq!(*operator, ConditionOperator::GreaterThan);
                assert_eq!(yes_steps.len(), 2);
                assert!(no_steps.is_empty());
                assert_eq!(
                    yes_steps[1].action,
                    StepAction::Assign {
                        agent_id: AgentTarget::Auto
                    }
                );
            }
            other => panic!("expected condition, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_step_type_is_tolerated() {
        let steps: Vec<WorkflowStep> =
            serde_json::from_value(json!([{ "id": "x", "type": "SMS", "body": "hi" }])).unwrap();
        assert_eq!(steps[0].action, StepAction::Unknown);
    }

    #[test]
    fn test_entry_prefers_start_step() {
        let steps = tree();
        assert_eq!(entry_step_id(&steps), Some("start"));
        assert_eq!(entry_step_id(&steps[1..]), Some("welcome"));
        assert_eq!(entry_step_id(&[]), None);
    }

    #[test]
    fn test_find_step_descends_into_branches() {
        let steps = tree();
        assert_eq!(find_step(&steps, "assign").map(|s| s.id.as_str()), Some("assign"));
        assert!(find_step(&steps, "missing").is_none());
    }

    #[test]
    fn test_successor_inside_branch() {
        let steps = tree();
        assert_eq!(successor_of(&steps, "tag-hot"), Some(NextStep::Step("assign")));
    }

    #[test]
    fn test_branch_end_rejoins_parent_sibling() {
        let steps = tree();
        assert_eq!(successor_of(&steps, "assign"), Some(NextStep::Step("wait")));
    }

    #[test]
    fn test_last_root_step_ends() {
        let steps = tree();
        assert_eq!(successor_of(&steps, "last"), Some(NextStep::End));
        assert_eq!(successor_of(&steps, "nope"), None);
    }

    #[test]
    fn test_condition_takes_first_step_of_matching_branch() {
        let steps = tree();
        let condition = find_step(&steps, "is-hot").unwrap();
        assert_eq!(
            resolve_next(&steps, condition, Some(true)),
            NextStep::Step("tag-hot")
        );
    }

    #[test]
    fn test_condition_with_empty_branch_falls_through() {
        let steps = tree();
        let condition = find_step(&steps, "is-hot").unwrap();
        assert_eq!(
            resolve_next(&steps, condition, Some(false)),
            NextStep::Step("wait")
        );
    }

    #[test]
    fn test_nested_branch_end_unwinds_two_levels() {
        let steps: Vec<WorkflowStep> = serde_json::from_value(json!([
            {
                "id": "outer", "type": "CONDITION", "field": "email", "operator": "not_empty",
                "yesSteps": [{
                    "id": "inner", "type": "CONDITION", "field": "phone", "operator": "not_empty",
                    "noSteps": [{ "id": "deep", "type": "TAG", "tag": "no-phone" }]
                }]
            },
            { "id": "after", "type": "DELAY", "duration": 1, "unit": "days" }
        ]))
        .unwrap();
        assert_eq!(successor_of(&steps, "deep"), Some(NextStep::Step("after")));
    }

    #[test]
    fn test_delay_unit_parsing_defaults_to_hours() {
        assert_eq!(DelayUnit::from("Minutes".to_string()), DelayUnit::Minutes);
        assert_eq!(DelayUnit::from("days".to_string()), DelayUnit::Days);
        assert_eq!(DelayUnit::from("fortnights".to_string()), DelayUnit::Hours);
    }

    #[test]
    fn test_agent_target_parsing() {
        let id = Uuid::new_v4();
        assert_eq!(AgentTarget::from("AUTO".to_string()), AgentTarget::Auto);
        assert_eq!(AgentTarget::from(id.to_string()), AgentTarget::Agent(id));
        assert!(matches!(
            AgentTarget::from("bob".to_string()),
            AgentTarget::Invalid(_)
        ));
    }
}
