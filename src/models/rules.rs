use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use super::{RuleId, TicketId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    GreaterOrEqual,
    LessOrEqual,
    Contains,
    NotContains,
    In,
    NotIn,
    IsEmpty,
    IsNotEmpty,
    Matches,
}

/// A single (field, operator, value) test against a ticket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub operator: Operator,
    #[serde(default)]
    pub value: Value,
}

impl Condition {
    pub fn new(field: &str, operator: Operator, value: impl Into<Value>) -> Self {
        Self {
            field: field.to_string(),
            operator,
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    AssignUser,
    AssignDepartment,
    ChangePriority,
    ChangeStatus,
    BumpPriority,
    AddTag,
    NotifyUser,
    NotifyRole,
    NotifyAssignee,
    NotifyRequester,
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActionType::AssignUser => "assign_user",
            ActionType::AssignDepartment => "assign_department",
            ActionType::ChangePriority => "change_priority",
            ActionType::ChangeStatus => "change_status",
            ActionType::BumpPriority => "bump_priority",
            ActionType::AddTag => "add_tag",
            ActionType::NotifyUser => "notify_user",
            ActionType::NotifyRole => "notify_role",
            ActionType::NotifyAssignee => "notify_assignee",
            ActionType::NotifyRequester => "notify_requester",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "type")]
    pub action_type: ActionType,
    #[serde(default)]
    pub value: Value,
}

impl Action {
    pub fn new(action_type: ActionType, value: impl Into<Value>) -> Self {
        Self {
            action_type,
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    MinutesSinceCreated,
    MinutesSinceUpdated,
    MinutesUnassigned,
    SlaResponseBreached,
    SlaResolutionBreached,
}

/// When an escalation rule becomes eligible. For the SLA kinds `minutes`
/// is a grace period past the due time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationTrigger {
    pub kind: TriggerKind,
    #[serde(default)]
    pub minutes: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationRule {
    pub id: RuleId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub trigger: EscalationTrigger,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub actions: Vec<Action>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_true")]
    pub active: bool,
}

/// Ticket lifecycle events automation rules listen on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketEvent {
    Created,
    Updated,
    StatusChanged,
    Assigned,
    ApprovalCompleted,
}

impl TicketEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            TicketEvent::Created => "created",
            TicketEvent::Updated => "updated",
            TicketEvent::StatusChanged => "status_changed",
            TicketEvent::Assigned => "assigned",
            TicketEvent::ApprovalCompleted => "approval_completed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationRule {
    pub id: RuleId,
    pub name: String,
    pub event: TicketEvent,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub actions: Vec<Action>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_true")]
    pub active: bool,
    /// Skip lower-priority rules once this one fires
    #[serde(default)]
    pub stop_processing: bool,
}

/// A rule that already fired for a ticket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationRecord {
    pub rule_id: RuleId,
    pub ticket_id: TicketId,
    pub fired_at: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}
