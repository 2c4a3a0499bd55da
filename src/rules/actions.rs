use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::models::{Action, ActionType, DepartmentId, Role, Ticket, TicketStatus, UserId};
use crate::notifications::{Notification, NotificationKind, Notifier, Recipient};
use crate::priority::Priority;

/// A field change or notification produced by one action
#[derive(Debug, Clone, PartialEq)]
pub enum AppliedChange {
    Assigned { from: Option<UserId>, to: UserId },
    DepartmentChanged { from: Option<DepartmentId>, to: DepartmentId },
    PriorityChanged { from: Priority, to: Priority },
    StatusChanged { from: TicketStatus, to: TicketStatus },
    TagAdded(String),
    Notified(Recipient),
}

impl AppliedChange {
    fn touches_ticket(&self) -> bool {
        !matches!(self, AppliedChange::Notified(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedAction {
    pub action_type: ActionType,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionOutcome {
    pub applied: Vec<AppliedChange>,
    pub skipped: Vec<SkippedAction>,
}

impl ActionOutcome {
    pub fn ticket_changed(&self) -> bool {
        self.applied.iter().any(AppliedChange::touches_ticket)
    }

    pub fn notifications_sent(&self) -> usize {
        self.applied
            .iter()
            .filter(|c| matches!(c, AppliedChange::Notified(_)))
            .count()
    }
}

/// Why the actions are running; used in notification text
#[derive(Debug, Clone, Copy)]
pub struct ActionContext<'a> {
    pub rule_name: &'a str,
    pub kind: NotificationKind,
}

enum Step {
    Changed(AppliedChange),
    Unchanged,
    Notify(Recipient),
}

/// Applies rule actions to a ticket in order
#[derive(Clone)]
pub struct ActionExecutor {
    notifier: Arc<dyn Notifier>,
}

impl ActionExecutor {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }

    /// Apply `actions` to `ticket`. Invalid actions are skipped and reported;
    /// the rest still run. Persisting the ticket is the caller's job.
    pub async fn execute(
        &self,
        actions: &[Action],
        ticket: &mut Ticket,
        context: ActionContext<'_>,
        now: DateTime<Utc>,
    ) -> ActionOutcome {
        let mut outcome = ActionOutcome::default();

        for action in actions {
            match apply(action, ticket, now) {
                Ok(Step::Changed(change)) => {
                    debug!(ticket.id = ticket.id, change = ?change, "Applied {}", action.action_type);
                    outcome.applied.push(change);
                }
                Ok(Step::Unchanged) => {}
                Ok(Step::Notify(recipient)) => {
                    let notification = Notification {
                        recipient,
                        ticket_id: ticket.id,
                        kind: context.kind,
                        message: format!(
                            "{}: {} \"{}\" ({}, {})",
                            context.rule_name,
                            ticket.ticket_number,
                            ticket.title,
                            ticket.status,
                            ticket.priority
                        ),
                        created_at: now,
                    };
                    match self.notifier.notify(&notification).await {
                        Ok(()) => outcome.applied.push(AppliedChange::Notified(recipient)),
                        Err(e) => {
                            warn!(ticket.id = ticket.id, "Notification failed: {}", e);
                            outcome.skipped.push(SkippedAction {
                                action_type: action.action_type,
                                reason: format!("notification failed: {e}"),
                            });
                        }
                    }
                }
                Err(reason) => {
                    warn!(
                        ticket.id = ticket.id,
                        action = %action.action_type,
                        "Skipping action: {}",
                        reason
                    );
                    outcome.skipped.push(SkippedAction {
                        action_type: action.action_type,
                        reason,
                    });
                }
            }
        }

        if outcome.ticket_changed() {
            ticket.updated_at = now;
        }
        outcome
    }
}

fn value_as_id(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn value_as_str(value: &Value) -> Result<&str, String> {
    value
        .as_str()
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| format!("expected a string value, got {value}"))
}

fn apply(action: &Action, ticket: &mut Ticket, now: DateTime<Utc>) -> Result<Step, String> {
    let step = match action.action_type {
        ActionType::AssignUser => {
            let to = value_as_id(&action.value)
                .ok_or_else(|| format!("expected a user id, got {}", action.value))?;
            if ticket.assignee_id == Some(to) {
                return Ok(Step::Unchanged);
            }
            let from = ticket.assignee_id.replace(to);
            if ticket.status == TicketStatus::Open {
                ticket.status = TicketStatus::Assigned;
            }
            Step::Changed(AppliedChange::Assigned { from, to })
        }
        ActionType::AssignDepartment => {
            let to = value_as_id(&action.value)
                .ok_or_else(|| format!("expected a department id, got {}", action.value))?;
            if ticket.department_id == Some(to) {
                return Ok(Step::Unchanged);
            }
            let from = ticket.department_id.replace(to);
            Step::Changed(AppliedChange::DepartmentChanged { from, to })
        }
        ActionType::ChangePriority => {
            let to: Priority = value_as_str(&action.value)?.parse()?;
            set_priority(ticket, to)
        }
        ActionType::BumpPriority => set_priority(ticket, ticket.priority.bumped()),
        ActionType::ChangeStatus => {
            let to: TicketStatus = value_as_str(&action.value)?.parse()?;
            let from = ticket.status;
            if from == to {
                return Ok(Step::Unchanged);
            }
            ticket.status = to;
            if to == TicketStatus::Resolved && ticket.resolved_at.is_none() {
                ticket.resolved_at = Some(now);
            }
            Step::Changed(AppliedChange::StatusChanged { from, to })
        }
        ActionType::AddTag => {
            let tag = value_as_str(&action.value)?.trim().to_string();
            if ticket.add_tag(&tag) {
                Step::Changed(AppliedChange::TagAdded(tag))
            } else {
                Step::Unchanged
            }
        }
        ActionType::NotifyUser => {
            let user = value_as_id(&action.value)
                .ok_or_else(|| format!("expected a user id, got {}", action.value))?;
            Step::Notify(Recipient::User(user))
        }
        ActionType::NotifyRole => {
            let role: Role = value_as_str(&action.value)?.parse()?;
            Step::Notify(Recipient::Role(role))
        }
        ActionType::NotifyAssignee => match ticket.assignee_id {
            Some(user) => Step::Notify(Recipient::User(user)),
            None => return Err("ticket has no assignee".to_string()),
        },
        ActionType::NotifyRequester => Step::Notify(Recipient::User(ticket.requester_id)),
    };
    Ok(step)
}

fn set_priority(ticket: &mut Ticket, to: Priority) -> Step {
    let from = ticket.priority;
    if from == to {
        return Step::Unchanged;
    }
    ticket.priority = to;
    Step::Changed(AppliedChange::PriorityChanged { from, to })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::{MockNotifier, NotifyError};
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap()
    }

    fn ticket() -> Ticket {
        Ticket::new(9, "Email bouncing", 3, now() - Duration::hours(2))
    }

    fn context() -> ActionContext<'static> {
        ActionContext {
            rule_name: "Stale ticket",
            kind: NotificationKind::Escalation,
        }
    }

    fn quiet_executor() -> ActionExecutor {
        let mut notifier = MockNotifier::new();
        notifier.expect_notify().never();
        ActionExecutor::new(Arc::new(notifier))
    }

    #[tokio::test]
    async fn test_field_actions_apply_in_order() {
        let executor = quiet_executor();
        let mut ticket = ticket();
        let actions = vec![
            Action::new(ActionType::AssignUser, 12),
            Action::new(ActionType::ChangePriority, "high"),
            Action::new(ActionType::BumpPriority, Value::Null),
            Action::new(ActionType::AddTag, "escalated"),
            Action::new(ActionType::AssignDepartment, "4"),
        ];

        let outcome = executor.execute(&actions, &mut ticket, context(), now()).await;

        assert!(outcome.skipped.is_empty());
        assert_eq!(ticket.assignee_id, Some(12));
        assert_eq!(ticket.status, TicketStatus::Assigned);
        assert_eq!(ticket.priority, Priority::Urgent);
        assert_eq!(ticket.department_id, Some(4));
        assert!(ticket.has_tag("escalated"));
        assert_eq!(ticket.updated_at, now());
        assert_eq!(
            outcome.applied[1],
            AppliedChange::PriorityChanged {
                from: Priority::Medium,
                to: Priority::High
            }
        );
    }

    #[tokio::test]
    async fn test_invalid_actions_are_skipped_but_rest_applies() {
        let executor = quiet_executor();
        let mut ticket = ticket();
        let actions = vec![
            Action::new(ActionType::ChangeStatus, "limbo"),
            Action::new(ActionType::AssignUser, json!({"id": 1})),
            Action::new(ActionType::NotifyAssignee, Value::Null),
            Action::new(ActionType::ChangeStatus, "in_progress"),
        ];

        let outcome = executor.execute(&actions, &mut ticket, context(), now()).await;

        assert_eq!(outcome.skipped.len(), 3);
        assert_eq!(outcome.skipped[2].reason, "ticket has no assignee");
        assert_eq!(ticket.status, TicketStatus::InProgress);
    }

    #[tokio::test]
    async fn test_no_op_actions_leave_updated_at_alone() {
        let executor = quiet_executor();
        let mut ticket = ticket();
        let before = ticket.updated_at;
        let actions = vec![
            Action::new(ActionType::ChangePriority, "medium"),
            Action::new(ActionType::ChangeStatus, "open"),
        ];

        let outcome = executor.execute(&actions, &mut ticket, context(), now()).await;

        assert!(!outcome.ticket_changed());
        assert_eq!(ticket.updated_at, before);
    }

    #[tokio::test]
    async fn test_resolving_stamps_resolved_at() {
        let executor = quiet_executor();
        let mut ticket = ticket();
        executor
            .execute(
                &[Action::new(ActionType::ChangeStatus, "resolved")],
                &mut ticket,
                context(),
                now(),
            )
            .await;
        assert_eq!(ticket.resolved_at, Some(now()));
    }

    #[tokio::test]
    async fn test_notifications_are_dispatched() {
        let mut notifier = MockNotifier::new();
        notifier
            .expect_notify()
            .withf(|n| {
                n.ticket_id == 9
                    && n.kind == NotificationKind::Escalation
                    && n.message.starts_with("Stale ticket: TKT-000009")
            })
            .times(2)
            .returning(|_| Ok(()));
        let executor = ActionExecutor::new(Arc::new(notifier));
        let mut ticket = ticket();

        let outcome = executor
            .execute(
                &[
                    Action::new(ActionType::NotifyRole, "admin"),
                    Action::new(ActionType::NotifyRequester, Value::Null),
                ],
                &mut ticket,
                context(),
                now(),
            )
            .await;

        assert_eq!(outcome.notifications_sent(), 2);
        assert_eq!(outcome.applied[0], AppliedChange::Notified(Recipient::Role(Role::Admin)));
        assert_eq!(outcome.applied[1], AppliedChange::Notified(Recipient::User(3)));
        assert!(!outcome.ticket_changed());
    }

    #[tokio::test]
    async fn test_failed_notification_is_reported() {
        let mut notifier = MockNotifier::new();
        notifier.expect_notify().returning(|_| {
            Err(NotifyError::IoError(std::io::Error::other("disk full")))
        });
        let executor = ActionExecutor::new(Arc::new(notifier));
        let mut ticket = ticket();

        let outcome = executor
            .execute(
                &[Action::new(ActionType::NotifyUser, 5)],
                &mut ticket,
                context(),
                now(),
            )
            .await;

        assert_eq!(outcome.notifications_sent(), 0);
        assert!(outcome.skipped[0].reason.contains("disk full"));
    }
}
