use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, Instrument};

use super::EscalationError;
use crate::models::{EscalationRecord, EscalationRule, EscalationTrigger, RuleId, Ticket, TicketId, TriggerKind};
use crate::notifications::{NotificationKind, Notifier};
use crate::observability::{workflow_metrics, OperationTimer};
use crate::rules::{ActionContext, ActionExecutor, ConditionEvaluator};
use crate::sla::{policy_for, SlaClock, SlaPolicy};
use crate::store::{HelpdeskStore, StoreError};
use crate::telemetry::generate_correlation_id;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FiredEscalation {
    pub rule_id: RuleId,
    pub rule_name: String,
    pub ticket_id: TicketId,
    pub changes: usize,
    pub notifications: usize,
    pub skipped_actions: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EscalationReport {
    pub rules_evaluated: usize,
    pub tickets_scanned: usize,
    pub fired: Vec<FiredEscalation>,
    pub failures: usize,
}

/// Whether a rule's time trigger has elapsed for a ticket
pub fn trigger_elapsed(
    trigger: &EscalationTrigger,
    ticket: &Ticket,
    policies: &[SlaPolicy],
    now: DateTime<Utc>,
) -> bool {
    match trigger.kind {
        TriggerKind::MinutesSinceCreated => ticket.minutes_since_created(now) > trigger.minutes,
        TriggerKind::MinutesSinceUpdated => ticket.minutes_since_updated(now) > trigger.minutes,
        TriggerKind::MinutesUnassigned => {
            ticket.assignee_id.is_none() && ticket.minutes_since_created(now) > trigger.minutes
        }
        TriggerKind::SlaResponseBreached => policy_for(policies, ticket)
            .is_some_and(|p| SlaClock::new(p, ticket).response_breached(now, trigger.minutes)),
        TriggerKind::SlaResolutionBreached => policy_for(policies, ticket)
            .is_some_and(|p| SlaClock::new(p, ticket).resolution_breached(now, trigger.minutes)),
    }
}

/// Evaluates active escalation rules against open tickets
pub struct EscalationChecker {
    store: Arc<dyn HelpdeskStore>,
    evaluator: ConditionEvaluator,
    executor: ActionExecutor,
}

impl EscalationChecker {
    pub fn new(store: Arc<dyn HelpdeskStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            store,
            evaluator: ConditionEvaluator::new(),
            executor: ActionExecutor::new(notifier),
        }
    }

    /// One pass over every open ticket. Per-ticket failures are logged and
    /// counted; loading rules or tickets failing aborts the pass.
    pub async fn run(&self, now: DateTime<Utc>) -> Result<EscalationReport, EscalationError> {
        let correlation_id = generate_correlation_id();
        let span = tracing::info_span!(
            "escalation_run",
            correlation.id = %correlation_id,
            otel.kind = "internal"
        );

        async move {
            let timer = OperationTimer::new("escalation_run");
            let rules = self.store.active_escalation_rules().await?;
            let mut report = EscalationReport {
                rules_evaluated: rules.len(),
                ..Default::default()
            };

            if rules.is_empty() {
                debug!("No active escalation rules");
                return Ok(report);
            }

            let policies = self.store.sla_policies().await?;
            let tickets = self.store.open_tickets().await?;
            report.tickets_scanned = tickets.len();

            for ticket in tickets {
                let ticket_id = ticket.id;
                match self.check_ticket(ticket, &rules, &policies, now).await {
                    Ok(mut fired) => report.fired.append(&mut fired),
                    Err(e) => {
                        error!(ticket.id = ticket_id, "Escalation check failed: {}", e);
                        workflow_metrics().record_escalation_failure();
                        report.failures += 1;
                    }
                }
            }

            info!(
                rules = report.rules_evaluated,
                tickets = report.tickets_scanned,
                fired = report.fired.len(),
                failures = report.failures,
                "Escalation run complete"
            );
            timer.finish();
            Ok(report)
        }
        .instrument(span)
        .await
    }

    async fn check_ticket(
        &self,
        original: Ticket,
        rules: &[EscalationRule],
        policies: &[SlaPolicy],
        now: DateTime<Utc>,
    ) -> Result<Vec<FiredEscalation>, StoreError> {
        let mut ticket = original.clone();
        let mut fired = Vec::new();

        for rule in rules {
            // An earlier rule may have closed the ticket
            if !ticket.status.is_open() {
                break;
            }
            // Time triggers read the ticket as it was at the start of the run
            if !trigger_elapsed(&rule.trigger, &original, policies, now) {
                continue;
            }
            if !self.evaluator.matches_all(&rule.conditions, &ticket, now) {
                continue;
            }
            if self.store.escalation_fired(rule.id, ticket.id).await? {
                debug!(rule.id = rule.id, ticket.id = ticket.id, "Escalation already fired");
                continue;
            }

            let outcome = self
                .executor
                .execute(
                    &rule.actions,
                    &mut ticket,
                    ActionContext {
                        rule_name: &rule.name,
                        kind: NotificationKind::Escalation,
                    },
                    now,
                )
                .await;

            // A logged firing always has its changes persisted
            if outcome.ticket_changed() {
                self.store.save_ticket(&ticket).await?;
            }
            self.store
                .record_escalation(EscalationRecord {
                    rule_id: rule.id,
                    ticket_id: ticket.id,
                    fired_at: now,
                })
                .await?;
            workflow_metrics().record_escalation();

            info!(
                rule.id = rule.id,
                rule.name = %rule.name,
                ticket.id = ticket.id,
                changes = outcome.applied.len() - outcome.notifications_sent(),
                notifications = outcome.notifications_sent(),
                "Escalation fired"
            );

            fired.push(FiredEscalation {
                rule_id: rule.id,
                rule_name: rule.name.clone(),
                ticket_id: ticket.id,
                changes: outcome.applied.len() - outcome.notifications_sent(),
                notifications: outcome.notifications_sent(),
                skipped_actions: outcome.skipped.len(),
            });
        }

        Ok(fired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        Action, ActionType, ApprovalId, AutomationRule, Category, CategoryId, Condition,
        Department, DepartmentId, Operator, Role, TicketApproval, TicketEvent, TicketStatus, User,
        UserId,
    };
    use crate::notifications::LogNotifier;
    use crate::priority::Priority;
    use crate::store::{MemoryStore, Snapshot};
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap()
    }

    fn trigger(kind: TriggerKind, minutes: i64) -> EscalationTrigger {
        EscalationTrigger { kind, minutes }
    }

    fn aged_ticket(id: TicketId, age_minutes: i64) -> Ticket {
        Ticket::new(id, "Cannot log in", 1, now() - Duration::minutes(age_minutes))
    }

    #[test]
    fn test_time_triggers_are_strict() {
        let ticket = aged_ticket(1, 60);
        assert!(!trigger_elapsed(&trigger(TriggerKind::MinutesSinceCreated, 60), &ticket, &[], now()));
        assert!(trigger_elapsed(&trigger(TriggerKind::MinutesSinceCreated, 59), &ticket, &[], now()));
        assert!(trigger_elapsed(&trigger(TriggerKind::MinutesSinceUpdated, 30), &ticket, &[], now()));
    }

    #[test]
    fn test_unassigned_trigger_ignores_assigned_tickets() {
        let mut ticket = aged_ticket(1, 120);
        let unassigned = trigger(TriggerKind::MinutesUnassigned, 60);
        assert!(trigger_elapsed(&unassigned, &ticket, &[], now()));

        ticket.assignee_id = Some(4);
        assert!(!trigger_elapsed(&unassigned, &ticket, &[], now()));
    }

    #[test]
    fn test_sla_triggers_need_a_policy() {
        let ticket = aged_ticket(1, 120);
        let breach = trigger(TriggerKind::SlaResponseBreached, 0);
        assert!(!trigger_elapsed(&breach, &ticket, &[], now()));

        let policies = vec![SlaPolicy {
            id: 1,
            name: "Standard".into(),
            priority: Priority::Medium,
            response_minutes: 60,
            resolution_minutes: 600,
            active: true,
        }];
        assert!(trigger_elapsed(&breach, &ticket, &policies, now()));
        assert!(!trigger_elapsed(
            &trigger(TriggerKind::SlaResolutionBreached, 0),
            &ticket,
            &policies,
            now()
        ));
    }

    fn escalation_rule(id: RuleId, priority: i32, conditions: Vec<Condition>, actions: Vec<Action>) -> EscalationRule {
        EscalationRule {
            id,
            name: format!("escalation {id}"),
            description: String::new(),
            trigger: trigger(TriggerKind::MinutesSinceCreated, 30),
            conditions,
            actions,
            priority,
            active: true,
        }
    }

    #[tokio::test]
    async fn test_run_fires_matching_rules_once() {
        let mut closed = aged_ticket(3, 600);
        closed.status = TicketStatus::Closed;
        let store = Arc::new(MemoryStore::with_snapshot(Snapshot {
            tickets: vec![aged_ticket(1, 45), aged_ticket(2, 10), closed],
            escalation_rules: vec![escalation_rule(
                1,
                5,
                vec![Condition::new("status", Operator::Equals, "open")],
                vec![Action::new(ActionType::BumpPriority, serde_json::Value::Null)],
            )],
            ..Default::default()
        }));
        let checker = EscalationChecker::new(store.clone(), Arc::new(LogNotifier));

        let report = checker.run(now()).await.unwrap();
        assert_eq!(report.tickets_scanned, 2);
        assert_eq!(report.fired.len(), 1);
        assert_eq!(report.fired[0].ticket_id, 1);
        assert_eq!(store.ticket(1).await.unwrap().priority, Priority::High);
        assert_eq!(store.ticket(2).await.unwrap().priority, Priority::Medium);

        // Second pass does not re-fire
        let report = checker.run(now() + Duration::minutes(15)).await.unwrap();
        assert!(report.fired.is_empty());
        assert_eq!(store.ticket(1).await.unwrap().priority, Priority::High);
    }

    #[tokio::test]
    async fn test_rules_fire_in_descending_priority() {
        let store = Arc::new(MemoryStore::with_snapshot(Snapshot {
            tickets: vec![aged_ticket(1, 90)],
            escalation_rules: vec![
                escalation_rule(1, 1, vec![], vec![Action::new(ActionType::AddTag, "low")]),
                escalation_rule(2, 10, vec![], vec![Action::new(ActionType::AddTag, "high")]),
            ],
            ..Default::default()
        }));
        let checker = EscalationChecker::new(store.clone(), Arc::new(LogNotifier));

        let report = checker.run(now()).await.unwrap();
        let order: Vec<RuleId> = report.fired.iter().map(|f| f.rule_id).collect();
        assert_eq!(order, vec![2, 1]);
        assert_eq!(store.ticket(1).await.unwrap().tags, vec!["high".to_string(), "low".to_string()]);
    }

    #[tokio::test]
    async fn test_closing_rule_stops_later_rules() {
        let store = Arc::new(MemoryStore::with_snapshot(Snapshot {
            tickets: vec![aged_ticket(1, 90)],
            escalation_rules: vec![
                escalation_rule(1, 10, vec![], vec![Action::new(ActionType::ChangeStatus, "cancelled")]),
                escalation_rule(2, 1, vec![], vec![Action::new(ActionType::AddTag, "late")]),
            ],
            ..Default::default()
        }));
        let checker = EscalationChecker::new(store.clone(), Arc::new(LogNotifier));

        let report = checker.run(now()).await.unwrap();
        assert_eq!(report.fired.len(), 1);
        let ticket = store.ticket(1).await.unwrap();
        assert_eq!(ticket.status, TicketStatus::Cancelled);
        assert!(ticket.tags.is_empty());
    }

    #[tokio::test]
    async fn test_no_rules_skips_ticket_scan() {
        let store = Arc::new(MemoryStore::with_snapshot(Snapshot {
            tickets: vec![aged_ticket(1, 90)],
            ..Default::default()
        }));
        let checker = EscalationChecker::new(store, Arc::new(LogNotifier));

        let report = checker.run(now()).await.unwrap();
        assert_eq!(report, EscalationReport::default());
    }

    /// Delegates to a `MemoryStore` but cannot answer the fired-check for one rule
    struct LogLookupFails {
        inner: MemoryStore,
        failing_rule: RuleId,
    }

    #[async_trait::async_trait]
    impl HelpdeskStore for LogLookupFails {
        async fn ticket(&self, id: TicketId) -> Result<Ticket, StoreError> {
            self.inner.ticket(id).await
        }
        async fn save_ticket(&self, ticket: &Ticket) -> Result<(), StoreError> {
            self.inner.save_ticket(ticket).await
        }
        async fn next_ticket_id(&self) -> Result<TicketId, StoreError> {
            self.inner.next_ticket_id().await
        }
        async fn open_tickets(&self) -> Result<Vec<Ticket>, StoreError> {
            self.inner.open_tickets().await
        }
        async fn user(&self, id: UserId) -> Result<Option<User>, StoreError> {
            self.inner.user(id).await
        }
        async fn users_with_role(&self, role: Role) -> Result<Vec<User>, StoreError> {
            self.inner.users_with_role(role).await
        }
        async fn department(&self, id: DepartmentId) -> Result<Option<Department>, StoreError> {
            self.inner.department(id).await
        }
        async fn category(&self, id: CategoryId) -> Result<Option<Category>, StoreError> {
            self.inner.category(id).await
        }
        async fn insert_approval(&self, approval: TicketApproval) -> Result<TicketApproval, StoreError> {
            self.inner.insert_approval(approval).await
        }
        async fn approval(&self, id: ApprovalId) -> Result<TicketApproval, StoreError> {
            self.inner.approval(id).await
        }
        async fn save_approval(&self, approval: &TicketApproval) -> Result<(), StoreError> {
            self.inner.save_approval(approval).await
        }
        async fn decide_and_request(
            &self,
            decided: &TicketApproval,
            next: TicketApproval,
        ) -> Result<TicketApproval, StoreError> {
            self.inner.decide_and_request(decided, next).await
        }
        async fn approvals_for_ticket(&self, ticket_id: TicketId) -> Result<Vec<TicketApproval>, StoreError> {
            self.inner.approvals_for_ticket(ticket_id).await
        }
        async fn pending_approval(&self, ticket_id: TicketId) -> Result<Option<TicketApproval>, StoreError> {
            self.inner.pending_approval(ticket_id).await
        }
        async fn active_escalation_rules(&self) -> Result<Vec<EscalationRule>, StoreError> {
            self.inner.active_escalation_rules().await
        }
        async fn active_automation_rules(&self, event: TicketEvent) -> Result<Vec<AutomationRule>, StoreError> {
            self.inner.active_automation_rules(event).await
        }
        async fn sla_policies(&self) -> Result<Vec<SlaPolicy>, StoreError> {
            self.inner.sla_policies().await
        }
        async fn escalation_fired(&self, rule_id: RuleId, ticket_id: TicketId) -> Result<bool, StoreError> {
            if rule_id == self.failing_rule {
                return Err(StoreError::Corrupt("escalation log unreadable".to_string()));
            }
            self.inner.escalation_fired(rule_id, ticket_id).await
        }
        async fn record_escalation(&self, record: EscalationRecord) -> Result<(), StoreError> {
            self.inner.record_escalation(record).await
        }
    }

    #[tokio::test]
    async fn test_logged_firing_keeps_its_changes_when_a_later_rule_fails() {
        let store = Arc::new(LogLookupFails {
            inner: MemoryStore::with_snapshot(Snapshot {
                tickets: vec![aged_ticket(1, 90)],
                escalation_rules: vec![
                    escalation_rule(1, 10, vec![], vec![Action::new(ActionType::ChangePriority, "urgent")]),
                    escalation_rule(2, 1, vec![], vec![Action::new(ActionType::AddTag, "late")]),
                ],
                ..Default::default()
            }),
            failing_rule: 2,
        });
        let checker = EscalationChecker::new(store.clone(), Arc::new(LogNotifier));

        let report = checker.run(now()).await.unwrap();
        assert_eq!(report.failures, 1);
        assert!(store.inner.escalation_fired(1, 1).await.unwrap());

        let ticket = store.ticket(1).await.unwrap();
        assert_eq!(ticket.priority, Priority::Urgent);
        assert!(ticket.tags.is_empty());
    }

    #[tokio::test]
    async fn test_out_of_range_sla_grace_does_not_abort_the_run() {
        let policy = SlaPolicy {
            id: 1,
            name: "Standard".into(),
            priority: Priority::Medium,
            response_minutes: 60,
            resolution_minutes: 600,
            active: true,
        };
        let mut huge_grace = escalation_rule(1, 10, vec![], vec![Action::new(ActionType::AddTag, "sla")]);
        huge_grace.trigger = trigger(TriggerKind::SlaResponseBreached, i64::MAX / 2);
        let mut plain = escalation_rule(2, 1, vec![], vec![Action::new(ActionType::AddTag, "aged")]);
        plain.trigger = trigger(TriggerKind::MinutesSinceCreated, 30);

        let store = Arc::new(MemoryStore::with_snapshot(Snapshot {
            tickets: vec![aged_ticket(1, 600)],
            escalation_rules: vec![huge_grace, plain],
            sla_policies: vec![policy],
            ..Default::default()
        }));
        let checker = EscalationChecker::new(store.clone(), Arc::new(LogNotifier));

        let report = checker.run(now()).await.unwrap();
        assert_eq!(report.failures, 0);
        let fired: Vec<RuleId> = report.fired.iter().map(|f| f.rule_id).collect();
        assert_eq!(fired, vec![2]);
        assert_eq!(store.ticket(1).await.unwrap().tags, vec!["aged".to_string()]);
    }
}
