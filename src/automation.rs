//! Event-driven automation rules
//!
//! When a ticket event happens, active rules listening on that event are
//! evaluated in priority order. Every rule whose conditions match has its
//! actions applied; a matching rule with `stop_processing` set ends the pass.
//! Changes made here do not raise further events.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info};

use crate::models::{RuleId, TicketEvent, TicketId};
use crate::notifications::{NotificationKind, Notifier};
use crate::rules::{ActionContext, ActionExecutor, ConditionEvaluator};
use crate::store::{HelpdeskStore, StoreError};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AutomationReport {
    pub rules_fired: Vec<RuleId>,
    pub ticket_changed: bool,
    pub skipped_actions: usize,
}

pub struct AutomationEngine {
    store: Arc<dyn HelpdeskStore>,
    evaluator: ConditionEvaluator,
    executor: ActionExecutor,
}

impl AutomationEngine {
    pub fn new(store: Arc<dyn HelpdeskStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            store,
            evaluator: ConditionEvaluator::new(),
            executor: ActionExecutor::new(notifier),
        }
    }

    pub async fn process(
        &self,
        event: TicketEvent,
        ticket_id: TicketId,
        now: DateTime<Utc>,
    ) -> Result<AutomationReport, StoreError> {
        let rules = self.store.active_automation_rules(event).await?;
        let mut report = AutomationReport::default();
        if rules.is_empty() {
            return Ok(report);
        }

        let mut ticket = self.store.ticket(ticket_id).await?;

        for rule in &rules {
            if !self.evaluator.matches_all(&rule.conditions, &ticket, now) {
                debug!(rule.id = rule.id, ticket.id = ticket_id, "Automation rule did not match");
                continue;
            }

            let outcome = self
                .executor
                .execute(
                    &rule.actions,
                    &mut ticket,
                    ActionContext {
                        rule_name: &rule.name,
                        kind: NotificationKind::RuleAction,
                    },
                    now,
                )
                .await;

            info!(
                rule.id = rule.id,
                ticket.id = ticket_id,
                event = event.as_str(),
                changes = outcome.applied.len(),
                "Automation rule fired"
            );
            report.rules_fired.push(rule.id);
            report.ticket_changed |= outcome.ticket_changed();
            report.skipped_actions += outcome.skipped.len();

            if rule.stop_processing {
                debug!(rule.id = rule.id, "Rule stops further processing");
                break;
            }
        }

        if report.ticket_changed {
            self.store.save_ticket(&ticket).await?;
        }
        Ok(report)
    }
}
