use anyhow::Result;
use std::path::PathBuf;

use super::{Command, Desk};
use crate::config::HelpdeskConfig;
use crate::models::{Action, TicketEvent};

pub struct RulesCommand {
    pub data: PathBuf,
    pub config: HelpdeskConfig,
}

fn describe_actions(actions: &[Action]) -> String {
    actions
        .iter()
        .map(|a| match &a.value {
            serde_json::Value::Null => a.action_type.to_string(),
            value => format!("{}={}", a.action_type, value),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

impl Command for RulesCommand {
    async fn execute(&self) -> Result<()> {
        let desk = Desk::open(&self.data, &self.config).await?;

        let escalation = desk.store().active_escalation_rules().await?;
        println!("⏫ Escalation rules ({} active, evaluation order):", escalation.len());
        for rule in &escalation {
            println!(
                "   [{:>3}] #{} {} - {:?} after {} min, {} conditions → {}",
                rule.priority,
                rule.id,
                rule.name,
                rule.trigger.kind,
                rule.trigger.minutes,
                rule.conditions.len(),
                describe_actions(&rule.actions)
            );
        }

        println!();
        println!("⚙️  Automation rules:");
        for event in [
            TicketEvent::Created,
            TicketEvent::Updated,
            TicketEvent::StatusChanged,
            TicketEvent::Assigned,
            TicketEvent::ApprovalCompleted,
        ] {
            let rules = desk.store().active_automation_rules(event).await?;
            if rules.is_empty() {
                continue;
            }
            println!("   on {}:", event.as_str());
            for rule in rules {
                println!(
                    "   [{:>3}] #{} {}{} → {}",
                    rule.priority,
                    rule.id,
                    rule.name,
                    if rule.stop_processing { " (stops)" } else { "" },
                    describe_actions(&rule.actions)
                );
            }
        }
        Ok(())
    }
}
