use anyhow::Result;
use std::path::PathBuf;
use std::time::Duration;

use super::{Command, Desk};
use crate::config::HelpdeskConfig;
use crate::escalation::{EscalationReport, EscalationScheduler};

pub struct EscalateCommand {
    pub data: PathBuf,
    pub config: HelpdeskConfig,
    pub json: bool,
}

impl Command for EscalateCommand {
    async fn execute(&self) -> Result<()> {
        let desk = Desk::open(&self.data, &self.config).await?;
        let scheduler = EscalationScheduler::new(
            desk.escalation_checker(),
            Duration::from_secs(self.config.escalation.interval_minutes * 60),
            &self.config.escalation.lock_path,
        );

        let Some(report) = scheduler.run_locked().await? else {
            println!("⏸️  Another escalation run holds {}, skipped", scheduler.lock_path().display());
            return Ok(());
        };
        desk.persist().await?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            print_report(&report);
        }
        Ok(())
    }
}

pub fn print_report(report: &EscalationReport) {
    println!(
        "⏫ Escalation run: {} rules over {} open tickets",
        report.rules_evaluated, report.tickets_scanned
    );
    if report.fired.is_empty() {
        println!("   ✅ Nothing to escalate");
    }
    for fired in &report.fired {
        println!(
            "   🔔 Ticket #{} ← rule #{} '{}' ({} changes, {} notifications)",
            fired.ticket_id, fired.rule_id, fired.rule_name, fired.changes, fired.notifications
        );
        if fired.skipped_actions > 0 {
            println!("      ⚠️  {} actions skipped", fired.skipped_actions);
        }
    }
    if report.failures > 0 {
        println!("   ❌ {} tickets failed, see logs", report.failures);
    }
}
