use anyhow::Result;
use chrono::{DateTime, Utc};
use std::path::PathBuf;

use super::{Command, Desk};
use crate::config::HelpdeskConfig;
use crate::models::{ApprovalStatus, Ticket, TicketId};
use crate::sla::{policy_for, SlaClock};

pub struct StatusCommand {
    pub data: PathBuf,
    pub config: HelpdeskConfig,
    pub ticket: Option<TicketId>,
}

impl StatusCommand {
    async fn show_ticket(&self, desk: &Desk, id: TicketId) -> Result<()> {
        let ticket = desk.store().ticket(id).await?;
        let now = Utc::now();

        println!("🎫 {}: {}", ticket.ticket_number, ticket.title);
        println!("   📌 Status: {} | Priority: {}", ticket.status, ticket.priority);
        println!("   🧾 Approval: {}", ticket.approval_status.as_str());
        if let Some(cost) = ticket.estimated_cost {
            println!("   💰 Estimated cost: {cost:.2}");
        }
        match ticket.assignee_id {
            Some(assignee) => println!("   👤 Assignee: user {assignee}"),
            None => println!("   👤 Assignee: none"),
        }
        if !ticket.tags.is_empty() {
            println!("   🏷️  Tags: {}", ticket.tags.join(", "));
        }

        let policies = desk.store().sla_policies().await?;
        if let Some(policy) = policy_for(&policies, &ticket) {
            let clock = SlaClock::new(policy, &ticket);
            let due = |at: Option<DateTime<Utc>>| {
                at.map_or_else(|| "never".to_string(), |at| at.format("%Y-%m-%d %H:%M").to_string())
            };
            println!(
                "   ⏰ SLA '{}': response due {}{}, resolution due {}{}",
                policy.name,
                due(clock.response_due()),
                if clock.response_breached(now, 0) { " (breached)" } else { "" },
                due(clock.resolution_due()),
                if clock.resolution_breached(now, 0) { " (breached)" } else { "" },
            );
        }

        let approvals = desk.store().approvals_for_ticket(id).await?;
        if approvals.is_empty() {
            println!("   📋 No approvals recorded");
        } else {
            println!("   📋 Approval history:");
        }
        for approval in approvals {
            let icon = match approval.status {
                ApprovalStatus::Pending => "⏳",
                ApprovalStatus::Approved => "✅",
                ApprovalStatus::Rejected => "❌",
            };
            let decided = approval.approved_at.or(approval.rejected_at);
            println!(
                "      {} #{} {} {}{}{}",
                icon,
                approval.id,
                approval.approval_level,
                approval.status.as_str(),
                approval
                    .approver_id
                    .map(|id| format!(" by user {id}"))
                    .unwrap_or_default(),
                decided
                    .map(|at| format!(" at {}", at.format("%Y-%m-%d %H:%M")))
                    .unwrap_or_default(),
            );
            if let Some(comment) = &approval.comments {
                println!("         💬 {comment}");
            }
        }
        Ok(())
    }

    fn print_row(ticket: &Ticket) {
        println!(
            "   #{:<5} {:<12} {:<8} {:<12} {}",
            ticket.id,
            ticket.status.as_str(),
            ticket.priority.as_str(),
            ticket.approval_status.as_str(),
            ticket.title
        );
    }
}

impl Command for StatusCommand {
    async fn execute(&self) -> Result<()> {
        let desk = Desk::open(&self.data, &self.config).await?;

        if let Some(id) = self.ticket {
            return self.show_ticket(&desk, id).await;
        }

        let tickets = desk.store().open_tickets().await?;
        println!("📊 {} open tickets", tickets.len());
        if tickets.is_empty() {
            println!("   💡 Raise one with 'helpdesk submit --title <text> --requester <id>'");
            return Ok(());
        }
        for ticket in &tickets {
            Self::print_row(ticket);
        }

        let awaiting = tickets
            .iter()
            .filter(|t| t.approval_status == crate::models::ApprovalState::Pending)
            .count();
        if awaiting > 0 {
            println!();
            println!("⏳ {awaiting} awaiting approval");
        }
        Ok(())
    }
}
