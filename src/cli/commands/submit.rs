use anyhow::Result;
use chrono::Utc;
use std::path::PathBuf;

use super::{Command, Desk};
use crate::config::HelpdeskConfig;
use crate::models::{CategoryId, DepartmentId, Ticket, TicketEvent, UserId};
use crate::priority::Priority;
use crate::workflows::{AutoAssignReason, WorkflowOutcome};

pub struct SubmitCommand {
    pub data: PathBuf,
    pub config: HelpdeskConfig,
    pub title: String,
    pub requester: UserId,
    pub description: String,
    pub category: Option<CategoryId>,
    pub department: Option<DepartmentId>,
    pub cost: Option<f64>,
    pub priority: Priority,
}

impl Command for SubmitCommand {
    async fn execute(&self) -> Result<()> {
        let desk = Desk::open(&self.data, &self.config).await?;
        let now = Utc::now();

        if desk.store().user(self.requester).await?.is_none() {
            anyhow::bail!("Requester {} is not a known user", self.requester);
        }

        let id = desk.store().next_ticket_id().await?;
        let mut ticket = Ticket::new(id, &self.title, self.requester, now);
        ticket.description = self.description.clone();
        ticket.category_id = self.category;
        ticket.department_id = self.department;
        ticket.estimated_cost = self.cost;
        ticket.priority = self.priority;
        desk.store().save_ticket(&ticket).await?;

        desk.automation().process(TicketEvent::Created, id, now).await?;
        let outcome = desk.approval_engine().initialize_workflow(id, now).await;
        // Keep the ticket even if routing failed
        desk.persist().await?;

        println!("📝 Created {} ({})", ticket.ticket_number, ticket.title);
        match outcome? {
            WorkflowOutcome::AutoAssigned(AutoAssignReason::RequesterRole(role)) => {
                println!("   ✅ Assigned without approval (requester is {role})");
            }
            WorkflowOutcome::AutoAssigned(AutoAssignReason::CategoryNeedsNoApproval) => {
                println!("   ✅ Assigned without approval (category needs none)");
            }
            WorkflowOutcome::AwaitingApproval(approval) => {
                println!(
                    "   ⏳ Awaiting {} approval #{}{}",
                    approval.approval_level,
                    approval.id,
                    approval
                        .approver_id
                        .map(|id| format!(" from user {id}"))
                        .unwrap_or_else(|| " (no approver found, admins may decide)".to_string())
                );
            }
        }
        Ok(())
    }
}
