use anyhow::Result;
use chrono::Utc;
use std::path::PathBuf;

use super::{Command, Desk};
use crate::config::HelpdeskConfig;
use crate::models::{ApprovalId, UserId};
use crate::workflows::ApprovalDecision;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Reject,
}

pub struct DecideCommand {
    pub data: PathBuf,
    pub config: HelpdeskConfig,
    pub decision: Decision,
    pub approval: ApprovalId,
    pub actor: UserId,
    pub comment: Option<String>,
}

impl Command for DecideCommand {
    async fn execute(&self) -> Result<()> {
        let desk = Desk::open(&self.data, &self.config).await?;
        let engine = desk.approval_engine();
        let now = Utc::now();

        let result = match self.decision {
            Decision::Approve => {
                engine
                    .approve(self.approval, self.actor, self.comment.clone(), now)
                    .await
            }
            Decision::Reject => {
                engine
                    .reject(self.approval, self.actor, self.comment.clone(), now)
                    .await
            }
        };

        let decision = match result {
            Ok(decision) => decision,
            Err(e) => {
                println!("❌ Approval #{} unchanged: {}", self.approval, e);
                return Err(e.into());
            }
        };
        desk.persist().await?;

        match decision {
            ApprovalDecision::EscalatedToHod(hod) => {
                println!("✅ Approval #{} granted", self.approval);
                println!(
                    "   ⏫ Cost needs a {} sign-off: approval #{}{}",
                    hod.approval_level,
                    hod.id,
                    hod.approver_id
                        .map(|id| format!(" for user {id}"))
                        .unwrap_or_default()
                );
            }
            ApprovalDecision::FullyApproved => {
                println!("✅ Approval #{} granted, ticket assigned", self.approval);
            }
            ApprovalDecision::Rejected => {
                println!("❌ Approval #{} rejected, ticket left unassigned", self.approval);
            }
        }
        Ok(())
    }
}
