use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn, Instrument};

use super::errors::WorkflowError;
use super::state_machine::{self, ApprovalEvent, ApprovalStage};
use crate::automation::AutomationEngine;
use crate::config::ApprovalConfig;
use crate::models::{
    ApprovalId, ApprovalLevel, ApprovalState, Role, Ticket, TicketApproval, TicketEvent,
    TicketId, TicketStatus, User, UserId,
};
use crate::notifications::{Notification, NotificationKind, Notifier, Recipient};
use crate::observability::workflow_metrics;
use crate::store::HelpdeskStore;
use crate::telemetry::{create_workflow_span, generate_correlation_id};

/// Why a ticket skipped approval
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoAssignReason {
    RequesterRole(Role),
    CategoryNeedsNoApproval,
}

/// Result of starting the workflow for a ticket
#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowOutcome {
    AutoAssigned(AutoAssignReason),
    AwaitingApproval(TicketApproval),
}

/// Result of an approve/reject decision
#[derive(Debug, Clone, PartialEq)]
pub enum ApprovalDecision {
    /// LM approved a costly request; a HOD approval is now pending
    EscalatedToHod(TicketApproval),
    /// No further sign-off needed; the ticket is assigned
    FullyApproved,
    Rejected,
}

pub struct ApprovalWorkflowEngine {
    store: Arc<dyn HelpdeskStore>,
    notifier: Arc<dyn Notifier>,
    config: ApprovalConfig,
    automation: Option<Arc<AutomationEngine>>,
}

impl ApprovalWorkflowEngine {
    pub fn new(
        store: Arc<dyn HelpdeskStore>,
        notifier: Arc<dyn Notifier>,
        config: ApprovalConfig,
    ) -> Self {
        Self {
            store,
            notifier,
            config,
            automation: None,
        }
    }

    /// Fire `approval_completed` automation rules after final decisions
    pub fn with_automation(mut self, automation: Arc<AutomationEngine>) -> Self {
        self.automation = Some(automation);
        self
    }

    /// Decide whether a new ticket needs sign-off and start the workflow.
    pub async fn initialize_workflow(
        &self,
        ticket_id: TicketId,
        now: DateTime<Utc>,
    ) -> Result<WorkflowOutcome, WorkflowError> {
        let span = create_workflow_span("initialize_workflow", ticket_id, &generate_correlation_id());
        async move {
            let mut ticket = self.store.ticket(ticket_id).await?;

            if let Some(pending) = self.store.pending_approval(ticket_id).await? {
                return Err(WorkflowError::PendingApprovalExists {
                    ticket_id,
                    approval_id: pending.id,
                });
            }

            // Decided history cannot be replayed into a second round
            let decided = self.store.approvals_for_ticket(ticket_id).await?;
            if matches!(ticket.approval_status, ApprovalState::Approved | ApprovalState::Rejected)
                || !decided.is_empty()
            {
                return Err(WorkflowError::AlreadyRouted {
                    ticket_id,
                    state: ticket.approval_status,
                });
            }

            let requester = self.require_user(ticket.requester_id).await?;

            if let Some(reason) = self.auto_assign_reason(&ticket, &requester).await? {
                ticket.status = TicketStatus::Assigned;
                ticket.approval_status = ApprovalState::NotRequired;
                ticket.updated_at = now;
                self.store.save_ticket(&ticket).await?;
                workflow_metrics().record_auto_assigned();
                info!(ticket.id = ticket_id, reason = ?reason, "Ticket assigned without approval");
                return Ok(WorkflowOutcome::AutoAssigned(reason));
            }

            if requester.manager_id.is_none() {
                warn!(
                    ticket.id = ticket_id,
                    requester.id = requester.id,
                    "Requester has no line manager; approval left for an admin"
                );
            }

            let approval = self
                .request_approval(&ticket, ApprovalLevel::Lm, requester.manager_id, None, now)
                .await?;

            ticket.status = TicketStatus::Pending;
            ticket.approval_status = ApprovalState::Pending;
            ticket.assignee_id = None;
            ticket.updated_at = now;
            self.store.save_ticket(&ticket).await?;

            Ok(WorkflowOutcome::AwaitingApproval(approval))
        }
        .instrument(span)
        .await
    }

    /// Approve a pending approval on behalf of `actor_id`.
    pub async fn approve(
        &self,
        approval_id: ApprovalId,
        actor_id: UserId,
        comment: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<ApprovalDecision, WorkflowError> {
        let (mut approval, mut ticket) = self.load_for_decision(approval_id, actor_id).await?;
        let span = create_workflow_span("approve", ticket.id, &generate_correlation_id());

        async move {
            let stage = self.next_stage(&approval, &ticket, ApprovalEvent::Approved(approval.approval_level)).await?;

            match stage {
                ApprovalStage::AwaitingHeadOfDepartment => {
                    let hod = self.head_of_department_for(&ticket).await?;
                    if hod.is_none() {
                        warn!(ticket.id = ticket.id, "No head of department found; approval left for an admin");
                    }

                    approval.mark_approved(comment, now);
                    let hod_approval = self
                        .request_approval(&ticket, ApprovalLevel::Hod, hod, Some(&approval), now)
                        .await?;
                    workflow_metrics().record_approved();

                    ticket.updated_at = now;
                    self.store.save_ticket(&ticket).await?;
                    Ok(ApprovalDecision::EscalatedToHod(hod_approval))
                }
                ApprovalStage::Approved => {
                    approval.mark_approved(comment, now);
                    self.store.save_approval(&approval).await?;
                    workflow_metrics().record_approved();

                    ticket.status = TicketStatus::Assigned;
                    ticket.approval_status = ApprovalState::Approved;
                    ticket.updated_at = now;
                    self.store.save_ticket(&ticket).await?;
                    info!(ticket.id = ticket.id, approval.id = approval.id, "Ticket fully approved");

                    self.notify(
                        Recipient::User(ticket.requester_id),
                        &ticket,
                        NotificationKind::ApprovalGranted,
                        format!("{} was approved and assigned", ticket.ticket_number),
                        now,
                    )
                    .await;
                    self.approval_completed(ticket.id, now).await;
                    Ok(ApprovalDecision::FullyApproved)
                }
                stage => Err(WorkflowError::InvalidTransition {
                    approval_id,
                    ticket_id: ticket.id,
                    stage,
                }),
            }
        }
        .instrument(span)
        .await
    }

    /// Reject a pending approval. The ticket stays blocked and unassigned.
    pub async fn reject(
        &self,
        approval_id: ApprovalId,
        actor_id: UserId,
        comment: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<ApprovalDecision, WorkflowError> {
        let (mut approval, mut ticket) = self.load_for_decision(approval_id, actor_id).await?;
        let span = create_workflow_span("reject", ticket.id, &generate_correlation_id());

        async move {
            let stage = self.next_stage(&approval, &ticket, ApprovalEvent::Rejected(approval.approval_level)).await?;
            if stage != ApprovalStage::Rejected {
                return Err(WorkflowError::InvalidTransition {
                    approval_id,
                    ticket_id: ticket.id,
                    stage,
                });
            }

            approval.mark_rejected(comment.clone(), now);
            self.store.save_approval(&approval).await?;
            workflow_metrics().record_rejected();

            ticket.status = TicketStatus::Pending;
            ticket.approval_status = ApprovalState::Rejected;
            ticket.assignee_id = None;
            ticket.updated_at = now;
            self.store.save_ticket(&ticket).await?;
            info!(
                ticket.id = ticket.id,
                approval.id = approval.id,
                level = approval.approval_level.as_str(),
                "Approval rejected"
            );

            let reason = comment.map(|c| format!(": {c}")).unwrap_or_default();
            self.notify(
                Recipient::User(ticket.requester_id),
                &ticket,
                NotificationKind::ApprovalRejected,
                format!(
                    "{} was rejected by the {}{}",
                    ticket.ticket_number, approval.approval_level, reason
                ),
                now,
            )
            .await;
            self.approval_completed(ticket.id, now).await;
            Ok(ApprovalDecision::Rejected)
        }
        .instrument(span)
        .await
    }

    /// Cost at or above the HOD threshold needs a second sign-off
    pub fn requires_hod(&self, ticket: &Ticket) -> bool {
        ticket
            .estimated_cost
            .is_some_and(|cost| cost >= self.config.hod_threshold)
    }

    async fn auto_assign_reason(
        &self,
        ticket: &Ticket,
        requester: &User,
    ) -> Result<Option<AutoAssignReason>, WorkflowError> {
        if self.config.auto_approve_roles.contains(&requester.role) {
            return Ok(Some(AutoAssignReason::RequesterRole(requester.role)));
        }

        let requires_approval = match ticket.category_id {
            Some(category_id) => self
                .store
                .category(category_id)
                .await?
                .is_some_and(|c| c.requires_approval),
            None => false,
        };

        if requires_approval {
            Ok(None)
        } else {
            Ok(Some(AutoAssignReason::CategoryNeedsNoApproval))
        }
    }

    async fn load_for_decision(
        &self,
        approval_id: ApprovalId,
        actor_id: UserId,
    ) -> Result<(TicketApproval, Ticket), WorkflowError> {
        let approval = self.store.approval(approval_id).await?;
        if !approval.is_pending() {
            return Err(WorkflowError::AlreadyDecided {
                approval_id,
                status: approval.status.as_str(),
            });
        }

        let actor = self.require_user(actor_id).await?;
        let designated = approval.approver_id == Some(actor.id);
        if !designated && actor.role != Role::Admin {
            warn!(approval.id = approval_id, actor.id = actor_id, "Unauthorized approval decision");
            return Err(WorkflowError::NotAuthorized {
                approval_id,
                actor_id,
            });
        }

        let ticket = self.store.ticket(approval.ticket_id).await?;
        Ok((approval, ticket))
    }

    async fn next_stage(
        &self,
        approval: &TicketApproval,
        ticket: &Ticket,
        event: ApprovalEvent,
    ) -> Result<ApprovalStage, WorkflowError> {
        let history: Vec<TicketApproval> = self
            .store
            .approvals_for_ticket(ticket.id)
            .await?
            .into_iter()
            .filter(|a| a.id != approval.id)
            .collect();

        let mut machine = state_machine::replay(ticket.id, self.requires_hod(ticket), &history);
        let before = state_machine::stage_of(&machine);
        machine.handle(&event);
        let after = state_machine::stage_of(&machine);

        if before == after {
            return Err(WorkflowError::InvalidTransition {
                approval_id: approval.id,
                ticket_id: ticket.id,
                stage: before,
            });
        }
        Ok(after)
    }

    /// Open a pending approval. With `decided`, the decision that led here
    /// is saved in the same store write.
    async fn request_approval(
        &self,
        ticket: &Ticket,
        level: ApprovalLevel,
        approver_id: Option<UserId>,
        decided: Option<&TicketApproval>,
        now: DateTime<Utc>,
    ) -> Result<TicketApproval, WorkflowError> {
        let pending = TicketApproval::pending(ticket.id, level, approver_id, now);
        let approval = match decided {
            Some(decided) => self.store.decide_and_request(decided, pending).await?,
            None => self.store.insert_approval(pending).await?,
        };

        workflow_metrics().record_requested();
        info!(
            ticket.id = ticket.id,
            approval.id = approval.id,
            level = level.as_str(),
            approver.id = ?approver_id,
            "Approval requested"
        );

        let recipient = approver_id.map_or(Recipient::Role(Role::Admin), Recipient::User);
        self.notify(
            recipient,
            ticket,
            NotificationKind::ApprovalRequested,
            format!(
                "{} approval needed for {} \"{}\"",
                level, ticket.ticket_number, ticket.title
            ),
            now,
        )
        .await;

        Ok(approval)
    }

    /// Head of the ticket's department, falling back to the category's
    /// department and then the requester's.
    async fn head_of_department_for(&self, ticket: &Ticket) -> Result<Option<UserId>, WorkflowError> {
        let mut candidates = Vec::new();
        candidates.extend(ticket.department_id);
        if let Some(category_id) = ticket.category_id {
            if let Some(category) = self.store.category(category_id).await? {
                candidates.extend(category.department_id);
            }
        }
        if let Some(requester) = self.store.user(ticket.requester_id).await? {
            candidates.extend(requester.department_id);
        }

        for department_id in candidates {
            if let Some(head) = self
                .store
                .department(department_id)
                .await?
                .and_then(|d| d.head_id)
            {
                return Ok(Some(head));
            }
        }
        Ok(None)
    }

    async fn require_user(&self, user_id: UserId) -> Result<User, WorkflowError> {
        self.store
            .user(user_id)
            .await?
            .ok_or(WorkflowError::UserNotFound(user_id))
    }

    async fn notify(
        &self,
        recipient: Recipient,
        ticket: &Ticket,
        kind: NotificationKind,
        message: String,
        now: DateTime<Utc>,
    ) {
        let notification = Notification {
            recipient,
            ticket_id: ticket.id,
            kind,
            message,
            created_at: now,
        };
        if let Err(e) = self.notifier.notify(&notification).await {
            warn!(ticket.id = ticket.id, kind = ?kind, "Failed to send notification: {}", e);
        }
    }

    async fn approval_completed(&self, ticket_id: TicketId, now: DateTime<Utc>) {
        if let Some(automation) = &self.automation {
            if let Err(e) = automation
                .process(TicketEvent::ApprovalCompleted, ticket_id, now)
                .await
            {
                warn!(ticket.id = ticket_id, "Automation after approval failed: {}", e);
            }
        }
    }
}
