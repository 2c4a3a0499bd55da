// Approval lifecycle as a statig machine.
// The engine rebuilds it per decision by replaying the ticket's decided
// approvals, then feeds the new decision and reads the resulting stage.

use serde::{Deserialize, Serialize};
use statig::prelude::*;

use crate::models::{ApprovalLevel, ApprovalStatus, TicketApproval, TicketId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApprovalEvent {
    Approved(ApprovalLevel),
    Rejected(ApprovalLevel),
}

impl ApprovalEvent {
    /// The event a decided approval record represents, if any
    pub fn from_record(approval: &TicketApproval) -> Option<Self> {
        match approval.status {
            ApprovalStatus::Approved => Some(ApprovalEvent::Approved(approval.approval_level)),
            ApprovalStatus::Rejected => Some(ApprovalEvent::Rejected(approval.approval_level)),
            ApprovalStatus::Pending => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApprovalStage {
    AwaitingLineManager,
    AwaitingHeadOfDepartment,
    Approved,
    Rejected,
}

#[derive(Debug, Default)]
pub struct ApprovalFlow {
    pub ticket_id: TicketId,
    /// Cost is at or above the HOD threshold
    pub requires_hod: bool,
}

impl ApprovalFlow {
    pub fn new(ticket_id: TicketId, requires_hod: bool) -> Self {
        Self {
            ticket_id,
            requires_hod,
        }
    }

    fn ignored(&self, stage: &str, event: &ApprovalEvent) {
        tracing::warn!(
            ticket.id = self.ticket_id,
            stage = stage,
            event = ?event,
            "Approval event does not apply in this stage"
        );
    }
}

#[state_machine(initial = "State::awaiting_line_manager()")]
impl ApprovalFlow {
    #[state]
    fn awaiting_line_manager(&mut self, event: &ApprovalEvent) -> Outcome<State> {
        match event {
            ApprovalEvent::Approved(ApprovalLevel::Lm) if self.requires_hod => {
                tracing::info!(ticket.id = self.ticket_id, "Line manager approved, HOD sign-off required");
                Transition(State::awaiting_head_of_department())
            }
            ApprovalEvent::Approved(ApprovalLevel::Lm) => {
                tracing::info!(ticket.id = self.ticket_id, "Line manager approved");
                Transition(State::approved())
            }
            ApprovalEvent::Rejected(ApprovalLevel::Lm) => {
                tracing::info!(ticket.id = self.ticket_id, "Line manager rejected");
                Transition(State::rejected())
            }
            _ => {
                self.ignored("awaiting_line_manager", event);
                Handled
            }
        }
    }

    #[state]
    fn awaiting_head_of_department(&mut self, event: &ApprovalEvent) -> Outcome<State> {
        match event {
            ApprovalEvent::Approved(ApprovalLevel::Hod) => {
                tracing::info!(ticket.id = self.ticket_id, "Head of department approved");
                Transition(State::approved())
            }
            ApprovalEvent::Rejected(ApprovalLevel::Hod) => {
                tracing::info!(ticket.id = self.ticket_id, "Head of department rejected");
                Transition(State::rejected())
            }
            _ => {
                self.ignored("awaiting_head_of_department", event);
                Handled
            }
        }
    }

    #[state]
    fn approved(&mut self, event: &ApprovalEvent) -> Outcome<State> {
        self.ignored("approved", event);
        Handled
    }

    #[state]
    fn rejected(&mut self, event: &ApprovalEvent) -> Outcome<State> {
        self.ignored("rejected", event);
        Handled
    }
}

/// Current stage of a running approval machine
pub fn stage_of(machine: &StateMachine<ApprovalFlow>) -> ApprovalStage {
    match machine.state() {
        State::AwaitingLineManager { .. } => ApprovalStage::AwaitingLineManager,
        State::AwaitingHeadOfDepartment { .. } => ApprovalStage::AwaitingHeadOfDepartment,
        State::Approved { .. } => ApprovalStage::Approved,
        State::Rejected { .. } => ApprovalStage::Rejected,
    }
}

/// Rebuild the machine for a ticket from its decided approvals (oldest first)
pub fn replay(
    ticket_id: TicketId,
    requires_hod: bool,
    history: &[TicketApproval],
) -> StateMachine<ApprovalFlow> {
    let mut machine = ApprovalFlow::new(ticket_id, requires_hod).state_machine();
    for event in history.iter().filter_map(ApprovalEvent::from_record) {
        machine.handle(&event);
    }
    machine
}
