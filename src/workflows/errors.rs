use thiserror::Error;

use super::state_machine::ApprovalStage;
use crate::models::{ApprovalId, ApprovalState, TicketId, UserId};
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Store error: {0}")]
    Store(StoreError),

    #[error("user {0} not found")]
    UserNotFound(UserId),

    #[error("approval {approval_id} is already {status}")]
    AlreadyDecided {
        approval_id: ApprovalId,
        status: &'static str,
    },

    #[error("user {actor_id} is not allowed to decide approval {approval_id}")]
    NotAuthorized {
        approval_id: ApprovalId,
        actor_id: UserId,
    },

    #[error("ticket {ticket_id} already has pending approval {approval_id}")]
    PendingApprovalExists {
        ticket_id: TicketId,
        approval_id: ApprovalId,
    },

    #[error("ticket {ticket_id} has already been through approval ({})", state.as_str())]
    AlreadyRouted {
        ticket_id: TicketId,
        state: ApprovalState,
    },

    #[error("approval {approval_id} does not advance ticket {ticket_id} (stage {stage:?})")]
    InvalidTransition {
        approval_id: ApprovalId,
        ticket_id: TicketId,
        stage: ApprovalStage,
    },
}

impl From<StoreError> for WorkflowError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::PendingApprovalExists {
                ticket_id,
                approval_id,
            } => WorkflowError::PendingApprovalExists {
                ticket_id,
                approval_id,
            },
            StoreError::AlreadyDecided {
                approval_id,
                status,
            } => WorkflowError::AlreadyDecided {
                approval_id,
                status: status.as_str(),
            },
            other => WorkflowError::Store(other),
        }
    }
}
