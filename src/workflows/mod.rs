// Approval workflow: cost/role-gated multi-level sign-off

pub mod approval;
pub mod errors;
pub mod state_machine;

pub use approval::{ApprovalDecision, ApprovalWorkflowEngine, AutoAssignReason, WorkflowOutcome};
pub use errors::WorkflowError;
pub use state_machine::{ApprovalEvent, ApprovalFlow, ApprovalStage};
