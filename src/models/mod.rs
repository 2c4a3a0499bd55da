// Domain records shared by the workflow engines and the stores

pub mod approval;
pub mod directory;
pub mod rules;
pub mod ticket;

pub type TicketId = u64;
pub type ApprovalId = u64;
pub type UserId = u64;
pub type DepartmentId = u64;
pub type CategoryId = u64;
pub type RuleId = u64;

pub use approval::{ApprovalLevel, ApprovalStatus, TicketApproval};
pub use directory::{Category, Department, Role, User};
pub use rules::{
    Action, ActionType, AutomationRule, Condition, EscalationRecord, EscalationRule,
    EscalationTrigger, Operator, TicketEvent, TriggerKind,
};
pub use ticket::{ApprovalState, Ticket, TicketStatus};
