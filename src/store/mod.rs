// Persistence seam for the workflow engines.
// Engines only talk to `HelpdeskStore`; the binary picks the backend.

pub mod lock;
pub mod memory;

use async_trait::async_trait;
use std::cmp::Ordering;
use thiserror::Error;

use crate::models::{
    ApprovalId, ApprovalStatus, AutomationRule, Category, CategoryId, Department, DepartmentId, EscalationRecord,
    EscalationRule, Role, RuleId, Ticket, TicketApproval, TicketEvent, TicketId, User, UserId,
};
use crate::sla::SlaPolicy;

pub use lock::SnapshotLock;
pub use memory::{MemoryStore, Snapshot};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: u64 },

    #[error("ticket {ticket_id} already has pending approval {approval_id}")]
    PendingApprovalExists {
        ticket_id: TicketId,
        approval_id: ApprovalId,
    },

    #[error("approval {approval_id} is already {}", status.as_str())]
    AlreadyDecided {
        approval_id: ApprovalId,
        status: ApprovalStatus,
    },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[cfg(feature = "database")]
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[cfg(feature = "database")]
    #[error("Migration error: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),
}

#[async_trait]
pub trait HelpdeskStore: Send + Sync {
    async fn ticket(&self, id: TicketId) -> Result<Ticket, StoreError>;

    async fn save_ticket(&self, ticket: &Ticket) -> Result<(), StoreError>;

    /// Id for the next ticket to be created
    async fn next_ticket_id(&self) -> Result<TicketId, StoreError>;

    /// Tickets whose status is still open for escalation purposes
    async fn open_tickets(&self) -> Result<Vec<Ticket>, StoreError>;

    async fn user(&self, id: UserId) -> Result<Option<User>, StoreError>;

    async fn users_with_role(&self, role: Role) -> Result<Vec<User>, StoreError>;

    async fn department(&self, id: DepartmentId) -> Result<Option<Department>, StoreError>;

    async fn category(&self, id: CategoryId) -> Result<Option<Category>, StoreError>;

    /// Insert a new approval, assigning its id. Refuses a second pending
    /// approval for the same ticket.
    async fn insert_approval(&self, approval: TicketApproval)
        -> Result<TicketApproval, StoreError>;

    async fn approval(&self, id: ApprovalId) -> Result<TicketApproval, StoreError>;

    /// Update an approval that is still pending. A record decided in the
    /// meantime yields `AlreadyDecided`.
    async fn save_approval(&self, approval: &TicketApproval) -> Result<(), StoreError>;

    /// Save the decision on `decided` and insert `next` as the ticket's new
    /// pending approval. Either both writes land or neither does.
    async fn decide_and_request(
        &self,
        decided: &TicketApproval,
        next: TicketApproval,
    ) -> Result<TicketApproval, StoreError>;

    /// All approvals for a ticket, oldest first
    async fn approvals_for_ticket(
        &self,
        ticket_id: TicketId,
    ) -> Result<Vec<TicketApproval>, StoreError>;

    async fn pending_approval(
        &self,
        ticket_id: TicketId,
    ) -> Result<Option<TicketApproval>, StoreError>;

    /// Active escalation rules, highest priority first
    async fn active_escalation_rules(&self) -> Result<Vec<EscalationRule>, StoreError>;

    /// Active automation rules listening on `event`, highest priority first
    async fn active_automation_rules(
        &self,
        event: TicketEvent,
    ) -> Result<Vec<AutomationRule>, StoreError>;

    async fn sla_policies(&self) -> Result<Vec<SlaPolicy>, StoreError>;

    async fn escalation_fired(
        &self,
        rule_id: RuleId,
        ticket_id: TicketId,
    ) -> Result<bool, StoreError>;

    async fn record_escalation(&self, record: EscalationRecord) -> Result<(), StoreError>;
}

/// Rule evaluation order: priority descending, then id ascending
pub fn rule_order(a_priority: i32, a_id: RuleId, b_priority: i32, b_id: RuleId) -> Ordering {
    match b_priority.cmp(&a_priority) {
        Ordering::Equal => a_id.cmp(&b_id),
        other => other,
    }
}
