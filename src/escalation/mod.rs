// Scheduled escalation of stale tickets

pub mod checker;
pub mod scheduler;

use thiserror::Error;

use crate::store::StoreError;

pub use checker::{EscalationChecker, EscalationReport, FiredEscalation};
pub use scheduler::EscalationScheduler;

#[derive(Debug, Error)]
pub enum EscalationError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Lock file error: {0}")]
    LockError(#[from] std::io::Error),
}
