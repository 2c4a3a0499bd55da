// Helpdesk Workflow Library - approval routing and ticket escalation
// This exposes the core components for the CLI, testing and integration

pub mod automation;
pub mod cli;
pub mod config;
pub mod database;
pub mod escalation;
pub mod models;
pub mod notifications;
pub mod observability;
pub mod priority;
pub mod rules;
pub mod shutdown;
pub mod sla;
pub mod store;
pub mod telemetry;
pub mod workflows;

// Re-export key types for easy access
pub use automation::{AutomationEngine, AutomationReport};
pub use config::{config, init_config, HelpdeskConfig};
pub use database::{init_database, shutdown_database};
pub use escalation::{EscalationChecker, EscalationError, EscalationReport, EscalationScheduler};
pub use notifications::{LogNotifier, Notification, Notifier, OutboxNotifier};
pub use observability::{workflow_metrics, OperationTimer, WorkflowMetrics};
pub use priority::Priority;
pub use rules::{ActionExecutor, ConditionEvaluator};
pub use shutdown::ShutdownCoordinator;
pub use store::{HelpdeskStore, MemoryStore, Snapshot, StoreError};
pub use telemetry::{create_workflow_span, generate_correlation_id, init_telemetry, shutdown_telemetry};
pub use workflows::{ApprovalDecision, ApprovalWorkflowEngine, WorkflowError, WorkflowOutcome};
