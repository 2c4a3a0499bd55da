use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Workflow counters for the current process
#[derive(Debug, Default)]
pub struct WorkflowMetrics {
    pub approvals_requested: AtomicU64,
    pub approvals_approved: AtomicU64,
    pub approvals_rejected: AtomicU64,
    pub auto_assigned: AtomicU64,
    pub escalations_fired: AtomicU64,
    pub escalation_failures: AtomicU64,
}

impl WorkflowMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_requested(&self) {
        self.approvals_requested.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_approved(&self) {
        self.approvals_approved.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.approvals_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_auto_assigned(&self) {
        self.auto_assigned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_escalation(&self) {
        self.escalations_fired.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_escalation_failure(&self) {
        self.escalation_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_stats(&self) -> WorkflowStats {
        WorkflowStats {
            approvals_requested: self.approvals_requested.load(Ordering::Relaxed),
            approvals_approved: self.approvals_approved.load(Ordering::Relaxed),
            approvals_rejected: self.approvals_rejected.load(Ordering::Relaxed),
            auto_assigned: self.auto_assigned.load(Ordering::Relaxed),
            escalations_fired: self.escalations_fired.load(Ordering::Relaxed),
            escalation_failures: self.escalation_failures.load(Ordering::Relaxed),
        }
    }

    pub fn log_stats(&self) {
        let stats = self.get_stats();
        info!(
            "Workflow metrics: requested={}, approved={}, rejected={}, auto_assigned={}, escalations={}, escalation_failures={}",
            stats.approvals_requested,
            stats.approvals_approved,
            stats.approvals_rejected,
            stats.auto_assigned,
            stats.escalations_fired,
            stats.escalation_failures
        );
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowStats {
    pub approvals_requested: u64,
    pub approvals_approved: u64,
    pub approvals_rejected: u64,
    pub auto_assigned: u64,
    pub escalations_fired: u64,
    pub escalation_failures: u64,
}

/// Global metrics instance
static WORKFLOW_METRICS: std::sync::LazyLock<WorkflowMetrics> =
    std::sync::LazyLock::new(WorkflowMetrics::new);

pub fn workflow_metrics() -> &'static WorkflowMetrics {
    &WORKFLOW_METRICS
}

/// Time an operation and log its duration
pub struct OperationTimer {
    operation: String,
    start: Instant,
}

impl OperationTimer {
    pub fn new(operation: &str) -> Self {
        Self {
            operation: operation.to_string(),
            start: Instant::now(),
        }
    }

    pub fn finish(self) {
        let duration = self.start.elapsed();
        info!(
            operation = %self.operation,
            duration_ms = duration.as_millis(),
            "Operation completed"
        );
    }
}
