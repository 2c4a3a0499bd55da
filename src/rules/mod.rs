// Condition/action evaluation shared by escalation and automation rules

pub mod actions;
pub mod conditions;

pub use actions::{ActionContext, ActionExecutor, ActionOutcome, AppliedChange, SkippedAction};
pub use conditions::{ConditionEvaluator, FieldValue};
