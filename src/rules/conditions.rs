use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::Value;
use std::cmp::Ordering;
use tracing::{debug, warn};

use crate::models::{Condition, Operator, Ticket};
use crate::priority::Priority;

/// A ticket field resolved for comparison
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Missing,
    Text(String),
    Number(f64),
    Priority(Priority),
    List(Vec<String>),
}

impl FieldValue {
    fn is_empty(&self) -> bool {
        match self {
            FieldValue::Missing => true,
            FieldValue::Text(s) => s.trim().is_empty(),
            FieldValue::List(items) => items.is_empty(),
            FieldValue::Number(_) | FieldValue::Priority(_) => false,
        }
    }
}

/// Matches tickets against (field, operator, value) conditions
#[derive(Debug, Default, Clone, Copy)]
pub struct ConditionEvaluator;

impl ConditionEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// All conditions must hold. An empty list matches every ticket.
    pub fn matches_all(&self, conditions: &[Condition], ticket: &Ticket, now: DateTime<Utc>) -> bool {
        conditions.iter().all(|c| self.matches(c, ticket, now))
    }

    pub fn matches(&self, condition: &Condition, ticket: &Ticket, now: DateTime<Utc>) -> bool {
        let Some(field) = resolve_field(&condition.field, ticket, now) else {
            debug!(field = %condition.field, "Unknown condition field, treating as no match");
            return false;
        };

        let target = &condition.value;
        match condition.operator {
            Operator::IsEmpty => field.is_empty(),
            Operator::IsNotEmpty => !field.is_empty(),
            _ if field == FieldValue::Missing => false,
            Operator::Equals => equals(&field, target),
            Operator::NotEquals => !equals(&field, target),
            Operator::GreaterThan => ordering(&field, target) == Some(Ordering::Greater),
            Operator::LessThan => ordering(&field, target) == Some(Ordering::Less),
            Operator::GreaterOrEqual => matches!(
                ordering(&field, target),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Operator::LessOrEqual => matches!(
                ordering(&field, target),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Operator::Contains => contains(&field, target),
            Operator::NotContains => !contains(&field, target),
            Operator::In => in_list(&field, target),
            Operator::NotIn => target.is_array() && !in_list(&field, target),
            Operator::Matches => regex_matches(&field, target),
        }
    }
}

/// Look up a condition field on a ticket. `None` means the field name is unknown.
pub fn resolve_field(name: &str, ticket: &Ticket, now: DateTime<Utc>) -> Option<FieldValue> {
    let id = |value: Option<u64>| value.map_or(FieldValue::Missing, |v| FieldValue::Number(v as f64));

    let value = match name {
        "status" => FieldValue::Text(ticket.status.as_str().to_string()),
        "priority" => FieldValue::Priority(ticket.priority),
        "approval_status" => FieldValue::Text(ticket.approval_status.as_str().to_string()),
        "category_id" => id(ticket.category_id),
        "department_id" => id(ticket.department_id),
        "assignee_id" => id(ticket.assignee_id),
        "requester_id" => FieldValue::Number(ticket.requester_id as f64),
        "estimated_cost" => ticket
            .estimated_cost
            .map_or(FieldValue::Missing, FieldValue::Number),
        "title" => FieldValue::Text(ticket.title.clone()),
        "description" => FieldValue::Text(ticket.description.clone()),
        "tags" => FieldValue::List(ticket.tags.clone()),
        "hours_since_created" => {
            FieldValue::Number(ticket.minutes_since_created(now) as f64 / 60.0)
        }
        "hours_since_updated" => {
            FieldValue::Number(ticket.minutes_since_updated(now) as f64 / 60.0)
        }
        other => match other.strip_prefix("custom.") {
            Some(key) => ticket
                .custom_fields
                .get(key)
                .map_or(FieldValue::Missing, |v| FieldValue::Text(v.clone())),
            None => return None,
        },
    };
    Some(value)
}

fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn value_as_priority(value: &Value) -> Option<Priority> {
    match value {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => match n.as_u64()? {
            1 => Some(Priority::Low),
            2 => Some(Priority::Medium),
            3 => Some(Priority::High),
            4 => Some(Priority::Urgent),
            _ => None,
        },
        _ => None,
    }
}

fn value_as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn text_equals(text: &str, target: &Value) -> bool {
    if let (Ok(a), Some(b)) = (text.trim().parse::<f64>(), value_as_f64(target)) {
        return a == b;
    }
    value_as_text(target).is_some_and(|t| t.eq_ignore_ascii_case(text))
}

fn equals(field: &FieldValue, target: &Value) -> bool {
    match field {
        FieldValue::Missing => false,
        FieldValue::Number(n) => value_as_f64(target).is_some_and(|t| *n == t),
        FieldValue::Priority(p) => value_as_priority(target).is_some_and(|t| *p == t),
        FieldValue::Text(s) => text_equals(s, target),
        FieldValue::List(items) => items.iter().any(|item| text_equals(item, target)),
    }
}

fn ordering(field: &FieldValue, target: &Value) -> Option<Ordering> {
    match field {
        FieldValue::Number(n) => n.partial_cmp(&value_as_f64(target)?),
        FieldValue::Priority(p) => Some(p.cmp(&value_as_priority(target)?)),
        FieldValue::Text(s) => s.trim().parse::<f64>().ok()?.partial_cmp(&value_as_f64(target)?),
        FieldValue::Missing | FieldValue::List(_) => None,
    }
}

fn contains(field: &FieldValue, target: &Value) -> bool {
    let Some(needle) = value_as_text(target) else {
        return false;
    };
    match field {
        FieldValue::Text(s) => s.to_lowercase().contains(&needle.to_lowercase()),
        FieldValue::List(items) => items.iter().any(|item| item.eq_ignore_ascii_case(&needle)),
        _ => equals(field, target),
    }
}

fn in_list(field: &FieldValue, target: &Value) -> bool {
    match target {
        Value::Array(options) => options.iter().any(|option| equals(field, option)),
        _ => false,
    }
}

fn regex_matches(field: &FieldValue, target: &Value) -> bool {
    let Some(pattern) = target.as_str() else {
        return false;
    };
    let regex = match Regex::new(pattern) {
        Ok(regex) => regex,
        Err(e) => {
            warn!(pattern = pattern, "Invalid condition pattern: {}", e);
            return false;
        }
    };
    match field {
        FieldValue::Text(s) => regex.is_match(s),
        FieldValue::List(items) => items.iter().any(|item| regex.is_match(item)),
        FieldValue::Number(n) => regex.is_match(&n.to_string()),
        FieldValue::Priority(p) => regex.is_match(p.as_str()),
        FieldValue::Missing => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ApprovalState, TicketStatus};
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap()
    }

    fn ticket() -> Ticket {
        let mut ticket = Ticket::new(42, "Replace broken VPN token", 7, now() - Duration::hours(5));
        ticket.updated_at = now() - Duration::minutes(90);
        ticket.status = TicketStatus::Pending;
        ticket.priority = Priority::High;
        ticket.estimated_cost = Some(1200.0);
        ticket.category_id = Some(3);
        ticket.approval_status = ApprovalState::Pending;
        ticket.tags = vec!["hardware".into(), "Remote".into()];
        ticket.custom_fields.insert("site".into(), "Lisbon".into());
        ticket
    }

    fn check(field: &str, operator: Operator, value: Value) -> bool {
        ConditionEvaluator::new().matches(&Condition::new(field, operator, value), &ticket(), now())
    }

    #[test]
    fn test_equality_on_enums_and_ids() {
        assert!(check("status", Operator::Equals, json!("pending")));
        assert!(check("status", Operator::Equals, json!("PENDING")));
        assert!(check("status", Operator::NotEquals, json!("open")));
        assert!(check("approval_status", Operator::Equals, json!("pending")));
        assert!(check("category_id", Operator::Equals, json!(3)));
        assert!(check("category_id", Operator::Equals, json!("3")));
        assert!(check("requester_id", Operator::Equals, json!(7)));
    }

    #[test]
    fn test_priority_comparisons_use_rank() {
        assert!(check("priority", Operator::GreaterOrEqual, json!("high")));
        assert!(check("priority", Operator::GreaterThan, json!("medium")));
        assert!(check("priority", Operator::LessThan, json!("urgent")));
        assert!(check("priority", Operator::Equals, json!(3)));
        assert!(!check("priority", Operator::GreaterThan, json!("high")));
    }

    #[test]
    fn test_numeric_comparisons() {
        assert!(check("estimated_cost", Operator::GreaterThan, json!(1000)));
        assert!(check("estimated_cost", Operator::GreaterOrEqual, json!("1200")));
        assert!(check("estimated_cost", Operator::LessOrEqual, json!(1200.0)));
        assert!(!check("estimated_cost", Operator::LessThan, json!(1200)));
        assert!(check("hours_since_created", Operator::GreaterOrEqual, json!(5)));
        assert!(check("hours_since_updated", Operator::Equals, json!(1.5)));
    }

    #[test]
    fn test_missing_values_only_match_is_empty() {
        // Ticket is unassigned
        assert!(check("assignee_id", Operator::IsEmpty, Value::Null));
        assert!(!check("assignee_id", Operator::IsNotEmpty, Value::Null));
        assert!(!check("assignee_id", Operator::Equals, json!(1)));
        assert!(!check("assignee_id", Operator::NotEquals, json!(1)));
        assert!(!check("custom.floor", Operator::NotContains, json!("3")));
        assert!(check("custom.floor", Operator::IsEmpty, Value::Null));
    }

    #[test]
    fn test_unknown_fields_never_match() {
        assert!(!check("mood", Operator::IsEmpty, Value::Null));
        assert!(!check("mood", Operator::NotEquals, json!("happy")));
    }

    #[test]
    fn test_text_and_tag_containment() {
        assert!(check("title", Operator::Contains, json!("vpn")));
        assert!(check("title", Operator::NotContains, json!("printer")));
        assert!(check("tags", Operator::Contains, json!("remote")));
        assert!(check("tags", Operator::Equals, json!("hardware")));
        assert!(!check("tags", Operator::Contains, json!("hard")));
        assert!(check("custom.site", Operator::Equals, json!("lisbon")));
    }

    #[test]
    fn test_in_and_not_in() {
        assert!(check("status", Operator::In, json!(["open", "pending"])));
        assert!(!check("status", Operator::In, json!(["resolved", "closed"])));
        assert!(check("status", Operator::NotIn, json!(["resolved", "closed"])));
        assert!(check("priority", Operator::In, json!(["high", "urgent"])));
        // Not an array: neither operator matches
        assert!(!check("status", Operator::In, json!("pending")));
        assert!(!check("status", Operator::NotIn, json!("open")));
    }

    #[test]
    fn test_regex_matching() {
        assert!(check("title", Operator::Matches, json!(r"(?i)^replace\s+broken")));
        assert!(check("tags", Operator::Matches, json!("^Rem")));
        assert!(!check("title", Operator::Matches, json!("^VPN")));
        // Invalid pattern is logged and does not match
        assert!(!check("title", Operator::Matches, json!("([unclosed")));
    }

    #[test]
    fn test_matches_all_requires_every_condition() {
        let evaluator = ConditionEvaluator::new();
        let ticket = ticket();
        let conditions = vec![
            Condition::new("priority", Operator::GreaterOrEqual, "high"),
            Condition::new("status", Operator::Equals, "pending"),
        ];
        assert!(evaluator.matches_all(&conditions, &ticket, now()));
        assert!(evaluator.matches_all(&[], &ticket, now()));

        let mut failing = conditions.clone();
        failing.push(Condition::new("tags", Operator::Contains, "software"));
        assert!(!evaluator.matches_all(&failing, &ticket, now()));
    }
}
