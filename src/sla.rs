//! SLA clock
//!
//! Response and resolution due times come from the active policy whose
//! priority matches the ticket. The escalation checker uses the breach
//! checks as time triggers.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::models::Ticket;
use crate::priority::Priority;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlaPolicy {
    pub id: u64,
    pub name: String,
    pub priority: Priority,
    pub response_minutes: i64,
    pub resolution_minutes: i64,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// Pick the policy that governs a ticket, if any
pub fn policy_for<'a>(policies: &'a [SlaPolicy], ticket: &Ticket) -> Option<&'a SlaPolicy> {
    policies
        .iter()
        .filter(|p| p.active && p.priority == ticket.priority)
        .min_by_key(|p| p.id)
}

#[derive(Debug, Clone, Copy)]
pub struct SlaClock<'a> {
    policy: &'a SlaPolicy,
    ticket: &'a Ticket,
}

impl<'a> SlaClock<'a> {
    pub fn new(policy: &'a SlaPolicy, ticket: &'a Ticket) -> Self {
        Self { policy, ticket }
    }

    /// `None` when the policy's minutes fall outside the representable range
    pub fn response_due(&self) -> Option<DateTime<Utc>> {
        offset(self.ticket.created_at, self.policy.response_minutes)
    }

    pub fn resolution_due(&self) -> Option<DateTime<Utc>> {
        offset(self.ticket.created_at, self.policy.resolution_minutes)
    }

    pub fn response_breached(&self, now: DateTime<Utc>, grace_minutes: i64) -> bool {
        self.ticket.first_response_at.is_none()
            && self
                .response_due()
                .and_then(|due| offset(due, grace_minutes))
                .is_some_and(|deadline| now >= deadline)
    }

    pub fn resolution_breached(&self, now: DateTime<Utc>, grace_minutes: i64) -> bool {
        self.ticket.resolved_at.is_none()
            && self
                .resolution_due()
                .and_then(|due| offset(due, grace_minutes))
                .is_some_and(|deadline| now >= deadline)
    }
}

// Minutes come from stored policies and rules; out-of-range values never breach
fn offset(at: DateTime<Utc>, minutes: i64) -> Option<DateTime<Utc>> {
    TimeDelta::try_minutes(minutes).and_then(|delta| at.checked_add_signed(delta))
}
