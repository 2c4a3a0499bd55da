use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{ApprovalId, TicketId, UserId};

/// Sign-off level: Line Manager first, Head of Department for costly requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalLevel {
    Lm,
    Hod,
}

impl ApprovalLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            ApprovalLevel::Lm => "lm",
            ApprovalLevel::Hod => "hod",
        }
    }
}

impl FromStr for ApprovalLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lm" => Ok(ApprovalLevel::Lm),
            "hod" => Ok(ApprovalLevel::Hod),
            other => Err(format!("unknown approval level '{other}'")),
        }
    }
}

impl fmt::Display for ApprovalLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApprovalLevel::Lm => write!(f, "Line Manager"),
            ApprovalLevel::Hod => write!(f, "Head of Department"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
        }
    }
}

impl FromStr for ApprovalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(ApprovalStatus::Pending),
            "approved" => Ok(ApprovalStatus::Approved),
            "rejected" => Ok(ApprovalStatus::Rejected),
            other => Err(format!("unknown approval status '{other}'")),
        }
    }
}

/// One sign-off request against a ticket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketApproval {
    pub id: ApprovalId,
    pub ticket_id: TicketId,
    pub approval_level: ApprovalLevel,
    pub status: ApprovalStatus,
    #[serde(default)]
    pub approver_id: Option<UserId>,
    #[serde(default)]
    pub comments: Option<String>,
    #[serde(default)]
    pub approved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub rejected_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TicketApproval {
    /// A pending request. The id is assigned by the store on insert.
    pub fn pending(
        ticket_id: TicketId,
        level: ApprovalLevel,
        approver_id: Option<UserId>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: 0,
            ticket_id,
            approval_level: level,
            status: ApprovalStatus::Pending,
            approver_id,
            comments: None,
            approved_at: None,
            rejected_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == ApprovalStatus::Pending
    }

    pub fn mark_approved(&mut self, comment: Option<String>, now: DateTime<Utc>) {
        self.status = ApprovalStatus::Approved;
        self.comments = comment;
        self.approved_at = Some(now);
        self.updated_at = now;
    }

    pub fn mark_rejected(&mut self, comment: Option<String>, now: DateTime<Utc>) {
        self.status = ApprovalStatus::Rejected;
        self.comments = comment;
        self.rejected_at = Some(now);
        self.updated_at = now;
    }
}
