use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::models::{ApprovalId, CategoryId, DepartmentId, TicketId, UserId};
use crate::priority::Priority;

pub mod commands;

#[derive(Parser)]
#[command(name = "helpdesk")]
#[command(about = "Approval routing and escalation for helpdesk tickets")]
#[command(long_about = "Routes new tickets through line manager and head of department approval, \
                       and escalates stale tickets on a schedule. Get started with 'helpdesk submit' \
                       to raise a ticket.")]
pub struct Cli {
    /// JSON snapshot holding tickets, directory data and rules
    #[arg(
        long,
        global = true,
        default_value = ".helpdesk/desk.json",
        help = "Snapshot file used when no database is configured"
    )]
    pub data: PathBuf,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Raise a ticket and route it for approval
    Submit {
        #[arg(long, help = "Short summary of the request")]
        title: String,
        #[arg(long, help = "User id of the person raising the ticket")]
        requester: UserId,
        #[arg(long, default_value = "", help = "Longer description of the request")]
        description: String,
        #[arg(long, help = "Category id; decides whether approval is needed")]
        category: Option<CategoryId>,
        #[arg(long, help = "Department the request is for")]
        department: Option<DepartmentId>,
        #[arg(long, help = "Estimated cost; at or above the threshold needs HOD sign-off")]
        cost: Option<f64>,
        #[arg(long, default_value = "medium", help = "Priority: low, medium, high, urgent")]
        priority: Priority,
    },
    /// Approve a pending approval
    Approve {
        /// Approval id
        approval: ApprovalId,
        #[arg(long, help = "User id of the approver")]
        actor: UserId,
        #[arg(long, help = "Comment recorded on the approval")]
        comment: Option<String>,
    },
    /// Reject a pending approval
    Reject {
        /// Approval id
        approval: ApprovalId,
        #[arg(long, help = "User id of the approver")]
        actor: UserId,
        #[arg(long, help = "Reason recorded on the approval")]
        comment: Option<String>,
    },
    /// Run one escalation pass over open tickets
    Escalate {
        #[arg(long, help = "Print the run report as JSON")]
        json: bool,
    },
    /// Run escalation passes on a fixed interval until interrupted
    Schedule {
        #[arg(long, help = "Minutes between runs (default from configuration, 15)")]
        interval_minutes: Option<u64>,
    },
    /// Show open tickets, or one ticket with its approval history
    Status {
        /// Ticket id
        ticket: Option<TicketId>,
    },
    /// List active escalation and automation rules in evaluation order
    Rules,
    /// Load a JSON snapshot into the configured database
    #[cfg(feature = "database")]
    Import {
        /// Snapshot file to import
        snapshot: PathBuf,
    },
}
