use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::{rule_order, HelpdeskStore, StoreError};
use crate::models::{
    ApprovalId, AutomationRule, Category, CategoryId, Department, DepartmentId, EscalationRecord,
    EscalationRule, Role, RuleId, Ticket, TicketApproval, TicketEvent, TicketId, User, UserId,
};
use crate::sla::SlaPolicy;

/// Everything the store holds, in the on-disk JSON layout
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub tickets: Vec<Ticket>,
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub departments: Vec<Department>,
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(default)]
    pub approvals: Vec<TicketApproval>,
    #[serde(default)]
    pub escalation_rules: Vec<EscalationRule>,
    #[serde(default)]
    pub automation_rules: Vec<AutomationRule>,
    #[serde(default)]
    pub sla_policies: Vec<SlaPolicy>,
    #[serde(default)]
    pub escalation_log: Vec<EscalationRecord>,
}

/// In-memory store, optionally backed by a JSON snapshot file
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<Snapshot>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: Snapshot) -> Self {
        Self {
            state: RwLock::new(snapshot),
        }
    }

    /// Load a snapshot file; a missing file yields an empty store
    pub async fn load(path: &Path) -> Result<Self, StoreError> {
        if !fs::try_exists(path).await? {
            info!("No snapshot at {}, starting with an empty store", path.display());
            return Ok(Self::new());
        }

        let raw = fs::read_to_string(path).await?;
        let snapshot: Snapshot = serde_json::from_str(&raw)?;
        debug!(
            tickets = snapshot.tickets.len(),
            approvals = snapshot.approvals.len(),
            rules = snapshot.escalation_rules.len(),
            "Loaded snapshot from {}",
            path.display()
        );
        Ok(Self::with_snapshot(snapshot))
    }

    /// Write the current state to `path`, creating parent directories
    pub async fn save(&self, path: &Path) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let json = serde_json::to_string_pretty(&*self.state.read().await)?;
        // Write-then-rename keeps the previous snapshot intact on failure
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).await?;
        fs::rename(&tmp, path).await?;
        debug!("Saved snapshot to {}", path.display());
        Ok(())
    }

    pub async fn snapshot(&self) -> Snapshot {
        self.state.read().await.clone()
    }
}

fn insert_approval_in(
    state: &mut Snapshot,
    mut approval: TicketApproval,
) -> Result<TicketApproval, StoreError> {
    if approval.is_pending() {
        if let Some(existing) = state
            .approvals
            .iter()
            .find(|a| a.ticket_id == approval.ticket_id && a.is_pending())
        {
            return Err(StoreError::PendingApprovalExists {
                ticket_id: approval.ticket_id,
                approval_id: existing.id,
            });
        }
    }

    approval.id = state.approvals.iter().map(|a| a.id).max().unwrap_or(0) + 1;
    state.approvals.push(approval.clone());
    Ok(approval)
}

fn save_pending_approval_in(state: &mut Snapshot, approval: &TicketApproval) -> Result<(), StoreError> {
    let existing = state
        .approvals
        .iter_mut()
        .find(|a| a.id == approval.id)
        .ok_or(StoreError::NotFound {
            entity: "approval",
            id: approval.id,
        })?;
    if !existing.is_pending() {
        return Err(StoreError::AlreadyDecided {
            approval_id: existing.id,
            status: existing.status,
        });
    }
    *existing = approval.clone();
    Ok(())
}

#[async_trait]
impl HelpdeskStore for MemoryStore {
    async fn ticket(&self, id: TicketId) -> Result<Ticket, StoreError> {
        self.state
            .read()
            .await
            .tickets
            .iter()
            .find(|t| t.id == id)
            .cloned()
            .ok_or(StoreError::NotFound { entity: "ticket", id })
    }

    async fn save_ticket(&self, ticket: &Ticket) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        match state.tickets.iter_mut().find(|t| t.id == ticket.id) {
            Some(existing) => *existing = ticket.clone(),
            None => state.tickets.push(ticket.clone()),
        }
        Ok(())
    }

    async fn next_ticket_id(&self) -> Result<TicketId, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .tickets
            .iter()
            .map(|t| t.id)
            .max()
            .unwrap_or(0)
            + 1)
    }

    async fn open_tickets(&self) -> Result<Vec<Ticket>, StoreError> {
        let state = self.state.read().await;
        let mut tickets: Vec<Ticket> = state
            .tickets
            .iter()
            .filter(|t| t.status.is_open())
            .cloned()
            .collect();
        tickets.sort_by_key(|t| t.id);
        Ok(tickets)
    }

    async fn user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        Ok(self.state.read().await.users.iter().find(|u| u.id == id).cloned())
    }

    async fn users_with_role(&self, role: Role) -> Result<Vec<User>, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .users
            .iter()
            .filter(|u| u.role == role)
            .cloned()
            .collect())
    }

    async fn department(&self, id: DepartmentId) -> Result<Option<Department>, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .departments
            .iter()
            .find(|d| d.id == id)
            .cloned())
    }

    async fn category(&self, id: CategoryId) -> Result<Option<Category>, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .categories
            .iter()
            .find(|c| c.id == id)
            .cloned())
    }

    async fn insert_approval(
        &self,
        approval: TicketApproval,
    ) -> Result<TicketApproval, StoreError> {
        insert_approval_in(&mut *self.state.write().await, approval)
    }

    async fn approval(&self, id: ApprovalId) -> Result<TicketApproval, StoreError> {
        self.state
            .read()
            .await
            .approvals
            .iter()
            .find(|a| a.id == id)
            .cloned()
            .ok_or(StoreError::NotFound { entity: "approval", id })
    }

    async fn save_approval(&self, approval: &TicketApproval) -> Result<(), StoreError> {
        save_pending_approval_in(&mut *self.state.write().await, approval)
    }

    async fn decide_and_request(
        &self,
        decided: &TicketApproval,
        next: TicketApproval,
    ) -> Result<TicketApproval, StoreError> {
        let mut state = self.state.write().await;
        let previous = state.approvals.clone();

        save_pending_approval_in(&mut state, decided)?;
        insert_approval_in(&mut state, next).inspect_err(|_| state.approvals = previous)
    }

    async fn approvals_for_ticket(
        &self,
        ticket_id: TicketId,
    ) -> Result<Vec<TicketApproval>, StoreError> {
        let mut approvals: Vec<TicketApproval> = self
            .state
            .read()
            .await
            .approvals
            .iter()
            .filter(|a| a.ticket_id == ticket_id)
            .cloned()
            .collect();
        approvals.sort_by_key(|a| a.id);
        Ok(approvals)
    }

    async fn pending_approval(
        &self,
        ticket_id: TicketId,
    ) -> Result<Option<TicketApproval>, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .approvals
            .iter()
            .find(|a| a.ticket_id == ticket_id && a.is_pending())
            .cloned())
    }

    async fn active_escalation_rules(&self) -> Result<Vec<EscalationRule>, StoreError> {
        let mut rules: Vec<EscalationRule> = self
            .state
            .read()
            .await
            .escalation_rules
            .iter()
            .filter(|r| r.active)
            .cloned()
            .collect();
        rules.sort_by(|a, b| rule_order(a.priority, a.id, b.priority, b.id));
        Ok(rules)
    }

    async fn active_automation_rules(
        &self,
        event: TicketEvent,
    ) -> Result<Vec<AutomationRule>, StoreError> {
        let mut rules: Vec<AutomationRule> = self
            .state
            .read()
            .await
            .automation_rules
            .iter()
            .filter(|r| r.active && r.event == event)
            .cloned()
            .collect();
        rules.sort_by(|a, b| rule_order(a.priority, a.id, b.priority, b.id));
        Ok(rules)
    }

    async fn sla_policies(&self) -> Result<Vec<SlaPolicy>, StoreError> {
        Ok(self.state.read().await.sla_policies.clone())
    }

    async fn escalation_fired(
        &self,
        rule_id: RuleId,
        ticket_id: TicketId,
    ) -> Result<bool, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .escalation_log
            .iter()
            .any(|r| r.rule_id == rule_id && r.ticket_id == ticket_id))
    }

    async fn record_escalation(&self, record: EscalationRecord) -> Result<(), StoreError> {
        self.state.write().await.escalation_log.push(record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ApprovalLevel, ApprovalStatus, EscalationTrigger, TriggerKind};
    use chrono::{TimeZone, Utc};

    fn now() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
    }

    fn rule(id: RuleId, priority: i32, active: bool) -> EscalationRule {
        EscalationRule {
            id,
            name: format!("rule {id}"),
            description: String::new(),
            trigger: EscalationTrigger {
                kind: TriggerKind::MinutesSinceCreated,
                minutes: 30,
            },
            conditions: vec![],
            actions: vec![],
            priority,
            active,
        }
    }

    #[tokio::test]
    async fn test_second_pending_approval_is_refused() {
        let store = MemoryStore::new();
        let first = store
            .insert_approval(TicketApproval::pending(1, ApprovalLevel::Lm, Some(2), now()))
            .await
            .unwrap();
        assert_eq!(first.id, 1);

        let err = store
            .insert_approval(TicketApproval::pending(1, ApprovalLevel::Hod, Some(3), now()))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::PendingApprovalExists { ticket_id: 1, approval_id: 1 }
        ));

        // A different ticket is unaffected
        let other = store
            .insert_approval(TicketApproval::pending(2, ApprovalLevel::Lm, None, now()))
            .await
            .unwrap();
        assert_eq!(other.id, 2);
    }

    #[tokio::test]
    async fn test_decided_approval_cannot_be_saved_again() {
        let store = MemoryStore::new();
        let pending = store
            .insert_approval(TicketApproval::pending(1, ApprovalLevel::Lm, Some(2), now()))
            .await
            .unwrap();

        let mut rejected = pending.clone();
        rejected.mark_rejected(None, now());
        store.save_approval(&rejected).await.unwrap();

        let mut approved = pending.clone();
        approved.mark_approved(None, now());
        let err = store.save_approval(&approved).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::AlreadyDecided { approval_id: 1, status: ApprovalStatus::Rejected }
        ));
    }

    #[tokio::test]
    async fn test_failed_follow_up_keeps_decision_pending() {
        let store = MemoryStore::new();
        let lm = store
            .insert_approval(TicketApproval::pending(1, ApprovalLevel::Lm, Some(2), now()))
            .await
            .unwrap();
        store
            .insert_approval(TicketApproval::pending(2, ApprovalLevel::Lm, Some(2), now()))
            .await
            .unwrap();

        let mut decided = lm.clone();
        decided.mark_approved(None, now());
        let err = store
            .decide_and_request(&decided, TicketApproval::pending(2, ApprovalLevel::Hod, Some(3), now()))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::PendingApprovalExists { ticket_id: 2, approval_id: 2 }));
        assert!(store.approval(lm.id).await.unwrap().is_pending());
        assert_eq!(store.snapshot().await.approvals.len(), 2);

        let hod = store
            .decide_and_request(&decided, TicketApproval::pending(1, ApprovalLevel::Hod, Some(3), now()))
            .await
            .unwrap();
        assert_eq!(hod.id, 3);
        assert_eq!(store.approval(lm.id).await.unwrap().status, ApprovalStatus::Approved);
        assert_eq!(store.pending_approval(1).await.unwrap(), Some(hod));
    }

    #[tokio::test]
    async fn test_active_rules_are_ordered_by_priority() {
        let store = MemoryStore::with_snapshot(Snapshot {
            escalation_rules: vec![rule(1, 1, true), rule(2, 10, true), rule(3, 50, false), rule(4, 10, true)],
            ..Default::default()
        });

        let ids: Vec<RuleId> = store
            .active_escalation_rules()
            .await
            .unwrap()
            .iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![2, 4, 1]);
    }

    #[tokio::test]
    async fn test_snapshot_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("desk.json");

        let store = MemoryStore::new();
        store
            .save_ticket(&Ticket::new(5, "Broken chair", 1, now()))
            .await
            .unwrap();
        store.save(&path).await.unwrap();

        let reloaded = MemoryStore::load(&path).await.unwrap();
        let ticket = reloaded.ticket(5).await.unwrap();
        assert_eq!(ticket.title, "Broken chair");
        assert_eq!(reloaded.next_ticket_id().await.unwrap(), 6);
        assert!(matches!(
            reloaded.ticket(6).await,
            Err(StoreError::NotFound { entity: "ticket", id: 6 })
        ));
    }

    #[tokio::test]
    async fn test_missing_snapshot_gives_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::load(&dir.path().join("absent.json")).await.unwrap();
        assert!(store.open_tickets().await.unwrap().is_empty());
    }
}
