use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::automation::AutomationEngine;
use crate::config::HelpdeskConfig;
use crate::escalation::EscalationChecker;
use crate::notifications::{LogNotifier, Notifier, OutboxNotifier};
use crate::store::{HelpdeskStore, MemoryStore, SnapshotLock};
use crate::workflows::ApprovalWorkflowEngine;

pub mod decide;
pub mod escalate;
#[cfg(feature = "database")]
pub mod import;
pub mod rules;
pub mod schedule;
pub mod status;
pub mod submit;

#[allow(async_fn_in_trait)]
pub trait Command {
    async fn execute(&self) -> Result<()>;
}

/// JSON-file state, locked from load until the desk is dropped
struct SnapshotFile {
    memory: Arc<MemoryStore>,
    path: PathBuf,
    _lock: SnapshotLock,
}

/// Store, notifier and engines for one CLI invocation
pub struct Desk {
    store: Arc<dyn HelpdeskStore>,
    snapshot: Option<SnapshotFile>,
    notifier: Arc<dyn Notifier>,
    config: HelpdeskConfig,
}

impl Desk {
    /// Open the configured database, or the JSON snapshot at `data`
    pub async fn open(data: &Path, config: &HelpdeskConfig) -> Result<Self> {
        let notifier: Arc<dyn Notifier> = match &config.notifications.outbox_path {
            Some(path) => Arc::new(OutboxNotifier::new(path)),
            None => Arc::new(LogNotifier),
        };

        #[cfg(feature = "database")]
        if config.database.is_some() {
            crate::database::init_database().await?;
            if let Some(store) = crate::database::database_store().await {
                return Ok(Self {
                    store: Arc::new(store),
                    snapshot: None,
                    notifier,
                    config: config.clone(),
                });
            }
        }

        // Held until the desk is dropped
        let lock = SnapshotLock::acquire(data).await?;
        let memory = Arc::new(MemoryStore::load(data).await?);
        info!("Using snapshot store at {}", data.display());
        Ok(Self {
            store: memory.clone(),
            snapshot: Some(SnapshotFile {
                memory,
                path: data.to_path_buf(),
                _lock: lock,
            }),
            notifier,
            config: config.clone(),
        })
    }

    pub fn store(&self) -> &Arc<dyn HelpdeskStore> {
        &self.store
    }

    pub fn config(&self) -> &HelpdeskConfig {
        &self.config
    }

    pub fn is_snapshot(&self) -> bool {
        self.snapshot.is_some()
    }

    /// Write snapshot-backed state back to disk; no-op for a database.
    /// The snapshot stays locked until the desk is dropped.
    pub async fn persist(&self) -> Result<()> {
        if let Some(snapshot) = &self.snapshot {
            snapshot.memory.save(&snapshot.path).await?;
        }
        Ok(())
    }

    pub fn automation(&self) -> Arc<AutomationEngine> {
        Arc::new(AutomationEngine::new(self.store.clone(), self.notifier.clone()))
    }

    pub fn approval_engine(&self) -> ApprovalWorkflowEngine {
        ApprovalWorkflowEngine::new(
            self.store.clone(),
            self.notifier.clone(),
            self.config.approval.clone(),
        )
        .with_automation(self.automation())
    }

    pub fn escalation_checker(&self) -> Arc<EscalationChecker> {
        Arc::new(EscalationChecker::new(self.store.clone(), self.notifier.clone()))
    }
}

pub fn show_usage() -> Result<()> {
    println!("🎫 Helpdesk - approval routing and ticket escalation");
    println!();
    println!("To get started:");
    println!("  📝 helpdesk submit --title <text> --requester <id>   # Raise a ticket");
    println!("  ✅ helpdesk approve <approval> --actor <id>          # Approve a pending request");
    println!("  ❌ helpdesk reject <approval> --actor <id>           # Reject a pending request");
    println!("  📊 helpdesk status [ticket]                          # Open tickets or one ticket");
    println!();
    println!("Escalation:");
    println!("  ⏫ helpdesk escalate    # Run one escalation pass");
    println!("  ⏱️  helpdesk schedule    # Run passes every 15 minutes");
    println!("  📋 helpdesk rules       # Show active rules in evaluation order");
    println!();
    println!("💡 State lives in .helpdesk/desk.json unless a database is configured");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Ticket;
    use chrono::Utc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_open_desk_holds_off_other_writers() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("desk.json");
        let config = HelpdeskConfig::default();

        let first = Desk::open(&data, &config).await.unwrap();
        assert!(first.is_snapshot());

        let second = {
            let (data, config) = (data.clone(), config.clone());
            tokio::spawn(async move {
                let desk = Desk::open(&data, &config).await?;
                let mut ticket = desk.store().ticket(1).await?;
                ticket.tags.push("second".to_string());
                desk.store().save_ticket(&ticket).await?;
                desk.persist().await
            })
        };
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!second.is_finished());

        let ticket = Ticket::new(1, "Printer jam", 7, Utc::now());
        first.store().save_ticket(&ticket).await.unwrap();
        first.persist().await.unwrap();
        drop(first);

        tokio::time::timeout(Duration::from_secs(5), second)
            .await
            .expect("second desk never opened")
            .unwrap()
            .unwrap();

        // The second writer saw the first one's ticket instead of clobbering it
        let saved = MemoryStore::load(&data).await.unwrap().ticket(1).await.unwrap();
        assert_eq!(saved.title, "Printer jam");
        assert_eq!(saved.tags, vec!["second".to_string()]);
    }
}
