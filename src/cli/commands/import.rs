use anyhow::Result;
use std::path::PathBuf;

use super::Command;
use crate::config::HelpdeskConfig;
use crate::store::MemoryStore;

pub struct ImportCommand {
    pub config: HelpdeskConfig,
    pub snapshot: PathBuf,
}

impl Command for ImportCommand {
    async fn execute(&self) -> Result<()> {
        if self.config.database.is_none() {
            anyhow::bail!("No database configured; set [database] in helpdesk.toml");
        }
        crate::database::init_database().await?;
        let Some(store) = crate::database::database_store().await else {
            anyhow::bail!("Database failed to initialize");
        };

        let snapshot = MemoryStore::load(&self.snapshot).await?.snapshot().await;
        store.import_snapshot(&snapshot).await?;
        println!(
            "📥 Imported {} users, {} tickets and {} escalation rules from {}",
            snapshot.users.len(),
            snapshot.tickets.len(),
            snapshot.escalation_rules.len(),
            self.snapshot.display()
        );
        Ok(())
    }
}
