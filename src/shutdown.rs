use anyhow::Result;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{info, warn};

/// Graceful shutdown coordinator for long-running helpdesk services
pub struct ShutdownCoordinator {
    sender: watch::Sender<bool>,
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self { sender }
    }

    /// Receiver that flips to `true` once shutdown starts
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }

    pub fn trigger(&self) {
        info!("Shutdown requested");
        self.sender.send_replace(true);
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.sender.borrow()
    }

    /// Wait for SIGINT and signal every subscriber
    pub async fn wait_for_shutdown(&self) -> Result<()> {
        info!("Shutdown coordinator ready - will shutdown gracefully on SIGINT");
        tokio::signal::ctrl_c().await?;
        self.trigger();
        Ok(())
    }

    /// Perform graceful shutdown operations
    pub async fn shutdown_all_services() -> Result<()> {
        info!("Initiating graceful shutdown of all services...");

        crate::observability::workflow_metrics().log_stats();

        if timeout(Duration::from_secs(5), crate::database::shutdown_database())
            .await
            .is_err()
        {
            warn!("Timeout waiting for database connections to close");
        }

        info!("Graceful shutdown completed successfully");
        Ok(())
    }
}
