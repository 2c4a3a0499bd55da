use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use super::escalate::print_report;
use super::{Command, Desk};
use crate::config::HelpdeskConfig;
use crate::escalation::EscalationScheduler;
use crate::shutdown::ShutdownCoordinator;

pub struct ScheduleCommand {
    pub data: PathBuf,
    pub config: HelpdeskConfig,
    pub interval_minutes: Option<u64>,
}

impl ScheduleCommand {
    fn interval(&self) -> Duration {
        let minutes = self
            .interval_minutes
            .unwrap_or(self.config.escalation.interval_minutes)
            .max(1);
        Duration::from_secs(minutes * 60)
    }

    /// Snapshot-backed desks are reopened every tick so tickets raised by
    /// other commands are seen, and saved again after the run.
    async fn run_snapshot_ticks(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut ticker = tokio::time::interval(self.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let desk = Desk::open(&self.data, &self.config).await?;
                    let scheduler = EscalationScheduler::new(
                        desk.escalation_checker(),
                        self.interval(),
                        &self.config.escalation.lock_path,
                    );
                    match scheduler.run_locked().await {
                        Ok(Some(report)) => {
                            desk.persist().await?;
                            print_report(&report);
                        }
                        Ok(None) => {}
                        Err(e) => error!("Scheduled escalation run failed: {}", e),
                    }
                }
                _ = shutdown.changed() => {
                    info!("Escalation schedule stopping");
                    return Ok(());
                }
            }
        }
    }
}

impl Command for ScheduleCommand {
    async fn execute(&self) -> Result<()> {
        let coordinator = Arc::new(ShutdownCoordinator::new());
        let shutdown = coordinator.subscribe();
        println!(
            "⏱️  Running escalation every {} minutes (Ctrl-C to stop)",
            self.interval().as_secs() / 60
        );

        // The current pass finishes before the loops observe shutdown
        let signals = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                if let Err(e) = coordinator.wait_for_shutdown().await {
                    error!("Failed to listen for shutdown signal: {}", e);
                }
            })
        };

        let desk = Desk::open(&self.data, &self.config).await?;
        let result = if desk.is_snapshot() {
            drop(desk);
            self.run_snapshot_ticks(shutdown).await
        } else {
            let scheduler = EscalationScheduler::new(
                desk.escalation_checker(),
                self.interval(),
                &self.config.escalation.lock_path,
            );
            scheduler
                .run_until(shutdown)
                .await
                .map_err(anyhow::Error::from)
        };

        signals.abort();
        ShutdownCoordinator::shutdown_all_services().await?;
        result
    }
}
