// Periodic escalation runs with overlap prevention.
// An in-process mutex covers concurrent ticks; an exclusive fd-lock on the
// lock file covers a second scheduler or a manual run in another process.

use chrono::Utc;
use fd_lock::RwLock as FileLock;
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use super::checker::{EscalationChecker, EscalationReport};
use super::EscalationError;

pub struct EscalationScheduler {
    checker: Arc<EscalationChecker>,
    interval: Duration,
    lock_path: PathBuf,
    running: Mutex<()>,
}

impl EscalationScheduler {
    pub fn new(checker: Arc<EscalationChecker>, interval: Duration, lock_path: impl Into<PathBuf>) -> Self {
        Self {
            checker,
            interval,
            lock_path: lock_path.into(),
            running: Mutex::new(()),
        }
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    /// Run one escalation pass unless another is in flight.
    /// Returns `None` when the pass was skipped.
    pub async fn run_locked(&self) -> Result<Option<EscalationReport>, EscalationError> {
        let Ok(_in_process) = self.running.try_lock() else {
            warn!("Escalation run already in progress, skipping");
            return Ok(None);
        };

        if let Some(parent) = self.lock_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_path)?;
        let mut lock = FileLock::new(file);

        let mut guard = match lock.try_write() {
            Ok(guard) => guard,
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                warn!(
                    lock = %self.lock_path.display(),
                    "Another process holds the escalation lock, skipping"
                );
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        // Record the holder for operators inspecting a stuck lock
        let holder = hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "unknown".to_string());
        guard.set_len(0)?;
        writeln!(guard, "{} pid={} started={}", holder, std::process::id(), Utc::now().to_rfc3339())?;

        let report = self.checker.run(Utc::now()).await?;
        drop(guard);
        Ok(Some(report))
    }

    /// Tick every `interval` until `shutdown` flips to true
    pub async fn run_until(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), EscalationError> {
        info!(
            interval_secs = self.interval.as_secs(),
            lock = %self.lock_path.display(),
            "Escalation scheduler started"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.run_locked().await {
                        Ok(Some(report)) => info!(
                            fired = report.fired.len(),
                            failures = report.failures,
                            "Scheduled escalation run finished"
                        ),
                        Ok(None) => {}
                        Err(e) => error!("Scheduled escalation run failed: {}", e),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Escalation scheduler stopping");
                        break;
                    }
                }
            }
        }
        Ok(())
    }
}
