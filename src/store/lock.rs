// Exclusive lock around a snapshot file's load/modify/save cycle.
// The fd-lock guard lives on a blocking task until the holder is dropped.

use fd_lock::RwLock as FileLock;
use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use tokio::sync::oneshot;
use tracing::debug;

use super::StoreError;

/// Held for as long as a CLI invocation works on the snapshot
#[derive(Debug)]
pub struct SnapshotLock {
    path: PathBuf,
    _release: oneshot::Sender<()>,
}

impl SnapshotLock {
    /// Lock file that guards `data`, e.g. `desk.lock` next to `desk.json`
    pub fn path_for(data: &Path) -> PathBuf {
        data.with_extension("lock")
    }

    /// Wait until no other process or desk holds the snapshot
    pub async fn acquire(data: &Path) -> Result<Self, StoreError> {
        let path = Self::path_for(data);
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)?;

        let (acquired_tx, acquired_rx) = oneshot::channel::<io::Result<()>>();
        let (release_tx, release_rx) = oneshot::channel::<()>();

        tokio::task::spawn_blocking(move || {
            let mut lock = FileLock::new(file);
            match lock.write() {
                Ok(_guard) => {
                    if acquired_tx.send(Ok(())).is_ok() {
                        // Resolves when the holder drops its sender
                        release_rx.blocking_recv().ok();
                    }
                }
                Err(e) => {
                    acquired_tx.send(Err(e)).ok();
                }
            };
        });

        acquired_rx
            .await
            .map_err(|_| io::Error::other("snapshot lock task exited"))??;
        debug!("Acquired snapshot lock {}", path.display());

        Ok(Self {
            path,
            _release: release_tx,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_second_holder_waits_for_release() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("state").join("desk.json");

        let first = SnapshotLock::acquire(&data).await.unwrap();
        assert_eq!(first.path(), dir.path().join("state").join("desk.lock"));

        let waiter = {
            let data = data.clone();
            tokio::spawn(async move { SnapshotLock::acquire(&data).await.map(|_| ()) })
        };
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!waiter.is_finished());

        drop(first);
        tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .expect("lock was not released")
            .unwrap()
            .unwrap();
    }
}
