use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::{Notification, Notifier, NotifyError};

/// Appends notifications to a JSONL outbox for a mailer to pick up
#[derive(Debug, Clone)]
pub struct OutboxNotifier {
    path: PathBuf,
}

impl OutboxNotifier {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl Notifier for OutboxNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        // One JSON object per line
        let content = format!("{}\n", serde_json::to_string(notification)?);

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(content.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use crate::notifications::{NotificationKind, Recipient};
    use chrono::{TimeZone, Utc};

    #[tokio::test]
    async fn test_outbox_appends_one_line_per_notification() {
        let dir = tempfile::tempdir().unwrap();
        let outbox = OutboxNotifier::new(dir.path().join("mail").join("outbox.jsonl"));

        for (ticket_id, recipient) in [(1, Recipient::User(4)), (2, Recipient::Role(Role::Admin))] {
            outbox
                .notify(&Notification {
                    recipient,
                    ticket_id,
                    kind: NotificationKind::Escalation,
                    message: format!("ticket {ticket_id} escalated"),
                    created_at: Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap(),
                })
                .await
                .unwrap();
        }

        let written = std::fs::read_to_string(outbox.path()).unwrap();
        let lines: Vec<Notification> = written
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1].recipient, Recipient::Role(Role::Admin));
        assert!(written.contains("\"type\":\"role\""));
    }
}
