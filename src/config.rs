use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::models::Role;

/// Main configuration structure for the helpdesk workflow service
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct HelpdeskConfig {
    /// Approval routing settings
    pub approval: ApprovalConfig,
    /// Escalation scheduler settings
    pub escalation: EscalationConfig,
    /// Observability settings
    pub observability: ObservabilityConfig,
    /// Notification delivery settings
    pub notifications: NotificationConfig,
    /// Database settings (optional)
    pub database: Option<DatabaseConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApprovalConfig {
    /// Estimated cost at or above which a HOD approval follows the LM approval
    pub hod_threshold: f64,
    /// Requester roles whose tickets skip approval entirely
    pub auto_approve_roles: Vec<Role>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EscalationConfig {
    /// Minutes between scheduled escalation runs
    pub interval_minutes: u64,
    /// Lock file guarding against overlapping runs
    pub lock_path: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level
    pub log_level: String,
    /// Emit JSON log lines instead of human readable output
    pub json_logs: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct NotificationConfig {
    /// JSONL outbox for notifications; logged only when unset
    pub outbox_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Database URL (SQLite file path or connection string)
    pub url: String,
    /// Maximum connections in pool
    pub max_connections: u32,
    /// Enable automatic migrations
    pub auto_migrate: bool,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            hod_threshold: 5000.0,
            auto_approve_roles: vec![Role::Admin, Role::Executive],
        }
    }
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            interval_minutes: 15,
            lock_path: ".helpdesk/escalation.lock".to_string(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

impl HelpdeskConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. Configuration files (helpdesk.toml, .helpdesk-rc)
    /// 3. Environment variables (prefixed with HELPDESK__)
    pub fn load() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if Path::new("helpdesk.toml").exists() {
            builder = builder.add_source(File::with_name("helpdesk"));
        }

        if Path::new(".helpdesk-rc").exists() {
            builder = builder.add_source(File::with_name(".helpdesk-rc").format(config::FileFormat::Toml));
        }

        builder = builder.add_source(
            Environment::with_prefix("HELPDESK")
                .separator("__")
                .try_parsing(true),
        );

        Ok(builder.build()?.try_deserialize()?)
    }

    /// Load defaults overlaid with a single TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(Config::try_from(&Self::default())?)
            .add_source(File::from(path.as_ref()).format(config::FileFormat::Toml))
            .build()?;
        Ok(config.try_deserialize()?)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_content = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_content)?;
        Ok(())
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }
}

/// Global configuration instance
static CONFIG: std::sync::LazyLock<Result<HelpdeskConfig, anyhow::Error>> =
    std::sync::LazyLock::new(|| {
        // Load .env file first
        let _ = HelpdeskConfig::load_env_file();
        HelpdeskConfig::load()
    });

/// Get the global configuration
pub fn config() -> Result<&'static HelpdeskConfig> {
    CONFIG
        .as_ref()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))
}

/// Initialize configuration (called at startup)
pub fn init_config() -> Result<()> {
    let _config = config()?;
    tracing::info!("Configuration loaded successfully");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = HelpdeskConfig::default();
        assert_eq!(config.approval.hod_threshold, 5000.0);
        assert_eq!(config.approval.auto_approve_roles, vec![Role::Admin, Role::Executive]);
        assert_eq!(config.escalation.interval_minutes, 15);
        assert!(config.notifications.outbox_path.is_none());
        assert!(config.database.is_none());
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("helpdesk.toml");
        std::fs::write(
            &path,
            r#"
[approval]
hod_threshold = 2500.0
auto_approve_roles = ["admin"]

[escalation]
interval_minutes = 5
"#,
        )
        .unwrap();

        let config = HelpdeskConfig::load_from_file(&path).unwrap();
        assert_eq!(config.approval.hod_threshold, 2500.0);
        assert_eq!(config.approval.auto_approve_roles, vec![Role::Admin]);
        assert_eq!(config.escalation.interval_minutes, 5);
        // Untouched sections keep their defaults
        assert_eq!(config.escalation.lock_path, ".helpdesk/escalation.lock");
        assert_eq!(config.observability.log_level, "info");
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("saved.toml");
        let mut config = HelpdeskConfig::default();
        config.notifications.outbox_path = Some("outbox.jsonl".to_string());
        config.save_to_file(&path).unwrap();

        let reloaded = HelpdeskConfig::load_from_file(&path).unwrap();
        assert_eq!(reloaded.notifications.outbox_path.as_deref(), Some("outbox.jsonl"));
        assert_eq!(reloaded.approval.hod_threshold, 5000.0);
    }
}
