#[cfg(feature = "database")]
use async_trait::async_trait;
#[cfg(feature = "database")]
use serde::{de::DeserializeOwned, Serialize};
#[cfg(feature = "database")]
use sqlx::{
    migrate::MigrateDatabase, sqlite::SqlitePoolOptions, sqlite::SqliteRow, Executor, Row,
    Sqlite, SqliteConnection, SqlitePool,
};
#[cfg(feature = "database")]
use tracing::info;

#[cfg(feature = "database")]
use crate::models::{
    ApprovalId, AutomationRule, Category, CategoryId, Department, DepartmentId, EscalationRecord,
    EscalationRule, EscalationTrigger, Role, RuleId, Ticket, TicketApproval, TicketEvent,
    TicketId, User, UserId,
};
#[cfg(feature = "database")]
use crate::sla::SlaPolicy;
#[cfg(feature = "database")]
use crate::store::{HelpdeskStore, Snapshot, StoreError};

#[cfg(feature = "database")]
/// Database manager for persistent helpdesk state
pub struct DatabaseManager {
    pool: SqlitePool,
}

#[cfg(feature = "database")]
impl DatabaseManager {
    /// Initialize database with automatic migrations
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        auto_migrate: bool,
    ) -> Result<Self, StoreError> {
        // Create database if it doesn't exist
        if !Sqlite::database_exists(database_url).await? {
            info!("Creating database at {}", database_url);
            Sqlite::create_database(database_url).await?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        if auto_migrate {
            info!("Running database migrations...");
            sqlx::migrate!("./migrations").run(&pool).await?;
            info!("Database migrations completed");
        }

        Ok(Self { pool })
    }

    /// Get database pool for queries
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Store handle sharing this manager's pool
    pub fn store(&self) -> SqliteStore {
        SqliteStore::new(self.pool.clone())
    }

    /// Close database connections gracefully
    pub async fn shutdown(&self) {
        info!("Shutting down database connections...");
        self.pool.close().await;
        info!("Database connections closed");
    }
}

#[cfg(feature = "database")]
/// `HelpdeskStore` backed by SQLite
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

#[cfg(feature = "database")]
fn enum_text<T: Serialize>(value: &T) -> Result<String, StoreError> {
    match serde_json::to_value(value)? {
        serde_json::Value::String(s) => Ok(s),
        other => Err(StoreError::Corrupt(format!("expected a unit variant, got {other}"))),
    }
}

#[cfg(feature = "database")]
fn enum_from<T: DeserializeOwned>(text: String) -> Result<T, StoreError> {
    Ok(serde_json::from_value(serde_json::Value::String(text))?)
}

#[cfg(feature = "database")]
fn id_of(row: &SqliteRow, column: &str) -> Result<u64, StoreError> {
    Ok(row.try_get::<i64, _>(column)? as u64)
}

#[cfg(feature = "database")]
fn opt_id_of(row: &SqliteRow, column: &str) -> Result<Option<u64>, StoreError> {
    Ok(row.try_get::<Option<i64>, _>(column)?.map(|id| id as u64))
}

#[cfg(feature = "database")]
fn opt_id(id: Option<u64>) -> Option<i64> {
    id.map(|id| id as i64)
}

#[cfg(feature = "database")]
async fn insert_approval_on(
    conn: &mut SqliteConnection,
    mut approval: TicketApproval,
) -> Result<TicketApproval, StoreError> {
    if approval.is_pending() {
        let existing = sqlx::query(
            "SELECT id FROM ticket_approvals WHERE ticket_id = ?1 AND status = 'pending' LIMIT 1",
        )
        .bind(approval.ticket_id as i64)
        .fetch_optional(&mut *conn)
        .await?;

        if let Some(row) = existing {
            return Err(StoreError::PendingApprovalExists {
                ticket_id: approval.ticket_id,
                approval_id: id_of(&row, "id")?,
            });
        }
    }

    let result = sqlx::query(
        r#"
        INSERT INTO ticket_approvals (
            ticket_id, approval_level, status, approver_id, comments,
            approved_at, rejected_at, created_at, updated_at
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
    )
    .bind(approval.ticket_id as i64)
    .bind(enum_text(&approval.approval_level)?)
    .bind(enum_text(&approval.status)?)
    .bind(opt_id(approval.approver_id))
    .bind(&approval.comments)
    .bind(approval.approved_at)
    .bind(approval.rejected_at)
    .bind(approval.created_at)
    .bind(approval.updated_at)
    .execute(&mut *conn)
    .await?;

    approval.id = result.last_insert_rowid() as u64;
    Ok(approval)
}

#[cfg(feature = "database")]
/// Updates the row only while it is still pending
async fn save_pending_approval_on(
    conn: &mut SqliteConnection,
    approval: &TicketApproval,
) -> Result<(), StoreError> {
    let result = sqlx::query(
        r#"
        UPDATE ticket_approvals
        SET status = ?2, approver_id = ?3, comments = ?4,
            approved_at = ?5, rejected_at = ?6, updated_at = ?7
        WHERE id = ?1 AND status = 'pending'
        "#,
    )
    .bind(approval.id as i64)
    .bind(enum_text(&approval.status)?)
    .bind(opt_id(approval.approver_id))
    .bind(&approval.comments)
    .bind(approval.approved_at)
    .bind(approval.rejected_at)
    .bind(approval.updated_at)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() > 0 {
        return Ok(());
    }

    let current = sqlx::query("SELECT status FROM ticket_approvals WHERE id = ?1")
        .bind(approval.id as i64)
        .fetch_optional(&mut *conn)
        .await?;
    match current {
        Some(row) => Err(StoreError::AlreadyDecided {
            approval_id: approval.id,
            status: enum_from(row.try_get("status")?)?,
        }),
        None => Err(StoreError::NotFound {
            entity: "approval",
            id: approval.id,
        }),
    }
}

#[cfg(feature = "database")]
fn ticket_from_row(row: &SqliteRow) -> Result<Ticket, StoreError> {
    Ok(Ticket {
        id: id_of(row, "id")?,
        ticket_number: row.try_get("ticket_number")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        status: enum_from(row.try_get("status")?)?,
        priority: enum_from(row.try_get("priority")?)?,
        estimated_cost: row.try_get("estimated_cost")?,
        category_id: opt_id_of(row, "category_id")?,
        department_id: opt_id_of(row, "department_id")?,
        requester_id: id_of(row, "requester_id")?,
        assignee_id: opt_id_of(row, "assignee_id")?,
        approval_status: enum_from(row.try_get("approval_status")?)?,
        tags: serde_json::from_str(&row.try_get::<String, _>("tags")?)?,
        custom_fields: serde_json::from_str(&row.try_get::<String, _>("custom_fields")?)?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        first_response_at: row.try_get("first_response_at")?,
        resolved_at: row.try_get("resolved_at")?,
    })
}

#[cfg(feature = "database")]
fn approval_from_row(row: &SqliteRow) -> Result<TicketApproval, StoreError> {
    Ok(TicketApproval {
        id: id_of(row, "id")?,
        ticket_id: id_of(row, "ticket_id")?,
        approval_level: enum_from(row.try_get("approval_level")?)?,
        status: enum_from(row.try_get("status")?)?,
        approver_id: opt_id_of(row, "approver_id")?,
        comments: row.try_get("comments")?,
        approved_at: row.try_get("approved_at")?,
        rejected_at: row.try_get("rejected_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[cfg(feature = "database")]
fn user_from_row(row: &SqliteRow) -> Result<User, StoreError> {
    Ok(User {
        id: id_of(row, "id")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        role: enum_from(row.try_get("role")?)?,
        department_id: opt_id_of(row, "department_id")?,
        manager_id: opt_id_of(row, "manager_id")?,
    })
}

#[cfg(feature = "database")]
fn escalation_rule_from_row(row: &SqliteRow) -> Result<EscalationRule, StoreError> {
    Ok(EscalationRule {
        id: id_of(row, "id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        trigger: EscalationTrigger {
            kind: enum_from(row.try_get("trigger_kind")?)?,
            minutes: row.try_get("trigger_minutes")?,
        },
        conditions: serde_json::from_str(&row.try_get::<String, _>("conditions")?)?,
        actions: serde_json::from_str(&row.try_get::<String, _>("actions")?)?,
        priority: row.try_get("priority")?,
        active: row.try_get("active")?,
    })
}

#[cfg(feature = "database")]
fn automation_rule_from_row(row: &SqliteRow) -> Result<AutomationRule, StoreError> {
    Ok(AutomationRule {
        id: id_of(row, "id")?,
        name: row.try_get("name")?,
        event: enum_from(row.try_get("event")?)?,
        conditions: serde_json::from_str(&row.try_get::<String, _>("conditions")?)?,
        actions: serde_json::from_str(&row.try_get::<String, _>("actions")?)?,
        priority: row.try_get("priority")?,
        active: row.try_get("active")?,
        stop_processing: row.try_get("stop_processing")?,
    })
}

#[cfg(feature = "database")]
async fn upsert_ticket<'e, E>(executor: E, ticket: &Ticket) -> Result<(), StoreError>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT OR REPLACE INTO tickets (
            id, ticket_number, title, description, status, priority, estimated_cost,
            category_id, department_id, requester_id, assignee_id, approval_status,
            tags, custom_fields, created_at, updated_at, first_response_at, resolved_at
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)
        "#,
    )
    .bind(ticket.id as i64)
    .bind(&ticket.ticket_number)
    .bind(&ticket.title)
    .bind(&ticket.description)
    .bind(enum_text(&ticket.status)?)
    .bind(enum_text(&ticket.priority)?)
    .bind(ticket.estimated_cost)
    .bind(opt_id(ticket.category_id))
    .bind(opt_id(ticket.department_id))
    .bind(ticket.requester_id as i64)
    .bind(opt_id(ticket.assignee_id))
    .bind(enum_text(&ticket.approval_status)?)
    .bind(serde_json::to_string(&ticket.tags)?)
    .bind(serde_json::to_string(&ticket.custom_fields)?)
    .bind(ticket.created_at)
    .bind(ticket.updated_at)
    .bind(ticket.first_response_at)
    .bind(ticket.resolved_at)
    .execute(executor)
    .await?;

    Ok(())
}

#[cfg(feature = "database")]
async fn upsert_approval<'e, E>(executor: E, approval: &TicketApproval) -> Result<(), StoreError>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT OR REPLACE INTO ticket_approvals (
            id, ticket_id, approval_level, status, approver_id, comments,
            approved_at, rejected_at, created_at, updated_at
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        "#,
    )
    .bind(approval.id as i64)
    .bind(approval.ticket_id as i64)
    .bind(enum_text(&approval.approval_level)?)
    .bind(enum_text(&approval.status)?)
    .bind(opt_id(approval.approver_id))
    .bind(&approval.comments)
    .bind(approval.approved_at)
    .bind(approval.rejected_at)
    .bind(approval.created_at)
    .bind(approval.updated_at)
    .execute(executor)
    .await?;

    Ok(())
}

#[cfg(feature = "database")]
impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Load directory data, rules and any existing tickets from a JSON
    /// snapshot in one transaction. Rows with matching ids are replaced.
    pub async fn import_snapshot(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        for user in &snapshot.users {
            sqlx::query(
                "INSERT OR REPLACE INTO users (id, name, email, role, department_id, manager_id) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )
            .bind(user.id as i64)
            .bind(&user.name)
            .bind(&user.email)
            .bind(enum_text(&user.role)?)
            .bind(opt_id(user.department_id))
            .bind(opt_id(user.manager_id))
            .execute(&mut *tx)
            .await?;
        }

        for department in &snapshot.departments {
            sqlx::query("INSERT OR REPLACE INTO departments (id, name, head_id) VALUES (?1, ?2, ?3)")
                .bind(department.id as i64)
                .bind(&department.name)
                .bind(opt_id(department.head_id))
                .execute(&mut *tx)
                .await?;
        }

        for category in &snapshot.categories {
            sqlx::query(
                "INSERT OR REPLACE INTO categories (id, name, department_id, requires_approval) VALUES (?1, ?2, ?3, ?4)",
            )
            .bind(category.id as i64)
            .bind(&category.name)
            .bind(opt_id(category.department_id))
            .bind(category.requires_approval)
            .execute(&mut *tx)
            .await?;
        }

        for rule in &snapshot.escalation_rules {
            sqlx::query(
                r#"
                INSERT OR REPLACE INTO escalation_rules (
                    id, name, description, trigger_kind, trigger_minutes,
                    conditions, actions, priority, active
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
            )
            .bind(rule.id as i64)
            .bind(&rule.name)
            .bind(&rule.description)
            .bind(enum_text(&rule.trigger.kind)?)
            .bind(rule.trigger.minutes)
            .bind(serde_json::to_string(&rule.conditions)?)
            .bind(serde_json::to_string(&rule.actions)?)
            .bind(rule.priority)
            .bind(rule.active)
            .execute(&mut *tx)
            .await?;
        }

        for rule in &snapshot.automation_rules {
            sqlx::query(
                r#"
                INSERT OR REPLACE INTO automation_rules (
                    id, name, event, conditions, actions, priority, active, stop_processing
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
            )
            .bind(rule.id as i64)
            .bind(&rule.name)
            .bind(enum_text(&rule.event)?)
            .bind(serde_json::to_string(&rule.conditions)?)
            .bind(serde_json::to_string(&rule.actions)?)
            .bind(rule.priority)
            .bind(rule.active)
            .bind(rule.stop_processing)
            .execute(&mut *tx)
            .await?;
        }

        for policy in &snapshot.sla_policies {
            sqlx::query(
                r#"
                INSERT OR REPLACE INTO sla_policies (
                    id, name, priority, response_minutes, resolution_minutes, active
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
            )
            .bind(policy.id as i64)
            .bind(&policy.name)
            .bind(enum_text(&policy.priority)?)
            .bind(policy.response_minutes)
            .bind(policy.resolution_minutes)
            .bind(policy.active)
            .execute(&mut *tx)
            .await?;
        }

        for ticket in &snapshot.tickets {
            upsert_ticket(&mut *tx, ticket).await?;
        }

        for approval in &snapshot.approvals {
            upsert_approval(&mut *tx, approval).await?;
        }

        for record in &snapshot.escalation_log {
            sqlx::query(
                "INSERT OR IGNORE INTO escalation_log (rule_id, ticket_id, fired_at) VALUES (?1, ?2, ?3)",
            )
            .bind(record.rule_id as i64)
            .bind(record.ticket_id as i64)
            .bind(record.fired_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        info!(
            users = snapshot.users.len(),
            tickets = snapshot.tickets.len(),
            escalation_rules = snapshot.escalation_rules.len(),
            "Imported snapshot into database"
        );
        Ok(())
    }
}

#[cfg(feature = "database")]
#[async_trait]
impl HelpdeskStore for SqliteStore {
    async fn ticket(&self, id: TicketId) -> Result<Ticket, StoreError> {
        let row = sqlx::query("SELECT * FROM tickets WHERE id = ?1")
            .bind(id as i64)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound { entity: "ticket", id })?;
        ticket_from_row(&row)
    }

    async fn save_ticket(&self, ticket: &Ticket) -> Result<(), StoreError> {
        upsert_ticket(&self.pool, ticket).await
    }

    async fn next_ticket_id(&self) -> Result<TicketId, StoreError> {
        let next: i64 = sqlx::query("SELECT COALESCE(MAX(id), 0) + 1 AS next_id FROM tickets")
            .fetch_one(&self.pool)
            .await?
            .try_get("next_id")?;
        Ok(next as u64)
    }

    async fn open_tickets(&self) -> Result<Vec<Ticket>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM tickets
            WHERE status NOT IN ('resolved', 'closed', 'cancelled')
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let tickets = rows
            .iter()
            .map(ticket_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        // The status filter above is a prefilter; `is_open` is authoritative
        Ok(tickets.into_iter().filter(|t| t.status.is_open()).collect())
    }

    async fn user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        sqlx::query("SELECT * FROM users WHERE id = ?1")
            .bind(id as i64)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| user_from_row(&row))
            .transpose()
    }

    async fn users_with_role(&self, role: Role) -> Result<Vec<User>, StoreError> {
        sqlx::query("SELECT * FROM users WHERE role = ?1 ORDER BY id ASC")
            .bind(enum_text(&role)?)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(user_from_row)
            .collect()
    }

    async fn department(&self, id: DepartmentId) -> Result<Option<Department>, StoreError> {
        let row = sqlx::query("SELECT id, name, head_id FROM departments WHERE id = ?1")
            .bind(id as i64)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| {
            Ok(Department {
                id: id_of(&row, "id")?,
                name: row.try_get("name")?,
                head_id: opt_id_of(&row, "head_id")?,
            })
        })
        .transpose()
    }

    async fn category(&self, id: CategoryId) -> Result<Option<Category>, StoreError> {
        let row = sqlx::query(
            "SELECT id, name, department_id, requires_approval FROM categories WHERE id = ?1",
        )
        .bind(id as i64)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            Ok(Category {
                id: id_of(&row, "id")?,
                name: row.try_get("name")?,
                department_id: opt_id_of(&row, "department_id")?,
                requires_approval: row.try_get("requires_approval")?,
            })
        })
        .transpose()
    }

    async fn insert_approval(
        &self,
        approval: TicketApproval,
    ) -> Result<TicketApproval, StoreError> {
        let mut tx = self.pool.begin().await?;
        let approval = insert_approval_on(&mut tx, approval).await?;
        tx.commit().await?;
        Ok(approval)
    }

    async fn approval(&self, id: ApprovalId) -> Result<TicketApproval, StoreError> {
        let row = sqlx::query("SELECT * FROM ticket_approvals WHERE id = ?1")
            .bind(id as i64)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound { entity: "approval", id })?;
        approval_from_row(&row)
    }

    async fn save_approval(&self, approval: &TicketApproval) -> Result<(), StoreError> {
        let mut conn = self.pool.acquire().await?;
        save_pending_approval_on(&mut conn, approval).await
    }

    async fn decide_and_request(
        &self,
        decided: &TicketApproval,
        next: TicketApproval,
    ) -> Result<TicketApproval, StoreError> {
        // Dropping the transaction on error rolls back the decision
        let mut tx = self.pool.begin().await?;
        save_pending_approval_on(&mut tx, decided).await?;
        let next = insert_approval_on(&mut tx, next).await?;
        tx.commit().await?;
        Ok(next)
    }

    async fn approvals_for_ticket(
        &self,
        ticket_id: TicketId,
    ) -> Result<Vec<TicketApproval>, StoreError> {
        sqlx::query("SELECT * FROM ticket_approvals WHERE ticket_id = ?1 ORDER BY id ASC")
            .bind(ticket_id as i64)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(approval_from_row)
            .collect()
    }

    async fn pending_approval(
        &self,
        ticket_id: TicketId,
    ) -> Result<Option<TicketApproval>, StoreError> {
        sqlx::query(
            "SELECT * FROM ticket_approvals WHERE ticket_id = ?1 AND status = 'pending' LIMIT 1",
        )
        .bind(ticket_id as i64)
        .fetch_optional(&self.pool)
        .await?
        .map(|row| approval_from_row(&row))
        .transpose()
    }

    async fn active_escalation_rules(&self) -> Result<Vec<EscalationRule>, StoreError> {
        sqlx::query("SELECT * FROM escalation_rules WHERE active = 1 ORDER BY priority DESC, id ASC")
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(escalation_rule_from_row)
            .collect()
    }

    async fn active_automation_rules(
        &self,
        event: TicketEvent,
    ) -> Result<Vec<AutomationRule>, StoreError> {
        sqlx::query(
            r#"
            SELECT * FROM automation_rules
            WHERE active = 1 AND event = ?1
            ORDER BY priority DESC, id ASC
            "#,
        )
        .bind(enum_text(&event)?)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(automation_rule_from_row)
        .collect()
    }

    async fn sla_policies(&self) -> Result<Vec<SlaPolicy>, StoreError> {
        let rows = sqlx::query("SELECT * FROM sla_policies ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| {
                Ok(SlaPolicy {
                    id: id_of(row, "id")?,
                    name: row.try_get("name")?,
                    priority: enum_from(row.try_get("priority")?)?,
                    response_minutes: row.try_get("response_minutes")?,
                    resolution_minutes: row.try_get("resolution_minutes")?,
                    active: row.try_get("active")?,
                })
            })
            .collect()
    }

    async fn escalation_fired(
        &self,
        rule_id: RuleId,
        ticket_id: TicketId,
    ) -> Result<bool, StoreError> {
        let row = sqlx::query(
            "SELECT 1 AS fired FROM escalation_log WHERE rule_id = ?1 AND ticket_id = ?2",
        )
        .bind(rule_id as i64)
        .bind(ticket_id as i64)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    async fn record_escalation(&self, record: EscalationRecord) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT OR IGNORE INTO escalation_log (rule_id, ticket_id, fired_at) VALUES (?1, ?2, ?3)",
        )
        .bind(record.rule_id as i64)
        .bind(record.ticket_id as i64)
        .bind(record.fired_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(feature = "database")]
static DB_MANAGER: std::sync::LazyLock<
    std::sync::Arc<tokio::sync::RwLock<Option<DatabaseManager>>>,
> = std::sync::LazyLock::new(|| std::sync::Arc::new(tokio::sync::RwLock::new(None)));

#[cfg(feature = "database")]
/// Initialize database manager
pub async fn init_database() -> anyhow::Result<()> {
    let config = crate::config::config()?;

    if let Some(db_config) = &config.database {
        info!("Initializing database at {}", db_config.url);

        let manager = DatabaseManager::new(
            &db_config.url,
            db_config.max_connections,
            db_config.auto_migrate,
        )
        .await?;

        let mut db_guard = DB_MANAGER.write().await;
        *db_guard = Some(manager);

        info!("Database manager initialized successfully");
    } else {
        info!("Database not configured, skipping initialization");
    }

    Ok(())
}

#[cfg(feature = "database")]
/// Store over the initialized database, if one is configured
pub async fn database_store() -> Option<SqliteStore> {
    DB_MANAGER.read().await.as_ref().map(DatabaseManager::store)
}

#[cfg(feature = "database")]
/// Shutdown database connections
pub async fn shutdown_database() {
    let db_guard = DB_MANAGER.read().await;
    if let Some(ref manager) = *db_guard {
        manager.shutdown().await;
    }
}

// Stub implementations for when database feature is not enabled
#[cfg(not(feature = "database"))]
pub async fn init_database() -> anyhow::Result<()> {
    tracing::info!("Database feature not enabled, skipping database initialization");
    Ok(())
}

#[cfg(not(feature = "database"))]
pub async fn shutdown_database() {
    tracing::info!("Database feature not enabled, no database to shutdown");
}

#[cfg(all(test, feature = "database"))]
mod tests {
    use super::*;
    use crate::models::{ApprovalLevel, ApprovalStatus, TicketStatus, TriggerKind};
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn now() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
    }

    async fn store(dir: &TempDir) -> SqliteStore {
        let url = format!("sqlite://{}", dir.path().join("desk.db").display());
        DatabaseManager::new(&url, 2, true).await.unwrap().store()
    }

    #[tokio::test]
    async fn test_ticket_round_trip_and_open_filter() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;

        let mut ticket = Ticket::new(1, "VPN down", 7, now());
        ticket.estimated_cost = Some(120.0);
        ticket.tags.push("network".to_string());
        store.save_ticket(&ticket).await.unwrap();

        let mut closed = Ticket::new(2, "Old request", 7, now());
        closed.status = TicketStatus::Closed;
        store.save_ticket(&closed).await.unwrap();

        assert_eq!(store.ticket(1).await.unwrap(), ticket);
        let open: Vec<TicketId> = store.open_tickets().await.unwrap().iter().map(|t| t.id).collect();
        assert_eq!(open, vec![1]);
        assert_eq!(store.next_ticket_id().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_single_pending_approval_per_ticket() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;

        let first = store
            .insert_approval(TicketApproval::pending(1, ApprovalLevel::Lm, Some(2), now()))
            .await
            .unwrap();
        let err = store
            .insert_approval(TicketApproval::pending(1, ApprovalLevel::Hod, Some(3), now()))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::PendingApprovalExists { ticket_id: 1, .. }));

        let mut decided = first.clone();
        decided.mark_approved(Some("ok".to_string()), now());
        store.save_approval(&decided).await.unwrap();

        let hod = store
            .insert_approval(TicketApproval::pending(1, ApprovalLevel::Hod, Some(3), now()))
            .await
            .unwrap();
        let history = store.approvals_for_ticket(1).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].status, ApprovalStatus::Approved);
        assert_eq!(store.pending_approval(1).await.unwrap(), Some(hod));
    }

    #[tokio::test]
    async fn test_decided_approval_is_not_overwritten() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;

        let pending = store
            .insert_approval(TicketApproval::pending(1, ApprovalLevel::Lm, Some(2), now()))
            .await
            .unwrap();

        let mut approved = pending.clone();
        approved.mark_approved(None, now());
        store.save_approval(&approved).await.unwrap();

        // A second process deciding from its stale copy loses
        let mut rejected = pending.clone();
        rejected.mark_rejected(Some("too late".to_string()), now());
        let err = store.save_approval(&rejected).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::AlreadyDecided { status: ApprovalStatus::Approved, .. }
        ));
        assert_eq!(store.approval(pending.id).await.unwrap().status, ApprovalStatus::Approved);

        let mut missing = pending.clone();
        missing.id = 99;
        assert!(matches!(
            store.save_approval(&missing).await.unwrap_err(),
            StoreError::NotFound { id: 99, .. }
        ));
    }

    #[tokio::test]
    async fn test_decide_and_request_rolls_back_together() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;

        let lm = store
            .insert_approval(TicketApproval::pending(1, ApprovalLevel::Lm, Some(2), now()))
            .await
            .unwrap();
        let other = store
            .insert_approval(TicketApproval::pending(2, ApprovalLevel::Lm, Some(2), now()))
            .await
            .unwrap();

        let mut decided = lm.clone();
        decided.mark_approved(None, now());

        // The follow-up collides with ticket 2's pending approval
        let err = store
            .decide_and_request(&decided, TicketApproval::pending(2, ApprovalLevel::Hod, Some(3), now()))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::PendingApprovalExists { ticket_id: 2, approval_id } if approval_id == other.id));
        assert_eq!(store.approval(lm.id).await.unwrap().status, ApprovalStatus::Pending);

        let hod = store
            .decide_and_request(&decided, TicketApproval::pending(1, ApprovalLevel::Hod, Some(3), now()))
            .await
            .unwrap();
        assert_eq!(store.approval(lm.id).await.unwrap().status, ApprovalStatus::Approved);
        assert_eq!(store.pending_approval(1).await.unwrap(), Some(hod));
    }

    #[tokio::test]
    async fn test_imported_rules_and_escalation_log() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;

        let rule = |id: RuleId, priority: i32| EscalationRule {
            id,
            name: format!("rule {id}"),
            description: String::new(),
            trigger: EscalationTrigger {
                kind: TriggerKind::MinutesUnassigned,
                minutes: 60,
            },
            conditions: vec![],
            actions: vec![],
            priority,
            active: true,
        };
        store
            .import_snapshot(&Snapshot {
                escalation_rules: vec![rule(1, 1), rule(2, 9)],
                ..Default::default()
            })
            .await
            .unwrap();

        let ids: Vec<RuleId> = store
            .active_escalation_rules()
            .await
            .unwrap()
            .iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![2, 1]);

        assert!(!store.escalation_fired(2, 5).await.unwrap());
        let record = EscalationRecord {
            rule_id: 2,
            ticket_id: 5,
            fired_at: now(),
        };
        store.record_escalation(record.clone()).await.unwrap();
        store.record_escalation(record).await.unwrap();
        assert!(store.escalation_fired(2, 5).await.unwrap());
    }
}
