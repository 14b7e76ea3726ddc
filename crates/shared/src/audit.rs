//! Audit logging module - tracks sensitive actions
//!
//! Entries are append-only. Every write goes through [`record`], which
//! accepts any SQLite executor so callers can log inside the same
//! transaction as the change being audited.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqliteExecutor;

use crate::types::{HealthResult, PaginatedResult, PaginationInput};

/// Stored audit trail entry
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct AuditLogEntry {
    pub id: i64,
    pub user_id: Option<i64>,
    pub action: String,
    pub resource_type: Option<String>,
    pub resource_id: Option<i64>,
    pub details: Option<String>,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// An action about to be written to the audit trail
#[derive(Clone, Debug, Default)]
pub struct AuditEvent {
    pub user_id: Option<i64>,
    pub action: String,
    pub resource_type: Option<String>,
    pub resource_id: Option<i64>,
    pub details: Option<String>,
    pub ip_address: Option<String>,
}

impl AuditEvent {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            ..Default::default()
        }
    }

    pub fn by(mut self, user_id: i64) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn on(mut self, resource_type: &str, resource_id: i64) -> Self {
        self.resource_type = Some(resource_type.to_string());
        self.resource_id = Some(resource_id);
        self
    }

    pub fn details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn from_ip(mut self, ip_address: Option<&str>) -> Self {
        self.ip_address = ip_address.map(str::to_string);
        self
    }
}

/// Append an event to the audit trail
pub async fn record<'e, E>(executor: E, event: AuditEvent, at: DateTime<Utc>) -> HealthResult<i64>
where
    E: SqliteExecutor<'e>,
{
    let id = sqlx::query(
        "INSERT INTO audit_logs (user_id, action, resource_type, resource_id, details, ip_address, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(event.user_id)
    .bind(&event.action)
    .bind(&event.resource_type)
    .bind(event.resource_id)
    .bind(&event.details)
    .bind(&event.ip_address)
    .bind(at)
    .execute(executor)
    .await?
    .last_insert_rowid();

    tracing::info!(
        target: "audit",
        user_id = ?event.user_id,
        action = %event.action,
        resource_type = ?event.resource_type,
        resource_id = ?event.resource_id,
        "audit event recorded"
    );

    Ok(id)
}

/// Most recent audit entries first
pub async fn list<'e, E>(executor: E, pagination: &PaginationInput) -> HealthResult<Vec<AuditLogEntry>>
where
    E: SqliteExecutor<'e>,
{
    let (limit, offset) = pagination.sql_bounds();
    let entries = sqlx::query_as::<_, AuditLogEntry>(
        "SELECT id, user_id, action, resource_type, resource_id, details, ip_address, created_at
         FROM audit_logs ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(executor)
    .await?;
    Ok(entries)
}

pub async fn count<'e, E>(executor: E) -> HealthResult<usize>
where
    E: SqliteExecutor<'e>,
{
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM audit_logs")
        .fetch_one(executor)
        .await?;
    Ok(total as usize)
}

/// Page of the audit trail
pub async fn page(
    pool: &sqlx::SqlitePool,
    pagination: &PaginationInput,
) -> HealthResult<PaginatedResult<AuditLogEntry>> {
    pagination.validate()?;
    let total = count(pool).await?;
    if total == 0 {
        return Ok(PaginatedResult::empty(pagination));
    }
    let items = list(pool, pagination).await?;
    Ok(PaginatedResult::new(items, total, pagination))
}
