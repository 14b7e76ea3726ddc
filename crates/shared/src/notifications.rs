//! In-app notifications for state changes a user should hear about

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqliteExecutor;

use crate::access_control::Caller;
use crate::types::{HealthError, HealthResult};
use crate::ServiceContext;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct Notification {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub message: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// Queue a notification for a user
pub async fn notify<'e, E>(
    executor: E,
    user_id: i64,
    title: &str,
    message: &str,
    at: DateTime<Utc>,
) -> HealthResult<i64>
where
    E: SqliteExecutor<'e>,
{
    let id = sqlx::query(
        "INSERT INTO notifications (user_id, title, message, is_read, created_at) VALUES (?, ?, ?, 0, ?)",
    )
    .bind(user_id)
    .bind(title)
    .bind(message)
    .bind(at)
    .execute(executor)
    .await?
    .last_insert_rowid();

    tracing::debug!(user_id, notification_id = id, title, "notification queued");
    Ok(id)
}

/// The caller's notifications, newest first
pub async fn list_notifications(
    ctx: &ServiceContext,
    caller: &Caller,
    unread_only: bool,
) -> HealthResult<Vec<Notification>> {
    let notifications = sqlx::query_as::<_, Notification>(
        "SELECT id, user_id, title, message, is_read, created_at
         FROM notifications
         WHERE user_id = ? AND (? = 0 OR is_read = 0)
         ORDER BY created_at DESC, id DESC",
    )
    .bind(caller.user_id)
    .bind(unread_only)
    .fetch_all(ctx.db.pool())
    .await?;
    Ok(notifications)
}

/// Mark one of the caller's notifications as read
pub async fn mark_read(ctx: &ServiceContext, caller: &Caller, notification_id: i64) -> HealthResult<()> {
    let result = sqlx::query("UPDATE notifications SET is_read = 1 WHERE id = ? AND user_id = ?")
        .bind(notification_id)
        .bind(caller.user_id)
        .execute(ctx.db.pool())
        .await?;

    if result.rows_affected() == 0 {
        return Err(HealthError::NotFound("Notification not found".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access_control::Role;
    use crate::clock::FixedClock;
    use crate::db::Database;
    use chrono::TimeZone;
    use std::sync::Arc;

    async fn setup() -> (ServiceContext, i64, i64) {
        let db = Database::in_memory().await.unwrap();
        db.migrate().await.unwrap();
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();
        let mut ids = Vec::new();
        for email in ["a@example.com", "b@example.com"] {
            let id = sqlx::query(
                "INSERT INTO users (email, password_hash, role, first_name, last_name, is_active, verification_status, created_at, updated_at)
                 VALUES (?, 'x', 'patient', 'A', 'B', 1, 'not_required', ?, ?)",
            )
            .bind(email)
            .bind(now)
            .bind(now)
            .execute(db.pool())
            .await
            .unwrap()
            .last_insert_rowid();
            ids.push(id);
        }
        let ctx = ServiceContext::new(db, Arc::new(FixedClock::new(now)));
        (ctx, ids[0], ids[1])
    }

    #[tokio::test]
    async fn test_notify_list_and_mark_read() {
        let (ctx, alice, _) = setup().await;
        let now = ctx.clock.now();
        let id = notify(ctx.db.pool(), alice, "Appointment confirmed", "See you soon", now)
            .await
            .unwrap();

        let caller = Caller::new(alice, Role::Patient);
        let unread = list_notifications(&ctx, &caller, true).await.unwrap();
        assert_eq!(unread.len(), 1);
        assert!(!unread[0].is_read);

        mark_read(&ctx, &caller, id).await.unwrap();
        assert!(list_notifications(&ctx, &caller, true).await.unwrap().is_empty());
        assert_eq!(list_notifications(&ctx, &caller, false).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cannot_mark_someone_elses_notification() {
        let (ctx, alice, bob) = setup().await;
        let id = notify(ctx.db.pool(), alice, "Hi", "Private", ctx.clock.now()).await.unwrap();

        let result = mark_read(&ctx, &Caller::new(bob, Role::Patient), id).await;
        assert!(matches!(result, Err(HealthError::NotFound(_))));
    }
}
