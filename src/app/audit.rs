use anyhow::Result;
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, Row};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::audit::AuditEntry;
use crate::infra::db::Db;

/// Append-only trail of automated and manual moderation actions.
#[derive(Clone)]
pub struct AuditLog {
    db: Db,
}

impl AuditLog {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Write one entry on the caller's connection, so it commits or rolls back
    /// together with the action it records.
    pub async fn append(
        conn: &mut PgConnection,
        actor_id: Option<Uuid>,
        action: &str,
        target_type: &str,
        target_id: Uuid,
        details: Value,
    ) -> Result<Uuid> {
        let id: Uuid = sqlx::query_scalar(
            "INSERT INTO audit_log (actor_id, action, target_type, target_id, details) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING id",
        )
        .bind(actor_id)
        .bind(action)
        .bind(target_type)
        .bind(target_id)
        .bind(details)
        .fetch_one(&mut *conn)
        .await?;

        Ok(id)
    }

    pub async fn list(
        &self,
        cursor: Option<(OffsetDateTime, Uuid)>,
        limit: i64,
    ) -> Result<Vec<AuditEntry>> {
        let rows = match cursor {
            Some((created_at, entry_id)) => {
                sqlx::query(
                    "SELECT id, actor_id, action, target_type, target_id, details, created_at \
                     FROM audit_log \
                     WHERE (created_at < $1 OR (created_at = $1 AND id < $2)) \
                     ORDER BY created_at DESC, id DESC \
                     LIMIT $3",
                )
                .bind(created_at)
                .bind(entry_id)
                .bind(limit)
                .fetch_all(self.db.pool())
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT id, actor_id, action, target_type, target_id, details, created_at \
                     FROM audit_log \
                     ORDER BY created_at DESC, id DESC \
                     LIMIT $1",
                )
                .bind(limit)
                .fetch_all(self.db.pool())
                .await?
            }
        };

        Ok(rows.iter().map(entry_from_row).collect())
    }

    /// Every entry recorded against one target, oldest first.
    pub async fn list_for_target(&self, target_type: &str, target_id: Uuid) -> Result<Vec<AuditEntry>> {
        let rows = sqlx::query(
            "SELECT id, actor_id, action, target_type, target_id, details, created_at \
             FROM audit_log \
             WHERE target_type = $1 AND target_id = $2 \
             ORDER BY created_at ASC, id ASC",
        )
        .bind(target_type)
        .bind(target_id)
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows.iter().map(entry_from_row).collect())
    }
}

fn entry_from_row(row: &PgRow) -> AuditEntry {
    AuditEntry {
        id: row.get("id"),
        actor_id: row.get("actor_id"),
        action: row.get("action"),
        target_type: row.get("target_type"),
        target_id: row.get("target_id"),
        details: row.get("details"),
        created_at: row.get("created_at"),
    }
}
