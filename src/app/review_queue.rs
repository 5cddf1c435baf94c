use anyhow::{anyhow, Result};
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, Row};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::app::content::fetch_content_item;
use crate::app::results::fetch_result;
use crate::domain::audit::actions;
use crate::domain::moderation::{clamp_unit, Category};
use crate::domain::review::{
    priority_for, QueueStats, ReviewDecision, ReviewQueueDetail, ReviewQueueEntry, ReviewStatus,
};
use crate::infra::cache::RedisCache;
use crate::infra::db::Db;

pub const STATS_CACHE_KEY: &str = "moderation:queue_stats";

pub(crate) const ENTRY_COLUMNS: &str = "id, post_id, moderation_result_id, priority, \
     status::text AS status, trigger_category, trigger_confidence, reviewer_id, reviewed_at, \
     review_decision::text AS review_decision, review_notes, created_at, updated_at";

#[derive(Debug, Clone, Copy)]
pub struct EnqueueOutcome {
    pub entry_id: Uuid,
    pub inserted: bool,
}

/// Keyset position in the (priority DESC, created_at ASC, id ASC) ordering.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueueCursor {
    pub priority: i32,
    pub created_at: OffsetDateTime,
    pub id: Uuid,
}

impl From<&ReviewQueueEntry> for QueueCursor {
    fn from(entry: &ReviewQueueEntry) -> Self {
        Self {
            priority: entry.priority,
            created_at: entry.created_at,
            id: entry.id,
        }
    }
}

#[derive(Debug)]
pub enum ClaimOutcome {
    Claimed(ReviewQueueEntry),
    NotFound,
    NotPending(ReviewStatus),
}

#[derive(Clone)]
pub struct ReviewQueue {
    db: Db,
}

impl ReviewQueue {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Insert a pending entry for the post, or raise the existing pending
    /// entry's priority and confidence. Never creates a second pending row.
    pub async fn enqueue(
        conn: &mut PgConnection,
        post_id: Uuid,
        moderation_result_id: Option<Uuid>,
        category: Category,
        confidence: f64,
    ) -> Result<EnqueueOutcome> {
        let confidence = clamp_unit(confidence);
        let row = sqlx::query(
            "INSERT INTO review_queue \
             (post_id, moderation_result_id, priority, trigger_category, trigger_confidence) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (post_id) WHERE status = 'pending' DO UPDATE SET \
                 priority = GREATEST(review_queue.priority, EXCLUDED.priority), \
                 trigger_category = CASE \
                     WHEN EXCLUDED.trigger_confidence > review_queue.trigger_confidence \
                     THEN EXCLUDED.trigger_category \
                     ELSE review_queue.trigger_category END, \
                 trigger_confidence = GREATEST(review_queue.trigger_confidence, EXCLUDED.trigger_confidence), \
                 updated_at = NOW() \
             RETURNING id, (xmax = 0) AS inserted",
        )
        .bind(post_id)
        .bind(moderation_result_id)
        .bind(priority_for(confidence))
        .bind(category.as_str())
        .bind(confidence)
        .fetch_one(&mut *conn)
        .await?;

        Ok(EnqueueOutcome {
            entry_id: row.get("id"),
            inserted: row.get("inserted"),
        })
    }

    /// Highest priority first; equal priority oldest first.
    pub async fn list(
        &self,
        status: Option<ReviewStatus>,
        cursor: Option<QueueCursor>,
        limit: i64,
    ) -> Result<Vec<ReviewQueueEntry>> {
        let sql = format!(
            "SELECT {} FROM review_queue \
             WHERE ($1::text IS NULL OR status::text = $1) \
               AND ($2::int IS NULL \
                    OR priority < $2 \
                    OR (priority = $2 AND (created_at, id) > ($3::timestamptz, $4::uuid))) \
             ORDER BY priority DESC, created_at ASC, id ASC \
             LIMIT $5",
            ENTRY_COLUMNS
        );

        let rows = sqlx::query(&sql)
            .bind(status.map(|status| status.as_db()))
            .bind(cursor.map(|cursor| cursor.priority))
            .bind(cursor.map(|cursor| cursor.created_at))
            .bind(cursor.map(|cursor| cursor.id))
            .bind(limit)
            .fetch_all(self.db.pool())
            .await?;

        rows.iter().map(entry_from_row).collect()
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<ReviewQueueDetail>> {
        let mut conn = self.db.pool().acquire().await?;
        let Some(entry) = fetch_entry(&mut *conn, id, false).await? else {
            return Ok(None);
        };

        let content = fetch_content_item(&mut *conn, entry.post_id)
            .await?
            .ok_or_else(|| anyhow!("queue entry {} references missing post {}", id, entry.post_id))?;
        let moderation_result = match entry.moderation_result_id {
            Some(result_id) => fetch_result(&mut *conn, result_id).await?,
            None => None,
        };

        Ok(Some(ReviewQueueDetail {
            entry,
            content,
            moderation_result,
        }))
    }

    /// Move a pending entry to `in_review` for one reviewer.
    pub async fn claim(&self, id: Uuid, reviewer_id: Uuid) -> Result<ClaimOutcome> {
        let sql = format!(
            "UPDATE review_queue \
             SET status = 'in_review', reviewer_id = $2, updated_at = NOW() \
             WHERE id = $1 AND status = 'pending' \
             RETURNING {}",
            ENTRY_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .bind(reviewer_id)
            .fetch_optional(self.db.pool())
            .await?;

        if let Some(row) = row {
            return Ok(ClaimOutcome::Claimed(entry_from_row(&row)?));
        }

        let mut conn = self.db.pool().acquire().await?;
        match fetch_entry(&mut *conn, id, false).await? {
            Some(entry) => Ok(ClaimOutcome::NotPending(entry.status)),
            None => Ok(ClaimOutcome::NotFound),
        }
    }

    pub async fn stats(&self) -> Result<QueueStats> {
        let queue_row = sqlx::query(
            "SELECT \
                 COUNT(*) FILTER (WHERE status = 'pending') AS pending, \
                 COUNT(*) FILTER (WHERE status = 'in_review') AS in_review, \
                 COUNT(*) FILTER (WHERE status = 'escalated') AS escalated, \
                 COUNT(*) FILTER (WHERE status = 'completed' \
                                  AND reviewed_at > NOW() - INTERVAL '24 hours') AS completed_last_24h \
             FROM review_queue",
        )
        .fetch_one(self.db.pool())
        .await?;

        let audit_row = sqlx::query(
            "SELECT \
                 COUNT(*) FILTER (WHERE action = $1) AS auto_rejected, \
                 COUNT(*) FILTER (WHERE action = $2) AS auto_approved \
             FROM audit_log \
             WHERE actor_id IS NULL AND created_at > NOW() - INTERVAL '24 hours'",
        )
        .bind(actions::AUTO_REJECT)
        .bind(actions::AUTO_APPROVE)
        .fetch_one(self.db.pool())
        .await?;

        Ok(QueueStats {
            pending: queue_row.get("pending"),
            in_review: queue_row.get("in_review"),
            escalated: queue_row.get("escalated"),
            completed_last_24h: queue_row.get("completed_last_24h"),
            auto_rejected_last_24h: audit_row.get("auto_rejected"),
            auto_approved_last_24h: audit_row.get("auto_approved"),
        })
    }

    /// Pending entries for one post.
    pub async fn pending_for_post(&self, post_id: Uuid) -> Result<Vec<ReviewQueueEntry>> {
        let sql = format!(
            "SELECT {} FROM review_queue WHERE post_id = $1 AND status = 'pending'",
            ENTRY_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(post_id)
            .fetch_all(self.db.pool())
            .await?;
        rows.iter().map(entry_from_row).collect()
    }
}

/// Drop cached queue stats after a write that changes them. Failures only log.
pub async fn invalidate_cached_stats(cache: &RedisCache) {
    if let Err(err) = cache.delete(STATS_CACHE_KEY).await {
        tracing::warn!(error = ?err, "failed to invalidate queue stats cache");
    }
}

pub(crate) async fn fetch_entry(
    conn: &mut PgConnection,
    id: Uuid,
    for_update: bool,
) -> Result<Option<ReviewQueueEntry>> {
    let sql = format!(
        "SELECT {} FROM review_queue WHERE id = $1{}",
        ENTRY_COLUMNS,
        if for_update { " FOR UPDATE" } else { "" }
    );
    let row = sqlx::query(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    row.as_ref().map(entry_from_row).transpose()
}

pub(crate) fn entry_from_row(row: &PgRow) -> Result<ReviewQueueEntry> {
    let status: String = row.get("status");
    let trigger_category: String = row.get("trigger_category");
    let decision: Option<String> = row.get("review_decision");
    let review_decision = match decision {
        Some(value) => Some(
            ReviewDecision::from_db(&value)
                .ok_or_else(|| anyhow!("unknown review decision: {}", value))?,
        ),
        None => None,
    };

    Ok(ReviewQueueEntry {
        id: row.get("id"),
        post_id: row.get("post_id"),
        moderation_result_id: row.get("moderation_result_id"),
        priority: row.get("priority"),
        status: ReviewStatus::from_db(&status)
            .ok_or_else(|| anyhow!("unknown review status: {}", status))?,
        trigger_category: Category::from_db(&trigger_category)
            .ok_or_else(|| anyhow!("unknown trigger category: {}", trigger_category))?,
        trigger_confidence: row.get("trigger_confidence"),
        reviewer_id: row.get("reviewer_id"),
        reviewed_at: row.get("reviewed_at"),
        review_decision,
        review_notes: row.get("review_notes"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}
