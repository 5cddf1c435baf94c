use anyhow::{anyhow, Result};
use serde_json::json;
use sqlx::PgConnection;
use uuid::Uuid;

use crate::app::audit::AuditLog;
use crate::app::content::{
    approve_and_unhide, ban_user, lock_owner, reject_and_hide, DEFAULT_REJECT_REASON,
};
use crate::app::review_queue::{entry_from_row, fetch_entry, ENTRY_COLUMNS};
use crate::domain::audit::{actions, targets};
use crate::domain::moderation::Category;
use crate::domain::review::{ReviewDecision, ReviewQueueEntry, ReviewStatus};
use crate::infra::db::Db;

#[derive(Debug)]
pub enum ReviewDecisionOutcome {
    Applied(ReviewQueueEntry),
    NotFound,
    AlreadyResolved(ReviewStatus),
    ClaimedByOther(Option<Uuid>),
}

/// Applies moderation side effects (visibility, bans) together with their
/// audit entries.
#[derive(Clone)]
pub struct ModerationActions {
    db: Db,
}

impl ModerationActions {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Hide the post, ban its owner if not already banned, and record both.
    /// Runs on the caller's transaction. Returns whether this call banned the
    /// owner.
    pub async fn auto_reject_and_ban(
        conn: &mut PgConnection,
        post_id: Uuid,
        category: Category,
        confidence: f64,
        reasoning: &str,
    ) -> Result<bool> {
        let owner_id = lock_owner(conn, post_id)
            .await?
            .ok_or_else(|| anyhow!("post not found: {}", post_id))?;

        let summary = format!(
            "Automatically removed: {} detected with {:.0}% confidence",
            category.as_str(),
            confidence * 100.0
        );
        reject_and_hide(conn, post_id, &summary).await?;
        let newly_banned = ban_user(conn, owner_id).await?;

        AuditLog::append(
            conn,
            None,
            actions::AUTO_REJECT,
            targets::POST,
            post_id,
            json!({
                "owner_id": owner_id,
                "category": category.as_str(),
                "confidence": confidence,
                "reasoning": reasoning,
                "hidden_reason": summary,
            }),
        )
        .await?;

        AuditLog::append(
            conn,
            None,
            actions::AUTO_BAN,
            targets::USER,
            owner_id,
            json!({
                "post_id": post_id,
                "category": category.as_str(),
                "confidence": confidence,
                "already_banned": !newly_banned,
            }),
        )
        .await?;

        if newly_banned {
            tracing::warn!(
                post_id = %post_id,
                user_id = %owner_id,
                category = category.as_str(),
                confidence,
                "user automatically banned"
            );
        }

        Ok(newly_banned)
    }

    /// Apply a reviewer's decision to a queue entry and its post.
    pub async fn process_review_decision(
        &self,
        queue_id: Uuid,
        decision: ReviewDecision,
        reviewer_id: Uuid,
        notes: Option<String>,
    ) -> Result<ReviewDecisionOutcome> {
        let notes = notes.filter(|value| !value.trim().is_empty());
        let mut tx = self.db.pool().begin().await?;

        let Some(entry) = fetch_entry(&mut *tx, queue_id, true).await? else {
            tx.rollback().await?;
            return Ok(ReviewDecisionOutcome::NotFound);
        };

        let refusal = match entry.status {
            ReviewStatus::Completed => Some(ReviewDecisionOutcome::AlreadyResolved(entry.status)),
            ReviewStatus::Escalated if decision == ReviewDecision::Escalate => {
                Some(ReviewDecisionOutcome::AlreadyResolved(entry.status))
            }
            ReviewStatus::InReview if entry.reviewer_id != Some(reviewer_id) => {
                Some(ReviewDecisionOutcome::ClaimedByOther(entry.reviewer_id))
            }
            _ => None,
        };
        if let Some(refusal) = refusal {
            tx.rollback().await?;
            return Ok(refusal);
        }

        let post_id = entry.post_id;
        let owner_id = lock_owner(&mut *tx, post_id)
            .await?
            .ok_or_else(|| anyhow!("queue entry {} references missing post {}", queue_id, post_id))?;

        let mut newly_banned = None;
        match decision {
            ReviewDecision::Approve => {
                approve_and_unhide(&mut *tx, post_id).await?;
            }
            ReviewDecision::Reject => {
                reject_and_hide(&mut *tx, post_id, notes.as_deref().unwrap_or(DEFAULT_REJECT_REASON))
                    .await?;
            }
            ReviewDecision::RejectAndBan => {
                reject_and_hide(&mut *tx, post_id, notes.as_deref().unwrap_or(DEFAULT_REJECT_REASON))
                    .await?;
                let banned = ban_user(&mut *tx, owner_id).await?;
                AuditLog::append(
                    &mut *tx,
                    Some(reviewer_id),
                    actions::REVIEW_BAN,
                    targets::USER,
                    owner_id,
                    json!({
                        "post_id": post_id,
                        "queue_id": queue_id,
                        "already_banned": !banned,
                    }),
                )
                .await?;
                newly_banned = Some(banned);
            }
            ReviewDecision::Escalate => {}
        }

        let sql = format!(
            "UPDATE review_queue \
             SET status = $2::review_status, reviewer_id = $3, reviewed_at = NOW(), \
                 review_decision = $4::review_decision, review_notes = $5, updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {}",
            ENTRY_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(queue_id)
            .bind(decision.terminal_status().as_db())
            .bind(reviewer_id)
            .bind(decision.as_db())
            .bind(&notes)
            .fetch_one(&mut *tx)
            .await?;
        let updated = entry_from_row(&row)?;

        AuditLog::append(
            &mut *tx,
            Some(reviewer_id),
            &decision.audit_action(),
            targets::POST,
            post_id,
            json!({
                "queue_id": queue_id,
                "owner_id": owner_id,
                "previous_status": entry.status.as_db(),
                "trigger_category": entry.trigger_category,
                "trigger_confidence": entry.trigger_confidence,
                "notes": notes,
                "newly_banned": newly_banned,
            }),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(
            queue_id = %queue_id,
            post_id = %post_id,
            reviewer_id = %reviewer_id,
            decision = decision.as_db(),
            "review decision applied"
        );

        Ok(ReviewDecisionOutcome::Applied(updated))
    }
}
