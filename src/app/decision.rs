use anyhow::Result;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::app::actions::ModerationActions;
use crate::app::audit::AuditLog;
use crate::app::classifier::VisionClassifier;
use crate::app::content::{fetch_content_item, set_status};
use crate::app::results::{insert_result, NewModerationResult};
use crate::app::review_queue::ReviewQueue;
use crate::config::ModerationConfig;
use crate::domain::audit::{actions, targets};
use crate::domain::moderation::{
    Analysis, Category, DecisionAction, ModerationOutcome, ModerationStatus,
};
use crate::infra::db::Db;

/// Turns a classifier verdict into approve / reject+ban / queue / manual review.
#[derive(Clone)]
pub struct DecisionEngine {
    db: Db,
    classifier: Arc<dyn VisionClassifier>,
    config: ModerationConfig,
}

impl DecisionEngine {
    pub fn new(db: Db, classifier: Arc<dyn VisionClassifier>, config: ModerationConfig) -> Self {
        Self {
            db,
            classifier,
            config,
        }
    }

    /// Analyze a post and apply the outcome. `None` when the post no longer
    /// exists.
    pub async fn decide(&self, post_id: Uuid, image_url: &str) -> Result<Option<ModerationOutcome>> {
        {
            let mut conn = self.db.pool().acquire().await?;
            if fetch_content_item(&mut *conn, post_id).await?.is_none() {
                tracing::warn!(post_id = %post_id, "post not found, skipping moderation");
                return Ok(None);
            }
        }

        let outcome = if !self.config.enabled {
            self.approve_without_analysis(post_id).await?
        } else {
            // No connection is held while the classifier call is in flight.
            match self.classifier.analyze(image_url).await {
                Ok(analysis) => self.apply_analysis(post_id, &analysis).await?,
                Err(err) => {
                    tracing::warn!(error = %err, post_id = %post_id, "classifier failed, routing to manual review");
                    self.record_failure(post_id, &err.to_string(), err.retryable())
                        .await?
                }
            }
        };

        tracing::info!(
            post_id = %post_id,
            action = outcome.action.as_str(),
            reason = %outcome.reason,
            "moderation decision"
        );
        Ok(Some(outcome))
    }

    async fn approve_without_analysis(&self, post_id: Uuid) -> Result<ModerationOutcome> {
        let mut conn = self.db.pool().acquire().await?;
        set_status(&mut *conn, post_id, ModerationStatus::Approved).await?;
        Ok(ModerationOutcome {
            action: DecisionAction::Approved,
            reason: "moderation disabled".to_string(),
            result_id: None,
            queue_entry_id: None,
        })
    }

    async fn record_failure(
        &self,
        post_id: Uuid,
        message: &str,
        retryable: bool,
    ) -> Result<ModerationOutcome> {
        let model_version = self.classifier.model_version();
        let mut tx = self.db.pool().begin().await?;

        let result_id = insert_result(
            &mut *tx,
            NewModerationResult::failed(post_id, &model_version, message),
        )
        .await?;
        set_status(&mut *tx, post_id, ModerationStatus::ManualReview).await?;
        AuditLog::append(
            &mut *tx,
            None,
            actions::AUTO_MANUAL_REVIEW,
            targets::POST,
            post_id,
            json!({
                "result_id": result_id,
                "error": message,
                "retryable": retryable,
            }),
        )
        .await?;

        tx.commit().await?;

        Ok(ModerationOutcome {
            action: DecisionAction::Error,
            reason: format!("classifier error, sent to manual review: {}", message),
            result_id: Some(result_id),
            queue_entry_id: None,
        })
    }

    async fn apply_analysis(
        &self,
        post_id: Uuid,
        analysis: &Analysis,
    ) -> Result<ModerationOutcome> {
        let (category, _) = analysis.categories.dominant();
        let confidence = analysis.overall_confidence;
        let mut tx = self.db.pool().begin().await?;

        let result_id = insert_result(&mut *tx, NewModerationResult::from_analysis(post_id, analysis)).await?;

        let outcome = if confidence >= self.config.auto_reject_threshold {
            let newly_banned = ModerationActions::auto_reject_and_ban(
                &mut *tx,
                post_id,
                category,
                confidence,
                &analysis.reasoning,
            )
            .await?;
            ModerationOutcome {
                action: DecisionAction::Rejected,
                reason: format!(
                    "{}, owner {}",
                    describe("auto-rejected", category, confidence),
                    if newly_banned { "banned" } else { "already banned" }
                ),
                result_id: Some(result_id),
                queue_entry_id: None,
            }
        } else if confidence >= self.config.manual_review_threshold {
            let queued =
                ReviewQueue::enqueue(&mut *tx, post_id, Some(result_id), category, confidence).await?;
            set_status(&mut *tx, post_id, ModerationStatus::Flagged).await?;
            AuditLog::append(
                &mut *tx,
                None,
                actions::AUTO_FLAG,
                targets::POST,
                post_id,
                json!({
                    "result_id": result_id,
                    "queue_id": queued.entry_id,
                    "new_entry": queued.inserted,
                    "category": category.as_str(),
                    "confidence": confidence,
                }),
            )
            .await?;
            ModerationOutcome {
                action: DecisionAction::Queued,
                reason: describe("queued for review", category, confidence),
                result_id: Some(result_id),
                queue_entry_id: Some(queued.entry_id),
            }
        } else {
            set_status(&mut *tx, post_id, ModerationStatus::Approved).await?;
            AuditLog::append(
                &mut *tx,
                None,
                actions::AUTO_APPROVE,
                targets::POST,
                post_id,
                json!({
                    "result_id": result_id,
                    "category": category.as_str(),
                    "confidence": confidence,
                }),
            )
            .await?;
            ModerationOutcome {
                action: DecisionAction::Approved,
                reason: describe("approved", category, confidence),
                result_id: Some(result_id),
                queue_entry_id: None,
            }
        };

        tx.commit().await?;
        Ok(outcome)
    }
}

fn describe(verdict: &str, category: Category, confidence: f64) -> String {
    format!(
        "{}: {} ({:.0}% confidence)",
        verdict,
        category.as_str(),
        confidence * 100.0
    )
}
