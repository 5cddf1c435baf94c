use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::moderation::{Category, ModerationResult};
use crate::domain::post::ContentItem;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Pending,
    InReview,
    Completed,
    Escalated,
}

impl ReviewStatus {
    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "in_review" => Some(Self::InReview),
            "completed" => Some(Self::Completed),
            "escalated" => Some(Self::Escalated),
            _ => None,
        }
    }

    pub fn as_db(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InReview => "in_review",
            Self::Completed => "completed",
            Self::Escalated => "escalated",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    Approve,
    Reject,
    RejectAndBan,
    Escalate,
}

impl ReviewDecision {
    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "approve" => Some(Self::Approve),
            "reject" => Some(Self::Reject),
            "reject_and_ban" => Some(Self::RejectAndBan),
            "escalate" => Some(Self::Escalate),
            _ => None,
        }
    }

    pub fn as_db(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::RejectAndBan => "reject_and_ban",
            Self::Escalate => "escalate",
        }
    }

    /// Queue status recorded once this decision is applied.
    pub fn terminal_status(&self) -> ReviewStatus {
        match self {
            Self::Escalate => ReviewStatus::Escalated,
            _ => ReviewStatus::Completed,
        }
    }

    pub fn audit_action(&self) -> String {
        format!("review_{}", self.as_db())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewQueueEntry {
    pub id: Uuid,
    pub post_id: Uuid,
    pub moderation_result_id: Option<Uuid>,
    pub priority: i32,
    pub status: ReviewStatus,
    pub trigger_category: Category,
    pub trigger_confidence: f64,
    pub reviewer_id: Option<Uuid>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub reviewed_at: Option<OffsetDateTime>,
    pub review_decision: Option<ReviewDecision>,
    pub review_notes: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// A queue entry with everything a reviewer needs to decide on it.
#[derive(Debug, Clone, Serialize)]
pub struct ReviewQueueDetail {
    #[serde(flatten)]
    pub entry: ReviewQueueEntry,
    pub content: ContentItem,
    pub moderation_result: Option<ModerationResult>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: i64,
    pub in_review: i64,
    pub escalated: i64,
    pub completed_last_24h: i64,
    pub auto_rejected_last_24h: i64,
    pub auto_approved_last_24h: i64,
}

/// Priority for a trigger confidence, in 0..=100.
pub fn priority_for(confidence: f64) -> i32 {
    (crate::domain::moderation::clamp_unit(confidence) * 100.0).round() as i32
}
