use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    /// `None` for automated actions.
    pub actor_id: Option<Uuid>,
    pub action: String,
    pub target_type: String,
    pub target_id: Uuid,
    pub details: serde_json::Value,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

pub mod actions {
    pub const AUTO_APPROVE: &str = "auto_approve";
    pub const AUTO_FLAG: &str = "auto_flag";
    pub const AUTO_MANUAL_REVIEW: &str = "auto_manual_review";
    pub const AUTO_REJECT: &str = "auto_reject";
    pub const AUTO_BAN: &str = "auto_ban";
    pub const REVIEW_BAN: &str = "review_ban";
}

pub mod targets {
    pub const POST: &str = "post";
    pub const USER: &str = "user";
}
