use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Violation categories scored by the classifier, in tie-break order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Nsfw,
    Violence,
    Hate,
    Harassment,
    SelfHarm,
    Drugs,
    Illegal,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::Nsfw,
        Category::Violence,
        Category::Hate,
        Category::Harassment,
        Category::SelfHarm,
        Category::Drugs,
        Category::Illegal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nsfw => "nsfw",
            Self::Violence => "violence",
            Self::Hate => "hate",
            Self::Harassment => "harassment",
            Self::SelfHarm => "self_harm",
            Self::Drugs => "drugs",
            Self::Illegal => "illegal",
        }
    }

    pub fn from_db(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|category| category.as_str() == value)
    }
}

/// Clamp a score into [0, 1]. Non-finite input is treated as 0.
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryScores {
    pub nsfw: f64,
    pub violence: f64,
    pub hate: f64,
    pub harassment: f64,
    pub self_harm: f64,
    pub drugs: f64,
    pub illegal: f64,
}

impl CategoryScores {
    pub fn get(&self, category: Category) -> f64 {
        match category {
            Category::Nsfw => self.nsfw,
            Category::Violence => self.violence,
            Category::Hate => self.hate,
            Category::Harassment => self.harassment,
            Category::SelfHarm => self.self_harm,
            Category::Drugs => self.drugs,
            Category::Illegal => self.illegal,
        }
    }

    pub fn set(&mut self, category: Category, score: f64) {
        let slot = match category {
            Category::Nsfw => &mut self.nsfw,
            Category::Violence => &mut self.violence,
            Category::Hate => &mut self.hate,
            Category::Harassment => &mut self.harassment,
            Category::SelfHarm => &mut self.self_harm,
            Category::Drugs => &mut self.drugs,
            Category::Illegal => &mut self.illegal,
        };
        *slot = clamp_unit(score);
    }

    /// Highest-scoring category; ties keep the earlier one in `Category::ALL`.
    pub fn dominant(&self) -> (Category, f64) {
        let mut best = (Category::Nsfw, self.nsfw);
        for category in Category::ALL.into_iter().skip(1) {
            let score = self.get(category);
            if score > best.1 {
                best = (category, score);
            }
        }
        best
    }
}

/// A validated classifier verdict. All scores are already clamped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub is_safe: bool,
    pub overall_confidence: f64,
    pub categories: CategoryScores,
    pub reasoning: String,
    pub model_version: String,
    pub processing_time_ms: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModerationStatus {
    Unreviewed,
    Approved,
    Flagged,
    Rejected,
    ManualReview,
}

impl ModerationStatus {
    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "unreviewed" => Some(Self::Unreviewed),
            "approved" => Some(Self::Approved),
            "flagged" => Some(Self::Flagged),
            "rejected" => Some(Self::Rejected),
            "manual_review" => Some(Self::ManualReview),
            _ => None,
        }
    }

    pub fn as_db(&self) -> &'static str {
        match self {
            Self::Unreviewed => "unreviewed",
            Self::Approved => "approved",
            Self::Flagged => "flagged",
            Self::Rejected => "rejected",
            Self::ManualReview => "manual_review",
        }
    }
}

/// One persisted analysis attempt, successful or not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModerationResult {
    pub id: Uuid,
    pub post_id: Uuid,
    pub is_safe: bool,
    pub overall_confidence: f64,
    pub categories: CategoryScores,
    pub reasoning: String,
    pub model_version: String,
    pub processing_time_ms: i64,
    pub error_message: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionAction {
    Approved,
    Rejected,
    Queued,
    Error,
}

impl DecisionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Queued => "queued",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ModerationOutcome {
    pub action: DecisionAction,
    pub reason: String,
    pub result_id: Option<Uuid>,
    pub queue_entry_id: Option<Uuid>,
}
