use anyhow::Result;
use sqlx::{PgConnection, Row};
use uuid::Uuid;

use crate::domain::moderation::{Analysis, CategoryScores, ModerationResult};

/// Sentinel confidence recorded when the classifier could not produce a verdict.
pub const FAILED_ANALYSIS_CONFIDENCE: f64 = 0.5;

pub struct NewModerationResult<'a> {
    pub post_id: Uuid,
    pub is_safe: bool,
    pub overall_confidence: f64,
    pub categories: CategoryScores,
    pub reasoning: &'a str,
    pub model_version: &'a str,
    pub processing_time_ms: i64,
    pub error_message: Option<&'a str>,
}

impl<'a> NewModerationResult<'a> {
    pub fn from_analysis(post_id: Uuid, analysis: &'a Analysis) -> Self {
        Self {
            post_id,
            is_safe: analysis.is_safe,
            overall_confidence: analysis.overall_confidence,
            categories: analysis.categories,
            reasoning: &analysis.reasoning,
            model_version: &analysis.model_version,
            processing_time_ms: analysis.processing_time_ms,
            error_message: None,
        }
    }

    pub fn failed(post_id: Uuid, model_version: &'a str, error_message: &'a str) -> Self {
        Self {
            post_id,
            is_safe: false,
            overall_confidence: FAILED_ANALYSIS_CONFIDENCE,
            categories: CategoryScores::default(),
            reasoning: "",
            model_version,
            processing_time_ms: 0,
            error_message: Some(error_message),
        }
    }
}

pub async fn insert_result(conn: &mut PgConnection, result: NewModerationResult<'_>) -> Result<Uuid> {
    let scores = result.categories;
    let id: Uuid = sqlx::query_scalar(
        "INSERT INTO moderation_results \
         (post_id, is_safe, overall_confidence, nsfw, violence, hate, harassment, self_harm, \
          drugs, illegal, reasoning, model_version, processing_time_ms, error_message) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) \
         RETURNING id",
    )
    .bind(result.post_id)
    .bind(result.is_safe)
    .bind(result.overall_confidence)
    .bind(scores.nsfw)
    .bind(scores.violence)
    .bind(scores.hate)
    .bind(scores.harassment)
    .bind(scores.self_harm)
    .bind(scores.drugs)
    .bind(scores.illegal)
    .bind(result.reasoning)
    .bind(result.model_version)
    .bind(result.processing_time_ms)
    .bind(result.error_message)
    .fetch_one(&mut *conn)
    .await?;

    Ok(id)
}

pub async fn fetch_result(conn: &mut PgConnection, result_id: Uuid) -> Result<Option<ModerationResult>> {
    let row = sqlx::query(
        "SELECT id, post_id, is_safe, overall_confidence, nsfw, violence, hate, harassment, \
                self_harm, drugs, illegal, reasoning, model_version, processing_time_ms, \
                error_message, created_at \
         FROM moderation_results \
         WHERE id = $1",
    )
    .bind(result_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row.map(|row| ModerationResult {
        id: row.get("id"),
        post_id: row.get("post_id"),
        is_safe: row.get("is_safe"),
        overall_confidence: row.get("overall_confidence"),
        categories: CategoryScores {
            nsfw: row.get("nsfw"),
            violence: row.get("violence"),
            hate: row.get("hate"),
            harassment: row.get("harassment"),
            self_harm: row.get("self_harm"),
            drugs: row.get("drugs"),
            illegal: row.get("illegal"),
        },
        reasoning: row.get("reasoning"),
        model_version: row.get("model_version"),
        processing_time_ms: row.get("processing_time_ms"),
        error_message: row.get("error_message"),
        created_at: row.get("created_at"),
    }))
}
