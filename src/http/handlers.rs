use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use url::Url;
use uuid::Uuid;

use crate::app::actions::{ModerationActions, ReviewDecisionOutcome};
use crate::app::audit::AuditLog;
use crate::app::review_queue::{
    invalidate_cached_stats, ClaimOutcome, QueueCursor, ReviewQueue, STATS_CACHE_KEY,
};
use crate::domain::audit::AuditEntry;
use crate::domain::review::{
    QueueStats, ReviewDecision, ReviewQueueDetail, ReviewQueueEntry, ReviewStatus,
};
use crate::http::{AdminToken, AppError, Reviewer};
use crate::infra::queue::ModerationJob;
use crate::AppState;

const MAX_NOTES_LEN: usize = 2000;

#[derive(Serialize)]
pub(crate) struct HealthResponse {
    status: &'static str,
}

#[derive(Deserialize)]
pub struct PaginationQuery {
    pub limit: Option<i64>,
    pub cursor: Option<String>,
}

#[derive(Deserialize)]
pub struct QueueListQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
    pub cursor: Option<String>,
}

#[derive(Serialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
}

fn parse_limit(limit: Option<i64>) -> Result<i64, AppError> {
    let limit = limit.unwrap_or(30);
    if !(1..=200).contains(&limit) {
        return Err(AppError::bad_request("limit must be between 1 and 200"));
    }
    Ok(limit)
}

fn parse_cursor(cursor: Option<String>) -> Result<Option<(OffsetDateTime, Uuid)>, AppError> {
    let Some(cursor) = cursor else {
        return Ok(None);
    };

    let mut parts = cursor.splitn(2, '/');
    let timestamp = parts
        .next()
        .ok_or_else(|| AppError::bad_request("invalid cursor"))?;
    let id = parts
        .next()
        .ok_or_else(|| AppError::bad_request("invalid cursor"))?;

    let timestamp = OffsetDateTime::parse(timestamp, &Rfc3339)
        .map_err(|_| AppError::bad_request("invalid cursor"))?;
    let id = Uuid::parse_str(id).map_err(|_| AppError::bad_request("invalid cursor"))?;

    Ok(Some((timestamp, id)))
}

fn encode_cursor(cursor: Option<(OffsetDateTime, Uuid)>) -> Option<String> {
    let (timestamp, id) = cursor?;
    let timestamp = timestamp.format(&Rfc3339).ok()?;
    Some(format!("{}/{}", timestamp, id))
}

fn parse_queue_cursor(cursor: Option<String>) -> Result<Option<QueueCursor>, AppError> {
    let Some(cursor) = cursor else {
        return Ok(None);
    };

    let (priority, rest) = cursor
        .split_once('/')
        .ok_or_else(|| AppError::bad_request("invalid cursor"))?;
    let priority = priority
        .parse::<i32>()
        .map_err(|_| AppError::bad_request("invalid cursor"))?;
    let (created_at, id) = parse_cursor(Some(rest.to_string()))?
        .ok_or_else(|| AppError::bad_request("invalid cursor"))?;

    Ok(Some(QueueCursor {
        priority,
        created_at,
        id,
    }))
}

fn encode_queue_cursor(cursor: Option<QueueCursor>) -> Option<String> {
    let cursor = cursor?;
    let rest = encode_cursor(Some((cursor.created_at, cursor.id)))?;
    Some(format!("{}/{}", cursor.priority, rest))
}

pub(crate) async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let db = state.db.ping().await.is_ok();
    let redis = state.cache.ping().await.is_ok();
    let status = if db && redis { "ok" } else { "degraded" };

    Json(HealthResponse { status })
}

#[derive(Deserialize)]
pub struct AnalyzeRequest {
    pub post_id: Uuid,
    pub image_url: String,
}

#[derive(Serialize)]
pub struct AnalyzeResponse {
    pub post_id: Uuid,
    pub status: &'static str,
}

pub async fn enqueue_analysis(
    _admin: AdminToken,
    State(state): State<AppState>,
    Json(payload): Json<AnalyzeRequest>,
) -> Result<(StatusCode, Json<AnalyzeResponse>), AppError> {
    let url = Url::parse(payload.image_url.trim())
        .map_err(|_| AppError::bad_request("image_url must be a valid URL"))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(AppError::bad_request("image_url must be http or https"));
    }

    let job = ModerationJob {
        post_id: payload.post_id,
        image_url: url.to_string(),
    };
    state.queue.enqueue_moderation_job(&job).await.map_err(|err| {
        tracing::error!(error = ?err, post_id = %payload.post_id, "failed to enqueue moderation job");
        AppError::internal("failed to enqueue moderation job")
    })?;

    Ok((
        StatusCode::ACCEPTED,
        Json(AnalyzeResponse {
            post_id: payload.post_id,
            status: "queued",
        }),
    ))
}

pub async fn list_queue(
    _admin: AdminToken,
    State(state): State<AppState>,
    Query(query): Query<QueueListQuery>,
) -> Result<Json<ListResponse<ReviewQueueEntry>>, AppError> {
    let limit = parse_limit(query.limit)?;
    let status = match query.status.as_deref() {
        Some(value) => Some(
            ReviewStatus::from_db(value).ok_or_else(|| AppError::bad_request("invalid status"))?,
        ),
        None => None,
    };
    let cursor = parse_queue_cursor(query.cursor)?;

    let service = ReviewQueue::new(state.db.clone());
    let mut entries = service
        .list(status, cursor, limit + 1)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to list review queue");
            AppError::internal("failed to list review queue")
        })?;

    let next_cursor = if entries.len() > limit as usize {
        entries.pop();
        entries.last().map(QueueCursor::from)
    } else {
        None
    };

    Ok(Json(ListResponse {
        items: entries,
        next_cursor: encode_queue_cursor(next_cursor),
    }))
}

pub async fn queue_stats(
    _admin: AdminToken,
    State(state): State<AppState>,
) -> Result<Json<QueueStats>, AppError> {
    match state.cache.get_json::<QueueStats>(STATS_CACHE_KEY).await {
        Ok(Some(stats)) => return Ok(Json(stats)),
        Ok(None) => {}
        Err(err) => tracing::warn!(error = ?err, "queue stats cache read failed"),
    }

    let service = ReviewQueue::new(state.db.clone());
    let stats = service.stats().await.map_err(|err| {
        tracing::error!(error = ?err, "failed to load queue stats");
        AppError::internal("failed to load queue stats")
    })?;

    if let Err(err) = state
        .cache
        .set_json(STATS_CACHE_KEY, &stats, state.stats_cache_ttl_seconds)
        .await
    {
        tracing::warn!(error = ?err, "queue stats cache write failed");
    }

    Ok(Json(stats))
}

pub async fn get_queue_entry(
    _admin: AdminToken,
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<ReviewQueueDetail>, AppError> {
    let service = ReviewQueue::new(state.db.clone());
    let detail = service.get_by_id(id).await.map_err(|err| {
        tracing::error!(error = ?err, queue_id = %id, "failed to load queue entry");
        AppError::internal("failed to load queue entry")
    })?;

    detail
        .map(Json)
        .ok_or_else(|| AppError::not_found("queue entry not found"))
}

pub async fn claim_queue_entry(
    _admin: AdminToken,
    reviewer: Reviewer,
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<ReviewQueueEntry>, AppError> {
    let service = ReviewQueue::new(state.db.clone());
    let outcome = service
        .claim(id, reviewer.reviewer_id)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, queue_id = %id, reviewer_id = %reviewer.reviewer_id, "failed to claim queue entry");
            AppError::internal("failed to claim queue entry")
        })?;

    match outcome {
        ClaimOutcome::Claimed(entry) => {
            invalidate_cached_stats(&state.cache).await;
            Ok(Json(entry))
        }
        ClaimOutcome::NotFound => Err(AppError::not_found("queue entry not found")),
        ClaimOutcome::NotPending(status) => Err(AppError::conflict(format!(
            "queue entry is {}",
            status.as_db()
        ))),
    }
}

#[derive(Deserialize)]
pub struct ReviewDecisionRequest {
    pub decision: ReviewDecision,
    pub notes: Option<String>,
}

pub async fn submit_review_decision(
    _admin: AdminToken,
    reviewer: Reviewer,
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(payload): Json<ReviewDecisionRequest>,
) -> Result<Json<ReviewQueueEntry>, AppError> {
    if payload
        .notes
        .as_ref()
        .is_some_and(|notes| notes.chars().count() > MAX_NOTES_LEN)
    {
        return Err(AppError::bad_request("notes must be at most 2000 characters"));
    }

    let service = ModerationActions::new(state.db.clone());
    let outcome = service
        .process_review_decision(id, payload.decision, reviewer.reviewer_id, payload.notes)
        .await
        .map_err(|err| {
            tracing::error!(
                error = ?err,
                queue_id = %id,
                reviewer_id = %reviewer.reviewer_id,
                decision = payload.decision.as_db(),
                "failed to apply review decision"
            );
            AppError::internal("failed to apply review decision")
        })?;

    match outcome {
        ReviewDecisionOutcome::Applied(entry) => {
            invalidate_cached_stats(&state.cache).await;
            Ok(Json(entry))
        }
        ReviewDecisionOutcome::NotFound => Err(AppError::not_found("queue entry not found")),
        ReviewDecisionOutcome::AlreadyResolved(status) => Err(AppError::conflict(format!(
            "queue entry already {}",
            status.as_db()
        ))),
        ReviewDecisionOutcome::ClaimedByOther(_) => Err(AppError::conflict(
            "queue entry is claimed by another reviewer",
        )),
    }
}

pub async fn list_moderation_audit(
    _admin: AdminToken,
    State(state): State<AppState>,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<ListResponse<AuditEntry>>, AppError> {
    let limit = parse_limit(query.limit)?;
    let cursor = parse_cursor(query.cursor)?;

    let service = AuditLog::new(state.db.clone());
    let mut entries = service
        .list(cursor, limit + 1)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to list moderation audit");
            AppError::internal("failed to list moderation audit")
        })?;

    let next_cursor = if entries.len() > limit as usize {
        entries.pop();
        entries.last().map(|last| (last.created_at, last.id))
    } else {
        None
    };

    Ok(Json(ListResponse {
        items: entries,
        next_cursor: encode_cursor(next_cursor),
    }))
}
