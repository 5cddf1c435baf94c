//! Writes against the platform's shared `posts` and `users` tables.

use anyhow::{anyhow, Result};
use sqlx::{PgConnection, Row};
use uuid::Uuid;

use crate::domain::moderation::ModerationStatus;
use crate::domain::post::ContentItem;

pub const DEFAULT_REJECT_REASON: &str = "Removed by a moderator for violating community guidelines";

pub async fn fetch_content_item(conn: &mut PgConnection, post_id: Uuid) -> Result<Option<ContentItem>> {
    let row = sqlx::query(
        "SELECT id, owner_id, image_url, moderation_status::text AS moderation_status, \
                is_hidden, hidden_at, hidden_reason, created_at \
         FROM posts \
         WHERE id = $1",
    )
    .bind(post_id)
    .fetch_optional(&mut *conn)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let status: String = row.get("moderation_status");
    Ok(Some(ContentItem {
        id: row.get("id"),
        owner_id: row.get("owner_id"),
        image_url: row.get("image_url"),
        moderation_status: ModerationStatus::from_db(&status)
            .ok_or_else(|| anyhow!("unknown moderation status: {}", status))?,
        is_hidden: row.get("is_hidden"),
        hidden_at: row.get("hidden_at"),
        hidden_reason: row.get("hidden_reason"),
        created_at: row.get("created_at"),
    }))
}

/// Owner of a post, locking the post row for the rest of the transaction.
///
/// `FOR NO KEY UPDATE` leaves the row open to the `FOR KEY SHARE` lock that
/// result and queue inserts take through their foreign keys.
pub async fn lock_owner(conn: &mut PgConnection, post_id: Uuid) -> Result<Option<Uuid>> {
    let owner_id =
        sqlx::query_scalar("SELECT owner_id FROM posts WHERE id = $1 FOR NO KEY UPDATE")
            .bind(post_id)
            .fetch_optional(&mut *conn)
            .await?;
    Ok(owner_id)
}

pub async fn set_status(conn: &mut PgConnection, post_id: Uuid, status: ModerationStatus) -> Result<()> {
    sqlx::query("UPDATE posts SET moderation_status = $1::moderation_status WHERE id = $2")
        .bind(status.as_db())
        .bind(post_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn reject_and_hide(conn: &mut PgConnection, post_id: Uuid, reason: &str) -> Result<()> {
    sqlx::query(
        "UPDATE posts \
         SET moderation_status = 'rejected', is_hidden = TRUE, hidden_at = NOW(), hidden_reason = $1 \
         WHERE id = $2",
    )
    .bind(reason)
    .bind(post_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn approve_and_unhide(conn: &mut PgConnection, post_id: Uuid) -> Result<()> {
    sqlx::query(
        "UPDATE posts \
         SET moderation_status = 'approved', is_hidden = FALSE, hidden_at = NULL, hidden_reason = NULL \
         WHERE id = $1",
    )
    .bind(post_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Ban a user unless already banned. Returns whether this call applied the ban;
/// an existing ban keeps its original timestamp.
pub async fn ban_user(conn: &mut PgConnection, user_id: Uuid) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE users SET is_banned = TRUE, banned_at = NOW() \
         WHERE id = $1 AND is_banned = FALSE",
    )
    .bind(user_id)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() > 0)
}
