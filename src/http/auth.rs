use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderName;
use uuid::Uuid;

use crate::http::AppError;
use crate::AppState;

/// Proof that the caller presented the configured admin token.
#[derive(Debug, Clone)]
pub struct AdminToken;

/// Reviewer identity forwarded by the upstream session layer.
#[derive(Debug, Clone, Copy)]
pub struct Reviewer {
    pub reviewer_id: Uuid,
}

const ADMIN_TOKEN_HEADER: HeaderName = HeaderName::from_static("x-admin-token");
const REVIEWER_ID_HEADER: HeaderName = HeaderName::from_static("x-reviewer-id");

#[axum::async_trait]
impl FromRequestParts<AppState> for AdminToken {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let expected = state
            .admin_token
            .as_ref()
            .ok_or_else(|| AppError::forbidden("admin token not configured"))?;

        let provided = parts
            .headers
            .get(ADMIN_TOKEN_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::forbidden("missing admin token"))?;

        if provided != expected {
            return Err(AppError::forbidden("invalid admin token"));
        }

        Ok(AdminToken)
    }
}

#[axum::async_trait]
impl FromRequestParts<AppState> for Reviewer {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(REVIEWER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::unauthorized("missing reviewer id"))?;

        let reviewer_id =
            Uuid::parse_str(raw.trim()).map_err(|_| AppError::unauthorized("invalid reviewer id"))?;

        Ok(Reviewer { reviewer_id })
    }
}
