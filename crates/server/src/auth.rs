// crates/server/src/auth.rs
//! Bearer-session authentication.
//!
//! The account system that issues sessions is not part of the core; the
//! extractor only resolves `Authorization: Bearer <token>` to a live,
//! non-deleted user.

use std::sync::Arc;

use axum::{extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

/// The authenticated caller.
#[derive(Debug, Clone, Copy)]
pub struct CurrentUser {
    pub id: Uuid,
}

impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or(ApiError::Unauthorized)?;

        let user_id = state
            .db
            .sessions()
            .user_for_token(token)
            .await?
            .ok_or(ApiError::Unauthorized)?;

        Ok(CurrentUser { id: user_id })
    }
}
