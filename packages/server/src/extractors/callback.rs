use axum::{extract::FromRequestParts, http::request::Parts};

use crate::error::AppError;
use crate::state::AppState;
use crate::utils::hash;

/// Marker for requests authenticated with the workflow engine's static bearer token.
///
/// An empty configured token rejects every callback.
#[derive(Debug)]
pub struct EngineCallback;

impl FromRequestParts<AppState> for EngineCallback {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let expected = state.config.workflow.callback_token.as_str();
        if expected.is_empty() {
            tracing::warn!("Rejecting engine callback: no callback token configured");
            return Err(AppError::Unauthorized);
        }

        let presented = parts
            .headers
            .get("Authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or(AppError::Unauthorized)?;

        if !hash::tokens_match(presented.trim(), expected) {
            return Err(AppError::Unauthorized);
        }
        Ok(EngineCallback)
    }
}
