use axum::Json;
use sea_orm::*;
use tracing::instrument;

use super::auth::find_user;
use crate::entity::user;
use crate::error::{AppError, ErrorBody};
use crate::extractors::json::AppJson;
use crate::extractors::session::RequestContext;
use crate::models::settings::{
    SettingsResponse, UpdateSettingsRequest, validate_update_settings_request,
};

#[utoipa::path(
    get,
    path = "/settings",
    tag = "Settings",
    operation_id = "getSettings",
    summary = "Workflow preferences of the current user",
    responses(
        (status = 200, description = "Current preferences", body = SettingsResponse),
        (status = 401, description = "No valid session (UNAUTHORIZED, SESSION_EXPIRED)", body = ErrorBody),
    ),
)]
#[instrument(skip(ctx), fields(user_id = ctx.user_id))]
pub async fn get_settings(ctx: RequestContext) -> Result<Json<SettingsResponse>, AppError> {
    let user = find_user(&ctx.db, ctx.user_id).await?;
    Ok(Json(SettingsResponse::from(user)))
}

#[utoipa::path(
    patch,
    path = "/settings",
    tag = "Settings",
    operation_id = "updateSettings",
    summary = "Update workflow preferences",
    description = "Absent fields are left unchanged; `category: null` clears the category.",
    request_body = UpdateSettingsRequest,
    responses(
        (status = 200, description = "Updated preferences", body = SettingsResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "No valid session (UNAUTHORIZED, SESSION_EXPIRED)", body = ErrorBody),
        (status = 403, description = "Missing or wrong CSRF token (CSRF_MISMATCH)", body = ErrorBody),
    ),
)]
#[instrument(skip(ctx, payload), fields(user_id = ctx.user_id))]
pub async fn update_settings(
    ctx: RequestContext,
    AppJson(payload): AppJson<UpdateSettingsRequest>,
) -> Result<Json<SettingsResponse>, AppError> {
    validate_update_settings_request(&payload)?;

    let user = find_user(&ctx.db, ctx.user_id).await?;
    let mut active: user::ActiveModel = user.into();

    if let Some(category) = payload.category {
        active.category = Set(category
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty()));
    }
    if let Some(ratio) = payload.image_ratio {
        active.image_ratio = Set(ratio.trim().to_string());
    }

    let user = active.update(&ctx.db).await?;
    Ok(Json(SettingsResponse::from(user)))
}
