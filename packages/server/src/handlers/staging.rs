use axum::Json;
use axum::extract::{Path, State};
use common::EventSource;
use common::status_event::codes;
use common::storage::ImageKey;
use tracing::{instrument, warn};

use crate::error::{AppError, ErrorBody};
use crate::extractors::session::RequestContext;
use crate::ledger::items;
use crate::ledger::status::{NewEvent, log_event};
use crate::models::run::{ImageSlot, PublishResponse};
use crate::models::shared::MessageResponse;
use crate::state::AppState;

#[utoipa::path(
    post,
    path = "/{id}/publish",
    tag = "Images",
    operation_id = "publishStagingImage",
    summary = "Publish an edit result",
    description = "Moves the staging image into its slot as the slot's current image, badged \
        `edit`. Both steps happen atomically.",
    params(("id" = i32, Path, description = "Staging image ID")),
    responses(
        (status = 200, description = "Published", body = PublishResponse),
        (status = 401, description = "No valid session (UNAUTHORIZED, SESSION_EXPIRED)", body = ErrorBody),
        (status = 403, description = "Missing or wrong CSRF token (CSRF_MISMATCH)", body = ErrorBody),
        (status = 404, description = "Staging image not found (NOT_FOUND)", body = ErrorBody),
    ),
)]
#[instrument(skip(ctx), fields(user_id = ctx.user_id))]
pub async fn publish_staging(
    ctx: RequestContext,
    Path(id): Path<i32>,
) -> Result<Json<PublishResponse>, AppError> {
    let image = items::publish_staging(&ctx.db, id, ctx.user_id).await?;

    log_event(
        &ctx.db,
        NewEvent::new(image.run_id, ctx.user_id, codes::EDIT_PUBLISHED, EventSource::Frontend),
    )
    .await?;

    Ok(Json(PublishResponse {
        success: true,
        image: ImageSlot::from(image),
    }))
}

#[utoipa::path(
    delete,
    path = "/{id}",
    tag = "Images",
    operation_id = "discardStagingImage",
    summary = "Discard an edit result",
    params(("id" = i32, Path, description = "Staging image ID")),
    responses(
        (status = 200, description = "Discarded", body = MessageResponse),
        (status = 401, description = "No valid session (UNAUTHORIZED, SESSION_EXPIRED)", body = ErrorBody),
        (status = 403, description = "Missing or wrong CSRF token (CSRF_MISMATCH)", body = ErrorBody),
        (status = 404, description = "Staging image not found (NOT_FOUND)", body = ErrorBody),
    ),
)]
#[instrument(skip(ctx, state), fields(user_id = ctx.user_id))]
pub async fn discard_staging(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<MessageResponse>, AppError> {
    let staged = items::discard_staging(&ctx.db, id, ctx.user_id).await?;

    if let Some(path) = staged.path.as_deref() {
        let removed = match ImageKey::parse(path) {
            Ok(key) => state.images.delete(&key).await.map(|_| ()),
            Err(e) => Err(e),
        };
        if let Err(e) = removed {
            warn!(staging_id = id, error = %e, "Failed to remove discarded image file");
        }
    }

    Ok(Json(MessageResponse::ok("Staging image discarded")))
}
