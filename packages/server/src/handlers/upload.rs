use axum::Json;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::body::Bytes;
use chrono::Utc;
use common::status_event::codes;
use common::storage::{ImageKey, ImageStore};
use common::{EventSource, ImageFormat, RunStatus};
use sea_orm::*;
use tracing::{info, instrument, warn};

use crate::clients::engine::IntakePayload;
use crate::entity::{run_upload, workflow_run};
use crate::error::{AppError, ErrorBody};
use crate::extractors::session::RequestContext;
use crate::ledger::status::{NewEvent, log_event};
use crate::ledger::{items, run};
use crate::models::upload::UploadResponse;
use crate::state::AppState;
use crate::utils::filename::{image_format_from_filename, validate_flat_filename};
use crate::utils::form::parse_optional_id;

/// Multipart framing overhead allowed on top of the image size limit.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub fn upload_body_limit(max_upload_size: u64) -> DefaultBodyLimit {
    DefaultBodyLimit::max(max_upload_size as usize + MULTIPART_OVERHEAD)
}

/// Remove a freshly stored image when recording it failed.
pub(crate) async fn discard_on_error<T>(
    images: &dyn ImageStore,
    key: &ImageKey,
    result: Result<T, AppError>,
) -> Result<T, AppError> {
    if result.is_err() {
        if let Err(cleanup) = images.delete(key).await {
            warn!(key = %key, error = %cleanup, "Failed to remove orphaned image");
        }
    }
    result
}

/// Check size, name and content of an uploaded image and return its format.
pub(crate) fn check_image(
    filename: Option<&str>,
    data: &[u8],
    max_size: u64,
) -> Result<ImageFormat, AppError> {
    if data.is_empty() {
        return Err(AppError::Validation("Uploaded file is empty".into()));
    }
    if data.len() as u64 > max_size {
        return Err(AppError::Validation(format!(
            "File too large: {} bytes exceeds limit of {} bytes",
            data.len(),
            max_size
        )));
    }

    let sniffed = ImageFormat::sniff(data).ok_or_else(|| {
        AppError::Validation("Only JPEG, PNG, GIF and WebP images are accepted".into())
    })?;

    if let Some(filename) = filename {
        let filename =
            validate_flat_filename(filename).map_err(|e| AppError::Validation(e.message().into()))?;
        let declared = image_format_from_filename(filename)
            .map_err(|e| AppError::Validation(e.message().into()))?;
        if declared != sniffed {
            return Err(AppError::Validation(
                "File content does not match its extension".into(),
            ));
        }
    }
    Ok(sniffed)
}

/// Pending run an upload attaches to.
async fn select_run<C: ConnectionTrait>(
    db: &C,
    user_id: i32,
    requested: Option<i32>,
) -> Result<workflow_run::Model, AppError> {
    if let Some(run_id) = requested {
        let run = run::find_owned_run(db, run_id, user_id).await?;
        if run.status != RunStatus::Pending {
            return Err(AppError::Conflict(
                "Uploads are only accepted before the workflow starts".into(),
            ));
        }
        return Ok(run);
    }

    if let Some(current) = run::current_run(db, user_id).await?
        && current.status == RunStatus::Pending
    {
        return Ok(current);
    }

    Ok(run::create_run(db, user_id).await?)
}

#[utoipa::path(
    post,
    path = "/upload",
    tag = "Upload",
    operation_id = "uploadImage",
    summary = "Upload a product photo",
    description = "Accepts one JPEG, PNG, GIF or WebP image in the `image` field. The optional \
        `run_id` field attaches it to a pending run; otherwise the current pending run is used \
        or a new one is created.",
    request_body(content_type = "multipart/form-data", description = "Image with optional run id"),
    responses(
        (status = 200, description = "Image stored", body = UploadResponse),
        (status = 400, description = "Missing, oversized or unsupported file (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "No valid session (UNAUTHORIZED, SESSION_EXPIRED)", body = ErrorBody),
        (status = 403, description = "Missing or wrong CSRF token (CSRF_MISMATCH)", body = ErrorBody),
        (status = 404, description = "Run not found (NOT_FOUND)", body = ErrorBody),
        (status = 409, description = "Run already started (CONFLICT)", body = ErrorBody),
    ),
)]
#[instrument(skip(ctx, state, multipart), fields(user_id = ctx.user_id, run_id))]
pub async fn upload_image(
    ctx: RequestContext,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let mut image: Option<(String, Bytes)> = None;
    let mut requested_run: Option<i32> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Multipart error: {e}")))?
    {
        match field.name() {
            Some("image") => {
                if image.is_some() {
                    return Err(AppError::Validation("Only one image per upload".into()));
                }
                let name = field.file_name().map(str::to_string).ok_or_else(|| {
                    AppError::Validation("Image field must have a filename".into())
                })?;
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::Validation(format!("Failed to read image: {e}")))?;
                image = Some((name, data));
            }
            Some("run_id") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::Validation(format!("Failed to read run_id: {e}")))?;
                requested_run = parse_optional_id(&text).map_err(AppError::Validation)?;
            }
            _ => {}
        }
    }

    let (name, data) =
        image.ok_or_else(|| AppError::Validation("Missing 'image' field".into()))?;
    let format = check_image(Some(&name), &data, state.config.storage.max_upload_size)?;

    let run = select_run(&ctx.db, ctx.user_id, requested_run).await?;
    tracing::Span::current().record("run_id", run.id);

    let key = ImageKey::for_run(ctx.user_id, run.id, format.extension());
    state.images.put(&key, &data).await?;
    let url = state.images.public_url(&key);

    let recorded = record_upload(&ctx, &run, &key, &url, &name, format, data.len()).await;
    discard_on_error(state.images.as_ref(), &key, recorded).await?;

    info!(key = %key, size = data.len(), "Stored upload");
    forward_to_intake(&state, ctx.user_id, run.id, &url).await;

    Ok(Json(UploadResponse {
        success: true,
        run_id: run.id,
        user_id: ctx.user_id,
        url,
        name,
    }))
}

async fn record_upload(
    ctx: &RequestContext,
    run: &workflow_run::Model,
    key: &ImageKey,
    url: &str,
    name: &str,
    format: ImageFormat,
    size: usize,
) -> Result<(), AppError> {
    let txn = ctx.db.begin().await?;

    run_upload::ActiveModel {
        user_id: Set(ctx.user_id),
        run_id: Set(run.id),
        path: Set(key.as_str().to_string()),
        url: Set(url.to_string()),
        original_name: Set(name.to_string()),
        content_type: Set(format.mime().to_string()),
        size: Set(size as i64),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    items::ensure_note(&txn, ctx.user_id, run.id).await?;
    log_event(
        &txn,
        NewEvent::new(run.id, ctx.user_id, codes::UPLOAD_RECEIVED, EventSource::Frontend),
    )
    .await?;

    txn.commit().await?;
    Ok(())
}

/// Notify the engine's intake hook. Failures are logged on the run, never returned.
async fn forward_to_intake(state: &AppState, user_id: i32, run_id: i32, url: &str) {
    let payload = IntakePayload {
        run_id,
        user_id,
        image_url: url.to_string(),
    };
    let (code, message) = match state.engine.intake(&payload).await {
        Ok(None) => return,
        Ok(Some(_)) => (codes::UPLOAD_FORWARDED, None),
        Err(e) => {
            warn!(run_id, error = %e, "Forwarding upload to intake failed");
            (codes::UPLOAD_FORWARD_FAILED, Some(e.to_string()))
        }
    };

    let event = NewEvent::new(run_id, user_id, code, EventSource::Backend).message(message.as_deref());
    if let Err(e) = log_event(&state.db, event).await {
        warn!(run_id, error = %e, "Failed to log intake result");
    }
}
