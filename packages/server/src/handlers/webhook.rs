use std::collections::HashMap;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Multipart, State};
use common::status_event::codes;
use common::storage::ImageKey;
use common::{EventSource, ImageBadge, RunStatus, Severity, resolve_status_event};
use sea_orm::*;
use serde_json::json;
use tracing::{info, instrument, warn};

use super::upload::{check_image, discard_on_error};
use crate::entity::{item_note, workflow_run};
use crate::error::{AppError, ErrorBody};
use crate::extractors::callback::EngineCallback;
use crate::extractors::json::AppJson;
use crate::ledger::items::{self, NewImage};
use crate::ledger::status::{NewEvent, log_event};
use crate::ledger::{credit, run};
use crate::models::webhook::{
    CallbackFields, CallbackResponse, StatusCallback, parse_image_callback,
};
use crate::state::AppState;

/// The run's note, or the note the engine referenced if it belongs to the run.
async fn resolve_note<C: ConnectionTrait>(
    db: &C,
    run: &workflow_run::Model,
    note_id: Option<i32>,
) -> Result<item_note::Model, AppError> {
    let Some(note_id) = note_id else {
        return Ok(items::ensure_note(db, run.user_id, run.id).await?);
    };
    item_note::Entity::find_by_id(note_id)
        .filter(item_note::Column::RunId.eq(run.id))
        .one(db)
        .await?
        .ok_or_else(|| {
            AppError::Conflict(format!("Note {note_id} does not belong to run {}", run.id))
        })
}

/// Price key of a callback. Only steps the engine names are billable.
fn charge_key(fields: &CallbackFields) -> &str {
    fields.step_type.trim()
}

/// Apply the run-level effect of a main callback on a locked run.
///
/// Terminal callbacks finish or fail the run; others only record progress.
/// Returns the run and whether the change was refused as stale.
async fn advance_run<C: ConnectionTrait>(
    db: &C,
    locked: workflow_run::Model,
    fields: &CallbackFields,
) -> Result<(workflow_run::Model, bool), DbErr> {
    let step_status = (!fields.step_type.is_empty()).then_some(fields.step_type.as_str());

    let outcome = if fields.terminal {
        let (target, code) = if fields.succeeded {
            (RunStatus::Finished, codes::WORKFLOW_FINISHED)
        } else {
            (RunStatus::Failed, codes::WORKFLOW_FAILED)
        };
        let message = fields
            .message
            .as_deref()
            .unwrap_or(resolve_status_event(code).label);
        let outcome = run::apply_transition(db, locked, target, Some(message), step_status).await?;
        if outcome.is_applied() {
            let applied = outcome.run();
            log_event(
                db,
                NewEvent::new(applied.id, applied.user_id, code, EventSource::Engine),
            )
            .await?;
        }
        outcome
    } else {
        run::touch(db, locked, fields.message.as_deref(), step_status).await?
    };

    let stale = !outcome.is_applied();
    Ok((outcome.into_run(), stale))
}

async fn charge_step(
    state: &AppState,
    fields: &CallbackFields,
    source: &str,
    image_id: Option<i32>,
) -> Option<i64> {
    let key = charge_key(fields);
    if key.is_empty() {
        return None;
    }
    credit::charge_best_effort(
        &state.db,
        &state.config.credits.prices,
        fields.user_id,
        Some(fields.run_id),
        key,
        json!({
            "source": source,
            "step_type": key,
            "image_id": image_id,
        }),
    )
    .await
    .map(|charge| -charge.transaction.amount)
}

#[utoipa::path(
    post,
    path = "/image",
    tag = "Webhooks",
    operation_id = "imageCallback",
    summary = "Image result callback from the workflow engine",
    description = "Multipart fields: `file` (the image; required on success), `run_id`, \
        `user_id`, `step_type`, `executed_successfully`, `isrunning`, `badge` (`edit`, `2k`, \
        `4k` or empty for main results), `note_id`, `position`, `code`, `message`, `prompt`. \
        Booleans accept `true/false`, `1/0` and `yes/no`. Authenticated with the engine's \
        bearer token.",
    request_body(content_type = "multipart/form-data", description = "Callback fields and image"),
    responses(
        (status = 200, description = "Callback applied", body = CallbackResponse),
        (status = 400, description = "Malformed fields or image (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Missing or wrong bearer token (UNAUTHORIZED)", body = ErrorBody),
        (status = 404, description = "Run not found for the user (NOT_FOUND)", body = ErrorBody),
        (status = 409, description = "Note does not belong to the run (CONFLICT)", body = ErrorBody),
    ),
    security(("callback_token" = [])),
)]
#[instrument(skip(state, multipart), fields(run_id, step_type))]
pub async fn image_callback(
    _auth: EngineCallback,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<CallbackResponse>, AppError> {
    let mut text: HashMap<String, String> = HashMap::new();
    let mut file: Option<Bytes> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Multipart error: {e}")))?
    {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        if name == "file" {
            let data = field
                .bytes()
                .await
                .map_err(|e| AppError::Validation(format!("Failed to read file: {e}")))?;
            file = Some(data).filter(|d| !d.is_empty());
        } else {
            let value = field
                .text()
                .await
                .map_err(|e| AppError::Validation(format!("Failed to read '{name}': {e}")))?;
            text.insert(name, value);
        }
    }

    let fields = parse_image_callback(&text)?;
    let span = tracing::Span::current();
    span.record("run_id", fields.run_id);
    span.record("step_type", fields.step_type.as_str());

    let target = run::find_owned_run(&state.db, fields.run_id, fields.user_id).await?;
    let note = resolve_note(&state.db, &target, fields.note_id).await?;

    if fields.succeeded {
        let data = file.ok_or_else(|| AppError::Validation("Missing 'file' field".into()))?;
        image_success(&state, &fields, note, &data).await.map(Json)
    } else {
        image_failure(&state, &fields, note).await.map(Json)
    }
}

struct StoredImage {
    run: workflow_run::Model,
    stale: bool,
    image_id: Option<i32>,
    staging_id: Option<i32>,
}

/// Record a stored image and its run effect in one transaction.
async fn record_image(
    state: &AppState,
    fields: &CallbackFields,
    image: NewImage,
) -> Result<StoredImage, AppError> {
    let txn = state.db.begin().await?;
    let locked = run::lock_owned_run(&txn, fields.run_id, fields.user_id).await?;

    let (mut image_id, mut staging_id) = (None, None);
    let default_code = match fields.badge {
        Some(ImageBadge::Edit) => {
            let staged = items::insert_staging(&txn, image, fields.prompt.clone()).await?;
            staging_id = Some(staged.id);
            codes::EDIT_READY
        }
        Some(badge) if badge.is_upscale() => {
            image_id = Some(items::insert_image(&txn, image).await?.id);
            codes::UPSCALE_DONE
        }
        _ => {
            image_id = Some(items::insert_image(&txn, image).await?.id);
            codes::IMAGE_DONE
        }
    };

    log_event(
        &txn,
        NewEvent::new(
            fields.run_id,
            fields.user_id,
            fields.code.as_deref().unwrap_or(default_code),
            EventSource::Engine,
        )
        .message(fields.message.as_deref()),
    )
    .await?;

    let (current, stale) = if fields.is_main() {
        advance_run(&txn, locked, fields).await?
    } else {
        (locked, false)
    };
    txn.commit().await?;

    Ok(StoredImage {
        run: current,
        stale,
        image_id,
        staging_id,
    })
}

async fn image_success(
    state: &AppState,
    fields: &CallbackFields,
    note: item_note::Model,
    data: &[u8],
) -> Result<CallbackResponse, AppError> {
    let format = check_image(None, data, state.config.storage.max_upload_size)?;
    let key = ImageKey::for_run(fields.user_id, fields.run_id, format.extension());
    state.images.put(&key, data).await?;

    let image = NewImage {
        user_id: fields.user_id,
        run_id: fields.run_id,
        note_id: note.id,
        url: state.images.public_url(&key),
        path: Some(key.as_str().to_string()),
        position: fields.slot(),
        badge: fields.badge,
    };

    let recorded = record_image(state, fields, image).await;
    let StoredImage {
        run: current,
        stale,
        image_id,
        staging_id,
    } = discard_on_error(state.images.as_ref(), &key, recorded).await?;

    let charged = charge_step(state, fields, "webhook_image", image_id.or(staging_id)).await;
    info!(?image_id, ?staging_id, ?charged, stale, "Image callback applied");

    Ok(CallbackResponse {
        success: true,
        run_id: current.id,
        status: current.status,
        image_id,
        staging_id,
        charged,
        stale,
    })
}

async fn image_failure(
    state: &AppState,
    fields: &CallbackFields,
    note: item_note::Model,
) -> Result<CallbackResponse, AppError> {
    let txn = state.db.begin().await?;
    let locked = run::lock_owned_run(&txn, fields.run_id, fields.user_id).await?;

    log_failure(&txn, fields).await?;

    let (current, stale, image_id) = if fields.is_main() {
        let (current, stale) = advance_run(&txn, locked, fields).await?;
        let image_id = if fields.terminal && !stale {
            let placeholder = items::insert_image(
                &txn,
                NewImage {
                    user_id: fields.user_id,
                    run_id: fields.run_id,
                    note_id: note.id,
                    url: state.config.storage.error_placeholder_url.clone(),
                    path: None,
                    position: fields.slot(),
                    badge: Some(ImageBadge::Error),
                },
            )
            .await?;
            Some(placeholder.id)
        } else {
            None
        };
        (current, stale, image_id)
    } else {
        (locked, false, None)
    };
    txn.commit().await?;

    warn!(terminal = fields.terminal, stale, "Engine reported a failed step");
    Ok(CallbackResponse {
        success: true,
        run_id: current.id,
        status: current.status,
        image_id,
        staging_id: None,
        charged: None,
        stale,
    })
}

async fn log_failure<C: ConnectionTrait>(db: &C, fields: &CallbackFields) -> Result<(), DbErr> {
    log_event(
        db,
        NewEvent::new(
            fields.run_id,
            fields.user_id,
            fields.code.as_deref().unwrap_or(codes::STEP_FAILED),
            EventSource::Engine,
        )
        .message(fields.message.as_deref())
        .severity(Severity::Error),
    )
    .await?;
    Ok(())
}

/// Step code of a successful status callback that carries no explicit code.
fn status_code(fields: &CallbackFields, has_text: bool) -> Option<&'static str> {
    match fields.step_type.as_str() {
        "analysis" => Some(codes::ANALYSIS_DONE),
        _ if has_text => Some(codes::TEXT_DONE),
        "text" => Some(codes::TEXT_DONE),
        _ => None,
    }
}

#[utoipa::path(
    post,
    path = "/status",
    tag = "Webhooks",
    operation_id = "statusCallback",
    summary = "Status callback from the workflow engine",
    description = "Reports step progress, generated product texts and the end of the workflow. \
        Authenticated with the engine's bearer token.",
    request_body = StatusCallback,
    responses(
        (status = 200, description = "Callback applied", body = CallbackResponse),
        (status = 400, description = "Malformed body (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Missing or wrong bearer token (UNAUTHORIZED)", body = ErrorBody),
        (status = 404, description = "Run not found for the user (NOT_FOUND)", body = ErrorBody),
    ),
    security(("callback_token" = [])),
)]
#[instrument(skip(state, payload), fields(run_id, step_type))]
pub async fn status_callback(
    _auth: EngineCallback,
    State(state): State<AppState>,
    AppJson(payload): AppJson<StatusCallback>,
) -> Result<Json<CallbackResponse>, AppError> {
    let fields = payload.fields()?;
    let span = tracing::Span::current();
    span.record("run_id", fields.run_id);
    span.record("step_type", fields.step_type.as_str());

    run::find_owned_run(&state.db, fields.run_id, fields.user_id).await?;
    let product_name = payload.product_name();
    let product_description = payload.product_description();
    let has_text = product_name.is_some() || product_description.is_some();

    let txn = state.db.begin().await?;
    let locked = run::lock_owned_run(&txn, fields.run_id, fields.user_id).await?;

    if has_text {
        let note = items::ensure_note(&txn, fields.user_id, fields.run_id).await?;
        items::update_note_text(
            &txn,
            note,
            product_name.as_deref(),
            product_description.as_deref(),
            EventSource::Engine.as_str(),
        )
        .await?;
    }

    if fields.succeeded {
        let code = fields.code.as_deref().or(status_code(&fields, has_text));
        if let Some(code) = code {
            log_event(
                &txn,
                NewEvent::new(fields.run_id, fields.user_id, code, EventSource::Engine)
                    .message(fields.message.as_deref()),
            )
            .await?;
        }
    } else {
        log_failure(&txn, &fields).await?;
    }

    let (current, stale) = advance_run(&txn, locked, &fields).await?;
    txn.commit().await?;

    let charged = if fields.succeeded {
        charge_step(&state, &fields, "webhook_status", None).await
    } else {
        None
    };
    info!(?charged, stale, status = %current.status, "Status callback applied");

    Ok(Json(CallbackResponse {
        success: true,
        run_id: current.id,
        status: current.status,
        image_id: None,
        staging_id: None,
        charged,
        stale,
    }))
}
