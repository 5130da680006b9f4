use axum::Json;
use axum::extract::State;
use common::status_event::codes;
use common::EventSource;
use sea_orm::sea_query::LockType;
use sea_orm::*;
use tracing::{info, instrument};

use super::auth::find_user;
use crate::clients::engine::{StartPayload, UpdatePayload};
use crate::entity::{run_upload, user};
use crate::error::{AppError, ErrorBody};
use crate::extractors::json::AppJson;
use crate::extractors::session::RequestContext;
use crate::ledger::status::{NewEvent, log_event};
use crate::ledger::{credit, items, run};
use crate::models::workflow::{
    StartWorkflowRequest, UpdateWorkflowRequest, WorkflowResponse,
    validate_update_workflow_request,
};
use crate::state::AppState;

async fn ensure_no_other_running<C: ConnectionTrait>(
    db: &C,
    user_id: i32,
    run_id: i32,
) -> Result<(), AppError> {
    if let Some(other) = run::other_running_run(db, user_id, run_id).await? {
        return Err(AppError::Conflict(format!(
            "Workflow of run {} is still running",
            other.id
        )));
    }
    Ok(())
}

#[utoipa::path(
    post,
    path = "/start",
    tag = "Workflow",
    operation_id = "startWorkflow",
    summary = "Start the main workflow for a run",
    description = "Forwards the run's uploads to the workflow engine and marks the run as \
        running. The run must be pending and have at least one upload; no other run of the user \
        may be running. If the engine does not accept the request the run is left unchanged.",
    request_body = StartWorkflowRequest,
    responses(
        (status = 200, description = "Workflow started", body = WorkflowResponse),
        (status = 400, description = "No uploads or user mismatch (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "No valid session (UNAUTHORIZED, SESSION_EXPIRED)", body = ErrorBody),
        (status = 402, description = "Balance below the start minimum (INSUFFICIENT_CREDITS)", body = ErrorBody),
        (status = 403, description = "Missing or wrong CSRF token (CSRF_MISMATCH)", body = ErrorBody),
        (status = 404, description = "Run not found (NOT_FOUND)", body = ErrorBody),
        (status = 409, description = "Run already started or another run is running (CONFLICT)", body = ErrorBody),
        (status = 502, description = "Workflow engine unavailable (UPSTREAM_ERROR)", body = ErrorBody),
    ),
)]
#[instrument(skip(ctx, state, payload), fields(user_id = ctx.user_id, run_id = payload.run_id))]
pub async fn start_workflow(
    ctx: RequestContext,
    State(state): State<AppState>,
    AppJson(payload): AppJson<StartWorkflowRequest>,
) -> Result<Json<WorkflowResponse>, AppError> {
    if payload.user_id.is_some_and(|id| id != ctx.user_id) {
        return Err(AppError::Validation(
            "user_id does not match the session".into(),
        ));
    }

    let current = run::find_owned_run(&ctx.db, payload.run_id, ctx.user_id).await?;
    run::ensure_startable(&current)?;

    let image_urls: Vec<String> = run_upload::Entity::find()
        .select_only()
        .column(run_upload::Column::Url)
        .filter(run_upload::Column::RunId.eq(current.id))
        .order_by_asc(run_upload::Column::Id)
        .into_tuple()
        .all(&ctx.db)
        .await?;
    if image_urls.is_empty() {
        return Err(AppError::Validation(
            "Upload at least one image before starting the workflow".into(),
        ));
    }

    credit::ensure_balance(&ctx.db, ctx.user_id, ctx.config.credits.start_minimum).await?;
    ensure_no_other_running(&ctx.db, ctx.user_id, current.id).await?;

    let user = find_user(&ctx.db, ctx.user_id).await?;
    let ack = state
        .engine
        .start(&StartPayload {
            run_id: current.id,
            user_id: ctx.user_id,
            image_urls,
            category: user.category,
            image_ratio: user.image_ratio,
        })
        .await?;

    // The engine accepted the request; commit the start under the locks.
    let txn = ctx.db.begin().await?;
    user::Entity::find_by_id(ctx.user_id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;
    let locked = run::lock_owned_run(&txn, current.id, ctx.user_id).await?;
    ensure_no_other_running(&txn, ctx.user_id, locked.id).await?;
    let started = run::start(&txn, locked).await?;
    log_event(
        &txn,
        NewEvent::new(started.id, ctx.user_id, codes::WORKFLOW_STARTED, EventSource::Backend),
    )
    .await?;
    txn.commit().await?;

    info!(webhook_status = ack.status, "Workflow started");
    Ok(Json(WorkflowResponse {
        success: true,
        run_id: started.id,
        webhook_status: ack.status,
    }))
}

#[utoipa::path(
    post,
    path = "/update",
    tag = "Workflow",
    operation_id = "updateWorkflow",
    summary = "Request an edit or upscale of a result image",
    description = "Forwards the request to the workflow engine. The result arrives later through \
        the image webhook; the run status is not changed. The balance must cover the action's \
        price, which is charged when the result arrives.",
    request_body = UpdateWorkflowRequest,
    responses(
        (status = 200, description = "Request forwarded", body = WorkflowResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "No valid session (UNAUTHORIZED, SESSION_EXPIRED)", body = ErrorBody),
        (status = 402, description = "Balance below the action's price (INSUFFICIENT_CREDITS)", body = ErrorBody),
        (status = 403, description = "Missing or wrong CSRF token (CSRF_MISMATCH)", body = ErrorBody),
        (status = 404, description = "Run or image not found (NOT_FOUND)", body = ErrorBody),
        (status = 502, description = "Workflow engine unavailable (UPSTREAM_ERROR)", body = ErrorBody),
    ),
)]
#[instrument(
    skip(ctx, state, payload),
    fields(user_id = ctx.user_id, run_id = payload.run_id, image_id = payload.image_id, action = %payload.action)
)]
pub async fn update_workflow(
    ctx: RequestContext,
    State(state): State<AppState>,
    AppJson(payload): AppJson<UpdateWorkflowRequest>,
) -> Result<Json<WorkflowResponse>, AppError> {
    validate_update_workflow_request(&payload)?;

    let current = run::find_owned_run(&ctx.db, payload.run_id, ctx.user_id).await?;
    let image = items::find_run_image(&ctx.db, payload.image_id, current.id, ctx.user_id).await?;

    if let Some(price) = ctx.config.credits.prices.price_for(payload.action.step_type()) {
        credit::ensure_balance(&ctx.db, ctx.user_id, price).await?;
    }

    let position = payload.position.unwrap_or(image.position);
    let prompt = payload
        .userprompt
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string);

    let ack = state
        .engine
        .update(&UpdatePayload {
            run_id: current.id,
            user_id: ctx.user_id,
            note_id: image.note_id,
            image_id: image.id,
            image_url: image.url,
            position,
            action: payload.action,
            userprompt: prompt,
        })
        .await?;

    let message = format!("{} angefordert (Bild {position})", payload.action);
    log_event(
        &ctx.db,
        NewEvent::new(
            current.id,
            ctx.user_id,
            codes::WORKFLOW_UPDATE_STARTED,
            EventSource::Backend,
        )
        .message(Some(&message)),
    )
    .await?;
    run::set_state_message(&ctx.db, ctx.user_id, &message).await?;

    info!(webhook_status = ack.status, "Workflow update requested");
    Ok(Json(WorkflowResponse {
        success: true,
        run_id: current.id,
        webhook_status: ack.status,
    }))
}
