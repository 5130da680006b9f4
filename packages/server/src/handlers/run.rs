use axum::Json;
use axum::extract::{Path, Query};
use common::EventSource;
use common::status_event::codes;
use sea_orm::*;
use tracing::{info, instrument};

use crate::entity::{run_upload, user_state, workflow_run};
use crate::error::{AppError, ErrorBody};
use crate::extractors::session::RequestContext;
use crate::ledger::status::{FEED_LIMIT, NewEvent, feed, log_event};
use crate::ledger::{credit, items, run};
use crate::models::run::{
    FeedEvent, FeedQuery, ImageSlot, LatestItemResponse, NoteView, RunDetailResponse,
    RunListResponse, RunResponse, RunSummary, StagingImage, StateResponse, StatusFeedResponse,
    UploadView,
};
use crate::models::shared::{PageQuery, Pagination};

#[utoipa::path(
    get,
    path = "/status-feed",
    tag = "Runs",
    operation_id = "getStatusFeed",
    summary = "Recent status messages of a run",
    description = "Returns up to 20 entries, newest first, each with its display label, \
        severity and icon. Without `run_id` the user's current run is used.",
    params(FeedQuery),
    responses(
        (status = 200, description = "Status feed", body = StatusFeedResponse),
        (status = 401, description = "No valid session (UNAUTHORIZED, SESSION_EXPIRED)", body = ErrorBody),
        (status = 404, description = "Run not found (NOT_FOUND)", body = ErrorBody),
    ),
)]
#[instrument(skip(ctx), fields(user_id = ctx.user_id))]
pub async fn status_feed(
    ctx: RequestContext,
    Query(query): Query<FeedQuery>,
) -> Result<Json<StatusFeedResponse>, AppError> {
    let current = match query.run_id {
        Some(run_id) => Some(run::find_owned_run(&ctx.db, run_id, ctx.user_id).await?),
        None => run::current_run(&ctx.db, ctx.user_id).await?,
    };

    let Some(current) = current else {
        return Ok(Json(StatusFeedResponse {
            success: true,
            run_id: None,
            status: None,
            isrunning: false,
            last_message: None,
            events: Vec::new(),
        }));
    };

    let events = feed(&ctx.db, current.id, query.limit.unwrap_or(FEED_LIMIT)).await?;
    Ok(Json(StatusFeedResponse {
        success: true,
        run_id: Some(current.id),
        status: Some(current.status),
        isrunning: current.status.is_running(),
        last_message: current.last_message,
        events: events.into_iter().map(FeedEvent::from).collect(),
    }))
}

#[utoipa::path(
    get,
    path = "/",
    tag = "Runs",
    operation_id = "listRuns",
    summary = "List the user's runs",
    description = "Newest first.",
    params(PageQuery),
    responses(
        (status = 200, description = "Paginated runs", body = RunListResponse),
        (status = 401, description = "No valid session (UNAUTHORIZED, SESSION_EXPIRED)", body = ErrorBody),
    ),
)]
#[instrument(skip(ctx), fields(user_id = ctx.user_id))]
pub async fn list_runs(
    ctx: RequestContext,
    Query(query): Query<PageQuery>,
) -> Result<Json<RunListResponse>, AppError> {
    let (page, per_page) = query.resolve();

    let paginator = workflow_run::Entity::find()
        .filter(workflow_run::Column::UserId.eq(ctx.user_id))
        .order_by_desc(workflow_run::Column::CreatedAt)
        .order_by_desc(workflow_run::Column::Id)
        .paginate(&ctx.db, per_page);
    let total = paginator.num_items().await?;
    let runs = paginator.fetch_page(page - 1).await?;

    Ok(Json(RunListResponse {
        success: true,
        runs: runs.into_iter().map(RunSummary::from).collect(),
        pagination: Pagination::new(page, per_page, total),
    }))
}

#[utoipa::path(
    get,
    path = "/{id}",
    tag = "Runs",
    operation_id = "getRun",
    summary = "Run details",
    description = "The run with its note, the current image of each slot, pending edit results, \
        uploads and recent status entries.",
    params(("id" = i32, Path, description = "Run ID")),
    responses(
        (status = 200, description = "Run details", body = RunDetailResponse),
        (status = 401, description = "No valid session (UNAUTHORIZED, SESSION_EXPIRED)", body = ErrorBody),
        (status = 404, description = "Run not found (NOT_FOUND)", body = ErrorBody),
    ),
)]
#[instrument(skip(ctx), fields(user_id = ctx.user_id))]
pub async fn get_run(
    ctx: RequestContext,
    Path(id): Path<i32>,
) -> Result<Json<RunDetailResponse>, AppError> {
    let current = run::find_owned_run(&ctx.db, id, ctx.user_id).await?;

    let note = items::find_note(&ctx.db, current.id).await?;
    let images = match &note {
        Some(note) => items::current_slots(&ctx.db, note.id).await?,
        None => Vec::new(),
    };
    let staging = items::staging_for_run(&ctx.db, current.id).await?;
    let uploads = run_upload::Entity::find()
        .filter(run_upload::Column::RunId.eq(current.id))
        .order_by_asc(run_upload::Column::Id)
        .all(&ctx.db)
        .await?;
    let events = feed(&ctx.db, current.id, FEED_LIMIT).await?;

    Ok(Json(RunDetailResponse {
        success: true,
        run: RunSummary::from(current),
        note: note.map(NoteView::from),
        images: images.into_iter().map(ImageSlot::from).collect(),
        staging: staging.into_iter().map(StagingImage::from).collect(),
        uploads: uploads.into_iter().map(UploadView::from).collect(),
        events: events.into_iter().map(FeedEvent::from).collect(),
    }))
}

#[utoipa::path(
    post,
    path = "/{id}/reset",
    tag = "Runs",
    operation_id = "resetRun",
    summary = "Manually fail a stuck run",
    description = "Marks a pending or running run as failed so a new workflow can be started.",
    params(("id" = i32, Path, description = "Run ID")),
    responses(
        (status = 200, description = "Run reset", body = RunResponse),
        (status = 401, description = "No valid session (UNAUTHORIZED, SESSION_EXPIRED)", body = ErrorBody),
        (status = 403, description = "Missing or wrong CSRF token (CSRF_MISMATCH)", body = ErrorBody),
        (status = 404, description = "Run not found (NOT_FOUND)", body = ErrorBody),
        (status = 409, description = "Run already finished (CONFLICT)", body = ErrorBody),
    ),
)]
#[instrument(skip(ctx), fields(user_id = ctx.user_id))]
pub async fn reset_run(
    ctx: RequestContext,
    Path(id): Path<i32>,
) -> Result<Json<RunResponse>, AppError> {
    let txn = ctx.db.begin().await?;
    let locked = run::lock_owned_run(&txn, id, ctx.user_id).await?;
    let reset = run::reset(&txn, locked).await?;
    log_event(
        &txn,
        NewEvent::new(reset.id, ctx.user_id, codes::RUN_RESET, EventSource::Frontend),
    )
    .await?;
    txn.commit().await?;

    info!(run_id = reset.id, "Run reset by owner");
    Ok(Json(RunResponse {
        success: true,
        run: RunSummary::from(reset),
    }))
}

#[utoipa::path(
    get,
    path = "/items/latest",
    tag = "Runs",
    operation_id = "getLatestItem",
    summary = "Note and image slots of the current run",
    responses(
        (status = 200, description = "Latest item; empty when the user has no run", body = LatestItemResponse),
        (status = 401, description = "No valid session (UNAUTHORIZED, SESSION_EXPIRED)", body = ErrorBody),
    ),
)]
#[instrument(skip(ctx), fields(user_id = ctx.user_id))]
pub async fn latest_item(ctx: RequestContext) -> Result<Json<LatestItemResponse>, AppError> {
    let Some(current) = run::current_run(&ctx.db, ctx.user_id).await? else {
        return Ok(Json(LatestItemResponse {
            success: true,
            run_id: None,
            status: None,
            isrunning: false,
            note: None,
            images: Vec::new(),
        }));
    };

    let note = items::find_note(&ctx.db, current.id).await?;
    let images = match &note {
        Some(note) => items::current_slots(&ctx.db, note.id).await?,
        None => Vec::new(),
    };

    Ok(Json(LatestItemResponse {
        success: true,
        run_id: Some(current.id),
        status: Some(current.status),
        isrunning: current.status.is_running(),
        note: note.map(NoteView::from),
        images: images.into_iter().map(ImageSlot::from).collect(),
    }))
}

#[utoipa::path(
    get,
    path = "/state",
    tag = "Runs",
    operation_id = "getState",
    summary = "Current run pointer, status and balance",
    responses(
        (status = 200, description = "User state", body = StateResponse),
        (status = 401, description = "No valid session (UNAUTHORIZED, SESSION_EXPIRED)", body = ErrorBody),
    ),
)]
#[instrument(skip(ctx), fields(user_id = ctx.user_id))]
pub async fn get_state(ctx: RequestContext) -> Result<Json<StateResponse>, AppError> {
    let state = user_state::Entity::find_by_id(ctx.user_id)
        .one(&ctx.db)
        .await?;
    let credits = credit::balance(&ctx.db, ctx.user_id).await?;

    let (current_run_id, status, last_message) = match state {
        Some(s) => (s.current_run_id, s.status, s.last_message),
        None => (None, None, None),
    };

    Ok(Json(StateResponse {
        success: true,
        current_run_id,
        status,
        last_message,
        isrunning: status.is_some_and(|s| s.is_running()),
        credits,
    }))
}
