use chrono::Utc;
use common::RunStatus;
use sea_orm::sea_query::{Expr, LockType, OnConflict};
use sea_orm::*;
use tracing::{info, warn};

use crate::entity::{user_state, workflow_run};
use crate::error::AppError;

/// Message stored when a workflow was started.
pub const MSG_WORKFLOW_STARTED: &str = "Workflow gestartet";
/// Message stored when the owner resets a run by hand.
pub const MSG_MANUAL_RESET: &str = "Manuell zurückgesetzt";

/// Result of a status mutation on a locked run.
#[derive(Debug)]
pub enum Transition {
    Applied(workflow_run::Model),
    /// The run's current status does not allow the change; nothing was written.
    Stale(workflow_run::Model),
}

impl Transition {
    pub fn run(&self) -> &workflow_run::Model {
        match self {
            Self::Applied(run) | Self::Stale(run) => run,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }

    pub fn into_run(self) -> workflow_run::Model {
        match self {
            Self::Applied(run) | Self::Stale(run) => run,
        }
    }
}

/// Create a pending run and point the user's state at it.
pub async fn create_run<C: ConnectionTrait>(
    db: &C,
    user_id: i32,
) -> Result<workflow_run::Model, DbErr> {
    let now = Utc::now();
    let run = workflow_run::ActiveModel {
        user_id: Set(user_id),
        status: Set(RunStatus::Pending),
        last_step_status: Set(None),
        last_message: Set(None),
        started_at: Set(None),
        finished_at: Set(None),
        credits_spent: Set(0),
        version: Set(0),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await?;

    upsert_user_state(db, &run).await?;
    info!(run_id = run.id, user_id, "Created run");
    Ok(run)
}

/// Find a run owned by `user_id` or return 404.
pub async fn find_owned_run<C: ConnectionTrait>(
    db: &C,
    run_id: i32,
    user_id: i32,
) -> Result<workflow_run::Model, AppError> {
    workflow_run::Entity::find_by_id(run_id)
        .filter(workflow_run::Column::UserId.eq(user_id))
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Run not found".into()))
}

/// Like [`find_owned_run`], but takes the row lock for the caller's transaction.
pub async fn lock_owned_run<C: ConnectionTrait>(
    db: &C,
    run_id: i32,
    user_id: i32,
) -> Result<workflow_run::Model, AppError> {
    workflow_run::Entity::find_by_id(run_id)
        .filter(workflow_run::Column::UserId.eq(user_id))
        .lock(LockType::Update)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Run not found".into()))
}

/// Mirror a run into the user's denormalized state row.
pub async fn upsert_user_state<C: ConnectionTrait>(
    db: &C,
    run: &workflow_run::Model,
) -> Result<(), DbErr> {
    let state = user_state::ActiveModel {
        user_id: Set(run.user_id),
        current_run_id: Set(Some(run.id)),
        status: Set(Some(run.status)),
        last_message: Set(run.last_message.clone()),
        updated_at: Set(Utc::now()),
    };

    user_state::Entity::insert(state)
        .on_conflict(
            OnConflict::column(user_state::Column::UserId)
                .update_columns([
                    user_state::Column::CurrentRunId,
                    user_state::Column::Status,
                    user_state::Column::LastMessage,
                    user_state::Column::UpdatedAt,
                ])
                .to_owned(),
        )
        .exec_without_returning(db)
        .await?;
    Ok(())
}

/// Overwrite the last message shown for the user without touching any run.
pub async fn set_state_message<C: ConnectionTrait>(
    db: &C,
    user_id: i32,
    message: &str,
) -> Result<(), DbErr> {
    user_state::Entity::update_many()
        .col_expr(user_state::Column::LastMessage, Expr::value(message))
        .col_expr(user_state::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(user_state::Column::UserId.eq(user_id))
        .exec(db)
        .await?;
    Ok(())
}

/// Move a locked run to `target`.
///
/// Transitions the lifecycle does not allow from the current status (a late
/// `running` callback after `finished`, a second start) are refused as
/// [`Transition::Stale`] without touching the row.
pub async fn apply_transition<C: ConnectionTrait>(
    db: &C,
    run: workflow_run::Model,
    target: RunStatus,
    message: Option<&str>,
    step_status: Option<&str>,
) -> Result<Transition, DbErr> {
    if !run.status.can_transition_to(target) {
        warn!(
            run_id = run.id,
            from = %run.status,
            to = %target,
            version = run.version,
            "Refusing stale run transition"
        );
        return Ok(Transition::Stale(run));
    }

    let now = Utc::now();
    let mut active: workflow_run::ActiveModel = run.clone().into();
    active.status = Set(target);
    active.version = Set(run.version + 1);
    active.updated_at = Set(now);
    if let Some(message) = message {
        active.last_message = Set(Some(message.to_string()));
    }
    if let Some(step_status) = step_status {
        active.last_step_status = Set(Some(step_status.to_string()));
    }
    if target == RunStatus::Running && run.started_at.is_none() {
        active.started_at = Set(Some(now));
    }
    if target.is_terminal() {
        active.finished_at = Set(Some(now));
    }

    let updated = active.update(db).await?;
    upsert_user_state(db, &updated).await?;
    info!(run_id = updated.id, from = %run.status, to = %target, "Run transition");
    Ok(Transition::Applied(updated))
}

/// Record progress on a locked, non-terminal run without changing its status.
pub async fn touch<C: ConnectionTrait>(
    db: &C,
    run: workflow_run::Model,
    message: Option<&str>,
    step_status: Option<&str>,
) -> Result<Transition, DbErr> {
    if run.status.is_terminal() {
        warn!(run_id = run.id, status = %run.status, "Ignoring progress on terminal run");
        return Ok(Transition::Stale(run));
    }

    let mut active: workflow_run::ActiveModel = run.clone().into();
    active.version = Set(run.version + 1);
    active.updated_at = Set(Utc::now());
    if let Some(message) = message {
        active.last_message = Set(Some(message.to_string()));
    }
    if let Some(step_status) = step_status {
        active.last_step_status = Set(Some(step_status.to_string()));
    }

    let updated = active.update(db).await?;
    upsert_user_state(db, &updated).await?;
    Ok(Transition::Applied(updated))
}

/// Reject starting a run that is already running or finished.
pub fn ensure_startable(run: &workflow_run::Model) -> Result<(), AppError> {
    match run.status {
        RunStatus::Running => Err(AppError::Conflict("Workflow is already running".into())),
        status if status.is_terminal() => {
            Err(AppError::Conflict("Run is already finished".into()))
        }
        _ => Ok(()),
    }
}

/// Start a locked run. Conflicts leave `started_at` and `last_message` untouched.
pub async fn start<C: ConnectionTrait>(
    db: &C,
    run: workflow_run::Model,
) -> Result<workflow_run::Model, AppError> {
    ensure_startable(&run)?;
    match apply_transition(db, run, RunStatus::Running, Some(MSG_WORKFLOW_STARTED), None).await? {
        Transition::Applied(run) => Ok(run),
        Transition::Stale(_) => Err(AppError::Conflict("Run cannot be started".into())),
    }
}

/// Manually fail a locked run that is pending or stuck in `running`.
pub async fn reset<C: ConnectionTrait>(
    db: &C,
    run: workflow_run::Model,
) -> Result<workflow_run::Model, AppError> {
    if run.status.is_terminal() {
        return Err(AppError::Conflict("Run is already finished".into()));
    }
    match apply_transition(db, run, RunStatus::Failed, Some(MSG_MANUAL_RESET), Some("reset"))
        .await?
    {
        Transition::Applied(run) => Ok(run),
        Transition::Stale(_) => Err(AppError::Conflict("Run cannot be reset".into())),
    }
}

/// Another run of the same user that is currently running, if any.
pub async fn other_running_run<C: ConnectionTrait>(
    db: &C,
    user_id: i32,
    except_run_id: i32,
) -> Result<Option<workflow_run::Model>, DbErr> {
    workflow_run::Entity::find()
        .filter(workflow_run::Column::UserId.eq(user_id))
        .filter(workflow_run::Column::Status.eq(RunStatus::Running))
        .filter(workflow_run::Column::Id.ne(except_run_id))
        .one(db)
        .await
}

/// The user's current run: the state pointer, falling back to the newest run.
pub async fn current_run<C: ConnectionTrait>(
    db: &C,
    user_id: i32,
) -> Result<Option<workflow_run::Model>, DbErr> {
    let pointer = user_state::Entity::find_by_id(user_id)
        .one(db)
        .await?
        .and_then(|s| s.current_run_id);

    if let Some(run_id) = pointer
        && let Some(run) = workflow_run::Entity::find_by_id(run_id)
            .filter(workflow_run::Column::UserId.eq(user_id))
            .one(db)
            .await?
    {
        return Ok(Some(run));
    }

    workflow_run::Entity::find()
        .filter(workflow_run::Column::UserId.eq(user_id))
        .order_by_desc(workflow_run::Column::CreatedAt)
        .order_by_desc(workflow_run::Column::Id)
        .one(db)
        .await
}
