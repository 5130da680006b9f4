use chrono::Utc;
use common::status_event::codes;
use common::{EventSource, Severity, resolve_status_event};
use sea_orm::*;

use crate::entity::status_log;

/// Upper bound on entries returned by the status feed.
pub const FEED_LIMIT: u64 = 20;

/// One fact to append to a run's status log.
#[derive(Debug, Clone)]
pub struct NewEvent<'a> {
    pub run_id: i32,
    pub user_id: i32,
    pub code: &'a str,
    /// Defaults to the catalogue label of `code`.
    pub message: Option<&'a str>,
    pub source: EventSource,
    /// Overrides the catalogue severity, e.g. for unknown engine codes that report a failure.
    pub severity: Option<Severity>,
}

impl<'a> NewEvent<'a> {
    pub fn new(run_id: i32, user_id: i32, code: &'a str, source: EventSource) -> Self {
        Self {
            run_id,
            user_id,
            code,
            message: None,
            source,
            severity: None,
        }
    }

    pub fn message(mut self, message: Option<&'a str>) -> Self {
        self.message = message.filter(|m| !m.trim().is_empty());
        self
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }
}

/// Append one entry. Repeated codes are recorded again; nothing is deduplicated.
pub async fn log_event<C: ConnectionTrait>(
    db: &C,
    event: NewEvent<'_>,
) -> Result<status_log::Model, DbErr> {
    let code = match event.code.trim() {
        "" => codes::UNKNOWN,
        code => code,
    };
    let resolved = resolve_status_event(code);

    status_log::ActiveModel {
        run_id: Set(event.run_id),
        user_id: Set(event.user_id),
        code: Set(code.to_string()),
        message: Set(event.message.unwrap_or(resolved.label).to_string()),
        source: Set(event.source),
        severity: Set(event.severity.unwrap_or(resolved.severity)),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await
}

/// Most recent entries of a run, newest first by `(created_at, id)`.
pub async fn feed<C: ConnectionTrait>(
    db: &C,
    run_id: i32,
    limit: u64,
) -> Result<Vec<status_log::Model>, DbErr> {
    status_log::Entity::find()
        .filter(status_log::Column::RunId.eq(run_id))
        .order_by_desc(status_log::Column::CreatedAt)
        .order_by_desc(status_log::Column::Id)
        .limit(clamp_limit(limit))
        .all(db)
        .await
}

fn clamp_limit(limit: u64) -> u64 {
    limit.clamp(1, FEED_LIMIT)
}
