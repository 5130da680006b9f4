use chrono::{DateTime, Utc};
use common::{EventSource, ImageBadge, RunStatus, Severity, resolve_status_event};
use serde::{Deserialize, Serialize};

use super::shared::Pagination;
use crate::entity::{item_image, item_image_staging, item_note, run_upload, status_log, workflow_run};

/// `GET /status-feed` query.
#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct FeedQuery {
    /// Run to read; defaults to the user's current run.
    pub run_id: Option<i32>,
    /// Number of entries (1-20, default 20).
    pub limit: Option<u64>,
}

/// A status log entry with its catalogue presentation.
#[derive(Serialize, utoipa::ToSchema)]
pub struct FeedEvent {
    pub id: i32,
    #[schema(example = "IMAGE_DONE")]
    pub code: String,
    #[schema(example = "Bild erstellt")]
    pub label: String,
    pub message: String,
    pub severity: Severity,
    #[schema(example = "image")]
    pub icon: String,
    pub source: EventSource,
    pub created_at: DateTime<Utc>,
}

impl From<status_log::Model> for FeedEvent {
    fn from(entry: status_log::Model) -> Self {
        let resolved = resolve_status_event(&entry.code);
        Self {
            id: entry.id,
            code: entry.code,
            label: resolved.label.to_string(),
            message: entry.message,
            severity: entry.severity,
            icon: resolved.icon.to_string(),
            source: entry.source,
            created_at: entry.created_at,
        }
    }
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct StatusFeedResponse {
    pub success: bool,
    /// `null` when the user has no run yet.
    pub run_id: Option<i32>,
    pub status: Option<RunStatus>,
    pub isrunning: bool,
    pub last_message: Option<String>,
    pub events: Vec<FeedEvent>,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct RunSummary {
    pub id: i32,
    pub status: RunStatus,
    pub isrunning: bool,
    pub last_message: Option<String>,
    pub last_step_status: Option<String>,
    pub credits_spent: i64,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<workflow_run::Model> for RunSummary {
    fn from(run: workflow_run::Model) -> Self {
        Self {
            id: run.id,
            status: run.status,
            isrunning: run.status.is_running(),
            last_message: run.last_message,
            last_step_status: run.last_step_status,
            credits_spent: run.credits_spent,
            started_at: run.started_at,
            finished_at: run.finished_at,
            created_at: run.created_at,
            updated_at: run.updated_at,
        }
    }
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct RunListResponse {
    pub success: bool,
    pub runs: Vec<RunSummary>,
    pub pagination: Pagination,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct RunResponse {
    pub success: bool,
    pub run: RunSummary,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct NoteView {
    pub id: i32,
    #[schema(example = "Leder-Sneaker Weiß")]
    pub product_name: Option<String>,
    pub product_description: Option<String>,
    pub source: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl From<item_note::Model> for NoteView {
    fn from(note: item_note::Model) -> Self {
        Self {
            id: note.id,
            product_name: note.product_name,
            product_description: note.product_description,
            source: note.source,
            updated_at: note.updated_at,
        }
    }
}

/// The current image of one result slot.
#[derive(Serialize, utoipa::ToSchema)]
pub struct ImageSlot {
    pub id: i32,
    #[schema(example = 1)]
    pub position: i32,
    pub url: String,
    pub badge: Option<ImageBadge>,
    pub created_at: DateTime<Utc>,
}

impl From<item_image::Model> for ImageSlot {
    fn from(image: item_image::Model) -> Self {
        Self {
            id: image.id,
            position: image.position,
            url: image.url,
            badge: image.badge,
            created_at: image.created_at,
        }
    }
}

/// An edit result awaiting publish or discard.
#[derive(Serialize, utoipa::ToSchema)]
pub struct StagingImage {
    pub id: i32,
    pub position: i32,
    pub url: String,
    pub prompt: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<item_image_staging::Model> for StagingImage {
    fn from(image: item_image_staging::Model) -> Self {
        Self {
            id: image.id,
            position: image.position,
            url: image.url,
            prompt: image.prompt,
            created_at: image.created_at,
        }
    }
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct UploadView {
    pub id: i32,
    pub url: String,
    pub name: String,
    pub content_type: String,
    pub size: i64,
    pub created_at: DateTime<Utc>,
}

impl From<run_upload::Model> for UploadView {
    fn from(upload: run_upload::Model) -> Self {
        Self {
            id: upload.id,
            url: upload.url,
            name: upload.original_name,
            content_type: upload.content_type,
            size: upload.size,
            created_at: upload.created_at,
        }
    }
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct RunDetailResponse {
    pub success: bool,
    pub run: RunSummary,
    pub note: Option<NoteView>,
    /// Current image per slot, ordered by position.
    pub images: Vec<ImageSlot>,
    pub staging: Vec<StagingImage>,
    pub uploads: Vec<UploadView>,
    /// Most recent status entries, newest first.
    pub events: Vec<FeedEvent>,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct LatestItemResponse {
    pub success: bool,
    pub run_id: Option<i32>,
    pub status: Option<RunStatus>,
    pub isrunning: bool,
    pub note: Option<NoteView>,
    pub images: Vec<ImageSlot>,
}

/// Denormalised per-user state for cheap polling.
#[derive(Serialize, utoipa::ToSchema)]
pub struct StateResponse {
    pub success: bool,
    pub current_run_id: Option<i32>,
    pub status: Option<RunStatus>,
    pub last_message: Option<String>,
    pub isrunning: bool,
    #[schema(example = 8)]
    pub credits: i64,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct PublishResponse {
    pub success: bool,
    pub image: ImageSlot,
}
