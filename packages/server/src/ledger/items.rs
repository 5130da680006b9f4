use std::collections::BTreeMap;

use chrono::Utc;
use common::ImageBadge;
use sea_orm::sea_query::{LockType, OnConflict};
use sea_orm::*;
use tracing::info;

use crate::entity::{item_image, item_image_staging, item_note};
use crate::error::AppError;

/// Generated result slots per run.
pub const SLOT_POSITIONS: std::ops::RangeInclusive<i32> = 1..=3;

/// Fields of a new image row, for both the main and the staging table.
#[derive(Debug, Clone)]
pub struct NewImage {
    pub user_id: i32,
    pub run_id: i32,
    pub note_id: i32,
    pub url: String,
    pub path: Option<String>,
    pub position: i32,
    pub badge: Option<ImageBadge>,
}

/// The run's note, created on first use.
pub async fn ensure_note<C: ConnectionTrait>(
    db: &C,
    user_id: i32,
    run_id: i32,
) -> Result<item_note::Model, DbErr> {
    if let Some(note) = find_note(db, run_id).await? {
        return Ok(note);
    }

    let now = Utc::now();
    let note = item_note::ActiveModel {
        user_id: Set(user_id),
        run_id: Set(run_id),
        product_name: Set(None),
        product_description: Set(None),
        source: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };
    // A concurrent callback may have created it in the meantime.
    item_note::Entity::insert(note)
        .on_conflict(
            OnConflict::column(item_note::Column::RunId)
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(db)
        .await?;

    find_note(db, run_id)
        .await?
        .ok_or_else(|| DbErr::RecordNotFound(format!("note for run {run_id}")))
}

pub async fn find_note<C: ConnectionTrait>(
    db: &C,
    run_id: i32,
) -> Result<Option<item_note::Model>, DbErr> {
    item_note::Entity::find()
        .filter(item_note::Column::RunId.eq(run_id))
        .one(db)
        .await
}

/// Overwrite the text fields that are present; absent fields keep their value.
pub async fn update_note_text<C: ConnectionTrait>(
    db: &C,
    note: item_note::Model,
    product_name: Option<&str>,
    product_description: Option<&str>,
    source: &str,
) -> Result<item_note::Model, DbErr> {
    let mut active: item_note::ActiveModel = note.into();
    if let Some(name) = product_name {
        active.product_name = Set(Some(name.trim().to_string()));
    }
    if let Some(description) = product_description {
        active.product_description = Set(Some(description.trim().to_string()));
    }
    active.source = Set(Some(source.to_string()));
    active.updated_at = Set(Utc::now());
    active.update(db).await
}

pub async fn insert_image<C: ConnectionTrait>(
    db: &C,
    image: NewImage,
) -> Result<item_image::Model, DbErr> {
    item_image::ActiveModel {
        user_id: Set(image.user_id),
        run_id: Set(image.run_id),
        note_id: Set(image.note_id),
        url: Set(image.url),
        path: Set(image.path),
        position: Set(image.position),
        badge: Set(image.badge),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await
}

pub async fn insert_staging<C: ConnectionTrait>(
    db: &C,
    image: NewImage,
    prompt: Option<String>,
) -> Result<item_image_staging::Model, DbErr> {
    item_image_staging::ActiveModel {
        user_id: Set(image.user_id),
        run_id: Set(image.run_id),
        note_id: Set(image.note_id),
        url: Set(image.url),
        path: Set(image.path),
        position: Set(image.position),
        badge: Set(image.badge),
        prompt: Set(prompt),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await
}

/// Current image per slot: for each position the row with the highest id.
pub async fn current_slots<C: ConnectionTrait>(
    db: &C,
    note_id: i32,
) -> Result<Vec<item_image::Model>, DbErr> {
    let images = item_image::Entity::find()
        .filter(item_image::Column::NoteId.eq(note_id))
        .filter(item_image::Column::Position.between(*SLOT_POSITIONS.start(), *SLOT_POSITIONS.end()))
        .order_by_desc(item_image::Column::Id)
        .all(db)
        .await?;
    Ok(pick_current(images))
}

fn pick_current(images: Vec<item_image::Model>) -> Vec<item_image::Model> {
    let mut slots: BTreeMap<i32, item_image::Model> = BTreeMap::new();
    for image in images {
        match slots.get(&image.position) {
            Some(existing) if existing.id > image.id => {}
            _ => {
                slots.insert(image.position, image);
            }
        }
    }
    slots.into_values().collect()
}

/// Staging rows of a run awaiting a decision, newest first.
pub async fn staging_for_run<C: ConnectionTrait>(
    db: &C,
    run_id: i32,
) -> Result<Vec<item_image_staging::Model>, DbErr> {
    item_image_staging::Entity::find()
        .filter(item_image_staging::Column::RunId.eq(run_id))
        .order_by_desc(item_image_staging::Column::Id)
        .all(db)
        .await
}

/// Find an image of the user's run or return 404.
pub async fn find_run_image<C: ConnectionTrait>(
    db: &C,
    image_id: i32,
    run_id: i32,
    user_id: i32,
) -> Result<item_image::Model, AppError> {
    item_image::Entity::find_by_id(image_id)
        .filter(item_image::Column::RunId.eq(run_id))
        .filter(item_image::Column::UserId.eq(user_id))
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Image not found".into()))
}

/// Promote a staging row to a published `edit` image.
///
/// Runs in one transaction: either the staging row is gone and the image
/// exists, or neither changed.
pub async fn publish_staging(
    db: &DatabaseConnection,
    staging_id: i32,
    user_id: i32,
) -> Result<item_image::Model, AppError> {
    let txn = db.begin().await?;

    let staged = item_image_staging::Entity::find_by_id(staging_id)
        .filter(item_image_staging::Column::UserId.eq(user_id))
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or_else(|| AppError::NotFound("Staging image not found".into()))?;

    let image = insert_image(
        &txn,
        NewImage {
            user_id: staged.user_id,
            run_id: staged.run_id,
            note_id: staged.note_id,
            url: staged.url.clone(),
            path: staged.path.clone(),
            position: staged.position,
            badge: Some(ImageBadge::Edit),
        },
    )
    .await?;

    item_image_staging::Entity::delete_by_id(staged.id)
        .exec(&txn)
        .await?;

    txn.commit().await?;

    info!(staging_id, image_id = image.id, "Published staging image");
    Ok(image)
}

/// Delete a staging row of the user and return it.
pub async fn discard_staging(
    db: &DatabaseConnection,
    staging_id: i32,
    user_id: i32,
) -> Result<item_image_staging::Model, AppError> {
    let staged = item_image_staging::Entity::find_by_id(staging_id)
        .filter(item_image_staging::Column::UserId.eq(user_id))
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Staging image not found".into()))?;

    let result = item_image_staging::Entity::delete_by_id(staged.id)
        .exec(db)
        .await?;
    if result.rows_affected == 0 {
        return Err(AppError::NotFound("Staging image not found".into()));
    }
    Ok(staged)
}
