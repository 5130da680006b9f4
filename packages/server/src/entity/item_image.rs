use common::ImageBadge;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// An image shown in one of the result slots.
///
/// Several rows may share a `(note_id, position)`; the one with the highest id is current.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "item_image")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub user_id: i32,
    pub run_id: i32,

    pub note_id: i32,
    #[sea_orm(belongs_to, from = "note_id", to = "id")]
    pub note: HasOne<super::item_note::Entity>,

    pub url: String,
    /// Storage key; `None` for placeholders that live outside the store.
    pub path: Option<String>,
    pub position: i32,
    pub badge: Option<ImageBadge>,

    pub created_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
