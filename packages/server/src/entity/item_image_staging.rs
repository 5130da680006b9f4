use common::ImageBadge;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// An edit result waiting for the user to publish or discard it.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "item_image_staging")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub user_id: i32,
    pub run_id: i32,
    pub note_id: i32,

    pub url: String,
    pub path: Option<String>,
    pub position: i32,
    pub badge: Option<ImageBadge>,
    /// Prompt the edit was generated from.
    pub prompt: Option<String>,

    pub created_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
