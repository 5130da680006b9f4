use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A source image uploaded by the user for a run.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "run_upload")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub user_id: i32,

    pub run_id: i32,
    #[sea_orm(belongs_to, from = "run_id", to = "id")]
    pub run: HasOne<super::workflow_run::Entity>,

    /// Storage key relative to the upload directory.
    pub path: String,
    pub url: String,
    pub original_name: String,
    pub content_type: String,
    pub size: i64,

    pub created_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
