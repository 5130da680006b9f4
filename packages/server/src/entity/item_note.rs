use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Product text of a run. One per run, created lazily.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "item_note")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub user_id: i32,

    #[sea_orm(unique)]
    pub run_id: i32,
    #[sea_orm(belongs_to, from = "run_id", to = "id")]
    pub run: HasOne<super::workflow_run::Entity>,

    pub product_name: Option<String>,
    pub product_description: Option<String>,
    /// Who produced the text, e.g. `n8n` or `upload`.
    pub source: Option<String>,

    #[sea_orm(has_many)]
    pub images: HasMany<super::item_image::Entity>,

    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
