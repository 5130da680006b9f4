use common::RunStatus;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Denormalized "latest run" pointer per user, upserted on every transition.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "user_state")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub user_id: i32,

    pub current_run_id: Option<i32>,
    pub status: Option<RunStatus>,
    pub last_message: Option<String>,

    pub updated_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
