use common::{EventSource, Severity};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Append-only progress entry of a run.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "status_log")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub run_id: i32,
    #[sea_orm(belongs_to, from = "run_id", to = "id")]
    pub run: HasOne<super::workflow_run::Entity>,

    pub user_id: i32,
    pub code: String,
    pub message: String,
    pub source: EventSource,
    pub severity: Severity,

    pub created_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
