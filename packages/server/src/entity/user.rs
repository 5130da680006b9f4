use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "user")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    /// Stored lower-cased.
    #[sea_orm(unique)]
    pub email: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub display_name: String,
    pub verified: bool,

    /// Current balance. Updated only together with a `credit_transaction` insert.
    pub credits: i64,
    /// Balance granted at registration; the ledger replays from here.
    pub initial_credits: i64,

    pub category: Option<String>,
    pub image_ratio: String,

    #[sea_orm(has_many)]
    pub runs: HasMany<super::workflow_run::Entity>,

    #[sea_orm(has_many)]
    pub credit_transactions: HasMany<super::credit_transaction::Entity>,

    pub created_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
