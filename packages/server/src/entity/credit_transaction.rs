use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Reason recorded for PayPal top-ups.
pub const REASON_PAYPAL_PURCHASE: &str = "paypal_purchase";

/// Append-only credit ledger row. Debits are negative.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "credit_transaction")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub user_id: i32,
    #[sea_orm(belongs_to, from = "user_id", to = "id")]
    pub user: HasOne<super::user::Entity>,

    pub run_id: Option<i32>,
    pub amount: i64,
    /// Step type for charges, `paypal_purchase` for top-ups.
    pub reason: String,
    #[sea_orm(column_type = "JsonBinary")]
    pub meta: Json,

    pub created_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
