use common::PaymentStatus;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "paypal_payment")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub user_id: i32,
    pub package_id: String,

    #[sea_orm(unique)]
    pub paypal_order_id: String,
    pub paypal_capture_id: Option<String>,

    /// Decimal string as sent to PayPal, e.g. `"9.90"`.
    pub amount: String,
    pub currency: String,
    pub credits: i64,
    pub status: PaymentStatus,

    /// Ledger row created on completion.
    pub credit_transaction_id: Option<i32>,
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub raw_payload: Option<Json>,

    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
