use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use super::shared::Pagination;
use crate::entity::credit_transaction;

#[derive(Serialize, utoipa::ToSchema)]
pub struct CreditTransactionView {
    pub id: i32,
    pub run_id: Option<i32>,
    /// Signed amount: negative for charges, positive for purchases.
    #[schema(example = -2)]
    pub amount: i64,
    #[schema(example = "image_1")]
    pub reason: String,
    #[schema(value_type = Object)]
    pub meta: Value,
    pub created_at: DateTime<Utc>,
}

impl From<credit_transaction::Model> for CreditTransactionView {
    fn from(tx: credit_transaction::Model) -> Self {
        Self {
            id: tx.id,
            run_id: tx.run_id,
            amount: tx.amount,
            reason: tx.reason,
            meta: tx.meta,
            created_at: tx.created_at,
        }
    }
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct CreditsResponse {
    pub success: bool,
    #[schema(example = 8)]
    pub balance: i64,
    pub transactions: Vec<CreditTransactionView>,
    pub pagination: Pagination,
}
