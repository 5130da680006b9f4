use chrono::{Duration, Utc};
use common::PaymentStatus;
use sea_orm::sea_query::{Expr, LockType};
use sea_orm::*;
use serde_json::{Value, json};
use tracing::{info, instrument, warn};

use crate::entity::credit_transaction::REASON_PAYPAL_PURCHASE;
use crate::entity::paypal_payment;
use crate::error::AppError;
use crate::ledger::credit;

/// A `created` order younger than this is reused instead of opening a new one.
pub const REUSE_WINDOW_MINUTES: i64 = 30;

#[derive(Debug)]
pub enum Completion {
    Completed {
        payment: paypal_payment::Model,
        credit_transaction_id: i32,
    },
    /// The order was completed earlier; nothing was credited now.
    AlreadyCompleted(paypal_payment::Model),
}

impl Completion {
    pub fn payment(&self) -> &paypal_payment::Model {
        match self {
            Self::Completed { payment, .. } | Self::AlreadyCompleted(payment) => payment,
        }
    }
}

/// Capture id to store, or a conflict when PayPal reports a different capture.
fn reconcile_capture_id(
    stored: Option<&str>,
    reported: Option<&str>,
) -> Result<Option<String>, AppError> {
    match (stored, reported) {
        (Some(a), Some(b)) if a != b => Err(AppError::Conflict(format!(
            "Capture {b} conflicts with recorded capture {a}"
        ))),
        (_, Some(id)) => Ok(Some(id.to_string())),
        (stored, None) => Ok(stored.map(str::to_string)),
    }
}

/// Grant the credits of an order exactly once.
///
/// Shared by the synchronous capture and the `PAYMENT.CAPTURE.COMPLETED`
/// webhook. The payment row lock serialises both paths; the ledger row and the
/// status change commit together.
#[instrument(skip(db, raw))]
pub async fn complete_payment(
    db: &DatabaseConnection,
    order_id: &str,
    capture_id: Option<&str>,
    raw: Value,
) -> Result<Completion, AppError> {
    let txn = db.begin().await?;

    let payment = paypal_payment::Entity::find()
        .filter(paypal_payment::Column::PaypalOrderId.eq(order_id))
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or_else(|| AppError::NotFound("Payment not found".into()))?;

    if payment.status.is_completed() {
        info!(payment_id = payment.id, "Payment already completed");
        return Ok(Completion::AlreadyCompleted(payment));
    }

    let capture_id = reconcile_capture_id(payment.paypal_capture_id.as_deref(), capture_id)
        .inspect_err(|_| warn!(payment_id = payment.id, "Capture id mismatch"))?;

    let transaction = credit::add_credits(
        &txn,
        payment.user_id,
        payment.credits,
        REASON_PAYPAL_PURCHASE,
        json!({
            "order_id": payment.paypal_order_id,
            "capture_id": capture_id,
            "package_id": payment.package_id,
            "amount": payment.amount,
            "currency": payment.currency,
        }),
    )
    .await?;

    let mut active: paypal_payment::ActiveModel = payment.into();
    active.status = Set(PaymentStatus::Completed);
    active.paypal_capture_id = Set(capture_id);
    active.credit_transaction_id = Set(Some(transaction.id));
    active.raw_payload = Set(Some(raw));
    active.updated_at = Set(Utc::now());
    let payment = active.update(&txn).await?;

    txn.commit().await?;

    info!(
        payment_id = payment.id,
        credits = payment.credits,
        "Payment completed"
    );
    Ok(Completion::Completed {
        payment,
        credit_transaction_id: transaction.id,
    })
}

/// Move a `created` order to `approved`. Other states are left alone.
pub async fn mark_approved(db: &DatabaseConnection, order_id: &str) -> Result<bool, DbErr> {
    let result = paypal_payment::Entity::update_many()
        .col_expr(
            paypal_payment::Column::Status,
            Expr::value(PaymentStatus::Approved),
        )
        .col_expr(paypal_payment::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(paypal_payment::Column::PaypalOrderId.eq(order_id))
        .filter(paypal_payment::Column::Status.eq(PaymentStatus::Created))
        .exec(db)
        .await?;
    Ok(result.rows_affected > 0)
}

/// A recent open order of the same package, reusable instead of a duplicate.
pub async fn reusable_order<C: ConnectionTrait>(
    db: &C,
    user_id: i32,
    package_id: &str,
) -> Result<Option<paypal_payment::Model>, DbErr> {
    let cutoff = Utc::now() - Duration::minutes(REUSE_WINDOW_MINUTES);
    paypal_payment::Entity::find()
        .filter(paypal_payment::Column::UserId.eq(user_id))
        .filter(paypal_payment::Column::PackageId.eq(package_id))
        .filter(paypal_payment::Column::Status.eq(PaymentStatus::Created))
        .filter(paypal_payment::Column::CreatedAt.gt(cutoff))
        .order_by_desc(paypal_payment::Column::Id)
        .one(db)
        .await
}

/// Find a payment of the user by PayPal order id or return 404.
pub async fn find_owned_payment<C: ConnectionTrait>(
    db: &C,
    order_id: &str,
    user_id: i32,
) -> Result<paypal_payment::Model, AppError> {
    paypal_payment::Entity::find()
        .filter(paypal_payment::Column::PaypalOrderId.eq(order_id))
        .filter(paypal_payment::Column::UserId.eq(user_id))
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Payment not found".into()))
}
