use chrono::Utc;
use common::PriceTable;
use sea_orm::sea_query::LockType;
use sea_orm::*;
use serde_json::Value;
use tracing::{error, info, instrument};

use crate::entity::{credit_transaction, user, workflow_run};
use crate::error::AppError;

/// A recorded debit.
#[derive(Debug, Clone)]
pub struct Charge {
    pub transaction: credit_transaction::Model,
    pub balance: i64,
}

async fn lock_user<C: ConnectionTrait>(db: &C, user_id: i32) -> Result<user::Model, DbErr> {
    user::Entity::find_by_id(user_id)
        .lock(LockType::Update)
        .one(db)
        .await?
        .ok_or_else(|| DbErr::RecordNotFound(format!("user {user_id}")))
}

async fn set_balance<C: ConnectionTrait>(
    db: &C,
    user: user::Model,
    balance: i64,
) -> Result<(), DbErr> {
    let mut active: user::ActiveModel = user.into();
    active.credits = Set(balance);
    active.update(db).await?;
    Ok(())
}

async fn insert_transaction<C: ConnectionTrait>(
    db: &C,
    user_id: i32,
    run_id: Option<i32>,
    amount: i64,
    reason: &str,
    meta: Value,
) -> Result<credit_transaction::Model, DbErr> {
    credit_transaction::ActiveModel {
        user_id: Set(user_id),
        run_id: Set(run_id),
        amount: Set(amount),
        reason: Set(reason.to_string()),
        meta: Set(meta),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await
}

/// Debit the configured price of `step_type`.
///
/// Free steps (unmapped or priced at zero or less) return `Ok(None)` without
/// touching the database. Otherwise the balance update, the run's
/// `credits_spent` and the ledger row commit together or not at all. The
/// balance may go negative; the floor is checked before work is started.
#[instrument(skip(db, prices, meta))]
pub async fn charge(
    db: &DatabaseConnection,
    prices: &PriceTable,
    user_id: i32,
    run_id: Option<i32>,
    step_type: &str,
    meta: Value,
) -> Result<Option<Charge>, DbErr> {
    let Some(price) = prices.price_for(step_type) else {
        return Ok(None);
    };

    let txn = db.begin().await?;

    let user = lock_user(&txn, user_id).await?;
    let balance = user.credits - price;
    set_balance(&txn, user, balance).await?;

    if let Some(run_id) = run_id {
        let run = workflow_run::Entity::find_by_id(run_id)
            .lock(LockType::Update)
            .one(&txn)
            .await?
            .ok_or_else(|| DbErr::RecordNotFound(format!("run {run_id}")))?;
        let spent = run.credits_spent + price;
        let mut active: workflow_run::ActiveModel = run.into();
        active.credits_spent = Set(spent);
        active.update(&txn).await?;
    }

    let transaction =
        insert_transaction(&txn, user_id, run_id, -price, step_type.trim(), meta).await?;

    txn.commit().await?;

    info!(price, balance, "Charged credits");
    Ok(Some(Charge {
        transaction,
        balance,
    }))
}

/// [`charge`] for call sites that must not fail because of billing.
pub async fn charge_best_effort(
    db: &DatabaseConnection,
    prices: &PriceTable,
    user_id: i32,
    run_id: Option<i32>,
    step_type: &str,
    meta: Value,
) -> Option<Charge> {
    match charge(db, prices, user_id, run_id, step_type, meta).await {
        Ok(charge) => charge,
        Err(e) => {
            error!(user_id, ?run_id, step_type, error = %e, "Credit charge failed");
            None
        }
    }
}

/// Credit `amount` on the caller's transaction.
///
/// The caller commits; a rollback undoes the credit together with whatever
/// else the caller wrote.
pub async fn add_credits<C: ConnectionTrait>(
    db: &C,
    user_id: i32,
    amount: i64,
    reason: &str,
    meta: Value,
) -> Result<credit_transaction::Model, DbErr> {
    let user = lock_user(db, user_id).await?;
    let balance = user.credits + amount;
    set_balance(db, user, balance).await?;
    let transaction = insert_transaction(db, user_id, None, amount, reason, meta).await?;
    info!(user_id, amount, balance, reason, "Added credits");
    Ok(transaction)
}

/// Current balance of a user.
pub async fn balance<C: ConnectionTrait>(db: &C, user_id: i32) -> Result<i64, AppError> {
    user::Entity::find_by_id(user_id)
        .one(db)
        .await?
        .map(|u| u.credits)
        .ok_or_else(|| AppError::NotFound("User not found".into()))
}

/// Fail with 402 unless the balance covers `required`.
pub async fn ensure_balance<C: ConnectionTrait>(
    db: &C,
    user_id: i32,
    required: i64,
) -> Result<i64, AppError> {
    let balance = balance(db, user_id).await?;
    if balance < required {
        return Err(AppError::InsufficientCredits { balance, required });
    }
    Ok(balance)
}

/// Stored balance next to the balance replayed from the ledger.
///
/// The two are equal for every user.
pub async fn replay_balance<C: ConnectionTrait>(
    db: &C,
    user_id: i32,
) -> Result<(i64, i64), AppError> {
    let user = user::Entity::find_by_id(user_id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;

    let amounts: Vec<i64> = credit_transaction::Entity::find()
        .select_only()
        .column(credit_transaction::Column::Amount)
        .filter(credit_transaction::Column::UserId.eq(user_id))
        .into_tuple()
        .all(db)
        .await?;

    Ok((user.credits, user.initial_credits + amounts.iter().sum::<i64>()))
}

/// One page of a user's ledger, newest first, plus the total row count.
pub async fn history<C: ConnectionTrait>(
    db: &C,
    user_id: i32,
    page: u64,
    per_page: u64,
) -> Result<(Vec<credit_transaction::Model>, u64), DbErr> {
    let paginator = credit_transaction::Entity::find()
        .filter(credit_transaction::Column::UserId.eq(user_id))
        .order_by_desc(credit_transaction::Column::CreatedAt)
        .order_by_desc(credit_transaction::Column::Id)
        .paginate(db, per_page);
    let total = paginator.num_items().await?;
    let rows = paginator.fetch_page(page.saturating_sub(1)).await?;
    Ok((rows, total))
}
