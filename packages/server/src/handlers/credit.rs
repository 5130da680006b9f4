use axum::Json;
use axum::extract::Query;
use tracing::instrument;

use crate::error::{AppError, ErrorBody};
use crate::extractors::session::RequestContext;
use crate::ledger::credit;
use crate::models::credit::{CreditTransactionView, CreditsResponse};
use crate::models::shared::{PageQuery, Pagination};

#[utoipa::path(
    get,
    path = "/credits",
    tag = "Credits",
    operation_id = "getCredits",
    summary = "Balance and credit history",
    description = "Ledger entries newest first: negative amounts are charges, positive amounts \
        purchases.",
    params(PageQuery),
    responses(
        (status = 200, description = "Balance and history", body = CreditsResponse),
        (status = 401, description = "No valid session (UNAUTHORIZED, SESSION_EXPIRED)", body = ErrorBody),
    ),
)]
#[instrument(skip(ctx), fields(user_id = ctx.user_id))]
pub async fn get_credits(
    ctx: RequestContext,
    Query(query): Query<PageQuery>,
) -> Result<Json<CreditsResponse>, AppError> {
    let (page, per_page) = query.resolve();
    let balance = credit::balance(&ctx.db, ctx.user_id).await?;
    let (rows, total) = credit::history(&ctx.db, ctx.user_id, page, per_page).await?;

    Ok(Json(CreditsResponse {
        success: true,
        balance,
        transactions: rows.into_iter().map(CreditTransactionView::from).collect(),
        pagination: Pagination::new(page, per_page, total),
    }))
}
