use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use chrono::Utc;
use common::PaymentStatus;
use sea_orm::sea_query::LockType;
use sea_orm::*;
use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::clients::paypal::{NewOrder, WebhookHeaders};
use crate::entity::{paypal_payment, user};
use crate::error::{AppError, ErrorBody};
use crate::extractors::json::AppJson;
use crate::extractors::session::RequestContext;
use crate::ledger::credit;
use crate::ledger::payment::{self, Completion};
use crate::models::paypal::{
    CaptureResponse, CreateOrderRequest, CreateOrderResponse, EVENT_CAPTURE_COMPLETED,
    EVENT_ORDER_APPROVED, PackagesResponse, PayPalEvent, WebhookAck,
};
use crate::state::AppState;

#[utoipa::path(
    get,
    path = "/packages",
    tag = "PayPal",
    operation_id = "listCreditPackages",
    summary = "Purchasable credit packages",
    responses((status = 200, description = "Configured packages", body = PackagesResponse)),
)]
pub async fn list_packages(State(state): State<AppState>) -> Json<PackagesResponse> {
    Json(PackagesResponse {
        success: true,
        currency: state.config.paypal.currency.clone(),
        packages: state.config.paypal.packages.clone(),
    })
}

/// The user row lock serialises order creation per user.
async fn lock_user<C: ConnectionTrait>(db: &C, user_id: i32) -> Result<(), AppError> {
    user::Entity::find_by_id(user_id)
        .lock(LockType::Update)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;
    Ok(())
}

fn reused(existing: paypal_payment::Model) -> CreateOrderResponse {
    CreateOrderResponse {
        success: true,
        order_id: existing.paypal_order_id,
        approve_url: None,
        reused: true,
    }
}

#[utoipa::path(
    post,
    path = "/orders",
    tag = "PayPal",
    operation_id = "createOrder",
    summary = "Create a PayPal order for a credit package",
    description = "An open order for the same package created within the last 30 minutes is \
        returned instead of a new one.",
    request_body = CreateOrderRequest,
    responses(
        (status = 200, description = "Order created or reused", body = CreateOrderResponse),
        (status = 400, description = "Unknown package (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "No valid session (UNAUTHORIZED, SESSION_EXPIRED)", body = ErrorBody),
        (status = 403, description = "Missing or wrong CSRF token (CSRF_MISMATCH)", body = ErrorBody),
        (status = 502, description = "PayPal unavailable (UPSTREAM_ERROR)", body = ErrorBody),
    ),
)]
#[instrument(skip(ctx, state, payload), fields(user_id = ctx.user_id, package_id = %payload.package_id))]
pub async fn create_order(
    ctx: RequestContext,
    State(state): State<AppState>,
    AppJson(payload): AppJson<CreateOrderRequest>,
) -> Result<Json<CreateOrderResponse>, AppError> {
    let package = ctx
        .config
        .paypal
        .package(payload.package_id.trim())
        .cloned()
        .ok_or_else(|| AppError::Validation(format!("Unknown package '{}'", payload.package_id)))?;

    if let Some(existing) = payment::reusable_order(&ctx.db, ctx.user_id, &package.id).await? {
        info!(order_id = %existing.paypal_order_id, "Reusing open order");
        return Ok(Json(reused(existing)));
    }

    // No lock is held across the PayPal call; the insert re-checks under it.
    let currency = ctx.config.paypal.currency.clone();
    let order = state
        .paypal
        .create_order(&NewOrder {
            reference_id: package.id.clone(),
            custom_id: ctx.user_id.to_string(),
            description: package.label.clone(),
            currency: currency.clone(),
            value: package.price.clone(),
        })
        .await?;

    let txn = ctx.db.begin().await?;
    lock_user(&txn, ctx.user_id).await?;
    if let Some(existing) = payment::reusable_order(&txn, ctx.user_id, &package.id).await? {
        txn.commit().await?;
        warn!(
            order_id = %existing.paypal_order_id,
            abandoned = %order.id,
            "Concurrent order won; dropping the new PayPal order"
        );
        return Ok(Json(reused(existing)));
    }

    let now = Utc::now();
    paypal_payment::ActiveModel {
        user_id: Set(ctx.user_id),
        package_id: Set(package.id.clone()),
        paypal_order_id: Set(order.id.clone()),
        paypal_capture_id: Set(None),
        amount: Set(package.price.clone()),
        currency: Set(currency),
        credits: Set(package.credits),
        status: Set(PaymentStatus::Created),
        credit_transaction_id: Set(None),
        raw_payload: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(&txn)
    .await?;
    txn.commit().await?;

    info!(order_id = %order.id, "Created PayPal order");
    Ok(Json(CreateOrderResponse {
        success: true,
        order_id: order.id,
        approve_url: order.approve_url,
        reused: false,
    }))
}

#[utoipa::path(
    post,
    path = "/orders/{order_id}/capture",
    tag = "PayPal",
    operation_id = "captureOrder",
    summary = "Capture an approved order and credit the package",
    description = "Idempotent: an order that was already completed returns \
        `alreadyCaptured: true` without contacting PayPal or crediting again.",
    params(("order_id" = String, Path, description = "PayPal order ID")),
    responses(
        (status = 200, description = "Order captured", body = CaptureResponse),
        (status = 401, description = "No valid session (UNAUTHORIZED, SESSION_EXPIRED)", body = ErrorBody),
        (status = 403, description = "Missing or wrong CSRF token (CSRF_MISMATCH)", body = ErrorBody),
        (status = 404, description = "Order not found (NOT_FOUND)", body = ErrorBody),
        (status = 409, description = "Capture id conflicts with the recorded one (CONFLICT)", body = ErrorBody),
        (status = 502, description = "PayPal unavailable or capture not completed (UPSTREAM_ERROR)", body = ErrorBody),
    ),
)]
#[instrument(skip(ctx, state), fields(user_id = ctx.user_id))]
pub async fn capture_order(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<Json<CaptureResponse>, AppError> {
    let existing = payment::find_owned_payment(&ctx.db, &order_id, ctx.user_id).await?;

    let (status, credits_added, already_captured) = if existing.status.is_completed() {
        (existing.status, 0, true)
    } else {
        let outcome = state.paypal.capture_order(&order_id).await?;
        if !outcome.is_completed() {
            return Err(AppError::Upstream(format!(
                "Capture of order {order_id} returned status {}",
                outcome.status
            )));
        }
        match payment::complete_payment(&ctx.db, &order_id, outcome.capture_id.as_deref(), outcome.raw)
            .await?
        {
            Completion::Completed { payment, .. } => (payment.status, payment.credits, false),
            Completion::AlreadyCompleted(payment) => (payment.status, 0, true),
        }
    };

    let balance = credit::balance(&ctx.db, ctx.user_id).await?;
    Ok(Json(CaptureResponse {
        success: true,
        order_id,
        status,
        credits_added,
        balance,
        already_captured,
    }))
}

fn webhook_headers(headers: &HeaderMap) -> Option<WebhookHeaders> {
    let get = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };
    Some(WebhookHeaders {
        auth_algo: get("paypal-auth-algo")?,
        cert_url: get("paypal-cert-url")?,
        transmission_id: get("paypal-transmission-id")?,
        transmission_sig: get("paypal-transmission-sig")?,
        transmission_time: get("paypal-transmission-time")?,
    })
}

#[utoipa::path(
    post,
    path = "/webhook",
    tag = "PayPal",
    operation_id = "paypalWebhook",
    summary = "PayPal webhook receiver",
    description = "When a webhook id is configured, every delivery is verified with PayPal before \
        any state changes. `PAYMENT.CAPTURE.COMPLETED` credits the order exactly once; \
        `CHECKOUT.ORDER.APPROVED` marks it approved; other events are acknowledged.",
    request_body(content_type = "application/json", description = "PayPal event"),
    responses(
        (status = 200, description = "Event acknowledged", body = WebhookAck),
        (status = 400, description = "Malformed event or failed verification (VALIDATION_ERROR)", body = ErrorBody),
        (status = 409, description = "Capture id conflicts with the recorded one (CONFLICT)", body = ErrorBody),
        (status = 502, description = "PayPal verification unavailable (UPSTREAM_ERROR)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, headers, body), fields(event_type))]
pub async fn paypal_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, AppError> {
    let raw: Value = serde_json::from_slice(&body)
        .map_err(|e| AppError::Validation(format!("Invalid webhook body: {e}")))?;

    if let Some(webhook_id) = state
        .config
        .paypal
        .webhook_id
        .as_deref()
        .filter(|id| !id.is_empty())
    {
        let transmission = webhook_headers(&headers)
            .ok_or_else(|| AppError::Validation("Missing PayPal transmission headers".into()))?;
        if !state
            .paypal
            .verify_webhook(webhook_id, &transmission, &raw)
            .await?
        {
            warn!(transmission_id = %transmission.transmission_id, "Webhook signature rejected");
            return Err(AppError::Validation(
                "Webhook signature verification failed".into(),
            ));
        }
    }

    let event: PayPalEvent = serde_json::from_value(raw.clone())
        .map_err(|e| AppError::Validation(format!("Invalid webhook event: {e}")))?;
    tracing::Span::current().record("event_type", event.event_type.as_str());

    let handled = match event.event_type.as_str() {
        EVENT_CAPTURE_COMPLETED => {
            let order_id = event
                .order_id()
                .ok_or_else(|| AppError::Validation("Capture event without order id".into()))?;
            match payment::complete_payment(&state.db, order_id, event.capture_id(), raw.clone())
                .await
            {
                Ok(Completion::Completed { .. }) => true,
                Ok(Completion::AlreadyCompleted(_)) => false,
                Err(AppError::NotFound(_)) => {
                    warn!(order_id, "Capture event for unknown order");
                    false
                }
                Err(e) => return Err(e),
            }
        }
        EVENT_ORDER_APPROVED => match event.order_id() {
            Some(order_id) => payment::mark_approved(&state.db, order_id).await?,
            None => false,
        },
        _ => false,
    };

    info!(event_type = %event.event_type, handled, "PayPal webhook processed");
    Ok(Json(WebhookAck {
        success: true,
        event_type: event.event_type,
        handled,
    }))
}
