use common::PaymentStatus;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::CreditPackage;

pub const EVENT_CAPTURE_COMPLETED: &str = "PAYMENT.CAPTURE.COMPLETED";
pub const EVENT_ORDER_APPROVED: &str = "CHECKOUT.ORDER.APPROVED";

#[derive(Serialize, utoipa::ToSchema)]
pub struct PackagesResponse {
    pub success: bool,
    #[schema(example = "EUR")]
    pub currency: String,
    pub packages: Vec<CreditPackage>,
}

#[derive(Deserialize, utoipa::ToSchema)]
pub struct CreateOrderRequest {
    #[schema(example = "starter")]
    pub package_id: String,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct CreateOrderResponse {
    pub success: bool,
    #[schema(example = "5O190127TN364715T")]
    pub order_id: String,
    /// Where to send the buyer; absent for a reused order.
    pub approve_url: Option<String>,
    /// An open order of the same package was returned instead of a new one.
    pub reused: bool,
}

#[derive(Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CaptureResponse {
    pub success: bool,
    pub order_id: String,
    pub status: PaymentStatus,
    /// Credits granted by this call; 0 when the order was already captured.
    pub credits_added: i64,
    pub balance: i64,
    pub already_captured: bool,
}

/// Incoming PayPal webhook event; only the fields used here are read.
#[derive(Debug, Deserialize)]
pub struct PayPalEvent {
    pub event_type: String,
    #[serde(default)]
    pub resource: Value,
}

impl PayPalEvent {
    /// Order the event refers to.
    pub fn order_id(&self) -> Option<&str> {
        match self.event_type.as_str() {
            EVENT_CAPTURE_COMPLETED => self
                .resource
                .pointer("/supplementary_data/related_ids/order_id")
                .and_then(Value::as_str),
            EVENT_ORDER_APPROVED => self.resource.get("id").and_then(Value::as_str),
            _ => None,
        }
    }

    /// Capture id of a `PAYMENT.CAPTURE.COMPLETED` event.
    pub fn capture_id(&self) -> Option<&str> {
        match self.event_type.as_str() {
            EVENT_CAPTURE_COMPLETED => self.resource.get("id").and_then(Value::as_str),
            _ => None,
        }
    }
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct WebhookAck {
    pub success: bool,
    #[schema(example = "PAYMENT.CAPTURE.COMPLETED")]
    pub event_type: String,
    /// Whether the event changed local state.
    pub handled: bool,
}
