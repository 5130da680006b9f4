use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tracing::instrument;

use crate::config::PayPalConfig;

#[derive(Debug, thiserror::Error)]
pub enum PayPalError {
    #[error("PayPal credentials are not configured")]
    NotConfigured,
    #[error("PayPal request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("PayPal answered {status}: {body}")]
    Api { status: u16, body: String },
    #[error("unexpected PayPal response: {0}")]
    Malformed(String),
}

/// Order to create at PayPal.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub reference_id: String,
    pub custom_id: String,
    pub description: String,
    pub currency: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedOrder {
    pub id: String,
    pub status: String,
    /// Link the buyer follows to approve the order.
    pub approve_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaptureOutcome {
    /// Order status, `COMPLETED` on success.
    pub status: String,
    pub capture_id: Option<String>,
    pub raw: Value,
}

impl CaptureOutcome {
    pub fn is_completed(&self) -> bool {
        self.status.eq_ignore_ascii_case("COMPLETED")
    }
}

/// Transmission headers PayPal attaches to webhook deliveries.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookHeaders {
    pub auth_algo: String,
    pub cert_url: String,
    pub transmission_id: String,
    pub transmission_sig: String,
    pub transmission_time: String,
}

#[async_trait]
pub trait PayPalClient: Send + Sync {
    async fn create_order(&self, order: &NewOrder) -> Result<CreatedOrder, PayPalError>;

    async fn capture_order(&self, order_id: &str) -> Result<CaptureOutcome, PayPalError>;

    /// Ask PayPal whether a webhook delivery is authentic.
    async fn verify_webhook(
        &self,
        webhook_id: &str,
        headers: &WebhookHeaders,
        event: &Value,
    ) -> Result<bool, PayPalError>;
}

/// REST client for the PayPal Orders v2 API.
pub struct HttpPayPalClient {
    client: reqwest::Client,
    config: PayPalConfig,
    token: Mutex<Option<(String, Instant)>>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Deserialize)]
struct Link {
    href: String,
    rel: String,
}

#[derive(Deserialize)]
struct OrderResponse {
    id: String,
    status: String,
    #[serde(default)]
    links: Vec<Link>,
}

impl HttpPayPalClient {
    pub fn new(config: PayPalConfig) -> Result<Self, PayPalError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .build()?;
        Ok(Self {
            client,
            config,
            token: Mutex::new(None),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// OAuth2 client-credentials token, cached until shortly before expiry.
    async fn access_token(&self) -> Result<String, PayPalError> {
        if self.config.client_id.is_empty() || self.config.client_secret.is_empty() {
            return Err(PayPalError::NotConfigured);
        }

        let mut cached = self.token.lock().await;
        if let Some((token, expires)) = cached.as_ref()
            && Instant::now() < *expires
        {
            return Ok(token.clone());
        }

        let res = self
            .client
            .post(self.url("/v1/oauth2/token"))
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body("grant_type=client_credentials")
            .send()
            .await?;
        let token: TokenResponse = Self::parse(res).await?;

        let ttl = Duration::from_secs(token.expires_in.saturating_sub(60));
        *cached = Some((token.access_token.clone(), Instant::now() + ttl));
        Ok(token.access_token)
    }

    async fn parse<T: for<'de> Deserialize<'de>>(res: reqwest::Response) -> Result<T, PayPalError> {
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(PayPalError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(res.json::<T>().await?)
    }
}

#[async_trait]
impl PayPalClient for HttpPayPalClient {
    #[instrument(skip(self, order), fields(reference_id = %order.reference_id))]
    async fn create_order(&self, order: &NewOrder) -> Result<CreatedOrder, PayPalError> {
        let token = self.access_token().await?;
        let body = json!({
            "intent": "CAPTURE",
            "purchase_units": [{
                "reference_id": order.reference_id,
                "custom_id": order.custom_id,
                "description": order.description,
                "amount": { "currency_code": order.currency, "value": order.value },
            }],
        });

        let res = self
            .client
            .post(self.url("/v2/checkout/orders"))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;
        let order: OrderResponse = Self::parse(res).await?;

        let approve_url = order
            .links
            .into_iter()
            .find(|l| l.rel == "approve" || l.rel == "payer-action")
            .map(|l| l.href);

        Ok(CreatedOrder {
            id: order.id,
            status: order.status,
            approve_url,
        })
    }

    #[instrument(skip(self))]
    async fn capture_order(&self, order_id: &str) -> Result<CaptureOutcome, PayPalError> {
        let token = self.access_token().await?;
        let res = self
            .client
            .post(self.url(&format!("/v2/checkout/orders/{order_id}/capture")))
            .bearer_auth(token)
            .header("Prefer", "return=representation")
            .json(&json!({}))
            .send()
            .await?;
        let raw: Value = Self::parse(res).await?;
        capture_outcome(raw)
    }

    #[instrument(skip(self, headers, event), fields(transmission_id = %headers.transmission_id))]
    async fn verify_webhook(
        &self,
        webhook_id: &str,
        headers: &WebhookHeaders,
        event: &Value,
    ) -> Result<bool, PayPalError> {
        let token = self.access_token().await?;
        let body = json!({
            "auth_algo": headers.auth_algo,
            "cert_url": headers.cert_url,
            "transmission_id": headers.transmission_id,
            "transmission_sig": headers.transmission_sig,
            "transmission_time": headers.transmission_time,
            "webhook_id": webhook_id,
            "webhook_event": event,
        });

        let res = self
            .client
            .post(self.url("/v1/notifications/verify-webhook-signature"))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;
        let answer: Value = Self::parse(res).await?;
        Ok(answer["verification_status"] == "SUCCESS")
    }
}

/// Pull status and capture id out of an order capture response.
fn capture_outcome(raw: Value) -> Result<CaptureOutcome, PayPalError> {
    let status = raw["status"]
        .as_str()
        .ok_or_else(|| PayPalError::Malformed("capture response without status".into()))?
        .to_string();
    let capture_id = raw["purchase_units"][0]["payments"]["captures"][0]["id"]
        .as_str()
        .map(str::to_string);
    Ok(CaptureOutcome {
        status,
        capture_id,
        raw,
    })
}
