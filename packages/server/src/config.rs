use std::path::PathBuf;

use common::PriceTable;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Clone)]
pub struct CorsConfig {
    pub allow_origins: Vec<String>,
    pub max_age: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors: CorsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    20
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    #[serde(default = "default_session_cookie")]
    pub session_cookie: String,
    #[serde(default = "default_session_ttl_hours")]
    pub session_ttl_hours: i64,
    /// Mark cookies `Secure`. Disable only for plain-HTTP development.
    #[serde(default = "default_true")]
    pub secure_cookies: bool,
    /// Refuse logins of accounts whose email is not verified.
    #[serde(default)]
    pub require_verification: bool,
    /// Base URL used in links sent by email.
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,
}

fn default_session_cookie() -> String {
    "vitrine_session".into()
}

fn default_session_ttl_hours() -> i64 {
    24 * 7
}

fn default_true() -> bool {
    true
}

fn default_public_base_url() -> String {
    "http://localhost:3000".into()
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
    /// URL prefix under which `upload_dir` is publicly served.
    #[serde(default = "default_uploads_url")]
    pub public_base_url: String,
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size: u64,
    /// Image shown in a slot whose generation failed.
    #[serde(default = "default_error_placeholder_url")]
    pub error_placeholder_url: String,
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("./data/uploads")
}

fn default_uploads_url() -> String {
    "http://localhost:3000/uploads".into()
}

fn default_max_upload_size() -> u64 {
    10 * 1024 * 1024 // 10 MB
}

fn default_error_placeholder_url() -> String {
    "/static/img/error-placeholder.png".into()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: default_upload_dir(),
            public_base_url: default_uploads_url(),
            max_upload_size: default_max_upload_size(),
            error_placeholder_url: default_error_placeholder_url(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct WorkflowConfig {
    /// Engine webhook that starts the main workflow.
    #[serde(default)]
    pub start_url: String,
    /// Engine webhook for edit and upscale requests.
    #[serde(default)]
    pub update_url: String,
    /// Engine webhook notified right after an upload. Disabled when unset.
    #[serde(default)]
    pub intake_url: Option<String>,
    /// Bearer token the engine presents on callbacks.
    #[serde(default)]
    pub callback_token: String,
    #[serde(default = "default_workflow_timeout")]
    pub timeout_secs: u64,
}

fn default_workflow_timeout() -> u64 {
    15
}

#[derive(Debug, Deserialize, Clone)]
pub struct CreditsConfig {
    /// Balance granted on registration.
    #[serde(default = "default_initial_balance")]
    pub initial_balance: i64,
    /// Minimum balance required to start a workflow.
    #[serde(default = "default_start_minimum")]
    pub start_minimum: i64,
    #[serde(default)]
    pub prices: PriceTable,
}

fn default_initial_balance() -> i64 {
    10
}

fn default_start_minimum() -> i64 {
    1
}

impl Default for CreditsConfig {
    fn default() -> Self {
        Self {
            initial_balance: default_initial_balance(),
            start_minimum: default_start_minimum(),
            prices: PriceTable::default(),
        }
    }
}

/// A purchasable credit bundle.
#[derive(Debug, Deserialize, Serialize, Clone, utoipa::ToSchema)]
pub struct CreditPackage {
    #[schema(example = "starter")]
    pub id: String,
    #[schema(example = "Starter (50 Credits)")]
    pub label: String,
    #[schema(example = 50)]
    pub credits: i64,
    /// Decimal price in the configured currency.
    #[schema(example = "9.90")]
    pub price: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PayPalConfig {
    #[serde(default = "default_paypal_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    /// Signature verification is enforced only when a webhook id is set.
    #[serde(default)]
    pub webhook_id: Option<String>,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_packages")]
    pub packages: Vec<CreditPackage>,
}

fn default_paypal_base_url() -> String {
    "https://api-m.sandbox.paypal.com".into()
}

fn default_currency() -> String {
    "EUR".into()
}

fn default_packages() -> Vec<CreditPackage> {
    [("starter", 50, "9.90"), ("pro", 150, "24.90"), ("business", 500, "69.90")]
        .into_iter()
        .map(|(id, credits, price)| CreditPackage {
            id: id.into(),
            label: format!("{} ({credits} Credits)", capitalize(id)),
            credits,
            price: price.into(),
        })
        .collect()
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

impl PayPalConfig {
    pub fn package(&self, id: &str) -> Option<&CreditPackage> {
        self.packages.iter().find(|p| p.id == id)
    }
}

impl Default for PayPalConfig {
    fn default() -> Self {
        Self {
            base_url: default_paypal_base_url(),
            client_id: String::new(),
            client_secret: String::new(),
            webhook_id: None,
            currency: default_currency(),
            packages: default_packages(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub workflow: WorkflowConfig,
    #[serde(default)]
    pub credits: CreditsConfig,
    #[serde(default)]
    pub paypal: PayPalConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let s = Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 3000)?
            .set_default("server.cors.allow_origins", Vec::<String>::new())?
            .set_default("server.cors.max_age", 3600)?
            // Load from config/config.toml
            .add_source(File::with_name("config/config").required(false))
            // Override from environment (e.g., VITRINE__AUTH__JWT_SECRET)
            .add_source(Environment::with_prefix("VITRINE").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
