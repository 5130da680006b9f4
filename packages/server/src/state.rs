use std::sync::Arc;

use common::storage::ImageStore;
use sea_orm::DatabaseConnection;

use crate::clients::engine::WorkflowEngine;
use crate::clients::mailer::Mailer;
use crate::clients::paypal::PayPalClient;
use crate::config::AppConfig;

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub config: Arc<AppConfig>,
    pub images: Arc<dyn ImageStore>,
    pub engine: Arc<dyn WorkflowEngine>,
    pub paypal: Arc<dyn PayPalClient>,
    pub mailer: Arc<dyn Mailer>,
}
