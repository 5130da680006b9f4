use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::instrument;

use crate::config::WorkflowConfig;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("workflow webhook '{0}' is not configured")]
    NotConfigured(&'static str),
    #[error("workflow engine request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("workflow engine answered with HTTP {0}")]
    Status(u16),
}

/// Payload that starts the main workflow of a run.
#[derive(Debug, Clone, Serialize)]
pub struct StartPayload {
    pub run_id: i32,
    pub user_id: i32,
    pub image_urls: Vec<String>,
    pub category: Option<String>,
    pub image_ratio: String,
}

/// Payload for an edit or upscale of a single image.
#[derive(Debug, Clone, Serialize)]
pub struct UpdatePayload {
    pub run_id: i32,
    pub user_id: i32,
    pub note_id: i32,
    pub image_id: i32,
    pub image_url: String,
    pub position: i32,
    pub action: common::ImageAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub userprompt: Option<String>,
}

/// Payload announcing a fresh upload.
#[derive(Debug, Clone, Serialize)]
pub struct IntakePayload {
    pub run_id: i32,
    pub user_id: i32,
    pub image_url: String,
}

/// HTTP status the engine acknowledged a webhook with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineAck {
    pub status: u16,
}

/// The external workflow engine, reached through its webhooks.
#[async_trait]
pub trait WorkflowEngine: Send + Sync {
    async fn start(&self, payload: &StartPayload) -> Result<EngineAck, EngineError>;

    async fn update(&self, payload: &UpdatePayload) -> Result<EngineAck, EngineError>;

    /// Returns `Ok(None)` when no intake webhook is configured.
    async fn intake(&self, payload: &IntakePayload) -> Result<Option<EngineAck>, EngineError>;
}

pub struct HttpWorkflowEngine {
    client: reqwest::Client,
    config: WorkflowConfig,
}

impl HttpWorkflowEngine {
    pub fn new(config: WorkflowConfig) -> Result<Self, EngineError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    async fn post<T: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &T,
    ) -> Result<EngineAck, EngineError> {
        let res = self.client.post(url).json(body).send().await?;
        let status = res.status();
        if !status.is_success() {
            return Err(EngineError::Status(status.as_u16()));
        }
        Ok(EngineAck {
            status: status.as_u16(),
        })
    }
}

fn configured<'a>(url: &'a str, name: &'static str) -> Result<&'a str, EngineError> {
    let url = url.trim();
    if url.is_empty() {
        Err(EngineError::NotConfigured(name))
    } else {
        Ok(url)
    }
}

#[async_trait]
impl WorkflowEngine for HttpWorkflowEngine {
    #[instrument(skip(self, payload), fields(run_id = payload.run_id))]
    async fn start(&self, payload: &StartPayload) -> Result<EngineAck, EngineError> {
        let url = configured(&self.config.start_url, "start_url")?;
        self.post(url, payload).await
    }

    #[instrument(skip(self, payload), fields(run_id = payload.run_id, action = %payload.action))]
    async fn update(&self, payload: &UpdatePayload) -> Result<EngineAck, EngineError> {
        let url = configured(&self.config.update_url, "update_url")?;
        self.post(url, payload).await
    }

    #[instrument(skip(self, payload), fields(run_id = payload.run_id))]
    async fn intake(&self, payload: &IntakePayload) -> Result<Option<EngineAck>, EngineError> {
        match self.config.intake_url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => self.post(url, payload).await.map(Some),
            _ => Ok(None),
        }
    }
}
