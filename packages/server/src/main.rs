use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use common::storage::filesystem::FilesystemImageStore;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use vitrine_server::clients::engine::HttpWorkflowEngine;
use vitrine_server::clients::mailer::LogMailer;
use vitrine_server::clients::paypal::HttpPayPalClient;
use vitrine_server::config::AppConfig;
use vitrine_server::state::AppState;
use vitrine_server::{build_router, database, seed};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("vitrine_server=info,tower_http=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::load().context("Failed to load configuration")?;

    let db = database::init_db(&config.database)
        .await
        .context("Failed to connect to database")?;
    seed::ensure_indexes(&db)
        .await
        .context("Failed to ensure indexes")?;

    let images = FilesystemImageStore::new(
        config.storage.upload_dir.clone(),
        config.storage.public_base_url.clone(),
        config.storage.max_upload_size,
    )
    .await
    .context("Failed to prepare upload directory")?;
    info!(dir = %config.storage.upload_dir.display(), "Image storage ready");

    if config.paypal.webhook_id.is_none() {
        info!("PayPal webhook signature verification disabled");
    }

    let engine = HttpWorkflowEngine::new(config.workflow.clone())
        .context("Failed to build workflow engine client")?;
    let paypal =
        HttpPayPalClient::new(config.paypal.clone()).context("Failed to build PayPal client")?;

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;

    let state = AppState {
        db,
        config: Arc::new(config),
        images: Arc::new(images),
        engine: Arc::new(engine),
        paypal: Arc::new(paypal),
        mailer: Arc::new(LogMailer),
    };

    let app = build_router(state);

    info!("Server running at http://{}", addr);
    info!("API docs at http://{}/swagger-ui", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    axum::serve(listener, app).await?;

    Ok(())
}
