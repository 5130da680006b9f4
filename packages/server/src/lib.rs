pub mod clients;
pub mod config;
pub mod database;
pub mod entity;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod ledger;
pub mod models;
pub mod routes;
pub mod seed;
pub mod state;
pub mod utils;

use std::time::Duration;

use axum::http::{HeaderName, HeaderValue, Method, header};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use utoipa::openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;
use utoipa_scalar::{Scalar, Servable as ScalarServable};
use utoipa_swagger_ui::SwaggerUi;

use crate::config::CorsConfig;
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Vitrine API",
        version = "1.0.0",
        description = "Product photo upload, AI workflow orchestration, credits and PayPal billing"
    ),
    tags(
        (name = "Auth", description = "Accounts, sessions and email tokens"),
        (name = "Settings", description = "Workflow preferences"),
        (name = "Upload", description = "Product photo intake"),
        (name = "Workflow", description = "Starting and refining workflow runs"),
        (name = "Webhooks", description = "Callbacks from the workflow engine"),
        (name = "Runs", description = "Polling run status and results"),
        (name = "Images", description = "Publishing edit results"),
        (name = "Credits", description = "Balance and credit history"),
        (name = "PayPal", description = "Buying credit packages"),
        (name = "Health", description = "Service health"),
    ),
    modifiers(&SecurityAddon),
)]
struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_default();
        components.add_security_scheme(
            "session",
            SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::new("vitrine_session"))),
        );
        components.add_security_scheme(
            "callback_token",
            SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
        );
    }
}

fn cors_layer(config: &CorsConfig) -> Option<CorsLayer> {
    let origins: Vec<HeaderValue> = config
        .allow_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();
    if origins.is_empty() {
        return None;
    }

    Some(
        CorsLayer::new()
            .allow_origin(origins)
            .allow_credentials(true)
            .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
            .allow_headers([header::CONTENT_TYPE, HeaderName::from_static("x-csrf-token")])
            .max_age(Duration::from_secs(config.max_age)),
    )
}

/// Build the application router.
pub fn build_router(state: AppState) -> axum::Router {
    let (router, api) = OpenApiRouter::with_openapi(ApiDoc::openapi())
        .nest("/api", routes::api_routes(&state.config))
        .routes(routes!(handlers::health::health))
        .split_for_parts();

    let uploads = ServeDir::new(&state.config.storage.upload_dir);
    let cors = cors_layer(&state.config.server.cors);

    let router = router
        .with_state(state)
        .nest_service("/uploads", uploads)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", api.clone()))
        .merge(Scalar::with_url("/scalar", api))
        .layer(TraceLayer::new_for_http());

    match cors {
        Some(cors) => router.layer(cors),
        None => router,
    }
}
