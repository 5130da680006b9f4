use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;

use crate::config::AppConfig;
use crate::handlers;
use crate::state::AppState;

pub fn routes(config: &AppConfig) -> OpenApiRouter<AppState> {
    let upload_limit = config.storage.max_upload_size;

    OpenApiRouter::new()
        .nest("/auth", auth_routes())
        .nest("/session", session_routes())
        .routes(routes!(
            handlers::settings::get_settings,
            handlers::settings::update_settings
        ))
        .merge(upload_routes(upload_limit))
        .nest("/workflow", workflow_routes())
        .nest("/webhooks", webhook_routes(upload_limit))
        .routes(routes!(handlers::run::status_feed))
        .routes(routes!(handlers::run::latest_item))
        .routes(routes!(handlers::run::get_state))
        .nest("/runs", run_routes())
        .nest("/images/staging", staging_routes())
        .routes(routes!(handlers::credit::get_credits))
        .nest("/paypal", paypal_routes())
}

fn auth_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(handlers::auth::register))
        .routes(routes!(handlers::auth::login))
        .routes(routes!(handlers::auth::logout))
        .routes(routes!(handlers::auth::me))
        .routes(routes!(handlers::auth::verify_email))
        .routes(routes!(handlers::auth::forgot_password))
        .routes(routes!(handlers::auth::reset_password))
}

fn session_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().routes(routes!(handlers::auth::take_flash))
}

fn upload_routes(limit: u64) -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(handlers::upload::upload_image))
        .layer(handlers::upload::upload_body_limit(limit))
}

fn workflow_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(handlers::workflow::start_workflow))
        .routes(routes!(handlers::workflow::update_workflow))
}

fn webhook_routes(limit: u64) -> OpenApiRouter<AppState> {
    let image = OpenApiRouter::new()
        .routes(routes!(handlers::webhook::image_callback))
        .layer(handlers::upload::upload_body_limit(limit));

    OpenApiRouter::new()
        .routes(routes!(handlers::webhook::status_callback))
        .merge(image)
}

fn run_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(handlers::run::list_runs))
        .routes(routes!(handlers::run::get_run))
        .routes(routes!(handlers::run::reset_run))
}

fn staging_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(handlers::staging::publish_staging))
        .routes(routes!(handlers::staging::discard_staging))
}

fn paypal_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(handlers::paypal::list_packages))
        .routes(routes!(handlers::paypal::create_order))
        .routes(routes!(handlers::paypal::capture_order))
        .routes(routes!(handlers::paypal::paypal_webhook))
}
