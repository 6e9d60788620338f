use actix_web::{web, App, HttpServer};
use anyhow::Context;
use storefront_assistant::handlers::configure_routes;
use storefront_assistant::AppState;
use storefront_config::AssistantConfig;
use storefront_observability::{init_tracing, observability, TracingConfig};
use tracing::info;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    init_tracing(TracingConfig::for_service("storefront-assistant"));

    let config = AssistantConfig::from_env().context("failed to load configuration")?;
    let host = config.server.host.clone();
    let port = config.server.port;

    info!(
        index = %config.index.name,
        namespace = %config.index.namespace,
        model = %config.completion.model,
        features = ?config.feature_toggles.enabled_features(),
        "starting storefront assistant"
    );

    let state = web::Data::new(AppState::new(config).context("failed to initialize services")?);

    info!("Starting HTTP server on {}:{}", host, port);

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(observability("storefront-assistant"))
            .configure(configure_routes)
    })
    .bind((host.as_str(), port))
    .with_context(|| format!("failed to bind {}:{}", host, port))?
    .run()
    .await
    .context("server terminated with an error")
}
