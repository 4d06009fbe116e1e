pub mod api;
mod cache;
mod config;
mod models;
mod services;

use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use cache::revocation::RevocationLedger;
use cache::CacheManager;
use config::Config;
use services::directory::{ConfigDirectory, VehicleDirectory};
use services::eta::EtaEngine;
use services::ingest::{self, IngestService};
use services::locations::LocationStore;

#[derive(OpenApi)]
#[openapi(
    info(title = "BusLive API", version = "0.1.0"),
    paths(
        api::vehicles::report_position,
        api::vehicles::list_locations,
        api::vehicles::get_location,
        api::vehicles::delete_location,
        api::eta::predict_eta,
        api::eta::route_eta,
        api::eta::get_traffic_forecast,
        api::auth::logout,
        api::system::health,
    ),
    components(schemas(
        api::ErrorResponse,
        api::vehicles::VehicleStatus,
        api::vehicles::LocationListResponse,
        api::eta::EtaResponse,
        api::eta::RouteEtaResponse,
        api::eta::TrafficForecastResponse,
        api::auth::LogoutRequest,
        api::auth::LogoutResponse,
        api::system::HealthResponse,
        models::PositionReport,
        models::PositionRecord,
        models::PositionSource,
        models::RouteStop,
        services::eta::EtaPrediction,
        services::eta::StopEta,
        services::eta::TrafficSlot,
        cache::CacheMode,
    )),
    tags(
        (name = "vehicles", description = "Position ingestion and live locations"),
        (name = "eta", description = "Arrival predictions and traffic forecast"),
        (name = "auth", description = "Token revocation"),
        (name = "system", description = "Service health")
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .init();

    // Load config
    let config = Config::load("config.yaml").expect("Failed to load config");
    tracing::info!(vehicles = config.vehicles.len(), "Loaded configuration");

    // Build CORS layer based on config
    let cors_layer = if config.cors_permissive {
        tracing::warn!("CORS: Permissive mode explicitly enabled (all origins allowed) - DO NOT USE IN PRODUCTION");
        CorsLayer::permissive()
    } else if !config.cors_origins.is_empty() {
        tracing::info!(origins = ?config.cors_origins, "CORS: Restricting to configured origins");
        let origins: Vec<_> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([
                axum::http::Method::GET,
                axum::http::Method::POST,
                axum::http::Method::DELETE,
                axum::http::Method::OPTIONS,
            ])
            .allow_headers([
                axum::http::header::CONTENT_TYPE,
                axum::http::header::AUTHORIZATION,
            ])
    } else {
        panic!("CORS configuration error: Either set 'cors_origins' with allowed origins, or set 'cors_permissive: true' for development");
    };

    // Connect the cache (falls back to memory if Redis is unreachable)
    let cache = Arc::new(CacheManager::connect(&config.cache).await);
    tracing::info!(mode = ?cache.mode(), "Cache backend ready");
    let sweep_task = cache.spawn_maintenance(config.cache.sweep_interval_secs);

    // Vehicle directory from config
    let directory = Arc::new(ConfigDirectory::from_entries(&config.vehicles));
    tracing::info!(vehicles = directory.vehicle_count(), "Vehicle directory loaded");
    let directory: Arc<dyn VehicleDirectory> = directory;

    // Core services
    let locations = LocationStore::new(Arc::clone(&cache), config.locations.ttl_secs);
    let updates_tx = ingest::position_channel(256);
    let ingest_service = Arc::new(IngestService::new(
        locations.clone(),
        Arc::clone(&directory),
        updates_tx.clone(),
    ));

    let state = api::AppState {
        locations,
        ingest: ingest_service,
        directory,
        eta: EtaEngine::new(config.eta.minimum_speed_kmh),
        revocations: RevocationLedger::new(Arc::clone(&cache)),
        updates_tx,
        offline_threshold: chrono::Duration::seconds(config.locations.offline_threshold_secs as i64),
        cache,
    };

    // Build the app
    let app = Router::new()
        .route("/", get(root))
        .nest("/api", api::router(state))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .unwrap_or_else(|e| panic!("Failed to bind to {}: {e}", config.bind_addr));

    tracing::info!("Server running on http://{}", config.bind_addr);
    tracing::info!("Swagger UI: http://{}/swagger-ui", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Failed to start server");

    sweep_task.abort();
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("Shutdown signal received");
}

async fn root() -> &'static str {
    "BusLive API"
}
