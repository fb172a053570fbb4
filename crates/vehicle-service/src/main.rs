use anyhow::{Context, Result};
use plate_recognition::RecognitionPipeline;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};
use vehicle_registry::{
    BlobStore, FsBlobStore, MemoryVehicleStore, PgVehicleStore, RegistrationService, VehicleStore,
};
use vehicle_service::{
    api::{self, RouterOptions},
    models::load_models,
    AppState, ServiceConfig,
};

#[tokio::main]
async fn main() -> Result<()> {
    let _log_guard = telemetry::init_with_service("vehicle-service");

    let config = ServiceConfig::from_env()?;
    let bind_addr = config.bind_addr;

    // Models are loaded once and shared by every request
    let models = load_models(&config)?;
    let pipeline = RecognitionPipeline::new(
        models.localizer,
        models.recognizer,
        config.pipeline.clone(),
    );

    let store: Arc<dyn VehicleStore> = match &config.database_url {
        Some(url) => {
            let store = PgVehicleStore::connect(url, config.database_max_connections).await?;
            store
                .init_schema()
                .await
                .context("failed to initialize vehicles schema")?;
            info!("using PostgreSQL vehicle store");
            Arc::new(store)
        }
        None => Arc::new(MemoryVehicleStore::new()),
    };

    let blobs = FsBlobStore::new(&config.storage_root, "static");
    blobs.init().await?;
    let blobs: Arc<dyn BlobStore> = Arc::new(blobs);

    let registry = RegistrationService::new(store, blobs);
    let state = AppState::new(pipeline, registry);

    let app = api::router(state, RouterOptions::from(&config));
    let listener = TcpListener::bind(bind_addr).await?;

    info!(
        addr = %bind_addr,
        storage_root = %config.storage_root.display(),
        plate_threshold = config.pipeline.plate_threshold,
        "vehicle-service listening"
    );

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("signal received, starting graceful shutdown");
}
