pub mod routes;

use crate::config::ServiceConfig;
use crate::state::AppState;
use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method},
    routing::{get, post},
    Router,
};
use std::path::PathBuf;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tracing::warn;

/// Transport settings for [`router`]
#[derive(Debug, Clone)]
pub struct RouterOptions {
    pub cors_origins: Vec<String>,
    pub max_upload_bytes: usize,
    /// Directory served under `/static`
    pub static_root: PathBuf,
}

impl From<&ServiceConfig> for RouterOptions {
    fn from(config: &ServiceConfig) -> Self {
        Self {
            cors_origins: config.cors_origins.clone(),
            max_upload_bytes: config.max_upload_bytes,
            static_root: config.storage_root.clone(),
        }
    }
}

pub fn router(state: AppState, options: RouterOptions) -> Router {
    let api = Router::new()
        .route("/vehicles", get(routes::list_vehicles))
        .route("/vehicles/:id", get(routes::get_vehicle))
        .route("/detect_plate", post(routes::detect_plate))
        .route("/register_vehicle", post(routes::register_vehicle))
        .layer(DefaultBodyLimit::max(options.max_upload_bytes))
        .layer(cors_layer(&options.cors_origins));

    Router::new()
        // Health and metrics
        .route("/healthz", get(routes::healthz))
        .route("/readyz", get(routes::readyz))
        .route("/metrics", get(routes::metrics))
        .nest("/api", api)
        .nest_service("/static", ServeDir::new(&options.static_root))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any)
}
