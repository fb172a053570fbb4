use crate::error::ApiError;
use crate::state::AppState;
use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};
use common::vehicles::{DriverPhoto, RegisterVehicleRequest, Vehicle, VehicleDetection};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

// ===== Health & Metrics =====

pub async fn healthz() -> &'static str {
    "ok"
}

pub async fn readyz(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    match state.registry().health_check().await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "ready" }))),
        Err(e) => {
            warn!(error = %e, "vehicle store not reachable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unavailable", "error": e.to_string() })),
            )
        }
    }
}

pub async fn metrics() -> Result<String, ApiError> {
    telemetry::metrics::encode_metrics()
        .map_err(|e| ApiError::internal(format!("failed to encode metrics: {}", e)))
}

// ===== Vehicles =====

#[derive(Debug, Default, Deserialize)]
pub struct VehicleQuery {
    pub search: Option<String>,
}

pub async fn list_vehicles(
    State(state): State<AppState>,
    Query(query): Query<VehicleQuery>,
) -> Result<Json<Vec<Vehicle>>, ApiError> {
    let vehicles = state
        .registry()
        .search_vehicles(query.search.as_deref())
        .await?;
    Ok(Json(vehicles))
}

pub async fn get_vehicle(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Vehicle>, ApiError> {
    state
        .registry()
        .get_vehicle(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Vehicle not found"))
}

// ===== Recognition =====

pub async fn detect_plate(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<Vec<VehicleDetection>>, ApiError> {
    let mut image = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some("image") {
            image = Some(field.bytes().await?);
            break;
        }
    }

    let image = image.ok_or_else(|| ApiError::bad_request("No image provided"))?;
    if image.is_empty() {
        return Err(ApiError::bad_request("Empty image file"));
    }

    let detections = state.pipeline().detect_vehicles(&image).await?;
    info!(
        vehicles = detections.len(),
        plates = detections.iter().filter(|d| d.has_plate()).count(),
        "detect_plate completed"
    );
    Ok(Json(detections))
}

// ===== Registration =====

pub async fn register_vehicle(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<Vehicle>, ApiError> {
    let mut request = RegisterVehicleRequest::default();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "plate_number" => request.plate_number = field.text().await?,
            "driver_name" => request.driver_name = field.text().await?,
            "car_color" => request.car_color = Some(field.text().await?),
            "car_type" => request.car_type = Some(field.text().await?),
            "driver_photo" => {
                let file_name = field.file_name().map(str::to_string);
                let bytes = field.bytes().await?.to_vec();
                request.driver_photo = Some(DriverPhoto { file_name, bytes });
            }
            other => debug!(field = %other, "ignoring unknown multipart field"),
        }
    }

    let vehicle = state.registry().register_vehicle(request).await?;
    Ok(Json(vehicle))
}
