//! Integration tests for the vehicle service HTTP API

use axum::http::{header, HeaderValue, StatusCode};
use axum_test::multipart::{MultipartForm, Part};
use axum_test::TestServer;
use common::vehicles::{Vehicle, VehicleDetection};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use plate_recognition::model::mock::{ScriptedRecognizer, StaticLocalizer};
use plate_recognition::model::{ObjectLocalizer, TextCandidate};
use plate_recognition::{PipelineConfig, RecognitionPipeline};
use std::io::Cursor;
use std::sync::Arc;
use tempfile::TempDir;
use vehicle_registry::{FsBlobStore, MemoryVehicleStore, RegistrationService};
use vehicle_service::api::{self, RouterOptions};
use vehicle_service::AppState;

struct TestApp {
    server: TestServer,
    storage: TempDir,
}

fn setup_with(
    localizer: impl ObjectLocalizer + 'static,
    recognizer: ScriptedRecognizer,
    max_upload_bytes: usize,
) -> TestApp {
    let storage = TempDir::new().unwrap();

    let pipeline = RecognitionPipeline::new(
        Arc::new(localizer),
        Arc::new(recognizer),
        PipelineConfig::default(),
    );
    let registry = RegistrationService::new(
        Arc::new(MemoryVehicleStore::new()),
        Arc::new(FsBlobStore::new(storage.path(), "static")),
    );
    let state = AppState::new(pipeline, registry);

    let options = RouterOptions {
        cors_origins: vec!["http://localhost:5000".to_string()],
        max_upload_bytes,
        static_root: storage.path().to_path_buf(),
    };
    let server = TestServer::new(api::router(state, options)).unwrap();

    TestApp { server, storage }
}

/// One car covering the whole frame whose plate reads "ABC-1234"
fn setup() -> TestApp {
    setup_with(
        StaticLocalizer::whole_image("car", 0.91),
        ScriptedRecognizer::fixed(vec![TextCandidate::new("ABC-1234", 0.88)]),
        1024 * 1024,
    )
}

fn blue_car_png() -> Vec<u8> {
    let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(120, 80, Rgb([0, 0, 255])));
    let mut bytes = Cursor::new(Vec::new());
    image.write_to(&mut bytes, ImageFormat::Png).unwrap();
    bytes.into_inner()
}

fn image_form(bytes: Vec<u8>) -> MultipartForm {
    MultipartForm::new().add_part(
        "image",
        Part::bytes(bytes).file_name("car.png").mime_type("image/png"),
    )
}

fn registration_form(plate: &str, driver: &str) -> MultipartForm {
    MultipartForm::new()
        .add_text("plate_number", plate)
        .add_text("driver_name", driver)
        .add_text("car_color", "red")
        .add_text("car_type", "sedan")
        .add_part(
            "driver_photo",
            Part::bytes(b"fake jpeg bytes".to_vec())
                .file_name("my photo.jpg")
                .mime_type("image/jpeg"),
        )
}

// ===== Health & Metrics =====

#[tokio::test]
async fn test_health_endpoints() {
    let app = setup();

    let response = app.server.get("/healthz").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.text(), "ok");

    let response = app.server.get("/readyz").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
async fn test_metrics_after_detection() {
    let app = setup();
    app.server
        .post("/api/detect_plate")
        .multipart(image_form(blue_car_png()))
        .await;

    let response = app.server.get("/metrics").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert!(response.text().contains("recognition_requests_total"));
}

// ===== Detection =====

#[tokio::test]
async fn test_detect_plate_blue_car() {
    let app = setup();

    let response = app
        .server
        .post("/api/detect_plate")
        .multipart(image_form(blue_car_png()))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let detections: Vec<VehicleDetection> = response.json();
    assert_eq!(detections.len(), 1);
    assert_eq!(detections[0].vehicle_label.as_str(), "car");
    assert_eq!(detections[0].color_name, "blue");
    assert_eq!(detections[0].plate_text.as_deref(), Some("ABC-1234"));
    assert!(detections[0].plate_confidence.unwrap() > 0.5);
}

#[tokio::test]
async fn test_detect_plate_json_shape() {
    let app = setup_with(
        StaticLocalizer::whole_image("truck", 0.7),
        ScriptedRecognizer::silent(),
        1024 * 1024,
    );

    let response = app
        .server
        .post("/api/detect_plate")
        .multipart(image_form(blue_car_png()))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let body: serde_json::Value = response.json();
    let detection = &body[0];
    assert_eq!(detection["vehicle_label"], "truck");
    assert_eq!(detection["bounding_box"]["x2"], 120);
    // Unreadable plates omit the plate fields entirely
    assert!(detection.get("plate_text").is_none());
    assert!(detection.get("plate_confidence").is_none());
}

#[tokio::test]
async fn test_detect_plate_without_image_field() {
    let app = setup();

    let response = app
        .server
        .post("/api/detect_plate")
        .multipart(MultipartForm::new().add_text("note", "no image here"))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

    let body: serde_json::Value = response.json();
    assert_eq!(body["error"], "No image provided");
}

#[tokio::test]
async fn test_detect_plate_rejects_garbage() {
    let app = setup();

    let response = app
        .server
        .post("/api/detect_plate")
        .multipart(image_form(b"definitely not an image".to_vec()))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

    let response = app
        .server
        .post("/api/detect_plate")
        .multipart(image_form(Vec::new()))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_detect_plate_no_vehicle() {
    let app = setup_with(
        StaticLocalizer::empty(),
        ScriptedRecognizer::silent(),
        1024 * 1024,
    );

    let response = app
        .server
        .post("/api/detect_plate")
        .multipart(image_form(blue_car_png()))
        .await;
    assert_eq!(response.status_code(), StatusCode::UNPROCESSABLE_ENTITY);

    let body: serde_json::Value = response.json();
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("No license plates detected"));
}

#[tokio::test]
async fn test_upload_limit() {
    let app = setup_with(
        StaticLocalizer::whole_image("car", 0.9),
        ScriptedRecognizer::silent(),
        1024,
    );

    let response = app
        .server
        .post("/api/detect_plate")
        .multipart(image_form(vec![0u8; 8 * 1024]))
        .await;
    assert_eq!(response.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
}

// ===== Registration =====

#[tokio::test]
async fn test_register_and_fetch_vehicle() {
    let app = setup();

    let response = app
        .server
        .post("/api/register_vehicle")
        .multipart(registration_form("XYZ-999", "Jamie Doe"))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let vehicle: Vehicle = response.json();
    assert_eq!(vehicle.plate_number, "XYZ-999");
    assert_eq!(vehicle.car_color.as_deref(), Some("red"));
    assert_eq!(vehicle.qr_code_path.as_deref(), Some("static/qr_codes/XYZ-999.png"));
    assert_eq!(
        vehicle.driver_photo_path.as_deref(),
        Some("static/driver_photos/XYZ-999_my_photo.jpg")
    );
    assert!(app.storage.path().join("qr_codes/XYZ-999.png").exists());

    let fetched: Vehicle = app
        .server
        .get(&format!("/api/vehicles/{}", vehicle.id))
        .await
        .json();
    assert_eq!(fetched, vehicle);

    // Artifacts are served under /static
    let qr = app.server.get("/static/qr_codes/XYZ-999.png").await;
    assert_eq!(qr.status_code(), StatusCode::OK);
    let decoded = image::load_from_memory(qr.as_bytes()).unwrap();
    assert_eq!(decoded.width(), decoded.height());
}

#[tokio::test]
async fn test_register_duplicate_plate() {
    let app = setup();

    let first = app
        .server
        .post("/api/register_vehicle")
        .multipart(registration_form("XYZ-999", "Jamie Doe"))
        .await;
    assert_eq!(first.status_code(), StatusCode::OK);

    let second = app
        .server
        .post("/api/register_vehicle")
        .multipart(registration_form("XYZ-999", "Someone Else"))
        .await;
    assert_eq!(second.status_code(), StatusCode::CONFLICT);
    let body: serde_json::Value = second.json();
    assert_eq!(body["error"], "Vehicle already registered");

    let vehicles: Vec<Vehicle> = app.server.get("/api/vehicles").await.json();
    assert_eq!(vehicles.len(), 1);
    assert_eq!(vehicles[0].driver_name, "Jamie Doe");
}

#[tokio::test]
async fn test_register_with_long_photo_name() {
    let app = setup();

    let form = MultipartForm::new()
        .add_text("plate_number", "LONG-77")
        .add_text("driver_name", "Jamie Doe")
        .add_part(
            "driver_photo",
            Part::bytes(b"fake jpeg bytes".to_vec())
                .file_name(format!("{}.jpg", "x".repeat(240)))
                .mime_type("image/jpeg"),
        );
    let response = app.server.post("/api/register_vehicle").multipart(form).await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let vehicle: Vehicle = response.json();
    let path = vehicle.driver_photo_path.unwrap();
    assert!(path.len() <= 200);
    assert!(path.ends_with(".jpg"));

    let photo = app.server.get(&format!("/{}", path)).await;
    assert_eq!(photo.status_code(), StatusCode::OK);
    assert_eq!(&photo.as_bytes()[..], b"fake jpeg bytes");
}

#[tokio::test]
async fn test_register_requires_photo() {
    let app = setup();

    let form = MultipartForm::new()
        .add_text("plate_number", "NOP-1")
        .add_text("driver_name", "Jamie Doe");
    let response = app.server.post("/api/register_vehicle").multipart(form).await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

    let body: serde_json::Value = response.json();
    assert_eq!(body["error"], "Driver photo is required");

    let vehicles: Vec<Vehicle> = app.server.get("/api/vehicles").await.json();
    assert!(vehicles.is_empty());
}

#[tokio::test]
async fn test_register_requires_plate_number() {
    let app = setup();

    let response = app
        .server
        .post("/api/register_vehicle")
        .multipart(registration_form("   ", "Jamie Doe"))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
}

// ===== Search =====

#[tokio::test]
async fn test_search_vehicles() {
    let app = setup();
    for (plate, driver) in [("AAA-111", "Jamie Doe"), ("BBB-222", "Alex Smith"), ("CCC-333", "Sam Jamison")] {
        let response = app
            .server
            .post("/api/register_vehicle")
            .multipart(registration_form(plate, driver))
            .await;
        assert_eq!(response.status_code(), StatusCode::OK);
    }

    let all: Vec<Vehicle> = app.server.get("/api/vehicles").await.json();
    assert_eq!(all.len(), 3);
    // Newest first
    assert_eq!(all[0].plate_number, "CCC-333");

    let matches: Vec<Vehicle> = app
        .server
        .get("/api/vehicles")
        .add_query_param("search", "JAM")
        .await
        .json();
    let plates: Vec<&str> = matches.iter().map(|v| v.plate_number.as_str()).collect();
    assert_eq!(plates, vec!["CCC-333", "AAA-111"]);

    let by_plate: Vec<Vehicle> = app
        .server
        .get("/api/vehicles")
        .add_query_param("search", "bbb")
        .await
        .json();
    assert_eq!(by_plate.len(), 1);
    assert_eq!(by_plate[0].driver_name, "Alex Smith");

    let blank: Vec<Vehicle> = app
        .server
        .get("/api/vehicles")
        .add_query_param("search", "")
        .await
        .json();
    assert_eq!(blank.len(), 3);
}

#[tokio::test]
async fn test_get_unknown_vehicle() {
    let app = setup();

    let response = app.server.get("/api/vehicles/42").await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"], "Vehicle not found");
}

// ===== CORS =====

#[tokio::test]
async fn test_cors_allows_configured_origin() {
    let app = setup();

    let allowed = app
        .server
        .get("/api/vehicles")
        .add_header(header::ORIGIN, HeaderValue::from_static("http://localhost:5000"))
        .await;
    assert_eq!(
        allowed.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN),
        Some(&HeaderValue::from_static("http://localhost:5000"))
    );

    let denied = app
        .server
        .get("/api/vehicles")
        .add_header(header::ORIGIN, HeaderValue::from_static("http://evil.example"))
        .await;
    assert!(denied
        .headers()
        .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
        .is_none());
}
